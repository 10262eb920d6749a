//! Decoding and pixel-format conversion for raw, planar YUV and compressed images.
//!
//! The crate is the engine behind an image viewer that handles formats
//! ordinary viewers cannot: raw planar YUV dumps at 8 to 16 bits per sample,
//! next to the common compressed containers.
//!
//! - [`BitmapBuffer`]: shared, reference-counted BGRA pixel memory
//! - [`ImageRenderer`]: format-specific decoders ([`PlanarYuv420Renderer`],
//!   [`CodecRenderer`]), looked up through [`RendererRegistry`]
//! - [`RenderEngine`] / [`RenderTask`]: validation and scheduling on a fixed
//!   worker pool, with cooperative cancellation through [`Stop`]
//! - [`convert_bitmap`] / [`FormatConverter`]: bit-depth and color-space
//!   conversion between bitmaps
//! - [`SampleExtractor`]: N-bit sample extraction from byte pairs
//! - [`FileFormatParser`] / [`ContainerKind`]: container sniffing and
//!   embedded ICC profile lookup
//! - [`ResourceLimits`] / [`EngineConfig`]: limits and engine configuration
//!
//! ```
//! use std::sync::Arc;
//! use rawview::{
//!     BitmapBuffer, BitmapColorSpace, MemorySource, RenderEngine, RenderOutcome,
//!     RendererRegistry, Unstoppable,
//! };
//!
//! // 2x2 mid-gray frame: four luma samples, one U, one V.
//! let source = Arc::new(MemorySource::from(vec![128, 128, 128, 128, 128, 128]));
//! let renderer = RendererRegistry::global().create("yuv420p")?;
//! let planes = renderer.create_default_plane_options(2, 2);
//! let dest = BitmapBuffer::new(2, 2, renderer.format().output, BitmapColorSpace::Srgb)?;
//!
//! let engine = RenderEngine::with_defaults()?;
//! let outcome =
//!     engine.render_blocking(renderer, source, &dest, Default::default(), planes, Unstoppable)?;
//! assert_eq!(outcome, RenderOutcome::Completed);
//! assert_eq!(&dest.read().bytes()[..4], &[128, 128, 128, 255]);
//! # Ok::<(), rawview::whereat::At<rawview::RenderError>>(())
//! ```

#![forbid(unsafe_code)]

mod bitmap;
mod color;
mod config;
mod container;
mod convert;
mod engine;
mod error;
mod format;
mod limits;
mod render;
mod sample;
mod source;

pub use bitmap::{
    BitmapBuffer, BitmapColorSpace, BitmapFormat, BitmapLayout, BitmapRead, BitmapWrite,
    BufferError, BufferWatch,
};
pub use color::{CmsTransform, ColorTransform, profile_for, transform_between};
pub use config::{DEFAULT_WORKER_CAP, EngineConfig, MAX_WORKER_THREADS};
pub use container::{
    ContainerKind, FileFormatParser, IccProfileLocation, JpegParser, PngParser, WebpParser,
    locate_icc_profile,
};
pub use convert::{FormatConverter, PackRowFn, UnpackRowFn, convert_bitmap, pack_row_fn, unpack_row_fn};
pub use engine::{RenderEngine, RenderTask};
pub use error::{RenderError, Result};
pub use format::{
    ChromaUpsampling, FormatCategory, ImageFormat, ImagePlaneOptions, ImageRenderingOptions,
    PlaneDescriptor, YuvMatrix, YuvRange,
};
pub use limits::{LimitExceeded, ResourceLimits};
pub use render::{
    CodecRenderer, DecodeContext, ImageRenderer, PlanarYuv420Renderer, RenderOutcome,
    RendererCtor, RendererRegistry,
};
pub use sample::{
    ByteOrder, Extract8Fn, Extract16Fn, MAX_EFFECTIVE_BITS, MIN_EFFECTIVE_BITS, SampleExtractor,
    downscale_to_8bit, extract_8bit, extract_16bit, max_value,
};
pub use source::{FileSource, ImageSource, MemorySource, SourceStream};

// Re-exports for callers wiring up cancellation and pixel types.
pub use almost_enough::Stopper;
pub use enough::{Stop, StopReason, Unstoppable};
pub use rgb;
pub use whereat;
