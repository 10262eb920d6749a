//! Renderer trait and the concrete decoders.
//!
//! A renderer turns the bytes of one [`ImageFormat`] into a
//! [`BitmapBuffer`](crate::BitmapBuffer). It never schedules work itself: the
//! [`RenderEngine`](crate::RenderEngine) validates, opens the stream,
//! checks its size and seeks to the data offset, then calls
//! [`ImageRenderer::decode`] on a worker thread.
//!
//! Renderers are looked up by format id through [`RendererRegistry`].

mod codec;
mod registry;
mod yuv;

pub use codec::CodecRenderer;
pub use registry::{RendererCtor, RendererRegistry};
pub use yuv::PlanarYuv420Renderer;

use enough::Stop;
use whereat::at;

use crate::bitmap::BitmapWrite;
use crate::error::{RenderError, Result};
use crate::format::{ImageFormat, ImagePlaneOptions, ImageRenderingOptions};
use crate::sample::validate_bits;
use crate::source::{ImageSource, SourceStream};

/// How a render finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[must_use]
pub enum RenderOutcome {
    /// Every row was written.
    Completed,
    /// Stopped by a stop token. The destination may be partially written.
    Cancelled,
}

impl RenderOutcome {
    /// Whether the render ran to completion.
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Everything a decode needs besides the stream and destination.
#[derive(Clone, Copy)]
pub struct DecodeContext<'a> {
    /// Decode-wide options.
    pub options: &'a ImageRenderingOptions,
    /// Per-plane options, ordered as the format's planes.
    pub planes: &'a [ImagePlaneOptions],
    /// Checked once per scanline.
    pub stop: &'a (dyn Stop + Sync),
}

/// A decoder for one [`ImageFormat`].
pub trait ImageRenderer: Send + Sync {
    /// Format this renderer decodes.
    fn format(&self) -> &'static ImageFormat;

    /// Tightly packed, little-endian plane options for a `width × height` image.
    fn create_default_plane_options(&self, width: u32, _height: u32) -> Vec<ImagePlaneOptions> {
        let format = self.format();
        format
            .planes
            .iter()
            .map(|p| {
                ImagePlaneOptions::new(p.row_data_bytes(width))
                    .with_effective_bits(format.default_bits)
            })
            .collect()
    }

    /// Pixels the source can hold.
    ///
    /// Codec formats read the header; raw formats estimate from the length.
    fn evaluate_pixel_count(&self, source: &dyn ImageSource) -> Result<u64>;

    /// Bytes the stream must hold, counted from byte 0 (so including
    /// `options.data_offset`).
    fn evaluate_source_data_size(
        &self,
        width: u32,
        height: u32,
        options: &ImageRenderingOptions,
        planes: &[ImagePlaneOptions],
    ) -> Result<u64>;

    /// Validate plane options against the format.
    ///
    /// Checks the plane count, each stride against the row it must hold, and
    /// each effective depth: exactly 8 for 1-byte storage, `9..=16` for
    /// 2-byte storage.
    fn check_plane_options(&self, width: u32, planes: &[ImagePlaneOptions]) -> Result<()> {
        let descriptors = self.format().planes;
        if planes.len() != descriptors.len() {
            return Err(at(RenderError::PlaneCountMismatch {
                expected: descriptors.len(),
                actual: planes.len(),
            }));
        }
        for (i, (desc, opts)) in descriptors.iter().zip(planes).enumerate() {
            let min = desc.row_data_bytes(width);
            if opts.row_bytes < min {
                return Err(at(RenderError::InvalidStride {
                    plane: i,
                    row_bytes: opts.row_bytes,
                    min,
                }));
            }
            if desc.bytes_per_unit == 1 {
                if opts.effective_bits != 8 {
                    return Err(at(RenderError::InvalidBitDepth {
                        bits: opts.effective_bits,
                        min: 8,
                        max: 8,
                    }));
                }
            } else {
                validate_bits(opts.effective_bits)?;
            }
        }
        Ok(())
    }

    /// Decode from `stream`, positioned at the data offset, into `dest`.
    ///
    /// Implementations check `ctx.stop` at least once per scanline and
    /// report it as [`RenderError::Cancelled`].
    fn decode(
        &self,
        stream: &mut dyn SourceStream,
        dest: &mut BitmapWrite<'_>,
        ctx: &DecodeContext<'_>,
    ) -> Result<()>;
}
