//! Error taxonomy for decoding, conversion and container parsing.
//!
//! Every fallible operation returns [`Result`], whose error side is
//! [`At<RenderError>`](whereat::At): the error plus the location it was
//! raised at. Cancellation is not an error at the public boundary; see
//! [`RenderOutcome`](crate::RenderOutcome).

use std::io;

use enough::StopReason;
use whereat::{At, at};

use crate::bitmap::{BitmapColorSpace, BitmapFormat, BufferError};
use crate::limits::LimitExceeded;

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, At<RenderError>>;

/// Errors raised by renderers, converters and container parsers.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RenderError {
    /// Destination buffer format differs from what the renderer writes.
    #[error("destination format {actual:?} does not match expected {expected:?}")]
    FormatMismatch {
        /// Format the operation requires.
        expected: BitmapFormat,
        /// Format of the supplied buffer.
        actual: BitmapFormat,
    },

    /// Source and destination color spaces differ where they must match.
    #[error("color space {actual:?} does not match expected {expected:?}")]
    ColorSpaceMismatch {
        /// Required color space.
        expected: BitmapColorSpace,
        /// Supplied color space.
        actual: BitmapColorSpace,
    },

    /// Buffer dimensions differ where they must match.
    #[error("dimensions {actual_width}x{actual_height} do not match expected {expected_width}x{expected_height}")]
    DimensionMismatch {
        /// Required width.
        expected_width: u32,
        /// Required height.
        expected_height: u32,
        /// Supplied width.
        actual_width: u32,
        /// Supplied height.
        actual_height: u32,
    },

    /// Effective bit depth outside the supported range.
    #[error("effective bit depth {bits} is outside {min}..={max}")]
    InvalidBitDepth {
        /// Requested depth.
        bits: u8,
        /// Smallest accepted depth.
        min: u8,
        /// Largest accepted depth.
        max: u8,
    },

    /// Plane options do not line up with the format's planes.
    #[error("expected {expected} plane options, got {actual}")]
    PlaneCountMismatch {
        /// Planes declared by the format.
        expected: usize,
        /// Plane options supplied.
        actual: usize,
    },

    /// A row stride is too small for the row it must hold.
    #[error("plane {plane}: row stride {row_bytes} is smaller than the {min} bytes a row needs")]
    InvalidStride {
        /// Plane index.
        plane: usize,
        /// Supplied stride.
        row_bytes: usize,
        /// Minimum stride.
        min: usize,
    },

    /// No color transform exists between the two spaces.
    #[error("no color transform from {from:?} to {to:?}")]
    UnsupportedConversion {
        /// Source color space.
        from: BitmapColorSpace,
        /// Destination color space.
        to: BitmapColorSpace,
    },

    /// The color management engine could not build or run a transform.
    #[error("color transform failed: {0}")]
    Cms(moxcms::CmsError),

    /// Registry lookup failed.
    #[error("no renderer registered for format id {0:?}")]
    UnknownRenderer(String),

    /// Source stream is shorter than the decode requires.
    #[error("source holds {available} bytes but {required} are required ({} missing)", .required - .available)]
    InsufficientData {
        /// Bytes the decode needs, counted from the start of the stream.
        required: u64,
        /// Bytes the stream holds.
        available: u64,
    },

    /// The external codec rejected the data.
    #[error("codec error: {0}")]
    Codec(#[from] image::ImageError),

    /// Invalid buffer geometry.
    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// A resource limit was exceeded.
    #[error("limit exceeded: {0}")]
    Limit(#[from] LimitExceeded),

    /// Underlying stream I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Worker pool could not be created.
    #[error("worker pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    /// A worker exited without reporting a result (it panicked).
    #[error("render worker exited without reporting a result")]
    WorkerLost,

    /// Work was stopped through a stop token.
    ///
    /// The engine maps this to [`RenderOutcome::Cancelled`](crate::RenderOutcome::Cancelled)
    /// before it reaches callers.
    #[error("cancelled: {0}")]
    Cancelled(StopReason),
}

impl RenderError {
    /// Whether this error is a caller contract violation.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::FormatMismatch { .. }
                | Self::ColorSpaceMismatch { .. }
                | Self::DimensionMismatch { .. }
                | Self::InvalidBitDepth { .. }
                | Self::PlaneCountMismatch { .. }
                | Self::InvalidStride { .. }
                | Self::UnsupportedConversion { .. }
                | Self::UnknownRenderer(_)
                | Self::Buffer(_)
        )
    }

    /// Bytes missing from the source, if this is an insufficient-data error.
    pub fn missing_bytes(&self) -> Option<u64> {
        match self {
            Self::InsufficientData {
                required,
                available,
            } => Some(required.saturating_sub(*available)),
            _ => None,
        }
    }
}

impl From<StopReason> for RenderError {
    fn from(reason: StopReason) -> Self {
        Self::Cancelled(reason)
    }
}

#[track_caller]
pub(crate) fn io_error(e: io::Error) -> At<RenderError> {
    at(RenderError::Io(e))
}

#[track_caller]
pub(crate) fn cancelled(reason: StopReason) -> At<RenderError> {
    at(RenderError::Cancelled(reason))
}
