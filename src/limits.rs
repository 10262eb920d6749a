//! Resource limits for renders.
//!
//! The engine checks [`ResourceLimits`] against the destination bitmap and
//! the source length before a render is scheduled. A failed check reports
//! the offending value as [`LimitExceeded`].

use crate::bitmap::BitmapLayout;

/// Caps applied to every render an engine accepts.
///
/// `None` leaves a dimension unbounded.
///
/// ```
/// use rawview::ResourceLimits;
///
/// let limits = ResourceLimits::none()
///     .with_max_pixels(100_000_000)
///     .with_max_memory(512 * 1024 * 1024);
/// assert!(limits.has_any());
/// assert!(limits.check_file_size(u64::MAX).is_ok());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct ResourceLimits {
    /// Destination width × height.
    pub max_pixels: Option<u64>,
    /// Destination allocation, padding included.
    pub max_memory_bytes: Option<u64>,
    /// Destination width.
    pub max_width: Option<u32>,
    /// Destination height.
    pub max_height: Option<u32>,
    /// Length of the source stream.
    pub max_file_size: Option<u64>,
}

impl ResourceLimits {
    /// Nothing bounded.
    pub fn none() -> Self {
        Self::default()
    }

    /// Cap `width × height`.
    pub fn with_max_pixels(mut self, pixels: u64) -> Self {
        self.max_pixels = Some(pixels);
        self
    }

    /// Cap the destination allocation, padding included.
    pub fn with_max_memory(mut self, bytes: u64) -> Self {
        self.max_memory_bytes = Some(bytes);
        self
    }

    /// Cap the destination width.
    pub fn with_max_width(mut self, width: u32) -> Self {
        self.max_width = Some(width);
        self
    }

    /// Cap the destination height.
    pub fn with_max_height(mut self, height: u32) -> Self {
        self.max_height = Some(height);
        self
    }

    /// Cap the source stream length.
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    /// Whether at least one cap is set.
    pub fn has_any(&self) -> bool {
        *self != Self::none()
    }

    /// Width first, then height, then the pixel product.
    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), LimitExceeded> {
        if let Some(max) = exceeds(self.max_width, width) {
            return Err(LimitExceeded::Width { actual: width, max });
        }
        if let Some(max) = exceeds(self.max_height, height) {
            return Err(LimitExceeded::Height { actual: height, max });
        }
        let pixels = u64::from(width) * u64::from(height);
        match exceeds(self.max_pixels, pixels) {
            Some(max) => Err(LimitExceeded::Pixels { actual: pixels, max }),
            None => Ok(()),
        }
    }

    /// Allocation size against `max_memory_bytes`.
    pub fn check_memory(&self, bytes: u64) -> Result<(), LimitExceeded> {
        match exceeds(self.max_memory_bytes, bytes) {
            Some(max) => Err(LimitExceeded::Memory { actual: bytes, max }),
            None => Ok(()),
        }
    }

    /// Source length against `max_file_size`. Equal to the cap passes.
    pub fn check_file_size(&self, bytes: u64) -> Result<(), LimitExceeded> {
        match exceeds(self.max_file_size, bytes) {
            Some(max) => Err(LimitExceeded::FileSize { actual: bytes, max }),
            None => Ok(()),
        }
    }

    /// Dimensions and allocation size of a destination bitmap.
    pub fn check_bitmap(&self, layout: &BitmapLayout) -> Result<(), LimitExceeded> {
        self.check_dimensions(layout.width, layout.height)?;
        self.check_memory(layout.byte_len() as u64)
    }
}

/// The cap, when `value` is above it.
fn exceeds<T: PartialOrd + Copy>(cap: Option<T>, value: T) -> Option<T> {
    cap.filter(|&max| value > max)
}

/// Which cap a render hit, with the rejected value.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum LimitExceeded {
    /// Destination width over `max_width`.
    #[error("width {actual} exceeds limit {max}")]
    Width {
        /// Requested width.
        actual: u32,
        /// Configured cap.
        max: u32,
    },
    /// Destination height over `max_height`.
    #[error("height {actual} exceeds limit {max}")]
    Height {
        /// Requested height.
        actual: u32,
        /// Configured cap.
        max: u32,
    },
    /// `width × height` over `max_pixels`.
    #[error("{actual} pixels exceed limit {max}")]
    Pixels {
        /// Requested pixel count.
        actual: u64,
        /// Configured cap.
        max: u64,
    },
    /// Destination allocation over `max_memory_bytes`.
    #[error("bitmap of {actual} bytes exceeds memory limit {max}")]
    Memory {
        /// Allocation size in bytes, padding included.
        actual: u64,
        /// Configured cap.
        max: u64,
    },
    /// Source length over `max_file_size`.
    #[error("source of {actual} bytes exceeds limit {max}")]
    FileSize {
        /// Source length in bytes.
        actual: u64,
        /// Configured cap.
        max: u64,
    },
}
