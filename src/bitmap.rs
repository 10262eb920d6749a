//! Reference-counted bitmap memory.
//!
//! A [`BitmapBuffer`] is a handle to one fixed-size allocation of
//! `row_bytes × height` bytes plus the metadata describing it. Handles are
//! shared with [`share`](BitmapBuffer::share); the allocation is released
//! exactly once, when the last handle drops. Pixel bytes are reached
//! through [`read`](BitmapBuffer::read) and [`write`](BitmapBuffer::write)
//! guards, so a decode holding the write guard owns the pixels for its
//! duration.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use whereat::at;

use crate::error::{RenderError, Result};

// ---------------------------------------------------------------------------
// Descriptor enums
// ---------------------------------------------------------------------------

/// Packed pixel layout of a bitmap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum BitmapFormat {
    /// Blue, green, red, alpha; 8 bits per channel.
    Bgra8,
    /// Blue, green, red, alpha; 16 bits per channel, native endian.
    Bgra16,
}

impl BitmapFormat {
    /// Bytes per channel value.
    #[inline]
    pub const fn bytes_per_channel(self) -> usize {
        match self {
            Self::Bgra8 => 1,
            Self::Bgra16 => 2,
        }
    }

    /// Bytes per pixel.
    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        self.bytes_per_channel() * 4
    }

    /// Largest channel value.
    #[inline]
    pub const fn max_channel_value(self) -> u16 {
        match self {
            Self::Bgra8 => u8::MAX as u16,
            Self::Bgra16 => u16::MAX,
        }
    }

    /// Tightly packed stride for `width` pixels.
    #[inline]
    pub const fn min_row_bytes(self, width: u32) -> usize {
        width as usize * self.bytes_per_pixel()
    }
}

/// Color space that a bitmap's samples are expressed in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum BitmapColorSpace {
    /// Uninterpreted device values, displayed as-is.
    #[default]
    Device,
    /// sRGB (IEC 61966-2-1).
    Srgb,
    /// sRGB primaries, linear transfer.
    LinearSrgb,
    /// Display P3 primaries with the sRGB transfer curve.
    DisplayP3,
    /// Adobe RGB (1998).
    AdobeRgb,
}

// ---------------------------------------------------------------------------
// BufferError
// ---------------------------------------------------------------------------

/// Invalid bitmap geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum BufferError {
    /// Data is too small for the given dimensions and stride.
    InsufficientData,
    /// Stride is smaller than `width * bytes_per_pixel`.
    StrideTooSmall,
    /// Width or height causes overflow.
    InvalidDimensions,
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData => {
                write!(f, "data is too small for the given dimensions")
            }
            Self::StrideTooSmall => write!(f, "stride is smaller than width * bytes_per_pixel"),
            Self::InvalidDimensions => write!(f, "width or height causes overflow"),
        }
    }
}

impl core::error::Error for BufferError {}

// ---------------------------------------------------------------------------
// BitmapLayout
// ---------------------------------------------------------------------------

/// Immutable geometry and interpretation of a bitmap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BitmapLayout {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bytes between row starts.
    pub row_bytes: usize,
    /// Packed pixel layout.
    pub format: BitmapFormat,
    /// Color space of the samples.
    pub color_space: BitmapColorSpace,
}

impl BitmapLayout {
    fn new(
        width: u32,
        height: u32,
        row_bytes: usize,
        format: BitmapFormat,
        color_space: BitmapColorSpace,
    ) -> core::result::Result<Self, BufferError> {
        let min = (width as usize)
            .checked_mul(format.bytes_per_pixel())
            .ok_or(BufferError::InvalidDimensions)?;
        if row_bytes < min {
            return Err(BufferError::StrideTooSmall);
        }
        row_bytes
            .checked_mul(height as usize)
            .ok_or(BufferError::InvalidDimensions)?;
        Ok(Self {
            width,
            height,
            row_bytes,
            format,
            color_space,
        })
    }

    /// Total bytes (`row_bytes × height`).
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.row_bytes * self.height as usize
    }

    /// Bytes of pixel data in one row, excluding padding.
    #[inline]
    pub fn pixel_row_bytes(&self) -> usize {
        self.format.min_row_bytes(self.width)
    }

    /// Byte offset of pixel `(x, y)`.
    #[inline]
    pub fn pixel_offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.row_bytes + x as usize * self.format.bytes_per_pixel()
    }

    /// Whether `other` has the same format, color space and dimensions.
    pub fn check_compatible(&self, other: &BitmapLayout) -> Result<()> {
        if self.format != other.format {
            return Err(at(RenderError::FormatMismatch {
                expected: self.format,
                actual: other.format,
            }));
        }
        if self.color_space != other.color_space {
            return Err(at(RenderError::ColorSpaceMismatch {
                expected: self.color_space,
                actual: other.color_space,
            }));
        }
        self.check_dimensions(other.width, other.height)
    }

    pub(crate) fn check_dimensions(&self, width: u32, height: u32) -> Result<()> {
        if self.width != width || self.height != height {
            return Err(at(RenderError::DimensionMismatch {
                expected_width: self.width,
                expected_height: self.height,
                actual_width: width,
                actual_height: height,
            }));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// BitmapBuffer
// ---------------------------------------------------------------------------

struct Shared {
    layout: BitmapLayout,
    data: RwLock<Box<[u8]>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        log::trace!(
            "releasing {}x{} {:?} bitmap ({} bytes)",
            self.layout.width,
            self.layout.height,
            self.layout.format,
            self.layout.byte_len()
        );
    }
}

/// Shared handle to a bitmap allocation.
///
/// Cloning is the same as [`share`](Self::share).
pub struct BitmapBuffer {
    shared: Arc<Shared>,
}

impl BitmapBuffer {
    /// Allocate a zero-filled, tightly packed bitmap.
    pub fn new(
        width: u32,
        height: u32,
        format: BitmapFormat,
        color_space: BitmapColorSpace,
    ) -> Result<Self> {
        let row_bytes = (width as usize)
            .checked_mul(format.bytes_per_pixel())
            .ok_or_else(|| at(RenderError::Buffer(BufferError::InvalidDimensions)))?;
        Self::with_row_bytes(width, height, row_bytes, format, color_space)
    }

    /// Allocate a zero-filled bitmap with an explicit stride.
    pub fn with_row_bytes(
        width: u32,
        height: u32,
        row_bytes: usize,
        format: BitmapFormat,
        color_space: BitmapColorSpace,
    ) -> Result<Self> {
        let layout = BitmapLayout::new(width, height, row_bytes, format, color_space)
            .map_err(|e| at(RenderError::Buffer(e)))?;
        Ok(Self::from_parts(
            layout,
            vec![0u8; layout.byte_len()].into_boxed_slice(),
        ))
    }

    /// Wrap existing bytes. Excess bytes beyond `row_bytes × height` are dropped.
    pub fn from_vec(
        mut data: Vec<u8>,
        width: u32,
        height: u32,
        row_bytes: usize,
        format: BitmapFormat,
        color_space: BitmapColorSpace,
    ) -> Result<Self> {
        let layout = BitmapLayout::new(width, height, row_bytes, format, color_space)
            .map_err(|e| at(RenderError::Buffer(e)))?;
        if data.len() < layout.byte_len() {
            return Err(at(RenderError::Buffer(BufferError::InsufficientData)));
        }
        data.truncate(layout.byte_len());
        Ok(Self::from_parts(layout, data.into_boxed_slice()))
    }

    fn from_parts(layout: BitmapLayout, data: Box<[u8]>) -> Self {
        Self {
            shared: Arc::new(Shared {
                layout,
                data: RwLock::new(data),
            }),
        }
    }

    /// Another handle to the same allocation.
    pub fn share(&self) -> BitmapBuffer {
        BitmapBuffer {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of live handles to this allocation.
    pub fn share_count(&self) -> usize {
        Arc::strong_count(&self.shared)
    }

    /// Observer that reports whether the allocation is still alive.
    pub fn watch(&self) -> BufferWatch {
        BufferWatch {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Whether both handles refer to the same allocation.
    pub fn same_buffer(&self, other: &BitmapBuffer) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Geometry and interpretation.
    #[inline]
    pub fn layout(&self) -> BitmapLayout {
        self.shared.layout
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.shared.layout.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.shared.layout.height
    }

    /// Bytes between row starts.
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.shared.layout.row_bytes
    }

    /// Packed pixel layout.
    #[inline]
    pub fn format(&self) -> BitmapFormat {
        self.shared.layout.format
    }

    /// Color space of the samples.
    #[inline]
    pub fn color_space(&self) -> BitmapColorSpace {
        self.shared.layout.color_space
    }

    /// Byte offset of pixel `(x, y)`: `y * row_bytes + x * bytes_per_pixel`.
    #[inline]
    pub fn pixel_offset(&self, x: u32, y: u32) -> usize {
        self.shared.layout.pixel_offset(x, y)
    }

    /// Lock the pixels for reading. Blocks while a writer holds them.
    pub fn read(&self) -> BitmapRead<'_> {
        BitmapRead {
            layout: self.shared.layout,
            data: self
                .shared
                .data
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Lock the pixels for writing. Blocks while any reader or writer holds them.
    pub fn write(&self) -> BitmapWrite<'_> {
        BitmapWrite {
            layout: self.shared.layout,
            data: self
                .shared
                .data
                .write()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// New allocation with identical layout and content.
    pub fn copy(&self) -> BitmapBuffer {
        let data = self.read().bytes().to_vec().into_boxed_slice();
        Self::from_parts(self.shared.layout, data)
    }

    /// Copy pixels into `dest`.
    ///
    /// No-op when both handles share one allocation. Fails unless format,
    /// color space and dimensions match. Rows are copied one at a time when
    /// strides differ, `min(source stride, dest stride)` bytes each.
    pub fn copy_to(&self, dest: &BitmapBuffer) -> Result<()> {
        if self.same_buffer(dest) {
            return Ok(());
        }
        let src_layout = self.layout();
        src_layout.check_compatible(&dest.layout())?;

        let (src, mut dst) = lock_pair(self, dest);
        let src_stride = src_layout.row_bytes;
        let dst_stride = dst.layout.row_bytes;
        if src_stride == dst_stride {
            dst.bytes_mut().copy_from_slice(src.bytes());
        } else {
            let len = src_stride.min(dst_stride);
            if len == 0 {
                return Ok(());
            }
            for (s, d) in src
                .bytes()
                .chunks_exact(src_stride)
                .zip(dst.bytes_mut().chunks_exact_mut(dst_stride))
            {
                d[..len].copy_from_slice(&s[..len]);
            }
        }
        Ok(())
    }
}

/// Read guard on `src` and write guard on `dest`, taken in allocation
/// address order.
///
/// Every two-buffer operation locks through here, so opposite-direction
/// calls on the same pair cannot each hold one lock while waiting for the
/// other. `src` and `dest` must be distinct allocations.
pub(crate) fn lock_pair<'a>(
    src: &'a BitmapBuffer,
    dest: &'a BitmapBuffer,
) -> (BitmapRead<'a>, BitmapWrite<'a>) {
    debug_assert!(!src.same_buffer(dest));
    if Arc::as_ptr(&src.shared) < Arc::as_ptr(&dest.shared) {
        let read = src.read();
        (read, dest.write())
    } else {
        let write = dest.write();
        (src.read(), write)
    }
}

impl Clone for BitmapBuffer {
    fn clone(&self) -> Self {
        self.share()
    }
}

impl fmt::Debug for BitmapBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let l = self.shared.layout;
        write!(
            f,
            "BitmapBuffer({}x{}, {:?} {:?}, stride {})",
            l.width, l.height, l.format, l.color_space, l.row_bytes
        )
    }
}

/// Weak observer of a bitmap allocation.
#[derive(Clone, Debug)]
pub struct BufferWatch {
    shared: Weak<Shared>,
}

impl BufferWatch {
    /// Whether any handle to the allocation is still alive.
    pub fn is_alive(&self) -> bool {
        self.shared.strong_count() > 0
    }
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// Read access to a bitmap's pixels.
pub struct BitmapRead<'a> {
    layout: BitmapLayout,
    data: RwLockReadGuard<'a, Box<[u8]>>,
}

impl BitmapRead<'_> {
    /// Geometry and interpretation.
    #[inline]
    pub fn layout(&self) -> BitmapLayout {
        self.layout
    }

    /// All bytes, including row padding.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Pixel bytes for row `y`, without padding.
    ///
    /// # Panics
    ///
    /// Panics if `y >= height`.
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        assert!(
            y < self.layout.height,
            "row index {y} out of bounds (height: {})",
            self.layout.height
        );
        let start = y as usize * self.layout.row_bytes;
        &self.data[start..start + self.layout.pixel_row_bytes()]
    }
}

/// Exclusive write access to a bitmap's pixels.
pub struct BitmapWrite<'a> {
    layout: BitmapLayout,
    data: RwLockWriteGuard<'a, Box<[u8]>>,
}

impl BitmapWrite<'_> {
    /// Geometry and interpretation.
    #[inline]
    pub fn layout(&self) -> BitmapLayout {
        self.layout
    }

    /// All bytes, including row padding.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// All bytes, mutable.
    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Mutable pixel bytes for row `y`, without padding.
    ///
    /// # Panics
    ///
    /// Panics if `y >= height`.
    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        assert!(
            y < self.layout.height,
            "row index {y} out of bounds (height: {})",
            self.layout.height
        );
        let start = y as usize * self.layout.row_bytes;
        let len = self.layout.pixel_row_bytes();
        &mut self.data[start..start + len]
    }
}
