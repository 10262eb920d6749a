//! Format descriptors and decode options.
//!
//! An [`ImageFormat`] is a static table entry: every renderer points at one
//! and never mutates it. Runtime parameters live in [`ImagePlaneOptions`]
//! (one per plane) and [`ImageRenderingOptions`] (one per decode).

use core::fmt;

use crate::bitmap::BitmapFormat;
use crate::sample::ByteOrder;

/// Broad family a format belongs to. Renderers dispatch on this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FormatCategory {
    /// Separate Y, U and V planes.
    PlanarYuv,
    /// Interleaved RGB samples.
    PackedRgb,
    /// Camera raw sensor data.
    RawCodec,
    /// Compressed container decoded by a codec library.
    Compressed,
}

/// One plane of a planar format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PlaneDescriptor {
    /// Short label (`"Y"`, `"U"`, ...).
    pub name: &'static str,
    /// Storage bytes per sample.
    pub bytes_per_unit: usize,
    /// Horizontal subsampling factor (2 for 4:2:0 chroma).
    pub h_subsampling: u32,
    /// Vertical subsampling factor.
    pub v_subsampling: u32,
}

impl PlaneDescriptor {
    /// Full-resolution plane.
    pub const fn full(name: &'static str, bytes_per_unit: usize) -> Self {
        Self {
            name,
            bytes_per_unit,
            h_subsampling: 1,
            v_subsampling: 1,
        }
    }

    /// Plane subsampled by 2 in both directions.
    pub const fn quarter(name: &'static str, bytes_per_unit: usize) -> Self {
        Self {
            name,
            bytes_per_unit,
            h_subsampling: 2,
            v_subsampling: 2,
        }
    }

    /// Samples per row for an image `width` pixels wide.
    #[inline]
    pub const fn plane_width(&self, width: u32) -> u32 {
        width.div_ceil(self.h_subsampling)
    }

    /// Rows for an image `height` pixels tall.
    #[inline]
    pub const fn plane_height(&self, height: u32) -> u32 {
        height.div_ceil(self.v_subsampling)
    }

    /// Bytes of sample data in one row.
    #[inline]
    pub const fn row_data_bytes(&self, width: u32) -> usize {
        self.plane_width(width) as usize * self.bytes_per_unit
    }
}

/// Immutable description of a format a renderer decodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageFormat {
    /// Format family.
    pub category: FormatCategory,
    /// Registry key.
    pub id: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    /// Whether the format carries a quality setting.
    pub has_quality: bool,
    /// Planes in storage order. Empty for codec formats.
    pub planes: &'static [PlaneDescriptor],
    /// Effective bits per sample when the caller does not say otherwise.
    pub default_bits: u8,
    /// Bitmap format the renderer writes.
    pub output: BitmapFormat,
}

const YUV420_8: [PlaneDescriptor; 3] = [
    PlaneDescriptor::full("Y", 1),
    PlaneDescriptor::quarter("U", 1),
    PlaneDescriptor::quarter("V", 1),
];

const YUV420_16: [PlaneDescriptor; 3] = [
    PlaneDescriptor::full("Y", 2),
    PlaneDescriptor::quarter("U", 2),
    PlaneDescriptor::quarter("V", 2),
];

impl ImageFormat {
    /// Planar YUV 4:2:0, 8 bits per sample.
    pub const YUV420P: ImageFormat = ImageFormat {
        category: FormatCategory::PlanarYuv,
        id: "yuv420p",
        name: "YUV 4:2:0 planar (8-bit)",
        has_quality: false,
        planes: &YUV420_8,
        default_bits: 8,
        output: BitmapFormat::Bgra8,
    };

    /// Planar YUV 4:2:0, 10 effective bits in 16-bit storage.
    pub const YUV420P10: ImageFormat = ImageFormat {
        category: FormatCategory::PlanarYuv,
        id: "yuv420p10",
        name: "YUV 4:2:0 planar (10-bit)",
        has_quality: false,
        planes: &YUV420_16,
        default_bits: 10,
        output: BitmapFormat::Bgra16,
    };

    /// Planar YUV 4:2:0, 12 effective bits in 16-bit storage.
    pub const YUV420P12: ImageFormat = ImageFormat {
        category: FormatCategory::PlanarYuv,
        id: "yuv420p12",
        name: "YUV 4:2:0 planar (12-bit)",
        has_quality: false,
        planes: &YUV420_16,
        default_bits: 12,
        output: BitmapFormat::Bgra16,
    };

    /// Planar YUV 4:2:0, 16 bits per sample.
    pub const YUV420P16: ImageFormat = ImageFormat {
        category: FormatCategory::PlanarYuv,
        id: "yuv420p16",
        name: "YUV 4:2:0 planar (16-bit)",
        has_quality: false,
        planes: &YUV420_16,
        default_bits: 16,
        output: BitmapFormat::Bgra16,
    };

    /// Any container the codec library decodes, written as 8-bit BGRA.
    pub const CODEC: ImageFormat = ImageFormat {
        category: FormatCategory::Compressed,
        id: "codec",
        name: "Compressed image",
        has_quality: true,
        planes: &[],
        default_bits: 8,
        output: BitmapFormat::Bgra8,
    };

    /// Any container the codec library decodes, written as 16-bit BGRA.
    pub const CODEC16: ImageFormat = ImageFormat {
        category: FormatCategory::Compressed,
        id: "codec16",
        name: "Compressed image (16-bit output)",
        has_quality: true,
        planes: &[],
        default_bits: 16,
        output: BitmapFormat::Bgra16,
    };

    /// Number of planes.
    #[inline]
    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    /// Whether samples are stored in 16-bit slots.
    pub fn is_wide(&self) -> bool {
        self.planes.iter().any(|p| p.bytes_per_unit == 2)
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Runtime layout of one plane in the source stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImagePlaneOptions {
    /// Bytes between row starts.
    pub row_bytes: usize,
    /// Byte order of 16-bit samples. Ignored for 8-bit planes.
    pub byte_order: ByteOrder,
    /// Significant bits per sample.
    pub effective_bits: u8,
}

impl ImagePlaneOptions {
    /// Plane with the given stride, little endian, 8 effective bits.
    pub fn new(row_bytes: usize) -> Self {
        Self {
            row_bytes,
            byte_order: ByteOrder::LittleEndian,
            effective_bits: 8,
        }
    }

    /// Set the byte order.
    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    /// Set the effective bit depth.
    pub fn with_effective_bits(mut self, bits: u8) -> Self {
        self.effective_bits = bits;
        self
    }
}

/// YUV to RGB matrix coefficients.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum YuvMatrix {
    /// ITU-R BT.601.
    #[default]
    Bt601,
    /// ITU-R BT.709.
    Bt709,
}

impl YuvMatrix {
    /// Luma weights `(kr, kb)`.
    pub const fn coefficients(self) -> (f32, f32) {
        match self {
            Self::Bt601 => (0.299, 0.114),
            Self::Bt709 => (0.2126, 0.0722),
        }
    }
}

/// Code range of YUV samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum YuvRange {
    /// Every code value is used.
    #[default]
    Full,
    /// Studio swing: luma 16..=235, chroma 16..=240 (scaled for depth).
    Limited,
}

/// How subsampled chroma is brought to luma resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ChromaUpsampling {
    /// Repeat each chroma sample.
    #[default]
    Nearest,
    /// Interpolate between center-sited chroma samples.
    Bilinear,
}

/// Decode-wide options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageRenderingOptions {
    /// Byte offset where pixel data starts.
    pub data_offset: u64,
    /// Apply the orientation stored in the file, if any.
    pub apply_orientation: bool,
    /// Convert YUV to RGB. When off, Y/U/V land in R/G/B unchanged.
    pub convert_yuv_to_rgb: bool,
    /// Matrix for YUV conversion.
    pub yuv_matrix: YuvMatrix,
    /// Code range for YUV conversion.
    pub yuv_range: YuvRange,
    /// Chroma upsampling filter.
    pub chroma_upsampling: ChromaUpsampling,
}

impl Default for ImageRenderingOptions {
    fn default() -> Self {
        Self {
            data_offset: 0,
            apply_orientation: true,
            convert_yuv_to_rgb: true,
            yuv_matrix: YuvMatrix::default(),
            yuv_range: YuvRange::default(),
            chroma_upsampling: ChromaUpsampling::default(),
        }
    }
}

impl ImageRenderingOptions {
    /// Set the data offset.
    pub fn with_data_offset(mut self, offset: u64) -> Self {
        self.data_offset = offset;
        self
    }

    /// Toggle orientation handling.
    pub fn with_apply_orientation(mut self, apply: bool) -> Self {
        self.apply_orientation = apply;
        self
    }

    /// Toggle YUV to RGB conversion.
    pub fn with_yuv_to_rgb(mut self, convert: bool) -> Self {
        self.convert_yuv_to_rgb = convert;
        self
    }

    /// Set the YUV matrix.
    pub fn with_yuv_matrix(mut self, matrix: YuvMatrix) -> Self {
        self.yuv_matrix = matrix;
        self
    }

    /// Set the YUV code range.
    pub fn with_yuv_range(mut self, range: YuvRange) -> Self {
        self.yuv_range = range;
        self
    }

    /// Set the chroma upsampling filter.
    pub fn with_chroma_upsampling(mut self, filter: ChromaUpsampling) -> Self {
        self.chroma_upsampling = filter;
        self
    }
}
