//! Compressed formats, decoded by the `image` crate.

use std::io::{BufReader, Cursor, Read};

use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader};
use log::debug;
use rgb::FromSlice;
use rgb::alt::BGRA;
use whereat::{At, at};

use super::{DecodeContext, ImageRenderer};
use crate::bitmap::{BitmapFormat, BitmapWrite};
use crate::error::{RenderError, Result, cancelled, io_error};
use crate::format::{ImageFormat, ImagePlaneOptions, ImageRenderingOptions};
use crate::source::{ImageSource, SourceStream};

#[track_caller]
fn codec_error(e: image::ImageError) -> At<RenderError> {
    at(RenderError::Codec(e))
}

/// Stored dimensions as they land in the destination.
fn oriented_dimensions(
    (width, height): (u32, u32),
    orientation: Orientation,
    apply: bool,
) -> (u32, u32) {
    let transposed = matches!(
        orientation,
        Orientation::Rotate90
            | Orientation::Rotate270
            | Orientation::Rotate90FlipH
            | Orientation::Rotate270FlipH
    );
    if apply && transposed {
        (height, width)
    } else {
        (width, height)
    }
}

/// Pass-through renderer for PNG, JPEG, GIF, BMP, TIFF and WebP.
///
/// Everything from the data offset to the end of the stream is handed to
/// the codec. The destination must have the decoded (and, when requested,
/// reoriented) dimensions.
#[derive(Clone, Copy, Debug)]
pub struct CodecRenderer {
    format: &'static ImageFormat,
}

impl CodecRenderer {
    /// Writes 8-bit BGRA.
    pub fn new() -> Self {
        Self {
            format: &ImageFormat::CODEC,
        }
    }

    /// Writes 16-bit BGRA.
    pub fn wide() -> Self {
        Self {
            format: &ImageFormat::CODEC16,
        }
    }

    /// Dimensions from the header, without decoding pixels.
    ///
    /// These are the stored dimensions; orientation is not applied.
    pub fn header_dimensions(&self, source: &dyn ImageSource) -> Result<(u32, u32)> {
        let stream = BufReader::new(source.open()?);
        ImageReader::new(stream)
            .with_guessed_format()
            .map_err(io_error)?
            .into_dimensions()
            .map_err(codec_error)
    }
}

impl Default for CodecRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageRenderer for CodecRenderer {
    fn format(&self) -> &'static ImageFormat {
        self.format
    }

    fn evaluate_pixel_count(&self, source: &dyn ImageSource) -> Result<u64> {
        let (w, h) = self.header_dimensions(source)?;
        Ok(w as u64 * h as u64)
    }

    /// The codec reads to the end of the stream; only the offset is fixed.
    fn evaluate_source_data_size(
        &self,
        _width: u32,
        _height: u32,
        options: &ImageRenderingOptions,
        _planes: &[ImagePlaneOptions],
    ) -> Result<u64> {
        Ok(options.data_offset)
    }

    fn decode(
        &self,
        stream: &mut dyn SourceStream,
        dest: &mut BitmapWrite<'_>,
        ctx: &DecodeContext<'_>,
    ) -> Result<()> {
        let mut data = Vec::new();
        stream.read_to_end(&mut data).map_err(io_error)?;
        ctx.stop.check().map_err(cancelled)?;

        let mut decoder = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(io_error)?
            .into_decoder()
            .map_err(codec_error)?;
        let orientation = decoder.orientation().map_err(codec_error)?;
        let (width, height) =
            oriented_dimensions(decoder.dimensions(), orientation, ctx.options.apply_orientation);
        let layout = dest.layout();
        layout.check_dimensions(width, height)?;

        let mut img = DynamicImage::from_decoder(decoder).map_err(codec_error)?;
        if ctx.options.apply_orientation {
            img.apply_orientation(orientation);
        }
        debug!(
            "codec decoded {}x{} {:?}, orientation {:?}",
            img.width(),
            img.height(),
            img.color(),
            orientation
        );
        let width = layout.width as usize;
        let row_len = layout.pixel_row_bytes();

        match layout.format {
            BitmapFormat::Bgra8 => {
                let rgba = img.to_rgba8();
                let src = rgba.as_raw();
                for (y, out) in dest.bytes_mut().chunks_exact_mut(layout.row_bytes).enumerate() {
                    ctx.stop.check().map_err(cancelled)?;
                    let row = &src[y * width * 4..(y + 1) * width * 4];
                    for (s, d) in row.as_rgba().iter().zip(out[..row_len].as_bgra_mut()) {
                        *d = BGRA {
                            b: s.b,
                            g: s.g,
                            r: s.r,
                            a: s.a,
                        };
                    }
                }
            }
            BitmapFormat::Bgra16 => {
                let rgba = img.to_rgba16();
                let src = rgba.as_raw();
                for (y, out) in dest.bytes_mut().chunks_exact_mut(layout.row_bytes).enumerate() {
                    ctx.stop.check().map_err(cancelled)?;
                    let row = &src[y * width * 4..(y + 1) * width * 4];
                    for (s, d) in row.as_rgba().iter().zip(out[..row_len].chunks_exact_mut(8)) {
                        for (i, v) in [s.b, s.g, s.r, s.a].into_iter().enumerate() {
                            d[i * 2..i * 2 + 2].copy_from_slice(&v.to_ne_bytes());
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
