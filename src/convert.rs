//! Packed-format conversion between bitmaps.
//!
//! Each row goes through three stages: unpack to interleaved, normalized
//! `f32` RGBA, optional color-space transform, pack into the destination
//! format.
//! The three stages are chosen once per conversion by [`FormatConverter::new`];
//! the per-row loop only calls through the selected function pointers.
//!
//! [`FormatConverter::convert`] fans rows out over rayon. Every row owns a
//! disjoint slice of the destination, so no synchronization happens inside
//! the loop. Rows complete in no particular order.

use std::sync::Arc;

use enough::Stop;
use rayon::prelude::*;
use rgb::alt::BGRA;
use rgb::{FromSlice, Rgba};

use crate::bitmap::{BitmapBuffer, BitmapColorSpace, BitmapFormat, lock_pair};
use crate::color::{ColorTransform, transform_between};
use crate::error::{Result, cancelled};

/// Decode one row of packed pixels into normalized RGBA.
pub type UnpackRowFn = fn(&[u8], &mut [Rgba<f32>]);
/// Encode one row of normalized RGBA into packed pixels.
pub type PackRowFn = fn(&[Rgba<f32>], &mut [u8]);

/// Row unpacker for `format`.
pub fn unpack_row_fn(format: BitmapFormat) -> UnpackRowFn {
    match format {
        BitmapFormat::Bgra8 => unpack_bgra8,
        BitmapFormat::Bgra16 => unpack_bgra16,
    }
}

/// Row packer for `format`.
pub fn pack_row_fn(format: BitmapFormat) -> PackRowFn {
    match format {
        BitmapFormat::Bgra8 => pack_bgra8,
        BitmapFormat::Bgra16 => pack_bgra16,
    }
}

fn unpack_bgra8(src: &[u8], out: &mut [Rgba<f32>]) {
    const SCALE: f32 = 1.0 / 255.0;
    for (px, dst) in src.as_bgra().iter().zip(out.iter_mut()) {
        *dst = Rgba::new(
            px.r as f32 * SCALE,
            px.g as f32 * SCALE,
            px.b as f32 * SCALE,
            px.a as f32 * SCALE,
        );
    }
}

fn unpack_bgra16(src: &[u8], out: &mut [Rgba<f32>]) {
    const SCALE: f32 = 1.0 / 65535.0;
    for (px, dst) in src.chunks_exact(8).zip(out.iter_mut()) {
        let ch = |i: usize| u16::from_ne_bytes([px[i], px[i + 1]]) as f32 * SCALE;
        *dst = Rgba::new(ch(4), ch(2), ch(0), ch(6));
    }
}

#[inline]
fn quantize(v: f32, max: f32) -> f32 {
    v.clamp(0.0, 1.0) * max + 0.5
}

fn pack_bgra8(src: &[Rgba<f32>], out: &mut [u8]) {
    for (px, dst) in src.iter().zip(out.as_bgra_mut().iter_mut()) {
        *dst = BGRA {
            b: quantize(px.b, 255.0) as u8,
            g: quantize(px.g, 255.0) as u8,
            r: quantize(px.r, 255.0) as u8,
            a: quantize(px.a, 255.0) as u8,
        };
    }
}

fn pack_bgra16(src: &[Rgba<f32>], out: &mut [u8]) {
    for (px, dst) in src.iter().zip(out.chunks_exact_mut(8)) {
        for (i, v) in [px.b, px.g, px.r, px.a].into_iter().enumerate() {
            let q = quantize(v, 65535.0) as u16;
            dst[i * 2..i * 2 + 2].copy_from_slice(&q.to_ne_bytes());
        }
    }
}

/// Unpack/transform/pack pipeline bound to one source and destination format.
#[derive(Clone)]
pub struct FormatConverter {
    src_pixel_bytes: usize,
    unpack: UnpackRowFn,
    pack: PackRowFn,
    transform: Option<Arc<dyn ColorTransform>>,
}

impl FormatConverter {
    /// Select the pipeline for the given formats and color spaces.
    ///
    /// Fails when no transform exists between the color spaces.
    pub fn new(
        src_format: BitmapFormat,
        src_space: BitmapColorSpace,
        dst_format: BitmapFormat,
        dst_space: BitmapColorSpace,
    ) -> Result<Self> {
        let transform = transform_between(src_space, dst_space)?
            .map(|t| Arc::new(t) as Arc<dyn ColorTransform>);
        Ok(Self {
            src_pixel_bytes: src_format.bytes_per_pixel(),
            unpack: unpack_row_fn(src_format),
            pack: pack_row_fn(dst_format),
            transform,
        })
    }

    /// Replace the color transform with a caller-supplied one.
    pub fn with_transform(mut self, transform: Arc<dyn ColorTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Whether a color transform runs per pixel.
    pub fn transforms_color(&self) -> bool {
        self.transform.is_some()
    }

    /// Convert one row. `scratch` must hold at least eight floats per pixel.
    pub fn convert_row(&self, src: &[u8], dst: &mut [u8], scratch: &mut [f32]) -> Result<()> {
        let n = src.len() / self.src_pixel_bytes * 4;
        let (pixels, rest) = scratch.split_at_mut(n);
        (self.unpack)(src, pixels.as_rgba_mut());
        match &self.transform {
            Some(t) => {
                let out = &mut rest[..n];
                t.transform_row(pixels, out)?;
                (self.pack)(out.as_rgba(), dst);
            }
            None => (self.pack)(pixels.as_rgba(), dst),
        }
        Ok(())
    }

    /// Convert every row of `src` into `dst`, checking `stop` per row.
    ///
    /// The buffers must have equal dimensions. Converting a buffer into
    /// itself is a no-op.
    pub fn convert(
        &self,
        src: &BitmapBuffer,
        dst: &BitmapBuffer,
        stop: &(dyn Stop + Sync),
    ) -> Result<()> {
        if src.same_buffer(dst) {
            return Ok(());
        }
        let src_layout = src.layout();
        src_layout.check_dimensions(dst.width(), dst.height())?;
        if src_layout.width == 0 || src_layout.height == 0 {
            return Ok(());
        }

        let width = src_layout.width as usize;
        let (src_guard, mut dst_guard) = lock_pair(src, dst);
        let dst_layout = dst_guard.layout();
        let src_len = src_layout.pixel_row_bytes();
        let dst_len = dst_layout.pixel_row_bytes();

        dst_guard
            .bytes_mut()
            .par_chunks_mut(dst_layout.row_bytes)
            .zip(src_guard.bytes().par_chunks(src_layout.row_bytes))
            .try_for_each_init(
                || vec![0.0f32; width * 8],
                |scratch, (d, s)| {
                    stop.check().map_err(cancelled)?;
                    self.convert_row(&s[..src_len], &mut d[..dst_len], scratch)
                },
            )
    }
}

/// Convert `src` into `dst` using the pipeline their layouts select.
pub fn convert_bitmap(
    src: &BitmapBuffer,
    dst: &BitmapBuffer,
    stop: &(dyn Stop + Sync),
) -> Result<()> {
    FormatConverter::new(
        src.format(),
        src.color_space(),
        dst.format(),
        dst.color_space(),
    )?
    .convert(src, dst, stop)
}
