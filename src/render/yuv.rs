//! Planar YUV 4:2:0 decoding.
//!
//! Planes are read sequentially (Y, then U, then V), one scanline at a time,
//! and normalized to `f32` while reading. 1-byte planes hold 8-bit codes;
//! 2-byte planes hold `effective_bits` codes in the plane's byte order.
//! Output rows are then produced in parallel: chroma is upsampled to luma
//! resolution, converted to RGB and packed into the destination format.

use std::io::{Read, Seek, SeekFrom};

use log::trace;
use rayon::prelude::*;
use rgb::Rgba;
use whereat::at;

use super::{DecodeContext, ImageRenderer};
use crate::bitmap::BitmapWrite;
use crate::convert::pack_row_fn;
use crate::error::{RenderError, Result, cancelled, io_error};
use crate::format::{
    ChromaUpsampling, FormatCategory, ImageFormat, ImagePlaneOptions, ImageRenderingOptions,
    PlaneDescriptor, YuvRange,
};
use crate::sample::{SampleExtractor, max_value};
use crate::source::{ImageSource, SourceStream};

/// Decoder for the planar 4:2:0 family (`yuv420p`, `yuv420p10`, ...).
#[derive(Clone, Copy, Debug)]
pub struct PlanarYuv420Renderer {
    format: &'static ImageFormat,
}

impl PlanarYuv420Renderer {
    /// Renderer for `format`, which must be a three-plane YUV format.
    pub fn new(format: &'static ImageFormat) -> Self {
        debug_assert_eq!(format.category, FormatCategory::PlanarYuv);
        debug_assert_eq!(format.planes.len(), 3);
        Self { format }
    }

    /// 8-bit storage.
    pub fn yuv420p() -> Self {
        Self::new(&ImageFormat::YUV420P)
    }

    /// 10 effective bits in 16-bit storage.
    pub fn yuv420p10() -> Self {
        Self::new(&ImageFormat::YUV420P10)
    }

    /// 12 effective bits in 16-bit storage.
    pub fn yuv420p12() -> Self {
        Self::new(&ImageFormat::YUV420P12)
    }

    /// 16 bits per sample.
    pub fn yuv420p16() -> Self {
        Self::new(&ImageFormat::YUV420P16)
    }
}

impl ImageRenderer for PlanarYuv420Renderer {
    fn format(&self) -> &'static ImageFormat {
        self.format
    }

    /// Four pixels take six samples (4 Y, 1 U, 1 V).
    fn evaluate_pixel_count(&self, source: &dyn ImageSource) -> Result<u64> {
        let unit = self.format.planes[0].bytes_per_unit as u64;
        Ok(source.len()? / (6 * unit) * 4)
    }

    /// The last row of the last plane needs only its sample bytes, not a
    /// full stride.
    fn evaluate_source_data_size(
        &self,
        width: u32,
        height: u32,
        options: &ImageRenderingOptions,
        planes: &[ImagePlaneOptions],
    ) -> Result<u64> {
        let descriptors = self.format.planes;
        if planes.len() != descriptors.len() {
            return Err(at(RenderError::PlaneCountMismatch {
                expected: descriptors.len(),
                actual: planes.len(),
            }));
        }
        let mut total = options.data_offset;
        if width == 0 || height == 0 {
            return Ok(total);
        }
        let last = descriptors.len() - 1;
        for (i, (desc, opts)) in descriptors.iter().zip(planes).enumerate() {
            let rows = desc.plane_height(height) as u64;
            let stride = opts.row_bytes as u64;
            let bytes = if i == last {
                stride * (rows - 1) + desc.row_data_bytes(width) as u64
            } else {
                stride * rows
            };
            total = total.saturating_add(bytes);
        }
        Ok(total)
    }

    fn decode(
        &self,
        stream: &mut dyn SourceStream,
        dest: &mut BitmapWrite<'_>,
        ctx: &DecodeContext<'_>,
    ) -> Result<()> {
        let layout = dest.layout();
        let (width, height) = (layout.width, layout.height);
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.check_plane_options(width, ctx.planes)?;

        let last = self.format.planes.len() - 1;
        let mut read = Vec::with_capacity(3);
        for (i, (desc, opts)) in self.format.planes.iter().zip(ctx.planes).enumerate() {
            let plane = Plane::read(stream, desc, opts, i, width, height, i == last, ctx)?;
            read.push(plane);
        }
        let [luma, u, v] = <[Plane; 3]>::try_from(read).map_err(|_| {
            at(RenderError::PlaneCountMismatch {
                expected: 3,
                actual: ctx.planes.len(),
            })
        })?;

        let filter = ctx.options.chroma_upsampling;
        let chroma = self.format.planes[1];
        let cols = taps(width as usize, u.width, chroma.h_subsampling as usize, filter);
        let rows = taps(height as usize, u.height, chroma.v_subsampling as usize, filter);
        let matrix = Matrix::new(ctx.options);
        let pack = pack_row_fn(layout.format);
        let row_len = layout.pixel_row_bytes();
        let stop = ctx.stop;

        dest.bytes_mut()
            .par_chunks_mut(layout.row_bytes)
            .enumerate()
            .try_for_each_init(
                || vec![Rgba::new(0.0, 0.0, 0.0, 1.0); width as usize],
                |scratch, (y, out)| {
                    stop.check()?;
                    let ry = &rows[y];
                    let luma_row = luma.row(y);
                    for (x, px) in scratch.iter_mut().enumerate() {
                        let cx = &cols[x];
                        *px = matrix.apply(luma_row[x], u.sample(cx, ry), v.sample(cx, ry));
                    }
                    pack(scratch, &mut out[..row_len]);
                    Ok(())
                },
            )
            .map_err(cancelled)
    }
}

// ---------------------------------------------------------------------------
// Plane reading
// ---------------------------------------------------------------------------

/// One plane, normalized. Luma holds `Y'` in `[0, 1]`; chroma holds
/// `Cb`/`Cr` centered on zero, unless conversion is off.
struct Plane {
    width: usize,
    height: usize,
    samples: Vec<f32>,
}

impl Plane {
    #[allow(clippy::too_many_arguments)]
    fn read(
        stream: &mut dyn SourceStream,
        desc: &PlaneDescriptor,
        opts: &ImagePlaneOptions,
        index: usize,
        width: u32,
        height: u32,
        last: bool,
        ctx: &DecodeContext<'_>,
    ) -> Result<Self> {
        let pw = desc.plane_width(width) as usize;
        let ph = desc.plane_height(height) as usize;
        let data_len = desc.row_data_bytes(width);
        let pad = (opts.row_bytes - data_len) as i64;
        let bits = if desc.bytes_per_unit == 1 {
            8
        } else {
            opts.effective_bits
        };
        let extractor = if desc.bytes_per_unit == 2 {
            Some(SampleExtractor::new(bits, opts.byte_order)?)
        } else {
            None
        };
        let (scale, offset, gain) = normalization(bits, index == 0, ctx.options);

        trace!(
            "reading plane {} ({pw}x{ph}, {bits} bits, stride {})",
            desc.name, opts.row_bytes
        );

        let mut raw = vec![0u8; data_len];
        let mut wide = vec![0u16; pw];
        let mut samples = Vec::with_capacity(pw * ph);
        for y in 0..ph {
            ctx.stop.check().map_err(cancelled)?;
            stream.read_exact(&mut raw).map_err(io_error)?;
            match &extractor {
                None => samples.extend(
                    raw.iter()
                        .map(|&c| (c as f32 * scale - offset) * gain),
                ),
                Some(x) => {
                    x.extract_row_16bit(&raw, &mut wide);
                    samples.extend(wide.iter().map(|&c| (c as f32 * scale - offset) * gain));
                }
            }
            if pad > 0 && !(last && y + 1 == ph) {
                stream.seek(SeekFrom::Current(pad)).map_err(io_error)?;
            }
        }
        Ok(Self {
            width: pw,
            height: ph,
            samples,
        })
    }

    #[inline]
    fn row(&self, y: usize) -> &[f32] {
        &self.samples[y * self.width..(y + 1) * self.width]
    }

    #[inline]
    fn sample(&self, col: &Tap, row: &Tap) -> f32 {
        let get = |x: usize, y: usize| self.samples[y * self.width + x];
        let top = get(col.lo, row.lo) * (1.0 - col.t) + get(col.hi, row.lo) * col.t;
        let bottom = get(col.lo, row.hi) * (1.0 - col.t) + get(col.hi, row.hi) * col.t;
        top * (1.0 - row.t) + bottom * row.t
    }
}

/// `(scale, offset, gain)` so that `(code * scale - offset) * gain` is the
/// signal value of a `bits`-deep code.
fn normalization(bits: u8, luma: bool, options: &ImageRenderingOptions) -> (f32, f32, f32) {
    let max = max_value(bits) as f32;
    let scale = 1.0 / max;
    if !options.convert_yuv_to_rgb {
        return (scale, 0.0, 1.0);
    }
    let step = (1u32 << (bits - 8)) as f32;
    let mid = 128.0 * step * scale;
    match (luma, options.yuv_range) {
        (true, YuvRange::Full) => (scale, 0.0, 1.0),
        (false, YuvRange::Full) => (scale, mid, 1.0),
        (true, YuvRange::Limited) => (scale, 16.0 * step * scale, max / (219.0 * step)),
        (false, YuvRange::Limited) => (scale, mid, max / (224.0 * step)),
    }
}

// ---------------------------------------------------------------------------
// Upsampling and color
// ---------------------------------------------------------------------------

/// Two chroma indices and the weight of the second.
struct Tap {
    lo: usize,
    hi: usize,
    t: f32,
}

fn taps(len: usize, chroma_len: usize, factor: usize, filter: ChromaUpsampling) -> Vec<Tap> {
    let max = chroma_len.saturating_sub(1);
    (0..len)
        .map(|i| match filter {
            ChromaUpsampling::Nearest => {
                let c = (i / factor).min(max);
                Tap { lo: c, hi: c, t: 0.0 }
            }
            ChromaUpsampling::Bilinear => {
                // Chroma samples sit centered between their luma samples.
                let pos = ((i as f32 + 0.5) / factor as f32 - 0.5).clamp(0.0, max as f32);
                let lo = pos as usize;
                let hi = (lo + 1).min(max);
                Tap {
                    lo,
                    hi,
                    t: pos - lo as f32,
                }
            }
        })
        .collect()
}

#[derive(Clone, Copy)]
struct Matrix {
    convert: bool,
    kr: f32,
    kb: f32,
    kg: f32,
}

impl Matrix {
    fn new(options: &ImageRenderingOptions) -> Self {
        let (kr, kb) = options.yuv_matrix.coefficients();
        Self {
            convert: options.convert_yuv_to_rgb,
            kr,
            kb,
            kg: 1.0 - kr - kb,
        }
    }

    #[inline]
    fn apply(&self, y: f32, cb: f32, cr: f32) -> Rgba<f32> {
        if !self.convert {
            return Rgba::new(y, cb, cr, 1.0);
        }
        let r = y + 2.0 * (1.0 - self.kr) * cr;
        let b = y + 2.0 * (1.0 - self.kb) * cb;
        let g = (y - self.kr * r - self.kb * b) / self.kg;
        Rgba::new(r, g, b, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::{BitmapBuffer, BitmapColorSpace};
    use crate::format::YuvMatrix;
    use crate::sample::ByteOrder;
    use crate::source::MemorySource;
    use almost_enough::Stopper;
    use enough::{Stop, Unstoppable};

    fn planes_8bit(
        w: usize,
        h: usize,
        y: impl Fn(usize, usize) -> u8,
        u: u8,
        v: u8,
    ) -> Vec<u8> {
        let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
        let mut out = Vec::new();
        for row in 0..h {
            out.extend((0..w).map(|col| y(col, row)));
        }
        out.extend(std::iter::repeat_n(u, cw * ch));
        out.extend(std::iter::repeat_n(v, cw * ch));
        out
    }

    fn run(
        renderer: &PlanarYuv420Renderer,
        data: Vec<u8>,
        (w, h): (u32, u32),
        options: ImageRenderingOptions,
        planes: &[ImagePlaneOptions],
        stop: &(dyn Stop + Sync),
    ) -> Result<BitmapBuffer> {
        let buf = BitmapBuffer::new(w, h, renderer.format().output, BitmapColorSpace::Srgb)?;
        let source = MemorySource::from(data);
        let mut stream = source.open()?;
        let ctx = DecodeContext {
            options: &options,
            planes,
            stop,
        };
        renderer.decode(&mut *stream, &mut buf.write(), &ctx)?;
        Ok(buf)
    }

    #[test]
    fn neutral_chroma_is_gray() {
        let r = PlanarYuv420Renderer::yuv420p();
        let (w, h) = (6, 4);
        let data = planes_8bit(w, h, |x, y| (x * 40 + y * 3) as u8, 128, 128);
        let planes = r.create_default_plane_options(w as u32, h as u32);
        for filter in [ChromaUpsampling::Nearest, ChromaUpsampling::Bilinear] {
            let options = ImageRenderingOptions::default().with_chroma_upsampling(filter);
            let buf = run(&r, data.clone(), (w as u32, h as u32), options, &planes, &Unstoppable)
                .unwrap();
            let out = buf.read();
            for y in 0..h {
                for (x, px) in out.row(y as u32).chunks_exact(4).enumerate() {
                    let luma = (x * 40 + y * 3) as u8;
                    assert_eq!(px, &[luma, luma, luma, 255], "({x},{y}) {filter:?}");
                }
            }
        }
    }

    #[test]
    fn ten_bit_big_endian_neutral_is_gray() {
        let r = PlanarYuv420Renderer::yuv420p10();
        let (w, h) = (4u32, 2u32);
        let planes: Vec<_> = r
            .create_default_plane_options(w, h)
            .into_iter()
            .map(|p| p.with_byte_order(ByteOrder::BigEndian))
            .collect();
        let mut data = Vec::new();
        for _ in 0..w * h {
            data.extend_from_slice(&512u16.to_be_bytes());
        }
        for _ in 0..4 {
            // Neutral chroma with garbage above bit 10.
            data.extend_from_slice(&(0xFC00u16 | 512).to_be_bytes());
        }
        let buf = run(&r, data, (w, h), Default::default(), &planes, &Unstoppable).unwrap();
        let expected = 512.0f32 / 1023.0 * 65535.0;
        for px in buf.read().bytes().chunks_exact(8) {
            let ch = |i: usize| u16::from_ne_bytes([px[i], px[i + 1]]);
            assert_eq!(ch(0), ch(2));
            assert_eq!(ch(2), ch(4));
            assert!((ch(4) as f32 - expected).abs() <= 1.0, "{}", ch(4));
            assert_eq!(ch(6), u16::MAX);
        }
    }

    #[test]
    fn raw_planes_without_conversion() {
        let r = PlanarYuv420Renderer::yuv420p();
        let data = planes_8bit(2, 2, |_, _| 200, 50, 100);
        let options = ImageRenderingOptions::default().with_yuv_to_rgb(false);
        let planes = r.create_default_plane_options(2, 2);
        let buf = run(&r, data, (2, 2), options, &planes, &Unstoppable).unwrap();
        for px in buf.read().bytes().chunks_exact(4) {
            assert_eq!(px, &[100, 50, 200, 255]);
        }
    }

    #[test]
    fn bilinear_chroma_is_center_sited() {
        let r = PlanarYuv420Renderer::yuv420p();
        let (w, h) = (4u32, 4u32);
        let mut data = vec![100u8; 16];
        // U ramps left to right, V top to bottom.
        data.extend_from_slice(&[0, 200, 0, 200]);
        data.extend_from_slice(&[0, 0, 200, 200]);
        let options = ImageRenderingOptions::default()
            .with_yuv_to_rgb(false)
            .with_chroma_upsampling(ChromaUpsampling::Bilinear);
        let planes = r.create_default_plane_options(w, h);
        let buf = run(&r, data, (w, h), options, &planes, &Unstoppable).unwrap();
        let out = buf.read();
        // Edges clamp to the outer samples; inner pixels weigh 0.25 / 0.75.
        let ramp = [0u8, 50, 150, 200];
        for y in 0..h as usize {
            for (x, px) in out.row(y as u32).chunks_exact(4).enumerate() {
                assert_eq!(px, &[ramp[y], ramp[x], 100, 255], "({x},{y})");
            }
        }
    }

    #[test]
    fn limited_range_expands_to_full() {
        let r = PlanarYuv420Renderer::yuv420p();
        let data = planes_8bit(2, 2, |x, _| if x == 0 { 16 } else { 235 }, 128, 128);
        let options = ImageRenderingOptions::default()
            .with_yuv_range(YuvRange::Limited)
            .with_yuv_matrix(YuvMatrix::Bt709);
        let planes = r.create_default_plane_options(2, 2);
        let buf = run(&r, data, (2, 2), options, &planes, &Unstoppable).unwrap();
        let out = buf.read();
        assert_eq!(&out.row(0)[..4], &[0, 0, 0, 255]);
        assert_eq!(&out.row(0)[4..], &[255, 255, 255, 255]);
    }

    #[test]
    fn saturated_red() {
        // BT.601 full-range red: Y=76, Cb=85, Cr=255.
        let r = PlanarYuv420Renderer::yuv420p();
        let data = planes_8bit(2, 2, |_, _| 76, 85, 255);
        let planes = r.create_default_plane_options(2, 2);
        let buf = run(&r, data, (2, 2), Default::default(), &planes, &Unstoppable).unwrap();
        for px in buf.read().bytes().chunks_exact(4) {
            assert!(px[2] >= 250, "{px:?}");
            assert!(px[1] <= 3, "{px:?}");
            assert!(px[0] <= 3, "{px:?}");
        }
    }

    #[test]
    fn padded_strides_and_odd_size() {
        let r = PlanarYuv420Renderer::yuv420p();
        let (w, h) = (3u32, 3u32);
        let planes = [
            ImagePlaneOptions::new(4),
            ImagePlaneOptions::new(3),
            ImagePlaneOptions::new(3),
        ];
        let options = ImageRenderingOptions::default();
        // Y: 4 * 3, U: 3 * 2, V: 3 * 1 + 2.
        assert_eq!(
            r.evaluate_source_data_size(w, h, &options, &planes).unwrap(),
            12 + 6 + 5
        );
        assert_eq!(
            r.evaluate_source_data_size(w, h, &options.with_data_offset(10), &planes)
                .unwrap(),
            33
        );

        let mut data = Vec::new();
        for y in 0..3u8 {
            data.extend_from_slice(&[10 * (y + 1), 10 * (y + 1), 10 * (y + 1), 0xEE]);
        }
        data.extend_from_slice(&[128, 128, 0xEE, 128, 128, 0xEE]);
        data.extend_from_slice(&[128, 128, 0xEE, 128, 128]);
        let buf = run(&r, data, (w, h), options, &planes, &Unstoppable).unwrap();
        let out = buf.read();
        for y in 0..3u32 {
            let v = 10 * (y as u8 + 1);
            assert!(out.row(y).chunks_exact(4).all(|px| px == [v, v, v, 255]));
        }
    }

    #[test]
    fn pixel_count_estimate() {
        let source = MemorySource::from(vec![0u8; 600]);
        assert_eq!(
            PlanarYuv420Renderer::yuv420p()
                .evaluate_pixel_count(&source)
                .unwrap(),
            400
        );
        assert_eq!(
            PlanarYuv420Renderer::yuv420p16()
                .evaluate_pixel_count(&source)
                .unwrap(),
            200
        );
    }

    #[test]
    fn default_plane_options() {
        let r = PlanarYuv420Renderer::yuv420p12();
        let planes = r.create_default_plane_options(5, 3);
        assert_eq!(planes.len(), 3);
        assert_eq!(planes[0].row_bytes, 10);
        assert_eq!(planes[1].row_bytes, 6);
        assert!(planes.iter().all(|p| p.effective_bits == 12));
        assert!(planes.iter().all(|p| p.byte_order == ByteOrder::LittleEndian));
        r.check_plane_options(5, &planes).unwrap();
    }

    #[test]
    fn plane_option_validation() {
        let r = PlanarYuv420Renderer::yuv420p10();
        let good = r.create_default_plane_options(4, 4);

        let err = r.check_plane_options(4, &good[..2]).unwrap_err();
        assert!(matches!(err.error(), RenderError::PlaneCountMismatch { expected: 3, actual: 2 }));

        let mut bad_bits = good.clone();
        bad_bits[2].effective_bits = 8;
        let err = r.check_plane_options(4, &bad_bits).unwrap_err();
        assert!(matches!(err.error(), RenderError::InvalidBitDepth { bits: 8, .. }));

        let mut bad_stride = good.clone();
        bad_stride[0].row_bytes = 7;
        let err = r.check_plane_options(4, &bad_stride).unwrap_err();
        assert!(matches!(err.error(), RenderError::InvalidStride { plane: 0, .. }));

        let eight = PlanarYuv420Renderer::yuv420p();
        let mut wide_bits = eight.create_default_plane_options(4, 4);
        wide_bits[1].effective_bits = 10;
        assert!(eight.check_plane_options(4, &wide_bits).is_err());
    }

    #[test]
    fn stop_is_checked_per_row() {
        let r = PlanarYuv420Renderer::yuv420p();
        let data = planes_8bit(4, 4, |_, _| 1, 128, 128);
        let planes = r.create_default_plane_options(4, 4);
        let stop = Stopper::new();
        stop.cancel();
        let err = run(&r, data, (4, 4), Default::default(), &planes, &stop).unwrap_err();
        assert!(matches!(err.error(), RenderError::Cancelled(_)));
    }
}
