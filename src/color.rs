//! Color-space transforms between the spaces a bitmap can declare.
//!
//! Transforms work on rows of interleaved, normalized RGBA `f32`. Alpha
//! passes through and color channels come out clamped to `[0, 1]`.
//! [`transform_between`] builds a `moxcms` transform from the built-in
//! profiles, or returns `None` when the two spaces share one encoding.
//! Any other [`ColorTransform`] can be plugged into
//! [`FormatConverter`](crate::FormatConverter) instead.

use std::fmt;
use std::sync::Arc;

use moxcms::{
    ColorProfile, Layout, ToneReprCurve, TransformExecutor, TransformF32Executor, TransformOptions,
};
use whereat::at;

use crate::bitmap::BitmapColorSpace;
use crate::error::{RenderError, Result};

/// Color transform on a row of normalized RGBA.
pub trait ColorTransform: Send + Sync {
    /// Transform `src` into `dst`, four floats per pixel.
    ///
    /// Both slices have the same length.
    fn transform_row(&self, src: &[f32], dst: &mut [f32]) -> Result<()>;
}

/// ICC profile for a declared color space. `Device` maps to sRGB.
pub fn profile_for(space: BitmapColorSpace) -> ColorProfile {
    match space {
        BitmapColorSpace::Device | BitmapColorSpace::Srgb => ColorProfile::new_srgb(),
        BitmapColorSpace::LinearSrgb => {
            let mut profile = ColorProfile::new_srgb();
            let linear = ToneReprCurve::Parametric(vec![1.0]);
            profile.red_trc = Some(linear.clone());
            profile.green_trc = Some(linear.clone());
            profile.blue_trc = Some(linear);
            profile
        }
        BitmapColorSpace::DisplayP3 => ColorProfile::new_display_p3(),
        BitmapColorSpace::AdobeRgb => ColorProfile::new_adobe_rgb(),
    }
}

/// Profile-to-profile transform backed by `moxcms`.
#[derive(Clone)]
pub struct CmsTransform {
    from: BitmapColorSpace,
    to: BitmapColorSpace,
    executor: Arc<TransformF32Executor>,
}

impl CmsTransform {
    /// Build the transform between two profiles, RGBA on both sides.
    pub fn new(from: BitmapColorSpace, to: BitmapColorSpace) -> Result<Self> {
        let executor = profile_for(from)
            .create_transform_f32(
                Layout::Rgba,
                &profile_for(to),
                Layout::Rgba,
                TransformOptions::default(),
            )
            .map_err(|e| at(RenderError::Cms(e)))?;
        Ok(Self { from, to, executor })
    }

    pub fn from_space(&self) -> BitmapColorSpace {
        self.from
    }

    pub fn to_space(&self) -> BitmapColorSpace {
        self.to
    }
}

impl ColorTransform for CmsTransform {
    fn transform_row(&self, src: &[f32], dst: &mut [f32]) -> Result<()> {
        self.executor
            .transform(src, dst)
            .map_err(|e| at(RenderError::Cms(e)))?;
        // The f32 path runs in extended range.
        for px in dst.chunks_exact_mut(4) {
            for c in &mut px[..3] {
                *c = c.clamp(0.0, 1.0);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for CmsTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmsTransform")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}

/// Select the transform from `from` to `to`.
///
/// Returns `Ok(None)` when no work is needed. `Device` values are treated
/// as sRGB-encoded. Only `Srgb`, `LinearSrgb` and `Device` are accepted as
/// destinations (besides `from` itself).
pub fn transform_between(
    from: BitmapColorSpace,
    to: BitmapColorSpace,
) -> Result<Option<CmsTransform>> {
    use BitmapColorSpace as Cs;

    // Device and sRGB share one encoding.
    if from == to || matches!((from, to), (Cs::Device, Cs::Srgb) | (Cs::Srgb, Cs::Device)) {
        return Ok(None);
    }
    if !matches!(to, Cs::Srgb | Cs::LinearSrgb | Cs::Device) {
        return Err(at(RenderError::UnsupportedConversion { from, to }));
    }
    CmsTransform::new(from, to).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    // One 8-bit code; the f32 path is roughly 14-bit internally.
    const EPS: f32 = 1.0 / 255.0;

    fn run(t: &CmsTransform, rgb: [f32; 3]) -> [f32; 4] {
        let src = [rgb[0], rgb[1], rgb[2], 0.5];
        let mut dst = [0.0f32; 4];
        t.transform_row(&src, &mut dst).unwrap();
        dst
    }

    fn close(a: [f32; 4], b: [f32; 3]) -> bool {
        a[..3].iter().zip(b).all(|(x, y)| (x - y).abs() < EPS)
    }

    #[test]
    fn identity_when_equal() {
        for cs in [
            BitmapColorSpace::Device,
            BitmapColorSpace::Srgb,
            BitmapColorSpace::LinearSrgb,
            BitmapColorSpace::DisplayP3,
            BitmapColorSpace::AdobeRgb,
        ] {
            assert!(transform_between(cs, cs).unwrap().is_none());
        }
        assert!(
            transform_between(BitmapColorSpace::Device, BitmapColorSpace::Srgb)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn white_and_black_are_preserved() {
        for from in [BitmapColorSpace::DisplayP3, BitmapColorSpace::AdobeRgb] {
            let t = transform_between(from, BitmapColorSpace::Srgb)
                .unwrap()
                .unwrap();
            let white = run(&t, [1.0, 1.0, 1.0]);
            assert!(close(white, [1.0, 1.0, 1.0]), "{from:?} {white:?}");
            assert!(close(run(&t, [0.0, 0.0, 0.0]), [0.0, 0.0, 0.0]));
        }
    }

    #[test]
    fn alpha_passes_through() {
        let t = CmsTransform::new(BitmapColorSpace::DisplayP3, BitmapColorSpace::Srgb).unwrap();
        assert_eq!(run(&t, [0.3, 0.6, 0.9])[3], 0.5);
    }

    #[test]
    fn saturated_p3_red_clamps_into_range() {
        let t = transform_between(BitmapColorSpace::DisplayP3, BitmapColorSpace::Srgb)
            .unwrap()
            .unwrap();
        let out = run(&t, [1.0, 0.0, 0.0]);
        assert!(close(out, [1.0, 0.0, 0.0]), "{out:?}");
        for c in &out[..3] {
            assert!((0.0..=1.0).contains(c));
        }
    }

    #[test]
    fn linearize_to_linear_srgb() {
        let t = transform_between(BitmapColorSpace::Srgb, BitmapColorSpace::LinearSrgb)
            .unwrap()
            .unwrap();
        // ((0.5 + 0.055) / 1.055)^2.4
        let out = run(&t, [0.5, 0.5, 0.5]);
        assert!(close(out, [0.214_041, 0.214_041, 0.214_041]), "{out:?}");
    }

    #[test]
    fn unsupported_destination() {
        let err = transform_between(BitmapColorSpace::Srgb, BitmapColorSpace::AdobeRgb)
            .unwrap_err();
        assert!(matches!(
            err.error(),
            RenderError::UnsupportedConversion { .. }
        ));
    }

    #[test]
    fn debug_names_spaces() {
        let t = CmsTransform::new(BitmapColorSpace::AdobeRgb, BitmapColorSpace::Device).unwrap();
        assert_eq!(t.from_space(), BitmapColorSpace::AdobeRgb);
        assert!(format!("{t:?}").contains("AdobeRgb"));
    }
}
