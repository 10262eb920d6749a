//! Lookup of renderers by image format id.
//!
//! [`RendererRegistry::global`] holds the built-in renderers. Custom
//! registries can add or replace entries before a lookup.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use whereat::at;

use super::{CodecRenderer, ImageRenderer, PlanarYuv420Renderer};
use crate::error::{RenderError, Result};
use crate::format::ImageFormat;

/// Builds a renderer.
pub type RendererCtor = fn() -> Arc<dyn ImageRenderer>;

/// Format id → renderer constructor.
#[derive(Clone, Debug, Default)]
pub struct RendererRegistry {
    entries: BTreeMap<&'static str, (&'static ImageFormat, RendererCtor)>,
}

impl RendererRegistry {
    /// Registry with nothing in it.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding every built-in renderer.
    pub fn builtin() -> Self {
        let mut r = Self::empty();
        r.register(&ImageFormat::YUV420P, || Arc::new(PlanarYuv420Renderer::yuv420p()));
        r.register(&ImageFormat::YUV420P10, || {
            Arc::new(PlanarYuv420Renderer::yuv420p10())
        });
        r.register(&ImageFormat::YUV420P12, || {
            Arc::new(PlanarYuv420Renderer::yuv420p12())
        });
        r.register(&ImageFormat::YUV420P16, || {
            Arc::new(PlanarYuv420Renderer::yuv420p16())
        });
        r.register(&ImageFormat::CODEC, || Arc::new(CodecRenderer::new()));
        r.register(&ImageFormat::CODEC16, || Arc::new(CodecRenderer::wide()));
        r
    }

    /// Process-wide built-in registry, constructed on first use.
    pub fn global() -> &'static RendererRegistry {
        static GLOBAL: OnceLock<RendererRegistry> = OnceLock::new();
        GLOBAL.get_or_init(Self::builtin)
    }

    /// Add or replace the constructor for `format.id`.
    pub fn register(&mut self, format: &'static ImageFormat, ctor: RendererCtor) {
        self.entries.insert(format.id, (format, ctor));
    }

    /// Build the renderer for `id`.
    pub fn create(&self, id: &str) -> Result<Arc<dyn ImageRenderer>> {
        self.entries
            .get(id)
            .map(|(_, ctor)| ctor())
            .ok_or_else(|| at(RenderError::UnknownRenderer(id.to_owned())))
    }

    /// Descriptor registered for `id`.
    pub fn format(&self, id: &str) -> Option<&'static ImageFormat> {
        self.entries.get(id).map(|(f, _)| *f)
    }

    /// Registered descriptors, ordered by id.
    pub fn formats(&self) -> impl Iterator<Item = &'static ImageFormat> + '_ {
        self.entries.values().map(|(f, _)| *f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatCategory;

    #[test]
    fn builtin_ids_resolve() {
        let reg = RendererRegistry::global();
        for id in ["yuv420p", "yuv420p10", "yuv420p12", "yuv420p16", "codec", "codec16"] {
            let r = reg.create(id).unwrap();
            assert_eq!(r.format().id, id);
            assert_eq!(reg.format(id).unwrap().id, id);
        }
        assert_eq!(reg.formats().count(), 6);
        assert!(
            reg.formats()
                .filter(|f| f.category == FormatCategory::PlanarYuv)
                .all(|f| f.plane_count() == 3)
        );
    }

    #[test]
    fn unknown_id() {
        let Err(err) = RendererRegistry::global().create("nv12") else {
            panic!("nv12 should not resolve");
        };
        assert!(matches!(err.error(), RenderError::UnknownRenderer(id) if id == "nv12"));
        assert!(err.error().is_contract_violation());
    }

    #[test]
    fn custom_registration_replaces() {
        let mut reg = RendererRegistry::empty();
        assert!(reg.create("codec").is_err());
        reg.register(&ImageFormat::CODEC, || Arc::new(CodecRenderer::wide()));
        assert_eq!(reg.create("codec").unwrap().format().id, "codec16");
    }
}
