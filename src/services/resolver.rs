//! Variant resolver: content negotiation and on-demand generation
//!
//! Given an image, a (width, height, blur, brightness) tuple and a kind
//! filter, either redirects to the best stored rendition or synchronously
//! renders a new raster variant and fans out its optimized derivatives.

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::db::variant_repo;
use crate::error::{AppError, Result};
use crate::models::{EncodingKind, Image, ImageVariant, KindFilter};
use crate::queue::Broker;
use crate::services::processor::{self, RenderSpec};
use crate::services::variants;
use crate::storage::ObjectStore;

/// One resolved read request
#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest {
    pub width: i32,
    pub height: i32,
    pub gaussian_blur: f64,
    pub brightness: f64,
    pub filter: KindFilter,
}

/// Outcome of resolution
#[derive(Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Redirect to this stored object URL
    Redirect(String),
    /// No variant can serve the request and none will be generated
    NotAvailable,
}

pub struct Resolver<'a> {
    pub pool: &'a PgPool,
    pub store: &'a dyn ObjectStore,
    pub broker: &'a Broker,
    /// Base URL prepended to storage keys in redirects
    pub public_base: &'a str,
}

impl Resolver<'_> {
    pub async fn resolve(
        &self,
        image: &Image,
        request: ResolveRequest,
        accept: &str,
    ) -> Result<Resolution> {
        let candidates = variant_repo::find_by_dimensions(
            self.pool,
            image.id,
            request.width,
            request.height,
            request.gaussian_blur,
            request.brightness,
            image.requires_available_filter(),
        )
        .await?;

        if candidates.is_empty() {
            return match request.filter {
                // Explicit kinds are never generated on demand
                KindFilter::Explicit(_) => Ok(Resolution::NotAvailable),
                KindFilter::Auto | KindFilter::Original => self.generate(image, request).await,
            };
        }

        match select_preferred(request.filter, accept, &candidates) {
            Some(variant) => Ok(Resolution::Redirect(self.object_url(&variant.storage_key()))),
            None => Ok(Resolution::NotAvailable),
        }
    }

    /// Synchronously render a raster variant for an unmet tuple, store it,
    /// record it available, and enqueue its optimized derivatives.
    async fn generate(&self, image: &Image, request: ResolveRequest) -> Result<Resolution> {
        let source = variant_repo::find_full_size_raster(self.pool, image.id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("image {} has no full-size raster variant", image.id))
            })?;

        let original = self.store.download(&source.storage_key()).await?;

        let rendered = processor::render_variant_async(
            original,
            RenderSpec {
                width: request.width.max(0) as u32,
                height: request.height.max(0) as u32,
                gaussian_blur: request.gaussian_blur,
                brightness: request.brightness,
            },
        )
        .await?;

        let variant = ImageVariant {
            id: Uuid::new_v4(),
            image_id: image.id,
            width: request.width,
            height: request.height,
            gaussian_blur: request.gaussian_blur,
            brightness: request.brightness,
            is_full_size: false,
            is_primary_variant: false,
            kind: rendered.kind.as_str().to_string(),
            available: true,
            regenerate: false,
        };

        self.store
            .upload(
                &variant.storage_key(),
                rendered.data.clone(),
                rendered.kind.content_type(),
            )
            .await?;

        variant_repo::insert(self.pool, &variant).await?;

        variants::fan_out_optimized(self.pool, self.broker, &variant, &rendered.data).await?;

        info!(
            image_id = %image.id,
            variant_id = %variant.id,
            width = variant.width,
            height = variant.height,
            "variant generated on demand"
        );

        Ok(Resolution::Redirect(self.object_url(&variant.storage_key())))
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }
}

/// Pick the best candidate by the filter's fixed preference order. In `auto`
/// mode, avif and webp are skipped unless the Accept header declares their
/// media type.
pub fn select_preferred<'a>(
    filter: KindFilter,
    accept: &str,
    candidates: &'a [ImageVariant],
) -> Option<&'a ImageVariant> {
    for kind in filter.preference_order() {
        if filter == KindFilter::Auto {
            match kind {
                EncodingKind::Avif if !accept.contains("image/avif") => continue,
                EncodingKind::Webp if !accept.contains("image/webp") => continue,
                _ => {}
            }
        }

        if let Some(variant) = candidates.iter().find(|v| v.kind == kind.as_str()) {
            return Some(variant);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(kind: &str, available: bool) -> ImageVariant {
        ImageVariant {
            id: Uuid::new_v4(),
            image_id: Uuid::new_v4(),
            width: 100,
            height: 100,
            gaussian_blur: 0.0,
            brightness: 1.0,
            is_full_size: false,
            is_primary_variant: false,
            kind: kind.to_string(),
            available,
            regenerate: false,
        }
    }

    #[test]
    fn auto_prefers_avif_when_accepted() {
        let candidates = vec![variant("jpg", true), variant("webp", true), variant("avif", true)];
        let picked = select_preferred(KindFilter::Auto, "image/avif,image/webp,*/*", &candidates);
        assert_eq!(picked.unwrap().kind, "avif");
    }

    #[test]
    fn auto_skips_undeclared_modern_kinds() {
        // avif, webp and jpg all exist; the client only declares webp
        let candidates = vec![variant("avif", true), variant("webp", true), variant("jpg", true)];
        let picked = select_preferred(KindFilter::Auto, "image/webp,*/*", &candidates);
        assert_eq!(picked.unwrap().kind, "webp");
    }

    #[test]
    fn auto_falls_back_to_raster_without_accept() {
        let candidates = vec![variant("avif", true), variant("webp", true), variant("jpg", true)];
        let picked = select_preferred(KindFilter::Auto, "", &candidates);
        assert_eq!(picked.unwrap().kind, "jpg");
    }

    #[test]
    fn original_ignores_optimized_kinds() {
        let candidates = vec![variant("avif", true), variant("png", true)];
        let picked = select_preferred(KindFilter::Original, "image/avif", &candidates);
        assert_eq!(picked.unwrap().kind, "png");
    }

    #[test]
    fn explicit_kind_needs_no_accept_declaration() {
        let candidates = vec![variant("avif", true), variant("jpg", true)];
        let picked = select_preferred(
            KindFilter::Explicit(EncodingKind::Avif),
            "",
            &candidates,
        );
        assert_eq!(picked.unwrap().kind, "avif");
    }

    #[test]
    fn no_candidate_of_requested_kind_yields_none() {
        let candidates = vec![variant("jpg", true)];
        assert!(select_preferred(KindFilter::Explicit(EncodingKind::Webp), "", &candidates)
            .is_none());
    }

    #[test]
    fn jpegli_ranks_between_webp_and_jpeg() {
        let candidates = vec![variant("jpegli", true), variant("jpg", true)];
        let picked = select_preferred(KindFilter::Auto, "", &candidates);
        assert_eq!(picked.unwrap().kind, "jpegli");
    }
}
