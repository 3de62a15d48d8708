//! Data models for image-service
//!
//! An `Image` is the uploaded original; every concrete rendition of it at a
//! fixed (width, height, blur, brightness, encoding) lives in its own
//! `ImageVariant` row with a deterministic storage key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Long edge of the thumbnail bounding box, in pixels
pub const THUMBNAIL_BOX: u32 = 600;

/// Encoding kind of a stored variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingKind {
    Jpeg,
    Png,
    Webp,
    Avif,
    Jpegli,
}

impl EncodingKind {
    /// All optimized kinds a raster variant fans out to
    pub const OPTIMIZED: [EncodingKind; 3] =
        [EncodingKind::Avif, EncodingKind::Webp, EncodingKind::Jpegli];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Avif => "avif",
            Self::Jpegli => "jpegli",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "jpg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            "avif" => Some(Self::Avif),
            "jpegli" => Some(Self::Jpegli),
            _ => None,
        }
    }

    /// File extension used in the storage key
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Jpeg | Self::Jpegli => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Avif => "image/avif",
        }
    }

    /// Raster kinds are the lossless-pipeline sources other kinds derive from
    pub fn is_raster(&self) -> bool {
        matches!(self, Self::Jpeg | Self::Png)
    }
}

/// Requested kind filter from the URL path: `auto`, `original`, or an
/// explicit encoding kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindFilter {
    Auto,
    Original,
    Explicit(EncodingKind),
}

impl KindFilter {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(Self::Auto),
            "original" => Some(Self::Original),
            other => EncodingKind::from_str(other).map(Self::Explicit),
        }
    }

    /// Preference order used to pick among matching rows. First hit wins.
    pub fn preference_order(&self) -> &'static [EncodingKind] {
        match self {
            Self::Auto => &[
                EncodingKind::Avif,
                EncodingKind::Webp,
                EncodingKind::Jpegli,
                EncodingKind::Jpeg,
                EncodingKind::Png,
            ],
            Self::Original => &[EncodingKind::Jpeg, EncodingKind::Png],
            Self::Explicit(kind) => match kind {
                EncodingKind::Jpeg => &[EncodingKind::Jpeg],
                EncodingKind::Png => &[EncodingKind::Png],
                EncodingKind::Webp => &[EncodingKind::Webp],
                EncodingKind::Avif => &[EncodingKind::Avif],
                EncodingKind::Jpegli => &[EncodingKind::Jpegli],
            },
        }
    }
}

/// Uploaded original image
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Image {
    pub id: Uuid,
    pub creation_date: DateTime<Utc>,
    pub uploaded: bool,
    pub original_name: String,
    pub original_mime_type: String,
    /// MD5 of the normalized original; unique, defines upload dedup
    pub original_md5: String,
    pub width: i32,
    pub height: i32,
    /// Schema version, used for back-compatible behavior switches
    pub version: i32,
}

/// Schema version new uploads are written at
pub const CURRENT_IMAGE_VERSION: i32 = 3;

impl Image {
    /// Bounding box of [`THUMBNAIL_BOX`] px on the long edge, aspect preserved
    pub fn thumbnail_size(&self) -> (u32, u32) {
        let (w, h) = (self.width as i64, self.height as i64);
        if h > w {
            ((THUMBNAIL_BOX as i64 * w / h) as u32, THUMBNAIL_BOX)
        } else {
            (THUMBNAIL_BOX, (THUMBNAIL_BOX as i64 * h / w) as u32)
        }
    }

    /// Images from schema version 2 on carry the `available` flag, so lookups
    /// must filter on it. Version 1 rows predate the flag.
    pub fn requires_available_filter(&self) -> bool {
        self.version >= 2
    }

    /// (width, height) for a requested height, aspect preserved and clamped
    /// to the original size
    pub fn dims_for_height(&self, height: i32) -> (i32, i32) {
        if height >= self.height {
            (self.width, self.height)
        } else {
            (
                (height as i64 * self.width as i64 / self.height as i64) as i32,
                height,
            )
        }
    }

    /// (width, height) for a requested width, aspect preserved and clamped
    /// to the original size
    pub fn dims_for_width(&self, width: i32) -> (i32, i32) {
        if width >= self.width {
            (self.width, self.height)
        } else {
            (
                width,
                (width as i64 * self.height as i64 / self.width as i64) as i32,
            )
        }
    }
}

/// One concrete encoded rendition of an image
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ImageVariant {
    pub id: Uuid,
    pub image_id: Uuid,
    pub width: i32,
    pub height: i32,
    pub gaussian_blur: f64,
    pub brightness: f64,
    pub is_full_size: bool,
    pub is_primary_variant: bool,
    pub kind: String,
    pub available: bool,
    pub regenerate: bool,
}

impl ImageVariant {
    pub fn encoding_kind(&self) -> Option<EncodingKind> {
        EncodingKind::from_str(&self.kind)
    }

    /// Deterministic blob-store key: two-level hex prefix avoids a
    /// directory-listing hot spot and needs no lookup to compute.
    pub fn storage_key(&self) -> String {
        storage_key(self.id, &self.kind)
    }
}

/// `ab/cd/abcd....<ext>` from the variant id's simple hex form
pub fn storage_key(id: Uuid, extension: &str) -> String {
    let hex = id.simple().to_string();
    format!("{}/{}/{}.{}", &hex[..2], &hex[2..4], hex, extension)
}

/// API key backing the capability guards
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuthorizationKey {
    pub id: Uuid,
    pub name: String,
    pub can_upload_image: bool,
    pub can_upload_variant: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_key_uses_two_level_hex_prefix() {
        let id = Uuid::parse_str("a1b2c3d4-0000-4000-8000-000000000001").unwrap();
        let key = storage_key(id, "avif");
        assert_eq!(key, "a1/b2/a1b2c3d400004000800000000000000001.avif");
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [
            EncodingKind::Jpeg,
            EncodingKind::Png,
            EncodingKind::Webp,
            EncodingKind::Avif,
            EncodingKind::Jpegli,
        ] {
            assert_eq!(EncodingKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(EncodingKind::from_str("gif"), None);
    }

    #[test]
    fn jpegli_serves_as_jpeg() {
        assert_eq!(EncodingKind::Jpegli.content_type(), "image/jpeg");
        assert!(!EncodingKind::Jpegli.is_raster());
    }

    #[test]
    fn thumbnail_box_shrinks_long_edge() {
        let mut image = test_image(4000, 3000);
        assert_eq!(image.thumbnail_size(), (600, 450));

        image.width = 3000;
        image.height = 4000;
        assert_eq!(image.thumbnail_size(), (450, 600));

        image.width = 1000;
        image.height = 1000;
        assert_eq!(image.thumbnail_size(), (600, 600));
    }

    #[test]
    fn scaled_dimensions_clamp_to_original() {
        let image = test_image(1600, 1200);

        assert_eq!(image.dims_for_height(600), (800, 600));
        assert_eq!(image.dims_for_height(1200), (1600, 1200));
        assert_eq!(image.dims_for_height(5000), (1600, 1200));

        assert_eq!(image.dims_for_width(400), (400, 300));
        assert_eq!(image.dims_for_width(1600), (1600, 1200));
        assert_eq!(image.dims_for_width(9999), (1600, 1200));
    }

    #[test]
    fn kind_filter_parses_path_segment() {
        assert_eq!(KindFilter::parse("auto"), Some(KindFilter::Auto));
        assert_eq!(KindFilter::parse("original"), Some(KindFilter::Original));
        assert_eq!(
            KindFilter::parse("webp"),
            Some(KindFilter::Explicit(EncodingKind::Webp))
        );
        assert_eq!(KindFilter::parse("bmp"), None);
    }

    fn test_image(width: i32, height: i32) -> Image {
        Image {
            id: Uuid::new_v4(),
            creation_date: Utc::now(),
            uploaded: true,
            original_name: "test.jpg".into(),
            original_mime_type: "image/jpeg".into(),
            original_md5: "d41d8cd98f00b204e9800998ecf8427e".into(),
            width,
            height,
            version: CURRENT_IMAGE_VERSION,
        }
    }
}
