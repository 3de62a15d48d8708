//! Raster pipeline: upload normalization and on-demand variant rendering
//!
//! Rendering applies, in order: EXIF orientation normalization, gaussian
//! blur, brightness multiply, bounding-box shrink. The result encodes as PNG
//! when the pixels carry alpha, otherwise JPEG; a JPEG with the alpha
//! flattened is the fallback when either encoder rejects the image.
//!
//! CPU-heavy entry points have `_async` wrappers that run on the blocking
//! thread pool so the request executor is never stalled.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use rand::Rng;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::models::EncodingKind;

/// JPEG quality for on-demand rendered variants
const VARIANT_JPEG_QUALITY: u8 = 90;
/// JPEG quality when re-encoding a non-JPEG/PNG upload
const UPLOAD_JPEG_QUALITY: u8 = 95;

/// Target tuple for one rendered variant
#[derive(Debug, Clone, Copy)]
pub struct RenderSpec {
    pub width: u32,
    pub height: u32,
    pub gaussian_blur: f64,
    pub brightness: f64,
}

/// Output of [`render_variant`]
#[derive(Debug)]
pub struct Rendered {
    pub data: Bytes,
    pub kind: EncodingKind,
    pub width: u32,
    pub height: u32,
}

/// Render a raster variant from the primary variant's bytes.
///
/// The bounding box only shrinks: a source already inside (width, height) is
/// left at its own dimensions, never upscaled.
pub fn render_variant(original: &[u8], spec: &RenderSpec) -> Result<Rendered> {
    let (mut img, _icc) = decode_oriented(original)?;

    if spec.gaussian_blur > 0.0 {
        img = img.blur(spec.gaussian_blur as f32);
    }

    if spec.brightness != 1.0 {
        img = multiply_brightness(img, spec.brightness as f32);
    }

    if img.width() > spec.width || img.height() > spec.height {
        img = img.resize(
            spec.width.max(1),
            spec.height.max(1),
            image::imageops::FilterType::Lanczos3,
        );
    }

    let (width, height) = (img.width(), img.height());
    let (data, kind) = encode_raster(&img)?;

    debug!(
        width,
        height,
        kind = kind.as_str(),
        size = data.len(),
        "variant rendered"
    );

    Ok(Rendered {
        data,
        kind,
        width,
        height,
    })
}

pub async fn render_variant_async(original: Bytes, spec: RenderSpec) -> Result<Rendered> {
    tokio::task::spawn_blocking(move || render_variant(&original, &spec))
        .await
        .map_err(|e| AppError::Internal(format!("render task panicked: {e}")))?
}

/// An upload normalized to JPEG or PNG
#[derive(Debug)]
pub struct NormalizedUpload {
    pub data: Bytes,
    pub filename: String,
    pub kind: EncodingKind,
    pub content_type: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Normalize an upload: JPEG and PNG keep their bytes and name; anything else
/// is re-encoded as JPEG (quality 95, ICC profile carried over) under a
/// random filename.
pub fn normalize_upload(original_name: &str, data: &[u8]) -> Result<NormalizedUpload> {
    let format = image::guess_format(data)?;
    let (img, icc) = decode_plain(data)?;
    let (width, height) = (img.width(), img.height());

    match format {
        ImageFormat::Jpeg => Ok(NormalizedUpload {
            data: Bytes::copy_from_slice(data),
            filename: original_name.to_string(),
            kind: EncodingKind::Jpeg,
            content_type: "image/jpeg",
            width,
            height,
        }),
        ImageFormat::Png => Ok(NormalizedUpload {
            data: Bytes::copy_from_slice(data),
            filename: original_name.to_string(),
            kind: EncodingKind::Png,
            content_type: "image/png",
            width,
            height,
        }),
        _ => {
            let data = encode_jpeg(&img, UPLOAD_JPEG_QUALITY, icc)?;
            Ok(NormalizedUpload {
                data,
                filename: format!("{}.jpg", random_name(12)),
                kind: EncodingKind::Jpeg,
                content_type: "image/jpeg",
                width,
                height,
            })
        }
    }
}

pub async fn normalize_upload_async(original_name: String, data: Bytes) -> Result<NormalizedUpload> {
    tokio::task::spawn_blocking(move || normalize_upload(&original_name, &data))
        .await
        .map_err(|e| AppError::Internal(format!("normalize task panicked: {e}")))?
}

/// Decode and apply the EXIF orientation, returning the ICC profile as well
fn decode_oriented(data: &[u8]) -> Result<(DynamicImage, Option<Vec<u8>>)> {
    let mut decoder = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| AppError::Processing(e.to_string()))?
        .into_decoder()?;

    let orientation = decoder.orientation()?;
    let icc = decoder.icc_profile()?;
    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);

    Ok((img, icc))
}

/// Decode without orientation handling; uploads store the original as-is
fn decode_plain(data: &[u8]) -> Result<(DynamicImage, Option<Vec<u8>>)> {
    let mut decoder = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| AppError::Processing(e.to_string()))?
        .into_decoder()?;

    let icc = decoder.icc_profile()?;
    let img = DynamicImage::from_decoder(decoder)?;

    Ok((img, icc))
}

/// Per-channel brightness multiply, alpha untouched
fn multiply_brightness(img: DynamicImage, factor: f32) -> DynamicImage {
    let scale = |v: u8| ((v as f32 * factor).round().clamp(0.0, 255.0)) as u8;

    if img.color().has_alpha() {
        let mut buf = img.into_rgba8();
        for pixel in buf.pixels_mut() {
            for channel in 0..3 {
                pixel[channel] = scale(pixel[channel]);
            }
        }
        DynamicImage::ImageRgba8(buf)
    } else {
        let mut buf = img.into_rgb8();
        for pixel in buf.pixels_mut() {
            for channel in 0..3 {
                pixel[channel] = scale(pixel[channel]);
            }
        }
        DynamicImage::ImageRgb8(buf)
    }
}

/// PNG iff the image has alpha, else JPEG; flatten-to-RGB JPEG on failure
fn encode_raster(img: &DynamicImage) -> Result<(Bytes, EncodingKind)> {
    if img.color().has_alpha() {
        let mut buf = Vec::new();
        match img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png) {
            Ok(()) => return Ok((Bytes::from(buf), EncodingKind::Png)),
            Err(_) => return Ok((flatten_to_jpeg(img)?, EncodingKind::Jpeg)),
        }
    }

    match encode_jpeg(img, VARIANT_JPEG_QUALITY, None) {
        Ok(data) => Ok((data, EncodingKind::Jpeg)),
        Err(_) => Ok((flatten_to_jpeg(img)?, EncodingKind::Jpeg)),
    }
}

fn flatten_to_jpeg(img: &DynamicImage) -> Result<Bytes> {
    let flattened = DynamicImage::ImageRgb8(img.to_rgb8());
    encode_jpeg(&flattened, VARIANT_JPEG_QUALITY, None)
}

fn encode_jpeg(img: &DynamicImage, quality: u8, icc: Option<Vec<u8>>) -> Result<Bytes> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    if let Some(profile) = icc {
        // Best effort; the encoder only rejects absurdly large profiles
        let _ = image::ImageEncoder::set_icc_profile(&mut encoder, profile);
    }
    img.write_with_encoder(encoder)?;
    Ok(Bytes::from(buf))
}

fn random_name(len: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba, RgbImage, RgbaImage};

    fn opaque_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            Rgb([120, 130, 140]),
        ));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
            .unwrap();
        buf
    }

    fn transparent_png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([10, 20, 30, 128]),
        ));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn spec(width: u32, height: u32) -> RenderSpec {
        RenderSpec {
            width,
            height,
            gaussian_blur: 0.0,
            brightness: 1.0,
        }
    }

    #[test]
    fn shrinks_into_bounding_box_preserving_aspect() {
        let rendered = render_variant(&opaque_jpeg(100, 50), &spec(10, 10)).unwrap();
        assert_eq!((rendered.width, rendered.height), (10, 5));
    }

    #[test]
    fn never_upscales() {
        let rendered = render_variant(&opaque_jpeg(10, 10), &spec(100, 100)).unwrap();
        assert_eq!((rendered.width, rendered.height), (10, 10));
    }

    #[test]
    fn encodes_png_iff_alpha() {
        let with_alpha = render_variant(&transparent_png(20, 20), &spec(20, 20)).unwrap();
        assert_eq!(with_alpha.kind, EncodingKind::Png);
        assert_eq!(
            image::guess_format(&with_alpha.data).unwrap(),
            ImageFormat::Png
        );

        let opaque = render_variant(&opaque_jpeg(20, 20), &spec(20, 20)).unwrap();
        assert_eq!(opaque.kind, EncodingKind::Jpeg);
        assert_eq!(
            image::guess_format(&opaque.data).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn brightness_zero_blacks_out() {
        let mut s = spec(20, 20);
        s.brightness = 0.0;
        let rendered = render_variant(&opaque_jpeg(20, 20), &s).unwrap();

        let img = image::load_from_memory(&rendered.data).unwrap().into_rgb8();
        let pixel = img.get_pixel(5, 5);
        // JPEG artifacts allow a little slack around true black
        assert!(pixel[0] < 8 && pixel[1] < 8 && pixel[2] < 8);
    }

    #[test]
    fn jpeg_and_png_uploads_pass_through_unmodified() {
        let jpeg = opaque_jpeg(30, 20);
        let normalized = normalize_upload("cat.jpg", &jpeg).unwrap();
        assert_eq!(normalized.kind, EncodingKind::Jpeg);
        assert_eq!(normalized.filename, "cat.jpg");
        assert_eq!(&normalized.data[..], &jpeg[..]);
        assert_eq!((normalized.width, normalized.height), (30, 20));

        let png = transparent_png(30, 20);
        let normalized = normalize_upload("dog.png", &png).unwrap();
        assert_eq!(normalized.kind, EncodingKind::Png);
        assert_eq!(&normalized.data[..], &png[..]);
    }

    #[test]
    fn other_formats_reencode_to_jpeg_with_random_name() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([1, 2, 3])));
        let mut gif = Vec::new();
        img.write_to(&mut Cursor::new(&mut gif), ImageFormat::Gif)
            .unwrap();

        let normalized = normalize_upload("anim.gif", &gif).unwrap();
        assert_eq!(normalized.kind, EncodingKind::Jpeg);
        assert_eq!(normalized.content_type, "image/jpeg");
        assert!(normalized.filename.ends_with(".jpg"));
        assert_eq!(normalized.filename.len(), 12 + 4);
        assert_ne!(normalized.filename, "anim.gif");
        assert_eq!(
            image::guess_format(&normalized.data).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn bmp_and_tiff_uploads_reencode_to_jpeg() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 4, Rgb([9, 8, 7])));

        for format in [ImageFormat::Bmp, ImageFormat::Tiff] {
            let mut encoded = Vec::new();
            img.write_to(&mut Cursor::new(&mut encoded), format).unwrap();

            let normalized = normalize_upload("shot.raw", &encoded).unwrap();
            assert_eq!(normalized.kind, EncodingKind::Jpeg);
            assert_eq!(normalized.content_type, "image/jpeg");
            assert!(normalized.filename.ends_with(".jpg"));
            assert_eq!((normalized.width, normalized.height), (6, 4));
            assert_eq!(
                image::guess_format(&normalized.data).unwrap(),
                ImageFormat::Jpeg
            );
        }
    }

    #[test]
    fn garbage_input_is_a_processing_error() {
        assert!(render_variant(b"not an image", &spec(10, 10)).is_err());
        assert!(normalize_upload("x.bin", b"junk").is_err());
    }
}
