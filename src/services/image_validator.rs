// src/services/image_validator.rs
use crate::errors::PortraitError;
use crate::models::{Dimensions, ImageUpload, SizeClass, SourceImage};
use base64::{Engine as _, engine::general_purpose};
use image::ImageFormat as ImgFormat;
use std::io::Cursor;

pub const MIN_PREVIEW_DIMENSION: u32 = 512;
pub const FULL_SIZE_THRESHOLD: u32 = 2048;
pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;
pub const MIN_ASPECT_RATIO: f64 = 0.5;
pub const MAX_ASPECT_RATIO: f64 = 2.0;

#[derive(Debug, Clone, Default)]
pub struct ImageValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Strips an optional `data:<mime>;base64,` prefix.
pub fn strip_data_url(data: &str) -> &str {
    let trimmed = data.trim();
    if trimmed.starts_with("data:") {
        if let Some(idx) = trimmed.find(";base64,") {
            return &trimmed[idx + ";base64,".len()..];
        }
    }
    trimmed
}

pub fn mime_for_format(format: ImgFormat) -> Option<&'static str> {
    match format {
        ImgFormat::Jpeg => Some("image/jpeg"),
        ImgFormat::Png => Some("image/png"),
        ImgFormat::WebP => Some("image/webp"),
        _ => None,
    }
}

/// Reads format and pixel dimensions without a full decode.
pub fn probe_image(bytes: &[u8]) -> Result<(ImgFormat, Dimensions), PortraitError> {
    let reader = image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PortraitError::Processing(format!("Failed to read image: {}", e)))?;

    let format = reader
        .format()
        .ok_or_else(|| PortraitError::Processing("Unrecognized image format".to_string()))?;

    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| PortraitError::Processing(format!("Failed to read dimensions: {}", e)))?;

    Ok((format, Dimensions::new(width, height)))
}

/// Turns the client's upload into owned bytes with server-measured dimensions.
pub fn decode_upload(upload: &ImageUpload) -> Result<SourceImage, PortraitError> {
    let encoded = upload
        .base64_data
        .as_deref()
        .map(strip_data_url)
        .filter(|data| !data.is_empty())
        .ok_or_else(|| PortraitError::Validation("Image data is required".to_string()))?;

    let bytes = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| PortraitError::Validation("Image data is not valid base64".to_string()))?;

    let (format, dimensions) = probe_image(&bytes).map_err(|e| {
        log::warn!("Rejected undecodable upload: {}", e);
        PortraitError::Validation("Image could not be decoded".to_string())
    })?;

    let mime_type = mime_for_format(format).ok_or_else(|| {
        PortraitError::Validation("Image must be JPEG, PNG or WebP".to_string())
    })?;

    if let Some(declared) = upload.dimensions {
        if declared != dimensions {
            log::debug!(
                "Declared dimensions {}x{} differ from decoded {}x{}",
                declared.width,
                declared.height,
                dimensions.width,
                dimensions.height
            );
        }
    }

    Ok(SourceImage {
        bytes,
        base64: Some(encoded.to_string()),
        mime_type: mime_type.to_string(),
        dimensions,
    })
}

pub fn validate_image_for_ai(image: &SourceImage, declared_size: Option<u64>) -> ImageValidation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let Dimensions { width, height } = image.dimensions;

    if width < MIN_PREVIEW_DIMENSION {
        errors.push(format!(
            "Image width {}px is below the minimum of {}px",
            width, MIN_PREVIEW_DIMENSION
        ));
    }
    if height < MIN_PREVIEW_DIMENSION {
        errors.push(format!(
            "Image height {}px is below the minimum of {}px",
            height, MIN_PREVIEW_DIMENSION
        ));
    }

    let size = declared_size.unwrap_or(0).max(image.bytes.len() as u64);
    if size > MAX_IMAGE_BYTES {
        errors.push(format!(
            "Image size {:.1}MB exceeds the maximum of {}MB",
            size as f64 / (1024.0 * 1024.0),
            MAX_IMAGE_BYTES / (1024 * 1024)
        ));
    }

    let ratio = image.dimensions.aspect_ratio();
    if ratio < MIN_ASPECT_RATIO || ratio > MAX_ASPECT_RATIO {
        warnings.push(format!(
            "Unusual aspect ratio {:.2}; portraits work best close to square",
            ratio
        ));
    }

    if image.dimensions.shorter_side() < FULL_SIZE_THRESHOLD {
        warnings.push(format!(
            "Image is below {}px on its shorter side; full-resolution quality may suffer",
            FULL_SIZE_THRESHOLD
        ));
    }

    ImageValidation {
        is_valid: errors.is_empty(),
        errors,
        warnings,
    }
}

pub fn optimal_generation_size(dimensions: Dimensions) -> SizeClass {
    if dimensions.shorter_side() >= FULL_SIZE_THRESHOLD {
        SizeClass::Full
    } else {
        SizeClass::Preview
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgba, RgbaImage};

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        });
        let mut output = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut output), ImageOutputFormat::Png)
            .unwrap();
        output
    }

    fn source(width: u32, height: u32) -> SourceImage {
        SourceImage {
            bytes: png_bytes(width, height),
            base64: None,
            mime_type: "image/png".to_string(),
            dimensions: Dimensions::new(width, height),
        }
    }

    #[test]
    fn small_images_fail_naming_the_dimension() {
        let result = validate_image_for_ai(&source(256, 600), None);
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.contains("width")));
        assert!(!result.errors.iter().any(|e| e.contains("height")));
    }

    #[test]
    fn oversized_payloads_fail_regardless_of_dimensions() {
        let result = validate_image_for_ai(&source(1024, 1024), Some(MAX_IMAGE_BYTES + 1));
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.contains("size")));
    }

    #[test]
    fn odd_ratio_and_low_resolution_only_warn() {
        let result = validate_image_for_ai(&source(512, 1200), None);
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn optimal_size_follows_shorter_side() {
        assert_eq!(optimal_generation_size(Dimensions::new(4000, 2048)), SizeClass::Full);
        assert_eq!(optimal_generation_size(Dimensions::new(4000, 2047)), SizeClass::Preview);
    }

    #[test]
    fn decode_upload_measures_real_dimensions() {
        let upload = ImageUpload {
            dimensions: Some(Dimensions::new(2000, 2000)),
            base64_data: Some(format!(
                "data:image/png;base64,{}",
                general_purpose::STANDARD.encode(png_bytes(640, 480))
            )),
            ..Default::default()
        };
        let image = decode_upload(&upload).unwrap();
        assert_eq!(image.dimensions, Dimensions::new(640, 480));
        assert_eq!(image.mime_type, "image/png");
    }

    #[test]
    fn decode_upload_rejects_garbage() {
        let upload = ImageUpload {
            base64_data: Some("%%%not-base64".to_string()),
            ..Default::default()
        };
        assert!(matches!(decode_upload(&upload), Err(PortraitError::Validation(_))));
    }
}
