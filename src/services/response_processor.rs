// src/services/response_processor.rs
use crate::errors::PortraitError;
use crate::models::{
    Dimensions, GenerationResult, ProcessedResponse, QualityTier, ResponseMetadata, SizeClass,
};
use crate::services::image_validator::{
    MAX_ASPECT_RATIO, MIN_ASPECT_RATIO, mime_for_format, strip_data_url,
};
use base64::{Engine as _, engine::general_purpose};

const SQUARE_TOLERANCE: f64 = 0.1;

/// Timing and pricing facts about the call that produced a result.
#[derive(Debug, Clone)]
pub struct GenerationMetrics {
    pub model: String,
    pub size_class: SizeClass,
    pub duration_ms: u64,
    pub cost: f64,
}

impl GenerationMetrics {
    pub fn from_result(result: &GenerationResult, size_class: SizeClass) -> Self {
        Self {
            model: result.model.clone(),
            size_class,
            duration_ms: result.duration_ms,
            cost: result.cost,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationOptions {
    pub max_size_bytes: usize,
    pub min_width: u32,
    pub min_height: u32,
    pub allowed_formats: Vec<&'static str>,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            max_size_bytes: 10 * 1024 * 1024,
            min_width: 512,
            min_height: 512,
            allowed_formats: vec!["image/jpeg", "image/png", "image/webp"],
        }
    }
}

impl ValidationOptions {
    pub fn for_size_class(size_class: SizeClass) -> Self {
        match size_class {
            SizeClass::Preview => Self {
                max_size_bytes: 5 * 1024 * 1024,
                ..Self::default()
            },
            SizeClass::Full => Self::default(),
        }
    }
}

pub fn quality_score(dimensions: Option<Dimensions>, duration_ms: u64, size_class: SizeClass) -> u32 {
    let resolution_points = match dimensions.map(|d| d.shorter_side()) {
        Some(side) if side >= 2048 => 3,
        Some(side) if side >= 1024 => 2,
        Some(side) if side >= 512 => 1,
        _ => 0,
    };

    let speed_points = if duration_ms < 5_000 {
        2
    } else if duration_ms < 15_000 {
        1
    } else {
        0
    };

    let size_points = match size_class {
        SizeClass::Full => 2,
        SizeClass::Preview => 1,
    };

    resolution_points + speed_points + size_points
}

pub fn quality_tier(dimensions: Option<Dimensions>, duration_ms: u64, size_class: SizeClass) -> QualityTier {
    match quality_score(dimensions, duration_ms, size_class) {
        score if score >= 6 => QualityTier::High,
        score if score >= 3 => QualityTier::Medium,
        _ => QualityTier::Low,
    }
}

pub fn process_response(
    result: &GenerationResult,
    metrics: &GenerationMetrics,
    options: &ValidationOptions,
) -> Result<ProcessedResponse, PortraitError> {
    if !result.success {
        let message = result
            .error
            .clone()
            .unwrap_or_else(|| "Generation failed".to_string());
        return Err(PortraitError::provider(message));
    }

    let encoded = result
        .image_data
        .as_deref()
        .map(strip_data_url)
        .filter(|data| !data.is_empty())
        .ok_or_else(|| PortraitError::Processing("No image data in generation result".to_string()))?;

    let bytes = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| PortraitError::Processing(format!("Invalid base64 image data: {}", e)))?;

    if bytes.len() > options.max_size_bytes {
        return Err(PortraitError::Processing(format!(
            "Generated image is {} bytes, above the {} byte limit",
            bytes.len(),
            options.max_size_bytes
        )));
    }

    let format = image::guess_format(&bytes)
        .map_err(|e| PortraitError::Processing(format!("Unrecognized image format: {}", e)))?;
    let mime_type = mime_for_format(format)
        .filter(|mime| options.allowed_formats.contains(mime))
        .ok_or_else(|| {
            PortraitError::Processing(format!("Generated image format {:?} is not allowed", format))
        })?;

    // Full decode: header reads alone accept truncated payloads.
    let decoded = image::load_from_memory_with_format(&bytes, format)
        .map_err(|e| PortraitError::Processing(format!("Generated image could not be decoded: {}", e)))?;
    let dimensions = Dimensions::new(decoded.width(), decoded.height());

    if dimensions.width < options.min_width || dimensions.height < options.min_height {
        return Err(PortraitError::Processing(format!(
            "Generated image {}x{} is below the {}x{} minimum",
            dimensions.width, dimensions.height, options.min_width, options.min_height
        )));
    }

    let mut warnings = Vec::new();
    let ratio = dimensions.aspect_ratio();
    if ratio < MIN_ASPECT_RATIO || ratio > MAX_ASPECT_RATIO {
        warnings.push(format!("Generated image has an unusual aspect ratio of {:.2}", ratio));
    }
    if (ratio - 1.0).abs() > SQUARE_TOLERANCE {
        warnings.push(format!(
            "Generated image is not square ({}x{})",
            dimensions.width, dimensions.height
        ));
    }

    let quality = quality_tier(Some(dimensions), metrics.duration_ms, metrics.size_class);

    log::debug!(
        "Processed {} result: {}x{} {} in {}ms, quality {:?}",
        metrics.size_class.as_str(),
        dimensions.width,
        dimensions.height,
        mime_type,
        metrics.duration_ms,
        quality
    );

    Ok(ProcessedResponse {
        image_data: encoded.to_string(),
        image: decoded,
        metadata: ResponseMetadata {
            id: uuid::Uuid::new_v4(),
            model: metrics.model.clone(),
            generation_time: metrics.duration_ms,
            cost: metrics.cost,
            size: metrics.size_class,
            quality,
            dimensions: Some(dimensions),
            format: mime_type.trim_start_matches("image/").to_string(),
            timestamp: chrono::Utc::now(),
        },
        warnings,
    })
}
