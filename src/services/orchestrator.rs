// src/services/orchestrator.rs
use crate::errors::PortraitError;
use crate::models::{
    DeliverableImage, GenerationRequest, ImageUpload, ProcessedResponse, RawCustomizationOptions,
    ResponseMetadata, SizeClass, UseCase,
};
use crate::services::generation_client::GenerationClient;
use crate::services::image_validator::{
    decode_upload, optimal_generation_size, validate_image_for_ai,
};
use crate::services::prompt_builder::validate_context;
use crate::services::response_processor::{GenerationMetrics, ValidationOptions, process_response};
use crate::services::watermark::{WatermarkSpec, watermark_image};

/// Unvalidated pieces of a generation call, as received from a client.
#[derive(Debug, Clone, Copy)]
pub struct GenerationInput<'a> {
    pub image: Option<&'a ImageUpload>,
    pub options: Option<&'a RawCustomizationOptions>,
    pub use_case: Option<&'a str>,
    pub prompt: Option<&'a str>,
}

pub struct GenerationOrchestrator {
    client: GenerationClient,
    preview_watermark: WatermarkSpec,
    full_watermark: Option<WatermarkSpec>,
}

impl GenerationOrchestrator {
    pub fn new(client: GenerationClient) -> Self {
        Self {
            client,
            preview_watermark: WatermarkSpec::preview(),
            full_watermark: None,
        }
    }

    pub fn with_subtle_full_watermark(mut self, enabled: bool) -> Self {
        self.full_watermark = enabled.then(WatermarkSpec::subtle);
        self
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// Validates input before anything is spent on the provider.
    pub fn prepare(
        &self,
        input: GenerationInput<'_>,
        size_class: SizeClass,
    ) -> Result<(GenerationRequest, Vec<String>), PortraitError> {
        let upload = input
            .image
            .ok_or_else(|| PortraitError::Validation("Image is required".to_string()))?;
        let raw_options = input
            .options
            .ok_or_else(|| PortraitError::Validation("Customization options are required".to_string()))?;

        let image = decode_upload(upload)?;
        let validation = validate_image_for_ai(&image, upload.size);
        if !validation.is_valid {
            return Err(PortraitError::Validation(validation.errors.join("; ")));
        }

        let recommended = optimal_generation_size(image.dimensions);
        if recommended != size_class {
            log::debug!(
                "{} requested for a source best suited to {}",
                size_class.as_str(),
                recommended.as_str()
            );
        }

        let options = validate_context(raw_options)
            .map_err(|errors| PortraitError::Validation(format!("Invalid options: {}", errors.join("; "))))?;

        let use_case = match input.use_case.map(str::trim).filter(|u| !u.is_empty()) {
            Some(value) => Some(
                value
                    .parse::<UseCase>()
                    .map_err(|_| PortraitError::Validation(format!("Unknown use case '{}'", value)))?,
            ),
            None => None,
        };

        let request = GenerationRequest {
            image,
            options,
            size_class,
            use_case,
            prompt_override: input.prompt.map(str::to_string),
        };

        Ok((request, validation.warnings))
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest,
        mut warnings: Vec<String>,
    ) -> Result<DeliverableImage, PortraitError> {
        let result = self.client.generate_portrait(request).await;
        let metrics = GenerationMetrics::from_result(&result, request.size_class);

        let processed = process_response(
            &result,
            &metrics,
            &ValidationOptions::for_size_class(request.size_class),
        )
        .map_err(|e| {
            log::error!("Generation result rejected: {}", e);
            e
        })?;

        warnings.extend(processed.warnings.iter().cloned());
        self.deliver(processed, request.size_class, warnings)
    }

    fn deliver(
        &self,
        processed: ProcessedResponse,
        size_class: SizeClass,
        warnings: Vec<String>,
    ) -> Result<DeliverableImage, PortraitError> {
        let ProcessedResponse {
            image_data,
            image,
            mut metadata,
            ..
        } = processed;

        match (size_class, &self.full_watermark) {
            // No path skips this: an unmarked preview is a free full result.
            (SizeClass::Preview, _) => {
                let marked = watermark_image(&image, &self.preview_watermark).map_err(|e| {
                    log::error!("Preview watermark failed: {}", e);
                    e
                })?;
                metadata.format = "png".to_string();
                Ok(DeliverableImage {
                    image_data: marked.image_data,
                    mime_type: marked.mime_type.to_string(),
                    watermarked: true,
                    metadata,
                    warnings,
                })
            }
            (SizeClass::Full, Some(spec)) => match watermark_image(&image, spec) {
                Ok(marked) => {
                    metadata.format = "png".to_string();
                    Ok(DeliverableImage {
                        image_data: marked.image_data,
                        mime_type: marked.mime_type.to_string(),
                        watermarked: true,
                        metadata,
                        warnings,
                    })
                }
                Err(e) => {
                    log::warn!("Subtle watermark failed, delivering unmarked image: {}", e);
                    Ok(unmarked(image_data, metadata, warnings))
                }
            },
            (SizeClass::Full, None) => Ok(unmarked(image_data, metadata, warnings)),
        }
    }
}

fn unmarked(
    image_data: String,
    metadata: ResponseMetadata,
    warnings: Vec<String>,
) -> DeliverableImage {
    DeliverableImage {
        mime_type: format!("image/{}", metadata.format),
        image_data,
        watermarked: false,
        metadata,
        warnings,
    }
}
