// src/services/generation_client.rs
use crate::errors::PortraitError;
use crate::models::{GenerationRequest, GenerationResult, SizeClass};
use crate::services::prompt_builder::{PromptContext, build_prompt_for_use_case};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source image ready to embed in a provider request.
#[derive(Debug, Clone)]
pub struct ProviderImage {
    pub base64: String,
    pub mime_type: String,
}

/// An image-generation backend.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn model(&self) -> &str;

    /// Whether calls cost money; the passthrough provider does not.
    fn is_billable(&self) -> bool {
        true
    }

    /// Returns the generated image as base64.
    async fn generate(&self, prompt: &str, image: &ProviderImage) -> Result<String, PortraitError>;
}

pub struct GeminiImageProvider {
    api_key: String,
    endpoint: String,
    model: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    text: Option<String>,
    inline_data: Option<GeminiInlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    data: String,
}

impl GeminiImageProvider {
    pub fn new(api_key: String, endpoint: String, model: String) -> Self {
        Self {
            api_key,
            endpoint,
            model,
            client: Client::new(),
        }
    }

    fn extract_image(response: GeminiResponse) -> Result<String, PortraitError> {
        let mut finish_reason = None;
        let mut text = None;

        for candidate in response.candidates {
            if finish_reason.is_none() {
                finish_reason = candidate.finish_reason;
            }
            for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
                if let Some(inline) = part.inline_data {
                    let data = inline.data.trim();
                    if !data.is_empty() {
                        return Ok(data.to_string());
                    }
                }
                if text.is_none() {
                    text = part.text.filter(|t| !t.trim().is_empty());
                }
            }
        }

        Err(PortraitError::provider(format!(
            "No image in provider response (finish reason: {}, text: {})",
            finish_reason.as_deref().unwrap_or("none"),
            text.as_deref().unwrap_or("none")
        )))
    }
}

#[async_trait]
impl ImageProvider for GeminiImageProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, image: &ProviderImage) -> Result<String, PortraitError> {
        let url = format!(
            "{}/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        );

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        { "text": prompt },
                        {
                            "inlineData": {
                                "mimeType": image.mime_type,
                                "data": image.base64
                            }
                        }
                    ]
                }],
                "generationConfig": { "responseModalities": ["IMAGE", "TEXT"] }
            }))
            .send()
            .await
            .map_err(|e| PortraitError::provider(format!("Gemini request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PortraitError::provider(format!(
                "Gemini error ({}): {}",
                status, error_text
            )));
        }

        let result: GeminiResponse = response.json().await.map_err(|e| {
            PortraitError::provider(format!("Invalid response from Gemini: {}", e))
        })?;

        Self::extract_image(result)
    }
}

/// Echoes the source image back; selected at startup to avoid paying the provider.
pub struct PassthroughProvider {
    model: String,
}

impl PassthroughProvider {
    pub fn new() -> Self {
        Self {
            model: "passthrough".to_string(),
        }
    }
}

impl Default for PassthroughProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageProvider for PassthroughProvider {
    fn model(&self) -> &str {
        &self.model
    }

    fn is_billable(&self) -> bool {
        false
    }

    async fn generate(&self, _prompt: &str, image: &ProviderImage) -> Result<String, PortraitError> {
        Ok(image.base64.clone())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // Each attempt is billed, so retries are opt-in.
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(1000),
        }
    }
}

/// Configured per-call price; not read back from provider billing.
#[derive(Debug, Clone, Copy)]
pub struct Pricing {
    pub preview: f64,
    pub full: f64,
}

impl Pricing {
    pub fn cost_for(&self, size_class: SizeClass) -> f64 {
        match size_class {
            SizeClass::Preview => self.preview,
            SizeClass::Full => self.full,
        }
    }
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            preview: 0.039,
            full: 0.039,
        }
    }
}

pub struct GenerationClient {
    provider: Arc<dyn ImageProvider>,
    retry: RetryPolicy,
    timeout: Duration,
    pricing: Pricing,
    prompt_context: PromptContext,
}

impl GenerationClient {
    pub fn new(provider: Arc<dyn ImageProvider>) -> Self {
        Self {
            provider,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(60),
            pricing: Pricing::default(),
            prompt_context: PromptContext::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_prompt_context(mut self, context: PromptContext) -> Self {
        self.prompt_context = context;
        self
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub async fn generate_portrait(&self, request: &GenerationRequest) -> GenerationResult {
        let start = Instant::now();
        let model = self.provider.model().to_string();

        let prompt = request
            .prompt_override
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                build_prompt_for_use_case(&request.options, &self.prompt_context, request.use_case)
            });

        let image = ProviderImage {
            base64: request
                .image
                .base64
                .clone()
                .unwrap_or_else(|| general_purpose::STANDARD.encode(&request.image.bytes)),
            mime_type: request.image.mime_type.clone(),
        };

        log::info!(
            "Generating {} portrait with {} ({} byte source)",
            request.size_class.as_str(),
            model,
            request.image.bytes.len()
        );

        let outcome = tokio::time::timeout(self.timeout, self.call_with_retries(&prompt, &image)).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(image_data)) => GenerationResult {
                success: true,
                image_data: Some(image_data),
                error: None,
                cost: if self.provider.is_billable() {
                    self.pricing.cost_for(request.size_class)
                } else {
                    0.0
                },
                duration_ms,
                model,
            },
            Ok(Err(e)) => {
                log::error!("Portrait generation failed after {}ms: {}", duration_ms, e);
                let message = match e {
                    PortraitError::Provider { message, .. } => message,
                    other => other.to_string(),
                };
                GenerationResult::failed(message, model, duration_ms)
            }
            Err(_) => {
                log::error!("Portrait generation timed out after {:?}", self.timeout);
                GenerationResult::failed(
                    format!("Generation timed out after {:?}", self.timeout),
                    model,
                    duration_ms,
                )
            }
        }
    }

    async fn call_with_retries(&self, prompt: &str, image: &ProviderImage) -> Result<String, PortraitError> {
        let mut attempt = 0;
        loop {
            match self.provider.generate(prompt, image).await {
                Ok(data) => return Ok(data),
                Err(e) => {
                    let retryable = match &e {
                        PortraitError::Provider { code, .. } => code.is_retryable(),
                        _ => false,
                    };
                    if !retryable || attempt >= self.retry.max_retries {
                        return Err(e);
                    }
                    attempt += 1;
                    let delay = self.retry.base_delay * attempt;
                    log::warn!(
                        "Generation attempt {} failed, retrying in {:?}: {}",
                        attempt,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{Background, CustomizationOptions, Dimensions, SourceImage, Style};
    use crate::services::prompt_builder::PromptQuality;
    use crate::services::image_validator::tests::png_bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fails with the queued messages, then echoes the input.
    pub(crate) struct ScriptedProvider {
        pub calls: AtomicUsize,
        failures: Mutex<Vec<String>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        pub(crate) fn new(failures: &[&str]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures: Mutex::new(failures.iter().rev().map(|s| s.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageProvider for ScriptedProvider {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, prompt: &str, image: &ProviderImage) -> Result<String, PortraitError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.failures.lock().unwrap().pop() {
                Some(message) => Err(PortraitError::provider(message)),
                None => Ok(image.base64.clone()),
            }
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl ImageProvider for SlowProvider {
        fn model(&self) -> &str {
            "slow"
        }

        async fn generate(&self, _prompt: &str, image: &ProviderImage) -> Result<String, PortraitError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(image.base64.clone())
        }
    }

    fn request(size_class: SizeClass) -> GenerationRequest {
        GenerationRequest {
            image: SourceImage {
                bytes: png_bytes(512, 512),
                base64: None,
                mime_type: "image/png".to_string(),
                dimensions: Dimensions::new(512, 512),
            },
            options: CustomizationOptions::new(Background::Office, Style::Professional),
            size_class,
            use_case: None,
            prompt_override: None,
        }
    }

    fn fast_retries(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn passthrough_echoes_input_at_zero_cost() {
        let client = GenerationClient::new(Arc::new(PassthroughProvider::new()));
        let req = request(SizeClass::Full);
        let result = client.generate_portrait(&req).await;

        assert!(result.success);
        assert_eq!(result.cost, 0.0);
        assert_eq!(
            result.image_data.unwrap(),
            general_purpose::STANDARD.encode(&req.image.bytes)
        );
    }

    #[tokio::test]
    async fn billable_success_uses_size_class_price() {
        let provider = Arc::new(ScriptedProvider::new(&[]));
        let client = GenerationClient::new(provider.clone()).with_pricing(Pricing {
            preview: 0.01,
            full: 0.05,
        });

        assert_eq!(client.generate_portrait(&request(SizeClass::Preview)).await.cost, 0.01);
        assert_eq!(client.generate_portrait(&request(SizeClass::Full)).await.cost, 0.05);
    }

    #[tokio::test]
    async fn no_retries_by_default() {
        let provider = Arc::new(ScriptedProvider::new(&["quota exceeded"]));
        let client = GenerationClient::new(provider.clone());
        let result = client.generate_portrait(&request(SizeClass::Preview)).await;

        assert!(!result.success);
        assert_eq!(provider.calls(), 1);
        assert_eq!(result.error.as_deref(), Some("quota exceeded"));
    }

    #[tokio::test]
    async fn retryable_errors_are_retried_up_to_ceiling() {
        let provider = Arc::new(ScriptedProvider::new(&["timeout", "quota exceeded"]));
        let client = GenerationClient::new(provider.clone()).with_retry(fast_retries(2));
        let result = client.generate_portrait(&request(SizeClass::Preview)).await;

        assert!(result.success);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn bad_credentials_fail_immediately() {
        let provider = Arc::new(ScriptedProvider::new(&["API key not valid"]));
        let client = GenerationClient::new(provider.clone()).with_retry(fast_retries(3));
        let result = client.generate_portrait(&request(SizeClass::Preview)).await;

        assert!(!result.success);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn prompt_override_is_sent_verbatim() {
        let provider = Arc::new(ScriptedProvider::new(&[]));
        let client = GenerationClient::new(provider.clone());
        let mut req = request(SizeClass::Preview);
        req.prompt_override = Some("make it noir".to_string());
        client.generate_portrait(&req).await;

        assert_eq!(provider.prompts.lock().unwrap().as_slice(), ["make it noir"]);
    }

    #[tokio::test]
    async fn overall_timeout_bounds_the_call() {
        let client = GenerationClient::new(Arc::new(SlowProvider)).with_timeout(Duration::from_millis(20));
        let result = client.generate_portrait(&request(SizeClass::Preview)).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Generation timed out after 20ms"));
    }

    #[tokio::test]
    async fn backoff_sleeps_count_against_the_timeout() {
        let provider = Arc::new(ScriptedProvider::new(&["quota exceeded"; 6]));
        let client = GenerationClient::new(provider.clone())
            .with_retry(RetryPolicy {
                max_retries: 5,
                base_delay: Duration::from_secs(10),
            })
            .with_timeout(Duration::from_millis(50));

        let start = Instant::now();
        let result = client.generate_portrait(&request(SizeClass::Preview)).await;

        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn prompt_context_reaches_the_provider() {
        let provider = Arc::new(ScriptedProvider::new(&[]));
        let client = GenerationClient::new(provider.clone())
            .with_prompt_context(PromptContext::with_quality(PromptQuality::Standard));
        client.generate_portrait(&request(SizeClass::Preview)).await;

        assert!(provider.prompts.lock().unwrap()[0].contains("standard resolution"));
    }

    #[test]
    fn extracts_first_inline_image() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "Here is your portrait" },
                    { "inlineData": { "mimeType": "image/png", "data": "aGVsbG8=" } }
                ]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(GeminiImageProvider::extract_image(response).unwrap(), "aGVsbG8=");
    }

    #[test]
    fn missing_image_is_an_invalid_response() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": "I can't do that" }] } }]
        }))
        .unwrap();
        match GeminiImageProvider::extract_image(response) {
            Err(PortraitError::Provider { code, .. }) => {
                assert_eq!(code, crate::errors::ProviderErrorCode::InvalidResponse)
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }
}
