// src/config.rs
use crate::errors::PortraitError;
use crate::services::generation_client::{Pricing, RetryPolicy};
use crate::services::prompt_builder::PromptQuality;
use crate::services::rate_limiter::RateLimitPosture;
use std::env;
use std::time::Duration;

pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub gemini_api_key: Option<String>,
    pub gemini_endpoint: String,
    pub image_model: String,
    /// Selects the passthrough provider instead of calling Gemini.
    pub skip_ai: bool,
    pub rate_limit_posture: RateLimitPosture,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub pricing: Pricing,
    pub prompt_quality: PromptQuality,
    pub full_price_cents: u64,
    pub payment_currency: String,
    pub stripe_secret_key: Option<String>,
    pub subtle_full_watermark: bool,
    pub max_body_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            gemini_api_key: None,
            gemini_endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            skip_ai: false,
            rate_limit_posture: RateLimitPosture::Production,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(60),
            pricing: Pricing::default(),
            prompt_quality: PromptQuality::High,
            full_price_cents: 999,
            payment_currency: "usd".to_string(),
            stripe_secret_key: None,
            subtle_full_watermark: false,
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

fn var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str) -> Result<Option<T>, PortraitError> {
    match var(name) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| PortraitError::Config(format!("{} has an invalid value '{}'", name, value))),
        None => Ok(None),
    }
}

fn flag(name: &str) -> bool {
    var(name).is_some_and(|value| matches!(value.to_lowercase().as_str(), "true" | "1" | "yes"))
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Result<Self, PortraitError> {
        let defaults = Self::default();

        let rate_limit_posture = match var("RATE_LIMIT_MODE") {
            Some(mode) => mode.parse().map_err(PortraitError::Config)?,
            None => defaults.rate_limit_posture,
        };

        let config = Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parsed("PORT")?.unwrap_or(defaults.port),
            gemini_api_key: var("GEMINI_API_KEY"),
            gemini_endpoint: var("GEMINI_ENDPOINT").unwrap_or(defaults.gemini_endpoint),
            image_model: var("IMAGE_MODEL").unwrap_or(defaults.image_model),
            skip_ai: flag("SKIP_AI"),
            rate_limit_posture,
            retry: RetryPolicy {
                max_retries: parsed("MAX_RETRIES")?.unwrap_or(defaults.retry.max_retries),
                base_delay: parsed("RETRY_BASE_DELAY_MS")?
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry.base_delay),
            },
            request_timeout: parsed("REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            pricing: Pricing {
                preview: parsed("PREVIEW_COST")?.unwrap_or(defaults.pricing.preview),
                full: parsed("FULL_COST")?.unwrap_or(defaults.pricing.full),
            },
            prompt_quality: match var("PROMPT_QUALITY") {
                Some(quality) => quality.parse().map_err(PortraitError::Config)?,
                None => defaults.prompt_quality,
            },
            full_price_cents: parsed("FULL_PRICE_CENTS")?.unwrap_or(defaults.full_price_cents),
            payment_currency: var("PAYMENT_CURRENCY")
                .map(|currency| currency.to_lowercase())
                .unwrap_or(defaults.payment_currency),
            stripe_secret_key: var("STRIPE_SECRET_KEY"),
            subtle_full_watermark: flag("SUBTLE_FULL_WATERMARK"),
            max_body_bytes: parsed("MAX_BODY_BYTES")?.unwrap_or(defaults.max_body_bytes),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PortraitError> {
        if !self.skip_ai && self.gemini_api_key.is_none() {
            return Err(PortraitError::Config(
                "GEMINI_API_KEY must be set unless SKIP_AI is enabled".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(PortraitError::Config(
                "REQUEST_TIMEOUT_SECS must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_skip_ai(mut self, skip_ai: bool) -> Self {
        self.skip_ai = skip_ai;
        self
    }

    pub fn with_gemini_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.gemini_api_key = Some(api_key.into());
        self
    }
}
