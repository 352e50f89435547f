// src/lib.rs
use actix_web::web;
use std::sync::Arc;

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;

use crate::config::AppConfig;
use crate::errors::PortraitError;
use crate::handlers::{generate_full, generate_preview, generation_health, health_check};
use crate::services::payment::{InMemoryPaymentLedger, PaymentLedger};
use crate::services::prompt_builder::PromptContext;
use crate::services::{
    DisabledPaymentGate, GeminiImageProvider, GenerationClient, GenerationOrchestrator,
    ImageProvider, PassthroughProvider, PaymentGate, RateLimiter, StripePaymentGate,
};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<GenerationOrchestrator>,
    pub rate_limiter: Arc<RateLimiter>,
    pub payment_gate: Arc<dyn PaymentGate>,
    pub payment_ledger: Arc<dyn PaymentLedger>,
    pub full_price_cents: u64,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Result<Self, PortraitError> {
        let provider: Arc<dyn ImageProvider> = if config.skip_ai {
            log::warn!("SKIP_AI is enabled: source images are echoed back instead of generated");
            Arc::new(PassthroughProvider::new())
        } else {
            let api_key = config
                .gemini_api_key
                .clone()
                .ok_or_else(|| PortraitError::Config("GEMINI_API_KEY is not set".to_string()))?;
            Arc::new(GeminiImageProvider::new(
                api_key,
                config.gemini_endpoint.clone(),
                config.image_model.clone(),
            ))
        };

        let client = GenerationClient::new(provider)
            .with_retry(config.retry)
            .with_timeout(config.request_timeout)
            .with_pricing(config.pricing)
            .with_prompt_context(PromptContext::with_quality(config.prompt_quality));

        let payment_gate: Arc<dyn PaymentGate> = match &config.stripe_secret_key {
            Some(key) => Arc::new(StripePaymentGate::new(
                key.clone(),
                config.payment_currency.clone(),
            )),
            None => {
                log::warn!("STRIPE_SECRET_KEY is not set: full-resolution downloads are disabled");
                Arc::new(DisabledPaymentGate)
            }
        };

        Ok(Self {
            orchestrator: Arc::new(
                GenerationOrchestrator::new(client)
                    .with_subtle_full_watermark(config.subtle_full_watermark),
            ),
            rate_limiter: Arc::new(RateLimiter::in_memory(config.rate_limit_posture)),
            payment_gate,
            payment_ledger: Arc::new(InMemoryPaymentLedger::new()),
            full_price_cents: config.full_price_cents,
        })
    }
}

/// JSON extractor limits and error shape shared by every route.
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err, _req| {
            log::warn!("Rejected request body: {}", err);
            PortraitError::Validation("Invalid request body".to_string()).into()
        })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/generate-preview", web::post().to(generate_preview))
            .route("/generate-preview", web::get().to(generation_health))
            .route("/generate-full", web::post().to(generate_full))
            .route("/generate-full", web::get().to(generation_health)),
    )
    .route("/health", web::get().to(health_check));
}
