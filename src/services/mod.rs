// src/services/mod.rs
pub mod generation_client;
pub mod glyphs;
pub mod image_validator;
pub mod orchestrator;
pub mod payment;
pub mod prompt_builder;
pub mod rate_limiter;
pub mod response_processor;
pub mod watermark;

pub use generation_client::{GeminiImageProvider, GenerationClient, ImageProvider, PassthroughProvider};
pub use orchestrator::GenerationOrchestrator;
pub use payment::{DisabledPaymentGate, PaymentGate, StripePaymentGate};
pub use rate_limiter::RateLimiter;
