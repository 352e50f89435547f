// src/errors.rs
use actix_web::http::{StatusCode, header};
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

/// Provider failure classes, derived from the provider's error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorCode {
    InvalidApiKey,
    QuotaExceeded,
    Timeout,
    RateLimited,
    ContentBlocked,
    InvalidResponse,
    Unknown,
}

impl ProviderErrorCode {
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("api key") || lower.contains("api_key") || lower.contains("unauthorized")
        {
            ProviderErrorCode::InvalidApiKey
        } else if lower.contains("quota") {
            ProviderErrorCode::QuotaExceeded
        } else if lower.contains("timeout") || lower.contains("timed out") {
            ProviderErrorCode::Timeout
        } else if lower.contains("rate limit") || lower.contains("too many requests") {
            ProviderErrorCode::RateLimited
        } else if lower.contains("safety") || lower.contains("blocked") || lower.contains("policy")
        {
            ProviderErrorCode::ContentBlocked
        } else if lower.contains("no image") || lower.contains("invalid response") {
            ProviderErrorCode::InvalidResponse
        } else {
            ProviderErrorCode::Unknown
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderErrorCode::QuotaExceeded
                | ProviderErrorCode::Timeout
                | ProviderErrorCode::RateLimited
                | ProviderErrorCode::Unknown
        )
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            ProviderErrorCode::InvalidApiKey => {
                "The portrait service is misconfigured. Please try again later."
            }
            ProviderErrorCode::QuotaExceeded => {
                "The portrait service is at capacity right now. Please try again in a few minutes."
            }
            ProviderErrorCode::Timeout => "Portrait generation took too long. Please try again.",
            ProviderErrorCode::RateLimited => {
                "The portrait service is busy. Please wait a moment and try again."
            }
            ProviderErrorCode::ContentBlocked => {
                "This photo could not be processed. Please try a different photo."
            }
            ProviderErrorCode::InvalidResponse | ProviderErrorCode::Unknown => {
                "Portrait generation failed. Please try again."
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum PortraitError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limit exceeded for {limit} requests, retry after {retry_after_secs}s")]
    RateLimited {
        limit: u32,
        remaining: u32,
        retry_after_secs: i64,
        reset_time: i64,
    },

    #[error("Provider error ({code:?}): {message}")]
    Provider {
        code: ProviderErrorCode,
        message: String,
    },

    #[error("Image processing error: {0}")]
    Processing(String),

    #[error("Watermark error: {0}")]
    Watermark(String),

    #[error("Payment error: {0}")]
    Payment(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PortraitError {
    pub fn provider(message: impl Into<String>) -> Self {
        let message = message.into();
        PortraitError::Provider {
            code: ProviderErrorCode::classify(&message),
            message,
        }
    }

    /// Message safe to show to the caller; never contains internal error text.
    pub fn user_message(&self) -> String {
        match self {
            PortraitError::Validation(reason) => reason.clone(),
            PortraitError::RateLimited { .. } => {
                "Too many generation requests. Please try again later.".to_string()
            }
            PortraitError::Provider { code, .. } => code.user_message().to_string(),
            PortraitError::Processing(_) => {
                "The generated portrait failed quality checks. Please try again.".to_string()
            }
            PortraitError::Watermark(_) => {
                "The preview could not be prepared. Please try again.".to_string()
            }
            PortraitError::Payment(reason) => reason.clone(),
            PortraitError::Config(_) => "The service is not configured correctly.".to_string(),
        }
    }
}

impl ResponseError for PortraitError {
    fn status_code(&self) -> StatusCode {
        match self {
            PortraitError::Validation(_) => StatusCode::BAD_REQUEST,
            PortraitError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            PortraitError::Payment(_) => StatusCode::PAYMENT_REQUIRED,
            PortraitError::Provider { .. }
            | PortraitError::Processing(_)
            | PortraitError::Watermark(_)
            | PortraitError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            PortraitError::RateLimited {
                limit,
                remaining,
                retry_after_secs,
                reset_time,
            } => {
                let reset_header = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(*reset_time)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default();

                HttpResponse::TooManyRequests()
                    .insert_header(("X-RateLimit-Limit", limit.to_string()))
                    .insert_header(("X-RateLimit-Remaining", remaining.to_string()))
                    .insert_header(("X-RateLimit-Reset", reset_header))
                    .insert_header((header::RETRY_AFTER, retry_after_secs.to_string()))
                    .json(serde_json::json!({
                        "success": false,
                        "error": self.user_message(),
                        "retryAfter": retry_after_secs,
                        "resetTime": reset_time,
                    }))
            }
            _ => HttpResponse::build(self.status_code()).json(serde_json::json!({
                "success": false,
                "error": self.user_message(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_provider_messages() {
        assert_eq!(
            ProviderErrorCode::classify("API key not valid. Please pass a valid API key."),
            ProviderErrorCode::InvalidApiKey
        );
        assert_eq!(
            ProviderErrorCode::classify("Resource has been exhausted (e.g. check quota)."),
            ProviderErrorCode::QuotaExceeded
        );
        assert_eq!(
            ProviderErrorCode::classify("operation timed out"),
            ProviderErrorCode::Timeout
        );
        assert_eq!(
            ProviderErrorCode::classify("Rate limit reached for requests"),
            ProviderErrorCode::RateLimited
        );
        assert_eq!(
            ProviderErrorCode::classify("something odd"),
            ProviderErrorCode::Unknown
        );
    }

    #[test]
    fn credentials_are_never_retried() {
        assert!(!ProviderErrorCode::InvalidApiKey.is_retryable());
        assert!(!ProviderErrorCode::ContentBlocked.is_retryable());
        assert!(ProviderErrorCode::QuotaExceeded.is_retryable());
        assert!(ProviderErrorCode::Timeout.is_retryable());
    }

    #[test]
    fn user_message_hides_provider_text() {
        let err = PortraitError::provider("quota exceeded for project 1234 on key sk-abc");
        let message = err.user_message();
        assert!(!message.contains("1234"));
        assert!(!message.contains("sk-abc"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
