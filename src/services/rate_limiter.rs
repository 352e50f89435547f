// src/services/rate_limiter.rs
use crate::errors::PortraitError;
use actix_web::HttpRequest;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitPosture {
    Development,
    Production,
}

impl std::str::FromStr for RateLimitPosture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(RateLimitPosture::Development),
            "production" | "prod" => Ok(RateLimitPosture::Production),
            other => Err(format!("unknown rate limit mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn for_posture(posture: RateLimitPosture) -> Self {
        match posture {
            RateLimitPosture::Production => Self {
                max_requests: 3,
                window: Duration::hours(24),
            },
            RateLimitPosture::Development => Self {
                max_requests: 50,
                window: Duration::hours(1),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_time: DateTime<Utc>,
    pub last_request: DateTime<Utc>,
}

impl RateLimitEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.reset_time <= now
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_time: DateTime<Utc>,
    pub retry_after_secs: Option<i64>,
}

impl RateLimitDecision {
    /// Converts a denial into the error the HTTP layer reports.
    pub fn into_result(self) -> Result<Self, PortraitError> {
        if self.allowed {
            return Ok(self);
        }
        Err(PortraitError::RateLimited {
            limit: self.limit,
            remaining: self.remaining,
            retry_after_secs: self.retry_after_secs.unwrap_or(1),
            reset_time: self.reset_time.timestamp_millis(),
        })
    }
}

/// Admission state keyed by client identity.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn get(&self, identity: &str) -> Option<RateLimitEntry>;
    /// Bumps an existing entry; returns `None` if there is none.
    async fn increment(&self, identity: &str, now: DateTime<Utc>) -> Option<RateLimitEntry>;
    /// Replaces (or creates) the entry with a fresh window.
    async fn reset(&self, identity: &str, entry: RateLimitEntry);
    /// Drops expired entries, returning how many were removed.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> usize;
}

#[derive(Default)]
pub struct InMemoryRateLimitStore {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn get(&self, identity: &str) -> Option<RateLimitEntry> {
        self.entries.lock().await.get(identity).cloned()
    }

    async fn increment(&self, identity: &str, now: DateTime<Utc>) -> Option<RateLimitEntry> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(identity)?;
        entry.count += 1;
        entry.last_request = now;
        Some(entry.clone())
    }

    async fn reset(&self, identity: &str, entry: RateLimitEntry) {
        self.entries.lock().await.insert(identity.to_string(), entry);
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }
}

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    policy: RateLimitPolicy,
    // Serializes check-then-increment so two racing requests cannot share the last slot.
    admission: Mutex<()>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, policy: RateLimitPolicy) -> Self {
        Self {
            store,
            policy,
            admission: Mutex::new(()),
        }
    }

    pub fn in_memory(posture: RateLimitPosture) -> Self {
        Self::new(
            Arc::new(InMemoryRateLimitStore::new()),
            RateLimitPolicy::for_posture(posture),
        )
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    pub async fn check_rate_limit(&self, identity: &str) -> RateLimitDecision {
        self.check_rate_limit_at(identity, Utc::now()).await
    }

    pub async fn check_rate_limit_at(&self, identity: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let _guard = self.admission.lock().await;

        let swept = self.store.sweep_expired(now).await;
        if swept > 0 {
            log::debug!("Swept {} expired rate limit entries", swept);
        }

        let limit = self.policy.max_requests;
        let current = self.store.get(identity).await.filter(|e| !e.is_expired(now));

        match current {
            Some(entry) if entry.count >= limit => {
                let wait_ms = (entry.reset_time - now).num_milliseconds().max(1);
                log::warn!("Rate limit exceeded for client {}", identity);
                RateLimitDecision {
                    allowed: false,
                    limit,
                    remaining: 0,
                    reset_time: entry.reset_time,
                    retry_after_secs: Some((wait_ms + 999) / 1000),
                }
            }
            Some(_) => {
                let entry = match self.store.increment(identity, now).await {
                    Some(entry) => entry,
                    None => self.start_window(identity, now).await,
                };
                RateLimitDecision {
                    allowed: true,
                    limit,
                    remaining: limit.saturating_sub(entry.count),
                    reset_time: entry.reset_time,
                    retry_after_secs: None,
                }
            }
            None => {
                let entry = self.start_window(identity, now).await;
                RateLimitDecision {
                    allowed: true,
                    limit,
                    remaining: limit.saturating_sub(entry.count),
                    reset_time: entry.reset_time,
                    retry_after_secs: None,
                }
            }
        }
    }

    /// Current entry for an identity, without consuming a slot.
    pub async fn status(&self, identity: &str) -> Option<RateLimitEntry> {
        self.store.get(identity).await
    }

    async fn start_window(&self, identity: &str, now: DateTime<Utc>) -> RateLimitEntry {
        let entry = RateLimitEntry {
            count: 1,
            reset_time: now + self.policy.window,
            last_request: now,
        };
        self.store.reset(identity, entry.clone()).await;
        entry
    }
}

/// Best available network-origin identity, or the shared `"unknown"` bucket.
pub fn client_identity(req: &HttpRequest) -> String {
    let headers = req.headers();
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    header("x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .or_else(|| header("x-real-ip"))
        .or_else(|| header("cf-connecting-ip"))
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}
