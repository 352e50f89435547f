// src/handlers.rs
use crate::services::orchestrator::GenerationInput;
use crate::services::payment::redeem_payment;
use crate::services::rate_limiter::client_identity;
use crate::{AppState, errors::PortraitError, models::*};
use actix_web::{HttpRequest, HttpResponse, web};

pub const SERVICE_NAME: &str = "portrait-studio";

pub async fn generate_preview(
    req: HttpRequest,
    body: web::Json<GeneratePreviewBody>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, PortraitError> {
    let identity = client_identity(&req);
    let admission = data
        .rate_limiter
        .check_rate_limit(&identity)
        .await
        .into_result()?;

    let body = body.into_inner();
    let input = GenerationInput {
        image: body.image.as_ref(),
        options: body.options.as_ref(),
        use_case: body.use_case.as_deref(),
        prompt: body.prompt.as_deref(),
    };

    let (request, warnings) = data.orchestrator.prepare(input, SizeClass::Preview)?;
    let delivered = data.orchestrator.generate(&request, warnings).await?;

    log::info!(
        "Preview delivered to {} ({} remaining, quality {:?})",
        identity,
        admission.remaining,
        delivered.metadata.quality
    );

    let mut payload = serde_json::json!({
        "success": true,
        "previewUrl": delivered.data_url(),
        "imageData": delivered.image_data,
        "metadata": DeliveryMetadata::from(&delivered),
    });
    if !delivered.warnings.is_empty() {
        payload["warnings"] = serde_json::json!(delivered.warnings);
    }

    Ok(HttpResponse::Ok()
        .insert_header(("X-RateLimit-Limit", admission.limit.to_string()))
        .insert_header(("X-RateLimit-Remaining", admission.remaining.to_string()))
        .insert_header(("X-RateLimit-Reset", admission.reset_time.to_rfc3339()))
        .json(payload))
}

pub async fn generate_full(
    body: web::Json<GenerateFullBody>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, PortraitError> {
    let body = body.into_inner();
    let input = GenerationInput {
        image: body.image.as_ref(),
        options: body.options.as_ref(),
        use_case: body.use_case.as_deref(),
        prompt: body.prompt.as_deref(),
    };

    let (request, warnings) = data.orchestrator.prepare(input, SizeClass::Full)?;

    let receipt = redeem_payment(
        data.payment_gate.as_ref(),
        data.payment_ledger.as_ref(),
        body.payment_intent_id.as_deref(),
        data.full_price_cents,
    )
    .await?;
    log::info!(
        "Payment {} verified ({} cents), generating full resolution",
        receipt.payment_id,
        receipt.amount_cents
    );

    let delivered = match data.orchestrator.generate(&request, warnings).await {
        Ok(delivered) => delivered,
        Err(e) => {
            data.payment_ledger.release(&receipt.payment_id).await;
            log::warn!("Released payment {} after failed generation", receipt.payment_id);
            return Err(e);
        }
    };

    let mut payload = serde_json::json!({
        "success": true,
        "downloadUrl": delivered.data_url(),
        "imageData": delivered.image_data,
        "metadata": DeliveryMetadata::from(&delivered),
    });
    if !delivered.warnings.is_empty() {
        payload["warnings"] = serde_json::json!(delivered.warnings);
    }

    Ok(HttpResponse::Ok().json(payload))
}

pub async fn generation_health(req: HttpRequest, data: web::Data<AppState>) -> HttpResponse {
    let now = chrono::Utc::now();
    let limit = data.rate_limiter.policy().max_requests;
    let window = data
        .rate_limiter
        .status(&client_identity(&req))
        .await
        .filter(|entry| !entry.is_expired(now));
    let remaining = window.as_ref().map_or(limit, |e| limit.saturating_sub(e.count));
    let reset_time = window.map(|e| e.reset_time.timestamp_millis());

    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "model": data.orchestrator.model(),
        "timestamp": now,
        "rateLimit": {
            "limit": limit,
            "remaining": remaining,
            "resetTime": reset_time,
        },
    }))
}

pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION")
    }))
}
