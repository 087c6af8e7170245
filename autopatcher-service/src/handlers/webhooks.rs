use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use service_core::error::AppError;
use service_core::utils::signature::verify_signature;

use crate::dtos::{WebhookAccepted, WebhookAck};
use crate::services::WebhookOutcome;
use crate::startup::AppState;

const EVENT_HEADER: &str = "x-github-event";
const DELIVERY_HEADER: &str = "x-github-delivery";
const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// GitHub webhook receiver.
///
/// Verification and parsing happen inline; fetching and analysis run in a
/// background task so GitHub gets its answer well inside its 10 s timeout.
pub async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let event = header_str(&headers, EVENT_HEADER)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing X-GitHub-Event header")))?
        .to_string();
    let delivery_id = header_str(&headers, DELIVERY_HEADER).map(str::to_string);

    match state.config.webhook_secret() {
        Some(secret) => {
            let signature = header_str(&headers, SIGNATURE_HEADER).ok_or_else(|| {
                tracing::warn!(event = %event, "Webhook delivery without signature");
                AppError::Unauthorized(anyhow::anyhow!("Missing X-Hub-Signature-256 header"))
            })?;

            if !verify_signature(secret, &body, signature)? {
                tracing::warn!(event = %event, delivery_id = ?delivery_id, "Invalid webhook signature");
                return Err(AppError::Unauthorized(anyhow::anyhow!(
                    "Invalid webhook signature"
                )));
            }
        }
        None => {
            tracing::warn!("Webhook secret not configured; accepting unsigned delivery");
        }
    }

    tracing::info!(event = %event, delivery_id = ?delivery_id, "Received GitHub webhook");

    let outcome = state
        .webhooks
        .handle(&event, delivery_id, &body)
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;

    let response = match outcome {
        WebhookOutcome::Pong { zen } => Json(WebhookAck {
            status: "pong",
            message: zen.unwrap_or_else(|| "pong".to_string()),
        })
        .into_response(),
        WebhookOutcome::Ignored { reason } => {
            tracing::info!(event = %event, reason = %reason, "Webhook ignored");
            Json(WebhookAck {
                status: "ignored",
                message: reason,
            })
            .into_response()
        }
        WebhookOutcome::Accepted(job) => {
            let accepted = WebhookAccepted {
                status: "accepted",
                event: job.event_type.clone(),
                repository: job.repository.clone(),
                files_queued: job.known_file_count(),
                delivery_id: job.delivery_id.clone(),
            };

            state.webhooks.spawn(job).map_err(|e| {
                tracing::warn!(event = %event, error = %e, "Webhook delivery refused");
                AppError::ServiceUnavailable
            })?;

            (StatusCode::ACCEPTED, Json(accepted)).into_response()
        }
    };

    Ok(response)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
