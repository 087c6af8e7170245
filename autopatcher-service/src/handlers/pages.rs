use askama::Template;
use axum::extract::State;
use service_core::error::AppError;

use crate::models::WebhookEvent;
use crate::services::event_store::DEFAULT_LIST_LIMIT;
use crate::startup::AppState;

pub struct Endpoint {
    pub method: &'static str,
    pub path: &'static str,
    pub description: &'static str,
}

const ENDPOINTS: &[Endpoint] = &[
    Endpoint {
        method: "POST",
        path: "/api/analyze-yml",
        description: "Upload a .yml or .yaml file (multipart field `file`) for review",
    },
    Endpoint {
        method: "POST",
        path: "/api/generate-yml",
        description: "Describe a configuration file and get it written",
    },
    Endpoint {
        method: "POST",
        path: "/api/explain-code",
        description: "Get a step-by-step explanation of a code snippet",
    },
    Endpoint {
        method: "POST",
        path: "/api/summarize-diff",
        description: "Summarize a unified diff or a GitHub pull request",
    },
    Endpoint {
        method: "POST",
        path: "/api/webhooks/github",
        description: "GitHub webhook receiver for push and pull_request events",
    },
    Endpoint {
        method: "GET",
        path: "/api/webhook-events",
        description: "History of analyzed webhook deliveries",
    },
];

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub version: &'static str,
    pub endpoints: &'static [Endpoint],
}

pub async fn index() -> IndexTemplate {
    IndexTemplate {
        version: env!("CARGO_PKG_VERSION"),
        endpoints: ENDPOINTS,
    }
}

#[derive(Template)]
#[template(path = "monitor.html")]
pub struct MonitorTemplate {
    pub version: &'static str,
    pub events: Vec<WebhookEvent>,
}

pub async fn monitor(State(state): State<AppState>) -> Result<MonitorTemplate, AppError> {
    let events = state
        .store
        .list(DEFAULT_LIST_LIMIT)
        .await
        .map_err(|e| AppError::StorageError(anyhow::anyhow!(e)))?;

    Ok(MonitorTemplate {
        version: env!("CARGO_PKG_VERSION"),
        events,
    })
}
