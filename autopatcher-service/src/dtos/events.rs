use serde::{Deserialize, Serialize};

use crate::models::WebhookEvent;

#[derive(Debug, Deserialize)]
pub struct EventListParams {
    pub limit: Option<usize>,
    pub repository: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EventListResponse {
    pub events: Vec<WebhookEvent>,
    pub count: usize,
}

impl From<Vec<WebhookEvent>> for EventListResponse {
    fn from(events: Vec<WebhookEvent>) -> Self {
        Self {
            count: events.len(),
            events,
        }
    }
}
