use serde::Serialize;

/// Reply to a delivery whose analysis was queued.
#[derive(Debug, Serialize)]
pub struct WebhookAccepted {
    pub status: &'static str,
    pub event: String,
    pub repository: String,
    /// `None` for pull requests, whose files are listed in the background.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_queued: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<String>,
}

/// Reply to a ping or to a delivery that needs no work.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
    pub message: String,
}
