pub mod assist;
pub mod events;
pub mod webhooks;

pub use assist::{DiffSource, ExplainCodeRequest, GenerateYamlRequest, SummarizeDiffRequest};
pub use events::{EventListParams, EventListResponse};
pub use webhooks::{WebhookAccepted, WebhookAck};
