pub mod assistant;
pub mod event_store;
pub mod github;
pub mod metrics;
pub mod prompts;
pub mod providers;
pub mod webhook_processor;

pub use assistant::{Assistant, AssistantError};
pub use event_store::{EventStore, MemoryEventStore, RedisEventStore, StoreError};
pub use github::{GitHubClient, GitHubError};
pub use webhook_processor::{WebhookOutcome, WebhookProcessor};
