#![allow(dead_code)]

use autopatcher_service::config::AutopatcherConfig;
use autopatcher_service::models::WebhookEvent;
use autopatcher_service::services::providers::mock::MockTextProvider;
use autopatcher_service::services::EventStore;
use autopatcher_service::startup::Application;
use std::sync::Arc;
use std::time::Duration;
use wiremock::MockServer;

pub const TEST_WEBHOOK_SECRET: &str = "test-webhook-secret";

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub store: Arc<dyn EventStore>,
    pub llm: Arc<MockTextProvider>,
    /// Stands in for both the GitHub API (`/api`) and raw content (`/raw`).
    pub github: MockServer,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Spawn with a tweaked configuration.
    pub async fn spawn_with(customize: impl FnOnce(&mut AutopatcherConfig)) -> Self {
        let github = MockServer::start().await;

        let mut config = AutopatcherConfig::local();
        config.github.api_url = format!("{}/api", github.uri());
        config.github.raw_url = format!("{}/raw", github.uri());
        customize(&mut config);

        let llm = Arc::new(MockTextProvider::new(true));
        let app = Application::build_with_provider(config, llm.clone())
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let store = app.state().store.clone();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to accept connections
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            store,
            llm,
            github,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Send a GitHub webhook delivery, signed when `secret` is given.
    pub async fn send_webhook(
        &self,
        event: &str,
        body: &serde_json::Value,
        secret: Option<&str>,
    ) -> reqwest::Response {
        let payload = serde_json::to_vec(body).expect("Failed to encode payload");

        let mut request = self
            .client
            .post(self.url("/api/webhooks/github"))
            .header("content-type", "application/json")
            .header("x-github-event", event)
            .header("x-github-delivery", "delivery-1");

        if let Some(secret) = secret {
            let signature = service_core::utils::signature::generate_signature(secret, &payload)
                .expect("Failed to sign payload");
            request = request.header("x-hub-signature-256", signature);
        }

        request
            .body(payload)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Poll the store until `count` events are present (or give up).
    pub async fn wait_for_events(&self, count: usize) -> Vec<WebhookEvent> {
        for _ in 0..100 {
            let events = self.store.list(200).await.expect("Failed to list events");
            if events.len() >= count {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("Timed out waiting for {} webhook events", count);
    }
}

pub fn push_payload(repository: &str, added: &[&str], modified: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "ref": "refs/heads/main",
        "before": "0000000000000000000000000000000000000000",
        "after": "abc123",
        "deleted": false,
        "repository": { "full_name": repository },
        "commits": [
            { "id": "abc123", "added": added, "modified": modified, "removed": [] }
        ]
    })
}

pub fn pull_request_payload(repository: &str, action: &str, number: u64) -> serde_json::Value {
    serde_json::json!({
        "action": action,
        "number": number,
        "pull_request": {
            "head": { "ref": "feature", "sha": "def456", "repo": { "full_name": repository } }
        },
        "repository": { "full_name": repository }
    })
}
