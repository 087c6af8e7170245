mod common;

use autopatcher_service::config::AutopatcherConfig;
use autopatcher_service::models::EventStatus;
use autopatcher_service::services::providers::mock::MockTextProvider;
use autopatcher_service::startup::Application;
use common::{pull_request_payload, push_payload, TestApp, TEST_WEBHOOK_SECRET};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn serve_raw(app: &TestApp, raw_path: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(raw_path))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&app.github)
        .await;
}

#[tokio::test]
async fn missing_event_header_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.url("/api/webhooks/github"))
        .header("content-type", "application/json")
        .body("{}")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn signature_is_required_when_secret_is_configured() {
    let app = TestApp::spawn_with(|config| {
        config.github.webhook_secret = Some(secrecy::Secret::new(TEST_WEBHOOK_SECRET.to_string()));
    })
    .await;
    let ping = json!({"zen": "Keep it logically awesome.", "hook_id": 1});

    let unsigned = app.send_webhook("ping", &ping, None).await;
    assert_eq!(unsigned.status(), 401);

    let wrong = app.send_webhook("ping", &ping, Some("not-the-secret")).await;
    assert_eq!(wrong.status(), 401);

    let signed = app
        .send_webhook("ping", &ping, Some(TEST_WEBHOOK_SECRET))
        .await;
    assert_eq!(signed.status(), 200);
    let body: serde_json::Value = signed.json().await.unwrap();
    assert_eq!(body["status"], "pong");
    assert_eq!(body["message"], "Keep it logically awesome.");
}

#[tokio::test]
async fn push_with_yaml_changes_is_analyzed_in_background() {
    let app = TestApp::spawn().await;
    serve_raw(&app, "/raw/octo/repo/abc123/.github/workflows/ci.yml", "on: push\n").await;
    serve_raw(&app, "/raw/octo/repo/abc123/docker-compose.yaml", "services: {}\n").await;

    app.llm.push_response(
        r#"{"corrected_yaml":"on: [push]\n","explanation":"Looks fine","is_correct":true}"#,
    );
    app.llm.push_response(
        r#"{"corrected_yaml":"services: {}\n","explanation":"Looks fine","is_correct":true}"#,
    );

    let payload = push_payload(
        "octo/repo",
        &[".github/workflows/ci.yml", "README.md"],
        &["docker-compose.yaml"],
    );
    let response = app.send_webhook("push", &payload, None).await;

    assert_eq!(response.status(), 202);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["event"], "push");
    assert_eq!(body["repository"], "octo/repo");
    assert_eq!(body["files_queued"], 2);
    assert_eq!(body["delivery_id"], "delivery-1");

    let events = app.wait_for_events(1).await;
    let event = &events[0];
    assert_eq!(event.repository, "octo/repo");
    assert_eq!(event.event_type, "push");
    assert_eq!(event.status, EventStatus::Success);
    assert_eq!(event.commit_sha.as_deref(), Some("abc123"));
    assert_eq!(event.git_ref.as_deref(), Some("refs/heads/main"));
    assert_eq!(event.delivery_id.as_deref(), Some("delivery-1"));

    let files: Vec<&str> = event.files_analyzed.iter().map(|f| f.file.as_str()).collect();
    assert_eq!(files, vec![".github/workflows/ci.yml", "docker-compose.yaml"]);
    assert!(event
        .files_analyzed
        .iter()
        .all(|f| f.analysis.is_some() && f.original_content.is_some()));

    // The stored event is visible through the history API
    let fetched: serde_json::Value = app
        .client
        .get(app.url(&format!("/api/webhook-events/{}", event.id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["status"], "success");
}

#[tokio::test]
async fn failed_fetch_marks_event_partial() {
    let app = TestApp::spawn().await;
    serve_raw(&app, "/raw/octo/repo/abc123/good.yml", "a: 1\n").await;
    Mock::given(method("GET"))
        .and(path("/raw/octo/repo/abc123/missing.yml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&app.github)
        .await;

    let payload = push_payload("octo/repo", &["good.yml", "missing.yml"], &[]);
    let response = app.send_webhook("push", &payload, None).await;
    assert_eq!(response.status(), 202);

    let events = app.wait_for_events(1).await;
    let event = &events[0];
    assert_eq!(event.status, EventStatus::Partial);

    let missing = event
        .files_analyzed
        .iter()
        .find(|f| f.file == "missing.yml")
        .unwrap();
    assert!(missing
        .error
        .as_deref()
        .unwrap()
        .starts_with("Failed to fetch file"));
    assert!(missing.analysis.is_none());
}

#[tokio::test]
async fn analysis_failure_for_every_file_marks_event_error() {
    let app = TestApp::spawn().await;
    serve_raw(&app, "/raw/octo/repo/abc123/ci.yml", "a: 1\n").await;
    app.llm.push_response("not json at all");

    let payload = push_payload("octo/repo", &["ci.yml"], &[]);
    app.send_webhook("push", &payload, None).await;

    let events = app.wait_for_events(1).await;
    assert_eq!(events[0].status, EventStatus::Error);
    assert!(events[0].files_analyzed[0]
        .error
        .as_deref()
        .unwrap()
        .starts_with("Analysis failed"));
}

#[tokio::test]
async fn pull_request_files_are_listed_and_fetched_at_head() {
    let app = TestApp::spawn().await;

    Mock::given(method("GET"))
        .and(path("/api/repos/octo/repo/pulls/7/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "filename": "deploy/app.yaml", "status": "modified" },
            { "filename": "old.yml", "status": "removed" },
            { "filename": "src/main.rs", "status": "added" }
        ])))
        .expect(1)
        .mount(&app.github)
        .await;
    serve_raw(&app, "/raw/octo/repo/def456/deploy/app.yaml", "replicas: 2\n").await;

    let response = app
        .send_webhook("pull_request", &pull_request_payload("octo/repo", "opened", 7), None)
        .await;

    assert_eq!(response.status(), 202);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["event"], "pull_request");
    assert!(body.get("files_queued").is_none());

    let events = app.wait_for_events(1).await;
    let event = &events[0];
    assert_eq!(event.event_type, "pull_request");
    assert_eq!(event.commit_sha.as_deref(), Some("def456"));
    assert_eq!(event.files_analyzed.len(), 1);
    assert_eq!(event.files_analyzed[0].file, "deploy/app.yaml");
    assert_eq!(event.status, EventStatus::Success);
}

#[tokio::test]
async fn pull_request_listing_failure_is_recorded() {
    let app = TestApp::spawn().await;

    Mock::given(method("GET"))
        .and(path("/api/repos/octo/repo/pulls/9/files"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&app.github)
        .await;

    app.send_webhook("pull_request", &pull_request_payload("octo/repo", "synchronize", 9), None)
        .await;

    let events = app.wait_for_events(1).await;
    assert_eq!(events[0].status, EventStatus::Error);
    assert_eq!(events[0].files_analyzed[0].file, "pull request #9");
}

#[tokio::test]
async fn deliveries_without_work_are_acknowledged_and_not_stored() {
    let app = TestApp::spawn().await;

    let cases = [
        ("pull_request", pull_request_payload("octo/repo", "closed", 3)),
        ("issues", json!({"action": "opened"})),
        ("push", push_payload("octo/repo", &["README.md"], &["src/lib.rs"])),
    ];

    for (event, payload) in cases {
        let response = app.send_webhook(event, &payload, None).await;
        assert_eq!(response.status(), 200, "event {}", event);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["status"], "ignored", "event {}", event);
    }

    assert!(app.store.list(10).await.unwrap().is_empty());
    assert!(app.llm.prompts().is_empty());
}

#[tokio::test]
async fn invalid_payload_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .send_webhook("push", &json!({"ref": "refs/heads/main"}), None)
        .await;

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn files_beyond_the_event_limit_are_skipped() {
    let app = TestApp::spawn_with(|config| config.webhook.max_files_per_event = 1).await;
    serve_raw(&app, "/raw/octo/repo/abc123/a.yml", "a: 1\n").await;

    let payload = push_payload("octo/repo", &["a.yml", "b.yml"], &[]);
    let response = app.send_webhook("push", &payload, None).await;
    assert_eq!(response.status(), 202);

    let events = app.wait_for_events(1).await;
    let event = &events[0];
    assert_eq!(event.status, EventStatus::Partial);
    assert_eq!(event.files_analyzed.len(), 2);
    assert!(event.files_analyzed[0].is_success());
    assert_eq!(event.files_analyzed[1].file, "b.yml");
    assert!(event.files_analyzed[1]
        .error
        .as_deref()
        .unwrap()
        .starts_with("Skipped"));
    assert_eq!(app.llm.prompts().len(), 1);
}

#[tokio::test]
async fn results_keep_push_order_when_earlier_files_are_slower() {
    let app = TestApp::spawn_with(|config| config.webhook.concurrency = 3).await;
    Mock::given(method("GET"))
        .and(path("/raw/octo/repo/abc123/a.yml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("a: 1\n")
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&app.github)
        .await;
    serve_raw(&app, "/raw/octo/repo/abc123/b.yml", "b: 1\n").await;
    serve_raw(&app, "/raw/octo/repo/abc123/ci/%23c.yml", "c: 1\n").await;

    let payload = push_payload("octo/repo", &["a.yml", "b.yml", "ci/#c.yml"], &[]);
    assert_eq!(app.send_webhook("push", &payload, None).await.status(), 202);

    let events = app.wait_for_events(1).await;
    let files: Vec<&str> = events[0]
        .files_analyzed
        .iter()
        .map(|f| f.file.as_str())
        .collect();
    assert_eq!(files, vec!["a.yml", "b.yml", "ci/#c.yml"]);
    assert_eq!(events[0].status, EventStatus::Success);

    // Files were analyzed concurrently, so the slow one was not analyzed first
    let prompts = app.llm.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(!prompts[0].user.ends_with("a: 1\n"));
}

#[tokio::test]
async fn deliveries_beyond_the_job_limit_are_refused() {
    let app = TestApp::spawn_with(|config| config.webhook.max_inflight_jobs = 1).await;
    Mock::given(method("GET"))
        .and(path("/raw/octo/repo/abc123/slow.yml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("a: 1\n")
                .set_delay(Duration::from_millis(800)),
        )
        .mount(&app.github)
        .await;

    let first = app
        .send_webhook("push", &push_payload("octo/repo", &["slow.yml"], &[]), None)
        .await;
    assert_eq!(first.status(), 202);

    let second = app
        .send_webhook("push", &push_payload("octo/repo", &["slow.yml"], &[]), None)
        .await;
    assert_eq!(second.status(), 503);
    let body: serde_json::Value = second.json().await.unwrap();
    assert!(body["error"].is_string());

    // Only the accepted delivery is recorded
    let events = app.wait_for_events(1).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(app.store.list(10).await.unwrap().len(), events.len());
}

#[tokio::test]
async fn shutdown_waits_for_accepted_jobs() {
    let github = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/raw/octo/repo/abc123/ci.yml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("on: push\n")
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&github)
        .await;

    let mut config = AutopatcherConfig::local();
    config.github.api_url = format!("{}/api", github.uri());
    config.github.raw_url = format!("{}/raw", github.uri());
    let app = Application::build_with_provider(config, Arc::new(MockTextProvider::new(true)))
        .await
        .unwrap();
    let address = format!("http://127.0.0.1:{}", app.port());
    let store = app.state().store.clone();

    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(app.run_until(async move {
        stopped.await.ok();
    }));

    let payload = serde_json::to_vec(&push_payload("octo/repo", &["ci.yml"], &[])).unwrap();
    let response = reqwest::Client::new()
        .post(format!("{}/api/webhooks/github", address))
        .header("content-type", "application/json")
        .header("x-github-event", "push")
        .body(payload)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);
    assert!(store.list(10).await.unwrap().is_empty());

    stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(10), server)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();

    let events = store.list(10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, EventStatus::Success);
}
