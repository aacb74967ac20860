use chrono::Utc;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use wp_publisher::config::EntryConfig;
use wp_publisher::publisher::Publisher;
use wp_publisher::states::StateStore;
use wp_publisher::status::PublishStatus;
use wp_publisher::wordpress::{PublishError, PublishRequest, WordPressService};

#[derive(Clone, Default)]
struct RecordingWordPress {
    responses: Arc<Mutex<VecDeque<Result<Option<u64>, PublishError>>>>,
    calls: Arc<Mutex<Vec<PublishRequest>>>,
}

impl RecordingWordPress {
    fn with_responses(responses: Vec<Result<Option<u64>, PublishError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    async fn calls(&self) -> Vec<PublishRequest> {
        self.calls.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl WordPressService for RecordingWordPress {
    async fn create_post(&self, request: &PublishRequest) -> Result<Option<u64>, PublishError> {
        self.calls.lock().await.push(request.clone());
        let mut guard = self.responses.lock().await;
        guard.pop_front().unwrap_or(Ok(Some(1)))
    }
}

fn server_error() -> PublishError {
    PublishError::Status {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: "database unavailable".into(),
    }
}

fn entry(custom_fields: &str, entities: &[&str]) -> EntryConfig {
    EntryConfig {
        wp_url: "https://example.com".into(),
        wp_user: "admin".into(),
        wp_password: "secret".into(),
        post_type: "posts".into(),
        custom_fields: custom_fields.into(),
        publish_interval: 0,
        entities: entities.iter().map(|e| e.to_string()).collect(),
    }
}

fn publisher(entry: &EntryConfig, service: &RecordingWordPress) -> Publisher {
    Publisher::new(entry.publisher_config(), Arc::new(service.clone()))
}

#[tokio::test]
async fn publish_sends_templated_post_with_meta() {
    let service = RecordingWordPress::default();
    let publisher = publisher(
        &entry(r#"{"field1":"value1"}"#, &["sensor.temperature"]),
        &service,
    );

    publisher.publish("sensor.temperature", "25°C").await.unwrap();

    let calls = service.calls().await;
    assert_eq!(calls.len(), 1);
    let body = serde_json::to_value(&calls[0]).unwrap();
    assert_eq!(body["title"], "Sensor Update: sensor.temperature");
    assert_eq!(body["content"], "New state: 25°C");
    assert_eq!(body["status"], "publish");
    assert_eq!(
        body["meta"],
        serde_json::json!([{ "key": "field1", "value": "value1" }])
    );
}

#[tokio::test]
async fn malformed_custom_fields_publish_without_meta() {
    let service = RecordingWordPress::default();
    let publisher = publisher(&entry("field1=value1", &["sensor.a"]), &service);
    assert!(publisher.config().custom_fields.is_empty());

    publisher.publish("sensor.a", "on").await.unwrap();
    assert!(service.calls().await[0].meta.is_empty());
}

#[tokio::test]
async fn new_publisher_is_idle() {
    let service = RecordingWordPress::default();
    let publisher = publisher(&entry("", &["sensor.a"]), &service);
    assert_eq!(publisher.status(), PublishStatus::Idle);
    assert_eq!(publisher.outcome().revision, 0);
}

#[tokio::test]
async fn failure_records_error_and_keeps_last_success_time() {
    let service = RecordingWordPress::with_responses(vec![Ok(Some(10)), Err(server_error())]);
    let publisher = publisher(&entry("", &["sensor.a", "sensor.b"]), &service);

    publisher.publish("sensor.a", "1").await.unwrap();
    let after_success = publisher.outcome();

    let err = publisher.publish("sensor.b", "2").await.unwrap_err();
    assert!(matches!(err, PublishError::Status { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR));

    let outcome = publisher.outcome();
    assert_eq!(
        outcome.last_publish_error.as_deref(),
        Some(err.to_string().as_str())
    );
    assert!(outcome
        .last_publish_error
        .as_deref()
        .unwrap()
        .contains("database unavailable"));
    assert_eq!(outcome.last_published_time, after_success.last_published_time);
    assert_eq!(outcome.last_published_entity.as_deref(), Some("sensor.a"));
    assert_eq!(publisher.status(), PublishStatus::Error);
}

#[tokio::test]
async fn success_after_failure_clears_error() {
    let service = RecordingWordPress::with_responses(vec![Err(server_error()), Ok(Some(11))]);
    let publisher = publisher(&entry("", &["sensor.a", "sensor.b"]), &service);

    assert!(publisher.publish("sensor.a", "1").await.is_err());
    let failed = publisher.outcome();
    assert!(failed.last_publish_error.is_some());
    assert_eq!(failed.last_published_time, None);
    assert_eq!(publisher.status(), PublishStatus::Error);

    let before = Utc::now();
    publisher.publish("sensor.b", "2").await.unwrap();
    let after = Utc::now();

    let outcome = publisher.outcome();
    assert_eq!(outcome.last_publish_error, None);
    assert_eq!(outcome.last_published_entity.as_deref(), Some("sensor.b"));
    let published_at = outcome.last_published_time.unwrap();
    assert!(published_at >= before && published_at <= after);
    assert_eq!(outcome.revision, 2);
    assert_eq!(publisher.status(), PublishStatus::Ok);
}

#[tokio::test]
async fn concurrent_publishes_each_record_once() {
    let service = RecordingWordPress::default();
    let publisher = publisher(&entry("", &["sensor.a", "sensor.b"]), &service);

    let (a, b) = tokio::join!(
        publisher.publish("sensor.a", "1"),
        publisher.publish("sensor.b", "2")
    );
    a.unwrap();
    b.unwrap();

    let outcome = publisher.outcome();
    assert_eq!(outcome.revision, 2);
    let last = outcome.last_published_entity.unwrap();
    assert!(last == "sensor.a" || last == "sensor.b");
}

#[tokio::test]
async fn batch_skips_missing_entities_and_publishes_in_order() {
    let service = RecordingWordPress::default();
    let publisher = publisher(
        &entry("", &["sensor.c", "sensor.a", "sensor.missing"]),
        &service,
    );
    let states = StateStore::new();
    states.set("sensor.a", "1");
    states.set("sensor.c", "3");
    states.set("sensor.untracked", "9");

    let published = publisher.publish_batch(&states).await.unwrap();
    assert_eq!(published.len(), 2);
    assert_eq!(published["sensor.a"], "1");

    let titles: Vec<String> = service
        .calls()
        .await
        .into_iter()
        .map(|c| c.title)
        .collect();
    assert_eq!(
        titles,
        vec!["Sensor Update: sensor.a", "Sensor Update: sensor.c"]
    );
}

#[tokio::test]
async fn batch_stops_at_first_failure() {
    let service = RecordingWordPress::with_responses(vec![Err(server_error())]);
    let publisher = publisher(&entry("", &["sensor.a", "sensor.b"]), &service);
    let states = StateStore::new();
    states.set("sensor.a", "1");
    states.set("sensor.b", "2");

    assert!(publisher.publish_batch(&states).await.is_err());
    assert_eq!(service.calls().await.len(), 1);
    assert_eq!(publisher.status(), PublishStatus::Error);
}
