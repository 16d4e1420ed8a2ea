// Integration tests for the polling engine.
//
// The engine is driven through a scripted Transport fake; once the
// script is exhausted the fake keeps answering with empty batches, so
// the loop stays healthy for lifecycle tests. HTTP-level behavior
// (paths, query parameters, the identity probe) is covered separately
// with wiremock against the real transport.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use telepoll_client::{
    BackoffStrategy, ClientError, Poller, PollerConfig, Transport, TransportError, Update,
    UpdateHandler, UpdateKind,
};

// =============================================================================
// Test doubles
// =============================================================================

struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<Url>>,
}

impl ScriptedTransport {
    fn new(responses: Vec<Result<String, String>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: Url) -> Result<String, TransportError> {
        self.requests.lock().unwrap().push(url);

        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(body)) => Ok(body),
            Some(Err(message)) => Err(TransportError(message)),
            None => Ok(r#"{"ok":true,"result":[]}"#.to_string()),
        }
    }
}

struct CountingBackoff {
    waits: AtomicUsize,
}

impl CountingBackoff {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            waits: AtomicUsize::new(0),
        })
    }
}

impl BackoffStrategy for CountingBackoff {
    fn next_backoff(&self, _attempt: u32) -> Duration {
        self.waits.fetch_add(1, Ordering::SeqCst);
        Duration::from_millis(1)
    }

    fn reset(&self) {}
}

struct RecordingHandler {
    seen: Mutex<Vec<i64>>,
    fail_on: Option<i64>,
}

impl RecordingHandler {
    fn new(fail_on: Option<i64>) -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            fail_on,
        })
    }

    fn seen(&self) -> Vec<i64> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpdateHandler for RecordingHandler {
    async fn handle(&self, _cancel: CancellationToken, update: Update) -> anyhow::Result<()> {
        self.seen.lock().unwrap().push(update.update_id);
        if self.fail_on == Some(update.update_id) {
            anyhow::bail!("simulated handler failure");
        }
        Ok(())
    }
}

fn batch_body(ids: &[i64]) -> String {
    let updates: Vec<_> = ids
        .iter()
        .map(|id| json!({"update_id": id, "message": {"message_id": id, "text": "hi"}}))
        .collect();
    json!({"ok": true, "result": updates}).to_string()
}

fn error_body(code: i64, retry_after: Option<u64>) -> String {
    let mut body = json!({"ok": false, "error_code": code, "description": "test error"});
    if let Some(after) = retry_after {
        body["parameters"] = json!({"retry_after": after});
    }
    body.to_string()
}

fn test_config(transport: Arc<ScriptedTransport>) -> PollerConfig {
    PollerConfig::new("test-token")
        .with_poll_interval(Duration::from_millis(5))
        .with_timeout(Duration::from_secs(1))
        .with_transport(transport)
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn start_stop_lifecycle() {
    let transport = ScriptedTransport::new(vec![]);
    let poller = Poller::new(test_config(transport)).unwrap();
    let cancel = CancellationToken::new();

    assert!(!poller.is_running());

    poller.start(cancel.clone()).unwrap();
    assert!(poller.is_running());

    // A second start must not spawn a duplicate loop.
    assert!(matches!(
        poller.start(cancel.clone()),
        Err(ClientError::AlreadyRunning)
    ));

    poller.stop().await;
    assert!(!poller.is_running());

    // Stop is idempotent.
    poller.stop().await;

    // A stopped poller cannot be reused.
    assert!(matches!(
        poller.start(cancel),
        Err(ClientError::AlreadyStopped)
    ));
}

#[tokio::test]
async fn stop_before_start_is_a_noop() {
    let transport = ScriptedTransport::new(vec![]);
    let poller = Poller::new(test_config(transport)).unwrap();

    poller.stop().await;
    poller.stop().await;
    assert!(!poller.is_running());
}

#[tokio::test]
async fn stop_closes_the_updates_queue() {
    let transport = ScriptedTransport::new(vec![]);
    let poller = Poller::new(test_config(transport)).unwrap();
    let mut updates = poller.take_updates().unwrap();

    poller.start(CancellationToken::new()).unwrap();
    poller.stop().await;

    // Drain returns None once the queue is closed.
    assert!(updates.recv().await.is_none());
}

#[tokio::test]
async fn second_start_does_not_double_poll() {
    let transport = ScriptedTransport::new(vec![]);
    let poller = Poller::new(
        test_config(transport.clone()).with_poll_interval(Duration::from_millis(20)),
    )
    .unwrap();
    let cancel = CancellationToken::new();

    poller.start(cancel.clone()).unwrap();
    assert!(poller.start(cancel).is_err());

    tokio::time::sleep(Duration::from_millis(200)).await;
    poller.stop().await;

    // One loop at 20ms cadence makes ~10 calls in 200ms; a duplicate
    // loop would roughly double that.
    assert!(transport.calls() <= 14, "calls = {}", transport.calls());
}

#[tokio::test]
async fn cancellation_token_stops_the_loop() {
    let transport = ScriptedTransport::new(vec![]);
    let poller = Poller::new(test_config(transport.clone())).unwrap();
    let cancel = CancellationToken::new();

    poller.start(cancel.clone()).unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    cancel.cancel();
    tokio::time::sleep(Duration::from_millis(30)).await;
    let calls_after_cancel = transport.calls();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.calls(), calls_after_cancel);

    poller.stop().await;
}

// =============================================================================
// Delivery and offset bookkeeping
// =============================================================================

#[tokio::test]
async fn delivers_batches_in_order_and_advances_offset() {
    let transport =
        ScriptedTransport::new(vec![Ok(batch_body(&[1, 2])), Ok(batch_body(&[3]))]);
    let poller = Poller::new(test_config(transport)).unwrap();
    let mut updates = poller.take_updates().unwrap();

    poller.start(CancellationToken::new()).unwrap();

    let mut received = Vec::new();
    for _ in 0..3 {
        let update = tokio::time::timeout(Duration::from_secs(1), updates.recv())
            .await
            .expect("timed out waiting for update")
            .expect("queue closed early");
        received.push(update.update_id);
    }

    poller.stop().await;

    assert_eq!(received, vec![1, 2, 3]);
    assert_eq!(poller.offset(), 4);
}

#[tokio::test]
async fn offset_is_sent_back_to_the_server() {
    let transport = ScriptedTransport::new(vec![Ok(batch_body(&[10]))]);
    let poller = Poller::new(test_config(transport.clone())).unwrap();
    let mut updates = poller.take_updates().unwrap();

    poller.start(CancellationToken::new()).unwrap();

    tokio::time::timeout(Duration::from_secs(1), updates.recv())
        .await
        .unwrap()
        .unwrap();

    // Give the loop a couple more ticks, then look at the follow-up
    // request.
    tokio::time::sleep(Duration::from_millis(50)).await;
    poller.stop().await;

    let requests = transport.requests.lock().unwrap();
    let first = &requests[0];
    assert!(
        !first.query_pairs().any(|(k, _)| k == "offset"),
        "offset must be omitted while unset"
    );

    let last = requests.last().unwrap();
    let offset = last
        .query_pairs()
        .find(|(k, _)| k == "offset")
        .map(|(_, v)| v.to_string());
    assert_eq!(offset.as_deref(), Some("11"));
}

#[tokio::test]
async fn decode_failure_is_retried() {
    let transport = ScriptedTransport::new(vec![
        Ok("not json at all".to_string()),
        Ok(batch_body(&[5])),
    ]);
    let config = test_config(transport).with_backoff(CountingBackoff::new());
    let poller = Poller::new(config).unwrap();
    let mut updates = poller.take_updates().unwrap();

    poller.start(CancellationToken::new()).unwrap();

    let update = tokio::time::timeout(Duration::from_secs(1), updates.recv())
        .await
        .expect("decode failure should not kill the loop")
        .unwrap();
    assert_eq!(update.update_id, 5);

    poller.stop().await;
}

// =============================================================================
// Error classification and retry policy
// =============================================================================

#[tokio::test]
async fn client_error_stops_after_one_attempt() {
    let transport = ScriptedTransport::new(vec![Ok(error_body(400, None))]);
    let poller = Poller::new(test_config(transport.clone())).unwrap();
    let mut updates = poller.take_updates().unwrap();

    poller.start(CancellationToken::new()).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(transport.calls(), 1);
    assert!(updates.try_recv().is_err(), "no updates may be emitted");

    // A fatal stop does not flip the running flag or close the queue;
    // only stop() does.
    assert!(poller.is_running());
    poller.stop().await;
    assert!(updates.recv().await.is_none());
}

#[tokio::test]
async fn max_retries_exhausts_the_budget() {
    let mut failures = Vec::new();
    for _ in 0..20 {
        failures.push(Err("connection refused".to_string()));
    }
    let transport = ScriptedTransport::new(failures);
    let backoff = CountingBackoff::new();
    let config = test_config(transport.clone())
        .with_max_retries(3)
        .with_backoff(backoff.clone());
    let poller = Poller::new(config).unwrap();

    poller.start(CancellationToken::new()).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Attempts 1..=3 wait and retry, attempt 4 exceeds the budget.
    assert_eq!(transport.calls(), 4);
    assert_eq!(backoff.waits.load(Ordering::SeqCst), 3);

    // No further fetches after the loop gave up.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.calls(), 4);

    poller.stop().await;
}

#[tokio::test(start_paused = true)]
async fn retry_after_hint_is_honored_exactly() {
    let transport = ScriptedTransport::new(vec![
        Ok(error_body(429, Some(30))),
        Ok(batch_body(&[7])),
    ]);
    let poller = Poller::new(test_config(transport)).unwrap();
    let mut updates = poller.take_updates().unwrap();

    let started = tokio::time::Instant::now();
    poller.start(CancellationToken::new()).unwrap();

    let update = updates.recv().await.unwrap();
    assert_eq!(update.update_id, 7);

    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_secs(30),
        "delivered after {elapsed:?}, expected the 30s hint to be waited out"
    );
    assert!(elapsed < Duration::from_secs(40));

    poller.stop().await;
}

// =============================================================================
// Dispatch adapter
// =============================================================================

#[tokio::test]
async fn handler_failure_does_not_stop_the_drain() {
    let transport =
        ScriptedTransport::new(vec![Ok(batch_body(&[1])), Ok(batch_body(&[2, 3]))]);
    let poller = Poller::new(test_config(transport)).unwrap();
    let handler = RecordingHandler::new(Some(1));

    poller
        .start_with_handler(CancellationToken::new(), handler.clone())
        .unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(1);
    while handler.seen().len() < 3 && std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    poller.stop().await;

    assert_eq!(handler.seen(), vec![1, 2, 3]);
}

#[tokio::test]
async fn start_with_handler_requires_the_receiver() {
    let transport = ScriptedTransport::new(vec![]);
    let poller = Poller::new(test_config(transport)).unwrap();
    let _updates = poller.take_updates().unwrap();

    let handler = RecordingHandler::new(None);
    assert!(matches!(
        poller.start_with_handler(CancellationToken::new(), handler),
        Err(ClientError::ReceiverTaken)
    ));
    assert!(!poller.is_running());
}

// =============================================================================
// HTTP layer (real transport against wiremock)
// =============================================================================

#[tokio::test]
async fn get_me_returns_the_identity_record() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/bottest-token/getMe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {
                "id": 123456789i64,
                "is_bot": true,
                "first_name": "TestBot",
                "username": "test_bot"
            }
        })))
        .mount(&server)
        .await;

    let poller = Poller::new(
        PollerConfig::new("test-token").with_base_url(server.uri()),
    )
    .unwrap();

    let user = poller.get_me().await.unwrap();
    assert_eq!(user.id, 123456789);
    assert!(user.is_bot);
    assert_eq!(user.first_name, "TestBot");
    assert_eq!(user.username.as_deref(), Some("test_bot"));
}

#[tokio::test]
async fn get_me_surfaces_api_failures_directly() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/botbad-token/getMe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": false,
            "error_code": 401,
            "description": "Unauthorized"
        })))
        .mount(&server)
        .await;

    let poller = Poller::new(
        PollerConfig::new("bad-token").with_base_url(server.uri()),
    )
    .unwrap();

    match poller.get_me().await {
        Err(ClientError::Api(api)) => {
            assert_eq!(api.code, 401);
            assert!(!api.is_retryable());
        }
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn fetch_request_encodes_query_parameters() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/bottest-token/getUpdates"))
        .and(query_param("timeout", "1"))
        .and(query_param("offset", "100"))
        .and(query_param(
            "allowed_updates",
            r#"["message","callback_query"]"#,
        ))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": []})),
        )
        .expect(1..)
        .mount(&server)
        .await;

    let config = PollerConfig::new("test-token")
        .with_base_url(server.uri())
        .with_poll_interval(Duration::from_millis(10))
        .with_timeout(Duration::from_secs(1))
        .with_allowed_updates(vec![UpdateKind::Message, UpdateKind::CallbackQuery]);
    let poller = Poller::new(config).unwrap();
    poller.set_offset(100);

    poller.start(CancellationToken::new()).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    poller.stop().await;

    // MockServer verifies the expectation on drop.
}
