//! Scenario: a transient presign failure followed by a successful retry
//! still ships exactly one batch, in original order, as `batchSeq=0`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use replay_core::{DeviceInfo, EventBatch, EventPayload, EventRecord, PendingUpload, UploadKind};
use replay_dispatch::{CircuitBreakerConfig, DispatchError, DispatchTransport, SegmentDispatcher, ShipOutcome};

struct FailOnceThenSucceed {
    attempts: AtomicUsize,
    shipped_payloads: Mutex<Vec<Vec<u8>>>,
}

impl FailOnceThenSucceed {
    fn new() -> Self {
        Self { attempts: AtomicUsize::new(0), shipped_payloads: Mutex::new(Vec::new()) }
    }
}

impl DispatchTransport for FailOnceThenSucceed {
    fn ship(&self, upload: &PendingUpload) -> Result<ShipOutcome, DispatchError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt == 0 {
            return Err(DispatchError::Retryable("presign timed out".to_string()));
        }
        self.shipped_payloads.lock().unwrap().push(upload.payload.clone());
        Ok(ShipOutcome::Uploaded)
    }
}

fn device() -> DeviceInfo {
    DeviceInfo {
        platform: "ios".to_string(),
        model: "scenario-device".to_string(),
        os_name: "iOS".to_string(),
        os_version: "17.0".to_string(),
        device_fingerprint: "scenario-fingerprint".to_string(),
        network_type: "wifi".to_string(),
        network_expensive: false,
        network_constrained: false,
        app_version: "1.0.0".to_string(),
        app_id: "com.example.scenario".to_string(),
        screen_width: 390.0,
        screen_height: 844.0,
        screen_scale: 3.0,
        sampled_out: false,
    }
}

#[test]
fn batch_ordering_after_failure_matches_documented_scenario() {
    let events: Vec<EventRecord> = (0..10u64)
        .map(|i| {
            EventRecord::new(
                i * 100,
                EventPayload::Touch(replay_core::GestureDetail {
                    gesture_type: "tap".to_string(),
                    label: Some("feed.like".to_string()),
                    x: 10.0,
                    y: 20.0,
                    touches: Vec::new(),
                    direction: None,
                    scale: None,
                    angle: None,
                    count: None,
                    frustration_kind: None,
                }),
            )
        })
        .collect();
    let batch = EventBatch::new(0, events, device()).expect("well-formed batch");
    let payload = batch.to_gzipped_json().expect("gzip encoding should succeed");
    let upload = PendingUpload::new(
        "scenario-session".to_string(),
        UploadKind::Events,
        payload,
        batch.events.first().map(|e| e.timestamp_ms),
        batch.events.last().map(|e| e.timestamp_ms),
        batch.events.len() as u32,
    );

    let transport = Arc::new(FailOnceThenSucceed::new());
    let mut dispatcher =
        SegmentDispatcher::new(transport.clone(), CircuitBreakerConfig::default(), 16)
            .expect("retry queue capacity is non-zero");

    let first_attempt = dispatcher.dispatch(upload, 1_000);
    assert!(matches!(first_attempt, Err(DispatchError::Retryable(_))));
    assert_eq!(dispatcher.retry_queue_len(), 1);

    assert!(dispatcher.pop_retry(1_500).is_none(), "backoff window has not elapsed yet");
    let retried = dispatcher.pop_retry(2_000).expect("requeued upload is available for retry");
    assert_eq!(retried.attempt, 1);

    let second_attempt = dispatcher.dispatch(retried, 2_000);
    assert!(matches!(second_attempt, Ok(ShipOutcome::Uploaded)));
    assert_eq!(dispatcher.retry_queue_len(), 0);

    let shipped = transport.shipped_payloads.lock().unwrap();
    assert_eq!(shipped.len(), 1, "batch should reach batch/complete exactly once");

    let shipped_batch = EventBatch::from_gzipped_json(&shipped[0]).expect("round-trips cleanly");
    assert_eq!(shipped_batch.batch_seq, 0);
    assert_eq!(shipped_batch.events.len(), 10);
    let timestamps: Vec<u64> = shipped_batch.events.iter().map(|e| e.timestamp_ms).collect();
    assert_eq!(timestamps, (0..10u64).map(|i| i * 100).collect::<Vec<_>>());
}
