#![warn(missing_docs)]
//! # replay-telemetry
//!
//! ## Purpose
//! The Telemetry Pipeline: the `recordXxx` façade every recorder calls,
//! owner of the event ring, batch serialization, heartbeat batching,
//! deferred-mode gating, and the dead-tap detector.
//!
//! ## Responsibilities
//! - Push typed events into the event ring with a wall-clock timestamp.
//! - Drain the ring byte-bounded and assign a strictly increasing
//!   `batchSeq` per batch attempt.
//! - Gate dispatch behind deferred mode, still enqueuing while deferred.
//! - Detect dead taps: a non-interactive tap with no `navigation`/`input`
//!   response inside the configured window.
//!
//! ## Data flow
//! Recorders -> [`TelemetryPipeline::record_event`]/[`TelemetryPipeline::record_tap`]
//! -> [`replay_core::EventRing`] -> heartbeat or explicit `dispatch_now` ->
//! [`TelemetryPipeline::drain_batch`] -> caller gzips and hands the batch to
//! the dispatcher.
//!
//! ## Ownership and lifetimes
//! The pipeline owns the ring exclusively; recorders hold no reference to
//! it, only a handle to the pipeline itself.
//!
//! ## Error model
//! Construction failures are [`TelemetryError`]; recording itself is
//! infallible at the call site, per the engine's principle that recorders
//! never throw across the public API.
//!
//! ## Security and privacy notes
//! This crate does not log event payload content; only counts and lane
//! metadata are ever traced.

use replay_core::{DeviceInfo, EventBatch, EventPayload, EventRecord, EventRing, GestureDetail, TouchPoint};
use thiserror::Error;

/// Default event ring capacity.
pub const DEFAULT_RING_CAPACITY: usize = 5_000;
/// Default per-drain uncompressed byte budget.
pub const DEFAULT_DRAIN_BYTE_BUDGET: usize = 500_000;
/// Default heartbeat interval, milliseconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 5_000;
/// Dead-tap response window, milliseconds.
pub const DEAD_TAP_WINDOW_MS: u64 = 400;

/// Pipeline configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryConfig {
    /// Event ring capacity.
    pub ring_capacity: usize,
    /// Per-drain uncompressed byte budget.
    pub drain_byte_budget: usize,
    /// Heartbeat interval, milliseconds.
    pub heartbeat_interval_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            ring_capacity: DEFAULT_RING_CAPACITY,
            drain_byte_budget: DEFAULT_DRAIN_BYTE_BUDGET,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
        }
    }
}

/// The event-producing façade owning the ring, batching, and dead-tap
/// detection.
pub struct TelemetryPipeline {
    config: TelemetryConfig,
    ring: EventRing,
    deferred: bool,
    next_batch_seq: u64,
    last_tap_ts: Option<u64>,
    last_response_ts: Option<u64>,
    dead_tap_tally: u64,
}

impl TelemetryPipeline {
    /// Creates a new pipeline with `config`.
    ///
    /// # Errors
    /// Propagates [`replay_core::CoreError`] when `config.ring_capacity` is
    /// zero.
    pub fn new(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        let ring = EventRing::new(config.ring_capacity)
            .map_err(|error| TelemetryError::Configuration(error.to_string()))?;
        Ok(Self {
            config,
            ring,
            deferred: false,
            next_batch_seq: 0,
            last_tap_ts: None,
            last_response_ts: None,
            dead_tap_tally: 0,
        })
    }

    /// Enqueues a fully-formed event at `timestamp_ms`, updating
    /// `lastResponseTs` when the payload is a `navigation` or `input`
    /// record.
    pub fn record_event(&mut self, timestamp_ms: u64, payload: EventPayload) {
        if matches!(payload, EventPayload::Navigation { .. } | EventPayload::Input { .. }) {
            self.last_response_ts = Some(timestamp_ms);
        }
        self.ring.push(EventRecord::new(timestamp_ms, payload));
    }

    /// Records a tap. Interactive taps (against buttons/touch-handlers)
    /// bypass the dead-tap timer entirely; non-interactive taps arm it by
    /// recording `lastTapTs`. The caller is responsible for invoking
    /// [`Self::on_dead_tap_timer_fire`] at `timestamp_ms + `[`DEAD_TAP_WINDOW_MS`].
    pub fn record_tap(&mut self, timestamp_ms: u64, x: f64, y: f64, interactive: bool) {
        self.record_event(
            timestamp_ms,
            EventPayload::Touch(GestureDetail {
                gesture_type: "tap".to_string(),
                label: None,
                x,
                y,
                touches: vec![TouchPoint { x, y }],
                direction: None,
                scale: None,
                angle: None,
                count: None,
                frustration_kind: None,
            }),
        );
        if !interactive {
            self.last_tap_ts = Some(timestamp_ms);
        }
    }

    /// Called by the host's dead-tap timer at fire time. Emits and enqueues
    /// a `dead_tap` gesture event iff no `navigation`/`input` record was
    /// observed since the most recent non-interactive tap.
    pub fn on_dead_tap_timer_fire(&mut self, now_ms: u64) -> Option<EventPayload> {
        let last_tap = self.last_tap_ts?;
        let responded = self.last_response_ts.is_some_and(|ts| ts > last_tap);
        if responded {
            return None;
        }
        self.dead_tap_tally += 1;
        tracing::info!(now_ms, last_tap, "dead tap detected");
        let payload = EventPayload::Gesture(GestureDetail {
            gesture_type: "dead_tap".to_string(),
            label: None,
            x: 0.0,
            y: 0.0,
            touches: vec![],
            direction: None,
            scale: None,
            angle: None,
            count: None,
            frustration_kind: Some("dead_tap".to_string()),
        });
        self.record_event(now_ms, payload.clone());
        Some(payload)
    }

    /// Total dead taps emitted over this pipeline's lifetime.
    pub fn dead_tap_tally(&self) -> u64 {
        self.dead_tap_tally
    }

    /// Enters deferred mode: `record_event`/`record_tap` still enqueue, but
    /// [`Self::drain_batch`] returns `None` until [`Self::commit_deferred_data`]
    /// is called.
    pub fn enter_deferred_mode(&mut self) {
        tracing::info!("entering deferred mode, drains gated until commit");
        self.deferred = true;
    }

    /// `true` while deferred mode is active.
    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    /// Exits deferred mode, allowing the next drain to proceed.
    pub fn commit_deferred_data(&mut self) {
        tracing::info!("committing deferred data, drains unblocked");
        self.deferred = false;
    }

    /// Drains the ring byte-bounded by `drain_byte_budget` and wraps it in
    /// an [`EventBatch`] with the next `batchSeq`, building the envelope
    /// from `device`. Returns `None` while deferred or when the ring is
    /// empty; the `batchSeq` counter still only advances on an actual
    /// drain attempt.
    ///
    /// # Errors
    /// Propagates [`replay_core::CoreError`] from [`EventBatch::new`] (e.g.
    /// the drained records exceed the uncompressed size cap, which should
    /// not happen given the byte-bounded drain, but is not assumed away).
    pub fn drain_batch(&mut self, device: DeviceInfo) -> Option<Result<EventBatch, TelemetryError>> {
        if self.deferred || self.ring.is_empty() {
            return None;
        }
        let drained = self.drain_byte_bounded();
        if drained.is_empty() {
            return None;
        }
        let batch_seq = self.next_batch_seq;
        self.next_batch_seq += 1;
        Some(
            EventBatch::new(batch_seq, drained, device)
                .map_err(|error| TelemetryError::Batching(error.to_string())),
        )
    }

    fn drain_byte_bounded(&mut self) -> Vec<EventRecord> {
        let all = self.ring.drain_all();
        let mut taken = Vec::new();
        let mut used = 0usize;
        let mut leftover = Vec::new();
        for record in all {
            let size = record.approximate_byte_len();
            if used + size > self.config.drain_byte_budget && !taken.is_empty() {
                leftover.push(record);
                continue;
            }
            used += size;
            taken.push(record);
        }
        if !leftover.is_empty() {
            self.ring.requeue_front(leftover);
        }
        taken
    }

    /// Re-enqueues a batch's events at the ring's head after a downstream
    /// serialization failure, in their original order.
    pub fn requeue_failed_batch(&mut self, batch: EventBatch) {
        self.ring.requeue_front(batch.events);
    }

    /// Current number of records held in the ring.
    pub fn ring_len(&self) -> usize {
        self.ring.len()
    }
}

/// Errors raised by pipeline construction and batching.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The pipeline was constructed with an invalid configuration.
    #[error("invalid telemetry configuration: {0}")]
    Configuration(String),
    /// Batch construction failed after a drain.
    #[error("batching failure: {0}")]
    Batching(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_device() -> DeviceInfo {
        DeviceInfo {
            platform: "ios".to_string(),
            model: "iPhone15,2".to_string(),
            os_name: "iOS".to_string(),
            os_version: "17.4".to_string(),
            device_fingerprint: "fp".to_string(),
            network_type: "wifi".to_string(),
            network_expensive: false,
            network_constrained: false,
            app_version: "1.0.0".to_string(),
            app_id: "com.example.app".to_string(),
            screen_width: 390.0,
            screen_height: 844.0,
            screen_scale: 3.0,
            sampled_out: false,
        }
    }

    #[test]
    fn dead_tap_fires_when_no_response_observed() {
        let mut pipeline = TelemetryPipeline::new(TelemetryConfig::default()).unwrap();
        pipeline.record_tap(0, 10.0, 20.0, false);
        let emitted = pipeline.on_dead_tap_timer_fire(400);
        assert!(emitted.is_some());
        assert_eq!(pipeline.dead_tap_tally(), 1);
    }

    #[test]
    fn dead_tap_suppressed_by_navigation() {
        let mut pipeline = TelemetryPipeline::new(TelemetryConfig::default()).unwrap();
        pipeline.record_tap(0, 10.0, 20.0, false);
        pipeline.record_event(
            200,
            EventPayload::Navigation { screen: "detail".to_string(), view_id: None, entering: true },
        );
        let emitted = pipeline.on_dead_tap_timer_fire(400);
        assert!(emitted.is_none());
        assert_eq!(pipeline.dead_tap_tally(), 0);
    }

    #[test]
    fn interactive_tap_never_arms_timer() {
        let mut pipeline = TelemetryPipeline::new(TelemetryConfig::default()).unwrap();
        pipeline.record_tap(0, 10.0, 20.0, true);
        assert!(pipeline.on_dead_tap_timer_fire(400).is_none());
    }

    #[test]
    fn drain_batch_assigns_strictly_increasing_seq() {
        let mut pipeline = TelemetryPipeline::new(TelemetryConfig::default()).unwrap();
        pipeline.record_event(0, EventPayload::Log { level: "info".to_string(), message: "a".to_string() });
        let first = pipeline.drain_batch(sample_device()).unwrap().unwrap();
        assert_eq!(first.batch_seq, 0);

        pipeline.record_event(1, EventPayload::Log { level: "info".to_string(), message: "b".to_string() });
        let second = pipeline.drain_batch(sample_device()).unwrap().unwrap();
        assert_eq!(second.batch_seq, 1);
        assert!(second.batch_seq > first.batch_seq);
    }

    #[test]
    fn deferred_mode_enqueues_but_does_not_drain() {
        let mut pipeline = TelemetryPipeline::new(TelemetryConfig::default()).unwrap();
        pipeline.enter_deferred_mode();
        pipeline.record_event(0, EventPayload::Log { level: "info".to_string(), message: "a".to_string() });
        assert!(pipeline.drain_batch(sample_device()).is_none());
        assert_eq!(pipeline.ring_len(), 1);

        pipeline.commit_deferred_data();
        let batch = pipeline.drain_batch(sample_device()).unwrap().unwrap();
        assert_eq!(batch.events.len(), 1);
    }

    #[test]
    fn requeue_restores_events_to_ring() {
        let mut pipeline = TelemetryPipeline::new(TelemetryConfig::default()).unwrap();
        pipeline.record_event(0, EventPayload::Log { level: "info".to_string(), message: "a".to_string() });
        let batch = pipeline.drain_batch(sample_device()).unwrap().unwrap();
        assert_eq!(pipeline.ring_len(), 0);
        pipeline.requeue_failed_batch(batch);
        assert_eq!(pipeline.ring_len(), 1);
    }
}
