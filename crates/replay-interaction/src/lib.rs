#![warn(missing_docs)]
//! # replay-interaction
//!
//! ## Purpose
//! Gesture frustration detection (rage-tap, scroll motion tracking), the ANR
//! watchdog, and the stability/crash marker writer.
//!
//! ## Responsibilities
//! - Detect rage-tap clusters from a short ring of recent taps.
//! - Accumulate scroll displacement into directional scroll records.
//! - Watch for main-thread stalls and emit a single ANR event per stall.
//! - Record that a fatal crash occurred so the next session can recover.
//!
//! ## Data flow
//! Raw taps/scrolls/pings are fed in by the host's gesture recognizers and
//! UI-executor watchdog; this crate emits [`replay_core::EventPayload`]
//! values the caller pushes into the event ring. It never touches the ring
//! directly.
//!
//! ## Ownership and lifetimes
//! Each detector owns only its own small ring/accumulator state; none of it
//! is shared across threads by this crate — callers run these on the UI
//! executor, per the engine's concurrency model.
//!
//! ## Error model
//! Detectors are infallible at the call site: malformed input (e.g. a
//! negative radius) is rejected at construction via [`InteractionError`],
//! never at tick time.
//!
//! ## Security and privacy notes
//! No coordinate data here is persisted beyond the in-memory ring; nothing
//! in this crate performs I/O.

use replay_core::{EventPayload, GestureDetail, ThreadState, TouchPoint};
use thiserror::Error;

/// Maximum number of recent taps retained for rage-tap detection.
pub const RAGE_TAP_RING_CAPACITY: usize = 10;

/// One recorded tap, tracked only for rage-tap detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TapObservation {
    /// Wall-clock ms at which the tap occurred.
    pub timestamp_ms: u64,
    /// Tap x coordinate, logical units.
    pub x: f64,
    /// Tap y coordinate, logical units.
    pub y: f64,
}

/// Configuration for rage-tap detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RageTapConfig {
    /// Minimum cluster size to call it a rage-tap.
    pub threshold: u32,
    /// Time window, milliseconds, within which `threshold` taps must fall.
    pub time_window_ms: u64,
    /// Maximum distance from centroid, logical units, for every tap in the
    /// cluster.
    pub radius: f64,
}

impl Default for RageTapConfig {
    fn default() -> Self {
        Self { threshold: 3, time_window_ms: 500, radius: 50.0 }
    }
}

/// Detects rage-tap clusters from a bounded ring of recent non-interactive
/// taps. Taps against interactive widgets must not be fed here — the caller
/// bypasses the detector entirely for those.
#[derive(Debug)]
pub struct RageTapDetector {
    config: RageTapConfig,
    ring: Vec<TapObservation>,
}

impl RageTapDetector {
    /// Creates a new detector with `config`.
    pub fn new(config: RageTapConfig) -> Self {
        Self { config, ring: Vec::with_capacity(RAGE_TAP_RING_CAPACITY) }
    }

    /// Records `tap`, evicting the oldest entry if the ring is full, then
    /// checks whether the ring now forms a rage-tap cluster. On a positive
    /// detection the ring is cleared and a `gesture` payload is returned.
    pub fn observe(&mut self, tap: TapObservation) -> Option<EventPayload> {
        if self.ring.len() == RAGE_TAP_RING_CAPACITY {
            self.ring.remove(0);
        }
        self.ring.push(tap);

        let cluster = self.recent_cluster(tap.timestamp_ms);
        if cluster.len() < self.config.threshold as usize {
            return None;
        }

        let (cx, cy) = centroid(&cluster);
        let within_radius = cluster
            .iter()
            .all(|t| distance(t.x, t.y, cx, cy) <= self.config.radius);
        if !within_radius {
            return None;
        }

        let count = cluster.len() as u32;
        tracing::info!(count, x = cx, y = cy, "rage tap detected");
        self.ring.clear();

        Some(EventPayload::Gesture(GestureDetail {
            gesture_type: "rage_tap".to_string(),
            label: None,
            x: cx,
            y: cy,
            touches: vec![TouchPoint { x: cx, y: cy }],
            direction: None,
            scale: None,
            angle: None,
            count: Some(count),
            frustration_kind: Some("rage_tap".to_string()),
        }))
    }

    fn recent_cluster(&self, now_ms: u64) -> Vec<TapObservation> {
        self.ring
            .iter()
            .copied()
            .filter(|tap| now_ms.saturating_sub(tap.timestamp_ms) <= self.config.time_window_ms)
            .collect()
    }
}

fn centroid(taps: &[TapObservation]) -> (f64, f64) {
    let n = taps.len() as f64;
    let sum_x: f64 = taps.iter().map(|t| t.x).sum();
    let sum_y: f64 = taps.iter().map(|t| t.y).sum();
    (sum_x / n, sum_y / n)
}

fn distance(x: f64, y: f64, cx: f64, cy: f64) -> f64 {
    ((x - cx).powi(2) + (y - cy).powi(2)).sqrt()
}

/// Gap after the last scroll update before a final "at rest" scroll record
/// is emitted, in milliseconds.
pub const SCROLL_END_DELAY_MS: u64 = 200;
/// Minimum accumulated displacement, logical units, before an in-flight
/// scroll record is emitted.
pub const SCROLL_EMIT_THRESHOLD: f64 = 10.0;

/// Accumulates scroll displacement into directional scroll records.
#[derive(Debug, Default)]
pub struct MotionTracker {
    accumulated_dx: f64,
    accumulated_dy: f64,
    segment_start_ms: Option<u64>,
    segment_start_velocity: f64,
    last_update_ms: Option<u64>,
}

/// Deceleration curve applied to a scroll segment's velocity. The engine
/// currently models a single curve kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollCurve {
    /// Velocity decays exponentially from `v0` toward rest.
    ExponentialDecay,
}

impl ScrollCurve {
    /// Wire name for this curve.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollCurve::ExponentialDecay => "exponential_decay",
        }
    }
}

/// One emitted scroll record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollRecord {
    /// Wall-clock ms at the start of this scroll segment.
    pub t0: u64,
    /// Wall-clock ms at emit time.
    pub t1: u64,
    /// Accumulated horizontal displacement since `t0`.
    pub dx: f64,
    /// Accumulated vertical displacement since `t0`.
    pub dy: f64,
    /// Velocity at the start of the segment.
    pub v0: f64,
    /// Velocity at emit time; `0.0` for the final "at rest" record.
    pub v1: f64,
    /// Deceleration curve modeled for this segment.
    pub curve: ScrollCurve,
}

impl MotionTracker {
    /// Creates a new, empty motion tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one incremental scroll delta observed at `now_ms`. Returns a
    /// [`ScrollRecord`] once accumulated displacement exceeds
    /// [`SCROLL_EMIT_THRESHOLD`], resetting the accumulator.
    pub fn on_delta(&mut self, now_ms: u64, dx: f64, dy: f64, velocity: f64) -> Option<ScrollRecord> {
        if self.segment_start_ms.is_none() {
            self.segment_start_ms = Some(now_ms);
            self.segment_start_velocity = velocity;
        }
        self.accumulated_dx += dx;
        self.accumulated_dy += dy;
        self.last_update_ms = Some(now_ms);

        let distance = (self.accumulated_dx.powi(2) + self.accumulated_dy.powi(2)).sqrt();
        if distance < SCROLL_EMIT_THRESHOLD {
            return None;
        }

        let record = ScrollRecord {
            t0: self.segment_start_ms.unwrap_or(now_ms),
            t1: now_ms,
            dx: self.accumulated_dx,
            dy: self.accumulated_dy,
            v0: self.segment_start_velocity,
            v1: velocity,
            curve: ScrollCurve::ExponentialDecay,
        };
        self.reset_segment(now_ms, velocity);
        Some(record)
    }

    /// Called when `now_ms - last update` exceeds [`SCROLL_END_DELAY_MS`]
    /// with no further deltas: emits a final at-rest record if a segment was
    /// in progress.
    pub fn on_idle_check(&mut self, now_ms: u64) -> Option<ScrollRecord> {
        let last = self.last_update_ms?;
        if now_ms.saturating_sub(last) < SCROLL_END_DELAY_MS {
            return None;
        }
        if self.accumulated_dx == 0.0 && self.accumulated_dy == 0.0 && self.segment_start_ms.is_none() {
            return None;
        }
        let record = ScrollRecord {
            t0: self.segment_start_ms.unwrap_or(last),
            t1: now_ms,
            dx: self.accumulated_dx,
            dy: self.accumulated_dy,
            v0: self.segment_start_velocity,
            v1: 0.0,
            curve: ScrollCurve::ExponentialDecay,
        };
        self.segment_start_ms = None;
        self.last_update_ms = None;
        self.accumulated_dx = 0.0;
        self.accumulated_dy = 0.0;
        Some(record)
    }

    fn reset_segment(&mut self, now_ms: u64, velocity: f64) {
        self.accumulated_dx = 0.0;
        self.accumulated_dy = 0.0;
        self.segment_start_ms = Some(now_ms);
        self.segment_start_velocity = velocity;
    }
}

/// ANR watchdog configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnrWatchdogConfig {
    /// Interval between UI-executor pings, milliseconds.
    pub ping_interval_ms: u64,
    /// Unacknowledged-ping threshold before a stall is declared, milliseconds.
    pub threshold_ms: u64,
}

impl Default for AnrWatchdogConfig {
    fn default() -> Self {
        Self { ping_interval_ms: 1_000, threshold_ms: 5_000 }
    }
}

/// Watches for main-thread stalls and emits a single ANR event per
/// contiguous stall.
#[derive(Debug)]
pub struct AnrWatchdog {
    config: AnrWatchdogConfig,
    first_missed_ping_ms: Option<u64>,
    emitted_for_current_stall: bool,
    stalled_tally: u64,
}

impl AnrWatchdog {
    /// Creates a new watchdog with `config`.
    pub fn new(config: AnrWatchdogConfig) -> Self {
        Self { config, first_missed_ping_ms: None, emitted_for_current_stall: false, stalled_tally: 0 }
    }

    /// Called when a ping round-trip succeeds: clears any in-progress stall
    /// tracking.
    pub fn on_ping_ack(&mut self) {
        self.first_missed_ping_ms = None;
        self.emitted_for_current_stall = false;
    }

    /// Called when a ping is not acknowledged by `now_ms`. Returns an `anr`
    /// event payload the first time the stall crosses `threshold_ms`; does
    /// nothing on subsequent calls for the same contiguous stall.
    pub fn on_ping_missed(&mut self, now_ms: u64, thread_state: ThreadState) -> Option<EventPayload> {
        let first_missed = *self.first_missed_ping_ms.get_or_insert(now_ms);
        if self.emitted_for_current_stall {
            return None;
        }
        let elapsed = now_ms.saturating_sub(first_missed);
        if elapsed < self.config.threshold_ms {
            return None;
        }
        self.emitted_for_current_stall = true;
        self.stalled_tally += 1;
        tracing::warn!(elapsed, thread = %thread_state.name, "anr stall detected");
        Some(EventPayload::Anr { duration_ms: elapsed, thread_state })
    }

    /// Total number of ANR events emitted over this watchdog's lifetime.
    pub fn stalled_tally(&self) -> u64 {
        self.stalled_tally
    }
}

/// On-disk marker filenames shared with `replay-orchestrator`'s recovery
/// logic.
pub const CRASH_MARKER_FILENAME: &str = "pending_crash_segment.json";

/// Captures that a fatal crash occurred, for the last-chance handler to call
/// synchronously before the process dies. Never performs the upload itself.
#[derive(Debug, Clone, PartialEq)]
pub struct CrashMarker {
    /// Owning session identifier.
    pub session_id: String,
    /// In-progress segment file path, if a video segment was being
    /// recorded.
    pub file: Option<String>,
    /// Wall-clock ms of the first frame in the in-progress segment.
    pub start_ms: Option<u64>,
    /// Wall-clock ms of the crash.
    pub crash_ms: u64,
    /// Frames encoded into the in-progress segment so far.
    pub frame_count: u32,
}

impl CrashMarker {
    /// Builds the marker the Stability Monitor writes from its last-chance
    /// handler.
    pub fn new(session_id: impl Into<String>, crash_ms: u64) -> Self {
        Self { session_id: session_id.into(), file: None, start_ms: None, crash_ms, frame_count: 0 }
    }
}

/// Errors raised by interaction-component configuration.
#[derive(Debug, Error)]
pub enum InteractionError {
    /// A configured radius, window, or threshold was not positive.
    #[error("invalid interaction configuration: {0}")]
    InvalidConfig(String),
}
