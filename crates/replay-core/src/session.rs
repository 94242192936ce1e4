//! Session identity, metrics, and the crash-recovery checkpoint.

use serde::{Deserialize, Serialize};

use crate::event::EventPayload;
use crate::CoreError;

/// Identity and connection details for one recording session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque session identifier, freshly minted per session, never reused.
    pub session_id: String,
    /// Wall-clock ms at session open.
    pub start_ms: u64,
    /// Wall-clock ms at session close, set exactly once.
    pub end_ms: Option<u64>,
    /// Ingest service base URL.
    pub endpoint: String,
    /// Project identifier.
    pub project_id: String,
    /// Long-lived API token.
    pub api_token: String,
    /// Short-lived upload credential, refreshed only through the Device
    /// Registrar.
    pub credential: Option<String>,
}

impl Session {
    /// Opens a new session with no end time and no credential yet.
    pub fn open(
        session_id: impl Into<String>,
        start_ms: u64,
        endpoint: impl Into<String>,
        project_id: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            start_ms,
            end_ms: None,
            endpoint: endpoint.into(),
            project_id: project_id.into(),
            api_token: api_token.into(),
            credential: None,
        }
    }

    /// Records the short-lived upload credential obtained from the Device
    /// Registrar.
    pub fn set_credential(&mut self, credential: impl Into<String>) {
        self.credential = Some(credential.into());
    }

    /// Closes this session at `end_ms`.
    ///
    /// # Errors
    /// Returns [`CoreError::InvariantViolation`] when `end_ms < start_ms` or
    /// the session is already closed.
    pub fn close(&mut self, end_ms: u64) -> Result<(), CoreError> {
        if self.end_ms.is_some() {
            return Err(CoreError::InvariantViolation(
                "session end_ms may only be set once".to_string(),
            ));
        }
        if end_ms < self.start_ms {
            return Err(CoreError::InvariantViolation(format!(
                "end_ms {end_ms} precedes start_ms {}",
                self.start_ms
            )));
        }
        self.end_ms = Some(end_ms);
        Ok(())
    }

    /// Duration of this session in whole seconds, if closed.
    pub fn duration_seconds(&self) -> Option<u64> {
        self.end_ms.map(|end| (end - self.start_ms) / 1000)
    }
}

/// Tallies and derived counters reported at `session/end`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    /// Number of fatal crashes observed (0 or 1 for a single process
    /// lifetime; 1 on crash-recovered sessions).
    pub crash_count: u32,
    /// Number of ANR events observed.
    pub anr_count: u32,
    /// Number of application errors recorded.
    pub error_count: u32,
    /// Session duration in whole seconds.
    pub duration_seconds: u64,
    /// Raw touch count.
    pub touch_count: u64,
    /// Scroll gesture count.
    pub scroll_count: u64,
    /// Recognized gesture count (excluding scroll, rage-tap, dead-tap).
    pub gesture_count: u64,
    /// Rage-tap cluster count.
    pub rage_tap_count: u64,
    /// Dead-tap count.
    pub dead_tap_count: u64,
    /// Screens visited, in navigation order, duplicates included.
    pub screens_visited: Vec<String>,
}

impl SessionMetrics {
    /// Number of distinct screens visited.
    pub fn unique_screen_count(&self) -> usize {
        let mut seen = std::collections::HashSet::new();
        self.screens_visited.iter().filter(|screen| seen.insert(screen.as_str())).count()
    }

    /// Records a navigation-entering event into the visited-screens tally.
    pub fn record_screen_visit(&mut self, screen: impl Into<String>) {
        self.screens_visited.push(screen.into());
    }

    /// Classifies `payload` and updates the matching tally: touches,
    /// scroll/rage-tap/dead-tap/other gestures, ANRs, errors, and
    /// navigation-entering screen visits. This is the single place that
    /// turns emitted event records into the `session/end` counters.
    pub fn record_event(&mut self, payload: &EventPayload) {
        match payload {
            EventPayload::Touch(_) => self.touch_count += 1,
            EventPayload::Gesture(detail) => match detail.frustration_kind.as_deref() {
                Some("rage_tap") => self.rage_tap_count += 1,
                Some("dead_tap") => self.dead_tap_count += 1,
                _ if detail.gesture_type == "scroll" => self.scroll_count += 1,
                _ => self.gesture_count += 1,
            },
            EventPayload::Navigation { screen, entering, .. } if *entering => {
                self.record_screen_visit(screen.clone());
            }
            EventPayload::Anr { .. } => self.anr_count += 1,
            EventPayload::Error { .. } => self.error_count += 1,
            _ => {}
        }
    }

    /// Builds the synthetic metrics submitted for a crash-recovered session:
    /// `crashCount=1` and the elapsed duration since `start_ms`, every other
    /// tally at zero since nothing survived the crash to report it.
    pub fn synthetic_crash_close(duration_seconds: u64) -> Self {
        Self {
            crash_count: 1,
            duration_seconds,
            ..Default::default()
        }
    }
}

/// On-disk marker enabling post-crash finalization of a session. At most one
/// is present at a time; deleted only after a successful `session/end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryCheckpoint {
    /// The session this checkpoint would finalize on restart.
    pub session_id: String,
    /// Long-lived API token, needed to authenticate the synthetic close.
    pub api_token: String,
    /// Wall-clock ms at session open.
    pub start_ms: u64,
    /// Ingest service base URL.
    pub endpoint: String,
}

impl RecoveryCheckpoint {
    /// Derives the checkpoint to persist when a session begins recording.
    pub fn for_session(session: &Session) -> Self {
        Self {
            session_id: session.session_id.clone(),
            api_token: session.api_token.clone(),
            start_ms: session.start_ms,
            endpoint: session.endpoint.clone(),
        }
    }

    /// Builds the metrics for the synthetic close submitted on restart,
    /// given the wall-clock time at which recovery runs.
    pub fn synthetic_metrics(&self, restart_wall_ms: u64) -> SessionMetrics {
        let duration_seconds = restart_wall_ms.saturating_sub(self.start_ms) / 1000;
        SessionMetrics::synthetic_crash_close(duration_seconds)
    }
}
