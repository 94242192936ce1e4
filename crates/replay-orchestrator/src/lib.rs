#![warn(missing_docs)]
//! # replay-orchestrator
//!
//! ## Purpose
//! The Replay Orchestrator: the single state-machine authority over a
//! session's lifecycle, remote-config application, duration limit, and
//! recovery replay-submission after a crash.
//!
//! ## Responsibilities
//! - Drive the five-state session lifecycle: `Idle` ->
//!   `ObtainingCredential` -> `MonitoringNetwork` -> `Recording` ->
//!   `Finalizing` -> `Idle`.
//! - Apply remote configuration (`rejourneyEnabled`, `recordingEnabled`,
//!   `maxRecordingMinutes`) before and during recording.
//! - Detect a persisted recovery checkpoint on startup and submit the
//!   synthetic crash close.
//!
//! ## Data flow
//! `begin_replay` drives `Idle` -> `ObtainingCredential` through
//! `replay-auth`'s [`replay_auth::DeviceRegistrar`], then to `Recording` via
//! [`ReplayOrchestrator::enter_recording`]. `end_replay` or the duration
//! limit drives `Recording` -> `Finalizing` -> `Idle`.
//!
//! ## Ownership and lifetimes
//! The orchestrator owns the current [`replay_core::Session`] exclusively;
//! other components receive only the session id via the telemetry
//! pipeline's handle (not modeled in this crate).
//!
//! ## Error model
//! State transition misuse (e.g. ending a session that was never started)
//! is an [`OrchestratorError`]; credential bootstrap failure is absorbed as
//! a silent `Idle` return per the documented failure semantics, not an
//! error.
//!
//! ## Security and privacy notes
//! The orchestrator never constructs a device fingerprint itself; it only
//! forwards the host-supplied value to the registrar.

use replay_auth::{AuthError, CredentialRequest, DeviceRegistrar};
use replay_core::{EventPayload, RecoveryCheckpoint, Session, SessionMetrics};
use thiserror::Error;

/// Default session duration cap, minutes.
pub const DEFAULT_MAX_RECORDING_MINUTES: u32 = 10;
/// Valid range for `maxRecordingMinutes`.
pub const MAX_RECORDING_MINUTES_RANGE: std::ops::RangeInclusive<u32> = 1..=10;

/// Remote configuration applied before/during recording.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteConfig {
    /// Master kill-switch: when `false`, recording never starts.
    pub rejourney_enabled: bool,
    /// When `false`, visual capture is disabled and the session is marked
    /// sampled-out, but telemetry still flows.
    pub recording_enabled: bool,
    /// Hard wall-clock cap, minutes, clamped to [`MAX_RECORDING_MINUTES_RANGE`].
    pub max_recording_minutes: u32,
    /// When set, recording only proceeds on a Wi-Fi/Ethernet transport.
    pub wifi_required: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            rejourney_enabled: true,
            recording_enabled: true,
            max_recording_minutes: DEFAULT_MAX_RECORDING_MINUTES,
            wifi_required: false,
        }
    }
}

/// Network transport classification, used to evaluate `wifiRequired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkTransport {
    /// Wi-Fi or wired Ethernet.
    WifiOrEthernet,
    /// Cellular data.
    Cellular,
    /// No active network observed yet.
    Unknown,
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// No session in progress.
    Idle,
    /// Credential bootstrap in flight.
    ObtainingCredential,
    /// Waiting for a usable network transport.
    MonitoringNetwork,
    /// Actively recording.
    Recording,
    /// Submitting metrics and tearing down.
    Finalizing,
}

/// The top-level session lifecycle state machine.
pub struct ReplayOrchestrator {
    state: OrchestratorState,
    session: Option<Session>,
    metrics: SessionMetrics,
    pending_checkpoint: Option<RecoveryCheckpoint>,
}

impl Default for ReplayOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayOrchestrator {
    /// Creates a new, idle orchestrator with no prior checkpoint.
    pub fn new() -> Self {
        Self {
            state: OrchestratorState::Idle,
            session: None,
            metrics: SessionMetrics::default(),
            pending_checkpoint: None,
        }
    }

    /// Restores a persisted checkpoint found on process startup, moving the
    /// orchestrator directly to `Finalizing` to submit the synthetic crash
    /// close per invariant 9.
    pub fn recover_from_checkpoint(&mut self, checkpoint: RecoveryCheckpoint) {
        tracing::info!(session_id = %checkpoint.session_id, "recovering checkpoint into finalizing");
        self.pending_checkpoint = Some(checkpoint);
        self.state = OrchestratorState::Finalizing;
    }

    /// Builds the synthetic crash-close metrics for a recovered checkpoint
    /// at `restart_wall_ms`, consuming the pending checkpoint. Returns
    /// `None` if no checkpoint is pending.
    pub fn finalize_recovered_session(&mut self, restart_wall_ms: u64) -> Option<(String, SessionMetrics)> {
        let checkpoint = self.pending_checkpoint.take()?;
        let metrics = checkpoint.synthetic_metrics(restart_wall_ms);
        self.state = OrchestratorState::Idle;
        Some((checkpoint.session_id, metrics))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// `Idle` -> `ObtainingCredential` -> `MonitoringNetwork`: requests an
    /// upload credential. On bootstrap failure, per the documented failure
    /// semantics, returns to `Idle` without raising and produces no
    /// session.
    pub fn begin_replay(
        &mut self,
        config: RemoteConfig,
        registrar: &DeviceRegistrar,
        credential_request: &CredentialRequest,
        endpoint: impl Into<String>,
        project_id: impl Into<String>,
        start_ms: u64,
    ) -> Result<(), OrchestratorError> {
        if self.state != OrchestratorState::Idle {
            return Err(OrchestratorError::InvalidTransition {
                from: self.state,
                action: "beginReplay",
            });
        }
        if !config.rejourney_enabled {
            return Ok(());
        }

        self.state = OrchestratorState::ObtainingCredential;
        let credential = match registrar.bootstrap_credential(credential_request) {
            Ok(credential) => credential,
            Err(error) => {
                tracing::warn!(%error, "credential bootstrap failed, returning to idle");
                self.state = OrchestratorState::Idle;
                return Ok(());
            }
        };

        self.state = OrchestratorState::MonitoringNetwork;
        let session_id = replay_core::mint_session_id(start_ms);
        tracing::info!(%session_id, "session credential obtained, monitoring network");
        let mut session = Session::open(
            session_id,
            start_ms,
            endpoint,
            project_id,
            credential_request.api_token.clone(),
        );
        session.set_credential(credential.token);
        self.session = Some(session);
        Ok(())
    }

    /// `MonitoringNetwork` -> `Recording`: proceeds once `transport` is
    /// usable, or unconditionally when `transport` is
    /// [`NetworkTransport::Unknown`] (to allow a later retry rather than
    /// stalling forever).
    pub fn enter_recording(
        &mut self,
        config: RemoteConfig,
        transport: NetworkTransport,
    ) -> Result<(), OrchestratorError> {
        if self.state != OrchestratorState::MonitoringNetwork {
            return Err(OrchestratorError::InvalidTransition {
                from: self.state,
                action: "enterRecording",
            });
        }
        if config.wifi_required
            && transport == NetworkTransport::Cellular
        {
            tracing::info!("wifi required but transport is cellular, staying in monitoring_network");
            return Ok(());
        }
        self.metrics = SessionMetrics::default();
        self.state = OrchestratorState::Recording;
        tracing::info!("entered recording");
        Ok(())
    }

    /// `Recording` -> `Finalizing`, driven by `endReplay`, the duration
    /// limit, or host teardown.
    pub fn end_replay(&mut self) -> Result<(), OrchestratorError> {
        if self.state != OrchestratorState::Recording {
            return Err(OrchestratorError::InvalidTransition {
                from: self.state,
                action: "endReplay",
            });
        }
        self.state = OrchestratorState::Finalizing;
        tracing::info!("recording ended, finalizing");
        Ok(())
    }

    /// `true` once `elapsed_ms` since recording start exceeds the
    /// configured `maxRecordingMinutes`.
    pub fn duration_limit_exceeded(config: RemoteConfig, elapsed_ms: u64) -> bool {
        let clamped_minutes = config.max_recording_minutes.clamp(
            *MAX_RECORDING_MINUTES_RANGE.start(),
            *MAX_RECORDING_MINUTES_RANGE.end(),
        );
        elapsed_ms >= clamped_minutes as u64 * 60_000
    }

    /// `Finalizing` -> `Idle`: finishes the session at `end_ms`, returning
    /// the closed session and its final metrics for the caller to submit to
    /// `session/end` and delete the recovery checkpoint.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::InvalidTransition`] outside
    /// `Finalizing`, or propagates [`replay_core::CoreError`] from
    /// [`Session::close`].
    pub fn finalize(&mut self, end_ms: u64) -> Result<(Session, SessionMetrics), OrchestratorError> {
        if self.state != OrchestratorState::Finalizing {
            return Err(OrchestratorError::InvalidTransition {
                from: self.state,
                action: "finalize",
            });
        }
        let mut session = self
            .session
            .take()
            .ok_or(OrchestratorError::NoActiveSession)?;
        session
            .close(end_ms)
            .map_err(|error| OrchestratorError::Core(error.to_string()))?;
        let metrics = std::mem::take(&mut self.metrics);
        self.state = OrchestratorState::Idle;
        tracing::info!(session_id = %session.session_id, "finalized, returning to idle");
        Ok((session, metrics))
    }

    /// Mutable access to the in-progress session metrics, for recorders and
    /// the telemetry pipeline to update tallies during `Recording`.
    pub fn metrics_mut(&mut self) -> &mut SessionMetrics {
        &mut self.metrics
    }

    /// Classifies `payload` and updates the matching session metric tally.
    /// The host calls this alongside pushing `payload` into the telemetry
    /// pipeline's ring, so every recorded/detected event is reflected in
    /// the metrics submitted at `session/end`.
    pub fn record_event(&mut self, payload: &EventPayload) {
        self.metrics.record_event(payload);
    }

    /// The currently owned session, if any.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }
}

/// Errors raised by invalid orchestrator usage.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// `action` was attempted from a state that does not permit it.
    #[error("cannot perform {action} from state {from:?}")]
    InvalidTransition {
        /// The state the orchestrator was in.
        from: OrchestratorState,
        /// The action that was attempted.
        action: &'static str,
    },
    /// `finalize` was called with no session in progress.
    #[error("no active session to finalize")]
    NoActiveSession,
    /// A core domain invariant was violated while finalizing.
    #[error("core error: {0}")]
    Core(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_auth::{CredentialResponse, RegistrarTransport};
    use std::sync::Arc;

    struct StubTransport {
        result: Result<CredentialResponse, String>,
    }

    impl RegistrarTransport for StubTransport {
        fn bootstrap(
            &self,
            _endpoint: &str,
            _request: &CredentialRequest,
        ) -> Result<CredentialResponse, AuthError> {
            self.result.clone().map_err(AuthError::Fatal)
        }
    }

    fn registrar(result: Result<CredentialResponse, String>) -> DeviceRegistrar {
        DeviceRegistrar::new(
            "https://ingest.example.test/api/ingest/register",
            Arc::new(StubTransport { result }),
        )
        .unwrap()
    }

    fn sample_request() -> CredentialRequest {
        CredentialRequest {
            api_token: "token".to_string(),
            project_id: "proj".to_string(),
            device_fingerprint: "fp".to_string(),
            platform: "ios".to_string(),
            app_id: "com.example.app".to_string(),
        }
    }

    #[test]
    fn full_lifecycle_reaches_idle() {
        let mut orchestrator = ReplayOrchestrator::new();
        let registrar = registrar(Ok(CredentialResponse { credential: "cred".to_string(), expires_at: 99_999 }));

        orchestrator
            .begin_replay(RemoteConfig::default(), &registrar, &sample_request(), "https://ingest.test", "proj", 0)
            .unwrap();
        assert_eq!(orchestrator.state(), OrchestratorState::MonitoringNetwork);

        orchestrator.enter_recording(RemoteConfig::default(), NetworkTransport::WifiOrEthernet).unwrap();
        assert_eq!(orchestrator.state(), OrchestratorState::Recording);

        orchestrator.end_replay().unwrap();
        assert_eq!(orchestrator.state(), OrchestratorState::Finalizing);

        let (session, _metrics) = orchestrator.finalize(5_000).unwrap();
        assert_eq!(session.end_ms, Some(5_000));
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    }

    #[test]
    fn credential_failure_returns_to_idle_without_error() {
        let mut orchestrator = ReplayOrchestrator::new();
        let registrar = registrar(Err("project not found".to_string()));

        let result = orchestrator.begin_replay(
            RemoteConfig::default(),
            &registrar,
            &sample_request(),
            "https://ingest.test",
            "proj",
            0,
        );
        assert!(result.is_ok());
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
        assert!(orchestrator.session().is_none());
    }

    #[test]
    fn rejourney_disabled_never_starts_recording() {
        let mut orchestrator = ReplayOrchestrator::new();
        let registrar = registrar(Ok(CredentialResponse { credential: "cred".to_string(), expires_at: 1 }));
        let config = RemoteConfig { rejourney_enabled: false, ..RemoteConfig::default() };

        orchestrator
            .begin_replay(config, &registrar, &sample_request(), "https://ingest.test", "proj", 0)
            .unwrap();
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    }

    #[test]
    fn recovered_checkpoint_matches_documented_scenario() {
        let mut orchestrator = ReplayOrchestrator::new();
        let session = Session::open("session_0_abc", 0, "https://ingest.test", "proj", "token");
        orchestrator.recover_from_checkpoint(RecoveryCheckpoint::for_session(&session));
        assert_eq!(orchestrator.state(), OrchestratorState::Finalizing);

        let (session_id, metrics) = orchestrator.finalize_recovered_session(7_500).unwrap();
        assert_eq!(session_id, "session_0_abc");
        assert_eq!(metrics.crash_count, 1);
        assert_eq!(metrics.duration_seconds, 7);
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    }

    #[test]
    fn duration_limit_clamps_to_documented_range() {
        let config = RemoteConfig { max_recording_minutes: 999, ..RemoteConfig::default() };
        assert!(!ReplayOrchestrator::duration_limit_exceeded(config, 10 * 60_000 - 1));
        assert!(ReplayOrchestrator::duration_limit_exceeded(config, 10 * 60_000));
    }
}
