#![warn(missing_docs)]
//! # replay-app
//!
//! ## Purpose
//! Host integration glue: wires auth, capture scheduling, telemetry,
//! dispatch, and the session orchestrator into one embeddable surface.
//!
//! ## Responsibilities
//! - Expose the build-time version and a capture kill-switch.
//! - Convert a drained telemetry batch into a dispatch-ready payload.
//! - Project orchestrator/dispatcher state into a flat status snapshot for
//!   a host UI to render.
//! - Provide log-safe redaction for anything surfaced to host-side logs.
//!
//! ## Data flow
//! Host -> [`ReplayOrchestrator`] session lifecycle -> capture/interaction/
//! telemetry recorders feed events -> [`TelemetryPipeline::drain_batch`] ->
//! [`batch_to_upload`] -> [`SegmentDispatcher::dispatch`].
//!
//! ## Ownership and lifetimes
//! This crate passes owned snapshots between subsystems; it holds no
//! long-lived state of its own beyond what callers construct and keep.
//!
//! ## Error model
//! Subsystem failures are wrapped in [`AppError`] and categorized for host
//! observability.
//!
//! ## Security and privacy notes
//! Capture can be disabled at runtime via an environment kill-switch.
//! [`redact_sensitive`] strips credential-shaped substrings before any
//! string reaches a host log sink.

use replay_auth::AuthError;
use replay_capture::CaptureError;
use replay_core::{CoreError, EventBatch, PendingUpload, UploadKind};
use replay_dispatch::DispatchError;
use replay_orchestrator::{OrchestratorError, OrchestratorState, ReplayOrchestrator};
use replay_telemetry::TelemetryError;
use thiserror::Error;
use url::Url;

/// Build-time engine version loaded from the root `VERSION` file.
pub const APP_VERSION: &str = env!("REPLAY_ENGINE_VERSION");

/// Returns the engine version sourced from the root `VERSION` file.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Checks the runtime capture kill-switch.
///
/// Semantics:
/// - Unset => capture enabled.
/// - `0`, `false`, `off` (case-insensitive) => capture disabled.
/// - Any other value => capture enabled.
pub fn capture_enabled_from_env() -> bool {
    match std::env::var("REPLAY_ENGINE_CAPTURE_ENABLED") {
        Ok(value) => {
            let normalized = value.trim().to_ascii_lowercase();
            !(normalized == "0" || normalized == "false" || normalized == "off")
        }
        Err(_) => true,
    }
}

/// Consolidated runtime status snapshot for simple host UI projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeStatus {
    /// Whether the orchestrator is currently recording.
    pub recording: bool,
    /// Orchestrator lifecycle state, as a human-readable label.
    pub session: String,
    /// `true` when the dispatcher's circuit breaker is open.
    pub circuit_open: bool,
    /// `true` when the dispatcher has been billing-blocked.
    pub billing_blocked: bool,
    /// Number of uploads currently queued for retry.
    pub retry_queue_len: usize,
}

/// Projects orchestrator and dispatcher state into a flat status snapshot.
pub fn project_runtime_status(
    orchestrator: &ReplayOrchestrator,
    dispatcher: &replay_dispatch::SegmentDispatcher,
) -> RuntimeStatus {
    RuntimeStatus {
        recording: orchestrator.state() == OrchestratorState::Recording,
        session: format!("{:?}", orchestrator.state()),
        circuit_open: dispatcher.circuit_open(),
        billing_blocked: dispatcher.billing_blocked(),
        retry_queue_len: dispatcher.retry_queue_len(),
    }
}

/// Converts one drained event batch into a dispatch-ready pending upload.
///
/// # Errors
/// Returns [`AppError::Core`] when the batch cannot be gzip-encoded.
pub fn batch_to_upload(session_id: &str, batch: &EventBatch) -> Result<PendingUpload, AppError> {
    let payload = batch.to_gzipped_json().map_err(AppError::Core)?;
    let range_start = batch.events.first().map(|event| event.timestamp_ms);
    let range_end = batch.events.last().map(|event| event.timestamp_ms);
    Ok(PendingUpload::new(
        session_id.to_string(),
        UploadKind::Events,
        payload,
        range_start,
        range_end,
        batch.events.len() as u32,
    ))
}

/// Returns `true` when `endpoint` is a well-formed `https` URL.
pub fn is_https_endpoint(endpoint: &str) -> bool {
    Url::parse(endpoint)
        .map(|url| url.scheme() == "https")
        .unwrap_or(false)
}

/// Redacts common credential markers before a string reaches a log sink.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for key in ["password", "token", "authorization", "bearer", "api_token"] {
        redacted = redact_key_value(&redacted, key);
    }
    redacted
}

fn redact_key_value(input: &str, key: &str) -> String {
    let lower = input.to_ascii_lowercase();
    if let Some(position) = lower.find(key) {
        let prefix = &input[..position];
        return format!("{prefix}{key}=<redacted>");
    }
    input.to_string()
}

/// Integration error type spanning every wired subsystem.
#[derive(Debug, Error)]
pub enum AppError {
    /// Auth subsystem error.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    /// Capture subsystem error.
    #[error("capture error: {0}")]
    Capture(CaptureError),
    /// Core model error.
    #[error("core error: {0}")]
    Core(CoreError),
    /// Dispatch subsystem error.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
    /// Telemetry subsystem error.
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    /// Orchestrator subsystem error.
    #[error("orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_enabled_from_env_defaults_to_true_when_unset() {
        std::env::remove_var("REPLAY_ENGINE_CAPTURE_ENABLED");
        assert!(capture_enabled_from_env());
    }

    #[test]
    fn redact_sensitive_masks_api_token_value() {
        let line = format!("posting with api_token={}", "s3cr3t");
        let redacted = redact_sensitive(&line);
        assert!(!redacted.contains("s3cr3t"));
        assert!(redacted.contains("api_token=<redacted>"));
    }

    #[test]
    fn is_https_endpoint_rejects_plain_http() {
        assert!(is_https_endpoint("https://ingest.example.com"));
        assert!(!is_https_endpoint("http://ingest.example.com"));
    }
}
