#![warn(missing_docs)]
//! # replay-auth
//!
//! ## Purpose
//! Implements the Device Registrar: the credential bootstrap that exchanges
//! a long-lived API token for a short-lived upload credential, and the
//! small state machine that tracks whether that credential is still usable.
//!
//! ## Responsibilities
//! - Exchange `{apiToken, projectId, deviceFingerprint, platform, appId}` for
//!   `{credential, expiresAt}` against the registrar endpoint.
//! - Classify 403/404 responses as auth-fatal: the orchestrator must not
//!   start a session on this error.
//! - Track credential expiry so the orchestrator can decide between a fast
//!   restart (reuse a still-valid credential) and a full bootstrap.
//!
//! ## Data flow
//! The orchestrator calls [`DeviceRegistrar::bootstrap_credential`] once per
//! `beginReplay`, or skips it entirely on `beginReplayFast` when
//! [`UploadCredential::is_expired`] is false.
//!
//! ## Ownership and lifetimes
//! [`DeviceRegistrar`] holds an `Arc<dyn RegistrarTransport>` so the same
//! transport can be shared with other callers and swapped for a fake in
//! tests.
//!
//! ## Error model
//! All failures are [`AuthError`] variants; 403/404 map to
//! [`AuthError::Fatal`], everything else to a retryable variant the caller
//! may choose to retry or surface.
//!
//! ## Security and privacy notes
//! The device fingerprint is treated as an opaque, host-supplied value; this
//! crate never derives or persists one itself.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Path suffix every registrar endpoint must end with.
pub const REQUIRED_REGISTRAR_PATH: &str = "/api/ingest/register";

/// Request body for the credential bootstrap call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRequest {
    /// Long-lived API token.
    pub api_token: String,
    /// Project identifier.
    pub project_id: String,
    /// Stable per-install identifier, supplied by the host.
    pub device_fingerprint: String,
    /// Platform name.
    pub platform: String,
    /// Embedding application identifier.
    pub app_id: String,
}

/// Response body for a successful credential bootstrap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialResponse {
    /// Short-lived, opaque upload credential.
    pub credential: String,
    /// Wall-clock ms at which the credential expires.
    pub expires_at: u64,
}

/// An upload credential paired with its expiry, as tracked by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadCredential {
    /// The opaque credential value.
    pub token: String,
    /// Wall-clock ms at which it expires.
    pub expires_at_ms: u64,
}

impl UploadCredential {
    /// `true` when `now_ms` is at or past expiry.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

impl From<CredentialResponse> for UploadCredential {
    fn from(response: CredentialResponse) -> Self {
        Self { token: response.credential, expires_at_ms: response.expires_at }
    }
}

/// Injectable transport for the registrar HTTP call, so tests can supply a
/// deterministic fake instead of performing real network I/O.
pub trait RegistrarTransport: Send + Sync {
    /// Performs the credential bootstrap request against `endpoint`.
    ///
    /// # Errors
    /// Implementations return [`AuthError::Fatal`] for a 403/404 response,
    /// [`AuthError::Transport`] for any other failure.
    fn bootstrap(
        &self,
        endpoint: &str,
        request: &CredentialRequest,
    ) -> Result<CredentialResponse, AuthError>;
}

/// Validates that `endpoint` is an HTTPS URL ending in
/// [`REQUIRED_REGISTRAR_PATH`].
///
/// # Errors
/// Returns [`AuthError::InvalidEndpoint`] when either check fails.
pub fn validate_registrar_endpoint(endpoint: &str) -> Result<(), AuthError> {
    let parsed = url::Url::parse(endpoint)
        .map_err(|_| AuthError::InvalidEndpoint(endpoint.to_string()))?;
    if parsed.scheme() != "https" {
        return Err(AuthError::InvalidEndpoint(endpoint.to_string()));
    }
    if !parsed.path().ends_with(REQUIRED_REGISTRAR_PATH) {
        return Err(AuthError::InvalidEndpoint(endpoint.to_string()));
    }
    Ok(())
}

/// Performs credential bootstrap and tracks the outcome.
pub struct DeviceRegistrar {
    endpoint: String,
    transport: Arc<dyn RegistrarTransport>,
}

impl DeviceRegistrar {
    /// Creates a registrar bound to `endpoint`, which must pass
    /// [`validate_registrar_endpoint`].
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidEndpoint`] when validation fails.
    pub fn new(endpoint: impl Into<String>, transport: Arc<dyn RegistrarTransport>) -> Result<Self, AuthError> {
        let endpoint = endpoint.into();
        validate_registrar_endpoint(&endpoint)?;
        Ok(Self { endpoint, transport })
    }

    /// The validated registrar endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Exchanges `request` for an [`UploadCredential`].
    ///
    /// # Errors
    /// Returns [`AuthError::Fatal`] on 403/404 (the orchestrator must not
    /// start recording), or [`AuthError::Transport`] for any other failure.
    pub fn bootstrap_credential(
        &self,
        request: &CredentialRequest,
    ) -> Result<UploadCredential, AuthError> {
        if request.api_token.is_empty() {
            return Err(AuthError::MissingApiToken);
        }
        tracing::debug!(project_id = %request.project_id, "requesting upload credential");
        let response = self.transport.bootstrap(&self.endpoint, request)?;
        Ok(UploadCredential::from(response))
    }
}

/// Authentication state tracked across the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No credential has been obtained yet.
    Unauthenticated,
    /// A credential is held and not known to be expired.
    Authenticated,
    /// The held credential has expired; a new bootstrap is required.
    Expired,
}

/// Tracks [`AuthState`] transitions driven by bootstrap outcomes and the
/// passage of time.
#[derive(Debug)]
pub struct AuthStateMachine {
    state: AuthState,
    credential: Option<UploadCredential>,
}

impl Default for AuthStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthStateMachine {
    /// Creates a new, unauthenticated state machine.
    pub fn new() -> Self {
        Self { state: AuthState::Unauthenticated, credential: None }
    }

    /// Current state.
    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Records a successful bootstrap.
    pub fn on_bootstrap_success(&mut self, credential: UploadCredential) {
        self.credential = Some(credential);
        self.state = AuthState::Authenticated;
    }

    /// Re-evaluates expiry against `now_ms`, transitioning to
    /// [`AuthState::Expired`] if the held credential has lapsed.
    pub fn on_tick(&mut self, now_ms: u64) {
        if let (AuthState::Authenticated, Some(credential)) = (self.state, &self.credential) {
            if credential.is_expired(now_ms) {
                self.state = AuthState::Expired;
            }
        }
    }

    /// Drops the held credential and returns to [`AuthState::Unauthenticated`].
    pub fn logout(&mut self) {
        self.credential = None;
        self.state = AuthState::Unauthenticated;
    }

    /// `true` only in [`AuthState::Authenticated`]: the orchestrator may
    /// start or continue recording.
    pub fn can_capture(&self) -> bool {
        self.state == AuthState::Authenticated
    }

    /// The currently held credential, if any.
    pub fn credential(&self) -> Option<&UploadCredential> {
        self.credential.as_ref()
    }
}

/// Errors raised during credential bootstrap.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The configured registrar endpoint failed validation.
    #[error("invalid registrar endpoint: {0}")]
    InvalidEndpoint(String),
    /// `apiToken` was empty; this is a fatal configuration error and is
    /// never silently stripped.
    #[error("missing api token")]
    MissingApiToken,
    /// Registrar returned 403/404: bundle mismatch or project not found.
    /// The orchestrator must not start recording.
    #[error("auth fatal: {0}")]
    Fatal(String),
    /// Any other transport-level failure; callers may retry.
    #[error("registrar transport failure: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubTransport {
        response: Result<CredentialResponse, String>,
    }

    impl RegistrarTransport for StubTransport {
        fn bootstrap(
            &self,
            _endpoint: &str,
            _request: &CredentialRequest,
        ) -> Result<CredentialResponse, AuthError> {
            self.response.clone().map_err(AuthError::Fatal)
        }
    }

    fn sample_request() -> CredentialRequest {
        CredentialRequest {
            api_token: "token-1".to_string(),
            project_id: "proj-1".to_string(),
            device_fingerprint: "fp-1".to_string(),
            platform: "ios".to_string(),
            app_id: "com.example.app".to_string(),
        }
    }

    #[test]
    fn validates_expected_endpoint_shape() {
        assert!(validate_registrar_endpoint("https://ingest.example.test/api/ingest/register").is_ok());
        assert!(validate_registrar_endpoint("http://ingest.example.test/api/ingest/register").is_err());
        assert!(validate_registrar_endpoint("https://ingest.example.test/wrong/path").is_err());
    }

    #[test]
    fn missing_api_token_is_rejected_before_transport_call() {
        let transport = Arc::new(StubTransport {
            response: Ok(CredentialResponse { credential: "c".to_string(), expires_at: 1 }),
        });
        let registrar = DeviceRegistrar::new(
            "https://ingest.example.test/api/ingest/register",
            transport,
        )
        .unwrap();
        let mut request = sample_request();
        request.api_token.clear();
        assert!(matches!(
            registrar.bootstrap_credential(&request),
            Err(AuthError::MissingApiToken)
        ));
    }

    #[test]
    fn fatal_error_propagates_from_transport() {
        let transport = Arc::new(StubTransport {
            response: Err("project not found".to_string()),
        });
        let registrar = DeviceRegistrar::new(
            "https://ingest.example.test/api/ingest/register",
            transport,
        )
        .unwrap();
        assert!(matches!(
            registrar.bootstrap_credential(&sample_request()),
            Err(AuthError::Fatal(_))
        ));
    }

    #[test]
    fn state_machine_requires_reauth_after_expiry() {
        let mut machine = AuthStateMachine::new();
        assert!(!machine.can_capture());
        machine.on_bootstrap_success(UploadCredential { token: "t".to_string(), expires_at_ms: 1_000 });
        assert!(machine.can_capture());
        machine.on_tick(1_500);
        assert_eq!(machine.state(), AuthState::Expired);
        assert!(!machine.can_capture());
    }
}
