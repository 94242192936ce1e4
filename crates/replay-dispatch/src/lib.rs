#![warn(missing_docs)]
//! # replay-dispatch
//!
//! ## Purpose
//! The Segment Dispatcher: ships [`PendingUpload`]s from every lane through
//! the presign/PUT/complete upload protocol, and owns the retry queue,
//! circuit breaker, and billing-blocked gate.
//!
//! ## Responsibilities
//! - Gate all shipping on `billingBlocked` and circuit-breaker state.
//! - Requeue transport failures at the front of a bounded retry queue, up to
//!   [`replay_core::MAX_ATTEMPTS`], gated by an exponential backoff window.
//! - Open the circuit after a run of consecutive failures and close it
//!   automatically after a cooldown with no intervening traffic.
//! - Derive a stable idempotency key per payload so a caller-level retry of
//!   an already-shipped upload is detectable.
//!
//! ## Data flow
//! Callers build a [`PendingUpload`] (from `replay-core`) and call
//! [`SegmentDispatcher::dispatch`]. The actual HTTP three-phase exchange is
//! performed by a host-supplied [`DispatchTransport`]; this crate only
//! sequences retries and breaker state around it.
//!
//! ## Ownership and lifetimes
//! The dispatcher owns the retry queue and breaker state exclusively;
//! `billingBlocked` and circuit state are read by the orchestrator through
//! accessor methods, never written externally.
//!
//! ## Error model
//! [`DispatchError`] distinguishes billing-fatal, auth-fatal, non-retryable,
//! and retryable outcomes; only the last requeues.
//!
//! ## Security and privacy notes
//! Payload bytes pass through opaque; this crate never inspects or logs
//! their content, only size and lane metadata.

use std::sync::Arc;

use replay_core::PendingUpload;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Outcome of a successful transport attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShipOutcome {
    /// The upload was presigned, PUT, and confirmed.
    Uploaded,
    /// The server returned `skipUpload:true`: a valid success that
    /// short-circuits the remaining phases.
    Skipped,
}

/// Host-supplied transport performing the three-phase presign/PUT/complete
/// exchange for one [`PendingUpload`].
pub trait DispatchTransport: Send + Sync {
    /// Ships `upload` end to end.
    ///
    /// # Errors
    /// Returns the [`DispatchError`] variant matching the documented status
    /// code semantics: `402` -> [`DispatchError::BillingBlocked`], registrar
    /// `403/404` -> [`DispatchError::AuthFatal`], other non-2xx `4xx` ->
    /// [`DispatchError::NonRetryable`], `5xx`/network errors ->
    /// [`DispatchError::Retryable`].
    fn ship(&self, upload: &PendingUpload) -> Result<ShipOutcome, DispatchError>;
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures required to open the circuit.
    pub threshold: u32,
    /// Cooldown after opening before the circuit auto-closes, milliseconds.
    pub cooldown_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { threshold: 5, cooldown_ms: 60_000 }
    }
}

/// Tracks consecutive transport failures and gates new requests while open.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    consecutive_failures: u32,
    opened_at_ms: Option<u64>,
}

impl CircuitBreaker {
    /// Creates a new, closed circuit breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self { config, consecutive_failures: 0, opened_at_ms: None }
    }

    /// `true` when a request may proceed: the circuit is closed, or was open
    /// but the cooldown has elapsed as of `now_ms` (which also closes it).
    pub fn allow_request(&mut self, now_ms: u64) -> bool {
        match self.opened_at_ms {
            None => true,
            Some(opened_at) => {
                if now_ms.saturating_sub(opened_at) >= self.config.cooldown_ms {
                    self.opened_at_ms = None;
                    self.consecutive_failures = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Resets the failure streak and closes the circuit.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.opened_at_ms = None;
    }

    /// Records one failure at `now_ms`, opening the circuit once
    /// `threshold` consecutive failures have accumulated.
    pub fn record_failure(&mut self, now_ms: u64) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.config.threshold && self.opened_at_ms.is_none() {
            self.opened_at_ms = Some(now_ms);
        }
    }

    /// `true` while the circuit is open.
    pub fn is_open(&self) -> bool {
        self.opened_at_ms.is_some()
    }
}

/// Derives a stable idempotency key for a payload: the hex-encoded SHA-256
/// digest of its bytes. Identical payloads always yield the same key,
/// letting a caller-level retry detect it already shipped.
pub fn idempotency_key_for_payload(payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    hex::encode(digest)
}

/// Orchestrates shipping through a [`DispatchTransport`], with retry,
/// circuit breaking, and the billing-blocked gate.
pub struct SegmentDispatcher {
    transport: Arc<dyn DispatchTransport>,
    circuit: CircuitBreaker,
    retry_queue: replay_core::BoundedQueue<PendingUpload>,
    billing_blocked: bool,
    active: bool,
}

impl SegmentDispatcher {
    /// Creates a new dispatcher bound to `transport`, with its own circuit
    /// breaker and a retry queue of `retry_queue_capacity`.
    ///
    /// # Errors
    /// Propagates [`replay_core::CoreError::InvalidCapacity`] wrapped as a
    /// [`DispatchError`] when `retry_queue_capacity` is zero.
    pub fn new(
        transport: Arc<dyn DispatchTransport>,
        circuit_config: CircuitBreakerConfig,
        retry_queue_capacity: usize,
    ) -> Result<Self, DispatchError> {
        let retry_queue = replay_core::BoundedQueue::new(retry_queue_capacity)
            .map_err(|error| DispatchError::Configuration(error.to_string()))?;
        Ok(Self {
            transport,
            circuit: CircuitBreaker::new(circuit_config),
            retry_queue,
            billing_blocked: false,
            active: true,
        })
    }

    /// Marks this dispatcher inactive: in-flight calls to [`Self::dispatch`]
    /// already in progress are unaffected, but no new call proceeds past
    /// this check.
    pub fn halt(&mut self) {
        self.active = false;
    }

    /// `true` once a 402 response has been observed for this session; no
    /// further presign may succeed afterward.
    pub fn billing_blocked(&self) -> bool {
        self.billing_blocked
    }

    /// `true` while the circuit breaker is open.
    pub fn circuit_open(&self) -> bool {
        self.circuit.is_open()
    }

    /// Number of uploads currently waiting in the retry queue.
    pub fn retry_queue_len(&self) -> usize {
        self.retry_queue.len()
    }

    /// Ships `upload`, requeuing it at the front of the retry queue on a
    /// retryable failure (up to [`replay_core::MAX_ATTEMPTS`]) and updating
    /// breaker/billing state from the outcome.
    ///
    /// # Errors
    /// Returns [`DispatchError::Halted`], [`DispatchError::BillingBlocked`],
    /// or [`DispatchError::CircuitOpen`] when the dispatcher refuses to ship
    /// at all; otherwise propagates the transport's [`DispatchError`].
    pub fn dispatch(&mut self, upload: PendingUpload, now_ms: u64) -> Result<ShipOutcome, DispatchError> {
        if !self.active {
            return Err(DispatchError::Halted);
        }
        if self.billing_blocked {
            return Err(DispatchError::BillingBlocked);
        }
        if !self.circuit.allow_request(now_ms) {
            return Err(DispatchError::CircuitOpen);
        }

        match self.transport.ship(&upload) {
            Ok(outcome) => {
                self.circuit.record_success();
                Ok(outcome)
            }
            Err(DispatchError::BillingBlocked) => {
                self.billing_blocked = true;
                Err(DispatchError::BillingBlocked)
            }
            Err(DispatchError::AuthFatal(message)) => Err(DispatchError::AuthFatal(message)),
            Err(DispatchError::NonRetryable(message)) => {
                tracing::warn!(session_id = %upload.session_id, %message, "dropping non-retryable upload");
                Err(DispatchError::NonRetryable(message))
            }
            Err(DispatchError::Retryable(message)) => {
                self.circuit.record_failure(now_ms);
                let next = upload.next_attempt(now_ms);
                if next.exhausted() {
                    tracing::warn!(session_id = %upload.session_id, "dropping upload after max attempts");
                } else {
                    tracing::info!(
                        session_id = %next.session_id,
                        attempt = next.attempt,
                        next_eligible_ms = next.next_eligible_ms,
                        "requeuing upload for backoff retry"
                    );
                    self.retry_queue.requeue_front(next);
                }
                Err(DispatchError::Retryable(message))
            }
            other => other,
        }
    }

    /// Pops the next upload awaiting retry, if its backoff window has
    /// elapsed as of `now_ms`. Returns `None` both when the queue is empty
    /// and when the head item is still within its backoff window — it is
    /// left in place for a later call.
    pub fn pop_retry(&mut self, now_ms: u64) -> Option<PendingUpload> {
        if !self.retry_queue.front()?.eligible_at(now_ms) {
            return None;
        }
        self.retry_queue.pop_front()
    }

/// Errors raised while dispatching an upload.
#[derive(Debug, Error, Clone)]
pub enum DispatchError {
    /// The dispatcher has been halted; no new work may start.
    #[error("dispatcher halted")]
    Halted,
    /// A 402 response was observed; terminal for the remainder of the
    /// session.
    #[error("billing blocked for this session")]
    BillingBlocked,
    /// The circuit breaker is open; no new work proceeds until cooldown.
    #[error("circuit breaker open")]
    CircuitOpen,
    /// Registrar returned 403/404: the orchestrator must not start a
    /// session.
    #[error("auth fatal: {0}")]
    AuthFatal(String),
    /// Any other 4xx: not retried, but does not trip the breaker.
    #[error("non-retryable upload failure: {0}")]
    NonRetryable(String),
    /// 5xx or a network error: requeued for retry.
    #[error("retryable upload failure: {0}")]
    Retryable(String),
    /// The dispatcher itself was misconfigured.
    #[error("dispatcher configuration error: {0}")]
    Configuration(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_core::UploadKind;
    use std::sync::Mutex;

    struct ScriptedTransport {
        responses: Mutex<Vec<Result<ShipOutcome, DispatchError>>>,
    }

    impl DispatchTransport for ScriptedTransport {
        fn ship(&self, _upload: &PendingUpload) -> Result<ShipOutcome, DispatchError> {
            self.responses.lock().unwrap().remove(0)
        }
    }

    fn sample_upload() -> PendingUpload {
        PendingUpload::new("session_1_abc", UploadKind::Events, vec![1, 2, 3], None, None, 5)
    }

    #[test]
    fn retryable_failure_then_success_requeues_and_recovers() {
        let transport = Arc::new(ScriptedTransport {
            responses: Mutex::new(vec![
                Err(DispatchError::Retryable("timeout".to_string())),
                Ok(ShipOutcome::Uploaded),
            ]),
        });
        let mut dispatcher = SegmentDispatcher::new(transport, CircuitBreakerConfig::default(), 8).unwrap();

        let first = dispatcher.dispatch(sample_upload(), 0);
        assert!(matches!(first, Err(DispatchError::Retryable(_))));
        assert_eq!(dispatcher.retry_queue_len(), 1);

        assert!(dispatcher.pop_retry(999).is_none(), "backoff window has not elapsed yet");
        let requeued = dispatcher.pop_retry(1_000).unwrap();
        assert_eq!(requeued.attempt, 1);
        let second = dispatcher.dispatch(requeued, 1_000);
        assert!(matches!(second, Ok(ShipOutcome::Uploaded)));
        assert!(!dispatcher.circuit_open());
    }

    #[test]
    fn pop_retry_respects_backoff_window() {
        let transport = Arc::new(ScriptedTransport {
            responses: Mutex::new(vec![Err(DispatchError::Retryable("timeout".to_string()))]),
        });
        let mut dispatcher = SegmentDispatcher::new(transport, CircuitBreakerConfig::default(), 8).unwrap();

        let _ = dispatcher.dispatch(sample_upload(), 5_000);
        assert_eq!(dispatcher.retry_queue_len(), 1);
        assert!(dispatcher.pop_retry(5_500).is_none());
        assert!(dispatcher.pop_retry(5_999).is_none());
        let requeued = dispatcher.pop_retry(6_000).expect("backoff window has elapsed");
        assert_eq!(requeued.next_eligible_ms, 6_000);
        assert_eq!(dispatcher.retry_queue_len(), 0);
    }

    #[test]
    fn billing_blocked_persists_across_calls() {
        let transport = Arc::new(ScriptedTransport {
            responses: Mutex::new(vec![
                Err(DispatchError::BillingBlocked),
                Ok(ShipOutcome::Uploaded),
            ]),
        });
        let mut dispatcher = SegmentDispatcher::new(transport, CircuitBreakerConfig::default(), 8).unwrap();

        assert!(matches!(dispatcher.dispatch(sample_upload(), 0), Err(DispatchError::BillingBlocked)));
        assert!(dispatcher.billing_blocked());
        assert!(matches!(dispatcher.dispatch(sample_upload(), 1), Err(DispatchError::BillingBlocked)));
    }

    #[test]
    fn circuit_opens_after_threshold_and_closes_after_cooldown() {
        let transport = Arc::new(ScriptedTransport {
            responses: Mutex::new(
                (0..5).map(|_| Err(DispatchError::Retryable("fail".to_string()))).collect(),
            ),
        });
        let config = CircuitBreakerConfig { threshold: 3, cooldown_ms: 60_000 };
        let mut dispatcher = SegmentDispatcher::new(transport, config, 8).unwrap();

        for t in 0..3 {
            let _ = dispatcher.dispatch(sample_upload(), t * 100);
        }
        assert!(dispatcher.circuit_open());

        let blocked = dispatcher.dispatch(sample_upload(), 59_000);
        assert!(matches!(blocked, Err(DispatchError::CircuitOpen)));

        let closed = dispatcher.dispatch(sample_upload(), 61_000);
        assert!(matches!(closed, Err(DispatchError::Retryable(_))));
        assert!(!dispatcher.circuit_open());
    }

    #[test]
    fn halt_blocks_all_new_dispatches() {
        let transport = Arc::new(ScriptedTransport { responses: Mutex::new(vec![]) });
        let mut dispatcher = SegmentDispatcher::new(transport, CircuitBreakerConfig::default(), 8).unwrap();
        dispatcher.halt();
        assert!(matches!(dispatcher.dispatch(sample_upload(), 0), Err(DispatchError::Halted)));
    }

    #[test]
    fn idempotency_key_is_stable_for_identical_payload() {
        let a = idempotency_key_for_payload(b"hello");
        let b = idempotency_key_for_payload(b"hello");
        let c = idempotency_key_for_payload(b"world");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
