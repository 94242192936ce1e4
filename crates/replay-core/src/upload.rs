//! Pending uploads: the unit the dispatcher's retry queue holds, shared by
//! all three lanes.

use serde::{Deserialize, Serialize};

/// Maximum number of dispatch attempts before a pending upload is dropped.
pub const MAX_ATTEMPTS: u32 = 3;

/// Retry backoff base delay, milliseconds, applied after the first failure.
pub const RETRY_BASE_DELAY_MS: u64 = 1_000;
/// Retry backoff multiplier applied per additional attempt.
pub const RETRY_BACKOFF_MULTIPLIER: u64 = 2;
/// Retry backoff cap, milliseconds; the delay never grows past this.
pub const RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Which lane a pending upload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadKind {
    /// Gzipped event batch.
    Events,
    /// Encoded video segment.
    Video,
    /// Gzipped hierarchy snapshot.
    Hierarchy,
    /// Screenshot bundle.
    Screenshots,
}

impl UploadKind {
    /// Content-Type header value used for the PUT-to-object-store phase.
    pub fn content_type(&self) -> &'static str {
        match self {
            UploadKind::Events | UploadKind::Hierarchy => "application/gzip",
            UploadKind::Video => "video/mp4",
            UploadKind::Screenshots => "application/gzip",
        }
    }
}

/// A unit of work ready to ship, produced by a lane and consumed by the
/// dispatcher. Re-queued at the head of the retry queue on transport
/// failure, up to [`MAX_ATTEMPTS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingUpload {
    /// Owning session identifier.
    pub session_id: String,
    /// Lane this upload belongs to.
    pub kind: UploadKind,
    /// Payload bytes ready to PUT.
    pub payload: Vec<u8>,
    /// Wall-clock ms of the first item in this payload, when applicable.
    pub range_start: Option<u64>,
    /// Wall-clock ms of the last item in this payload, when applicable.
    pub range_end: Option<u64>,
    /// Number of logical items carried (events, frames, ...).
    pub item_count: u32,
    /// Number of dispatch attempts made so far, starting at 0.
    pub attempt: u32,
    /// Wall-clock ms before which this upload must not be redispatched.
    /// `0` for a fresh upload, which is always immediately eligible.
    pub next_eligible_ms: u64,
}

impl PendingUpload {
    /// Builds a fresh pending upload at attempt 0, immediately eligible.
    pub fn new(
        session_id: impl Into<String>,
        kind: UploadKind,
        payload: Vec<u8>,
        range_start: Option<u64>,
        range_end: Option<u64>,
        item_count: u32,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            kind,
            payload,
            range_start,
            range_end,
            item_count,
            attempt: 0,
            next_eligible_ms: 0,
        }
    }

    /// Returns a copy with `attempt` incremented and `next_eligible_ms` set
    /// to `now_ms` plus the exponential backoff delay for the new attempt
    /// number, used right before requeuing after a transport failure.
    pub fn next_attempt(&self, now_ms: u64) -> Self {
        let mut next = self.clone();
        next.attempt += 1;
        next.next_eligible_ms = now_ms.saturating_add(Self::backoff_delay_ms(next.attempt));
        next
    }

    /// Exponential backoff delay for `attempt` (1-based): `base * mult^(attempt-1)`,
    /// capped at [`RETRY_MAX_DELAY_MS`].
    fn backoff_delay_ms(attempt: u32) -> u64 {
        let shift = attempt.saturating_sub(1).min(32);
        RETRY_BASE_DELAY_MS
            .saturating_mul(RETRY_BACKOFF_MULTIPLIER.saturating_pow(shift))
            .min(RETRY_MAX_DELAY_MS)
    }

    /// `true` once `now_ms` has reached `next_eligible_ms`: the backoff
    /// window for this attempt has elapsed.
    pub fn eligible_at(&self, now_ms: u64) -> bool {
        now_ms >= self.next_eligible_ms
    }

    /// `true` once [`MAX_ATTEMPTS`] attempts have already been made and the
    /// dispatcher must drop this upload instead of retrying again.
    pub fn exhausted(&self) -> bool {
        self.attempt >= MAX_ATTEMPTS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_matches_lane() {
        assert_eq!(UploadKind::Events.content_type(), "application/gzip");
        assert_eq!(UploadKind::Video.content_type(), "video/mp4");
    }

    #[test]
    fn exhausted_after_max_attempts() {
        let mut upload = PendingUpload::new("s", UploadKind::Events, vec![], None, None, 1);
        assert!(!upload.exhausted());
        for _ in 0..MAX_ATTEMPTS {
            upload = upload.next_attempt(0);
        }
        assert!(upload.exhausted());
    }

    #[test]
    fn backoff_delay_doubles_and_caps() {
        let upload = PendingUpload::new("s", UploadKind::Events, vec![], None, None, 1);
        let first = upload.next_attempt(1_000);
        assert_eq!(first.next_eligible_ms, 2_000);
        let second = first.next_attempt(2_000);
        assert_eq!(second.next_eligible_ms, 4_000);
        let third = second.next_attempt(4_000);
        assert_eq!(third.next_eligible_ms, 4_000 + 4_000);

        let mut many = upload.clone();
        for _ in 0..10 {
            many = many.next_attempt(0);
        }
        assert_eq!(many.next_eligible_ms, RETRY_MAX_DELAY_MS);
    }

    #[test]
    fn eligible_at_gates_on_backoff_window() {
        let upload = PendingUpload::new("s", UploadKind::Events, vec![], None, None, 1);
        let retried = upload.next_attempt(1_000);
        assert!(!retried.eligible_at(1_999));
        assert!(retried.eligible_at(2_000));
    }
}
