#![warn(missing_docs)]
//! # replay-core
//!
//! ## Purpose
//! Defines the pure data model shared across the session capture engine: the
//! event/batch/frame-bundle/hierarchy-snapshot/pending-upload/recovery
//! types, the bounded queues that sit in front of the network, and the
//! clock/id/compression primitives everything else is built on.
//!
//! ## Responsibilities
//! - Represent event records and gzip-serialized event batches.
//! - Represent encoded video frame bundles and hierarchy snapshots.
//! - Provide the bounded, drop-oldest Event Ring and the bounded,
//!   requeue-at-front Frame Queue.
//! - Mint session/segment identifiers and expose a monotonic + wall clock
//!   abstraction for deterministic testing.
//! - Encode/decode gzipped batch payloads.
//!
//! ## Data flow
//! Recorders build [`EventRecord`]s -> [`EventRing`] buffers them -> periodic
//! drain produces an [`EventBatch`] -> [`compression::gzip_encode`] produces
//! the wire payload consumed by the dispatcher. Visual capture produces
//! [`FrameBundle`]s through a [`FrameQueue`]. The hierarchy scanner produces
//! [`HierarchySnapshot`]s directly (point-in-time, no queue).
//!
//! ## Ownership and lifetimes
//! All payloads own their backing buffers (`Vec<u8>`/`String`) so they can
//! cross thread/channel boundaries without borrow coupling between the
//! capture, pipeline, and dispatcher executors (see `replay-orchestrator`'s
//! concurrency notes).
//!
//! ## Error model
//! Validation failures (shape mismatch, empty session id, invalid capacity,
//! codec failure) return [`CoreError`] variants with caller-actionable
//! categorization.
//!
//! ## Security and privacy notes
//! This crate never logs event payload content, frame bytes, or credentials.
//! Session identifiers and tokens are treated as opaque values.

mod batch;
mod clock;
mod compression;
mod event;
mod frame;
mod hierarchy;
mod ids;
mod queue;
mod ring;
mod session;
mod upload;

pub use batch::{DeviceInfo, EventBatch, MAX_UNCOMPRESSED_BYTES};
pub use clock::{Clock, MonotonicClock, SystemClock};
pub use compression::{gzip_decode, gzip_encode};
pub use event::{
    scrub_sensitive_query_params, EventKind, EventPayload, EventRecord, GestureDetail,
    NetworkOutcome, ThreadState, TouchPoint,
};
pub use frame::{assert_non_overlapping, FrameBundle};
pub use hierarchy::{
    Frame, HierarchySnapshot, Offset, ScreenInfo, Size, ViewNode, DEFAULT_MAX_DEPTH,
    SERIALIZATION_BUDGET_MS,
};
pub use ids::{mint_segment_id, mint_session_id};
pub use queue::{BoundedQueue, FrameQueue};
pub use ring::EventRing;
pub use session::{RecoveryCheckpoint, Session, SessionMetrics};
pub use upload::{PendingUpload, UploadKind, MAX_ATTEMPTS};

use thiserror::Error;

/// Error type for core domain validation and codec failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Batch capacity must be strictly positive.
    #[error("batch capacity must be greater than zero")]
    InvalidCapacity,
    /// Frame set cannot be empty for batch/bundle operations.
    #[error("input collection is empty")]
    EmptySet,
    /// Session id cannot be empty.
    #[error("session id is empty")]
    InvalidSessionId,
    /// An ordering or geometry invariant was violated.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    /// JSON encoding/decoding error.
    #[error("payload codec failure: {0}")]
    Json(#[from] serde_json::Error),
    /// Gzip encode/decode error.
    #[error("gzip codec failure: {0}")]
    Gzip(String),
}
