//! Event batches: the gzipped, ordered unit shipped on the events lane.

use serde::{Deserialize, Serialize};

use crate::event::EventRecord;
use crate::CoreError;

/// Maximum uncompressed size of a single batch's event list, in bytes.
pub const MAX_UNCOMPRESSED_BYTES: usize = 500_000;

/// Session/device envelope attached to every event batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Platform name (`ios`, `android`, ...).
    pub platform: String,
    /// Device model identifier.
    pub model: String,
    /// OS name.
    pub os_name: String,
    /// OS version string.
    pub os_version: String,
    /// Stable per-install device fingerprint, supplied by the host.
    pub device_fingerprint: String,
    /// Current network connectivity type (`wifi`, `cellular`, `offline`, ...).
    pub network_type: String,
    /// Host-reported "expensive" network flag (e.g. metered cellular).
    pub network_expensive: bool,
    /// Host-reported "constrained" network flag (e.g. low data mode).
    pub network_constrained: bool,
    /// Embedding application version.
    pub app_version: String,
    /// Embedding application identifier (bundle id / package name).
    pub app_id: String,
    /// Screen width in logical units.
    pub screen_width: f64,
    /// Screen height in logical units.
    pub screen_height: f64,
    /// Screen scale factor.
    pub screen_scale: f64,
    /// `true` when this session is sampled-out: the server must still
    /// accept the batch but must not treat it as a full replay.
    pub sampled_out: bool,
}

/// An ordered, non-empty group of event records sharing one `batchSeq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    /// Monotonically increasing sequence number, per session.
    pub batch_seq: u64,
    /// Ordered event records, oldest first. Never empty.
    pub events: Vec<EventRecord>,
    /// Session/device envelope.
    pub device: DeviceInfo,
}

impl EventBatch {
    /// Builds a new batch, rejecting an empty event list and a batch whose
    /// uncompressed size exceeds [`MAX_UNCOMPRESSED_BYTES`].
    ///
    /// # Errors
    /// Returns [`CoreError::EmptySet`] for an empty `events`, or
    /// [`CoreError::InvariantViolation`] when the uncompressed size is too
    /// large.
    pub fn new(
        batch_seq: u64,
        events: Vec<EventRecord>,
        device: DeviceInfo,
    ) -> Result<Self, CoreError> {
        if events.is_empty() {
            return Err(CoreError::EmptySet);
        }
        let batch = Self { batch_seq, events, device };
        let size = batch.uncompressed_byte_len();
        if size > MAX_UNCOMPRESSED_BYTES {
            return Err(CoreError::InvariantViolation(format!(
                "batch uncompressed size {size} exceeds {MAX_UNCOMPRESSED_BYTES}"
            )));
        }
        Ok(batch)
    }

    /// Total uncompressed size of the event list, in approximate wire bytes.
    pub fn uncompressed_byte_len(&self) -> usize {
        self.events
            .iter()
            .map(EventRecord::approximate_byte_len)
            .sum()
    }

    /// Serializes this batch to JSON and gzip-compresses it.
    ///
    /// # Errors
    /// Propagates [`CoreError::Json`] or [`CoreError::Gzip`] from the
    /// underlying serializer/compressor.
    pub fn to_gzipped_json(&self) -> Result<Vec<u8>, CoreError> {
        let json = serde_json::to_vec(self)?;
        crate::compression::gzip_encode(&json)
    }

    /// Inverse of [`EventBatch::to_gzipped_json`].
    ///
    /// # Errors
    /// Propagates [`CoreError::Gzip`] or [`CoreError::Json`].
    pub fn from_gzipped_json(data: &[u8]) -> Result<Self, CoreError> {
        let json = crate::compression::gzip_decode(data)?;
        let batch = serde_json::from_slice(&json)?;
        Ok(batch)
    }
}
