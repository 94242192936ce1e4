//! Frame bundles: encoded video segments shipped on the video lane.

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// A self-contained encoded video segment covering `[range_start, range_end]`
/// wall-clock milliseconds of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameBundle {
    /// Owning session identifier.
    pub session_id: String,
    /// Encoded video segment bytes. Always starts with a keyframe.
    pub payload: Vec<u8>,
    /// Wall-clock ms of the first encoded frame.
    pub range_start: u64,
    /// Wall-clock ms of the last encoded frame.
    pub range_end: u64,
    /// Number of frames encoded into this bundle.
    pub frame_count: u32,
}

impl FrameBundle {
    /// Builds a new frame bundle.
    ///
    /// # Errors
    /// Returns [`CoreError::InvariantViolation`] when `range_start >
    /// range_end` or `frame_count == 0`.
    pub fn new(
        session_id: impl Into<String>,
        payload: Vec<u8>,
        range_start: u64,
        range_end: u64,
        frame_count: u32,
    ) -> Result<Self, CoreError> {
        if range_start > range_end {
            return Err(CoreError::InvariantViolation(format!(
                "range_start {range_start} exceeds range_end {range_end}"
            )));
        }
        if frame_count == 0 {
            return Err(CoreError::InvariantViolation(
                "frame bundle must contain at least one frame".to_string(),
            ));
        }
        Ok(Self {
            session_id: session_id.into(),
            payload,
            range_start,
            range_end,
            frame_count,
        })
    }

    /// Returns `true` when `self` is emitted entirely before `other`, i.e.
    /// the two bundles' time ranges do not overlap and `self` comes first.
    pub fn precedes(&self, other: &FrameBundle) -> bool {
        self.range_end <= other.range_start
    }
}

/// Verifies that `bundles`, in emission order, have strictly non-overlapping
/// and monotonically increasing time ranges.
///
/// # Errors
/// Returns [`CoreError::InvariantViolation`] naming the first pair that
/// violates ordering.
pub fn assert_non_overlapping(bundles: &[FrameBundle]) -> Result<(), CoreError> {
    for window in bundles.windows(2) {
        let (first, second) = (&window[0], &window[1]);
        if !first.precedes(second) {
            return Err(CoreError::InvariantViolation(format!(
                "frame bundle range [{}, {}] overlaps following range [{}, {}]",
                first.range_start, first.range_end, second.range_start, second.range_end
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_range() {
        let result = FrameBundle::new("session_1", vec![1, 2, 3], 500, 100, 1);
        assert!(matches!(result, Err(CoreError::InvariantViolation(_))));
    }

    #[test]
    fn rejects_zero_frame_count() {
        let result = FrameBundle::new("session_1", vec![1, 2, 3], 100, 500, 0);
        assert!(matches!(result, Err(CoreError::InvariantViolation(_))));
    }

    #[test]
    fn ordering_check_detects_overlap() {
        let first = FrameBundle::new("s", vec![0], 1000, 4000, 4).unwrap();
        let overlapping = FrameBundle::new("s", vec![0], 3000, 6000, 4).unwrap();
        assert!(assert_non_overlapping(&[first.clone(), overlapping]).is_err());

        let second = FrameBundle::new("s", vec![0], 5000, 8000, 4).unwrap();
        assert!(assert_non_overlapping(&[first, second]).is_ok());
    }
}
