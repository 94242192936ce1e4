#![warn(missing_docs)]
//! # replay-capture
//!
//! ## Purpose
//! Visual Capture, Video Encoder configuration, and the Privacy Mask. The
//! host supplies bitmap acquisition and view-tree scanning through the
//! [`CaptureBackend`] capability interface; this crate owns scheduling,
//! masking, and segment/encoder bookkeeping only.
//!
//! ## Responsibilities
//! - Schedule periodic bitmap acquisition at a configured capture rate.
//! - Classify view-tree nodes as privacy-sensitive and mask their hierarchy
//!   text in place.
//! - Resolve privacy-sensitive rectangles from the masked tree and apply
//!   opaque bitmap masking.
//! - Validate and normalize video encoder configuration (dimensions,
//!   bitrate, keyframe interval, segment rotation).
//! - Keep per-segment presentation timestamps monotonically increasing.
//!
//! ## Data flow
//! `CaptureConfig` -> [`scheduled_capture_times`] drives when Visual Capture
//! ticks. Each tick: `CaptureBackend::acquire_bitmap` runs alongside a view-tree
//! scan; [`apply_hierarchy_privacy_mask`] classifies and masks the scanned
//! tree first, then [`compute_privacy_rects`] -> [`apply_privacy_mask`] mask
//! the bitmap over the same regions before either is handed to the encoder
//! or serializer. Encoder emits [`SegmentMeta`] on rotation/close, consumed
//! by the frame-bundle ingress in `replay-telemetry`.
//!
//! ## Ownership and lifetimes
//! [`CaptureBackend`] implementations are host-owned; this crate only ever
//! borrows them for the duration of one tick.
//!
//! ## Error model
//! Backend and configuration failures return [`CaptureError`]; a privacy
//! scan that exceeds budget degrades to a fallback instead of failing (see
//! [`compute_privacy_rects`]).
//!
//! ## Security and privacy notes
//! Masked bitmap regions are opaque; masked text is replaced before it ever
//! reaches the encoder or serializer. Classification rules ([`is_sensitive`])
//! never depend on text content itself, only on class, tag, and identifier
//! metadata, so masking decisions are made before any sensitive text is
//! read.

use std::collections::HashSet;

use replay_core::{HierarchySnapshot, ViewNode};
use thiserror::Error;

/// Host display metadata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayInfo {
    /// Width in physical pixels.
    pub width: u32,
    /// Height in physical pixels.
    pub height: u32,
}

/// A raw, unmasked bitmap acquired from the host.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBitmap {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Packed RGBA bytes, row-major, `width * height * 4` long.
    pub rgba: Vec<u8>,
}

impl RawBitmap {
    /// Builds a bitmap, validating `rgba`'s length against `width`/`height`.
    ///
    /// # Errors
    /// Returns [`CaptureError::MalformedBitmap`] on a length mismatch.
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, CaptureError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(CaptureError::MalformedBitmap { expected, actual: rgba.len() });
        }
        Ok(Self { width, height, rgba })
    }
}

/// Capture cadence and encoder configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureConfig {
    /// Target encoder frame rate, 1-99.
    pub fps: u32,
    /// Target video bitrate in bits per second.
    pub bitrate_bps: u32,
    /// Keyframe interval in seconds.
    pub keyframe_interval_secs: u32,
    /// Downscale factor applied before encoding, 0.0 exclusive - 1.0.
    pub capture_scale: f64,
    /// Maximum longest-edge length in pixels after scaling.
    pub max_longest_edge_px: u32,
    /// Frames per rotated segment.
    pub frames_per_segment: u32,
}

impl CaptureConfig {
    /// Builds a config at `fps`, with the documented defaults for every
    /// other field.
    ///
    /// # Errors
    /// Returns [`CaptureError::InvalidFps`] when `fps` is outside `1..=99`.
    pub fn new(fps: u32) -> Result<Self, CaptureError> {
        if !(1..=99).contains(&fps) {
            return Err(CaptureError::InvalidFps(fps));
        }
        Ok(Self {
            fps,
            bitrate_bps: 1_500_000,
            keyframe_interval_secs: 10,
            capture_scale: 0.35,
            max_longest_edge_px: 1920,
            frames_per_segment: 60,
        })
    }

    /// Interval between captures, in milliseconds.
    pub fn interval_ms(&self) -> u64 {
        1000 / self.fps as u64
    }

    /// Resolves the encoded output dimensions for a source bitmap of
    /// `source_width`x`source_height`: scaled by `capture_scale`, capped at
    /// `max_longest_edge_px` on the longest edge, rounded to even values,
    /// and floored at 100x100.
    pub fn resolve_output_dimensions(&self, source_width: u32, source_height: u32) -> (u32, u32) {
        let scaled_w = (source_width as f64 * self.capture_scale).round().max(1.0);
        let scaled_h = (source_height as f64 * self.capture_scale).round().max(1.0);

        let longest = scaled_w.max(scaled_h);
        let cap = self.max_longest_edge_px as f64;
        let (capped_w, capped_h) = if longest > cap {
            let factor = cap / longest;
            (scaled_w * factor, scaled_h * factor)
        } else {
            (scaled_w, scaled_h)
        };

        let round_even = |value: f64| -> u32 {
            let rounded = value.round() as u32;
            if rounded % 2 == 0 { rounded } else { rounded + 1 }
        };

        let w = round_even(capped_w).max(100);
        let h = round_even(capped_h).max(100);
        (w, h)
    }
}

/// Returns the wall-clock ms at which each of `count` captures should fire,
/// starting at `start_ms` and spaced by `interval_ms`.
pub fn scheduled_capture_times(start_ms: u64, interval_ms: u64, count: u32) -> Vec<u64> {
    tracing::debug!(start_ms, interval_ms, count, "scheduling capture ticks");
    (0..count).map(|i| start_ms + i as u64 * interval_ms).collect()
}

/// Host capability interface for bitmap acquisition. Implemented by the
/// embedding application; this crate never touches platform APIs directly.
pub trait CaptureBackend: Send + Sync {
    /// Acquires one bitmap from the current display. Must be invoked on the
    /// host's UI thread; this trait does not enforce that itself.
    ///
    /// # Errors
    /// Returns [`CaptureError::AcquisitionFailed`] when the host cannot
    /// produce a bitmap this tick.
    fn acquire_bitmap(&self, display: &DisplayInfo) -> Result<RawBitmap, CaptureError>;
}

/// Deterministic, platform-independent backend used in tests and CI: fills
/// the bitmap with a value derived from the tick index so repeated captures
/// are distinguishable without touching any real display.
#[derive(Debug, Default)]
pub struct SyntheticCaptureBackend {
    tick: std::sync::atomic::AtomicU32,
}

impl SyntheticCaptureBackend {
    /// Creates a new synthetic backend starting at tick 0.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CaptureBackend for SyntheticCaptureBackend {
    fn acquire_bitmap(&self, display: &DisplayInfo) -> Result<RawBitmap, CaptureError> {
        let tick = self.tick.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let value = (tick % 256) as u8;
        let pixel_count = display.width as usize * display.height as usize;
        let rgba = vec![value; pixel_count * 4];
        RawBitmap::new(display.width, display.height, rgba)
    }
}

/// An axis-aligned rectangle, in physical pixels, to be masked opaque.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrivacyRect {
    /// Left edge in pixels.
    pub x: u32,
    /// Top edge in pixels.
    pub y: u32,
    /// Width in pixels.
    pub w: u32,
    /// Height in pixels.
    pub h: u32,
}

/// Multi-window scan budget: the default number of views inspected before
/// falling back.
pub const DEFAULT_SCAN_VIEW_BUDGET: usize = 500;
/// Wider fallback budget used only when the default pass found no rects.
pub const WIDE_SCAN_VIEW_BUDGET: usize = 2000;

/// Native widget class names treated as secure-text fields outright, exact
/// match against [`ViewNode::node_type`].
pub const SECURE_TEXT_WIDGET_CLASSES: &[&str] =
    &["UITextField.secureTextEntry", "SecureTextField", "PasswordEditText"];

/// Reserved [`ViewNode::tag`] value marking a view as sensitive regardless
/// of its class.
pub const SENSITIVE_TAG_MARKER: &str = "rejourney_sensitive";

/// Substrings matched case-insensitively against [`ViewNode::node_type`] to
/// heuristically classify a node as sensitive: text input, edit text,
/// password, secure text, webview, camera preview, and video/player
/// families.
pub const SENSITIVE_CLASS_NAME_HINTS: &[&str] =
    &["textinput", "edittext", "password", "securetext", "webview", "camera", "video", "player"];

/// `true` when `node` is privacy-sensitive under any of the four documented
/// rules: a known secure-text widget class, the reserved tag marker, a
/// registered `nativeID` present in `masked_native_ids`, or a heuristic
/// class-name match.
pub fn is_sensitive(node: &ViewNode, masked_native_ids: &HashSet<String>) -> bool {
    if SECURE_TEXT_WIDGET_CLASSES.iter().any(|class| *class == node.node_type) {
        return true;
    }
    if node.tag.as_deref() == Some(SENSITIVE_TAG_MARKER) {
        return true;
    }
    if node.test_id.as_ref().is_some_and(|id| masked_native_ids.contains(id)) {
        return true;
    }
    let class_lower = node.node_type.to_ascii_lowercase();
    SENSITIVE_CLASS_NAME_HINTS.iter().any(|hint| class_lower.contains(hint))
}

/// Walks `node`'s subtree, masking every node [`is_sensitive`] classifies as
/// sensitive: sets `masked`, and replaces `text` with asterisks while
/// preserving `text_length`. Run before [`compute_privacy_rects`] so its
/// `masked` read reflects a real classification.
pub fn apply_hierarchy_privacy_mask(node: &mut ViewNode, masked_native_ids: &HashSet<String>) {
    if is_sensitive(node, masked_native_ids) {
        mask_node_text(node);
    }
    for child in &mut node.children {
        apply_hierarchy_privacy_mask(child, masked_native_ids);
    }
}

fn mask_node_text(node: &mut ViewNode) {
    node.masked = true;
    if let Some(text) = &node.text {
        let char_count = text.chars().count();
        node.text_length = Some(char_count as u32);
        node.text = Some("*".repeat(char_count));
    }
}

/// Resolves privacy-sensitive rectangles from a hierarchy snapshot's view
/// tree, honoring the two-pass scan-budget fallback: a default-budget pass,
/// widened only if it found nothing, to preserve coverage over performance.
pub fn compute_privacy_rects(snapshot: &HierarchySnapshot, screen_scale: f64) -> Vec<PrivacyRect> {
    let mut rects = Vec::new();
    collect_sensitive_rects(&snapshot.root, screen_scale, DEFAULT_SCAN_VIEW_BUDGET, &mut rects, &mut 0);
    if rects.is_empty() {
        tracing::debug!("default privacy scan found no sensitive rects, widening scan budget");
        collect_sensitive_rects(&snapshot.root, screen_scale, WIDE_SCAN_VIEW_BUDGET, &mut rects, &mut 0);
    }
    rects
}

fn collect_sensitive_rects(
    node: &ViewNode,
    screen_scale: f64,
    budget: usize,
    out: &mut Vec<PrivacyRect>,
    visited: &mut usize,
) {
    if *visited >= budget {
        return;
    }
    *visited += 1;

    if node.masked {
        if let Some(frame) = node.frame {
            out.push(PrivacyRect {
                x: (frame.x * screen_scale).max(0.0) as u32,
                y: (frame.y * screen_scale).max(0.0) as u32,
                w: (frame.w * screen_scale).max(0.0) as u32,
                h: (frame.h * screen_scale).max(0.0) as u32,
            });
        }
    }

    for child in &node.children {
        collect_sensitive_rects(child, screen_scale, budget, out, visited);
    }
}

/// Applies opaque black fills over `rects` on `bitmap`, in place.
pub fn apply_privacy_mask(bitmap: &mut RawBitmap, rects: &[PrivacyRect]) {
    for rect in rects {
        for row in rect.y..(rect.y + rect.h).min(bitmap.height) {
            for col in rect.x..(rect.x + rect.w).min(bitmap.width) {
                let idx = (row as usize * bitmap.width as usize + col as usize) * 4;
                if idx + 4 <= bitmap.rgba.len() {
                    bitmap.rgba[idx..idx + 4].copy_from_slice(&[0, 0, 0, 255]);
                }
            }
        }
    }
}

/// Metadata emitted when a video segment rotates or closes.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentMeta {
    /// On-disk segment file path.
    pub file: String,
    /// Wall-clock ms of the first encoded frame.
    pub start_ms: u64,
    /// Wall-clock ms of the last encoded frame.
    pub end_ms: u64,
    /// Number of frames encoded into this segment.
    pub frame_count: u32,
}

/// Ensures presentation timestamps (in microseconds, relative to the first
/// frame of a segment) are strictly increasing: a candidate equal to or
/// before `prev_pts_us` is nudged to `prev_pts_us + 1`.
pub fn next_presentation_timestamp_us(prev_pts_us: u64, candidate_pts_us: u64) -> u64 {
    if candidate_pts_us > prev_pts_us {
        candidate_pts_us
    } else {
        prev_pts_us + 1
    }
}

/// Errors raised by capture scheduling, bitmap validation, and encoder
/// configuration.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// `fps` outside the supported `1..=99` range.
    #[error("fps {0} outside supported range 1..=99")]
    InvalidFps(u32),
    /// Bitmap byte length did not match `width * height * 4`.
    #[error("bitmap length mismatch: expected {expected}, got {actual}")]
    MalformedBitmap {
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        actual: usize,
    },
    /// The host backend could not produce a bitmap this tick.
    #[error("bitmap acquisition failed: {0}")]
    AcquisitionFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_core::{Frame, ScreenInfo};

    #[test]
    fn fps_outside_range_is_rejected() {
        assert!(matches!(CaptureConfig::new(0), Err(CaptureError::InvalidFps(0))));
        assert!(matches!(CaptureConfig::new(100), Err(CaptureError::InvalidFps(100))));
    }

    #[test]
    fn interval_ms_matches_fps() {
        let config = CaptureConfig::new(15).unwrap();
        assert_eq!(config.interval_ms(), 66);
    }

    #[test]
    fn scheduled_times_are_evenly_spaced() {
        let times = scheduled_capture_times(1000, 250, 4);
        assert_eq!(times, vec![1000, 1250, 1500, 1750]);
    }

    #[test]
    fn output_dimensions_are_scaled_capped_and_even() {
        let config = CaptureConfig::new(15).unwrap();
        let (w, h) = config.resolve_output_dimensions(1170, 2532);
        assert_eq!(w % 2, 0);
        assert_eq!(h % 2, 0);
        assert!(w.max(h) <= 1920);
    }

    #[test]
    fn output_dimensions_floor_at_100x100() {
        let config = CaptureConfig::new(15).unwrap();
        let (w, h) = config.resolve_output_dimensions(10, 10);
        assert_eq!((w, h), (100, 100));
    }

    #[test]
    fn synthetic_backend_produces_valid_bitmaps() {
        let backend = SyntheticCaptureBackend::new();
        let display = DisplayInfo { width: 4, height: 4 };
        let bitmap = backend.acquire_bitmap(&display).unwrap();
        assert_eq!(bitmap.rgba.len(), 4 * 4 * 4);
    }

    #[test]
    fn presentation_timestamps_never_go_backwards() {
        assert_eq!(next_presentation_timestamp_us(100, 150), 150);
        assert_eq!(next_presentation_timestamp_us(100, 100), 101);
        assert_eq!(next_presentation_timestamp_us(100, 50), 101);
    }

    #[test]
    fn privacy_mask_opaque_fills_sensitive_rect() {
        let mut bitmap = RawBitmap::new(4, 4, vec![255; 4 * 4 * 4]).unwrap();
        let rect = PrivacyRect { x: 0, y: 0, w: 2, h: 2 };
        apply_privacy_mask(&mut bitmap, &[rect]);
        assert_eq!(&bitmap.rgba[0..4], &[0, 0, 0, 255]);
        assert_eq!(&bitmap.rgba[16..20], &[255, 255, 255, 255]);
    }

    #[test]
    fn is_sensitive_matches_secure_text_widget_class() {
        let node = ViewNode { node_type: "SecureTextField".to_string(), ..Default::default() };
        assert!(is_sensitive(&node, &HashSet::new()));
    }

    #[test]
    fn is_sensitive_matches_reserved_tag_marker() {
        let node = ViewNode {
            node_type: "CustomView".to_string(),
            tag: Some(SENSITIVE_TAG_MARKER.to_string()),
            ..Default::default()
        };
        assert!(is_sensitive(&node, &HashSet::new()));
    }

    #[test]
    fn is_sensitive_matches_registered_native_id() {
        let node = ViewNode {
            node_type: "CustomView".to_string(),
            test_id: Some("ssn_field".to_string()),
            ..Default::default()
        };
        let mut masked_ids = HashSet::new();
        masked_ids.insert("ssn_field".to_string());
        assert!(is_sensitive(&node, &masked_ids));
        assert!(!is_sensitive(&node, &HashSet::new()));
    }

    #[test]
    fn is_sensitive_matches_class_name_heuristics() {
        for class in ["AndroidEditText", "ReactTextInput", "RNCWebView", "AVPlayerView"] {
            let node = ViewNode { node_type: class.to_string(), ..Default::default() };
            assert!(is_sensitive(&node, &HashSet::new()), "{class} should classify as sensitive");
        }
        let ordinary = ViewNode { node_type: "UILabel".to_string(), ..Default::default() };
        assert!(!is_sensitive(&ordinary, &HashSet::new()));
    }

    #[test]
    fn apply_hierarchy_privacy_mask_replaces_text_and_preserves_length() {
        let mut node = ViewNode {
            node_type: "PasswordEditText".to_string(),
            text: Some("hunter2".to_string()),
            ..Default::default()
        };
        apply_hierarchy_privacy_mask(&mut node, &HashSet::new());
        assert!(node.masked);
        assert_eq!(node.text.as_deref(), Some("*******"));
        assert_eq!(node.text_length, Some(7));
    }

    #[test]
    fn apply_hierarchy_privacy_mask_descends_into_children() {
        let mut root = ViewNode::new("View");
        root.children.push(ViewNode {
            node_type: "UITextField.secureTextEntry".to_string(),
            text: Some("secret".to_string()),
            ..Default::default()
        });
        root.children.push(ViewNode { node_type: "UILabel".to_string(), text: Some("hello".to_string()), ..Default::default() });

        apply_hierarchy_privacy_mask(&mut root, &HashSet::new());

        assert!(root.children[0].masked);
        assert_eq!(root.children[0].text.as_deref(), Some("******"));
        assert!(!root.children[1].masked);
        assert_eq!(root.children[1].text.as_deref(), Some("hello"));
    }

    #[test]
    fn compute_privacy_rects_finds_masked_node() {
        let masked_child = ViewNode {
            node_type: "TextField".to_string(),
            frame: Some(Frame { x: 10.0, y: 10.0, w: 100.0, h: 20.0 }),
            masked: true,
            ..Default::default()
        };
        let mut root = ViewNode::new("View");
        root.children.push(masked_child);
        let snapshot = HierarchySnapshot {
            timestamp: 0,
            screen: ScreenInfo { w: 390.0, h: 844.0, scale: 1.0 },
            root,
            layout_signature: None,
        };
        let rects = compute_privacy_rects(&snapshot, 1.0);
        assert_eq!(rects.len(), 1);
        assert_eq!(rects[0], PrivacyRect { x: 10, y: 10, w: 100, h: 20 });
    }
}
