//! View hierarchy snapshots: structural UI captures shipped on the
//! hierarchy lane.

use serde::{Deserialize, Serialize};

/// Default maximum tree depth serialized into a snapshot.
pub const DEFAULT_MAX_DEPTH: u32 = 10;

/// Per-snapshot self-serialization time budget, in monotonic milliseconds.
pub const SERIALIZATION_BUDGET_MS: u64 = 10;

/// Screen metadata attached to every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenInfo {
    /// Screen width in logical units.
    pub w: f64,
    /// Screen height in logical units.
    pub h: f64,
    /// Screen scale factor.
    pub scale: f64,
}

/// A 2D rectangle in logical density-independent units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub w: f64,
    /// Height.
    pub h: f64,
}

/// A 2D offset, used for scrollable content.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    /// Horizontal offset.
    pub x: f64,
    /// Vertical offset.
    pub y: f64,
}

/// A 2D size, used for scrollable content extents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

/// One serialized node of the view tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ViewNode {
    /// Native view class/type name.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Layout frame in logical units.
    pub frame: Option<Frame>,
    /// Background color, when it carries information (e.g. not default).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bg: Option<String>,
    /// Visible text, replaced by asterisks when `masked` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Original text length, preserved even when `text` is masked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_length: Option<u32>,
    /// Accessibility/test identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
    /// Accessibility label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Host-assigned view tag, checked against the reserved privacy-mask
    /// marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// `true` when this node's text was privacy-masked.
    #[serde(default)]
    pub masked: bool,
    /// `true` when this node is not visible.
    #[serde(default)]
    pub hidden: bool,
    /// Opacity, 0.0-1.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f64>,
    /// `true` when this node accepts touch input.
    #[serde(default)]
    pub interactive: bool,
    /// Button title, for button-like controls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_title: Option<String>,
    /// `false` for disabled controls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Current on/off state, for switch-like controls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_on: Option<bool>,
    /// Scroll offset, for scrollable containers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_offset: Option<Offset>,
    /// Scrollable content extent, for scrollable containers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_size: Option<Size>,
    /// Child nodes, depth-limited to `maxDepth`.
    #[serde(default)]
    pub children: Vec<ViewNode>,
    /// `true` when the scan budget was exceeded while descending into this
    /// subtree; children below this point were not serialized.
    #[serde(default)]
    pub bailout: bool,
}

impl ViewNode {
    /// Creates a minimal node of the given native type.
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            ..Default::default()
        }
    }

    /// Marks this node as a depth-budget bailout: children are discarded and
    /// `bailout` is set.
    pub fn into_bailout(mut self) -> Self {
        self.children.clear();
        self.bailout = true;
        self
    }

    /// Returns the maximum depth of this node's subtree, where a leaf has
    /// depth 1.
    pub fn depth(&self) -> u32 {
        1 + self.children.iter().map(ViewNode::depth).max().unwrap_or(0)
    }
}

/// A structural snapshot of the visible UI at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchySnapshot {
    /// Capture time in Unix epoch milliseconds.
    pub timestamp: u64,
    /// Screen metadata.
    pub screen: ScreenInfo,
    /// Root of the serialized view tree.
    pub root: ViewNode,
    /// Structural hash used for change-detection between snapshots; absent
    /// when the scanner chose not to compute one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_signature: Option<String>,
}

impl HierarchySnapshot {
    /// Truncates `root` to at most `max_depth` levels, marking truncation
    /// points with [`ViewNode::bailout`].
    pub fn truncate_to_depth(&mut self, max_depth: u32) {
        truncate_node(&mut self.root, max_depth);
    }
}

fn truncate_node(node: &mut ViewNode, remaining_depth: u32) {
    if remaining_depth == 0 {
        *node = std::mem::take(node).into_bailout();
        return;
    }
    for child in &mut node.children {
        truncate_node(child, remaining_depth - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(node_type: &str) -> ViewNode {
        ViewNode::new(node_type)
    }

    #[test]
    fn depth_counts_leaf_as_one() {
        assert_eq!(leaf("Label").depth(), 1);
    }

    #[test]
    fn depth_counts_nested_children() {
        let mut root = leaf("View");
        let mut child = leaf("View");
        child.children.push(leaf("Label"));
        root.children.push(child);
        assert_eq!(root.depth(), 3);
    }

    #[test]
    fn truncation_sets_bailout_beyond_max_depth() {
        let mut snapshot = HierarchySnapshot {
            timestamp: 0,
            screen: ScreenInfo { w: 100.0, h: 100.0, scale: 2.0 },
            root: {
                let mut root = leaf("View");
                let mut child = leaf("View");
                child.children.push(leaf("Label"));
                root.children.push(child);
                root
            },
            layout_signature: None,
        };
        snapshot.truncate_to_depth(2);
        assert!(!snapshot.root.bailout);
        assert!(snapshot.root.children[0].bailout);
        assert!(snapshot.root.children[0].children.is_empty());
    }
}
