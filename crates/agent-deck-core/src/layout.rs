//! Tab layout tree persisted per window.

use serde::{Deserialize, Serialize};

/// Split orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitDirection {
    /// Children side by side
    Horizontal,
    /// Children stacked
    Vertical,
}

/// A node in a tab's layout tree: a leaf pane or a two-way split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayoutNode {
    /// Leaf pane, optionally bound to a session
    Pane {
        /// Pane identifier, unique within the tab
        id: String,
        /// Session id the pane is attached to, if any
        #[serde(default, skip_serializing_if = "Option::is_none")]
        binding: Option<String>,
    },
    /// Binary split
    Split {
        /// Orientation
        direction: SplitDirection,
        /// First child's share, exclusive (0, 1)
        ratio: f64,
        /// Exactly two children
        children: Vec<LayoutNode>,
    },
}

impl LayoutNode {
    /// Structural validation: splits carry exactly two valid children and a
    /// ratio strictly inside (0, 1).
    pub fn is_valid(&self) -> bool {
        match self {
            LayoutNode::Pane { id, .. } => !id.is_empty(),
            LayoutNode::Split {
                ratio, children, ..
            } => {
                *ratio > 0.0
                    && *ratio < 1.0
                    && children.len() == 2
                    && children.iter().all(LayoutNode::is_valid)
            }
        }
    }

    /// Collect the pane ids in the tree, depth-first.
    pub fn pane_ids(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_pane_ids(&mut out);
        out
    }

    fn collect_pane_ids<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            LayoutNode::Pane { id, .. } => out.push(id),
            LayoutNode::Split { children, .. } => {
                for child in children {
                    child.collect_pane_ids(out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_split() -> LayoutNode {
        LayoutNode::Split {
            direction: SplitDirection::Horizontal,
            ratio: 0.5,
            children: vec![
                LayoutNode::Pane {
                    id: "p1".to_string(),
                    binding: Some("deadbeef-1700000000".to_string()),
                },
                LayoutNode::Pane {
                    id: "p2".to_string(),
                    binding: None,
                },
            ],
        }
    }

    #[test]
    fn test_layout_round_trip() {
        let node = sample_split();
        let json = serde_json::to_string(&node).unwrap();
        let back: LayoutNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_layout_tagged_encoding() {
        let json = serde_json::to_value(sample_split()).unwrap();
        assert_eq!(json["type"], "split");
        assert_eq!(json["children"][0]["type"], "pane");
        assert_eq!(json["children"][1].get("binding"), None);
    }

    #[test]
    fn test_unknown_node_type_rejected() {
        let json = r#"{"type": "tabset", "children": []}"#;
        assert!(serde_json::from_str::<LayoutNode>(json).is_err());
    }

    #[test]
    fn test_validation() {
        assert!(sample_split().is_valid());

        let bad_ratio = LayoutNode::Split {
            direction: SplitDirection::Vertical,
            ratio: 1.0,
            children: vec![
                LayoutNode::Pane { id: "a".into(), binding: None },
                LayoutNode::Pane { id: "b".into(), binding: None },
            ],
        };
        assert!(!bad_ratio.is_valid());

        let one_child = LayoutNode::Split {
            direction: SplitDirection::Vertical,
            ratio: 0.3,
            children: vec![LayoutNode::Pane { id: "a".into(), binding: None }],
        };
        assert!(!one_child.is_valid());
    }

    #[test]
    fn test_pane_ids_depth_first() {
        let node = LayoutNode::Split {
            direction: SplitDirection::Vertical,
            ratio: 0.25,
            children: vec![
                sample_split(),
                LayoutNode::Pane { id: "p3".into(), binding: None },
            ],
        };
        assert_eq!(node.pane_ids(), vec!["p1", "p2", "p3"]);
    }
}
