//! Persistent tree shape and document (de)serialization.
//!
//! [`TreeData`] is the nested, serde-friendly mirror of the runtime arena:
//! node ids, split directions, ratios, and leaf flags survive a round trip;
//! solved rectangles and surface references do not. Surfaces are resolved at
//! rebuild time from whatever the caller still has on screen.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tree::{
    Direction, Leaf, Node, NodeId, NodeKind, PanelTree, Split, SurfaceRef, TreeError,
};

/// Version tag written into every serialized document.
pub const LAYOUT_DOCUMENT_VERSION: u16 = 2;

/// Errors raised while decoding a serialized layout.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("unsupported layout document version {0}")]
    UnsupportedVersion(u16),
    #[error("node {0:?} has {1} children, splits need exactly 2")]
    BadChildCount(NodeId, usize),
    #[error("split node {0:?} is missing a direction")]
    MissingDirection(NodeId),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// One node of the persisted tree shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeData {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(default = "default_split")]
    pub split: f32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub pinned: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub collapsed: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub toolbar: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub main_content: bool,
    pub leaf: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeData>,
}

fn default_split() -> f32 {
    0.5
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

impl TreeData {
    /// Capture the persistent shape of a runtime tree.
    #[must_use]
    pub fn from_tree(tree: &PanelTree) -> Self {
        Self::from_node(tree, tree.root())
    }

    fn from_node(tree: &PanelTree, id: NodeId) -> Self {
        match tree.node(id).map(|node| &node.kind) {
            Some(NodeKind::Leaf(leaf)) => Self {
                id,
                direction: None,
                split: default_split(),
                pinned: leaf.pinned,
                collapsed: leaf.collapsed,
                toolbar: leaf.toolbar,
                main_content: leaf.main_content,
                leaf: true,
                children: Vec::new(),
            },
            Some(NodeKind::Split(split)) => Self {
                id,
                direction: Some(split.direction),
                split: split.ratio,
                pinned: false,
                collapsed: false,
                toolbar: false,
                main_content: false,
                leaf: false,
                children: vec![
                    Self::from_node(tree, split.first),
                    Self::from_node(tree, split.second),
                ],
            },
            None => Self {
                id,
                direction: None,
                split: default_split(),
                pinned: false,
                collapsed: false,
                toolbar: false,
                main_content: false,
                leaf: true,
                children: Vec::new(),
            },
        }
    }

    /// Rebuild a runtime tree from this shape.
    ///
    /// Leaf ids present in `surfaces` get their surface back; unknown ids
    /// come up surfaceless and the caller is expected to fill them in.
    pub fn build_tree(
        &self,
        surfaces: &BTreeMap<NodeId, SurfaceRef>,
    ) -> Result<PanelTree, SnapshotError> {
        let mut nodes = BTreeMap::new();
        let mut highest = 0u64;
        self.collect(None, surfaces, &mut nodes, &mut highest)?;
        Ok(PanelTree::from_parts(self.id, highest + 1, nodes)?)
    }

    fn collect(
        &self,
        parent: Option<NodeId>,
        surfaces: &BTreeMap<NodeId, SurfaceRef>,
        nodes: &mut BTreeMap<NodeId, Node>,
        highest: &mut u64,
    ) -> Result<(), SnapshotError> {
        *highest = (*highest).max(self.id.get());
        let kind = if self.leaf {
            if !self.children.is_empty() {
                return Err(SnapshotError::BadChildCount(self.id, self.children.len()));
            }
            NodeKind::Leaf(Leaf {
                surface: surfaces.get(&self.id).copied(),
                pinned: self.pinned,
                // Collapse requires a pin; drop a stray collapse flag
                // rather than rejecting the whole document.
                collapsed: self.collapsed && self.pinned,
                toolbar: self.toolbar,
                main_content: self.main_content,
            })
        } else {
            if self.children.len() != 2 {
                return Err(SnapshotError::BadChildCount(self.id, self.children.len()));
            }
            let direction = self
                .direction
                .ok_or(SnapshotError::MissingDirection(self.id))?;
            let ratio = if self.split.is_finite() && self.split > 0.0 && self.split < 1.0 {
                self.split
            } else {
                default_split()
            };
            for child in &self.children {
                child.collect(Some(self.id), surfaces, nodes, highest)?;
            }
            NodeKind::Split(Split {
                direction,
                ratio,
                first: self.children[0].id,
                second: self.children[1].id,
            })
        };
        if nodes
            .insert(
                self.id,
                Node {
                    id: self.id,
                    parent,
                    rect: panegrid_core::geometry::Rect::default(),
                    kind,
                },
            )
            .is_some()
        {
            return Err(SnapshotError::Tree(TreeError::DuplicateId(self.id)));
        }
        Ok(())
    }
}

/// Top-level serialized layout: tree shape plus per-leaf content tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutDocument {
    pub version: u16,
    pub tree: TreeData,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub content: BTreeMap<NodeId, String>,
}

impl LayoutDocument {
    /// Wrap a tree shape and content map in a current-version document.
    #[must_use]
    pub fn new(tree: TreeData, content: BTreeMap<NodeId, String>) -> Self {
        Self {
            version: LAYOUT_DOCUMENT_VERSION,
            tree,
            content,
        }
    }

    /// Reject documents written by a different format version.
    pub fn check_version(&self) -> Result<(), SnapshotError> {
        if self.version == LAYOUT_DOCUMENT_VERSION {
            Ok(())
        } else {
            Err(SnapshotError::UnsupportedVersion(self.version))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::DropZone;

    fn sample_tree() -> PanelTree {
        let mut tree = PanelTree::singleton();
        let a = tree.root();
        let (_, b) = tree
            .split_leaf(a, Direction::Row, 0.3, Leaf::default())
            .unwrap();
        let (_, _c) = tree
            .split_leaf(b, Direction::Column, 0.6, Leaf::default())
            .unwrap();
        let leaf = tree.leaf_mut(a).unwrap();
        leaf.pinned = true;
        leaf.collapsed = true;
        leaf.main_content = true;
        leaf.surface = Some(SurfaceRef::new(11));
        tree
    }

    #[test]
    fn shape_round_trips_through_tree_data() {
        let tree = sample_tree();
        let data = TreeData::from_tree(&tree);
        let rebuilt = data.build_tree(&tree.surface_map()).unwrap();
        rebuilt.validate().expect("rebuilt tree must be valid");
        assert_eq!(TreeData::from_tree(&rebuilt), data);
        // Surfaces known to the map come back attached.
        let root_first = rebuilt
            .node(rebuilt.root())
            .unwrap()
            .as_split()
            .unwrap()
            .first;
        assert_eq!(
            rebuilt.leaf(root_first).unwrap().surface,
            Some(SurfaceRef::new(11))
        );
    }

    #[test]
    fn unknown_surface_ids_rebuild_surfaceless() {
        let tree = sample_tree();
        let data = TreeData::from_tree(&tree);
        let rebuilt = data.build_tree(&BTreeMap::new()).unwrap();
        for node in rebuilt.leaves() {
            assert_eq!(node.as_leaf().unwrap().surface, None);
        }
    }

    #[test]
    fn rebuild_allocator_resumes_above_highest_id() {
        let tree = sample_tree();
        let data = TreeData::from_tree(&tree);
        let mut rebuilt = data.build_tree(&BTreeMap::new()).unwrap();
        let before = rebuilt.leaf_count();
        let target = rebuilt.leaves().next().unwrap().id;
        // A fresh split after rebuild must not collide with restored ids.
        rebuilt
            .split_leaf(target, Direction::Row, 0.5, Leaf::default())
            .unwrap();
        rebuilt.validate().expect("ids must stay unique");
        assert_eq!(rebuilt.leaf_count(), before + 1);
    }

    #[test]
    fn stray_collapse_without_pin_is_dropped() {
        let mut data = TreeData::from_tree(&PanelTree::singleton());
        data.collapsed = true;
        let rebuilt = data.build_tree(&BTreeMap::new()).unwrap();
        assert!(!rebuilt.leaf(rebuilt.root()).unwrap().collapsed);
    }

    #[test]
    fn split_with_one_child_is_rejected() {
        let tree = sample_tree();
        let mut data = TreeData::from_tree(&tree);
        data.children.pop();
        let err = data.build_tree(&BTreeMap::new()).unwrap_err();
        assert!(matches!(err, SnapshotError::BadChildCount(_, 1)));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let tree = sample_tree();
        let mut data = TreeData::from_tree(&tree);
        data.children[0].id = data.children[1].id;
        let err = data.build_tree(&BTreeMap::new()).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::Tree(TreeError::DuplicateId(_))
        ));
    }

    #[test]
    fn degenerate_ratio_falls_back_to_default() {
        let tree = sample_tree();
        let mut data = TreeData::from_tree(&tree);
        data.split = f32::NAN;
        let rebuilt = data.build_tree(&BTreeMap::new()).unwrap();
        let root = rebuilt.node(rebuilt.root()).unwrap().as_split().unwrap();
        assert_eq!(root.ratio, 0.5);
    }

    #[test]
    fn document_json_round_trip() {
        let mut tree = sample_tree();
        let a = tree.leaves().next().unwrap().id;
        let c = tree.leaves().last().unwrap().id;
        tree.move_leaf(c, a, DropZone::Bottom).unwrap();
        let mut content = BTreeMap::new();
        content.insert(a, "editor".to_owned());
        let doc = LayoutDocument::new(TreeData::from_tree(&tree), content);
        let json = serde_json::to_string(&doc).unwrap();
        let parsed: LayoutDocument = serde_json::from_str(&json).unwrap();
        parsed.check_version().unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn version_mismatch_is_refused() {
        let doc = LayoutDocument {
            version: 1,
            tree: TreeData::from_tree(&PanelTree::singleton()),
            content: BTreeMap::new(),
        };
        assert!(matches!(
            doc.check_version(),
            Err(SnapshotError::UnsupportedVersion(1))
        ));
    }

    #[test]
    fn leaf_serialization_omits_default_flags() {
        let data = TreeData::from_tree(&PanelTree::singleton());
        let json = serde_json::to_value(&data).unwrap();
        let object = json.as_object().unwrap();
        assert!(!object.contains_key("pinned"));
        assert!(!object.contains_key("children"));
        assert!(!object.contains_key("direction"));
        assert_eq!(object["leaf"], serde_json::Value::Bool(true));
    }
}
