//! BSP panel split-tree model.
//!
//! The tree is stored as an arena of nodes addressed by [`NodeId`]; parent
//! links are id references used for traversal only, never for ownership, so
//! the structure cannot form ownership cycles. A split node always has
//! exactly two ordered children; a leaf owns at most one reference to an
//! externally created surface.

use std::collections::{BTreeMap, BTreeSet};

use panegrid_core::geometry::Rect;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Interactive lower bound for split ratios.
pub const RATIO_MIN: f32 = 0.1;
/// Interactive upper bound for split ratios.
pub const RATIO_MAX: f32 = 0.9;

/// Stable identifier for tree nodes.
///
/// `0` is reserved/invalid so IDs are always non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Lowest valid node ID.
    pub const MIN: Self = Self(1);

    /// Create a new node ID, rejecting 0.
    pub fn new(raw: u64) -> Result<Self, TreeError> {
        if raw == 0 {
            return Err(TreeError::ZeroId);
        }
        Ok(Self(raw))
    }

    /// Get the raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Opaque handle to an externally created visual surface.
///
/// The engine never interprets the value; it is minted by the host and handed
/// back for positioning and destruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurfaceRef(u64);

impl SurfaceRef {
    /// Wrap a host-chosen raw handle.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw handle.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Orientation of a split node.
///
/// `Row` places its children side by side (the split divides the width);
/// `Column` stacks them (the split divides the height).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Row,
    Column,
}

/// One of the four edge regions of a drop target, chosen by nearest edge
/// during drag-relocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropZone {
    Top,
    Bottom,
    Left,
    Right,
}

impl DropZone {
    /// Split direction produced by dropping on this zone.
    #[must_use]
    pub const fn direction(self) -> Direction {
        match self {
            Self::Left | Self::Right => Direction::Row,
            Self::Top | Self::Bottom => Direction::Column,
        }
    }

    /// Whether the dragged node becomes the first child.
    #[must_use]
    pub const fn source_first(self) -> bool {
        matches!(self, Self::Left | Self::Top)
    }
}

/// Leaf payload: surface reference plus interaction flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Leaf {
    pub surface: Option<SurfaceRef>,
    pub pinned: bool,
    pub collapsed: bool,
    pub toolbar: bool,
    pub main_content: bool,
}

/// Split payload: direction, first child's fractional share, ordered children.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub direction: Direction,
    pub ratio: f32,
    pub first: NodeId,
    pub second: NodeId,
}

/// Variant payload for one node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Leaf(Leaf),
    Split(Split),
}

/// One arena slot: identity, parent back-reference, last solved rectangle,
/// and the variant payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub rect: Rect,
    pub kind: NodeKind,
}

impl Node {
    fn leaf(id: NodeId, parent: Option<NodeId>, leaf: Leaf) -> Self {
        Self {
            id,
            parent,
            rect: Rect::default(),
            kind: NodeKind::Leaf(leaf),
        }
    }

    fn split(id: NodeId, parent: Option<NodeId>, split: Split) -> Self {
        Self {
            id,
            parent,
            rect: Rect::default(),
            kind: NodeKind::Split(split),
        }
    }

    /// Whether this node is a leaf.
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    /// Leaf payload, if this node is a leaf.
    #[must_use]
    pub const fn as_leaf(&self) -> Option<&Leaf> {
        match &self.kind {
            NodeKind::Leaf(leaf) => Some(leaf),
            NodeKind::Split(_) => None,
        }
    }

    /// Split payload, if this node is a split.
    #[must_use]
    pub const fn as_split(&self) -> Option<&Split> {
        match &self.kind {
            NodeKind::Split(split) => Some(split),
            NodeKind::Leaf(_) => None,
        }
    }
}

/// Structural errors surfaced by tree operations and validation.
///
/// User-level refusals (closing the last leaf, moving the root) get their own
/// variants so callers can downgrade them to silent no-ops; everything else
/// indicates a programming defect.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum TreeError {
    #[error("node id 0 is reserved")]
    ZeroId,
    #[error("node id space exhausted")]
    IdOverflow,
    #[error("node {0:?} not found")]
    MissingNode(NodeId),
    #[error("node {0:?} is not a leaf")]
    NotLeaf(NodeId),
    #[error("node {0:?} is not a split")]
    NotSplit(NodeId),
    #[error("cannot remove the last remaining leaf")]
    LastLeaf,
    #[error("cannot move the root node")]
    MoveRoot,
    #[error("duplicate node id {0:?}")]
    DuplicateId(NodeId),
    #[error("split {parent:?} does not reference child {child:?}")]
    ParentChildMismatch { parent: NodeId, child: NodeId },
    #[error("node {child:?} does not point back at parent {parent:?}")]
    BadParentLink { parent: NodeId, child: NodeId },
    #[error("cycle detected at node {0:?}")]
    Cycle(NodeId),
    #[error("unreachable node {0:?}")]
    Unreachable(NodeId),
    #[error("split ratio {0} is not a finite fraction")]
    InvalidRatio(f32),
    #[error("collapsed leaf {0:?} is not pinned")]
    CollapsedUnpinned(NodeId),
    #[error("next id {next} is not above the highest allocated id {highest}")]
    StaleNextId { next: u64, highest: u64 },
}

/// Clamp a user-supplied split ratio to the interactive band.
#[must_use]
pub fn clamp_ratio(ratio: f32) -> f32 {
    ratio.clamp(RATIO_MIN, RATIO_MAX)
}

/// Validated BSP tree for runtime usage.
///
/// Cloning a tree is the preview-clone operation: ids, flags, ratios, and
/// surface references are preserved in entirely fresh storage.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelTree {
    root: NodeId,
    next_id: u64,
    nodes: BTreeMap<NodeId, Node>,
}

impl PanelTree {
    /// Build a tree holding a single root leaf with default flags.
    #[must_use]
    pub fn singleton() -> Self {
        let root = NodeId::MIN;
        let mut nodes = BTreeMap::new();
        let _ = nodes.insert(root, Node::leaf(root, None, Leaf::default()));
        Self {
            root,
            next_id: root.get() + 1,
            nodes,
        }
    }

    /// Reassemble a tree from parts (snapshot rebuild) and validate it.
    pub(crate) fn from_parts(
        root: NodeId,
        next_id: u64,
        nodes: BTreeMap<NodeId, Node>,
    ) -> Result<Self, TreeError> {
        let tree = Self {
            root,
            next_id,
            nodes,
        };
        tree.validate()?;
        Ok(tree)
    }

    /// Root node ID.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Next id value the allocator will hand out.
    #[must_use]
    pub const fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Lookup a node by ID.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Mutable lookup.
    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Iterate all nodes in canonical id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Leaf payload accessor.
    #[must_use]
    pub fn leaf(&self, id: NodeId) -> Option<&Leaf> {
        self.nodes.get(&id).and_then(Node::as_leaf)
    }

    /// Mutable leaf payload accessor.
    pub fn leaf_mut(&mut self, id: NodeId) -> Option<&mut Leaf> {
        match self.nodes.get_mut(&id) {
            Some(Node {
                kind: NodeKind::Leaf(leaf),
                ..
            }) => Some(leaf),
            _ => None,
        }
    }

    /// Whether `id` names a leaf in this tree.
    #[must_use]
    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(Node::is_leaf)
    }

    /// The other child of `id`'s parent, or `None` at the root.
    #[must_use]
    pub fn sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get(&id)?.parent?;
        let split = self.nodes.get(&parent)?.as_split()?;
        if split.first == id {
            Some(split.second)
        } else {
            Some(split.first)
        }
    }

    /// Depth-first, left-to-right iterator over leaf nodes.
    ///
    /// Each call starts a fresh traversal; there is no hidden cursor state.
    #[must_use]
    pub fn leaves(&self) -> Leaves<'_> {
        Leaves {
            tree: self,
            stack: vec![self.root],
        }
    }

    /// Number of leaves currently in the tree.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.leaves().count()
    }

    /// Map from leaf id to its surface reference, for snapshot restore.
    #[must_use]
    pub fn surface_map(&self) -> BTreeMap<NodeId, SurfaceRef> {
        self.leaves()
            .filter_map(|node| {
                let leaf = node.as_leaf()?;
                Some((node.id, leaf.surface?))
            })
            .collect()
    }

    fn allocate_id(&mut self) -> Result<NodeId, TreeError> {
        let id = NodeId::new(self.next_id)?;
        self.next_id = self.next_id.checked_add(1).ok_or(TreeError::IdOverflow)?;
        Ok(id)
    }

    /// Set the split ratio on a split node, clamped to the interactive band.
    pub fn set_ratio(&mut self, split: NodeId, ratio: f32) -> Result<(), TreeError> {
        if !ratio.is_finite() {
            return Err(TreeError::InvalidRatio(ratio));
        }
        match self.nodes.get_mut(&split) {
            Some(Node {
                kind: NodeKind::Split(payload),
                ..
            }) => {
                payload.ratio = clamp_ratio(ratio);
                Ok(())
            }
            Some(_) => Err(TreeError::NotSplit(split)),
            None => Err(TreeError::MissingNode(split)),
        }
    }

    /// Store the realized share computed by the layout solver.
    ///
    /// Unlike [`set_ratio`](Self::set_ratio) this does not clamp: a collapsed
    /// child legitimately realizes a share outside the interactive band.
    pub(crate) fn set_realized_ratio(&mut self, split: NodeId, ratio: f32) {
        if let Some(Node {
            kind: NodeKind::Split(payload),
            ..
        }) = self.nodes.get_mut(&split)
            && ratio.is_finite()
            && ratio > 0.0
            && ratio < 1.0
        {
            payload.ratio = ratio;
        }
    }

    /// Wrap `target` (a leaf) and a new leaf in a fresh split node.
    ///
    /// The target keeps the first slot; the new leaf takes the second.
    /// Returns `(split_id, new_leaf_id)`.
    pub fn split_leaf(
        &mut self,
        target: NodeId,
        direction: Direction,
        ratio: f32,
        new_leaf: Leaf,
    ) -> Result<(NodeId, NodeId), TreeError> {
        let target_parent = match self.nodes.get(&target) {
            Some(Node {
                parent,
                kind: NodeKind::Leaf(_),
                ..
            }) => *parent,
            Some(_) => return Err(TreeError::NotLeaf(target)),
            None => return Err(TreeError::MissingNode(target)),
        };

        let split_id = self.allocate_id()?;
        let leaf_id = self.allocate_id()?;

        let split = Node::split(
            split_id,
            target_parent,
            Split {
                direction,
                ratio: clamp_ratio(ratio),
                first: target,
                second: leaf_id,
            },
        );

        if let Some(target_node) = self.nodes.get_mut(&target) {
            target_node.parent = Some(split_id);
        }
        let _ = self
            .nodes
            .insert(leaf_id, Node::leaf(leaf_id, Some(split_id), new_leaf));
        let _ = self.nodes.insert(split_id, split);

        if let Some(parent) = target_parent {
            self.replace_child(parent, target, split_id)?;
        } else {
            self.root = split_id;
        }

        Ok((split_id, leaf_id))
    }

    /// Remove a leaf and its parent split, promoting the sibling.
    ///
    /// Refused with [`TreeError::LastLeaf`] when the leaf is the only one
    /// left. Returns the removed leaf payload so the caller can release its
    /// surface.
    pub fn close_leaf(&mut self, target: NodeId) -> Result<Leaf, TreeError> {
        match self.nodes.get(&target) {
            Some(node) if node.is_leaf() => {}
            Some(_) => return Err(TreeError::NotLeaf(target)),
            None => return Err(TreeError::MissingNode(target)),
        }
        if target == self.root {
            return Err(TreeError::LastLeaf);
        }

        let old_parent = self.detach(target)?;
        let _ = self.nodes.remove(&old_parent);
        match self.nodes.remove(&target) {
            Some(Node {
                kind: NodeKind::Leaf(leaf),
                ..
            }) => Ok(leaf),
            _ => Err(TreeError::MissingNode(target)),
        }
    }

    /// Relocate leaf `source` next to leaf `target` according to `zone`.
    ///
    /// Detaches the source (promoting its sibling, reseating the root when
    /// the source's parent was the root), then reads the target's parent
    /// *after* the detach — at that point the promoted links are current,
    /// which keeps the surgery sound when the two leaves share an ancestor or
    /// are siblings of each other.
    pub fn move_leaf(
        &mut self,
        source: NodeId,
        target: NodeId,
        zone: DropZone,
    ) -> Result<(), TreeError> {
        if source == target {
            return Ok(());
        }
        for id in [source, target] {
            match self.nodes.get(&id) {
                Some(node) if node.is_leaf() => {}
                Some(_) => return Err(TreeError::NotLeaf(id)),
                None => return Err(TreeError::MissingNode(id)),
            }
        }
        if source == self.root {
            return Err(TreeError::MoveRoot);
        }

        // Allocate before detaching: an exhausted id space must not leave
        // the tree half-rewired.
        let split_id = self.allocate_id()?;

        let old_parent = self.detach(source)?;
        let _ = self.nodes.remove(&old_parent);

        let target_parent = self.nodes.get(&target).and_then(|node| node.parent);
        let (first, second) = if zone.source_first() {
            (source, target)
        } else {
            (target, source)
        };
        let split = Node::split(
            split_id,
            target_parent,
            Split {
                direction: zone.direction(),
                ratio: 0.5,
                first,
                second,
            },
        );

        if let Some(node) = self.nodes.get_mut(&source) {
            node.parent = Some(split_id);
        }
        if let Some(node) = self.nodes.get_mut(&target) {
            node.parent = Some(split_id);
        }
        let _ = self.nodes.insert(split_id, split);

        if let Some(parent) = target_parent {
            self.replace_child(parent, target, split_id)?;
        } else {
            self.root = split_id;
        }

        Ok(())
    }

    /// Unhook `id` from the tree by promoting its sibling into the parent's
    /// slot. Returns the now-dangling parent id; the caller decides whether
    /// to drop or reuse it. `id` itself stays in the arena with no parent.
    fn detach(&mut self, id: NodeId) -> Result<NodeId, TreeError> {
        let parent = self
            .nodes
            .get(&id)
            .ok_or(TreeError::MissingNode(id))?
            .parent
            .ok_or(TreeError::MoveRoot)?;
        let sibling = self.sibling(id).ok_or(TreeError::ParentChildMismatch {
            parent,
            child: id,
        })?;
        let grandparent = self
            .nodes
            .get(&parent)
            .ok_or(TreeError::MissingNode(parent))?
            .parent;

        if let Some(node) = self.nodes.get_mut(&sibling) {
            node.parent = grandparent;
        }
        if let Some(grandparent) = grandparent {
            self.replace_child(grandparent, parent, sibling)?;
        } else {
            self.root = sibling;
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = None;
        }
        Ok(parent)
    }

    fn replace_child(
        &mut self,
        parent: NodeId,
        old: NodeId,
        new: NodeId,
    ) -> Result<(), TreeError> {
        match self.nodes.get_mut(&parent) {
            Some(Node {
                kind: NodeKind::Split(split),
                ..
            }) => {
                if split.first == old {
                    split.first = new;
                } else if split.second == old {
                    split.second = new;
                } else {
                    return Err(TreeError::ParentChildMismatch { parent, child: old });
                }
                Ok(())
            }
            Some(_) => Err(TreeError::NotSplit(parent)),
            None => Err(TreeError::MissingNode(parent)),
        }
    }

    /// Validate internal invariants.
    ///
    /// A failure here is a programming defect, never user input.
    pub fn validate(&self) -> Result<(), TreeError> {
        let root = self.nodes.get(&self.root).ok_or(TreeError::MissingNode(self.root))?;
        if root.parent.is_some() {
            return Err(TreeError::BadParentLink {
                parent: self.root,
                child: self.root,
            });
        }

        let mut visited = BTreeSet::new();
        self.validate_node(self.root, &mut visited)?;

        for node in self.nodes.values() {
            if !visited.contains(&node.id) {
                return Err(TreeError::Unreachable(node.id));
            }
            if node.id.get() >= self.next_id {
                return Err(TreeError::StaleNextId {
                    next: self.next_id,
                    highest: node.id.get(),
                });
            }
        }
        Ok(())
    }

    fn validate_node(&self, id: NodeId, visited: &mut BTreeSet<NodeId>) -> Result<(), TreeError> {
        if !visited.insert(id) {
            return Err(TreeError::Cycle(id));
        }
        let node = self.nodes.get(&id).ok_or(TreeError::MissingNode(id))?;
        match &node.kind {
            NodeKind::Leaf(leaf) => {
                if leaf.collapsed && !leaf.pinned {
                    return Err(TreeError::CollapsedUnpinned(id));
                }
            }
            NodeKind::Split(split) => {
                if !split.ratio.is_finite() || split.ratio <= 0.0 || split.ratio >= 1.0 {
                    return Err(TreeError::InvalidRatio(split.ratio));
                }
                for child in [split.first, split.second] {
                    let child_node = self
                        .nodes
                        .get(&child)
                        .ok_or(TreeError::MissingNode(child))?;
                    if child_node.parent != Some(id) {
                        return Err(TreeError::BadParentLink {
                            parent: id,
                            child,
                        });
                    }
                    self.validate_node(child, visited)?;
                }
            }
        }
        Ok(())
    }
}

/// Depth-first, left-to-right leaf iterator. See [`PanelTree::leaves`].
pub struct Leaves<'a> {
    tree: &'a PanelTree,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Leaves<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            let node = self.tree.node(id)?;
            match &node.kind {
                NodeKind::Leaf(_) => return Some(node),
                NodeKind::Split(split) => {
                    self.stack.push(split.second);
                    self.stack.push(split.first);
                }
            }
        }
        None
    }
}
