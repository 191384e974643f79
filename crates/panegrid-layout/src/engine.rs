//! Panel engine: ties the tree, solver, and history together behind a
//! pointer-driven interaction state machine.
//!
//! The engine owns the committed tree. During a relocate drag it works on a
//! cloned preview tree instead; the committed tree is only touched when the
//! drop lands. Hosts feed pointer events in and receive surface lifecycle
//! and placement callbacks back through [`RenderHost`].

use std::cmp::Ordering;
use std::collections::BTreeMap;

use panegrid_core::geometry::{Point, Rect};

use crate::history::{History, HistorySnapshot, HistoryStatus};
use crate::layout::{Layout, LayoutConfig, Pass, solve};
use crate::snapshot::{LayoutDocument, SnapshotError, TreeData};
use crate::tree::{Direction, DropZone, Leaf, Node, NodeId, PanelTree, SurfaceRef};

/// Host-side rendering adapter.
///
/// The engine never draws anything itself; it tells the host which surfaces
/// exist and where they go. Surface handles are minted by the host and
/// opaque to the engine.
pub trait RenderHost {
    /// Mint a surface for a freshly created leaf.
    fn create_surface(&mut self, leaf: NodeId) -> SurfaceRef;

    /// Release a surface whose leaf is gone.
    fn destroy_surface(&mut self, surface: SurfaceRef);

    /// Position a surface. `fixed` is set for collapsed and toolbar panels,
    /// which render a slim header strip instead of their content.
    fn place_surface(&mut self, surface: SurfaceRef, rect: Rect, fixed: bool);

    /// A committed solve pass finished; resizer geometry may have moved.
    fn layout_changed(&mut self, _layout: &Layout) {}

    /// Undo/redo availability changed.
    fn history_changed(&mut self, _status: HistoryStatus) {}
}

/// What the pointer went down on, as hit-tested by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerTarget {
    /// The gap between a split's children.
    Resizer(NodeId),
    /// A panel's header strip.
    Header(NodeId),
}

enum DragState {
    Idle,
    Resizing {
        split: NodeId,
        start: Point,
        start_ratio: f32,
        start_rect: Rect,
    },
    /// Pressed on a header, not yet past the drag threshold.
    Pending { leaf: NodeId, start: Point },
    Dragging {
        leaf: NodeId,
        preview: PanelTree,
        target: Option<(NodeId, DropZone)>,
        /// Set when the target changed since the last frame; the preview
        /// rebuild is deferred to [`PanelEngine::frame`].
        preview_dirty: bool,
    },
}

/// The panel layout engine.
pub struct PanelEngine<H: RenderHost> {
    config: LayoutConfig,
    tree: PanelTree,
    layout: Layout,
    history: History,
    content: BTreeMap<NodeId, String>,
    container: Rect,
    drag: DragState,
    host: H,
}

impl<H: RenderHost> PanelEngine<H> {
    /// Start with a single main-content panel filling the container.
    pub fn new(mut host: H, config: LayoutConfig, container: Rect) -> Self {
        let mut tree = PanelTree::singleton();
        let root = tree.root();
        let surface = host.create_surface(root);
        if let Some(leaf) = tree.leaf_mut(root) {
            leaf.surface = Some(surface);
            leaf.main_content = true;
        }
        let mut engine = Self {
            history: History::new(config.history_limit),
            config,
            tree,
            layout: Layout::default(),
            content: BTreeMap::new(),
            container,
            drag: DragState::Idle,
            host,
        };
        engine.relayout();
        engine.record("Initial Layout");
        engine
    }

    /// The committed tree.
    #[must_use]
    pub fn tree(&self) -> &PanelTree {
        &self.tree
    }

    /// The last committed layout.
    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Current container bounds.
    #[must_use]
    pub const fn container(&self) -> Rect {
        self.container
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Per-leaf content tags.
    #[must_use]
    pub const fn content(&self) -> &BTreeMap<NodeId, String> {
        &self.content
    }

    /// Undo/redo availability.
    #[must_use]
    pub fn history_status(&self) -> HistoryStatus {
        self.history.status()
    }

    /// Whether a relocate drag is in flight.
    #[must_use]
    pub fn is_dragging(&self) -> bool {
        matches!(self.drag, DragState::Dragging { .. })
    }

    /// Drop target the pointer is currently over, for indicator drawing.
    #[must_use]
    pub fn drop_target(&self) -> Option<(NodeId, DropZone)> {
        match &self.drag {
            DragState::Dragging { target, .. } => *target,
            _ => None,
        }
    }

    /// Panel currently being drag-relocated, so the host can dim it.
    #[must_use]
    pub fn dragged_panel(&self) -> Option<NodeId> {
        match &self.drag {
            DragState::Dragging { leaf, .. } => Some(*leaf),
            _ => None,
        }
    }

    /// Borrow the host adapter.
    #[must_use]
    pub const fn host(&self) -> &H {
        &self.host
    }

    /// Mutably borrow the host adapter.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Handle a pointer press. Returns whether the press was captured;
    /// uncaptured presses should fall through to the host's own handling.
    pub fn pointer_down(&mut self, target: PointerTarget, position: Point) -> bool {
        if !matches!(self.drag, DragState::Idle) {
            return false;
        }
        match target {
            PointerTarget::Resizer(split) => {
                let enabled = self
                    .layout
                    .resizers()
                    .iter()
                    .any(|handle| handle.split == split && handle.enabled);
                if !enabled {
                    tracing::debug!(?split, "resize refused on disabled handle");
                    return false;
                }
                let Some(node) = self.tree.node(split) else {
                    return false;
                };
                let Some(payload) = node.as_split() else {
                    return false;
                };
                self.drag = DragState::Resizing {
                    split,
                    start: position,
                    start_ratio: payload.ratio,
                    start_rect: node.rect,
                };
                true
            }
            PointerTarget::Header(leaf) => {
                if !self.tree.is_leaf(leaf) {
                    return false;
                }
                self.drag = DragState::Pending {
                    leaf,
                    start: position,
                };
                true
            }
        }
    }

    /// Handle pointer movement.
    pub fn pointer_move(&mut self, position: Point) {
        match &self.drag {
            DragState::Idle => {}
            DragState::Resizing { .. } => self.resize_to(position),
            DragState::Pending { leaf, start } => {
                let (leaf, start) = (*leaf, *start);
                if start.distance(position) > self.config.drag_start_threshold {
                    tracing::debug!(?leaf, "relocate drag started");
                    let target = self.drop_target_at(leaf, position);
                    self.drag = DragState::Dragging {
                        leaf,
                        preview: self.tree.clone(),
                        target,
                        preview_dirty: true,
                    };
                }
            }
            DragState::Dragging { leaf, target, .. } => {
                let (leaf, old_target) = (*leaf, *target);
                let new_target = self.drop_target_at(leaf, position);
                if new_target != old_target
                    && let DragState::Dragging {
                        target,
                        preview_dirty,
                        ..
                    } = &mut self.drag
                {
                    *target = new_target;
                    *preview_dirty = true;
                }
            }
        }
    }

    /// Handle pointer release: commit a resize or relocate, or dissolve a
    /// click that never became a drag.
    pub fn pointer_up(&mut self, _position: Point) {
        match std::mem::replace(&mut self.drag, DragState::Idle) {
            DragState::Idle | DragState::Pending { .. } => {}
            DragState::Resizing { .. } => {
                self.record("Resize");
            }
            DragState::Dragging { leaf, target, .. } => {
                let Some((target, zone)) = target else {
                    tracing::debug!(?leaf, "relocate abandoned outside any target");
                    return;
                };
                match self.tree.move_leaf(leaf, target, zone) {
                    Ok(()) => {
                        self.relayout();
                        self.record("Move Panel");
                    }
                    Err(err) => tracing::debug!(%err, "relocate refused"),
                }
            }
        }
    }

    /// Per-frame flush: rebuild the drag preview if it went stale, then push
    /// surface placements to the host.
    pub fn frame(&mut self) {
        if let DragState::Dragging {
            leaf,
            preview,
            target,
            preview_dirty,
        } = &mut self.drag
        {
            if *preview_dirty {
                let mut fresh = self.tree.clone();
                if let Some((target, zone)) = *target
                    && let Err(err) = fresh.move_leaf(*leaf, target, zone)
                {
                    tracing::debug!(%err, "preview move refused");
                }
                let _ = solve(&mut fresh, &self.config, self.container, Pass::Preview);
                *preview = fresh;
                *preview_dirty = false;
            }
            for node in preview.leaves() {
                if let Some(leaf) = node.as_leaf()
                    && let Some(surface) = leaf.surface
                {
                    self.host
                        .place_surface(surface, node.rect, leaf.collapsed || leaf.toolbar);
                }
            }
        } else {
            for node in self.tree.leaves() {
                if let Some(leaf) = node.as_leaf()
                    && let Some(surface) = leaf.surface
                {
                    self.host
                        .place_surface(surface, node.rect, leaf.collapsed || leaf.toolbar);
                }
            }
        }
    }

    /// Split a panel in two along `direction`, keeping the original in the
    /// leading slot. Refused when the panel is too small to hold two
    /// children at their minimum size.
    pub fn split_panel(&mut self, target: NodeId, direction: Direction) -> bool {
        if self.split_with_surface(target, direction) {
            self.record("Split Panel");
            true
        } else {
            false
        }
    }

    /// Split the largest panel, preferring its longer axis. Falls back to
    /// the other axis when the preferred one is too tight.
    pub fn add_panel(&mut self) -> bool {
        let target = self
            .tree
            .leaves()
            .filter(|node| {
                node.as_leaf()
                    .is_some_and(|leaf| !leaf.pinned && !leaf.toolbar && !leaf.collapsed)
            })
            .max_by(|a, b| {
                a.rect
                    .area()
                    .partial_cmp(&b.rect.area())
                    .unwrap_or(Ordering::Equal)
            })
            .map(|node| (node.id, node.rect));
        let Some((id, rect)) = target else {
            tracing::debug!("add refused, no expandable panel");
            return false;
        };
        let preferred = if rect.width >= rect.height {
            Direction::Row
        } else {
            Direction::Column
        };
        let fallback = match preferred {
            Direction::Row => Direction::Column,
            Direction::Column => Direction::Row,
        };
        for direction in [preferred, fallback] {
            if self.split_with_surface(id, direction) {
                self.record("Add Panel");
                return true;
            }
        }
        false
    }

    /// Close a panel, releasing its surface. The last panel cannot close.
    pub fn close_panel(&mut self, target: NodeId) -> bool {
        match self.tree.close_leaf(target) {
            Ok(leaf) => {
                if let Some(surface) = leaf.surface {
                    self.host.destroy_surface(surface);
                }
                let _ = self.content.remove(&target);
                self.relayout();
                self.record("Close Panel");
                true
            }
            Err(err) => {
                tracing::debug!(%err, "close refused");
                false
            }
        }
    }

    /// Toggle a panel's pin. Unpinning also expands the panel, since only
    /// pinned panels may stay collapsed.
    pub fn toggle_pin(&mut self, target: NodeId) -> bool {
        let Some(leaf) = self.tree.leaf_mut(target) else {
            return false;
        };
        leaf.pinned = !leaf.pinned;
        let label = if leaf.pinned {
            "Pin Panel"
        } else {
            leaf.collapsed = false;
            "Unpin Panel"
        };
        self.relayout();
        self.record(label);
        true
    }

    /// Toggle collapse on a pinned panel. Refused on unpinned panels.
    pub fn toggle_collapse(&mut self, target: NodeId) -> bool {
        let Some(leaf) = self.tree.leaf_mut(target) else {
            return false;
        };
        if !leaf.pinned {
            tracing::debug!(?target, "collapse refused on unpinned panel");
            return false;
        }
        leaf.collapsed = !leaf.collapsed;
        let label = if leaf.collapsed {
            "Collapse Panel"
        } else {
            "Expand Panel"
        };
        self.relayout();
        self.record(label);
        true
    }

    /// Toggle a panel's toolbar mode.
    pub fn toggle_toolbar(&mut self, target: NodeId) -> bool {
        let Some(leaf) = self.tree.leaf_mut(target) else {
            return false;
        };
        leaf.toolbar = !leaf.toolbar;
        self.relayout();
        self.record("Toggle Toolbar");
        true
    }

    /// Tag a panel with a content identifier the host can resolve.
    pub fn set_content(&mut self, target: NodeId, tag: impl Into<String>) -> bool {
        if !self.tree.is_leaf(target) {
            return false;
        }
        let _ = self.content.insert(target, tag.into());
        self.record("Edit Content");
        true
    }

    /// Step back one history entry.
    pub fn undo(&mut self) -> bool {
        if !matches!(self.drag, DragState::Idle) {
            return false;
        }
        let Some(snapshot) = self.history.undo().cloned() else {
            return false;
        };
        let restored = self.restore(snapshot);
        self.host.history_changed(self.history.status());
        restored
    }

    /// Step forward one history entry.
    pub fn redo(&mut self) -> bool {
        if !matches!(self.drag, DragState::Idle) {
            return false;
        }
        let Some(snapshot) = self.history.redo().cloned() else {
            return false;
        };
        let restored = self.restore(snapshot);
        self.host.history_changed(self.history.status());
        restored
    }

    /// Capture the current layout as a serializable document.
    #[must_use]
    pub fn serialize(&self) -> LayoutDocument {
        LayoutDocument::new(TreeData::from_tree(&self.tree), self.content.clone())
    }

    /// Replace the layout with a previously serialized document. Surfaces
    /// are matched up by leaf id; history starts over from the loaded state.
    pub fn load(&mut self, document: &LayoutDocument) -> Result<(), SnapshotError> {
        document.check_version()?;
        let new_tree = document.tree.build_tree(&self.tree.surface_map())?;
        self.drag = DragState::Idle;
        self.content = document.content.clone();
        self.adopt_tree(new_tree);
        self.history.clear();
        self.record("Load Layout");
        Ok(())
    }

    /// React to the container changing size. Not a history event.
    pub fn resize_container(&mut self, container: Rect) {
        self.container = container;
        self.relayout();
        if let DragState::Dragging { preview_dirty, .. } = &mut self.drag {
            *preview_dirty = true;
        }
    }

    fn relayout(&mut self) {
        self.layout = solve(&mut self.tree, &self.config, self.container, Pass::Committed);
        self.host.layout_changed(&self.layout);
    }

    fn record(&mut self, label: &str) {
        self.history.record(HistorySnapshot {
            label: label.to_owned(),
            tree: TreeData::from_tree(&self.tree),
            content: self.content.clone(),
        });
        tracing::debug!(label, entries = self.history.len(), "recorded history entry");
        self.host.history_changed(self.history.status());
    }

    fn split_with_surface(&mut self, target: NodeId, direction: Direction) -> bool {
        let Some(rect) = self
            .tree
            .node(target)
            .filter(|node| node.is_leaf())
            .map(|node| node.rect)
        else {
            return false;
        };
        let (extent, min) = match direction {
            Direction::Row => (rect.width, self.config.panel_min_width),
            Direction::Column => (rect.height, self.config.panel_min_height),
        };
        if extent < min * 2.0 + self.config.resizer_thickness {
            tracing::debug!(?target, ?direction, extent, "split refused, panel too small");
            return false;
        }
        let Ok((_, new_leaf)) =
            self.tree
                .split_leaf(target, direction, self.config.default_ratio, Leaf::default())
        else {
            return false;
        };
        let surface = self.host.create_surface(new_leaf);
        if let Some(leaf) = self.tree.leaf_mut(new_leaf) {
            leaf.surface = Some(surface);
        }
        self.relayout();
        true
    }

    fn resize_to(&mut self, position: Point) {
        let DragState::Resizing {
            split,
            start,
            start_ratio,
            start_rect,
        } = &self.drag
        else {
            return;
        };
        let (split, start, start_ratio, start_rect) = (*split, *start, *start_ratio, *start_rect);
        let Some(payload) = self.tree.node(split).and_then(Node::as_split) else {
            return;
        };
        let (direction, first, second) = (payload.direction, payload.first, payload.second);
        let (delta, extent) = match direction {
            Direction::Row => (position.x - start.x, start_rect.width),
            Direction::Column => (position.y - start.y, start_rect.height),
        };
        let avail = (extent - self.config.resizer_thickness).max(0.0);
        if avail <= 0.0 {
            return;
        }
        // The projected extents are intentionally unclamped: collapse has to
        // trigger even when the clamped ratio could never get there.
        let projected_first = avail * start_ratio + delta;
        self.apply_collapse_hysteresis(first, projected_first);
        self.apply_collapse_hysteresis(second, avail - projected_first);
        let _ = self.tree.set_ratio(split, projected_first / avail);
        self.relayout();
    }

    fn apply_collapse_hysteresis(&mut self, id: NodeId, projected: f32) {
        let collapse_below = self.config.collapsed_size - self.config.drag_collapse_threshold;
        let expand_above = self.config.collapsed_size + self.config.drag_collapse_threshold;
        let Some(leaf) = self.tree.leaf_mut(id) else {
            return;
        };
        if !leaf.pinned || leaf.toolbar {
            return;
        }
        if !leaf.collapsed && projected < collapse_below {
            leaf.collapsed = true;
            tracing::debug!(?id, "drag collapsed panel");
        } else if leaf.collapsed && projected > expand_above {
            leaf.collapsed = false;
            tracing::debug!(?id, "drag expanded panel");
        }
    }

    /// Nearest-edge drop zone under `position`, over the committed rects.
    /// The dragged panel and pinned panels are not targets.
    fn drop_target_at(&self, dragged: NodeId, position: Point) -> Option<(NodeId, DropZone)> {
        for node in self.tree.leaves() {
            if node.id == dragged {
                continue;
            }
            let Some(leaf) = node.as_leaf() else {
                continue;
            };
            if leaf.pinned {
                continue;
            }
            let Some(rect) = self.layout.rect(node.id) else {
                continue;
            };
            if rect.is_empty() || !rect.contains(position) {
                continue;
            }
            let edges = [
                (position.x - rect.left(), DropZone::Left),
                (rect.right() - position.x, DropZone::Right),
                (position.y - rect.top(), DropZone::Top),
                (rect.bottom() - position.y, DropZone::Bottom),
            ];
            let zone = edges
                .into_iter()
                .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal))
                .map(|(_, zone)| zone)?;
            return Some((node.id, zone));
        }
        None
    }

    /// Swap in a rebuilt tree, reconciling surfaces: leaves that vanished
    /// release theirs, leaves that appeared get fresh ones.
    fn adopt_tree(&mut self, mut new_tree: PanelTree) {
        for (id, surface) in self.tree.surface_map() {
            if !new_tree.is_leaf(id) {
                self.host.destroy_surface(surface);
            }
        }
        let missing: Vec<NodeId> = new_tree
            .leaves()
            .filter(|node| node.as_leaf().is_some_and(|leaf| leaf.surface.is_none()))
            .map(|node| node.id)
            .collect();
        for id in missing {
            let surface = self.host.create_surface(id);
            if let Some(leaf) = new_tree.leaf_mut(id) {
                leaf.surface = Some(surface);
            }
        }
        self.tree = new_tree;
        self.relayout();
    }

    fn restore(&mut self, snapshot: HistorySnapshot) -> bool {
        match snapshot.tree.build_tree(&self.tree.surface_map()) {
            Ok(new_tree) => {
                self.content = snapshot.content;
                self.adopt_tree(new_tree);
                true
            }
            Err(err) => {
                tracing::warn!(%err, "history snapshot failed to rebuild");
                false
            }
        }
    }
}
