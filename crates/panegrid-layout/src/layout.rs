//! Geometry solver.
//!
//! One solve pass walks the tree top-down, assigning a rectangle to every
//! node and emitting resizer handles for the split gaps. Minimum sizes are
//! respected where space allows; when a subtree cannot fit, both children
//! shrink in proportion to their minima instead of overflowing the
//! container.

use std::collections::BTreeMap;

use panegrid_core::geometry::Rect;
use rustc_hash::FxHashMap;

use crate::tree::{Direction, Node, NodeId, NodeKind, PanelTree};

/// Tunable layout constants.
///
/// The defaults are the values the interaction rules were designed around;
/// hosts embedding the engine at a different density can override them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutConfig {
    /// Thickness of the gap (and grab target) between split children.
    pub resizer_thickness: f32,
    /// Minimum width of an expanded panel.
    pub panel_min_width: f32,
    /// Minimum height of an expanded panel.
    pub panel_min_height: f32,
    /// Fixed extent of a collapsed or toolbar panel along the split axis.
    pub collapsed_size: f32,
    /// How far past the collapsed size a resize drag must go to flip the
    /// collapsed state.
    pub drag_collapse_threshold: f32,
    /// Pointer travel before a press on a header becomes a drag.
    pub drag_start_threshold: f32,
    /// Ratio given to fresh splits.
    pub default_ratio: f32,
    /// Maximum number of undo history entries.
    pub history_limit: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            resizer_thickness: 5.0,
            panel_min_width: 150.0,
            panel_min_height: 40.0,
            collapsed_size: 30.0,
            drag_collapse_threshold: 20.0,
            drag_start_threshold: 5.0,
            default_ratio: 0.5,
            history_limit: 50,
        }
    }
}

/// Which kind of solve is running.
///
/// Preview passes run against a cloned tree during drags; they produce
/// panel rectangles only, no resizer handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Committed,
    Preview,
}

/// A grabbable gap between the two children of a split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizerHandle {
    pub split: NodeId,
    pub direction: Direction,
    pub rect: Rect,
    /// Disabled handles are still laid out but refuse resize drags.
    pub enabled: bool,
}

/// Output of one solve pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layout {
    pub container: Rect,
    rects: BTreeMap<NodeId, Rect>,
    resizers: Vec<ResizerHandle>,
}

impl Layout {
    /// Rectangle assigned to `id` in this pass.
    #[must_use]
    pub fn rect(&self, id: NodeId) -> Option<Rect> {
        self.rects.get(&id).copied()
    }

    /// All node rectangles in id order.
    pub fn rects(&self) -> impl Iterator<Item = (NodeId, Rect)> + '_ {
        self.rects.iter().map(|(id, rect)| (*id, *rect))
    }

    /// Resizer handles emitted by this pass.
    #[must_use]
    pub fn resizers(&self) -> &[ResizerHandle] {
        &self.resizers
    }
}

struct Solver<'a, 'c> {
    tree: &'a mut PanelTree,
    config: &'c LayoutConfig,
    pass: Pass,
    minima: FxHashMap<(NodeId, Direction), f32>,
    out: Layout,
}

/// Solve the tree into `container`, writing each node's rectangle back onto
/// the node and returning the full layout.
///
/// Committed passes also fold the realized first-child share back into each
/// split's stored ratio, so a subsequent container resize keeps the
/// proportions the user actually sees.
pub fn solve(
    tree: &mut PanelTree,
    config: &LayoutConfig,
    container: Rect,
    pass: Pass,
) -> Layout {
    tracing::trace!(
        width = container.width,
        height = container.height,
        ?pass,
        "layout solve"
    );
    let root = tree.root();
    let mut solver = Solver {
        tree,
        config,
        pass,
        minima: FxHashMap::default(),
        out: Layout {
            container,
            rects: BTreeMap::new(),
            resizers: Vec::new(),
        },
    };
    solver.solve_node(root, container);
    solver.out
}

impl Solver<'_, '_> {
    fn solve_node(&mut self, id: NodeId, rect: Rect) {
        let _ = self.out.rects.insert(id, rect);
        if let Some(node) = self.tree.node_mut(id) {
            node.rect = rect;
        }

        let Some(split) = self.tree.node(id).and_then(Node::as_split) else {
            return;
        };
        let (direction, ratio, first, second) =
            (split.direction, split.ratio, split.first, split.second);

        let extent = match direction {
            Direction::Row => rect.width,
            Direction::Column => rect.height,
        };
        let avail = (extent - self.config.resizer_thickness).max(0.0);
        // The realized gap shrinks with the container: in a rect thinner
        // than the resizer itself it absorbs whatever is left, keeping both
        // children inside the parent.
        let gap = (extent - avail).max(0.0);

        let first_extent = if self.fixed_leaf(first) {
            self.config.collapsed_size.min(avail)
        } else if self.fixed_leaf(second) {
            (avail - self.config.collapsed_size).max(0.0)
        } else {
            let min_first = self.min_extent(first, direction);
            let min_second = self.min_extent(second, direction);
            if min_first + min_second > avail {
                // Not enough room for both minima: shrink proportionally.
                let total = min_first + min_second;
                if total > 0.0 {
                    avail * (min_first / total)
                } else {
                    avail * 0.5
                }
            } else {
                (avail * ratio).min(avail - min_second).max(min_first)
            }
        };
        let second_extent = (avail - first_extent).max(0.0);
        // Fold the realized share back into the stored ratio so snapshots
        // and resize drags start from what is actually on screen.
        if avail > 0.0 {
            self.tree.set_realized_ratio(id, first_extent / avail);
        }

        let (first_rect, resizer_rect, second_rect) = match direction {
            Direction::Row => (
                Rect::new(rect.x, rect.y, first_extent, rect.height),
                Rect::new(rect.x + first_extent, rect.y, gap, rect.height),
                Rect::new(
                    rect.x + first_extent + gap,
                    rect.y,
                    second_extent,
                    rect.height,
                ),
            ),
            Direction::Column => (
                Rect::new(rect.x, rect.y, rect.width, first_extent),
                Rect::new(rect.x, rect.y + first_extent, rect.width, gap),
                Rect::new(
                    rect.x,
                    rect.y + first_extent + gap,
                    rect.width,
                    second_extent,
                ),
            ),
        };

        if self.pass == Pass::Committed {
            let enabled = !(self.fully_pinned(first) && self.fully_pinned(second))
                && !self.fixed_leaf(first)
                && !self.fixed_leaf(second);
            self.out.resizers.push(ResizerHandle {
                split: id,
                direction,
                rect: resizer_rect,
                enabled,
            });
        }

        self.solve_node(first, first_rect);
        self.solve_node(second, second_rect);
    }

    /// Leaf whose extent along the split axis is pinned to the collapsed
    /// size regardless of the stored ratio.
    fn fixed_leaf(&self, id: NodeId) -> bool {
        self.tree
            .leaf(id)
            .is_some_and(|leaf| leaf.collapsed || leaf.toolbar)
    }

    fn fully_pinned(&self, id: NodeId) -> bool {
        match self.tree.node(id).map(|node| &node.kind) {
            Some(NodeKind::Leaf(leaf)) => leaf.pinned,
            Some(NodeKind::Split(split)) => {
                self.fully_pinned(split.first) && self.fully_pinned(split.second)
            }
            None => false,
        }
    }

    /// Minimum extent of a subtree along `axis`, memoized per pass.
    fn min_extent(&mut self, id: NodeId, axis: Direction) -> f32 {
        if let Some(&cached) = self.minima.get(&(id, axis)) {
            return cached;
        }
        let value = match self.tree.node(id).map(|node| node.kind.clone()) {
            Some(NodeKind::Leaf(leaf)) => {
                if leaf.collapsed || leaf.toolbar {
                    self.config.collapsed_size
                } else {
                    match axis {
                        Direction::Row => self.config.panel_min_width,
                        Direction::Column => self.config.panel_min_height,
                    }
                }
            }
            Some(NodeKind::Split(split)) => {
                let first = self.min_extent(split.first, axis);
                let second = self.min_extent(split.second, axis);
                if split.direction == axis {
                    first + second + self.config.resizer_thickness
                } else {
                    first.max(second)
                }
            }
            None => 0.0,
        };
        let _ = self.minima.insert((id, axis), value);
        value
    }
}
