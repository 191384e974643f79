#![forbid(unsafe_code)]

//! BSP panel layout engine.
//!
//! A workspace is a binary tree of panels: every split divides its rectangle
//! between exactly two children, in a row (side by side) or a column
//! (stacked). The crate covers the whole interactive loop around that tree:
//!
//! - [`tree`]: the arena-backed model and structural surgery (split, close,
//!   relocate).
//! - [`layout`]: the geometry solver that turns the tree into pixel
//!   rectangles, honoring minimum sizes and collapsed panels.
//! - [`engine`]: the pointer-driven state machine for resizing and
//!   drag-relocating panels, plus the discrete panel actions.
//! - [`history`]: bounded undo/redo over full-tree snapshots.
//! - [`snapshot`]: the serde document format for persistence.
//!
//! Rendering stays on the host's side of the [`engine::RenderHost`] trait;
//! the engine only decides where surfaces go.

pub mod engine;
pub mod history;
pub mod layout;
pub mod snapshot;
pub mod tree;

pub use panegrid_core::geometry::{Point, Rect};

pub use engine::{PanelEngine, PointerTarget, RenderHost};
pub use history::{History, HistorySnapshot, HistoryStatus};
pub use layout::{Layout, LayoutConfig, Pass, ResizerHandle, solve};
pub use snapshot::{LAYOUT_DOCUMENT_VERSION, LayoutDocument, SnapshotError, TreeData};
pub use tree::{
    Direction, DropZone, Leaf, Node, NodeId, NodeKind, PanelTree, Split, SurfaceRef, TreeError,
};
