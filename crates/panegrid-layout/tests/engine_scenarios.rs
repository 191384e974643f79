//! Property/fuzz-style invariants for the panel tree and solver, plus
//! end-to-end engine scenarios.
//!
//! The fuzz half drives random operation streams against the public
//! `PanelTree` API and asserts structural validity, deterministic solving,
//! and containment of every solved rectangle after each mutation.

use std::collections::BTreeMap;

use panegrid_layout::{
    Direction, DropZone, Layout, LayoutConfig, Leaf, NodeId, PanelEngine, PanelTree, Pass, Point,
    PointerTarget, Rect, RenderHost, SurfaceRef, TreeData, solve,
};
use proptest::prelude::*;

const EPS: f32 = 0.1;

#[derive(Debug, Clone)]
struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Self {
        Self {
            state: seed ^ 0x9E37_79B9_7F4A_7C15,
        }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        self.state
    }

    fn choose_index(&mut self, len: usize) -> usize {
        debug_assert!(len > 0);
        (self.next_u64() % len as u64) as usize
    }

    fn choose_bool(&mut self) -> bool {
        (self.next_u64() & 1) == 0
    }

    fn ratio(&mut self) -> f32 {
        0.1 + 0.8 * ((self.next_u64() % 1000) as f32 / 1000.0)
    }
}

fn leaf_ids(tree: &PanelTree) -> Vec<NodeId> {
    tree.leaves().map(|node| node.id).collect()
}

fn split_ids(tree: &PanelTree) -> Vec<NodeId> {
    tree.nodes()
        .filter(|node| !node.is_leaf())
        .map(|node| node.id)
        .collect()
}

fn random_direction(rng: &mut Lcg) -> Direction {
    if rng.choose_bool() {
        Direction::Row
    } else {
        Direction::Column
    }
}

fn random_zone(rng: &mut Lcg) -> DropZone {
    match rng.next_u64() % 4 {
        0 => DropZone::Top,
        1 => DropZone::Bottom,
        2 => DropZone::Left,
        _ => DropZone::Right,
    }
}

fn apply_random_operation(tree: &mut PanelTree, rng: &mut Lcg) {
    let leaves = leaf_ids(tree);
    let splits = split_ids(tree);

    let mut candidates = vec![0usize]; // SplitLeaf (always available)
    if leaves.len() > 1 {
        candidates.push(1); // CloseLeaf
    }
    if leaves.len() > 2 {
        candidates.push(2); // MoveLeaf
    }
    if !splits.is_empty() {
        candidates.push(3); // SetRatio
    }
    candidates.push(4); // Toggle flags

    match candidates[rng.choose_index(candidates.len())] {
        0 => {
            let target = leaves[rng.choose_index(leaves.len())];
            tree.split_leaf(target, random_direction(rng), rng.ratio(), Leaf::default())
                .expect("splitting an existing leaf should succeed");
        }
        1 => {
            let target = leaves[rng.choose_index(leaves.len())];
            tree.close_leaf(target)
                .expect("closing a non-root leaf should succeed");
        }
        2 => {
            let source_idx = rng.choose_index(leaves.len());
            let mut target_idx = rng.choose_index(leaves.len());
            while target_idx == source_idx {
                target_idx = rng.choose_index(leaves.len());
            }
            tree.move_leaf(leaves[source_idx], leaves[target_idx], random_zone(rng))
                .expect("relocating between distinct leaves should succeed");
        }
        3 => {
            let split = splits[rng.choose_index(splits.len())];
            tree.set_ratio(split, rng.ratio())
                .expect("ratio update on an existing split should succeed");
        }
        _ => {
            let target = leaves[rng.choose_index(leaves.len())];
            if let Some(leaf) = tree.leaf_mut(target) {
                if leaf.pinned && rng.choose_bool() {
                    leaf.collapsed = !leaf.collapsed;
                } else {
                    leaf.pinned = !leaf.pinned;
                    if !leaf.pinned {
                        leaf.collapsed = false;
                    }
                }
            }
        }
    }
}

fn assert_solve_determinism_and_bounds(tree: &PanelTree, config: &LayoutConfig, area: Rect) {
    let solve_clone = |mut copy: PanelTree| -> (Layout, PanelTree) {
        let layout = solve(&mut copy, config, area, Pass::Committed);
        (layout, copy)
    };
    let (first, first_tree) = solve_clone(tree.clone());
    let (second, second_tree) = solve_clone(tree.clone());
    assert_eq!(first, second, "solving the same tree twice must agree");
    assert_eq!(first_tree, second_tree);

    for id in leaf_ids(tree) {
        let rect = first.rect(id).expect("every leaf gets a rect");
        assert!(rect.x >= area.x - EPS);
        assert!(rect.y >= area.y - EPS);
        assert!(rect.right() <= area.right() + EPS, "{rect:?} vs {area:?}");
        assert!(rect.bottom() <= area.bottom() + EPS, "{rect:?} vs {area:?}");
        assert!(rect.width >= 0.0 && rect.height >= 0.0);
    }
}

fn run_sequence(seed: u64, steps: usize) -> PanelTree {
    let mut tree = PanelTree::singleton();
    let mut rng = Lcg::new(seed);
    let config = LayoutConfig::default();

    for _ in 0..steps {
        apply_random_operation(&mut tree, &mut rng);
        tree.validate().expect("tree should remain structurally valid");

        // Vary the container from cramped to roomy so both the min-size
        // path and the proportional shrink path get exercised.
        let leaf_count = tree.leaf_count() as f32;
        let base = 40.0 + leaf_count * ((rng.next_u64() % 220) as f32);
        let area = Rect::from_size(base, base * 0.75);
        assert_solve_determinism_and_bounds(&tree, &config, area);
    }

    tree
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn random_operation_sequences_preserve_invariants(
        seed in any::<u64>(),
        steps in 20usize..100,
    ) {
        let tree = run_sequence(seed, steps);
        tree.validate().expect("final tree should be valid");
    }

    #[test]
    fn random_trees_survive_a_snapshot_round_trip(
        seed in any::<u64>(),
        steps in 10usize..60,
    ) {
        let tree = run_sequence(seed, steps);
        let data = TreeData::from_tree(&tree);
        let rebuilt = data
            .build_tree(&tree.surface_map())
            .expect("own snapshots should always rebuild");
        rebuilt.validate().expect("rebuilt tree should be valid");
        prop_assert_eq!(TreeData::from_tree(&rebuilt), data);
    }
}

#[test]
fn fuzz_seed_corpus_preserves_invariants() {
    let seeds = [
        0_u64,
        1,
        2,
        3,
        5,
        8,
        13,
        21,
        34,
        55,
        89,
        144,
        u32::MAX as u64,
        (u32::MAX as u64) + 1,
        u64::MAX - 1,
        u64::MAX,
    ];

    for seed in seeds {
        let tree = run_sequence(seed, 150);
        tree.validate()
            .unwrap_or_else(|err| panic!("seed {seed} broke the tree: {err}"));
    }
}

/// Structural equality with a small tolerance on ratios: restoring a
/// snapshot re-solves the tree, which can drift a realized ratio by a few
/// ulps without changing the layout.
fn assert_same_shape(a: &TreeData, b: &TreeData) {
    assert_eq!(a.id, b.id);
    assert_eq!(a.leaf, b.leaf);
    assert_eq!(a.direction, b.direction);
    assert_eq!(
        (a.pinned, a.collapsed, a.toolbar, a.main_content),
        (b.pinned, b.collapsed, b.toolbar, b.main_content)
    );
    assert!(
        (a.split - b.split).abs() < 1e-4,
        "ratio drift on {:?}: {} vs {}",
        a.id,
        a.split,
        b.split
    );
    assert_eq!(a.children.len(), b.children.len());
    for (child_a, child_b) in a.children.iter().zip(&b.children) {
        assert_same_shape(child_a, child_b);
    }
}

#[derive(Default)]
struct CountingHost {
    next: u64,
    live: Vec<SurfaceRef>,
    placements: usize,
}

impl RenderHost for CountingHost {
    fn create_surface(&mut self, _leaf: NodeId) -> SurfaceRef {
        self.next += 1;
        let surface = SurfaceRef::new(self.next);
        self.live.push(surface);
        surface
    }

    fn destroy_surface(&mut self, surface: SurfaceRef) {
        self.live.retain(|live| *live != surface);
    }

    fn place_surface(&mut self, _surface: SurfaceRef, _rect: Rect, _fixed: bool) {
        self.placements += 1;
    }
}

/// Full workflow: build a three-pane layout, resize, pin and collapse,
/// relocate by drag, then walk the whole history back and forward again.
#[test]
fn end_to_end_session_with_undo_redo_and_reload() {
    let container = Rect::from_size(1200.0, 800.0);
    let mut engine = PanelEngine::new(CountingHost::default(), LayoutConfig::default(), container);

    let main = engine.tree().root();
    assert!(engine.split_panel(main, Direction::Row));
    let side = engine
        .tree()
        .node(engine.tree().root())
        .unwrap()
        .as_split()
        .unwrap()
        .second;
    assert!(engine.split_panel(side, Direction::Column));
    assert_eq!(engine.tree().leaf_count(), 3);
    assert_eq!(engine.host().live.len(), 3);

    // Nudge the main boundary to the right.
    let root_split = engine.tree().root();
    let grab = engine
        .layout()
        .resizers()
        .iter()
        .find(|handle| handle.split == root_split)
        .expect("root split has a handle")
        .rect
        .center();
    assert!(engine.pointer_down(PointerTarget::Resizer(root_split), grab));
    engine.pointer_move(Point::new(grab.x + 120.0, grab.y));
    engine.pointer_up(Point::new(grab.x + 120.0, grab.y));

    // Pin and collapse the side panel's lower pane.
    let lower = engine.tree().leaves().last().unwrap().id;
    assert!(engine.toggle_pin(lower));
    assert!(engine.toggle_collapse(lower));
    assert_eq!(
        engine.layout().rect(lower).unwrap().height,
        engine.config().collapsed_size
    );

    // Drag the main panel onto the side panel's upper pane.
    let upper = engine
        .tree()
        .leaves()
        .map(|node| node.id)
        .find(|id| *id != main && *id != lower)
        .unwrap();
    let upper_rect = engine.layout().rect(upper).unwrap();
    let header = engine.layout().rect(main).unwrap().center();
    assert!(engine.pointer_down(PointerTarget::Header(main), header));
    engine.pointer_move(Point::new(upper_rect.center().x, upper_rect.y + 1.0));
    assert_eq!(engine.drop_target(), Some((upper, DropZone::Top)));
    engine.frame();
    engine.pointer_up(Point::new(upper_rect.center().x, upper_rect.y + 1.0));
    assert!(engine.tree().validate().is_ok());
    assert_eq!(engine.tree().leaf_count(), 3);

    let final_doc = engine.serialize();

    // Walk all the way back to the initial single panel.
    let mut undos = 0;
    while engine.undo() {
        undos += 1;
    }
    assert_eq!(engine.tree().leaf_count(), 1);
    assert_eq!(engine.host().live.len(), 1);

    // And forward to the final state again.
    for _ in 0..undos {
        assert!(engine.redo());
    }
    assert_same_shape(&engine.serialize().tree, &final_doc.tree);
    assert_eq!(engine.host().live.len(), 3);

    // A fresh engine restores the same shape from the document.
    let mut restored =
        PanelEngine::new(CountingHost::default(), LayoutConfig::default(), container);
    restored.load(&final_doc).unwrap();
    assert_same_shape(&restored.serialize().tree, &final_doc.tree);
    assert_eq!(restored.host().live.len(), 3);
}

/// Relocating a panel next to its own sibling must rebuild the split
/// cleanly instead of wiring the new split under the discarded parent.
#[test]
fn drag_between_siblings_keeps_the_tree_sound() {
    let mut engine = PanelEngine::new(
        CountingHost::default(),
        LayoutConfig::default(),
        Rect::from_size(1000.0, 400.0),
    );
    let a = engine.tree().root();
    assert!(engine.split_panel(a, Direction::Row));
    let b = engine.tree().leaves().last().unwrap().id;

    let b_rect = engine.layout().rect(b).unwrap();
    assert!(engine.pointer_down(PointerTarget::Header(a), Point::new(10.0, 10.0)));
    engine.pointer_move(Point::new(b_rect.center().x, b_rect.bottom() - 1.0));
    assert_eq!(engine.drop_target(), Some((b, DropZone::Bottom)));
    engine.pointer_up(Point::new(b_rect.center().x, b_rect.bottom() - 1.0));

    engine.tree().validate().expect("tree must stay valid");
    let root = engine.tree().node(engine.tree().root()).unwrap();
    let split = root.as_split().unwrap();
    assert_eq!(split.direction, Direction::Column);
    assert_eq!(split.first, b);
    assert_eq!(split.second, a);
}

/// Serialized documents keep content tags attached to their panels.
#[test]
fn content_map_follows_the_layout_document() {
    let mut engine = PanelEngine::new(
        CountingHost::default(),
        LayoutConfig::default(),
        Rect::from_size(800.0, 600.0),
    );
    let main = engine.tree().root();
    assert!(engine.split_panel(main, Direction::Row));
    let side = engine.tree().leaves().last().unwrap().id;
    assert!(engine.set_content(main, "editor"));
    assert!(engine.set_content(side, "outline"));

    let json = serde_json::to_string(&engine.serialize()).unwrap();
    let doc = serde_json::from_str(&json).unwrap();

    let mut restored = PanelEngine::new(
        CountingHost::default(),
        LayoutConfig::default(),
        Rect::from_size(800.0, 600.0),
    );
    restored.load(&doc).unwrap();
    let expected: BTreeMap<NodeId, String> = [
        (main, "editor".to_owned()),
        (side, "outline".to_owned()),
    ]
    .into_iter()
    .collect();
    assert_eq!(restored.content(), &expected);
}
