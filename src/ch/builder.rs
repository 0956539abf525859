use crate::ch::{ChStore, NO_LEVEL, NO_SHORTCUT};
use crate::error::Result;
use crate::graph::NO_EDGE;

/// Policy layer over [`ChStore`] enforcing the invariants CH preparation
/// relies on:
///
/// - a node must be leveled before it appears as the lower-level endpoint
///   of a shortcut, and its level must lie in `[0, node_count)`,
/// - for a shortcut `a -> b`, either `a == b` or `level(a) < level(b)`,
/// - `level(node_a)` never decreases across the whole insertion sequence,
///   so a single forward scan bounded by level finds every shortcut.
///
/// Violations panic before any record is written, leaving the storage
/// untouched. The builder also tracks which prepare edge each shortcut
/// replaced, and can translate skipped-edge references from prepare-space
/// ids to final shortcut ids once all shortcuts are known.
///
/// By convention `skip1` connects `node_a` with the contracted via-node
/// and `skip2` connects the via-node with `node_b`; the unpacker relies on
/// this orientation.
pub struct ChBuilder<'a> {
    store: &'a mut ChStore,
    prev_level_a: i32,
    shortcut_by_prepare_edge: Vec<i32>,
}

impl<'a> ChBuilder<'a> {
    /// Wraps a CH store for invariant-checked insertion.
    pub fn new(store: &'a mut ChStore) -> Self {
        Self {
            store,
            prev_level_a: -1,
            shortcut_by_prepare_edge: Vec::new(),
        }
    }

    /// The wrapped store.
    pub fn store(&self) -> &ChStore {
        self.store
    }

    /// Assigns a node's level. Allowed any time before the node is used as
    /// a lower-level shortcut endpoint; assigning twice overwrites.
    pub fn set_level(&mut self, node: i32, level: i32) {
        let nodes = self.store.node_count();
        assert!(
            level >= 0 && level < nodes,
            "level {level} out of bounds [0,{nodes})"
        );
        self.store.set_level(node, level);
    }

    /// Assigns `node -> level` from a full node ordering, element `level`
    /// naming the node at that level.
    pub fn set_levels_from_ordering(&mut self, ordering: &[i32]) {
        assert_eq!(
            ordering.len(),
            self.store.node_count() as usize,
            "ordering must cover every node"
        );
        for (level, &node) in ordering.iter().enumerate() {
            self.set_level(node, level as i32);
        }
    }

    fn check_shortcut(&self, node_a: i32, node_b: i32) -> i32 {
        let nodes = self.store.node_count();
        assert!(
            node_a >= 0 && node_a < nodes,
            "node {node_a} out of bounds [0,{nodes})"
        );
        assert!(
            node_b >= 0 && node_b < nodes,
            "node {node_b} out of bounds [0,{nodes})"
        );
        let level_a = self.store.level(node_a);
        assert!(
            level_a != NO_LEVEL,
            "node {node_a} must be leveled before a shortcut can start there"
        );
        assert!(
            level_a >= 0 && level_a < nodes,
            "node {node_a} has invalid level {level_a}"
        );
        if node_a != node_b {
            let level_b = self.store.level(node_b);
            assert!(
                level_a < level_b,
                "level of node {node_a} ({level_a}) must be smaller than level of node {node_b} ({})",
                level_b
            );
        }
        assert!(
            level_a >= self.prev_level_a,
            "shortcut for node {node_a} (level {level_a}) breaks the non-decreasing \
             level order, previous shortcut had level {}",
            self.prev_level_a
        );
        level_a
    }

    /// Adds a node-based shortcut after checking every invariant. Returns
    /// the shortcut index.
    #[allow(clippy::too_many_arguments)]
    pub fn add_shortcut_node_based(
        &mut self,
        node_a: i32,
        node_b: i32,
        fwd: bool,
        bwd: bool,
        weight: f64,
        skip1: i32,
        skip2: i32,
    ) -> Result<i32> {
        let level_a = self.check_shortcut(node_a, node_b);
        let shortcut = self
            .store
            .shortcut_node_based(node_a, node_b, fwd, bwd, weight, skip1, skip2)?;
        self.store.set_last_shortcut(node_a, shortcut);
        self.prev_level_a = level_a;
        Ok(shortcut)
    }

    /// Adds an edge-based shortcut after checking every invariant.
    /// Returns the shortcut index.
    #[allow(clippy::too_many_arguments)]
    pub fn add_shortcut_edge_based(
        &mut self,
        node_a: i32,
        node_b: i32,
        fwd: bool,
        bwd: bool,
        weight: f64,
        skip1: i32,
        skip2: i32,
        orig_key_first: i32,
        orig_key_last: i32,
    ) -> Result<i32> {
        let level_a = self.check_shortcut(node_a, node_b);
        let shortcut = self.store.shortcut_edge_based(
            node_a,
            node_b,
            fwd,
            bwd,
            weight,
            skip1,
            skip2,
            orig_key_first,
            orig_key_last,
        )?;
        self.store.set_last_shortcut(node_a, shortcut);
        self.prev_level_a = level_a;
        Ok(shortcut)
    }

    /// Records which shortcut replaced a prepare edge. Prepare edges are
    /// numbered from the base graph's original edge count upwards.
    pub fn set_shortcut_for_prepare_edge(&mut self, prepare_edge: i32, shortcut: i32) {
        let index = prepare_edge - self.store.first_shortcut_id();
        assert!(
            index >= 0,
            "prepare edge {prepare_edge} below the original edge count {}",
            self.store.first_shortcut_id()
        );
        let index = index as usize;
        if index >= self.shortcut_by_prepare_edge.len() {
            self.shortcut_by_prepare_edge.resize(index + 1, NO_SHORTCUT);
        }
        self.shortcut_by_prepare_edge[index] = shortcut;
    }

    /// The shortcut that replaced a prepare edge, or [`NO_SHORTCUT`].
    pub fn shortcut_for_prepare_edge(&self, prepare_edge: i32) -> i32 {
        let index = prepare_edge - self.store.first_shortcut_id();
        if index < 0 {
            return NO_SHORTCUT;
        }
        self.shortcut_by_prepare_edge
            .get(index as usize)
            .copied()
            .unwrap_or(NO_SHORTCUT)
    }

    /// Translates every shortcut's skipped-edge references through `map`
    /// in one pass, typically from prepare-space ids to final shortcut
    /// ids. [`NO_EDGE`] passes through untouched.
    pub fn remap_skipped_edges(&mut self, map: impl Fn(i32) -> i32) {
        for shortcut in 0..self.store.shortcut_count() {
            let (skip1, skip2) = self.store.skipped_edges(shortcut);
            let skip1 = if skip1 == NO_EDGE { NO_EDGE } else { map(skip1) };
            let skip2 = if skip2 == NO_EDGE { NO_EDGE } else { map(skip2) };
            self.store.set_skipped_edges(shortcut, skip1, skip2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Directory;
    use crate::graph::FormatVersions;

    fn leveled_store(nodes: i32) -> ChStore {
        let mut dir = Directory::in_memory();
        let mut store = ChStore::new(&mut dir, "car", 1024, false, FormatVersions::default());
        store.create(nodes, 100, 4).expect("create");
        store
    }

    #[test]
    fn accepted_shortcuts_update_last_shortcut() {
        let mut store = leveled_store(4);
        let mut builder = ChBuilder::new(&mut store);
        builder.set_levels_from_ordering(&[0, 1, 2, 3]);
        let first = builder
            .add_shortcut_node_based(0, 2, true, false, 5.0, 0, 1)
            .expect("shortcut");
        let second = builder
            .add_shortcut_node_based(0, 3, true, false, 7.0, 0, 2)
            .expect("shortcut");
        assert_eq!(store.last_shortcut(0), second);
        assert_eq!(store.skipped_edges(first), (0, 1));
    }

    #[test]
    #[should_panic(expected = "must be leveled")]
    fn unleveled_lower_endpoint_is_rejected() {
        let mut store = leveled_store(4);
        let mut builder = ChBuilder::new(&mut store);
        builder.set_level(1, 1);
        let _ = builder.add_shortcut_node_based(0, 1, true, true, 1.0, 0, 1);
    }

    #[test]
    #[should_panic(expected = "must be smaller than level")]
    fn downhill_shortcut_is_rejected() {
        let mut store = leveled_store(6);
        let mut builder = ChBuilder::new(&mut store);
        builder.set_level(1, 5);
        builder.set_level(2, 0);
        let _ = builder.add_shortcut_node_based(2, 1, true, true, 1.0, 0, 1);
    }

    #[test]
    #[should_panic(expected = "non-decreasing level order")]
    fn decreasing_insertion_order_is_rejected() {
        let mut store = leveled_store(4);
        let mut builder = ChBuilder::new(&mut store);
        builder.set_levels_from_ordering(&[0, 1, 2, 3]);
        builder
            .add_shortcut_node_based(1, 2, true, true, 1.0, 0, 1)
            .expect("level 1 shortcut");
        let _ = builder.add_shortcut_node_based(0, 2, true, true, 1.0, 0, 1);
    }

    #[test]
    fn self_loop_shortcuts_keep_their_level() {
        let mut dir = Directory::in_memory();
        let mut store = ChStore::new(&mut dir, "truck", 1024, true, FormatVersions::default());
        store.create(3, 10, 4).expect("create");
        let mut builder = ChBuilder::new(&mut store);
        builder.set_levels_from_ordering(&[0, 1, 2]);
        let shortcut = builder
            .add_shortcut_edge_based(1, 1, true, false, 2.0, 3, 4, 0, 5)
            .expect("self loop");
        assert_eq!(store.shortcut_node_a(shortcut), 1);
        assert_eq!(store.shortcut_node_b(shortcut), 1);
    }

    #[test]
    fn prepare_edge_table_and_remap() {
        let mut store = leveled_store(4);
        let first_id = store.first_shortcut_id();
        let mut builder = ChBuilder::new(&mut store);
        builder.set_levels_from_ordering(&[0, 1, 2, 3]);
        let sc0 = builder
            .add_shortcut_node_based(0, 2, true, true, 1.0, 5, first_id + 1)
            .expect("shortcut");
        let sc1 = builder
            .add_shortcut_node_based(1, 2, true, true, 2.0, 6, 7)
            .expect("shortcut");
        builder.set_shortcut_for_prepare_edge(first_id + 1, sc1);
        assert_eq!(builder.shortcut_for_prepare_edge(first_id + 1), sc1);
        assert_eq!(builder.shortcut_for_prepare_edge(first_id + 2), NO_SHORTCUT);

        // resolve prepare-space skip references to final shortcut ids
        let table: Vec<i32> = (0..2).map(|p| builder.shortcut_for_prepare_edge(first_id + p)).collect();
        builder.remap_skipped_edges(|edge| {
            if edge >= first_id {
                first_id + table[(edge - first_id) as usize]
            } else {
                edge
            }
        });
        assert_eq!(store.skipped_edges(sc0), (5, first_id + sc1));
    }
}
