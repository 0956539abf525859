//! Contraction-hierarchy storage: per-node levels and shortcut records.
//!
//! Two stores per CH profile, layered on the node id space of a frozen
//! [`BaseGraph`]: `nodes_ch_<name>` holds `level | last_shortcut` records,
//! `shortcuts_<name>` holds the shortcut records. This type gives raw,
//! invariant-light access to those records; [`ChBuilder`] enforces the
//! insertion-order invariants CH preparation depends on.
//!
//! [`ChBuilder`]: crate::ch::ChBuilder

mod builder;
mod unpack;

pub use builder::ChBuilder;
pub use unpack::{OriginalEdge, ShortcutUnpacker};

use tracing::warn;

use crate::directory::Directory;
use crate::error::{Result, SendaError};
use crate::graph::{BaseGraph, FormatVersions};
use crate::scale::{stored_to_weight, INFINITE_WEIGHT_BITS, MAX_WEIGHT, MIN_WEIGHT, WEIGHT_FACTOR};
use crate::store::ByteStore;

/// Sentinel for a node whose CH level has not been assigned yet.
pub const NO_LEVEL: i32 = -1;

/// Sentinel for "no shortcut" in per-node shortcut lists.
pub const NO_SHORTCUT: i32 = -1;

// shortcut record offsets; the two original-edge-key fields exist only for
// edge-based profiles
const S_NODE_A: u64 = 0;
const S_NODE_B: u64 = 4;
const S_WEIGHT: u64 = 8;
const S_SKIP_1: u64 = 12;
const S_SKIP_2: u64 = 16;
const S_ORIG_FIRST: u64 = 20;
const S_ORIG_LAST: u64 = 24;

// CH node record offsets
const N_LEVEL: u64 = 0;
const N_LAST_SC: u64 = 4;
const NODE_CH_ENTRY_BYTES: u64 = 8;

// CH node header slots
const CNH_VERSION: usize = 0;
const CNH_COUNT: usize = 1;
const CNH_ENTRY_BYTES: usize = 2;

// shortcut header slots
const SH_VERSION: usize = 0;
const SH_COUNT: usize = 1;
const SH_ENTRY_BYTES: usize = 2;
const SH_UNDER_MIN: usize = 3;
const SH_OVER_MAX: usize = 4;
const SH_EDGE_BASED: usize = 5;
const SH_FIRST_SHORTCUT_ID: usize = 6;

/// Details handed to the weight-clamp callbacks: the original weight and
/// the bound it collided with.
#[derive(Clone, Copy, Debug)]
pub struct WeightClamp {
    /// Lower-level endpoint of the shortcut.
    pub node_a: i32,
    /// Higher-level endpoint of the shortcut.
    pub node_b: i32,
    /// Index of the shortcut being written.
    pub shortcut: i32,
    /// The weight as supplied by the caller.
    pub weight: f64,
    /// The violated bound (minimum or maximum storable weight).
    pub bound: f64,
}

type WeightConsumer = Box<dyn Fn(&WeightClamp)>;

/// Raw storage for one CH profile.
pub struct ChStore {
    nodes_ch: Box<dyn ByteStore>,
    shortcuts: Box<dyn ByteStore>,
    edge_based: bool,
    shortcut_entry_bytes: u64,
    node_count: i32,
    shortcut_count: i32,
    first_shortcut_id: i32,
    under_min: i32,
    over_max: i32,
    low_weight_consumer: Option<WeightConsumer>,
    high_weight_consumer: Option<WeightConsumer>,
    versions: FormatVersions,
}

impl ChStore {
    /// Builds the stores for profile `name` from `dir`. Call
    /// [`ChStore::create`] or [`ChStore::load_existing`] next.
    pub fn new(
        dir: &mut Directory,
        name: &str,
        segment_size: u32,
        edge_based: bool,
        versions: FormatVersions,
    ) -> Self {
        let nodes_ch = dir.create_sized(&format!("nodes_ch_{name}"), segment_size);
        let shortcuts = dir.create_sized(&format!("shortcuts_{name}"), segment_size);
        let shortcut_entry_bytes = if edge_based {
            S_ORIG_LAST + 4
        } else {
            S_ORIG_FIRST
        };
        Self {
            nodes_ch,
            shortcuts,
            edge_based,
            shortcut_entry_bytes,
            node_count: -1,
            shortcut_count: 0,
            first_shortcut_id: 0,
            under_min: 0,
            over_max: 0,
            low_weight_consumer: None,
            high_weight_consumer: None,
            versions,
        }
    }

    /// Creates the storage for a frozen base graph, sizing the shortcut
    /// store for a modest shortcut ratio and installing logging clamp
    /// consumers.
    pub fn from_graph(dir: &mut Directory, graph: &BaseGraph, name: &str, edge_based: bool) -> Result<Self> {
        assert!(
            graph.is_frozen(),
            "graph must be frozen before CH storage can be created"
        );
        let mut store = Self::new(
            dir,
            name,
            graph.config().segment_size,
            edge_based,
            graph.config().versions,
        );
        store.set_low_weight_consumer(Some(Box::new(|clamp: &WeightClamp| {
            warn!(
                node_a = clamp.node_a,
                node_b = clamp.node_b,
                weight = clamp.weight,
                minimum = clamp.bound,
                "shortcut weight below the minimum, clamping up"
            );
        })));
        store.set_high_weight_consumer(Some(Box::new(|clamp: &WeightClamp| {
            warn!(
                node_a = clamp.node_a,
                node_b = clamp.node_b,
                weight = clamp.weight,
                maximum = clamp.bound,
                "shortcut weight above the maximum, storing as infinite"
            );
        })));
        // expect a small shortcut ratio; growing later is cheap compared to
        // oversizing every profile up front
        let expected_shortcuts = graph.edge_count() as u64 * 3 / 10;
        store.create(graph.node_count(), graph.edge_count(), expected_shortcuts as i32)?;
        Ok(store)
    }

    /// Sets the callback reporting weights clamped up to the minimum.
    pub fn set_low_weight_consumer(&mut self, consumer: Option<WeightConsumer>) {
        self.low_weight_consumer = consumer;
    }

    /// Sets the callback reporting weights saturated to infinity.
    pub fn set_high_weight_consumer(&mut self, consumer: Option<WeightConsumer>) {
        self.high_weight_consumer = consumer;
    }

    /// Allocates the storage for `nodes` nodes, all unleveled and without
    /// shortcuts. `first_shortcut_id` is the base graph's edge count:
    /// shortcut ids live directly above the base edge ids.
    pub fn create(&mut self, nodes: i32, first_shortcut_id: i32, expected_shortcuts: i32) -> Result<()> {
        assert!(self.node_count < 0, "CH storage can only be created once");
        assert!(
            nodes >= 0,
            "CH storage needs a non-negative node count, got: {nodes}"
        );
        self.nodes_ch
            .create(nodes as u64 * NODE_CH_ENTRY_BYTES)?;
        self.node_count = nodes;
        self.first_shortcut_id = first_shortcut_id;
        for node in 0..nodes {
            let pointer = node as u64 * NODE_CH_ENTRY_BYTES;
            self.nodes_ch.set_int(pointer + N_LEVEL, NO_LEVEL);
            self.nodes_ch.set_int(pointer + N_LAST_SC, NO_SHORTCUT);
        }
        self.shortcuts
            .create(expected_shortcuts.max(0) as u64 * self.shortcut_entry_bytes)?;
        Ok(())
    }

    /// Loads previously flushed CH storage.
    pub fn load_existing(&mut self) -> Result<bool> {
        assert!(self.node_count < 0, "CH storage is already initialized");
        let nodes = self.nodes_ch.load_existing()?;
        let shortcuts = self.shortcuts.load_existing()?;
        match (nodes, shortcuts) {
            (false, false) => return Ok(false),
            (true, true) => {}
            _ => {
                return Err(SendaError::Corruption(
                    "CH stores are only partially present".to_string(),
                ))
            }
        }
        let node_version = self.nodes_ch.get_header(CNH_VERSION);
        if node_version != self.versions.nodes_ch {
            return Err(SendaError::Corruption(format!(
                "store {}: version {node_version} does not match expected {}",
                self.nodes_ch.name(),
                self.versions.nodes_ch
            )));
        }
        let shortcut_version = self.shortcuts.get_header(SH_VERSION);
        if shortcut_version != self.versions.shortcuts {
            return Err(SendaError::Corruption(format!(
                "store {}: version {shortcut_version} does not match expected {}",
                self.shortcuts.name(),
                self.versions.shortcuts
            )));
        }
        let stored_entry = self.shortcuts.get_header(SH_ENTRY_BYTES);
        let stored_edge_based = self.shortcuts.get_header(SH_EDGE_BASED) == 1;
        if stored_edge_based != self.edge_based {
            return Err(SendaError::Corruption(format!(
                "configured edge_based={} but loaded CH has edge_based={}",
                self.edge_based, stored_edge_based
            )));
        }
        if stored_entry as u64 != self.shortcut_entry_bytes {
            return Err(SendaError::Corruption(format!(
                "shortcut entry width {stored_entry} does not match configured {}",
                self.shortcut_entry_bytes
            )));
        }
        self.node_count = self.nodes_ch.get_header(CNH_COUNT);
        self.shortcut_count = self.shortcuts.get_header(SH_COUNT);
        self.under_min = self.shortcuts.get_header(SH_UNDER_MIN);
        self.over_max = self.shortcuts.get_header(SH_OVER_MAX);
        self.first_shortcut_id = self.shortcuts.get_header(SH_FIRST_SHORTCUT_ID);
        Ok(true)
    }

    /// Writes header slots and flushes both stores.
    pub fn flush(&mut self) -> Result<()> {
        self.nodes_ch.set_header(CNH_VERSION, self.versions.nodes_ch);
        self.nodes_ch.set_header(CNH_COUNT, self.node_count);
        self.nodes_ch
            .set_header(CNH_ENTRY_BYTES, NODE_CH_ENTRY_BYTES as i32);

        self.shortcuts.set_header(SH_VERSION, self.versions.shortcuts);
        self.shortcuts.set_header(SH_COUNT, self.shortcut_count);
        self.shortcuts
            .set_header(SH_ENTRY_BYTES, self.shortcut_entry_bytes as i32);
        self.shortcuts.set_header(SH_UNDER_MIN, self.under_min);
        self.shortcuts.set_header(SH_OVER_MAX, self.over_max);
        self.shortcuts
            .set_header(SH_EDGE_BASED, i32::from(self.edge_based));
        self.shortcuts
            .set_header(SH_FIRST_SHORTCUT_ID, self.first_shortcut_id);

        self.shortcuts.flush()?;
        self.nodes_ch.flush()?;
        Ok(())
    }

    /// Releases both stores without flushing.
    pub fn close(&mut self) {
        self.shortcuts.close();
        self.nodes_ch.close();
    }

    /// Number of nodes this storage covers.
    pub fn node_count(&self) -> i32 {
        self.node_count
    }

    /// Number of shortcuts added so far.
    pub fn shortcut_count(&self) -> i32 {
        self.shortcut_count
    }

    /// Whether this profile stores original-edge-key ranges.
    pub fn is_edge_based(&self) -> bool {
        self.edge_based
    }

    /// First edge id belonging to a shortcut; everything below is a base
    /// edge.
    pub fn first_shortcut_id(&self) -> i32 {
        self.first_shortcut_id
    }

    /// Whether an edge id refers to a shortcut of this profile.
    pub fn is_shortcut(&self, edge_id: i32) -> bool {
        edge_id >= self.first_shortcut_id
    }

    /// The edge id of a shortcut index.
    pub fn shortcut_id(&self, shortcut: i32) -> i32 {
        self.first_shortcut_id + shortcut
    }

    /// How many shortcut weights were clamped up to the minimum.
    pub fn shortcuts_under_min_weight(&self) -> i32 {
        self.under_min
    }

    /// How many shortcut weights saturated to infinity.
    pub fn shortcuts_over_max_weight(&self) -> i32 {
        self.over_max
    }

    fn node_pointer(&self, node: i32) -> u64 {
        assert!(
            node >= 0 && node < self.node_count,
            "node {} out of bounds [0,{})",
            node,
            self.node_count
        );
        node as u64 * NODE_CH_ENTRY_BYTES
    }

    fn shortcut_pointer(&self, shortcut: i32) -> u64 {
        assert!(
            shortcut >= 0 && shortcut < self.shortcut_count,
            "shortcut {} out of bounds [0,{})",
            shortcut,
            self.shortcut_count
        );
        shortcut as u64 * self.shortcut_entry_bytes
    }

    /// A node's CH level, or [`NO_LEVEL`].
    pub fn level(&self, node: i32) -> i32 {
        self.nodes_ch.get_int(self.node_pointer(node) + N_LEVEL)
    }

    /// Sets a node's CH level without any ordering checks.
    pub fn set_level(&mut self, node: i32, level: i32) {
        let pointer = self.node_pointer(node);
        self.nodes_ch.set_int(pointer + N_LEVEL, level);
    }

    /// The most recent shortcut with this node as its lower-level
    /// endpoint, or [`NO_SHORTCUT`].
    pub fn last_shortcut(&self, node: i32) -> i32 {
        self.nodes_ch.get_int(self.node_pointer(node) + N_LAST_SC)
    }

    /// Sets a node's last-shortcut pointer.
    pub fn set_last_shortcut(&mut self, node: i32, shortcut: i32) {
        let pointer = self.node_pointer(node);
        self.nodes_ch.set_int(pointer + N_LAST_SC, shortcut);
    }

    /// Appends a node-based shortcut and returns its index.
    pub fn shortcut_node_based(
        &mut self,
        node_a: i32,
        node_b: i32,
        fwd: bool,
        bwd: bool,
        weight: f64,
        skip1: i32,
        skip2: i32,
    ) -> Result<i32> {
        assert!(
            !self.edge_based,
            "cannot add node-based shortcuts to an edge-based CH"
        );
        self.shortcut(node_a, node_b, fwd, bwd, weight, skip1, skip2)
    }

    /// Appends an edge-based shortcut with its original-edge-key range and
    /// returns its index.
    #[allow(clippy::too_many_arguments)]
    pub fn shortcut_edge_based(
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
        assert!(
            self.edge_based,
            "cannot add edge-based shortcuts to a node-based CH"
        );
        let shortcut = self.shortcut(node_a, node_b, fwd, bwd, weight, skip1, skip2)?;
        let pointer = self.shortcut_pointer(shortcut);
        self.shortcuts.set_int(pointer + S_ORIG_FIRST, orig_key_first);
        self.shortcuts.set_int(pointer + S_ORIG_LAST, orig_key_last);
        Ok(shortcut)
    }

    fn shortcut(
        &mut self,
        node_a: i32,
        node_b: i32,
        fwd: bool,
        bwd: bool,
        weight: f64,
        skip1: i32,
        skip2: i32,
    ) -> Result<i32> {
        assert!(
            self.shortcut_count < i32::MAX,
            "maximum shortcut count exceeded: {}",
            self.shortcut_count
        );
        let weight_int = self.encode_weight(node_a, node_b, weight);
        let shortcut = self.shortcut_count;
        let pointer = shortcut as u64 * self.shortcut_entry_bytes;
        self.shortcut_count += 1;
        self.shortcuts
            .ensure_capacity(self.shortcut_count as u64 * self.shortcut_entry_bytes)?;
        self.shortcuts
            .set_int(pointer + S_NODE_A, node_a << 1 | i32::from(fwd));
        self.shortcuts
            .set_int(pointer + S_NODE_B, node_b << 1 | i32::from(bwd));
        self.shortcuts.set_int(pointer + S_WEIGHT, weight_int);
        self.shortcuts.set_int(pointer + S_SKIP_1, skip1);
        self.shortcuts.set_int(pointer + S_SKIP_2, skip2);
        Ok(shortcut)
    }

    /// Lower-level endpoint of a shortcut.
    pub fn shortcut_node_a(&self, shortcut: i32) -> i32 {
        ((self.shortcuts.get_int(self.shortcut_pointer(shortcut) + S_NODE_A) as u32) >> 1) as i32
    }

    /// Higher-level endpoint of a shortcut.
    pub fn shortcut_node_b(&self, shortcut: i32) -> i32 {
        ((self.shortcuts.get_int(self.shortcut_pointer(shortcut) + S_NODE_B) as u32) >> 1) as i32
    }

    /// Whether the shortcut is traversable in forward direction.
    pub fn shortcut_fwd(&self, shortcut: i32) -> bool {
        self.shortcuts.get_int(self.shortcut_pointer(shortcut) + S_NODE_A) & 1 != 0
    }

    /// Whether the shortcut is traversable in backward direction.
    pub fn shortcut_bwd(&self, shortcut: i32) -> bool {
        self.shortcuts.get_int(self.shortcut_pointer(shortcut) + S_NODE_B) & 1 != 0
    }

    /// A shortcut's weight; the saturation marker decodes to infinity.
    pub fn shortcut_weight(&self, shortcut: i32) -> f64 {
        stored_to_weight(self.shortcuts.get_int(self.shortcut_pointer(shortcut) + S_WEIGHT))
    }

    /// Re-encodes a shortcut's weight in place.
    pub fn set_shortcut_weight(&mut self, shortcut: i32, weight: f64) {
        let node_a = self.shortcut_node_a(shortcut);
        let node_b = self.shortcut_node_b(shortcut);
        let weight_int = self.encode_weight(node_a, node_b, weight);
        let pointer = self.shortcut_pointer(shortcut);
        self.shortcuts.set_int(pointer + S_WEIGHT, weight_int);
    }

    /// The two skipped edge ids of a shortcut.
    pub fn skipped_edges(&self, shortcut: i32) -> (i32, i32) {
        let pointer = self.shortcut_pointer(shortcut);
        (
            self.shortcuts.get_int(pointer + S_SKIP_1),
            self.shortcuts.get_int(pointer + S_SKIP_2),
        )
    }

    /// Rewrites the skipped edge ids of a shortcut.
    pub fn set_skipped_edges(&mut self, shortcut: i32, skip1: i32, skip2: i32) {
        let pointer = self.shortcut_pointer(shortcut);
        self.shortcuts.set_int(pointer + S_SKIP_1, skip1);
        self.shortcuts.set_int(pointer + S_SKIP_2, skip2);
    }

    /// The original-edge-key range of an edge-based shortcut.
    pub fn orig_edge_keys(&self, shortcut: i32) -> (i32, i32) {
        assert!(
            self.edge_based,
            "original edge keys exist only for edge-based CH"
        );
        let pointer = self.shortcut_pointer(shortcut);
        (
            self.shortcuts.get_int(pointer + S_ORIG_FIRST),
            self.shortcuts.get_int(pointer + S_ORIG_LAST),
        )
    }

    /// The node ordering implied by the levels: element `level` is the
    /// node holding that level. Requires every level to be assigned.
    pub fn node_ordering(&self) -> Vec<i32> {
        let mut ordering = vec![0i32; self.node_count as usize];
        for node in 0..self.node_count {
            let level = self.level(node);
            assert!(
                level >= 0 && level < self.node_count,
                "node {node} has level {level}, not a permutation of [0,{})",
                self.node_count
            );
            ordering[level as usize] = node;
        }
        ordering
    }

    fn encode_weight(&mut self, node_a: i32, node_b: i32, weight: f64) -> i32 {
        assert!(weight >= 0.0, "weight cannot be negative but was {weight}");
        let mut weight = weight;
        if weight < MIN_WEIGHT {
            if let Some(consumer) = &self.low_weight_consumer {
                consumer(&WeightClamp {
                    node_a,
                    node_b,
                    shortcut: self.shortcut_count,
                    weight,
                    bound: MIN_WEIGHT,
                });
            }
            self.under_min += 1;
            weight = MIN_WEIGHT;
        }
        if weight >= MAX_WEIGHT {
            if let Some(consumer) = &self.high_weight_consumer {
                consumer(&WeightClamp {
                    node_a,
                    node_b,
                    shortcut: self.shortcut_count,
                    weight,
                    bound: MAX_WEIGHT,
                });
            }
            self.over_max += 1;
            return INFINITE_WEIGHT_BITS as i64 as i32;
        }
        (weight * WEIGHT_FACTOR).round() as i64 as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphConfig;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn memory_ch(edge_based: bool, nodes: i32) -> ChStore {
        let mut dir = Directory::in_memory();
        let mut store = ChStore::new(&mut dir, "car", 1024, edge_based, FormatVersions::default());
        store.create(nodes, 0, 4).expect("create");
        store
    }

    #[test]
    fn nodes_start_unleveled_without_shortcuts() {
        let store = memory_ch(false, 4);
        for node in 0..4 {
            assert_eq!(store.level(node), NO_LEVEL);
            assert_eq!(store.last_shortcut(node), NO_SHORTCUT);
        }
    }

    #[test]
    fn shortcut_fields_roundtrip() {
        let mut store = memory_ch(false, 4);
        let shortcut = store
            .shortcut_node_based(1, 3, true, false, 12.345, 7, 8)
            .expect("shortcut");
        assert_eq!(store.shortcut_node_a(shortcut), 1);
        assert_eq!(store.shortcut_node_b(shortcut), 3);
        assert!(store.shortcut_fwd(shortcut));
        assert!(!store.shortcut_bwd(shortcut));
        assert!((store.shortcut_weight(shortcut) - 12.345).abs() < 0.0005);
        assert_eq!(store.skipped_edges(shortcut), (7, 8));
    }

    #[test]
    fn edge_based_shortcuts_store_orig_keys() {
        let mut store = memory_ch(true, 4);
        let shortcut = store
            .shortcut_edge_based(0, 2, true, true, 3.0, 0, 1, 0, 3)
            .expect("shortcut");
        assert_eq!(store.orig_edge_keys(shortcut), (0, 3));
    }

    #[test]
    #[should_panic(expected = "node-based shortcuts to an edge-based CH")]
    fn mixing_variants_panics() {
        let mut store = memory_ch(true, 4);
        let _ = store.shortcut_node_based(0, 1, true, true, 1.0, 0, 1);
    }

    #[test]
    fn weight_saturates_to_infinity_and_counts() {
        let mut store = memory_ch(false, 4);
        let over = store
            .shortcut_node_based(0, 1, true, true, MAX_WEIGHT * 2.0, 0, 1)
            .expect("shortcut");
        assert!(store.shortcut_weight(over).is_infinite());
        assert_eq!(store.shortcuts_over_max_weight(), 1);
        let fine = store
            .shortcut_node_based(0, 2, true, true, MAX_WEIGHT - 1.0, 0, 1)
            .expect("shortcut");
        assert!(store.shortcut_weight(fine).is_finite());
        assert_eq!(store.shortcuts_over_max_weight(), 1);
    }

    #[test]
    fn low_weights_clamp_up_and_report() {
        let mut store = memory_ch(false, 4);
        let reported = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&reported);
        store.set_low_weight_consumer(Some(Box::new(move |clamp: &WeightClamp| {
            sink.borrow_mut().push((clamp.weight, clamp.bound));
        })));
        let shortcut = store
            .shortcut_node_based(2, 3, true, true, 0.0001, 4, 5)
            .expect("shortcut");
        assert_eq!(store.shortcut_weight(shortcut), MIN_WEIGHT);
        assert_eq!(store.shortcuts_under_min_weight(), 1);
        assert_eq!(reported.borrow().as_slice(), &[(0.0001, MIN_WEIGHT)]);
    }

    #[test]
    #[should_panic(expected = "weight cannot be negative")]
    fn negative_weight_panics() {
        let mut store = memory_ch(false, 4);
        let _ = store.shortcut_node_based(0, 1, true, true, -1.0, 0, 1);
    }

    #[test]
    #[should_panic(expected = "must be frozen")]
    fn from_graph_requires_a_frozen_graph() {
        let mut dir = Directory::in_memory();
        let mut graph = BaseGraph::new(&mut dir, GraphConfig::new().segment_size(1024));
        graph.create(1024).expect("create");
        let _ = ChStore::from_graph(&mut dir, &graph, "car", false);
    }

    #[test]
    fn node_ordering_inverts_levels() {
        let mut store = memory_ch(false, 3);
        store.set_level(0, 2);
        store.set_level(1, 0);
        store.set_level(2, 1);
        assert_eq!(store.node_ordering(), vec![1, 2, 0]);
    }
}
