//! Turn-cost table keyed by `(from_edge, via_node, to_edge)`.
//!
//! Entries live in their own store as `from | to | flags | next` records.
//! The entries of one via-node form an intrusive list headed by the node
//! record's turn-cost reference in the base graph.

use crate::directory::Directory;
use crate::error::{Result, SendaError};
use crate::graph::{BaseGraph, GraphConfig};
use crate::store::ByteStore;

/// Sentinel terminating per-node turn-cost entry lists.
pub const NO_TURN_ENTRY: i32 = -1;

const TC_FROM: u64 = 0;
const TC_TO: u64 = 4;
const TC_FLAGS: u64 = 8;
const TC_NEXT: u64 = 12;
const BYTES_PER_ENTRY: u64 = 16;

const TH_VERSION: usize = 0;
const TH_COUNT: usize = 1;

/// Storage for turn-cost flags, layered on a base graph built with
/// turn-cost support.
pub struct TurnCostStorage {
    store: Box<dyn ByteStore>,
    count: i32,
    version: i32,
}

impl TurnCostStorage {
    /// Builds the table over a store named `turn_costs` from `dir`.
    pub fn new(dir: &mut Directory, cfg: &GraphConfig) -> Self {
        Self {
            store: dir.create_sized("turn_costs", cfg.segment_size),
            count: 0,
            version: cfg.versions.turn_costs,
        }
    }

    /// Allocates the initial segments.
    pub fn create(&mut self, initial_bytes: u64) -> Result<()> {
        self.store.create(initial_bytes)
    }

    /// Loads a previously flushed table.
    pub fn load_existing(&mut self) -> Result<bool> {
        if !self.store.load_existing()? {
            return Ok(false);
        }
        let version = self.store.get_header(TH_VERSION);
        if version != self.version {
            return Err(SendaError::Corruption(format!(
                "store turn_costs: version {version} does not match expected {}",
                self.version
            )));
        }
        self.count = self.store.get_header(TH_COUNT);
        Ok(true)
    }

    /// Writes header slots and flushes the store.
    pub fn flush(&mut self) -> Result<()> {
        self.store.set_header(TH_VERSION, self.version);
        self.store.set_header(TH_COUNT, self.count);
        self.store.flush()
    }

    /// Releases the store without flushing.
    pub fn close(&mut self) {
        self.store.close();
    }

    /// Number of stored entries.
    pub fn count(&self) -> i32 {
        self.count
    }

    fn pointer(&self, index: i32) -> u64 {
        assert!(
            index >= 0 && index < self.count,
            "turn-cost entry {} out of bounds [0,{})",
            index,
            self.count
        );
        index as u64 * BYTES_PER_ENTRY
    }

    /// Stores turn-cost flags for the triple, overwriting an existing
    /// entry or appending a new one to the via-node's list.
    pub fn set(
        &mut self,
        graph: &mut BaseGraph,
        from_edge: i32,
        via_node: i32,
        to_edge: i32,
        flags: i32,
    ) -> Result<()> {
        let mut index = graph.turn_cost_ref(via_node);
        let mut last = NO_TURN_ENTRY;
        while index != NO_TURN_ENTRY {
            let pointer = self.pointer(index);
            if self.store.get_int(pointer + TC_FROM) == from_edge
                && self.store.get_int(pointer + TC_TO) == to_edge
            {
                self.store.set_int(pointer + TC_FLAGS, flags);
                return Ok(());
            }
            last = index;
            index = self.store.get_int(pointer + TC_NEXT);
        }

        let entry = self.count;
        self.count += 1;
        self.store
            .ensure_capacity(self.count as u64 * BYTES_PER_ENTRY)?;
        let pointer = self.pointer(entry);
        self.store.set_int(pointer + TC_FROM, from_edge);
        self.store.set_int(pointer + TC_TO, to_edge);
        self.store.set_int(pointer + TC_FLAGS, flags);
        self.store.set_int(pointer + TC_NEXT, NO_TURN_ENTRY);
        if last == NO_TURN_ENTRY {
            graph.set_turn_cost_ref(via_node, entry);
        } else {
            self.store.set_int(self.pointer(last) + TC_NEXT, entry);
        }
        Ok(())
    }

    /// Reads the flags for a triple; 0 when no entry exists.
    pub fn get(&self, graph: &BaseGraph, from_edge: i32, via_node: i32, to_edge: i32) -> i32 {
        let mut index = graph.turn_cost_ref(via_node);
        while index != NO_TURN_ENTRY {
            let pointer = self.pointer(index);
            if self.store.get_int(pointer + TC_FROM) == from_edge
                && self.store.get_int(pointer + TC_TO) == to_edge
            {
                return self.store.get_int(pointer + TC_FLAGS);
            }
            index = self.store.get_int(pointer + TC_NEXT);
        }
        0
    }

    /// Calls `visit(from_edge, via_node, to_edge, flags)` for every stored
    /// entry, grouped by via-node.
    pub fn for_each(&self, graph: &BaseGraph, mut visit: impl FnMut(i32, i32, i32, i32)) {
        for via_node in 0..graph.node_count() {
            let mut index = graph.turn_cost_ref(via_node);
            while index != NO_TURN_ENTRY {
                let pointer = self.pointer(index);
                visit(
                    self.store.get_int(pointer + TC_FROM),
                    via_node,
                    self.store.get_int(pointer + TC_TO),
                    self.store.get_int(pointer + TC_FLAGS),
                );
                index = self.store.get_int(pointer + TC_NEXT);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with_turn_costs() -> (BaseGraph, TurnCostStorage) {
        let mut dir = Directory::in_memory();
        let cfg = GraphConfig::new().with_turn_costs(true).segment_size(1024);
        let mut graph = BaseGraph::new(&mut dir, cfg);
        graph.create(1024).expect("create graph");
        let mut turn_costs = TurnCostStorage::new(&mut dir, &cfg);
        turn_costs.create(1024).expect("create turn costs");
        (graph, turn_costs)
    }

    #[test]
    fn set_get_roundtrip_per_triple() {
        let (mut graph, mut turn_costs) = graph_with_turn_costs();
        let e0 = graph.add_edge(0, 1).expect("edge");
        let e1 = graph.add_edge(1, 2).expect("edge");
        let e2 = graph.add_edge(1, 3).expect("edge");

        turn_costs.set(&mut graph, e0, 1, e1, 35).expect("set");
        turn_costs.set(&mut graph, e0, 1, e2, 70).expect("set");
        assert_eq!(turn_costs.get(&graph, e0, 1, e1), 35);
        assert_eq!(turn_costs.get(&graph, e0, 1, e2), 70);
        assert_eq!(turn_costs.get(&graph, e1, 1, e0), 0);
        assert_eq!(turn_costs.count(), 2);
    }

    #[test]
    fn setting_a_triple_twice_overwrites() {
        let (mut graph, mut turn_costs) = graph_with_turn_costs();
        let e0 = graph.add_edge(0, 1).expect("edge");
        let e1 = graph.add_edge(1, 2).expect("edge");
        turn_costs.set(&mut graph, e0, 1, e1, 5).expect("set");
        turn_costs.set(&mut graph, e0, 1, e1, 9).expect("overwrite");
        assert_eq!(turn_costs.get(&graph, e0, 1, e1), 9);
        assert_eq!(turn_costs.count(), 1);
    }

    #[test]
    fn for_each_visits_entries_grouped_by_node() {
        let (mut graph, mut turn_costs) = graph_with_turn_costs();
        let e0 = graph.add_edge(0, 1).expect("edge");
        let e1 = graph.add_edge(1, 2).expect("edge");
        let e2 = graph.add_edge(2, 3).expect("edge");
        turn_costs.set(&mut graph, e0, 1, e1, 1).expect("set");
        turn_costs.set(&mut graph, e1, 2, e2, 2).expect("set");

        let mut seen = Vec::new();
        turn_costs.for_each(&graph, |from, via, to, flags| {
            seen.push((from, via, to, flags));
        });
        assert_eq!(seen, vec![(e0, 1, e1, 1), (e1, 2, e2, 2)]);
    }
}
