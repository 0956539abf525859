use crate::ch::ChStore;
use crate::graph::BaseGraph;

/// One original edge produced by expanding a shortcut, oriented in travel
/// direction: the edge is traversed from `base` to `adj`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OriginalEdge {
    /// Base-graph edge id.
    pub edge: i32,
    /// Node the edge is entered from.
    pub base: i32,
    /// Node the edge leads to.
    pub adj: i32,
}

/// Expands shortcuts into the original edges they stand for.
///
/// A shortcut skips two edges that may themselves be shortcuts; the
/// unpacker recurses until only base edges remain and reports each one in
/// travel order. The two skipped edges meet at the contracted via-node,
/// which determines the order they are walked in from either endpoint.
pub struct ShortcutUnpacker<'a> {
    graph: &'a BaseGraph,
    ch: &'a ChStore,
}

impl<'a> ShortcutUnpacker<'a> {
    /// Builds an unpacker over a base graph and one of its CH profiles.
    pub fn new(graph: &'a BaseGraph, ch: &'a ChStore) -> Self {
        Self { graph, ch }
    }

    /// Visits the original edges behind `edge_id` (a base edge id or a
    /// shortcut id of this profile) in travel order from `start_node`.
    /// With `reverse_order` the edges are reported last-to-first while each
    /// edge keeps its travel orientation.
    pub fn visit_original_edges(
        &self,
        edge_id: i32,
        start_node: i32,
        reverse_order: bool,
        visit: &mut dyn FnMut(OriginalEdge),
    ) {
        self.expand(edge_id, start_node, reverse_order, visit);
    }

    /// Collects the expansion of `edge_id` into a vector, first-to-last.
    pub fn original_edges(&self, edge_id: i32, start_node: i32) -> Vec<OriginalEdge> {
        let mut edges = Vec::new();
        self.visit_original_edges(edge_id, start_node, false, &mut |edge| edges.push(edge));
        edges
    }

    fn endpoints(&self, edge_id: i32) -> (i32, i32) {
        if self.ch.is_shortcut(edge_id) {
            let shortcut = edge_id - self.ch.first_shortcut_id();
            (
                self.ch.shortcut_node_a(shortcut),
                self.ch.shortcut_node_b(shortcut),
            )
        } else {
            self.graph.edge_nodes(edge_id)
        }
    }

    // the via-node the two skipped edges meet at
    fn shared_node(&self, skip1: i32, skip2: i32) -> i32 {
        let (a1, b1) = self.endpoints(skip1);
        let (a2, b2) = self.endpoints(skip2);
        if a1 == a2 || a1 == b2 {
            a1
        } else {
            debug_assert!(
                b1 == a2 || b1 == b2,
                "skipped edges {skip1} and {skip2} do not share a node"
            );
            b1
        }
    }

    fn expand(
        &self,
        edge_id: i32,
        start_node: i32,
        reverse_order: bool,
        visit: &mut dyn FnMut(OriginalEdge),
    ) {
        if !self.ch.is_shortcut(edge_id) {
            let (node_a, node_b) = self.graph.edge_nodes(edge_id);
            assert!(
                node_a == start_node || node_b == start_node,
                "edge {edge_id} does not touch node {start_node}"
            );
            let adj = if node_a == start_node { node_b } else { node_a };
            visit(OriginalEdge {
                edge: edge_id,
                base: start_node,
                adj,
            });
            return;
        }

        let shortcut = edge_id - self.ch.first_shortcut_id();
        let node_a = self.ch.shortcut_node_a(shortcut);
        let node_b = self.ch.shortcut_node_b(shortcut);
        assert!(
            start_node == node_a || start_node == node_b,
            "shortcut {shortcut} does not touch node {start_node}"
        );
        let (skip1, skip2) = self.ch.skipped_edges(shortcut);
        let via = self.shared_node(skip1, skip2);
        // skip1 leaves node_a, skip2 leaves the via-node; starting from
        // node_b the walk runs skip2 first. A self-loop shortcut (node_a ==
        // node_b) always runs node_a -> via -> node_a.
        let (first, second) = if start_node == node_a {
            ((skip1, node_a), (skip2, via))
        } else {
            ((skip2, node_b), (skip1, via))
        };
        if reverse_order {
            self.expand(second.0, second.1, reverse_order, visit);
            self.expand(first.0, first.1, reverse_order, visit);
        } else {
            self.expand(first.0, first.1, reverse_order, visit);
            self.expand(second.0, second.1, reverse_order, visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ch::ChBuilder;
    use crate::directory::Directory;
    use crate::graph::GraphConfig;

    // chain 0-1-2-3-4, contracted inside-out so every shortcut skips two
    // previously added edges or shortcuts
    fn chain_fixture() -> (BaseGraph, ChStore) {
        let mut dir = Directory::in_memory();
        let mut graph = BaseGraph::new(&mut dir, GraphConfig::new().segment_size(1024));
        graph.create(1024).expect("create");
        for node in 0..5 {
            graph
                .set_node(node, 48.0 + f64::from(node) * 0.01, 11.5)
                .expect("node");
        }
        for node in 0..4 {
            graph.add_edge(node, node + 1).expect("edge");
        }
        graph.freeze();

        let mut ch = ChStore::from_graph(&mut dir, &graph, "car", false).expect("ch");
        let first_id = ch.first_shortcut_id();
        let mut builder = ChBuilder::new(&mut ch);
        // levels: contract 1 first, then 3, then 2; 0 and 4 stay on top
        builder.set_levels_from_ordering(&[1, 3, 2, 0, 4]);
        // contracting node 1 bridges 0-2 over edges 0 and 1
        builder
            .add_shortcut_node_based(2, 0, true, true, 20.0, 1, 0)
            .expect("shortcut 0-2");
        // contracting node 3 bridges 2-4 over edges 2 and 3
        builder
            .add_shortcut_node_based(2, 4, true, true, 20.0, 2, 3)
            .expect("shortcut 2-4");
        // contracting node 2 bridges 0-4 over the two shortcuts
        builder
            .add_shortcut_node_based(0, 4, true, true, 40.0, first_id, first_id + 1)
            .expect("shortcut 0-4");
        (graph, ch)
    }

    #[test]
    fn base_edges_pass_through_unexpanded() {
        let (graph, ch) = chain_fixture();
        let unpacker = ShortcutUnpacker::new(&graph, &ch);
        assert_eq!(
            unpacker.original_edges(1, 2),
            vec![OriginalEdge {
                edge: 1,
                base: 2,
                adj: 1
            }]
        );
    }

    #[test]
    fn nested_shortcuts_expand_in_travel_order() {
        let (graph, ch) = chain_fixture();
        let unpacker = ShortcutUnpacker::new(&graph, &ch);
        let top = ch.shortcut_id(2);

        let forward = unpacker.original_edges(top, 0);
        let ids: Vec<i32> = forward.iter().map(|e| e.edge).collect();
        let bases: Vec<i32> = forward.iter().map(|e| e.base).collect();
        let adjs: Vec<i32> = forward.iter().map(|e| e.adj).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(bases, vec![0, 1, 2, 3]);
        assert_eq!(adjs, vec![1, 2, 3, 4]);
    }

    #[test]
    fn starting_from_the_other_endpoint_reverses_travel() {
        let (graph, ch) = chain_fixture();
        let unpacker = ShortcutUnpacker::new(&graph, &ch);
        let top = ch.shortcut_id(2);

        let backward = unpacker.original_edges(top, 4);
        let ids: Vec<i32> = backward.iter().map(|e| e.edge).collect();
        let bases: Vec<i32> = backward.iter().map(|e| e.base).collect();
        assert_eq!(ids, vec![3, 2, 1, 0]);
        assert_eq!(bases, vec![4, 3, 2, 1]);
    }

    #[test]
    fn reverse_order_flips_emission_but_not_orientation() {
        let (graph, ch) = chain_fixture();
        let unpacker = ShortcutUnpacker::new(&graph, &ch);
        let top = ch.shortcut_id(2);

        let mut reversed = Vec::new();
        unpacker.visit_original_edges(top, 0, true, &mut |edge| reversed.push(edge));
        let mut forward = unpacker.original_edges(top, 0);
        forward.reverse();
        assert_eq!(reversed, forward);
        // orientation still follows travel from node 0
        assert_eq!(reversed[0].base, 3);
        assert_eq!(reversed[0].adj, 4);
    }

    #[test]
    #[should_panic(expected = "does not touch node")]
    fn foreign_start_node_panics() {
        let (graph, ch) = chain_fixture();
        let unpacker = ShortcutUnpacker::new(&graph, &ch);
        let _ = unpacker.original_edges(ch.shortcut_id(0), 3);
    }
}
