//! Base routing graph: fixed-width node and edge records over byte stores.
//!
//! Nodes and edges are stored sequentially in two stores; way geometry goes
//! to a third. Each node record heads an intrusive singly-linked adjacency
//! list threaded through the edge records: `link_a` continues the list of
//! the edge's first endpoint, `link_b` the list of the second. New edges are
//! prepended, so every list terminates at [`NO_EDGE`] and edge ids are never
//! reused.
//!
//! All record offsets are 4-byte aligned and entries are padded to a
//! multiple of 4 bytes, which guarantees that fixed-width store accesses
//! never straddle a segment boundary.

mod bbox;
mod config;

pub use bbox::BBox;
pub use config::{FormatVersions, GraphConfig};

use smallvec::SmallVec;

use crate::directory::Directory;
use crate::error::{Result, SendaError};
use crate::scale::{
    degree_to_int, dist_to_mm, ele_to_int, int_to_degree, int_to_ele, mm_to_dist,
};
use crate::store::ByteStore;
use crate::turncost::NO_TURN_ENTRY;

/// Sentinel terminating adjacency lists and marking "no edge".
pub const NO_EDGE: i32 = -1;

// node record offsets (bytes); elevation and turn-cost offsets depend on
// the configuration
const N_EDGE_REF: u64 = 0;
const N_LAT: u64 = 4;
const N_LON: u64 = 8;

// edge record offsets (bytes); geo offset depends on the flags width
const E_NODE_A: u64 = 0;
const E_NODE_B: u64 = 4;
const E_LINK_A: u64 = 8;
const E_LINK_B: u64 = 12;
const E_DIST: u64 = 16;
const E_KV: u64 = 20;
const E_FLAGS: u64 = 24;

// node header slots
const NH_VERSION: usize = 0;
const NH_ENTRY_BYTES: usize = 1;
const NH_COUNT: usize = 2;
const NH_MIN_LON: usize = 3;
const NH_MAX_LON: usize = 4;
const NH_MIN_LAT: usize = 5;
const NH_MAX_LAT: usize = 6;
const NH_ELEVATION: usize = 7;
const NH_MIN_ELE: usize = 8;
const NH_MAX_ELE: usize = 9;
const NH_FROZEN: usize = 10;

// edge header slots
const EH_VERSION: usize = 0;
const EH_ENTRY_BYTES: usize = 1;
const EH_COUNT: usize = 2;
const EH_FLAG_BYTES: usize = 3;

// geometry header slots
const GH_VERSION: usize = 0;
const GH_NEXT_LO: usize = 1;
const GH_NEXT_HI: usize = 2;

// first geometry record position; 0 stays the "no geometry" sentinel
const GEO_START: u64 = 4;

fn align4(bytes: u64) -> u64 {
    (bytes + 3) & !3
}

/// A pillar point of an edge's way geometry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Elevation in meters; meaningful only for 3D graphs.
    pub ele: f64,
}

impl GeoPoint {
    /// A 2D point.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon, ele: 0.0 }
    }

    /// A 3D point.
    pub fn with_ele(lat: f64, lon: f64, ele: f64) -> Self {
        Self { lat, lon, ele }
    }
}

/// One step of an adjacency traversal: the edge as seen from `base`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EdgeCursor {
    /// Edge id.
    pub edge: i32,
    /// The node the traversal started from.
    pub base: i32,
    /// The other endpoint.
    pub adj: i32,
}

/// Iterator over the edges incident to one node, in reverse insertion
/// order (new edges are prepended).
pub struct IncidentEdges<'g> {
    graph: &'g BaseGraph,
    node: i32,
    next: i32,
}

impl Iterator for IncidentEdges<'_> {
    type Item = EdgeCursor;

    fn next(&mut self) -> Option<EdgeCursor> {
        if self.next == NO_EDGE {
            return None;
        }
        let edge = self.next;
        let pointer = self.graph.edge_pointer(edge);
        let node_a = self.graph.edges.get_int(pointer + E_NODE_A);
        let node_b = self.graph.edges.get_int(pointer + E_NODE_B);
        let (adj, link) = if node_a == self.node {
            (node_b, E_LINK_A)
        } else {
            debug_assert_eq!(node_b, self.node, "adjacency list left its node");
            (node_a, E_LINK_B)
        };
        self.next = self.graph.edges.get_int(pointer + link);
        Some(EdgeCursor {
            edge,
            base: self.node,
            adj,
        })
    }
}

// full edge record image, used by the permutation passes
struct EdgeRecord {
    node_a: i32,
    node_b: i32,
    link_a: i32,
    link_b: i32,
    dist_mm: i32,
    kv_ref: i32,
    flags: SmallVec<[u32; 2]>,
    geo_ref: i64,
}

/// The base graph: nodes, edges, adjacency, bounds, way geometry.
pub struct BaseGraph {
    nodes: Box<dyn ByteStore>,
    edges: Box<dyn ByteStore>,
    geometry: Box<dyn ByteStore>,
    cfg: GraphConfig,
    n_ele: u64,
    n_tc: u64,
    node_entry_bytes: u64,
    e_geo: u64,
    edge_entry_bytes: u64,
    node_count: i32,
    edge_count: i32,
    bounds: BBox,
    frozen: bool,
    next_geo_pos: u64,
}

impl BaseGraph {
    /// Builds a graph over stores named `nodes`, `edges` and `geometry`
    /// from `dir`. Call [`BaseGraph::create`] or
    /// [`BaseGraph::load_existing`] next, never both.
    pub fn new(dir: &mut Directory, cfg: GraphConfig) -> Self {
        let nodes = dir.create_sized("nodes", cfg.segment_size);
        let edges = dir.create_sized("edges", cfg.segment_size);
        let geometry = dir.create_sized("geometry", cfg.segment_size);

        let n_ele = N_LON + 4;
        let n_tc = n_ele + if cfg.with_elevation { 4 } else { 0 };
        let node_entry_bytes = n_tc + if cfg.with_turn_costs { 4 } else { 0 };

        let e_geo = align4(E_FLAGS + cfg.bytes_for_flags as u64);
        let edge_entry_bytes = align4(e_geo + 5);

        Self {
            nodes,
            edges,
            geometry,
            cfg,
            n_ele,
            n_tc,
            node_entry_bytes,
            e_geo,
            edge_entry_bytes,
            node_count: 0,
            edge_count: 0,
            bounds: BBox::inverse(),
            frozen: false,
            next_geo_pos: GEO_START,
        }
    }

    /// Allocates the initial segments of all graph stores.
    pub fn create(&mut self, initial_bytes: u64) -> Result<()> {
        self.nodes.create(initial_bytes)?;
        self.edges.create(initial_bytes)?;
        self.geometry.create(initial_bytes)?;
        Ok(())
    }

    /// Loads a previously flushed graph. Returns `Ok(false)` when nothing
    /// was stored; a partially present or mismatching graph is an error.
    pub fn load_existing(&mut self) -> Result<bool> {
        let nodes = self.nodes.load_existing()?;
        let edges = self.edges.load_existing()?;
        let geometry = self.geometry.load_existing()?;
        match (nodes, edges, geometry) {
            (false, false, false) => return Ok(false),
            (true, true, true) => {}
            _ => {
                return Err(SendaError::Corruption(
                    "graph stores are only partially present".to_string(),
                ))
            }
        }

        let v = self.cfg.versions;
        check_version("nodes", v.nodes, self.nodes.get_header(NH_VERSION))?;
        check_version("edges", v.edges, self.edges.get_header(EH_VERSION))?;
        check_version("geometry", v.geometry, self.geometry.get_header(GH_VERSION))?;

        let stored_node_entry = self.nodes.get_header(NH_ENTRY_BYTES);
        if stored_node_entry as u64 != self.node_entry_bytes {
            return Err(SendaError::Corruption(format!(
                "node entry width {} does not match configured {}",
                stored_node_entry, self.node_entry_bytes
            )));
        }
        let stored_elevation = self.nodes.get_header(NH_ELEVATION) == 1;
        if stored_elevation != self.cfg.with_elevation {
            return Err(SendaError::Corruption(format!(
                "configured elevation={} but loaded graph has elevation={}",
                self.cfg.with_elevation, stored_elevation
            )));
        }
        let stored_edge_entry = self.edges.get_header(EH_ENTRY_BYTES);
        if stored_edge_entry as u64 != self.edge_entry_bytes {
            return Err(SendaError::Corruption(format!(
                "edge entry width {} does not match configured {}",
                stored_edge_entry, self.edge_entry_bytes
            )));
        }
        let stored_flag_bytes = self.edges.get_header(EH_FLAG_BYTES);
        if stored_flag_bytes as usize != self.cfg.bytes_for_flags {
            return Err(SendaError::Corruption(format!(
                "flag width {} does not match configured {}",
                stored_flag_bytes, self.cfg.bytes_for_flags
            )));
        }

        self.node_count = self.nodes.get_header(NH_COUNT);
        self.edge_count = self.edges.get_header(EH_COUNT);
        self.bounds.min_lon = int_to_degree(self.nodes.get_header(NH_MIN_LON));
        self.bounds.max_lon = int_to_degree(self.nodes.get_header(NH_MAX_LON));
        self.bounds.min_lat = int_to_degree(self.nodes.get_header(NH_MIN_LAT));
        self.bounds.max_lat = int_to_degree(self.nodes.get_header(NH_MAX_LAT));
        if self.cfg.with_elevation {
            self.bounds.min_ele = int_to_ele(self.nodes.get_header(NH_MIN_ELE));
            self.bounds.max_ele = int_to_ele(self.nodes.get_header(NH_MAX_ELE));
        }
        self.frozen = self.nodes.get_header(NH_FROZEN) == 1;
        let lo = self.geometry.get_header(GH_NEXT_LO) as u32 as u64;
        let hi = self.geometry.get_header(GH_NEXT_HI) as u32 as u64;
        self.next_geo_pos = (hi << 32 | lo).max(GEO_START);
        Ok(true)
    }

    /// Writes all header slots and flushes the stores.
    pub fn flush(&mut self) -> Result<()> {
        let v = self.cfg.versions;
        self.nodes.set_header(NH_VERSION, v.nodes);
        self.nodes
            .set_header(NH_ENTRY_BYTES, self.node_entry_bytes as i32);
        self.nodes.set_header(NH_COUNT, self.node_count);
        self.nodes
            .set_header(NH_MIN_LON, degree_to_int(self.bounds.min_lon));
        self.nodes
            .set_header(NH_MAX_LON, degree_to_int(self.bounds.max_lon));
        self.nodes
            .set_header(NH_MIN_LAT, degree_to_int(self.bounds.min_lat));
        self.nodes
            .set_header(NH_MAX_LAT, degree_to_int(self.bounds.max_lat));
        self.nodes
            .set_header(NH_ELEVATION, i32::from(self.cfg.with_elevation));
        if self.cfg.with_elevation {
            self.nodes
                .set_header(NH_MIN_ELE, ele_to_int(self.bounds.min_ele));
            self.nodes
                .set_header(NH_MAX_ELE, ele_to_int(self.bounds.max_ele));
        }
        self.nodes.set_header(NH_FROZEN, i32::from(self.frozen));

        self.edges.set_header(EH_VERSION, v.edges);
        self.edges
            .set_header(EH_ENTRY_BYTES, self.edge_entry_bytes as i32);
        self.edges.set_header(EH_COUNT, self.edge_count);
        self.edges
            .set_header(EH_FLAG_BYTES, self.cfg.bytes_for_flags as i32);

        self.geometry.set_header(GH_VERSION, v.geometry);
        self.geometry
            .set_header(GH_NEXT_LO, self.next_geo_pos as u32 as i32);
        self.geometry
            .set_header(GH_NEXT_HI, (self.next_geo_pos >> 32) as i32);

        self.geometry.flush()?;
        self.edges.flush()?;
        self.nodes.flush()?;
        Ok(())
    }

    /// Releases the stores without flushing.
    pub fn close(&mut self) {
        self.geometry.close();
        self.edges.close();
        self.nodes.close();
    }

    /// The configuration this graph was built with.
    pub fn config(&self) -> &GraphConfig {
        &self.cfg
    }

    /// Number of nodes.
    pub fn node_count(&self) -> i32 {
        self.node_count
    }

    /// Number of edges.
    pub fn edge_count(&self) -> i32 {
        self.edge_count
    }

    /// The running bounding box.
    pub fn bounds(&self) -> &BBox {
        &self.bounds
    }

    /// Marks the topology as complete. CH storage requires this; adding
    /// edges afterwards panics.
    pub fn freeze(&mut self) {
        assert!(!self.frozen, "graph is already frozen");
        self.frozen = true;
    }

    /// Whether [`BaseGraph::freeze`] has been called.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn node_pointer(&self, node: i32) -> u64 {
        assert!(
            node >= 0 && node < self.node_count,
            "node {} out of bounds [0,{})",
            node,
            self.node_count
        );
        node as u64 * self.node_entry_bytes
    }

    fn edge_pointer(&self, edge: i32) -> u64 {
        assert!(
            edge >= 0 && edge < self.edge_count,
            "edge {} out of bounds [0,{})",
            edge,
            self.edge_count
        );
        edge as u64 * self.edge_entry_bytes
    }

    /// Grows node storage so `node` exists, zero-initializing new records'
    /// edge ref (and turn-cost ref) to their sentinels.
    pub fn ensure_node(&mut self, node: i32) -> Result<()> {
        assert!(node >= 0, "node ids must be non-negative, got: {node}");
        if node < self.node_count {
            return Ok(());
        }
        let old_count = self.node_count;
        self.node_count = node + 1;
        self.nodes
            .ensure_capacity(self.node_count as u64 * self.node_entry_bytes)?;
        for n in old_count..self.node_count {
            let pointer = n as u64 * self.node_entry_bytes;
            self.nodes.set_int(pointer + N_EDGE_REF, NO_EDGE);
            if self.cfg.with_turn_costs {
                self.nodes.set_int(pointer + self.n_tc, NO_TURN_ENTRY);
            }
        }
        Ok(())
    }

    /// Appends an edge between two distinct nodes and prepends it to both
    /// adjacency lists. Returns the new edge id.
    pub fn add_edge(&mut self, node_a: i32, node_b: i32) -> Result<i32> {
        assert!(!self.frozen, "graph is frozen, cannot add edges");
        assert!(
            node_a != node_b,
            "loop edges are not supported, got: {node_a} - {node_b}"
        );
        assert!(
            self.edge_count < i32::MAX,
            "maximum edge count exceeded: {}",
            self.edge_count
        );
        self.ensure_node(node_a.max(node_b))?;

        let edge = self.edge_count;
        let pointer = edge as u64 * self.edge_entry_bytes;
        self.edge_count += 1;
        self.edges
            .ensure_capacity(self.edge_count as u64 * self.edge_entry_bytes)?;

        self.edges.set_int(pointer + E_NODE_A, node_a);
        self.edges.set_int(pointer + E_NODE_B, node_b);

        let node_pointer_a = self.node_pointer(node_a);
        let edge_ref_a = self.nodes.get_int(node_pointer_a + N_EDGE_REF);
        self.edges.set_int(pointer + E_LINK_A, edge_ref_a);
        self.nodes.set_int(node_pointer_a + N_EDGE_REF, edge);

        let node_pointer_b = self.node_pointer(node_b);
        let edge_ref_b = self.nodes.get_int(node_pointer_b + N_EDGE_REF);
        self.edges.set_int(pointer + E_LINK_B, edge_ref_b);
        self.nodes.set_int(node_pointer_b + N_EDGE_REF, edge);

        Ok(edge)
    }

    /// The edges touching `node`, via the intrusive adjacency list.
    pub fn incident_edges(&self, node: i32) -> IncidentEdges<'_> {
        let pointer = self.node_pointer(node);
        IncidentEdges {
            graph: self,
            node,
            next: self.nodes.get_int(pointer + N_EDGE_REF),
        }
    }

    /// Sets a node's coordinate, growing node storage if needed and
    /// widening the bounding box.
    pub fn set_node(&mut self, node: i32, lat: f64, lon: f64) -> Result<()> {
        self.ensure_node(node)?;
        let pointer = self.node_pointer(node);
        self.nodes.set_int(pointer + N_LAT, degree_to_int(lat));
        self.nodes.set_int(pointer + N_LON, degree_to_int(lon));
        self.bounds.update(lat, lon);
        Ok(())
    }

    /// Sets a node's coordinate and elevation (3D graphs only).
    pub fn set_node_3d(&mut self, node: i32, lat: f64, lon: f64, ele: f64) -> Result<()> {
        assert!(
            self.cfg.with_elevation,
            "graph was configured without elevation"
        );
        self.set_node(node, lat, lon)?;
        let pointer = self.node_pointer(node);
        self.nodes.set_int(pointer + self.n_ele, ele_to_int(ele));
        self.bounds.update_ele(ele);
        Ok(())
    }

    /// A node's latitude in degrees.
    pub fn lat(&self, node: i32) -> f64 {
        int_to_degree(self.nodes.get_int(self.node_pointer(node) + N_LAT))
    }

    /// A node's longitude in degrees.
    pub fn lon(&self, node: i32) -> f64 {
        int_to_degree(self.nodes.get_int(self.node_pointer(node) + N_LON))
    }

    /// A node's elevation in meters (3D graphs only).
    pub fn ele(&self, node: i32) -> f64 {
        assert!(
            self.cfg.with_elevation,
            "graph was configured without elevation"
        );
        int_to_ele(self.nodes.get_int(self.node_pointer(node) + self.n_ele))
    }

    /// A node's turn-cost reference.
    pub fn turn_cost_ref(&self, node: i32) -> i32 {
        assert!(
            self.cfg.with_turn_costs,
            "graph was configured without turn costs"
        );
        self.nodes.get_int(self.node_pointer(node) + self.n_tc)
    }

    /// Sets a node's turn-cost reference.
    pub fn set_turn_cost_ref(&mut self, node: i32, tc_ref: i32) {
        assert!(
            self.cfg.with_turn_costs,
            "graph was configured without turn costs"
        );
        let pointer = self.node_pointer(node);
        self.nodes.set_int(pointer + self.n_tc, tc_ref);
    }

    /// Both endpoints of an edge, in stored order.
    pub fn edge_nodes(&self, edge: i32) -> (i32, i32) {
        let pointer = self.edge_pointer(edge);
        (
            self.edges.get_int(pointer + E_NODE_A),
            self.edges.get_int(pointer + E_NODE_B),
        )
    }

    /// Sets an edge's distance in meters (quantized to millimeters,
    /// saturating at [`MAX_DIST_METERS`](crate::scale::MAX_DIST_METERS)).
    pub fn set_dist(&mut self, edge: i32, meters: f64) {
        let pointer = self.edge_pointer(edge);
        self.edges.set_int(pointer + E_DIST, dist_to_mm(meters));
    }

    /// An edge's distance in meters.
    pub fn dist(&self, edge: i32) -> f64 {
        mm_to_dist(self.edges.get_int(self.edge_pointer(edge) + E_DIST))
    }

    /// Sets an edge's key-value reference.
    pub fn set_kv_ref(&mut self, edge: i32, kv_ref: i32) {
        let pointer = self.edge_pointer(edge);
        self.edges.set_int(pointer + E_KV, kv_ref);
    }

    /// An edge's key-value reference.
    pub fn kv_ref(&self, edge: i32) -> i32 {
        self.edges.get_int(self.edge_pointer(edge) + E_KV)
    }

    /// Number of 32-bit words in the flags field.
    pub fn flag_words(&self) -> usize {
        self.cfg.bytes_for_flags.div_ceil(4)
    }

    /// Writes the flag words of an edge. Partial tail words must fit the
    /// remaining byte width.
    pub fn set_flags(&mut self, edge: i32, words: &[u32]) {
        assert_eq!(
            words.len(),
            self.flag_words(),
            "expected {} flag words",
            self.flag_words()
        );
        let pointer = self.edge_pointer(edge);
        for (i, &word) in words.iter().enumerate() {
            self.set_flag_word(pointer, i * 4, word);
        }
    }

    /// Reads the flag words of an edge.
    pub fn flags(&self, edge: i32) -> SmallVec<[u32; 2]> {
        let pointer = self.edge_pointer(edge);
        (0..self.flag_words())
            .map(|i| self.flag_word(pointer, i * 4))
            .collect()
    }

    fn set_flag_word(&mut self, edge_pointer: u64, byte_offset: usize, value: u32) {
        let width = self.cfg.bytes_for_flags;
        assert!(byte_offset < width, "flag offset {byte_offset} out of {width} bytes");
        let at = edge_pointer + E_FLAGS + byte_offset as u64;
        match width - byte_offset {
            1 => {
                assert!(
                    value <= 0xFF,
                    "flag word at offset {byte_offset} exceeds its single byte: {value:#x}"
                );
                self.edges.set_byte(at, value as u8);
            }
            2 => {
                assert!(
                    value <= 0xFFFF,
                    "flag word at offset {byte_offset} exceeds its two bytes: {value:#x}"
                );
                self.edges.set_short(at, value as u16 as i16);
            }
            3 => {
                assert!(
                    value <= 0xFF_FFFF,
                    "flag word at offset {byte_offset} exceeds its three bytes: {value:#x}"
                );
                self.edges.set_short(at, (value & 0xFFFF) as u16 as i16);
                self.edges.set_byte(at + 2, (value >> 16) as u8);
            }
            _ => self.edges.set_int(at, value as i32),
        }
    }

    fn flag_word(&self, edge_pointer: u64, byte_offset: usize) -> u32 {
        let width = self.cfg.bytes_for_flags;
        assert!(byte_offset < width, "flag offset {byte_offset} out of {width} bytes");
        let at = edge_pointer + E_FLAGS + byte_offset as u64;
        match width - byte_offset {
            1 => u32::from(self.edges.get_byte(at)),
            2 => u32::from(self.edges.get_short(at) as u16),
            3 => {
                u32::from(self.edges.get_short(at) as u16)
                    | u32::from(self.edges.get_byte(at + 2)) << 16
            }
            _ => self.edges.get_int(at) as u32,
        }
    }

    /// Stores an edge's geometry reference: a signed 40-bit value kept as
    /// 4 + 1 bytes.
    pub fn set_geo_ref(&mut self, edge: i32, geo_ref: i64) {
        let high = geo_ref >> 39;
        assert!(
            high == 0 || high == -1,
            "geo ref {geo_ref} outside the signed 40-bit range"
        );
        let pointer = self.edge_pointer(edge);
        self.edges.set_int(pointer + self.e_geo, geo_ref as i32);
        self.edges
            .set_byte(pointer + self.e_geo + 4, (geo_ref >> 32) as u8);
    }

    /// An edge's geometry reference.
    pub fn geo_ref(&self, edge: i32) -> i64 {
        let pointer = self.edge_pointer(edge);
        let low = i64::from(self.edges.get_int(pointer + self.e_geo) as u32);
        let high = i64::from(self.edges.get_byte(pointer + self.e_geo + 4) as i8);
        high << 32 | low
    }

    /// Stores the pillar points of an edge, in base-to-adjacent order, and
    /// points the edge's geo ref at them.
    pub fn set_way_geometry(&mut self, edge: i32, points: &[GeoPoint]) -> Result<()> {
        if points.is_empty() {
            self.set_geo_ref(edge, 0);
            return Ok(());
        }
        let dims: u64 = if self.cfg.with_elevation { 3 } else { 2 };
        let position = self.next_geo_pos;
        let record_bytes = 4 * (1 + points.len() as u64 * dims);
        self.geometry.ensure_capacity(position + record_bytes)?;
        self.geometry.set_int(position, points.len() as i32);
        let mut at = position + 4;
        for point in points {
            self.geometry.set_int(at, degree_to_int(point.lat));
            self.geometry.set_int(at + 4, degree_to_int(point.lon));
            if self.cfg.with_elevation {
                self.geometry.set_int(at + 8, ele_to_int(point.ele));
            }
            at += dims * 4;
        }
        self.next_geo_pos = position + record_bytes;
        self.set_geo_ref(edge, position as i64);
        Ok(())
    }

    /// Reads back an edge's pillar points; empty when the edge has none.
    pub fn way_geometry(&self, edge: i32) -> Vec<GeoPoint> {
        let geo_ref = self.geo_ref(edge);
        if geo_ref == 0 {
            return Vec::new();
        }
        let dims: u64 = if self.cfg.with_elevation { 3 } else { 2 };
        let position = geo_ref as u64;
        let count = self.geometry.get_int(position);
        let mut points = Vec::with_capacity(count as usize);
        let mut at = position + 4;
        for _ in 0..count {
            let lat = int_to_degree(self.geometry.get_int(at));
            let lon = int_to_degree(self.geometry.get_int(at + 4));
            let ele = if self.cfg.with_elevation {
                int_to_ele(self.geometry.get_int(at + 8))
            } else {
                0.0
            };
            points.push(GeoPoint { lat, lon, ele });
            at += dims * 4;
        }
        points
    }

    fn read_edge_record(&self, pointer: u64) -> EdgeRecord {
        EdgeRecord {
            node_a: self.edges.get_int(pointer + E_NODE_A),
            node_b: self.edges.get_int(pointer + E_NODE_B),
            link_a: self.edges.get_int(pointer + E_LINK_A),
            link_b: self.edges.get_int(pointer + E_LINK_B),
            dist_mm: self.edges.get_int(pointer + E_DIST),
            kv_ref: self.edges.get_int(pointer + E_KV),
            flags: (0..self.flag_words())
                .map(|i| self.flag_word(pointer, i * 4))
                .collect(),
            geo_ref: {
                let low = i64::from(self.edges.get_int(pointer + self.e_geo) as u32);
                let high = i64::from(self.edges.get_byte(pointer + self.e_geo + 4) as i8);
                high << 32 | low
            },
        }
    }

    fn write_edge_record(
        &mut self,
        pointer: u64,
        record: &EdgeRecord,
        map_link: &dyn Fn(i32) -> i32,
    ) {
        self.edges.set_int(pointer + E_NODE_A, record.node_a);
        self.edges.set_int(pointer + E_NODE_B, record.node_b);
        let link_a = if record.link_a == NO_EDGE {
            NO_EDGE
        } else {
            map_link(record.link_a)
        };
        let link_b = if record.link_b == NO_EDGE {
            NO_EDGE
        } else {
            map_link(record.link_b)
        };
        self.edges.set_int(pointer + E_LINK_A, link_a);
        self.edges.set_int(pointer + E_LINK_B, link_b);
        self.edges.set_int(pointer + E_DIST, record.dist_mm);
        self.edges.set_int(pointer + E_KV, record.kv_ref);
        for (i, &word) in record.flags.iter().enumerate() {
            self.set_flag_word(pointer, i * 4, word);
        }
        self.edges.set_int(pointer + self.e_geo, record.geo_ref as i32);
        self.edges
            .set_byte(pointer + self.e_geo + 4, (record.geo_ref >> 32) as u8);
    }

    /// Applies an edge-id permutation in place: every record moves to its
    /// new id and all links and edge refs are rewritten through the map.
    pub fn sort_edges(&mut self, new_edge_for_old: &dyn Fn(i32) -> i32) {
        assert!(!self.frozen, "graph is frozen, cannot permute edges");
        let mut visited = vec![false; self.edge_count as usize];
        for edge in 0..self.edge_count {
            if visited[edge as usize] {
                continue;
            }
            let mut current = edge;
            let mut record = self.read_edge_record(self.edge_pointer(current));
            loop {
                visited[current as usize] = true;
                let new_edge = new_edge_for_old(current);
                let new_pointer = self.edge_pointer(new_edge);
                let displaced = self.read_edge_record(new_pointer);
                self.write_edge_record(new_pointer, &record, new_edge_for_old);
                record = displaced;
                current = new_edge;
                if current == edge {
                    break;
                }
            }
        }
        for node in 0..self.node_count {
            let pointer = self.node_pointer(node);
            let edge_ref = self.nodes.get_int(pointer + N_EDGE_REF);
            if edge_ref != NO_EDGE {
                self.nodes
                    .set_int(pointer + N_EDGE_REF, new_edge_for_old(edge_ref));
            }
        }
    }

    /// Applies a node-id permutation in place: endpoints are rewritten
    /// through the map and every node record moves to its new id.
    pub fn relabel_nodes(&mut self, new_node_for_old: &dyn Fn(i32) -> i32) {
        assert!(!self.frozen, "graph is frozen, cannot permute nodes");
        for edge in 0..self.edge_count {
            let pointer = self.edge_pointer(edge);
            let node_a = self.edges.get_int(pointer + E_NODE_A);
            let node_b = self.edges.get_int(pointer + E_NODE_B);
            self.edges.set_int(pointer + E_NODE_A, new_node_for_old(node_a));
            self.edges.set_int(pointer + E_NODE_B, new_node_for_old(node_b));
        }
        let mut visited = vec![false; self.node_count as usize];
        for node in 0..self.node_count {
            if visited[node as usize] {
                continue;
            }
            let mut current = node;
            let mut record = self.read_node_record(self.node_pointer(current));
            loop {
                visited[current as usize] = true;
                let new_node = new_node_for_old(current);
                let new_pointer = self.node_pointer(new_node);
                let displaced = self.read_node_record(new_pointer);
                self.write_node_record(new_pointer, record);
                record = displaced;
                current = new_node;
                if current == node {
                    break;
                }
            }
        }
    }

    // raw node record image: edge ref, lat, lon, optional ele and tc
    fn read_node_record(&self, pointer: u64) -> [i32; 5] {
        [
            self.nodes.get_int(pointer + N_EDGE_REF),
            self.nodes.get_int(pointer + N_LAT),
            self.nodes.get_int(pointer + N_LON),
            if self.cfg.with_elevation {
                self.nodes.get_int(pointer + self.n_ele)
            } else {
                0
            },
            if self.cfg.with_turn_costs {
                self.nodes.get_int(pointer + self.n_tc)
            } else {
                0
            },
        ]
    }

    fn write_node_record(&mut self, pointer: u64, record: [i32; 5]) {
        self.nodes.set_int(pointer + N_EDGE_REF, record[0]);
        self.nodes.set_int(pointer + N_LAT, record[1]);
        self.nodes.set_int(pointer + N_LON, record[2]);
        if self.cfg.with_elevation {
            self.nodes.set_int(pointer + self.n_ele, record[3]);
        }
        if self.cfg.with_turn_costs {
            self.nodes.set_int(pointer + self.n_tc, record[4]);
        }
    }

    pub(crate) fn node_edge_ref(&self, node: i32) -> i32 {
        self.nodes.get_int(self.node_pointer(node) + N_EDGE_REF)
    }
}

fn check_version(name: &str, expected: i32, found: i32) -> Result<()> {
    if expected != found {
        return Err(SendaError::Corruption(format!(
            "store {name}: version {found} does not match expected {expected}"
        )));
    }
    Ok(())
}
