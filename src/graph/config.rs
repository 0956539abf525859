use crate::store::DEFAULT_SEGMENT_SIZE;

/// Expected format versions, one per store type, written to header slot 0
/// of each store and validated on load. Passed in through [`GraphConfig`]
/// rather than read from global state so tests can exercise mismatches.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FormatVersions {
    /// Node store version.
    pub nodes: i32,
    /// Edge store version.
    pub edges: i32,
    /// Way-geometry store version.
    pub geometry: i32,
    /// Turn-cost store version.
    pub turn_costs: i32,
    /// CH node store version.
    pub nodes_ch: i32,
    /// CH shortcut store version.
    pub shortcuts: i32,
}

impl Default for FormatVersions {
    fn default() -> Self {
        Self {
            nodes: 1,
            edges: 1,
            geometry: 1,
            turn_costs: 1,
            nodes_ch: 1,
            shortcuts: 1,
        }
    }
}

/// Configuration supplied when building a [`BaseGraph`](super::BaseGraph).
///
/// The record layouts are derived from these switches, so a graph must be
/// loaded with the same configuration it was created with; mismatches are
/// detected against the stored entry widths.
#[derive(Clone, Copy, Debug)]
pub struct GraphConfig {
    /// Store a per-node elevation and track elevation bounds.
    pub with_elevation: bool,
    /// Reserve a per-node turn-cost reference.
    pub with_turn_costs: bool,
    /// Width of the per-edge flags field in bytes.
    pub bytes_for_flags: usize,
    /// Segment size for all graph stores.
    pub segment_size: u32,
    /// Format versions to write and expect.
    pub versions: FormatVersions,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            with_elevation: false,
            with_turn_costs: false,
            bytes_for_flags: 4,
            segment_size: DEFAULT_SEGMENT_SIZE,
            versions: FormatVersions::default(),
        }
    }
}

impl GraphConfig {
    /// Starts from the defaults: 2D, no turn costs, 4 flag bytes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables per-node elevation.
    pub fn with_elevation(mut self, enabled: bool) -> Self {
        self.with_elevation = enabled;
        self
    }

    /// Enables per-node turn-cost references.
    pub fn with_turn_costs(mut self, enabled: bool) -> Self {
        self.with_turn_costs = enabled;
        self
    }

    /// Sets the per-edge flags width in bytes (at least 1).
    pub fn bytes_for_flags(mut self, bytes: usize) -> Self {
        assert!(bytes >= 1, "flags need at least one byte");
        self.bytes_for_flags = bytes;
        self
    }

    /// Sets the segment size for the graph stores.
    pub fn segment_size(mut self, bytes: u32) -> Self {
        self.segment_size = bytes;
        self
    }

    /// Overrides the expected format versions.
    pub fn versions(mut self, versions: FormatVersions) -> Self {
        self.versions = versions;
        self
    }
}
