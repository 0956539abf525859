//! Disk-backed, segment-addressed storage for routing graphs.
//!
//! Three layers, bottom up:
//!
//! - [`store`]: a growable, random-access byte/int store built from
//!   fixed-size power-of-two segments, with three interchangeable backends
//!   (heap, memory-mapped file, off-heap arena) that all write the same
//!   file format. [`directory::Directory`] hands out stores by name and
//!   owns their on-disk artifacts, guarded by a directory-scoped advisory
//!   lock ([`lock::DirLock`]).
//! - [`graph`]: the base routing graph. Fixed-width node and edge records
//!   with intrusive adjacency lists, a running bounding box, way geometry,
//!   and an optional turn-cost table ([`turncost`]).
//! - [`ch`]: the contraction-hierarchy overlay. Per-node levels and
//!   shortcut records layered on the frozen base graph, a builder that
//!   enforces the level-ordering invariants CH preparation depends on, and
//!   a recursive shortcut unpacker.
//!
//! Everything here is single-writer during construction and preparation;
//! see the per-backend docs for the little concurrent access that is
//! allowed afterwards.

pub mod ch;
pub mod directory;
pub mod error;
pub mod graph;
pub mod lock;
pub mod scale;
pub mod store;
pub mod turncost;

pub use ch::{ChBuilder, ChStore, ShortcutUnpacker};
pub use directory::Directory;
pub use error::{Result, SendaError};
pub use graph::{BaseGraph, GraphConfig};
pub use store::{BackendKind, ByteStore};
