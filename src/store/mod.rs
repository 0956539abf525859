//! Segmented, growable byte stores.
//!
//! A store owns an ordered list of fixed-size power-of-two segments and is
//! addressed by logical byte position. Capacity only ever grows, by whole
//! segments, so existing data never moves. Each store carries a small typed
//! header (marker, logical length, segment size, 20 application slots) that
//! is persisted on flush and validated on load.
//!
//! Three backends implement the same contract: [`HeapStore`] (plain memory,
//! optionally persisted), [`MmapStore`] (memory-mapped file), and
//! [`ArenaStore`] (manually managed off-heap memory). All three produce
//! byte-identical files, so a file written by one backend loads in another.

mod arena;
mod header;
mod heap;
mod mmap;
mod shared;

pub use arena::ArenaStore;
pub use heap::HeapStore;
pub use mmap::MmapStore;
pub use shared::SharedStore;

pub(crate) use header::StoreHeader;
pub use header::HEADER_OFFSET;

use crate::error::Result;

/// Smallest allowed segment size in bytes.
pub const MIN_SEGMENT_SIZE: u32 = 128;
/// Segment size used when the caller does not pick one.
pub const DEFAULT_SEGMENT_SIZE: u32 = 1 << 20;
/// Number of 32-bit application header slots per store.
pub const HEADER_SLOTS: usize = 20;

/// Selects the backend implementation for a named store.
///
/// The `*Store` variants persist their contents on [`ByteStore::flush`];
/// `Heap` and `Arena` are purely in-memory and lose everything on close.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BackendKind {
    /// Heap segments, discarded on close.
    Heap,
    /// Heap segments, persisted to a file on flush.
    HeapStore,
    /// Memory-mapped file segments (always backed by a file).
    Mmap,
    /// Off-heap segments, discarded on close.
    Arena,
    /// Off-heap segments, persisted to a file on flush.
    ArenaStore,
}

impl BackendKind {
    /// Whether flush writes the contents to disk.
    pub fn is_storing(self) -> bool {
        matches!(
            self,
            BackendKind::HeapStore | BackendKind::Mmap | BackendKind::ArenaStore
        )
    }

    /// The closest variant that works without a backing location.
    pub fn in_memory_variant(self) -> Self {
        match self {
            BackendKind::Heap | BackendKind::HeapStore | BackendKind::Mmap => BackendKind::Heap,
            BackendKind::Arena | BackendKind::ArenaStore => BackendKind::Arena,
        }
    }
}

/// Maps logical byte positions onto (segment, offset) pairs.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SegmentLayout {
    size: u32,
    power: u32,
}

impl SegmentLayout {
    pub(crate) fn new(segment_size: u32) -> Self {
        assert!(
            segment_size >= MIN_SEGMENT_SIZE,
            "segment size {segment_size} below minimum {MIN_SEGMENT_SIZE}"
        );
        assert!(
            segment_size.is_power_of_two(),
            "segment size {segment_size} is not a power of two"
        );
        Self {
            size: segment_size,
            power: segment_size.trailing_zeros(),
        }
    }

    pub(crate) fn size(&self) -> u32 {
        self.size
    }

    /// Locates a fixed-width access. The value must lie inside one segment;
    /// record layouts are padded so that this always holds.
    pub(crate) fn locate(&self, pos: u64, width: usize) -> (usize, usize) {
        let (seg, off) = self.split(pos);
        assert!(
            off + width <= self.size as usize,
            "{width}-byte access at position {pos} straddles a segment boundary"
        );
        (seg, off)
    }

    /// Locates a byte-range access, which may cross one segment boundary.
    pub(crate) fn split(&self, pos: u64) -> (usize, usize) {
        let seg = (pos >> self.power) as usize;
        let off = (pos & (u64::from(self.size) - 1)) as usize;
        (seg, off)
    }

    /// Number of segments needed to hold `bytes`.
    pub(crate) fn segments_for(&self, bytes: u64) -> usize {
        (bytes.div_ceil(u64::from(self.size))) as usize
    }
}

/// The segmented byte store contract shared by all backends.
///
/// Fixed-width accessors (`int`, `short`) must not straddle a segment
/// boundary; byte-range accessors may cross exactly one. Accessors never
/// grow the store: capacity must have been ensured beforehand, and writing
/// past it is a bounds violation (panic), not an auto-grow.
///
/// Thread safety is backend-specific: a non-storing [`HeapStore`] may be
/// read from multiple threads once construction is finished, while
/// [`MmapStore`] and [`ArenaStore`] are not safe for any concurrent use.
/// [`SharedStore`] serializes access for callers that need sharing.
pub trait ByteStore {
    /// The logical name this store was created under.
    fn name(&self) -> &str;

    /// The backend implementing this store.
    fn kind(&self) -> BackendKind;

    /// Whether flush persists the contents.
    fn is_storing(&self) -> bool;

    /// Whether close has been called.
    fn is_closed(&self) -> bool;

    /// Segment size in bytes.
    fn segment_size(&self) -> u32;

    /// Number of allocated segments.
    fn segments(&self) -> usize;

    /// Current capacity in bytes (always a multiple of the segment size).
    fn capacity(&self) -> u64;

    /// Allocates the initial segments. Must be called exactly once, and
    /// never after [`ByteStore::load_existing`]; a second call panics.
    fn create(&mut self, bytes: u64) -> Result<()>;

    /// Loads previously flushed data. Returns `Ok(false)` when no prior
    /// data exists; a present file with a bad marker or header is a
    /// [`SendaError::Corruption`](crate::SendaError::Corruption) error.
    fn load_existing(&mut self) -> Result<bool>;

    /// Grows the store by whole segments until `capacity() >= bytes`.
    /// Returns whether the capacity changed. Never shrinks.
    fn ensure_capacity(&mut self, bytes: u64) -> Result<bool>;

    /// Releases trailing segments beyond `bytes` immediately. Does not
    /// check whether the dropped range is still referenced.
    fn trim_to(&mut self, bytes: u64) -> Result<()>;

    /// Writes the header and forces the contents to the backing medium.
    /// A no-op for non-storing configurations.
    fn flush(&mut self) -> Result<()>;

    /// Releases backend resources without an implicit flush. Closing twice
    /// panics.
    fn close(&mut self);

    /// Reads a little-endian `i32` at `pos`.
    fn get_int(&self, pos: u64) -> i32;

    /// Writes a little-endian `i32` at `pos`.
    fn set_int(&mut self, pos: u64, value: i32);

    /// Reads a little-endian `i16` at `pos`.
    fn get_short(&self, pos: u64) -> i16;

    /// Writes a little-endian `i16` at `pos`.
    fn set_short(&mut self, pos: u64, value: i16);

    /// Reads the byte at `pos`.
    fn get_byte(&self, pos: u64) -> u8;

    /// Writes the byte at `pos`.
    fn set_byte(&mut self, pos: u64, value: u8);

    /// Reads `out.len()` bytes starting at `pos`. The range may cross one
    /// segment boundary but must not exceed the segment size.
    fn get_bytes(&self, pos: u64, out: &mut [u8]);

    /// Writes `values` starting at `pos`, with the same range rules as
    /// [`ByteStore::get_bytes`].
    fn set_bytes(&mut self, pos: u64, values: &[u8]);

    /// Reads application header slot `slot` (0-based, < [`HEADER_SLOTS`]).
    fn get_header(&self, slot: usize) -> i32;

    /// Writes application header slot `slot`.
    fn set_header(&mut self, slot: usize, value: i32);

    /// Copies header slots and contents into `other`, which may use a
    /// different backend and a different segment size.
    fn copy_to(&self, other: &mut dyn ByteStore) -> Result<()> {
        for slot in 0..HEADER_SLOTS {
            other.set_header(slot, self.get_header(slot));
        }
        let cap = self.capacity();
        other.ensure_capacity(cap)?;
        // chunks are aligned to the smaller segment size, so neither side
        // ever crosses a boundary
        let chunk = self.segment_size().min(other.segment_size()) as usize;
        let mut buf = vec![0u8; chunk];
        let mut pos = 0u64;
        while pos < cap {
            let n = chunk.min((cap - pos) as usize);
            self.get_bytes(pos, &mut buf[..n]);
            other.set_bytes(pos, &buf[..n]);
            pos += n as u64;
        }
        Ok(())
    }
}
