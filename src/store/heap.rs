use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::store::{
    BackendKind, ByteStore, SegmentLayout, StoreHeader, HEADER_OFFSET, HEADER_SLOTS,
};

/// Heap-backed store: a resizable directory of fixed-size byte segments.
///
/// When constructed with a backing path, flush persists header and segments
/// to the file and `load_existing` restores them. Growth only ever
/// reallocates the segment directory, never the segment buffers, so a
/// non-storing instance is safe for concurrent reads once construction has
/// finished.
pub struct HeapStore {
    name: String,
    path: Option<PathBuf>,
    store: bool,
    layout: SegmentLayout,
    segments: Vec<Box<[u8]>>,
    header: [i32; HEADER_SLOTS],
    closed: bool,
}

impl HeapStore {
    /// Creates a handle. `location` is the directory holding the backing
    /// file; it is required when `store` is true.
    pub fn new(name: &str, location: Option<&Path>, store: bool, segment_size: u32) -> Self {
        assert!(
            !store || location.is_some(),
            "storing heap store {name} needs a location"
        );
        Self {
            name: name.to_string(),
            path: location.map(|loc| loc.join(name)),
            store,
            layout: SegmentLayout::new(segment_size),
            segments: Vec::new(),
            header: [0; HEADER_SLOTS],
            closed: false,
        }
    }

    /// A purely in-memory store that never touches disk.
    pub fn in_memory(name: &str, segment_size: u32) -> Self {
        Self::new(name, None, false, segment_size)
    }

    fn backing_path(&self) -> &Path {
        self.path
            .as_deref()
            .expect("storing heap store has a path")
    }

    fn assert_usable(&self) {
        assert!(!self.closed, "store {} already closed", self.name);
        assert!(
            !self.segments.is_empty(),
            "store {}: call create or load_existing before access",
            self.name
        );
    }
}

impl ByteStore for HeapStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        if self.store {
            BackendKind::HeapStore
        } else {
            BackendKind::Heap
        }
    }

    fn is_storing(&self) -> bool {
        self.store
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn segment_size(&self) -> u32 {
        self.layout.size()
    }

    fn segments(&self) -> usize {
        self.segments.len()
    }

    fn capacity(&self) -> u64 {
        self.segments.len() as u64 * u64::from(self.layout.size())
    }

    fn create(&mut self, bytes: u64) -> Result<()> {
        assert!(!self.closed, "store {} already closed", self.name);
        assert!(
            self.segments.is_empty(),
            "store {} already created",
            self.name
        );
        self.ensure_capacity(bytes.max(1))?;
        Ok(())
    }

    fn load_existing(&mut self) -> Result<bool> {
        assert!(!self.closed, "store {} already closed", self.name);
        assert!(
            self.segments.is_empty(),
            "store {} already initialized",
            self.name
        );
        if !self.store {
            return Ok(false);
        }
        let path = self.backing_path().to_path_buf();
        match fs::metadata(&path) {
            Err(_) => return Ok(false),
            Ok(meta) if meta.len() == 0 => return Ok(false),
            Ok(_) => {}
        }
        let mut file = File::open(&path)?;
        let header = StoreHeader::read_from(&mut file, &self.name)?;
        self.layout = SegmentLayout::new(header.segment_size as u32);
        self.header = header.slots;
        let segment_count = self.layout.segments_for(header.length as u64);
        file.seek(SeekFrom::Start(HEADER_OFFSET))?;
        let mut segments = Vec::with_capacity(segment_count);
        for _ in 0..segment_count {
            let mut segment = vec![0u8; self.layout.size() as usize].into_boxed_slice();
            file.read_exact(&mut segment)?;
            segments.push(segment);
        }
        self.segments = segments;
        Ok(true)
    }

    fn ensure_capacity(&mut self, bytes: u64) -> Result<bool> {
        assert!(!self.closed, "store {} already closed", self.name);
        let want = self.layout.segments_for(bytes);
        if want <= self.segments.len() {
            return Ok(false);
        }
        self.segments.resize_with(want, || {
            vec![0u8; self.layout.size() as usize].into_boxed_slice()
        });
        Ok(true)
    }

    fn trim_to(&mut self, bytes: u64) -> Result<()> {
        self.assert_usable();
        let keep = self.layout.segments_for(bytes);
        if keep < self.segments.len() {
            self.segments.truncate(keep);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        assert!(!self.closed, "store {} already closed", self.name);
        if !self.store {
            return Ok(());
        }
        let path = self.backing_path().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let header = StoreHeader {
            length: self.capacity() as i64,
            segment_size: self.layout.size() as i32,
            slots: self.header,
        };
        header.write_to(&mut file)?;
        file.seek(SeekFrom::Start(HEADER_OFFSET))?;
        for segment in &self.segments {
            file.write_all(segment)?;
        }
        file.set_len(HEADER_OFFSET + self.capacity())?;
        file.sync_all()?;
        Ok(())
    }

    fn close(&mut self) {
        assert!(!self.closed, "store {} already closed", self.name);
        self.segments = Vec::new();
        self.closed = true;
    }

    fn get_int(&self, pos: u64) -> i32 {
        self.assert_usable();
        let (seg, off) = self.layout.locate(pos, 4);
        i32::from_le_bytes(
            self.segments[seg][off..off + 4]
                .try_into()
                .expect("slice is 4 bytes"),
        )
    }

    fn set_int(&mut self, pos: u64, value: i32) {
        self.assert_usable();
        let (seg, off) = self.layout.locate(pos, 4);
        self.segments[seg][off..off + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn get_short(&self, pos: u64) -> i16 {
        self.assert_usable();
        let (seg, off) = self.layout.locate(pos, 2);
        i16::from_le_bytes(
            self.segments[seg][off..off + 2]
                .try_into()
                .expect("slice is 2 bytes"),
        )
    }

    fn set_short(&mut self, pos: u64, value: i16) {
        self.assert_usable();
        let (seg, off) = self.layout.locate(pos, 2);
        self.segments[seg][off..off + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn get_byte(&self, pos: u64) -> u8 {
        self.assert_usable();
        let (seg, off) = self.layout.split(pos);
        self.segments[seg][off]
    }

    fn set_byte(&mut self, pos: u64, value: u8) {
        self.assert_usable();
        let (seg, off) = self.layout.split(pos);
        self.segments[seg][off] = value;
    }

    fn get_bytes(&self, pos: u64, out: &mut [u8]) {
        self.assert_usable();
        let size = self.layout.size() as usize;
        assert!(
            out.len() <= size,
            "byte range of {} exceeds segment size {}",
            out.len(),
            size
        );
        let (seg, off) = self.layout.split(pos);
        let first = (size - off).min(out.len());
        out[..first].copy_from_slice(&self.segments[seg][off..off + first]);
        if first < out.len() {
            let rest = out.len() - first;
            out[first..].copy_from_slice(&self.segments[seg + 1][..rest]);
        }
    }

    fn set_bytes(&mut self, pos: u64, values: &[u8]) {
        self.assert_usable();
        let size = self.layout.size() as usize;
        assert!(
            values.len() <= size,
            "byte range of {} exceeds segment size {}",
            values.len(),
            size
        );
        let (seg, off) = self.layout.split(pos);
        let first = (size - off).min(values.len());
        self.segments[seg][off..off + first].copy_from_slice(&values[..first]);
        if first < values.len() {
            let rest = values.len() - first;
            self.segments[seg + 1][..rest].copy_from_slice(&values[first..]);
        }
    }

    fn get_header(&self, slot: usize) -> i32 {
        self.header[slot]
    }

    fn set_header(&mut self, slot: usize, value: i32) {
        self.header[slot] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn create_allocates_at_least_one_segment() {
        let mut store = HeapStore::in_memory("nodes", 128);
        store.create(0).expect("create");
        assert_eq!(store.segments(), 1);
        assert_eq!(store.capacity(), 128);
    }

    #[test]
    #[should_panic(expected = "already created")]
    fn double_create_panics() {
        let mut store = HeapStore::in_memory("nodes", 128);
        store.create(16).expect("create");
        let _ = store.create(16);
    }

    #[test]
    #[should_panic(expected = "already closed")]
    fn double_close_panics() {
        let mut store = HeapStore::in_memory("nodes", 128);
        store.create(16).expect("create");
        store.close();
        store.close();
    }

    #[test]
    fn ensure_capacity_grows_by_whole_segments() {
        let mut store = HeapStore::in_memory("edges", 128);
        store.create(1).expect("create");
        assert!(!store.ensure_capacity(100).expect("no growth"));
        assert!(store.ensure_capacity(129).expect("growth"));
        assert_eq!(store.capacity(), 256);
    }

    #[test]
    fn values_survive_growth() {
        let mut store = HeapStore::in_memory("edges", 128);
        store.create(128).expect("create");
        store.set_int(4, -77);
        store.ensure_capacity(1024).expect("grow");
        assert_eq!(store.get_int(4), -77);
    }

    #[test]
    fn trim_releases_trailing_segments() {
        let mut store = HeapStore::in_memory("edges", 128);
        store.create(512).expect("create");
        assert_eq!(store.segments(), 4);
        store.trim_to(130).expect("trim");
        assert_eq!(store.segments(), 2);
    }

    #[test]
    fn flush_and_load_roundtrip() {
        let dir = tempdir().expect("temp dir");
        {
            let mut store = HeapStore::new("nodes", Some(dir.path()), true, 128);
            store.create(300).expect("create");
            store.set_int(0, 42);
            store.set_int(252, 7);
            store.set_header(3, 99);
            store.flush().expect("flush");
            store.close();
        }
        let mut store = HeapStore::new("nodes", Some(dir.path()), true, 4096);
        assert!(store.load_existing().expect("load"));
        // segment size is recovered from the file, not the configuration
        assert_eq!(store.segment_size(), 128);
        assert_eq!(store.segments(), 3);
        assert_eq!(store.get_int(0), 42);
        assert_eq!(store.get_int(252), 7);
        assert_eq!(store.get_header(3), 99);
    }

    #[test]
    fn load_missing_file_returns_false() {
        let dir = tempdir().expect("temp dir");
        let mut store = HeapStore::new("absent", Some(dir.path()), true, 128);
        assert!(!store.load_existing().expect("load"));
    }

    #[test]
    fn load_without_marker_is_corruption() {
        let dir = tempdir().expect("temp dir");
        std::fs::write(dir.path().join("bad"), vec![0xAB; 256]).expect("write junk");
        let mut store = HeapStore::new("bad", Some(dir.path()), true, 128);
        let err = store.load_existing().unwrap_err();
        assert!(err.to_string().contains("invalid format marker"));
    }

    #[test]
    fn non_storing_flush_is_noop_and_load_reports_nothing() {
        let mut store = HeapStore::in_memory("scratch", 128);
        assert!(!store.load_existing().expect("load"));
        store.create(16).expect("create");
        store.flush().expect("flush");
    }

    proptest! {
        #[test]
        fn byte_ranges_straddle_one_boundary(
            off in 0usize..128,
            len in 1usize..=128,
            fill in any::<u8>(),
        ) {
            let mut store = HeapStore::in_memory("prop", 128);
            store.create(256).expect("create");
            let values: Vec<u8> = (0..len).map(|i| fill.wrapping_add(i as u8)).collect();
            store.set_bytes(off as u64, &values);
            let mut out = vec![0u8; len];
            store.get_bytes(off as u64, &mut out);
            prop_assert_eq!(out, values);
        }
    }
}
