use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::slice;

use crate::error::Result;
use crate::store::{
    BackendKind, ByteStore, SegmentLayout, StoreHeader, HEADER_OFFSET, HEADER_SLOTS,
};

const SEGMENT_ALIGN: usize = 8;

/// Off-heap store: segments allocated outside any Rust collection and freed
/// explicitly on close (or on drop, as a backstop).
///
/// The fastest backend and the least safe one: no concurrent use of any
/// kind is allowed. Persistence behaves exactly like [`HeapStore`]
/// persistence, so files are interchangeable between backends.
///
/// [`HeapStore`]: crate::store::HeapStore
pub struct ArenaStore {
    name: String,
    path: Option<PathBuf>,
    store: bool,
    layout: SegmentLayout,
    segments: Vec<NonNull<u8>>,
    header: [i32; HEADER_SLOTS],
    closed: bool,
}

impl ArenaStore {
    /// Creates a handle. `location` is required when `store` is true.
    pub fn new(name: &str, location: Option<&Path>, store: bool, segment_size: u32) -> Self {
        assert!(
            !store || location.is_some(),
            "storing arena store {name} needs a location"
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

    /// A purely in-memory arena that never touches disk.
    pub fn in_memory(name: &str, segment_size: u32) -> Self {
        Self::new(name, None, false, segment_size)
    }

    fn alloc_layout(&self) -> Layout {
        Layout::from_size_align(self.layout.size() as usize, SEGMENT_ALIGN)
            .expect("segment allocation layout")
    }

    fn alloc_segment(&self) -> NonNull<u8> {
        let layout = self.alloc_layout();
        let ptr = unsafe { alloc_zeroed(layout) };
        match NonNull::new(ptr) {
            Some(ptr) => ptr,
            None => handle_alloc_error(layout),
        }
    }

    fn free_segments(&mut self) {
        let layout = self.alloc_layout();
        for segment in self.segments.drain(..) {
            unsafe { dealloc(segment.as_ptr(), layout) };
        }
    }

    fn segment(&self, index: usize) -> &[u8] {
        unsafe { slice::from_raw_parts(self.segments[index].as_ptr(), self.layout.size() as usize) }
    }

    fn segment_mut(&mut self, index: usize) -> &mut [u8] {
        unsafe {
            slice::from_raw_parts_mut(self.segments[index].as_ptr(), self.layout.size() as usize)
        }
    }

    fn backing_path(&self) -> &Path {
        self.path
            .as_deref()
            .expect("storing arena store has a path")
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

impl Drop for ArenaStore {
    fn drop(&mut self) {
        if !self.closed {
            self.free_segments();
        }
    }
}

impl ByteStore for ArenaStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        if self.store {
            BackendKind::ArenaStore
        } else {
            BackendKind::Arena
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
        for index in 0..segment_count {
            self.segments.push(self.alloc_segment());
            file.read_exact(self.segment_mut(index))?;
        }
        Ok(true)
    }

    fn ensure_capacity(&mut self, bytes: u64) -> Result<bool> {
        assert!(!self.closed, "store {} already closed", self.name);
        let want = self.layout.segments_for(bytes);
        if want <= self.segments.len() {
            return Ok(false);
        }
        while self.segments.len() < want {
            let segment = self.alloc_segment();
            self.segments.push(segment);
        }
        Ok(true)
    }

    fn trim_to(&mut self, bytes: u64) -> Result<()> {
        self.assert_usable();
        let keep = self.layout.segments_for(bytes);
        let layout = self.alloc_layout();
        while self.segments.len() > keep {
            let segment = self.segments.pop().expect("segment list not empty");
            unsafe { dealloc(segment.as_ptr(), layout) };
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
        for index in 0..self.segments.len() {
            file.write_all(self.segment(index))?;
        }
        file.set_len(HEADER_OFFSET + self.capacity())?;
        file.sync_all()?;
        Ok(())
    }

    fn close(&mut self) {
        assert!(!self.closed, "store {} already closed", self.name);
        self.free_segments();
        self.closed = true;
    }

    fn get_int(&self, pos: u64) -> i32 {
        self.assert_usable();
        let (seg, off) = self.layout.locate(pos, 4);
        i32::from_le_bytes(
            self.segment(seg)[off..off + 4]
                .try_into()
                .expect("slice is 4 bytes"),
        )
    }

    fn set_int(&mut self, pos: u64, value: i32) {
        self.assert_usable();
        let (seg, off) = self.layout.locate(pos, 4);
        self.segment_mut(seg)[off..off + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn get_short(&self, pos: u64) -> i16 {
        self.assert_usable();
        let (seg, off) = self.layout.locate(pos, 2);
        i16::from_le_bytes(
            self.segment(seg)[off..off + 2]
                .try_into()
                .expect("slice is 2 bytes"),
        )
    }

    fn set_short(&mut self, pos: u64, value: i16) {
        self.assert_usable();
        let (seg, off) = self.layout.locate(pos, 2);
        self.segment_mut(seg)[off..off + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn get_byte(&self, pos: u64) -> u8 {
        self.assert_usable();
        let (seg, off) = self.layout.split(pos);
        self.segment(seg)[off]
    }

    fn set_byte(&mut self, pos: u64, value: u8) {
        self.assert_usable();
        let (seg, off) = self.layout.split(pos);
        self.segment_mut(seg)[off] = value;
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
        out[..first].copy_from_slice(&self.segment(seg)[off..off + first]);
        if first < out.len() {
            let rest = out.len() - first;
            out[first..].copy_from_slice(&self.segment(seg + 1)[..rest]);
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
        self.segment_mut(seg)[off..off + first].copy_from_slice(&values[..first]);
        if first < values.len() {
            let rest = values.len() - first;
            self.segment_mut(seg + 1)[..rest].copy_from_slice(&values[first..]);
        }
    }

    fn get_header(&self, slot: usize) -> i32 {
        self.header[slot]
    }

    fn set_header(&mut self, slot: usize, value: i32) {
        self.header[slot] = value;
    }
}
