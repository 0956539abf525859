use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};

use crate::error::{Result, SendaError};
use crate::store::{
    BackendKind, ByteStore, SegmentLayout, StoreHeader, HEADER_OFFSET, HEADER_SLOTS,
};

/// Memory-mapped store: one mapped region per segment, paged by the OS.
///
/// Growth extends the file and maps the new tail segments; existing
/// mappings are never moved. Flush writes the header through the file
/// handle and msyncs every mapping. Not safe for concurrent use, including
/// concurrent reads during mutation.
pub struct MmapStore {
    name: String,
    path: PathBuf,
    layout: SegmentLayout,
    file: Option<File>,
    maps: Vec<MmapMut>,
    header: [i32; HEADER_SLOTS],
    closed: bool,
}

impl MmapStore {
    /// Creates a handle backed by `location/name`.
    pub fn new(name: &str, location: &Path, segment_size: u32) -> Self {
        Self {
            name: name.to_string(),
            path: location.join(name),
            layout: SegmentLayout::new(segment_size),
            file: None,
            maps: Vec::new(),
            header: [0; HEADER_SLOTS],
            closed: false,
        }
    }

    fn open_file(&mut self) -> Result<()> {
        if self.file.is_none() {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&self.path)?;
            self.file = Some(file);
        }
        Ok(())
    }

    fn file(&self) -> &File {
        self.file.as_ref().expect("mapped store has an open file")
    }

    fn map_segment(&self, index: usize) -> Result<MmapMut> {
        let size = u64::from(self.layout.size());
        let offset = HEADER_OFFSET + index as u64 * size;
        let map = unsafe {
            MmapOptions::new()
                .offset(offset)
                .len(size as usize)
                .map_mut(self.file())?
        };
        Ok(map)
    }

    /// Extends the file and maps segments until `count` exist.
    fn grow_to(&mut self, count: usize) -> Result<()> {
        let size = u64::from(self.layout.size());
        let wanted_len = HEADER_OFFSET + count as u64 * size;
        if self.file().metadata()?.len() < wanted_len {
            self.file().set_len(wanted_len)?;
        }
        while self.maps.len() < count {
            let map = self.map_segment(self.maps.len())?;
            self.maps.push(map);
        }
        Ok(())
    }

    fn assert_usable(&self) {
        assert!(!self.closed, "store {} already closed", self.name);
        assert!(
            !self.maps.is_empty(),
            "store {}: call create or load_existing before access",
            self.name
        );
    }
}

impl ByteStore for MmapStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Mmap
    }

    fn is_storing(&self) -> bool {
        true
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn segment_size(&self) -> u32 {
        self.layout.size()
    }

    fn segments(&self) -> usize {
        self.maps.len()
    }

    fn capacity(&self) -> u64 {
        self.maps.len() as u64 * u64::from(self.layout.size())
    }

    fn create(&mut self, bytes: u64) -> Result<()> {
        assert!(!self.closed, "store {} already closed", self.name);
        assert!(self.maps.is_empty(), "store {} already created", self.name);
        self.open_file()?;
        let count = self.layout.segments_for(bytes.max(1)).max(1);
        self.grow_to(count)
    }

    fn load_existing(&mut self) -> Result<bool> {
        assert!(!self.closed, "store {} already closed", self.name);
        assert!(
            self.maps.is_empty(),
            "store {} already initialized",
            self.name
        );
        match fs::metadata(&self.path) {
            Err(_) => return Ok(false),
            Ok(meta) if meta.len() == 0 => return Ok(false),
            Ok(meta) if meta.len() < HEADER_OFFSET => {
                return Err(SendaError::Corruption(format!(
                    "store {}: file shorter than its header",
                    self.name
                )))
            }
            Ok(_) => {}
        }
        self.open_file()?;
        let header = {
            let mut file = self.file.take().expect("file just opened");
            let header = StoreHeader::read_from(&mut file, &self.name)?;
            self.file = Some(file);
            header
        };
        self.layout = SegmentLayout::new(header.segment_size as u32);
        self.header = header.slots;
        let count = self.layout.segments_for(header.length as u64);
        self.grow_to(count)?;
        Ok(true)
    }

    fn ensure_capacity(&mut self, bytes: u64) -> Result<bool> {
        assert!(!self.closed, "store {} already closed", self.name);
        let want = self.layout.segments_for(bytes);
        if want <= self.maps.len() {
            return Ok(false);
        }
        self.grow_to(want)?;
        Ok(true)
    }

    fn trim_to(&mut self, bytes: u64) -> Result<()> {
        self.assert_usable();
        let keep = self.layout.segments_for(bytes);
        if keep < self.maps.len() {
            self.maps.truncate(keep);
            let size = u64::from(self.layout.size());
            self.file()
                .set_len(HEADER_OFFSET + keep as u64 * size)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        assert!(!self.closed, "store {} already closed", self.name);
        let header = StoreHeader {
            length: self.capacity() as i64,
            segment_size: self.layout.size() as i32,
            slots: self.header,
        };
        let mut file = self.file.take().expect("mapped store has an open file");
        header.write_to(&mut file)?;
        self.file = Some(file);
        for map in &self.maps {
            map.flush()?;
        }
        self.file().sync_all()?;
        Ok(())
    }

    fn close(&mut self) {
        assert!(!self.closed, "store {} already closed", self.name);
        self.maps = Vec::new();
        self.file = None;
        self.closed = true;
    }

    fn get_int(&self, pos: u64) -> i32 {
        self.assert_usable();
        let (seg, off) = self.layout.locate(pos, 4);
        i32::from_le_bytes(
            self.maps[seg][off..off + 4]
                .try_into()
                .expect("slice is 4 bytes"),
        )
    }

    fn set_int(&mut self, pos: u64, value: i32) {
        self.assert_usable();
        let (seg, off) = self.layout.locate(pos, 4);
        self.maps[seg][off..off + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn get_short(&self, pos: u64) -> i16 {
        self.assert_usable();
        let (seg, off) = self.layout.locate(pos, 2);
        i16::from_le_bytes(
            self.maps[seg][off..off + 2]
                .try_into()
                .expect("slice is 2 bytes"),
        )
    }

    fn set_short(&mut self, pos: u64, value: i16) {
        self.assert_usable();
        let (seg, off) = self.layout.locate(pos, 2);
        self.maps[seg][off..off + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn get_byte(&self, pos: u64) -> u8 {
        self.assert_usable();
        let (seg, off) = self.layout.split(pos);
        self.maps[seg][off]
    }

    fn set_byte(&mut self, pos: u64, value: u8) {
        self.assert_usable();
        let (seg, off) = self.layout.split(pos);
        self.maps[seg][off] = value;
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
        out[..first].copy_from_slice(&self.maps[seg][off..off + first]);
        if first < out.len() {
            let rest = out.len() - first;
            out[first..].copy_from_slice(&self.maps[seg + 1][..rest]);
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
        self.maps[seg][off..off + first].copy_from_slice(&values[..first]);
        if first < values.len() {
            let rest = values.len() - first;
            self.maps[seg + 1][..rest].copy_from_slice(&values[first..]);
        }
    }

    fn get_header(&self, slot: usize) -> i32 {
        self.header[slot]
    }

    fn set_header(&mut self, slot: usize, value: i32) {
        self.header[slot] = value;
    }
}
