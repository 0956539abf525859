use parking_lot::Mutex;

use crate::error::Result;
use crate::store::{BackendKind, ByteStore};

/// Serializes every accessor of a wrapped store behind one mutex.
///
/// Opt-in: construction and preparation are single-writer and do not need
/// this, and the lock costs a fetch on every access. Use it only when a
/// caller genuinely needs shared read/write access from multiple threads.
pub struct SharedStore {
    inner: Mutex<Box<dyn ByteStore + Send>>,
}

impl SharedStore {
    /// Wraps a store. The store must be `Send`; the off-heap arena backend
    /// is not and cannot be shared.
    pub fn new(store: Box<dyn ByteStore + Send>) -> Self {
        Self {
            inner: Mutex::new(store),
        }
    }

    /// Unwraps the inner store again.
    pub fn into_inner(self) -> Box<dyn ByteStore + Send> {
        self.inner.into_inner()
    }

    /// See [`ByteStore::kind`].
    pub fn kind(&self) -> BackendKind {
        self.inner.lock().kind()
    }

    /// See [`ByteStore::capacity`].
    pub fn capacity(&self) -> u64 {
        self.inner.lock().capacity()
    }

    /// See [`ByteStore::ensure_capacity`].
    pub fn ensure_capacity(&self, bytes: u64) -> Result<bool> {
        self.inner.lock().ensure_capacity(bytes)
    }

    /// See [`ByteStore::flush`].
    pub fn flush(&self) -> Result<()> {
        self.inner.lock().flush()
    }

    /// See [`ByteStore::get_int`].
    pub fn get_int(&self, pos: u64) -> i32 {
        self.inner.lock().get_int(pos)
    }

    /// See [`ByteStore::set_int`].
    pub fn set_int(&self, pos: u64, value: i32) {
        self.inner.lock().set_int(pos, value)
    }

    /// See [`ByteStore::get_short`].
    pub fn get_short(&self, pos: u64) -> i16 {
        self.inner.lock().get_short(pos)
    }

    /// See [`ByteStore::set_short`].
    pub fn set_short(&self, pos: u64, value: i16) {
        self.inner.lock().set_short(pos, value)
    }

    /// See [`ByteStore::get_byte`].
    pub fn get_byte(&self, pos: u64) -> u8 {
        self.inner.lock().get_byte(pos)
    }

    /// See [`ByteStore::set_byte`].
    pub fn set_byte(&self, pos: u64, value: u8) {
        self.inner.lock().set_byte(pos, value)
    }

    /// See [`ByteStore::get_bytes`].
    pub fn get_bytes(&self, pos: u64, out: &mut [u8]) {
        self.inner.lock().get_bytes(pos, out)
    }

    /// See [`ByteStore::set_bytes`].
    pub fn set_bytes(&self, pos: u64, values: &[u8]) {
        self.inner.lock().set_bytes(pos, values)
    }

    /// See [`ByteStore::get_header`].
    pub fn get_header(&self, slot: usize) -> i32 {
        self.inner.lock().get_header(slot)
    }

    /// See [`ByteStore::set_header`].
    pub fn set_header(&self, slot: usize, value: i32) {
        self.inner.lock().set_header(slot, value)
    }
}
