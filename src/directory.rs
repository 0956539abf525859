//! Registry mapping logical store names to backends and files.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, SendaError};
use crate::lock::DirLock;
use crate::store::{
    ArenaStore, BackendKind, ByteStore, HeapStore, MmapStore, DEFAULT_SEGMENT_SIZE,
};

/// Creates stores by name, rooted at one location, and manages their
/// on-disk artifacts.
///
/// A directory either has a filesystem location or is purely in-memory. In
/// the in-memory case every requested backend is coerced to its non-storing
/// variant and [`Directory::needs_load`] reports false, because there is
/// never anything to load.
///
/// Store instances are single-owner: `create` hands the store to the
/// caller and only records the name. Creating the same name twice is a
/// programmer error and panics.
pub struct Directory {
    location: Option<PathBuf>,
    default_kind: BackendKind,
    overrides: HashMap<String, BackendKind>,
    created: HashSet<String>,
}

impl Directory {
    /// Opens (and creates, if needed) a directory at `location`.
    pub fn open(location: impl Into<PathBuf>, default_kind: BackendKind) -> Result<Self> {
        let location = location.into();
        fs::create_dir_all(&location)?;
        Ok(Self {
            location: Some(location),
            default_kind,
            overrides: HashMap::new(),
            created: HashSet::new(),
        })
    }

    /// A directory without any backing location.
    pub fn in_memory() -> Self {
        Self {
            location: None,
            default_kind: BackendKind::Heap,
            overrides: HashMap::new(),
            created: HashSet::new(),
        }
    }

    /// The filesystem location, if any.
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Whether stores from this directory have anything to load.
    pub fn needs_load(&self) -> bool {
        self.location.is_some()
    }

    /// Overrides the backend for one store name.
    pub fn set_kind(&mut self, name: &str, kind: BackendKind) {
        self.overrides.insert(name.to_string(), kind);
    }

    /// The backend a store of this name would get.
    pub fn kind_for(&self, name: &str) -> BackendKind {
        let kind = self
            .overrides
            .get(name)
            .copied()
            .unwrap_or(self.default_kind);
        if self.location.is_none() {
            kind.in_memory_variant()
        } else {
            kind
        }
    }

    /// Creates the store registered under `name` with the default segment
    /// size.
    pub fn create(&mut self, name: &str) -> Box<dyn ByteStore> {
        self.create_sized(name, DEFAULT_SEGMENT_SIZE)
    }

    /// Creates the store registered under `name` with an explicit segment
    /// size.
    pub fn create_sized(&mut self, name: &str, segment_size: u32) -> Box<dyn ByteStore> {
        assert!(
            !self.created.contains(name),
            "store {name} already created in this directory"
        );
        let kind = self.kind_for(name);
        let location = self.location.as_deref();
        let store: Box<dyn ByteStore> = match kind {
            BackendKind::Heap => Box::new(HeapStore::new(name, None, false, segment_size)),
            BackendKind::HeapStore => Box::new(HeapStore::new(name, location, true, segment_size)),
            BackendKind::Mmap => Box::new(MmapStore::new(
                name,
                location.expect("mmap store needs a location"),
                segment_size,
            )),
            BackendKind::Arena => Box::new(ArenaStore::new(name, None, false, segment_size)),
            BackendKind::ArenaStore => {
                Box::new(ArenaStore::new(name, location, true, segment_size))
            }
        };
        self.created.insert(name.to_string());
        debug!(name, ?kind, segment_size, "created store");
        store
    }

    /// Removes a store: unregisters the name and deletes its backing file.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let registered = self.created.remove(name);
        if let Some(location) = &self.location {
            let path = location.join(name);
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(name, "removed store file");
                    return Ok(());
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        if registered {
            Ok(())
        } else {
            Err(SendaError::NotFound(format!("store {name}")))
        }
    }

    /// Renames a store's registration and backing file. The store handle
    /// itself must already be closed or not handed out.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        assert!(
            !self.created.contains(to),
            "store {to} already created in this directory"
        );
        if let Some(location) = &self.location {
            let src = location.join(from);
            if src.exists() {
                fs::rename(&src, location.join(to))?;
            }
        }
        if self.created.remove(from) {
            self.created.insert(to.to_string());
        }
        let kind = self.overrides.remove(from);
        if let Some(kind) = kind {
            self.overrides.insert(to.to_string(), kind);
        }
        debug!(from, to, "renamed store");
        Ok(())
    }

    /// Takes the advisory write lock for this location.
    pub fn lock(&self) -> Result<DirLock> {
        match &self.location {
            Some(location) => DirLock::acquire(location),
            None => Err(SendaError::Lock(
                "in-memory directories cannot be locked".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn in_memory_coerces_backends() {
        let dir = Directory::in_memory();
        assert!(!dir.needs_load());
        assert_eq!(dir.kind_for("nodes"), BackendKind::Heap);
    }

    #[test]
    fn override_selects_backend_per_name() {
        let tmp = tempdir().expect("temp dir");
        let mut dir = Directory::open(tmp.path(), BackendKind::HeapStore).expect("open");
        dir.set_kind("shortcuts", BackendKind::Mmap);
        assert_eq!(dir.kind_for("nodes"), BackendKind::HeapStore);
        assert_eq!(dir.kind_for("shortcuts"), BackendKind::Mmap);
    }

    #[test]
    #[should_panic(expected = "already created")]
    fn creating_a_name_twice_panics() {
        let mut dir = Directory::in_memory();
        let _first = dir.create("nodes");
        let _second = dir.create("nodes");
    }

    #[test]
    fn remove_deletes_the_backing_file() {
        let tmp = tempdir().expect("temp dir");
        let mut dir = Directory::open(tmp.path(), BackendKind::HeapStore).expect("open");
        {
            let mut store = dir.create("nodes");
            store.create(64).expect("create");
            store.flush().expect("flush");
        }
        assert!(tmp.path().join("nodes").exists());
        dir.remove("nodes").expect("remove");
        assert!(!tmp.path().join("nodes").exists());
        assert!(dir.remove("nodes").is_err());
    }

    #[test]
    fn rename_moves_the_backing_file() {
        let tmp = tempdir().expect("temp dir");
        let mut dir = Directory::open(tmp.path(), BackendKind::HeapStore).expect("open");
        {
            let mut store = dir.create("old");
            store.create(64).expect("create");
            store.set_int(0, 5);
            store.flush().expect("flush");
        }
        dir.rename("old", "new").expect("rename");
        assert!(!tmp.path().join("old").exists());
        let mut store = HeapStore::new("new", Some(tmp.path()), true, 128);
        assert!(store.load_existing().expect("load"));
        assert_eq!(store.get_int(0), 5);
    }
}
