//! Cross-backend contract tests: all three byte-store backends must write
//! byte-identical files, load each other's files, and copy contents across
//! differing segment sizes.

use std::fs;

use senda::store::{ArenaStore, ByteStore, HeapStore, MmapStore};
use tempfile::tempdir;

const SEG: u32 = 256;

// a write pattern touching every accessor, including a byte range that
// straddles the first segment boundary
fn exercise(store: &mut dyn ByteStore) {
    store.ensure_capacity(3 * u64::from(SEG)).expect("grow");
    store.set_int(4, -7);
    store.set_int(764, 1_000_000);
    store.set_short(200, -321);
    store.set_byte(300, 0xAB);
    let straddle: Vec<u8> = (0..32u8).collect();
    store.set_bytes(240, &straddle);
    store.set_header(0, 1);
    store.set_header(7, 42);
    store.set_header(19, -5);
}

fn verify(store: &dyn ByteStore) {
    assert_eq!(store.segment_size(), SEG);
    assert_eq!(store.capacity(), 3 * u64::from(SEG));
    assert_eq!(store.get_int(4), -7);
    assert_eq!(store.get_int(764), 1_000_000);
    assert_eq!(store.get_short(200), -321);
    assert_eq!(store.get_byte(300), 0xAB);
    assert_eq!(store.get_byte(255), 15);
    let mut straddle = vec![0u8; 32];
    store.get_bytes(240, &mut straddle);
    assert_eq!(straddle, (0..32u8).collect::<Vec<u8>>());
    assert_eq!(store.get_header(0), 1);
    assert_eq!(store.get_header(7), 42);
    assert_eq!(store.get_header(19), -5);
}

#[test]
fn all_backends_write_identical_files() {
    let dir = tempdir().expect("temp dir");

    let mut heap = HeapStore::new("via_heap", Some(dir.path()), true, SEG);
    heap.create(SEG.into()).expect("create");
    exercise(&mut heap);
    heap.flush().expect("flush");
    heap.close();

    let mut mmap = MmapStore::new("via_mmap", dir.path(), SEG);
    mmap.create(SEG.into()).expect("create");
    exercise(&mut mmap);
    mmap.flush().expect("flush");
    mmap.close();

    let mut arena = ArenaStore::new("via_arena", Some(dir.path()), true, SEG);
    arena.create(SEG.into()).expect("create");
    exercise(&mut arena);
    arena.flush().expect("flush");
    arena.close();

    let heap_bytes = fs::read(dir.path().join("via_heap")).expect("read");
    let mmap_bytes = fs::read(dir.path().join("via_mmap")).expect("read");
    let arena_bytes = fs::read(dir.path().join("via_arena")).expect("read");
    assert_eq!(heap_bytes, mmap_bytes, "heap and mmap files differ");
    assert_eq!(heap_bytes, arena_bytes, "heap and arena files differ");
}

#[test]
fn files_load_in_any_backend() {
    let dir = tempdir().expect("temp dir");
    {
        let mut heap = HeapStore::new("store", Some(dir.path()), true, SEG);
        heap.create(SEG.into()).expect("create");
        exercise(&mut heap);
        heap.flush().expect("flush");
        heap.close();
    }

    // the configured segment size is replaced by the one found in the file
    let mut mmap = MmapStore::new("store", dir.path(), 4096);
    assert!(mmap.load_existing().expect("load"));
    verify(&mmap);
    mmap.close();

    let mut arena = ArenaStore::new("store", Some(dir.path()), true, 4096);
    assert!(arena.load_existing().expect("load"));
    verify(&arena);
    arena.close();

    let mut heap = HeapStore::new("store", Some(dir.path()), true, SEG);
    assert!(heap.load_existing().expect("load"));
    verify(&heap);
    heap.close();
}

#[test]
fn mmap_written_files_load_elsewhere() {
    let dir = tempdir().expect("temp dir");
    {
        let mut mmap = MmapStore::new("store", dir.path(), SEG);
        mmap.create(SEG.into()).expect("create");
        exercise(&mut mmap);
        mmap.flush().expect("flush");
        mmap.close();
    }
    let mut heap = HeapStore::new("store", Some(dir.path()), true, SEG);
    assert!(heap.load_existing().expect("load"));
    verify(&heap);
}

#[test]
fn copy_to_tolerates_differing_segment_sizes_and_backends() {
    let mut small = HeapStore::in_memory("small", SEG);
    small.create(SEG.into()).expect("create");
    exercise(&mut small);

    let mut large = ArenaStore::in_memory("large", 1024);
    large.create(1).expect("create");
    small.copy_to(&mut large).expect("copy");
    verify_contents_only(&large);

    // and back down again
    let mut tiny = HeapStore::in_memory("tiny", 128);
    tiny.create(1).expect("create");
    large.copy_to(&mut tiny).expect("copy");
    verify_contents_only(&tiny);
}

// like verify, but without the segment-size assumptions that do not hold
// for a copy target
fn verify_contents_only(store: &dyn ByteStore) {
    assert!(store.capacity() >= 3 * u64::from(SEG));
    assert_eq!(store.get_int(4), -7);
    assert_eq!(store.get_int(764), 1_000_000);
    let mut straddle = vec![0u8; 32];
    store.get_bytes(240, &mut straddle);
    assert_eq!(straddle, (0..32u8).collect::<Vec<u8>>());
    assert_eq!(store.get_header(7), 42);
    assert_eq!(store.get_header(19), -5);
}

#[test]
fn junk_files_are_rejected_by_every_backend() {
    let dir = tempdir().expect("temp dir");
    fs::write(dir.path().join("junk"), vec![0x5A; 512]).expect("write junk");

    let mut heap = HeapStore::new("junk", Some(dir.path()), true, SEG);
    let err = heap.load_existing().unwrap_err();
    assert!(err.to_string().contains("invalid format marker"), "{err}");

    let mut mmap = MmapStore::new("junk", dir.path(), SEG);
    let err = mmap.load_existing().unwrap_err();
    assert!(err.to_string().contains("invalid format marker"), "{err}");

    let mut arena = ArenaStore::new("junk", Some(dir.path()), true, SEG);
    let err = arena.load_existing().unwrap_err();
    assert!(err.to_string().contains("invalid format marker"), "{err}");
}

#[test]
fn trim_then_flush_shrinks_the_file() {
    let dir = tempdir().expect("temp dir");
    let mut store = HeapStore::new("trimmed", Some(dir.path()), true, SEG);
    store.create(4 * u64::from(SEG)).expect("create");
    store.set_int(0, 11);
    store.trim_to(SEG.into()).expect("trim");
    store.flush().expect("flush");
    store.close();

    let mut reloaded = HeapStore::new("trimmed", Some(dir.path()), true, SEG);
    assert!(reloaded.load_existing().expect("load"));
    assert_eq!(reloaded.segments(), 1);
    assert_eq!(reloaded.get_int(0), 11);
}
