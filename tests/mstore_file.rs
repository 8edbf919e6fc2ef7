use anyhow::Result;
use std::fs;
use std::path::PathBuf;

use LineageDB::consts::{MSTORE_HDR_SIZE, MSTORE_VERSIONS_ID, VLIST_ENTRY_SIZE, VLIST_REC_SIZE};
use LineageDB::lock::{try_acquire_lock, LockMode};
use LineageDB::mstore::{FileMstore, Mstore, VlistEntry};

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("ldb-mstore-{}-{}-{}", prefix, pid, t))
}

fn sample_entries() -> Vec<VlistEntry> {
    vec![
        VlistEntry { id: 0, parent: 0, size: 0, tag: u32::MAX },
        VlistEntry { id: 1, parent: 0, size: 4096, tag: 7 },
        VlistEntry { id: 2, parent: 1, size: 4096, tag: 7 },
    ]
}

fn write_store(root: &PathBuf) -> Result<()> {
    let ms = FileMstore::open(root, true)?;
    let mut sink = ms.create(MSTORE_VERSIONS_ID, VLIST_ENTRY_SIZE)?;
    for e in sample_entries() {
        sink.append(&e)?;
    }
    sink.close()?;
    Ok(())
}

fn store_path(root: &PathBuf) -> PathBuf {
    root.join(format!("mstore-{:04}.bin", MSTORE_VERSIONS_ID))
}

#[test]
fn sink_then_source() -> Result<()> {
    let root = unique_root("basic");
    write_store(&root)?;

    let ms = FileMstore::open(&root, true)?;
    let mut src = ms.open(MSTORE_VERSIONS_ID, VLIST_ENTRY_SIZE)?;
    let mut got = Vec::new();
    while let Some(e) = src.next_entry()? {
        got.push(e);
    }
    assert_eq!(got, sample_entries());
    Ok(())
}

#[test]
fn missing_store_fails_to_open() -> Result<()> {
    let root = unique_root("missing");
    let ms = FileMstore::open(&root, true)?;
    assert!(ms.open(MSTORE_VERSIONS_ID, VLIST_ENTRY_SIZE).is_err());
    Ok(())
}

#[test]
fn wrong_record_size_is_rejected() -> Result<()> {
    let root = unique_root("recsize");
    let ms = FileMstore::open(&root, true)?;
    assert!(ms.create(MSTORE_VERSIONS_ID, 16).is_err());
    assert!(ms.open(MSTORE_VERSIONS_ID, 16).is_err());
    Ok(())
}

#[test]
fn bad_magic_is_rejected() -> Result<()> {
    let root = unique_root("magic");
    write_store(&root)?;

    let path = store_path(&root);
    let mut bytes = fs::read(&path)?;
    bytes[0] ^= 0xFF;
    fs::write(&path, &bytes)?;

    let ms = FileMstore::open(&root, true)?;
    assert!(ms.open(MSTORE_VERSIONS_ID, VLIST_ENTRY_SIZE).is_err());
    Ok(())
}

#[test]
fn corrupted_record_fails_crc() -> Result<()> {
    let root = unique_root("crc");
    write_store(&root)?;

    // Flip one payload byte of the second record.
    let path = store_path(&root);
    let mut bytes = fs::read(&path)?;
    let off = MSTORE_HDR_SIZE + VLIST_REC_SIZE + 2;
    bytes[off] ^= 0x01;
    fs::write(&path, &bytes)?;

    let ms = FileMstore::open(&root, true)?;
    let mut src = ms.open(MSTORE_VERSIONS_ID, VLIST_ENTRY_SIZE)?;
    assert!(src.next_entry()?.is_some(), "first record is intact");
    assert!(src.next_entry().is_err(), "corrupted record must fail");
    Ok(())
}

#[test]
fn sink_holds_the_root_lock() -> Result<()> {
    let root = unique_root("lock");
    let ms = FileMstore::open(&root, true)?;

    let sink = ms.create(MSTORE_VERSIONS_ID, VLIST_ENTRY_SIZE)?;
    assert!(
        try_acquire_lock(&root, LockMode::Exclusive).is_err(),
        "an open sink must hold the exclusive root lock"
    );

    drop(sink);
    assert!(try_acquire_lock(&root, LockMode::Exclusive).is_ok());
    Ok(())
}

#[test]
fn truncated_record_is_an_error() -> Result<()> {
    let root = unique_root("trunc");
    write_store(&root)?;

    let path = store_path(&root);
    let bytes = fs::read(&path)?;
    fs::write(&path, &bytes[..MSTORE_HDR_SIZE + VLIST_REC_SIZE + 5])?;

    let ms = FileMstore::open(&root, true)?;
    let mut src = ms.open(MSTORE_VERSIONS_ID, VLIST_ENTRY_SIZE)?;
    assert!(src.next_entry()?.is_some());
    assert!(src.next_entry().is_err(), "partial tail must not read as EOF");
    Ok(())
}
