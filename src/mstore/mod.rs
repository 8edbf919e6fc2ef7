//! Metadata store: bulk record persistence for the version manager.
//!
//! Contract:
//! - A sink collects the entries of a fresh store generation and replaces
//!   the previous generation atomically on close.
//! - A source iterates entries in unspecified order. No deduplication, no
//!   atomicity across entries; the manager's processor tolerates arbitrary
//!   input order.
//!
//! Implementations:
//! - FileMstore (file.rs): binary file per store id, crc-protected records.
//! - MemMstore: in-memory map of store id -> entries (embedding, tests).

pub mod file;

use anyhow::{anyhow, Result};
use byteorder::{ByteOrder, LittleEndian};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::consts::{
    VLIST_ENTRY_SIZE, VLIST_OFF_ID, VLIST_OFF_PARENT, VLIST_OFF_SIZE, VLIST_OFF_TAG,
};
use crate::versions::{AttachTag, VersionId};

pub use file::FileMstore;

/// One persisted version-list entry (LE, fixed size).
/// The root serializes parent = 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlistEntry {
    pub id: VersionId,
    pub parent: VersionId,
    pub size: u64,
    pub tag: AttachTag,
}

impl VlistEntry {
    /// Encode into a VLIST_ENTRY_SIZE buffer.
    pub fn encode(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= VLIST_ENTRY_SIZE);
        LittleEndian::write_u32(&mut buf[VLIST_OFF_ID..VLIST_OFF_ID + 4], self.id);
        LittleEndian::write_u32(&mut buf[VLIST_OFF_PARENT..VLIST_OFF_PARENT + 4], self.parent);
        LittleEndian::write_u64(&mut buf[VLIST_OFF_SIZE..VLIST_OFF_SIZE + 8], self.size);
        LittleEndian::write_u32(&mut buf[VLIST_OFF_TAG..VLIST_OFF_TAG + 4], self.tag);
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < VLIST_ENTRY_SIZE {
            return Err(anyhow!(
                "short vlist entry: {} bytes (expected {})",
                buf.len(),
                VLIST_ENTRY_SIZE
            ));
        }
        Ok(Self {
            id: LittleEndian::read_u32(&buf[VLIST_OFF_ID..VLIST_OFF_ID + 4]),
            parent: LittleEndian::read_u32(&buf[VLIST_OFF_PARENT..VLIST_OFF_PARENT + 4]),
            size: LittleEndian::read_u64(&buf[VLIST_OFF_SIZE..VLIST_OFF_SIZE + 8]),
            tag: LittleEndian::read_u32(&buf[VLIST_OFF_TAG..VLIST_OFF_TAG + 4]),
        })
    }
}

pub trait MstoreSink {
    fn append(&mut self, entry: &VlistEntry) -> Result<()>;
    /// Finalize the new store generation (atomic replace of the old one).
    fn close(self: Box<Self>) -> Result<()>;
}

pub trait MstoreSource {
    /// Next entry, or None at end of stream.
    fn next_entry(&mut self) -> Result<Option<VlistEntry>>;
}

/// Factory for sinks and sources, keyed by store id.
pub trait Mstore: Send + Sync {
    fn create(&self, store_id: u32, record_size: usize) -> Result<Box<dyn MstoreSink>>;
    fn open(&self, store_id: u32, record_size: usize) -> Result<Box<dyn MstoreSource>>;
}

// ---------------- In-memory ----------------

type SharedStores = Arc<Mutex<HashMap<u32, Vec<VlistEntry>>>>;

/// In-memory mstore. A sink buffers entries and swaps them in on close.
#[derive(Default, Clone)]
pub struct MemMstore {
    stores: SharedStores,
}

impl MemMstore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with entries (test/bootstrap helper).
    pub fn put_entries(&self, store_id: u32, entries: Vec<VlistEntry>) {
        self.stores.lock().unwrap().insert(store_id, entries);
    }

    /// Copy of a store's entries, if present.
    pub fn entries(&self, store_id: u32) -> Option<Vec<VlistEntry>> {
        self.stores.lock().unwrap().get(&store_id).cloned()
    }
}

impl Mstore for MemMstore {
    fn create(&self, store_id: u32, record_size: usize) -> Result<Box<dyn MstoreSink>> {
        check_record_size(record_size)?;
        Ok(Box::new(MemSink {
            stores: self.stores.clone(),
            store_id,
            buf: Vec::new(),
        }))
    }

    fn open(&self, store_id: u32, record_size: usize) -> Result<Box<dyn MstoreSource>> {
        check_record_size(record_size)?;
        let entries = self
            .entries(store_id)
            .ok_or_else(|| anyhow!("no store with id {}", store_id))?;
        Ok(Box::new(MemSource { entries, pos: 0 }))
    }
}

fn check_record_size(record_size: usize) -> Result<()> {
    if record_size != VLIST_ENTRY_SIZE {
        return Err(anyhow!(
            "unsupported record size {} (expected {})",
            record_size,
            VLIST_ENTRY_SIZE
        ));
    }
    Ok(())
}

struct MemSink {
    stores: SharedStores,
    store_id: u32,
    buf: Vec<VlistEntry>,
}

impl MstoreSink for MemSink {
    fn append(&mut self, entry: &VlistEntry) -> Result<()> {
        self.buf.push(*entry);
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.stores.lock().unwrap().insert(self.store_id, self.buf);
        Ok(())
    }
}

struct MemSource {
    entries: Vec<VlistEntry>,
    pos: usize,
}

impl MstoreSource for MemSource {
    fn next_entry(&mut self) -> Result<Option<VlistEntry>> {
        if self.pos >= self.entries.len() {
            return Ok(None);
        }
        let e = self.entries[self.pos];
        self.pos += 1;
        Ok(Some(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_encode_decode() {
        let e = VlistEntry {
            id: 7,
            parent: 3,
            size: 0xAABB_CCDD_EEFF_0011,
            tag: 42,
        };
        let mut buf = [0u8; VLIST_ENTRY_SIZE];
        e.encode(&mut buf);
        let d = VlistEntry::decode(&buf).expect("must decode");
        assert_eq!(d, e);
    }

    #[test]
    fn mem_sink_replaces_generation() {
        let ms = MemMstore::new();
        ms.put_entries(1, vec![VlistEntry { id: 0, parent: 0, size: 0, tag: 0 }]);

        let mut sink = ms.create(1, VLIST_ENTRY_SIZE).unwrap();
        sink.append(&VlistEntry { id: 0, parent: 0, size: 0, tag: 5 }).unwrap();
        sink.append(&VlistEntry { id: 1, parent: 0, size: 16, tag: 5 }).unwrap();
        sink.close().unwrap();

        let got = ms.entries(1).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[1].id, 1);
        assert_eq!(got[1].size, 16);
    }
}
