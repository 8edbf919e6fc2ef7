//! File-backed mstore.
//!
//! One file per store id: <root>/mstore-NNNN.bin
//!
//! Layout (LE):
//! [MAGIC8 "L1MSTORE"][format_version u32][store_id u32][record_size u32]
//! then records: [payload record_size][crc32 u32], crc over the payload.
//!
//! Write path: the sink writes to mstore-NNNN.bin.tmp and renames over the
//! final name on close (fsync of file and parent directory when enabled).
//! An exclusive <root>/LOCK is held for the lifetime of a sink, a shared
//! one for the lifetime of a source.

use anyhow::{anyhow, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::consts::{
    MSTORE_FILE_EXT, MSTORE_FILE_PREFIX, MSTORE_FORMAT_VERSION, MSTORE_MAGIC, VLIST_ENTRY_SIZE,
};
use crate::lock::{acquire_lock, LockGuard, LockMode};
use crate::mstore::{check_record_size, Mstore, MstoreSink, MstoreSource, VlistEntry};

#[cfg(unix)]
fn fsync_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            let dir = File::open(parent)?;
            dir.sync_all()?;
        }
    }
    Ok(())
}
#[cfg(not(unix))]
fn fsync_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

fn store_file_name(store_id: u32) -> String {
    format!("{}{:04}.{}", MSTORE_FILE_PREFIX, store_id, MSTORE_FILE_EXT)
}

/// Directory-rooted mstore.
pub struct FileMstore {
    root: PathBuf,
    fsync: bool,
}

impl FileMstore {
    /// Open at a root directory (created if missing).
    pub fn open(root: &Path, fsync: bool) -> Result<Self> {
        fs::create_dir_all(root).with_context(|| format!("create {}", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
            fsync,
        })
    }

    fn store_path(&self, store_id: u32) -> PathBuf {
        self.root.join(store_file_name(store_id))
    }
}

impl Mstore for FileMstore {
    fn create(&self, store_id: u32, record_size: usize) -> Result<Box<dyn MstoreSink>> {
        check_record_size(record_size)?;
        let lock = acquire_lock(&self.root, LockMode::Exclusive)?;

        let path = self.store_path(store_id);
        let tmp = self.root.join(format!("{}.tmp", store_file_name(store_id)));
        let _ = fs::remove_file(&tmp);

        let f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)
            .with_context(|| format!("open mstore tmp {}", tmp.display()))?;
        let mut w = BufWriter::new(f);

        w.write_all(MSTORE_MAGIC)?;
        w.write_u32::<LittleEndian>(MSTORE_FORMAT_VERSION)?;
        w.write_u32::<LittleEndian>(store_id)?;
        w.write_u32::<LittleEndian>(record_size as u32)?;

        Ok(Box::new(FileSink {
            writer: Some(w),
            tmp,
            path,
            fsync: self.fsync,
            _lock: lock,
        }))
    }

    fn open(&self, store_id: u32, record_size: usize) -> Result<Box<dyn MstoreSource>> {
        check_record_size(record_size)?;
        let lock = acquire_lock(&self.root, LockMode::Shared)?;

        let path = self.store_path(store_id);
        let f = OpenOptions::new()
            .read(true)
            .open(&path)
            .with_context(|| format!("open mstore {}", path.display()))?;
        let mut r = BufReader::new(f);

        let mut magic = [0u8; 8];
        r.read_exact(&mut magic)
            .with_context(|| format!("read mstore header {}", path.display()))?;
        if &magic != MSTORE_MAGIC {
            return Err(anyhow!(
                "bad mstore magic at {} (expected {:?}, got {:?})",
                path.display(),
                MSTORE_MAGIC,
                magic
            ));
        }
        let format_version = r.read_u32::<LittleEndian>()?;
        if format_version != MSTORE_FORMAT_VERSION {
            return Err(anyhow!(
                "unsupported mstore format {} at {} (expected {})",
                format_version,
                path.display(),
                MSTORE_FORMAT_VERSION
            ));
        }
        let got_store_id = r.read_u32::<LittleEndian>()?;
        if got_store_id != store_id {
            return Err(anyhow!(
                "mstore id mismatch at {}: expected {}, got {}",
                path.display(),
                store_id,
                got_store_id
            ));
        }
        let got_record_size = r.read_u32::<LittleEndian>()? as usize;
        if got_record_size != record_size {
            return Err(anyhow!(
                "mstore record size mismatch at {}: expected {}, got {}",
                path.display(),
                record_size,
                got_record_size
            ));
        }

        Ok(Box::new(FileSource {
            reader: r,
            path,
            _lock: lock,
        }))
    }
}

struct FileSink {
    writer: Option<BufWriter<File>>,
    tmp: PathBuf,
    path: PathBuf,
    fsync: bool,
    _lock: LockGuard,
}

impl MstoreSink for FileSink {
    fn append(&mut self, entry: &VlistEntry) -> Result<()> {
        let w = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow!("append on a closed mstore sink"))?;

        let mut payload = [0u8; VLIST_ENTRY_SIZE];
        entry.encode(&mut payload);
        let mut h = crc32fast::Hasher::new();
        h.update(&payload);

        w.write_all(&payload)?;
        w.write_u32::<LittleEndian>(h.finalize())?;
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        let w = self
            .writer
            .take()
            .ok_or_else(|| anyhow!("double close of mstore sink"))?;
        let f = w
            .into_inner()
            .map_err(|e| anyhow!("flush mstore tmp {}: {}", self.tmp.display(), e))?;
        if self.fsync {
            f.sync_all()
                .with_context(|| format!("fsync {}", self.tmp.display()))?;
        }
        drop(f);

        fs::rename(&self.tmp, &self.path).with_context(|| {
            format!("rename {} -> {}", self.tmp.display(), self.path.display())
        })?;
        if self.fsync {
            let _ = fsync_dir(&self.path);
        }
        Ok(())
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        // Abandoned sink: leave no tmp file behind.
        if self.writer.take().is_some() {
            let _ = fs::remove_file(&self.tmp);
        }
    }
}

struct FileSource {
    reader: BufReader<File>,
    path: PathBuf,
    _lock: LockGuard,
}

impl MstoreSource for FileSource {
    fn next_entry(&mut self) -> Result<Option<VlistEntry>> {
        // Clean end of stream: nothing buffered and nothing left in the file.
        let at_eof = self
            .reader
            .fill_buf()
            .with_context(|| format!("read mstore {}", self.path.display()))?
            .is_empty();
        if at_eof {
            return Ok(None);
        }

        let mut payload = [0u8; VLIST_ENTRY_SIZE];
        self.reader
            .read_exact(&mut payload)
            .with_context(|| format!("truncated mstore record at {}", self.path.display()))?;
        let stored_crc = self
            .reader
            .read_u32::<LittleEndian>()
            .with_context(|| format!("truncated mstore record at {}", self.path.display()))?;

        let mut h = crc32fast::Hasher::new();
        h.update(&payload);
        let crc = h.finalize();
        if crc != stored_crc {
            return Err(anyhow!(
                "mstore record crc mismatch at {} (expected {:#010x}, got {:#010x})",
                self.path.display(),
                stored_crc,
                crc
            ));
        }

        Ok(Some(VlistEntry::decode(&payload)?))
    }
}
