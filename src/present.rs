//! Presentation adapter: per-version registration with an external view.
//!
//! The manager registers every version after it is linked into the forest
//! and deregisters it right before removal from the store. The view and the
//! store must agree: a failed register is logged and tolerated (the version
//! keeps its linkage, just without a presentation entry); a failed
//! deregister is an invariant violation and fatal upstream.
//!
//! Implementations:
//! - MemPresentation: mutex-guarded id set (embedding, tests).
//! - RegistryPresentation: <dir>/registry.json rewritten atomically through
//!   tmp+rename on every change.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::LineageConfig;
use crate::versions::VersionId;

/// Directory selection for the registry file:
/// - cfg.registry_dir absolute: used as-is;
/// - relative: resolved against the metadata root;
/// - unset: default <root>/.versions.
pub fn resolve_registry_dir(root: &Path, cfg: &LineageConfig) -> PathBuf {
    match &cfg.registry_dir {
        Some(d) if !d.trim().is_empty() => {
            let p = PathBuf::from(d.trim());
            if p.is_absolute() {
                p
            } else {
                root.join(p)
            }
        }
        _ => root.join(".versions"),
    }
}

pub trait Presentation: Send + Sync {
    fn register(&self, id: VersionId) -> Result<()>;
    fn deregister(&self, id: VersionId) -> Result<()>;
}

// ---------------- In-memory ----------------

/// Mutex-guarded set of registered ids.
#[derive(Default)]
pub struct MemPresentation {
    ids: Mutex<HashSet<VersionId>>,
}

impl MemPresentation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered ids, sorted (test helper).
    pub fn registered(&self) -> Vec<VersionId> {
        let g = self.ids.lock().unwrap();
        let mut v: Vec<VersionId> = g.iter().copied().collect();
        v.sort_unstable();
        v
    }
}

impl Presentation for MemPresentation {
    fn register(&self, id: VersionId) -> Result<()> {
        let mut g = self.ids.lock().unwrap();
        if !g.insert(id) {
            return Err(anyhow!("version {} already registered", id));
        }
        Ok(())
    }

    fn deregister(&self, id: VersionId) -> Result<()> {
        let mut g = self.ids.lock().unwrap();
        if !g.remove(&id) {
            return Err(anyhow!("version {} not registered", id));
        }
        Ok(())
    }
}

// ---------------- Registry file ----------------

#[derive(Debug, Serialize, Deserialize, Default)]
struct Registry {
    entries: Vec<RegEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RegEntry {
    id: VersionId,
}

/// File-backed registry of live versions, one entry per linked version.
pub struct RegistryPresentation {
    dir: PathBuf,
}

impl RegistryPresentation {
    /// Registry lives in <dir>/registry.json; the directory is created on
    /// first registration.
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn registry_path(&self) -> PathBuf {
        self.dir.join("registry.json")
    }

    fn load(&self) -> Result<Registry> {
        let p = self.registry_path();
        if !p.exists() {
            return Ok(Registry::default());
        }
        let bytes = fs::read(&p).with_context(|| format!("read {}", p.display()))?;
        let reg: Registry = serde_json::from_slice(&bytes).context("parse registry.json")?;
        Ok(reg)
    }

    fn save(&self, reg: &Registry) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create {}", self.dir.display()))?;
        let path = self.registry_path();
        let tmp = self.dir.join("registry.json.tmp");

        let mut f = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)
            .with_context(|| format!("open {}", tmp.display()))?;

        let data = serde_json::to_vec_pretty(reg).context("serialize registry.json")?;
        f.write_all(&data)?;
        let _ = f.sync_all();

        fs::rename(&tmp, &path)
            .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
        Ok(())
    }

    /// Ids currently present in the registry file, sorted (test helper).
    pub fn registered(&self) -> Result<Vec<VersionId>> {
        let reg = self.load()?;
        let mut v: Vec<VersionId> = reg.entries.iter().map(|e| e.id).collect();
        v.sort_unstable();
        Ok(v)
    }
}

impl Presentation for RegistryPresentation {
    fn register(&self, id: VersionId) -> Result<()> {
        let mut reg = self.load()?;
        if reg.entries.iter().any(|e| e.id == id) {
            return Err(anyhow!("version {} already registered", id));
        }
        reg.entries.push(RegEntry { id });
        self.save(&reg)
    }

    fn deregister(&self, id: VersionId) -> Result<()> {
        let mut reg = self.load()?;
        let before = reg.entries.len();
        reg.entries.retain(|e| e.id != id);
        if reg.entries.len() == before {
            return Err(anyhow!("version {} not registered", id));
        }
        self.save(&reg)
    }
}
