//! Centralized configuration for the version manager.
//!
//! Goals:
//! - Single place for tunables instead of scattering env lookups.
//! - LineageConfig::from_env() reads L1_* variables for deployments that
//!   configure through the environment; the manager itself only ever sees
//!   the finished config object.
//! - ManagerBuilder collects a config and produces a VersionManager bound
//!   to a presentation adapter (VersionManager::builder() returns it).
//!
//! Tunables:
//! - max_versions: lifetime cap on record allocations (default 900).
//! - mstore_fsync: fsync mstore files on close (default true).
//! - registry_dir: optional override for the presentation registry
//!   directory (default <root>/.versions, decided by the caller).

use std::fmt;
use std::sync::Arc;

use crate::consts::DEF_MAX_VERSIONS;
use crate::present::Presentation;
use crate::versions::VersionManager;

#[derive(Clone, Debug)]
pub struct LineageConfig {
    /// Lifetime cap on record allocations (root + bootstrap + create).
    /// Env: L1_MAX_VERSIONS (default 900)
    pub max_versions: u32,

    /// Whether mstore sinks fsync file and directory on close.
    /// Env: L1_MSTORE_FSYNC (default true; "0|false|off|no" => false)
    pub mstore_fsync: bool,

    /// Optional directory for the presentation registry file.
    /// Env: L1_REGISTRY_DIR = "/absolute/or/relative/path"
    pub registry_dir: Option<String>,
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            max_versions: DEF_MAX_VERSIONS,
            mstore_fsync: true,
            registry_dir: None,
        }
    }
}

impl LineageConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("L1_MAX_VERSIONS") {
            if let Ok(n) = v.trim().parse::<u32>() {
                cfg.max_versions = n;
            }
        }

        if let Ok(v) = std::env::var("L1_MSTORE_FSYNC") {
            let s = v.trim().to_ascii_lowercase();
            cfg.mstore_fsync = !(s == "0" || s == "false" || s == "off" || s == "no");
        }

        if let Ok(v) = std::env::var("L1_REGISTRY_DIR") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.registry_dir = Some(s.to_string());
            }
        }

        cfg
    }

    /// Fluent setters (builder-style) to override specific fields.

    pub fn with_max_versions(mut self, cap: u32) -> Self {
        self.max_versions = cap;
        self
    }

    pub fn with_mstore_fsync(mut self, on: bool) -> Self {
        self.mstore_fsync = on;
        self
    }

    pub fn with_registry_dir<S: Into<String>>(mut self, dir: Option<S>) -> Self {
        self.registry_dir = dir.map(Into::into);
        self
    }
}

impl fmt::Display for LineageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LineageConfig {{ max_versions: {}, mstore_fsync: {}, registry_dir: {} }}",
            self.max_versions,
            self.mstore_fsync,
            self.registry_dir
                .as_deref()
                .unwrap_or("default(<root>/.versions)"),
        )
    }
}

/// Lightweight builder that collects a LineageConfig and finishes with a
/// VersionManager. The manager exposes `VersionManager::builder()`
/// returning this builder.
#[derive(Clone, Debug)]
pub struct ManagerBuilder {
    cfg: LineageConfig,
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        // Start from env to keep deployments configurable, then allow
        // overrides.
        Self {
            cfg: LineageConfig::from_env(),
        }
    }
}

impl ManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a clean default (without reading env).
    pub fn from_default() -> Self {
        Self {
            cfg: LineageConfig::default(),
        }
    }

    pub fn max_versions(mut self, cap: u32) -> Self {
        self.cfg.max_versions = cap;
        self
    }

    pub fn mstore_fsync(mut self, on: bool) -> Self {
        self.cfg.mstore_fsync = on;
        self
    }

    pub fn registry_dir<S: Into<String>>(mut self, dir: Option<S>) -> Self {
        self.cfg.registry_dir = dir.map(Into::into);
        self
    }

    /// Finish the builder: a manager bound to the presentation adapter.
    pub fn build(self, presentation: Arc<dyn Presentation>) -> VersionManager {
        VersionManager::new(self.cfg, presentation)
    }
}
