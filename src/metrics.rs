//! Lightweight global metrics for the version manager.
//!
//! Thread-safe atomic counters for:
//! - version lifecycle (created / destroyed)
//! - processor runs, rule rejections, DFS renumbering
//! - attach / detach
//! - mstore traffic (bootstrap entries read, writeback entries written)

use std::sync::atomic::{AtomicU64, Ordering};

// ----- Lifecycle -----
static VERSIONS_CREATED: AtomicU64 = AtomicU64::new(0);
static VERSIONS_DESTROYED: AtomicU64 = AtomicU64::new(0);

// ----- Processor -----
static PROCESS_RUNS: AtomicU64 = AtomicU64::new(0);
static SNAPSHOT_REJECTS: AtomicU64 = AtomicU64::new(0);
static CLONE_REJECTS: AtomicU64 = AtomicU64::new(0);
static DFS_NODES_RENUMBERED: AtomicU64 = AtomicU64::new(0);

// ----- Attach -----
static ATTACHES: AtomicU64 = AtomicU64::new(0);
static DETACHES: AtomicU64 = AtomicU64::new(0);

// ----- Mstore -----
static BOOTSTRAP_ENTRIES: AtomicU64 = AtomicU64::new(0);
static WRITEBACK_ENTRIES: AtomicU64 = AtomicU64::new(0);

pub fn record_version_created() {
    VERSIONS_CREATED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_version_destroyed() {
    VERSIONS_DESTROYED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_process_run() {
    PROCESS_RUNS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_snapshot_reject() {
    SNAPSHOT_REJECTS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_clone_reject() {
    CLONE_REJECTS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_dfs_nodes(n: u64) {
    DFS_NODES_RENUMBERED.fetch_add(n, Ordering::Relaxed);
}

pub fn record_attach() {
    ATTACHES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_detach() {
    DETACHES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_bootstrap_entry() {
    BOOTSTRAP_ENTRIES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_writeback_entry() {
    WRITEBACK_ENTRIES.fetch_add(1, Ordering::Relaxed);
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub versions_created: u64,
    pub versions_destroyed: u64,
    pub process_runs: u64,
    pub snapshot_rejects: u64,
    pub clone_rejects: u64,
    pub dfs_nodes_renumbered: u64,
    pub attaches: u64,
    pub detaches: u64,
    pub bootstrap_entries: u64,
    pub writeback_entries: u64,
}

pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        versions_created: VERSIONS_CREATED.load(Ordering::Relaxed),
        versions_destroyed: VERSIONS_DESTROYED.load(Ordering::Relaxed),
        process_runs: PROCESS_RUNS.load(Ordering::Relaxed),
        snapshot_rejects: SNAPSHOT_REJECTS.load(Ordering::Relaxed),
        clone_rejects: CLONE_REJECTS.load(Ordering::Relaxed),
        dfs_nodes_renumbered: DFS_NODES_RENUMBERED.load(Ordering::Relaxed),
        attaches: ATTACHES.load(Ordering::Relaxed),
        detaches: DETACHES.load(Ordering::Relaxed),
        bootstrap_entries: BOOTSTRAP_ENTRIES.load(Ordering::Relaxed),
        writeback_entries: WRITEBACK_ENTRIES.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    VERSIONS_CREATED.store(0, Ordering::Relaxed);
    VERSIONS_DESTROYED.store(0, Ordering::Relaxed);

    PROCESS_RUNS.store(0, Ordering::Relaxed);
    SNAPSHOT_REJECTS.store(0, Ordering::Relaxed);
    CLONE_REJECTS.store(0, Ordering::Relaxed);
    DFS_NODES_RENUMBERED.store(0, Ordering::Relaxed);

    ATTACHES.store(0, Ordering::Relaxed);
    DETACHES.store(0, Ordering::Relaxed);

    BOOTSTRAP_ENTRIES.store(0, Ordering::Relaxed);
    WRITEBACK_ENTRIES.store(0, Ordering::Relaxed);
}
