//! VersionManager: public operations over the version forest.
//!
//! One ordering lock (a std Mutex) covers the store, the init queue and the
//! id counters. Every operation takes it; event callbacks and presentation
//! registration run after it is released. `writeback` drops the lock around
//! each append so persistence I/O never pins readers.
//!
//! Error contract: user errors come back as VersionError and leave state
//! unchanged; invariant violations (detach of a non-attached version,
//! deregister failure, corrupt bootstrap input) panic.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use log::{debug, error, warn};

use crate::config::{LineageConfig, ManagerBuilder};
use crate::consts::{MSTORE_VERSIONS_ID, NO_TAG, NO_VERSION, VF_ATTACHED, VF_SNAPSHOT, VLIST_ENTRY_SIZE};
use crate::errors::{VResult, VersionError};
use crate::events::{callback, EventBus, EventSubscription, VersionEvent};
use crate::metrics;
use crate::mstore::{Mstore, VlistEntry};
use crate::present::Presentation;
use crate::versions::process::{drop_child, process};
use crate::versions::record::{AttachTag, VersionId, VersionRecord};
use crate::versions::store::VersionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionKind {
    /// Read-only child of a leaf parent.
    Snapshot,
    /// Writable child; forbidden off an attached leaf.
    Clone,
}

/// Read-only projection of a record (copied scalars, never references).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    pub tag: AttachTag,
    /// Parent id; 0 for the root.
    pub parent: VersionId,
    pub size: u64,
    pub leaf: bool,
}

struct Inner {
    store: VersionStore,
    init_queue: VecDeque<VersionId>,
    /// Highest id handed out so far; None on a virgin manager.
    last: Option<VersionId>,
    /// Lifetime allocation count (root + bootstrap + create) against the cap.
    allocated: u32,
}

pub struct VersionManager {
    inner: Mutex<Inner>,
    events: Arc<EventBus>,
    presentation: Arc<dyn Presentation>,
    cfg: LineageConfig,
}

impl VersionManager {
    pub fn new(cfg: LineageConfig, presentation: Arc<dyn Presentation>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                store: VersionStore::new(),
                init_queue: VecDeque::new(),
                last: None,
                allocated: 0,
            }),
            events: EventBus::new(),
            presentation,
            cfg,
        }
    }

    /// Env-seeded builder; use ManagerBuilder::from_default() to skip env.
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }

    pub fn config(&self) -> &LineageConfig {
        &self.cfg
    }

    /// Subscribe to lifecycle events. Dropping the handle unsubscribes.
    pub fn subscribe<F>(&self, f: F) -> EventSubscription
    where
        F: Fn(&VersionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(callback(f))
    }

    /// Create the root record (id 0). May be called once per manager;
    /// a manager loaded through bootstrap_load needs no zero_init.
    pub fn zero_init(&self) -> VResult<()> {
        let mut g = self.inner.lock().unwrap();
        if g.last.is_some() || !g.store.is_empty() {
            return Err(VersionError::InvalidArgument(
                "zero_init on an initialized manager".into(),
            ));
        }
        debug!("initialising version root");
        self.add_record(&mut g, 0, 0, NO_TAG, 0)?;
        g.last = Some(0);

        let inner = &mut *g;
        let staged = process(&mut inner.store, &mut inner.init_queue);
        debug_assert!(staged.is_empty());
        Ok(())
    }

    /// Load every record from the metadata store and thread the forest.
    /// The input stream may be in arbitrary order.
    pub fn bootstrap_load(&self, mstore: &dyn Mstore) -> VResult<()> {
        let staged;
        {
            let mut g = self.inner.lock().unwrap();
            if g.last.is_some() || !g.store.is_empty() {
                return Err(VersionError::InvalidArgument(
                    "bootstrap_load on an initialized manager".into(),
                ));
            }

            let mut src = mstore.open(MSTORE_VERSIONS_ID, VLIST_ENTRY_SIZE)?;
            while let Some(entry) = src.next_entry()? {
                debug!("loading version {} (parent {})", entry.id, entry.parent);
                self.add_record(&mut g, entry.id, entry.parent, entry.tag, entry.size)?;
                metrics::record_bootstrap_entry();
                g.last = Some(match g.last {
                    None => entry.id,
                    Some(l) => l.max(entry.id),
                });
            }

            let inner = &mut *g;
            staged = process(&mut inner.store, &mut inner.init_queue);
        }
        self.register_staged(&staged);
        Ok(())
    }

    /// Create a snapshot or clone of `parent`. Returns the new id, or
    /// RuleViolation when the creation rules reject it (state unchanged).
    ///
    /// A concrete `tag` may only be supplied when the parent's tag is
    /// unset; pass NO_TAG to inherit.
    pub fn create(
        &self,
        kind: VersionKind,
        parent: VersionId,
        tag: AttachTag,
        size: u64,
    ) -> VResult<VersionId> {
        debug!(
            "new version: kind={:?}, parent={}, size={}",
            kind, parent, size
        );

        let staged;
        let created;
        {
            let mut g = self.inner.lock().unwrap();

            let p_tag = match g.store.get(parent) {
                Some(p) => p.tag,
                None => {
                    warn!("asked to create a child of non-existent parent: {}", parent);
                    return Err(VersionError::NotFound(parent));
                }
            };
            if tag != NO_TAG && p_tag != NO_TAG {
                return Err(VersionError::InvalidArgument(format!(
                    "tag {} supplied but parent {} already carries tag {}",
                    tag, parent, p_tag
                )));
            }

            let last = g.last.expect("id counter uninitialized with a live store");
            let id = last + 1;
            assert!(id != NO_VERSION, "version id space exhausted");
            g.last = Some(id);

            if let Err(e) = self.add_record(&mut g, id, parent, tag, size) {
                g.last = Some(last);
                return Err(e);
            }
            if matches!(kind, VersionKind::Snapshot) {
                g.store
                    .get_mut(id)
                    .expect("fresh record missing")
                    .flags |= VF_SNAPSHOT;
            }

            let inner = &mut *g;
            staged = process(&mut inner.store, &mut inner.init_queue);

            if g.store.get(id).map_or(false, |v| v.is_linked()) {
                created = id;
            } else {
                // Rejected by the creation rules; the processor discarded
                // the record, so the id and the cap slot are given back.
                g.store.remove(id);
                g.last = Some(last);
                g.allocated -= 1;
                drop(g);
                self.register_staged(&staged);
                return Err(VersionError::RuleViolation);
            }
        }

        self.register_staged(&staged);
        metrics::record_version_created();
        self.events.publish(&VersionEvent::Created(created));
        Ok(created)
    }

    /// Bind the version to a writer. At most one writer per version.
    pub fn attach(&self, id: VersionId) -> VResult<()> {
        let mut g = self.inner.lock().unwrap();
        let v = g.store.get_mut(id).ok_or(VersionError::NotFound(id))?;
        if v.is_attached() {
            return Err(VersionError::Busy(id));
        }
        v.flags |= VF_ATTACHED;
        metrics::record_attach();
        Ok(())
    }

    /// Release the writer binding. The version must be attached.
    pub fn detach(&self, id: VersionId) {
        let mut g = self.inner.lock().unwrap();
        let v = g
            .store
            .get_mut(id)
            .unwrap_or_else(|| panic!("detach of unknown version {}", id));
        assert!(v.is_attached(), "detach of a non-attached version {}", id);
        v.flags &= !VF_ATTACHED;
        metrics::record_detach();
    }

    /// Snapshot of the record's current fields.
    pub fn read(&self, id: VersionId) -> VResult<VersionInfo> {
        let g = self.inner.lock().unwrap();
        let v = g.store.get(id).ok_or(VersionError::NotFound(id))?;
        Ok(VersionInfo {
            tag: v.tag,
            parent: v.parent.id_or_zero(),
            size: v.size,
            leaf: v.is_leaf(),
        })
    }

    /// Attachment tag of a linked version. The caller owns the id:
    /// unknown or unlinked versions are a bug.
    pub fn tag_of(&self, id: VersionId) -> AttachTag {
        let g = self.inner.lock().unwrap();
        let v = g
            .store
            .get(id)
            .unwrap_or_else(|| panic!("tag_of unknown version {}", id));
        assert!(v.is_linked(), "tag_of unlinked version {}", id);
        v.tag
    }

    /// Prune the whole subtree rooted at `id`, leaves first, `id` last.
    /// The subtree must contain no attached version.
    pub fn delete_subtree(&self, id: VersionId) -> VResult<()> {
        let destroyed;
        {
            let mut g = self.inner.lock().unwrap();
            match g.store.get(id) {
                None => {
                    warn!("asked to delete a non-existent version: {}", id);
                    return Err(VersionError::NotFound(id));
                }
                Some(v) => {
                    assert!(v.is_linked(), "delete of unlinked version {}", id);
                }
            }
            if id == 0 {
                return Err(VersionError::InvalidArgument(
                    "cannot delete the root version".into(),
                ));
            }
            assert!(
                !subtree_has_attached(&g.store, id),
                "attached version inside deleted subtree {}",
                id
            );

            destroyed = self.delete_tree(&mut g, id);

            // Re-number what is left of the forest.
            let inner = &mut *g;
            let staged = process(&mut inner.store, &mut inner.init_queue);
            debug_assert!(staged.is_empty());
        }

        for &d in &destroyed {
            metrics::record_version_destroyed();
            self.events.publish(&VersionEvent::Destroyed(d));
        }
        Ok(())
    }

    /// True iff `candidate` is an ancestor of `version` (every version is
    /// its own ancestor). False for unknown or not-yet-ordered ids.
    pub fn is_ancestor(&self, candidate: VersionId, version: VersionId) -> bool {
        let g = self.inner.lock().unwrap();
        let (c, v) = match (g.store.get(candidate), g.store.get(version)) {
            (Some(c), Some(v)) => (c, v),
            _ => return false,
        };
        match (c.enter, c.exit, v.enter) {
            (Some(ce), Some(cx), Some(ve)) => ce <= ve && ve <= cx,
            _ => false,
        }
    }

    /// Total order compatible with the forest (pre-order traversal).
    /// Both ids must name linked, ordered versions.
    pub fn compare(&self, a: VersionId, b: VersionId) -> Ordering {
        let g = self.inner.lock().unwrap();
        let ea = g
            .store
            .get(a)
            .unwrap_or_else(|| panic!("compare of unknown version {}", a))
            .enter
            .unwrap_or_else(|| panic!("compare of unordered version {}", a));
        let eb = g
            .store
            .get(b)
            .unwrap_or_else(|| panic!("compare of unknown version {}", b))
            .enter
            .unwrap_or_else(|| panic!("compare of unordered version {}", b));
        ea.cmp(&eb)
    }

    /// The id that would be handed out next (0 on a virgin manager).
    pub fn max_id(&self) -> VersionId {
        let g = self.inner.lock().unwrap();
        g.last.map_or(0, |l| l.wrapping_add(1))
    }

    /// Number of live records.
    pub fn live_versions(&self) -> usize {
        let g = self.inner.lock().unwrap();
        g.store.len()
    }

    /// Serialize every live record into a fresh store generation. The
    /// ordering lock is released across each append so persistence I/O
    /// never blocks readers; a record deleted mid-writeback is skipped.
    pub fn writeback(&self, mstore: &dyn Mstore) -> VResult<()> {
        let mut sink = mstore.create(MSTORE_VERSIONS_ID, VLIST_ENTRY_SIZE)?;

        let ids: Vec<VersionId> = {
            let g = self.inner.lock().unwrap();
            g.store.ids()
        };
        for id in ids {
            let entry = {
                let g = self.inner.lock().unwrap();
                match g.store.get(id) {
                    Some(v) => VlistEntry {
                        id: v.version,
                        parent: v.parent.id_or_zero(),
                        size: v.size,
                        tag: v.tag,
                    },
                    None => continue,
                }
            };
            debug!("writing back version {}", entry.id);
            sink.append(&entry)?;
            metrics::record_writeback_entry();
        }

        sink.close()?;
        Ok(())
    }

    // ---------------- internals ----------------

    /// Allocate one record against the lifetime cap. Non-root records land
    /// on the init queue; the root is linked from birth and registered
    /// synchronously.
    fn add_record(
        &self,
        g: &mut Inner,
        id: VersionId,
        parent: VersionId,
        tag: AttachTag,
        size: u64,
    ) -> VResult<()> {
        if g.allocated >= self.cfg.max_versions {
            warn!("cannot create more than {} versions", self.cfg.max_versions);
            return Err(VersionError::OverLimit(self.cfg.max_versions));
        }
        g.allocated += 1;

        debug!("adding: (v, p)=({},{})", id, parent);
        let rec = if id == 0 {
            VersionRecord::new_root(tag, size)
        } else {
            VersionRecord::new(id, parent, tag, size)
        };
        if let Err(dup) = g.store.insert(rec) {
            return Err(VersionError::Persistence(anyhow::anyhow!(
                "duplicate version id {} in record stream",
                dup
            )));
        }

        if id == 0 {
            if let Err(e) = self.presentation.register(0) {
                g.store.remove(0);
                return Err(VersionError::Persistence(
                    e.context("register version 0 with the presentation layer"),
                ));
            }
        } else {
            g.init_queue.push_front(id);
        }
        Ok(())
    }

    /// Peel leaves until (and including) `target`. Returns the removed ids
    /// in removal order.
    fn delete_tree(&self, g: &mut Inner, target: VersionId) -> Vec<VersionId> {
        let mut destroyed = Vec::new();
        let mut cur = target;
        loop {
            // Descend to the first leaf.
            while let Some(child) = g.store.get(cur).expect("broken forest link").first_child {
                cur = child;
            }
            let done = cur == target;
            let parent = self.delete_leaf(g, cur);
            destroyed.push(cur);
            if done {
                break;
            }
            cur = parent.expect("leaf below the target without a parent");
        }
        destroyed
    }

    /// Remove one leaf: deregister, unlink from the parent's child list,
    /// drop from the store. Returns the parent id.
    fn delete_leaf(&self, g: &mut Inner, vid: VersionId) -> Option<VersionId> {
        let parent = {
            let v = g.store.get(vid).expect("delete of missing record");
            assert!(!v.is_attached(), "delete of attached version {}", vid);
            assert!(v.is_linked(), "delete of unlinked version {}", vid);
            v.linked_parent()
        };

        // Presentation and store must agree.
        if let Err(e) = self.presentation.deregister(vid) {
            panic!("could not deregister version {}: {:#}", vid, e);
        }

        drop_child(&mut g.store, vid);
        g.store.remove(vid);
        parent
    }

    fn register_staged(&self, staged: &[VersionId]) {
        for &id in staged {
            if let Err(e) = self.presentation.register(id) {
                error!(
                    "could not register version {} with the presentation layer: {:#}",
                    id, e
                );
            }
        }
    }
}

/// Iterative scan for any attached record in the subtree (no recursion).
fn subtree_has_attached(store: &VersionStore, root: VersionId) -> bool {
    let mut stack = vec![root];
    while let Some(vid) = stack.pop() {
        let v = store.get(vid).expect("broken forest link");
        if v.flags & VF_ATTACHED != 0 {
            return true;
        }
        let mut c = v.first_child;
        while let Some(s) = c {
            stack.push(s);
            c = store.get(s).expect("broken sibling chain").next_sibling;
        }
    }
    false
}
