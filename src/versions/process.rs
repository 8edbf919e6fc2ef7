//! The processor: threads init-queue records into the forest, enforcing the
//! snapshot/clone creation rules, then recomputes DFS enter/exit numbers.
//!
//! Runs under the manager's ordering lock. Returns the ids that still need
//! presentation registration; the manager performs those after releasing
//! the lock (registration may block).

use std::collections::VecDeque;

use log::{debug, warn};

use crate::consts::{NO_TAG, VF_LINKED};
use crate::metrics;
use crate::versions::record::{ParentLink, VersionId};
use crate::versions::store::VersionStore;

/// Drain the init queue and renumber the whole forest.
pub(crate) fn process(
    store: &mut VersionStore,
    init_queue: &mut VecDeque<VersionId>,
) -> Vec<VersionId> {
    metrics::record_process_run();
    let staged = link_pending(store, init_queue);
    let visited = renumber(store);
    metrics::record_dfs_nodes(visited);
    staged
}

/// Phase A: establish parent/child linkage for every queued record.
fn link_pending(store: &mut VersionStore, init_queue: &mut VecDeque<VersionId>) -> Vec<VersionId> {
    let mut staged = Vec::new();

    while let Some(head) = init_queue.pop_front() {
        // Stale entries: a record linked through parent-switching below, or
        // discarded by an earlier rejection, keeps its queue slot.
        match store.get(head) {
            None => continue,
            Some(r) if r.is_linked() => continue,
            Some(_) => {}
        }

        let mut vid = head;
        loop {
            let (parent_id, is_snap) = {
                let v = store.get(vid).expect("queued record vanished during linkage");
                match v.parent {
                    ParentLink::Unlinked(p) => (p, v.is_snapshot()),
                    _ => panic!("unlinked version {} with resolved parent slot", vid),
                }
            };
            debug!("linking version {} (parent {})", vid, parent_id);

            let (p_first_child, p_attached, p_linked) = match store.get(parent_id) {
                Some(p) => (p.first_child, p.is_attached(), p.is_linked()),
                None => panic!("version {} references missing parent {}", vid, parent_id),
            };

            // Snapshots require a childless parent.
            if is_snap {
                if let Some(child) = p_first_child {
                    warn!(
                        "ignoring snapshot {}: parent {} has a child {} already",
                        vid, parent_id, child
                    );
                    metrics::record_snapshot_reject();
                    store.remove(vid);
                    break;
                }
            }
            // Clones may not fork the attached writable leaf.
            if !is_snap && p_attached && p_first_child.is_none() {
                warn!("ignoring clone {}: parent {} is an attached leaf", vid, parent_id);
                metrics::record_clone_reject();
                store.remove(vid);
                break;
            }

            if !p_linked {
                // Ids grow strictly down the tree; anything else is a
                // corrupt stream and would cycle here forever.
                assert!(
                    parent_id < vid,
                    "parent {} not older than version {}",
                    parent_id,
                    vid
                );
                // Thread the parent first. Front-insertion keeps the whole
                // phase O(n): after climbing to the nearest linked ancestor
                // we come straight back down, linking every record on the
                // path before the queue advances.
                init_queue.push_front(vid);
                debug!("switching to unlinked parent {}", parent_id);
                vid = parent_id;
                continue;
            }

            insert_child(store, parent_id, vid);

            // Inherit the reserved size and the attachment tag.
            let (p_size, p_tag) = {
                let p = store.get(parent_id).expect("parent vanished during linkage");
                (p.size, p.tag)
            };
            let v = store.get_mut(vid).expect("record vanished during linkage");
            if p_size != 0 {
                v.size = p_size;
            }
            if v.tag == NO_TAG {
                v.tag = p_tag;
            }

            staged.push(vid);
            break;
        }
    }

    staged
}

/// Splice `vid` into `pid`'s child list, keeping it sorted by descending id.
/// Marks the record linked.
pub(crate) fn insert_child(store: &mut VersionStore, pid: VersionId, vid: VersionId) {
    // Sibling ids double as sort keys, so the scan needs no extra lookups.
    let mut prev: Option<VersionId> = None;
    let mut cur = store.get(pid).expect("insert under missing parent").first_child;
    while let Some(s) = cur {
        if s <= vid {
            break;
        }
        prev = Some(s);
        cur = store.get(s).expect("broken sibling chain").next_sibling;
    }

    match prev {
        None => store.get_mut(pid).expect("insert under missing parent").first_child = Some(vid),
        Some(pr) => store.get_mut(pr).expect("broken sibling chain").next_sibling = Some(vid),
    }

    let v = store.get_mut(vid).expect("insert of missing record");
    v.next_sibling = cur;
    v.parent = ParentLink::Linked(pid);
    v.flags |= VF_LINKED;
}

/// Unlink `vid` from its parent's child list. The record itself stays in
/// the store; the caller removes it.
pub(crate) fn drop_child(store: &mut VersionStore, vid: VersionId) {
    let (pid, next) = {
        let v = store.get(vid).expect("drop of missing record");
        (v.linked_parent(), v.next_sibling)
    };
    let pid = match pid {
        Some(p) => p,
        None => return,
    };

    let first = store.get(pid).expect("drop under missing parent").first_child;
    if first == Some(vid) {
        store.get_mut(pid).expect("drop under missing parent").first_child = next;
    } else {
        let mut cur = first;
        while let Some(s) = cur {
            let s_next = store.get(s).expect("broken sibling chain").next_sibling;
            if s_next == Some(vid) {
                store.get_mut(s).expect("broken sibling chain").next_sibling = next;
                break;
            }
            cur = s_next;
        }
    }

    store.get_mut(vid).expect("drop of missing record").next_sibling = None;
}

/// Phase B: non-recursive DFS from the root, assigning enter on the way
/// down and exit (the number of the last descendant) on the way up. Trees
/// may be deep; no recursion.
fn renumber(store: &mut VersionStore) -> u64 {
    {
        let root = store.get(0).expect("version 0 must exist");
        assert!(root.is_linked(), "version 0 must be linked");
        assert_eq!(root.parent, ParentLink::Root, "version 0 must have no parent");
    }

    let mut id: u32 = 0;
    let mut children_first = true;
    let mut cur: Option<VersionId> = Some(0);
    let mut visited: u64 = 0;

    while let Some(vid) = cur {
        let v = store.get_mut(vid).expect("broken forest link");
        let mut next = None;

        if children_first {
            id += 1;
            v.enter = Some(id);
            visited += 1;
            // Only attempt the child on the way down.
            next = v.first_child;
            if next.is_none() {
                v.exit = v.enter;
            }
        } else {
            v.exit = Some(id);
        }

        // Sibling, then parent; taking the parent turns the walk upward.
        children_first = true;
        if next.is_none() {
            next = v.next_sibling;
        }
        if next.is_none() {
            next = v.linked_parent();
            children_first = false;
        }
        cur = next;
    }

    visited
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::NO_TAG;
    use crate::versions::record::VersionRecord;

    fn store_with_root() -> VersionStore {
        let mut s = VersionStore::new();
        s.insert(VersionRecord::new_root(NO_TAG, 0)).unwrap();
        s
    }

    #[test]
    fn links_out_of_order_generations_in_one_pass() {
        let mut s = store_with_root();
        let mut q = VecDeque::new();
        // Queue order: 3 before its parent 1, grandchild chains mixed.
        for (id, parent) in [(3, 1), (1, 0), (2, 1)] {
            s.insert(VersionRecord::new(id, parent, NO_TAG, 0)).unwrap();
            q.push_front(id);
        }

        let staged = process(&mut s, &mut q);
        assert!(q.is_empty());
        assert_eq!(staged.len(), 3);

        for id in [1, 2, 3] {
            assert!(s.get(id).unwrap().is_linked(), "version {} must be linked", id);
        }
        // Child lists sorted by descending id.
        assert_eq!(s.get(0).unwrap().first_child, Some(1));
        assert_eq!(s.get(1).unwrap().first_child, Some(3));
        assert_eq!(s.get(3).unwrap().next_sibling, Some(2));
        assert_eq!(s.get(2).unwrap().next_sibling, None);
    }

    #[test]
    fn renumber_assigns_pre_post_ranges() {
        let mut s = store_with_root();
        let mut q = VecDeque::new();
        for (id, parent) in [(1, 0), (2, 0), (3, 1)] {
            s.insert(VersionRecord::new(id, parent, NO_TAG, 0)).unwrap();
            q.push_front(id);
        }
        process(&mut s, &mut q);

        // Pre-order with descending children: 0, 2, 1, 3.
        let enter = |id: VersionId| s.get(id).unwrap().enter.unwrap();
        let exit = |id: VersionId| s.get(id).unwrap().exit.unwrap();
        assert_eq!(enter(0), 1);
        assert_eq!(enter(2), 2);
        assert_eq!(enter(1), 3);
        assert_eq!(enter(3), 4);

        // Leaves collapse enter == exit; ancestors span their descendants.
        assert_eq!(exit(2), enter(2));
        assert_eq!(exit(3), enter(3));
        assert_eq!(exit(1), 4);
        assert_eq!(exit(0), 4);
    }

    #[test]
    fn size_and_tag_inheritance_at_link_time() {
        let mut s = store_with_root();
        s.get_mut(0).unwrap().tag = 9;
        s.get_mut(0).unwrap().size = 4096;

        let mut q = VecDeque::new();
        s.insert(VersionRecord::new(1, 0, NO_TAG, 512)).unwrap();
        q.push_front(1);
        process(&mut s, &mut q);

        let v = s.get(1).unwrap();
        assert_eq!(v.tag, 9, "unset tag inherits from the parent");
        assert_eq!(v.size, 4096, "nonzero parent size overrides the requested one");
    }
}
