//! Version record: one entry per point in the history forest.

use crate::consts::{VF_ATTACHED, VF_LINKED, VF_SNAPSHOT};

pub type VersionId = u32;
pub type AttachTag = u32;

/// Parent slot of a record. "Parent id on file" and "parent resolved in the
/// forest" are distinct states; the variant must agree with the VF_LINKED
/// flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentLink {
    /// Root only (id 0).
    Root,
    /// Parent id recorded, record not yet threaded into the forest.
    Unlinked(VersionId),
    /// Threaded; the id resolves through the store.
    Linked(VersionId),
}

impl ParentLink {
    /// Parent id regardless of linkage state; 0 for the root.
    pub fn id_or_zero(&self) -> VersionId {
        match *self {
            ParentLink::Root => 0,
            ParentLink::Unlinked(p) | ParentLink::Linked(p) => p,
        }
    }
}

/// One version in the forest. Child lists are threaded through
/// first_child/next_sibling ids, ordered by descending id.
#[derive(Debug, Clone)]
pub struct VersionRecord {
    pub version: VersionId,
    pub parent: ParentLink,
    pub first_child: Option<VersionId>,
    pub next_sibling: Option<VersionId>,

    /// DFS enter/exit numbers; None until the processor has run.
    pub enter: Option<u32>,
    pub exit: Option<u32>,

    pub tag: AttachTag,
    pub size: u64,
    pub flags: u32,
}

impl VersionRecord {
    /// Fresh record awaiting linkage. The root (id 0) is special-cased by
    /// the manager and never goes through here with parent == Root.
    pub fn new(version: VersionId, parent: VersionId, tag: AttachTag, size: u64) -> Self {
        Self {
            version,
            parent: ParentLink::Unlinked(parent),
            first_child: None,
            next_sibling: None,
            enter: None,
            exit: None,
            tag,
            size,
            flags: 0,
        }
    }

    /// The root record: linked from birth, no parent.
    pub fn new_root(tag: AttachTag, size: u64) -> Self {
        Self {
            version: 0,
            parent: ParentLink::Root,
            first_child: None,
            next_sibling: None,
            enter: None,
            exit: None,
            tag,
            size,
            flags: VF_LINKED,
        }
    }

    pub fn is_linked(&self) -> bool {
        self.flags & VF_LINKED != 0
    }

    pub fn is_attached(&self) -> bool {
        self.flags & VF_ATTACHED != 0
    }

    pub fn is_snapshot(&self) -> bool {
        self.flags & VF_SNAPSHOT != 0
    }

    pub fn is_leaf(&self) -> bool {
        self.first_child.is_none()
    }

    /// Parent id when linked, None otherwise.
    pub fn linked_parent(&self) -> Option<VersionId> {
        match self.parent {
            ParentLink::Linked(p) => Some(p),
            _ => None,
        }
    }
}
