use anyhow::Result;
use std::sync::{Arc, Mutex};

use LineageDB::consts::{MSTORE_VERSIONS_ID, NO_TAG};
use LineageDB::{
    LineageConfig, MemMstore, MemPresentation, VersionError, VersionEvent, VersionKind,
    VersionManager, VlistEntry,
};

fn manager() -> VersionManager {
    VersionManager::new(LineageConfig::default(), Arc::new(MemPresentation::new()))
}

// Forest 0 -> {1}, 1 -> {2, 3}, loaded from an unordered stream.
fn loaded_forest() -> Result<VersionManager> {
    let ms = MemMstore::new();
    ms.put_entries(
        MSTORE_VERSIONS_ID,
        vec![
            VlistEntry { id: 3, parent: 1, size: 0, tag: NO_TAG },
            VlistEntry { id: 1, parent: 0, size: 0, tag: NO_TAG },
            VlistEntry { id: 2, parent: 1, size: 0, tag: NO_TAG },
            VlistEntry { id: 0, parent: 0, size: 0, tag: NO_TAG },
        ],
    );
    let mgr = manager();
    mgr.bootstrap_load(&ms)?;
    Ok(mgr)
}

#[test]
fn subtree_is_peeled_leaves_first() -> Result<()> {
    let mgr = loaded_forest()?;

    let events: Arc<Mutex<Vec<VersionEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let ev = events.clone();
    let _sub = mgr.subscribe(move |e: &VersionEvent| {
        ev.lock().unwrap().push(*e);
    });

    mgr.delete_subtree(1)?;

    // Only the root survives.
    assert_eq!(mgr.live_versions(), 1);
    assert!(mgr.read(0).is_ok());
    for id in [1u32, 2, 3] {
        assert!(matches!(mgr.read(id), Err(VersionError::NotFound(_))));
        assert!(!mgr.is_ancestor(id, id), "deleted id has no ancestry");
        assert!(!mgr.is_ancestor(0, id));
    }
    assert!(mgr.read(0)?.leaf, "root became a leaf again");

    // Destroy order: deepest leaves first, the target last.
    let got = events.lock().unwrap().clone();
    assert_eq!(
        got,
        vec![
            VersionEvent::Destroyed(3),
            VersionEvent::Destroyed(2),
            VersionEvent::Destroyed(1),
        ]
    );
    Ok(())
}

#[test]
fn deleted_ids_are_not_reused() -> Result<()> {
    let mgr = loaded_forest()?;
    mgr.delete_subtree(1)?;

    // The id counter keeps climbing past destroyed versions.
    assert_eq!(mgr.max_id(), 4);
    let v = mgr.create(VersionKind::Clone, 0, NO_TAG, 0)?;
    assert_eq!(v, 4);
    assert!(mgr.is_ancestor(0, v));
    Ok(())
}

#[test]
fn delete_single_leaf() -> Result<()> {
    let mgr = loaded_forest()?;
    mgr.delete_subtree(3)?;

    assert_eq!(mgr.live_versions(), 3);
    assert!(mgr.read(1).is_ok());
    assert!(mgr.read(2).is_ok());
    assert!(mgr.is_ancestor(1, 2), "surviving ancestry is renumbered");
    Ok(())
}

#[test]
fn delete_unknown_is_not_found() -> Result<()> {
    let mgr = loaded_forest()?;
    let err = mgr.delete_subtree(9).unwrap_err();
    assert!(matches!(err, VersionError::NotFound(9)));
    Ok(())
}

#[test]
fn delete_root_is_rejected() -> Result<()> {
    let mgr = loaded_forest()?;
    let err = mgr.delete_subtree(0).unwrap_err();
    assert!(matches!(err, VersionError::InvalidArgument(_)));
    assert_eq!(mgr.live_versions(), 4);
    Ok(())
}

#[test]
#[should_panic(expected = "attached version inside deleted subtree")]
fn delete_of_attached_subtree_is_fatal() {
    let mgr = loaded_forest().unwrap();
    mgr.attach(3).unwrap();
    let _ = mgr.delete_subtree(1);
}
