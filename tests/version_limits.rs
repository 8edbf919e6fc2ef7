use anyhow::Result;
use std::sync::Arc;

use LineageDB::consts::{DEF_MAX_VERSIONS, NO_TAG};
use LineageDB::{
    LineageConfig, ManagerBuilder, MemPresentation, VersionError, VersionKind, VersionManager,
};

#[test]
fn creation_stops_at_the_lifetime_cap() -> Result<()> {
    let mgr = VersionManager::new(
        LineageConfig::default(),
        Arc::new(MemPresentation::new()),
    );
    mgr.zero_init()?;

    // The root burns one allocation; a deep chain of clones takes the rest.
    // Chaining also exercises the non-recursive DFS on a maximally deep tree.
    let mut parent = 0;
    for _ in 1..DEF_MAX_VERSIONS {
        parent = mgr.create(VersionKind::Clone, parent, NO_TAG, 0)?;
    }
    assert_eq!(mgr.live_versions() as u32, DEF_MAX_VERSIONS);
    assert_eq!(mgr.max_id(), DEF_MAX_VERSIONS);

    let before_max = mgr.max_id();
    let err = mgr.create(VersionKind::Clone, parent, NO_TAG, 0).unwrap_err();
    assert!(matches!(err, VersionError::OverLimit(n) if n == DEF_MAX_VERSIONS));

    // The forest is unchanged.
    assert_eq!(mgr.max_id(), before_max);
    assert_eq!(mgr.live_versions() as u32, DEF_MAX_VERSIONS);

    // Deep ancestry still answers in O(1).
    assert!(mgr.is_ancestor(0, parent));
    assert!(!mgr.is_ancestor(parent, 0));
    Ok(())
}

#[test]
fn cap_is_configurable() -> Result<()> {
    let mgr = ManagerBuilder::from_default()
        .max_versions(3)
        .build(Arc::new(MemPresentation::new()));
    mgr.zero_init()?;
    mgr.create(VersionKind::Clone, 0, NO_TAG, 0)?;
    mgr.create(VersionKind::Clone, 0, NO_TAG, 0)?;

    let err = mgr.create(VersionKind::Clone, 0, NO_TAG, 0).unwrap_err();
    assert!(matches!(err, VersionError::OverLimit(3)));
    Ok(())
}

#[test]
fn destroyed_versions_do_not_refill_the_cap() -> Result<()> {
    let mgr = VersionManager::new(
        LineageConfig::default().with_max_versions(3),
        Arc::new(MemPresentation::new()),
    );
    mgr.zero_init()?;
    let a = mgr.create(VersionKind::Clone, 0, NO_TAG, 0)?;
    let b = mgr.create(VersionKind::Clone, 0, NO_TAG, 0)?;

    mgr.delete_subtree(a)?;
    mgr.delete_subtree(b)?;
    assert_eq!(mgr.live_versions(), 1);

    // The cap counts lifetime allocations, not live records.
    let err = mgr.create(VersionKind::Clone, 0, NO_TAG, 0).unwrap_err();
    assert!(matches!(err, VersionError::OverLimit(3)));
    Ok(())
}
