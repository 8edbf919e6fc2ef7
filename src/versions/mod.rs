//! Version forest: records, store, processor, manager.
//!
//! The manager (manager.rs) owns the ordering lock; the processor
//! (process.rs) threads freshly created or freshly loaded records into the
//! forest and keeps the DFS numbering valid after every mutation.

pub mod manager;
pub mod process;
pub mod record;
pub mod store;

pub use manager::{VersionInfo, VersionKind, VersionManager};
pub use record::{AttachTag, ParentLink, VersionId, VersionRecord};
pub use store::VersionStore;
