#![allow(non_snake_case)]

// Base modules
pub mod config;
pub mod consts;
pub mod errors;
pub mod metrics;

// Forest core (folder with mod.rs)
pub mod versions; // src/versions/{mod,record,store,process,manager}.rs

// Adapters
pub mod events; // in-process lifecycle pub/sub
pub mod lock; // fs2 advisory locks for the metadata root
pub mod mstore; // src/mstore/{mod,file}.rs
pub mod present; // presentation registry (sysfs stand-in)

// Convenience re-exports
pub use config::{LineageConfig, ManagerBuilder};
pub use errors::{VResult, VersionError};
pub use events::{EventSubscription, VersionEvent};
pub use mstore::{FileMstore, MemMstore, Mstore, VlistEntry};
pub use present::{MemPresentation, Presentation, RegistryPresentation};
pub use versions::{AttachTag, VersionId, VersionInfo, VersionKind, VersionManager};
