//! Content-addressed snapshot/transition store, DAG, and environment
//! state for the migration engine.

pub mod environment;
pub mod error;
pub mod fslock;
pub mod snapshot;
pub mod transition;

pub use environment::{EnvironmentState, EnvironmentStore};
pub use error::StoreError;
pub use fslock::DirLock;
pub use snapshot::{ManifestEntry, Snapshot, SnapshotMetadata, SnapshotStore};
pub use transition::{Graph, GraphCache, PathResult, Transition, TransitionMetadata, TransitionStore};
