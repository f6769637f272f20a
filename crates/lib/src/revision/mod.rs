//! Revision history of canonical system documents.
//!
//! Every edit or live deployment appends a new immutable [`Revision`]; a
//! per-system pointer records which revision is currently deployed.

mod memory;
mod storage;
mod types;

pub use memory::MemoryRevisionStore;
pub use storage::{FileRevisionStore, RevisionStore};
pub use types::*;

pub(crate) use storage::check_system_id;
