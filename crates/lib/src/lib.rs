//! topo-lib: Core types and logic for topo
//!
//! This crate provides the building blocks used by the `topo` CLI:
//! - `System`: declarative description of containers and their definitions
//! - `reconcile`: maps freshly inspected identifiers back onto canonical ones
//! - `RevisionStore`: append-only revision chain with a deployed pointer
//! - `SystemRegistry`: version-controlled index of registered systems
//! - `Orchestrator`: the inspect/reconcile/build/deploy/commit pipeline

pub mod config;
pub mod consts;
pub mod deploy;
pub mod plan;
pub mod platform;
pub mod reconcile;
pub mod registry;
pub mod revision;
pub mod store_lock;
pub mod system;
pub mod types;
pub mod util;
