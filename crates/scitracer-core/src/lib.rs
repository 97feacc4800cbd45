//! scitracer core - data model, backend traits, and error handling

pub mod backend;
pub mod config;
pub mod error;
pub mod job;
pub mod manifest;
pub mod payload;
pub mod types;

pub use backend::{CatalogStore, MetadataBackend, Runner, StorageBackend};
pub use config::{BackendSection, Config};
pub use error::{Error, Result};
pub use job::*;
pub use manifest::{JobState, JobStatus, Outcome, RunManifest};
pub use payload::{classify, Payload, Table, Tensor, TensorRegion};
pub use types::*;
