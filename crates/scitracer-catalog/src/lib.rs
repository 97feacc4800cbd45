//! scitracer catalog - concrete index, storage and metadata backends
//!
//! In-memory backends for tests and scratch sessions, local-filesystem
//! backends for persistent workspaces, and the registry binding config names
//! to either.

pub mod catalog;
pub mod fs;
pub mod registry;
pub mod store;

pub use catalog::{slugify, InMemoryCatalog};
pub use fs::{open_catalog, LocalFsMetadata, LocalFsStorage};
pub use registry::{BackendRegistry, Backends};
pub use store::{InMemoryMetadata, InMemoryStorage};
