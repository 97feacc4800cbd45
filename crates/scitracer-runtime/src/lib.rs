//! scitracer runtime - queries, lineage-aware execution and batch planning

pub mod call;
pub mod planner;
pub mod provenance;
pub mod query;
pub mod resolver;
pub mod runner;
pub mod session;

pub use call::{call, CallWrapper};
pub use planner::Planner;
pub use provenance::{ProvenanceRecord, serialize_inputs};
pub use query::{DataRow, LocationRow, QueryEngine, QueryResult};
pub use resolver::{decide, resolve, LocationDecision, ORIGIN_KEY};
pub use runner::LocalRunner;
pub use session::{DataTarget, Lineage, Session};
