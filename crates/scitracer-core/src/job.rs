//! Jobs and their resolved execution plans.
//!
//! A `Job` is declarative: which processor, which inputs (annotation queries
//! or literals), which outputs. The planner turns it into a `Batch` of
//! `BatchItem`s whose inputs are concrete catalog entries and whose outputs
//! are pre-created placeholders.

use crate::error::Result;
use crate::payload::Payload;
use crate::types::{Annotations, DataInfo, Dataset, Scalar, StorageType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// How the query entries of a job are resolved against the catalog.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Every item matching one query.
    #[default]
    Single,
    /// Per location, exactly one item for each query.
    LocationSet,
    /// Per query, every matching item across the dataset.
    GroupSet,
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::LocationSet => write!(f, "location_set"),
            Self::GroupSet => write!(f, "group_set"),
        }
    }
}

/// One positional input of a job.
#[derive(Clone, Debug, PartialEq)]
pub enum JobInput {
    Query(Annotations),
    Literal(Scalar),
}

impl JobInput {
    pub fn query(a: Annotations) -> Self {
        Self::Query(a)
    }

    pub fn literal(v: impl Into<Scalar>) -> Self {
        Self::Literal(v.into())
    }
}

/// Declared output: payload type plus annotation template.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputSpec {
    pub storage_type: StorageType,
    pub annotations: Annotations,
}

impl OutputSpec {
    pub fn new(storage_type: StorageType, annotations: Annotations) -> Self {
        Self {
            storage_type,
            annotations,
        }
    }
}

/// A resolved argument: a catalog entry, a group of them, or a literal.
#[derive(Clone, Debug, PartialEq)]
pub enum Input {
    Data(DataInfo),
    Group(Vec<DataInfo>),
    Literal(Scalar),
}

impl Input {
    /// All data entries referenced by this input, in order.
    pub fn data_infos(&self) -> Vec<&DataInfo> {
        match self {
            Self::Data(d) => vec![d],
            Self::Group(g) => g.iter().collect(),
            Self::Literal(_) => Vec::new(),
        }
    }
}

/// A materialized argument handed to a processor.
#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    Data(Payload),
    Group(Vec<Payload>),
    Literal(Scalar),
}

impl Arg {
    pub fn as_payload(&self) -> Option<&Payload> {
        match self {
            Self::Data(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&[Payload]> {
        match self {
            Self::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Scalar> {
        match self {
            Self::Literal(v) => Some(v),
            _ => None,
        }
    }
}

/// What a processor returns.
#[derive(Clone, Debug, PartialEq)]
pub enum FuncOutput {
    Single(Payload),
    Many(Vec<Payload>),
}

impl FuncOutput {
    pub fn into_vec(self) -> Vec<Payload> {
        match self {
            Self::Single(p) => vec![p],
            Self::Many(v) => v,
        }
    }
}

pub type ProcessFn = dyn Fn(&[Arg]) -> Result<FuncOutput> + Send + Sync;

/// A named processing function. The name is its identity in lineage records.
#[derive(Clone)]
pub struct Processor {
    name: String,
    func: Arc<ProcessFn>,
}

impl Processor {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Arg]) -> Result<FuncOutput> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoke(&self, args: &[Arg]) -> Result<FuncOutput> {
        (self.func)(args)
    }
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor").field("name", &self.name).finish()
    }
}

/// Declarative processing request, consumed once by the planner.
#[derive(Clone, Debug)]
pub struct Job {
    pub processor: Processor,
    pub inputs: Vec<JobInput>,
    pub outputs: Vec<OutputSpec>,
    pub query_type: QueryType,
    /// Plan an empty batch instead of failing when the queries match nothing.
    pub allow_empty: bool,
}

impl Job {
    pub fn new(processor: Processor, inputs: Vec<JobInput>, outputs: Vec<OutputSpec>) -> Self {
        Self {
            processor,
            inputs,
            outputs,
            query_type: QueryType::default(),
            allow_empty: false,
        }
    }

    pub fn with_query_type(mut self, query_type: QueryType) -> Self {
        self.query_type = query_type;
        self
    }

    pub fn allow_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }
}

/// One resolved unit of a job.
#[derive(Clone, Debug)]
pub struct BatchItem {
    pub func: Processor,
    pub inputs: Vec<Input>,
    pub outputs: Vec<DataInfo>,
}

/// Ordered execution plan of one job.
#[derive(Clone, Debug, Default)]
pub struct Batch {
    pub job_id: String,
    pub func: String,
    pub items: Vec<BatchItem>,
}

impl Batch {
    pub fn new(job_id: impl Into<String>, func: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            func: func.into(),
            items: Vec::new(),
        }
    }

    pub fn push(&mut self, item: BatchItem) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Every batch of one planning pass, handed to a runner in one call.
#[derive(Clone, Debug)]
pub struct RunPlan {
    pub run_id: String,
    pub dataset: Dataset,
    pub batches: Vec<Batch>,
}

impl RunPlan {
    pub fn total_items(&self) -> usize {
        self.batches.iter().map(Batch::len).sum()
    }
}
