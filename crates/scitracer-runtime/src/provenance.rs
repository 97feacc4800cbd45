//! Provenance records stored as the metadata document of every produced item.
//!
//! `{func, inputs, output_id}`: data inputs become their uri, groups become
//! arrays of uris, literals stay JSON primitives. The query that found the
//! inputs is not recorded.

use scitracer_core::{Error, Input, Metadata, Result, Uri};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub func: String,
    pub inputs: Vec<Value>,
    pub output_id: usize,
}

pub fn serialize_inputs(inputs: &[Input]) -> Vec<Value> {
    inputs
        .iter()
        .map(|input| match input {
            Input::Data(d) => Value::String(d.uri.as_str().to_string()),
            Input::Group(group) => Value::Array(
                group
                    .iter()
                    .map(|d| Value::String(d.uri.as_str().to_string()))
                    .collect(),
            ),
            Input::Literal(v) => v.to_json(),
        })
        .collect()
}

pub fn record(func: &str, inputs: &[Input], output_id: usize) -> ProvenanceRecord {
    ProvenanceRecord {
        func: func.to_string(),
        inputs: serialize_inputs(inputs),
        output_id,
    }
}

impl ProvenanceRecord {
    pub fn to_metadata(&self) -> Result<Metadata> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(Error::Internal("provenance record is not an object".into())),
        }
    }

    pub fn from_metadata(doc: &Metadata) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(doc.clone()))?)
    }

    /// String arguments in order, groups flattened.
    ///
    /// A string literal looks the same as a uri here; callers that need
    /// exact sources filter these against the catalog.
    pub fn source_uris(&self) -> Vec<Uri> {
        let mut uris = Vec::new();
        for input in &self.inputs {
            match input {
                Value::String(s) => uris.push(Uri::new(s.clone())),
                Value::Array(items) => uris.extend(
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(Uri::from),
                ),
                _ => {}
            }
        }
        uris
    }
}
