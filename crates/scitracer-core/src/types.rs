//! Catalog data model: datasets, locations, data items and their annotations.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Unique identifier of a stored object (dataset directory, payload, metadata document).
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uri(String);

impl Uri {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Uri {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Uri {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A named collection of locations. The uri is its identity for its whole lifetime.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub uri: Uri,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_uri: Option<Uri>,
}

/// One logical sample or subject inside a dataset.
///
/// `id` is assigned by the catalog and increases with creation order.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub dataset: Dataset,
    pub id: u64,
}

impl Location {
    /// Identity of the location across snapshots of its dataset record.
    pub fn key(&self) -> (&Uri, u64) {
        (&self.dataset.uri, self.id)
    }
}

/// Shape of a data item's payload.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum StorageType {
    Array,
    Table,
    Value,
    Label,
}

impl StorageType {
    pub const ALL: [StorageType; 4] = [Self::Array, Self::Table, Self::Value, Self::Label];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Array => "Array",
            Self::Table => "Table",
            Self::Value => "Value",
            Self::Label => "Label",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog entry of one stored data item.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct DataInfo {
    pub location: Location,
    pub storage_type: StorageType,
    pub uri: Uri,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_uri: Option<Uri>,
}

impl DataInfo {
    pub fn dataset(&self) -> &Dataset {
        &self.location.dataset
    }
}

/// Annotation value: the only thing queries compare on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    String(String),
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl Scalar {
    /// Parse a command-line value: bool, then integer, then float, else string.
    pub fn parse(raw: &str) -> Self {
        if let Ok(b) = raw.parse::<bool>() {
            return Self::Bool(b);
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Self::Int(i);
        }
        match raw.parse::<f64>() {
            Ok(f) if f.is_finite() => Self::Float(f),
            _ => Self::String(raw.to_string()),
        }
    }

    /// NaN and infinities have no JSON form and never compare equal in a query.
    pub fn is_storable(&self) -> bool {
        !matches!(self, Self::Float(f) if !f.is_finite())
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(*f),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Scalar {
    fn from(i: i32) -> Self {
        Self::Int(i as i64)
    }
}

impl From<f64> for Scalar {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

/// Key → value tags of a location or data item. Keys are unique.
pub type Annotations = BTreeMap<String, Scalar>;

/// Free-form JSON document (dataset description, provenance record).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Build an annotation set from pairs.
pub fn annotations<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Annotations
where
    K: Into<String>,
    V: Into<Scalar>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Reject annotation values the catalog cannot persist.
pub fn check_annotation(key: &str, value: &Scalar) -> Result<()> {
    if value.is_storable() {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "annotation '{}' has non-finite value {}",
            key, value
        )))
    }
}

pub fn check_annotations(annotations: &Annotations) -> Result<()> {
    annotations
        .iter()
        .try_for_each(|(key, value)| check_annotation(key, value))
}

/// Superset match: every key of `query` is present in `set` with an equal value.
pub fn matches(set: &Annotations, query: &Annotations) -> bool {
    query
        .iter()
        .all(|(key, value)| set.get(key).is_some_and(|v| v == value))
}

/// Location annotations overlaid with the item's own annotations.
pub fn effective_annotations(location: &Annotations, data: &Annotations) -> Annotations {
    let mut merged = location.clone();
    merged.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_matches_everything() {
        assert!(matches(&Annotations::new(), &Annotations::new()));
        assert!(matches(&annotations([("image", "raw")]), &Annotations::new()));
    }

    #[test]
    fn superset_match_requires_equal_values() {
        let set = annotations([("image", "raw"), ("population", "A")]);
        assert!(matches(&set, &annotations([("image", "raw")])));
        assert!(!matches(&set, &annotations([("image", "decon")])));
        assert!(!matches(&set, &annotations([("table", "spots")])));
    }

    #[test]
    fn scalar_variants_do_not_cross_match() {
        let set = annotations([("id", Scalar::Int(1))]);
        assert!(!matches(&set, &annotations([("id", Scalar::Float(1.0))])));
        assert!(!matches(&set, &annotations([("id", "1")])));
    }

    #[test]
    fn item_annotations_override_location() {
        let loc = annotations([("population", "A"), ("kind", "loc")]);
        let data = annotations([("kind", "data")]);
        let merged = effective_annotations(&loc, &data);
        assert_eq!(merged["population"], Scalar::from("A"));
        assert_eq!(merged["kind"], Scalar::from("data"));
    }

    #[test]
    fn scalar_parse_order() {
        assert_eq!(Scalar::parse("true"), Scalar::Bool(true));
        assert_eq!(Scalar::parse("42"), Scalar::Int(42));
        assert_eq!(Scalar::parse("0.5"), Scalar::Float(0.5));
        assert_eq!(Scalar::parse("001x"), Scalar::from("001x"));
        assert_eq!(Scalar::parse("inf"), Scalar::from("inf"));
        assert_eq!(Scalar::parse("NaN"), Scalar::from("NaN"));
    }

    #[test]
    fn non_finite_annotations_are_rejected() {
        assert!(check_annotations(&annotations([("snr", 2.5)])).is_ok());
        let err = check_annotations(&annotations([("snr", f64::INFINITY)])).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(check_annotation("snr", &Scalar::Float(f64::NAN)).is_err());
    }

    #[test]
    fn scalar_untagged_serde() {
        let v: Scalar = serde_json::from_str("3").unwrap();
        assert_eq!(v, Scalar::Int(3));
        let v: Scalar = serde_json::from_str("3.5").unwrap();
        assert_eq!(v, Scalar::Float(3.5));
        let v: Scalar = serde_json::from_str("\"raw\"").unwrap();
        assert_eq!(v, Scalar::from("raw"));
    }
}
