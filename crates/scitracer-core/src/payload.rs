//! Payload values carried by data items, and classification of untyped JSON
//! into a storage type.

use crate::error::{Error, Result};
use crate::types::StorageType;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Dense row-major n-dimensional array.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTensor")]
pub struct Tensor {
    pub shape: Vec<usize>,
    #[serde(serialize_with = "float_vec::serialize")]
    pub data: Vec<f64>,
}

#[derive(Deserialize)]
struct RawTensor {
    shape: Vec<usize>,
    #[serde(with = "float_vec")]
    data: Vec<f64>,
}

impl TryFrom<RawTensor> for Tensor {
    type Error = Error;

    fn try_from(raw: RawTensor) -> Result<Self> {
        Tensor::new(raw.shape, raw.data)
    }
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(Error::InvalidInput(format!(
                "tensor shape {:?} needs {} values, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn max(&self) -> Option<f64> {
        self.data.iter().copied().reduce(f64::max)
    }

    fn to_json_axis(&self, axis: usize, offset: usize) -> Value {
        if axis + 1 == self.shape.len() {
            return Value::from(self.data[offset..offset + self.shape[axis]].to_vec());
        }
        let stride: usize = self.shape[axis + 1..].iter().product();
        Value::Array(
            (0..self.shape[axis])
                .map(|i| self.to_json_axis(axis + 1, offset + i * stride))
                .collect(),
        )
    }
}

/// Numeric table: named columns, one row per instance.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct Table {
    pub columns: Vec<String>,
    #[serde(serialize_with = "float_rows::serialize")]
    pub rows: Vec<Vec<f64>>,
}

#[derive(Deserialize)]
struct RawTable {
    columns: Vec<String>,
    #[serde(with = "float_rows")]
    rows: Vec<Vec<f64>>,
}

impl TryFrom<RawTable> for Table {
    type Error = Error;

    fn try_from(raw: RawTable) -> Result<Self> {
        Table::new(raw.columns, raw.rows)
    }
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if let Some(bad) = rows.iter().position(|r| r.len() != columns.len()) {
            return Err(Error::InvalidInput(format!(
                "table row {} has {} cells, expected {}",
                bad,
                rows[bad].len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }
}

/// A materialized data item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Array(Tensor),
    Table(Table),
    Value(#[serde(with = "float")] f64),
    Label(String),
}

impl Payload {
    pub fn storage_type(&self) -> StorageType {
        match self {
            Self::Array(_) => StorageType::Array,
            Self::Table(_) => StorageType::Table,
            Self::Value(_) => StorageType::Value,
            Self::Label(_) => StorageType::Label,
        }
    }

    /// Empty payload of a given type, written for placeholders until a runner fills them.
    pub fn empty(storage_type: StorageType) -> Self {
        match storage_type {
            StorageType::Array => Self::Array(Tensor::zeros(vec![0])),
            StorageType::Table => Self::Table(Table::default()),
            StorageType::Value => Self::Value(0.0),
            StorageType::Label => Self::Label(String::new()),
        }
    }

    /// Build a payload from an untyped JSON value.
    pub fn from_json(value: &Value) -> Result<Self> {
        let kind = classify(value).ok_or_else(|| {
            Error::UnknownStorageType(format!("cannot store {}", short_json(value)))
        })?;
        match kind {
            StorageType::Array => {
                let mut shape = Vec::new();
                let mut data = Vec::new();
                flatten_numeric(value, 0, &mut shape, &mut data);
                Ok(Self::Array(Tensor::new(shape, data)?))
            }
            StorageType::Table => {
                let Value::Object(map) = value else {
                    return Err(Error::Internal("table classified from non-object".into()));
                };
                let columns: Vec<String> = map.keys().cloned().collect();
                let height = map.values().next().and_then(Value::as_array).map_or(0, Vec::len);
                let rows = (0..height)
                    .map(|r| {
                        map.values()
                            .map(|col| col[r].as_f64().unwrap_or(f64::NAN))
                            .collect()
                    })
                    .collect();
                Ok(Self::Table(Table::new(columns, rows)?))
            }
            StorageType::Value => match value {
                Value::Bool(b) => Ok(Self::Value(if *b { 1.0 } else { 0.0 })),
                _ => Ok(Self::Value(value.as_f64().unwrap_or(f64::NAN))),
            },
            StorageType::Label => Ok(Self::Label(value.as_str().unwrap_or_default().to_string())),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Array(t) if t.shape.is_empty() => Value::Array(Vec::new()),
            Self::Array(t) => t.to_json_axis(0, 0),
            Self::Table(t) => {
                let mut map = serde_json::Map::new();
                for (i, name) in t.columns.iter().enumerate() {
                    map.insert(
                        name.clone(),
                        Value::from(t.rows.iter().map(|r| r[i]).collect::<Vec<_>>()),
                    );
                }
                Value::Object(map)
            }
            Self::Value(v) => Value::from(*v),
            Self::Label(s) => Value::String(s.clone()),
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Self::Array(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Self::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<&str> {
        match self {
            Self::Label(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Tensor> for Payload {
    fn from(t: Tensor) -> Self {
        Self::Array(t)
    }
}

impl From<Table> for Payload {
    fn from(t: Table) -> Self {
        Self::Table(t)
    }
}

impl From<f64> for Payload {
    fn from(v: f64) -> Self {
        Self::Value(v)
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Self::Label(s)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self::Label(s.to_string())
    }
}

/// Classify an untyped value, probing Array, Table, Value, Label in that order.
pub fn classify(value: &Value) -> Option<StorageType> {
    if value.is_array() && numeric_shape(value).is_some() {
        return Some(StorageType::Array);
    }
    if is_column_table(value) {
        return Some(StorageType::Table);
    }
    match value {
        Value::Number(_) | Value::Bool(_) => Some(StorageType::Value),
        Value::String(_) => Some(StorageType::Label),
        _ => None,
    }
}

/// Shape of a rectangular nested array of numbers.
fn numeric_shape(value: &Value) -> Option<Vec<usize>> {
    match value {
        Value::Number(_) => Some(Vec::new()),
        Value::Array(items) => {
            let Some(first) = items.first() else {
                return Some(vec![0]);
            };
            let inner = numeric_shape(first)?;
            for item in &items[1..] {
                if numeric_shape(item)? != inner {
                    return None;
                }
            }
            let mut shape = vec![items.len()];
            shape.extend(inner);
            Some(shape)
        }
        _ => None,
    }
}

fn is_column_table(value: &Value) -> bool {
    let Value::Object(map) = value else {
        return false;
    };
    if map.is_empty() {
        return false;
    }
    let mut height = None;
    for col in map.values() {
        let Some(cells) = col.as_array() else {
            return false;
        };
        if !cells.iter().all(Value::is_number) {
            return false;
        }
        match height {
            None => height = Some(cells.len()),
            Some(h) if h != cells.len() => return false,
            Some(_) => {}
        }
    }
    true
}

fn flatten_numeric(value: &Value, depth: usize, shape: &mut Vec<usize>, data: &mut Vec<f64>) {
    match value {
        Value::Array(items) => {
            if shape.len() == depth {
                shape.push(items.len());
            }
            for item in items {
                flatten_numeric(item, depth + 1, shape, data);
            }
        }
        other => data.push(other.as_f64().unwrap_or(f64::NAN)),
    }
}

fn short_json(value: &Value) -> String {
    let s = value.to_string();
    match s.char_indices().nth(64) {
        Some((end, _)) => format!("{}...", &s[..end]),
        None => s,
    }
}

/// f64 as stored on disk. JSON has no NaN or infinity, so those are written
/// as the strings `"NaN"`, `"inf"` and `"-inf"`.
#[derive(Clone, Copy)]
struct StoredFloat(f64);

impl Serialize for StoredFloat {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let v = self.0;
        if v.is_finite() {
            serializer.serialize_f64(v)
        } else if v.is_nan() {
            serializer.serialize_str("NaN")
        } else if v > 0.0 {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }
}

impl<'de> Deserialize<'de> for StoredFloat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Number(v) => Ok(Self(v)),
            Repr::Text(t) => match t.as_str() {
                "NaN" => Ok(Self(f64::NAN)),
                "inf" => Ok(Self(f64::INFINITY)),
                "-inf" => Ok(Self(f64::NEG_INFINITY)),
                other => Err(serde::de::Error::custom(format!("not a number: '{}'", other))),
            },
        }
    }
}

mod float {
    use super::StoredFloat;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        StoredFloat(*v).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        StoredFloat::deserialize(d).map(|f| f.0)
    }
}

mod float_vec {
    use super::StoredFloat;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &[f64], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(v.iter().map(|x| StoredFloat(*x)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f64>, D::Error> {
        Ok(Vec::<StoredFloat>::deserialize(d)?.into_iter().map(|f| f.0).collect())
    }
}

mod float_rows {
    use super::StoredFloat;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(rows: &[Vec<f64>], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(
            rows.iter()
                .map(|r| r.iter().map(|x| StoredFloat(*x)).collect::<Vec<_>>()),
        )
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Vec<f64>>, D::Error> {
        Ok(Vec::<Vec<StoredFloat>>::deserialize(d)?
            .into_iter()
            .map(|r| r.into_iter().map(|f| f.0).collect())
            .collect())
    }
}

/// Rectangular sub-region of a 2-D tensor. `None` selects the whole axis.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TensorRegion {
    pub indexes: Vec<Option<(usize, usize)>>,
}

impl TensorRegion {
    pub fn new(indexes: Vec<Option<(usize, usize)>>) -> Self {
        Self { indexes }
    }

    fn axis_range(&self, axis: usize, len: usize) -> Result<(usize, usize)> {
        let (min, max) = self.indexes[axis].unwrap_or((0, len));
        if min > max || max > len {
            return Err(Error::InvalidInput(format!(
                "region [{}, {}) out of bounds for axis {} of length {}",
                min, max, axis, len
            )));
        }
        Ok((min, max))
    }

    pub fn extract(&self, tensor: &Tensor) -> Result<Tensor> {
        if tensor.ndim() != self.indexes.len() {
            return Err(Error::InvalidInput(format!(
                "region has {} indexes, tensor has {} dimensions",
                self.indexes.len(),
                tensor.ndim()
            )));
        }
        if tensor.ndim() != 2 {
            return Err(Error::InvalidInput(format!(
                "region extraction is only implemented for 2-D tensors, got {}-D",
                tensor.ndim()
            )));
        }
        let (min_x, max_x) = self.axis_range(0, tensor.shape[0])?;
        let (min_y, max_y) = self.axis_range(1, tensor.shape[1])?;
        let width = tensor.shape[1];
        let mut data = Vec::with_capacity((max_x - min_x) * (max_y - min_y));
        for row in min_x..max_x {
            data.extend_from_slice(&tensor.data[row * width + min_y..row * width + max_y]);
        }
        Tensor::new(vec![max_x - min_x, max_y - min_y], data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_fixed_order() {
        assert_eq!(classify(&json!([[1, 2], [3, 4]])), Some(StorageType::Array));
        assert_eq!(classify(&json!({"x": [1.0, 2.0], "y": [3, 4]})), Some(StorageType::Table));
        assert_eq!(classify(&json!(0.5)), Some(StorageType::Value));
        assert_eq!(classify(&json!(true)), Some(StorageType::Value));
        assert_eq!(classify(&json!("spots")), Some(StorageType::Label));
        assert_eq!(classify(&json!(null)), None);
        assert_eq!(classify(&json!([[1, 2], [3]])), None);
        assert_eq!(classify(&json!({"x": [1], "y": [1, 2]})), None);
    }

    #[test]
    fn unknown_value_is_an_error() {
        let err = Payload::from_json(&json!({"nested": {"a": 1}})).unwrap_err();
        assert!(matches!(err, Error::UnknownStorageType(_)));
    }

    #[test]
    fn from_json_builds_tensor_shape() {
        let p = Payload::from_json(&json!([[1, 2, 3], [4, 5, 6]])).unwrap();
        let t = p.as_tensor().unwrap();
        assert_eq!(t.shape, vec![2, 3]);
        assert_eq!(t.data, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(p.to_json(), json!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]));
    }

    #[test]
    fn from_json_builds_table_rows() {
        let p = Payload::from_json(&json!({"x": [1, 2], "y": [10, 20]})).unwrap();
        let t = p.as_table().unwrap();
        assert_eq!(t.columns, vec!["x", "y"]);
        assert_eq!(t.rows, vec![vec![1.0, 10.0], vec![2.0, 20.0]]);
        assert_eq!(t.column("y"), Some(vec![10.0, 20.0]));
    }

    #[test]
    fn unknown_value_message_truncates_on_char_boundary() {
        let err = Payload::from_json(&json!({"k": {"n": "é".repeat(40)}})).unwrap_err();
        let Error::UnknownStorageType(msg) = err else {
            panic!("expected UnknownStorageType, got {:?}", err);
        };
        assert!(msg.ends_with("..."));
    }

    #[test]
    fn non_finite_floats_survive_serde() {
        let payloads = [
            Payload::Value(f64::NAN),
            Payload::Value(f64::NEG_INFINITY),
            Payload::Array(Tensor::new(vec![3], vec![1.0, f64::INFINITY, f64::NAN]).unwrap()),
            Payload::Table(
                Table::new(vec!["mean".into()], vec![vec![f64::NAN], vec![2.0]]).unwrap(),
            ),
        ];
        for payload in payloads {
            let text = serde_json::to_string(&payload).unwrap();
            let back: Payload = serde_json::from_str(&text).unwrap();
            assert_eq!(serde_json::to_string(&back).unwrap(), text);
            assert_eq!(back.storage_type(), payload.storage_type());
        }
        let back: Payload = serde_json::from_str(r#"{"Value":"NaN"}"#).unwrap();
        assert!(back.as_value().unwrap().is_nan());
        assert!(serde_json::from_str::<Payload>(r#"{"Value":"lots"}"#).is_err());
    }

    #[test]
    fn deserialize_checks_tensor_and_table_shape() {
        let bad_tensor = r#"{"Array":{"shape":[2,2],"data":[1.0,2.0,3.0]}}"#;
        assert!(serde_json::from_str::<Payload>(bad_tensor).is_err());
        let bad_table = r#"{"Table":{"columns":["a","b"],"rows":[[1.0]]}}"#;
        assert!(serde_json::from_str::<Payload>(bad_table).is_err());
        let good = r#"{"Array":{"shape":[1,2],"data":[1.0,2.0]}}"#;
        assert!(serde_json::from_str::<Payload>(good).is_ok());
    }

    #[test]
    fn tensor_new_checks_length() {
        assert!(Tensor::new(vec![2, 2], vec![1.0; 3]).is_err());
        assert!(Tensor::new(vec![2, 2], vec![1.0; 4]).is_ok());
    }

    #[test]
    fn region_uses_each_axis_range() {
        let t = Tensor::new(vec![3, 4], (0..12).map(f64::from).collect()).unwrap();
        let region = TensorRegion::new(vec![Some((0, 2)), Some((1, 3))]);
        let sub = region.extract(&t).unwrap();
        assert_eq!(sub.shape, vec![2, 2]);
        assert_eq!(sub.data, vec![1.0, 2.0, 5.0, 6.0]);
    }

    #[test]
    fn region_none_selects_full_axis() {
        let t = Tensor::new(vec![2, 3], (0..6).map(f64::from).collect()).unwrap();
        let sub = TensorRegion::new(vec![Some((1, 2)), None]).extract(&t).unwrap();
        assert_eq!(sub.shape, vec![1, 3]);
        assert_eq!(sub.data, vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn region_rejects_mismatched_dims() {
        let t = Tensor::zeros(vec![2, 2, 2]);
        assert!(TensorRegion::new(vec![None, None]).extract(&t).is_err());
        assert!(TensorRegion::new(vec![None, None, None]).extract(&t).is_err());
        let t = Tensor::zeros(vec![2, 2]);
        assert!(TensorRegion::new(vec![Some((0, 3)), None]).extract(&t).is_err());
    }
}
