//! Query engine: the three matching semantics over a dataset's data items.
//!
//! - single: every item matching one query, anywhere in the dataset
//! - location set: per location, exactly one item for each query
//! - group set: per query, the full single-item match set
//!
//! All raw matching is delegated to `CatalogStore::match_data`; this module
//! only shapes the results.

use scitracer_core::{
    effective_annotations, Annotations, CatalogStore, DataInfo, Dataset, Error, Input, Location,
    QueryType, Result, Scalar, StorageType, Uri,
};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Resolved query, in the shape the planner consumes.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryResult {
    /// One input set per match (single) or per location (location set).
    Sets(Vec<Vec<DataInfo>>),
    /// One group per query, consumed together as a single input set.
    Groups(Vec<Vec<DataInfo>>),
}

impl QueryResult {
    /// True when nothing could be planned from this result.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Sets(sets) => sets.is_empty(),
            Self::Groups(groups) => groups.is_empty() || groups.iter().any(Vec::is_empty),
        }
    }

    /// Input sets in positional order, one per future batch item.
    pub fn into_input_sets(self) -> Vec<Vec<Input>> {
        match self {
            Self::Sets(sets) => sets
                .into_iter()
                .map(|set| set.into_iter().map(Input::Data).collect())
                .collect(),
            Self::Groups(groups) => vec![groups.into_iter().map(Input::Group).collect()],
        }
    }
}

/// Flat view row of a location.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LocationRow {
    pub id: u64,
    pub annotations: Annotations,
}

/// Flat view row of a data item, with its effective annotations.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DataRow {
    pub location: u64,
    pub uri: Uri,
    pub storage_type: StorageType,
    pub annotations: Annotations,
}

pub struct QueryEngine<'a> {
    catalog: &'a dyn CatalogStore,
}

impl<'a> QueryEngine<'a> {
    pub fn new(catalog: &'a dyn CatalogStore) -> Self {
        Self { catalog }
    }

    pub async fn query_single(
        &self,
        dataset: &Dataset,
        queries: &[Annotations],
    ) -> Result<Vec<DataInfo>> {
        let query = match queries {
            [] => Annotations::new(),
            [q] => q.clone(),
            _ => {
                return Err(Error::InvalidQuery(format!(
                    "a single-item query takes one annotation set, got {}",
                    queries.len()
                )))
            }
        };
        let items = self.catalog.match_data(dataset, &query).await?;
        debug!(dataset = %dataset.uri, matched = items.len(), "single query");
        Ok(items)
    }

    pub async fn query_loc_set(
        &self,
        dataset: &Dataset,
        queries: &[Annotations],
    ) -> Result<Vec<Vec<DataInfo>>> {
        if queries.is_empty() {
            return Err(Error::InvalidQuery(
                "a location-set query needs at least one annotation set".into(),
            ));
        }
        // per query: location id -> matches there
        let mut buckets: Vec<HashMap<u64, Vec<DataInfo>>> = Vec::with_capacity(queries.len());
        for query in queries {
            let mut by_location: HashMap<u64, Vec<DataInfo>> = HashMap::new();
            for item in self.catalog.match_data(dataset, query).await? {
                by_location.entry(item.location.id).or_default().push(item);
            }
            buckets.push(by_location);
        }

        let mut tuples = Vec::new();
        for location in self.catalog.locations(dataset).await? {
            let tuple: Option<Vec<DataInfo>> = buckets
                .iter()
                .map(|by_location| match by_location.get(&location.id).map(Vec::as_slice) {
                    Some([only]) => Some(only.clone()),
                    _ => None,
                })
                .collect();
            if let Some(tuple) = tuple {
                tuples.push(tuple);
            }
        }
        debug!(
            dataset = %dataset.uri,
            queries = queries.len(),
            matched = tuples.len(),
            "location-set query"
        );
        Ok(tuples)
    }

    pub async fn query_group_set(
        &self,
        dataset: &Dataset,
        queries: &[Annotations],
    ) -> Result<Vec<Vec<DataInfo>>> {
        if queries.is_empty() {
            return Err(Error::InvalidQuery(
                "a group-set query needs at least one annotation set".into(),
            ));
        }
        let mut groups = Vec::with_capacity(queries.len());
        for query in queries {
            groups.push(self.query_single(dataset, std::slice::from_ref(query)).await?);
        }
        debug!(
            dataset = %dataset.uri,
            sizes = ?groups.iter().map(Vec::len).collect::<Vec<_>>(),
            "group-set query"
        );
        Ok(groups)
    }

    pub async fn query(
        &self,
        dataset: &Dataset,
        queries: &[Annotations],
        query_type: QueryType,
    ) -> Result<QueryResult> {
        Ok(match query_type {
            QueryType::Single => QueryResult::Sets(
                self.query_single(dataset, queries)
                    .await?
                    .into_iter()
                    .map(|item| vec![item])
                    .collect(),
            ),
            QueryType::LocationSet => {
                QueryResult::Sets(self.query_loc_set(dataset, queries).await?)
            }
            QueryType::GroupSet => {
                QueryResult::Groups(self.query_group_set(dataset, queries).await?)
            }
        })
    }

    /// Items matching `query`, optionally only those held at `locations`.
    pub async fn query_data(
        &self,
        dataset: &Dataset,
        query: &Annotations,
        locations: Option<&[Location]>,
    ) -> Result<Vec<DataInfo>> {
        match locations {
            Some(locations) => self.catalog.match_data_at(dataset, query, locations).await,
            None => self.catalog.match_data(dataset, query).await,
        }
    }

    /// Locations whose own annotations match `query`.
    pub async fn query_locations(
        &self,
        dataset: &Dataset,
        query: &Annotations,
    ) -> Result<Vec<Location>> {
        self.catalog.match_locations(dataset, query).await
    }

    /// Every key used on a data item, with its distinct values.
    pub async fn data_annotations(
        &self,
        dataset: &Dataset,
    ) -> Result<BTreeMap<String, Vec<Scalar>>> {
        let mut keys = BTreeMap::new();
        for item in self.catalog.data_items(dataset).await? {
            collect_values(&mut keys, self.catalog.data_annotations_of(&item).await?);
        }
        Ok(finish_values(keys))
    }

    /// Every key used on a location, with its distinct values.
    pub async fn location_annotations(
        &self,
        dataset: &Dataset,
    ) -> Result<BTreeMap<String, Vec<Scalar>>> {
        let mut keys = BTreeMap::new();
        for location in self.catalog.locations(dataset).await? {
            collect_values(&mut keys, self.catalog.location_annotations_of(&location).await?);
        }
        Ok(finish_values(keys))
    }

    pub async fn view_locations(
        &self,
        dataset: &Dataset,
        query: &Annotations,
    ) -> Result<Vec<LocationRow>> {
        let mut rows = Vec::new();
        for location in self.catalog.match_locations(dataset, query).await? {
            rows.push(LocationRow {
                id: location.id,
                annotations: self.catalog.location_annotations_of(&location).await?,
            });
        }
        Ok(rows)
    }

    pub async fn view_data(
        &self,
        dataset: &Dataset,
        query: &Annotations,
        locations: Option<&[Location]>,
    ) -> Result<Vec<DataRow>> {
        let mut rows = Vec::new();
        let mut location_cache: HashMap<u64, Annotations> = HashMap::new();
        for item in self.query_data(dataset, query, locations).await? {
            let loc_ann = match location_cache.get(&item.location.id) {
                Some(ann) => ann.clone(),
                None => {
                    let ann = self.catalog.location_annotations_of(&item.location).await?;
                    location_cache.insert(item.location.id, ann.clone());
                    ann
                }
            };
            let own = self.catalog.data_annotations_of(&item).await?;
            rows.push(DataRow {
                location: item.location.id,
                uri: item.uri,
                storage_type: item.storage_type,
                annotations: effective_annotations(&loc_ann, &own),
            });
        }
        Ok(rows)
    }
}

fn collect_values(keys: &mut BTreeMap<String, Vec<Scalar>>, annotations: Annotations) {
    for (key, value) in annotations {
        let values = keys.entry(key).or_default();
        if !values.contains(&value) {
            values.push(value);
        }
    }
}

fn finish_values(mut keys: BTreeMap<String, Vec<Scalar>>) -> BTreeMap<String, Vec<Scalar>> {
    for values in keys.values_mut() {
        values.sort_by(compare_scalars);
    }
    keys
}

fn rank(value: &Scalar) -> u8 {
    match value {
        Scalar::Bool(_) => 0,
        Scalar::Int(_) => 1,
        Scalar::Float(_) => 2,
        Scalar::String(_) => 3,
    }
}

fn compare_scalars(a: &Scalar, b: &Scalar) -> Ordering {
    match (a, b) {
        (Scalar::Bool(x), Scalar::Bool(y)) => x.cmp(y),
        (Scalar::Int(x), Scalar::Int(y)) => x.cmp(y),
        (Scalar::Float(x), Scalar::Float(y)) => x.total_cmp(y),
        (Scalar::String(x), Scalar::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_sort_by_kind_then_value() {
        let mut values = vec![
            Scalar::from("b"),
            Scalar::from(2),
            Scalar::from("a"),
            Scalar::from(true),
            Scalar::from(0.5),
            Scalar::from(1),
        ];
        values.sort_by(compare_scalars);
        assert_eq!(
            values,
            vec![
                Scalar::from(true),
                Scalar::from(1),
                Scalar::from(2),
                Scalar::from(0.5),
                Scalar::from("a"),
                Scalar::from("b"),
            ]
        );
    }

    #[test]
    fn empty_group_makes_result_empty() {
        assert!(QueryResult::Groups(vec![vec![], vec![]]).is_empty());
        assert!(QueryResult::Sets(vec![]).is_empty());
        assert!(!QueryResult::Sets(vec![vec![]]).is_empty());
    }

    #[test]
    fn groups_become_one_input_set() {
        let sets = QueryResult::Groups(vec![vec![], vec![]]).into_input_sets();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0], vec![Input::Group(vec![]), Input::Group(vec![])]);
    }
}
