//! Catalog index kept in memory, optionally snapshotted to a JSON file.
//!
//! Without a snapshot path this is the development/test catalog. With one
//! (`InMemoryCatalog::open`) it is the `local` index backend: the snapshot is
//! loaded at open and rewritten after every mutation. A mutation is applied
//! to a copy of the state and only becomes visible once the snapshot is on
//! disk.

use async_trait::async_trait;
use scitracer_core::{
    check_annotation, check_annotations, effective_annotations, matches, Annotations,
    CatalogStore, DataInfo, Dataset, Error, Location, Metadata, Result, Scalar, StorageType, Uri,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogState {
    datasets: Vec<DatasetRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DatasetRecord {
    dataset: Dataset,
    #[serde(default)]
    description: Option<Metadata>,
    next_location: u64,
    locations: Vec<LocationRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LocationRecord {
    id: u64,
    annotations: Annotations,
    data: Vec<DataRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DataRecord {
    uri: Uri,
    storage_type: StorageType,
    annotations: Annotations,
    #[serde(default)]
    metadata_uri: Option<Uri>,
}

impl DataRecord {
    fn to_info(&self, location: Location) -> DataInfo {
        DataInfo {
            location,
            storage_type: self.storage_type,
            uri: self.uri.clone(),
            metadata_uri: self.metadata_uri.clone(),
        }
    }
}

impl DatasetRecord {
    fn location(&self, id: u64) -> Location {
        Location {
            dataset: self.dataset.clone(),
            id,
        }
    }

    fn location_record(&self, id: u64) -> Result<&LocationRecord> {
        self.locations
            .iter()
            .find(|l| l.id == id)
            .ok_or_else(|| Error::not_found("location", format!("{}#{}", self.dataset.uri, id)))
    }

    fn location_record_mut(&mut self, id: u64) -> Result<&mut LocationRecord> {
        let uri = self.dataset.uri.clone();
        self.locations
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| Error::not_found("location", format!("{}#{}", uri, id)))
    }

    fn data_record_mut(&mut self, uri: &Uri) -> Result<&mut DataRecord> {
        self.locations
            .iter_mut()
            .flat_map(|l| l.data.iter_mut())
            .find(|d| &d.uri == uri)
            .ok_or_else(|| Error::not_found("data", uri.as_str()))
    }

    /// Every item with its effective annotations, in catalog order.
    fn items_with_annotations(&self) -> impl Iterator<Item = (DataInfo, Annotations)> + '_ {
        self.locations.iter().flat_map(move |loc| {
            loc.data.iter().map(move |d| {
                (
                    d.to_info(self.location(loc.id)),
                    effective_annotations(&loc.annotations, &d.annotations),
                )
            })
        })
    }
}

impl CatalogState {
    fn dataset(&self, uri: &Uri) -> Result<&DatasetRecord> {
        self.datasets
            .iter()
            .find(|d| &d.dataset.uri == uri)
            .ok_or_else(|| Error::not_found("dataset", uri.as_str()))
    }

    fn dataset_mut(&mut self, uri: &Uri) -> Result<&mut DatasetRecord> {
        self.datasets
            .iter_mut()
            .find(|d| &d.dataset.uri == uri)
            .ok_or_else(|| Error::not_found("dataset", uri.as_str()))
    }

    fn unique_slug(&self, name: &str) -> String {
        let base = slugify(name);
        let taken = |s: &str| self.datasets.iter().any(|d| d.dataset.uri.as_str() == s);
        if !taken(&base) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}_{}", base, n);
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Lowercase ascii alphanumerics, everything else collapsed to `_`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_').to_string();
    if slug.is_empty() {
        "dataset".into()
    } else {
        slug
    }
}

pub struct InMemoryCatalog {
    state: RwLock<CatalogState>,
    snapshot_path: Option<PathBuf>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CatalogState::default()),
            snapshot_path: None,
        }
    }

    /// Open a catalog backed by a JSON snapshot, creating it on first mutation.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            CatalogState::default()
        };
        info!("catalog opened at {}", path.display());
        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: Some(path),
        })
    }

    async fn read<T>(&self, f: impl FnOnce(&CatalogState) -> Result<T> + Send) -> Result<T> {
        let state = self.state.read().await;
        f(&*state)
    }

    async fn mutate<T: Send>(
        &self,
        f: impl FnOnce(&mut CatalogState) -> Result<T> + Send,
    ) -> Result<T> {
        let mut state = self.state.write().await;
        let Some(path) = &self.snapshot_path else {
            return f(&mut *state);
        };
        let mut next = state.clone();
        let out = f(&mut next)?;
        write_snapshot(path, &next).await?;
        *state = next;
        Ok(out)
    }
}

/// Write the snapshot next to its target, then rename it into place.
async fn write_snapshot(path: &Path, state: &CatalogState) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, serde_json::to_vec_pretty(state)?).await?;
    tokio::fs::rename(&tmp, path).await?;
    debug!("catalog snapshot written to {}", path.display());
    Ok(())
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn set_annotation(target: &mut Annotations, what: &str, key: &str, value: Scalar) {
    if let Some(old) = target.get(key) {
        if old != &value {
            warn!(on = what, key, old = %old, new = %value, "replacing annotation value");
        }
    }
    target.insert(key.to_string(), value);
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn datasets(&self) -> Result<Vec<Dataset>> {
        self.read(|s| Ok(s.datasets.iter().map(|d| d.dataset.clone()).collect()))
            .await
    }

    async fn new_dataset(&self, name: &str) -> Result<Dataset> {
        let dataset = self.mutate(|s| {
            let dataset = Dataset {
                name: name.to_string(),
                uri: Uri::new(s.unique_slug(name)),
                metadata_uri: None,
            };
            s.datasets.push(DatasetRecord {
                dataset: dataset.clone(),
                description: None,
                next_location: 1,
                locations: Vec::new(),
            });
            Ok(dataset)
        })
        .await?;
        info!(dataset = %dataset.uri, "dataset created");
        Ok(dataset)
    }

    async fn get_dataset(&self, uri: &Uri) -> Result<Dataset> {
        self.read(|s| Ok(s.dataset(uri)?.dataset.clone())).await
    }

    async fn get_description(&self, dataset: &Dataset) -> Result<Option<Metadata>> {
        self.read(|s| Ok(s.dataset(&dataset.uri)?.description.clone()))
            .await
    }

    async fn set_description(&self, dataset: &Dataset, description: &Metadata) -> Result<()> {
        self.mutate(|s| {
            s.dataset_mut(&dataset.uri)?.description = Some(description.clone());
            Ok(())
        })
        .await
    }

    async fn new_location(
        &self,
        dataset: &Dataset,
        annotations: &Annotations,
    ) -> Result<Location> {
        check_annotations(annotations)?;
        let location = self.mutate(|s| {
            let record = s.dataset_mut(&dataset.uri)?;
            let id = record.next_location;
            record.next_location += 1;
            record.locations.push(LocationRecord {
                id,
                annotations: annotations.clone(),
                data: Vec::new(),
            });
            Ok(record.location(id))
        })
        .await?;
        debug!(dataset = %dataset.uri, location = location.id, "location created");
        Ok(location)
    }

    async fn locations(&self, dataset: &Dataset) -> Result<Vec<Location>> {
        self.read(|s| {
            let record = s.dataset(&dataset.uri)?;
            Ok(record.locations.iter().map(|l| record.location(l.id)).collect())
        })
        .await
    }

    async fn location_annotations_of(&self, location: &Location) -> Result<Annotations> {
        self.read(|s| {
            Ok(s.dataset(&location.dataset.uri)?
                .location_record(location.id)?
                .annotations
                .clone())
        })
        .await
    }

    async fn annotate_location(&self, location: &Location, key: &str, value: Scalar) -> Result<()> {
        check_annotation(key, &value)?;
        self.mutate(|s| {
            let record = s
                .dataset_mut(&location.dataset.uri)?
                .location_record_mut(location.id)?;
            set_annotation(&mut record.annotations, "location", key, value);
            Ok(())
        })
        .await
    }

    async fn annotate_data(&self, data: &DataInfo, key: &str, value: Scalar) -> Result<()> {
        check_annotation(key, &value)?;
        self.mutate(|s| {
            let record = s.dataset_mut(&data.dataset().uri)?.data_record_mut(&data.uri)?;
            set_annotation(&mut record.annotations, "data", key, value);
            Ok(())
        })
        .await
    }

    async fn create_data(
        &self,
        location: &Location,
        uri: Uri,
        storage_type: StorageType,
        annotations: &Annotations,
        metadata_uri: Option<Uri>,
    ) -> Result<DataInfo> {
        check_annotations(annotations)?;
        let info = self.mutate(|s| {
            let dataset = s.dataset_mut(&location.dataset.uri)?;
            let ds = dataset.dataset.clone();
            let record = dataset.location_record_mut(location.id)?;
            let data = DataRecord {
                uri,
                storage_type,
                annotations: annotations.clone(),
                metadata_uri,
            };
            let info = data.to_info(Location {
                dataset: ds,
                id: location.id,
            });
            record.data.push(data);
            Ok(info)
        })
        .await?;
        debug!(uri = %info.uri, location = location.id, kind = %storage_type, "data indexed");
        Ok(info)
    }

    async fn data_annotations_of(&self, data: &DataInfo) -> Result<Annotations> {
        self.read(|s| {
            s.dataset(&data.dataset().uri)?
                .locations
                .iter()
                .flat_map(|l| l.data.iter())
                .find(|d| d.uri == data.uri)
                .map(|d| d.annotations.clone())
                .ok_or_else(|| Error::not_found("data", data.uri.as_str()))
        })
        .await
    }

    async fn data_items(&self, dataset: &Dataset) -> Result<Vec<DataInfo>> {
        self.read(|s| {
            Ok(s.dataset(&dataset.uri)?
                .items_with_annotations()
                .map(|(info, _)| info)
                .collect())
        })
        .await
    }

    async fn match_data(&self, dataset: &Dataset, query: &Annotations) -> Result<Vec<DataInfo>> {
        self.read(|s| {
            Ok(s.dataset(&dataset.uri)?
                .items_with_annotations()
                .filter(|(_, ann)| matches(ann, query))
                .map(|(info, _)| info)
                .collect())
        })
        .await
    }

    async fn match_locations(
        &self,
        dataset: &Dataset,
        query: &Annotations,
    ) -> Result<Vec<Location>> {
        self.read(|s| {
            let record = s.dataset(&dataset.uri)?;
            Ok(record
                .locations
                .iter()
                .filter(|l| matches(&l.annotations, query))
                .map(|l| record.location(l.id))
                .collect())
        })
        .await
    }

    async fn delete_data(&self, data: &DataInfo) -> Result<()> {
        self.mutate(|s| {
            let record = s.dataset_mut(&data.dataset().uri)?;
            for loc in &mut record.locations {
                if let Some(pos) = loc.data.iter().position(|d| d.uri == data.uri) {
                    loc.data.remove(pos);
                    return Ok(());
                }
            }
            Err(Error::not_found("data", data.uri.as_str()))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scitracer_core::annotations;

    #[test]
    fn slugify_names() {
        assert_eq!(slugify("Demo spots"), "demo_spots");
        assert_eq!(slugify("  A--B  c "), "a_b_c");
        assert_eq!(slugify("***"), "dataset");
    }

    #[tokio::test]
    async fn duplicate_names_get_distinct_uris() {
        let cat = InMemoryCatalog::new();
        let a = cat.new_dataset("Demo").await.unwrap();
        let b = cat.new_dataset("Demo").await.unwrap();
        assert_eq!(a.uri.as_str(), "demo");
        assert_eq!(b.uri.as_str(), "demo_2");
        assert_eq!(cat.datasets().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn location_ids_increase() {
        let cat = InMemoryCatalog::new();
        let ds = cat.new_dataset("ids").await.unwrap();
        let l1 = cat.new_location(&ds, &Annotations::new()).await.unwrap();
        let l2 = cat.new_location(&ds, &Annotations::new()).await.unwrap();
        assert_eq!((l1.id, l2.id), (1, 2));
    }

    #[tokio::test]
    async fn match_uses_location_annotations() {
        let cat = InMemoryCatalog::new();
        let ds = cat.new_dataset("m").await.unwrap();
        let loc = cat
            .new_location(&ds, &annotations([("population", "A")]))
            .await
            .unwrap();
        let tags = annotations([("value", "x")]);
        cat.create_data(&loc, Uri::new("u1"), StorageType::Value, &tags, None)
            .await
            .unwrap();
        let hits = cat
            .match_data(&ds, &annotations([("population", "A"), ("value", "x")]))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        let own = cat.data_annotations_of(&hits[0]).await.unwrap();
        assert!(!own.contains_key("population"));
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("catalog.json");
        {
            let cat = InMemoryCatalog::open(&path).unwrap();
            let ds = cat.new_dataset("persist").await.unwrap();
            let loc = cat.new_location(&ds, &annotations([("id", 1)])).await.unwrap();
            cat.create_data(&loc, Uri::new("p1"), StorageType::Label, &Annotations::new(), None)
                .await
                .unwrap();
        }
        let cat = InMemoryCatalog::open(&path).unwrap();
        let ds = cat.get_dataset(&Uri::new("persist")).await.unwrap();
        assert_eq!(cat.data_items(&ds).await.unwrap().len(), 1);
        let loc = cat.new_location(&ds, &Annotations::new()).await.unwrap();
        assert_eq!(loc.id, 2);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn non_finite_annotation_leaves_snapshot_readable() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("catalog.json");
        {
            let cat = InMemoryCatalog::open(&path).unwrap();
            let ds = cat.new_dataset("snr").await.unwrap();
            let err = cat
                .new_location(&ds, &annotations([("snr", f64::INFINITY)]))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)));
            let loc = cat.new_location(&ds, &annotations([("snr", 3.5)])).await.unwrap();
            assert!(cat.annotate_location(&loc, "snr", Scalar::Float(f64::NAN)).await.is_err());
            let tags = annotations([("q", f64::NAN)]);
            assert!(cat
                .create_data(&loc, Uri::new("d"), StorageType::Value, &tags, None)
                .await
                .is_err());
        }
        let cat = InMemoryCatalog::open(&path).unwrap();
        let ds = cat.get_dataset(&Uri::new("snr")).await.unwrap();
        let locs = cat.locations(&ds).await.unwrap();
        assert_eq!(locs.len(), 1);
        assert_eq!(
            cat.location_annotations_of(&locs[0]).await.unwrap()["snr"],
            Scalar::Float(3.5)
        );
        assert!(cat.data_items(&ds).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_snapshot_write_discards_the_mutation() {
        let tmp = tempfile::tempdir().unwrap();
        // the snapshot's parent is a regular file, so every write fails
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let cat = InMemoryCatalog::open(blocker.join("catalog.json")).unwrap();
        assert!(cat.new_dataset("lost").await.is_err());
        assert!(cat.datasets().await.unwrap().is_empty());
    }
}
