//! Tests for scitracer-catalog: catalog semantics, registry binding, local workspaces

use scitracer_catalog::*;
use scitracer_core::config::{ROLE_INDEX, ROLE_STORAGE};
use scitracer_core::*;

async fn populated(catalog: &dyn CatalogStore) -> (Dataset, Vec<Location>) {
    let ds = catalog.new_dataset("Demo spots").await.unwrap();
    let mut locs = Vec::new();
    for (i, pop) in ["A", "A", "B"].into_iter().enumerate() {
        let loc = catalog
            .new_location(&ds, &annotations([("population", pop)]))
            .await
            .unwrap();
        catalog
            .create_data(
                &loc,
                Uri::new(format!("raw-{}", i)),
                StorageType::Array,
                &annotations([("image", "raw")]),
                None,
            )
            .await
            .unwrap();
        locs.push(loc);
    }
    (ds, locs)
}

// ===========================================================================
// Catalog
// ===========================================================================

#[tokio::test]
async fn match_data_by_location_annotation() {
    let catalog = InMemoryCatalog::new();
    let (ds, _) = populated(&catalog).await;
    let hits = catalog
        .match_data(&ds, &annotations([("image", "raw"), ("population", "A")]))
        .await
        .unwrap();
    let uris: Vec<&str> = hits.iter().map(|d| d.uri.as_str()).collect();
    assert_eq!(uris, vec!["raw-0", "raw-1"]);
}

#[tokio::test]
async fn data_annotation_overrides_location_in_matching() {
    let catalog = InMemoryCatalog::new();
    let (ds, locs) = populated(&catalog).await;
    catalog
        .create_data(
            &locs[0],
            Uri::new("odd"),
            StorageType::Label,
            &annotations([("population", "Z")]),
            None,
        )
        .await
        .unwrap();
    let z = catalog
        .match_data(&ds, &annotations([("population", "Z")]))
        .await
        .unwrap();
    assert_eq!(z.len(), 1);
    assert_eq!(z[0].location.id, locs[0].id);
}

#[tokio::test]
async fn match_locations_in_creation_order() {
    let catalog = InMemoryCatalog::new();
    let (ds, _) = populated(&catalog).await;
    let ids: Vec<u64> = catalog
        .match_locations(&ds, &annotations([("population", "A")]))
        .await
        .unwrap()
        .iter()
        .map(|l| l.id)
        .collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(catalog.locations(&ds).await.unwrap().len(), 3);
}

#[tokio::test]
async fn annotate_overwrites_existing_key() {
    let catalog = InMemoryCatalog::new();
    let (ds, locs) = populated(&catalog).await;
    catalog
        .annotate_location(&locs[2], "population", Scalar::from("A"))
        .await
        .unwrap();
    let ann = catalog.location_annotations_of(&locs[2]).await.unwrap();
    assert_eq!(ann["population"], Scalar::from("A"));

    let item = catalog.data_items(&ds).await.unwrap().remove(0);
    catalog.annotate_data(&item, "valid", Scalar::from(true)).await.unwrap();
    let own = catalog.data_annotations_of(&item).await.unwrap();
    assert_eq!(own, annotations([("image", Scalar::from("raw")), ("valid", Scalar::from(true))]));
}

#[tokio::test]
async fn description_roundtrip() {
    let catalog = InMemoryCatalog::new();
    let ds = catalog.new_dataset("described").await.unwrap();
    assert!(catalog.get_description(&ds).await.unwrap().is_none());
    let mut doc = Metadata::new();
    doc.insert("instrument".into(), "confocal".into());
    catalog.set_description(&ds, &doc).await.unwrap();
    assert_eq!(catalog.get_description(&ds).await.unwrap(), Some(doc));
}

#[tokio::test]
async fn unknown_dataset_and_location_are_not_found() {
    let catalog = InMemoryCatalog::new();
    let err = catalog.get_dataset(&Uri::new("ghost")).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { kind: "dataset", .. }));

    let ds = catalog.new_dataset("real").await.unwrap();
    let ghost = Location { dataset: ds, id: 99 };
    let err = catalog.location_annotations_of(&ghost).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { kind: "location", .. }));
}

#[tokio::test]
async fn delete_data_removes_from_index() {
    let catalog = InMemoryCatalog::new();
    let (ds, _) = populated(&catalog).await;
    let item = catalog.data_items(&ds).await.unwrap().remove(1);
    catalog.delete_data(&item).await.unwrap();
    assert_eq!(catalog.data_items(&ds).await.unwrap().len(), 2);
    assert!(catalog.delete_data(&item).await.is_err());
}

// ===========================================================================
// Registry
// ===========================================================================

#[test]
fn builtin_registry_lists_backends() {
    let registry = BackendRegistry::with_builtin();
    assert_eq!(registry.list(ROLE_INDEX), vec!["local", "memory"]);
    assert_eq!(registry.list(ROLE_STORAGE), vec!["local", "memory"]);
    assert!(registry.list("runner").is_empty());
}

#[test]
fn unknown_backend_is_plugin_not_found() {
    let registry = BackendRegistry::with_builtin();
    let err = registry
        .storage(&BackendSection::new("s3"))
        .err()
        .unwrap();
    assert!(matches!(
        err,
        Error::PluginNotFound { ref role, ref name } if role == "storage" && name == "s3"
    ));
}

#[test]
fn local_backend_requires_workspace() {
    let registry = BackendRegistry::with_builtin();
    let err = registry.catalog(&BackendSection::new("local")).err().unwrap();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn custom_factory_replaces_builtin() {
    let mut registry = BackendRegistry::with_builtin();
    registry.register_storage("memory", |_| Err(Error::Internal("disabled".into())));
    assert!(registry.storage(&BackendSection::new("memory")).is_err());
}

// ===========================================================================
// Local workspace
// ===========================================================================

#[tokio::test]
async fn local_workspace_persists_across_bindings() {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config::sample(tmp.path());
    let registry = BackendRegistry::with_builtin();

    let uri = {
        let backends = registry.build(&config).unwrap();
        let ds = backends.catalog.new_dataset("persisted").await.unwrap();
        backends.storage.init_dataset(&ds).await.unwrap();
        let loc = backends.catalog.new_location(&ds, &Annotations::new()).await.unwrap();
        let uri = backends
            .storage
            .create(&ds, StorageType::Value, Some(&Payload::Value(4.2)))
            .await
            .unwrap();
        let tags = annotations([("value", "x")]);
        backends
            .catalog
            .create_data(&loc, uri.clone(), StorageType::Value, &tags, None)
            .await
            .unwrap();
        uri
    };

    assert!(tmp.path().join(fs::CATALOG_FILE).exists());
    let backends = registry.build(&config).unwrap();
    let ds = backends.catalog.get_dataset(&Uri::new("persisted")).await.unwrap();
    let items = backends
        .catalog
        .match_data(&ds, &annotations([("value", "x")]))
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].uri, uri);
    let payload = backends.storage.read(&uri, StorageType::Value).await.unwrap();
    assert_eq!(payload, Payload::Value(4.2));
}

#[tokio::test]
async fn in_memory_backends_are_isolated() {
    let a = Backends::in_memory();
    let b = Backends::in_memory();
    a.catalog.new_dataset("only-a").await.unwrap();
    assert!(b.catalog.datasets().await.unwrap().is_empty());
}
