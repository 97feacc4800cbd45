//! Output location resolution.

use scitracer_core::{annotations, CatalogStore, Dataset, Error, Input, Location, Result};
use tracing::info;

/// Annotation key set on locations created for multi-location outputs.
pub const ORIGIN_KEY: &str = "origin";

#[derive(Clone, Debug, PartialEq)]
pub enum LocationDecision {
    /// Outputs go to this location.
    Existing(Location),
    /// Outputs need a fresh location in this dataset.
    New(Dataset),
}

/// Decide where the outputs of one execution go, without touching the catalog.
///
/// An explicit location always wins. Otherwise a group input, or data inputs
/// from two or more locations, need a new location; a single shared location
/// is reused. Without data inputs an explicit location is required.
pub fn decide(inputs: &[Input], explicit: Option<&Location>) -> Result<LocationDecision> {
    let data: Vec<_> = inputs.iter().flat_map(Input::data_infos).collect();

    if let Some(first) = data.first() {
        let dataset = first.dataset();
        if let Some(other) = data.iter().find(|d| d.dataset().uri != dataset.uri) {
            return Err(Error::InvalidInput(format!(
                "inputs span datasets {} and {}",
                dataset.uri,
                other.dataset().uri
            )));
        }
        if let Some(location) = explicit {
            if location.dataset.uri != dataset.uri {
                return Err(Error::InvalidInput(format!(
                    "location {} is not in dataset {}",
                    location.id, dataset.uri
                )));
            }
        }
    }

    if let Some(location) = explicit {
        return Ok(LocationDecision::Existing(location.clone()));
    }

    let Some(first) = data.first() else {
        return Err(Error::InvalidInput(
            "no data inputs: an explicit output location is required".into(),
        ));
    };

    let grouped = inputs.iter().any(|i| matches!(i, Input::Group(_)));
    let spread = data.iter().any(|d| d.location.key() != first.location.key());
    if grouped || spread {
        Ok(LocationDecision::New(first.dataset().clone()))
    } else {
        Ok(LocationDecision::Existing(first.location.clone()))
    }
}

/// Decide, then create the new location if one is needed.
///
/// Each call that needs a new location creates a distinct one; call once per execution.
pub async fn resolve(
    catalog: &dyn CatalogStore,
    inputs: &[Input],
    func: &str,
    explicit: Option<&Location>,
) -> Result<Location> {
    match decide(inputs, explicit)? {
        LocationDecision::Existing(location) => Ok(location),
        LocationDecision::New(dataset) => {
            let location = catalog
                .new_location(&dataset, &annotations([(ORIGIN_KEY, func)]))
                .await?;
            info!(
                dataset = %dataset.uri,
                location = location.id,
                origin = func,
                "output location created"
            );
            Ok(location)
        }
    }
}
