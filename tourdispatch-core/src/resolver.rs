//! Hydrates tour stops with the collection points they reference.

use std::collections::HashMap;

use tracing::warn;

use crate::model::{CollectionPoint, CollectionPointId, Tour};
use crate::state::StopView;

/// Collection points keyed by id.
pub type Catalog = HashMap<CollectionPointId, CollectionPoint>;

/// Index a list of collection points by id. Later duplicates replace earlier ones.
#[must_use]
pub fn index_catalog(points: impl IntoIterator<Item = CollectionPoint>) -> Catalog {
    points
        .into_iter()
        .map(|point| (point.id.clone(), point))
        .collect()
}

/// Resolve the stops of `tour` against `catalog`, in ascending stop order.
///
/// Stops with equal order keep their original relative position. Stops whose collection
/// point is missing from the catalog are dropped.
#[must_use]
pub fn resolve(tour: &Tour, catalog: &Catalog) -> Vec<StopView> {
    let mut ordered: Vec<_> = tour.stops.iter().collect();
    ordered.sort_by_key(|stop| stop.order);

    let mut resolved = Vec::with_capacity(ordered.len());
    for stop in ordered {
        match catalog.get(&stop.collection_point) {
            Some(point) => resolved.push(StopView {
                stop: stop.clone(),
                collection_point: point.clone(),
            }),
            None => {
                warn!(
                    tour = %tour.id,
                    collection_point = %stop.collection_point,
                    "dropping stop with unknown collection point"
                );
            }
        }
    }
    resolved
}
