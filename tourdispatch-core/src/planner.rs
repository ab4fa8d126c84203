//! Requests tour plans from the optimizer and hydrates them for dispatch.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::error::DispatchError;
use crate::model::{Category, CollectionPointId, Depot, FillThreshold, Tour};
use crate::plugin::BackendPlugin;
use crate::ports::{CollectionPointPort, DepotPort, OptimizerPort, PortError};
use crate::resolver::{index_catalog, resolve};
use crate::state::TourView;

#[derive(Debug, Clone)]
/// Tours ready to be shown, together with the depot they start from.
pub struct PlannedTours {
    /// Main depot.
    pub depot: Depot,
    /// Tours with resolved stops, in optimizer order.
    pub tours: Vec<TourView>,
}

/// Turns optimizer output into hydrated tour views.
#[derive(Clone)]
pub struct TourPlanner {
    optimizer: Arc<dyn OptimizerPort>,
    depots: Arc<dyn DepotPort>,
    collection_points: Arc<dyn CollectionPointPort>,
}

impl TourPlanner {
    /// Create a planner over the backend's optimizer, depot, and catalog ports.
    #[must_use]
    pub fn new(backend: &BackendPlugin) -> Self {
        Self {
            optimizer: Arc::clone(&backend.optimizer),
            depots: Arc::clone(&backend.depots),
            collection_points: Arc::clone(&backend.collection_points),
        }
    }

    /// Plan tours for `categories` at `threshold`.
    ///
    /// All categories go out in a single optimizer request.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NoCategorySelected`] before any request when `categories` is empty.
    /// - [`DispatchError::NoToursProduced`] when the optimizer returns nothing, or only tours
    ///   without stops.
    /// - [`DispatchError::Planning`] when the optimizer, depot, or catalog request fails.
    #[instrument(skip(self), fields(threshold = %threshold))]
    pub async fn plan(
        &self,
        categories: &BTreeSet<Category>,
        threshold: FillThreshold,
    ) -> Result<PlannedTours, DispatchError> {
        if categories.is_empty() {
            return Err(DispatchError::NoCategorySelected);
        }
        let categories: Vec<Category> = categories.iter().copied().collect();
        let tours = self
            .optimizer
            .plan(&categories, threshold)
            .await
            .map_err(DispatchError::Planning)?;
        if tours.is_empty() {
            info!("optimizer returned no tours");
            return Err(DispatchError::NoToursProduced);
        }
        info!(tours = tours.len(), "optimizer returned tours");
        self.hydrate(tours)
            .await
            .map_err(DispatchError::Planning)?
            .ok_or(DispatchError::NoToursProduced)
    }

    /// Resolve the stops of `tours` against the collection points they reference.
    ///
    /// The depot and the union of referenced collection points are fetched concurrently,
    /// the latter in one batch. Returns `None` without any request when no tour references
    /// a collection point.
    ///
    /// # Errors
    ///
    /// Returns the first [`PortError`] raised by the depot or catalog lookup.
    pub async fn hydrate(&self, tours: Vec<Tour>) -> Result<Option<PlannedTours>, PortError> {
        let mut seen = HashSet::new();
        let referenced: Vec<CollectionPointId> = tours
            .iter()
            .flat_map(|tour| tour.stops.iter())
            .filter(|stop| seen.insert(&stop.collection_point))
            .map(|stop| stop.collection_point.clone())
            .collect();
        if referenced.is_empty() {
            info!(tours = tours.len(), "tours reference no collection points");
            return Ok(None);
        }
        debug!(points = referenced.len(), "fetching referenced collection points");

        let (depot, points) = tokio::try_join!(
            self.depots.main_depot(),
            self.collection_points.get_many(&referenced)
        )?;
        let catalog = index_catalog(points);

        let tours = tours
            .into_iter()
            .map(|tour| {
                let stops = resolve(&tour, &catalog);
                TourView::new(tour, stops)
            })
            .collect();
        Ok(Some(PlannedTours { depot, tours }))
    }
}
