//! Traits describing the backing services consumed by the dispatcher.

use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::Error as ReqwestError;

use crate::model::{
    Assignment, Category, CollectionPoint, CollectionPointId, Depot, Employee, EmployeeId,
    FillThreshold, Tour, TourId, Vehicle, VehicleId, VehiclePosition,
};

#[derive(thiserror::Error, Debug)]
/// Errors that can occur while talking to backing services.
pub enum PortError {
    /// Network layer failed.
    #[error("Network error: {0}")]
    Network(#[from] ReqwestError),
    /// Response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
    /// Requested entity does not exist.
    #[error("Not found")]
    NotFound,
    /// Not enough employees or vehicles are available.
    #[error("Capacity exhausted: {0}")]
    CapacityExhausted(String),
    /// Backend answered with an error status.
    #[error("Rejected with status {status}: {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },
    /// Internal backend or adapter error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[async_trait]
/// Route optimizer producing tours with unresolved stops.
pub trait OptimizerPort: Send + Sync {
    /// Plan tours for the given categories and fill threshold.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the optimizer request fails.
    async fn plan(
        &self,
        categories: &[Category],
        threshold: FillThreshold,
    ) -> Result<Vec<Tour>, PortError>;
}

#[async_trait]
/// Depot lookup.
pub trait DepotPort: Send + Sync {
    /// Fetch the main depot.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the request fails.
    async fn main_depot(&self) -> Result<Depot, PortError>;
}

#[async_trait]
/// Collection point catalog.
pub trait CollectionPointPort: Send + Sync {
    /// List every collection point, active or not.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the request fails.
    async fn list(&self) -> Result<Vec<CollectionPoint>, PortError>;

    /// Fetch a single collection point.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::NotFound`] for unknown ids, or another [`PortError`] when the
    /// request fails.
    async fn get(&self, id: &CollectionPointId) -> Result<CollectionPoint, PortError>;

    /// Fetch several collection points in one batch. Unknown ids are left out of the
    /// result instead of failing the batch.
    ///
    /// # Errors
    ///
    /// Returns the first [`PortError`] other than [`PortError::NotFound`].
    async fn get_many(&self, ids: &[CollectionPointId]) -> Result<Vec<CollectionPoint>, PortError> {
        let lookups = ids.iter().map(|id| async move {
            match self.get(id).await {
                Ok(point) => Ok(Some(point)),
                Err(PortError::NotFound) => Ok(None),
                Err(err) => Err(err),
            }
        });
        let found = try_join_all(lookups).await?;
        Ok(found.into_iter().flatten().collect())
    }
}

#[async_trait]
/// Tour storage.
pub trait TourPort: Send + Sync {
    /// Delete a tour.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the request fails.
    async fn delete(&self, id: &TourId) -> Result<(), PortError>;

    /// List tours that are currently being collected.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the request fails.
    async fn in_progress(&self) -> Result<Vec<Tour>, PortError>;
}

#[async_trait]
/// Crew and vehicle assignment.
pub trait AssignmentPort: Send + Sync {
    /// Ask the backend to pick crew (and a vehicle) for a tour.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::CapacityExhausted`] when the employee pool is insufficient, or
    /// another [`PortError`] when the request fails.
    async fn auto_assign(&self, tour: &TourId) -> Result<Vec<Assignment>, PortError>;

    /// List assignments already stored for a tour.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the request fails.
    async fn for_tour(&self, tour: &TourId) -> Result<Vec<Assignment>, PortError>;
}

#[async_trait]
/// Employee lookup.
pub trait EmployeePort: Send + Sync {
    /// Fetch a single employee.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the request fails.
    async fn get(&self, id: &EmployeeId) -> Result<Employee, PortError>;

    /// Fetch several employees in one batch, preserving the order of `ids`.
    ///
    /// # Errors
    ///
    /// Returns the first [`PortError`] raised by any lookup.
    async fn get_many(&self, ids: &[EmployeeId]) -> Result<Vec<Employee>, PortError> {
        try_join_all(ids.iter().map(|id| self.get(id))).await
    }
}

#[async_trait]
/// Vehicle lookup and live positions.
pub trait VehiclePort: Send + Sync {
    /// Fetch a single vehicle.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the request fails.
    async fn get(&self, id: &VehicleId) -> Result<Vehicle, PortError>;

    /// Current position of every vehicle in the fleet.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the request fails.
    async fn positions(&self) -> Result<Vec<VehiclePosition>, PortError>;
}
