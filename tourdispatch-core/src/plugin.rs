//! Bundle of ports that together make up one backend deployment.

use std::fmt;
use std::sync::Arc;

use crate::ports::{
    AssignmentPort, CollectionPointPort, DepotPort, EmployeePort, OptimizerPort, TourPort,
    VehiclePort,
};

/// Collection of ports implementing every service the dispatcher consumes.
#[derive(Clone)]
pub struct BackendPlugin {
    /// Human-friendly name of the backend, used in logs.
    pub name: String,
    /// Route optimizer.
    pub optimizer: Arc<dyn OptimizerPort>,
    /// Depot lookup.
    pub depots: Arc<dyn DepotPort>,
    /// Collection point catalog.
    pub collection_points: Arc<dyn CollectionPointPort>,
    /// Tour storage.
    pub tours: Arc<dyn TourPort>,
    /// Crew assignment.
    pub assignments: Arc<dyn AssignmentPort>,
    /// Employee lookup.
    pub employees: Arc<dyn EmployeePort>,
    /// Vehicle lookup and live positions.
    pub vehicles: Arc<dyn VehiclePort>,
}

impl BackendPlugin {
    /// Build a bundle where a single adapter implements every port.
    #[must_use]
    pub fn from_adapter<A>(name: impl Into<String>, adapter: Arc<A>) -> Self
    where
        A: OptimizerPort
            + DepotPort
            + CollectionPointPort
            + TourPort
            + AssignmentPort
            + EmployeePort
            + VehiclePort
            + 'static,
    {
        let optimizer: Arc<dyn OptimizerPort> = Arc::<A>::clone(&adapter);
        let depots: Arc<dyn DepotPort> = Arc::<A>::clone(&adapter);
        let collection_points: Arc<dyn CollectionPointPort> = Arc::<A>::clone(&adapter);
        let tours: Arc<dyn TourPort> = Arc::<A>::clone(&adapter);
        let assignments: Arc<dyn AssignmentPort> = Arc::<A>::clone(&adapter);
        let employees: Arc<dyn EmployeePort> = Arc::<A>::clone(&adapter);
        let vehicles: Arc<dyn VehiclePort> = adapter;
        Self {
            name: name.into(),
            optimizer,
            depots,
            collection_points,
            tours,
            assignments,
            employees,
            vehicles,
        }
    }
}

impl fmt::Debug for BackendPlugin {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("BackendPlugin")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
