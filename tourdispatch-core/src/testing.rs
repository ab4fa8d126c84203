//! In-memory ports that record every call, for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::task;

use crate::model::{
    Assignment, Category, CollectionPoint, CollectionPointId, Depot, DepotId, Employee,
    EmployeeId, FillThreshold, GeoPoint, Stop, StopStatus, Tour, TourId, TourStatus, Vehicle,
    VehicleId, VehiclePosition, VehicleStatus,
};
use crate::plugin::BackendPlugin;
use crate::ports::{
    AssignmentPort, CollectionPointPort, DepotPort, EmployeePort, OptimizerPort, PortError,
    TourPort, VehiclePort,
};
use crate::resolver::{index_catalog, resolve};
use crate::state::TourView;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Plan(Vec<Category>, u8),
    MainDepot,
    ListPoints,
    GetPoint(CollectionPointId),
    DeleteTour(TourId),
    InProgress,
    AutoAssign(TourId),
    AssignmentsFor(TourId),
    GetEmployee(EmployeeId),
    GetVehicle(VehicleId),
    Positions,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Failure {
    Capacity,
    Transport,
}

impl Failure {
    fn into_error(self) -> PortError {
        match self {
            Failure::Capacity => PortError::CapacityExhausted(
                "Not enough available employees to assign this tournee".to_owned(),
            ),
            Failure::Transport => PortError::Rejected {
                status: 503,
                message: "backend unavailable".to_owned(),
            },
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeState {
    pub calls: Vec<Call>,
    pub plan: Option<Result<Vec<Tour>, Failure>>,
    pub depot: Option<Depot>,
    pub points: HashMap<CollectionPointId, CollectionPoint>,
    pub list_fails: bool,
    pub point_lookup_fails: bool,
    pub in_progress: Vec<Tour>,
    pub delete_failures: HashSet<TourId>,
    pub auto_assign: HashMap<TourId, Result<Vec<Assignment>, Failure>>,
    pub stored_assignments: HashMap<TourId, Vec<Assignment>>,
    pub employees: HashMap<EmployeeId, Employee>,
    pub vehicles: HashMap<VehicleId, Vehicle>,
    pub positions: VecDeque<Result<Vec<VehiclePosition>, Failure>>,
    pub assign_in_flight: usize,
    pub assign_max_in_flight: usize,
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub(crate) fn new() -> Arc<Self> {
        let backend = Arc::new(Self::default());
        backend.with(|state| state.depot = Some(depot()));
        backend
    }

    pub(crate) fn plugin(self: &Arc<Self>) -> BackendPlugin {
        BackendPlugin::from_adapter("fake", Arc::clone(self))
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake backend lock poisoned")
    }

    pub(crate) fn with<R>(&self, edit: impl FnOnce(&mut FakeState) -> R) -> R {
        edit(&mut self.lock())
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub(crate) fn count(&self, matcher: impl Fn(&Call) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| matcher(call)).count()
    }

    pub(crate) fn add_points(&self, points: impl IntoIterator<Item = CollectionPoint>) {
        self.with(|state| state.points.extend(index_catalog(points)));
    }

    fn record(&self, call: Call) {
        self.lock().calls.push(call);
    }
}

#[async_trait]
impl OptimizerPort for FakeBackend {
    async fn plan(
        &self,
        categories: &[Category],
        threshold: FillThreshold,
    ) -> Result<Vec<Tour>, PortError> {
        self.record(Call::Plan(categories.to_vec(), threshold.percent()));
        match self.lock().plan.clone() {
            Some(Ok(tours)) => Ok(tours),
            Some(Err(failure)) => Err(failure.into_error()),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl DepotPort for FakeBackend {
    async fn main_depot(&self) -> Result<Depot, PortError> {
        self.record(Call::MainDepot);
        self.lock()
            .depot
            .clone()
            .ok_or_else(|| PortError::Internal("no depot configured".to_owned()))
    }
}

#[async_trait]
impl CollectionPointPort for FakeBackend {
    async fn list(&self) -> Result<Vec<CollectionPoint>, PortError> {
        self.record(Call::ListPoints);
        let state = self.lock();
        if state.list_fails {
            return Err(Failure::Transport.into_error());
        }
        let mut points: Vec<_> = state.points.values().cloned().collect();
        points.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(points)
    }

    async fn get(&self, id: &CollectionPointId) -> Result<CollectionPoint, PortError> {
        self.record(Call::GetPoint(id.clone()));
        let state = self.lock();
        if state.point_lookup_fails {
            return Err(Failure::Transport.into_error());
        }
        state.points.get(id).cloned().ok_or(PortError::NotFound)
    }
}

#[async_trait]
impl TourPort for FakeBackend {
    async fn delete(&self, id: &TourId) -> Result<(), PortError> {
        self.record(Call::DeleteTour(id.clone()));
        if self.lock().delete_failures.contains(id) {
            return Err(Failure::Transport.into_error());
        }
        Ok(())
    }

    async fn in_progress(&self) -> Result<Vec<Tour>, PortError> {
        self.record(Call::InProgress);
        Ok(self.lock().in_progress.clone())
    }
}

#[async_trait]
impl AssignmentPort for FakeBackend {
    async fn auto_assign(&self, tour: &TourId) -> Result<Vec<Assignment>, PortError> {
        self.with(|state| {
            state.calls.push(Call::AutoAssign(tour.clone()));
            state.assign_in_flight += 1;
            state.assign_max_in_flight = state.assign_max_in_flight.max(state.assign_in_flight);
        });
        task::yield_now().await;
        self.with(|state| {
            state.assign_in_flight -= 1;
            match state.auto_assign.get(tour).cloned() {
                Some(Ok(assignments)) => Ok(assignments),
                Some(Err(failure)) => Err(failure.into_error()),
                None => Err(PortError::Internal(format!("no script for {tour}"))),
            }
        })
    }

    async fn for_tour(&self, tour: &TourId) -> Result<Vec<Assignment>, PortError> {
        self.record(Call::AssignmentsFor(tour.clone()));
        Ok(self
            .lock()
            .stored_assignments
            .get(tour)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl EmployeePort for FakeBackend {
    async fn get(&self, id: &EmployeeId) -> Result<Employee, PortError> {
        self.record(Call::GetEmployee(id.clone()));
        self.lock().employees.get(id).cloned().ok_or(PortError::NotFound)
    }
}

#[async_trait]
impl VehiclePort for FakeBackend {
    async fn get(&self, id: &VehicleId) -> Result<Vehicle, PortError> {
        self.record(Call::GetVehicle(id.clone()));
        self.lock().vehicles.get(id).cloned().ok_or(PortError::NotFound)
    }

    async fn positions(&self) -> Result<Vec<VehiclePosition>, PortError> {
        self.record(Call::Positions);
        match self.lock().positions.pop_front() {
            Some(Ok(positions)) => Ok(positions),
            Some(Err(failure)) => Err(failure.into_error()),
            None => Ok(Vec::new()),
        }
    }
}

pub(crate) fn depot() -> Depot {
    Depot {
        id: DepotId::from("main"),
        name: "Main depot".to_owned(),
        address: "1 Depot Road".to_owned(),
        location: Some(GeoPoint::new(36.8, 10.19)),
    }
}

pub(crate) fn point(id: &str, lat: f64, lon: f64) -> CollectionPoint {
    CollectionPoint {
        id: CollectionPointId::from(id),
        address: format!("{id} street"),
        location: Some(GeoPoint::new(lat, lon)),
        active: true,
        bins: Vec::new(),
    }
}

pub(crate) fn tour(id: &str, stops: &[(&str, i32)]) -> Tour {
    Tour {
        id: TourId::from(id),
        category: Category::Plastic,
        status: TourStatus::Planned,
        planned_km: 12.5,
        planned_co2: 3.1,
        planned_vehicle: None,
        started_at: None,
        finished_at: None,
        geometry: None,
        stops: stops
            .iter()
            .map(|&(collection_point, order)| Stop {
                order,
                status: StopStatus::Pending,
                predicted_fill_pct: 85.0,
                note: None,
                collection_point: CollectionPointId::from(collection_point),
            })
            .collect(),
        assignments: Vec::new(),
    }
}

pub(crate) fn resolved_tour(planned: Tour, points: &[CollectionPoint]) -> TourView {
    let stops = resolve(&planned, &index_catalog(points.iter().cloned()));
    TourView::new(planned, stops)
}

pub(crate) fn assignment(tour: &str, employee: &str, vehicle: Option<&str>) -> Assignment {
    Assignment {
        id: None,
        tour: TourId::from(tour),
        employee: EmployeeId::from(employee),
        vehicle: vehicle.map(VehicleId::from),
        shift_start: None,
        shift_end: None,
    }
}

pub(crate) fn employee(id: &str, name: &str) -> Employee {
    Employee {
        id: EmployeeId::from(id),
        full_name: Some(name.to_owned()),
        email: None,
    }
}

pub(crate) fn vehicle(id: &str, plate: &str) -> Vehicle {
    Vehicle {
        id: VehicleId::from(id),
        plate_number: plate.to_owned(),
        capacity_volume_l: 5000.0,
        status: VehicleStatus::Available,
    }
}

pub(crate) fn position(id: &str, lat: f64, lon: f64) -> VehiclePosition {
    VehiclePosition {
        vehicle: VehicleId::from(id),
        plate_number: format!("TN-{id}"),
        status: VehicleStatus::InService,
        location: Some(GeoPoint::new(lat, lon)),
    }
}
