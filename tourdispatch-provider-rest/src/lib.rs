//! REST adapter for the waste management backend.
//!
//! A single [`RestBackend`] implements every port; [`plugin`] bundles it for the
//! dispatcher. Locations travel as `GeoJSON` points, so coordinates arrive as
//! `[longitude, latitude]`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use tourdispatch_core::{
    model::{
        Assignment, AssignmentId, Bin, BinId, Category, CollectionPoint, CollectionPointId,
        Depot, DepotId, Employee, EmployeeId, FillThreshold, GeoPoint, Stop, StopStatus, Tour,
        TourId, TourStatus, Vehicle, VehicleId, VehiclePosition, VehicleStatus,
    },
    plugin::BackendPlugin,
    ports::{
        AssignmentPort, CollectionPointPort, DepotPort, EmployeePort, OptimizerPort, PortError,
        TourPort, VehiclePort,
    },
};

/// Marker the backend puts in the message of an auto-assign refused for lack of staff.
const CAPACITY_MARKER: &str = "Not enough";

/// `GeoJSON` point as stored by the backend.
#[derive(Debug, Deserialize)]
struct GeoJsonPoint {
    #[serde(default)]
    coordinates: Vec<f64>,
}

impl GeoJsonPoint {
    fn to_geo(&self) -> Option<GeoPoint> {
        match self.coordinates.as_slice() {
            [lon, lat, ..] => Some(GeoPoint {
                lat: *lat,
                lon: *lon,
            }),
            _ => None,
        }
    }
}

/// Tour from `/tournees/plan` and `/tournees/in-progress`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TourDto {
    id: String,
    tournee_type: Category,
    status: TourStatus,
    #[serde(default)]
    planned_km: f64,
    #[serde(default, rename = "plannedCO2")]
    planned_co2: f64,
    planned_vehicle_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    steps: Vec<StepDto>,
    geometry: Option<String>,
    #[serde(default)]
    assignments: Vec<AssignmentDto>,
}

/// One route step of a tour.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepDto {
    order: i32,
    status: StopStatus,
    #[serde(default)]
    predicted_fill_pct: f64,
    notes: Option<String>,
    collection_point_id: String,
}

/// Collection point from `/collectionPoints`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectionPointDto {
    id: String,
    location: Option<GeoJsonPoint>,
    #[serde(default)]
    active: bool,
    adresse: Option<String>,
    #[serde(default)]
    bins: Vec<BinDto>,
}

#[derive(Debug, Deserialize)]
struct BinDto {
    id: String,
    #[serde(default)]
    active: bool,
    // unknown categories are kept as "no category" rather than failing the point
    #[serde(rename = "type", default, deserialize_with = "lenient_category")]
    category: Option<Category>,
}

/// Depot from `/depots/main`.
#[derive(Debug, Deserialize)]
struct DepotDto {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    address: String,
    location: Option<GeoJsonPoint>,
}

/// Assignment record from `/tournee-assignments`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignmentDto {
    id: Option<String>,
    tournee_id: String,
    employee_id: String,
    vehicle_id: Option<String>,
    shift_start: Option<DateTime<Utc>>,
    shift_end: Option<DateTime<Utc>>,
}

/// Employee from `/employees/{id}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmployeeDto {
    id: String,
    full_name: Option<String>,
    email: Option<String>,
}

/// Vehicle from `/vehicles`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VehicleDto {
    id: String,
    #[serde(default)]
    plate_number: String,
    #[serde(default)]
    capacity_volume_l: f64,
    current_location: Option<GeoJsonPoint>,
    status: Option<VehicleStatus>,
}

/// Error body of a rejected request.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

fn lenient_category<'de, D>(deserializer: D) -> Result<Option<Category>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|name| {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(&name))
    }))
}

impl From<TourDto> for Tour {
    fn from(dto: TourDto) -> Self {
        Self {
            id: TourId(dto.id),
            category: dto.tournee_type,
            status: dto.status,
            planned_km: dto.planned_km,
            planned_co2: dto.planned_co2,
            planned_vehicle: dto.planned_vehicle_id.map(VehicleId),
            started_at: dto.started_at,
            finished_at: dto.finished_at,
            geometry: dto.geometry.filter(|encoded| !encoded.is_empty()),
            stops: dto.steps.into_iter().map(Stop::from).collect(),
            assignments: dto.assignments.into_iter().map(Assignment::from).collect(),
        }
    }
}

impl From<StepDto> for Stop {
    fn from(dto: StepDto) -> Self {
        Self {
            order: dto.order,
            status: dto.status,
            predicted_fill_pct: dto.predicted_fill_pct,
            note: dto.notes,
            collection_point: CollectionPointId(dto.collection_point_id),
        }
    }
}

impl From<CollectionPointDto> for CollectionPoint {
    fn from(dto: CollectionPointDto) -> Self {
        Self {
            location: dto.location.as_ref().and_then(GeoJsonPoint::to_geo),
            id: CollectionPointId(dto.id),
            address: dto.adresse.unwrap_or_default(),
            active: dto.active,
            bins: dto
                .bins
                .into_iter()
                .map(|bin| Bin {
                    id: BinId(bin.id),
                    category: bin.category,
                    active: bin.active,
                })
                .collect(),
        }
    }
}

impl From<DepotDto> for Depot {
    fn from(dto: DepotDto) -> Self {
        Self {
            location: dto.location.as_ref().and_then(GeoJsonPoint::to_geo),
            id: DepotId(dto.id),
            name: dto.name,
            address: dto.address,
        }
    }
}

impl From<AssignmentDto> for Assignment {
    fn from(dto: AssignmentDto) -> Self {
        Self {
            id: dto.id.map(AssignmentId),
            tour: TourId(dto.tournee_id),
            employee: EmployeeId(dto.employee_id),
            vehicle: dto.vehicle_id.map(VehicleId),
            shift_start: dto.shift_start,
            shift_end: dto.shift_end,
        }
    }
}

impl From<EmployeeDto> for Employee {
    fn from(dto: EmployeeDto) -> Self {
        Self {
            id: EmployeeId(dto.id),
            full_name: dto.full_name.filter(|name| !name.trim().is_empty()),
            email: dto.email,
        }
    }
}

impl From<VehicleDto> for Vehicle {
    fn from(dto: VehicleDto) -> Self {
        Self {
            id: VehicleId(dto.id),
            plate_number: dto.plate_number,
            capacity_volume_l: dto.capacity_volume_l,
            status: dto.status.unwrap_or(VehicleStatus::Unknown),
        }
    }
}

impl From<VehicleDto> for VehiclePosition {
    fn from(dto: VehicleDto) -> Self {
        Self {
            location: dto.current_location.as_ref().and_then(GeoJsonPoint::to_geo),
            vehicle: VehicleId(dto.id),
            plate_number: dto.plate_number,
            status: dto.status.unwrap_or(VehicleStatus::Unknown),
        }
    }
}

/// Every port of the dispatcher, served by one HTTP API.
#[derive(Debug, Clone)]
pub struct RestBackend {
    client: Client,
    base_url: String,
}

impl RestBackend {
    /// Create a backend bound to `client`, resolving endpoints against `base_url`
    /// (for example `http://localhost:8080/api/v1`).
    #[must_use]
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl OptimizerPort for RestBackend {
    #[instrument(skip(self), fields(threshold = %threshold))]
    async fn plan(
        &self,
        categories: &[Category],
        threshold: FillThreshold,
    ) -> Result<Vec<Tour>, PortError> {
        let req = self
            .client
            .post(self.url("tournees/plan"))
            .query(&plan_query(categories, threshold));
        let tours = fetch_json::<Vec<TourDto>>(req).await?;
        debug!(count = tours.len(), "optimizer answered");
        Ok(tours.into_iter().map(Tour::from).collect())
    }
}

#[async_trait]
impl DepotPort for RestBackend {
    async fn main_depot(&self) -> Result<Depot, PortError> {
        let req = self.client.get(self.url("depots/main"));
        fetch_json::<DepotDto>(req).await.map(Depot::from)
    }
}

#[async_trait]
impl CollectionPointPort for RestBackend {
    async fn list(&self) -> Result<Vec<CollectionPoint>, PortError> {
        let req = self.client.get(self.url("collectionPoints"));
        let points = fetch_json::<Vec<CollectionPointDto>>(req).await?;
        Ok(points.into_iter().map(CollectionPoint::from).collect())
    }

    async fn get(&self, id: &CollectionPointId) -> Result<CollectionPoint, PortError> {
        let req = self.client.get(self.url(&format!("collectionPoints/{id}")));
        fetch_json::<CollectionPointDto>(req)
            .await
            .map(CollectionPoint::from)
    }
}

#[async_trait]
impl TourPort for RestBackend {
    #[instrument(skip(self), fields(tour = %id))]
    async fn delete(&self, id: &TourId) -> Result<(), PortError> {
        let req = self.client.delete(self.url(&format!("tournees/{id}")));
        send(req).await?;
        Ok(())
    }

    async fn in_progress(&self) -> Result<Vec<Tour>, PortError> {
        let req = self.client.get(self.url("tournees/in-progress"));
        let tours = fetch_json::<Vec<TourDto>>(req).await?;
        Ok(tours.into_iter().map(Tour::from).collect())
    }
}

#[async_trait]
impl AssignmentPort for RestBackend {
    #[instrument(skip(self), fields(tour = %tour))]
    async fn auto_assign(&self, tour: &TourId) -> Result<Vec<Assignment>, PortError> {
        let req = self
            .client
            .post(self.url(&format!("tournee-assignments/{tour}/assignments/auto")));
        let assignments = fetch_json::<Vec<AssignmentDto>>(req).await?;
        Ok(assignments.into_iter().map(Assignment::from).collect())
    }

    async fn for_tour(&self, tour: &TourId) -> Result<Vec<Assignment>, PortError> {
        let req = self
            .client
            .get(self.url(&format!("tournee-assignments/tournee/{tour}")));
        let assignments = fetch_json::<Vec<AssignmentDto>>(req).await?;
        Ok(assignments.into_iter().map(Assignment::from).collect())
    }
}

#[async_trait]
impl EmployeePort for RestBackend {
    async fn get(&self, id: &EmployeeId) -> Result<Employee, PortError> {
        let req = self.client.get(self.url(&format!("employees/{id}")));
        fetch_json::<EmployeeDto>(req).await.map(Employee::from)
    }
}

#[async_trait]
impl VehiclePort for RestBackend {
    async fn get(&self, id: &VehicleId) -> Result<Vehicle, PortError> {
        let req = self.client.get(self.url(&format!("vehicles/{id}")));
        fetch_json::<VehicleDto>(req).await.map(Vehicle::from)
    }

    async fn positions(&self) -> Result<Vec<VehiclePosition>, PortError> {
        let req = self.client.get(self.url("vehicles"));
        let vehicles = fetch_json::<Vec<VehicleDto>>(req).await?;
        Ok(vehicles.into_iter().map(VehiclePosition::from).collect())
    }
}

/// Build the plugin bundle for a backend reachable at `base_url`.
#[must_use]
pub fn plugin(client: Client, base_url: &str) -> BackendPlugin {
    BackendPlugin::from_adapter("rest", Arc::new(RestBackend::new(client, base_url)))
}

/// Query of a plan request: one `type` pair per category, then the threshold.
fn plan_query(categories: &[Category], threshold: FillThreshold) -> Vec<(&'static str, String)> {
    categories
        .iter()
        .map(|category| ("type", category.as_str().to_owned()))
        .chain([("threshold", threshold.percent().to_string())])
        .collect()
}

/// Map a non-success response to the port error the dispatcher understands.
fn classify_failure(status: StatusCode, body: &str) -> PortError {
    if status == StatusCode::NOT_FOUND {
        return PortError::NotFound;
    }
    let message = error_message(body);
    if message.contains(CAPACITY_MARKER) {
        return PortError::CapacityExhausted(message);
    }
    PortError::Rejected {
        status: status.as_u16(),
        message,
    }
}

fn error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<ErrorBody>(body).unwrap_or_default();
    [parsed.message, parsed.error]
        .into_iter()
        .flatten()
        .find(|message| !message.trim().is_empty())
        .unwrap_or_else(|| body.trim().to_owned())
}

// Send the request and turn error statuses into port errors.
async fn send(req: RequestBuilder) -> Result<Response, PortError> {
    let response = req.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = match response.text().await {
        Ok(body) => body,
        Err(err) => {
            warn!(%status, error = %err, "could not read error body");
            String::new()
        }
    };
    Err(classify_failure(status, &body))
}

// Small helper to fetch and decode JSON with status handling.
async fn fetch_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, PortError> {
    let bytes = send(req).await?.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|err| PortError::Decode(err.to_string()))
}
