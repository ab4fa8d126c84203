//! Domain data structures for tours, stops, collection points, crews, and vehicles.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_owned())
            }
        }
    };
}

string_id!(
    /// Identifier of a planned or in-progress tour.
    TourId
);
string_id!(
    /// Identifier of a collection point.
    CollectionPointId
);
string_id!(
    /// Identifier of a single bin hosted by a collection point.
    BinId
);
string_id!(
    /// Identifier of a crew member.
    EmployeeId
);
string_id!(
    /// Identifier of a fleet vehicle.
    VehicleId
);
string_id!(
    /// Identifier of a stored assignment record.
    AssignmentId
);
string_id!(
    /// Identifier of a depot.
    DepotId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
/// Waste categories a tour can be planned for.
pub enum Category {
    /// Plastics and light packaging.
    Plastic,
    /// Organic waste.
    Organic,
    /// Paper and cardboard.
    Paper,
    /// Glass.
    Glass,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: [Category; 4] = [
        Category::Plastic,
        Category::Organic,
        Category::Paper,
        Category::Glass,
    ];

    /// Wire name used by the backend.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Plastic => "PLASTIC",
            Category::Organic => "ORGANIC",
            Category::Paper => "PAPER",
            Category::Glass => "GLASS",
        }
    }

    /// Human-friendly label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Category::Plastic => "Plastic",
            Category::Organic => "Organic",
            Category::Paper => "Paper",
            Category::Glass => "Glass",
        }
    }

    /// Hex color used when drawing a route of this category.
    #[must_use]
    pub fn route_color(self) -> &'static str {
        match self {
            Category::Plastic => "#EFFF00",
            Category::Organic => "#854d0e",
            Category::Paper => "#3b82f6",
            Category::Glass => "#22c55e",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
/// Lifecycle of a tour on the backing service.
pub enum TourStatus {
    /// Planned, no crew dispatched yet.
    Planned,
    /// Crew assigned and collecting.
    InProgress,
    /// All stops handled.
    Completed,
    /// Abandoned.
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
/// Lifecycle of a single stop.
pub enum StopStatus {
    /// Not visited yet.
    Pending,
    /// Collected.
    Done,
    /// Skipped by the crew.
    Skipped,
    /// Any status this client does not know about.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// WGS84 coordinate.
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl GeoPoint {
    /// Build a point from latitude and longitude.
    #[must_use]
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Whether both components are finite and inside the valid WGS84 ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Summary of a bin attached to a collection point.
pub struct Bin {
    /// Unique identifier.
    pub id: BinId,
    /// Category accepted by the bin, when the backend reports a known one.
    pub category: Option<Category>,
    /// Whether the bin is in service.
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Fixed location hosting one or more bins.
pub struct CollectionPoint {
    /// Unique identifier.
    pub id: CollectionPointId,
    /// Street address label.
    pub address: String,
    /// Location, absent when the backend stores an invalid geometry.
    pub location: Option<GeoPoint>,
    /// Whether the point is in service.
    pub active: bool,
    /// Bins hosted at this point.
    pub bins: Vec<Bin>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Depot where every tour starts and ends.
pub struct Depot {
    /// Unique identifier.
    pub id: DepotId,
    /// Display name.
    pub name: String,
    /// Street address.
    pub address: String,
    /// Location, absent when the backend stores an invalid geometry.
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// One visit to a collection point within a tour.
pub struct Stop {
    /// Position within the tour, as supplied by the planner.
    pub order: i32,
    /// Lifecycle status.
    pub status: StopStatus,
    /// Fill level the optimizer predicted for this point.
    pub predicted_fill_pct: f64,
    /// Optional free-text note.
    pub note: Option<String>,
    /// Collection point visited.
    pub collection_point: CollectionPointId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Binding of one crew member (and optionally a vehicle) to a tour.
pub struct Assignment {
    /// Stored identifier, when the backend returns one.
    pub id: Option<AssignmentId>,
    /// Tour the crew member works on.
    pub tour: TourId,
    /// Assigned crew member.
    pub employee: EmployeeId,
    /// Vehicle carried by the assignment payload.
    pub vehicle: Option<VehicleId>,
    /// Start of the shift.
    pub shift_start: Option<DateTime<Utc>>,
    /// Planned end of the shift.
    pub shift_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// A planned or in-progress collection route.
pub struct Tour {
    /// Unique identifier.
    pub id: TourId,
    /// Waste category collected on this tour.
    pub category: Category,
    /// Lifecycle status.
    pub status: TourStatus,
    /// Distance estimate from the optimizer, in kilometres.
    pub planned_km: f64,
    /// CO2 estimate from the optimizer, in kilograms.
    pub planned_co2: f64,
    /// Vehicle the optimizer reserved for this tour.
    pub planned_vehicle: Option<VehicleId>,
    /// When the crew started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the crew finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// Encoded polyline of the road geometry.
    pub geometry: Option<String>,
    /// Stops referencing collection points.
    pub stops: Vec<Stop>,
    /// Assignments the backend already attached to the tour.
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Crew member as reported by the employee service.
pub struct Employee {
    /// Unique identifier.
    pub id: EmployeeId,
    /// Full name, when known.
    pub full_name: Option<String>,
    /// Contact email.
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
/// Operational status of a vehicle.
pub enum VehicleStatus {
    /// Ready for a tour.
    Available,
    /// Currently on a tour.
    InService,
    /// In the workshop.
    Maintenance,
    /// Any status this client does not know about.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VehicleStatus::Available => "available",
            VehicleStatus::InService => "in service",
            VehicleStatus::Maintenance => "maintenance",
            VehicleStatus::Unknown => "unknown",
        };
        formatter.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Fleet vehicle as reported by the vehicle service.
pub struct Vehicle {
    /// Unique identifier.
    pub id: VehicleId,
    /// License plate.
    pub plate_number: String,
    /// Load capacity in litres.
    pub capacity_volume_l: f64,
    /// Operational status.
    pub status: VehicleStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Latest known position of a vehicle, superseded on every poll.
pub struct VehiclePosition {
    /// Vehicle reported.
    pub vehicle: VehicleId,
    /// License plate.
    pub plate_number: String,
    /// Operational status.
    pub status: VehicleStatus,
    /// Current location, absent when the vehicle has no valid fix.
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
/// Fill percentage above which a collection point is worth visiting.
pub struct FillThreshold(u8);

impl FillThreshold {
    /// Validate a percentage in `0..=100`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidThreshold`] for values above 100.
    pub fn new(percent: u8) -> Result<Self, DispatchError> {
        if percent > 100 {
            return Err(DispatchError::InvalidThreshold(percent));
        }
        Ok(Self(percent))
    }

    /// Percentage value.
    #[must_use]
    pub fn percent(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for FillThreshold {
    type Error = DispatchError;

    fn try_from(percent: u8) -> Result<Self, Self::Error> {
        Self::new(percent)
    }
}

impl From<FillThreshold> for u8 {
    fn from(threshold: FillThreshold) -> Self {
        threshold.0
    }
}

impl fmt::Display for FillThreshold {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}%", self.0)
    }
}
