//! In-memory dispatch state: known tours, focus, selection, and transient notices.

use std::fmt;
use std::mem;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::DispatchError;
use crate::model::{
    Assignment, CollectionPoint, CollectionPointId, Depot, EmployeeId, GeoPoint, Stop, Tour,
    TourId, TourStatus, VehicleId,
};

#[derive(Debug, Clone)]
/// A stop joined with the collection point it visits.
pub struct StopView {
    /// Stop as planned.
    pub stop: Stop,
    /// Resolved collection point.
    pub collection_point: CollectionPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Assignment facet of a tour.
pub enum AssignmentPhase {
    /// No crew yet.
    Unassigned,
    /// An auto-assign request is outstanding.
    Assigning,
    /// Crew assigned; terminal for this client.
    Assigned,
    /// The last attempt failed; a retry is allowed.
    AssignFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Display role of a crew member.
pub enum CrewRole {
    /// First resolved crew member.
    Driver,
    /// Every further crew member.
    Collector,
}

impl fmt::Display for CrewRole {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrewRole::Driver => formatter.write_str("Driver"),
            CrewRole::Collector => formatter.write_str("Collector"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Crew member ready for display.
pub struct CrewMember {
    /// Employee id.
    pub id: EmployeeId,
    /// Full name, or the id when the name is unknown.
    pub full_name: String,
    /// Display role.
    pub role: CrewRole,
}

#[derive(Debug, Clone, PartialEq)]
/// Vehicle ready for display.
pub struct VehicleSummary {
    /// Vehicle id.
    pub id: VehicleId,
    /// License plate.
    pub plate_number: String,
    /// Load capacity in litres.
    pub capacity_volume_l: f64,
}

#[derive(Debug, Clone)]
/// A tour with resolved stops and its assignment details.
pub struct TourView {
    /// Tour as planned.
    pub tour: Tour,
    /// Resolved stops in visiting order.
    pub stops: Vec<StopView>,
    /// Assignments binding crew to the tour.
    pub assignments: Vec<Assignment>,
    /// Hydrated crew, driver first.
    pub crew: Vec<CrewMember>,
    /// Hydrated vehicle.
    pub vehicle: Option<VehicleSummary>,
    /// Assignment phase.
    pub phase: AssignmentPhase,
}

impl TourView {
    /// Build a view; assignments delivered with the tour mark it as assigned.
    #[must_use]
    pub fn new(mut tour: Tour, stops: Vec<StopView>) -> Self {
        let assignments = mem::take(&mut tour.assignments);
        let phase = if assignments.is_empty() {
            AssignmentPhase::Unassigned
        } else {
            AssignmentPhase::Assigned
        };
        Self {
            tour,
            stops,
            assignments,
            crew: Vec::new(),
            vehicle: None,
            phase,
        }
    }

    /// Tour id.
    #[must_use]
    pub fn id(&self) -> &TourId {
        &self.tour.id
    }

    /// Whether crew has been dispatched for this tour.
    #[must_use]
    pub fn is_assigned(&self) -> bool {
        !self.assignments.is_empty()
    }

    /// Whether an assignment request is outstanding.
    #[must_use]
    pub fn is_assigning(&self) -> bool {
        self.phase == AssignmentPhase::Assigning
    }

    /// Enter the assigning phase. Returns `false` when the tour is assigned or already
    /// assigning.
    pub(crate) fn begin_assignment(&mut self) -> bool {
        match self.phase {
            AssignmentPhase::Unassigned | AssignmentPhase::AssignFailed if !self.is_assigned() => {
                self.phase = AssignmentPhase::Assigning;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn record_assignments(&mut self, assignments: Vec<Assignment>) {
        self.assignments = assignments;
        self.crew.clear();
        self.vehicle = None;
        self.tour.status = TourStatus::InProgress;
        self.phase = AssignmentPhase::Assigned;
    }

    pub(crate) fn record_failure(&mut self) {
        self.phase = AssignmentPhase::AssignFailed;
    }

    pub(crate) fn apply_crew(&mut self, crew: Vec<CrewMember>, vehicle: Option<VehicleSummary>) {
        self.crew = crew;
        self.vehicle = vehicle;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Tone of a notice.
pub enum NoticeKind {
    /// Operation succeeded.
    Success,
    /// Operation failed.
    Error,
}

#[derive(Debug, Clone)]
/// Auto-expiring message for the operator.
pub struct Notice {
    /// Tone.
    pub kind: NoticeKind,
    /// Message text.
    pub message: String,
    /// Instant after which the notice is hidden.
    pub expires_at: Instant,
}

impl Notice {
    /// Whether the notice should no longer be shown.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Collection point marker for the map layer.
pub struct MapPoint {
    /// Collection point id.
    pub id: CollectionPointId,
    /// Address label.
    pub address: String,
    /// Location.
    pub location: GeoPoint,
    /// Whether the point is in service.
    pub active: bool,
    /// Whether the focused tour visits this point.
    pub in_active_tour: bool,
}

#[derive(Debug, Clone, Default)]
/// Aggregate state of one dispatch session.
pub struct DispatchState {
    depot: Option<Depot>,
    catalog: Vec<CollectionPoint>,
    tours: Vec<TourView>,
    active_tour: Option<usize>,
    selected_stop: Option<StopView>,
    loading: bool,
    bulk_assigning: bool,
    notice: Option<Notice>,
}

impl DispatchState {
    /// Main depot, once loaded.
    #[must_use]
    pub fn depot(&self) -> Option<&Depot> {
        self.depot.as_ref()
    }

    /// Full collection point catalog shown when no plan is active.
    #[must_use]
    pub fn catalog(&self) -> &[CollectionPoint] {
        &self.catalog
    }

    /// Tours currently known to the session.
    #[must_use]
    pub fn tours(&self) -> &[TourView] {
        &self.tours
    }

    /// Look up a tour by id.
    #[must_use]
    pub fn tour(&self, id: &TourId) -> Option<&TourView> {
        self.tours.iter().find(|view| view.id() == id)
    }

    /// Index of the focused tour.
    #[must_use]
    pub fn active_index(&self) -> Option<usize> {
        self.active_tour
    }

    /// Focused tour.
    #[must_use]
    pub fn active_tour(&self) -> Option<&TourView> {
        self.active_tour.and_then(|index| self.tours.get(index))
    }

    /// Selected stop.
    #[must_use]
    pub fn selected_stop(&self) -> Option<&StopView> {
        self.selected_stop.as_ref()
    }

    /// Whether tours or the baseline are being loaded.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Whether a bulk assignment pass is running.
    #[must_use]
    pub fn is_bulk_assigning(&self) -> bool {
        self.bulk_assigning
    }

    /// Whether a plan is displayed instead of the baseline catalog.
    #[must_use]
    pub fn has_active_plan(&self) -> bool {
        !self.tours.is_empty()
    }

    /// Notice still visible at `now`.
    #[must_use]
    pub fn notice_at(&self, now: Instant) -> Option<&Notice> {
        self.notice.as_ref().filter(|notice| !notice.is_expired(now))
    }

    /// Catalog markers, flagged with membership in the focused tour. Points without a valid
    /// location are left out.
    #[must_use]
    pub fn map_points(&self) -> Vec<MapPoint> {
        let active_stops = self.active_tour().map(|view| view.stops.as_slice()).unwrap_or_default();
        self.catalog
            .iter()
            .filter_map(|point| {
                let location = point.location.filter(GeoPoint::is_valid)?;
                let in_active_tour = active_stops
                    .iter()
                    .any(|stop| stop.collection_point.id == point.id);
                Some(MapPoint {
                    id: point.id.clone(),
                    address: point.address.clone(),
                    location,
                    active: point.active,
                    in_active_tour,
                })
            })
            .collect()
    }

    pub(crate) fn set_baseline(&mut self, depot: Option<Depot>, catalog: Vec<CollectionPoint>) {
        self.depot = depot;
        self.catalog = catalog;
    }

    pub(crate) fn set_depot(&mut self, depot: Depot) {
        self.depot = Some(depot);
    }

    pub(crate) fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub(crate) fn set_bulk_assigning(&mut self, assigning: bool) {
        self.bulk_assigning = assigning;
    }

    pub(crate) fn tour_mut(&mut self, id: &TourId) -> Option<&mut TourView> {
        self.tours.iter_mut().find(|view| view.id() == id)
    }

    /// Swap in a new tour list in one step, focusing the first tour.
    pub(crate) fn replace_tours(&mut self, tours: Vec<TourView>) {
        self.active_tour = if tours.is_empty() { None } else { Some(0) };
        self.tours = tours;
        self.selected_stop = None;
    }

    /// Drop every tour and return to the baseline catalog view.
    pub(crate) fn reset_plan(&mut self) {
        self.tours.clear();
        self.active_tour = None;
        self.selected_stop = None;
        self.bulk_assigning = false;
    }

    pub(crate) fn focus(&mut self, index: usize) -> Result<(), DispatchError> {
        if index >= self.tours.len() {
            return Err(DispatchError::IndexOutOfRange {
                index,
                len: self.tours.len(),
            });
        }
        self.active_tour = Some(index);
        Ok(())
    }

    pub(crate) fn select_stop(
        &mut self,
        tour_index: usize,
        collection_point: &CollectionPointId,
    ) -> Result<(), DispatchError> {
        let view = self
            .tours
            .get(tour_index)
            .ok_or(DispatchError::IndexOutOfRange {
                index: tour_index,
                len: self.tours.len(),
            })?;
        let stop = view
            .stops
            .iter()
            .find(|stop| &stop.collection_point.id == collection_point)
            .ok_or(DispatchError::UnknownStop)?
            .clone();
        self.active_tour = Some(tour_index);
        self.selected_stop = Some(stop);
        Ok(())
    }

    pub(crate) fn clear_selection(&mut self) {
        self.selected_stop = None;
    }

    /// Remove one tour, keeping the focus on the same tour when possible.
    pub(crate) fn remove_tour(&mut self, id: &TourId) -> Option<TourView> {
        let index = self.tours.iter().position(|view| view.id() == id)?;
        let removed = self.tours.remove(index);
        if self.tours.is_empty() {
            self.reset_plan();
            return Some(removed);
        }
        match self.active_tour {
            Some(active) if active == index => {
                self.active_tour = Some(0);
                self.selected_stop = None;
            }
            Some(active) if active > index => self.active_tour = Some(active - 1),
            _ => {}
        }
        Some(removed)
    }

    /// Keep only assigned tours.
    pub(crate) fn retain_assigned(&mut self) {
        self.tours.retain(TourView::is_assigned);
        if self.tours.is_empty() {
            self.reset_plan();
        } else {
            self.active_tour = Some(0);
            self.selected_stop = None;
        }
    }

    pub(crate) fn set_notice(
        &mut self,
        kind: NoticeKind,
        message: impl Into<String>,
        ttl: Duration,
        now: Instant,
    ) {
        self.notice = Some(Notice {
            kind,
            message: message.into(),
            expires_at: now + ttl,
        });
    }

    /// Drop the notice once it has expired. Returns whether anything changed.
    pub(crate) fn prune_notices(&mut self, now: Instant) -> bool {
        if self.notice.as_ref().is_some_and(|notice| notice.is_expired(now)) {
            self.notice = None;
            return true;
        }
        false
    }
}
