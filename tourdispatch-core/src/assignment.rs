//! Crew and vehicle assignment: one tour at a time, tolerant of per-tour failures.
//!
//! Auto-assignment draws from a shared pool of employees and vehicles, so a bulk pass
//! issues exactly one request at a time, in tour list order.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::{AssignFailure, DispatchError};
use crate::model::{Assignment, EmployeeId, Tour, TourId, VehicleId};
use crate::plugin::BackendPlugin;
use crate::ports::{AssignmentPort, EmployeePort, VehiclePort};
use crate::state::{CrewMember, CrewRole, NoticeKind, TourView, VehicleSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Where the vehicle shown for an assigned tour comes from.
pub enum VehicleSource {
    /// Crew-only deployments: no vehicle is shown.
    None,
    /// The vehicle carried by the first assignment that names one.
    #[default]
    Assignment,
    /// The vehicle the optimizer reserved on the tour.
    PlannedVehicle,
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Display-ready crew and vehicle for one tour.
pub struct CrewHydration {
    /// Crew, driver first.
    pub crew: Vec<CrewMember>,
    /// Vehicle, when one could be resolved.
    pub vehicle: Option<VehicleSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Aggregate result of a bulk assignment pass.
pub enum AssignOutcome {
    /// Every processed tour got crew.
    AllSucceeded,
    /// Some tours got crew, others failed.
    PartialSuccess {
        /// Whether at least one failure came from a depleted employee pool.
        capacity_exhausted: bool,
    },
    /// No tour got crew.
    AllFailed {
        /// Whether at least one failure came from a depleted employee pool.
        capacity_exhausted: bool,
    },
}

impl AssignOutcome {
    fn aggregate(results: &[TourAssignResult]) -> Self {
        let succeeded = results.iter().filter(|entry| entry.result.is_ok()).count();
        let capacity_exhausted = results
            .iter()
            .any(|entry| entry.result.as_ref().is_err_and(AssignFailure::is_capacity));
        if succeeded == results.len() {
            AssignOutcome::AllSucceeded
        } else if succeeded > 0 {
            AssignOutcome::PartialSuccess { capacity_exhausted }
        } else {
            AssignOutcome::AllFailed { capacity_exhausted }
        }
    }

    /// Notice tone and text for this outcome.
    #[must_use]
    pub fn notice(self) -> (NoticeKind, &'static str) {
        match self {
            AssignOutcome::AllSucceeded => (NoticeKind::Success, "Crew assigned to all tours."),
            AssignOutcome::PartialSuccess {
                capacity_exhausted: true,
            } => (
                NoticeKind::Error,
                "Not enough employees to assign all tours. Some tours were assigned, others could not be.",
            ),
            AssignOutcome::PartialSuccess {
                capacity_exhausted: false,
            } => (
                NoticeKind::Error,
                "Crew assignment completed with some failures.",
            ),
            AssignOutcome::AllFailed {
                capacity_exhausted: true,
            } => (
                NoticeKind::Error,
                "No employees are available to assign these tours.",
            ),
            AssignOutcome::AllFailed {
                capacity_exhausted: false,
            } => (
                NoticeKind::Error,
                "Failed to assign crew for all selected tours.",
            ),
        }
    }
}

#[derive(Debug, Clone)]
/// Result for one tour of a bulk pass.
pub struct TourAssignResult {
    /// Tour processed.
    pub tour: TourId,
    /// Assignments on success, classified failure otherwise.
    pub result: Result<Vec<Assignment>, AssignFailure>,
}

#[derive(Debug, Clone)]
/// Summary of a bulk pass; every processed tour appears exactly once.
pub struct AssignReport {
    /// Per-tour results in processing order.
    pub results: Vec<TourAssignResult>,
    /// Aggregate classification.
    pub outcome: AssignOutcome,
}

impl AssignReport {
    /// Number of tours that got crew.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|entry| entry.result.is_ok()).count()
    }

    /// Number of tours that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

#[derive(Debug, Clone)]
/// Progress reported while a bulk pass runs.
pub enum AssignEvent {
    /// The request for this tour is about to be sent.
    Started(TourId),
    /// The tour got crew; hydration is complete.
    Assigned {
        /// Tour assigned.
        tour: TourId,
        /// Assignments returned by the backend.
        assignments: Vec<Assignment>,
        /// Display-ready crew and vehicle.
        hydration: CrewHydration,
    },
    /// The tour could not be assigned.
    Failed {
        /// Tour that failed.
        tour: TourId,
        /// Classified failure.
        failure: AssignFailure,
    },
}

/// Requests auto-assignment from the backend and hydrates the results.
#[derive(Clone)]
pub struct AssignmentOrchestrator {
    assignments: Arc<dyn AssignmentPort>,
    employees: Arc<dyn EmployeePort>,
    vehicles: Arc<dyn VehiclePort>,
    vehicle_source: VehicleSource,
}

impl AssignmentOrchestrator {
    /// Create an orchestrator over the backend's assignment, employee, and vehicle ports.
    #[must_use]
    pub fn new(backend: &BackendPlugin, vehicle_source: VehicleSource) -> Self {
        Self {
            assignments: Arc::clone(&backend.assignments),
            employees: Arc::clone(&backend.employees),
            vehicles: Arc::clone(&backend.vehicles),
            vehicle_source,
        }
    }

    /// Assign crew to a single tour.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::AlreadyAssigned`] without contacting the backend when the
    /// tour has crew, or [`DispatchError::Assign`] with the classified failure.
    #[instrument(skip(self, tour), fields(tour = %tour.id()))]
    pub async fn assign_one(&self, tour: &TourView) -> Result<Vec<Assignment>, DispatchError> {
        if tour.is_assigned() {
            return Err(DispatchError::AlreadyAssigned(tour.id().clone()));
        }
        Ok(self.request(tour.id()).await?)
    }

    /// Assign crew to every unassigned tour, strictly one request at a time.
    ///
    /// Failures are classified and recorded; the pass always continues with the next tour.
    /// `on_event` observes each step so callers can publish intermediate state.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NothingToAssign`] when every tour already has crew.
    #[instrument(skip_all, fields(tours = tours.len()))]
    pub async fn assign_all<F>(
        &self,
        tours: &[TourView],
        mut on_event: F,
    ) -> Result<AssignReport, DispatchError>
    where
        F: FnMut(AssignEvent),
    {
        let pending: Vec<&TourView> = tours.iter().filter(|view| !view.is_assigned()).collect();
        if pending.is_empty() {
            return Err(DispatchError::NothingToAssign);
        }

        let mut results = Vec::with_capacity(pending.len());
        for view in pending {
            let tour_id = view.id().clone();
            on_event(AssignEvent::Started(tour_id.clone()));
            match self.request(&tour_id).await {
                Ok(assignments) => {
                    let hydration = self.hydrate(&view.tour, &assignments).await;
                    on_event(AssignEvent::Assigned {
                        tour: tour_id.clone(),
                        assignments: assignments.clone(),
                        hydration,
                    });
                    results.push(TourAssignResult {
                        tour: tour_id,
                        result: Ok(assignments),
                    });
                }
                Err(failure) => {
                    warn!(tour = %tour_id, error = %failure, "assignment failed, continuing");
                    on_event(AssignEvent::Failed {
                        tour: tour_id.clone(),
                        failure: failure.clone(),
                    });
                    results.push(TourAssignResult {
                        tour: tour_id,
                        result: Err(failure),
                    });
                }
            }
        }

        let outcome = AssignOutcome::aggregate(&results);
        info!(?outcome, processed = results.len(), "bulk assignment finished");
        Ok(AssignReport { results, outcome })
    }

    async fn request(&self, tour: &TourId) -> Result<Vec<Assignment>, AssignFailure> {
        let assignments = self.assignments.auto_assign(tour).await?;
        if assignments.is_empty() {
            return Err(AssignFailure::Generic(
                "No crew could be assigned to this tour.".to_owned(),
            ));
        }
        Ok(assignments)
    }

    /// Resolve crew names and the vehicle for a set of assignments.
    ///
    /// Lookup failures leave the affected part empty instead of failing.
    pub async fn hydrate(&self, tour: &Tour, assignments: &[Assignment]) -> CrewHydration {
        let mut seen = HashSet::new();
        let employee_ids: Vec<EmployeeId> = assignments
            .iter()
            .filter(|entry| seen.insert(&entry.employee))
            .map(|entry| entry.employee.clone())
            .collect();
        let vehicle_id = self.vehicle_for(tour, assignments);

        let employees = async {
            if employee_ids.is_empty() {
                Ok(Vec::new())
            } else {
                self.employees.get_many(&employee_ids).await
            }
        };
        let vehicle = async {
            match &vehicle_id {
                Some(id) => self.vehicles.get(id).await.map(Some),
                None => Ok(None),
            }
        };
        let (employees, vehicle) = tokio::join!(employees, vehicle);

        let crew = match employees {
            Ok(found) => found
                .into_iter()
                .enumerate()
                .map(|(index, employee)| CrewMember {
                    full_name: employee
                        .full_name
                        .filter(|name| !name.trim().is_empty())
                        .unwrap_or_else(|| employee.id.0.clone()),
                    role: if index == 0 {
                        CrewRole::Driver
                    } else {
                        CrewRole::Collector
                    },
                    id: employee.id,
                })
                .collect(),
            Err(err) => {
                warn!(tour = %tour.id, error = %err, "failed to load crew details");
                Vec::new()
            }
        };
        let vehicle = match vehicle {
            Ok(found) => found.map(|vehicle| VehicleSummary {
                id: vehicle.id,
                plate_number: vehicle.plate_number,
                capacity_volume_l: vehicle.capacity_volume_l,
            }),
            Err(err) => {
                warn!(tour = %tour.id, error = %err, "failed to load vehicle for assignment");
                None
            }
        };
        CrewHydration { crew, vehicle }
    }

    fn vehicle_for(&self, tour: &Tour, assignments: &[Assignment]) -> Option<VehicleId> {
        match self.vehicle_source {
            VehicleSource::None => None,
            VehicleSource::Assignment => assignments.iter().find_map(|entry| entry.vehicle.clone()),
            VehicleSource::PlannedVehicle => tour.planned_vehicle.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        Call, FakeBackend, Failure, assignment, employee, point, resolved_tour, tour, vehicle,
    };

    fn views(ids: &[&str]) -> Vec<TourView> {
        ids.iter()
            .map(|id| resolved_tour(tour(id, &[("cp1", 0)]), &[point("cp1", 1.0, 1.0)]))
            .collect()
    }

    fn script_success(backend: &FakeBackend, tour_id: &str, crew: &[&str], vehicle_id: &str) {
        backend.with(|state| {
            state.auto_assign.insert(
                TourId::from(tour_id),
                Ok(crew
                    .iter()
                    .map(|member| assignment(tour_id, member, Some(vehicle_id)))
                    .collect()),
            );
            for member in crew {
                state
                    .employees
                    .insert(EmployeeId::from(*member), employee(member, &format!("Name {member}")));
            }
            state
                .vehicles
                .insert(VehicleId::from(vehicle_id), vehicle(vehicle_id, "TN-1234"));
        });
    }

    #[tokio::test]
    async fn assign_one_refuses_assigned_tour_without_calling_backend() {
        let backend = FakeBackend::new();
        let orchestrator = AssignmentOrchestrator::new(&backend.plugin(), VehicleSource::Assignment);
        let mut view = views(&["t1"]).remove(0);
        view.record_assignments(vec![assignment("t1", "e1", None)]);

        let first = orchestrator.assign_one(&view).await;
        let second = orchestrator.assign_one(&view).await;

        assert!(matches!(first, Err(DispatchError::AlreadyAssigned(_))));
        assert!(matches!(second, Err(DispatchError::AlreadyAssigned(_))));
        assert_eq!(backend.count(|call| matches!(call, Call::AutoAssign(_))), 0);
        assert_eq!(view.assignments.len(), 1);
    }

    #[tokio::test]
    async fn empty_assignment_result_is_a_generic_failure() {
        let backend = FakeBackend::new();
        backend.with(|state| {
            state.auto_assign.insert(TourId::from("t1"), Ok(Vec::new()));
        });
        let orchestrator = AssignmentOrchestrator::new(&backend.plugin(), VehicleSource::Assignment);

        let result = orchestrator.assign_one(&views(&["t1"]).remove(0)).await;
        assert!(matches!(
            result,
            Err(DispatchError::Assign(AssignFailure::Generic(_)))
        ));
    }

    #[tokio::test]
    async fn bulk_pass_continues_after_capacity_failure() {
        let backend = FakeBackend::new();
        script_success(&backend, "t1", &["e1", "e2", "e3"], "v1");
        script_success(&backend, "t3", &["e4"], "v3");
        backend.with(|state| {
            state
                .auto_assign
                .insert(TourId::from("t2"), Err(Failure::Capacity));
        });
        let orchestrator = AssignmentOrchestrator::new(&backend.plugin(), VehicleSource::Assignment);

        let mut events = Vec::new();
        let report = orchestrator
            .assign_all(&views(&["t1", "t2", "t3"]), |event| events.push(event))
            .await
            .expect("pass runs");

        assert_eq!(
            report.outcome,
            AssignOutcome::PartialSuccess {
                capacity_exhausted: true
            }
        );
        assert_eq!(report.results.len(), 3);
        assert_eq!((report.succeeded(), report.failed()), (2, 1));

        let assign_calls: Vec<_> = backend
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::AutoAssign(id) => Some(id.0),
                _ => None,
            })
            .collect();
        assert_eq!(assign_calls, ["t1", "t2", "t3"]);
        assert_eq!(backend.with(|state| state.assign_max_in_flight), 1);

        let first_crew = events.iter().find_map(|event| match event {
            AssignEvent::Assigned { tour, hydration, .. } if tour.0 == "t1" => Some(hydration),
            _ => None,
        });
        let first_crew = first_crew.expect("t1 hydrated");
        let roles: Vec<_> = first_crew.crew.iter().map(|member| member.role).collect();
        assert_eq!(
            roles,
            [CrewRole::Driver, CrewRole::Collector, CrewRole::Collector]
        );
        assert_eq!(
            first_crew.vehicle.as_ref().map(|summary| summary.plate_number.as_str()),
            Some("TN-1234")
        );
    }

    #[tokio::test]
    async fn bulk_pass_skips_assigned_tours() {
        let backend = FakeBackend::new();
        script_success(&backend, "t2", &["e1"], "v1");
        let mut tours = views(&["t1", "t2"]);
        if let Some(first) = tours.first_mut() {
            first.record_assignments(vec![assignment("t1", "e9", None)]);
        }
        let orchestrator = AssignmentOrchestrator::new(&backend.plugin(), VehicleSource::Assignment);

        let report = orchestrator
            .assign_all(&tours, |_| {})
            .await
            .expect("pass runs");

        assert_eq!(report.outcome, AssignOutcome::AllSucceeded);
        assert_eq!(report.results.len(), 1);
        assert_eq!(backend.count(|call| matches!(call, Call::AutoAssign(_))), 1);
    }

    #[tokio::test]
    async fn bulk_pass_without_pending_tours_is_rejected() {
        let backend = FakeBackend::new();
        let mut tours = views(&["t1"]);
        if let Some(first) = tours.first_mut() {
            first.record_assignments(vec![assignment("t1", "e9", None)]);
        }
        let orchestrator = AssignmentOrchestrator::new(&backend.plugin(), VehicleSource::Assignment);

        let result = orchestrator.assign_all(&tours, |_| {}).await;
        assert!(matches!(result, Err(DispatchError::NothingToAssign)));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn generic_failures_everywhere_report_all_failed() {
        let backend = FakeBackend::new();
        backend.with(|state| {
            state
                .auto_assign
                .insert(TourId::from("t1"), Err(Failure::Transport));
        });
        let orchestrator = AssignmentOrchestrator::new(&backend.plugin(), VehicleSource::Assignment);

        let report = orchestrator
            .assign_all(&views(&["t1", "t2"]), |_| {})
            .await
            .expect("pass runs");
        assert_eq!(
            report.outcome,
            AssignOutcome::AllFailed {
                capacity_exhausted: false
            }
        );
    }

    #[tokio::test]
    async fn vehicle_lookup_failure_keeps_crew() {
        let backend = FakeBackend::new();
        backend.with(|state| {
            state.employees.insert(EmployeeId::from("e1"), employee("e1", "Ada"));
        });
        let orchestrator = AssignmentOrchestrator::new(&backend.plugin(), VehicleSource::Assignment);

        let hydration = orchestrator
            .hydrate(
                &tour("t1", &[]),
                &[
                    assignment("t1", "e1", Some("missing")),
                    assignment("t1", "e1", Some("missing")),
                ],
            )
            .await;

        assert_eq!(hydration.crew.len(), 1, "duplicate employees collapse");
        assert!(hydration.vehicle.is_none());
    }

    #[tokio::test]
    async fn planned_vehicle_source_reads_the_tour() {
        let backend = FakeBackend::new();
        backend.with(|state| {
            state
                .vehicles
                .insert(VehicleId::from("planned"), vehicle("planned", "TN-0001"));
        });
        let orchestrator =
            AssignmentOrchestrator::new(&backend.plugin(), VehicleSource::PlannedVehicle);
        let mut planned = tour("t1", &[]);
        planned.planned_vehicle = Some(VehicleId::from("planned"));

        let hydration = orchestrator
            .hydrate(&planned, &[assignment("t1", "e1", Some("other"))])
            .await;

        assert_eq!(
            hydration.vehicle.map(|summary| summary.id),
            Some(VehicleId::from("planned"))
        );
        assert!(hydration.crew.is_empty(), "unknown employee leaves crew empty");
        assert!(
            !backend
                .calls()
                .contains(&Call::GetVehicle(VehicleId::from("other")))
        );
    }

    #[tokio::test]
    async fn crew_only_mode_never_fetches_vehicles() {
        let backend = FakeBackend::new();
        let orchestrator = AssignmentOrchestrator::new(&backend.plugin(), VehicleSource::None);

        let hydration = orchestrator
            .hydrate(&tour("t1", &[]), &[assignment("t1", "e1", Some("v1"))])
            .await;

        assert!(hydration.vehicle.is_none());
        assert_eq!(backend.count(|call| matches!(call, Call::GetVehicle(_))), 0);
    }

    #[test]
    fn outcome_notices_match_classification() {
        assert_eq!(AssignOutcome::AllSucceeded.notice().0, NoticeKind::Success);
        assert_eq!(
            AssignOutcome::PartialSuccess {
                capacity_exhausted: false
            }
            .notice()
            .0,
            NoticeKind::Error
        );
    }
}
