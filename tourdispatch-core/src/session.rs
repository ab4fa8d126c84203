//! One dispatch session: owns the dispatch state and runs every command to completion.

use std::collections::BTreeSet;

use futures::future::{join_all, try_join_all};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::assignment::{AssignEvent, AssignReport, AssignmentOrchestrator, CrewHydration};
use crate::config::{DispatchConfig, NoticeConfig};
use crate::error::DispatchError;
use crate::geometry::{RoutePath, route_path};
use crate::model::{Assignment, Category, CollectionPointId, FillThreshold, TourId};
use crate::planner::TourPlanner;
use crate::plugin::BackendPlugin;
use crate::ports::AssignmentPort;
use crate::state::{DispatchState, NoticeKind, TourView};

/// Dispatch session state machine.
///
/// Every mutation is followed by a snapshot published to subscribers, including the
/// intermediate loading and assigning states.
pub struct DispatchSession {
    backend: BackendPlugin,
    planner: TourPlanner,
    orchestrator: AssignmentOrchestrator,
    notices: NoticeConfig,
    state: DispatchState,
    publisher: watch::Sender<DispatchState>,
}

impl DispatchSession {
    /// Create an empty session over `backend`.
    #[must_use]
    pub fn new(backend: BackendPlugin, config: &DispatchConfig) -> Self {
        let (publisher, _) = watch::channel(DispatchState::default());
        Self {
            planner: TourPlanner::new(&backend),
            orchestrator: AssignmentOrchestrator::new(
                &backend,
                config.assignment.vehicle_source,
            ),
            backend,
            notices: config.notices,
            state: DispatchState::default(),
            publisher,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &DispatchState {
        &self.state
    }

    /// Subscribe to state snapshots.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DispatchState> {
        self.publisher.subscribe()
    }

    /// Load the baseline view (main depot and full catalog), then the tours in progress.
    ///
    /// A failed baseline leaves the session usable with an empty catalog.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Loading`] for the first failed request.
    #[instrument(skip(self), fields(backend = %self.backend.name))]
    pub async fn start(&mut self) -> Result<(), DispatchError> {
        self.state.set_loading(true);
        self.publish();

        let (depot, catalog) = tokio::join!(
            self.backend.depots.main_depot(),
            self.backend.collection_points.list()
        );
        let mut first_error = None;
        let depot = match depot {
            Ok(depot) => Some(depot),
            Err(err) => {
                first_error = Some(DispatchError::Loading(err));
                None
            }
        };
        let catalog = match catalog {
            Ok(catalog) => catalog,
            Err(err) => {
                first_error.get_or_insert(DispatchError::Loading(err));
                Vec::new()
            }
        };
        info!(points = catalog.len(), "baseline loaded");
        self.state.set_baseline(depot, catalog);
        self.state.set_loading(false);
        if let Some(err) = &first_error {
            self.notify(NoticeKind::Error, err.user_message());
        }
        self.publish();

        let loaded = self.load_in_progress().await;
        match (first_error, loaded) {
            (Some(err), _) | (None, Err(err)) => Err(err),
            (None, Ok(_)) => Ok(()),
        }
    }

    /// Replace the tour list with the tours currently being collected.
    ///
    /// Stops are resolved as for a fresh plan and stored assignments are hydrated. An empty
    /// result returns to the baseline view.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Loading`] when the tour list or its hydration fails.
    #[instrument(skip(self))]
    pub async fn load_in_progress(&mut self) -> Result<usize, DispatchError> {
        self.state.reset_plan();
        self.state.set_loading(true);
        self.publish();

        let tours = match self.backend.tours.in_progress().await {
            Ok(tours) => tours,
            Err(err) => {
                self.state.set_loading(false);
                return self.fail(DispatchError::Loading(err));
            }
        };
        if tours.is_empty() {
            info!("no tours in progress");
            self.state.set_loading(false);
            self.publish();
            return Ok(0);
        }

        let planned = match self.planner.hydrate(tours).await {
            Ok(Some(planned)) => planned,
            Ok(None) => {
                self.state.set_loading(false);
                self.publish();
                return Ok(0);
            }
            Err(err) => {
                self.state.set_loading(false);
                return self.fail(DispatchError::Loading(err));
            }
        };
        let mut views = planned.tours;
        fetch_stored_assignments(self.backend.assignments.as_ref(), &mut views).await;
        hydrate_crews(&self.orchestrator, &mut views).await;

        let count = views.len();
        info!(tours = count, "in-progress tours loaded");
        self.state.set_depot(planned.depot);
        self.state.replace_tours(views);
        self.state.set_loading(false);
        self.publish();
        Ok(count)
    }

    /// Plan tours and replace the tour list with the result.
    ///
    /// The previous tours are dropped before the request; on failure the session shows the
    /// baseline view.
    ///
    /// # Errors
    ///
    /// Returns the planning error, see [`TourPlanner::plan`].
    #[instrument(skip(self), fields(threshold = %threshold))]
    pub async fn plan(
        &mut self,
        categories: &BTreeSet<Category>,
        threshold: FillThreshold,
    ) -> Result<usize, DispatchError> {
        if categories.is_empty() {
            return self.fail(DispatchError::NoCategorySelected);
        }
        self.state.reset_plan();
        self.state.set_loading(true);
        self.publish();

        let planned = self.planner.plan(categories, threshold).await;
        self.state.set_loading(false);
        let planned = match planned {
            Ok(planned) => planned,
            Err(err) => return self.fail(err),
        };

        let mut views = planned.tours;
        hydrate_crews(&self.orchestrator, &mut views).await;
        let count = views.len();
        info!(tours = count, "plan applied");
        self.state.set_depot(planned.depot);
        self.state.replace_tours(views);
        self.publish();
        Ok(count)
    }

    /// Assign crew to one tour.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::UnknownTour`] when the tour is not loaded.
    /// - [`DispatchError::AlreadyAssigned`] without any request when it has crew.
    /// - [`DispatchError::Assign`] with the classified failure.
    #[instrument(skip(self))]
    pub async fn assign_one(&mut self, tour: &TourId) -> Result<Vec<Assignment>, DispatchError> {
        let Some(view) = self.state.tour_mut(tour) else {
            return self.fail(DispatchError::UnknownTour(tour.clone()));
        };
        if view.is_assigned() {
            return self.fail(DispatchError::AlreadyAssigned(tour.clone()));
        }
        view.begin_assignment();
        let snapshot = view.clone();
        self.publish();

        match self.orchestrator.assign_one(&snapshot).await {
            Ok(assignments) => {
                let hydration = self
                    .orchestrator
                    .hydrate(&snapshot.tour, &assignments)
                    .await;
                if let Some(view) = self.state.tour_mut(tour) {
                    apply_assignment(view, assignments.clone(), hydration);
                }
                info!(crew = assignments.len(), "crew assigned");
                self.notify(NoticeKind::Success, "Crew assigned to this tour.");
                self.publish();
                Ok(assignments)
            }
            Err(err) => {
                if let Some(view) = self.state.tour_mut(tour) {
                    view.record_failure();
                }
                self.fail(err)
            }
        }
    }

    /// Assign crew to every unassigned tour, one request at a time, in list order.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NothingToAssign`] when every tour already has crew.
    /// Per-tour failures are reported in the [`AssignReport`], never as an error.
    #[instrument(skip(self))]
    pub async fn assign_all(&mut self) -> Result<AssignReport, DispatchError> {
        if !self.state.tours().iter().any(|view| !view.is_assigned()) {
            return self.fail(DispatchError::NothingToAssign);
        }
        let tours = self.state.tours().to_vec();
        self.state.set_bulk_assigning(true);
        self.publish();

        let Self {
            orchestrator,
            state,
            publisher,
            ..
        } = self;
        let report = orchestrator
            .assign_all(&tours, |event| {
                match event {
                    AssignEvent::Started(tour) => {
                        if let Some(view) = state.tour_mut(&tour) {
                            view.begin_assignment();
                        }
                    }
                    AssignEvent::Assigned {
                        tour,
                        assignments,
                        hydration,
                    } => {
                        if let Some(view) = state.tour_mut(&tour) {
                            apply_assignment(view, assignments, hydration);
                        }
                    }
                    AssignEvent::Failed { tour, .. } => {
                        if let Some(view) = state.tour_mut(&tour) {
                            view.record_failure();
                        }
                    }
                }
                publisher.send_replace(state.clone());
            })
            .await;

        self.state.set_bulk_assigning(false);
        match report {
            Ok(report) => {
                let (kind, message) = report.outcome.notice();
                self.notify(kind, message);
                self.publish();
                Ok(report)
            }
            Err(err) => self.fail(err),
        }
    }

    /// Delete every unassigned tour. Assigned tours are never touched.
    ///
    /// Deletions run concurrently; the state only changes when all of them succeed.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NothingToDiscard`] when every tour has crew.
    /// - [`DispatchError::Discard`] when a deletion fails.
    #[instrument(skip(self))]
    pub async fn discard_all(&mut self) -> Result<usize, DispatchError> {
        if !self.state.has_active_plan() {
            return Ok(0);
        }
        let count = match self.delete_unassigned().await {
            Ok(count) => count,
            Err(err) => return self.fail(err),
        };
        self.state.retain_assigned();
        info!(discarded = count, "unassigned tours discarded");
        self.notify(NoticeKind::Success, "Unassigned tours have been discarded.");
        self.publish();
        Ok(count)
    }

    /// Delete one tour, assigned or not.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::UnknownTour`] when the tour is not loaded.
    /// - [`DispatchError::Discard`] when the deletion fails; the tour stays listed.
    #[instrument(skip(self))]
    pub async fn discard_one(&mut self, tour: &TourId) -> Result<(), DispatchError> {
        if self.state.tour(tour).is_none() {
            return self.fail(DispatchError::UnknownTour(tour.clone()));
        }
        if let Err(err) = self.backend.tours.delete(tour).await {
            warn!(error = %err, "failed to discard tour");
            self.notify(NoticeKind::Error, "Failed to discard this tour.");
            self.publish();
            return Err(DispatchError::Discard(err));
        }
        self.state.remove_tour(tour);
        info!("tour discarded");
        self.publish();
        Ok(())
    }

    /// Leave planning: discard unassigned tours, then reload the tours in progress.
    ///
    /// The reload happens whether or not the discard succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Loading`] when the reload fails.
    #[instrument(skip(self))]
    pub async fn terminate_planning(&mut self) -> Result<usize, DispatchError> {
        if self.state.tours().iter().any(|view| !view.is_assigned()) {
            match self.delete_unassigned().await {
                Ok(count) => {
                    info!(discarded = count, "planning terminated");
                    self.notify(NoticeKind::Success, "Unassigned tours discarded.");
                }
                Err(err) => {
                    warn!(error = %err, "discard failed while terminating planning");
                    self.notify(NoticeKind::Error, "Failed to discard some unassigned tours.");
                }
            }
            self.publish();
        }
        self.load_in_progress().await
    }

    /// Focus a tour.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::IndexOutOfRange`] and leaves the focus unchanged.
    pub fn focus(&mut self, index: usize) -> Result<(), DispatchError> {
        match self.state.focus(index) {
            Ok(()) => {
                self.publish();
                Ok(())
            }
            Err(err) => self.fail(err),
        }
    }

    /// Focus a tour and select one of its stops.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::IndexOutOfRange`] or [`DispatchError::UnknownStop`] and
    /// leaves the state unchanged.
    pub fn select_stop(
        &mut self,
        tour_index: usize,
        collection_point: &CollectionPointId,
    ) -> Result<(), DispatchError> {
        match self.state.select_stop(tour_index, collection_point) {
            Ok(()) => {
                self.publish();
                Ok(())
            }
            Err(err) => self.fail(err),
        }
    }

    /// Clear the selected stop.
    pub fn clear_selection(&mut self) {
        self.state.clear_selection();
        self.publish();
    }

    /// Path to draw for the tour at `index`.
    #[must_use]
    pub fn route_path(&self, index: usize) -> Option<RoutePath> {
        let depot = self.state.depot().and_then(|depot| depot.location);
        self.state
            .tours()
            .get(index)
            .map(|view| route_path(view, depot))
    }

    /// Hide the notice once it has expired.
    pub fn prune_notices(&mut self) {
        if self.state.prune_notices(Instant::now()) {
            self.publish();
        }
    }

    async fn delete_unassigned(&self) -> Result<usize, DispatchError> {
        let doomed: Vec<TourId> = self
            .state
            .tours()
            .iter()
            .filter(|view| !view.is_assigned())
            .map(|view| view.id().clone())
            .collect();
        if doomed.is_empty() {
            return Err(DispatchError::NothingToDiscard);
        }
        try_join_all(doomed.iter().map(|id| self.backend.tours.delete(id)))
            .await
            .map_err(DispatchError::Discard)?;
        Ok(doomed.len())
    }

    fn notify(&mut self, kind: NoticeKind, message: impl Into<String>) {
        let ttl = match kind {
            NoticeKind::Success => self.notices.success_ttl(),
            NoticeKind::Error => self.notices.error_ttl(),
        };
        self.state.set_notice(kind, message, ttl, Instant::now());
    }

    fn fail<T>(&mut self, err: DispatchError) -> Result<T, DispatchError> {
        if err.is_validation() {
            info!(error = %err, "command rejected");
        } else {
            warn!(error = %err, "command failed");
        }
        self.notify(NoticeKind::Error, err.user_message());
        self.publish();
        Err(err)
    }

    fn publish(&self) {
        self.publisher.send_replace(self.state.clone());
    }
}

fn apply_assignment(view: &mut TourView, assignments: Vec<Assignment>, hydration: CrewHydration) {
    view.record_assignments(assignments);
    view.apply_crew(hydration.crew, hydration.vehicle);
}

async fn fetch_stored_assignments(port: &dyn AssignmentPort, views: &mut [TourView]) {
    let lookups = views.iter().map(|view| async move {
        if view.is_assigned() {
            return None;
        }
        match port.for_tour(view.id()).await {
            Ok(found) => Some(found),
            Err(err) => {
                warn!(tour = %view.id(), error = %err, "failed to load stored assignments");
                None
            }
        }
    });
    let found = join_all(lookups).await;
    for (view, assignments) in views.iter_mut().zip(found) {
        if let Some(assignments) = assignments.filter(|found| !found.is_empty()) {
            view.record_assignments(assignments);
        }
    }
}

async fn hydrate_crews(orchestrator: &AssignmentOrchestrator, views: &mut [TourView]) {
    let hydrations = join_all(views.iter().map(|view| async move {
        if view.is_assigned() {
            Some(orchestrator.hydrate(&view.tour, &view.assignments).await)
        } else {
            None
        }
    }))
    .await;
    for (view, hydration) in views.iter_mut().zip(hydrations) {
        if let Some(hydration) = hydration {
            view.apply_crew(hydration.crew, hydration.vehicle);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time;

    use super::*;
    use crate::assignment::AssignOutcome;
    use crate::geometry::PathSource;
    use crate::model::{EmployeeId, TourStatus, VehicleId};
    use crate::state::AssignmentPhase;
    use crate::testing::{
        Call, FakeBackend, Failure, assignment, employee, point, tour, vehicle,
    };

    fn session(backend: &Arc<FakeBackend>) -> DispatchSession {
        DispatchSession::new(backend.plugin(), &DispatchConfig::default())
    }

    fn plastic() -> BTreeSet<Category> {
        BTreeSet::from([Category::Plastic])
    }

    fn threshold() -> FillThreshold {
        FillThreshold::new(80).expect("valid threshold")
    }

    fn tour_ids(session: &DispatchSession) -> Vec<&str> {
        session
            .state()
            .tours()
            .iter()
            .map(|view| view.id().0.as_str())
            .collect()
    }

    async fn planned_session(backend: &Arc<FakeBackend>, ids: &[&str]) -> DispatchSession {
        backend.add_points([point("cp1", 1.0, 1.0)]);
        backend.with(|state| {
            state.plan = Some(Ok(ids.iter().map(|id| tour(id, &[("cp1", 0)])).collect()));
        });
        let mut session = session(backend);
        session
            .plan(&plastic(), threshold())
            .await
            .expect("plan succeeds");
        session
    }

    fn script_assignment(backend: &FakeBackend, tour_id: &str, employee_id: &str) {
        backend.with(|state| {
            state.auto_assign.insert(
                TourId::from(tour_id),
                Ok(vec![assignment(tour_id, employee_id, Some("v1"))]),
            );
            state
                .employees
                .insert(EmployeeId::from(employee_id), employee(employee_id, "Sam"));
            state
                .vehicles
                .insert(VehicleId::from("v1"), vehicle("v1", "TN-0001"));
        });
    }

    #[tokio::test]
    async fn plan_resolves_known_stops_only() {
        let backend = FakeBackend::new();
        backend.add_points([point("cp1", 1.0, 1.0), point("cp3", 3.0, 3.0)]);
        backend.with(|state| {
            state.plan = Some(Ok(vec![tour("t1", &[("cp1", 1), ("cp2", 2), ("cp3", 3)])]));
        });
        let mut session = session(&backend);

        let count = session.plan(&plastic(), threshold()).await.expect("plan");

        assert_eq!(count, 1);
        let view = session.state().active_tour().expect("focused tour");
        let stops: Vec<_> = view
            .stops
            .iter()
            .map(|stop| stop.collection_point.id.0.as_str())
            .collect();
        assert_eq!(stops, ["cp1", "cp3"]);
        assert!(session.state().depot().is_some());
        assert!(!session.state().is_loading());
    }

    #[tokio::test]
    async fn plan_without_category_touches_nothing() {
        let backend = FakeBackend::new();
        let mut session = planned_session(&backend, &["t1"]).await;
        let calls = backend.calls().len();

        let result = session.plan(&BTreeSet::new(), threshold()).await;

        assert!(matches!(result, Err(DispatchError::NoCategorySelected)));
        assert_eq!(backend.calls().len(), calls);
        assert_eq!(tour_ids(&session), ["t1"]);
        let notice = session.state().notice_at(Instant::now()).expect("notice");
        assert_eq!(notice.message, "Please select at least one waste type.");
    }

    #[tokio::test]
    async fn failed_plan_leaves_no_tours() {
        let backend = FakeBackend::new();
        let mut session = planned_session(&backend, &["t1"]).await;
        backend.with(|state| state.plan = Some(Err(Failure::Transport)));

        let result = session.plan(&plastic(), threshold()).await;

        assert!(matches!(result, Err(DispatchError::Planning(_))));
        assert!(!session.state().has_active_plan());
        assert_eq!(session.state().active_index(), None);
    }

    #[tokio::test]
    async fn preassigned_tours_arrive_hydrated() {
        let backend = FakeBackend::new();
        backend.add_points([point("cp1", 1.0, 1.0)]);
        let mut delivered = tour("t1", &[("cp1", 0)]);
        delivered.assignments = vec![assignment("t1", "e1", Some("v1"))];
        backend.with(|state| {
            state.plan = Some(Ok(vec![delivered]));
            state.employees.insert(EmployeeId::from("e1"), employee("e1", "Ada"));
            state.vehicles.insert(VehicleId::from("v1"), vehicle("v1", "TN-0001"));
        });
        let mut session = session(&backend);

        session.plan(&plastic(), threshold()).await.expect("plan");

        let view = session.state().active_tour().expect("tour");
        assert_eq!(view.phase, AssignmentPhase::Assigned);
        assert_eq!(view.crew.len(), 1);
        assert!(view.vehicle.is_some());
    }

    #[tokio::test]
    async fn bulk_assignment_tolerates_capacity_failure() {
        let backend = FakeBackend::new();
        let mut session = planned_session(&backend, &["t1", "t2", "t3"]).await;
        script_assignment(&backend, "t1", "e1");
        script_assignment(&backend, "t3", "e3");
        backend.with(|state| {
            state
                .auto_assign
                .insert(TourId::from("t2"), Err(Failure::Capacity));
        });
        let mut snapshots = session.subscribe();

        let report = session.assign_all().await.expect("pass runs");

        assert_eq!(
            report.outcome,
            AssignOutcome::PartialSuccess {
                capacity_exhausted: true
            }
        );
        let state = session.state();
        for id in ["t1", "t3"] {
            let view = state.tour(&TourId::from(id)).expect("tour");
            assert_eq!(view.phase, AssignmentPhase::Assigned);
            assert_eq!(view.tour.status, TourStatus::InProgress);
            assert_eq!(
                view.crew.first().map(|member| member.full_name.as_str()),
                Some("Sam")
            );
            assert!(view.vehicle.is_some(), "{id} should show its vehicle");
        }
        let failed = state.tour(&TourId::from("t2")).expect("tour");
        assert_eq!(failed.phase, AssignmentPhase::AssignFailed);
        assert!(!state.is_bulk_assigning());
        assert_eq!(
            state.notice_at(Instant::now()).map(|notice| notice.kind),
            Some(NoticeKind::Error)
        );
        assert_eq!(backend.with(|fake| fake.assign_max_in_flight), 1);
        assert!(snapshots.has_changed().expect("sender alive"));
        assert!(!snapshots.borrow_and_update().is_bulk_assigning());
    }

    #[tokio::test]
    async fn failed_single_assignment_can_be_retried() {
        let backend = FakeBackend::new();
        let mut session = planned_session(&backend, &["t1"]).await;
        backend.with(|state| {
            state
                .auto_assign
                .insert(TourId::from("t1"), Err(Failure::Transport));
        });
        let id = TourId::from("t1");

        let first = session.assign_one(&id).await;
        assert!(matches!(first, Err(DispatchError::Assign(_))));
        assert_eq!(
            session.state().tour(&id).map(|view| view.phase),
            Some(AssignmentPhase::AssignFailed)
        );

        script_assignment(&backend, "t1", "e1");
        session.assign_one(&id).await.expect("retry succeeds");
        let again = session.assign_one(&id).await;

        assert!(matches!(again, Err(DispatchError::AlreadyAssigned(_))));
        assert_eq!(backend.count(|call| matches!(call, Call::AutoAssign(_))), 2);
    }

    #[tokio::test]
    async fn discard_all_keeps_assigned_tours() {
        let backend = FakeBackend::new();
        let mut session = planned_session(&backend, &["a", "b"]).await;
        script_assignment(&backend, "b", "e1");
        session
            .assign_one(&TourId::from("b"))
            .await
            .expect("assign b");

        let discarded = session.discard_all().await.expect("discard");

        assert_eq!(discarded, 1);
        assert_eq!(tour_ids(&session), ["b"]);
        assert_eq!(
            backend
                .calls()
                .into_iter()
                .filter(|call| matches!(call, Call::DeleteTour(_)))
                .collect::<Vec<_>>(),
            [Call::DeleteTour(TourId::from("a"))]
        );
    }

    #[tokio::test]
    async fn failed_discard_leaves_state_unchanged() {
        let backend = FakeBackend::new();
        let mut session = planned_session(&backend, &["a", "b"]).await;
        backend.with(|state| {
            state.delete_failures.insert(TourId::from("b"));
        });

        let result = session.discard_all().await;

        assert!(matches!(result, Err(DispatchError::Discard(_))));
        assert_eq!(tour_ids(&session), ["a", "b"]);
    }

    #[tokio::test]
    async fn discarding_everything_returns_to_baseline() {
        let backend = FakeBackend::new();
        let mut session = planned_session(&backend, &["a"]).await;

        session.discard_all().await.expect("discard");

        assert!(!session.state().has_active_plan());
        assert!(matches!(
            session.discard_all().await,
            Ok(0)
        ));
    }

    #[tokio::test]
    async fn discard_one_shifts_focus() {
        let backend = FakeBackend::new();
        let mut session = planned_session(&backend, &["a", "b", "c"]).await;
        session.focus(2).expect("focus c");

        session
            .discard_one(&TourId::from("a"))
            .await
            .expect("discard a");

        assert_eq!(session.state().active_index(), Some(1));
        assert_eq!(
            session.state().active_tour().map(|view| view.id().0.as_str()),
            Some("c")
        );
    }

    #[tokio::test]
    async fn terminate_reloads_in_progress_even_after_failed_discard() {
        let backend = FakeBackend::new();
        let mut session = planned_session(&backend, &["a"]).await;
        let mut running = tour("r1", &[("cp1", 0)]);
        running.status = TourStatus::InProgress;
        backend.with(|state| {
            state.delete_failures.insert(TourId::from("a"));
            state.in_progress = vec![running];
            state
                .stored_assignments
                .insert(TourId::from("r1"), vec![assignment("r1", "e1", None)]);
            state.employees.insert(EmployeeId::from("e1"), employee("e1", "Lee"));
        });

        let loaded = session.terminate_planning().await.expect("reload");

        assert_eq!(loaded, 1);
        assert_eq!(tour_ids(&session), ["r1"]);
        let view = session.state().active_tour().expect("tour");
        assert!(view.is_assigned());
        assert_eq!(view.crew.len(), 1);
        assert_eq!(backend.count(|call| matches!(call, Call::InProgress)), 1);
    }

    #[tokio::test]
    async fn in_progress_tours_without_stops_load_nothing() {
        let backend = FakeBackend::new();
        let mut running = tour("r1", &[]);
        running.status = TourStatus::InProgress;
        backend.with(|state| state.in_progress = vec![running]);
        let mut session = session(&backend);

        let loaded = session.load_in_progress().await.expect("reload");

        assert_eq!(loaded, 0);
        assert!(session.state().tours().is_empty());
        assert!(!session.state().is_loading());
        assert_eq!(backend.count(|call| matches!(call, Call::MainDepot)), 0);
        assert_eq!(backend.count(|call| matches!(call, Call::GetPoint(_))), 0);
    }

    #[tokio::test]
    async fn start_survives_catalog_failure() {
        let backend = FakeBackend::new();
        backend.with(|state| state.list_fails = true);
        let mut session = session(&backend);

        let result = session.start().await;

        assert!(matches!(result, Err(DispatchError::Loading(_))));
        assert!(session.state().catalog().is_empty());
        assert!(session.state().depot().is_some());
        assert_eq!(backend.count(|call| matches!(call, Call::InProgress)), 1);
    }

    #[tokio::test]
    async fn start_loads_baseline_catalog() {
        let backend = FakeBackend::new();
        backend.add_points([point("cp1", 1.0, 1.0), point("cp2", 2.0, 2.0)]);
        let mut session = session(&backend);

        session.start().await.expect("start");

        assert_eq!(session.state().catalog().len(), 2);
        assert!(!session.state().has_active_plan());
        assert_eq!(session.state().map_points().len(), 2);
    }

    #[tokio::test]
    async fn selection_follows_focus_rules() {
        let backend = FakeBackend::new();
        let mut session = planned_session(&backend, &["a", "b"]).await;

        session
            .select_stop(1, &CollectionPointId::from("cp1"))
            .expect("select");
        assert_eq!(session.state().active_index(), Some(1));
        assert!(matches!(
            session.focus(5),
            Err(DispatchError::IndexOutOfRange { index: 5, len: 2 })
        ));
        assert_eq!(session.state().active_index(), Some(1));

        session.clear_selection();
        assert!(session.state().selected_stop().is_none());
    }

    #[tokio::test]
    async fn route_path_falls_back_to_straight_lines() {
        let backend = FakeBackend::new();
        let session = planned_session(&backend, &["a"]).await;

        let path = session.route_path(0).expect("tour exists");

        assert_eq!(path.source, PathSource::StraightLine);
        assert_eq!(path.points.len(), 3);
        assert!(session.route_path(1).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn notices_expire_after_their_ttl() {
        let backend = FakeBackend::new();
        let mut session = planned_session(&backend, &["a"]).await;
        session.discard_all().await.expect("discard");
        assert!(session.state().notice_at(Instant::now()).is_some());

        time::advance(Duration::from_millis(3100)).await;
        session.prune_notices();

        assert!(session.state().notice_at(Instant::now()).is_none());
    }
}
