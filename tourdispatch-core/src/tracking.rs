//! Live vehicle tracking: a polling task reconciling reported positions into map markers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::model::{GeoPoint, VehicleId, VehiclePosition, VehicleStatus};
use crate::ports::VehiclePort;

/// Default delay between two position polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Stable identity of a marker. It survives position updates and is never reused.
pub struct MarkerId(u64);

#[derive(Debug, Clone, PartialEq)]
/// Map marker for one tracked vehicle.
pub struct VehicleMarker {
    /// Marker identity.
    pub id: MarkerId,
    /// Vehicle tracked.
    pub vehicle: VehicleId,
    /// License plate label.
    pub plate_number: String,
    /// Last reported status.
    pub status: VehicleStatus,
    /// Last reported position.
    pub position: GeoPoint,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Changes applied by one reconciliation.
pub struct ReconcileSummary {
    /// Markers created for newly reported vehicles.
    pub created: usize,
    /// Markers updated in place.
    pub moved: usize,
    /// Markers removed because their vehicle was not reported.
    pub removed: usize,
}

#[derive(Debug, Clone, Default)]
/// Markers keyed by vehicle.
pub struct MarkerSet {
    markers: BTreeMap<VehicleId, VehicleMarker>,
    next_id: u64,
}

impl MarkerSet {
    /// Marker of a vehicle.
    #[must_use]
    pub fn get(&self, vehicle: &VehicleId) -> Option<&VehicleMarker> {
        self.markers.get(vehicle)
    }

    /// Markers ordered by vehicle id.
    pub fn iter(&self) -> impl Iterator<Item = &VehicleMarker> {
        self.markers.values()
    }

    /// Number of tracked vehicles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Whether no vehicle is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Remove every marker.
    pub fn clear(&mut self) {
        self.markers.clear();
    }

    /// Merge a full position report into the set.
    ///
    /// Reported vehicles with a valid position are moved in place or created. Vehicles
    /// without a valid position are skipped. Tracked vehicles missing from the report, or
    /// reported without a position, are removed.
    pub fn reconcile(&mut self, report: &[VehiclePosition]) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        let mut reported = BTreeMap::new();
        for entry in report {
            if let Some(position) = entry.location.filter(GeoPoint::is_valid) {
                reported.insert(&entry.vehicle, (entry, position));
            }
        }

        let before = self.markers.len();
        self.markers
            .retain(|vehicle, _| reported.contains_key(vehicle));
        summary.removed = before - self.markers.len();

        for (vehicle, (entry, position)) in reported {
            if let Some(marker) = self.markers.get_mut(vehicle) {
                marker.position = position;
                marker.status = entry.status;
                marker.plate_number.clone_from(&entry.plate_number);
                summary.moved += 1;
            } else {
                let id = MarkerId(self.next_id);
                self.next_id += 1;
                self.markers.insert(
                    vehicle.clone(),
                    VehicleMarker {
                        id,
                        vehicle: vehicle.clone(),
                        plate_number: entry.plate_number.clone(),
                        status: entry.status,
                        position,
                    },
                );
                summary.created += 1;
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// What a failed poll does to the markers.
pub enum FailurePolicy {
    /// Keep the last known positions until the next successful poll.
    #[default]
    Retain,
    /// Treat the failure as an empty report and remove every marker.
    Clear,
}

/// Handle to a running tracking task.
///
/// Polling is single-flight: the next request is only sent once the previous one has
/// completed. Dropping the handle cancels the task without clearing the markers.
#[derive(Debug)]
pub struct LiveTracker {
    cancel: CancellationToken,
    markers: Arc<watch::Sender<MarkerSet>>,
    task: Option<JoinHandle<()>>,
}

impl LiveTracker {
    /// Spawn the polling task on the current runtime. The first poll runs immediately.
    #[must_use]
    pub fn start(vehicles: Arc<dyn VehiclePort>, interval: Duration, policy: FailurePolicy) -> Self {
        let cancel = CancellationToken::new();
        let (sender, _) = watch::channel(MarkerSet::default());
        let markers = Arc::new(sender);
        let task = tokio::spawn(poll_loop(
            vehicles,
            interval,
            policy,
            Arc::clone(&markers),
            cancel.clone(),
        ));
        info!(?interval, ?policy, "live tracking started");
        Self {
            cancel,
            markers,
            task: Some(task),
        }
    }

    /// Subscribe to marker updates.
    #[must_use]
    pub fn markers(&self) -> watch::Receiver<MarkerSet> {
        self.markers.subscribe()
    }

    /// Cancel polling, wait for the task to finish, and clear every marker.
    ///
    /// A poll in flight at this point is abandoned; its result is never applied.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "tracking task ended abnormally");
            }
        }
        self.markers.send_replace(MarkerSet::default());
        info!("live tracking stopped");
    }
}

impl Drop for LiveTracker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_loop(
    vehicles: Arc<dyn VehiclePort>,
    interval: Duration,
    policy: FailurePolicy,
    markers: Arc<watch::Sender<MarkerSet>>,
    cancel: CancellationToken,
) {
    let mut ticks = time::interval(interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticks.tick() => {}
        }
        let polled = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            polled = vehicles.positions() => polled,
        };
        match polled {
            Ok(report) => {
                markers.send_modify(|set| {
                    let summary = set.reconcile(&report);
                    debug!(?summary, tracked = set.len(), "positions reconciled");
                });
            }
            Err(err) => match policy {
                FailurePolicy::Retain => {
                    warn!(error = %err, "position poll failed, keeping last known markers");
                }
                FailurePolicy::Clear => {
                    warn!(error = %err, "position poll failed, clearing markers");
                    markers.send_modify(MarkerSet::clear);
                }
            },
        }
    }
    debug!("tracking loop exited");
}
