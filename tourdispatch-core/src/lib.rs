//! Core types and orchestration for collection tour dispatch and live fleet tracking.

/// Crew assignment requests and hydration.
pub mod assignment;
/// Runtime settings loaded from TOML.
pub mod config;
/// Errors surfaced by dispatch commands.
pub mod error;
/// Encoded polyline decoding and route paths.
pub mod geometry;
/// Domain models and identifiers shared by every backend.
pub mod model;
/// Tour planning through the external optimizer.
pub mod planner;
/// Bundle of ports making up one backend deployment.
pub mod plugin;
/// Traits describing the backing services.
pub mod ports;
/// Stop resolution against the collection point catalog.
pub mod resolver;
/// Actor handle exposing a session to the render layer.
pub mod service;
/// Dispatch session running every command to completion.
pub mod session;
/// In-memory dispatch state.
pub mod state;
/// Live vehicle tracking.
pub mod tracking;

#[cfg(test)]
mod testing;

pub use assignment::{AssignOutcome, AssignReport, AssignmentOrchestrator, VehicleSource};
pub use config::{ConfigError, DispatchConfig};
pub use error::{AssignFailure, DispatchError};
pub use model::*;
pub use plugin::BackendPlugin;
pub use ports::*;
pub use service::DispatchHandle;
pub use session::DispatchSession;
pub use state::{DispatchState, NoticeKind, TourView};
pub use tracking::{FailurePolicy, LiveTracker, MarkerSet};
