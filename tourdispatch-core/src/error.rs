//! Errors surfaced by dispatch operations.

use crate::model::TourId;
use crate::ports::PortError;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Why a single tour could not be assigned.
pub enum AssignFailure {
    /// The backend has no free employees or vehicles left.
    #[error("capacity exhausted: {0}")]
    CapacityExhausted(String),
    /// Any other failure, including an empty assignment result.
    #[error("{0}")]
    Generic(String),
}

impl AssignFailure {
    /// Whether the failure stems from a depleted resource pool.
    #[must_use]
    pub fn is_capacity(&self) -> bool {
        matches!(self, AssignFailure::CapacityExhausted(_))
    }
}

impl From<PortError> for AssignFailure {
    fn from(err: PortError) -> Self {
        match err {
            PortError::CapacityExhausted(message) => AssignFailure::CapacityExhausted(message),
            other => AssignFailure::Generic(other.to_string()),
        }
    }
}

#[derive(thiserror::Error, Debug)]
/// Errors returned by dispatch session commands.
pub enum DispatchError {
    /// Planning was requested without any category.
    #[error("No category selected")]
    NoCategorySelected,
    /// Fill threshold outside `0..=100`.
    #[error("Invalid fill threshold: {0}")]
    InvalidThreshold(u8),
    /// The optimizer returned no tour.
    #[error("No tours produced")]
    NoToursProduced,
    /// Optimizer, depot, or collection point lookup failed while planning.
    #[error("Planning failed: {0}")]
    Planning(#[source] PortError),
    /// Loading in-progress tours failed.
    #[error("Loading tours failed: {0}")]
    Loading(#[source] PortError),
    /// The tour already has crew assigned.
    #[error("Tour {0} already has assigned crew")]
    AlreadyAssigned(TourId),
    /// The tour is not part of the current dispatch state.
    #[error("Unknown tour {0}")]
    UnknownTour(TourId),
    /// Every tour is already assigned.
    #[error("All tours already have assigned crew")]
    NothingToAssign,
    /// Every tour is already assigned, nothing can be discarded in bulk.
    #[error("No unassigned tours to discard")]
    NothingToDiscard,
    /// A tour deletion failed.
    #[error("Discard failed: {0}")]
    Discard(#[source] PortError),
    /// Assigning a single tour failed.
    #[error("Assignment failed: {0}")]
    Assign(#[from] AssignFailure),
    /// Focus or selection pointed outside the tour list.
    #[error("Index {index} out of range for {len} tours")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of tours.
        len: usize,
    },
    /// The stop is not part of the addressed tour.
    #[error("Stop not found in tour")]
    UnknownStop,
    /// The dispatch session has been shut down.
    #[error("Dispatch session closed")]
    SessionClosed,
}

impl DispatchError {
    /// Whether the error was raised before any I/O took place.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DispatchError::NoCategorySelected
                | DispatchError::InvalidThreshold(_)
                | DispatchError::IndexOutOfRange { .. }
                | DispatchError::UnknownStop
        )
    }

    /// Message shown to the operator in a transient notice.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            DispatchError::NoCategorySelected => "Please select at least one waste type.".to_owned(),
            DispatchError::InvalidThreshold(value) => {
                format!("Fill threshold must be between 0 and 100 (got {value}).")
            }
            DispatchError::NoToursProduced | DispatchError::Planning(_) => {
                "No tours could be planned for the selected types and threshold.".to_owned()
            }
            DispatchError::Loading(_) => "Failed to load depot/collection points.".to_owned(),
            DispatchError::AlreadyAssigned(_) => "This tour already has assigned crew.".to_owned(),
            DispatchError::NothingToAssign => "All tours already have assigned crew.".to_owned(),
            DispatchError::NothingToDiscard => {
                "There are no unassigned tours to discard.".to_owned()
            }
            DispatchError::Discard(_) => "Failed to discard unassigned tours.".to_owned(),
            DispatchError::Assign(AssignFailure::CapacityExhausted(_)) => {
                "No employees are available to assign this tour.".to_owned()
            }
            DispatchError::Assign(AssignFailure::Generic(_)) => {
                "Failed to assign crew for this tour.".to_owned()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_port_error_is_classified() {
        let failure = AssignFailure::from(PortError::CapacityExhausted(
            "Not enough available employees".to_owned(),
        ));
        assert!(failure.is_capacity());

        let generic = AssignFailure::from(PortError::NotFound);
        assert!(!generic.is_capacity());
    }

    #[test]
    fn validation_errors_are_flagged() {
        assert!(DispatchError::NoCategorySelected.is_validation());
        assert!(!DispatchError::NoToursProduced.is_validation());
    }
}
