// libs/booking-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use crate::models::{BookingError, BookingStatus};

/// The booking status state machine. Transitions not listed here are
/// illegal; terminal states allow none.
pub struct BookingLifecycle;

impl BookingLifecycle {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed.
    pub fn validate_transition(
        &self,
        current: BookingStatus,
        next: BookingStatus,
    ) -> Result<(), BookingError> {
        debug!("Validating status transition {} -> {}", current, next);

        if !self.valid_transitions(current).contains(&next) {
            warn!("Invalid status transition attempted: {} -> {}", current, next);
            return Err(BookingError::InvalidTransition {
                from: current,
                to: next,
            });
        }

        Ok(())
    }

    /// All statuses reachable from the given one.
    pub fn valid_transitions(&self, current: BookingStatus) -> &'static [BookingStatus] {
        match current {
            BookingStatus::Pending => &[BookingStatus::Confirmed, BookingStatus::Cancelled],
            BookingStatus::Confirmed => &[
                BookingStatus::Completed,
                BookingStatus::Cancelled,
                BookingStatus::NoShow,
            ],
            // Terminal states
            BookingStatus::Cancelled | BookingStatus::Completed | BookingStatus::NoShow => &[],
        }
    }
}

impl Default for BookingLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
