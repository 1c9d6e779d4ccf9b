//! Scheduler error types

use contracts::{ContractError, SubscriptionId};
use thiserror::Error;

/// Scheduler-specific errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Parameters cannot be scheduled
    #[error("invalid schedule for subscription '{id}': {message}")]
    InvalidSchedule { id: SubscriptionId, message: String },

    /// Registry or store error (from contract)
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl SchedulerError {
    /// Create an invalid schedule error
    pub fn invalid_schedule(id: SubscriptionId, message: impl Into<String>) -> Self {
        Self::InvalidSchedule {
            id,
            message: message.into(),
        }
    }

    /// Whether the error means the subscription id is unknown
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Contract(ContractError::NotFound { .. }))
    }
}
