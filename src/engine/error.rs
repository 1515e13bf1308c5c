use ulid::Ulid;

use crate::model::{BookingStatus, ResourceStatus, Role};
use crate::policy::Action;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    Forbidden {
        role: Role,
        action: Action,
    },
    NotFound(Ulid),
    /// Carries the id of the existing booking holding the slot.
    SlotConflict(Ulid),
    InvalidTransition {
        id: Ulid,
        from: BookingStatus,
        to: BookingStatus,
    },
    ResourceUnavailable {
        id: Ulid,
        status: ResourceStatus,
    },
    InvalidInput {
        field: &'static str,
        reason: String,
    },
    /// Resource still referenced by a pending or approved booking.
    ResourceInUse {
        id: Ulid,
        booking: Ulid,
    },
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        EngineError::InvalidInput {
            field,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Forbidden { role, action } => {
                write!(f, "forbidden: role {role} may not {action}")
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::SlotConflict(id) => write!(f, "slot conflicts with booking: {id}"),
            EngineError::InvalidTransition { id, from, to } => {
                write!(f, "invalid transition for booking {id}: {from} -> {to}")
            }
            EngineError::ResourceUnavailable { id, status } => {
                write!(f, "resource {id} is not available (status: {status})")
            }
            EngineError::InvalidInput { field, reason } => {
                write!(f, "invalid {field}: {reason}")
            }
            EngineError::ResourceInUse { id, booking } => {
                write!(f, "cannot delete resource {id}: referenced by booking {booking}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
