//! Error types for the Vigil simulation engine.
//!
//! Organized by subsystem: per-entity failures during a tick and
//! rendezvous (barrier) failures for view workers. Configuration and
//! lifecycle errors live next to the configuration in `vigil-engine`.

use std::error::Error;
use std::fmt;

use crate::id::EntityId;

/// Failure while computing one entity's generate or next result.
///
/// Caught at entity granularity by the resolver: the entity contributes
/// no spawns and keeps its committed value for the tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityError {
    /// An action parameter could not be interpreted.
    InvalidParameter {
        /// The entity whose computation failed.
        entity: EntityId,
        /// Name of the offending action.
        action: String,
        /// Name of the offending parameter.
        parameter: String,
        /// The raw value that failed to parse.
        value: String,
    },
    /// The entity's computation panicked.
    Panicked {
        /// The entity whose computation failed.
        entity: EntityId,
        /// Panic payload, if it was a string.
        message: String,
    },
}

impl EntityError {
    /// The entity the failure belongs to.
    pub fn entity(&self) -> EntityId {
        match self {
            Self::InvalidParameter { entity, .. } | Self::Panicked { entity, .. } => *entity,
        }
    }
}

impl fmt::Display for EntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter {
                entity,
                action,
                parameter,
                value,
            } => write!(
                f,
                "entity {entity}: action '{action}' has invalid parameter {parameter}={value:?}"
            ),
            Self::Panicked { entity, message } => {
                write!(f, "entity {entity} panicked: {message}")
            }
        }
    }
}

impl Error for EntityError {}

/// Errors from the view rendezvous barrier.
///
/// Registration errors are fatal for the affected session's worker only;
/// the barrier's party set is left untouched when one is returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BarrierError {
    /// The party is already registered.
    AlreadyRegistered {
        /// The offending party.
        party: u64,
    },
    /// The party is not registered.
    UnknownParty {
        /// The offending party.
        party: u64,
    },
    /// The party was deregistered while waiting for a phase to complete.
    Deregistered {
        /// The removed party.
        party: u64,
    },
    /// The barrier has been terminated (engine shutting down).
    Terminated,
}

impl fmt::Display for BarrierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRegistered { party } => write!(f, "party {party} already registered"),
            Self::UnknownParty { party } => write!(f, "party {party} is not registered"),
            Self::Deregistered { party } => {
                write!(f, "party {party} was deregistered while waiting")
            }
            Self::Terminated => write!(f, "barrier terminated"),
        }
    }
}

impl Error for BarrierError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_error_reports_entity() {
        let err = EntityError::Panicked {
            entity: EntityId(7),
            message: "boom".into(),
        };
        assert_eq!(err.entity(), EntityId(7));
        assert_eq!(err.to_string(), "entity 7 panicked: boom");
    }

    #[test]
    fn invalid_parameter_display() {
        let err = EntityError::InvalidParameter {
            entity: EntityId(3),
            action: "move".into(),
            parameter: "dx".into(),
            value: "abc".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("move"));
        assert!(msg.contains("dx"));
    }

    #[test]
    fn barrier_error_display() {
        assert_eq!(
            BarrierError::AlreadyRegistered { party: 4 }.to_string(),
            "party 4 already registered"
        );
        assert_eq!(BarrierError::Terminated.to_string(), "barrier terminated");
    }
}
