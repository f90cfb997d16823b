use thiserror::Error;

use crate::sim::EntityId;
use crate::world::GridError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("invalid target: {reason}")]
    InvalidTarget { reason: String },
    #[error("invalid status effect: {reason}")]
    InvalidEffect { reason: String },
    #[error("unknown entity {0:?}")]
    UnknownEntity(EntityId),
    #[error("time step must be finite and >= 0, got {0}")]
    InvalidTimeStep(f32),
}

impl SimError {
    pub(crate) fn invalid_target(reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            reason: reason.into(),
        }
    }
}
