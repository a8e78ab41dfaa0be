use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{EntityKind, FloweringStage};

pub type Result<T> = std::result::Result<T, LineageError>;

/// Coarse classification surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    Persistence,
}

#[derive(Error, Debug)]
pub enum LineageError {
    /// Referenced parent or entity is absent (or archived, for parents)
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("harvest #{number} already exists for cross {cross_id}")]
    DuplicateHarvestNumber { cross_id: String, number: i32 },

    #[error("identifier allocation for {kind} in {year} exhausted after {attempts} attempts")]
    AllocationExhausted {
        kind: EntityKind,
        year: i32,
        attempts: u32,
    },

    /// A minted identifier hit the uniqueness constraint. Raised inside a
    /// rolled-back transaction and consumed by the allocator's retry loop.
    #[error("identifier {0} is already taken")]
    IdentifierTaken(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid stage order: {later} ({later_at}) precedes {earlier} ({earlier_at})")]
    InvalidStageOrder {
        earlier: FloweringStage,
        earlier_at: chrono::DateTime<chrono::Utc>,
        later: FloweringStage,
        later_at: chrono::DateTime<chrono::Utc>,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl LineageError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::DuplicateHarvestNumber { .. }
            | Self::AllocationExhausted { .. }
            | Self::IdentifierTaken(_)
            | Self::Conflict(_) => ErrorKind::Conflict,
            Self::InvalidStageOrder { .. } | Self::Validation(_) => ErrorKind::Validation,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }

    pub fn is_persistence(&self) -> bool {
        self.kind() == ErrorKind::Persistence
    }
}
