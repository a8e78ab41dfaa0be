use log::warn;
use std::future::Future;

use crate::error::{LineageError, Result};
use crate::model::EntityKind;

/// Bounded retry around an identifier-minting insert.
///
/// The store bumps the (kind, year) counter and inserts the owning row in one
/// transaction. If the freshly minted identifier still collides with an
/// existing row (a legacy import, or another process writing without the
/// counter) the transaction rolls back with `IdentifierTaken` and the whole
/// unit is replayed. Rolled-back attempts never leave a visible identifier.
#[derive(Debug, Clone, Copy)]
pub struct SequenceAllocator {
    max_attempts: u32,
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

impl SequenceAllocator {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn allocate<T, F, Fut>(&self, kind: EntityKind, year: i32, mut insert: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        for attempt in 1..=self.max_attempts {
            match insert().await {
                Err(LineageError::IdentifierTaken(identifier)) => {
                    warn!(
                        "Identifier {} already taken (attempt {}/{}), retrying",
                        identifier, attempt, self.max_attempts
                    );
                }
                other => return other,
            }
        }

        Err(LineageError::AllocationExhausted {
            kind,
            year,
            attempts: self.max_attempts,
        })
    }
}
