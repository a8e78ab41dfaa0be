use chrono::{DateTime, Utc};
use itertools::Itertools;

use crate::error::{LineageError, Result};
use crate::model::common::{check_non_negative, check_percentage};
use crate::model::{FloweringCycle, FloweringPatch, Id};

/// Stage bookkeeping for flowering cycles.
///
/// Updates are partial merges applied to a copy of the stored cycle; the copy
/// is only handed back if every pair of known stage timestamps is still in
/// chronological order. Corrections to earlier stages are allowed as long as
/// the merged result is consistent.
pub struct FloweringLifecycle;

impl FloweringLifecycle {
    pub fn validate(cycle: &FloweringCycle) -> Result<()> {
        let known: Vec<_> = cycle
            .stage_timestamps()
            .into_iter()
            .filter_map(|(stage, at)| at.map(|at| (stage, at)))
            .collect();

        for (&(earlier, earlier_at), &(later, later_at)) in known.iter().tuple_combinations() {
            if later_at < earlier_at {
                return Err(LineageError::InvalidStageOrder {
                    earlier,
                    earlier_at,
                    later,
                    later_at,
                });
            }
        }

        check_non_negative("crosses_attempted", cycle.crosses_attempted)?;
        check_non_negative("seeds_produced", cycle.seeds_produced)?;
        check_percentage("humidity", cycle.humidity)
    }

    /// New cycle from the first observation. Emergence defaults to `now`.
    pub fn start(plant_id: Id, patch: FloweringPatch, now: DateTime<Utc>) -> Result<FloweringCycle> {
        let mut cycle = FloweringCycle::empty(plant_id, now);
        patch.apply_to(&mut cycle);
        if cycle.spathe_emergence.is_none() {
            cycle.spathe_emergence = Some(now);
        }
        Self::validate(&cycle)?;
        Ok(cycle)
    }

    /// Merge `patch` into a copy of `current` and validate the result.
    /// The version is left untouched; the store bumps it on write.
    pub fn apply(current: &FloweringCycle, patch: FloweringPatch, now: DateTime<Utc>) -> Result<FloweringCycle> {
        let mut next = current.clone();
        patch.apply_to(&mut next);
        next.updated_at = now;
        Self::validate(&next)?;
        Ok(next)
    }
}
