use chrono::{DateTime, Datelike, Utc};
use itertools::Itertools;
use log::{debug, warn};
use std::future::Future;
use std::sync::Arc;

use crate::error::{LineageError, Result};
use crate::model::{
    Clock, CrossLineage, CrossSnapshot, CrossSummary, CrossTotals, HarvestDetail, Id, SeedBatchSnapshot,
    SeedBatchSummary, YieldReport,
};
use crate::store::traits::Store;

/// Run an idempotent read, retrying it once if the store failed underneath.
pub(crate) async fn retry_read<T, F, Fut>(what: &str, mut read: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match read().await {
        Err(e) if e.is_persistence() => {
            warn!("Read of {} failed ({}), retrying once", what, e);
            read().await
        }
        other => other,
    }
}

pub fn cross_totals(snapshot: &CrossSnapshot) -> CrossTotals {
    CrossTotals {
        total_harvests: snapshot.harvests.len(),
        total_seeds: snapshot.harvests.iter().map(|h| i64::from(h.seed_count)).sum(),
        total_seedlings: snapshot.seed_batches.iter().map(|b| b.seedling_count).sum(),
        total_graduated: snapshot.offspring.len(),
    }
}

pub fn cross_summary(snapshot: CrossSnapshot) -> CrossSummary {
    let summary = cross_totals(&snapshot);
    CrossSummary {
        record: snapshot.record,
        summary,
    }
}

/// Nest batches under their harvests. Totals come from the same snapshot as
/// the detail rows so the two can never disagree.
pub fn cross_lineage(snapshot: CrossSnapshot) -> CrossLineage {
    let summary = cross_totals(&snapshot);
    let mut batches_by_harvest = snapshot
        .seed_batches
        .into_iter()
        .map(|batch| (batch.harvest_id.clone(), batch))
        .into_group_map();

    let harvests = snapshot
        .harvests
        .into_iter()
        .map(|harvest| HarvestDetail {
            seed_batches: batches_by_harvest.remove(&harvest.id).unwrap_or_default(),
            harvest,
        })
        .collect();

    CrossLineage {
        record: snapshot.record,
        harvests,
        offspring: snapshot.offspring,
        summary,
    }
}

pub fn seed_batch_summary(snapshot: SeedBatchSnapshot) -> SeedBatchSummary {
    let by_status = snapshot
        .seedlings
        .iter()
        .map(|s| s.selection_status)
        .counts()
        .into_iter()
        .collect();

    SeedBatchSummary {
        germination_rate: snapshot.batch.germination_rate(),
        batch: snapshot.batch,
        seedlings: snapshot.seedlings,
        by_status,
    }
}

/// Seeds collected from a cross by harvests dated from January 1st of the
/// year of `now` up to `now`. Harvests recorded ahead of time are left out.
pub fn year_to_date_yield(snapshot: &CrossSnapshot, now: DateTime<Utc>) -> YieldReport {
    let year = now.year();
    let (harvests, seeds) = snapshot
        .harvests
        .iter()
        .filter(|h| h.harvest_date.year() == year && h.harvest_date <= now)
        .fold((0, 0i64), |(count, seeds), h| (count + 1, seeds + i64::from(h.seed_count)));

    YieldReport {
        breeding_record_id: snapshot.record.id.clone(),
        year,
        harvests,
        seeds,
    }
}

/// Read-side aggregation for reporting and export. Never writes.
pub struct LineageQueryService<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: Store> LineageQueryService<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn cross_summaries(&self) -> Result<Vec<CrossSummary>> {
        let snapshots = retry_read("cross summaries", || self.store.list_cross_snapshots()).await?;
        debug!("Summarising {} crosses", snapshots.len());
        Ok(snapshots.into_iter().map(cross_summary).collect())
    }

    pub async fn cross_lineage(&self, cross_id: &Id) -> Result<CrossLineage> {
        let snapshot = self.snapshot(cross_id).await?;
        Ok(cross_lineage(snapshot))
    }

    pub async fn seed_batch_summary(&self, seed_batch_id: &Id) -> Result<SeedBatchSummary> {
        let snapshot = retry_read("seed batch", || self.store.seed_batch_snapshot(seed_batch_id))
            .await?
            .ok_or_else(|| LineageError::not_found("seed batch", seed_batch_id.clone()))?;
        Ok(seed_batch_summary(snapshot))
    }

    /// Yield for the current calendar year
    pub async fn year_to_date_yield(&self, cross_id: &Id) -> Result<YieldReport> {
        let snapshot = self.snapshot(cross_id).await?;
        Ok(year_to_date_yield(&snapshot, self.clock.now()))
    }

    async fn snapshot(&self, cross_id: &Id) -> Result<CrossSnapshot> {
        retry_read("cross", || self.store.cross_snapshot(cross_id))
            .await?
            .ok_or_else(|| LineageError::not_found("cross", cross_id.clone()))
    }
}
