use crate::model::{BreedingRecord, Harvest, Id, SeedBatch, SelectionStatus, Seedling};
use serde::Serialize;
use std::collections::BTreeMap;

/// Roll-up numbers for a cross
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrossTotals {
    pub total_harvests: usize,
    pub total_seeds: i64,
    pub total_seedlings: i64,
    pub total_graduated: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossSummary {
    #[serde(flatten)]
    pub record: BreedingRecord,
    pub summary: CrossTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarvestDetail {
    #[serde(flatten)]
    pub harvest: Harvest,
    pub seed_batches: Vec<SeedBatch>,
}

/// A cross with its harvests and batches, all read from one snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossLineage {
    #[serde(flatten)]
    pub record: BreedingRecord,
    pub harvests: Vec<HarvestDetail>,
    pub offspring: Vec<Id>,
    pub summary: CrossTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeedBatchSummary {
    #[serde(flatten)]
    pub batch: SeedBatch,
    pub seedlings: Vec<Seedling>,
    pub germination_rate: Option<f64>,
    pub by_status: BTreeMap<SelectionStatus, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YieldReport {
    pub breeding_record_id: Id,
    pub year: i32,
    pub harvests: usize,
    pub seeds: i64,
}

/// Raw rows of one cross as read inside a single read transaction. The query
/// service aggregates these; stores only load them.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossSnapshot {
    pub record: BreedingRecord,
    pub harvests: Vec<Harvest>,
    pub seed_batches: Vec<SeedBatch>,
    pub offspring: Vec<Id>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeedBatchSnapshot {
    pub batch: SeedBatch,
    pub seedlings: Vec<Seedling>,
}
