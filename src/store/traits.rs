use crate::error::Result;
use crate::model::{
    BreedingRecord, CrossSnapshot, CrossUpdate, FloweringCycle, Harvest, HarvestUpdate, Id, NewCross,
    NewHarvest, NewPlant, NewSeedBatch, NewSeedling, Plant, PlantPromotion, SeedBatch,
    SeedBatchSnapshot, Seedling, SeedlingFilter, SeedlingUpdate,
};
use chrono::{DateTime, Utc};

// Every `insert_*` that mints a sequence identifier runs as one atomic unit:
// parent check, counter bump for (kind, year), row insert. A collision on the
// identifier's uniqueness constraint rolls the unit back and surfaces as
// `LineageError::IdentifierTaken`, which `SequenceAllocator` retries.

#[async_trait::async_trait]
pub trait PlantStore: Send + Sync {
    async fn get_plant(&self, id: &Id) -> Result<Option<Plant>>;
    /// Accession a plant, minting an `ANT-YYYY-NNNN` identifier
    async fn insert_plant(&self, year: i32, plant: NewPlant, now: DateTime<Utc>) -> Result<Plant>;
    async fn set_plant_archived(&self, id: &Id, archived: bool) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait CrossStore: Send + Sync {
    async fn get_cross(&self, id: &Id) -> Result<Option<BreedingRecord>>;
    async fn list_crosses(&self) -> Result<Vec<BreedingRecord>>;
    /// Both parents must exist and not be archived
    async fn insert_cross(&self, year: i32, cross: NewCross, now: DateTime<Utc>) -> Result<BreedingRecord>;
    async fn update_cross(&self, id: &Id, update: CrossUpdate) -> Result<BreedingRecord>;
    async fn set_cross_archived(&self, id: &Id, archived: bool) -> Result<bool>;
    /// Refused while graduated plants point at the cross
    async fn delete_cross(&self, id: &Id) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait HarvestStore: Send + Sync {
    async fn get_harvest(&self, id: &Id) -> Result<Option<Harvest>>;
    /// Harvests of a cross ordered by harvest number ascending
    async fn list_harvests_for_cross(&self, cross_id: &Id) -> Result<Vec<Harvest>>;
    /// Largest harvest number ever assigned to the cross; `None` if the cross is absent
    async fn harvest_high_water(&self, cross_id: &Id) -> Result<Option<i32>>;
    /// Resolves the harvest number under a lock on the parent cross. The
    /// `(breeding_record_id, harvest_number)` constraint is authoritative.
    async fn insert_harvest(&self, cross_id: &Id, harvest: NewHarvest, now: DateTime<Utc>) -> Result<Harvest>;
    async fn update_harvest(&self, id: &Id, update: HarvestUpdate) -> Result<Harvest>;
    /// Refused while any of the harvest's batches have seedlings
    async fn delete_harvest(&self, id: &Id) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait SeedBatchStore: Send + Sync {
    async fn get_seed_batch(&self, id: &Id) -> Result<Option<SeedBatch>>;
    async fn list_seed_batches(&self, harvest_id: Option<&Id>) -> Result<Vec<SeedBatch>>;
    async fn insert_seed_batch(
        &self,
        year: i32,
        harvest_id: &Id,
        batch: NewSeedBatch,
        now: DateTime<Utc>,
    ) -> Result<SeedBatch>;
    /// Refused while the batch has seedlings
    async fn delete_seed_batch(&self, id: &Id) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait SeedlingStore: Send + Sync {
    async fn get_seedling(&self, id: &Id) -> Result<Option<Seedling>>;
    /// Ordered by seedling identifier ascending
    async fn list_seedlings(&self, filter: &SeedlingFilter) -> Result<Vec<Seedling>>;
    async fn insert_seedling(
        &self,
        year: i32,
        seed_batch_id: &Id,
        seedling: NewSeedling,
        now: DateTime<Utc>,
    ) -> Result<Seedling>;
    async fn update_seedling(&self, id: &Id, update: SeedlingUpdate) -> Result<Seedling>;
    /// Refused once graduated. The identifier is retired, never reissued.
    async fn delete_seedling(&self, id: &Id) -> Result<bool>;
    /// Mints an `ANT` identifier, inserts the plant and marks the seedling
    /// graduated in one transaction
    async fn promote_seedling(
        &self,
        year: i32,
        seedling_id: &Id,
        promotion: PlantPromotion,
        now: DateTime<Utc>,
    ) -> Result<(Seedling, Plant)>;
}

#[async_trait::async_trait]
pub trait FloweringStore: Send + Sync {
    async fn get_cycle(&self, id: &Id) -> Result<Option<FloweringCycle>>;
    /// Newest emergence first
    async fn list_cycles_for_plant(&self, plant_id: &Id) -> Result<Vec<FloweringCycle>>;
    async fn insert_cycle(&self, cycle: FloweringCycle) -> Result<FloweringCycle>;
    /// Compare-and-swap on `version`. `Ok(None)` means another writer got
    /// there first and the caller should reload.
    async fn replace_cycle(&self, cycle: FloweringCycle, expected_version: i64) -> Result<Option<FloweringCycle>>;
    async fn delete_cycle(&self, id: &Id) -> Result<bool>;
}

/// Multi-table reads taken from a single consistent view
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn cross_snapshot(&self, id: &Id) -> Result<Option<CrossSnapshot>>;
    async fn list_cross_snapshots(&self) -> Result<Vec<CrossSnapshot>>;
    async fn seed_batch_snapshot(&self, id: &Id) -> Result<Option<SeedBatchSnapshot>>;
}

pub trait Store:
    PlantStore + CrossStore + HarvestStore + SeedBatchStore + SeedlingStore + FloweringStore + SnapshotStore + Send + Sync
{
}

impl<T> Store for T where
    T: PlantStore + CrossStore + HarvestStore + SeedBatchStore + SeedlingStore + FloweringStore + SnapshotStore + Send + Sync
{
}
