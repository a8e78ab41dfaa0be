use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::error::{LineageError, Result};
use crate::model::{
    BreedingRecord, CrossSnapshot, CrossUpdate, EntityKind, FloweringCycle, Harvest, HarvestUpdate, Id,
    NewCross, NewHarvest, NewPlant, NewSeedBatch, NewSeedling, Plant, PlantPromotion, PromotionLineage,
    SeedBatch, SeedBatchSnapshot, SeedBatchStatus, SelectionStatus, SequenceId, Seedling, SeedlingFilter,
    SeedlingUpdate,
};
use crate::store::traits::{
    CrossStore, FloweringStore, HarvestStore, PlantStore, SeedBatchStore, SeedlingStore, SnapshotStore,
};

#[derive(Debug, Clone)]
struct CrossRow {
    record: BreedingRecord,
    harvest_high_water: i32,
}

#[derive(Debug, Default)]
struct MemoryState {
    counters: HashMap<(EntityKind, i32), i64>,
    plants: HashMap<Id, Plant>,
    crosses: HashMap<Id, CrossRow>,
    harvests: HashMap<Id, Harvest>,
    seed_batches: HashMap<Id, SeedBatch>,
    seedlings: HashMap<Id, Seedling>,
    cycles: HashMap<Id, FloweringCycle>,
}

impl MemoryState {
    fn identifiers(&self, kind: EntityKind) -> Vec<SequenceId> {
        match kind {
            EntityKind::Cross => self.crosses.values().map(|c| c.record.cross_id).collect(),
            EntityKind::SeedBatch => self.seed_batches.values().map(|b| b.batch_id).collect(),
            EntityKind::Seedling => self.seedlings.values().map(|s| s.seedling_id).collect(),
            EntityKind::Plant => self.plants.values().map(|p| p.plant_id).collect(),
        }
    }

    /// Next value of the (kind, year) counter, seeded from the largest
    /// identifier already present. Nothing is written until `commit_sequence`.
    fn next_sequence(&self, kind: EntityKind, year: i32) -> SequenceId {
        let counter = self.counters.get(&(kind, year)).copied().unwrap_or(0);
        let max_existing = self
            .identifiers(kind)
            .into_iter()
            .filter(|id| id.year == year)
            .map(|id| id.seq)
            .max()
            .unwrap_or(0);
        SequenceId::new(kind, year, counter.max(max_existing) + 1)
    }

    fn commit_sequence(&mut self, id: SequenceId) {
        let counter = self.counters.entry((id.kind, id.year)).or_insert(0);
        *counter = (*counter).max(id.seq);
    }

    /// Uniqueness constraint on the formatted identifier
    fn claim(&mut self, id: SequenceId) -> Result<()> {
        if self.identifiers(id.kind).contains(&id) {
            return Err(LineageError::IdentifierTaken(id.to_string()));
        }
        self.commit_sequence(id);
        Ok(())
    }

    fn live_plant(&self, id: &Id) -> Result<&Plant> {
        self.plants
            .get(id)
            .filter(|p| !p.archived)
            .ok_or_else(|| LineageError::not_found("plant", id.clone()))
    }

    fn seedling_count(&self, seed_batch_id: &Id) -> i64 {
        self.seedlings
            .values()
            .filter(|s| &s.seed_batch_id == seed_batch_id)
            .count() as i64
    }

    fn batch_view(&self, batch: &SeedBatch) -> SeedBatch {
        SeedBatch {
            seedling_count: self.seedling_count(&batch.id),
            ..batch.clone()
        }
    }

    fn cross_snapshot(&self, row: &CrossRow) -> CrossSnapshot {
        let cross_id = &row.record.id;
        let mut harvests: Vec<Harvest> = self
            .harvests
            .values()
            .filter(|h| &h.breeding_record_id == cross_id)
            .cloned()
            .collect();
        harvests.sort_by_key(|h| h.harvest_number);

        let mut seed_batches: Vec<SeedBatch> = self
            .seed_batches
            .values()
            .filter(|b| harvests.iter().any(|h| h.id == b.harvest_id))
            .map(|b| self.batch_view(b))
            .collect();
        seed_batches.sort_by_key(|b| b.batch_id);

        let mut offspring: Vec<(SequenceId, Id)> = self
            .plants
            .values()
            .filter(|p| p.breeding_record_id.as_ref() == Some(cross_id))
            .map(|p| (p.plant_id, p.id.clone()))
            .collect();
        offspring.sort();

        CrossSnapshot {
            record: row.record.clone(),
            harvests,
            seed_batches,
            offspring: offspring.into_iter().map(|(_, id)| id).collect(),
        }
    }
}

/// Store kept entirely in process memory. One mutex guards the whole state,
/// so every call behaves as a serialisable transaction and the same
/// uniqueness rules as the Postgres schema are enforced by hand.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a plant that already carries an identifier (legacy import).
    /// Later allocations for its (kind, year) continue above it.
    pub fn import_plant(&self, plant: Plant) -> Result<Plant> {
        let mut state = self.state.lock();
        state.claim(plant.plant_id)?;
        state.plants.insert(plant.id.clone(), plant.clone());
        Ok(plant)
    }
}

#[async_trait::async_trait]
impl PlantStore for MemoryStore {
    async fn get_plant(&self, id: &Id) -> Result<Option<Plant>> {
        Ok(self.state.lock().plants.get(id).cloned())
    }

    async fn insert_plant(&self, year: i32, plant: NewPlant, now: DateTime<Utc>) -> Result<Plant> {
        let mut state = self.state.lock();
        let plant_id = state.next_sequence(EntityKind::Plant, year);
        state.claim(plant_id)?;

        let plant = plant.into_plant(plant_id, now);
        state.plants.insert(plant.id.clone(), plant.clone());
        Ok(plant)
    }

    async fn set_plant_archived(&self, id: &Id, archived: bool) -> Result<bool> {
        let mut state = self.state.lock();
        match state.plants.get_mut(id) {
            Some(plant) => {
                plant.archived = archived;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait::async_trait]
impl CrossStore for MemoryStore {
    async fn get_cross(&self, id: &Id) -> Result<Option<BreedingRecord>> {
        Ok(self.state.lock().crosses.get(id).map(|row| row.record.clone()))
    }

    async fn list_crosses(&self) -> Result<Vec<BreedingRecord>> {
        let state = self.state.lock();
        let mut records: Vec<BreedingRecord> = state.crosses.values().map(|r| r.record.clone()).collect();
        records.sort_by(|a, b| b.cross_date.cmp(&a.cross_date).then(b.cross_id.cmp(&a.cross_id)));
        Ok(records)
    }

    async fn insert_cross(&self, year: i32, cross: NewCross, now: DateTime<Utc>) -> Result<BreedingRecord> {
        let mut state = self.state.lock();
        state.live_plant(&cross.female_plant_id)?;
        state.live_plant(&cross.male_plant_id)?;

        let cross_id = state.next_sequence(EntityKind::Cross, year);
        state.claim(cross_id)?;

        let record = cross.into_record(cross_id, now);
        state.crosses.insert(
            record.id.clone(),
            CrossRow {
                record: record.clone(),
                harvest_high_water: 0,
            },
        );
        Ok(record)
    }

    async fn update_cross(&self, id: &Id, update: CrossUpdate) -> Result<BreedingRecord> {
        let mut state = self.state.lock();
        let row = state
            .crosses
            .get_mut(id)
            .ok_or_else(|| LineageError::not_found("cross", id.clone()))?;
        update.apply_to(&mut row.record);
        Ok(row.record.clone())
    }

    async fn set_cross_archived(&self, id: &Id, archived: bool) -> Result<bool> {
        let mut state = self.state.lock();
        match state.crosses.get_mut(id) {
            Some(row) => {
                row.record.archived = archived;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_cross(&self, id: &Id) -> Result<bool> {
        let mut state = self.state.lock();
        let Some(row) = state.crosses.get(id) else {
            return Ok(false);
        };
        let graduated: Vec<String> = state
            .plants
            .values()
            .filter(|p| p.breeding_record_id.as_ref() == Some(id))
            .map(|p| p.plant_id.to_string())
            .collect();
        if !graduated.is_empty() {
            return Err(LineageError::Conflict(format!(
                "cannot delete cross {} with graduated plants: {}",
                row.record.cross_id,
                graduated.join(", ")
            )));
        }

        // Cascade mirrors the foreign keys of the relational schema
        let harvest_ids: Vec<Id> = state
            .harvests
            .values()
            .filter(|h| &h.breeding_record_id == id)
            .map(|h| h.id.clone())
            .collect();
        let batch_ids: Vec<Id> = state
            .seed_batches
            .values()
            .filter(|b| harvest_ids.contains(&b.harvest_id))
            .map(|b| b.id.clone())
            .collect();
        state.seedlings.retain(|_, s| !batch_ids.contains(&s.seed_batch_id));
        state.seed_batches.retain(|id, _| !batch_ids.contains(id));
        state.harvests.retain(|id, _| !harvest_ids.contains(id));
        for cycle in state.cycles.values_mut() {
            if cycle.breeding_record_id.as_ref() == Some(id) {
                cycle.breeding_record_id = None;
            }
        }
        state.crosses.remove(id);
        Ok(true)
    }
}

#[async_trait::async_trait]
impl HarvestStore for MemoryStore {
    async fn get_harvest(&self, id: &Id) -> Result<Option<Harvest>> {
        Ok(self.state.lock().harvests.get(id).cloned())
    }

    async fn list_harvests_for_cross(&self, cross_id: &Id) -> Result<Vec<Harvest>> {
        let state = self.state.lock();
        let mut harvests: Vec<Harvest> = state
            .harvests
            .values()
            .filter(|h| &h.breeding_record_id == cross_id)
            .cloned()
            .collect();
        harvests.sort_by_key(|h| h.harvest_number);
        Ok(harvests)
    }

    async fn harvest_high_water(&self, cross_id: &Id) -> Result<Option<i32>> {
        Ok(self
            .state
            .lock()
            .crosses
            .get(cross_id)
            .map(|row| row.harvest_high_water))
    }

    async fn insert_harvest(&self, cross_id: &Id, harvest: NewHarvest, now: DateTime<Utc>) -> Result<Harvest> {
        let mut state = self.state.lock();
        let row = state
            .crosses
            .get(cross_id)
            .filter(|row| !row.record.archived)
            .ok_or_else(|| LineageError::not_found("cross", cross_id.clone()))?;
        let label = row.record.cross_id.to_string();
        let number = harvest.numbering().resolve(row.harvest_high_water)?;

        let taken = state
            .harvests
            .values()
            .any(|h| &h.breeding_record_id == cross_id && h.harvest_number == number);
        if taken {
            return Err(LineageError::DuplicateHarvestNumber {
                cross_id: label,
                number,
            });
        }

        let harvest = harvest.into_harvest(cross_id.clone(), number, now);
        state.harvests.insert(harvest.id.clone(), harvest.clone());
        if let Some(row) = state.crosses.get_mut(cross_id) {
            row.harvest_high_water = row.harvest_high_water.max(number);
        }
        Ok(harvest)
    }

    async fn update_harvest(&self, id: &Id, update: HarvestUpdate) -> Result<Harvest> {
        let mut state = self.state.lock();
        let harvest = state
            .harvests
            .get_mut(id)
            .ok_or_else(|| LineageError::not_found("harvest", id.clone()))?;
        update.apply_to(harvest);
        Ok(harvest.clone())
    }

    async fn delete_harvest(&self, id: &Id) -> Result<bool> {
        let mut state = self.state.lock();
        let Some(harvest) = state.harvests.get(id) else {
            return Ok(false);
        };
        let batch_ids: Vec<Id> = state
            .seed_batches
            .values()
            .filter(|b| &b.harvest_id == id)
            .map(|b| b.id.clone())
            .collect();
        let seedlings = state
            .seedlings
            .values()
            .filter(|s| batch_ids.contains(&s.seed_batch_id))
            .count();
        if seedlings > 0 {
            return Err(LineageError::Conflict(format!(
                "cannot delete harvest #{} with {} seedlings",
                harvest.harvest_number, seedlings
            )));
        }

        state.seed_batches.retain(|id, _| !batch_ids.contains(id));
        state.harvests.remove(id);
        Ok(true)
    }
}

#[async_trait::async_trait]
impl SeedBatchStore for MemoryStore {
    async fn get_seed_batch(&self, id: &Id) -> Result<Option<SeedBatch>> {
        let state = self.state.lock();
        Ok(state.seed_batches.get(id).map(|b| state.batch_view(b)))
    }

    async fn list_seed_batches(&self, harvest_id: Option<&Id>) -> Result<Vec<SeedBatch>> {
        let state = self.state.lock();
        let mut batches: Vec<SeedBatch> = state
            .seed_batches
            .values()
            .filter(|b| harvest_id.map_or(true, |h| &b.harvest_id == h))
            .map(|b| state.batch_view(b))
            .collect();
        batches.sort_by(|a, b| b.sow_date.cmp(&a.sow_date).then(b.batch_id.cmp(&a.batch_id)));
        Ok(batches)
    }

    async fn insert_seed_batch(
        &self,
        year: i32,
        harvest_id: &Id,
        batch: NewSeedBatch,
        now: DateTime<Utc>,
    ) -> Result<SeedBatch> {
        let mut state = self.state.lock();
        if !state.harvests.contains_key(harvest_id) {
            return Err(LineageError::not_found("harvest", harvest_id.clone()));
        }

        let batch_id = state.next_sequence(EntityKind::SeedBatch, year);
        state.claim(batch_id)?;

        let batch = batch.into_batch(batch_id, harvest_id.clone(), now);
        state.seed_batches.insert(batch.id.clone(), batch.clone());
        Ok(batch)
    }

    async fn delete_seed_batch(&self, id: &Id) -> Result<bool> {
        let mut state = self.state.lock();
        let Some(batch) = state.seed_batches.get(id) else {
            return Ok(false);
        };
        let seedlings = state.seedling_count(id);
        if seedlings > 0 {
            return Err(LineageError::Conflict(format!(
                "cannot delete seed batch {} with {} seedlings",
                batch.batch_id, seedlings
            )));
        }
        state.seed_batches.remove(id);
        Ok(true)
    }
}

#[async_trait::async_trait]
impl SeedlingStore for MemoryStore {
    async fn get_seedling(&self, id: &Id) -> Result<Option<Seedling>> {
        Ok(self.state.lock().seedlings.get(id).cloned())
    }

    async fn list_seedlings(&self, filter: &SeedlingFilter) -> Result<Vec<Seedling>> {
        let state = self.state.lock();
        let mut seedlings: Vec<Seedling> = state
            .seedlings
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        seedlings.sort_by_key(|s| s.seedling_id);
        Ok(seedlings)
    }

    async fn insert_seedling(
        &self,
        year: i32,
        seed_batch_id: &Id,
        seedling: NewSeedling,
        now: DateTime<Utc>,
    ) -> Result<Seedling> {
        let mut state = self.state.lock();
        if !state.seed_batches.contains_key(seed_batch_id) {
            return Err(LineageError::not_found("seed batch", seed_batch_id.clone()));
        }

        let seedling_id = state.next_sequence(EntityKind::Seedling, year);
        state.claim(seedling_id)?;

        let seedling = seedling.into_seedling(seedling_id, seed_batch_id.clone(), now);
        state.seedlings.insert(seedling.id.clone(), seedling.clone());
        if let Some(batch) = state.seed_batches.get_mut(seed_batch_id) {
            if batch.status == SeedBatchStatus::Sown {
                batch.status = SeedBatchStatus::Germinating;
            }
        }
        Ok(seedling)
    }

    async fn update_seedling(&self, id: &Id, update: SeedlingUpdate) -> Result<Seedling> {
        let mut state = self.state.lock();
        let seedling = state
            .seedlings
            .get_mut(id)
            .ok_or_else(|| LineageError::not_found("seedling", id.clone()))?;
        update.validate(seedling)?;
        update.apply_to(seedling);
        Ok(seedling.clone())
    }

    async fn delete_seedling(&self, id: &Id) -> Result<bool> {
        let mut state = self.state.lock();
        let Some(seedling) = state.seedlings.get(id) else {
            return Ok(false);
        };
        seedling.check_deletable()?;
        // The counter already sits at or above this number, so it is not handed out again
        state.seedlings.remove(id);
        Ok(true)
    }

    async fn promote_seedling(
        &self,
        year: i32,
        seedling_id: &Id,
        promotion: PlantPromotion,
        now: DateTime<Utc>,
    ) -> Result<(Seedling, Plant)> {
        let mut state = self.state.lock();
        let seedling = state
            .seedlings
            .get(seedling_id)
            .ok_or_else(|| LineageError::not_found("seedling", seedling_id.clone()))?;
        PlantPromotion::check_eligible(seedling)?;

        let cross = state
            .seed_batches
            .get(&seedling.seed_batch_id)
            .and_then(|b| state.harvests.get(&b.harvest_id))
            .and_then(|h| state.crosses.get(&h.breeding_record_id))
            .map(|row| &row.record)
            .ok_or_else(|| LineageError::not_found("cross for seedling", seedling.seedling_id.to_string()))?;
        let mother = state
            .plants
            .get(&cross.female_plant_id)
            .ok_or_else(|| LineageError::not_found("plant", cross.female_plant_id.clone()))?;
        let father = state
            .plants
            .get(&cross.male_plant_id)
            .ok_or_else(|| LineageError::not_found("plant", cross.male_plant_id.clone()))?;

        let plant_id = state.next_sequence(EntityKind::Plant, year);
        let plant = promotion.into_plant(
            PromotionLineage {
                seedling,
                cross,
                mother,
                father,
            },
            plant_id,
            now,
        );

        state.claim(plant_id)?;
        state.plants.insert(plant.id.clone(), plant.clone());
        let seedling = match state.seedlings.get_mut(seedling_id) {
            Some(seedling) => {
                seedling.graduated_to_plant_id = Some(plant.id.clone());
                seedling.graduation_date = Some(now);
                seedling.selection_status = SelectionStatus::Graduated;
                seedling.clone()
            }
            None => return Err(LineageError::not_found("seedling", seedling_id.clone())),
        };
        Ok((seedling, plant))
    }
}

#[async_trait::async_trait]
impl FloweringStore for MemoryStore {
    async fn get_cycle(&self, id: &Id) -> Result<Option<FloweringCycle>> {
        Ok(self.state.lock().cycles.get(id).cloned())
    }

    async fn list_cycles_for_plant(&self, plant_id: &Id) -> Result<Vec<FloweringCycle>> {
        let state = self.state.lock();
        let mut cycles: Vec<FloweringCycle> = state
            .cycles
            .values()
            .filter(|c| &c.plant_id == plant_id)
            .cloned()
            .collect();
        cycles.sort_by(|a, b| b.spathe_emergence.cmp(&a.spathe_emergence));
        Ok(cycles)
    }

    async fn insert_cycle(&self, cycle: FloweringCycle) -> Result<FloweringCycle> {
        let mut state = self.state.lock();
        state.live_plant(&cycle.plant_id)?;
        if let Some(cross_id) = &cycle.breeding_record_id {
            if !state.crosses.contains_key(cross_id) {
                return Err(LineageError::not_found("cross", cross_id.clone()));
            }
        }
        state.cycles.insert(cycle.id.clone(), cycle.clone());
        Ok(cycle)
    }

    async fn replace_cycle(&self, cycle: FloweringCycle, expected_version: i64) -> Result<Option<FloweringCycle>> {
        let mut state = self.state.lock();
        if let Some(cross_id) = &cycle.breeding_record_id {
            if !state.crosses.contains_key(cross_id) {
                return Err(LineageError::not_found("cross", cross_id.clone()));
            }
        }
        let current = state
            .cycles
            .get_mut(&cycle.id)
            .ok_or_else(|| LineageError::not_found("flowering cycle", cycle.id.clone()))?;
        if current.version != expected_version {
            return Ok(None);
        }

        *current = FloweringCycle {
            version: expected_version + 1,
            ..cycle
        };
        Ok(Some(current.clone()))
    }

    async fn delete_cycle(&self, id: &Id) -> Result<bool> {
        Ok(self.state.lock().cycles.remove(id).is_some())
    }
}

#[async_trait::async_trait]
impl SnapshotStore for MemoryStore {
    async fn cross_snapshot(&self, id: &Id) -> Result<Option<CrossSnapshot>> {
        let state = self.state.lock();
        Ok(state.crosses.get(id).map(|row| state.cross_snapshot(row)))
    }

    async fn list_cross_snapshots(&self) -> Result<Vec<CrossSnapshot>> {
        let state = self.state.lock();
        let mut snapshots: Vec<CrossSnapshot> =
            state.crosses.values().map(|row| state.cross_snapshot(row)).collect();
        snapshots.sort_by(|a, b| {
            b.record
                .cross_date
                .cmp(&a.record.cross_date)
                .then(b.record.cross_id.cmp(&a.record.cross_id))
        });
        Ok(snapshots)
    }

    async fn seed_batch_snapshot(&self, id: &Id) -> Result<Option<SeedBatchSnapshot>> {
        let state = self.state.lock();
        let Some(batch) = state.seed_batches.get(id) else {
            return Ok(None);
        };
        let mut seedlings: Vec<Seedling> = state
            .seedlings
            .values()
            .filter(|s| &s.seed_batch_id == id)
            .cloned()
            .collect();
        seedlings.sort_by_key(|s| s.seedling_id);
        Ok(Some(SeedBatchSnapshot {
            batch: state.batch_view(batch),
            seedlings,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_sequences_are_scoped_by_kind_and_year() {
        let store = MemoryStore::new();
        let a = store.insert_plant(2025, NewPlant::default(), now()).await.unwrap();
        let b = store.insert_plant(2025, NewPlant::default(), now()).await.unwrap();
        let c = store.insert_plant(2026, NewPlant::default(), now()).await.unwrap();
        assert_eq!(a.plant_id.to_string(), "ANT-2025-0001");
        assert_eq!(b.plant_id.to_string(), "ANT-2025-0002");
        assert_eq!(c.plant_id.to_string(), "ANT-2026-0001");

        let cross = store
            .insert_cross(2025, NewCross::new(a.id.clone(), b.id.clone()), now())
            .await
            .unwrap();
        assert_eq!(cross.cross_id.to_string(), "CLX-2025-001");
    }

    #[tokio::test]
    async fn test_imported_identifiers_are_skipped() {
        let store = MemoryStore::new();
        let legacy = NewPlant::default().into_plant(SequenceId::new(EntityKind::Plant, 2025, 41), now());
        store.import_plant(legacy.clone()).unwrap();

        let next = store.insert_plant(2025, NewPlant::default(), now()).await.unwrap();
        assert_eq!(next.plant_id.seq, 42);

        let duplicate = store.import_plant(legacy);
        assert!(matches!(duplicate, Err(LineageError::IdentifierTaken(_))));
    }

    #[tokio::test]
    async fn test_sequence_not_reused_after_delete() {
        let store = MemoryStore::new();
        let mother = store.insert_plant(2025, NewPlant::default(), now()).await.unwrap();
        let father = store.insert_plant(2025, NewPlant::default(), now()).await.unwrap();

        let first = store
            .insert_cross(2025, NewCross::new(mother.id.clone(), father.id.clone()), now())
            .await
            .unwrap();
        assert!(store.delete_cross(&first.id).await.unwrap());

        let second = store
            .insert_cross(2025, NewCross::new(mother.id.clone(), father.id.clone()), now())
            .await
            .unwrap();
        assert_eq!(second.cross_id.to_string(), "CLX-2025-002");
    }

    #[tokio::test]
    async fn test_deleted_seedling_number_is_retired() {
        let store = MemoryStore::new();
        let mother = store.insert_plant(2025, NewPlant::default(), now()).await.unwrap();
        let father = store.insert_plant(2025, NewPlant::default(), now()).await.unwrap();
        let cross = store
            .insert_cross(2025, NewCross::new(mother.id, father.id), now())
            .await
            .unwrap();
        let harvest = store.insert_harvest(&cross.id, NewHarvest::default(), now()).await.unwrap();
        let batch = store
            .insert_seed_batch(2025, &harvest.id, NewSeedBatch::default(), now())
            .await
            .unwrap();

        store.insert_seedling(2025, &batch.id, NewSeedling::default(), now()).await.unwrap();
        let last = store.insert_seedling(2025, &batch.id, NewSeedling::default(), now()).await.unwrap();
        assert!(store.delete_seedling(&last.id).await.unwrap());
        assert!(!store.delete_seedling(&last.id).await.unwrap());

        let next = store.insert_seedling(2025, &batch.id, NewSeedling::default(), now()).await.unwrap();
        assert_eq!(next.seedling_id.to_string(), "SDL-2025-0003");

        let listed: Vec<String> = store
            .list_seedlings(&SeedlingFilter::for_batch(batch.id.clone()))
            .await
            .unwrap()
            .iter()
            .map(|s| s.seedling_id.to_string())
            .collect();
        assert_eq!(listed, ["SDL-2025-0001", "SDL-2025-0003"]);
    }

    #[tokio::test]
    async fn test_archived_parent_is_rejected() {
        let store = MemoryStore::new();
        let mother = store.insert_plant(2025, NewPlant::default(), now()).await.unwrap();
        let father = store.insert_plant(2025, NewPlant::default(), now()).await.unwrap();
        store.set_plant_archived(&father.id, true).await.unwrap();

        let result = store
            .insert_cross(2025, NewCross::new(mother.id.clone(), father.id.clone()), now())
            .await;
        assert!(matches!(result, Err(LineageError::NotFound { entity: "plant", .. })));

        // Failed insert must not advance the counter
        store.set_plant_archived(&father.id, false).await.unwrap();
        let cross = store
            .insert_cross(2025, NewCross::new(mother.id, father.id), now())
            .await
            .unwrap();
        assert_eq!(cross.cross_id.seq, 1);
    }

    #[tokio::test]
    async fn test_stale_cycle_write_is_refused() {
        let store = MemoryStore::new();
        let plant = store.insert_plant(2025, NewPlant::default(), now()).await.unwrap();
        let cycle = store
            .insert_cycle(FloweringCycle::empty(plant.id.clone(), now()))
            .await
            .unwrap();

        let first = store.replace_cycle(cycle.clone(), 0).await.unwrap();
        assert_eq!(first.map(|c| c.version), Some(1));

        let stale = store.replace_cycle(cycle, 0).await.unwrap();
        assert!(stale.is_none());
    }
}
