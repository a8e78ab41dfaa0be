use log::{debug, info, warn};
use std::sync::Arc;

use crate::config::LineageConfig;
use crate::error::{LineageError, Result};
use crate::logic::allocator::SequenceAllocator;
use crate::logic::harvest_numbering::next_harvest_number;
use crate::logic::lifecycle::FloweringLifecycle;
use crate::logic::query::{retry_read, LineageQueryService};
use crate::model::{
    BreedingRecord, Clock, CrossUpdate, EntityKind, FloweringCycle, FloweringPatch, Harvest, HarvestUpdate, Id,
    NewCross, NewHarvest, NewPlant, NewSeedBatch, NewSeedling, Plant, PlantPromotion, SeedBatch, Seedling,
    SeedlingFilter, SeedlingUpdate, SystemClock,
};
use crate::store::traits::Store;

/// Write-side entry point for the breeding lineage.
///
/// Every creation that mints an identifier derives the allocation year from
/// the injected clock and goes through the bounded `SequenceAllocator`.
/// Reads are retried once on persistence failures; writes never are.
pub struct LineageService<S> {
    store: Arc<S>,
    allocator: SequenceAllocator,
    clock: Arc<dyn Clock>,
    max_update_attempts: u32,
}

impl<S: Store> LineageService<S> {
    pub fn new(store: Arc<S>, config: &LineageConfig) -> Self {
        Self {
            store,
            allocator: SequenceAllocator::new(config.max_allocation_attempts),
            clock: Arc::new(SystemClock),
            max_update_attempts: config.max_update_attempts.max(1),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn queries(&self) -> LineageQueryService<S> {
        LineageQueryService::new(self.store.clone(), self.clock.clone())
    }

    // Plants

    pub async fn register_plant(&self, plant: NewPlant) -> Result<Plant> {
        let now = self.clock.now();
        let year = self.clock.current_year();
        let plant = self
            .allocator
            .allocate(EntityKind::Plant, year, || self.store.insert_plant(year, plant.clone(), now))
            .await?;
        info!("Registered plant {} ({})", plant.plant_id, plant.display_name());
        Ok(plant)
    }

    pub async fn get_plant(&self, id: &Id) -> Result<Plant> {
        retry_read("plant", || self.store.get_plant(id))
            .await?
            .ok_or_else(|| LineageError::not_found("plant", id.clone()))
    }

    pub async fn archive_plant(&self, id: &Id) -> Result<Plant> {
        if !self.store.set_plant_archived(id, true).await? {
            return Err(LineageError::not_found("plant", id.clone()));
        }
        let plant = self.get_plant(id).await?;
        info!("Archived plant {}", plant.plant_id);
        Ok(plant)
    }

    // Crosses

    pub async fn create_cross(&self, cross: NewCross) -> Result<BreedingRecord> {
        let now = self.clock.now();
        let year = self.clock.current_year();
        let record = self
            .allocator
            .allocate(EntityKind::Cross, year, || self.store.insert_cross(year, cross.clone(), now))
            .await?;
        info!(
            "Created cross {} ({} x {})",
            record.cross_id, record.female_plant_id, record.male_plant_id
        );
        Ok(record)
    }

    pub async fn get_cross(&self, id: &Id) -> Result<BreedingRecord> {
        retry_read("cross", || self.store.get_cross(id))
            .await?
            .ok_or_else(|| LineageError::not_found("cross", id.clone()))
    }

    pub async fn list_crosses(&self) -> Result<Vec<BreedingRecord>> {
        retry_read("crosses", || self.store.list_crosses()).await
    }

    pub async fn update_cross(&self, id: &Id, update: CrossUpdate) -> Result<BreedingRecord> {
        let record = self.store.update_cross(id, update).await?;
        info!("Updated cross {}", record.cross_id);
        Ok(record)
    }

    pub async fn archive_cross(&self, id: &Id) -> Result<BreedingRecord> {
        if !self.store.set_cross_archived(id, true).await? {
            return Err(LineageError::not_found("cross", id.clone()));
        }
        let record = self.get_cross(id).await?;
        info!("Archived cross {}", record.cross_id);
        Ok(record)
    }

    pub async fn delete_cross(&self, id: &Id) -> Result<()> {
        match self.store.delete_cross(id).await {
            Ok(true) => {
                info!("Deleted cross {}", id);
                Ok(())
            }
            Ok(false) => Err(LineageError::not_found("cross", id.clone())),
            Err(e) => {
                warn!("Refused to delete cross {}: {}", id, e);
                Err(e)
            }
        }
    }

    // Harvests

    pub async fn next_harvest_number(&self, cross_id: &Id) -> Result<i32> {
        retry_read("harvest high-water mark", || next_harvest_number(self.store.as_ref(), cross_id)).await
    }

    /// Harvests of a cross by harvest number ascending
    pub async fn list_harvests(&self, cross_id: &Id) -> Result<Vec<Harvest>> {
        self.get_cross(cross_id).await?;
        retry_read("harvests", || self.store.list_harvests_for_cross(cross_id)).await
    }

    pub async fn create_harvest(&self, cross_id: &Id, harvest: NewHarvest) -> Result<Harvest> {
        harvest.validate()?;
        match self.store.insert_harvest(cross_id, harvest, self.clock.now()).await {
            Ok(harvest) => {
                info!(
                    "Recorded harvest #{} for cross {} ({} seeds)",
                    harvest.harvest_number, cross_id, harvest.seed_count
                );
                Ok(harvest)
            }
            Err(e @ LineageError::DuplicateHarvestNumber { .. }) => {
                warn!("{}", e);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// A harvest addressed through a cross it does not belong to is not found
    pub async fn get_harvest(&self, cross_id: &Id, harvest_id: &Id) -> Result<Harvest> {
        retry_read("harvest", || self.store.get_harvest(harvest_id))
            .await?
            .filter(|h| &h.breeding_record_id == cross_id)
            .ok_or_else(|| LineageError::not_found("harvest", harvest_id.clone()))
    }

    pub async fn update_harvest(&self, cross_id: &Id, harvest_id: &Id, update: HarvestUpdate) -> Result<Harvest> {
        update.validate()?;
        self.get_harvest(cross_id, harvest_id).await?;
        let harvest = self.store.update_harvest(harvest_id, update).await?;
        info!("Updated harvest #{} of cross {}", harvest.harvest_number, cross_id);
        Ok(harvest)
    }

    /// Removes the harvest; its number is never handed out again
    pub async fn delete_harvest(&self, cross_id: &Id, harvest_id: &Id) -> Result<()> {
        let harvest = self.get_harvest(cross_id, harvest_id).await?;
        if !self.store.delete_harvest(harvest_id).await? {
            return Err(LineageError::not_found("harvest", harvest_id.clone()));
        }
        info!("Deleted harvest #{} of cross {}", harvest.harvest_number, cross_id);
        Ok(())
    }

    // Seed batches

    pub async fn create_seed_batch(&self, harvest_id: &Id, batch: NewSeedBatch) -> Result<SeedBatch> {
        batch.validate()?;
        let now = self.clock.now();
        let year = self.clock.current_year();
        let batch = self
            .allocator
            .allocate(EntityKind::SeedBatch, year, || {
                self.store.insert_seed_batch(year, harvest_id, batch.clone(), now)
            })
            .await?;
        info!(
            "Sowed seed batch {} from harvest {} ({} seeds)",
            batch.batch_id, harvest_id, batch.seed_count
        );
        Ok(batch)
    }

    pub async fn get_seed_batch(&self, id: &Id) -> Result<SeedBatch> {
        retry_read("seed batch", || self.store.get_seed_batch(id))
            .await?
            .ok_or_else(|| LineageError::not_found("seed batch", id.clone()))
    }

    pub async fn list_seed_batches(&self, harvest_id: Option<&Id>) -> Result<Vec<SeedBatch>> {
        retry_read("seed batches", || self.store.list_seed_batches(harvest_id)).await
    }

    pub async fn delete_seed_batch(&self, id: &Id) -> Result<()> {
        if !self.store.delete_seed_batch(id).await? {
            return Err(LineageError::not_found("seed batch", id.clone()));
        }
        info!("Deleted seed batch {}", id);
        Ok(())
    }

    // Seedlings

    pub async fn create_seedling(&self, seed_batch_id: &Id, seedling: NewSeedling) -> Result<Seedling> {
        seedling.validate()?;
        let now = self.clock.now();
        let year = self.clock.current_year();
        let seedling = self
            .allocator
            .allocate(EntityKind::Seedling, year, || {
                self.store.insert_seedling(year, seed_batch_id, seedling.clone(), now)
            })
            .await?;
        info!("Recorded seedling {} in batch {}", seedling.seedling_id, seed_batch_id);
        Ok(seedling)
    }

    /// Records several seedlings, each with its own `SDL` allocation.
    ///
    /// Every entry is validated and every batch looked up before the first
    /// insert. Inserts then run one by one, so a failure partway leaves the
    /// earlier seedlings in place.
    pub async fn create_seedlings(&self, seedlings: Vec<(Id, NewSeedling)>) -> Result<Vec<Seedling>> {
        if seedlings.is_empty() {
            return Err(LineageError::Validation("at least one seedling is required".to_string()));
        }
        for (seed_batch_id, seedling) in &seedlings {
            seedling.validate()?;
            self.get_seed_batch(seed_batch_id).await?;
        }

        let mut created = Vec::with_capacity(seedlings.len());
        for (seed_batch_id, seedling) in seedlings {
            created.push(self.create_seedling(&seed_batch_id, seedling).await?);
        }
        Ok(created)
    }

    pub async fn list_seedlings(&self, filter: &SeedlingFilter) -> Result<Vec<Seedling>> {
        retry_read("seedlings", || self.store.list_seedlings(filter)).await
    }

    pub async fn get_seedling(&self, id: &Id) -> Result<Seedling> {
        retry_read("seedling", || self.store.get_seedling(id))
            .await?
            .ok_or_else(|| LineageError::not_found("seedling", id.clone()))
    }

    pub async fn update_seedling(&self, id: &Id, update: SeedlingUpdate) -> Result<Seedling> {
        let seedling = self.store.update_seedling(id, update).await?;
        debug!(
            "Seedling {} is now {}",
            seedling.seedling_id,
            seedling.selection_status.as_str()
        );
        Ok(seedling)
    }

    pub async fn delete_seedling(&self, id: &Id) -> Result<()> {
        match self.store.delete_seedling(id).await {
            Ok(true) => {
                info!("Deleted seedling {}", id);
                Ok(())
            }
            Ok(false) => Err(LineageError::not_found("seedling", id.clone())),
            Err(e) => {
                warn!("Refused to delete seedling {}: {}", id, e);
                Err(e)
            }
        }
    }

    /// Graduate a seedling into a full plant record with its own `ANT` identifier
    pub async fn promote_seedling(&self, seedling_id: &Id, promotion: PlantPromotion) -> Result<(Seedling, Plant)> {
        let now = self.clock.now();
        let year = self.clock.current_year();
        let (seedling, plant) = self
            .allocator
            .allocate(EntityKind::Plant, year, || {
                self.store.promote_seedling(year, seedling_id, promotion.clone(), now)
            })
            .await?;
        info!(
            "Graduated seedling {} to plant {} ({})",
            seedling.seedling_id,
            plant.plant_id,
            plant.display_name()
        );
        Ok((seedling, plant))
    }

    // Flowering

    /// Cycles of a plant, newest emergence first
    pub async fn list_cycles(&self, plant_id: &Id) -> Result<Vec<FloweringCycle>> {
        self.get_plant(plant_id).await?;
        retry_read("flowering cycles", || self.store.list_cycles_for_plant(plant_id)).await
    }

    pub async fn get_cycle(&self, plant_id: &Id, cycle_id: &Id) -> Result<FloweringCycle> {
        retry_read("flowering cycle", || self.store.get_cycle(cycle_id))
            .await?
            .filter(|c| &c.plant_id == plant_id)
            .ok_or_else(|| LineageError::not_found("flowering cycle", cycle_id.clone()))
    }

    pub async fn start_cycle(&self, plant_id: &Id, patch: FloweringPatch) -> Result<FloweringCycle> {
        let cycle = FloweringLifecycle::start(plant_id.clone(), patch, self.clock.now())?;
        let cycle = self.store.insert_cycle(cycle).await?;
        info!("Started flowering cycle {} on plant {}", cycle.id, plant_id);
        Ok(cycle)
    }

    /// Load, merge, validate and compare-and-swap. A lost race reloads and
    /// reapplies the patch against the newer state, so validation always
    /// sees what is actually stored.
    pub async fn update_cycle(&self, plant_id: &Id, cycle_id: &Id, patch: FloweringPatch) -> Result<FloweringCycle> {
        for attempt in 1..=self.max_update_attempts {
            let current = self.get_cycle(plant_id, cycle_id).await?;
            let next = FloweringLifecycle::apply(&current, patch.clone(), self.clock.now())?;

            if let Some(saved) = self.store.replace_cycle(next, current.version).await? {
                debug!(
                    "Flowering cycle {} at stage {:?} (version {})",
                    saved.id,
                    saved.stage(),
                    saved.version
                );
                return Ok(saved);
            }
            warn!(
                "Flowering cycle {} changed underneath update (attempt {}/{}), reloading",
                cycle_id, attempt, self.max_update_attempts
            );
        }

        Err(LineageError::Conflict(format!(
            "flowering cycle {} kept changing; gave up after {} attempts",
            cycle_id, self.max_update_attempts
        )))
    }

    /// Update the given cycle, or start a new one when no id is supplied
    pub async fn upsert_cycle_for_plant(
        &self,
        plant_id: &Id,
        cycle_id: Option<&Id>,
        patch: FloweringPatch,
    ) -> Result<FloweringCycle> {
        match cycle_id {
            Some(cycle_id) => self.update_cycle(plant_id, cycle_id, patch).await,
            None => self.start_cycle(plant_id, patch).await,
        }
    }

    pub async fn delete_cycle(&self, plant_id: &Id, cycle_id: &Id) -> Result<()> {
        self.get_cycle(plant_id, cycle_id).await?;
        if !self.store.delete_cycle(cycle_id).await? {
            return Err(LineageError::not_found("flowering cycle", cycle_id.clone()));
        }
        info!("Deleted flowering cycle {} of plant {}", cycle_id, plant_id);
        Ok(())
    }
}
