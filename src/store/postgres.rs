use anyhow::Context;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use sqlx::postgres::{PgExecutor, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Row};

use crate::error::{LineageError, Result};
use crate::model::{
    BreedingRecord, CrossSnapshot, CrossType, CrossUpdate, EntityKind, FloweringCycle, Harvest,
    HarvestUpdate, Id, NewCross, NewHarvest, NewPlant, NewSeedBatch, NewSeedling, Plant, PlantPromotion,
    PromotionLineage, SeedBatch, SeedBatchSnapshot, SeedBatchStatus, SelectionStatus, SequenceId, Seedling,
    SeedlingFilter, SeedlingUpdate,
};
use crate::store::traits::{
    CrossStore, FloweringStore, HarvestStore, PlantStore, SeedBatchStore, SeedlingStore, SnapshotStore,
};

const PLANT_COLUMNS: &str = "id, plant_id, hybrid_name, species, section, generation, female_parent_id, \
     male_parent_id, breeding_record_id, propagation_type, accession_date, archived, notes, created_at";

const CROSS_COLUMNS: &str = "id, cross_id, female_plant_id, male_plant_id, cross_date, cross_type, \
     pollination_method, notes, archived, created_at";

const HARVEST_COLUMNS: &str = "id, breeding_record_id, harvest_number, harvest_date, berry_count, seed_count, \
     seed_viability, notes, photos, created_at";

const SEED_BATCH_COLUMNS: &str = "b.id, b.batch_id, b.harvest_id, b.sow_date, b.seed_count, b.substrate, \
     b.container, b.temperature, b.humidity, b.status, b.notes, b.created_at, \
     (SELECT COUNT(*) FROM seedlings s WHERE s.seed_batch_id = b.id) AS seedling_count";

const SEEDLING_COLUMNS: &str = "id, seedling_id, seed_batch_id, position_label, emergence_date, health_status, \
     selection_status, notes, graduated_to_plant_id, graduation_date, created_at";

const CYCLE_COLUMNS: &str = "id, plant_id, breeding_record_id, spathe_emergence, female_start, female_end, \
     male_start, male_end, spathe_close, pollen_collected, pollen_quality, pollen_stored, pollen_storage_date, \
     crosses_attempted, seeds_produced, temperature, humidity, notes, version, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Read transaction pinned to one snapshot for multi-table aggregation
    async fn snapshot(&self) -> Result<sqlx::Transaction<'_, sqlx::Postgres>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}

fn table_for(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Cross => "breeding_records",
        EntityKind::SeedBatch => "seed_batches",
        EntityKind::Seedling => "seedlings",
        EntityKind::Plant => "plants",
    }
}

/// Bump the (kind, year) counter and return the new identifier. The counter
/// row stays locked until the surrounding transaction ends, so concurrent
/// allocators for the same series queue up behind each other. It is seeded
/// from the largest identifier already stored so imported rows are skipped.
async fn allocate(conn: &mut PgConnection, kind: EntityKind, year: i32) -> Result<SequenceId> {
    let sql = format!(
        r#"
        INSERT INTO id_sequences (kind, year, last_value)
        VALUES ($1, $2, COALESCE((SELECT MAX(id_seq) FROM {} WHERE id_year = $2), 0) + 1)
        ON CONFLICT (kind, year) DO UPDATE
            SET last_value = GREATEST(id_sequences.last_value + 1, EXCLUDED.last_value)
        RETURNING last_value
        "#,
        table_for(kind)
    );

    let seq: i64 = sqlx::query_scalar(&sql)
        .bind(kind.as_str())
        .bind(year)
        .fetch_one(&mut *conn)
        .await?;

    Ok(SequenceId::new(kind, year, seq))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

fn is_check_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_check_violation())
}

/// A unique violation while inserting a freshly minted row can only be the
/// identifier column; hand it to the allocator's retry loop.
fn identifier_error(err: sqlx::Error, identifier: &SequenceId) -> LineageError {
    if is_unique_violation(&err) {
        LineageError::IdentifierTaken(identifier.to_string())
    } else {
        LineageError::Persistence(err)
    }
}

fn cycle_write_error(err: sqlx::Error, cycle: &FloweringCycle) -> LineageError {
    if is_foreign_key_violation(&err) {
        LineageError::not_found(
            "cross",
            cycle.breeding_record_id.clone().unwrap_or_default(),
        )
    } else if is_check_violation(&err) {
        LineageError::Validation(format!("flowering cycle {} violates a table constraint", cycle.id))
    } else {
        LineageError::Persistence(err)
    }
}

fn sequence_id(row: &PgRow, column: &str) -> std::result::Result<SequenceId, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

/// Text column holding one of a fixed set of names; anything else is corrupt data
fn enum_column<T>(row: &PgRow, column: &str, parse: fn(&str) -> Option<T>) -> std::result::Result<T, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    parse(&raw).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("unrecognised value '{}'", raw).into(),
    })
}

fn plant_from_row(row: &PgRow) -> std::result::Result<Plant, sqlx::Error> {
    Ok(Plant {
        id: row.try_get("id")?,
        plant_id: sequence_id(row, "plant_id")?,
        hybrid_name: row.try_get("hybrid_name")?,
        species: row.try_get("species")?,
        section: row.try_get("section")?,
        generation: row.try_get("generation")?,
        female_parent_id: row.try_get("female_parent_id")?,
        male_parent_id: row.try_get("male_parent_id")?,
        breeding_record_id: row.try_get("breeding_record_id")?,
        propagation_type: row.try_get("propagation_type")?,
        accession_date: row.try_get("accession_date")?,
        archived: row.try_get("archived")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
    })
}

fn cross_from_row(row: &PgRow) -> std::result::Result<BreedingRecord, sqlx::Error> {
    Ok(BreedingRecord {
        id: row.try_get("id")?,
        cross_id: sequence_id(row, "cross_id")?,
        female_plant_id: row.try_get("female_plant_id")?,
        male_plant_id: row.try_get("male_plant_id")?,
        cross_date: row.try_get("cross_date")?,
        cross_type: enum_column(row, "cross_type", CrossType::parse)?,
        pollination_method: row.try_get("pollination_method")?,
        notes: row.try_get("notes")?,
        archived: row.try_get("archived")?,
        created_at: row.try_get("created_at")?,
    })
}

fn harvest_from_row(row: &PgRow) -> std::result::Result<Harvest, sqlx::Error> {
    let photos: Json<Vec<String>> = row.try_get("photos")?;
    Ok(Harvest {
        id: row.try_get("id")?,
        breeding_record_id: row.try_get("breeding_record_id")?,
        harvest_number: row.try_get("harvest_number")?,
        harvest_date: row.try_get("harvest_date")?,
        berry_count: row.try_get("berry_count")?,
        seed_count: row.try_get("seed_count")?,
        seed_viability: row.try_get("seed_viability")?,
        notes: row.try_get("notes")?,
        photos: photos.0,
        created_at: row.try_get("created_at")?,
    })
}

fn seed_batch_from_row(row: &PgRow) -> std::result::Result<SeedBatch, sqlx::Error> {
    Ok(SeedBatch {
        id: row.try_get("id")?,
        batch_id: sequence_id(row, "batch_id")?,
        harvest_id: row.try_get("harvest_id")?,
        sow_date: row.try_get("sow_date")?,
        seed_count: row.try_get("seed_count")?,
        substrate: row.try_get("substrate")?,
        container: row.try_get("container")?,
        temperature: row.try_get("temperature")?,
        humidity: row.try_get("humidity")?,
        status: enum_column(row, "status", SeedBatchStatus::parse)?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        seedling_count: row.try_get("seedling_count")?,
    })
}

fn seedling_from_row(row: &PgRow) -> std::result::Result<Seedling, sqlx::Error> {
    Ok(Seedling {
        id: row.try_get("id")?,
        seedling_id: sequence_id(row, "seedling_id")?,
        seed_batch_id: row.try_get("seed_batch_id")?,
        position_label: row.try_get("position_label")?,
        emergence_date: row.try_get("emergence_date")?,
        health_status: row.try_get("health_status")?,
        selection_status: enum_column(row, "selection_status", SelectionStatus::parse)?,
        notes: row.try_get("notes")?,
        graduated_to_plant_id: row.try_get("graduated_to_plant_id")?,
        graduation_date: row.try_get("graduation_date")?,
        created_at: row.try_get("created_at")?,
    })
}

fn cycle_from_row(row: &PgRow) -> std::result::Result<FloweringCycle, sqlx::Error> {
    Ok(FloweringCycle {
        id: row.try_get("id")?,
        plant_id: row.try_get("plant_id")?,
        breeding_record_id: row.try_get("breeding_record_id")?,
        spathe_emergence: row.try_get("spathe_emergence")?,
        female_start: row.try_get("female_start")?,
        female_end: row.try_get("female_end")?,
        male_start: row.try_get("male_start")?,
        male_end: row.try_get("male_end")?,
        spathe_close: row.try_get("spathe_close")?,
        pollen_collected: row.try_get("pollen_collected")?,
        pollen_quality: row.try_get("pollen_quality")?,
        pollen_stored: row.try_get("pollen_stored")?,
        pollen_storage_date: row.try_get("pollen_storage_date")?,
        crosses_attempted: row.try_get("crosses_attempted")?,
        seeds_produced: row.try_get("seeds_produced")?,
        temperature: row.try_get("temperature")?,
        humidity: row.try_get("humidity")?,
        notes: row.try_get("notes")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

async fn fetch_plant<'e, E: PgExecutor<'e>>(executor: E, id: &Id) -> Result<Option<Plant>> {
    let sql = format!("SELECT {} FROM plants WHERE id = $1", PLANT_COLUMNS);
    let row = sqlx::query(&sql).bind(id).fetch_optional(executor).await?;
    Ok(row.as_ref().map(plant_from_row).transpose()?)
}

async fn fetch_cross<'e, E: PgExecutor<'e>>(executor: E, id: &Id, lock: &str) -> Result<Option<BreedingRecord>> {
    let sql = format!("SELECT {} FROM breeding_records WHERE id = $1 {}", CROSS_COLUMNS, lock);
    let row = sqlx::query(&sql).bind(id).fetch_optional(executor).await?;
    Ok(row.as_ref().map(cross_from_row).transpose()?)
}

async fn fetch_harvest<'e, E: PgExecutor<'e>>(executor: E, id: &Id, lock: &str) -> Result<Option<Harvest>> {
    let sql = format!("SELECT {} FROM harvests WHERE id = $1 {}", HARVEST_COLUMNS, lock);
    let row = sqlx::query(&sql).bind(id).fetch_optional(executor).await?;
    Ok(row.as_ref().map(harvest_from_row).transpose()?)
}

async fn fetch_seed_batch<'e, E: PgExecutor<'e>>(executor: E, id: &Id) -> Result<Option<SeedBatch>> {
    let sql = format!("SELECT {} FROM seed_batches b WHERE b.id = $1", SEED_BATCH_COLUMNS);
    let row = sqlx::query(&sql).bind(id).fetch_optional(executor).await?;
    Ok(row.as_ref().map(seed_batch_from_row).transpose()?)
}

async fn fetch_seedling<'e, E: PgExecutor<'e>>(executor: E, id: &Id, lock: &str) -> Result<Option<Seedling>> {
    let sql = format!("SELECT {} FROM seedlings WHERE id = $1 {}", SEEDLING_COLUMNS, lock);
    let row = sqlx::query(&sql).bind(id).fetch_optional(executor).await?;
    Ok(row.as_ref().map(seedling_from_row).transpose()?)
}

async fn fetch_seedlings_for_batch<'e, E: PgExecutor<'e>>(executor: E, seed_batch_id: &Id) -> Result<Vec<Seedling>> {
    let sql = format!(
        "SELECT {} FROM seedlings WHERE seed_batch_id = $1 ORDER BY id_year, id_seq",
        SEEDLING_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(seed_batch_id).fetch_all(executor).await?;
    Ok(rows.iter().map(seedling_from_row).collect::<std::result::Result<_, _>>()?)
}

async fn insert_plant_row(conn: &mut PgConnection, plant: &Plant) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO plants (id, plant_id, id_year, id_seq, hybrid_name, species, section, generation,
                            female_parent_id, male_parent_id, breeding_record_id, propagation_type,
                            accession_date, archived, notes, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        "#,
    )
    .bind(&plant.id)
    .bind(plant.plant_id.to_string())
    .bind(plant.plant_id.year)
    .bind(plant.plant_id.seq)
    .bind(&plant.hybrid_name)
    .bind(&plant.species)
    .bind(&plant.section)
    .bind(&plant.generation)
    .bind(&plant.female_parent_id)
    .bind(&plant.male_parent_id)
    .bind(&plant.breeding_record_id)
    .bind(&plant.propagation_type)
    .bind(plant.accession_date)
    .bind(plant.archived)
    .bind(&plant.notes)
    .bind(plant.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| identifier_error(e, &plant.plant_id))?;
    Ok(())
}

/// Parent plants must exist and be live; the share lock holds off a
/// concurrent archive until the child row is committed.
async fn require_live_plant(conn: &mut PgConnection, id: &Id) -> Result<()> {
    let archived: Option<bool> = sqlx::query_scalar("SELECT archived FROM plants WHERE id = $1 FOR SHARE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    match archived {
        Some(false) => Ok(()),
        _ => Err(LineageError::not_found("plant", id.clone())),
    }
}

#[async_trait::async_trait]
impl PlantStore for PostgresStore {
    async fn get_plant(&self, id: &Id) -> Result<Option<Plant>> {
        fetch_plant(&self.pool, id).await
    }

    async fn insert_plant(&self, year: i32, plant: NewPlant, now: DateTime<Utc>) -> Result<Plant> {
        let mut tx = self.pool.begin().await?;
        let plant_id = allocate(&mut tx, EntityKind::Plant, year).await?;
        let plant = plant.into_plant(plant_id, now);
        insert_plant_row(&mut tx, &plant).await?;
        tx.commit().await?;
        Ok(plant)
    }

    async fn set_plant_archived(&self, id: &Id, archived: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE plants SET archived = $2 WHERE id = $1")
            .bind(id)
            .bind(archived)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl CrossStore for PostgresStore {
    async fn get_cross(&self, id: &Id) -> Result<Option<BreedingRecord>> {
        fetch_cross(&self.pool, id, "").await
    }

    async fn list_crosses(&self) -> Result<Vec<BreedingRecord>> {
        let sql = format!(
            "SELECT {} FROM breeding_records ORDER BY cross_date DESC, id_year DESC, id_seq DESC",
            CROSS_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(cross_from_row).collect::<std::result::Result<_, _>>()?)
    }

    async fn insert_cross(&self, year: i32, cross: NewCross, now: DateTime<Utc>) -> Result<BreedingRecord> {
        let mut tx = self.pool.begin().await?;
        require_live_plant(&mut tx, &cross.female_plant_id).await?;
        require_live_plant(&mut tx, &cross.male_plant_id).await?;

        let cross_id = allocate(&mut tx, EntityKind::Cross, year).await?;
        let record = cross.into_record(cross_id, now);

        sqlx::query(
            r#"
            INSERT INTO breeding_records (id, cross_id, id_year, id_seq, female_plant_id, male_plant_id,
                                          cross_date, cross_type, pollination_method, notes, archived, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&record.id)
        .bind(record.cross_id.to_string())
        .bind(record.cross_id.year)
        .bind(record.cross_id.seq)
        .bind(&record.female_plant_id)
        .bind(&record.male_plant_id)
        .bind(record.cross_date)
        .bind(record.cross_type.as_str())
        .bind(&record.pollination_method)
        .bind(&record.notes)
        .bind(record.archived)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| identifier_error(e, &record.cross_id))?;

        tx.commit().await?;
        Ok(record)
    }

    async fn update_cross(&self, id: &Id, update: CrossUpdate) -> Result<BreedingRecord> {
        let mut tx = self.pool.begin().await?;
        let mut record = fetch_cross(&mut *tx, id, "FOR UPDATE")
            .await?
            .ok_or_else(|| LineageError::not_found("cross", id.clone()))?;
        update.apply_to(&mut record);

        sqlx::query(
            r#"
            UPDATE breeding_records
            SET cross_date = $2, cross_type = $3, pollination_method = $4, notes = $5
            WHERE id = $1
            "#,
        )
        .bind(&record.id)
        .bind(record.cross_date)
        .bind(record.cross_type.as_str())
        .bind(&record.pollination_method)
        .bind(&record.notes)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    async fn set_cross_archived(&self, id: &Id, archived: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE breeding_records SET archived = $2 WHERE id = $1")
            .bind(id)
            .bind(archived)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_cross(&self, id: &Id) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let Some(record) = fetch_cross(&mut *tx, id, "FOR UPDATE").await? else {
            return Ok(false);
        };

        let graduated: Vec<String> =
            sqlx::query_scalar("SELECT plant_id FROM plants WHERE breeding_record_id = $1 ORDER BY id_year, id_seq")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;
        if !graduated.is_empty() {
            return Err(LineageError::Conflict(format!(
                "cannot delete cross {} with graduated plants: {}",
                record.cross_id,
                graduated.join(", ")
            )));
        }

        sqlx::query("DELETE FROM breeding_records WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait::async_trait]
impl HarvestStore for PostgresStore {
    async fn get_harvest(&self, id: &Id) -> Result<Option<Harvest>> {
        fetch_harvest(&self.pool, id, "").await
    }

    async fn list_harvests_for_cross(&self, cross_id: &Id) -> Result<Vec<Harvest>> {
        let sql = format!(
            "SELECT {} FROM harvests WHERE breeding_record_id = $1 ORDER BY harvest_number",
            HARVEST_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(cross_id).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(harvest_from_row).collect::<std::result::Result<_, _>>()?)
    }

    async fn harvest_high_water(&self, cross_id: &Id) -> Result<Option<i32>> {
        let high_water = sqlx::query_scalar("SELECT harvest_high_water FROM breeding_records WHERE id = $1")
            .bind(cross_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(high_water)
    }

    async fn insert_harvest(&self, cross_id: &Id, harvest: NewHarvest, now: DateTime<Utc>) -> Result<Harvest> {
        let mut tx = self.pool.begin().await?;

        // The row lock on the cross serialises harvest creation per cross
        let row = sqlx::query(
            "SELECT cross_id, archived, harvest_high_water FROM breeding_records WHERE id = $1 FOR UPDATE",
        )
        .bind(cross_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Err(LineageError::not_found("cross", cross_id.clone()));
        };
        if row.try_get::<bool, _>("archived")? {
            return Err(LineageError::not_found("cross", cross_id.clone()));
        }
        let label: String = row.try_get("cross_id")?;
        let high_water: i32 = row.try_get("harvest_high_water")?;

        let number = harvest.numbering().resolve(high_water)?;
        let harvest = harvest.into_harvest(cross_id.clone(), number, now);

        let inserted = sqlx::query(
            r#"
            INSERT INTO harvests (id, breeding_record_id, harvest_number, harvest_date, berry_count,
                                  seed_count, seed_viability, notes, photos, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&harvest.id)
        .bind(&harvest.breeding_record_id)
        .bind(harvest.harvest_number)
        .bind(harvest.harvest_date)
        .bind(harvest.berry_count)
        .bind(harvest.seed_count)
        .bind(harvest.seed_viability)
        .bind(&harvest.notes)
        .bind(Json(&harvest.photos))
        .bind(harvest.created_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(LineageError::DuplicateHarvestNumber {
                    cross_id: label,
                    number,
                })
            }
            Err(e) => return Err(e.into()),
        }

        sqlx::query(
            "UPDATE breeding_records SET harvest_high_water = GREATEST(harvest_high_water, $2) WHERE id = $1",
        )
        .bind(cross_id)
        .bind(number)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(harvest)
    }

    async fn update_harvest(&self, id: &Id, update: HarvestUpdate) -> Result<Harvest> {
        let mut tx = self.pool.begin().await?;
        let mut harvest = fetch_harvest(&mut *tx, id, "FOR UPDATE")
            .await?
            .ok_or_else(|| LineageError::not_found("harvest", id.clone()))?;
        update.apply_to(&mut harvest);

        sqlx::query(
            r#"
            UPDATE harvests
            SET harvest_date = $2, berry_count = $3, seed_count = $4, seed_viability = $5,
                notes = $6, photos = $7
            WHERE id = $1
            "#,
        )
        .bind(&harvest.id)
        .bind(harvest.harvest_date)
        .bind(harvest.berry_count)
        .bind(harvest.seed_count)
        .bind(harvest.seed_viability)
        .bind(&harvest.notes)
        .bind(Json(&harvest.photos))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(harvest)
    }

    async fn delete_harvest(&self, id: &Id) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let Some(harvest) = fetch_harvest(&mut *tx, id, "FOR UPDATE").await? else {
            return Ok(false);
        };

        let seedlings: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM seedlings s
            JOIN seed_batches b ON b.id = s.seed_batch_id
            WHERE b.harvest_id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if seedlings > 0 {
            return Err(LineageError::Conflict(format!(
                "cannot delete harvest #{} with {} seedlings",
                harvest.harvest_number, seedlings
            )));
        }

        // The high-water mark on the cross is left untouched: numbers are not reused
        sqlx::query("DELETE FROM harvests WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait::async_trait]
impl SeedBatchStore for PostgresStore {
    async fn get_seed_batch(&self, id: &Id) -> Result<Option<SeedBatch>> {
        fetch_seed_batch(&self.pool, id).await
    }

    async fn list_seed_batches(&self, harvest_id: Option<&Id>) -> Result<Vec<SeedBatch>> {
        let sql = format!(
            "SELECT {} FROM seed_batches b WHERE ($1::TEXT IS NULL OR b.harvest_id = $1) \
             ORDER BY b.sow_date DESC, b.id_year DESC, b.id_seq DESC",
            SEED_BATCH_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(harvest_id).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(seed_batch_from_row).collect::<std::result::Result<_, _>>()?)
    }

    async fn insert_seed_batch(
        &self,
        year: i32,
        harvest_id: &Id,
        batch: NewSeedBatch,
        now: DateTime<Utc>,
    ) -> Result<SeedBatch> {
        let mut tx = self.pool.begin().await?;
        let parent: Option<String> = sqlx::query_scalar("SELECT id FROM harvests WHERE id = $1 FOR SHARE")
            .bind(harvest_id)
            .fetch_optional(&mut *tx)
            .await?;
        if parent.is_none() {
            return Err(LineageError::not_found("harvest", harvest_id.clone()));
        }

        let batch_id = allocate(&mut tx, EntityKind::SeedBatch, year).await?;
        let batch = batch.into_batch(batch_id, harvest_id.clone(), now);

        sqlx::query(
            r#"
            INSERT INTO seed_batches (id, batch_id, id_year, id_seq, harvest_id, sow_date, seed_count,
                                      substrate, container, temperature, humidity, status, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(&batch.id)
        .bind(batch.batch_id.to_string())
        .bind(batch.batch_id.year)
        .bind(batch.batch_id.seq)
        .bind(&batch.harvest_id)
        .bind(batch.sow_date)
        .bind(batch.seed_count)
        .bind(&batch.substrate)
        .bind(&batch.container)
        .bind(batch.temperature)
        .bind(batch.humidity)
        .bind(batch.status.as_str())
        .bind(&batch.notes)
        .bind(batch.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| identifier_error(e, &batch.batch_id))?;

        tx.commit().await?;
        Ok(batch)
    }

    async fn delete_seed_batch(&self, id: &Id) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let batch_id: Option<String> = sqlx::query_scalar("SELECT batch_id FROM seed_batches WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(batch_id) = batch_id else {
            return Ok(false);
        };

        let seedlings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM seedlings WHERE seed_batch_id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if seedlings > 0 {
            return Err(LineageError::Conflict(format!(
                "cannot delete seed batch {} with {} seedlings",
                batch_id, seedlings
            )));
        }

        sqlx::query("DELETE FROM seed_batches WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait::async_trait]
impl SeedlingStore for PostgresStore {
    async fn get_seedling(&self, id: &Id) -> Result<Option<Seedling>> {
        fetch_seedling(&self.pool, id, "").await
    }

    async fn list_seedlings(&self, filter: &SeedlingFilter) -> Result<Vec<Seedling>> {
        let sql = format!(
            r#"
            SELECT {} FROM seedlings
            WHERE ($1::TEXT IS NULL OR seed_batch_id = $1)
              AND ($2::TEXT IS NULL OR selection_status = $2)
              AND ($3::TEXT IS NULL OR health_status = $3)
            ORDER BY id_year, id_seq
            "#,
            SEEDLING_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(&filter.seed_batch_id)
            .bind(filter.selection_status.map(|s| s.as_str()))
            .bind(&filter.health_status)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(seedling_from_row).collect::<std::result::Result<_, _>>()?)
    }

    async fn insert_seedling(
        &self,
        year: i32,
        seed_batch_id: &Id,
        seedling: NewSeedling,
        now: DateTime<Utc>,
    ) -> Result<Seedling> {
        let mut tx = self.pool.begin().await?;
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM seed_batches WHERE id = $1 FOR UPDATE")
                .bind(seed_batch_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(status) = status else {
            return Err(LineageError::not_found("seed batch", seed_batch_id.clone()));
        };

        let seedling_id = allocate(&mut tx, EntityKind::Seedling, year).await?;
        let seedling = seedling.into_seedling(seedling_id, seed_batch_id.clone(), now);

        sqlx::query(
            r#"
            INSERT INTO seedlings (id, seedling_id, id_year, id_seq, seed_batch_id, position_label,
                                   emergence_date, health_status, selection_status, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&seedling.id)
        .bind(seedling.seedling_id.to_string())
        .bind(seedling.seedling_id.year)
        .bind(seedling.seedling_id.seq)
        .bind(&seedling.seed_batch_id)
        .bind(&seedling.position_label)
        .bind(seedling.emergence_date)
        .bind(&seedling.health_status)
        .bind(seedling.selection_status.as_str())
        .bind(&seedling.notes)
        .bind(seedling.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| identifier_error(e, &seedling.seedling_id))?;

        if SeedBatchStatus::parse(&status) == Some(SeedBatchStatus::Sown) {
            sqlx::query("UPDATE seed_batches SET status = $2 WHERE id = $1")
                .bind(seed_batch_id)
                .bind(SeedBatchStatus::Germinating.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(seedling)
    }

    async fn update_seedling(&self, id: &Id, update: SeedlingUpdate) -> Result<Seedling> {
        let mut tx = self.pool.begin().await?;
        let mut seedling = fetch_seedling(&mut *tx, id, "FOR UPDATE")
            .await?
            .ok_or_else(|| LineageError::not_found("seedling", id.clone()))?;
        update.validate(&seedling)?;
        update.apply_to(&mut seedling);

        sqlx::query(
            r#"
            UPDATE seedlings
            SET position_label = $2, health_status = $3, selection_status = $4, notes = $5
            WHERE id = $1
            "#,
        )
        .bind(&seedling.id)
        .bind(&seedling.position_label)
        .bind(&seedling.health_status)
        .bind(seedling.selection_status.as_str())
        .bind(&seedling.notes)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(seedling)
    }

    async fn delete_seedling(&self, id: &Id) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let Some(seedling) = fetch_seedling(&mut *tx, id, "FOR UPDATE").await? else {
            return Ok(false);
        };
        seedling.check_deletable()?;

        // id_sequences is left alone so the number stays retired
        sqlx::query("DELETE FROM seedlings WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn promote_seedling(
        &self,
        year: i32,
        seedling_id: &Id,
        promotion: PlantPromotion,
        now: DateTime<Utc>,
    ) -> Result<(Seedling, Plant)> {
        let mut tx = self.pool.begin().await?;
        let mut seedling = fetch_seedling(&mut *tx, seedling_id, "FOR UPDATE")
            .await?
            .ok_or_else(|| LineageError::not_found("seedling", seedling_id.clone()))?;
        PlantPromotion::check_eligible(&seedling)?;

        let cross_key: Option<String> = sqlx::query_scalar(
            r#"
            SELECT h.breeding_record_id FROM seed_batches b
            JOIN harvests h ON h.id = b.harvest_id
            WHERE b.id = $1
            "#,
        )
        .bind(&seedling.seed_batch_id)
        .fetch_optional(&mut *tx)
        .await?;
        let cross = match cross_key {
            Some(key) => fetch_cross(&mut *tx, &key, "FOR SHARE").await?,
            None => None,
        }
        .ok_or_else(|| LineageError::not_found("cross for seedling", seedling.seedling_id.to_string()))?;
        let mother = fetch_plant(&mut *tx, &cross.female_plant_id)
            .await?
            .ok_or_else(|| LineageError::not_found("plant", cross.female_plant_id.clone()))?;
        let father = fetch_plant(&mut *tx, &cross.male_plant_id)
            .await?
            .ok_or_else(|| LineageError::not_found("plant", cross.male_plant_id.clone()))?;

        let plant_id = allocate(&mut tx, EntityKind::Plant, year).await?;
        let plant = promotion.into_plant(
            PromotionLineage {
                seedling: &seedling,
                cross: &cross,
                mother: &mother,
                father: &father,
            },
            plant_id,
            now,
        );
        insert_plant_row(&mut tx, &plant).await?;

        seedling.graduated_to_plant_id = Some(plant.id.clone());
        seedling.graduation_date = Some(now);
        seedling.selection_status = SelectionStatus::Graduated;
        sqlx::query(
            r#"
            UPDATE seedlings
            SET graduated_to_plant_id = $2, graduation_date = $3, selection_status = $4
            WHERE id = $1
            "#,
        )
        .bind(&seedling.id)
        .bind(&seedling.graduated_to_plant_id)
        .bind(seedling.graduation_date)
        .bind(seedling.selection_status.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((seedling, plant))
    }
}

#[async_trait::async_trait]
impl FloweringStore for PostgresStore {
    async fn get_cycle(&self, id: &Id) -> Result<Option<FloweringCycle>> {
        let sql = format!("SELECT {} FROM flowering_cycles WHERE id = $1", CYCLE_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(cycle_from_row).transpose()?)
    }

    async fn list_cycles_for_plant(&self, plant_id: &Id) -> Result<Vec<FloweringCycle>> {
        let sql = format!(
            "SELECT {} FROM flowering_cycles WHERE plant_id = $1 ORDER BY spathe_emergence DESC NULLS LAST",
            CYCLE_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(plant_id).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(cycle_from_row).collect::<std::result::Result<_, _>>()?)
    }

    async fn insert_cycle(&self, cycle: FloweringCycle) -> Result<FloweringCycle> {
        let mut tx = self.pool.begin().await?;
        require_live_plant(&mut tx, &cycle.plant_id).await?;

        let sql = format!(
            r#"
            INSERT INTO flowering_cycles ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            "#,
            CYCLE_COLUMNS
        );
        sqlx::query(&sql)
            .bind(&cycle.id)
            .bind(&cycle.plant_id)
            .bind(&cycle.breeding_record_id)
            .bind(cycle.spathe_emergence)
            .bind(cycle.female_start)
            .bind(cycle.female_end)
            .bind(cycle.male_start)
            .bind(cycle.male_end)
            .bind(cycle.spathe_close)
            .bind(cycle.pollen_collected)
            .bind(&cycle.pollen_quality)
            .bind(cycle.pollen_stored)
            .bind(cycle.pollen_storage_date)
            .bind(cycle.crosses_attempted)
            .bind(cycle.seeds_produced)
            .bind(cycle.temperature)
            .bind(cycle.humidity)
            .bind(&cycle.notes)
            .bind(cycle.version)
            .bind(cycle.created_at)
            .bind(cycle.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| cycle_write_error(e, &cycle))?;

        tx.commit().await?;
        Ok(cycle)
    }

    async fn replace_cycle(&self, cycle: FloweringCycle, expected_version: i64) -> Result<Option<FloweringCycle>> {
        let sql = format!(
            r#"
            UPDATE flowering_cycles
            SET breeding_record_id = $3, spathe_emergence = $4, female_start = $5, female_end = $6,
                male_start = $7, male_end = $8, spathe_close = $9, pollen_collected = $10,
                pollen_quality = $11, pollen_stored = $12, pollen_storage_date = $13,
                crosses_attempted = $14, seeds_produced = $15, temperature = $16, humidity = $17,
                notes = $18, updated_at = $19, version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {}
            "#,
            CYCLE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&cycle.id)
            .bind(expected_version)
            .bind(&cycle.breeding_record_id)
            .bind(cycle.spathe_emergence)
            .bind(cycle.female_start)
            .bind(cycle.female_end)
            .bind(cycle.male_start)
            .bind(cycle.male_end)
            .bind(cycle.spathe_close)
            .bind(cycle.pollen_collected)
            .bind(&cycle.pollen_quality)
            .bind(cycle.pollen_stored)
            .bind(cycle.pollen_storage_date)
            .bind(cycle.crosses_attempted)
            .bind(cycle.seeds_produced)
            .bind(cycle.temperature)
            .bind(cycle.humidity)
            .bind(&cycle.notes)
            .bind(cycle.updated_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| cycle_write_error(e, &cycle))?;

        if let Some(row) = row {
            return Ok(Some(cycle_from_row(&row)?));
        }

        let exists: Option<String> = sqlx::query_scalar("SELECT id FROM flowering_cycles WHERE id = $1")
            .bind(&cycle.id)
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Ok(None),
            None => Err(LineageError::not_found("flowering cycle", cycle.id)),
        }
    }

    async fn delete_cycle(&self, id: &Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM flowering_cycles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl SnapshotStore for PostgresStore {
    async fn cross_snapshot(&self, id: &Id) -> Result<Option<CrossSnapshot>> {
        let mut tx = self.snapshot().await?;
        let Some(record) = fetch_cross(&mut *tx, id, "").await? else {
            return Ok(None);
        };

        let sql = format!(
            "SELECT {} FROM harvests WHERE breeding_record_id = $1 ORDER BY harvest_number",
            HARVEST_COLUMNS
        );
        let harvests = sqlx::query(&sql)
            .bind(id)
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(harvest_from_row)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let sql = format!(
            "SELECT {} FROM seed_batches b JOIN harvests h ON h.id = b.harvest_id \
             WHERE h.breeding_record_id = $1 ORDER BY b.id_year, b.id_seq",
            SEED_BATCH_COLUMNS
        );
        let seed_batches = sqlx::query(&sql)
            .bind(id)
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(seed_batch_from_row)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let offspring: Vec<String> =
            sqlx::query_scalar("SELECT id FROM plants WHERE breeding_record_id = $1 ORDER BY id_year, id_seq")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;

        tx.commit().await?;
        Ok(Some(CrossSnapshot {
            record,
            harvests,
            seed_batches,
            offspring,
        }))
    }

    async fn list_cross_snapshots(&self) -> Result<Vec<CrossSnapshot>> {
        let mut tx = self.snapshot().await?;

        let sql = format!(
            "SELECT {} FROM breeding_records ORDER BY cross_date DESC, id_year DESC, id_seq DESC",
            CROSS_COLUMNS
        );
        let records = sqlx::query(&sql)
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(cross_from_row)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let sql = format!(
            "SELECT {} FROM harvests ORDER BY breeding_record_id, harvest_number",
            HARVEST_COLUMNS
        );
        let mut harvests_by_cross = sqlx::query(&sql)
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(harvest_from_row)
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|h| (h.breeding_record_id.clone(), h))
            .into_group_map();

        let sql = format!(
            "SELECT {}, h.breeding_record_id AS cross_key FROM seed_batches b \
             JOIN harvests h ON h.id = b.harvest_id ORDER BY b.id_year, b.id_seq",
            SEED_BATCH_COLUMNS
        );
        let mut batches_by_cross = sqlx::query(&sql)
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(|row| -> std::result::Result<_, sqlx::Error> {
                Ok((row.try_get::<String, _>("cross_key")?, seed_batch_from_row(row)?))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .into_group_map();

        let offspring_rows = sqlx::query(
            "SELECT id, breeding_record_id FROM plants WHERE breeding_record_id IS NOT NULL ORDER BY id_year, id_seq",
        )
        .fetch_all(&mut *tx)
        .await?;
        let mut offspring_by_cross = offspring_rows
            .iter()
            .map(|row| -> std::result::Result<_, sqlx::Error> {
                Ok((row.try_get::<String, _>("breeding_record_id")?, row.try_get::<String, _>("id")?))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .into_group_map();

        tx.commit().await?;

        Ok(records
            .into_iter()
            .map(|record| CrossSnapshot {
                harvests: harvests_by_cross.remove(&record.id).unwrap_or_default(),
                seed_batches: batches_by_cross.remove(&record.id).unwrap_or_default(),
                offspring: offspring_by_cross.remove(&record.id).unwrap_or_default(),
                record,
            })
            .collect())
    }

    async fn seed_batch_snapshot(&self, id: &Id) -> Result<Option<SeedBatchSnapshot>> {
        let mut tx = self.snapshot().await?;
        let Some(batch) = fetch_seed_batch(&mut *tx, id).await? else {
            return Ok(None);
        };
        let seedlings = fetch_seedlings_for_batch(&mut *tx, id).await?;
        tx.commit().await?;
        Ok(Some(SeedBatchSnapshot { batch, seedlings }))
    }
}
