use crate::error::Result;
use crate::model::common::{check_non_negative, check_percentage};
use crate::model::{generate_id, Id, SequenceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeedBatchStatus {
    #[default]
    Sown,
    Germinating,
    Complete,
    Failed,
}

impl SeedBatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SeedBatchStatus::Sown => "SOWN",
            SeedBatchStatus::Germinating => "GERMINATING",
            SeedBatchStatus::Complete => "COMPLETE",
            SeedBatchStatus::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "SOWN" => Some(SeedBatchStatus::Sown),
            "GERMINATING" => Some(SeedBatchStatus::Germinating),
            "COMPLETE" => Some(SeedBatchStatus::Complete),
            "FAILED" => Some(SeedBatchStatus::Failed),
            _ => None,
        }
    }
}

/// Seeds from one harvest sown together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedBatch {
    pub id: Id,
    pub batch_id: SequenceId, // SDB-YYYY-NNN
    pub harvest_id: Id,
    pub sow_date: DateTime<Utc>,
    pub seed_count: i32,
    pub substrate: String,
    pub container: Option<String>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub status: SeedBatchStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Derived from the seedlings table on every read
    pub seedling_count: i64,
}

impl SeedBatch {
    pub fn germination_rate(&self) -> Option<f64> {
        (self.seed_count > 0).then(|| self.seedling_count as f64 / self.seed_count as f64 * 100.0)
    }
}

/// Input model for sowing a seed batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewSeedBatch {
    pub sow_date: Option<DateTime<Utc>>,
    pub seed_count: Option<i32>,
    pub substrate: Option<String>,
    pub container: Option<String>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub status: Option<SeedBatchStatus>,
    pub notes: Option<String>,
}

impl NewSeedBatch {
    pub fn validate(&self) -> Result<()> {
        check_non_negative("seed_count", self.seed_count)?;
        check_percentage("humidity", self.humidity)
    }

    pub fn into_batch(self, batch_id: SequenceId, harvest_id: Id, now: DateTime<Utc>) -> SeedBatch {
        SeedBatch {
            id: generate_id(),
            batch_id,
            harvest_id,
            sow_date: self.sow_date.unwrap_or(now),
            seed_count: self.seed_count.unwrap_or(0),
            substrate: self.substrate.unwrap_or_else(|| "Unknown".to_string()),
            container: self.container,
            temperature: self.temperature,
            humidity: self.humidity,
            status: self.status.unwrap_or_default(),
            notes: self.notes,
            created_at: now,
            seedling_count: 0,
        }
    }
}
