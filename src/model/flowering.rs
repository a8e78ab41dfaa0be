use crate::model::{generate_id, Id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stages of a flowering cycle in their required chronological order.
/// Anthurium inflorescences are protogynous: the female phase precedes pollen shed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloweringStage {
    Emerged,
    FemaleReceptive,
    FemaleClosed,
    MaleShedding,
    MaleFinished,
    Closed,
}

impl FloweringStage {
    pub const ORDER: [FloweringStage; 6] = [
        FloweringStage::Emerged,
        FloweringStage::FemaleReceptive,
        FloweringStage::FemaleClosed,
        FloweringStage::MaleShedding,
        FloweringStage::MaleFinished,
        FloweringStage::Closed,
    ];

    /// Name of the timestamp field that marks entry into this stage
    pub fn field(self) -> &'static str {
        match self {
            FloweringStage::Emerged => "spathe_emergence",
            FloweringStage::FemaleReceptive => "female_start",
            FloweringStage::FemaleClosed => "female_end",
            FloweringStage::MaleShedding => "male_start",
            FloweringStage::MaleFinished => "male_end",
            FloweringStage::Closed => "spathe_close",
        }
    }
}

impl fmt::Display for FloweringStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

/// One observed reproductive episode of a single inflorescence.
/// Created on first emergence observation and mutated in place afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloweringCycle {
    pub id: Id,
    pub plant_id: Id,
    pub breeding_record_id: Option<Id>,
    pub spathe_emergence: Option<DateTime<Utc>>,
    pub female_start: Option<DateTime<Utc>>,
    pub female_end: Option<DateTime<Utc>>,
    pub male_start: Option<DateTime<Utc>>,
    pub male_end: Option<DateTime<Utc>>,
    pub spathe_close: Option<DateTime<Utc>>,
    pub pollen_collected: bool,
    pub pollen_quality: Option<String>,
    pub pollen_stored: bool,
    pub pollen_storage_date: Option<DateTime<Utc>>,
    pub crosses_attempted: Option<i32>,
    pub seeds_produced: Option<i32>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub notes: Option<String>,
    /// Optimistic concurrency token, bumped on every write
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FloweringCycle {
    pub fn empty(plant_id: Id, now: DateTime<Utc>) -> Self {
        Self {
            id: generate_id(),
            plant_id,
            breeding_record_id: None,
            spathe_emergence: None,
            female_start: None,
            female_end: None,
            male_start: None,
            male_end: None,
            spathe_close: None,
            pollen_collected: false,
            pollen_quality: None,
            pollen_stored: false,
            pollen_storage_date: None,
            crosses_attempted: None,
            seeds_produced: None,
            temperature: None,
            humidity: None,
            notes: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn stage_timestamps(&self) -> [(FloweringStage, Option<DateTime<Utc>>); 6] {
        [
            (FloweringStage::Emerged, self.spathe_emergence),
            (FloweringStage::FemaleReceptive, self.female_start),
            (FloweringStage::FemaleClosed, self.female_end),
            (FloweringStage::MaleShedding, self.male_start),
            (FloweringStage::MaleFinished, self.male_end),
            (FloweringStage::Closed, self.spathe_close),
        ]
    }

    /// Furthest stage whose timestamp has been observed
    pub fn stage(&self) -> Option<FloweringStage> {
        self.stage_timestamps()
            .into_iter()
            .rev()
            .find_map(|(stage, at)| at.map(|_| stage))
    }
}

/// Partial update of a cycle. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FloweringPatch {
    pub breeding_record_id: Option<Id>,
    pub spathe_emergence: Option<DateTime<Utc>>,
    pub female_start: Option<DateTime<Utc>>,
    pub female_end: Option<DateTime<Utc>>,
    pub male_start: Option<DateTime<Utc>>,
    pub male_end: Option<DateTime<Utc>>,
    pub spathe_close: Option<DateTime<Utc>>,
    pub pollen_collected: Option<bool>,
    pub pollen_quality: Option<String>,
    pub pollen_stored: Option<bool>,
    pub pollen_storage_date: Option<DateTime<Utc>>,
    pub crosses_attempted: Option<i32>,
    pub seeds_produced: Option<i32>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub notes: Option<String>,
}

impl FloweringPatch {
    pub fn apply_to(self, cycle: &mut FloweringCycle) {
        macro_rules! merge {
            ($($field:ident),*) => {
                $(if self.$field.is_some() {
                    cycle.$field = self.$field;
                })*
            };
        }

        merge!(
            breeding_record_id,
            spathe_emergence,
            female_start,
            female_end,
            male_start,
            male_end,
            spathe_close,
            pollen_quality,
            pollen_storage_date,
            crosses_attempted,
            seeds_produced,
            temperature,
            humidity,
            notes
        );

        if let Some(collected) = self.pollen_collected {
            cycle.pollen_collected = collected;
        }
        if let Some(stored) = self.pollen_stored {
            cycle.pollen_stored = stored;
        }
    }
}
