use crate::model::{generate_id, Id, SequenceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrossType {
    #[default]
    Controlled,
    Open,
    #[serde(rename = "SELF")]
    SelfPollinated,
}

impl CrossType {
    pub fn as_str(self) -> &'static str {
        match self {
            CrossType::Controlled => "CONTROLLED",
            CrossType::Open => "OPEN",
            CrossType::SelfPollinated => "SELF",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CONTROLLED" => Some(CrossType::Controlled),
            "OPEN" => Some(CrossType::Open),
            "SELF" => Some(CrossType::SelfPollinated),
            _ => None,
        }
    }
}

/// A cross between two parent plants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreedingRecord {
    pub id: Id,
    pub cross_id: SequenceId, // CLX-YYYY-NNN, immutable once minted
    pub female_plant_id: Id,
    pub male_plant_id: Id,
    pub cross_date: DateTime<Utc>,
    pub cross_type: CrossType,
    pub pollination_method: Option<String>,
    pub notes: Option<String>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
}

impl BreedingRecord {
    /// Allocation year of the cross
    pub fn year(&self) -> i32 {
        self.cross_id.year
    }

    pub fn is_selfing(&self) -> bool {
        self.female_plant_id == self.male_plant_id
    }
}

/// Input model for creating a cross
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCross {
    #[serde(alias = "mother_plant_id")]
    pub female_plant_id: Id,
    #[serde(alias = "father_plant_id")]
    pub male_plant_id: Id,
    pub cross_date: Option<DateTime<Utc>>,
    pub cross_type: Option<CrossType>,
    pub pollination_method: Option<String>,
    pub notes: Option<String>,
}

impl NewCross {
    pub fn new(female_plant_id: impl Into<Id>, male_plant_id: impl Into<Id>) -> Self {
        Self {
            female_plant_id: female_plant_id.into(),
            male_plant_id: male_plant_id.into(),
            cross_date: None,
            cross_type: None,
            pollination_method: None,
            notes: None,
        }
    }

    /// Convert to a full record with server-generated fields
    pub fn into_record(self, cross_id: SequenceId, now: DateTime<Utc>) -> BreedingRecord {
        let cross_type = self.cross_type.unwrap_or(if self.female_plant_id == self.male_plant_id {
            CrossType::SelfPollinated
        } else {
            CrossType::Controlled
        });

        BreedingRecord {
            id: generate_id(),
            cross_id,
            female_plant_id: self.female_plant_id,
            male_plant_id: self.male_plant_id,
            cross_date: self.cross_date.unwrap_or(now),
            cross_type,
            pollination_method: self.pollination_method,
            notes: self.notes,
            archived: false,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossUpdate {
    pub cross_date: Option<DateTime<Utc>>,
    pub cross_type: Option<CrossType>,
    pub pollination_method: Option<String>,
    pub notes: Option<String>,
}

impl CrossUpdate {
    pub fn apply_to(self, record: &mut BreedingRecord) {
        if let Some(cross_date) = self.cross_date {
            record.cross_date = cross_date;
        }
        if let Some(cross_type) = self.cross_type {
            record.cross_type = cross_type;
        }
        if self.pollination_method.is_some() {
            record.pollination_method = self.pollination_method;
        }
        if self.notes.is_some() {
            record.notes = self.notes;
        }
    }
}
