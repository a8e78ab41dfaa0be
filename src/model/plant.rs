use crate::model::{generate_id, Id, SequenceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plant {
    pub id: Id,
    pub plant_id: SequenceId, // ANT-YYYY-NNNN
    pub hybrid_name: Option<String>,
    pub species: Option<String>,
    pub section: Option<String>,
    pub generation: Option<String>,
    pub female_parent_id: Option<Id>,
    pub male_parent_id: Option<Id>,
    pub breeding_record_id: Option<Id>, // Set when the plant graduated out of a cross
    pub propagation_type: Option<String>,
    pub accession_date: DateTime<Utc>,
    pub archived: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Plant {
    /// Name used when composing hybrid names for offspring
    pub fn display_name(&self) -> &str {
        self.hybrid_name
            .as_deref()
            .or(self.species.as_deref())
            .unwrap_or("Unknown")
    }
}

/// Input model for accessioning a plant into the collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewPlant {
    pub hybrid_name: Option<String>,
    pub species: Option<String>,
    pub section: Option<String>,
    pub generation: Option<String>,
    pub propagation_type: Option<String>,
    pub accession_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl NewPlant {
    pub fn into_plant(self, plant_id: SequenceId, now: DateTime<Utc>) -> Plant {
        Plant {
            id: generate_id(),
            plant_id,
            hybrid_name: self.hybrid_name,
            species: self.species,
            section: self.section,
            generation: self.generation,
            female_parent_id: None,
            male_parent_id: None,
            breeding_record_id: None,
            propagation_type: self.propagation_type,
            accession_date: self.accession_date.unwrap_or(now),
            archived: false,
            notes: self.notes,
            created_at: now,
        }
    }
}
