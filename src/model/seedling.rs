use crate::error::{LineageError, Result};
use crate::model::{generate_id, BreedingRecord, Id, Plant, SequenceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectionStatus {
    #[default]
    Growing,
    Keeper,
    Holdback,
    Cull,
    Graduated,
}

impl SelectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SelectionStatus::Growing => "GROWING",
            SelectionStatus::Keeper => "KEEPER",
            SelectionStatus::Holdback => "HOLDBACK",
            SelectionStatus::Cull => "CULL",
            SelectionStatus::Graduated => "GRADUATED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "GROWING" => Some(SelectionStatus::Growing),
            "KEEPER" => Some(SelectionStatus::Keeper),
            "HOLDBACK" => Some(SelectionStatus::Holdback),
            "CULL" => Some(SelectionStatus::Cull),
            "GRADUATED" => Some(SelectionStatus::Graduated),
            _ => None,
        }
    }

    pub fn can_graduate(self) -> bool {
        matches!(self, SelectionStatus::Keeper | SelectionStatus::Holdback)
    }
}

/// A germinated individual from a seed batch, before promotion to a plant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seedling {
    pub id: Id,
    pub seedling_id: SequenceId, // SDL-YYYY-NNNN, global per year
    pub seed_batch_id: Id,
    pub position_label: Option<String>,
    pub emergence_date: DateTime<Utc>,
    pub health_status: String,
    pub selection_status: SelectionStatus,
    pub notes: Option<String>,
    pub graduated_to_plant_id: Option<Id>,
    pub graduation_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

fn reject_graduated(status: Option<SelectionStatus>) -> Result<()> {
    if status == Some(SelectionStatus::Graduated) {
        return Err(LineageError::Validation(
            "selection_status GRADUATED is set by promotion only".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewSeedling {
    pub position_label: Option<String>,
    pub emergence_date: Option<DateTime<Utc>>,
    pub health_status: Option<String>,
    pub selection_status: Option<SelectionStatus>,
    pub notes: Option<String>,
}

impl NewSeedling {
    pub fn validate(&self) -> Result<()> {
        reject_graduated(self.selection_status)
    }

    pub fn into_seedling(self, seedling_id: SequenceId, seed_batch_id: Id, now: DateTime<Utc>) -> Seedling {
        Seedling {
            id: generate_id(),
            seedling_id,
            seed_batch_id,
            position_label: self.position_label,
            emergence_date: self.emergence_date.unwrap_or(now),
            health_status: self.health_status.unwrap_or_else(|| "HEALTHY".to_string()),
            selection_status: self.selection_status.unwrap_or_default(),
            notes: self.notes,
            graduated_to_plant_id: None,
            graduation_date: None,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedlingUpdate {
    pub position_label: Option<String>,
    pub health_status: Option<String>,
    pub selection_status: Option<SelectionStatus>,
    pub notes: Option<String>,
}

impl SeedlingUpdate {
    pub fn validate(&self, current: &Seedling) -> Result<()> {
        reject_graduated(self.selection_status)?;
        // A graduated seedling is edited through its plant record; only notes stay open
        let touches_record =
            self.position_label.is_some() || self.health_status.is_some() || self.selection_status.is_some();
        if touches_record {
            if let Some(plant_id) = &current.graduated_to_plant_id {
                return Err(LineageError::Conflict(format!(
                    "seedling {} already graduated to plant {}; only notes can change",
                    current.seedling_id, plant_id
                )));
            }
        }
        Ok(())
    }

    pub fn apply_to(self, seedling: &mut Seedling) {
        if self.position_label.is_some() {
            seedling.position_label = self.position_label;
        }
        if let Some(health_status) = self.health_status {
            seedling.health_status = health_status;
        }
        if let Some(selection_status) = self.selection_status {
            seedling.selection_status = selection_status;
        }
        if self.notes.is_some() {
            seedling.notes = self.notes;
        }
    }
}

/// Conditions for listing seedlings; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedlingFilter {
    pub seed_batch_id: Option<Id>,
    pub selection_status: Option<SelectionStatus>,
    pub health_status: Option<String>,
}

impl SeedlingFilter {
    pub fn for_batch(seed_batch_id: impl Into<Id>) -> Self {
        SeedlingFilter {
            seed_batch_id: Some(seed_batch_id.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, seedling: &Seedling) -> bool {
        self.seed_batch_id.as_ref().map_or(true, |id| id == &seedling.seed_batch_id)
            && self.selection_status.map_or(true, |s| s == seedling.selection_status)
            && self
                .health_status
                .as_ref()
                .map_or(true, |h| h == &seedling.health_status)
    }
}

impl Seedling {
    /// Refused once the seedling has graduated; its plant keeps pointing back at it
    pub fn check_deletable(&self) -> Result<()> {
        match &self.graduated_to_plant_id {
            Some(plant_id) => Err(LineageError::Conflict(format!(
                "cannot delete seedling {}: it graduated to plant {}",
                self.seedling_id, plant_id
            ))),
            None => Ok(()),
        }
    }
}

/// Caller-supplied overrides when graduating a seedling
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlantPromotion {
    pub hybrid_name: Option<String>,
    pub species: Option<String>,
    pub section: Option<String>,
    pub generation: Option<String>,
    pub accession_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Everything a promotion reads from the lineage chain
#[derive(Debug, Clone)]
pub struct PromotionLineage<'a> {
    pub seedling: &'a Seedling,
    pub cross: &'a BreedingRecord,
    pub mother: &'a Plant,
    pub father: &'a Plant,
}

impl PlantPromotion {
    pub fn check_eligible(seedling: &Seedling) -> Result<()> {
        if let Some(plant_id) = &seedling.graduated_to_plant_id {
            return Err(LineageError::Conflict(format!(
                "seedling {} already graduated to plant {}",
                seedling.seedling_id, plant_id
            )));
        }
        if !seedling.selection_status.can_graduate() {
            return Err(LineageError::Validation(format!(
                "seedling must be KEEPER or HOLDBACK to graduate (current: {})",
                seedling.selection_status.as_str()
            )));
        }
        Ok(())
    }

    /// F1 by default, S1 for a selfing, F2 when both parents came out of the same cross
    pub fn infer_generation(mother: &Plant, father: &Plant) -> &'static str {
        if mother.id == father.id {
            "S1"
        } else if mother.breeding_record_id.is_some()
            && mother.breeding_record_id == father.breeding_record_id
        {
            "F2"
        } else {
            "F1"
        }
    }

    pub fn into_plant(self, lineage: PromotionLineage<'_>, plant_id: SequenceId, now: DateTime<Utc>) -> Plant {
        let PromotionLineage {
            seedling,
            cross,
            mother,
            father,
        } = lineage;

        let hybrid_name = self.hybrid_name.unwrap_or_else(|| {
            format!("{} × {}", mother.display_name(), father.display_name())
        });
        let generation = self
            .generation
            .unwrap_or_else(|| Self::infer_generation(mother, father).to_string());
        let notes = self.notes.unwrap_or_else(|| {
            format!(
                "Graduated from {}. {}",
                seedling.seedling_id,
                seedling.notes.as_deref().unwrap_or("")
            )
            .trim()
            .to_string()
        });

        Plant {
            id: generate_id(),
            plant_id,
            hybrid_name: Some(hybrid_name),
            species: self.species,
            section: self
                .section
                .or_else(|| mother.section.clone())
                .or_else(|| father.section.clone()),
            generation: Some(generation),
            female_parent_id: Some(mother.id.clone()),
            male_parent_id: Some(father.id.clone()),
            breeding_record_id: Some(cross.id.clone()),
            propagation_type: Some("seed".to_string()),
            accession_date: self.accession_date.unwrap_or(now),
            archived: false,
            notes: Some(notes),
            created_at: now,
        }
    }
}
