use crate::error::{LineageError, Result};
use crate::model::common::{check_non_negative, check_percentage};
use crate::model::{generate_id, Id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single seed-collection event belonging to a cross
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Harvest {
    pub id: Id,
    pub breeding_record_id: Id,
    pub harvest_number: i32, // Unique per cross, never reused
    pub harvest_date: DateTime<Utc>,
    pub berry_count: Option<i32>,
    pub seed_count: i32,
    pub seed_viability: Option<f64>, // Estimated percentage
    pub notes: Option<String>,
    pub photos: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// How a new harvest gets its number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestNumbering {
    Next,
    Explicit(i32),
}

impl HarvestNumbering {
    /// Resolve against the cross's high-water mark: the largest number ever
    /// assigned to it, including numbers of since-deleted harvests.
    pub fn resolve(self, high_water: i32) -> Result<i32> {
        match self {
            HarvestNumbering::Next => high_water.checked_add(1).ok_or_else(|| {
                LineageError::Conflict(format!(
                    "harvest numbering is exhausted: #{} has already been assigned",
                    high_water
                ))
            }),
            HarvestNumbering::Explicit(number) => Ok(number),
        }
    }
}

/// Input model for creating a harvest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewHarvest {
    pub harvest_number: Option<i32>,
    pub harvest_date: Option<DateTime<Utc>>,
    pub berry_count: Option<i32>,
    pub seed_count: Option<i32>,
    pub seed_viability: Option<f64>,
    pub notes: Option<String>,
    pub photos: Option<Vec<String>>,
}

impl NewHarvest {
    pub fn validate(&self) -> Result<()> {
        if let Some(number) = self.harvest_number {
            if number < 1 {
                return Err(LineageError::Validation(format!(
                    "harvest_number must be >= 1 (got {})",
                    number
                )));
            }
        }
        check_non_negative("berry_count", self.berry_count)?;
        check_non_negative("seed_count", self.seed_count)?;
        check_percentage("seed_viability", self.seed_viability)
    }

    pub fn numbering(&self) -> HarvestNumbering {
        match self.harvest_number {
            Some(number) => HarvestNumbering::Explicit(number),
            None => HarvestNumbering::Next,
        }
    }

    pub fn into_harvest(self, breeding_record_id: Id, harvest_number: i32, now: DateTime<Utc>) -> Harvest {
        Harvest {
            id: generate_id(),
            breeding_record_id,
            harvest_number,
            harvest_date: self.harvest_date.unwrap_or(now),
            berry_count: self.berry_count,
            seed_count: self.seed_count.unwrap_or(0),
            seed_viability: self.seed_viability,
            notes: self.notes,
            photos: self.photos.unwrap_or_default(),
            created_at: now,
        }
    }
}

/// Partial update of a harvest. The harvest number is not editable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarvestUpdate {
    pub harvest_date: Option<DateTime<Utc>>,
    pub berry_count: Option<i32>,
    pub seed_count: Option<i32>,
    pub seed_viability: Option<f64>,
    pub notes: Option<String>,
    pub photos: Option<Vec<String>>,
}

impl HarvestUpdate {
    pub fn validate(&self) -> Result<()> {
        check_non_negative("berry_count", self.berry_count)?;
        check_non_negative("seed_count", self.seed_count)?;
        check_percentage("seed_viability", self.seed_viability)
    }

    pub fn apply_to(self, harvest: &mut Harvest) {
        if let Some(harvest_date) = self.harvest_date {
            harvest.harvest_date = harvest_date;
        }
        if self.berry_count.is_some() {
            harvest.berry_count = self.berry_count;
        }
        if let Some(seed_count) = self.seed_count {
            harvest.seed_count = seed_count;
        }
        if self.seed_viability.is_some() {
            harvest.seed_viability = self.seed_viability;
        }
        if self.notes.is_some() {
            harvest.notes = self.notes;
        }
        if let Some(photos) = self.photos {
            harvest.photos = photos;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbering_resolution() {
        assert_eq!(HarvestNumbering::Next.resolve(0).unwrap(), 1);
        assert_eq!(HarvestNumbering::Next.resolve(2).unwrap(), 3);
        // Explicit numbers may skip ahead of the series
        assert_eq!(HarvestNumbering::Explicit(5).resolve(0).unwrap(), 5);
        assert_eq!(HarvestNumbering::Explicit(3).resolve(i32::MAX).unwrap(), 3);
    }

    #[test]
    fn test_next_number_after_the_last_representable_one() {
        let result = HarvestNumbering::Next.resolve(i32::MAX);
        assert!(matches!(result, Err(LineageError::Conflict(_))));
    }

    #[test]
    fn test_new_harvest_defaults() {
        let now = Utc::now();
        let harvest = NewHarvest::default().into_harvest("cross-1".to_string(), 1, now);
        assert_eq!(harvest.seed_count, 0);
        assert_eq!(harvest.harvest_date, now);
        assert!(harvest.photos.is_empty());
        assert!(harvest.berry_count.is_none());
    }

    #[test]
    fn test_validation() {
        let bad_number = NewHarvest {
            harvest_number: Some(0),
            ..Default::default()
        };
        assert!(matches!(bad_number.validate(), Err(LineageError::Validation(_))));

        let negative = NewHarvest {
            seed_count: Some(-3),
            ..Default::default()
        };
        assert!(negative.validate().is_err());

        let update = HarvestUpdate {
            seed_viability: Some(120.0),
            ..Default::default()
        };
        assert!(update.validate().is_err());
    }

    #[test]
    fn test_update_keeps_unspecified_fields() {
        let mut harvest = NewHarvest {
            berry_count: Some(4),
            notes: Some("ripe".to_string()),
            ..Default::default()
        }
        .into_harvest("cross-1".to_string(), 2, Utc::now());

        HarvestUpdate {
            seed_count: Some(37),
            ..Default::default()
        }
        .apply_to(&mut harvest);

        assert_eq!(harvest.seed_count, 37);
        assert_eq!(harvest.berry_count, Some(4));
        assert_eq!(harvest.notes.as_deref(), Some("ripe"));
        assert_eq!(harvest.harvest_number, 2);
    }
}
