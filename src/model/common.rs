use chrono::{DateTime, Datelike, Utc};
use uuid::Uuid;

/// Internal primary key of every lineage row. Distinct from the human-readable
/// sequence identifiers (`CLX-...`, `SDB-...`) minted by the allocator.
pub type Id = String;

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// Source of wall-clock time. Allocation years are always derived from here,
/// never from request payloads.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn current_year(&self) -> i32 {
        self.now().year()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant, for tests and replays
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub(crate) fn check_non_negative(field: &str, value: Option<i32>) -> crate::error::Result<()> {
    match value {
        Some(v) if v < 0 => Err(crate::error::LineageError::Validation(format!(
            "{} must be >= 0 (got {})",
            field, v
        ))),
        _ => Ok(()),
    }
}

pub(crate) fn check_percentage(field: &str, value: Option<f64>) -> crate::error::Result<()> {
    match value {
        Some(v) if !(0.0..=100.0).contains(&v) => Err(crate::error::LineageError::Validation(
            format!("{} must be between 0 and 100 (got {})", field, v),
        )),
        _ => Ok(()),
    }
}
