use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four identifier families. Each is an independent monotonic series
/// scoped by (kind, calendar year).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Cross,
    SeedBatch,
    Seedling,
    Plant,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Cross,
        EntityKind::SeedBatch,
        EntityKind::Seedling,
        EntityKind::Plant,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            EntityKind::Cross => "CLX",
            EntityKind::SeedBatch => "SDB",
            EntityKind::Seedling => "SDL",
            EntityKind::Plant => "ANT",
        }
    }

    /// Zero-padded width of the sequence part
    pub fn digits(self) -> usize {
        match self {
            EntityKind::Cross | EntityKind::SeedBatch => 3,
            EntityKind::Seedling | EntityKind::Plant => 4,
        }
    }

    /// Key used in the `id_sequences` counter table
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Cross => "cross",
            EntityKind::SeedBatch => "seed_batch",
            EntityKind::Seedling => "seedling",
            EntityKind::Plant => "plant",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.prefix() == prefix)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A minted identifier such as `CLX-2025-001` or `SDL-2025-0042`.
///
/// Sequence numbers wider than the family's padding are still rendered in
/// full (`CLX-2025-1000`), so the series never wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceId {
    pub kind: EntityKind,
    pub year: i32,
    pub seq: i64,
}

impl SequenceId {
    pub fn new(kind: EntityKind, year: i32, seq: i64) -> Self {
        Self { kind, year, seq }
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:04}-{:0width$}",
            self.kind.prefix(),
            self.year,
            self.seq,
            width = self.kind.digits()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSequenceIdError(pub String);

impl fmt::Display for ParseSequenceIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed sequence identifier '{}'", self.0)
    }
}

impl std::error::Error for ParseSequenceIdError {}

impl FromStr for SequenceId {
    type Err = ParseSequenceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseSequenceIdError(s.to_string());
        let mut parts = s.splitn(3, '-');
        let (Some(prefix), Some(year), Some(seq)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(err());
        };

        let kind = EntityKind::from_prefix(prefix).ok_or_else(err)?;
        if year.len() != 4 || seq.len() < kind.digits() {
            return Err(err());
        }
        if !year.bytes().all(|b| b.is_ascii_digit()) || !seq.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }

        let year = year.parse().map_err(|_| err())?;
        let seq: i64 = seq.parse().map_err(|_| err())?;
        if seq < 1 {
            return Err(err());
        }

        Ok(SequenceId { kind, year, seq })
    }
}

impl Serialize for SequenceId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SequenceId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formats_are_bit_exact() {
        assert_eq!(
            SequenceId::new(EntityKind::Cross, 2025, 1).to_string(),
            "CLX-2025-001"
        );
        assert_eq!(
            SequenceId::new(EntityKind::SeedBatch, 2025, 12).to_string(),
            "SDB-2025-012"
        );
        assert_eq!(
            SequenceId::new(EntityKind::Seedling, 2025, 7).to_string(),
            "SDL-2025-0007"
        );
        assert_eq!(
            SequenceId::new(EntityKind::Plant, 2026, 123).to_string(),
            "ANT-2026-0123"
        );
    }

    #[test]
    fn test_overflowing_sequence_keeps_all_digits() {
        let id = SequenceId::new(EntityKind::Cross, 2025, 1000);
        assert_eq!(id.to_string(), "CLX-2025-1000");
        assert_eq!("CLX-2025-1000".parse::<SequenceId>().unwrap(), id);
    }

    #[test]
    fn test_parse() {
        let id: SequenceId = "SDL-2024-0031".parse().unwrap();
        assert_eq!(id.kind, EntityKind::Seedling);
        assert_eq!(id.year, 2024);
        assert_eq!(id.seq, 31);

        for bad in ["", "CLX-2025", "XYZ-2025-001", "CLX-25-001", "CLX-2025-01", "SDL-2025-001", "CLX-2025-000", "CLX-2025-0a1"] {
            assert!(bad.parse::<SequenceId>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_ordering_follows_sequence() {
        let a = SequenceId::new(EntityKind::Plant, 2025, 9);
        let b = SequenceId::new(EntityKind::Plant, 2025, 10);
        assert!(a < b);
        // Lexical order of the rendered form agrees while within the padding
        assert!(a.to_string() < b.to_string());
    }

    #[test]
    fn test_serde_as_string() {
        let id = SequenceId::new(EntityKind::Cross, 2025, 4);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"CLX-2025-004\"");
        let back: SequenceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
