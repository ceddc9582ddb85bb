//! Per-user visit record
//!
//! Stored as a single user meta value:
//!
//! ```json
//! {"version": 1, "days": {"October-17-2026": [12, 40]}}
//! ```
//!
//! The older unversioned shape (`{"October-17-2026": [12, 40]}`) is still
//! read. Anything that fails to parse reads as an empty record.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use super::day_key::DayKey;
use crate::error::Result;
use crate::host::UserId;

/// Current encoding version
pub const RECORD_VERSION: u32 = 1;

/// Profiles visited per day by one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisitRecord {
    version: u32,
    days: BTreeMap<String, BTreeSet<UserId>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRecord {
    Versioned {
        version: u32,
        days: BTreeMap<String, Vec<serde_json::Value>>,
    },
    Legacy(BTreeMap<String, Vec<serde_json::Value>>),
}

fn id_from_value(value: &serde_json::Value) -> Option<UserId> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|id| *id != 0)
}

fn collect_days(raw: BTreeMap<String, Vec<serde_json::Value>>) -> BTreeMap<String, BTreeSet<UserId>> {
    raw.into_iter()
        .map(|(day, ids)| (day, ids.iter().filter_map(id_from_value).collect::<BTreeSet<_>>()))
        .filter(|(_, ids)| !ids.is_empty())
        .collect()
}

impl VisitRecord {
    pub fn new() -> Self {
        Self {
            version: RECORD_VERSION,
            days: BTreeMap::new(),
        }
    }

    /// Decode a stored value. Missing or malformed input gives an empty record.
    pub fn decode(raw: Option<&str>) -> Self {
        let raw = match raw.map(str::trim) {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Self::new(),
        };

        let days = match serde_json::from_str::<StoredRecord>(raw) {
            Ok(StoredRecord::Versioned { version, days }) => {
                if version > RECORD_VERSION {
                    warn!("Visit record has newer version {}, reading as v{}", version, RECORD_VERSION);
                }
                collect_days(days)
            }
            Ok(StoredRecord::Legacy(days)) => collect_days(days),
            Err(e) => {
                warn!("Discarding malformed visit record: {}", e);
                BTreeMap::new()
            }
        };

        Self {
            version: RECORD_VERSION,
            days,
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Whether there is at least one visit recorded for the day
    pub fn has_day(&self, day: &DayKey) -> bool {
        self.days.get(day.as_str()).is_some_and(|ids| !ids.is_empty())
    }

    pub fn visited_on(&self, day: &DayKey) -> Option<&BTreeSet<UserId>> {
        self.days.get(day.as_str())
    }

    pub fn contains(&self, day: &DayKey, target: UserId) -> bool {
        self.days
            .get(day.as_str())
            .is_some_and(|ids| ids.contains(&target))
    }

    /// Number of distinct profiles visited on the day
    pub fn count_on(&self, day: &DayKey) -> usize {
        self.days.get(day.as_str()).map_or(0, BTreeSet::len)
    }

    /// Add a visit; returns false when the target was already recorded
    pub fn insert(&mut self, day: &DayKey, target: UserId) -> bool {
        self.days
            .entry(day.as_str().to_string())
            .or_default()
            .insert(target)
    }

    /// Drop every day except `keep`; returns how many days were removed
    pub fn retain_only(&mut self, keep: &DayKey) -> usize {
        let before = self.days.len();
        self.days.retain(|day, _| day == keep.as_str());
        before - self.days.len()
    }

    pub fn day_keys(&self) -> impl Iterator<Item = &str> {
        self.days.keys().map(String::as_str)
    }
}

impl Default for VisitRecord {
    fn default() -> Self {
        Self::new()
    }
}
