//! Role based daily limits
//!
//! A limit is the number of distinct profiles a role may view per day:
//! - negative (canonically `-1`): unrestricted
//! - `0`: fully blocked
//! - positive: daily allowance
//!
//! A user holding several roles gets the largest positive allowance among
//! them; any unrestricted role exempts the user entirely.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::btree_map::{self, BTreeMap};
use std::collections::BTreeSet;

/// Canonical "no restriction" limit
pub const UNRESTRICTED: i64 = -1;

/// Built-in limits for the stock roles
pub const DEFAULT_LIMITS: [(&str, i64); 5] = [
    ("subscriber", 2),
    ("contributor", 5),
    ("author", 10),
    ("editor", 100),
    ("administrator", 100_000),
];

/// Mapping of role name to daily limit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RoleLimits(BTreeMap<String, i64>);

impl RoleLimits {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in defaults
    pub fn defaults() -> Self {
        DEFAULT_LIMITS
            .iter()
            .map(|(role, limit)| (role.to_string(), *limit))
            .collect()
    }

    pub fn get(&self, role: &str) -> Option<i64> {
        self.0.get(role).copied()
    }

    pub fn set(&mut self, role: impl Into<String>, limit: i64) {
        self.0.insert(role.into(), limit);
    }

    pub fn remove(&mut self, role: &str) -> Option<i64> {
        self.0.remove(role)
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, i64> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Configured values over the built-in defaults
    pub fn merged_with_defaults(&self) -> Self {
        let mut merged = Self::defaults();
        merged.0.extend(self.0.iter().map(|(k, v)| (k.clone(), *v)));
        merged
    }
}

impl FromIterator<(String, i64)> for RoleLimits {
    fn from_iter<T: IntoIterator<Item = (String, i64)>>(iter: T) -> Self {
        RoleLimits(iter.into_iter().collect())
    }
}

impl<'de> Deserialize<'de> for RoleLimits {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Settings forms post limits as text, so accept anything and coerce
        let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .map(|(role, value)| (role, limit_from_value(&value)))
            .collect())
    }
}

/// Parse a limit typed into a settings field. Non-numeric text is `0`.
pub fn parse_limit(raw: &str) -> i64 {
    raw.trim().parse().unwrap_or(0)
}

/// Coerce a stored JSON value into a limit. Anything non-numeric is `0`.
pub fn limit_from_value(value: &serde_json::Value) -> i64 {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        serde_json::Value::String(s) => parse_limit(s),
        _ => 0,
    }
}

/// Largest positive limit among the roles, `0` when none is configured
pub fn effective_limit(roles: &BTreeSet<String>, limits: &RoleLimits) -> i64 {
    roles
        .iter()
        .filter_map(|role| limits.get(role))
        .fold(0, i64::max)
}

/// Whether the user is subject to the daily quota at all
pub fn is_restricted(roles: &BTreeSet<String>, super_admin: bool, limits: &RoleLimits) -> bool {
    if super_admin {
        return false;
    }

    !roles
        .iter()
        .filter_map(|role| limits.get(role))
        .any(|limit| limit < 0)
}

/// What a user may do today
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "limit")]
pub enum Allowance {
    Unrestricted,
    Blocked,
    Daily(u64),
}

impl Allowance {
    pub fn resolve(roles: &BTreeSet<String>, super_admin: bool, limits: &RoleLimits) -> Self {
        if !is_restricted(roles, super_admin, limits) {
            return Allowance::Unrestricted;
        }

        match effective_limit(roles, limits) {
            n if n > 0 => Allowance::Daily(n as u64),
            _ => Allowance::Blocked,
        }
    }
}
