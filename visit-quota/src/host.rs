//! Host platform collaborators
//!
//! The quota core never reaches for global state. Everything it needs from
//! the host site (identity, per-user storage, site options, user-facing
//! notices and the clock) comes through these traits.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use tokio::sync::RwLock;

use crate::error::Result;

/// Host user account id. `0` is never a valid account.
pub type UserId = u64;

/// A member account as seen by the quota core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: UserId,
    /// Role names assigned on this site
    #[serde(default)]
    pub roles: BTreeSet<String>,
    /// Network-wide administrator, exempt from every restriction
    #[serde(default)]
    pub super_admin: bool,
    /// Profile URL, when the host knows it
    #[serde(default)]
    pub profile_url: Option<String>,
}

impl Member {
    /// Create a member with no roles
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            roles: BTreeSet::new(),
            super_admin: false,
            profile_url: None,
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn with_super_admin(mut self, super_admin: bool) -> Self {
        self.super_admin = super_admin;
        self
    }

    pub fn with_profile_url(mut self, url: impl Into<String>) -> Self {
        self.profile_url = Some(url.into());
        self
    }
}

/// Identity lookups
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Find a member by id
    async fn find_member(&self, id: UserId) -> Result<Option<Member>>;
}

/// Directory the host can write to (account sync)
#[async_trait]
pub trait MemberRegistry: UserDirectory {
    /// Create or replace a member
    async fn upsert_member(&self, member: Member) -> Result<()>;

    /// Remove a member together with all of its per-user data
    async fn remove_member(&self, id: UserId) -> Result<bool>;
}

/// Key-value storage scoped to a user account
#[async_trait]
pub trait UserMetaStore: Send + Sync {
    async fn get_meta(&self, user: UserId, key: &str) -> Result<Option<String>>;

    async fn set_meta(&self, user: UserId, key: &str, value: &str) -> Result<()>;
}

/// Site-wide option storage
#[async_trait]
pub trait OptionStore: Send + Sync {
    async fn get_option(&self, name: &str) -> Result<Option<String>>;

    async fn set_option(&self, name: &str, value: &str) -> Result<()>;
}

/// Notice severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
}

/// A message shown on the user's next rendered page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub text: String,
    pub severity: Severity,
}

/// User-facing message queue
#[async_trait]
pub trait Notices: Send + Sync {
    async fn add_message(&self, user: UserId, text: &str, severity: Severity);
}

/// Per-user notice queue kept in memory until the host renders it
#[derive(Default)]
pub struct NoticeBuffer {
    queued: RwLock<HashMap<UserId, Vec<Notice>>>,
}

impl NoticeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the notices queued for a user
    pub async fn take(&self, user: UserId) -> Vec<Notice> {
        let mut queued = self.queued.write().await;
        queued.remove(&user).unwrap_or_default()
    }

    pub async fn pending(&self, user: UserId) -> usize {
        let queued = self.queued.read().await;
        queued.get(&user).map_or(0, Vec::len)
    }
}

#[async_trait]
impl Notices for NoticeBuffer {
    async fn add_message(&self, user: UserId, text: &str, severity: Severity) {
        let mut queued = self.queued.write().await;
        queued.entry(user).or_default().push(Notice {
            text: text.to_string(),
            severity,
        });
    }
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
