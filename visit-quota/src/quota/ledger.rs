//! Visit ledger: per-user daily record of viewed profiles and the
//! allow/deny decision built on it.
//!
//! The read-modify-write of a visitor's record is not locked. Two requests
//! from the same visitor racing each other may both pass the limit check or
//! lose one of the appends; the quota is best-effort.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::day_key::DayKey;
use super::limits::{Allowance, RoleLimits};
use super::record::VisitRecord;
use crate::config::SiteConfig;
use crate::error::Result;
use crate::host::{Clock, Member, UserId, UserMetaStore};

/// User meta key holding the visit record
pub const VISITS_META_KEY: &str = "visit_quota_visited_profiles";

/// Why a visit was allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowReason {
    /// Visiting one's own profile
    OwnProfile,
    /// Target is a super administrator
    SuperAdminTarget,
    /// Visitor is exempt from the quota
    Unrestricted,
    /// First profile of the day
    FirstToday,
    /// Target was already visited today
    Revisit,
    WithinLimit,
}

/// Why a visit was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The visitor's roles give a limit of zero
    Blocked,
    /// Today's allowance is used up
    LimitReached,
}

/// Outcome of a quota check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow(AllowReason),
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }
}

/// Today's quota usage for a visitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisitStatus {
    pub user_id: UserId,
    pub day: DayKey,
    pub visited: BTreeSet<UserId>,
    pub allowance: Allowance,
    /// Profiles left for today, `None` when unrestricted
    pub remaining: Option<u64>,
}

/// Visit ledger over the host's per-user storage
#[derive(Clone)]
pub struct VisitLedger {
    store: Arc<dyn UserMetaStore>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
}

impl VisitLedger {
    pub fn new(store: Arc<dyn UserMetaStore>, clock: Arc<dyn Clock>, offset: FixedOffset) -> Self {
        Self {
            store,
            clock,
            offset,
        }
    }

    /// Ledger keyed on the site's local days
    pub fn for_site(
        store: Arc<dyn UserMetaStore>,
        clock: Arc<dyn Clock>,
        site: &SiteConfig,
    ) -> Result<Self> {
        Ok(Self::new(store, clock, site.timezone()?))
    }

    /// Key of the current local day
    pub fn today(&self) -> DayKey {
        DayKey::for_instant(self.clock.now(), self.offset)
    }

    /// Decide whether `visitor` may view `target` today and record the visit
    /// when it consumes quota.
    pub async fn decide_and_record(&self, visitor: &Member, target: &Member, limits: &RoleLimits) -> Decision {
        let decision = self.decide(visitor, target, limits).await;
        debug!(
            visitor = visitor.id,
            target = target.id,
            ?decision,
            "Profile visit decision"
        );
        decision
    }

    async fn decide(&self, visitor: &Member, target: &Member, limits: &RoleLimits) -> Decision {
        if visitor.id == target.id {
            return Decision::Allow(AllowReason::OwnProfile);
        }
        if target.super_admin {
            return Decision::Allow(AllowReason::SuperAdminTarget);
        }

        let limit = match Allowance::resolve(&visitor.roles, visitor.super_admin, limits) {
            Allowance::Unrestricted => return Decision::Allow(AllowReason::Unrestricted),
            Allowance::Blocked => return Decision::Deny(DenyReason::Blocked),
            Allowance::Daily(limit) => limit,
        };

        let today = self.today();
        let mut record = self.records(visitor.id).await;

        if !record.has_day(&today) {
            let pruned = record.retain_only(&today);
            if pruned > 0 {
                debug!(visitor = visitor.id, pruned, "Pruned stale visit days");
            }
            record.insert(&today, target.id);
            self.save(visitor.id, &record).await;
            return Decision::Allow(AllowReason::FirstToday);
        }

        if record.contains(&today, target.id) {
            return Decision::Allow(AllowReason::Revisit);
        }

        if (record.count_on(&today) as u64) < limit {
            record.insert(&today, target.id);
            self.save(visitor.id, &record).await;
            return Decision::Allow(AllowReason::WithinLimit);
        }

        Decision::Deny(DenyReason::LimitReached)
    }

    /// Append a visit for today without checking any limit.
    /// Refuses zero ids.
    pub async fn record(&self, visitor: UserId, target: UserId) -> bool {
        if visitor == 0 || target == 0 {
            return false;
        }

        let today = self.today();
        let mut record = self.records(visitor).await;
        record.insert(&today, target);
        self.save(visitor, &record).await
    }

    /// True until the first visit of the current day is recorded
    pub async fn is_new_day(&self, visitor: UserId) -> bool {
        !self.records(visitor).await.has_day(&self.today())
    }

    /// Stored record; unreadable storage reads as empty
    pub async fn records(&self, visitor: UserId) -> VisitRecord {
        match self.store.get_meta(visitor, VISITS_META_KEY).await {
            Ok(raw) => VisitRecord::decode(raw.as_deref()),
            Err(e) => {
                warn!("Failed to read visit record for user {}: {}", visitor, e);
                VisitRecord::new()
            }
        }
    }

    /// Drop every day but today
    pub async fn clear_old_records(&self, visitor: UserId) {
        let mut record = self.records(visitor).await;
        if record.is_empty() {
            return;
        }

        if record.retain_only(&self.today()) > 0 {
            self.save(visitor, &record).await;
        }
    }

    /// Forget every recorded visit of a user
    pub async fn reset(&self, visitor: UserId) -> Result<()> {
        let encoded = VisitRecord::new().encode()?;
        self.store.set_meta(visitor, VISITS_META_KEY, &encoded).await
    }

    /// Today's usage against the visitor's allowance
    pub async fn status(&self, visitor: &Member, limits: &RoleLimits) -> VisitStatus {
        let today = self.today();
        let record = self.records(visitor.id).await;
        let visited = record.visited_on(&today).cloned().unwrap_or_default();
        let allowance = Allowance::resolve(&visitor.roles, visitor.super_admin, limits);

        let remaining = match allowance {
            Allowance::Unrestricted => None,
            Allowance::Blocked => Some(0),
            Allowance::Daily(limit) => Some(limit.saturating_sub(visited.len() as u64)),
        };

        VisitStatus {
            user_id: visitor.id,
            day: today,
            visited,
            allowance,
            remaining,
        }
    }

    async fn save(&self, visitor: UserId, record: &VisitRecord) -> bool {
        let encoded = match record.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("Failed to encode visit record for user {}: {}", visitor, e);
                return false;
            }
        };

        match self.store.set_meta(visitor, VISITS_META_KEY, &encoded).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to store visit record for user {}: {}", visitor, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FixedClock;
    use crate::storage::MemoryHost;
    use chrono::{Duration, TimeZone, Utc};

    struct Fixture {
        host: Arc<MemoryHost>,
        clock: Arc<FixedClock>,
        ledger: VisitLedger,
    }

    fn fixture() -> Fixture {
        let host = Arc::new(MemoryHost::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 10, 17, 9, 30, 0).unwrap(),
        ));
        let ledger = VisitLedger::new(host.clone(), clock.clone(), FixedOffset::east_opt(0).unwrap());
        Fixture { host, clock, ledger }
    }

    fn limits(role: &str, limit: i64) -> RoleLimits {
        let mut limits = RoleLimits::new();
        limits.set(role, limit);
        limits
    }

    fn subscriber(id: UserId) -> Member {
        Member::new(id).with_roles(["subscriber"])
    }

    #[test]
    fn test_for_site_uses_configured_offset() {
        let host = Arc::new(MemoryHost::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 10, 17, 2, 0, 0).unwrap(),
        ));
        let mut config = crate::config::Config::default();
        config.site.utc_offset_minutes = -300;

        let ledger = VisitLedger::for_site(host, clock, &config.site).unwrap();
        assert_eq!(ledger.today().as_str(), "October-16-2026");
    }

    #[tokio::test]
    async fn test_limit_two_allows_two_then_denies() {
        let f = fixture();
        let limits = limits("subscriber", 2);
        let visitor = subscriber(1);

        let a = f.ledger.decide_and_record(&visitor, &Member::new(10), &limits).await;
        let b = f.ledger.decide_and_record(&visitor, &Member::new(11), &limits).await;
        let c = f.ledger.decide_and_record(&visitor, &Member::new(12), &limits).await;

        assert_eq!(a, Decision::Allow(AllowReason::FirstToday));
        assert_eq!(b, Decision::Allow(AllowReason::WithinLimit));
        assert_eq!(c, Decision::Deny(DenyReason::LimitReached));
        assert_eq!(f.ledger.records(1).await.count_on(&f.ledger.today()), 2);
    }

    #[tokio::test]
    async fn test_revisit_is_free() {
        let f = fixture();
        let limits = limits("subscriber", 2);
        let visitor = subscriber(1);

        f.ledger.decide_and_record(&visitor, &Member::new(10), &limits).await;
        f.ledger.decide_and_record(&visitor, &Member::new(11), &limits).await;

        let again = f.ledger.decide_and_record(&visitor, &Member::new(10), &limits).await;
        assert_eq!(again, Decision::Allow(AllowReason::Revisit));
        assert_eq!(f.ledger.records(1).await.count_on(&f.ledger.today()), 2);
    }

    #[tokio::test]
    async fn test_own_profile_and_super_admin_are_free() {
        let f = fixture();
        let limits = limits("subscriber", 0);
        let visitor = subscriber(1);

        assert_eq!(
            f.ledger.decide_and_record(&visitor, &Member::new(1), &limits).await,
            Decision::Allow(AllowReason::OwnProfile)
        );
        assert_eq!(
            f.ledger
                .decide_and_record(&visitor, &Member::new(2).with_super_admin(true), &limits)
                .await,
            Decision::Allow(AllowReason::SuperAdminTarget)
        );
        assert_eq!(f.host.meta_raw(1, VISITS_META_KEY).await, None);
    }

    #[tokio::test]
    async fn test_zero_limit_denies_without_writing() {
        let f = fixture();
        let decision = f
            .ledger
            .decide_and_record(&subscriber(1), &Member::new(10), &limits("subscriber", 0))
            .await;

        assert_eq!(decision, Decision::Deny(DenyReason::Blocked));
        assert_eq!(f.host.meta_raw(1, VISITS_META_KEY).await, None);
    }

    #[tokio::test]
    async fn test_unrestricted_never_denied() {
        let f = fixture();
        let limits = limits("subscriber", -1);
        let visitor = subscriber(1);

        for target in 10..60 {
            let decision = f.ledger.decide_and_record(&visitor, &Member::new(target), &limits).await;
            assert_eq!(decision, Decision::Allow(AllowReason::Unrestricted));
        }
        assert!(f.ledger.records(1).await.is_empty());
    }

    #[tokio::test]
    async fn test_day_rollover_prunes_yesterday() {
        let f = fixture();
        let limits = limits("subscriber", 1);
        let visitor = subscriber(1);

        assert!(f.ledger.decide_and_record(&visitor, &Member::new(10), &limits).await.is_allowed());
        assert!(!f.ledger.decide_and_record(&visitor, &Member::new(11), &limits).await.is_allowed());

        f.clock.advance(Duration::days(1));
        assert!(f.ledger.is_new_day(1).await);

        let decision = f.ledger.decide_and_record(&visitor, &Member::new(11), &limits).await;
        assert_eq!(decision, Decision::Allow(AllowReason::FirstToday));

        let record = f.ledger.records(1).await;
        let today = f.ledger.today();
        assert_eq!(record.day_keys().collect::<Vec<_>>(), vec![today.as_str()]);
        assert!(record.contains(&today, 11));
    }

    #[tokio::test]
    async fn test_malformed_record_reads_as_empty() {
        let f = fixture();
        f.host.set_meta(1, VISITS_META_KEY, "{not json").await.unwrap();

        let decision = f
            .ledger
            .decide_and_record(&subscriber(1), &Member::new(10), &limits("subscriber", 2))
            .await;
        assert_eq!(decision, Decision::Allow(AllowReason::FirstToday));
    }

    #[tokio::test]
    async fn test_no_roles_denied() {
        let f = fixture();
        let decision = f
            .ledger
            .decide_and_record(&Member::new(1), &Member::new(10), &RoleLimits::defaults())
            .await;
        assert_eq!(decision, Decision::Deny(DenyReason::Blocked));
    }

    #[tokio::test]
    async fn test_record_refuses_zero_ids() {
        let f = fixture();
        assert!(!f.ledger.record(0, 5).await);
        assert!(!f.ledger.record(5, 0).await);
        assert!(f.ledger.record(5, 6).await);
        assert!(!f.ledger.is_new_day(5).await);
    }

    #[tokio::test]
    async fn test_clear_old_records_keeps_today() {
        let f = fixture();
        f.ledger.record(1, 10).await;
        f.clock.advance(Duration::days(1));
        f.ledger.record(1, 11).await;

        assert_eq!(f.ledger.records(1).await.day_keys().count(), 2);
        f.ledger.clear_old_records(1).await;

        let record = f.ledger.records(1).await;
        assert_eq!(record.day_keys().count(), 1);
        assert!(record.contains(&f.ledger.today(), 11));
    }

    #[tokio::test]
    async fn test_status_and_reset() {
        let f = fixture();
        let limits = limits("subscriber", 3);
        let visitor = subscriber(1);

        f.ledger.decide_and_record(&visitor, &Member::new(10), &limits).await;
        let status = f.ledger.status(&visitor, &limits).await;
        assert_eq!(status.allowance, Allowance::Daily(3));
        assert_eq!(status.remaining, Some(2));
        assert!(status.visited.contains(&10));

        f.ledger.reset(1).await.unwrap();
        let status = f.ledger.status(&visitor, &limits).await;
        assert_eq!(status.remaining, Some(3));
        assert!(status.visited.is_empty());
    }
}
