//! Integration tests for the quota flow over SQLite storage

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use visit_quota::gate::ProfileView;
use visit_quota::host::{FixedClock, Member, MemberRegistry, NoticeBuffer, UserMetaStore};
use visit_quota::quota::{AllowReason, Decision, DenyReason, VisitRecord, VISITS_META_KEY};
use visit_quota::settings::SettingsUpdate;
use visit_quota::storage::SqliteHost;
use visit_quota::{Config, Gate, GateOutcome, RoleLimits};

struct Site {
    host: Arc<SqliteHost>,
    notices: Arc<NoticeBuffer>,
    clock: Arc<FixedClock>,
    gate: Gate,
}

async fn setup_site(config: Config) -> Site {
    let host = Arc::new(SqliteHost::connect("sqlite::memory:").await.unwrap());
    let notices = Arc::new(NoticeBuffer::new());
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap(),
    ));
    let gate = Gate::for_host(host.clone(), notices.clone(), clock.clone(), &config).unwrap();

    host.upsert_member(Member::new(1).with_roles(["subscriber"]))
        .await
        .unwrap();
    host.upsert_member(Member::new(2).with_roles(["author"]))
        .await
        .unwrap();
    host.upsert_member(Member::new(3).with_roles(["subscriber", "contributor"]))
        .await
        .unwrap();
    host.upsert_member(Member::new(4)).await.unwrap();
    host.upsert_member(Member::new(5).with_roles(["subscriber"]).with_super_admin(true))
        .await
        .unwrap();

    Site {
        host,
        notices,
        clock,
        gate,
    }
}

fn site_config() -> Config {
    let mut config = Config::default();
    config.site.site_url = "https://members.example.org/".to_string();
    config
}

async fn stored_record(host: &SqliteHost, user: u64) -> VisitRecord {
    let raw = host.get_meta(user, VISITS_META_KEY).await.unwrap();
    VisitRecord::decode(raw.as_deref())
}

#[tokio::test]
async fn test_subscriber_default_limit_of_two() {
    let site = setup_site(site_config()).await;

    assert!(!site.gate.check(ProfileView::new(1, 10)).await.is_redirect());
    assert!(!site.gate.check(ProfileView::new(1, 11)).await.is_redirect());

    let outcome = site.gate.check(ProfileView::new(1, 12)).await;
    match outcome {
        GateOutcome::Redirect {
            decision,
            location,
            message,
        } => {
            assert_eq!(decision, Decision::Deny(DenyReason::LimitReached));
            assert_eq!(location, "https://members.example.org/members/1/");
            assert_eq!(message.as_deref(), Some("You have reached the daily limit"));
        }
        other => panic!("expected redirect, got {:?}", other),
    }

    // Already seen today
    assert_eq!(
        site.gate.check(ProfileView::new(1, 10)).await,
        GateOutcome::Allowed {
            decision: Decision::Allow(AllowReason::Revisit)
        }
    );

    let record = stored_record(&site.host, 1).await;
    assert_eq!(record.count_on(&site.gate.ledger().today()), 2);

    let notices = site.notices.take(1).await;
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].text, "You have reached the daily limit");
}

#[tokio::test]
async fn test_highest_role_limit_applies() {
    let site = setup_site(site_config()).await;

    // subscriber (2) + contributor (5)
    for target in 10..15 {
        assert!(!site.gate.check(ProfileView::new(3, target)).await.is_redirect());
    }
    assert!(site.gate.check(ProfileView::new(3, 15)).await.is_redirect());
}

#[tokio::test]
async fn test_member_without_roles_is_blocked() {
    let site = setup_site(site_config()).await;

    let outcome = site.gate.check(ProfileView::new(4, 1)).await;
    assert!(matches!(
        outcome,
        GateOutcome::Redirect {
            decision: Decision::Deny(DenyReason::Blocked),
            ..
        }
    ));
    assert!(stored_record(&site.host, 4).await.is_empty());
}

#[tokio::test]
async fn test_super_admin_visitor_and_target() {
    let site = setup_site(site_config()).await;

    for target in 10..20 {
        assert_eq!(
            site.gate.check(ProfileView::new(5, target)).await,
            GateOutcome::Allowed {
                decision: Decision::Allow(AllowReason::Unrestricted)
            }
        );
    }

    site.gate.check(ProfileView::new(1, 10)).await;
    site.gate.check(ProfileView::new(1, 11)).await;
    assert_eq!(
        site.gate.check(ProfileView::new(1, 5)).await,
        GateOutcome::Allowed {
            decision: Decision::Allow(AllowReason::SuperAdminTarget)
        }
    );
}

#[tokio::test]
async fn test_quota_resets_on_new_day() {
    let site = setup_site(site_config()).await;

    site.gate.check(ProfileView::new(1, 10)).await;
    site.gate.check(ProfileView::new(1, 11)).await;
    assert!(site.gate.check(ProfileView::new(1, 12)).await.is_redirect());

    site.clock.advance(Duration::days(1));

    assert_eq!(
        site.gate.check(ProfileView::new(1, 12)).await,
        GateOutcome::Allowed {
            decision: Decision::Allow(AllowReason::FirstToday)
        }
    );

    let record = stored_record(&site.host, 1).await;
    assert_eq!(record.day_keys().count(), 1);
    assert!(record.contains(&site.gate.ledger().today(), 12));
    assert!(!record.contains(&site.gate.ledger().today(), 10));
}

#[tokio::test]
async fn test_day_boundary_follows_site_offset() {
    let mut config = site_config();
    config.site.utc_offset_minutes = 120;
    let site = setup_site(config).await;

    site.clock
        .set(Utc.with_ymd_and_hms(2026, 10, 17, 21, 0, 0).unwrap());
    assert_eq!(site.gate.ledger().today().as_str(), "October-17-2026");

    site.gate.check(ProfileView::new(1, 10)).await;
    site.gate.check(ProfileView::new(1, 11)).await;
    assert!(site.gate.check(ProfileView::new(1, 12)).await.is_redirect());

    // 22:30 UTC is already the 18th at UTC+2
    site.clock
        .set(Utc.with_ymd_and_hms(2026, 10, 17, 22, 30, 0).unwrap());
    assert_eq!(site.gate.ledger().today().as_str(), "October-18-2026");
    assert!(!site.gate.check(ProfileView::new(1, 12)).await.is_redirect());
}

#[tokio::test]
async fn test_settings_change_takes_effect_immediately() {
    let site = setup_site(site_config()).await;

    let mut limits = RoleLimits::new();
    limits.set("subscriber", 0);
    site.gate
        .settings()
        .update(SettingsUpdate {
            message: Some(String::new()),
            redirect_url: Some("[site-url]pricing/".to_string()),
            limits,
        })
        .await
        .unwrap();

    match site.gate.check(ProfileView::new(1, 10)).await {
        GateOutcome::Redirect {
            decision,
            location,
            message,
        } => {
            assert_eq!(decision, Decision::Deny(DenyReason::Blocked));
            assert_eq!(location, "https://members.example.org/pricing/");
            assert_eq!(message, None);
        }
        other => panic!("expected redirect, got {:?}", other),
    }
    assert!(site.notices.take(1).await.is_empty());

    // Author keeps the default limit
    assert!(!site.gate.check(ProfileView::new(2, 10)).await.is_redirect());
}

#[tokio::test]
async fn test_legacy_record_is_read() {
    let site = setup_site(site_config()).await;
    let today = site.gate.ledger().today();

    let legacy = format!(r#"{{"{}":[10,11]}}"#, today);
    site.host
        .set_meta(1, VISITS_META_KEY, &legacy)
        .await
        .unwrap();

    assert_eq!(
        site.gate.check(ProfileView::new(1, 11)).await,
        GateOutcome::Allowed {
            decision: Decision::Allow(AllowReason::Revisit)
        }
    );
    assert!(site.gate.check(ProfileView::new(1, 12)).await.is_redirect());
}

#[tokio::test]
async fn test_removing_member_forgets_visits() {
    let site = setup_site(site_config()).await;

    site.gate.check(ProfileView::new(1, 10)).await;
    assert!(!stored_record(&site.host, 1).await.is_empty());

    assert!(site.host.remove_member(1).await.unwrap());
    assert!(stored_record(&site.host, 1).await.is_empty());
    assert!(!site.host.remove_member(1).await.unwrap());
}
