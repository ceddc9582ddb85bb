/// Daily profile visit quota
///
/// This module provides:
/// - Role based limit resolution
/// - Day-keyed visit records with pruning of past days
/// - The allow/deny ledger over per-user storage

pub mod day_key;
pub mod ledger;
pub mod limits;
pub mod record;

pub use day_key::DayKey;
pub use ledger::{AllowReason, Decision, DenyReason, VisitLedger, VisitStatus, VISITS_META_KEY};
pub use limits::{effective_limit, is_restricted, Allowance, RoleLimits, UNRESTRICTED};
pub use record::VisitRecord;
