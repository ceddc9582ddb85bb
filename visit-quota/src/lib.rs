//! visit-quota: role based daily profile visit quota
//!
//! Limits how many distinct member profiles a user may view per day on a
//! member site. Each role gets a daily allowance; a visitor holding several
//! roles gets the largest. Once the allowance is used up, the visitor is
//! redirected and shown a message until the site's local day rolls over.
//!
//! # Features
//!
//! - **Limit resolution**: per-role limits, `-1` for unrestricted, `0` to block
//! - **Visit ledger**: one day-keyed record per visitor, pruned on rollover
//! - **Gate**: allow/deny per profile page view, redirect templates
//! - **Storage**: in-memory and SQLite host backends
//! - **API**: axum service the host platform calls
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use visit_quota::gate::ProfileView;
//! use visit_quota::host::SystemClock;
//! use visit_quota::storage::MemoryHost;
//! use visit_quota::{Config, Gate};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let host = Arc::new(MemoryHost::new());
//! let gate = Gate::for_host(host.clone(), host.clone(), Arc::new(SystemClock), &Config::default())?;
//!
//! let outcome = gate.check(ProfileView::new(1, 2)).await;
//! if outcome.is_redirect() {
//!     println!("Daily limit reached");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`quota`]: limits, visit records and the ledger
//! - [`gate`]: request-time check and redirect
//! - [`settings`]: site settings and the settings field list
//! - [`host`]: host platform collaborator traits
//! - [`storage`]: host storage backends
//! - [`api`]: HTTP API

pub mod api;
pub mod config;
pub mod error;
pub mod gate;
pub mod host;
pub mod quota;
pub mod settings;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use error::{QuotaError, Result};
pub use gate::{Gate, GateOutcome, ProfileView};
pub use quota::{Decision, RoleLimits, VisitLedger};
pub use settings::{Settings, SettingsStore};
