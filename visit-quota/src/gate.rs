//! Request-time profile gate
//!
//! Runs once per rendered profile page. Anonymous viewers, non-profile pages
//! and a member looking at their own profile are left alone. Otherwise the
//! ledger decides, and a denied visitor gets the restriction message queued
//! and a redirect location.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::host::{
    Clock, Member, Notices, OptionStore, Severity, UserDirectory, UserId, UserMetaStore,
};
use crate::quota::{Decision, VisitLedger};
use crate::settings::{SettingsStore, LEGACY_VISITOR_TAG, SITE_URL_TAG, VISITOR_URL_TAG};

/// The page being rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfileView {
    /// Logged-in user, if any
    pub viewer_id: Option<UserId>,
    /// Member whose profile is displayed, if this is a profile page
    pub displayed_id: Option<UserId>,
}

impl ProfileView {
    pub fn new(viewer_id: UserId, displayed_id: UserId) -> Self {
        Self {
            viewer_id: Some(viewer_id),
            displayed_id: Some(displayed_id),
        }
    }
}

/// What the host should do with the request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum GateOutcome {
    /// The gate does not apply to this page
    Skipped,
    /// Render the profile
    Allowed { decision: Decision },
    /// Stop rendering and redirect
    Redirect {
        decision: Decision,
        location: String,
        message: Option<String>,
    },
}

impl GateOutcome {
    pub fn is_redirect(&self) -> bool {
        matches!(self, GateOutcome::Redirect { .. })
    }
}

/// Site URLs used to build redirect locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteUrls {
    site_url: String,
    member_url_pattern: String,
}

impl SiteUrls {
    pub fn new(site_url: impl Into<String>, member_url_pattern: impl Into<String>) -> Self {
        let mut site_url = site_url.into();
        if !site_url.ends_with('/') {
            site_url.push('/');
        }

        Self {
            site_url,
            member_url_pattern: member_url_pattern.into(),
        }
    }

    /// Site root URL, always with a trailing slash
    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    /// The member's own profile URL
    pub fn profile_url(&self, member: &Member) -> String {
        match &member.profile_url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => self
                .member_url_pattern
                .replace(SITE_URL_TAG, &self.site_url)
                .replace("{id}", &member.id.to_string()),
        }
    }
}

/// Fill a redirect template. An empty template means the visitor's profile.
pub fn redirect_location(template: &str, site_url: &str, visitor_url: &str) -> String {
    let template = template.trim();
    if template.is_empty() {
        return visitor_url.to_string();
    }

    template
        .replace(SITE_URL_TAG, site_url)
        .replace(VISITOR_URL_TAG, visitor_url)
        .replace(LEGACY_VISITOR_TAG, visitor_url)
}

/// Profile visit gate
#[derive(Clone)]
pub struct Gate {
    ledger: VisitLedger,
    settings: SettingsStore,
    directory: Arc<dyn UserDirectory>,
    notices: Arc<dyn Notices>,
    urls: SiteUrls,
}

impl Gate {
    pub fn new(
        ledger: VisitLedger,
        settings: SettingsStore,
        directory: Arc<dyn UserDirectory>,
        notices: Arc<dyn Notices>,
        urls: SiteUrls,
    ) -> Self {
        Self {
            ledger,
            settings,
            directory,
            notices,
            urls,
        }
    }

    /// Wire a gate over one storage host
    pub fn for_host<H>(
        host: Arc<H>,
        notices: Arc<dyn Notices>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Result<Self>
    where
        H: UserDirectory + UserMetaStore + OptionStore + 'static,
    {
        let ledger = VisitLedger::for_site(host.clone(), clock, &config.site)?;
        let settings = SettingsStore::new(host.clone());
        let urls = SiteUrls::new(&config.site.site_url, &config.site.member_url_pattern);

        Ok(Self::new(ledger, settings, host, notices, urls))
    }

    pub fn ledger(&self) -> &VisitLedger {
        &self.ledger
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn urls(&self) -> &SiteUrls {
        &self.urls
    }

    /// Look up a member; unknown or unreadable accounts have no roles
    pub async fn member(&self, id: UserId) -> Member {
        match self.directory.find_member(id).await {
            Ok(Some(member)) => member,
            Ok(None) => Member::new(id),
            Err(e) => {
                warn!("Failed to look up member {}: {}", id, e);
                Member::new(id)
            }
        }
    }

    /// Run the gate for one page view
    pub async fn check(&self, view: ProfileView) -> GateOutcome {
        let (viewer_id, displayed_id) = match (view.viewer_id, view.displayed_id) {
            (Some(viewer), Some(displayed)) if viewer != 0 && displayed != 0 => (viewer, displayed),
            _ => return GateOutcome::Skipped,
        };
        if viewer_id == displayed_id {
            return GateOutcome::Skipped;
        }

        let visitor = self.member(viewer_id).await;
        let target = self.member(displayed_id).await;
        let settings = self.settings.load().await;

        let decision = self
            .ledger
            .decide_and_record(&visitor, &target, &settings.limits)
            .await;

        if decision.is_allowed() {
            return GateOutcome::Allowed { decision };
        }

        let message = Some(settings.message.trim())
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        if let Some(text) = &message {
            self.notices.add_message(visitor.id, text, Severity::Error).await;
        }

        let visitor_url = self.urls.profile_url(&visitor);
        let location = redirect_location(&settings.redirect_url, self.urls.site_url(), &visitor_url);

        info!(
            visitor = visitor.id,
            target = target.id,
            ?decision,
            "Profile visit blocked, redirecting to {}",
            location
        );

        GateOutcome::Redirect {
            decision,
            location,
            message,
        }
    }
}
