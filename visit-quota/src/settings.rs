//! Site settings for the visit quota
//!
//! Settings live in one site option as a flat JSON object, the same shape a
//! settings form posts:
//!
//! ```json
//! {"message": "You have reached the daily limit", "redirect_url": "[site-url]upgrade/",
//!  "subscriber": "2", "editor": 100}
//! ```
//!
//! Every key other than `message` and `redirect_url` is a role limit.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::error::{QuotaError, Result};
use crate::host::OptionStore;
use crate::quota::limits::{RoleLimits, DEFAULT_LIMITS};

/// Option name the settings are stored under
pub const SETTINGS_OPTION: &str = "profile-visit-restrictions";

/// Message shown when the quota is used up
pub const DEFAULT_MESSAGE: &str = "You have reached the daily limit";

/// Placeholder for the site root URL in the redirect template
pub const SITE_URL_TAG: &str = "[site-url]";

/// Placeholder for the visitor's own profile URL in the redirect template
pub const VISITOR_URL_TAG: &str = "[visitor-url]";

/// Older spelling of [`VISITOR_URL_TAG`], still substituted
pub const LEGACY_VISITOR_TAG: &str = "[visitor-user]";

/// Settings keys that can never name a role. `limits` catches clients
/// posting role limits nested instead of flat.
pub const RESERVED_KEYS: &[&str] = &["message", "redirect_url", "limits"];

fn default_message() -> String {
    DEFAULT_MESSAGE.to_string()
}

/// Quota settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Shown to the visitor on deny. Empty disables the message.
    #[serde(default = "default_message")]
    pub message: String,
    /// Redirect template. Empty redirects to the visitor's own profile.
    #[serde(default)]
    pub redirect_url: String,
    #[serde(flatten)]
    pub limits: RoleLimits,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            message: default_message(),
            redirect_url: String::new(),
            limits: RoleLimits::defaults(),
        }
    }
}

/// Partial update of the settings, in the same flat shape as [`Settings`].
/// Roles left out keep their current limit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub message: Option<String>,
    pub redirect_url: Option<String>,
    #[serde(flatten)]
    pub limits: RoleLimits,
}

impl Settings {
    pub fn apply(&mut self, update: SettingsUpdate) {
        if let Some(message) = update.message {
            self.message = message;
        }
        if let Some(redirect_url) = update.redirect_url {
            self.redirect_url = redirect_url.trim().to_string();
        }
        for (role, limit) in update.limits.iter() {
            self.limits.set(role.clone(), *limit);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let redirect = self.redirect_url.trim();
        let redirect_ok = redirect.is_empty()
            || redirect.starts_with('[')
            || redirect.starts_with('/')
            || redirect.starts_with("http://")
            || redirect.starts_with("https://");
        if !redirect_ok {
            return Err(QuotaError::InvalidSetting(format!(
                "redirect_url must be a URL, a path or start with a placeholder: {}",
                redirect
            )));
        }

        if let Some(role) = self.limits.roles().find(|role| {
            role.is_empty()
                || role.contains(char::is_whitespace)
                || RESERVED_KEYS.iter().any(|key| key == role)
        }) {
            return Err(QuotaError::InvalidSetting(format!("Invalid role name '{}'", role)));
        }

        Ok(())
    }
}

/// Reads and writes the settings option
#[derive(Clone)]
pub struct SettingsStore {
    options: Arc<dyn OptionStore>,
}

impl SettingsStore {
    pub fn new(options: Arc<dyn OptionStore>) -> Self {
        Self { options }
    }

    /// Current settings, role limits merged over the built-in defaults.
    /// Unreadable or malformed options fall back to the defaults.
    pub async fn load(&self) -> Settings {
        let raw = match self.options.get_option(SETTINGS_OPTION).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to read settings, using defaults: {}", e);
                None
            }
        };

        let mut settings = match raw {
            None => Settings::default(),
            Some(raw) => serde_json::from_str::<Settings>(&raw).unwrap_or_else(|e| {
                warn!("Malformed settings option, using defaults: {}", e);
                Settings::default()
            }),
        };

        settings.limits = settings.limits.merged_with_defaults();
        settings
    }

    /// Effective role -> limit map
    pub async fn effective_limits(&self) -> RoleLimits {
        self.load().await.limits
    }

    pub async fn save(&self, settings: &Settings) -> Result<()> {
        settings.validate()?;
        let encoded = serde_json::to_string(settings)?;
        self.options.set_option(SETTINGS_OPTION, &encoded).await
    }

    /// Apply a partial update and store the result
    pub async fn update(&self, update: SettingsUpdate) -> Result<Settings> {
        let mut settings = self.load().await;
        settings.apply(update);
        self.save(&settings).await?;
        Ok(settings)
    }
}

/// Input widget of a settings field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    RawText,
    Text,
}

/// A field of the host's settings page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsField {
    pub section: &'static str,
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub default: String,
    pub description: Option<String>,
}

/// "shop_manager" -> "Shop Manager"
pub fn role_label(role: &str) -> String {
    role.split(['_', '-'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fields for the settings page: general settings, then one limit per role.
/// `roles` yields `(role key, display name)` pairs.
pub fn settings_fields<I>(roles: I) -> Vec<SettingsField>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut fields = vec![
        SettingsField {
            section: "general",
            name: "message".to_string(),
            label: "Restriction Message.".to_string(),
            kind: FieldKind::RawText,
            default: DEFAULT_MESSAGE.to_string(),
            description: None,
        },
        SettingsField {
            section: "general",
            name: "redirect_url".to_string(),
            label: "Redirect to?".to_string(),
            kind: FieldKind::Text,
            default: String::new(),
            description: Some(format!(
                "Where to redirect to when a user reaches the limit. Allowed tags {}, {}",
                SITE_URL_TAG, VISITOR_URL_TAG
            )),
        },
    ];

    fields.extend(roles.into_iter().map(|(key, name)| {
        let default = DEFAULT_LIMITS
            .iter()
            .find(|(role, _)| *role == key)
            .map_or(0, |(_, limit)| *limit);

        SettingsField {
            section: "limits",
            name: key,
            label: name,
            // text, not number: browsers mangle "-1" in number inputs
            kind: FieldKind::Text,
            default: default.to_string(),
            description: Some("Put -1 to not restrict.".to_string()),
        }
    }));

    fields
}

/// Roles with a known limit, labelled for display
pub fn known_roles(settings: &Settings) -> Vec<(String, String)> {
    settings
        .limits
        .merged_with_defaults()
        .roles()
        .map(|role| (role.to_string(), role_label(role)))
        .collect()
}
