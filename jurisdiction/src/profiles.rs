//! Jurisdiction profiles.
//!
//! A profile fixes how a jurisdiction treats passive research by default:
//! at what notification risk a view stops being a plain view, and what
//! logged-in or non-public viewing is worth. Profiles only shape the base
//! matrix; standing orders and firm policy tighten from there.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Action, Decision, NotificationRiskLevel, PlatformSpec};

/// Default treatment of passive research in one jurisdiction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JurisdictionProfile {
    /// Code used in ruleset inputs, e.g. `US-ABA`
    pub code: String,
    /// Human-readable name
    pub name: String,
    /// Lowest notification risk at which a view is marked NotificationRisk
    pub notification_threshold: NotificationRiskLevel,
    /// Base decision for viewing content behind a login
    pub logged_in_view: Decision,
    /// Base decision for passive viewing on a platform with no public view
    pub non_public_view: Decision,
}

impl JurisdictionProfile {
    /// Base decision for one cell before any standing order or override.
    pub fn base_decision(&self, platform: &PlatformSpec, action: Action) -> Decision {
        if !action.is_passive() {
            return Decision::Blocked;
        }

        let notifies = platform.notification_risk != NotificationRiskLevel::None
            && platform.notification_risk >= self.notification_threshold;

        let base = match action {
            Action::LoggedInView => self.logged_in_view,
            _ if !platform.public_view => self.non_public_view,
            _ => Decision::Allowed,
        };

        if notifies {
            base.tighten(Decision::NotificationRisk)
        } else {
            base
        }
    }
}

/// Registry of known jurisdictions, keyed by upper-cased code.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, JurisdictionProfile>,
}

impl ProfileRegistry {
    /// Registry with the built-in profiles.
    pub fn builtin() -> Self {
        let mut registry = Self {
            profiles: BTreeMap::new(),
        };

        // ABA Formal Opinion 466: passive review is permitted and an automatic
        // platform notice is not itself a communication.
        registry.register(JurisdictionProfile {
            code: "US-ABA".to_string(),
            name: "ABA Model Rules".to_string(),
            notification_threshold: NotificationRiskLevel::Medium,
            logged_in_view: Decision::LoginRequiredView,
            non_public_view: Decision::LoginRequiredView,
        });

        // NYC Bar 2012-2: a notice the juror can see may be a communication.
        registry.register(JurisdictionProfile {
            code: "US-NY".to_string(),
            name: "New York".to_string(),
            notification_threshold: NotificationRiskLevel::Low,
            logged_in_view: Decision::NotificationRisk,
            non_public_view: Decision::Blocked,
        });

        registry.register(JurisdictionProfile {
            code: "US-FED".to_string(),
            name: "United States federal courts".to_string(),
            notification_threshold: NotificationRiskLevel::Low,
            logged_in_view: Decision::Blocked,
            non_public_view: Decision::Blocked,
        });

        registry
    }

    /// Add or replace a profile.
    pub fn register(&mut self, profile: JurisdictionProfile) {
        self.profiles.insert(profile.code.to_uppercase(), profile);
    }

    /// Look up a profile by code, case-insensitively.
    pub fn get(&self, code: &str) -> Option<&JurisdictionProfile> {
        self.profiles.get(&code.trim().to_uppercase())
    }

    /// Known codes.
    pub fn codes(&self) -> Vec<&str> {
        self.profiles.values().map(|p| p.code.as_str()).collect()
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
