//! Core types for the permission matrix.
//!
//! With the `typescript` feature enabled, these types can be exported to
//! TypeScript using ts-rs for the operator console.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// An action a research team might take on a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Viewing publicly visible content without an account
    PassiveView,
    /// Viewing content that requires being logged in
    LoggedInView,
    /// Searching the platform for a person's profile
    ProfileSearch,
    /// Liking, reacting or otherwise engaging with content
    React,
    /// Resharing or reposting content
    Share,
    /// Requesting access to restricted content
    AccessRequest,
    /// Direct message
    Message,
    /// Following an account
    Follow,
    /// Friend or connection request
    Connect,
    /// Any communication with a juror outside the presence of the court
    ExParteCommunication,
}

impl Action {
    /// Every action, in matrix order.
    pub const ALL: [Action; 10] = [
        Action::PassiveView,
        Action::LoggedInView,
        Action::ProfileSearch,
        Action::React,
        Action::Share,
        Action::AccessRequest,
        Action::Message,
        Action::Follow,
        Action::Connect,
        Action::ExParteCommunication,
    ];

    /// Actions that must be Blocked under every ruleset.
    pub const HARD_BLOCKED: [Action; 5] = [
        Action::AccessRequest,
        Action::Message,
        Action::Follow,
        Action::Connect,
        Action::ExParteCommunication,
    ];

    /// Viewing actions (the only ones that can ever be permitted).
    pub const VIEWING: [Action; 3] = [
        Action::PassiveView,
        Action::LoggedInView,
        Action::ProfileSearch,
    ];

    /// Whether this action is in the fixed hard-block set.
    pub fn is_hard_blocked(&self) -> bool {
        Self::HARD_BLOCKED.contains(self)
    }

    /// Whether this action only reads and never touches the monitored person.
    pub fn is_passive(&self) -> bool {
        Self::VIEWING.contains(self)
    }

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PassiveView => "passive_view",
            Self::LoggedInView => "logged_in_view",
            Self::ProfileSearch => "profile_search",
            Self::React => "react",
            Self::Share => "share",
            Self::AccessRequest => "access_request",
            Self::Message => "message",
            Self::Follow => "follow",
            Self::Connect => "connect",
            Self::ExParteCommunication => "ex_parte_communication",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown action: {s}"))
    }
}

/// Permission decision for one (platform, action) cell.
///
/// Variants are declared from least to most restrictive, so the derived
/// ordering is the restriction ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Permitted without qualification
    Allowed,
    /// Permitted only for content visible after logging in, with counsel sign-off
    LoginRequiredView,
    /// The platform may notify the account holder of the view
    NotificationRisk,
    /// Not permitted
    Blocked,
}

impl Decision {
    /// Numeric restriction level (0 = Allowed, 3 = Blocked).
    pub fn restriction(&self) -> u8 {
        *self as u8
    }

    /// The more restrictive of two decisions.
    pub fn tighten(self, other: Decision) -> Decision {
        self.max(other)
    }

    /// Whether moving from `self` to `to` would relax the cell.
    pub fn would_loosen(&self, to: Decision) -> bool {
        to < *self
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::LoginRequiredView => "login_required_view",
            Self::NotificationRisk => "notification_risk",
            Self::Blocked => "blocked",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How likely a platform is to tell the account holder that someone looked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum NotificationRiskLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
}

/// A platform the research team may encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct PlatformSpec {
    /// Platform name as it appears in standing orders and artifacts
    pub name: String,
    /// Whether content is visible without logging in
    #[serde(default = "default_true")]
    pub public_view: bool,
    /// Whether viewing can notify the account holder
    #[serde(default)]
    pub notification_risk: NotificationRiskLevel,
}

fn default_true() -> bool {
    true
}

impl PlatformSpec {
    /// A public platform with no known notification behaviour.
    pub fn public(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            public_view: true,
            notification_risk: NotificationRiskLevel::None,
        }
    }

    /// Builder: set notification risk.
    pub fn with_notification_risk(mut self, risk: NotificationRiskLevel) -> Self {
        self.notification_risk = risk;
        self
    }

    /// Builder: mark the platform as requiring login to view.
    pub fn login_only(mut self) -> Self {
        self.public_view = false;
        self
    }

    /// Lookup key (names are matched case-insensitively).
    pub fn key(&self) -> String {
        platform_key(&self.name)
    }
}

/// Normalise a platform name into a matrix key.
pub fn platform_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Platform selector used by firm overrides.
pub const ALL_PLATFORMS: &str = "*";

/// A firm policy entry that further restricts one or more cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct FirmOverride {
    /// Platform name, or `*` for every listed platform
    pub platform: String,
    /// Action the override targets
    pub action: Action,
    /// Requested decision; must be at least as restrictive as the compiled cell
    pub decision: Decision,
}

impl FirmOverride {
    pub fn new(platform: impl Into<String>, action: Action, decision: Decision) -> Self {
        Self {
            platform: platform.into(),
            action,
            decision,
        }
    }

    /// Whether this override targets every platform.
    pub fn is_wildcard(&self) -> bool {
        self.platform.trim() == ALL_PLATFORMS
    }
}
