//! Notification kinds and OAM event taxonomy

use serde::{Deserialize, Serialize};
use std::fmt;

/// Administrative event surfaced on a subscription's stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OamStatus {
    #[serde(rename = "subscription-started")]
    SubscriptionStarted,
    #[serde(rename = "notification-complete")]
    NotificationComplete,
    #[serde(rename = "error")]
    Error,
}

impl OamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubscriptionStarted => "subscription-started",
            Self::NotificationComplete => "notification-complete",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for OamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a rendered notification (metrics label)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    /// Periodic or sync-on-start snapshot
    PushUpdate,
    /// On-change update
    PushChangeUpdate,
    Oam,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PushUpdate => "push-update",
            Self::PushChangeUpdate => "push-change-update",
            Self::Oam => "oam",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
