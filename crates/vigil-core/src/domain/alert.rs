//! Alert events produced by the escalation planner and handed to the dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::responsibility::{Channel, Strength};

/// One planned alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub fire_at: DateTime<Utc>,
    pub channel: Channel,
    pub strength: Strength,
}

impl AlertEvent {
    pub fn new(fire_at: DateTime<Utc>, channel: Channel, strength: Strength) -> Self {
        Self {
            fire_at,
            channel,
            strength,
        }
    }

    /// Registration identity within one responsibility.
    pub fn key(&self) -> AlertKey {
        AlertKey {
            fire_at: self.fire_at,
            channel: self.channel,
        }
    }
}

/// Alerts are registered at most once per (responsibility, fire time, channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlertKey {
    pub fire_at: DateTime<Utc>,
    pub channel: Channel,
}

/// Opaque handle returned by the dispatcher for a registered alert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertToken(String);

impl AlertToken {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlertToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
