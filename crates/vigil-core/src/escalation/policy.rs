//! Delivery policy applied on top of a planned alert.

use crate::domain::{AlertEvent, Channel, ReminderStyle, Strength};

/// Caller-side alert policy.
///
/// The planner stays a pure mapping of rules; this is where a critical
/// alert gets moved to a channel able to interrupt focus.
#[derive(Debug, Clone)]
pub struct AlertPolicy {
    /// Style for responsibilities that omit one.
    pub default_style: ReminderStyle,

    /// Critical strength always goes full-screen.
    pub upgrade_critical_to_full_screen: bool,
}

impl AlertPolicy {
    pub fn default_v1() -> Self {
        Self {
            default_style: Strength::Gentle,
            upgrade_critical_to_full_screen: true,
        }
    }

    pub fn apply(&self, alert: AlertEvent) -> AlertEvent {
        if self.upgrade_critical_to_full_screen && alert.strength == Strength::Critical {
            AlertEvent {
                channel: Channel::FullScreen,
                ..alert
            }
        } else {
            alert
        }
    }
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self::default_v1()
    }
}
