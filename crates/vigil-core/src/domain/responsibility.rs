//! Responsibility - ユーザーが宣言した義務（スケジュール・リマインド方針・状態）
//!
//! The struct is the persistence-boundary shape as well: field names are
//! snake_case, instants serialize as ISO-8601, the recurrence rule stays a
//! plain RFC-5545-like string.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{ChecklistItemId, ResponsibilityId, UserId};
use super::state::Status;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleKind {
    OneTime,
    Recurring,
}

/// When a responsibility is due.
///
/// `datetime` always denotes the next (current) occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(rename = "type")]
    pub kind: ScheduleKind,
    pub datetime: DateTime<Utc>,
    pub timezone: Tz,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rrule: Option<String>,
}

impl Schedule {
    pub fn one_time(datetime: DateTime<Utc>, timezone: Tz) -> Self {
        Self {
            kind: ScheduleKind::OneTime,
            datetime,
            timezone,
            rrule: None,
        }
    }

    pub fn recurring(datetime: DateTime<Utc>, timezone: Tz, rrule: impl Into<String>) -> Self {
        Self {
            kind: ScheduleKind::Recurring,
            datetime,
            timezone,
            rrule: Some(rrule.into()),
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.kind == ScheduleKind::Recurring
    }
}

/// Alert intensity. Also used as the baseline reminder style of a responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    Gentle,
    Persistent,
    Critical,
}

/// Baseline escalation intensity of a responsibility.
pub type ReminderStyle = Strength;

impl fmt::Display for Strength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strength::Gentle => "gentle",
            Strength::Persistent => "persistent",
            Strength::Critical => "critical",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Channel {
    Notification,
    FullScreen,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Channel::Notification => "notification",
            Channel::FullScreen => "fullScreen",
        })
    }
}

/// A timed alert relative to the due instant.
///
/// Negative offsets fire before the due time, positive ones after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRule {
    pub offset_minutes: i64,
    pub channel: Channel,
    pub strength: Strength,
}

impl EscalationRule {
    /// Largest accepted `|offset_minutes|`: one leap year.
    pub const MAX_OFFSET_MINUTES: i64 = 366 * 24 * 60;

    pub fn new(offset_minutes: i64, channel: Channel, strength: Strength) -> Self {
        Self {
            offset_minutes,
            channel,
            strength,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: ChecklistItemId,
    pub label: String,
    #[serde(default)]
    pub done: bool,
}

impl ChecklistItem {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: ChecklistItemId::random(),
            label: label.into(),
            done: false,
        }
    }
}

/// Broken data-model invariant found on a loaded entity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("rrule must be present iff schedule type is recurring")]
    RruleMismatch,
    #[error("snoozed_until must be set iff status is snoozed")]
    SnoozeMismatch,
    #[error("snoozed_until must be strictly after updated_at")]
    SnoozeNotAfterUpdate,
    #[error("completed_at must be set iff status is completed")]
    CompletionMismatch,
    #[error("updated_at precedes created_at")]
    AuditRegression,
    #[error("escalation offset {0} minutes is outside the accepted range")]
    OffsetOutOfRange(i64),
}

/// A user-declared obligation.
///
/// Status fields are only mutated through [`crate::lifecycle::StateMachine`];
/// everything else here is plain data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Responsibility {
    pub id: ResponsibilityId,
    pub user_id: UserId,
    pub title: String,
    pub schedule: Schedule,
    /// `None` falls back to the configured global default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_style: Option<ReminderStyle>,
    #[serde(default)]
    pub escalation_rules: Vec<EscalationRule>,
    pub status: Status,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snoozed_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Responsibility {
    /// Create a fresh `active` responsibility.
    pub fn new(
        id: ResponsibilityId,
        user_id: UserId,
        title: impl Into<String>,
        schedule: Schedule,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            title: title.into(),
            schedule,
            reminder_style: None,
            escalation_rules: Vec::new(),
            status: Status::Active,
            checklist: Vec::new(),
            completed_at: None,
            snoozed_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_reminder_style(mut self, style: ReminderStyle) -> Self {
        self.reminder_style = Some(style);
        self
    }

    pub fn with_escalation_rules(mut self, rules: Vec<EscalationRule>) -> Self {
        self.escalation_rules = rules;
        self
    }

    pub fn with_checklist(mut self, items: Vec<ChecklistItem>) -> Self {
        self.checklist = items;
        self
    }

    pub fn is_recurring(&self) -> bool {
        self.schedule.is_recurring()
    }

    /// Reminder style, or `default` when the responsibility omits one.
    pub fn effective_style(&self, default: ReminderStyle) -> ReminderStyle {
        self.reminder_style.unwrap_or(default)
    }

    /// True when every checklist item is done (vacuously true when empty).
    pub fn checklist_complete(&self) -> bool {
        self.checklist.iter().all(|item| item.done)
    }

    /// Check the data-model invariants.
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        if self.schedule.is_recurring() != self.schedule.rrule.is_some() {
            return Err(InvariantViolation::RruleMismatch);
        }
        match (self.status, self.snoozed_until) {
            (Status::Snoozed, Some(until)) if until <= self.updated_at => {
                return Err(InvariantViolation::SnoozeNotAfterUpdate);
            }
            (Status::Snoozed, None) => return Err(InvariantViolation::SnoozeMismatch),
            (status, Some(_)) if status != Status::Snoozed => {
                return Err(InvariantViolation::SnoozeMismatch);
            }
            _ => {}
        }
        if (self.status == Status::Completed) != self.completed_at.is_some() {
            return Err(InvariantViolation::CompletionMismatch);
        }
        if self.updated_at < self.created_at {
            return Err(InvariantViolation::AuditRegression);
        }
        let limit = EscalationRule::MAX_OFFSET_MINUTES.unsigned_abs();
        if let Some(rule) = self
            .escalation_rules
            .iter()
            .find(|rule| rule.offset_minutes.unsigned_abs() > limit)
        {
            return Err(InvariantViolation::OffsetOutOfRange(rule.offset_minutes));
        }
        Ok(())
    }
}
