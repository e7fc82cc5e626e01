//! StateMachine - Responsibility の状態遷移
//!
//! All status mutation goes through here. Guards are checked before anything
//! is touched, so a rejected call leaves the entity exactly as it was.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{
    ChecklistItemId, RecurrenceError, Responsibility, Rollover, Status, Transition,
    TransitionError,
};
use crate::recurrence::RecurrenceRule;

/// Whether completion requires every checklist item to be done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistPolicy {
    #[default]
    Ignore,
    RequireAllDone,
}

#[derive(Debug, Clone)]
pub struct LifecyclePolicy {
    /// Delay after the due instant before an active item counts as missed.
    pub grace: Duration,
    pub checklist: ChecklistPolicy,
}

impl LifecyclePolicy {
    pub fn default_v1() -> Self {
        Self {
            grace: Duration::zero(),
            checklist: ChecklistPolicy::Ignore,
        }
    }
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self::default_v1()
    }
}

/// A user-initiated mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    Complete,
    Snooze { until: DateTime<Utc> },
    Archive,
    Unarchive,
}

impl UserAction {
    fn name(&self) -> &'static str {
        match self {
            UserAction::Complete => "complete",
            UserAction::Snooze { .. } => "snooze",
            UserAction::Archive => "archive",
            UserAction::Unarchive => "unarchive",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    policy: LifecyclePolicy,
}

impl StateMachine {
    pub fn new(policy: LifecyclePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    /// Apply a user action, or reject it without touching `r`.
    pub fn apply(
        &self,
        r: &mut Responsibility,
        action: UserAction,
        now: DateTime<Utc>,
    ) -> Result<Transition, TransitionError> {
        match action {
            UserAction::Complete => self.complete(r, now),
            UserAction::Snooze { until } => self.snooze(r, until, now),
            UserAction::Archive => self.archive(r, now),
            UserAction::Unarchive => self.unarchive(r, now),
        }
    }

    /// `active|missed -> completed`. Recurring items roll over and rest in `active`.
    pub fn complete(
        &self,
        r: &mut Responsibility,
        now: DateTime<Utc>,
    ) -> Result<Transition, TransitionError> {
        let from = r.status;
        if !matches!(from, Status::Active | Status::Missed) {
            return Err(invalid(from, UserAction::Complete));
        }
        if self.policy.checklist == ChecklistPolicy::RequireAllDone {
            let remaining = r.checklist.iter().filter(|item| !item.done).count();
            if remaining > 0 {
                return Err(TransitionError::ChecklistIncomplete { remaining });
            }
        }

        touch(r, now);
        let rollover = self.roll_over(r, now);
        if rollover.is_none() {
            r.status = Status::Completed;
            r.completed_at = Some(now);
        }
        Ok(transition(r, from, Status::Completed, now, rollover))
    }

    /// `active -> snoozed` until `until`, which must lie in the future.
    pub fn snooze(
        &self,
        r: &mut Responsibility,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Transition, TransitionError> {
        let from = r.status;
        if from != Status::Active {
            return Err(invalid(from, UserAction::Snooze { until }));
        }
        if until <= now.max(r.updated_at) {
            return Err(TransitionError::SnoozeNotInFuture);
        }

        touch(r, now);
        r.status = Status::Snoozed;
        r.snoozed_until = Some(until);
        Ok(transition(r, from, Status::Snoozed, now, None))
    }

    /// `any non-archived -> archived`.
    pub fn archive(
        &self,
        r: &mut Responsibility,
        now: DateTime<Utc>,
    ) -> Result<Transition, TransitionError> {
        let from = r.status;
        if from.is_archived() {
            return Err(invalid(from, UserAction::Archive));
        }

        touch(r, now);
        r.status = Status::Archived;
        r.snoozed_until = None;
        r.completed_at = None;
        Ok(transition(r, from, Status::Archived, now, None))
    }

    /// `archived -> active`, as a fresh cycle.
    ///
    /// A recurring schedule already in the past is moved to its next occurrence.
    pub fn unarchive(
        &self,
        r: &mut Responsibility,
        now: DateTime<Utc>,
    ) -> Result<Transition, TransitionError> {
        let from = r.status;
        if !from.is_archived() {
            return Err(invalid(from, UserAction::Unarchive));
        }

        touch(r, now);
        let rollover = if r.schedule.datetime <= now {
            self.roll_over(r, now)
        } else {
            None
        };
        r.status = Status::Active;
        Ok(transition(r, from, Status::Active, now, rollover))
    }

    /// Set one checklist item. Archived items are read-only.
    pub fn set_checklist_item(
        &self,
        r: &mut Responsibility,
        item: ChecklistItemId,
        done: bool,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if r.status.is_archived() {
            return Err(TransitionError::InvalidTransition {
                from: r.status,
                action: "edit checklist of",
            });
        }
        let entry = r
            .checklist
            .iter_mut()
            .find(|entry| entry.id == item)
            .ok_or(TransitionError::UnknownChecklistItem)?;
        entry.done = done;
        touch(r, now);
        Ok(())
    }

    /// Has an active item passed its due instant plus grace?
    pub fn is_overdue(&self, r: &Responsibility, now: DateTime<Utc>) -> bool {
        r.status == Status::Active
            && r.schedule
                .datetime
                .checked_add_signed(self.policy.grace)
                .is_some_and(|deadline| now >= deadline)
    }

    /// Sweep: `active -> missed` when overdue. Recurring items roll over.
    pub fn mark_missed(&self, r: &mut Responsibility, now: DateTime<Utc>) -> Option<Transition> {
        if !self.is_overdue(r, now) {
            return None;
        }

        touch(r, now);
        let rollover = self.roll_over(r, now);
        if rollover.is_none() {
            r.status = Status::Missed;
        }
        Some(transition(r, Status::Active, Status::Missed, now, rollover))
    }

    /// Sweep: `snoozed -> active` once the snooze expires.
    ///
    /// The due instant is left alone, so the item may be overdue right away.
    pub fn wake(&self, r: &mut Responsibility, now: DateTime<Utc>) -> Option<Transition> {
        match (r.status, r.snoozed_until) {
            (Status::Snoozed, Some(until)) if now >= until => {
                touch(r, now);
                r.status = Status::Active;
                r.snoozed_until = None;
                Some(transition(r, Status::Snoozed, Status::Active, now, None))
            }
            _ => None,
        }
    }

    /// Advance a recurring schedule past `now` and reset the cycle state.
    ///
    /// Returns `None` when the item behaves as one-time: not recurring, an
    /// unparseable rule, or an exhausted series.
    fn roll_over(&self, r: &mut Responsibility, now: DateTime<Utc>) -> Option<Rollover> {
        if !r.is_recurring() {
            return None;
        }
        let rule = r.schedule.rrule.as_deref()?;
        let previous_due = r.schedule.datetime;
        let after = previous_due.max(now);

        let next_due = match RecurrenceRule::parse(rule)
            .and_then(|rule| rule.next_after(r.schedule.timezone, previous_due, after))
        {
            Ok(next_due) => next_due,
            Err(err @ RecurrenceError::InvalidRule { .. }) => {
                warn!(responsibility_id = %r.id, error = %err, "treating schedule as one-time");
                return None;
            }
            Err(RecurrenceError::NoMoreOccurrences) => {
                info!(responsibility_id = %r.id, "recurrence exhausted");
                return None;
            }
        };

        r.schedule.datetime = next_due;
        r.status = Status::Active;
        r.completed_at = None;
        r.snoozed_until = None;
        for item in &mut r.checklist {
            item.done = false;
        }
        Some(Rollover {
            previous_due,
            next_due,
        })
    }
}

fn invalid(from: Status, action: UserAction) -> TransitionError {
    TransitionError::InvalidTransition {
        from,
        action: action.name(),
    }
}

/// `updated_at` never moves backwards.
fn touch(r: &mut Responsibility, now: DateTime<Utc>) {
    r.updated_at = r.updated_at.max(now);
}

fn transition(
    r: &Responsibility,
    from: Status,
    to: Status,
    at: DateTime<Utc>,
    rollover: Option<Rollover>,
) -> Transition {
    Transition {
        id: r.id,
        from,
        to,
        at,
        rollover,
    }
}
