//! Events - ドメインイベント
//!
//! Engine が EventSink に流す状態変化の通知。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::alert::{AlertEvent, AlertToken};
use super::ids::ResponsibilityId;
use super::state::Status;

/// A recurring occurrence resolved and the schedule moved forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rollover {
    pub previous_due: DateTime<Utc>,
    pub next_due: DateTime<Utc>,
}

/// One applied status transition.
///
/// `to` is the status the occurrence resolved into. When `rollover` is set the
/// entity itself rests in `Active` again with the advanced due instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub id: ResponsibilityId,
    pub from: Status,
    pub to: Status,
    pub at: DateTime<Utc>,
    pub rollover: Option<Rollover>,
}

impl Transition {
    /// Status the entity holds after the transition (rollover included).
    pub fn resting_status(&self) -> Status {
        if self.rollover.is_some() {
            Status::Active
        } else {
            self.to
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    StatusChanged(Transition),
    AlertRegistered {
        id: ResponsibilityId,
        alert: AlertEvent,
        token: AlertToken,
    },
    AlertCancelled {
        id: ResponsibilityId,
        token: AlertToken,
    },
    DispatchFailed {
        id: ResponsibilityId,
        alert: AlertEvent,
        reason: String,
    },
}

impl DomainEvent {
    pub fn responsibility_id(&self) -> ResponsibilityId {
        match self {
            DomainEvent::StatusChanged(t) => t.id,
            DomainEvent::AlertRegistered { id, .. }
            | DomainEvent::AlertCancelled { id, .. }
            | DomainEvent::DispatchFailed { id, .. } => *id,
        }
    }
}
