//! Sweeper - 1 回の評価パス（純粋・I/O なし）
//!
//! # フロー（responsibility ごと、`(schedule.datetime, id)` 昇順）
//! 1. validate: 不変条件違反は failure として報告し、スキップ
//! 2. wake: snoozed → active
//! 3. mark_missed: active → missed（recurring は rollover）
//! 4. plan: EscalationPlanner + AlertPolicy、snooze 中は wake まで遅延
//! 5. diff: 台帳と比較して register / cancel を決める
//!
//! 副作用は報告するだけ。永続化と配送は [`crate::app::Engine`] の仕事です。
//! 台帳は楽観的に更新され、永続化に失敗したユニットは [`Sweeper::rollback`] で戻す。

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use super::ledger::{AlertLedger, LedgerEntry};
use crate::domain::{
    AlertEvent, AlertKey, AlertToken, Channel, EngineError, Responsibility, ResponsibilityId,
    Status, Transition,
};
use crate::escalation::{AlertPolicy, plan_alerts};
use crate::lifecycle::StateMachine;

/// Everything one sweep decided for one responsibility.
///
/// A unit is applied all-or-nothing by the driver.
#[derive(Debug, Clone)]
pub struct SweepUnit {
    pub id: ResponsibilityId,
    pub transitions: Vec<Transition>,
    /// Entity to persist, when the sweep changed it.
    pub updated: Option<Responsibility>,
    /// Snapshot copy the unit was computed from; `None` for ids that were
    /// no longer in the snapshot.
    pub loaded: Option<Responsibility>,
    pub register: Vec<AlertEvent>,
    /// Obsolete future alerts, with the token when one was bound.
    pub cancel: Vec<(AlertKey, Option<AlertToken>)>,
    prior: LedgerEntry,
}

impl SweepUnit {
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
            && self.updated.is_none()
            && self.register.is_empty()
            && self.cancel.is_empty()
    }
}

#[derive(Debug)]
pub struct SweepFailure {
    pub id: ResponsibilityId,
    pub error: EngineError,
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub units: Vec<SweepUnit>,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    /// Applied transitions in sweep order.
    pub fn transitioned(&self) -> Vec<Transition> {
        self.units
            .iter()
            .flat_map(|unit| unit.transitions.iter().copied())
            .collect()
    }

    pub fn alerts_to_register(&self) -> Vec<(ResponsibilityId, AlertEvent)> {
        self.units
            .iter()
            .flat_map(|unit| unit.register.iter().map(move |alert| (unit.id, *alert)))
            .collect()
    }

    pub fn alerts_to_cancel(&self) -> Vec<(ResponsibilityId, AlertKey)> {
        self.units
            .iter()
            .flat_map(|unit| unit.cancel.iter().map(move |(key, _)| (unit.id, *key)))
            .collect()
    }

    /// Nothing transitioned, nothing to register or cancel.
    pub fn is_quiet(&self) -> bool {
        self.units.iter().all(SweepUnit::is_empty)
    }
}

#[derive(Debug, Default)]
pub struct Sweeper {
    machine: StateMachine,
    policy: AlertPolicy,
    ledger: AlertLedger,
}

impl Sweeper {
    pub fn new(machine: StateMachine, policy: AlertPolicy) -> Self {
        Self {
            machine,
            policy,
            ledger: AlertLedger::new(),
        }
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    pub fn ledger(&self) -> &AlertLedger {
        &self.ledger
    }

    /// Evaluate a snapshot against `now`.
    ///
    /// Ids tracked in the ledger but absent from the snapshot (deleted)
    /// get their future alerts cancelled.
    pub fn sweep(&mut self, now: DateTime<Utc>, mut snapshot: Vec<Responsibility>) -> SweepReport {
        snapshot.sort_by_key(|r| (r.schedule.datetime, r.id));

        let mut report = SweepReport::default();
        let mut seen = HashSet::with_capacity(snapshot.len());

        for mut r in snapshot {
            seen.insert(r.id);
            if let Err(violation) = r.validate() {
                warn!(responsibility_id = %r.id, error = %violation, "skipping invalid responsibility");
                report.failures.push(SweepFailure {
                    id: r.id,
                    error: violation.into(),
                });
                continue;
            }

            let before = r.clone();
            let mut transitions = Vec::new();
            transitions.extend(self.machine.wake(&mut r, now));
            transitions.extend(self.machine.mark_missed(&mut r, now));

            let planned = self.plan(&r);
            let updated = (r != before).then_some(r);
            let mut unit = self.diff(before.id, now, transitions, updated, &planned);
            unit.loaded = Some(before);
            if !unit.is_empty() {
                report.units.push(unit);
            }
        }

        for id in self.ledger.ids() {
            if seen.contains(&id) {
                continue;
            }
            debug!(responsibility_id = %id, "responsibility gone, cancelling its alerts");
            let unit = self.diff(id, now, Vec::new(), None, &BTreeMap::new());
            if !unit.is_empty() {
                report.units.push(unit);
            }
        }

        report
    }

    /// Restore the ledger entry a unit replaced (its changes were not applied).
    pub fn rollback(&mut self, unit: &SweepUnit) {
        self.ledger.replace(unit.id, unit.prior.clone());
    }

    pub fn bind_token(&mut self, id: ResponsibilityId, key: AlertKey, token: AlertToken) {
        self.ledger.bind_token(id, key, token);
    }

    /// Forget a failed registration so the next sweep retries it.
    pub fn forget(&mut self, id: ResponsibilityId, key: &AlertKey) {
        self.ledger.forget(id, key);
    }

    /// Full alert plan of the current occurrence, policy applied.
    fn plan(&self, r: &Responsibility) -> BTreeMap<AlertKey, AlertEvent> {
        let mut planned = BTreeMap::new();
        if !r.status.wants_alerts() {
            return planned;
        }

        let style = r.effective_style(self.policy.default_style);
        let snoozed_until = match r.status {
            Status::Snoozed => r.snoozed_until,
            _ => None,
        };

        if let Some(until) = snoozed_until {
            let wake = self
                .policy
                .apply(AlertEvent::new(until, Channel::Notification, style));
            planned.insert(wake.key(), wake);
        }
        for alert in plan_alerts(r.schedule.datetime, style, &r.escalation_rules) {
            if snoozed_until.is_some_and(|until| alert.fire_at < until) {
                continue;
            }
            let alert = self.policy.apply(alert);
            planned.entry(alert.key()).or_insert(alert);
        }
        planned
    }

    /// Diff a plan against the ledger and commit the new entry.
    ///
    /// Unregistered alerts already in the past are dropped; obsolete past
    /// alerts have fired and are only forgotten.
    fn diff(
        &mut self,
        id: ResponsibilityId,
        now: DateTime<Utc>,
        transitions: Vec<Transition>,
        updated: Option<Responsibility>,
        planned: &BTreeMap<AlertKey, AlertEvent>,
    ) -> SweepUnit {
        let prior = self.ledger.entry(id);
        let mut next = LedgerEntry::new();
        let mut register = Vec::new();
        let mut cancel = Vec::new();

        for (key, alert) in planned {
            match prior.get(key) {
                Some(token) => {
                    next.insert(*key, token.clone());
                }
                None if alert.fire_at >= now => {
                    next.insert(*key, None);
                    register.push(*alert);
                }
                None => {}
            }
        }
        for (key, token) in &prior {
            if !planned.contains_key(key) && key.fire_at > now {
                cancel.push((*key, token.clone()));
            }
        }

        self.ledger.replace(id, next);
        SweepUnit {
            id,
            transitions,
            updated,
            loaded: None,
            register,
            cancel,
            prior,
        }
    }
}
