//! Engine - スイープとユーザー操作の単一ライター・ドライバ
//!
//! # 学習ポイント
//! - Sweeper（純粋）を tokio::sync::Mutex で包み、スイープとユーザー操作を直列化
//! - I/O（store / dispatcher）はここでだけ await する
//! - ユニット単位の all-or-nothing: 保存に失敗したら台帳を rollback
//! - 書き戻しは compare_and_save: 読み込んだ行から変わっていたら諦める
//!
//! Background sweeps never fail on a single entity; failures are collected
//! in the returned report. User actions surface their errors directly.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::status::StatusCounts;
use super::sweep::{SweepFailure, SweepReport, Sweeper};
use crate::domain::{
    ChecklistItemId, DomainEvent, EngineError, Responsibility, ResponsibilityId, StoreError,
    Transition, UserId,
};
use crate::lifecycle::UserAction;
use crate::ports::{AlertDispatcher, Clock, EventSink, ResponsibilityStore};
use chrono::{DateTime, Utc};

pub struct Engine {
    pub(super) user_id: UserId,
    pub(super) store: Arc<dyn ResponsibilityStore>,
    pub(super) dispatcher: Arc<dyn AlertDispatcher>,
    pub(super) events: Arc<dyn EventSink>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) sweeper: Mutex<Sweeper>,
}

impl Engine {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The engine's time source, for collaborators that must agree with it.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// One sweep over the user's responsibilities.
    ///
    /// Only a failed load fails the whole sweep.
    pub async fn run_sweep(&self) -> Result<SweepReport, EngineError> {
        let mut sweeper = self.sweeper.lock().await;
        self.sweep_locked(&mut sweeper).await
    }

    pub async fn complete(&self, id: ResponsibilityId) -> Result<Transition, EngineError> {
        self.act(id, UserAction::Complete).await
    }

    pub async fn snooze(
        &self,
        id: ResponsibilityId,
        until: DateTime<Utc>,
    ) -> Result<Transition, EngineError> {
        self.act(id, UserAction::Snooze { until }).await
    }

    pub async fn archive(&self, id: ResponsibilityId) -> Result<Transition, EngineError> {
        self.act(id, UserAction::Archive).await
    }

    pub async fn unarchive(&self, id: ResponsibilityId) -> Result<Transition, EngineError> {
        self.act(id, UserAction::Unarchive).await
    }

    pub async fn set_checklist_item(
        &self,
        id: ResponsibilityId,
        item: ChecklistItemId,
        done: bool,
    ) -> Result<Responsibility, EngineError> {
        let mut sweeper = self.sweeper.lock().await;
        let loaded = self.get_owned(id).await?;
        let mut r = loaded.clone();
        sweeper
            .machine()
            .set_checklist_item(&mut r, item, done, self.clock.now())?;
        let saved = self.store.compare_and_save(r, &loaded).await?;
        debug!(responsibility_id = %id, %item, done, "checklist item updated");
        Ok(saved)
    }

    /// Start tracking a new responsibility and plan its alerts.
    pub async fn track(&self, responsibility: Responsibility) -> Result<Responsibility, EngineError> {
        if responsibility.user_id != self.user_id {
            return Err(StoreError::NotFound(responsibility.id).into());
        }
        responsibility.validate()?;

        let mut sweeper = self.sweeper.lock().await;
        let saved = self.store.save(responsibility).await?;
        info!(responsibility_id = %saved.id, title = %saved.title, "responsibility tracked");
        self.follow_up(&mut sweeper).await;
        Ok(saved)
    }

    /// Delete a responsibility; its pending alerts are cancelled.
    pub async fn remove(&self, id: ResponsibilityId) -> Result<(), EngineError> {
        let mut sweeper = self.sweeper.lock().await;
        self.get_owned(id).await?;
        self.store.delete(id).await?;
        info!(responsibility_id = %id, "responsibility removed");
        self.follow_up(&mut sweeper).await;
        Ok(())
    }

    pub async fn status(&self) -> Result<StatusCounts, EngineError> {
        let snapshot = self.store.load(self.user_id).await?;
        Ok(StatusCounts::tally(&snapshot, self.clock.now()))
    }

    /// get -> transition -> save -> on-demand sweep, under the writer lock.
    async fn act(
        &self,
        id: ResponsibilityId,
        action: UserAction,
    ) -> Result<Transition, EngineError> {
        let mut sweeper = self.sweeper.lock().await;
        let loaded = self.get_owned(id).await?;
        let mut r = loaded.clone();
        let transition = sweeper.machine().apply(&mut r, action, self.clock.now())?;
        self.store.compare_and_save(r, &loaded).await?;

        info!(
            responsibility_id = %id,
            from = %transition.from,
            to = %transition.to,
            "user action applied"
        );
        self.events.emit(DomainEvent::StatusChanged(transition));
        self.follow_up(&mut sweeper).await;
        Ok(transition)
    }

    async fn get_owned(&self, id: ResponsibilityId) -> Result<Responsibility, EngineError> {
        let r = self.store.get(id).await?;
        if r.user_id != self.user_id {
            return Err(StoreError::NotFound(id).into());
        }
        Ok(r)
    }

    /// On-demand sweep after a user mutation. Its failures stay in the log;
    /// the mutation itself already succeeded.
    async fn follow_up(&self, sweeper: &mut Sweeper) {
        match self.sweep_locked(sweeper).await {
            Ok(report) if !report.failures.is_empty() => {
                debug!(failures = report.failures.len(), "follow-up sweep had failures");
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "follow-up sweep failed"),
        }
    }

    async fn sweep_locked(&self, sweeper: &mut Sweeper) -> Result<SweepReport, EngineError> {
        let snapshot = self.store.load(self.user_id).await?;
        let now = self.clock.now();
        let planned = sweeper.sweep(now, snapshot);

        let mut applied = SweepReport {
            units: Vec::with_capacity(planned.units.len()),
            failures: planned.failures,
        };

        for unit in planned.units {
            if let (Some(updated), Some(loaded)) = (&unit.updated, &unit.loaded) {
                if let Err(err) = self.store.compare_and_save(updated.clone(), loaded).await {
                    match &err {
                        StoreError::StaleWrite(_) => {
                            info!(responsibility_id = %unit.id, "row changed since load, leaving for next sweep")
                        }
                        _ => warn!(responsibility_id = %unit.id, error = %err, "save failed"),
                    }
                    sweeper.rollback(&unit);
                    applied.failures.push(SweepFailure {
                        id: unit.id,
                        error: err.into(),
                    });
                    continue;
                }
            }

            for transition in &unit.transitions {
                self.events.emit(DomainEvent::StatusChanged(*transition));
            }

            for (key, token) in &unit.cancel {
                let Some(token) = token else {
                    continue;
                };
                match self.dispatcher.cancel_alert(token).await {
                    Ok(()) => self.events.emit(DomainEvent::AlertCancelled {
                        id: unit.id,
                        token: token.clone(),
                    }),
                    Err(err) => warn!(
                        responsibility_id = %unit.id,
                        fire_at = %key.fire_at,
                        error = %err,
                        "cancel failed"
                    ),
                }
            }

            for alert in &unit.register {
                match self.dispatcher.register_alert(unit.id, *alert).await {
                    Ok(token) => {
                        sweeper.bind_token(unit.id, alert.key(), token.clone());
                        self.events.emit(DomainEvent::AlertRegistered {
                            id: unit.id,
                            alert: *alert,
                            token,
                        });
                    }
                    Err(err) => {
                        sweeper.forget(unit.id, &alert.key());
                        self.events.emit(DomainEvent::DispatchFailed {
                            id: unit.id,
                            alert: *alert,
                            reason: err.to_string(),
                        });
                        applied.failures.push(SweepFailure {
                            id: unit.id,
                            error: err.into(),
                        });
                    }
                }
            }

            applied.units.push(unit);
        }

        debug!(
            transitions = applied.transitioned().len(),
            registered = applied.alerts_to_register().len(),
            failures = applied.failures.len(),
            "sweep finished"
        );
        Ok(applied)
    }
}
