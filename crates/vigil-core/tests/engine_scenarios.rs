//! End-to-end scenarios through the engine, in-memory store and dispatcher.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Europe::Istanbul;
use rstest::rstest;
use std::sync::Arc;
use std::sync::Mutex;
use tokio::sync::mpsc;

use vigil_core::app::{Engine, EngineBuilder, Scheduler, SweepJob};
use vigil_core::config::SWEEP_JOB;
use vigil_core::domain::{
    AlertEvent, Channel, ChecklistItem, DomainEvent, EngineError, ErrorKind, EscalationRule,
    InvariantViolation, Responsibility, ResponsibilityId, Schedule, Status, StoreError, Strength,
    TransitionError, UserId,
};
use vigil_core::impls::{ChannelEventSink, InMemoryAlertDispatcher, InMemoryResponsibilityStore};
use vigil_core::ports::{FixedClock, ResponsibilityStore};

fn utc(d: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, d, h, m, 0).unwrap()
}

struct Harness {
    user: UserId,
    engine: Arc<Engine>,
    store: Arc<InMemoryResponsibilityStore>,
    dispatcher: Arc<InMemoryAlertDispatcher>,
    clock: Arc<FixedClock>,
    events: mpsc::UnboundedReceiver<DomainEvent>,
}

impl Harness {
    fn new(now: DateTime<Utc>) -> Self {
        Self::with_store(now, Arc::new(InMemoryResponsibilityStore::new()))
    }

    fn with_store(now: DateTime<Utc>, store: Arc<InMemoryResponsibilityStore>) -> Self {
        let user = UserId::random();
        let dispatcher = Arc::new(InMemoryAlertDispatcher::new());
        let clock = Arc::new(FixedClock::new(now));
        let (sink, events) = ChannelEventSink::channel();
        let engine = EngineBuilder::new(user)
            .store(store.clone())
            .dispatcher(dispatcher.clone())
            .events(Arc::new(sink))
            .clock(clock.clone())
            .build()
            .unwrap();
        Self {
            user,
            engine: Arc::new(engine),
            store,
            dispatcher,
            clock,
            events,
        }
    }

    /// Daily at 09:00 Istanbul (06:00Z), gentle, no explicit rules.
    fn daily(&self) -> Responsibility {
        Responsibility::new(
            ResponsibilityId::random(),
            self.user,
            "take medication",
            Schedule::recurring(utc(10, 6, 0), Istanbul, "FREQ=DAILY"),
            utc(9, 6, 0),
        )
        .with_reminder_style(Strength::Gentle)
    }

    fn one_time(&self, due: DateTime<Utc>) -> Responsibility {
        Responsibility::new(
            ResponsibilityId::random(),
            self.user,
            "submit report",
            Schedule::one_time(due, Istanbul),
            utc(9, 6, 0),
        )
    }

    fn drain_events(&mut self) -> Vec<DomainEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

#[tokio::test]
async fn daily_item_swept_after_due_is_missed_and_rolled_over() {
    let h = Harness::new(utc(10, 6, 1));
    let r = h.daily();
    h.store.insert(r.clone()).await;

    let report = h.engine.run_sweep().await.unwrap();

    let transitions = report.transitioned();
    assert_eq!(transitions.len(), 1);
    assert_eq!((transitions[0].from, transitions[0].to), (Status::Active, Status::Missed));

    let stored = h.store.get(r.id).await.unwrap();
    assert_eq!(stored.status, Status::Active);
    assert_eq!(stored.schedule.datetime, utc(11, 6, 0));
    assert_eq!(
        h.dispatcher.pending_for(r.id).await,
        vec![AlertEvent::new(utc(11, 6, 0), Channel::Notification, Strength::Gentle)]
    );
}

#[tokio::test]
async fn completing_daily_item_before_due_advances_one_day() {
    let h = Harness::new(utc(10, 5, 55));
    let r = h.daily();
    h.store.insert(r.clone()).await;

    let t = h.engine.complete(r.id).await.unwrap();
    assert_eq!(t.to, Status::Completed);

    let stored = h.store.get(r.id).await.unwrap();
    assert_eq!(stored.status, Status::Active);
    assert_eq!(stored.schedule.datetime, utc(11, 6, 0));
    assert_eq!(stored.completed_at, None);
    assert!(stored.schedule.datetime > r.schedule.datetime);
}

#[tokio::test]
async fn escalation_rules_are_registered_in_fire_order() {
    let h = Harness::new(utc(10, 10, 0));
    let r = h.one_time(utc(10, 14, 0)).with_escalation_rules(vec![
        EscalationRule::new(-60, Channel::Notification, Strength::Gentle),
        EscalationRule::new(0, Channel::FullScreen, Strength::Critical),
    ]);
    h.engine.track(r.clone()).await.unwrap();

    assert_eq!(
        h.dispatcher.pending_for(r.id).await,
        vec![
            AlertEvent::new(utc(10, 13, 0), Channel::Notification, Strength::Gentle),
            AlertEvent::new(utc(10, 14, 0), Channel::FullScreen, Strength::Critical),
        ]
    );
}

#[tokio::test]
async fn second_sweep_without_changes_is_quiet() {
    let h = Harness::new(utc(10, 6, 1));
    h.store.insert(h.daily()).await;
    h.store.insert(h.one_time(utc(10, 12, 0))).await;
    h.store.insert(h.one_time(utc(10, 5, 0))).await;

    let first = h.engine.run_sweep().await.unwrap();
    assert_eq!(first.transitioned().len(), 2);
    let pending = h.dispatcher.pending().await.len();

    let second = h.engine.run_sweep().await.unwrap();
    assert!(second.transitioned().is_empty());
    assert!(second.alerts_to_register().is_empty());
    assert_eq!(h.dispatcher.pending().await.len(), pending);
}

#[tokio::test]
async fn snooze_round_trip_restores_due_time() {
    let h = Harness::new(utc(10, 5, 0));
    let r = h.one_time(utc(10, 6, 0));
    h.engine.track(r.clone()).await.unwrap();

    h.engine.snooze(r.id, utc(10, 5, 30)).await.unwrap();
    assert_eq!(h.store.get(r.id).await.unwrap().status, Status::Snoozed);

    h.clock.set(utc(10, 5, 30));
    let report = h.engine.run_sweep().await.unwrap();
    assert_eq!(report.transitioned()[0].to, Status::Active);

    let stored = h.store.get(r.id).await.unwrap();
    assert_eq!(stored.status, Status::Active);
    assert_eq!(stored.schedule.datetime, r.schedule.datetime);
    assert_eq!(stored.snoozed_until, None);
}

#[tokio::test]
async fn invalid_user_action_is_surfaced_and_changes_nothing() {
    let h = Harness::new(utc(10, 5, 0));
    let r = h.one_time(utc(10, 6, 0));
    h.engine.track(r.clone()).await.unwrap();
    h.engine.archive(r.id).await.unwrap();
    let archived = h.store.get(r.id).await.unwrap();

    let err = h.engine.complete(r.id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Transition(TransitionError::InvalidTransition { from: Status::Archived, .. })
    ));
    assert_eq!(err.kind(), ErrorKind::Permanent);
    assert_eq!(h.store.get(r.id).await.unwrap(), archived);
    // archiving retired the pending alert
    assert!(h.dispatcher.pending_for(r.id).await.is_empty());
}

#[tokio::test]
async fn unarchive_replans_alerts() {
    let h = Harness::new(utc(10, 5, 0));
    let r = h.daily();
    h.engine.track(r.clone()).await.unwrap();
    h.engine.archive(r.id).await.unwrap();

    h.clock.set(utc(12, 12, 0));
    h.engine.unarchive(r.id).await.unwrap();

    let stored = h.store.get(r.id).await.unwrap();
    assert_eq!(stored.status, Status::Active);
    assert_eq!(stored.schedule.datetime, utc(13, 6, 0));
    assert_eq!(h.dispatcher.pending_for(r.id).await.len(), 1);
}

#[tokio::test]
async fn checklist_edits_are_persisted() {
    let h = Harness::new(utc(10, 5, 0));
    let r = h
        .one_time(utc(10, 6, 0))
        .with_checklist(vec![ChecklistItem::new("print"), ChecklistItem::new("sign")]);
    h.engine.track(r.clone()).await.unwrap();

    let updated = h
        .engine
        .set_checklist_item(r.id, r.checklist[1].id, true)
        .await
        .unwrap();
    assert!(updated.checklist[1].done);
    assert!(h.store.get(r.id).await.unwrap().checklist[1].done);
}

#[tokio::test]
async fn dispatch_failure_is_retried_on_next_sweep() {
    let mut h = Harness::new(utc(10, 5, 0));
    let r = h.one_time(utc(10, 9, 0));
    h.store.insert(r.clone()).await;

    h.dispatcher.fail_next(1).await;
    let report = h.engine.run_sweep().await.unwrap();
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].error.is_retryable());
    assert!(h.dispatcher.pending().await.is_empty());
    assert!(
        h.drain_events()
            .iter()
            .any(|e| matches!(e, DomainEvent::DispatchFailed { .. }))
    );

    let retry = h.engine.run_sweep().await.unwrap();
    assert!(retry.failures.is_empty());
    assert_eq!(h.dispatcher.pending_for(r.id).await.len(), 1);
}

#[tokio::test]
async fn removed_item_alerts_are_cancelled() {
    let h = Harness::new(utc(10, 5, 0));
    let r = h.one_time(utc(10, 9, 0));
    h.engine.track(r.clone()).await.unwrap();
    assert_eq!(h.dispatcher.pending().await.len(), 1);

    h.engine.remove(r.id).await.unwrap();
    assert!(h.dispatcher.pending().await.is_empty());
    assert_eq!(h.dispatcher.cancelled().await.len(), 1);
}

#[tokio::test]
async fn status_changes_are_emitted() {
    let mut h = Harness::new(utc(10, 7, 0));
    let r = h.one_time(utc(10, 6, 0));
    h.store.insert(r.clone()).await;

    h.engine.run_sweep().await.unwrap();
    let events = h.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        DomainEvent::StatusChanged(t) if t.id == r.id && t.to == Status::Missed
    )));
    assert_eq!(h.store.get(r.id).await.unwrap().status, Status::Missed);
}

#[tokio::test]
async fn other_users_items_are_not_reachable() {
    let h = Harness::new(utc(10, 5, 0));
    let mut foreign = h.one_time(utc(10, 6, 0));
    foreign.user_id = UserId::random();
    h.store.insert(foreign.clone()).await;

    let err = h.engine.complete(foreign.id).await.unwrap_err();
    assert!(matches!(err, EngineError::Store(StoreError::NotFound(_))));
    assert!(h.engine.run_sweep().await.unwrap().transitioned().is_empty());
}

#[tokio::test]
async fn corrupt_escalation_offset_does_not_stop_the_sweep() {
    let h = Harness::new(utc(10, 6, 1));
    let corrupt = h.one_time(utc(10, 5, 0)).with_escalation_rules(vec![EscalationRule::new(
        i64::MAX / 2,
        Channel::FullScreen,
        Strength::Critical,
    )]);
    let healthy = h.daily();
    h.store.insert(corrupt.clone()).await;
    h.store.insert(healthy.clone()).await;

    let report = h.engine.run_sweep().await.unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].id, corrupt.id);
    assert!(matches!(
        report.failures[0].error,
        EngineError::Invariant(InvariantViolation::OffsetOutOfRange(_))
    ));
    assert_eq!(report.transitioned().len(), 1);
    assert_eq!(h.store.get(healthy.id).await.unwrap().schedule.datetime, utc(11, 6, 0));
    assert_eq!(h.store.get(corrupt.id).await.unwrap(), corrupt);
    assert!(h.dispatcher.pending_for(corrupt.id).await.is_empty());

    let mut fresh = h.one_time(utc(10, 9, 0));
    fresh.escalation_rules = corrupt.escalation_rules.clone();
    let err = h.engine.track(fresh.clone()).await.unwrap_err();
    assert!(matches!(err, EngineError::Invariant(_)));
    assert_eq!(h.store.get(fresh.id).await, Err(StoreError::NotFound(fresh.id)));
}

/// Store that lets another writer slip in between load and save.
struct RacingStore {
    inner: InMemoryResponsibilityStore,
    bump: Mutex<Option<(ResponsibilityId, DateTime<Utc>)>>,
}

#[async_trait]
impl ResponsibilityStore for RacingStore {
    async fn load(&self, user_id: UserId) -> Result<Vec<Responsibility>, StoreError> {
        let snapshot = self.inner.load(user_id).await?;
        let bump = self.bump.lock().unwrap().take();
        if let Some((id, at)) = bump {
            let mut newer = self.inner.get(id).await?;
            newer.updated_at = at;
            newer.title = "renamed by user".into();
            self.inner.insert(newer).await;
        }
        Ok(snapshot)
    }

    async fn get(&self, id: ResponsibilityId) -> Result<Responsibility, StoreError> {
        self.inner.get(id).await
    }

    async fn save(&self, r: Responsibility) -> Result<Responsibility, StoreError> {
        self.inner.save(r).await
    }

    async fn compare_and_save(
        &self,
        r: Responsibility,
        expected: &Responsibility,
    ) -> Result<Responsibility, StoreError> {
        self.inner.compare_and_save(r, expected).await
    }

    async fn delete(&self, id: ResponsibilityId) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }
}

#[rstest]
#[case::later_than_the_sweep(utc(10, 8, 0))]
#[case::same_instant_as_the_sweep(utc(10, 7, 0))]
#[case::same_timestamp_as_the_loaded_copy(utc(9, 6, 0))]
#[tokio::test]
async fn sweep_never_overwrites_concurrent_user_edit(#[case] edited_at: DateTime<Utc>) {
    let user = UserId::random();
    let store = Arc::new(RacingStore {
        inner: InMemoryResponsibilityStore::new(),
        bump: Mutex::new(None),
    });
    let dispatcher = Arc::new(InMemoryAlertDispatcher::new());
    let engine = EngineBuilder::new(user)
        .store(store.clone())
        .dispatcher(dispatcher.clone())
        .clock(Arc::new(FixedClock::new(utc(10, 7, 0))))
        .build()
        .unwrap();

    let r = Responsibility::new(
        ResponsibilityId::random(),
        user,
        "pay rent",
        Schedule::one_time(utc(10, 6, 0), Istanbul),
        utc(9, 6, 0),
    );
    store.inner.insert(r.clone()).await;
    *store.bump.lock().unwrap() = Some((r.id, edited_at));

    let report = engine.run_sweep().await.unwrap();
    assert!(report.transitioned().is_empty());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].error.kind(), ErrorKind::Transient);
    let stored = store.inner.get(r.id).await.unwrap();
    assert_eq!(stored.title, "renamed by user");
    assert_eq!(stored.status, Status::Active);

    // next sweep works from the fresh copy
    let retry = engine.run_sweep().await.unwrap();
    assert_eq!(retry.transitioned().len(), 1);
    let stored = store.inner.get(r.id).await.unwrap();
    assert_eq!(stored.title, "renamed by user");
    assert_eq!(stored.status, Status::Missed);
}

#[tokio::test(start_paused = true)]
async fn scheduler_drives_the_sweep() {
    let h = Harness::new(utc(10, 5, 0));
    let r = h.one_time(utc(10, 9, 0));
    h.store.insert(r.clone()).await;

    let (tx, mut outcomes) = mpsc::unbounded_channel();
    let handle = Scheduler::new()
        .with_job(
            Arc::new(SweepJob::new(h.engine.clone())),
            std::time::Duration::from_secs(60),
        )
        .with_outcomes(tx)
        .with_clock(h.engine.clock())
        .spawn();

    let first = outcomes.recv().await.unwrap();
    assert_eq!(first.job, SWEEP_JOB);
    assert!(first.is_ok());
    assert_eq!(first.finished_at, utc(10, 5, 0));
    assert_eq!(h.dispatcher.pending_for(r.id).await.len(), 1);

    h.clock.set(utc(10, 9, 0));
    handle.trigger(SWEEP_JOB).await.unwrap();
    let second = outcomes.recv().await.unwrap();
    assert!(second.is_ok());
    assert_eq!(second.finished_at, utc(10, 9, 0));
    assert_eq!(h.store.get(r.id).await.unwrap().status, Status::Missed);

    handle.shutdown_and_join().await;
}
