//! vigil デモ
//!
//! InMemory のコラボレーターで Engine と Scheduler を動かし、
//! ユーザー操作とスイープの結果を JSON で出力します。
//!
//! Usage: `vigil-cli [config.toml]`

use anyhow::Context;
use chrono::{Duration, Utc};
use chrono_tz::Europe::Istanbul;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vigil_core::app::{
    BRIEFING_JOB, BriefingJob, EngineBuilder, Scheduler, StatusCounts, SweepJob,
};
use vigil_core::config::{EngineConfig, SWEEP_JOB};
use vigil_core::domain::{
    AlertEvent, Channel, ChecklistItem, DomainEvent, EscalationRule, Responsibility,
    ResponsibilityId, Schedule, Strength, UserId,
};
use vigil_core::impls::{ChannelEventSink, InMemoryAlertDispatcher, InMemoryResponsibilityStore};
use vigil_core::ports::{IdGenerator, SystemClock, UlidGenerator};

const DEMO_WINDOW: std::time::Duration = std::time::Duration::from_secs(2);
const DEFAULT_BRIEFING_PERIOD: std::time::Duration = std::time::Duration::from_secs(3600);

#[derive(Serialize)]
struct DemoSummary {
    user_id: UserId,
    status: StatusCounts,
    pending_alerts: Vec<(ResponsibilityId, AlertEvent)>,
    events: Vec<DomainEvent>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vigil_core=info,vigil_cli=info")),
        )
        .init();

    // (A) 設定（引数があればファイルから）
    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::from_file(Path::new(&path))
            .with_context(|| format!("loading config from {path}"))?,
        None => EngineConfig::default(),
    };

    // (B) コラボレーターと Engine
    let user = UserId::random();
    let ids = UlidGenerator::new(SystemClock);
    let store = Arc::new(InMemoryResponsibilityStore::new());
    let dispatcher = Arc::new(InMemoryAlertDispatcher::new());
    let (events, mut event_rx) = ChannelEventSink::channel();

    let engine = Arc::new(
        EngineBuilder::new(user)
            .store(store.clone())
            .dispatcher(dispatcher.clone())
            .events(Arc::new(events))
            .config(&config)
            .build()?,
    );

    // (C) responsibility を登録
    let now = Utc::now();
    let medication = engine
        .track(
            Responsibility::new(
                ids.generate_responsibility_id(),
                user,
                "take medication",
                Schedule::recurring(now + Duration::minutes(2), Istanbul, "FREQ=DAILY"),
                now,
            )
            .with_reminder_style(Strength::Gentle),
        )
        .await?;

    let rent = engine
        .track(Responsibility::new(
            ids.generate_responsibility_id(),
            user,
            "pay rent",
            Schedule::one_time(now - Duration::minutes(5), Istanbul),
            now - Duration::days(1),
        ))
        .await?;

    let report = engine
        .track(
            Responsibility::new(
                ids.generate_responsibility_id(),
                user,
                "submit quarterly report",
                Schedule::one_time(now + Duration::hours(2), Istanbul),
                now,
            )
            .with_escalation_rules(vec![
                EscalationRule::new(-60, Channel::Notification, Strength::Gentle),
                EscalationRule::new(0, Channel::FullScreen, Strength::Critical),
            ])
            .with_checklist(vec![
                ChecklistItem::new("collect numbers"),
                ChecklistItem::new("review draft"),
            ]),
        )
        .await?;

    // (D) Scheduler を起動
    let mut scheduler = Scheduler::new()
        .with_clock(engine.clock())
        .with_job(
            Arc::new(SweepJob::new(engine.clone())),
            config
                .cadence
                .period_of(SWEEP_JOB)
                .unwrap_or(std::time::Duration::from_secs(60)),
        );
    if config.briefing.any() {
        scheduler = scheduler.with_job(
            Arc::new(BriefingJob::new(engine.clone(), config.briefing.clone())),
            config
                .cadence
                .period_of(BRIEFING_JOB)
                .unwrap_or(DEFAULT_BRIEFING_PERIOD),
        );
    }
    let handle = scheduler.spawn();

    // (E) ユーザー操作
    let transition = engine.complete(medication.id).await?;
    info!(from = %transition.from, to = %transition.to, "medication completed");

    engine.snooze(report.id, now + Duration::minutes(30)).await?;
    let first_item = report.checklist.first().map(|item| item.id);
    if let Some(item) = first_item {
        engine.set_checklist_item(report.id, item, true).await?;
    }
    if let Err(err) = engine.snooze(rent.id, now + Duration::minutes(30)).await {
        // missed items cannot be snoozed
        info!(error = %err, "snooze rejected");
    }
    handle.trigger(SWEEP_JOB).await?;

    // (F) デモ期間 or Ctrl-C まで待って shutdown
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
        _ = tokio::time::sleep(DEMO_WINDOW) => {}
    }
    handle.shutdown_and_join().await;

    // (G) 結果を出力
    let mut emitted = Vec::new();
    while let Ok(event) = event_rx.try_recv() {
        emitted.push(event);
    }
    let summary = DemoSummary {
        user_id: user,
        status: engine.status().await?,
        pending_alerts: dispatcher.pending().await,
        events: emitted,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
