//! App - アプリケーション層
//!
//! ports を組み合わせてエンジンを動かします。
//!
//! # 主要コンポーネント
//! - **Sweeper**: 1 回の評価パス（純粋）と AlertLedger
//! - **Engine**: 単一ライターのドライバ（永続化・配送・イベント）
//! - **EngineBuilder**: 構築とワイヤリング
//! - **Scheduler**: 名前付き定期ジョブ（sweep, briefing, ...）
//! - **StatusCounts**: 状態ごとの件数

pub mod builder;
pub mod engine;
pub mod ledger;
pub mod scheduler;
pub mod status;
pub mod sweep;

pub use self::builder::{BuildError, EngineBuilder};
pub use self::engine::Engine;
pub use self::ledger::AlertLedger;
pub use self::scheduler::{
    BRIEFING_JOB, BriefingJob, JobOutcome, PeriodicJob, Scheduler, SchedulerCommand,
    SchedulerHandle, SweepJob,
};
pub use self::status::StatusCounts;
pub use self::sweep::{SweepFailure, SweepReport, SweepUnit, Sweeper};
