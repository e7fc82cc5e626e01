//! vigil-core
//!
//! Responsibility lifecycle & escalation engine.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, responsibility, status, alerts, events, errors）
//! - **recurrence**: 繰り返しルールの解析と次回発生の計算（純粋）
//! - **escalation**: アラート計画と配送ポリシー（純粋）
//! - **lifecycle**: 状態遷移（StateMachine）
//! - **ports**: 抽象化レイヤー（ResponsibilityStore, AlertDispatcher, EventSink, Clock, IdGenerator）
//! - **impls**: 実装（InMemory 系など開発用）
//! - **app**: Sweeper, Engine, Scheduler
//! - **config**: TOML 設定

pub mod app;
pub mod config;
pub mod domain;
pub mod escalation;
pub mod impls;
pub mod lifecycle;
pub mod ports;
pub mod recurrence;

pub use app::{Engine, EngineBuilder, Scheduler, SweepReport, Sweeper};
pub use config::EngineConfig;
pub use domain::{EngineError, Responsibility, Status};
