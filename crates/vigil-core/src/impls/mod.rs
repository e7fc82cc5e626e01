//! Impls - ports の開発用・テスト用実装
//!
//! # 含まれる実装
//! - **InMemoryResponsibilityStore**: メモリ上の正本
//! - **InMemoryAlertDispatcher**: 登録を記録するだけの配送
//! - **TracingEventSink / ChannelEventSink / NoopEventSink**
//!
//! 本番の永続化（リモート DB）と OS 通知はホストアプリが ports を実装します。

pub mod event_sinks;
pub mod inmem_dispatch;
pub mod inmem_store;

pub use self::event_sinks::{ChannelEventSink, NoopEventSink, TracingEventSink};
pub use self::inmem_dispatch::InMemoryAlertDispatcher;
pub use self::inmem_store::InMemoryResponsibilityStore;
