//! Ports - 抽象化レイヤー
//!
//! Engine が依存する外部コラボレーターの trait です。
//! 永続化と通知配送の実装はホストアプリ側が持ちます（開発用の実装は `impls`）。

pub mod alert_dispatcher;
pub mod clock;
pub mod event_sink;
pub mod id_generator;
pub mod responsibility_store;

pub use self::alert_dispatcher::AlertDispatcher;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::EventSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::responsibility_store::ResponsibilityStore;
