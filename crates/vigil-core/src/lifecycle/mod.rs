//! Lifecycle - 状態遷移の検証と適用

mod machine;

pub use self::machine::{ChecklistPolicy, LifecyclePolicy, StateMachine, UserAction};
