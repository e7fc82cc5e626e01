//! Errors - エラー型と分類
//!
//! 各コンポーネントは自分のエラー型を返し、Engine 境界で [`EngineError`] にまとめます。
//! [`ErrorKind`] は運用上の分類（リトライすべきか）です。

use thiserror::Error;

use super::ids::ResponsibilityId;
use super::responsibility::InvariantViolation;
use super::state::Status;

/// ErrorKind は実行エラーの分類
///
/// - Transient: 次の sweep / リロードで解消しうる
/// - Permanent: 入力そのものが不正（リトライ無意味）
/// - Infrastructure: 永続化層・通知層の障害
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecurrenceError {
    /// The rule string cannot be parsed. Callers degrade the schedule to one-time.
    #[error("invalid recurrence rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    /// UNTIL/COUNT exhausted, or no candidate matched within the search horizon.
    #[error("recurrence rule has no occurrence after the given instant")]
    NoMoreOccurrences,
}

impl RecurrenceError {
    pub(crate) fn invalid(rule: &str, reason: impl Into<String>) -> Self {
        RecurrenceError::InvalidRule {
            rule: rule.to_string(),
            reason: reason.into(),
        }
    }
}

/// Guard violation. State is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot {action} a responsibility in status {from}")]
    InvalidTransition { from: Status, action: &'static str },

    #[error("checklist has {remaining} unfinished item(s)")]
    ChecklistIncomplete { remaining: usize },

    #[error("snooze target must be in the future")]
    SnoozeNotInFuture,

    #[error("checklist item not found")]
    UnknownChecklistItem,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("responsibility {0} not found")]
    NotFound(ResponsibilityId),

    /// The stored copy was updated more recently; reload and retry.
    #[error("stale write for {0}: stored copy is newer")]
    StaleWrite(ResponsibilityId),

    #[error("store backend: {0}")]
    Backend(String),
}

/// Alert registration/cancellation failed. Retried on the next sweep.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dispatch failure: {0}")]
pub struct DispatchError(pub String);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Crate-level error surfaced by the engine driver.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Recurrence(#[from] RecurrenceError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error("engine is shutting down")]
    ShuttingDown,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Recurrence(_)
            | EngineError::Transition(_)
            | EngineError::Config(_)
            | EngineError::Invariant(_) => ErrorKind::Permanent,
            EngineError::Store(StoreError::StaleWrite(_)) => ErrorKind::Transient,
            EngineError::Store(StoreError::NotFound(_)) => ErrorKind::Permanent,
            EngineError::Store(StoreError::Backend(_)) | EngineError::Dispatch(_) => {
                ErrorKind::Infrastructure
            }
            EngineError::ShuttingDown => ErrorKind::Transient,
        }
    }

    /// Worth retrying after a reload or on the next sweep.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Permanent)
    }
}
