//! EventSink port - ドメインイベントの通知先

use crate::domain::DomainEvent;

/// Receives state-change and alert events.
///
/// Sinks must not block; delivery is best-effort.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DomainEvent);
}
