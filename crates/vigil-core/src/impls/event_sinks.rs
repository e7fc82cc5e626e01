//! EventSink implementations.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::DomainEvent;
use crate::ports::EventSink;

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: DomainEvent) {}
}

/// Writes events to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: DomainEvent) {
        match &event {
            DomainEvent::StatusChanged(t) => info!(
                responsibility_id = %t.id,
                from = %t.from,
                to = %t.to,
                rolled_over = t.rollover.is_some(),
                "status changed"
            ),
            DomainEvent::AlertRegistered { id, alert, token } => debug!(
                responsibility_id = %id,
                fire_at = %alert.fire_at,
                channel = %alert.channel,
                %token,
                "alert registered"
            ),
            DomainEvent::AlertCancelled { id, token } => {
                debug!(responsibility_id = %id, %token, "alert cancelled")
            }
            DomainEvent::DispatchFailed { id, reason, .. } => {
                warn!(responsibility_id = %id, %reason, "alert dispatch failed")
            }
        }
    }
}

/// Forwards events over an unbounded channel (e.g. to a UI task).
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<DomainEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::UnboundedSender<DomainEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DomainEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: DomainEvent) {
        if self.tx.send(event).is_err() {
            debug!("event channel closed, dropping event");
        }
    }
}
