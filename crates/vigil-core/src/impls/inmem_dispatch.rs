//! InMemoryAlertDispatcher - 開発用の通知配送
//!
//! 登録されたアラートを保持するだけ。`fail_next` で配送失敗を注入できます。

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::domain::{AlertEvent, AlertToken, DispatchError, ResponsibilityId};
use crate::ports::AlertDispatcher;

/// Registered alert, as stored under its sequence number.
type PendingAlert = (AlertToken, ResponsibilityId, AlertEvent);

#[derive(Default)]
struct DispatchState {
    next_seq: u64,
    pending: BTreeMap<u64, PendingAlert>,
    cancelled: Vec<AlertToken>,
    failures_to_inject: u32,
}

#[derive(Default)]
pub struct InMemoryAlertDispatcher {
    state: Mutex<DispatchState>,
}

impl InMemoryAlertDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` registrations fail.
    pub async fn fail_next(&self, n: u32) {
        self.state.lock().await.failures_to_inject = n;
    }

    /// Currently registered alerts, in registration order.
    pub async fn pending(&self) -> Vec<(ResponsibilityId, AlertEvent)> {
        self.state
            .lock()
            .await
            .pending
            .values()
            .map(|(_, owner, alert)| (*owner, *alert))
            .collect()
    }

    pub async fn pending_for(&self, id: ResponsibilityId) -> Vec<AlertEvent> {
        self.state
            .lock()
            .await
            .pending
            .values()
            .filter(|(_, owner, _)| *owner == id)
            .map(|(_, _, alert)| *alert)
            .collect()
    }

    pub async fn cancelled(&self) -> Vec<AlertToken> {
        self.state.lock().await.cancelled.clone()
    }
}

#[async_trait]
impl AlertDispatcher for InMemoryAlertDispatcher {
    async fn register_alert(
        &self,
        id: ResponsibilityId,
        alert: AlertEvent,
    ) -> Result<AlertToken, DispatchError> {
        let mut state = self.state.lock().await;
        if state.failures_to_inject > 0 {
            state.failures_to_inject -= 1;
            return Err(DispatchError("injected failure".into()));
        }
        state.next_seq += 1;
        let seq = state.next_seq;
        let token = AlertToken::new(format!("alert-{seq}"));
        state.pending.insert(seq, (token.clone(), id, alert));
        Ok(token)
    }

    /// Cancelling an unknown token is a no-op (it may already have fired).
    async fn cancel_alert(&self, token: &AlertToken) -> Result<(), DispatchError> {
        let mut state = self.state.lock().await;
        let seq = state
            .pending
            .iter()
            .find(|(_, (registered, _, _))| registered == token)
            .map(|(seq, _)| *seq);
        if let Some(seq) = seq {
            state.pending.remove(&seq);
            state.cancelled.push(token.clone());
        }
        Ok(())
    }
}
