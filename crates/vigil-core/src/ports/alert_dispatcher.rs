//! AlertDispatcher port - 通知配送（OS の通知 API は呼ばない）

use async_trait::async_trait;

use crate::domain::{AlertEvent, AlertToken, DispatchError, ResponsibilityId};

/// Notification-dispatch collaborator.
///
/// Alerts whose `fire_at` is already past are expected to fire immediately.
#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn register_alert(
        &self,
        id: ResponsibilityId,
        alert: AlertEvent,
    ) -> Result<AlertToken, DispatchError>;

    async fn cancel_alert(&self, token: &AlertToken) -> Result<(), DispatchError>;
}
