//! ResponsibilityStore port - 永続化層（リモートのリレーショナルストア）の境界
//!
//! Engine はスナップショットを読み、変更したエンティティを書き戻すだけです。

use async_trait::async_trait;

use crate::domain::{Responsibility, ResponsibilityId, StoreError, UserId};

/// Persistence collaborator.
///
/// # Stale writes
/// `save` must reject an entity whose `updated_at` is older than the stored
/// copy with [`StoreError::StaleWrite`]; the caller reloads and retries.
///
/// `compare_and_save` is the optimistic form used for read-modify-write: it
/// only writes when the stored row is still exactly `expected` (the copy the
/// caller loaded), whatever the timestamps say. Otherwise it fails with
/// [`StoreError::StaleWrite`], or [`StoreError::NotFound`] when the row is gone.
#[async_trait]
pub trait ResponsibilityStore: Send + Sync {
    async fn load(&self, user_id: UserId) -> Result<Vec<Responsibility>, StoreError>;

    async fn get(&self, id: ResponsibilityId) -> Result<Responsibility, StoreError>;

    async fn save(&self, responsibility: Responsibility) -> Result<Responsibility, StoreError>;

    async fn compare_and_save(
        &self,
        responsibility: Responsibility,
        expected: &Responsibility,
    ) -> Result<Responsibility, StoreError>;

    async fn delete(&self, id: ResponsibilityId) -> Result<(), StoreError>;
}
