//! InMemoryResponsibilityStore - 開発用・テスト用の永続化実装
//!
//! # 学習ポイント
//! - tokio::sync::Mutex でマップ全体を保護（ロックを跨いだ await はしない）
//! - updated_at 比較による last-writer-wins ガード
//! - compare_and_save: 読み込んだ行と一致する時だけ書く（楽観的ロック）

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::domain::{Responsibility, ResponsibilityId, StoreError, UserId};
use crate::ports::ResponsibilityStore;

#[derive(Default)]
pub struct InMemoryResponsibilityStore {
    rows: Mutex<HashMap<ResponsibilityId, Responsibility>>,
}

impl InMemoryResponsibilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed rows without the stale-write guard.
    pub async fn insert(&self, responsibility: Responsibility) {
        self.rows
            .lock()
            .await
            .insert(responsibility.id, responsibility);
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }
}

#[async_trait]
impl ResponsibilityStore for InMemoryResponsibilityStore {
    async fn load(&self, user_id: UserId) -> Result<Vec<Responsibility>, StoreError> {
        let rows = self.rows.lock().await;
        let mut owned: Vec<Responsibility> = rows
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by_key(|r| (r.schedule.datetime, r.id));
        Ok(owned)
    }

    async fn get(&self, id: ResponsibilityId) -> Result<Responsibility, StoreError> {
        self.rows
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn save(&self, responsibility: Responsibility) -> Result<Responsibility, StoreError> {
        let mut rows = self.rows.lock().await;
        if let Some(stored) = rows.get(&responsibility.id)
            && stored.updated_at > responsibility.updated_at
        {
            return Err(StoreError::StaleWrite(responsibility.id));
        }
        rows.insert(responsibility.id, responsibility.clone());
        Ok(responsibility)
    }

    async fn compare_and_save(
        &self,
        responsibility: Responsibility,
        expected: &Responsibility,
    ) -> Result<Responsibility, StoreError> {
        let mut rows = self.rows.lock().await;
        let stored = rows
            .get(&responsibility.id)
            .ok_or(StoreError::NotFound(responsibility.id))?;
        if stored != expected {
            return Err(StoreError::StaleWrite(responsibility.id));
        }
        rows.insert(responsibility.id, responsibility.clone());
        Ok(responsibility)
    }

    async fn delete(&self, id: ResponsibilityId) -> Result<(), StoreError> {
        self.rows
            .lock()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }
}
