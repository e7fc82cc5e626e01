//! EngineBuilder - Engine の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）: store と dispatcher は必須

use std::sync::Arc;
use tokio::sync::Mutex;

use super::engine::Engine;
use super::sweep::Sweeper;
use crate::config::EngineConfig;
use crate::domain::UserId;
use crate::escalation::AlertPolicy;
use crate::impls::NoopEventSink;
use crate::lifecycle::{LifecyclePolicy, StateMachine};
use crate::ports::{AlertDispatcher, Clock, EventSink, ResponsibilityStore, SystemClock};

/// # 使用例
/// ```ignore
/// let engine = EngineBuilder::new(user_id)
///     .store(store)
///     .dispatcher(dispatcher)
///     .config(&config)
///     .build()?;
/// ```
pub struct EngineBuilder {
    user_id: UserId,
    store: Option<Arc<dyn ResponsibilityStore>>,
    dispatcher: Option<Arc<dyn AlertDispatcher>>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    lifecycle: LifecyclePolicy,
    alerts: AlertPolicy,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("engine needs a responsibility store")]
    MissingStore,
    #[error("engine needs an alert dispatcher")]
    MissingDispatcher,
}

impl EngineBuilder {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            store: None,
            dispatcher: None,
            events: Arc::new(NoopEventSink),
            clock: Arc::new(SystemClock),
            lifecycle: LifecyclePolicy::default_v1(),
            alerts: AlertPolicy::default_v1(),
        }
    }

    pub fn store(mut self, store: Arc<dyn ResponsibilityStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<dyn AlertDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn lifecycle_policy(mut self, policy: LifecyclePolicy) -> Self {
        self.lifecycle = policy;
        self
    }

    pub fn alert_policy(mut self, policy: AlertPolicy) -> Self {
        self.alerts = policy;
        self
    }

    /// Take both policies from configuration.
    pub fn config(self, config: &EngineConfig) -> Self {
        self.lifecycle_policy(config.lifecycle_policy())
            .alert_policy(config.alert_policy())
    }

    pub fn build(self) -> Result<Engine, BuildError> {
        let store = self.store.ok_or(BuildError::MissingStore)?;
        let dispatcher = self.dispatcher.ok_or(BuildError::MissingDispatcher)?;
        Ok(Engine {
            user_id: self.user_id,
            store,
            dispatcher,
            events: self.events,
            clock: self.clock,
            sweeper: Mutex::new(Sweeper::new(StateMachine::new(self.lifecycle), self.alerts)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryAlertDispatcher, InMemoryResponsibilityStore};

    #[test]
    fn build_requires_store_and_dispatcher() {
        let user = UserId::random();
        assert_eq!(
            EngineBuilder::new(user).build().err(),
            Some(BuildError::MissingStore)
        );
        assert_eq!(
            EngineBuilder::new(user)
                .store(Arc::new(InMemoryResponsibilityStore::new()))
                .build()
                .err(),
            Some(BuildError::MissingDispatcher)
        );
    }

    #[test]
    fn build_succeeds_with_collaborators() {
        let engine = EngineBuilder::new(UserId::random())
            .store(Arc::new(InMemoryResponsibilityStore::new()))
            .dispatcher(Arc::new(InMemoryAlertDispatcher::new()))
            .config(&EngineConfig::default())
            .build();
        assert!(engine.is_ok());
    }
}
