//! AlertLedger - 登録済みアラートの台帳
//!
//! (responsibility id, fire time, channel) ごとに 1 件だけ登録する。
//! トークンは dispatcher が返した後に bind される（それまでは `None`）。

use std::collections::{BTreeMap, HashMap};

use crate::domain::{AlertKey, AlertToken, ResponsibilityId};

pub(crate) type LedgerEntry = BTreeMap<AlertKey, Option<AlertToken>>;

#[derive(Debug, Default)]
pub struct AlertLedger {
    entries: HashMap<ResponsibilityId, LedgerEntry>,
}

impl AlertLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: ResponsibilityId, key: &AlertKey) -> bool {
        self.entries
            .get(&id)
            .is_some_and(|entry| entry.contains_key(key))
    }

    pub fn token(&self, id: ResponsibilityId, key: &AlertKey) -> Option<&AlertToken> {
        self.entries.get(&id)?.get(key)?.as_ref()
    }

    /// Registered keys of one responsibility, in fire-time order.
    pub fn keys(&self, id: ResponsibilityId) -> Vec<AlertKey> {
        self.entries
            .get(&id)
            .map(|entry| entry.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Total number of tracked alerts.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bind_token(&mut self, id: ResponsibilityId, key: AlertKey, token: AlertToken) {
        self.entries.entry(id).or_default().insert(key, Some(token));
    }

    /// Drop one key so the next sweep plans it again.
    pub fn forget(&mut self, id: ResponsibilityId, key: &AlertKey) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.remove(key);
            if entry.is_empty() {
                self.entries.remove(&id);
            }
        }
    }

    pub(crate) fn ids(&self) -> Vec<ResponsibilityId> {
        let mut ids: Vec<_> = self.entries.keys().copied().collect();
        ids.sort();
        ids
    }

    pub(crate) fn entry(&self, id: ResponsibilityId) -> LedgerEntry {
        self.entries.get(&id).cloned().unwrap_or_default()
    }

    pub(crate) fn replace(&mut self, id: ResponsibilityId, entry: LedgerEntry) {
        if entry.is_empty() {
            self.entries.remove(&id);
        } else {
            self.entries.insert(id, entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Channel;
    use chrono::Utc;

    #[test]
    fn bind_and_forget() {
        let mut ledger = AlertLedger::new();
        let id = ResponsibilityId::random();
        let key = AlertKey {
            fire_at: Utc::now(),
            channel: Channel::Notification,
        };

        ledger.bind_token(id, key, AlertToken::new("t-1"));
        assert!(ledger.contains(id, &key));
        assert_eq!(ledger.token(id, &key).map(AlertToken::as_str), Some("t-1"));
        assert_eq!(ledger.len(), 1);

        ledger.forget(id, &key);
        assert!(ledger.is_empty());
        assert!(ledger.ids().is_empty());
    }
}
