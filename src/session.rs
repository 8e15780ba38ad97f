// src/session.rs
// Per-user continuation tokens for stateful agent invocations. Pure map
// semantics: last write wins, cleared only by explicit user action. No TTL;
// entries live for the process lifetime (capacity note in DESIGN.md).

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct UserSession {
    pub token: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<i64, UserSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current continuation token for a user, if any.
    pub fn get(&self, user_id: i64) -> Option<String> {
        let map = self.inner.lock().expect("session mutex poisoned");
        let token = map.get(&user_id).map(|s| s.token.clone());
        match &token {
            // Tokens are opaque and may be non-ASCII; take a char-safe prefix.
            Some(t) => {
                debug!(user_id, token_prefix = %token_prefix(t), "session found");
            }
            None => debug!(user_id, "no session"),
        }
        token
    }

    /// Stores a token for a user, replacing any previous one.
    pub fn save(&self, user_id: i64, token: impl Into<String>) {
        let session = UserSession {
            token: token.into(),
            created_at: Utc::now(),
        };
        let mut map = self.inner.lock().expect("session mutex poisoned");
        map.insert(user_id, session);
        debug!(user_id, "session saved");
    }

    /// Removes a user's token. Returns whether one existed.
    pub fn clear(&self, user_id: i64) -> bool {
        let mut map = self.inner.lock().expect("session mutex poisoned");
        let existed = map.remove(&user_id).is_some();
        debug!(user_id, existed, "session cleared");
        existed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("session mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn token_prefix(token: &str) -> String {
    token.chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_get_roundtrips() {
        let store = SessionStore::new();
        store.save(42, "token-a");
        assert_eq!(store.get(42), Some("token-a".into()));
    }

    #[test]
    fn second_save_overwrites() {
        let store = SessionStore::new();
        store.save(42, "token-a");
        store.save(42, "token-b");
        assert_eq!(store.get(42), Some("token-b".into()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn multibyte_token_roundtrips_with_debug_logging() {
        // A token whose 8th byte falls inside a multi-byte char must not
        // panic the prefix logging on the read path.
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::sink)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            let store = SessionStore::new();
            store.save(1, "€€€");
            assert_eq!(store.get(1), Some("€€€".into()));
        });
    }

    #[test]
    fn token_prefix_is_char_safe() {
        assert_eq!(token_prefix("€€€"), "€€€");
        assert_eq!(token_prefix("abcdefghij"), "abcdefgh");
        assert_eq!(token_prefix(""), "");
    }

    #[test]
    fn clear_removes_only_that_user() {
        let store = SessionStore::new();
        store.save(1, "a");
        store.save(2, "b");
        assert!(store.clear(1));
        assert!(!store.clear(1));
        assert_eq!(store.get(1), None);
        assert_eq!(store.get(2), Some("b".into()));
    }
}
