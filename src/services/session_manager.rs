use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const TOKEN_LENGTH: usize = 32;

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub telegram_id: i64,
    pub expires_at: DateTime<Utc>,
}

/// Keyed in-memory session store.
///
/// Owns the token map behind a single lock instead of a bare package-level
/// map; every access goes through create/lookup/invalidate, and a periodic
/// sweep drops expired entries.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    pub async fn create(&self, user_id: i64, telegram_id: i64) -> Session {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect();

        let session = Session {
            token: token.clone(),
            user_id,
            telegram_id,
            expires_at: Utc::now() + self.ttl,
        };

        self.sessions.write().await.insert(token, session.clone());
        session
    }

    /// Resolve a token, treating expired entries as absent.
    pub async fn lookup(&self, token: &str) -> Option<Session> {
        let sessions = self.sessions.read().await;
        sessions
            .get(token)
            .filter(|session| session.expires_at > Utc::now())
            .cloned()
    }

    pub async fn invalidate(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    /// Drop expired sessions, returning how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at > now);
        before - sessions.len()
    }
}
