//! Logged-out token list.
//!
//! Logout writes `blacklist:<token>` with a TTL matching the longest token
//! lifetime; authenticated requests look the token up. The list shares the
//! cache's failure semantics: with the cache down nothing is recorded and
//! every token reads as not revoked.

use std::time::Duration;

use crate::connection::ConnectionManager;
use crate::keys;

#[derive(Debug, Clone)]
pub struct TokenRevocations {
    connection: ConnectionManager,
    ttl: Duration,
}

/// Strip an optional `Bearer ` prefix.
pub fn bare_token(token: &str) -> &str {
    token.strip_prefix("Bearer ").unwrap_or(token).trim()
}

impl TokenRevocations {
    pub fn new(connection: ConnectionManager, ttl: Duration) -> Self {
        Self { connection, ttl }
    }

    /// Put `token` on the list. Returns `false` if the cache did not record it.
    pub async fn revoke(&self, token: &str) -> bool {
        let key = keys::revoked_token(bare_token(token));
        let stored = self.connection.client().set(&key, "1", self.ttl).await;
        if !stored {
            tracing::warn!("Token revocation not recorded, cache unavailable");
        }
        stored
    }

    pub async fn is_revoked(&self, token: &str) -> bool {
        let key = keys::revoked_token(bare_token(token));
        self.connection.client().get(&key).await.is_some()
    }
}
