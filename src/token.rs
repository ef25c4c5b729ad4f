//! Internal bearer-token cache for the Graph client.

use secrecy::SecretString;
use std::time::{Duration, Instant};

/// A cached token is refreshed once it is this close to expiry.
pub(crate) const REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Holds at most one access token together with its expiry instant.
///
/// Owned by [`GraphClient`](crate::GraphClient) behind a mutex; nothing else
/// reads or writes it.
#[derive(Default)]
pub(crate) struct TokenCache {
    cached: Option<CachedToken>,
}

struct CachedToken {
    value: SecretString,
    expires_at: Instant,
}

impl TokenCache {
    /// Returns the cached token if it stays valid beyond the refresh margin.
    pub(crate) fn fresh(&self, now: Instant) -> Option<&SecretString> {
        self.cached
            .as_ref()
            .filter(|token| now + REFRESH_MARGIN < token.expires_at)
            .map(|token| &token.value)
    }

    /// Replaces the cached token.
    pub(crate) fn store(&mut self, value: SecretString, expires_in: Duration, now: Instant) {
        self.cached = Some(CachedToken {
            value,
            expires_at: now + expires_in,
        });
    }

    /// Drops the cached token, forcing the next call to refresh.
    pub(crate) fn clear(&mut self) {
        self.cached = None;
    }
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("cached", &self.cached.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
