//! One-in-flight-per-key cancellation registry.
//!
//! Starting a new operation for a key cancels and replaces any prior token
//! for that key, so for a single key the most recently initiated request
//! always wins. Different keys proceed concurrently; there is no global
//! serialization.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

use crate::query::QueryKey;

#[derive(Default)]
pub(crate) struct InFlightRegistry {
    active: Mutex<HashMap<QueryKey, CancellationToken>>,
}

impl InFlightRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a new operation for `key`, cancelling any prior one.
    ///
    /// The predecessor is cancelled while the map lock is still held, so a
    /// token is never simultaneously uncancelled and unregistered.
    pub(crate) fn begin(&self, key: &QueryKey) -> CancellationToken {
        let token = CancellationToken::new();
        if let Ok(mut map) = self.active.lock()
            && let Some(stale) = map.insert(key.clone(), token.clone())
        {
            tracing::debug!("superseding in-flight fetch for {key}");
            stale.cancel();
        }
        token
    }

    /// Unregisters `token` for `key`.
    ///
    /// Only the registry ever cancels these tokens, and `begin` cancels a
    /// predecessor under the same lock that replaces it, so an uncancelled
    /// token is necessarily still the registered one; a cancelled token has
    /// been superseded and must leave its successor's registration alone.
    pub(crate) fn finish(&self, key: &QueryKey, token: &CancellationToken) {
        if token.is_cancelled() {
            return;
        }
        if let Ok(mut map) = self.active.lock() {
            map.remove(key);
        }
    }
}
