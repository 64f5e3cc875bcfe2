//! TTL Manager Module
//!
//! Tracks per-key expiration through the injected metadata provider and
//! drives validation and cleanup. The manager never deletes entries
//! itself; cleanup only detects, deletion stays with the owning cache.

use tokio::task::JoinHandle;
use tracing::debug;

use crate::metadata::{current_timestamp_ms, MetadataProvider};

// == Manager Config ==
/// TTL manager configuration.
#[derive(Debug, Clone)]
pub struct TtlManagerConfig {
    /// Default TTL in milliseconds for keys added without one
    pub default_ttl_ms: u64,
    /// Whether the composing layer should run a periodic sweep (see
    /// `tasks::spawn_cleanup_task` and `attach_sweep`)
    pub auto_cleanup: bool,
    /// Sweep interval in milliseconds
    pub cleanup_interval_ms: u64,
    /// When false, validation always passes regardless of state. An
    /// explicit escape hatch for callers that handle staleness themselves.
    pub validate_on_access: bool,
}

impl Default for TtlManagerConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 300_000,
            auto_cleanup: false,
            cleanup_interval_ms: 1000,
            validate_on_access: true,
        }
    }
}

// == TTL Manager ==
/// Expiration tracking over an injected metadata provider.
#[derive(Debug)]
pub struct TtlManager {
    config: TtlManagerConfig,
    sweep_handle: Option<JoinHandle<()>>,
}

impl TtlManager {
    /// Creates a manager with the given configuration.
    pub fn new(config: TtlManagerConfig) -> Self {
        Self {
            config,
            sweep_handle: None,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TtlManagerConfig {
        &self.config
    }

    /// Stamps expiration on a freshly added key.
    ///
    /// `expires_at = added_at + (item_ttl ?? default_ttl)`; a no-op when
    /// neither value is positive, leaving the key without expiration.
    pub fn on_item_added(
        &self,
        key: &str,
        provider: &mut dyn MetadataProvider,
        item_ttl_ms: Option<u64>,
    ) {
        let ttl = item_ttl_ms.unwrap_or(self.config.default_ttl_ms);
        if ttl == 0 {
            return;
        }
        if let Some(meta) = provider.get_metadata(key) {
            let mut meta = meta.clone();
            meta.ttl = Some(ttl);
            meta.expires_at = Some(meta.added_at + ttl);
            provider.set_metadata(meta);
        }
    }

    /// Checks whether a key is expired: `now >= expires_at`.
    pub fn is_expired(&self, key: &str, provider: &dyn MetadataProvider) -> bool {
        provider
            .get_metadata(key)
            .and_then(|meta| meta.expires_at)
            .map(|expires| current_timestamp_ms() >= expires)
            .unwrap_or(false)
    }

    /// Validates a key for serving.
    ///
    /// With `validate_on_access` disabled every key validates, whatever
    /// its state.
    pub fn validate_item(&self, key: &str, provider: &dyn MetadataProvider) -> bool {
        if !self.config.validate_on_access {
            return true;
        }
        !self.is_expired(key, provider)
    }

    /// Full scan for expired keys. Detection only; the owning cache
    /// performs the deletions.
    pub fn find_expired_items(&self, provider: &dyn MetadataProvider) -> Vec<String> {
        let now = current_timestamp_ms();
        let mut expired: Vec<String> = provider
            .all_metadata()
            .into_iter()
            .filter(|(_, meta)| matches!(meta.expires_at, Some(at) if now >= at))
            .map(|(key, _)| key)
            .collect();
        expired.sort();
        expired
    }

    /// Pushes a key's expiration forward by a delta.
    ///
    /// Returns false (and changes nothing) when the key is unknown or no
    /// TTL was ever set for it.
    pub fn extend_ttl(
        &self,
        key: &str,
        provider: &mut dyn MetadataProvider,
        delta_ms: u64,
    ) -> bool {
        match provider.get_metadata(key) {
            Some(meta) if meta.expires_at.is_some() => {
                let mut meta = meta.clone();
                meta.expires_at = meta.expires_at.map(|at| at + delta_ms);
                provider.set_metadata(meta);
                true
            }
            _ => false,
        }
    }

    /// Recomputes a key's expiration from "now".
    ///
    /// `expires_at = now + (supplied_ttl ?? stored_ttl ?? default_ttl)`.
    /// Works on already-expired keys, which revives them.
    pub fn refresh_ttl(
        &self,
        key: &str,
        provider: &mut dyn MetadataProvider,
        ttl_ms: Option<u64>,
    ) -> bool {
        match provider.get_metadata(key) {
            Some(meta) => {
                let mut meta = meta.clone();
                let ttl = ttl_ms.or(meta.ttl).unwrap_or(self.config.default_ttl_ms);
                if ttl == 0 {
                    return false;
                }
                meta.ttl = Some(ttl);
                meta.expires_at = Some(current_timestamp_ms() + ttl);
                provider.set_metadata(meta);
                true
            }
            None => false,
        }
    }

    /// Attaches the handle of a spawned periodic sweep so `destroy` can
    /// stop it.
    pub fn attach_sweep(&mut self, handle: JoinHandle<()>) {
        self.destroy();
        self.sweep_handle = Some(handle);
    }

    /// Stops any periodic sweep. Idempotent; never blocks shutdown.
    pub fn destroy(&mut self) {
        if let Some(handle) = self.sweep_handle.take() {
            handle.abort();
            debug!("ttl sweep stopped");
        }
    }
}

impl Clone for TtlManager {
    /// Clones the configuration only; a clone never shares (or inherits)
    /// the original's periodic sweep.
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            sweep_handle: None,
        }
    }
}

impl Drop for TtlManager {
    fn drop(&mut self) {
        self.destroy();
    }
}
