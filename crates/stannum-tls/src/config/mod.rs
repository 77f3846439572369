//! Connection configuration with builder pattern.

use std::sync::{Arc, Mutex};

use crate::record::MAX_PLAINTEXT_LENGTH;
use crate::session::SessionCache;
use crate::TlsVersion;

/// Configuration shared by handshake connections.
#[derive(Clone)]
pub struct TlsConfig {
    /// Session cache; caching is enabled iff this is set.
    pub(crate) session_cache: Option<Arc<Mutex<dyn SessionCache>>>,
    /// Coalesce outgoing records between consecutive same-side messages.
    pub(crate) corked_io: bool,
    /// Whether the connection may manipulate the transport's cork state.
    pub(crate) managed_io: bool,
    /// Record protocol version stamped into outgoing record headers.
    pub(crate) version: TlsVersion,
    /// Maximum payload per outgoing record.
    pub(crate) max_fragment_size: usize,
}

impl TlsConfig {
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::default()
    }

    pub(crate) fn is_caching_enabled(&self) -> bool {
        self.session_cache.is_some()
    }
}

/// Builder for [`TlsConfig`].
pub struct TlsConfigBuilder {
    session_cache: Option<Arc<Mutex<dyn SessionCache>>>,
    corked_io: bool,
    managed_io: bool,
    version: TlsVersion,
    max_fragment_size: usize,
}

impl Default for TlsConfigBuilder {
    fn default() -> Self {
        Self {
            session_cache: None,
            corked_io: false,
            managed_io: true,
            version: TlsVersion::Tls12,
            max_fragment_size: MAX_PLAINTEXT_LENGTH,
        }
    }
}

impl TlsConfigBuilder {
    /// Enable session caching with the given cache.
    pub fn session_cache(mut self, cache: Arc<Mutex<dyn SessionCache>>) -> Self {
        self.session_cache = Some(cache);
        self
    }

    /// Enable send coalescing between consecutive same-side messages.
    pub fn corked_io(mut self, corked: bool) -> Self {
        self.corked_io = corked;
        self
    }

    /// Whether the connection owns the transport's cork state.
    pub fn managed_io(mut self, managed: bool) -> Self {
        self.managed_io = managed;
        self
    }

    /// Record protocol version for outgoing records.
    pub fn version(mut self, version: TlsVersion) -> Self {
        self.version = version;
        self
    }

    /// Maximum payload per outgoing record. Values above the RFC limit are
    /// clamped.
    pub fn max_fragment_size(mut self, size: usize) -> Self {
        self.max_fragment_size = size.clamp(1, MAX_PLAINTEXT_LENGTH);
        self
    }

    pub fn build(self) -> TlsConfig {
        TlsConfig {
            session_cache: self.session_cache,
            corked_io: self.corked_io,
            managed_io: self.managed_io,
            version: self.version,
            max_fragment_size: self.max_fragment_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::InMemorySessionCache;

    #[test]
    fn test_defaults() {
        let config = TlsConfig::builder().build();
        assert!(!config.is_caching_enabled());
        assert!(!config.corked_io);
        assert!(config.managed_io);
        assert_eq!(config.version, TlsVersion::Tls12);
        assert_eq!(config.max_fragment_size, MAX_PLAINTEXT_LENGTH);
    }

    #[test]
    fn test_builder_settings() {
        let cache: Arc<Mutex<dyn SessionCache>> =
            Arc::new(Mutex::new(InMemorySessionCache::new()));
        let config = TlsConfig::builder()
            .session_cache(cache)
            .corked_io(true)
            .version(TlsVersion::Tls10)
            .max_fragment_size(512)
            .build();
        assert!(config.is_caching_enabled());
        assert!(config.corked_io);
        assert_eq!(config.version, TlsVersion::Tls10);
        assert_eq!(config.max_fragment_size, 512);
    }

    #[test]
    fn test_fragment_size_clamped() {
        let config = TlsConfig::builder().max_fragment_size(1 << 20).build();
        assert_eq!(config.max_fragment_size, MAX_PLAINTEXT_LENGTH);
        let config = TlsConfig::builder().max_fragment_size(0).build();
        assert_eq!(config.max_fragment_size, 1);
    }
}
