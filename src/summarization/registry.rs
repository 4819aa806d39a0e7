//! Name-to-adapter dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::providers::{HttpAdapter, PROVIDERS, find_spec};
use super::{ErrorKind, ProviderAdapter, SummaryError};
use crate::config::ConfigStore;
use crate::processing::sanitize::sanitize_provider_name;

/// Shared, thread-safe adapter handle.
pub type SharedAdapter = Arc<dyn ProviderAdapter>;

/// Resolves provider names to adapters.
///
/// Table providers are built on demand from [`PROVIDERS`], with base URLs taken from the config
/// store's `endpoints` section when present. Adapters registered explicitly take precedence over
/// the table, which lets embedders plug in custom providers.
pub struct AdapterRegistry {
    store: Arc<dyn ConfigStore>,
    timeout: Duration,
    custom: HashMap<String, SharedAdapter>,
}

impl AdapterRegistry {
    /// Registry over the built-in table.
    pub fn new(store: Arc<dyn ConfigStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            custom: HashMap::new(),
        }
    }

    /// Register (or replace) an adapter under its own name.
    pub fn register(&mut self, adapter: SharedAdapter) {
        let name = sanitize_provider_name(adapter.name());
        self.custom.insert(name, adapter);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_adapter(mut self, adapter: SharedAdapter) -> Self {
        self.register(adapter);
        self
    }

    /// Look up the adapter for `name`, case-insensitively.
    pub fn get(&self, name: &str) -> Result<SharedAdapter, SummaryError> {
        let key = sanitize_provider_name(name);
        if let Some(adapter) = self.custom.get(&key) {
            return Ok(adapter.clone());
        }

        let spec = find_spec(&key).ok_or_else(|| {
            SummaryError::new(
                ErrorKind::UnsupportedProvider,
                format!("unknown provider '{}'", name.trim()),
            )
            .with_provider(key.clone())
        })?;
        let endpoint = self.store.get("endpoints", spec.name);
        if let Some(url) = endpoint.as_deref() {
            tracing::debug!(provider = spec.name, url, "Using endpoint override");
        }
        let adapter = HttpAdapter::new(spec, endpoint, self.timeout)?;
        Ok(Arc::new(adapter))
    }

    /// Every provider name this registry can dispatch to, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = PROVIDERS
            .iter()
            .map(|spec| spec.name.to_string())
            .chain(self.custom.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}
