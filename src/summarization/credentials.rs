//! Credential resolution: explicit argument first, then the config store, then table defaults.

use super::providers::find_spec;
use super::{ErrorKind, ProviderCredentials, SummaryError};
use crate::config::ConfigStore;
use crate::processing::sanitize::{sanitize_provider_name, sanitize_string};

/// Resolve the API key and model for `provider`.
///
/// Empty or whitespace-only explicit values count as absent. A missing key is terminal
/// ([`ErrorKind::MissingCredential`]) unless the provider is key-less. Providers outside the
/// built-in table (custom adapters) have no default model.
pub fn resolve_credentials(
    provider: &str,
    explicit_key: Option<&str>,
    explicit_model: Option<&str>,
    store: &dyn ConfigStore,
) -> Result<ProviderCredentials, SummaryError> {
    let name = sanitize_provider_name(provider);
    let spec = find_spec(&name);
    let keyless = spec.is_some_and(|spec| spec.keyless());

    let api_key = match sanitize_string(explicit_key.map(str::to_string)) {
        Some(key) => key,
        None => match sanitize_string(store.get("api_keys", &name)) {
            Some(key) => {
                tracing::debug!(provider = %name, "Using API key from config store");
                key
            }
            None if keyless => String::new(),
            None => {
                return Err(SummaryError::new(
                    ErrorKind::MissingCredential,
                    format!("no API key provided or configured for {name}"),
                )
                .with_provider(name));
            }
        },
    };

    let model = sanitize_string(explicit_model.map(str::to_string))
        .or_else(|| sanitize_string(store.get("models", &name)))
        .or_else(|| spec.map(|spec| spec.default_model.to_string()))
        .unwrap_or_default();

    Ok(ProviderCredentials { api_key, model })
}
