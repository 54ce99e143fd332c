//! Process-wide provider registry (§4.E): a `name -> factory` map populated
//! at process init, grounded on `querymt::providers::registry`'s
//! register/lookup pattern.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::client::{Client, ClientOptions};
use crate::error::LLMError;

/// Constructs a [`Client`] from options. Registered once per provider name
/// at process startup.
pub type ProviderFactory = Arc<dyn Fn(&ClientOptions) -> Result<Arc<dyn Client>, LLMError> + Send + Sync>;

fn registry() -> &'static RwLock<HashMap<String, ProviderFactory>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, ProviderFactory>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register a provider factory under `name`, overwriting any previous
/// registration (matches the teacher's idempotent-registration behavior,
/// useful for re-registering a provider with adjusted defaults in tests).
pub fn register_provider(name: impl Into<String>, factory: ProviderFactory) {
    registry()
        .write()
        .expect("provider registry lock poisoned")
        .insert(name.into(), factory);
}

/// Construct a client for `name`. Errors if no provider was registered
/// under that name.
pub fn new_client(name: &str, opts: &ClientOptions) -> Result<Arc<dyn Client>, LLMError> {
    let guard = registry().read().expect("provider registry lock poisoned");
    let factory = guard
        .get(name)
        .ok_or_else(|| LLMError::UnknownProvider(name.to_string()))?;
    factory(opts)
}

/// Names of all currently-registered providers.
pub fn provider_names() -> Vec<String> {
    registry()
        .read()
        .expect("provider registry lock poisoned")
        .keys()
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FakeClient;

    #[async_trait]
    impl Client for FakeClient {
        async fn initialize(
            &self,
            _model: &str,
            _system_prompt: Option<&str>,
            _history: Vec<crate::message::Message>,
        ) -> Result<Box<dyn crate::client::Chat>, LLMError> {
            unimplemented!("not exercised in this test")
        }
    }

    #[test]
    fn unknown_provider_errors() {
        let err = new_client("definitely-not-registered", &ClientOptions::default()).unwrap_err();
        assert!(matches!(err, LLMError::UnknownProvider(_)));
    }

    #[test]
    fn registered_provider_is_constructible() {
        register_provider("fake-core-test", Arc::new(|_opts| Ok(Arc::new(FakeClient) as Arc<dyn Client>)));
        let client = new_client("fake-core-test", &ClientOptions::default());
        assert!(client.is_ok());
        assert!(provider_names().contains(&"fake-core-test".to_string()));
    }
}
