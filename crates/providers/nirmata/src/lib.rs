//! Nirmata-managed LLM proxy backend for kubeagent.

mod provider;
mod stream;
mod translate;
mod wire;

pub use provider::{NirmataChat, NirmataClient};

use std::sync::Arc;

use kubeagent_core::client::{Client, ClientOptions};
use kubeagent_core::error::LLMError;
use kubeagent_core::registry::register_provider;

pub const PROVIDER_NAME: &str = "nirmata";

/// Register this backend under `"nirmata"` in the process-wide provider
/// registry. Called once at process init (CLI `main`).
pub fn register() {
    register_provider(
        PROVIDER_NAME,
        Arc::new(|opts: &ClientOptions| -> Result<Arc<dyn Client>, LLMError> {
            Ok(Arc::new(NirmataClient::new(opts)?))
        }),
    );
}
