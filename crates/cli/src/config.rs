//! Provider configuration resolution (§6 "CLI"): turns `--provider` plus the
//! backend-specific environment variables spec.md names into a
//! [`ClientOptions`]. Each provider crate interprets the options fields it
//! understands; this module only knows which env vars belong to which
//! provider name.

use kubeagent_core::client::ClientOptions;
use kubeagent_core::error::LLMError;

/// Reads the environment variables documented for `provider` in §6 into a
/// [`ClientOptions`]. Azure OpenAI and Gemini are named in spec.md's env var
/// list but have no backend crate in this workspace; `--provider azure` or
/// `--provider gemini` fails the same way an unregistered name would.
pub fn resolve_client_options(provider: &str) -> Result<ClientOptions, LLMError> {
    let mut opts = ClientOptions::default();
    match provider {
        "anthropic" => {
            opts.api_key = std::env::var("ANTHROPIC_API_KEY").ok();
            opts.base_url = std::env::var("ANTHROPIC_BASE_URL").ok();
            opts.model = std::env::var("ANTHROPIC_MODEL").ok();
        }
        "nirmata" => {
            opts.api_key = std::env::var("NIRMATA_APIKEY").ok();
            opts.base_url = std::env::var("NIRMATA_ENDPOINT").ok();
            opts.model = std::env::var("NIRMATA_MODEL").ok();
        }
        other => return Err(LLMError::UnknownProvider(other.to_string())),
    }
    Ok(opts)
}
