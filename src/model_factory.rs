//! C4 — Model Factory: caches LLM client instances keyed by `(model_id, hash(options))`.
//!
//! Grounded on `client_wrapper.rs`'s `ClientWrapper` trait and
//! `clients/openai.rs`'s constructor pattern. Instances are cheap handles to
//! remote services and live for the process lifetime once built (§4.4); the
//! cache uses double-checked init under a single lock, matching §5's
//! "concurrent-safe map with double-checked init per (model_id, options) key".

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::clients::openai::OpenAIClient;
use crate::clients::wrapper::ClientWrapper;
use crate::data::ModelOptions;

#[derive(Debug, Clone)]
pub enum ModelFactoryError {
    ProviderUnavailable(String),
    ModelUnknown(String),
    ToolBindingUnsupported(String),
}

impl fmt::Display for ModelFactoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFactoryError::ProviderUnavailable(msg) => write!(f, "provider unavailable: {}", msg),
            ModelFactoryError::ModelUnknown(id) => write!(f, "unknown model: {}", id),
            ModelFactoryError::ToolBindingUnsupported(id) => {
                write!(f, "model does not support tool binding: {}", id)
            }
        }
    }
}

impl Error for ModelFactoryError {}

fn options_hash(options: &ModelOptions) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    options.temperature.to_bits().hash(&mut hasher);
    options.max_tokens.hash(&mut hasher);
    hasher.finish()
}

/// Resolves a model ID string (e.g. `"gpt-4.1-nano"`) to credentials. The
/// spec only requires "a uniform capability"; a real deployment would plug in
/// a proper model registry here. This resolver recognizes the `gpt-*` family
/// against `OPENAI_API_KEY` and nothing else, by design -- see DESIGN.md.
fn resolve_provider(model_id: &str) -> Result<(&'static str, String), ModelFactoryError> {
    if model_id.starts_with("gpt-") || model_id.starts_with("o1") || model_id.starts_with("o3") || model_id.starts_with("o4") {
        let key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ModelFactoryError::ProviderUnavailable("OPENAI_API_KEY not set".into()))?;
        Ok(("openai", key))
    } else {
        Err(ModelFactoryError::ModelUnknown(model_id.to_string()))
    }
}

/// Process-wide cache of `Arc<dyn ClientWrapper>`, keyed by `(model_id, hash(options))`.
pub struct ModelFactory {
    cache: Mutex<HashMap<(String, u64), Arc<dyn ClientWrapper>>>,
}

impl ModelFactory {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Inject a pre-built client directly into the cache, bypassing provider
    /// resolution. Used by tests to seed a [`crate::clients::mock::SequentialMockClient`].
    pub async fn insert(&self, model_id: impl Into<String>, options: &ModelOptions, client: Arc<dyn ClientWrapper>) {
        let model_id = model_id.into();
        let key = (model_id, options_hash(options));
        self.cache.lock().await.insert(key, client);
    }

    pub async fn get(
        &self,
        model_id: &str,
        options: &ModelOptions,
    ) -> Result<Arc<dyn ClientWrapper>, ModelFactoryError> {
        let key = (model_id.to_string(), options_hash(options));

        {
            let cache = self.cache.lock().await;
            if let Some(client) = cache.get(&key) {
                return Ok(client.clone());
            }
        }

        let (provider, credential) = resolve_provider(model_id)?;
        let client: Arc<dyn ClientWrapper> = match provider {
            "openai" => Arc::new(OpenAIClient::new(credential, model_id)),
            _ => return Err(ModelFactoryError::ModelUnknown(model_id.to_string())),
        };

        let mut cache = self.cache.lock().await;
        // Double-checked: another task may have raced us while we built the client.
        let client = cache.entry(key).or_insert(client).clone();
        Ok(client)
    }
}

impl Default for ModelFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::mock::SequentialMockClient;

    #[tokio::test]
    async fn caches_by_model_and_options() {
        let factory = ModelFactory::new();
        let options = ModelOptions::default();
        factory
            .insert("mock-model", &options, Arc::new(SequentialMockClient::new("mock-model", vec![])))
            .await;

        let a = factory.get("mock-model", &options).await.unwrap();
        let b = factory.get("mock-model", &options).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn unknown_model_without_credentials_fails() {
        let factory = ModelFactory::new();
        let result = factory.get("totally-unknown-model", &ModelOptions::default()).await;
        assert!(matches!(result, Err(ModelFactoryError::ModelUnknown(_))));
    }
}
