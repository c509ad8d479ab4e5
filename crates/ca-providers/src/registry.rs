//! Resolves role aliases (e.g. `"manager"`, `"fast"`) to a concrete
//! provider + wire model name, and hands callers the `LlmProvider` to use.

use std::collections::HashMap;
use std::sync::Arc;

use ca_domain::config::llm::LlmConfig;
use ca_domain::{Error, Result};

use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;

/// A resolved `(provider, wire model name)` pair for a role alias.
pub struct ResolvedModel {
    pub provider: Arc<dyn LlmProvider>,
    pub model: String,
}

impl std::fmt::Debug for ResolvedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedModel")
            .field("provider", &self.provider.provider_id())
            .field("model", &self.model)
            .finish()
    }
}

/// Builds providers from config and resolves role aliases against them.
///
/// Role aliases (`LlmConfig::roles`) are the only thing the rest of the
/// crate ever asks for by name; a role's `model` field is a
/// `"provider_id/model_name"` string that this registry splits and looks up.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    roles: HashMap<String, (String, String)>,
}

impl ProviderRegistry {
    /// Construct every configured provider eagerly, so a misconfigured
    /// `api_key_env` surfaces at startup rather than on the first turn.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        for provider_cfg in &cfg.providers {
            let provider = OpenAiCompatProvider::from_config(provider_cfg)?;
            providers.insert(provider_cfg.id.clone(), Arc::new(provider));
        }

        let mut roles = HashMap::new();
        for (alias, role) in &cfg.roles {
            let (provider_id, model) = split_model_ref(&role.model)?;
            roles.insert(alias.clone(), (provider_id, model));
        }

        Ok(Self { providers, roles })
    }

    /// Resolve a role alias (e.g. an agent's `model_alias`, or the
    /// orchestrator's `manager_model_alias`) to a provider and wire model.
    pub fn resolve(&self, alias: &str) -> Result<ResolvedModel> {
        let (provider_id, model) = self
            .roles
            .get(alias)
            .cloned()
            .ok_or_else(|| Error::UnknownModelAlias(alias.to_string()))?;

        let provider = self
            .providers
            .get(&provider_id)
            .cloned()
            .ok_or_else(|| Error::UnknownModelAlias(format!("{alias} -> {provider_id}")))?;

        Ok(ResolvedModel { provider, model })
    }
}

fn split_model_ref(model_ref: &str) -> Result<(String, String)> {
    model_ref
        .split_once('/')
        .map(|(p, m)| (p.to_string(), m.to_string()))
        .ok_or_else(|| {
            Error::Config(format!(
                "role model '{model_ref}' must be formatted as 'provider_id/model_name'"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_model_ref_valid() {
        let (provider, model) = split_model_ref("openrouter/gpt-4o").unwrap();
        assert_eq!(provider, "openrouter");
        assert_eq!(model, "gpt-4o");
    }

    #[test]
    fn split_model_ref_missing_slash() {
        let err = split_model_ref("gpt-4o").unwrap_err();
        assert!(err.to_string().contains("provider_id/model_name"));
    }

    #[test]
    fn resolve_unknown_alias() {
        let registry = ProviderRegistry {
            providers: HashMap::new(),
            roles: HashMap::new(),
        };
        let err = registry.resolve("missing").unwrap_err();
        assert!(matches!(err, Error::UnknownModelAlias(_)));
    }
}
