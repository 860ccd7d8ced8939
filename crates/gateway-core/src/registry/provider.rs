//! Provider registry (component B).
//!
//! Holds every configured upstream provider plus a model-route table keyed
//! by both `provider,model` and bare `model` (first registration wins the
//! bare key — see [`ProviderRegistry::register`]).

use std::sync::Arc;

use config::ProviderConfig;
use dashmap::DashMap;
use secrecy::SecretString;
use url::Url;

use crate::error::{GatewayError, Result};
use crate::registry::TransformerRegistry;
use crate::transform::Transformer;

/// A provider's own `use` chain plus any per-model chains, already resolved
/// to live transformer instances.
#[derive(Clone, Default)]
pub struct ProviderTransformers {
    pub use_chain: Vec<Arc<dyn Transformer>>,
    pub per_model: std::collections::HashMap<String, Vec<Arc<dyn Transformer>>>,
}

impl ProviderTransformers {
    /// The chain to run for `model`: provider-wide chain, then that model's
    /// own chain appended (pipeline step 3/6 ordering).
    pub fn chain_for(&self, model: &str) -> Vec<Arc<dyn Transformer>> {
        let mut chain = self.use_chain.clone();
        if let Some(extra) = self.per_model.get(model) {
            chain.extend(extra.iter().cloned());
        }
        chain
    }
}

#[derive(Clone)]
pub struct ProviderRecord {
    pub name: String,
    pub api_base_url: Url,
    pub api_key: SecretString,
    pub models: Vec<String>,
    pub transformers: ProviderTransformers,
    /// Tracked per the config/admin surface but never consulted by
    /// [`ProviderRegistry::resolve`] — see the `toggle` Open Question
    /// resolution in DESIGN.md.
    pub enabled: bool,
}

impl ProviderRecord {
    /// Build a record from its config entry, resolving `use` chain entries
    /// against `transformers`. Unknown transformer names are logged and
    /// skipped rather than aborting startup.
    pub fn from_config(config: &ProviderConfig, transformers: &TransformerRegistry) -> Self {
        let provider_name = config.name.clone();
        let resolve_chain = |specs: &[config::TransformerSpec], scope: &str| {
            specs
                .iter()
                .filter_map(|spec| match transformers.instantiate(spec.name(), spec.options()) {
                    Ok(instance) => Some(instance),
                    Err(err) => {
                        log::warn!(
                            "provider '{provider_name}' {scope}: skipping unknown transformer '{}': {err}",
                            spec.name()
                        );
                        None
                    }
                })
                .collect::<Vec<_>>()
        };

        let provider_transformers = match &config.transformer {
            Some(cfg) => ProviderTransformers {
                use_chain: resolve_chain(&cfg.use_chain, "use chain"),
                per_model: cfg
                    .per_model
                    .iter()
                    .map(|(model, model_cfg)| (model.clone(), resolve_chain(&model_cfg.use_chain, "per-model chain")))
                    .collect(),
            },
            None => ProviderTransformers::default(),
        };

        Self {
            name: config.name.clone(),
            api_base_url: config.api_base_url.clone(),
            api_key: config.api_key.clone(),
            models: config.models.clone(),
            transformers: provider_transformers,
            enabled: true,
        }
    }
}

#[derive(Clone)]
struct RouteTarget {
    provider: String,
    model: String,
}

/// Route table + provider table. Both are kept consistent by
/// register/update/delete rather than recomputed lazily, so `resolve` stays
/// a plain map lookup.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: DashMap<String, ProviderRecord>,
    routes: DashMap<String, RouteTarget>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn index_routes(&self, record: &ProviderRecord) {
        for model in &record.models {
            let full_key = format!("{},{}", record.name, model);
            self.routes.insert(
                full_key,
                RouteTarget {
                    provider: record.name.clone(),
                    model: model.clone(),
                },
            );
            self.routes.entry(model.clone()).or_insert(RouteTarget {
                provider: record.name.clone(),
                model: model.clone(),
            });
        }
    }

    fn deindex_routes(&self, name: &str) {
        self.routes.retain(|_, target| target.provider != name);
    }

    pub fn register(&self, record: ProviderRecord) -> Result<()> {
        if self.providers.contains_key(&record.name) {
            return Err(GatewayError::ProviderAlreadyExists(record.name));
        }

        self.index_routes(&record);
        self.providers.insert(record.name.clone(), record);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<ProviderRecord> {
        self.providers.get(name).map(|entry| entry.clone())
    }

    pub fn list(&self) -> Vec<ProviderRecord> {
        self.providers.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Replace a provider's record wholesale. Rebuilds the route table for
    /// it atomically — a model rename or removal never leaves a stale route
    /// behind.
    pub fn update(&self, record: ProviderRecord) -> Result<()> {
        if !self.providers.contains_key(&record.name) {
            return Err(GatewayError::ProviderNotFound(record.name));
        }

        self.deindex_routes(&record.name);
        self.index_routes(&record);
        self.providers.insert(record.name.clone(), record);
        Ok(())
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        if self.providers.remove(name).is_none() {
            return Err(GatewayError::ProviderNotFound(name.to_string()));
        }
        self.deindex_routes(name);
        Ok(())
    }

    /// Flip the `enabled` flag. Deliberately a no-op for routing purposes —
    /// `resolve` never consults it. Kept for the admin surface's contract
    /// (see the documented toggle bug below).
    pub fn toggle(&self, name: &str) -> Result<bool> {
        let mut entry = self
            .providers
            .get_mut(name)
            .ok_or_else(|| GatewayError::ProviderNotFound(name.to_string()))?;
        entry.enabled = !entry.enabled;
        Ok(entry.enabled)
    }

    /// Resolve a `provider,model` or bare `model` string to its provider and
    /// target model name.
    pub fn resolve(&self, requested: &str) -> Option<(ProviderRecord, String)> {
        let target = self.routes.get(requested)?;
        let provider = self.providers.get(&target.provider)?;
        Some((provider.clone(), target.model.clone()))
    }
}
