use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::transform::Transformer;

/// Produces a transformer instance, optionally parameterized by an options
/// blob from the config file (`["name", {...}]` chain entries).
pub type TransformerFactory = Arc<dyn Fn(Option<&Value>) -> anyhow::Result<Arc<dyn Transformer>> + Send + Sync>;

/// Holds every known transformer factory and caches the no-options instance
/// each one produces.
///
/// "Factory" and "instance" collapse naturally here into "the thing
/// registered is always a factory, and an instance is just what you get
/// from calling it" — there is no separate bare-instance registration path
/// to keep in sync.
#[derive(Default)]
pub struct TransformerRegistry {
    factories: DashMap<String, TransformerFactory>,
    default_instances: DashMap<String, Arc<dyn Transformer>>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, factory: TransformerFactory) {
        let name = name.into();
        self.default_instances.remove(&name);
        self.factories.insert(name, factory);
    }

    /// Instantiate `name` with the given options. Used by the provider
    /// registry when resolving a config-declared `use` chain entry.
    pub fn instantiate(&self, name: &str, options: Option<&Value>) -> anyhow::Result<Arc<dyn Transformer>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("unknown transformer '{name}'"))?;

        factory(options)
    }

    /// The no-options instance for `name`, created lazily and cached.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Transformer>> {
        if let Some(instance) = self.default_instances.get(name) {
            return Some(instance.clone());
        }

        let instance = self.instantiate(name, None).ok()?;
        self.default_instances.insert(name.to_string(), instance.clone());
        Some(instance)
    }

    pub fn remove(&self, name: &str) {
        self.factories.remove(name);
        self.default_instances.remove(name);
    }

    pub fn all(&self) -> Vec<Arc<dyn Transformer>> {
        self.factories.iter().filter_map(|entry| self.get(entry.key())).collect()
    }

    /// Transformers carrying an `end_point` — candidates for dispatcher routes.
    pub fn with_endpoint(&self) -> Vec<Arc<dyn Transformer>> {
        self.all().into_iter().filter(|t| t.end_point().is_some()).collect()
    }

    /// Transformers with no `end_point` — only usable inside `use` chains.
    pub fn without_endpoint(&self) -> Vec<Arc<dyn Transformer>> {
        self.all().into_iter().filter(|t| t.end_point().is_none()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait::async_trait]
    impl Transformer for Noop {
        fn name(&self) -> &str {
            "noop"
        }
    }

    struct WithEndpoint;

    #[async_trait::async_trait]
    impl Transformer for WithEndpoint {
        fn name(&self) -> &str {
            "with-endpoint"
        }
        fn end_point(&self) -> Option<&str> {
            Some("/v1/with-endpoint")
        }
    }

    fn factory_for<T: Transformer + Default + 'static>() -> TransformerFactory {
        Arc::new(|_options| Ok(Arc::new(T::default()) as Arc<dyn Transformer>))
    }

    impl Default for Noop {
        fn default() -> Self {
            Noop
        }
    }
    impl Default for WithEndpoint {
        fn default() -> Self {
            WithEndpoint
        }
    }

    #[test]
    fn separates_endpoint_and_non_endpoint_transformers() {
        let registry = TransformerRegistry::new();
        registry.register("noop", factory_for::<Noop>());
        registry.register("with-endpoint", factory_for::<WithEndpoint>());

        assert_eq!(registry.with_endpoint().len(), 1);
        assert_eq!(registry.without_endpoint().len(), 1);
    }

    #[test]
    fn unknown_transformer_instantiation_fails() {
        let registry = TransformerRegistry::new();
        assert!(registry.instantiate("missing", None).is_err());
    }
}
