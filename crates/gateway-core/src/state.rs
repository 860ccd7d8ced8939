//! Shared application state handed to every axum handler.

use std::sync::Arc;

use config::Config;

use crate::registry::{ProviderRegistry, TransformerRegistry};

pub(crate) struct Inner {
    pub config: Config,
    pub providers: ProviderRegistry,
    pub transformers: TransformerRegistry,
    pub http_client: reqwest::Client,
}

/// Cheap to clone — every field lives behind the single inner `Arc`. Safe to
/// share across concurrently-running request tasks (registries use interior
/// mutability with read-many/write-one discipline).
#[derive(Clone)]
pub struct AppState(Arc<Inner>);

impl AppState {
    pub fn new(
        config: Config,
        providers: ProviderRegistry,
        transformers: TransformerRegistry,
        http_client: reqwest::Client,
    ) -> Self {
        Self(Arc::new(Inner {
            config,
            providers,
            transformers,
            http_client,
        }))
    }
}

impl std::ops::Deref for AppState {
    type Target = Inner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
