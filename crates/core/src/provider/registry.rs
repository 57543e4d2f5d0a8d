//! Lookup of adapters by id and by per-tool-kind default.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::info;

use crate::usage::UsageHandle;

use super::{HttpProviderAdapter, ProviderAdapter, ProviderConfig, ProviderError, ToolKind};

/// Adapters known to the process.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: BTreeMap<String, Arc<dyn ProviderAdapter>>,
    defaults: HashMap<ToolKind, String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build HTTP adapters for every configured provider.
    pub fn from_configs(
        configs: &[ProviderConfig],
        user_id: Option<&str>,
        usage: Option<UsageHandle>,
    ) -> Result<Self, ProviderError> {
        let mut registry = Self::new();
        for config in configs {
            let mut adapter = HttpProviderAdapter::new(config.clone())?;
            if let Some(user_id) = user_id {
                adapter = adapter.with_user_id(user_id);
            }
            if let Some(usage) = &usage {
                adapter = adapter.with_usage(usage.clone());
            }
            registry.register(Arc::new(adapter), config.is_default);
        }
        info!(providers = registry.adapters.len(), "Provider registry built");
        Ok(registry)
    }

    /// Add an adapter. The first default registered for a tool kind wins.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>, is_default: bool) {
        let id = adapter.provider_id().to_string();
        if is_default {
            self.defaults
                .entry(adapter.tool_kind())
                .or_insert_with(|| id.clone());
        }
        self.adapters.insert(id, adapter);
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>, is_default: bool) -> Self {
        self.register(adapter, is_default);
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(id).cloned()
    }

    pub fn default_for(&self, kind: ToolKind) -> Option<Arc<dyn ProviderAdapter>> {
        self.defaults.get(&kind).and_then(|id| self.get(id))
    }

    /// Explicit id first, then the configured id, then the tool kind default.
    ///
    /// Returns the id that was looked up when nothing matched.
    pub fn resolve(
        &self,
        explicit: Option<&str>,
        configured: Option<&str>,
        kind: ToolKind,
    ) -> Result<Arc<dyn ProviderAdapter>, String> {
        if let Some(id) = explicit.or(configured) {
            return self.get(id).ok_or_else(|| id.to_string());
        }
        self.default_for(kind)
            .ok_or_else(|| format!("default {} provider", kind))
    }

    pub fn ids(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
