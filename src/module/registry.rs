//! Module registry for resolving modules by name

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::builtin::{AssertModule, CommandModule, MessageModule};
use super::Module;

/// Registry of all modules steps may bind to
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Arc<dyn Module>>,
}

impl ModuleRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in modules
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(MessageModule);
        registry.register(AssertModule);
        registry.register(CommandModule);
        registry
    }

    /// Registers a module, replacing any module with the same name
    pub fn register(&mut self, module: impl Module + 'static) {
        self.register_arc(Arc::new(module));
    }

    pub fn register_arc(&mut self, module: Arc<dyn Module>) {
        let name = module.name().to_string();
        debug!("Registering module: {}", name);
        self.modules.insert(name, module);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules.get(name).cloned()
    }

    /// Lists all registered module names
    pub fn names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }

    pub fn modules(&self) -> impl Iterator<Item = &Arc<dyn Module>> {
        self.modules.values()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_registered() {
        let registry = ModuleRegistry::with_defaults();
        assert_eq!(registry.names(), vec!["assert", "command", "message"]);
        assert!(registry.get("command").is_some());
        assert!(registry.get("claude").is_none());
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = ModuleRegistry::new();
        registry.register(MessageModule);
        registry.register(MessageModule);
        assert_eq!(registry.names().len(), 1);
    }
}
