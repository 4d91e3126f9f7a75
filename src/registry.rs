use std::collections::HashMap;
use std::sync::Arc;

use crate::handler::TaskHandler;

/// Maps task type names to their executors.
///
/// Built during startup, then shared read-only with every worker; no locks
/// are needed at dispatch time. Registering a name twice keeps the latest
/// handler.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under a task type name.
    pub fn register(&mut self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(task_type.into(), handler);
    }

    /// Looks up the handler for a task type.
    pub fn get(&self, task_type: &str) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(task_type)
    }

    /// The registered task type names.
    pub fn task_types(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    /// The number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("task_types", &self.task_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct OkHandler;

    #[async_trait]
    impl TaskHandler for OkHandler {
        async fn execute(&self, _payload: &[u8]) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn lookup_follows_registration() {
        let mut registry = HandlerRegistry::new();
        assert!(registry.is_empty());

        registry.register("ok", Arc::new(OkHandler));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("ok").is_some());
        assert!(registry.get("missing").is_none());
    }
}
