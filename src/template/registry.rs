//! Named template lookup

use crate::error::{GreenGuardError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::PipelineTemplate;

/// Resolves a template identifier to a validated template
pub trait TemplateRegistry: Send + Sync {
    /// Resolve a template by name
    fn resolve(&self, name: &str) -> Result<Arc<PipelineTemplate>>;

    /// Names of all known templates
    fn names(&self) -> Vec<String>;
}

/// Template registry held in memory
#[derive(Debug, Default)]
pub struct InMemoryTemplateRegistry {
    templates: RwLock<HashMap<String, Arc<PipelineTemplate>>>,
}

impl InMemoryTemplateRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template under its own name, returning the previous one
    pub fn register(&self, template: PipelineTemplate) -> Option<Arc<PipelineTemplate>> {
        self.templates
            .write()
            .insert(template.name().to_string(), Arc::new(template))
    }
}

impl TemplateRegistry for InMemoryTemplateRegistry {
    fn resolve(&self, name: &str) -> Result<Arc<PipelineTemplate>> {
        self.templates
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| GreenGuardError::TemplateNotFound(name.to_string()))
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.templates.read().keys().cloned().collect();
        names.sort();
        names
    }
}
