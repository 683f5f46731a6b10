//! Local Registry (C2): a thread-safe name -> tool map with backend filtering.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::tool::Tool;

/// In-memory, reader/writer-locked `name -> Tool` map.
///
/// `list_by_backend(tag)` returns tools whose backend equals `tag` OR is
/// empty: an empty backend tag is deliberately treated as universally
/// compatible ("agnostic tools match every backend"). This is surprising
/// but specified behavior, not a bug.
#[derive(Default)]
pub struct LocalRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl LocalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, replacing any existing tool under the same name.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        let mut tools = self.tools.write().expect("registry lock poisoned");
        if tools.contains_key(&name) {
            warn!(tool = %name, "overwriting previously registered tool");
        }
        tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().expect("registry lock poisoned").get(name).cloned()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.tools.read().expect("registry lock poisoned").contains_key(name)
    }

    pub fn list(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.read().expect("registry lock poisoned").values().cloned().collect()
    }

    pub fn list_by_backend(&self, tag: &str) -> Vec<Arc<dyn Tool>> {
        self.tools
            .read()
            .expect("registry lock poisoned")
            .values()
            .filter(|t| t.backend().is_empty() || t.backend() == tag)
            .cloned()
            .collect()
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.write().expect("registry lock poisoned").remove(name)
    }

    pub fn count(&self) -> usize {
        self.tools.read().expect("registry lock poisoned").len()
    }
}
