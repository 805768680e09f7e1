//! Tool Executor collaborator and the in-process registry the Tool Loop
//! consults by name.
//!
//! Generalized from a single "execute by name" entry point to a full
//! descriptor registry so the Tool Loop can look up a schema and
//! permission level before deciding whether to even ask the handler to
//! run.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use super::permission::PermissionLevel;

/// A tool's name, description, JSON-Schema-shaped parameters, and
/// permission level, as surfaced to a model and consulted by the Tool
/// Loop.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
    pub permission_level: PermissionLevel,
}

/// The Tool Executor collaborator: validates arguments before calling
/// the user-provided handler, then executes with a caller-applied
/// deadline.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn list(&self) -> Vec<ToolDescriptor>;

    /// Execute `name` with `args`. Implementations should validate `args`
    /// against their own schema before acting; the Tool Loop additionally
    /// validates against the registry's declared schema first.
    async fn execute(
        &self,
        name: &str,
        args: &serde_json::Value,
        deadline: Duration,
    ) -> Result<String, String>;
}

/// A simple in-process registry combining several `ToolExecutor`s behind
/// one name→descriptor map, so the Tool Loop has a single place to
/// resolve a call by name regardless of which concrete executor backs it.
pub struct ToolRegistry {
    executors: HashMap<String, std::sync::Arc<dyn ToolExecutor>>,
    descriptors: HashMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
            descriptors: HashMap::new(),
        }
    }

    pub fn register(&mut self, executor: std::sync::Arc<dyn ToolExecutor>) {
        for descriptor in executor.list() {
            self.executors.insert(descriptor.name.clone(), executor.clone());
            self.descriptors.insert(descriptor.name.clone(), descriptor);
        }
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.descriptors.get(name)
    }

    /// Force `name`'s permission level to `level`, overriding whatever its
    /// registering `ToolExecutor` declared. Used to apply a user's
    /// configured permission overrides after the registry is built from
    /// built-in tools. No-op if `name` isn't registered.
    pub fn override_permission(&mut self, name: &str, level: PermissionLevel) {
        if let Some(descriptor) = self.descriptors.get_mut(name) {
            descriptor.permission_level = level;
        }
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.descriptors.values().cloned().collect()
    }

    pub async fn execute(
        &self,
        name: &str,
        args: &serde_json::Value,
        deadline: Duration,
    ) -> Result<String, String> {
        let Some(executor) = self.executors.get(name) else {
            return Err("unknown_tool".to_string());
        };
        executor.execute(name, args, deadline).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
