//! Read-only view of the simulation world.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Component tag carried by every building entity. Its value holds a
/// `"type"` string and an optional `"complete"` flag.
pub const BUILDING: &str = "building";
/// Component tag for buildings that hold items, as `{"items": {name: qty}}`.
pub const STORAGE: &str = "storage";
/// Component tag for agents, as `{"behavior": str, "skills": {name: level}}`.
pub const AGENT: &str = "agent";

pub type EntityId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub components: HashMap<String, serde_json::Value>,
}

impl EntitySnapshot {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            components: HashMap::new(),
        }
    }

    pub fn with_component(mut self, tag: impl Into<String>, value: serde_json::Value) -> Self {
        self.components.insert(tag.into(), value);
        self
    }

    pub fn component(&self, tag: &str) -> Option<&serde_json::Value> {
        self.components.get(tag)
    }

    pub fn has(&self, tag: &str) -> bool {
        self.components.contains_key(tag)
    }

    pub(crate) fn component_str(&self, tag: &str, field: &str) -> Option<&str> {
        self.component(tag)?.get(field)?.as_str()
    }
}

/// Query facade over the entity store.
pub trait WorldQuery: Send + Sync {
    /// Every entity carrying all of `tags`.
    fn entities_with(&self, tags: &[&str]) -> Vec<EntitySnapshot>;
}
