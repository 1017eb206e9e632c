//! Tool catalog: discoverable specs for everything agents can do.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One callable tool, described well enough for a decision step to pick it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Fully-qualified name, `namespace:tool` for namespaced executors.
    pub name: String,
    pub description: String,
    /// JSON schema of the parameter object.
    pub parameters: Value,
    /// Meta tools operate on the agent itself (catalog, memory) rather than
    /// on the world.
    #[serde(default)]
    pub is_meta: bool,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            is_meta: false,
        }
    }

    pub fn meta(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            is_meta: true,
            ..Self::new(name, description, parameters)
        }
    }

    /// Build a spec whose parameter schema is derived from a type.
    pub fn from_schema<P: JsonSchema>(
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let schema = schemars::schema_for!(P);
        let parameters = serde_json::to_value(schema.schema).unwrap_or(Value::Null);
        Self::new(name, description, parameters)
    }
}

/// Searchable collection of [`ToolSpec`]s.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    // BTreeMap keeps listings in a stable order.
    specs: BTreeMap<String, ToolSpec>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: ToolSpec) {
        self.specs.insert(spec.name.clone(), spec);
    }

    pub fn extend(&mut self, specs: impl IntoIterator<Item = ToolSpec>) {
        for spec in specs {
            self.register(spec);
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.specs.get(name)
    }

    /// Case-insensitive keyword search over names and descriptions.
    pub fn search(&self, query: &str) -> Vec<&ToolSpec> {
        let needle = query.to_lowercase();
        self.specs
            .values()
            .filter(|spec| {
                spec.name.to_lowercase().contains(&needle)
                    || spec.description.to_lowercase().contains(&needle)
            })
            .collect()
    }

    pub fn list(&self) -> impl Iterator<Item = &ToolSpec> {
        self.specs.values()
    }

    /// One `name: description` line per tool, for injection into prompts.
    pub fn render_listing(&self) -> String {
        self.specs
            .values()
            .map(|spec| format!("- {}: {}", spec.name, spec.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
