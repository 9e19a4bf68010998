//! Capability manifest: the fixed list of tools advertised to the model.
//!
//! Loaded once at startup from a JSON file shaped like
//! `{ "tools": [ { "name", "description", "inputSchema" } ] }`. A missing
//! or malformed manifest leaves the assistant with no tools rather than
//! failing.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::Path;
use stratus_providers::Tool;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_input_schema")]
    pub input_schema: Value,
}

fn default_input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "command": {"type": "string"},
            "params": {"type": "object"}
        },
        "required": ["command"]
    })
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
    #[serde(default)]
    tools: Vec<ToolDescriptor>,
}

#[derive(Debug, Clone, Default)]
pub struct ToolManifest {
    tools: Vec<ToolDescriptor>,
}

impl ToolManifest {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        let mut seen = HashSet::new();
        let tools = tools
            .into_iter()
            .filter(|tool| {
                let fresh = seen.insert(tool.name.clone());
                if !fresh {
                    warn!("Duplicate tool '{}' in manifest; keeping the first", tool.name);
                }
                fresh
            })
            .collect();
        Self { tools }
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: ManifestFile = serde_json::from_str(content)?;
        Ok(Self::new(file.tools))
    }

    /// Load the manifest at `path`, degrading to an empty manifest
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            debug!("No tool manifest configured");
            return Self::empty();
        };

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Could not read tool manifest {}: {}", path.display(), e);
                return Self::empty();
            }
        };

        match Self::from_json(&content) {
            Ok(manifest) => {
                debug!(
                    "Loaded {} tools from {}",
                    manifest.tools.len(),
                    path.display()
                );
                manifest
            }
            Err(e) => {
                warn!("Malformed tool manifest {}: {}", path.display(), e);
                Self::empty()
            }
        }
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Descriptors in the shape providers send to the model
    pub fn to_provider_tools(&self) -> Vec<Tool> {
        self.tools
            .iter()
            .map(|t| Tool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect()
    }
}
