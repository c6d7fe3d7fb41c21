//! Preview configuration.
//!
//! Options deserialize from camelCase JSON so the Node bridge can pass them
//! straight through; every field has a default.

use serde::{Deserialize, Serialize};

pub const DEFAULT_COMPONENT_NAME: &str = "Component";
pub const DEFAULT_MAPPING_NAME: &str = "values";
pub const DEFAULT_MUTATOR_NAME: &str = "setValue";
pub const DEFAULT_EDITABLE_NAME: &str = "EditableText";
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NormalizeOptions {
    /// Identifier used when no default export can be found.
    pub fallback_component: String,
    /// Name of the key/value mapping passed to the component.
    pub mapping_name: String,
    /// Name of the mutator passed to the component.
    pub mutator_name: String,
    /// Extra identifiers whose presence in an attribute expression shields it
    /// from quote normalization (the mapping and mutator always do).
    pub shield_identifiers: Vec<String>,
    /// Passes of whitespace collapsing between table tags.
    pub table_passes: usize,
    /// Emit development diagnostics through `log`.
    pub dev: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            fallback_component: DEFAULT_COMPONENT_NAME.to_string(),
            mapping_name: DEFAULT_MAPPING_NAME.to_string(),
            mutator_name: DEFAULT_MUTATOR_NAME.to_string(),
            shield_identifiers: Vec::new(),
            table_passes: 3,
            dev: cfg!(debug_assertions),
        }
    }
}

impl NormalizeOptions {
    pub fn shield_triggers(&self) -> Vec<&str> {
        let mut triggers = vec![self.mapping_name.as_str(), self.mutator_name.as_str()];
        triggers.extend(self.shield_identifiers.iter().map(|s| s.as_str()));
        triggers
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SandboxOptions {
    /// Name under which the editable-text primitive is exposed.
    pub editable_name: String,
    /// Maximum call depth before evaluation is aborted.
    pub max_call_depth: usize,
    /// Stack size in bytes of the thread evaluation runs on. Must leave
    /// room for `max_call_depth` nested calls in unoptimized builds.
    pub stack_size: usize,
    /// Include the normalized script in error displays.
    pub dev: bool,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            editable_name: DEFAULT_EDITABLE_NAME.to_string(),
            max_call_depth: 256,
            stack_size: DEFAULT_STACK_SIZE,
            dev: cfg!(debug_assertions),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreviewOptions {
    pub normalize: NormalizeOptions,
    pub sandbox: SandboxOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let opts: PreviewOptions =
            serde_json::from_str(r#"{"normalize":{"fallbackComponent":"Page"}}"#).unwrap();
        assert_eq!(opts.normalize.fallback_component, "Page");
        assert_eq!(opts.normalize.mapping_name, "values");
        assert_eq!(opts.normalize.table_passes, 3);
        assert_eq!(opts.sandbox.editable_name, "EditableText");
        assert_eq!(opts.sandbox.stack_size, DEFAULT_STACK_SIZE);
    }

    #[test]
    fn test_shield_triggers_include_names() {
        let mut opts = NormalizeOptions::default();
        opts.shield_identifiers.push("fields".to_string());
        assert_eq!(opts.shield_triggers(), vec!["values", "setValue", "fields"]);
    }
}
