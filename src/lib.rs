//! # Preview Native
//!
//! Live JSX preview pipeline for AI-generated templates.
//!
//! ## Components
//!
//! 1. **Source Normalizer** (`normalize`): repairs component source that
//!    went through JSON round-trips, double encoding or truncation, and
//!    appends a single render invocation. Never fails.
//!
//! 2. **Live Evaluation Sandbox** (`sandbox`): parses the normalized script
//!    with oxc and interprets it against a fixed scope (`React`, hooks,
//!    `EditableText`, `values`, `setValue`, safe globals). Produces a
//!    [`RenderedTree`] or a [`SandboxError`]; nothing escapes the boundary.
//!
//! 3. **Incompleteness Detector** (`detect`): advisory scan of the raw text
//!    for signs of truncation.
//!
//! ## Data Binding Contract
//!
//! Evaluated code reads the key/value mapping and writes only through the
//! mutator. The host owns the mapping, merges external updates into it in
//! place, and re-renders; the mapping keeps one identity for its whole life.
//!
//! ```text
//! raw source ──┬─> detect ──> warnings (banner)
//!              └─> normalize ──> sandbox ──> RenderedTree | ErrorDisplay
//! ```

#[cfg(feature = "napi")]
use napi_derive::napi;

mod braces;
mod builtins;
mod exports;
mod interpreter;
mod quotes;
mod scanner;
mod shield;
mod tables;
mod value;

pub mod cache;
pub mod detect;
pub mod error;
pub mod normalize;
pub mod options;
pub mod preview;
pub mod render;
pub mod sandbox;
pub mod scope;

#[cfg(test)]
mod normalize_tests;
#[cfg(test)]
mod sandbox_tests;

pub use cache::NormalizationCache;
pub use detect::{detect, DiagnosticWarning};
pub use error::{ErrorDisplay, SandboxError, SourceLocation};
pub use exports::ExportForm;
pub use normalize::{normalize, NormalizedScript, Normalizer};
pub use options::{NormalizeOptions, PreviewOptions, SandboxOptions};
pub use preview::{LivePreview, PreviewPhase, PreviewState};
pub use render::{AttributeValue, EditableNode, ElementNode, RenderAttribute, RenderNode, RenderedTree, TextNode};
pub use sandbox::{evaluate, Evaluation, Sandbox};
pub use scope::{Mutator, Scope, SyncReport, ValueStore};

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
fn options_from_json<T: serde::de::DeserializeOwned + Default>(
    options: Option<serde_json::Value>,
) -> napi::Result<T> {
    match options {
        Some(json) => serde_json::from_value(json).map_err(|e| napi::Error::from_reason(e.to_string())),
        None => Ok(T::default()),
    }
}

#[cfg(feature = "napi")]
#[napi]
pub fn normalize_native(
    source: String,
    options: Option<serde_json::Value>,
) -> napi::Result<serde_json::Value> {
    let options: NormalizeOptions = options_from_json(options)?;
    let script = Normalizer::new(options).run(&source);
    serde_json::to_value(script).map_err(|e| napi::Error::from_reason(e.to_string()))
}

#[cfg(feature = "napi")]
#[napi]
pub fn detect_incomplete_native(source: String) -> Vec<String> {
    detect(&source).iter().map(|w| w.to_string()).collect()
}

/// One-shot render: normalize, evaluate against `values`, and return the
/// preview state (tree, HTML, warnings, error display).
#[cfg(feature = "napi")]
#[napi]
pub fn render_preview_native(
    code: String,
    values: std::collections::HashMap<String, String>,
    options: Option<serde_json::Value>,
) -> napi::Result<serde_json::Value> {
    let options: PreviewOptions = options_from_json(options)?;
    let mut preview = LivePreview::new(options, Scope::detached(ValueStore::from_entries(values)));
    preview.set_code(&code);
    serde_json::to_value(preview.state()).map_err(|e| napi::Error::from_reason(e.to_string()))
}
