//! Host-side preview pipeline.
//!
//! `LivePreview` owns the scope and drives detector, normalizer and sandbox
//! on every source change:
//!
//! ```text
//! Idle -> Transforming -> Evaluating -> Rendered | Errored
//! ```
//!
//! Each new source restarts the pipeline synchronously; the latest call
//! always wins.

use serde::Serialize;

use crate::cache::NormalizationCache;
use crate::detect::{detect, DiagnosticWarning};
use crate::error::{ErrorDisplay, SandboxError};
use crate::normalize::{NormalizedScript, Normalizer};
use crate::options::PreviewOptions;
use crate::render::RenderedTree;
use crate::sandbox::Sandbox;
use crate::scope::{Scope, SyncReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PreviewPhase {
    Idle,
    Transforming,
    Evaluating,
    Rendered,
    Errored,
}

/// Serializable view of the preview for the embedding page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewState {
    pub phase: PreviewPhase,
    /// Bumped only when the normalized script changes; a host keeps the
    /// rendered subtree mounted while this stays the same.
    pub mount_generation: u64,
    pub tree: Option<RenderedTree>,
    pub html: Option<String>,
    pub warnings: Vec<DiagnosticWarning>,
    pub error: Option<ErrorDisplay>,
}

pub struct LivePreview {
    options: PreviewOptions,
    normalizer: Normalizer,
    sandbox: Sandbox,
    cache: NormalizationCache,
    scope: Scope,
    phase: PreviewPhase,
    script: Option<NormalizedScript>,
    tree: Option<RenderedTree>,
    error: Option<SandboxError>,
    warnings: Vec<DiagnosticWarning>,
    warnings_dismissed: bool,
    mount_generation: u64,
    deferred_edits: Vec<(String, String)>,
}

impl LivePreview {
    pub fn new(options: PreviewOptions, scope: Scope) -> Self {
        Self {
            normalizer: Normalizer::new(options.normalize.clone()),
            sandbox: Sandbox::new(options.sandbox.clone()),
            options,
            cache: NormalizationCache::default(),
            scope,
            phase: PreviewPhase::Idle,
            script: None,
            tree: None,
            error: None,
            warnings: Vec::new(),
            warnings_dismissed: false,
            mount_generation: 0,
            deferred_edits: Vec::new(),
        }
    }

    /// Run the whole pipeline on new source text.
    pub fn set_code(&mut self, code: &str) -> PreviewPhase {
        self.phase = PreviewPhase::Transforming;

        self.warnings = detect(code);
        self.warnings_dismissed = false;
        for warning in &self.warnings {
            log::warn!("[PreviewNative] {}", warning);
        }

        let script = self.cache.get_or_normalize(&self.normalizer, code);
        let changed = self
            .script
            .as_ref()
            .map(|previous| previous.code != script.code)
            .unwrap_or(true);
        if changed {
            self.mount_generation += 1;
        }
        self.script = Some(script);

        self.evaluate()
    }

    /// Merge the latest external values into the scope, then re-render
    /// without remounting.
    pub fn sync_values<K, V>(&mut self, latest: impl IntoIterator<Item = (K, V)>) -> SyncReport
    where
        K: Into<String>,
        V: Into<String>,
    {
        let report = self.scope.sync_values(latest);
        if !report.is_empty() && self.script.is_some() {
            self.evaluate();
        }
        report
    }

    /// Forward an edit made in the rendered output to the host mutator.
    pub fn apply_edit(&mut self, key: &str, text: &str) {
        self.scope.set_value(key, text);
    }

    fn evaluate(&mut self) -> PreviewPhase {
        let Some(script) = &self.script else {
            self.phase = PreviewPhase::Idle;
            return self.phase;
        };
        self.phase = PreviewPhase::Evaluating;

        match self.sandbox.evaluate(script, &self.scope) {
            Ok(evaluation) => {
                self.tree = Some(evaluation.tree);
                self.deferred_edits = evaluation.deferred_edits;
                self.error = None;
                self.phase = PreviewPhase::Rendered;
            }
            Err(err) => {
                log::warn!("[PreviewNative] {}", err);
                self.tree = None;
                self.deferred_edits.clear();
                self.error = Some(err);
                self.phase = PreviewPhase::Errored;
            }
        }
        self.phase
    }

    pub fn phase(&self) -> PreviewPhase {
        self.phase
    }

    pub fn mount_generation(&self) -> u64 {
        self.mount_generation
    }

    pub fn tree(&self) -> Option<&RenderedTree> {
        self.tree.as_ref()
    }

    pub fn script(&self) -> Option<&NormalizedScript> {
        self.script.as_ref()
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn options(&self) -> &PreviewOptions {
        &self.options
    }

    pub fn cache(&self) -> &NormalizationCache {
        &self.cache
    }

    /// `setValue` calls the last render attempted.
    pub fn deferred_edits(&self) -> &[(String, String)] {
        &self.deferred_edits
    }

    /// Active banner warnings; empty once dismissed.
    pub fn warnings(&self) -> &[DiagnosticWarning] {
        if self.warnings_dismissed {
            &[]
        } else {
            &self.warnings
        }
    }

    pub fn dismiss_warnings(&mut self) {
        self.warnings_dismissed = true;
    }

    pub fn error(&self) -> Option<&SandboxError> {
        self.error.as_ref()
    }

    pub fn error_display(&self) -> Option<ErrorDisplay> {
        let error = self.error.as_ref()?;
        let code = self.script.as_ref().map(|s| s.code.as_str()).unwrap_or("");
        Some(ErrorDisplay::new(error, code, self.options.sandbox.dev))
    }

    pub fn state(&self) -> PreviewState {
        PreviewState {
            phase: self.phase,
            mount_generation: self.mount_generation,
            tree: self.tree.clone(),
            html: self.tree.as_ref().map(|t| t.to_html()),
            warnings: self.warnings().to_vec(),
            error: self.error_display(),
        }
    }
}

impl std::fmt::Debug for LivePreview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivePreview")
            .field("phase", &self.phase)
            .field("mount_generation", &self.mount_generation)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
