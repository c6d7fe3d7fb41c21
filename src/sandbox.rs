//! Live Evaluation Sandbox
//!
//! Parses a normalized script with oxc, checks it for early errors, and
//! interprets it against the scope. Every failure is caught here and comes
//! back as a [`SandboxError`]; evaluation never panics the host.

use oxc_allocator::Allocator;
use oxc_diagnostics::OxcDiagnostic;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;

use crate::builtins::install_globals;
use crate::error::{SandboxError, SourceLocation};
use crate::interpreter::Interpreter;
use crate::normalize::NormalizedScript;
use crate::options::SandboxOptions;
use crate::render::RenderedTree;
use crate::scope::Scope;
use crate::value::{Env, Value};

/// Successful evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub tree: RenderedTree,
    /// `setValue` calls made while rendering. Recorded, never applied.
    pub deferred_edits: Vec<(String, String)>,
}

/// Evaluate with default options.
pub fn evaluate(script: &NormalizedScript, scope: &Scope) -> Result<RenderedTree, SandboxError> {
    Sandbox::default()
        .evaluate(script, scope)
        .map(|evaluation| evaluation.tree)
}

#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    options: SandboxOptions,
}

impl Sandbox {
    pub fn new(options: SandboxOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SandboxOptions {
        &self.options
    }

    /// Evaluate on a dedicated thread sized by `SandboxOptions::stack_size`,
    /// so deep recursion in the script hits the call-depth guard instead of
    /// the end of the host's stack.
    pub fn evaluate(
        &self,
        script: &NormalizedScript,
        scope: &Scope,
    ) -> Result<Evaluation, SandboxError> {
        let entries: Vec<(String, String)> = scope
            .values()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let outcome = std::thread::scope(|s| {
            std::thread::Builder::new()
                .name("preview-sandbox".to_string())
                .stack_size(self.options.stack_size)
                .spawn_scoped(s, || self.evaluate_entries(script, &entries))
                .map(|handle| handle.join())
        });

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SandboxError::Runtime {
                message: "InternalError: evaluation aborted".to_string(),
                location: None,
                stack: Vec::new(),
            }),
            Err(err) => {
                log::warn!(
                    "[PreviewNative] Could not spawn sandbox thread ({}), evaluating inline",
                    err
                );
                self.evaluate_entries(script, &entries)
            }
        }
    }

    fn evaluate_entries(
        &self,
        script: &NormalizedScript,
        entries: &[(String, String)],
    ) -> Result<Evaluation, SandboxError> {
        let source = script.code.as_str();
        let allocator = Allocator::default();
        let source_type = SourceType::default()
            .with_module(true)
            .with_typescript(true)
            .with_jsx(true);

        let ret = Parser::new(&allocator, source, source_type).parse();
        if let Some(err) = ret.errors.first() {
            return Err(parse_error(err, source));
        }

        let semantic = SemanticBuilder::new()
            .with_check_syntax_error(true)
            .build(&ret.program);
        if let Some(err) = semantic.errors.first() {
            return Err(parse_error(err, source));
        }

        if !Interpreter::has_render_call(&ret.program) {
            return Err(SandboxError::NoRenderCall);
        }

        let mapping = Value::object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), Value::str(v)))
                .collect(),
        );
        let globals = Env::root();
        install_globals(
            &globals,
            &self.options,
            &mapping,
            &script.mapping_name,
            &script.mutator_name,
        );

        let mut interpreter = Interpreter::new(source, &self.options, mapping);
        match interpreter.run_program(&ret.program, &globals) {
            Ok(nodes) => {
                let deferred_edits = interpreter.into_deferred_edits();
                log::debug!(
                    "[PreviewNative] Rendered `{}` ({} top-level node(s), {} deferred edit(s))",
                    script.component,
                    nodes.len(),
                    deferred_edits.len()
                );
                Ok(Evaluation {
                    tree: RenderedTree::new(nodes),
                    deferred_edits,
                })
            }
            Err(fault) => {
                let error = interpreter.fault_to_error(fault);
                log::debug!("[PreviewNative] Evaluation of `{}` failed: {}", script.component, error);
                Err(error)
            }
        }
    }
}

fn parse_error(err: &OxcDiagnostic, source: &str) -> SandboxError {
    let location = err
        .labels
        .as_ref()
        .and_then(|labels| labels.first())
        .map(|label| SourceLocation::from_offset(source, label.offset() as u32));
    SandboxError::Parse {
        message: err.message.to_string(),
        location,
        hints: err.help.iter().map(|help| help.to_string()).collect(),
    }
}
