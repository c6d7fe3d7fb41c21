//! Source Normalizer
//!
//! Turns component source text (often mangled by JSON round-trips, double
//! encoding or truncation) into a self-contained script that defines one
//! component and invokes it once with the key/value mapping and mutator.
//!
//! The stages run in a fixed order; each one relies on what the previous
//! ones established:
//!
//! 1. trim (plus markdown fence and JSON string unwrapping)
//! 2. un-escape JSON-encoded quotes
//! 3. collapse doubled attribute braces
//! 4. shield attribute expressions
//! 5. single-quoted attributes to double-quoted
//! 6. restore shielded expressions
//! 7. strip imports and directives
//! 8. unwrap the default export
//! 9. collapse whitespace between table tags
//! 10. balance braces
//! 11. append the render invocation
//!
//! Normalization never fails: uncertain input yields a best-effort script.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::braces::{balance_braces, collapse_doubled_braces};
use crate::exports::{strip_imports, unwrap_default_export, ExportForm};
use crate::options::NormalizeOptions;
use crate::quotes::normalize_attribute_quotes;
use crate::scanner::{count_braces, count_parens};
use crate::shield::{restore_expressions, shield_expressions};
use crate::tables::collapse_table_whitespace;

lazy_static! {
    static ref FENCED_RE: Regex =
        Regex::new(r"^```[\w+-]*[ \t]*\r?\n([\s\S]*?)\r?\n?```$").unwrap();
}

/// Output of a normalization pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedScript {
    /// The evaluable script, render invocation included.
    pub code: String,
    /// Identifier of the component the invocation calls.
    pub component: String,
    /// Names the invocation passes the mapping and mutator under.
    pub mapping_name: String,
    pub mutator_name: String,
    pub export_form: ExportForm,
    pub collapsed_braces: usize,
    pub shielded_expressions: usize,
    pub appended_braces: usize,
    pub removed_braces: usize,
}

/// Normalize with default options and return only the script text.
pub fn normalize(source: &str) -> String {
    Normalizer::default().run(source).code
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    options: NormalizeOptions,
}

impl Normalizer {
    pub fn new(options: NormalizeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &NormalizeOptions {
        &self.options
    }

    pub fn run(&self, source: &str) -> NormalizedScript {
        // Stage 1
        let text = unwrap_transport(source.trim());

        // Stage 2
        let text = unescape_quotes(&text);
        let text = expand_literal_newlines(&text);

        // Stage 3
        let (text, collapsed_braces) = collapse_doubled_braces(&text);

        // Stages 4-6
        let triggers = self.options.shield_triggers();
        let (shielded_text, shielded) = shield_expressions(&text, &triggers);
        let quoted = normalize_attribute_quotes(&shielded_text);
        let (text, restored) = restore_expressions(&quoted, &shielded);
        if restored != shielded.len() {
            log::warn!(
                "[PreviewNative] Restored {} of {} shielded expressions",
                restored,
                shielded.len()
            );
        }

        // Stages 7-8
        let text = strip_imports(&text);
        let unwrapped = unwrap_default_export(&text, &self.options.fallback_component);
        if unwrapped.form == ExportForm::Missing {
            log::warn!(
                "[PreviewNative] No default export found, rendering `{}`",
                unwrapped.component
            );
        }

        // Stage 9
        let text = collapse_table_whitespace(&unwrapped.code, self.options.table_passes);

        // Stage 10
        let (text, repair) = balance_braces(text.trim_end());
        if repair.appended > 0 {
            log::warn!(
                "[PreviewNative] Appended {} closing brace(s) to unbalanced source",
                repair.appended
            );
        }
        if repair.removed > 0 {
            log::warn!(
                "[PreviewNative] Removed {} surplus closing brace(s)",
                repair.removed
            );
        }

        // Stage 11
        let code = format!(
            "{}\n\n{}({{ {}, {} }});",
            text, unwrapped.component, self.options.mapping_name, self.options.mutator_name
        );

        if self.options.dev {
            let (opens, closes) = count_braces(&code);
            let (popen, pclose) = count_parens(&code);
            log::debug!(
                "[PreviewNative] Normalized {} -> {} bytes, braces {}/{}, parens {}/{}",
                source.len(),
                code.len(),
                opens,
                closes,
                popen,
                pclose
            );
        }

        NormalizedScript {
            code,
            component: unwrapped.component,
            mapping_name: self.options.mapping_name.clone(),
            mutator_name: self.options.mutator_name.clone(),
            export_form: unwrapped.form,
            collapsed_braces,
            shielded_expressions: shielded.len(),
            appended_braces: repair.appended,
            removed_braces: repair.removed,
        }
    }
}

/// Strip a surrounding markdown fence and decode a text that is itself a
/// JSON string literal (possibly twice).
fn unwrap_transport(text: &str) -> String {
    let mut current = match FENCED_RE.captures(text) {
        Some(caps) => caps[1].trim().to_string(),
        None => text.to_string(),
    };

    for _ in 0..2 {
        if current.len() < 2 || !current.starts_with('"') || !current.ends_with('"') {
            break;
        }
        match serde_json::from_str::<String>(&current) {
            Ok(decoded) => current = decoded.trim().to_string(),
            Err(_) => break,
        }
    }

    current
}

/// Collapse JSON-escaped quotes, double-escaped first.
pub fn unescape_quotes(text: &str) -> String {
    text.replace("\\\\\"", "\"")
        .replace("\\\\'", "'")
        .replace("\\\"", "\"")
        .replace("\\'", "'")
}

/// Single-line text carrying literal `\n` escapes is a JSON artifact; turn the
/// escapes back into line breaks.
fn expand_literal_newlines(text: &str) -> String {
    if text.contains('\n') || !text.contains("\\n") {
        return text.to_string();
    }
    text.replace("\\r\\n", "\n")
        .replace("\\n", "\n")
        .replace("\\t", "\t")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unescape_order() {
        assert_eq!(unescape_quotes(r#"a=\\"x\\" b=\"y\" c=\'z\'"#), r#"a="x" b="y" c='z'"#);
    }

    #[test]
    fn test_unwrap_fence() {
        assert_eq!(
            unwrap_transport("```jsx\nexport default function A() {}\n```"),
            "export default function A() {}"
        );
    }

    #[test]
    fn test_unwrap_json_string() {
        assert_eq!(
            unwrap_transport(r#""export default function A() {\n  return <p className=\"x\" />\n}""#),
            "export default function A() {\n  return <p className=\"x\" />\n}"
        );
    }

    #[test]
    fn test_unwrap_leaves_plain_text() {
        assert_eq!(unwrap_transport("\"not json"), "\"not json");
    }

    #[test]
    fn test_literal_newlines_expanded_only_on_single_line() {
        assert_eq!(expand_literal_newlines("a\\nb"), "a\nb");
        assert_eq!(expand_literal_newlines("a\nb\\n"), "a\nb\\n");
    }
}
