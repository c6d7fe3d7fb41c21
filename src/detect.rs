//! Incompleteness Detector
//!
//! Heuristic scan of raw (pre-normalization) source for signs of truncation.
//! Normalization pads missing braces, which would hide the symptom, so this
//! runs on the text as received. Results are advisory only.

use serde::{Serialize, Serializer};
use std::fmt;

use crate::scanner::count_braces;

const LIST_EDIT_IDIOM: &str = "onChange={(v)=>setValue(";
const LIST_ITEM_CLOSE: &str = "</li>";

/// Closed set of advisory warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticWarning {
    OrphanClosingBrace,
    UnbalancedBraces,
    IncompleteJsx,
}

impl DiagnosticWarning {
    pub fn message(&self) -> &'static str {
        match self {
            DiagnosticWarning::OrphanClosingBrace => {
                "orphan closing brace detected outside final position"
            }
            DiagnosticWarning::UnbalancedBraces => "unbalanced braces (content truncated)",
            DiagnosticWarning::IncompleteJsx => "pattern suggests incomplete JSX",
        }
    }
}

impl fmt::Display for DiagnosticWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl Serialize for DiagnosticWarning {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.message())
    }
}

/// Scan raw source text and return the warnings it triggers, each at most
/// once, in declaration order.
pub fn detect(raw: &str) -> Vec<DiagnosticWarning> {
    let mut warnings = Vec::new();

    if has_orphan_closing_brace(raw) {
        warnings.push(DiagnosticWarning::OrphanClosingBrace);
    }

    let (opens, closes) = count_braces(raw);
    if opens > closes {
        warnings.push(DiagnosticWarning::UnbalancedBraces);
    }

    if looks_like_incomplete_list_edit(raw) {
        warnings.push(DiagnosticWarning::IncompleteJsx);
    }

    warnings
}

/// A `}` / `};` line that is not the last non-empty line and leaves more
/// closes than opens counted so far.
fn has_orphan_closing_brace(raw: &str) -> bool {
    let lines: Vec<&str> = raw.lines().collect();
    let last_non_empty = match lines.iter().rposition(|l| !l.trim().is_empty()) {
        Some(idx) => idx,
        None => return false,
    };

    let mut opens = 0;
    let mut closes = 0;
    for (idx, line) in lines.iter().enumerate() {
        let (o, c) = count_braces(line);
        opens += o;
        closes += c;

        let trimmed = line.trim();
        let brace_only = trimmed == "}" || trimmed == "};";
        if brace_only && idx != last_non_empty && closes > opens {
            return true;
        }
    }
    false
}

fn looks_like_incomplete_list_edit(raw: &str) -> bool {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    compact.contains(LIST_EDIT_IDIOM)
        && !raw.contains(LIST_ITEM_CLOSE)
        && raw.trim_end().ends_with('}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_source_has_no_warnings() {
        let src = "export default function A() {\n  return <div />\n}\n";
        assert!(detect(src).is_empty());
    }

    #[test]
    fn test_orphan_brace_before_last_line() {
        let src = "function A() {\n  return null\n}\n}\nconst x = 1;";
        assert_eq!(detect(src), vec![DiagnosticWarning::OrphanClosingBrace]);
    }

    #[test]
    fn test_final_brace_is_not_orphan() {
        let src = "const x = 1;\n}";
        assert!(!detect(src).contains(&DiagnosticWarning::OrphanClosingBrace));
    }

    #[test]
    fn test_unbalanced_braces() {
        let src = "export default function A() {\n  return <div>{values['a']";
        assert_eq!(detect(src), vec![DiagnosticWarning::UnbalancedBraces]);
    }

    #[test]
    fn test_incomplete_list_edit() {
        let src = "<ul>{items.map((item, i) => <li key={i}><EditableText value={item} onChange={(v) => setValue('items', v)} />\n}";
        let warnings = detect(src);
        assert!(warnings.contains(&DiagnosticWarning::IncompleteJsx));
    }

    #[test]
    fn test_list_edit_with_closing_item_is_fine() {
        let src = "<li><X onChange={(v)=>setValue('a', v)} /></li>}";
        assert!(!detect(src).contains(&DiagnosticWarning::IncompleteJsx));
    }

    #[test]
    fn test_messages_serialize_as_strings() {
        let json = serde_json::to_string(&vec![DiagnosticWarning::IncompleteJsx]).unwrap();
        assert_eq!(json, r#"["pattern suggests incomplete JSX"]"#);
    }
}
