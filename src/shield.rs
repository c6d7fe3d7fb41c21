//! Expression shielding.
//!
//! Attribute expressions such as `title={values['name'] || 'Guest'}` hold
//! JavaScript string literals that the quote normalization pass must not
//! touch. They are swapped for opaque placeholders before that pass and
//! swapped back right after it.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

use crate::scanner::{find_matching_brace, is_ident_byte};

pub const PLACEHOLDER_MARKER: &str = "__PREVIEW_EXPR_";

lazy_static! {
    static ref PLACEHOLDER_RE: Regex = Regex::new(r"__PREVIEW_EXPR_(\d+)__").unwrap();
}

/// A shielded attribute expression. Created, consulted and restored within a
/// single normalization pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpressionPlaceholder {
    pub placeholder: String,
    pub original: String,
}

fn placeholder_for(index: usize) -> String {
    format!("{}{}__", PLACEHOLDER_MARKER, index)
}

/// True if `word` occurs in `text` as a whole identifier.
pub fn contains_identifier(text: &str, word: &str) -> bool {
    if word.is_empty() {
        return false;
    }
    let bytes = text.as_bytes();
    text.match_indices(word).any(|(start, _)| {
        let end = start + word.len();
        let before_ok = start == 0 || !is_ident_byte(bytes[start - 1]);
        let after_ok = end >= bytes.len() || !is_ident_byte(bytes[end]);
        before_ok && after_ok
    })
}

fn should_shield(expr: &str, triggers: &[&str]) -> bool {
    expr.contains('\'') || triggers.iter().any(|t| contains_identifier(expr, t))
}

/// `={` counts as an attribute expression when the `=` follows whitespace,
/// a comma, `<`, or an identifier character.
fn is_attribute_position(bytes: &[u8], eq: usize) -> bool {
    if eq == 0 {
        return false;
    }
    let prev = bytes[eq - 1];
    prev.is_ascii_whitespace() || prev == b',' || prev == b'<' || is_ident_byte(prev)
}

/// Replace shield-worthy attribute expressions with placeholders.
pub fn shield_expressions(source: &str, triggers: &[&str]) -> (String, Vec<ExpressionPlaceholder>) {
    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len());
    let mut shielded = Vec::new();
    let mut last = 0;
    let mut i = 0;

    while i + 1 < bytes.len() {
        if bytes[i] == b'=' && bytes[i + 1] == b'{' && is_attribute_position(bytes, i) {
            let open = i + 1;
            if let Some(close) = find_matching_brace(source, open) {
                let expr = &source[open + 1..close];
                if should_shield(expr, triggers) {
                    let placeholder = placeholder_for(shielded.len());
                    out.push_str(&source[last..=open]);
                    out.push_str(&placeholder);
                    shielded.push(ExpressionPlaceholder {
                        placeholder,
                        original: expr.to_string(),
                    });
                    last = close;
                    i = close;
                    continue;
                }
            }
        }
        i += 1;
    }

    out.push_str(&source[last..]);
    (out, shielded)
}

/// Put every shielded expression back. Returns the text and the number of
/// placeholders restored.
pub fn restore_expressions(source: &str, shielded: &[ExpressionPlaceholder]) -> (String, usize) {
    if shielded.is_empty() {
        return (source.to_string(), 0);
    }

    let lookup: HashMap<&str, &str> = shielded
        .iter()
        .map(|p| (p.placeholder.as_str(), p.original.as_str()))
        .collect();
    let mut restored = 0;

    let out = PLACEHOLDER_RE.replace_all(source, |caps: &regex::Captures| {
        let token = &caps[0];
        match lookup.get(token) {
            Some(original) => {
                restored += 1;
                original.to_string()
            }
            None => token.to_string(),
        }
    });

    (out.into_owned(), restored)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIGGERS: &[&str] = &["values", "setValue"];

    #[test]
    fn test_shields_quoted_expression() {
        let src = r#"<p title={values['name'] || 'Guest'}>Hi</p>"#;
        let (shielded_src, shielded) = shield_expressions(src, TRIGGERS);
        assert_eq!(shielded_src, "<p title={__PREVIEW_EXPR_0__}>Hi</p>");
        assert_eq!(shielded[0].original, "values['name'] || 'Guest'");
    }

    #[test]
    fn test_plain_expression_untouched() {
        let src = "<p className={styles.title}>Hi</p>";
        let (out, shielded) = shield_expressions(src, TRIGGERS);
        assert_eq!(out, src);
        assert!(shielded.is_empty());
    }

    #[test]
    fn test_identifier_must_be_whole_word() {
        assert!(contains_identifier("values.a", "values"));
        assert!(!contains_identifier("myvalues.a", "values"));
        assert!(!contains_identifier("valuesList", "values"));
        assert!(contains_identifier("(v) => setValue('a', v)", "setValue"));
    }

    #[test]
    fn test_round_trip_restores_everything() {
        let src = r#"<a href={values["url"]} onClick={() => setValue('k', "v")}>x</a>"#;
        let (shielded_src, shielded) = shield_expressions(src, TRIGGERS);
        assert_eq!(shielded.len(), 2);
        assert!(!shielded_src.contains("setValue"));
        let (restored, count) = restore_expressions(&shielded_src, &shielded);
        assert_eq!(count, 2);
        assert_eq!(restored, src);
        assert!(!restored.contains(PLACEHOLDER_MARKER));
    }

    #[test]
    fn test_comparison_is_not_attribute() {
        let src = "if (a =={ b: 1 }) {}";
        let (out, shielded) = shield_expressions(src, TRIGGERS);
        assert_eq!(out, src);
        assert!(shielded.is_empty());
    }
}
