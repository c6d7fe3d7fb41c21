//! Brace repairs: doubled attribute braces and end-of-script balancing.

use lazy_static::lazy_static;
use regex::Regex;

use crate::scanner::{count_braces, find_matching_brace};

lazy_static! {
    /// `name={{` with an identifier-like attribute name right before it.
    static ref DOUBLED_ATTR_RE: Regex =
        Regex::new(r"[A-Za-z_$][\w$-]*\s*=\s*\{\s*\{").unwrap();

    /// Content that reads as an object literal: `key:`, `'key':`, `"key":`,
    /// `[computed]:`, `...spread` or shorthand `key,`.
    static ref OBJECT_LITERAL_RE: Regex = Regex::new(
        r#"^(?:\.\.\.|[A-Za-z_$][\w$]*\s*[:,]|\d+\s*:|'[^']*'\s*:|"[^"]*"\s*:|\[[^\]]*\]\s*:)"#
    )
    .unwrap();

    static ref LONE_IDENT_RE: Regex = Regex::new(r"^[A-Za-z_$][\w$]*$").unwrap();
}

/// A lone identifier is a shorthand object only under `style`; elsewhere
/// `title={{title}}` is a doubled expression.
fn looks_like_object_literal(content: &str, attribute: &str) -> bool {
    let trimmed = content.trim();
    if trimmed.is_empty() || OBJECT_LITERAL_RE.is_match(trimmed) {
        return true;
    }
    attribute == "style" && LONE_IDENT_RE.is_match(trimmed)
}

/// Collapse `attr={{ expr }}` into `attr={ expr }` unless the inner braces
/// hold a genuine object literal (`style={{ color: 'red' }}` stays).
///
/// Returns the rewritten text and the number of attributes collapsed.
pub fn collapse_doubled_braces(source: &str) -> (String, usize) {
    let mut out = String::with_capacity(source.len());
    let mut collapsed = 0;
    let mut cursor = 0;

    while let Some(m) = DOUBLED_ATTR_RE.find_at(source, cursor) {
        let matched = m.as_str();
        let outer_open = m.start() + matched.find('{').unwrap_or(0);
        let inner_open = m.end() - 1;

        let outer_close = find_matching_brace(source, outer_open);
        let inner_close = find_matching_brace(source, inner_open);
        let (outer_close, inner_close) = match (outer_close, inner_close) {
            (Some(o), Some(i)) if source[i + 1..o].trim().is_empty() => (o, i),
            _ => {
                out.push_str(&source[cursor..m.end()]);
                cursor = m.end();
                continue;
            }
        };

        let attribute = matched[..outer_open - m.start()]
            .trim_end_matches(|c: char| c == '=' || c.is_whitespace());
        let content = &source[inner_open + 1..inner_close];
        if looks_like_object_literal(content, attribute) {
            out.push_str(&source[cursor..m.end()]);
            cursor = m.end();
            continue;
        }

        let (content, nested) = collapse_doubled_braces(content);
        out.push_str(&source[cursor..=outer_open]);
        out.push_str(&content);
        out.push('}');
        collapsed += 1 + nested;
        cursor = outer_close + 1;
    }

    out.push_str(&source[cursor..]);
    (out, collapsed)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BraceRepair {
    pub appended: usize,
    pub removed: usize,
}

/// Make `{` and `}` counts equal.
///
/// A deficit of closers is appended at the end. Surplus closers are removed
/// in three steps, each only while a surplus remains: brace-only `}` / `};`
/// lines that close more than has been opened so far, then the trailing run
/// of the text (separated by whitespace or `;`), then any single `}` that
/// closes more than has been opened.
pub fn balance_braces(source: &str) -> (String, BraceRepair) {
    let (opens, closes) = count_braces(source);
    let mut repair = BraceRepair::default();

    if opens > closes {
        repair.appended = opens - closes;
        let mut out = source.to_string();
        out.push('\n');
        out.push_str(&"}".repeat(repair.appended));
        return (out, repair);
    }

    let mut surplus = closes - opens;
    if surplus == 0 {
        return (source.to_string(), repair);
    }

    let (mut out, dropped) = drop_orphan_lines(source, surplus);
    surplus -= dropped;
    repair.removed += dropped;

    let mut trailing = 0;
    while surplus > 0 {
        let end = out.trim_end_matches(|c: char| c.is_whitespace() || c == ';').len();
        if !out[..end].ends_with('}') {
            break;
        }
        out.truncate(end - 1);
        surplus -= 1;
        trailing += 1;
    }
    if trailing > 0 {
        let trimmed = out.trim_end().len();
        out.truncate(trimmed);
        repair.removed += trailing;
    }

    if surplus > 0 {
        let (kept, dropped) = drop_unmatched_closers(&out, surplus);
        out = kept;
        repair.removed += dropped;
    }

    (out, repair)
}

/// Remove up to `limit` lines holding only `}` or `};` that take the running
/// brace count below zero.
fn drop_orphan_lines(source: &str, limit: usize) -> (String, usize) {
    let mut kept = Vec::new();
    let mut depth: i64 = 0;
    let mut dropped = 0;
    for line in source.split('\n') {
        let trimmed = line.trim();
        if dropped < limit && (trimmed == "}" || trimmed == "};") && depth <= 0 {
            dropped += 1;
            continue;
        }
        let (o, c) = count_braces(line);
        depth += o as i64 - c as i64;
        kept.push(line);
    }
    (kept.join("\n"), dropped)
}

/// Remove up to `limit` `}` characters that take the running brace count
/// below zero.
fn drop_unmatched_closers(source: &str, limit: usize) -> (String, usize) {
    let mut out = String::with_capacity(source.len());
    let mut depth: i64 = 0;
    let mut dropped = 0;
    for c in source.chars() {
        match c {
            '{' => depth += 1,
            '}' if depth == 0 && dropped < limit => {
                dropped += 1;
                continue;
            }
            '}' => depth -= 1,
            _ => {}
        }
        out.push(c);
    }
    (out, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_value_expression() {
        let (out, n) = collapse_doubled_braces("<input value={{values['key'] || 'text'}} />");
        assert_eq!(out, "<input value={values['key'] || 'text'} />");
        assert_eq!(n, 1);
    }

    #[test]
    fn test_style_object_kept() {
        let src = "<div style={{ color: 'red', fontSize: 12 }}>x</div>";
        let (out, n) = collapse_doubled_braces(src);
        assert_eq!(out, src);
        assert_eq!(n, 0);
    }

    #[test]
    fn test_lone_identifier_collapsed_outside_style() {
        let (out, n) = collapse_doubled_braces("<h1 title={{title}} style={{theme}} />");
        assert_eq!(out, "<h1 title={title} style={{theme}} />");
        assert_eq!(n, 1);
    }

    #[test]
    fn test_nested_object_inside_expression() {
        let src = "<Card data={{ pick({ a: 1 }, values) }} />";
        let (out, n) = collapse_doubled_braces(src);
        assert_eq!(out, "<Card data={ pick({ a: 1 }, values) } />");
        assert_eq!(n, 1);
    }

    #[test]
    fn test_not_closed_by_double() {
        // Inner expression closes, but something else follows before the
        // outer brace: this is a block, not doubled bracing.
        let src = "x={{ a } + b}";
        let (out, n) = collapse_doubled_braces(src);
        assert_eq!(out, src);
        assert_eq!(n, 0);
    }

    #[test]
    fn test_balance_appends_missing() {
        let (out, repair) = balance_braces("function A() { if (x) { return {");
        assert_eq!(repair.appended, 3);
        assert!(out.ends_with("\n}}}"));
        assert_eq!(count_braces(&out).0, count_braces(&out).1);
    }

    #[test]
    fn test_balance_trims_trailing_surplus() {
        let (out, repair) = balance_braces("function A() { return 1 }\n}\n};");
        assert_eq!(repair.removed, 2);
        assert_eq!(out, "function A() { return 1 }");
    }

    #[test]
    fn test_balance_drops_orphan_line() {
        let src = "function A() {\n  return 1\n}\n}\nconst note = 1;";
        let (out, repair) = balance_braces(src);
        assert_eq!(repair.removed, 1);
        assert_eq!(out, "function A() {\n  return 1\n}\nconst note = 1;");
    }

    #[test]
    fn test_balance_prefers_leading_orphan_over_trailing_closer() {
        let (out, repair) = balance_braces("}\nfunction A() { return 1 }");
        assert_eq!(repair.removed, 1);
        assert_eq!(out, "function A() { return 1 }");
    }

    #[test]
    fn test_balance_drops_inline_closer() {
        let src = "function A() { return 1 } }\nconst note = 1;";
        let (out, repair) = balance_braces(src);
        assert_eq!(repair.removed, 1);
        assert_eq!(out, "function A() { return 1 } \nconst note = 1;");
        assert_eq!(count_braces(&out).0, count_braces(&out).1);
    }

    #[test]
    fn test_balanced_untouched() {
        let src = "function A() { return <div>{x}</div> }";
        let (out, repair) = balance_braces(src);
        assert_eq!(out, src);
        assert_eq!(repair, BraceRepair::default());
    }
}
