//! Table whitespace collapsing.
//!
//! DOM tables reject whitespace text nodes between structural elements, so
//! whitespace runs and whitespace-only JSX expressions (`{' '}`, `{"\n"}`)
//! sitting directly between two table tags are removed.

use lazy_static::lazy_static;
use regex::Regex;

use crate::scanner::find_matching_brace;

const WHITESPACE_EXPR: &str =
    r#"\{\s*(?:'(?:\s|\\[nrt])*'|"(?:\s|\\[nrt])*"|`(?:\s|\\[nrt])*`)\s*\}"#;

lazy_static! {
    static ref TABLE_TAG_START_RE: Regex =
        Regex::new(r"</?(?:table|thead|tbody|tfoot|tr|th|td)\b").unwrap();
    static ref WHITESPACE_GAP_RE: Regex =
        Regex::new(&format!(r"^(?:\s|{})+$", WHITESPACE_EXPR)).unwrap();
}

/// Collapse whitespace between table tags, repeating up to `passes` times
/// until the text stops changing.
pub fn collapse_table_whitespace(source: &str, passes: usize) -> String {
    let mut current = source.to_string();
    for _ in 0..passes {
        let next = collapse_once(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn collapse_once(source: &str) -> String {
    let tags = table_tag_spans(source);
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for pair in tags.windows(2) {
        let (prev_end, next_start) = (pair[0].1, pair[1].0);
        if prev_end < next_start && WHITESPACE_GAP_RE.is_match(&source[prev_end..next_start]) {
            out.push_str(&source[cursor..prev_end]);
            cursor = next_start;
        }
    }
    out.push_str(&source[cursor..]);
    out
}

/// Byte ranges of every table tag, `<` through `>`.
fn table_tag_spans(source: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut cursor = 0;
    while let Some(m) = TABLE_TAG_START_RE.find_at(source, cursor) {
        match tag_end(source, m.end()) {
            Some(end) => {
                spans.push((m.start(), end));
                cursor = end;
            }
            None => cursor = m.end(),
        }
    }
    spans
}

/// Offset just past the `>` closing a tag whose name ends at `from`.
/// Quoted values and `{...}` expressions are skipped whole, so the `>` of
/// an arrow function inside an attribute does not end the tag.
fn tag_end(source: &str, from: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'>' => return Some(i + 1),
            b'{' => i = find_matching_brace(source, i)? + 1,
            quote @ (b'"' | b'\'') => {
                let close = source[i + 1..].find(quote as char)?;
                i += close + 2;
            }
            b'<' => return None,
            _ => i += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_whitespace_runs() {
        let src = "<table>\n  <tbody>\n    <tr>\n      <td>A</td>\n    </tr>\n  </tbody>\n</table>";
        assert_eq!(
            collapse_table_whitespace(src, 3),
            "<table><tbody><tr><td>A</td></tr></tbody></table>"
        );
    }

    #[test]
    fn test_whitespace_expressions() {
        let src = r#"<tr>{' '}<td>A</td>{"\n"} <td>B</td>{` `}</tr>"#;
        assert_eq!(
            collapse_table_whitespace(src, 3),
            "<tr><td>A</td><td>B</td></tr>"
        );
    }

    #[test]
    fn test_adjacent_self_closing_cells() {
        let src = "<tr> <td/> <td/> <td/> </tr>";
        assert_eq!(collapse_table_whitespace(src, 1), "<tr><td/><td/><td/></tr>");
    }

    #[test]
    fn test_arrow_function_attribute() {
        let src = "<table>\n  <tr onClick={() => setValue('a', 'b')}>\n    <td>A</td>\n  </tr>\n</table>";
        assert_eq!(
            collapse_table_whitespace(src, 3),
            "<table><tr onClick={() => setValue('a', 'b')}><td>A</td></tr></table>"
        );
    }

    #[test]
    fn test_quoted_attribute_with_angle_bracket() {
        let src = "<td title=\"a > b\">x</td>\n  <td>y</td>";
        assert_eq!(
            collapse_table_whitespace(src, 3),
            "<td title=\"a > b\">x</td><td>y</td>"
        );
    }

    #[test]
    fn test_unterminated_tag_left_alone() {
        let src = "<tr>\n  <td onClick={() => go(";
        assert_eq!(collapse_table_whitespace(src, 3), src);
    }

    #[test]
    fn test_cell_text_kept() {
        let src = "<td> Price </td>";
        assert_eq!(collapse_table_whitespace(src, 3), src);
    }

    #[test]
    fn test_similar_tag_names_ignored() {
        let src = "<track /> <thx />";
        assert_eq!(collapse_table_whitespace(src, 3), src);
    }
}
