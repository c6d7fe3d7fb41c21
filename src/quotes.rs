//! Attribute quote normalization.
//!
//! Walks every opening tag attribute by attribute and rewrites
//! `attr='value'` as `attr="value"`. Expression values (`attr={...}`) and
//! spread attributes are copied through untouched, which also covers
//! shielded placeholders.

use crate::scanner::find_matching_brace;

fn is_tag_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$' | b'.' | b':' | b'-')
}

fn is_attr_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$' | b':' | b'-')
}

fn skip_whitespace(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

/// Rewrite the opening tag starting at `start` (which holds `<`).
///
/// Returns the byte offset just past the tag and the rewritten tag text, or
/// `None` when the text at `start` does not parse as an opening tag.
fn rewrite_tag(source: &str, start: usize) -> Option<(usize, String)> {
    let bytes = source.as_bytes();
    let mut pos = start + 1;
    if !bytes.get(pos)?.is_ascii_alphabetic() {
        return None;
    }
    while pos < bytes.len() && is_tag_name_byte(bytes[pos]) {
        pos += 1;
    }

    let mut out = String::new();
    let mut copied = start;

    loop {
        pos = skip_whitespace(bytes, pos);
        match *bytes.get(pos)? {
            b'>' => {
                pos += 1;
                break;
            }
            b'/' if bytes.get(pos + 1) == Some(&b'>') => {
                pos += 2;
                break;
            }
            b'{' => {
                pos = find_matching_brace(source, pos)? + 1;
            }
            b if is_attr_name_byte(b) => {
                while pos < bytes.len() && is_attr_name_byte(bytes[pos]) {
                    pos += 1;
                }
                let after_name = skip_whitespace(bytes, pos);
                if bytes.get(after_name) != Some(&b'=') {
                    continue;
                }
                pos = skip_whitespace(bytes, after_name + 1);
                match *bytes.get(pos)? {
                    b'\'' => {
                        let close = pos + 1 + source[pos + 1..].find('\'')?;
                        let value = &source[pos + 1..close];
                        out.push_str(&source[copied..pos]);
                        out.push('"');
                        out.push_str(&value.replace('"', "\\\""));
                        out.push('"');
                        pos = close + 1;
                        copied = pos;
                    }
                    b'"' => {
                        pos = pos + 1 + source[pos + 1..].find('"')? + 1;
                    }
                    b'{' => {
                        pos = find_matching_brace(source, pos)? + 1;
                    }
                    _ => return None,
                }
            }
            _ => return None,
        }
    }

    out.push_str(&source[copied..pos]);
    Some((pos, out))
}

/// Convert single-quoted JSX attribute literals to double-quoted ones,
/// escaping embedded double quotes.
pub fn normalize_attribute_quotes(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'<' {
            if let Some((end, rewritten)) = rewrite_tag(source, i) {
                out.push_str(&source[last..i]);
                out.push_str(&rewritten);
                last = end;
                i = end;
                continue;
            }
        }
        i += 1;
    }

    out.push_str(&source[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_to_double() {
        assert_eq!(
            normalize_attribute_quotes("<div className='box'>x</div>"),
            r#"<div className="box">x</div>"#
        );
    }

    #[test]
    fn test_embedded_double_quotes_escaped() {
        assert_eq!(
            normalize_attribute_quotes(r#"<p className='a "quoted" value' />"#),
            r#"<p className="a \"quoted\" value" />"#
        );
    }

    #[test]
    fn test_expressions_and_doubles_untouched() {
        let src = r#"<td colSpan={2} title="it's" onClick={() => go('x')}>a</td>"#;
        assert_eq!(normalize_attribute_quotes(src), src);
    }

    #[test]
    fn test_text_apostrophes_untouched() {
        let src = "<p>Don't <b id='x'>panic</b></p>";
        assert_eq!(
            normalize_attribute_quotes(src),
            r#"<p>Don't <b id="x">panic</b></p>"#
        );
    }

    #[test]
    fn test_code_comparisons_are_not_tags() {
        let src = "for (let i=0; i<items.length; i++) { x = 'y'; }";
        assert_eq!(normalize_attribute_quotes(src), src);
    }

    #[test]
    fn test_boolean_and_spread_attributes() {
        let src = "<input disabled {...rest} type='text' />";
        assert_eq!(
            normalize_attribute_quotes(src),
            r#"<input disabled {...rest} type="text" />"#
        );
    }
}
