//! Brace Scanner
//!
//! Tokenizes source text into a stream of brace delimiters annotated with
//! their nesting depth. String literals and template literals are skipped
//! (their `${ }` interpolations are scanned as code), so a `}` inside
//! `'a } b'` never closes an expression.
//!
//! JSX text is not JavaScript: an apostrophe in `<p>Don't</p>` opens no
//! string. Callers that scan across JSX fall back to [`ScanMode::Plain`],
//! which counts every brace.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Skip string and template literal contents.
    Lexical,
    /// Count every brace byte.
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelimKind {
    Open,
    Close,
}

/// A brace delimiter found by [`BraceScanner`].
///
/// `depth` is the nesting level the brace belongs to: an `Open` at the top
/// level and its matching `Close` both report depth 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiter {
    pub offset: usize,
    pub kind: DelimKind,
    pub depth: usize,
}

pub struct BraceScanner<'s> {
    bytes: &'s [u8],
    pos: usize,
    depth: usize,
    mode: ScanMode,
    in_template: bool,
    /// Depths at which a template interpolation `${` was opened.
    template_stack: Vec<usize>,
    /// Set once the scanner ran off the end inside a string or template.
    unterminated: bool,
}

impl<'s> BraceScanner<'s> {
    pub fn new(source: &'s str, start: usize, mode: ScanMode) -> Self {
        Self {
            bytes: source.as_bytes(),
            pos: start,
            depth: 0,
            mode,
            in_template: false,
            template_stack: Vec::new(),
            unterminated: false,
        }
    }

    pub fn is_unterminated(&self) -> bool {
        self.unterminated
    }

    /// Skip a quoted string starting at `self.pos` (which holds the quote).
    fn skip_string(&mut self, quote: u8) {
        self.pos += 1;
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'\\' => self.pos += 2,
                b'\n' => {
                    // Plain strings cannot span lines; treat the quote as stray.
                    self.pos += 1;
                    return;
                }
                c if c == quote => {
                    self.pos += 1;
                    return;
                }
                _ => self.pos += 1,
            }
        }
        self.unterminated = true;
    }

    /// Advance through template text until the closing backtick or an
    /// interpolation opener. Returns the `${` brace if one was hit.
    fn scan_template(&mut self) -> Option<Delimiter> {
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'\\' => self.pos += 2,
                b'`' => {
                    self.pos += 1;
                    self.in_template = false;
                    return None;
                }
                b'$' if self.bytes.get(self.pos + 1) == Some(&b'{') => {
                    let offset = self.pos + 1;
                    self.pos += 2;
                    self.template_stack.push(self.depth);
                    self.in_template = false;
                    let delim = Delimiter {
                        offset,
                        kind: DelimKind::Open,
                        depth: self.depth,
                    };
                    self.depth += 1;
                    return Some(delim);
                }
                _ => self.pos += 1,
            }
        }
        self.unterminated = true;
        None
    }
}

impl<'s> Iterator for BraceScanner<'s> {
    type Item = Delimiter;

    fn next(&mut self) -> Option<Delimiter> {
        while self.pos < self.bytes.len() {
            if self.in_template {
                if let Some(delim) = self.scan_template() {
                    return Some(delim);
                }
                continue;
            }

            let c = self.bytes[self.pos];
            if self.mode == ScanMode::Lexical {
                match c {
                    b'\\' => {
                        self.pos += 2;
                        continue;
                    }
                    b'"' | b'\'' => {
                        self.skip_string(c);
                        continue;
                    }
                    b'`' => {
                        self.pos += 1;
                        self.in_template = true;
                        continue;
                    }
                    _ => {}
                }
            }

            let offset = self.pos;
            self.pos += 1;
            match c {
                b'{' => {
                    let delim = Delimiter {
                        offset,
                        kind: DelimKind::Open,
                        depth: self.depth,
                    };
                    self.depth += 1;
                    return Some(delim);
                }
                b'}' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.mode == ScanMode::Lexical
                        && self.template_stack.last() == Some(&self.depth)
                    {
                        self.template_stack.pop();
                        self.in_template = true;
                    }
                    return Some(Delimiter {
                        offset,
                        kind: DelimKind::Close,
                        depth: self.depth,
                    });
                }
                _ => {}
            }
        }
        None
    }
}

/// Find the `}` matching the `{` at byte offset `open`.
///
/// Tries a lexical scan first and falls back to plain counting when the
/// lexical scan cannot close (an apostrophe in JSX text, for example).
pub fn find_matching_brace(source: &str, open: usize) -> Option<usize> {
    if source.as_bytes().get(open) != Some(&b'{') {
        return None;
    }
    find_with_mode(source, open, ScanMode::Lexical)
        .or_else(|| find_with_mode(source, open, ScanMode::Plain))
}

fn find_with_mode(source: &str, open: usize, mode: ScanMode) -> Option<usize> {
    BraceScanner::new(source, open, mode)
        .find(|d| d.kind == DelimKind::Close && d.depth == 0)
        .map(|d| d.offset)
}

/// Raw `(opens, closes)` brace counts, strings included.
pub fn count_braces(source: &str) -> (usize, usize) {
    count_pair(source, b'{', b'}')
}

/// Raw `(opens, closes)` parenthesis counts, strings included.
pub fn count_parens(source: &str) -> (usize, usize) {
    count_pair(source, b'(', b')')
}

fn count_pair(source: &str, open: u8, close: u8) -> (usize, usize) {
    source.bytes().fold((0, 0), |(o, c), b| {
        if b == open {
            (o + 1, c)
        } else if b == close {
            (o, c + 1)
        } else {
            (o, c)
        }
    })
}

pub fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_matching_brace() {
        assert_eq!(find_matching_brace("{hello}", 0), Some(6));
        assert_eq!(find_matching_brace("{a + b}", 0), Some(6));
        assert_eq!(find_matching_brace("{obj.map(x => ({ y: x }))}", 0), Some(25));
        assert_eq!(find_matching_brace("{'string with } brace'}", 0), Some(22));
    }

    #[test]
    fn test_template_interpolation_is_code() {
        let src = "{`a ${b} }`}";
        assert_eq!(find_matching_brace(src, 0), Some(src.len() - 1));
    }

    #[test]
    fn test_plain_fallback_for_jsx_apostrophe() {
        // The apostrophe never closes, so the lexical pass fails and plain
        // counting takes over.
        let src = "{() => <p>Don't stop</p>}";
        assert_eq!(find_matching_brace(src, 0), Some(src.len() - 1));
    }

    #[test]
    fn test_not_a_brace() {
        assert_eq!(find_matching_brace("abc", 0), None);
        assert_eq!(find_matching_brace("{abc", 0), None);
    }

    #[test]
    fn test_delimiter_depths() {
        let delims: Vec<_> = BraceScanner::new("{a{b}}", 0, ScanMode::Plain).collect();
        let depths: Vec<_> = delims.iter().map(|d| (d.kind, d.depth)).collect();
        assert_eq!(
            depths,
            vec![
                (DelimKind::Open, 0),
                (DelimKind::Open, 1),
                (DelimKind::Close, 1),
                (DelimKind::Close, 0),
            ]
        );
    }

    #[test]
    fn test_counts() {
        assert_eq!(count_braces("{ { } '}'"), (2, 2));
        assert_eq!(count_parens("f(a(b)"), (2, 1));
    }
}
