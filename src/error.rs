//! Sandbox errors and their visible rendering.
//!
//! Every failure inside evaluation is caught at the sandbox boundary and
//! becomes a [`SandboxError`]. The host turns it into an [`ErrorDisplay`]
//! and shows that in place of the preview; nothing propagates further.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_PARSE: &str = "PREVIEW_PARSE";
pub const ERR_RUNTIME: &str = "PREVIEW_RUNTIME";
pub const ERR_UNSUPPORTED: &str = "PREVIEW_UNSUPPORTED";
pub const ERR_NO_RENDER_CALL: &str = "PREVIEW_NO_RENDER_CALL";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    /// 1-based line and column (in chars) of a byte offset into `source`.
    pub fn from_offset(source: &str, offset: u32) -> Self {
        let mut offset = (offset as usize).min(source.len());
        while !source.is_char_boundary(offset) {
            offset -= 1;
        }
        let before = &source[..offset];
        let line = before.matches('\n').count() as u32 + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = source[line_start..offset].chars().count() as u32 + 1;
        Self { line, column }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SandboxError {
    #[error("SyntaxError: {message}")]
    Parse {
        message: String,
        location: Option<SourceLocation>,
        hints: Vec<String>,
    },

    #[error("{message}")]
    Runtime {
        message: String,
        location: Option<SourceLocation>,
        /// Innermost frame first.
        stack: Vec<String>,
    },

    #[error("Unsupported syntax in preview: {construct}")]
    Unsupported {
        construct: String,
        location: Option<SourceLocation>,
    },

    #[error("Script does not end with a render call")]
    NoRenderCall,
}

impl SandboxError {
    pub fn code(&self) -> &'static str {
        match self {
            SandboxError::Parse { .. } => ERR_PARSE,
            SandboxError::Runtime { .. } => ERR_RUNTIME,
            SandboxError::Unsupported { .. } => ERR_UNSUPPORTED,
            SandboxError::NoRenderCall => ERR_NO_RENDER_CALL,
        }
    }

    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            SandboxError::Parse { location, .. }
            | SandboxError::Runtime { location, .. }
            | SandboxError::Unsupported { location, .. } => *location,
            SandboxError::NoRenderCall => None,
        }
    }

    fn stack(&self) -> &[String] {
        match self {
            SandboxError::Runtime { stack, .. } => stack,
            _ => &[],
        }
    }

    fn hints(&self) -> Vec<String> {
        match self {
            SandboxError::Parse { hints, .. } => hints.clone(),
            SandboxError::Unsupported { .. } => vec![
                "The preview runs a subset of JavaScript; rewrite the construct with plain expressions."
                    .to_string(),
            ],
            SandboxError::NoRenderCall => vec![
                "End the script with a call such as `Component({ values, setValue });`."
                    .to_string(),
            ],
            SandboxError::Runtime { .. } => Vec::new(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR DISPLAY
// ═══════════════════════════════════════════════════════════════════════════════

/// Maximum number of stack frames shown.
const STACK_FRAGMENT_LEN: usize = 5;

/// Contents of the error region shown instead of the preview.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDisplay {
    pub code: String,
    pub message: String,
    pub location: Option<SourceLocation>,
    pub stack: Vec<String>,
    pub hints: Vec<String>,
    /// Line-numbered normalized script, present in development mode.
    pub code_dump: Option<String>,
}

impl ErrorDisplay {
    pub fn new(error: &SandboxError, script: &str, dev: bool) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
            location: error.location(),
            stack: error
                .stack()
                .iter()
                .take(STACK_FRAGMENT_LEN)
                .cloned()
                .collect(),
            hints: error.hints(),
            code_dump: dev.then(|| numbered_lines(script, error.location())),
        }
    }

    /// Plain text for the error region.
    pub fn render(&self) -> String {
        let mut out = format!("[{}] {}", self.code, self.message);
        if let Some(loc) = self.location {
            out.push_str(&format!(" ({}:{})", loc.line, loc.column));
        }
        for frame in &self.stack {
            out.push_str(&format!("\n    at {}", frame));
        }
        for hint in &self.hints {
            out.push_str(&format!("\nHint: {}", hint));
        }
        if let Some(dump) = &self.code_dump {
            out.push_str("\n\n");
            out.push_str(dump);
        }
        out
    }
}

fn numbered_lines(script: &str, highlight: Option<SourceLocation>) -> String {
    let total = script.lines().count();
    let width = total.max(1).to_string().len();
    script
        .lines()
        .enumerate()
        .map(|(idx, line)| {
            let number = idx + 1;
            let marker = match highlight {
                Some(loc) if loc.line as usize == number => '>',
                _ => ' ',
            };
            format!("{}{:>width$} | {}", marker, number, line, width = width)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_from_offset() {
        let src = "const a = 1;\nconst b = é + x;";
        let offset = src.find('x').unwrap() as u32;
        assert_eq!(
            SourceLocation::from_offset(src, offset),
            SourceLocation { line: 2, column: 15 }
        );
        assert_eq!(
            SourceLocation::from_offset(src, 0),
            SourceLocation { line: 1, column: 1 }
        );
    }

    #[test]
    fn test_display_renders_message_stack_and_dump() {
        let err = SandboxError::Runtime {
            message: "TypeError: Cannot read properties of undefined (reading 'x')".to_string(),
            location: Some(SourceLocation { line: 2, column: 3 }),
            stack: vec!["Card".to_string(), "Page".to_string()],
        };
        let display = ErrorDisplay::new(&err, "function Page() {\n  a.x\n}", true);
        let text = display.render();

        assert!(text.starts_with("[PREVIEW_RUNTIME] TypeError: Cannot read properties"));
        assert!(text.contains("(2:3)"));
        assert!(text.contains("\n    at Card\n    at Page"));
        assert!(text.contains(">2 |   a.x"));
        assert!(text.contains(" 1 | function Page() {"));
    }

    #[test]
    fn test_display_without_dev_has_no_dump() {
        let display = ErrorDisplay::new(&SandboxError::NoRenderCall, "x", false);
        assert_eq!(display.code_dump, None);
        assert_eq!(display.code, ERR_NO_RENDER_CALL);
        assert!(!display.hints.is_empty());
    }
}
