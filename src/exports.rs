//! Module syntax removal.
//!
//! The sandbox supplies every binding itself, so imports and directive
//! prologues are dropped and the default export is unwrapped into a plain
//! declaration whose name the render invocation can call.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref IMPORT_RE: Regex = Regex::new(
        r#"(?m)^[ \t]*import\s+(?:[\w$*{}\s,]+?\s+from\s*)?['"][^'"\n]+['"][ \t]*;?[ \t]*\r?\n?"#
    )
    .unwrap();
    static ref DIRECTIVE_RE: Regex = Regex::new(
        r#"(?m)^[ \t]*['"]use (?:client|server|strict)['"][ \t]*;?[ \t]*\r?\n?"#
    )
    .unwrap();

    static ref DEFAULT_FUNCTION_RE: Regex = Regex::new(
        r"export\s+default\s+(async\s+)?function\b\s*\*?\s*([A-Za-z_$][\w$]*)?\s*\("
    )
    .unwrap();
    static ref DEFAULT_CLASS_RE: Regex =
        Regex::new(r"export\s+default\s+class\b\s*([A-Za-z_$][\w$]*)?").unwrap();
    static ref DEFAULT_WRAPPED_RE: Regex = Regex::new(
        r"(?m)^[ \t]*export\s+default\s+(?:React\.)?(?:memo|forwardRef)\(\s*([A-Za-z_$][\w$]*)\s*\)[ \t]*;?[ \t]*\r?\n?"
    )
    .unwrap();
    static ref DEFAULT_IDENT_RE: Regex = Regex::new(
        r"(?m)^[ \t]*export\s+default\s+([A-Za-z_$][\w$]*)[ \t]*;?[ \t]*\r?$\n?"
    )
    .unwrap();
    static ref DEFAULT_ARROW_RE: Regex =
        Regex::new(r"export\s+default\s+(?:async\s+)?(?:\(|[A-Za-z_$][\w$]*\s*=>)").unwrap();

    static ref NAMED_EXPORT_RE: Regex =
        Regex::new(r"(?m)^([ \t]*)export\s+(const|let|var|function|class|async)\b").unwrap();
}

/// Which default-export shape the source used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportForm {
    Function,
    Class,
    Identifier,
    Arrow,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unwrapped {
    pub code: String,
    pub component: String,
    pub form: ExportForm,
}

/// Remove import statements and `"use client"`-style directive lines.
pub fn strip_imports(source: &str) -> String {
    let without_imports = IMPORT_RE.replace_all(source, "");
    DIRECTIVE_RE.replace_all(&without_imports, "").into_owned()
}

/// Strip the default export wrapper and extract the component identifier.
///
/// When no supported form matches, `fallback` names the component and the
/// text is left as it is.
pub fn unwrap_default_export(source: &str, fallback: &str) -> Unwrapped {
    if let Some(caps) = DEFAULT_FUNCTION_RE.captures(source) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        let asyncness = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let name = caps.get(2).map(|m| m.as_str()).unwrap_or(fallback).to_string();
        let mut code = source.to_string();
        code.replace_range(whole, &format!("{}function {}(", asyncness, name));
        return finish(code, name, ExportForm::Function);
    }

    if let Some(caps) = DEFAULT_CLASS_RE.captures(source) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        let (name, replacement) = match caps.get(1).map(|m| m.as_str()) {
            Some("extends") => (fallback, format!("class {} extends", fallback)),
            Some(declared) => (declared, format!("class {}", declared)),
            None => (fallback, format!("class {} ", fallback)),
        };
        let name = name.to_string();
        let mut code = source.to_string();
        code.replace_range(whole, &replacement);
        return finish(code, name, ExportForm::Class);
    }

    for re in [&*DEFAULT_WRAPPED_RE, &*DEFAULT_IDENT_RE] {
        if let Some(caps) = re.captures(source) {
            let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
            let name = caps[1].to_string();
            let mut code = source.to_string();
            code.replace_range(whole, "");
            return finish(code, name, ExportForm::Identifier);
        }
    }

    if let Some(m) = DEFAULT_ARROW_RE.find(source) {
        let prefix_len = m.as_str().find("default").map(|i| i + "default".len()).unwrap_or(0);
        let mut code = source.to_string();
        code.replace_range(
            m.start()..m.start() + prefix_len,
            &format!("const {} =", fallback),
        );
        return finish(code, fallback.to_string(), ExportForm::Arrow);
    }

    finish(source.to_string(), fallback.to_string(), ExportForm::Missing)
}

fn finish(code: String, component: String, form: ExportForm) -> Unwrapped {
    let code = NAMED_EXPORT_RE.replace_all(&code, "$1$2").into_owned();
    Unwrapped {
        code,
        component,
        form,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_imports_and_directive() {
        let src = "'use client';\nimport React, { useState } from 'react';\nimport {\n  Foo,\n  Bar\n} from \"./x\";\nimport './styles.css';\nfunction A() {}\n";
        assert_eq!(strip_imports(src), "function A() {}\n");
    }

    #[test]
    fn test_dynamic_import_kept() {
        let src = "const m = import('./lazy');";
        assert_eq!(strip_imports(src), src);
    }

    #[test]
    fn test_default_function() {
        let out = unwrap_default_export(
            "export default function Foo({ values, setValue }) { return null }",
            "Component",
        );
        assert_eq!(out.component, "Foo");
        assert_eq!(out.form, ExportForm::Function);
        assert_eq!(out.code, "function Foo({ values, setValue }) { return null }");
    }

    #[test]
    fn test_anonymous_default_function() {
        let out = unwrap_default_export("export default function ({ values }) {}", "Component");
        assert_eq!(out.component, "Component");
        assert_eq!(out.code, "function Component({ values }) {}");
    }

    #[test]
    fn test_default_class() {
        let out = unwrap_default_export(
            "export default class Brochure extends React.Component {}",
            "Component",
        );
        assert_eq!(out.component, "Brochure");
        assert_eq!(out.form, ExportForm::Class);
        assert_eq!(out.code, "class Brochure extends React.Component {}");
    }

    #[test]
    fn test_anonymous_default_class() {
        let out = unwrap_default_export("export default class extends React.Component {}", "Page");
        assert_eq!(out.component, "Page");
        assert_eq!(out.code, "class Page extends React.Component {}");
    }

    #[test]
    fn test_default_identifier() {
        let out = unwrap_default_export(
            "const Trip = ({ values }) => <div />;\n\nexport default Trip;\n",
            "Component",
        );
        assert_eq!(out.component, "Trip");
        assert_eq!(out.form, ExportForm::Identifier);
        assert!(!out.code.contains("export"));
        assert!(out.code.starts_with("const Trip"));
    }

    #[test]
    fn test_default_memo_wrapper() {
        let out = unwrap_default_export(
            "function Trip() { return null }\nexport default React.memo(Trip);",
            "Component",
        );
        assert_eq!(out.component, "Trip");
        assert_eq!(out.code.trim(), "function Trip() { return null }");
    }

    #[test]
    fn test_default_arrow() {
        let out = unwrap_default_export("export default ({ values }) => <div />;", "Component");
        assert_eq!(out.form, ExportForm::Arrow);
        assert_eq!(out.code, "const Component = ({ values }) => <div />;");
    }

    #[test]
    fn test_missing_export_uses_fallback() {
        let src = "function Thing() { return null }";
        let out = unwrap_default_export(src, "Component");
        assert_eq!(out.form, ExportForm::Missing);
        assert_eq!(out.component, "Component");
        assert_eq!(out.code, src);
    }

    #[test]
    fn test_named_exports_stripped() {
        let out = unwrap_default_export(
            "export const Row = () => null;\nexport default function Page() {}",
            "Component",
        );
        assert_eq!(out.code, "const Row = () => null;\nfunction Page() {}");
    }
}
