use pretty_assertions::assert_eq;

use crate::detect::{detect, DiagnosticWarning};
use crate::exports::ExportForm;
use crate::normalize::{normalize, unescape_quotes, NormalizedScript, Normalizer};
use crate::options::NormalizeOptions;
use crate::scanner::count_braces;

fn run(src: &str) -> NormalizedScript {
    Normalizer::default().run(src)
}

fn occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

#[test]
fn test_single_quoted_attribute_with_inner_double_quotes() {
    let src = r#"export default function A() { return <p className='a "quoted" value'>x</p> }"#;
    let out = normalize(src);
    assert!(
        out.contains(r#"className="a \"quoted\" value""#),
        "quotes not normalized: {}",
        out
    );
}

#[test]
fn test_doubled_braces_collapse_and_keep_inner_quotes() {
    let src = "export default function A({ values }) {\n  return <input value={{values['key'] || 'text'}} />\n}";
    let script = run(src);
    assert!(script.code.contains("value={values['key'] || 'text'}"), "{}", script.code);
    assert_eq!(script.collapsed_braces, 1);
}

#[test]
fn test_default_function_export() {
    let src = "export default function Foo({values,setValue}) { return <div/> }";
    let script = run(src);
    assert_eq!(
        script.code,
        "function Foo({values,setValue}) { return <div/> }\n\nFoo({ values, setValue });"
    );
    assert_eq!(script.component, "Foo");
    assert_eq!(script.export_form, ExportForm::Function);
}

#[test]
fn test_three_missing_closers_appended() {
    let src = "export default function A() {\n  if (values.ok) {\n    return <div>{values.title";
    let script = run(src);
    assert_eq!(script.appended_braces, 3);
    assert!(
        script.code.ends_with("values.title\n}}}\n\nA({ values, setValue });"),
        "{}",
        script.code
    );
}

#[test]
fn test_orphan_brace_still_normalizes() {
    let src = "export default function A() {\n  return <div />\n}\n}\nconst note = 1;";
    assert!(detect(src).contains(&DiagnosticWarning::OrphanClosingBrace));

    let script = run(src);
    assert_eq!(script.removed_braces, 1);
    assert_eq!(
        script.code,
        "function A() {\n  return <div />\n}\nconst note = 1;\n\nA({ values, setValue });"
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROPERTIES
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_unescaping_is_stable() {
    let inputs = [
        r#"export default function A() { return <p className=\"lead\">Hi</p> }"#,
        r#"export default function A() { return <p title='it\'s'>{values['x']}</p> }"#,
        "export default function A() { return <p>plain</p> }",
    ];
    for src in inputs {
        assert_eq!(normalize(&unescape_quotes(src)), normalize(src), "input: {}", src);
    }
}

#[test]
fn test_braces_balanced_after_padding() {
    let inputs = [
        "export default function A() { return <div /> }",
        "export default function A() {\n  return (\n    <ul>{values.items.map((item) => {",
        "export default class A extends React.Component {\n  render() {\n    return <p>{this.props.values.title",
        "const A = () => <p style={{ color: 'red' }}>x</p>;\nexport default A;",
        "export default function A() {\n  return <div />\n}\n}\nconst note = 1;",
        "export default function A() {\n  return <div />\n} }\nconst note = 1;",
        "}\nexport default function A() { return <p>{values.a}</p> }",
    ];
    for src in inputs {
        let out = normalize(src);
        let (opens, closes) = count_braces(&out);
        assert_eq!(opens, closes, "unbalanced output for {:?}:\n{}", src, out);
    }
}

#[test]
fn test_exactly_one_render_invocation() {
    let inputs = [
        ("export default function Card() { return <div /> }", "Card"),
        ("const Hero = () => <h1>Hi</h1>;\nexport default Hero;", "Hero"),
        ("export default () => <h1>Hi</h1>", "Component"),
        ("function Orphan() { return null }", "Component"),
    ];
    for (src, component) in inputs {
        let script = run(src);
        let invocation = format!("{}({{ values, setValue }});", component);
        assert_eq!(script.component, component);
        assert_eq!(occurrences(&script.code, &invocation), 1, "{}", script.code);
        assert!(script.code.ends_with(&invocation));
    }
}

#[test]
fn test_custom_binding_names_in_invocation() {
    let normalizer = Normalizer::new(NormalizeOptions {
        mapping_name: "content".to_string(),
        mutator_name: "update".to_string(),
        ..NormalizeOptions::default()
    });
    let script = normalizer.run("export default function Page() { return <main /> }");
    assert!(script.code.ends_with("Page({ content, update });"));
    assert_eq!(script.mapping_name, "content");
    assert_eq!(script.mutator_name, "update");
}

#[test]
fn test_no_whitespace_between_table_tags() {
    let src = "export default function T() {\n  return (\n    <table>\n      <tbody>\n        <tr>{' '}\n          <td>A</td>\n          <td>B</td>\n        </tr>\n      </tbody>\n    </table>\n  )\n}";
    let out = normalize(src);
    assert!(
        out.contains("<table><tbody><tr><td>A</td><td>B</td></tr></tbody></table>"),
        "{}",
        out
    );
}

#[test]
fn test_table_tag_with_arrow_handler() {
    let src = "export default function T({ setValue }) {\n  return (\n    <table>\n      <tr onClick={() => setValue('a', 'b')}>\n        <td>A</td>\n      </tr>\n    </table>\n  )\n}";
    let out = normalize(src);
    assert!(
        out.contains("<table><tr onClick={() => setValue('a', 'b')}><td>A</td></tr></table>"),
        "{}",
        out
    );
}

#[test]
fn test_doubled_lone_identifier_collapsed() {
    let out = normalize("export default function A({ title }) { return <h1 title={{title}}>x</h1> }");
    assert!(out.contains("<h1 title={title}>"), "{}", out);
}

#[test]
fn test_placeholders_never_leak() {
    let src = "export default function A({ values, setValue }) {\n  return (\n    <div title={values['name'] || 'Guest'} data-x='y'>\n      <input onChange={(e) => setValue('name', e.target.value)} placeholder='Name' />\n    </div>\n  )\n}";
    let script = run(src);
    assert!(!script.code.contains("__PREVIEW_EXPR_"), "{}", script.code);
    assert!(script.code.contains("title={values['name'] || 'Guest'}"));
    assert!(script.code.contains("onChange={(e) => setValue('name', e.target.value)}"));
    assert!(script.code.contains(r#"data-x="y""#));
    assert!(script.code.contains(r#"placeholder="Name""#));
    assert_eq!(script.shielded_expressions, 2);
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSPORT ARTIFACTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_markdown_fence_and_imports_removed() {
    let src = "```jsx\n'use client';\nimport React from 'react';\n\nexport default function A() { return <p /> }\n```";
    let out = normalize(src);
    assert_eq!(out.trim_start(), "function A() { return <p /> }\n\nA({ values, setValue });");
}

#[test]
fn test_json_encoded_source_decoded() {
    let encoded =
        serde_json::to_string("export default function A() {\n  return <p className=\"x\">Hi</p>\n}").unwrap();
    let out = normalize(&encoded);
    assert!(out.starts_with("function A() {\n  return <p className=\"x\">Hi</p>\n}"), "{}", out);
}

#[test]
fn test_surrounding_whitespace_trimmed() {
    let out = normalize("\n\n   export default function A() { return null }   \n\n");
    assert!(out.starts_with("function A()"));
}

#[test]
fn test_empty_input_still_yields_script() {
    let script = run("");
    assert_eq!(script.export_form, ExportForm::Missing);
    assert!(script.code.ends_with("Component({ values, setValue });"));
}
