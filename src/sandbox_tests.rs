use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::rc::Rc;

use crate::detect::DiagnosticWarning;
use crate::error::{SandboxError, ERR_PARSE, ERR_RUNTIME};
use crate::normalize::Normalizer;
use crate::options::{PreviewOptions, SandboxOptions};
use crate::preview::{LivePreview, PreviewPhase};
use crate::render::{AttributeValue, RenderNode, RenderedTree};
use crate::sandbox::{evaluate, Sandbox};
use crate::scope::{Scope, ValueStore};

fn scope(entries: &[(&str, &str)]) -> Scope {
    Scope::detached(ValueStore::from_entries(entries.iter().copied()))
}

fn render(src: &str, entries: &[(&str, &str)]) -> Result<RenderedTree, SandboxError> {
    let script = Normalizer::default().run(src);
    evaluate(&script, &scope(entries))
}

fn render_html(src: &str, entries: &[(&str, &str)]) -> String {
    match render(src, entries) {
        Ok(tree) => tree.to_html(),
        Err(err) => panic!("render failed: {:?}", err),
    }
}

/// Scope whose mutator records every call.
fn recording_scope(entries: &[(&str, &str)]) -> (Scope, Rc<RefCell<Vec<(String, String)>>>) {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&calls);
    let scope = Scope::new(
        ValueStore::from_entries(entries.iter().copied()),
        Box::new(move |key: &str, value: &str| {
            sink.borrow_mut().push((key.to_string(), value.to_string()));
        }),
    );
    (scope, calls)
}

// ═══════════════════════════════════════════════════════════════════════════════
// RENDERING
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_elements_text_and_values() {
    let src = r#"export default function Card({ values }) {
  return (
    <div className="card">
      <h1>{values.title}</h1>
      <p>Hello, {values.name}!</p>
    </div>
  );
}"#;
    let html = render_html(src, &[("title", "Welcome"), ("name", "Ada")]);
    assert_eq!(html, r#"<div class="card"><h1>Welcome</h1><p>Hello, Ada!</p></div>"#);
}

#[test]
fn test_style_object_rendered_as_css() {
    let src = "export default function A() {\n  return <p style={{ fontSize: 14, color: 'red', opacity: 0.5 }}>x</p>\n}";
    let html = render_html(src, &[]);
    assert_eq!(html, r#"<p style="font-size: 14px; color: red; opacity: 0.5">x</p>"#);
}

#[test]
fn test_list_from_map() {
    let src = r#"export default function List({ values }) {
  const items = values.items.split(',');
  return (
    <ul>
      {items.map((item) => <li key={item}>{item.trim()}</li>)}
    </ul>
  );
}"#;
    let html = render_html(src, &[("items", "alpha, beta")]);
    assert_eq!(html, "<ul><li>alpha</li><li>beta</li></ul>");
}

#[test]
fn test_conditional_and_fallback_values() {
    let src = r#"export default function A({ values }) {
  return (
    <section>
      {values.badge ? <b>{values.badge}</b> : null}
      <span title={values['missing'] || 'none'}>{values.count || 0}</span>
    </section>
  );
}"#;
    let html = render_html(src, &[]);
    assert_eq!(html, r#"<section><span title="none">0</span></section>"#);
}

#[test]
fn test_use_state_initial_value() {
    let src = r#"export default function Counter() {
  const [count, setCount] = React.useState(2);
  return <span onClick={() => setCount(count + 1)}>{count * 2}</span>;
}"#;
    let html = render_html(src, &[]);
    assert_eq!(html, "<span>4</span>");
}

#[test]
fn test_class_component() {
    let src = r#"export default class Hero extends React.Component {
  render() {
    const { values } = this.props;
    return <h1>{values.title}</h1>;
  }
}"#;
    let html = render_html(src, &[("title", "Launch")]);
    assert_eq!(html, "<h1>Launch</h1>");
}

#[test]
fn test_nested_components_and_fragments() {
    let src = r#"function Item({ label }) {
  return <li>{label}</li>;
}

export default function Menu() {
  return (
    <>
      <Item label="One" />
      <Item label="Two" />
    </>
  );
}"#;
    let html = render_html(src, &[]);
    assert_eq!(html, "<li>One</li><li>Two</li>");
}

// ═══════════════════════════════════════════════════════════════════════════════
// EDIT BINDINGS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_editable_text_with_field() {
    let src = "export default function A() {\n  return <EditableText field=\"headline\" as=\"h2\" />\n}";
    let tree = render(src, &[("headline", "Hi there")]).unwrap();

    let editables = tree.editables();
    assert_eq!(editables.len(), 1);
    assert_eq!(editables[0].tag, "h2");
    assert_eq!(editables[0].value, "Hi there");
    assert_eq!(editables[0].binding.as_deref(), Some("headline"));
    assert_eq!(
        tree.to_html(),
        r#"<h2 data-field="headline" contenteditable="true">Hi there</h2>"#
    );
}

#[test]
fn test_editable_binding_found_through_handler() {
    let src = r#"export default function Bio({ values, setValue }) {
  return (
    <EditableText
      value={values.bio}
      onChange={(v) => setValue('bio', v)}
      multiline
    />
  );
}"#;
    let tree = render(src, &[("bio", "Line one")]).unwrap();

    let editables = tree.editables();
    assert_eq!(editables.len(), 1);
    assert_eq!(editables[0].binding.as_deref(), Some("bio"));
    assert_eq!(editables[0].tag, "div");
    assert!(editables[0].multiline);
    assert_eq!(editables[0].value, "Line one");
}

#[test]
fn test_input_handler_binding() {
    let src = r#"export default function Form({ values, setValue }) {
  return (
    <form>
      <input value={values.email} onChange={(e) => setValue('email', e.target.value)} />
      <button onClick={() => console.log('clicked')}>Go</button>
    </form>
  );
}"#;
    let tree = render(src, &[("email", "a@b.c")]).unwrap();
    assert_eq!(tree.edit_bindings(), vec!["email".to_string()]);

    let RenderNode::Element(form) = &tree.nodes[0] else {
        panic!("expected element");
    };
    let RenderNode::Element(input) = &form.children[0] else {
        panic!("expected input");
    };
    assert!(input.attributes.iter().any(|a| {
        a.name == "onChange"
            && a.value
                == AttributeValue::Handler {
                    binding: Some("email".to_string()),
                }
    }));
    assert_eq!(
        tree.to_html(),
        r#"<form><input value="a@b.c" /><button>Go</button></form>"#
    );
}

#[test]
fn test_set_value_during_render_is_deferred() {
    let src = "export default function A({ setValue }) {\n  setValue('seen', 'yes');\n  return <p>ok</p>\n}";
    let script = Normalizer::default().run(src);
    let (scope, calls) = recording_scope(&[]);

    let evaluation = Sandbox::default().evaluate(&script, &scope).unwrap();
    assert_eq!(evaluation.tree.to_html(), "<p>ok</p>");
    assert_eq!(
        evaluation.deferred_edits,
        vec![("seen".to_string(), "yes".to_string())]
    );
    assert!(calls.borrow().is_empty());
}

#[test]
fn test_trial_calls_do_not_reach_host_mutator() {
    let src = r#"export default function A({ values, setValue }) {
  return <input value={values.name} onChange={(e) => setValue('name', e.target.value)} />;
}"#;
    let script = Normalizer::default().run(src);
    let (scope, calls) = recording_scope(&[("name", "x")]);

    let evaluation = Sandbox::default().evaluate(&script, &scope).unwrap();
    assert!(evaluation.deferred_edits.is_empty());
    assert!(calls.borrow().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_parse_error_reported() {
    let err = render("export default function A() {\n  return <div>\n}", &[]).unwrap_err();
    assert_eq!(err.code(), ERR_PARSE);
    assert!(err.location().is_some());
}

#[test]
fn test_reference_error_reported() {
    let err = render("export default function A() {\n  return <p>{missing.value}</p>\n}", &[]).unwrap_err();
    match &err {
        SandboxError::Runtime {
            message, location, ..
        } => {
            assert_eq!(message, "ReferenceError: missing is not defined");
            assert_eq!(location.map(|l| l.line), Some(2));
        }
        other => panic!("expected runtime error, got {:?}", other),
    }
    assert_eq!(err.code(), ERR_RUNTIME);
}

#[test]
fn test_thrown_error_message() {
    let err = render(
        "export default function A() {\n  throw new Error('boom');\n}",
        &[],
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "Error: boom");
}

#[test]
fn test_missing_render_call() {
    let mut script = Normalizer::default().run("export default function A() { return null }");
    script.code = "function A() { return null }".to_string();
    let err = evaluate(&script, &scope(&[])).unwrap_err();
    assert_eq!(err, SandboxError::NoRenderCall);
}

#[test]
fn test_unsupported_construct() {
    let err = render(
        "export default function A({ values }) {\n  return <p>{/a+/.test(values.x) ? 'y' : 'n'}</p>\n}",
        &[],
    )
    .unwrap_err();
    match err {
        SandboxError::Unsupported { construct, .. } => assert_eq!(construct, "regular expression"),
        other => panic!("expected unsupported, got {:?}", other),
    }
}

#[test]
fn test_runaway_recursion_is_caught() {
    let sandbox = Sandbox::new(SandboxOptions {
        max_call_depth: 32,
        ..SandboxOptions::default()
    });
    let script = Normalizer::default().run(
        "function loop(n) { return loop(n + 1) }\nexport default function A() { return <p>{loop(0)}</p> }",
    );
    let err = sandbox.evaluate(&script, &scope(&[])).unwrap_err();
    assert_eq!(err.code(), ERR_RUNTIME);
}

fn runtime_message(err: SandboxError) -> String {
    match err {
        SandboxError::Runtime { message, .. } => message,
        other => panic!("expected runtime error, got {:?}", other),
    }
}

#[test]
fn test_recursion_stopped_with_default_options() {
    let err = render(
        "function loop(n) { return loop(n + 1) }\nexport default function A() { return <p>{loop(0)}</p> }",
        &[],
    )
    .unwrap_err();
    assert_eq!(runtime_message(err), "RangeError: Maximum call stack size exceeded");
}

#[test]
fn test_deep_component_nesting() {
    let src = r#"function Row({ n }) {
  return n > 0 ? <div><Row n={n - 1} /></div> : <span>end</span>;
}

export default function A({ values }) {
  return <Row n={Number(values.depth)} />;
}"#;
    let tree = render(src, &[("depth", "40")]).unwrap();
    assert_eq!(tree.text_content(), "end");

    let err = render(src, &[("depth", "300")]).unwrap_err();
    assert_eq!(runtime_message(err), "RangeError: Maximum call stack size exceeded");
}

#[test]
fn test_oversized_string_repeat_rejected() {
    let err = render(
        "export default function A() {\n  return <p>{'ab'.repeat(1e15)}</p>\n}",
        &[],
    )
    .unwrap_err();
    assert_eq!(runtime_message(err), "RangeError: Invalid string length");

    let err = render(
        "export default function A() {\n  return <p>{'x'.padStart(1e12, '-')}</p>\n}",
        &[],
    )
    .unwrap_err();
    assert_eq!(runtime_message(err), "RangeError: Invalid string length");
}

#[test]
fn test_oversized_array_length_rejected() {
    let err = render(
        "export default function A() {\n  const a = [];\n  a.length = 1e15;\n  return <p>{a.length}</p>\n}",
        &[],
    )
    .unwrap_err();
    assert_eq!(runtime_message(err), "RangeError: Invalid array length");

    let err = render(
        "export default function A() {\n  const a = [];\n  a.length = 1e9;\n  return <p>{a.length}</p>\n}",
        &[],
    )
    .unwrap_err();
    assert!(runtime_message(err).starts_with("RangeError: "));
}

#[test]
fn test_oversized_array_index_rejected() {
    let err = render(
        "export default function A() {\n  const a = [];\n  a[4000000000] = 1;\n  return <p>{a.length}</p>\n}",
        &[],
    )
    .unwrap_err();
    assert!(runtime_message(err).starts_with("RangeError: "));
}

#[test]
fn test_oversized_array_from_rejected() {
    let err = render(
        "export default function A() {\n  const a = Array.from({ length: 1e15 });\n  return <p>{a.length}</p>\n}",
        &[],
    )
    .unwrap_err();
    assert_eq!(runtime_message(err), "RangeError: Invalid array length");
}

#[test]
fn test_small_arrays_and_strings_still_work() {
    let src = r#"export default function A() {
  const cells = Array.from({ length: 3 }, (_, i) => i);
  const row = [];
  row[2] = 'c';
  return <p>{cells.join('|')} {'ab'.repeat(2)} {row.length} {'7'.padStart(3, '0')}</p>;
}"#;
    let html = render_html(src, &[]);
    assert_eq!(html, "<p>0|1|2 abab 3 007</p>");
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIVE PREVIEW
// ═══════════════════════════════════════════════════════════════════════════════

const TITLE_SRC: &str = "export default function A({ values }) {\n  return <h1>{values.title}</h1>\n}";

#[test]
fn test_preview_renders_and_keeps_mount_on_same_code() {
    let mut preview = LivePreview::new(PreviewOptions::default(), scope(&[("title", "One")]));
    assert_eq!(preview.phase(), PreviewPhase::Idle);

    assert_eq!(preview.set_code(TITLE_SRC), PreviewPhase::Rendered);
    assert_eq!(preview.mount_generation(), 1);
    assert_eq!(preview.tree().map(|t| t.to_html()).as_deref(), Some("<h1>One</h1>"));

    assert_eq!(preview.set_code(TITLE_SRC), PreviewPhase::Rendered);
    assert_eq!(preview.mount_generation(), 1);
    assert_eq!(preview.cache().hits(), 1);
}

#[test]
fn test_value_sync_rerenders_without_remount() {
    let mut preview = LivePreview::new(PreviewOptions::default(), scope(&[("title", "One")]));
    preview.set_code(TITLE_SRC);
    let instance = preview.scope().values().instance_id();

    let report = preview.sync_values([("title", "Two")]);
    assert_eq!(report.updated, 1);
    assert_eq!(preview.mount_generation(), 1);
    assert_eq!(preview.scope().values().instance_id(), instance);
    assert_eq!(preview.tree().map(|t| t.to_html()).as_deref(), Some("<h1>Two</h1>"));

    let report = preview.sync_values([("title", "Two")]);
    assert!(report.is_empty());
}

#[test]
fn test_new_code_remounts() {
    let mut preview = LivePreview::new(PreviewOptions::default(), scope(&[("title", "One")]));
    preview.set_code(TITLE_SRC);
    preview.set_code("export default function A({ values }) {\n  return <h2>{values.title}</h2>\n}");
    assert_eq!(preview.mount_generation(), 2);
    assert_eq!(preview.tree().map(|t| t.to_html()).as_deref(), Some("<h2>One</h2>"));
}

#[test]
fn test_edits_forwarded_to_host() {
    let (scope, calls) = recording_scope(&[("title", "One")]);
    let mut preview = LivePreview::new(PreviewOptions::default(), scope);
    preview.set_code(TITLE_SRC);

    preview.apply_edit("title", "Edited");
    assert_eq!(
        *calls.borrow(),
        vec![("title".to_string(), "Edited".to_string())]
    );
}

#[test]
fn test_error_display_replaces_preview() {
    let mut options = PreviewOptions::default();
    options.sandbox.dev = true;
    let mut preview = LivePreview::new(options, scope(&[]));

    assert_eq!(
        preview.set_code("export default function A() {\n  return <p>{nope}</p>\n}"),
        PreviewPhase::Errored
    );
    assert!(preview.tree().is_none());

    let display = preview.error_display().unwrap();
    assert_eq!(display.code, ERR_RUNTIME);
    assert_eq!(display.message, "ReferenceError: nope is not defined");
    assert!(display.code_dump.is_some());

    let state = preview.state();
    assert_eq!(state.phase, PreviewPhase::Errored);
    assert!(state.html.is_none());

    assert_eq!(preview.set_code(TITLE_SRC), PreviewPhase::Rendered);
    assert!(preview.error().is_none());
}

#[test]
fn test_truncated_source_warns_and_still_renders() {
    let mut preview = LivePreview::new(PreviewOptions::default(), scope(&[("title", "T")]));
    let phase = preview.set_code("export default function A({ values }) {\n  return <h1>{values.title}</h1>");

    assert_eq!(phase, PreviewPhase::Rendered);
    assert_eq!(preview.warnings(), &[DiagnosticWarning::UnbalancedBraces]);
    assert_eq!(preview.script().map(|s| s.appended_braces), Some(1));

    preview.dismiss_warnings();
    assert!(preview.warnings().is_empty());
    assert!(preview.state().warnings.is_empty());

    preview.set_code("export default function A({ values }) {\n  return <h1>{values.title}</h1>");
    assert_eq!(preview.warnings().len(), 1);
}

#[test]
fn test_orphan_brace_warns_and_still_renders() {
    let mut preview = LivePreview::new(PreviewOptions::default(), scope(&[]));
    let phase = preview.set_code("export default function A() {\n  return <div />\n}\n}\nconst note = 1;");

    assert!(preview.warnings().contains(&DiagnosticWarning::OrphanClosingBrace));
    assert_eq!(phase, PreviewPhase::Rendered);
    assert_eq!(preview.script().map(|s| s.removed_braces), Some(1));
    assert_eq!(preview.tree().map(|t| t.to_html()).as_deref(), Some("<div></div>"));
}
