//! Native globals and methods available to evaluated code.
//!
//! Hooks are stand-ins for a single stateless render: state setters do
//! nothing, effects never run, memos are computed eagerly.

use std::rc::Rc;

use oxc_span::Span;

use crate::interpreter::{error_object, to_int32, Eval, Interpreter, MAX_STRING_LENGTH};
use crate::options::SandboxOptions;
use crate::value::{
    format_number, from_json, strict_equals, to_json, Builtin, Closure, Env, Intrinsic, Value,
};

const STRING_METHODS: &[&str] = &[
    "trim",
    "trimStart",
    "trimEnd",
    "toUpperCase",
    "toLowerCase",
    "split",
    "includes",
    "startsWith",
    "endsWith",
    "replace",
    "replaceAll",
    "slice",
    "substring",
    "charAt",
    "indexOf",
    "padStart",
    "padEnd",
    "repeat",
    "concat",
    "toString",
    "at",
];

const ARRAY_METHODS: &[&str] = &[
    "map", "filter", "find", "findIndex", "some", "every", "forEach", "reduce", "join", "slice",
    "includes", "indexOf", "concat", "push", "pop", "shift", "unshift", "flat", "flatMap",
    "reverse", "sort", "at",
];

const NUMBER_METHODS: &[&str] = &["toFixed", "toString", "toLocaleString"];

const FUNCTION_METHODS: &[&str] = &["bind", "call", "apply"];

// ═══════════════════════════════════════════════════════════════════════════════
// GLOBALS
// ═══════════════════════════════════════════════════════════════════════════════

fn namespace<'a>(members: &[(&str, Value<'a>)]) -> Value<'a> {
    Value::object(
        members
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    )
}

/// Bind the runtime globals plus the mapping, mutator and editable
/// primitive under their configured names.
pub(crate) fn install_globals<'a>(
    env: &Env<'a>,
    options: &SandboxOptions,
    mapping: &Value<'a>,
    mapping_name: &str,
    mutator_name: &str,
) {
    use Builtin::*;

    let hooks = [
        ("useState", Value::Builtin(UseState)),
        ("useEffect", Value::Builtin(UseEffect)),
        ("useLayoutEffect", Value::Builtin(UseEffect)),
        ("useMemo", Value::Builtin(UseMemo)),
        ("useCallback", Value::Builtin(UseCallback)),
        ("useRef", Value::Builtin(UseRef)),
        ("useReducer", Value::Builtin(UseReducer)),
    ];

    let mut react = vec![
        ("createElement", Value::Builtin(CreateElement)),
        ("Fragment", Value::Intrinsic(Intrinsic::Fragment)),
        ("Component", Value::Intrinsic(Intrinsic::ComponentBase)),
        ("PureComponent", Value::Intrinsic(Intrinsic::ComponentBase)),
    ];
    react.extend(hooks.iter().cloned());
    env.declare("React", namespace(&react), false);
    for (name, value) in hooks {
        env.declare(name, value, false);
    }
    env.declare("Fragment", Value::Intrinsic(Intrinsic::Fragment), false);

    env.declare(
        "Object",
        namespace(&[
            ("keys", Value::Builtin(ObjectKeys)),
            ("values", Value::Builtin(ObjectValues)),
            ("entries", Value::Builtin(ObjectEntries)),
            ("assign", Value::Builtin(ObjectAssign)),
            ("freeze", Value::Builtin(ObjectFreeze)),
        ]),
        false,
    );
    env.declare(
        "Array",
        namespace(&[
            ("isArray", Value::Builtin(ArrayIsArray)),
            ("from", Value::Builtin(ArrayFrom)),
        ]),
        false,
    );
    env.declare(
        "JSON",
        namespace(&[
            ("parse", Value::Builtin(JsonParse)),
            ("stringify", Value::Builtin(JsonStringify)),
        ]),
        false,
    );
    env.declare(
        "Math",
        namespace(&[
            ("max", Value::Builtin(MathMax)),
            ("min", Value::Builtin(MathMin)),
            ("round", Value::Builtin(MathRound)),
            ("floor", Value::Builtin(MathFloor)),
            ("ceil", Value::Builtin(MathCeil)),
            ("abs", Value::Builtin(MathAbs)),
            ("random", Value::Builtin(MathRandom)),
            ("PI", Value::Number(std::f64::consts::PI)),
        ]),
        false,
    );
    env.declare(
        "console",
        namespace(&[
            ("log", Value::Builtin(ConsoleLog)),
            ("info", Value::Builtin(ConsoleLog)),
            ("warn", Value::Builtin(ConsoleWarn)),
            ("error", Value::Builtin(ConsoleError)),
        ]),
        false,
    );

    for (name, builtin) in [
        ("String", StringCtor),
        ("Number", NumberCtor),
        ("Boolean", BooleanCtor),
        ("parseInt", ParseInt),
        ("parseFloat", ParseFloat),
        ("isNaN", IsNaN),
        ("Error", ErrorCtor),
        ("TypeError", ErrorCtor),
        ("Date", DateCtor),
    ] {
        env.declare(name, Value::Builtin(builtin), false);
    }

    env.declare(
        &options.editable_name,
        Value::Intrinsic(Intrinsic::EditableText),
        false,
    );
    env.declare(mapping_name, mapping.clone(), false);
    env.declare(mutator_name, Value::Builtin(Mutator), false);
}

fn arg<'a>(args: &[Value<'a>], idx: usize) -> Value<'a> {
    args.get(idx).cloned().unwrap_or(Value::Undefined)
}

fn console_line(args: &[Value<'_>]) -> String {
    args.iter()
        .map(|v| match v {
            Value::Str(s) => s.to_string(),
            Value::Object(_) | Value::Array(_) => to_json(v)
                .map(|json| json.to_string())
                .unwrap_or_else(|| v.to_js_string()),
            other => other.to_js_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILTIN CALLS
// ═══════════════════════════════════════════════════════════════════════════════

pub(crate) fn call_builtin<'a>(
    interp: &mut Interpreter<'a>,
    builtin: Builtin,
    _this: Option<Value<'a>>,
    args: Vec<Value<'a>>,
    span: Span,
) -> Eval<'a, Value<'a>> {
    use Builtin::*;

    Ok(match builtin {
        ObjectKeys => Value::array(
            interp
                .own_entries(&arg(&args, 0))
                .into_iter()
                .map(|(k, _)| Value::str(k))
                .collect(),
        ),
        ObjectValues => Value::array(
            interp
                .own_entries(&arg(&args, 0))
                .into_iter()
                .map(|(_, v)| v)
                .collect(),
        ),
        ObjectEntries => Value::array(
            interp
                .own_entries(&arg(&args, 0))
                .into_iter()
                .map(|(k, v)| Value::array(vec![Value::str(k), v]))
                .collect(),
        ),
        ObjectAssign => {
            let target = arg(&args, 0);
            for source in args.iter().skip(1) {
                for (key, value) in interp.own_entries(source) {
                    interp.set_member(&target, &key, value, span)?;
                }
            }
            target
        }
        ObjectFreeze => arg(&args, 0),
        ArrayIsArray => Value::Bool(matches!(arg(&args, 0), Value::Array(_))),
        ArrayFrom => {
            let source = arg(&args, 0);
            let items = match &source {
                Value::Object(obj) => {
                    let len = obj.borrow().get("length").map(|v| v.to_number()).unwrap_or(0.0);
                    let len = if len > 0.0 { len.trunc() } else { 0.0 };
                    vec![Value::Undefined; interp.array_length(len, span)?]
                }
                Value::Array(_) | Value::Str(_) => interp.iterate(&source, span)?,
                _ => Vec::new(),
            };
            let mapper = arg(&args, 1);
            if mapper.is_callable() {
                let mut mapped = Vec::with_capacity(items.len());
                for (idx, item) in items.into_iter().enumerate() {
                    mapped.push(interp.call(&mapper, None, vec![item, Value::Number(idx as f64)], span)?);
                }
                Value::array(mapped)
            } else {
                Value::array(items)
            }
        }
        JsonParse => {
            let text = arg(&args, 0).to_js_string();
            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(json) => from_json(&json),
                Err(e) => {
                    return Err(interp.throw_error(
                        "SyntaxError",
                        format!("JSON.parse: {}", e),
                        span,
                    ))
                }
            }
        }
        JsonStringify => {
            let Some(json) = to_json(&arg(&args, 0)) else {
                return Ok(Value::Undefined);
            };
            let indent = match arg(&args, 2) {
                Value::Number(n) if n >= 1.0 => " ".repeat((n as usize).min(10)),
                Value::Str(s) => s.chars().take(10).collect(),
                _ => String::new(),
            };
            Value::str(stringify(&json, &indent))
        }
        MathMax => Value::Number(args.iter().fold(f64::NEG_INFINITY, |acc, v| {
            let n = v.to_number();
            if n.is_nan() || acc.is_nan() {
                f64::NAN
            } else {
                acc.max(n)
            }
        })),
        MathMin => Value::Number(args.iter().fold(f64::INFINITY, |acc, v| {
            let n = v.to_number();
            if n.is_nan() || acc.is_nan() {
                f64::NAN
            } else {
                acc.min(n)
            }
        })),
        MathRound => Value::Number((arg(&args, 0).to_number() + 0.5).floor()),
        MathFloor => Value::Number(arg(&args, 0).to_number().floor()),
        MathCeil => Value::Number(arg(&args, 0).to_number().ceil()),
        MathAbs => Value::Number(arg(&args, 0).to_number().abs()),
        MathRandom => Value::Number(interp.next_random()),
        StringCtor => match args.first() {
            Some(v) => Value::str(v.to_js_string()),
            None => Value::str(""),
        },
        NumberCtor => Value::Number(args.first().map(|v| v.to_number()).unwrap_or(0.0)),
        BooleanCtor => Value::Bool(arg(&args, 0).truthy()),
        ParseInt => {
            let radix = match arg(&args, 1) {
                Value::Undefined => 10,
                other => to_int32(other.to_number()) as u32,
            };
            Value::Number(parse_int(&arg(&args, 0).to_js_string(), radix))
        }
        ParseFloat => Value::Number(parse_float(&arg(&args, 0).to_js_string())),
        IsNaN => Value::Bool(arg(&args, 0).to_number().is_nan()),
        ErrorCtor => {
            let message = match arg(&args, 0) {
                Value::Undefined => String::new(),
                other => other.to_js_string(),
            };
            error_object("Error", &message)
        }
        DateCtor => date_object(date_time_value(&args)),
        ConsoleLog => {
            log::info!("[PreviewNative] console: {}", console_line(&args));
            Value::Undefined
        }
        ConsoleWarn => {
            log::warn!("[PreviewNative] console: {}", console_line(&args));
            Value::Undefined
        }
        ConsoleError => {
            log::error!("[PreviewNative] console: {}", console_line(&args));
            Value::Undefined
        }
        CreateElement => {
            let mut args = args.into_iter();
            let kind = args.next().unwrap_or(Value::Undefined);
            let props = match args.next() {
                Some(props) if !props.is_nullish() => interp.own_entries(&props),
                _ => Vec::new(),
            };
            let nodes = interp.mount(kind, props, args.collect(), span)?;
            Value::Markup(Rc::new(nodes))
        }
        UseState => {
            let initial = arg(&args, 0);
            let initial = if initial.is_callable() {
                interp.call(&initial, None, vec![], span)?
            } else {
                initial
            };
            Value::array(vec![initial, Value::Builtin(Noop)])
        }
        UseReducer => {
            let initial = arg(&args, 1);
            let init = arg(&args, 2);
            let initial = if init.is_callable() {
                interp.call(&init, None, vec![initial], span)?
            } else {
                initial
            };
            Value::array(vec![initial, Value::Builtin(Noop)])
        }
        UseMemo => {
            let factory = arg(&args, 0);
            if factory.is_callable() {
                interp.call(&factory, None, vec![], span)?
            } else {
                Value::Undefined
            }
        }
        UseCallback => arg(&args, 0),
        UseRef => Value::object(vec![("current".to_string(), arg(&args, 0))]),
        UseEffect | Noop => Value::Undefined,
        Mutator => {
            let key = arg(&args, 0).to_js_string();
            let value = match arg(&args, 1) {
                Value::Undefined => String::new(),
                other => other.to_js_string(),
            };
            interp.record_edit(key, value);
            Value::Undefined
        }
    })
}

fn stringify(json: &serde_json::Value, indent: &str) -> String {
    use serde::Serialize;

    if indent.is_empty() {
        return json.to_string();
    }
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    match json.serialize(&mut serializer) {
        Ok(()) => String::from_utf8(out).unwrap_or_default(),
        Err(_) => json.to_string(),
    }
}

fn parse_int(text: &str, radix: u32) -> f64 {
    let mut s = text.trim_start();
    let mut sign = 1.0;
    if let Some(rest) = s.strip_prefix('-') {
        sign = -1.0;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }

    let mut radix = if radix == 0 { 10 } else { radix };
    if radix == 16 || radix == 10 {
        if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            if radix == 16 || text.trim_start().len() > 1 {
                radix = 16;
                s = rest;
            }
        }
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }

    let digits: String = s.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let value = digits
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0.0, |acc, d| acc * radix as f64 + d as f64);
    sign * value
}

fn parse_float(text: &str) -> f64 {
    let s = text.trim_start();
    for (prefix, value) in [
        ("Infinity", f64::INFINITY),
        ("+Infinity", f64::INFINITY),
        ("-Infinity", f64::NEG_INFINITY),
    ] {
        if s.starts_with(prefix) {
            return value;
        }
    }

    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        end = frac_end;
    }
    if digits == 0 {
        return f64::NAN;
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    s[..end].parse::<f64>().unwrap_or(f64::NAN)
}

// ═══════════════════════════════════════════════════════════════════════════════
// METHODS
// ═══════════════════════════════════════════════════════════════════════════════

/// Whether `name` resolves to a native method on `receiver`.
pub(crate) fn has_method(receiver: &Value<'_>, name: &str) -> bool {
    match receiver {
        Value::Str(_) => STRING_METHODS.contains(&name),
        Value::Array(_) => ARRAY_METHODS.contains(&name),
        Value::Number(_) => NUMBER_METHODS.contains(&name),
        Value::Builtin(Builtin::DateCtor) => name == "now",
        Value::Function(_) | Value::Builtin(_) | Value::Method(_) => {
            FUNCTION_METHODS.contains(&name)
        }
        _ => false,
    }
}

pub(crate) fn call_method<'a>(
    interp: &mut Interpreter<'a>,
    receiver: &Value<'a>,
    name: &str,
    args: Vec<Value<'a>>,
    span: Span,
) -> Eval<'a, Value<'a>> {
    match receiver {
        Value::Str(s) => string_method(interp, s, name, &args, span),
        Value::Array(_) => array_method(interp, receiver, name, args, span),
        Value::Number(n) => Ok(number_method(*n, name, &args)),
        Value::Builtin(Builtin::DateCtor) if name == "now" => Ok(Value::Number(now_millis())),
        _ => function_method(interp, receiver, name, args, span),
    }
}

fn function_method<'a>(
    interp: &mut Interpreter<'a>,
    receiver: &Value<'a>,
    name: &str,
    args: Vec<Value<'a>>,
    span: Span,
) -> Eval<'a, Value<'a>> {
    let mut args = args.into_iter();
    let this = args.next().unwrap_or(Value::Undefined);
    match name {
        "bind" => match receiver {
            Value::Function(closure) => Ok(Value::Function(Rc::new(Closure {
                name: format!("bound {}", closure.name),
                callable: closure.callable,
                env: closure.env.clone(),
                this: Some(this),
            }))),
            other => Ok(other.clone()),
        },
        "call" => interp.call(receiver, Some(this), args.collect(), span),
        "apply" => {
            let list = match args.next() {
                Some(list) if !list.is_nullish() => interp.iterate(&list, span)?,
                _ => Vec::new(),
            };
            interp.call(receiver, Some(this), list, span)
        }
        _ => Ok(Value::Undefined),
    }
}

/// Resolve a possibly negative index against `len`, clamped to `0..=len`.
fn relative_index(value: &Value<'_>, len: usize, default: usize) -> usize {
    match value {
        Value::Undefined => default,
        other => {
            let n = other.to_number();
            if n.is_nan() {
                0
            } else if n < 0.0 {
                (len as f64 + n.trunc()).max(0.0) as usize
            } else {
                (n.trunc() as usize).min(len)
            }
        }
    }
}

fn string_method<'a>(
    interp: &mut Interpreter<'a>,
    s: &str,
    name: &str,
    args: &[Value<'a>],
    span: Span,
) -> Eval<'a, Value<'a>> {
    let text_arg = |idx: usize| arg(args, idx).to_js_string();
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    let substring = |start: usize, end: usize| -> String {
        if start >= end {
            String::new()
        } else {
            chars[start..end].iter().collect()
        }
    };

    Ok(match name {
        "trim" => Value::str(s.trim()),
        "trimStart" => Value::str(s.trim_start()),
        "trimEnd" => Value::str(s.trim_end()),
        "toUpperCase" => Value::str(s.to_uppercase()),
        "toLowerCase" => Value::str(s.to_lowercase()),
        "toString" => Value::str(s),
        "split" => {
            let parts: Vec<Value<'a>> = match arg(args, 0) {
                Value::Undefined => vec![Value::str(s)],
                sep => {
                    let sep = sep.to_js_string();
                    if sep.is_empty() {
                        chars.iter().map(|c| Value::str(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str()).map(Value::str).collect()
                    }
                }
            };
            Value::array(parts)
        }
        "includes" => Value::Bool(s.contains(text_arg(0).as_str())),
        "startsWith" => Value::Bool(s.starts_with(text_arg(0).as_str())),
        "endsWith" => Value::Bool(s.ends_with(text_arg(0).as_str())),
        "indexOf" => {
            let needle = text_arg(0);
            Value::Number(match s.find(needle.as_str()) {
                Some(byte) => s[..byte].chars().count() as f64,
                None => -1.0,
            })
        }
        "replace" | "replaceAll" => {
            let pattern = text_arg(0);
            let replacement = arg(args, 1);
            let all = name == "replaceAll";
            let mut out = String::new();
            let mut rest = s;
            let mut replaced = false;
            while let Some(byte) = rest.find(pattern.as_str()) {
                if replaced && !all {
                    break;
                }
                out.push_str(&rest[..byte]);
                let piece = if replacement.is_callable() {
                    interp
                        .call(&replacement, None, vec![Value::str(&pattern)], span)?
                        .to_js_string()
                } else {
                    replacement.to_js_string()
                };
                out.push_str(&piece);
                rest = &rest[byte + pattern.len()..];
                replaced = true;
                if pattern.is_empty() {
                    break;
                }
            }
            out.push_str(rest);
            Value::str(out)
        }
        "slice" => {
            let start = relative_index(&arg(args, 0), len, 0);
            let end = relative_index(&arg(args, 1), len, len);
            Value::str(substring(start, end))
        }
        "substring" => {
            let clamp = |v: Value<'a>, default: usize| match v {
                Value::Undefined => default,
                other => {
                    let n = other.to_number();
                    if n.is_nan() || n < 0.0 {
                        0
                    } else {
                        (n as usize).min(len)
                    }
                }
            };
            let a = clamp(arg(args, 0), 0);
            let b = clamp(arg(args, 1), len);
            Value::str(substring(a.min(b), a.max(b)))
        }
        "charAt" => {
            let idx = arg(args, 0).to_number();
            let idx = if idx.is_nan() { 0.0 } else { idx };
            match chars.get(idx as usize) {
                Some(c) if idx >= 0.0 => Value::str(c.to_string()),
                _ => Value::str(""),
            }
        }
        "at" => {
            let n = arg(args, 0).to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            let idx = if n < 0.0 { len as f64 + n } else { n };
            match chars.get(idx as usize) {
                Some(c) if idx >= 0.0 => Value::str(c.to_string()),
                _ => Value::Undefined,
            }
        }
        "padStart" | "padEnd" => {
            let target = arg(args, 0).to_number();
            let fill = match arg(args, 1) {
                Value::Undefined => " ".to_string(),
                other => other.to_js_string(),
            };
            if target > MAX_STRING_LENGTH as f64 {
                return Err(interp.throw_error("RangeError", "Invalid string length", span));
            }
            let target = if target.is_nan() { 0 } else { target as usize };
            if target <= len || fill.is_empty() {
                Value::str(s)
            } else {
                let pad: String = fill.chars().cycle().take(target - len).collect();
                if name == "padStart" {
                    Value::str(format!("{}{}", pad, s))
                } else {
                    Value::str(format!("{}{}", s, pad))
                }
            }
        }
        "repeat" => {
            let count = arg(args, 0).to_number();
            if count < 0.0 || count.is_infinite() {
                return Err(interp.throw_error("RangeError", "Invalid count value", span));
            }
            let count = if count.is_nan() { 0.0 } else { count.trunc() };
            if s.len() as f64 * count > MAX_STRING_LENGTH as f64 {
                return Err(interp.throw_error("RangeError", "Invalid string length", span));
            }
            Value::str(s.repeat(count as usize))
        }
        "concat" => {
            let mut out = s.to_string();
            for value in args {
                out.push_str(&value.to_js_string());
                interp.check_string_length(out.len(), span)?;
            }
            Value::str(out)
        }
        _ => Value::Undefined,
    })
}

fn callback<'a>(interp: &Interpreter<'a>, value: &Value<'a>, span: Span) -> Eval<'a, Value<'a>> {
    if value.is_callable() {
        Ok(value.clone())
    } else {
        Err(interp.throw_error(
            "TypeError",
            format!("{} is not a function", value.describe()),
            span,
        ))
    }
}

fn flatten_into<'a>(items: Vec<Value<'a>>, depth: usize, out: &mut Vec<Value<'a>>) {
    for item in items {
        match &item {
            Value::Array(inner) if depth > 0 => {
                let inner = inner.borrow().clone();
                flatten_into(inner, depth - 1, out);
            }
            _ => out.push(item),
        }
    }
}

fn array_method<'a>(
    interp: &mut Interpreter<'a>,
    receiver: &Value<'a>,
    name: &str,
    args: Vec<Value<'a>>,
    span: Span,
) -> Eval<'a, Value<'a>> {
    let Value::Array(array) = receiver else {
        return Ok(Value::Undefined);
    };
    let items = array.borrow().clone();
    let len = items.len();

    // Iteration callbacks receive (item, index, array).
    let iteration_args =
        |item: &Value<'a>, idx: usize| vec![item.clone(), Value::Number(idx as f64), receiver.clone()];

    Ok(match name {
        "map" => {
            let f = callback(interp, &arg(&args, 0), span)?;
            let mut out = Vec::with_capacity(len);
            for (idx, item) in items.iter().enumerate() {
                out.push(interp.call(&f, None, iteration_args(item, idx), span)?);
            }
            Value::array(out)
        }
        "filter" => {
            let f = callback(interp, &arg(&args, 0), span)?;
            let mut out = Vec::new();
            for (idx, item) in items.iter().enumerate() {
                if interp.call(&f, None, iteration_args(item, idx), span)?.truthy() {
                    out.push(item.clone());
                }
            }
            Value::array(out)
        }
        "find" | "findIndex" => {
            let f = callback(interp, &arg(&args, 0), span)?;
            for (idx, item) in items.iter().enumerate() {
                if interp.call(&f, None, iteration_args(item, idx), span)?.truthy() {
                    return Ok(if name == "find" {
                        item.clone()
                    } else {
                        Value::Number(idx as f64)
                    });
                }
            }
            if name == "find" {
                Value::Undefined
            } else {
                Value::Number(-1.0)
            }
        }
        "some" | "every" => {
            let f = callback(interp, &arg(&args, 0), span)?;
            let want = name == "some";
            for (idx, item) in items.iter().enumerate() {
                if interp.call(&f, None, iteration_args(item, idx), span)?.truthy() == want {
                    return Ok(Value::Bool(want));
                }
            }
            Value::Bool(!want)
        }
        "forEach" => {
            let f = callback(interp, &arg(&args, 0), span)?;
            for (idx, item) in items.iter().enumerate() {
                interp.call(&f, None, iteration_args(item, idx), span)?;
            }
            Value::Undefined
        }
        "reduce" => {
            let f = callback(interp, &arg(&args, 0), span)?;
            let mut iter = items.iter().enumerate();
            let mut acc = match args.get(1) {
                Some(initial) => initial.clone(),
                None => match iter.next() {
                    Some((_, first)) => first.clone(),
                    None => {
                        return Err(interp.throw_error(
                            "TypeError",
                            "Reduce of empty array with no initial value",
                            span,
                        ))
                    }
                },
            };
            for (idx, item) in iter {
                acc = interp.call(
                    &f,
                    None,
                    vec![acc, item.clone(), Value::Number(idx as f64), receiver.clone()],
                    span,
                )?;
            }
            acc
        }
        "join" => {
            let sep = match arg(&args, 0) {
                Value::Undefined => ",".to_string(),
                other => other.to_js_string(),
            };
            let mut out = String::new();
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push_str(&sep);
                }
                if !item.is_nullish() {
                    out.push_str(&item.to_js_string());
                }
                interp.check_string_length(out.len(), span)?;
            }
            Value::str(out)
        }
        "slice" => {
            let start = relative_index(&arg(&args, 0), len, 0);
            let end = relative_index(&arg(&args, 1), len, len);
            Value::array(if start < end {
                items[start..end].to_vec()
            } else {
                Vec::new()
            })
        }
        "includes" => {
            let needle = arg(&args, 0);
            Value::Bool(items.iter().any(|v| {
                strict_equals(v, &needle)
                    || matches!((v, &needle), (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan())
            }))
        }
        "indexOf" => {
            let needle = arg(&args, 0);
            Value::Number(
                items
                    .iter()
                    .position(|v| strict_equals(v, &needle))
                    .map(|i| i as f64)
                    .unwrap_or(-1.0),
            )
        }
        "concat" => {
            let total: usize = args
                .iter()
                .map(|value| match value {
                    Value::Array(more) => more.borrow().len(),
                    _ => 1,
                })
                .sum();
            interp.array_length((len + total) as f64, span)?;
            let mut out = items;
            for value in args {
                match &value {
                    Value::Array(more) => out.extend(more.borrow().iter().cloned()),
                    _ => out.push(value),
                }
            }
            Value::array(out)
        }
        "push" => {
            interp.array_length((len + args.len()) as f64, span)?;
            let mut target = array.borrow_mut();
            target.extend(args);
            Value::Number(target.len() as f64)
        }
        "unshift" => {
            let mut target = array.borrow_mut();
            for (idx, value) in args.into_iter().enumerate() {
                target.insert(idx, value);
            }
            Value::Number(target.len() as f64)
        }
        "pop" => array.borrow_mut().pop().unwrap_or(Value::Undefined),
        "shift" => {
            let mut target = array.borrow_mut();
            if target.is_empty() {
                Value::Undefined
            } else {
                target.remove(0)
            }
        }
        "flat" => {
            let depth = match arg(&args, 0) {
                Value::Undefined => 1,
                other => other.to_number().max(0.0) as usize,
            };
            let mut out = Vec::new();
            flatten_into(items, depth, &mut out);
            Value::array(out)
        }
        "flatMap" => {
            let f = callback(interp, &arg(&args, 0), span)?;
            let mut mapped = Vec::with_capacity(len);
            for (idx, item) in items.iter().enumerate() {
                mapped.push(interp.call(&f, None, iteration_args(item, idx), span)?);
            }
            let mut out = Vec::new();
            flatten_into(mapped, 1, &mut out);
            Value::array(out)
        }
        "reverse" => {
            array.borrow_mut().reverse();
            receiver.clone()
        }
        "sort" => {
            let sorted = sort_values(interp, items, &arg(&args, 0), span)?;
            *array.borrow_mut() = sorted;
            receiver.clone()
        }
        "at" => {
            let n = arg(&args, 0).to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            let idx = if n < 0.0 { len as f64 + n } else { n };
            if idx < 0.0 {
                Value::Undefined
            } else {
                items.get(idx as usize).cloned().unwrap_or(Value::Undefined)
            }
        }
        _ => Value::Undefined,
    })
}

/// Stable insertion sort; the comparator may fail, so `sort_by` is out.
fn sort_values<'a>(
    interp: &mut Interpreter<'a>,
    items: Vec<Value<'a>>,
    comparator: &Value<'a>,
    span: Span,
) -> Eval<'a, Vec<Value<'a>>> {
    let (mut defined, undefined): (Vec<_>, Vec<_>) = items
        .into_iter()
        .partition(|v| !matches!(v, Value::Undefined));

    for i in 1..defined.len() {
        let mut j = i;
        while j > 0 {
            let greater = if comparator.is_callable() {
                let order = interp.call(
                    comparator,
                    None,
                    vec![defined[j - 1].clone(), defined[j].clone()],
                    span,
                )?;
                order.to_number() > 0.0
            } else {
                defined[j - 1].to_js_string() > defined[j].to_js_string()
            };
            if !greater {
                break;
            }
            defined.swap(j - 1, j);
            j -= 1;
        }
    }
    defined.extend(undefined);
    Ok(defined)
}

fn number_method<'a>(n: f64, name: &str, args: &[Value<'a>]) -> Value<'a> {
    match name {
        "toFixed" => {
            let digits = arg(args, 0).to_number();
            let digits = if digits.is_nan() { 0 } else { digits.clamp(0.0, 100.0) as usize };
            if !n.is_finite() {
                Value::str(format_number(n))
            } else {
                Value::str(format!("{:.*}", digits, n))
            }
        }
        "toString" => match arg(args, 0) {
            Value::Undefined => Value::str(format_number(n)),
            radix => {
                let radix = radix.to_number() as u32;
                if radix == 10 || !(2..=36).contains(&radix) || n.fract() != 0.0 || !n.is_finite() {
                    Value::str(format_number(n))
                } else {
                    Value::str(integer_to_radix(n as i64, radix))
                }
            }
        },
        "toLocaleString" => Value::str(locale_number(n)),
        _ => date_method(n, name),
    }
}

fn integer_to_radix(mut n: i64, radix: u32) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let negative = n < 0;
    let mut digits = Vec::new();
    while n != 0 {
        let d = (n % radix as i64).unsigned_abs() as u32;
        digits.push(std::char::from_digit(d, radix).unwrap_or('0'));
        n /= radix as i64;
    }
    if negative {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

/// en-US grouping with at most three fraction digits.
fn locale_number(n: f64) -> String {
    if !n.is_finite() {
        return format_number(n);
    }
    let fixed = format!("{:.3}", n.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let frac_part = frac_part.trim_end_matches('0');

    let mut grouped = String::new();
    for (idx, c) in int_part.chars().enumerate() {
        if idx > 0 && (int_part.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if n < 0.0 && (int_part != "0" || !frac_part.is_empty()) { "-" } else { "" };
    if frac_part.is_empty() {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{}", sign, grouped, frac_part)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DATES (UTC)
// ═══════════════════════════════════════════════════════════════════════════════

const MS_PER_DAY: f64 = 86_400_000.0;
const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];
const DATE_METHODS: &[&str] = &[
    "getFullYear",
    "getMonth",
    "getDate",
    "getDay",
    "getHours",
    "getMinutes",
    "getSeconds",
    "getTime",
    "valueOf",
    "toISOString",
    "toLocaleDateString",
    "toDateString",
];

fn now_millis() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as f64)
        .unwrap_or(0.0)
}

/// Days since the epoch to (year, month 1-12, day).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (year, month, day)
}

fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    // Normalize out-of-range months the way Date.UTC does.
    let year = year + (month - 1).div_euclid(12);
    let month = (month - 1).rem_euclid(12) + 1;
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y.rem_euclid(400);
    let mp = if month > 2 { month - 3 } else { month + 9 };
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn parse_date(text: &str) -> f64 {
    let text = text.trim();
    let (date, time) = match text.split_once('T').or_else(|| text.split_once(' ')) {
        Some((d, t)) => (d, t.trim_end_matches('Z')),
        None => (text, ""),
    };
    let parts: Vec<i64> = date.split('-').filter_map(|p| p.parse().ok()).collect();
    if parts.is_empty() || parts.len() != date.split('-').count() {
        return f64::NAN;
    }
    let year = parts[0];
    let month = parts.get(1).copied().unwrap_or(1);
    let day = parts.get(2).copied().unwrap_or(1);

    let mut ms = 0.0;
    if !time.is_empty() {
        let time = time.split(['+', '.']).next().unwrap_or("");
        let fields: Vec<f64> = time.split(':').filter_map(|p| p.parse().ok()).collect();
        let unit = [3_600_000.0, 60_000.0, 1000.0];
        ms = fields.iter().zip(unit).map(|(v, u)| v * u).sum();
    }
    days_from_civil(year, month, day) as f64 * MS_PER_DAY + ms
}

fn date_time_value(args: &[Value<'_>]) -> f64 {
    match args {
        [] => now_millis(),
        [Value::Str(s)] => parse_date(s),
        [single] => single.to_number(),
        _ => {
            let field = |idx: usize, default: f64| args.get(idx).map(|v| v.to_number()).unwrap_or(default);
            let days = days_from_civil(field(0, 1970.0) as i64, field(1, 0.0) as i64 + 1, field(2, 1.0) as i64);
            days as f64 * MS_PER_DAY
                + field(3, 0.0) * 3_600_000.0
                + field(4, 0.0) * 60_000.0
                + field(5, 0.0) * 1000.0
        }
    }
}

/// A date is a plain object whose methods close over the timestamp.
fn date_object<'a>(time: f64) -> Value<'a> {
    let receiver = Value::Number(time);
    Value::object(
        DATE_METHODS
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    Value::Method(Rc::new(crate::value::BoundMethod {
                        receiver: receiver.clone(),
                        name: name.to_string(),
                    })),
                )
            })
            .collect(),
    )
}

fn date_method<'a>(time: f64, name: &str) -> Value<'a> {
    if !DATE_METHODS.contains(&name) {
        return Value::Undefined;
    }
    if time.is_nan() {
        return match name {
            "toISOString" | "toLocaleDateString" | "toDateString" => Value::str("Invalid Date"),
            _ => Value::Number(f64::NAN),
        };
    }

    let days = (time / MS_PER_DAY).floor() as i64;
    let ms_of_day = time - days as f64 * MS_PER_DAY;
    let (year, month, day) = civil_from_days(days);
    let weekday = (days + 4).rem_euclid(7) as usize;
    let hours = (ms_of_day / 3_600_000.0).floor();
    let minutes = ((ms_of_day % 3_600_000.0) / 60_000.0).floor();
    let seconds = ((ms_of_day % 60_000.0) / 1000.0).floor();
    let millis = (ms_of_day % 1000.0).floor();

    match name {
        "getFullYear" => Value::Number(year as f64),
        "getMonth" => Value::Number((month - 1) as f64),
        "getDate" => Value::Number(day as f64),
        "getDay" => Value::Number(weekday as f64),
        "getHours" => Value::Number(hours),
        "getMinutes" => Value::Number(minutes),
        "getSeconds" => Value::Number(seconds),
        "getTime" | "valueOf" => Value::Number(time),
        "toISOString" => Value::str(format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
            year, month, day, hours as u32, minutes as u32, seconds as u32, millis as u32
        )),
        "toLocaleDateString" => Value::str(format!("{}/{}/{}", month, day, year)),
        "toDateString" => Value::str(format!(
            "{} {} {:02} {:04}",
            WEEKDAYS[weekday],
            MONTHS[(month - 1) as usize],
            day,
            year
        )),
        _ => Value::Undefined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int_and_float() {
        assert_eq!(parse_int("42px", 10), 42.0);
        assert_eq!(parse_int("  -7", 10), -7.0);
        assert_eq!(parse_int("0x1F", 10), 31.0);
        assert_eq!(parse_int("ff", 16), 255.0);
        assert!(parse_int("px", 10).is_nan());
        assert_eq!(parse_float("3.5rem"), 3.5);
        assert_eq!(parse_float(".5"), 0.5);
        assert_eq!(parse_float("1e3x"), 1000.0);
        assert!(parse_float("abc").is_nan());
    }

    #[test]
    fn test_locale_number() {
        assert_eq!(locale_number(1234567.0), "1,234,567");
        assert_eq!(locale_number(1234.5), "1,234.5");
        assert_eq!(locale_number(-999.0), "-999");
        assert_eq!(locale_number(0.1234), "0.123");
    }

    #[test]
    fn test_integer_to_radix() {
        assert_eq!(integer_to_radix(255, 16), "ff");
        assert_eq!(integer_to_radix(-5, 2), "-101");
    }

    #[test]
    fn test_civil_dates() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(days_from_civil(2024, 2, 29), 19_782);
        assert_eq!(civil_from_days(19_782), (2024, 2, 29));
        assert_eq!(days_from_civil(2023, 13, 1), days_from_civil(2024, 1, 1));
    }

    #[test]
    fn test_date_methods() {
        let time = parse_date("2024-03-05T14:30:00Z");
        assert_eq!(date_method(time, "getFullYear").to_number(), 2024.0);
        assert_eq!(date_method(time, "getMonth").to_number(), 2.0);
        assert_eq!(date_method(time, "getHours").to_number(), 14.0);
        assert_eq!(
            date_method(time, "toISOString").to_js_string(),
            "2024-03-05T14:30:00.000Z"
        );
        assert_eq!(date_method(time, "toDateString").to_js_string(), "Tue Mar 05 2024");
        assert_eq!(date_method(f64::NAN, "toISOString").to_js_string(), "Invalid Date");
    }

    #[test]
    fn test_method_tables() {
        assert!(has_method(&Value::str("x"), "trim"));
        assert!(!has_method(&Value::str("x"), "map"));
        assert!(has_method(&Value::array(vec![]), "map"));
        assert!(has_method(&Value::Number(1.0), "toFixed"));
        assert!(has_method(&Value::Builtin(Builtin::DateCtor), "now"));
    }
}
