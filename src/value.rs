//! Runtime values of the preview interpreter.
//!
//! Values borrow function and class bodies straight from the parsed program,
//! so a value never outlives the allocator that owns the AST. Objects and
//! arrays are shared and mutable, the way JavaScript references behave.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use oxc_ast::ast::{ArrowFunctionExpression, Class, Function};

use crate::render::RenderNode;

pub type ObjectRef<'a> = Rc<RefCell<JsObject<'a>>>;
pub type ArrayRef<'a> = Rc<RefCell<Vec<Value<'a>>>>;

#[derive(Clone)]
pub enum Value<'a> {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Array(ArrayRef<'a>),
    Object(ObjectRef<'a>),
    Function(Rc<Closure<'a>>),
    Class(Rc<ClassValue<'a>>),
    Builtin(Builtin),
    /// A builtin method looked up on a primitive or array receiver.
    Method(Rc<BoundMethod<'a>>),
    Intrinsic(Intrinsic),
    /// Already rendered JSX.
    Markup(Rc<Vec<RenderNode>>),
}

/// Globals implemented natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    ObjectKeys,
    ObjectValues,
    ObjectEntries,
    ObjectAssign,
    ObjectFreeze,
    ArrayIsArray,
    ArrayFrom,
    JsonParse,
    JsonStringify,
    MathMax,
    MathMin,
    MathRound,
    MathFloor,
    MathCeil,
    MathAbs,
    MathRandom,
    StringCtor,
    NumberCtor,
    BooleanCtor,
    ParseInt,
    ParseFloat,
    IsNaN,
    ErrorCtor,
    DateCtor,
    ConsoleLog,
    ConsoleWarn,
    ConsoleError,
    CreateElement,
    UseState,
    UseEffect,
    UseMemo,
    UseCallback,
    UseRef,
    UseReducer,
    /// State setters and event methods; a render never observes their effect.
    Noop,
    /// The host mutator (`setValue`).
    Mutator,
}

/// Tags with renderer-level meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    Fragment,
    EditableText,
    /// `React.Component` / `React.PureComponent` as a base class.
    ComponentBase,
}

#[derive(Clone, Copy)]
pub enum Callable<'a> {
    Function(&'a Function<'a>),
    Arrow(&'a ArrowFunctionExpression<'a>),
}

pub struct Closure<'a> {
    pub name: String,
    pub callable: Callable<'a>,
    pub env: Env<'a>,
    /// Receiver bound by `.bind()` or method lookup.
    pub this: Option<Value<'a>>,
}

pub struct ClassValue<'a> {
    pub name: String,
    pub class: &'a Class<'a>,
    pub env: Env<'a>,
}

pub struct BoundMethod<'a> {
    pub receiver: Value<'a>,
    pub name: String,
}

/// Insertion-ordered property bag. Class instances remember their class so
/// method lookups fall through to it.
#[derive(Default)]
pub struct JsObject<'a> {
    pub entries: Vec<(String, Value<'a>)>,
    pub class: Option<Rc<ClassValue<'a>>>,
}

impl<'a> JsObject<'a> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            class: None,
        }
    }

    pub fn from_entries(entries: Vec<(String, Value<'a>)>) -> Self {
        let mut object = Self::new();
        for (key, value) in entries {
            object.set(key, value);
        }
        object
    }

    pub fn get(&self, key: &str) -> Option<Value<'a>> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn set(&mut self, key: String, value: Value<'a>) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| k != key);
        before != self.entries.len()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENVIRONMENTS
// ═══════════════════════════════════════════════════════════════════════════════

struct Binding<'a> {
    value: Value<'a>,
    mutable: bool,
}

struct Frame<'a> {
    bindings: RefCell<HashMap<String, Binding<'a>>>,
    parent: Option<Env<'a>>,
}

/// Lexical environment chain.
#[derive(Clone)]
pub struct Env<'a>(Rc<Frame<'a>>);

pub struct WeakEnv<'a>(Weak<Frame<'a>>);

impl<'a> WeakEnv<'a> {
    pub fn upgrade(&self) -> Option<Env<'a>> {
        self.0.upgrade().map(Env)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum AssignError {
    Undeclared,
    Constant,
}

impl<'a> Env<'a> {
    pub fn root() -> Self {
        Env(Rc::new(Frame {
            bindings: RefCell::new(HashMap::new()),
            parent: None,
        }))
    }

    pub fn child(&self) -> Self {
        Env(Rc::new(Frame {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(self.clone()),
        }))
    }

    pub fn declare(&self, name: &str, value: Value<'a>, mutable: bool) {
        self.0
            .bindings
            .borrow_mut()
            .insert(name.to_string(), Binding { value, mutable });
    }

    pub fn downgrade(&self) -> WeakEnv<'a> {
        WeakEnv(Rc::downgrade(&self.0))
    }

    /// Drop every binding. Closures capture their environment, so scopes
    /// form reference cycles that only clearing can break.
    pub fn clear(&self) {
        let bindings = std::mem::take(&mut *self.0.bindings.borrow_mut());
        drop(bindings);
    }

    pub fn lookup(&self, name: &str) -> Option<Value<'a>> {
        let mut current = Some(self);
        while let Some(env) = current {
            if let Some(binding) = env.0.bindings.borrow().get(name) {
                return Some(binding.value.clone());
            }
            current = env.0.parent.as_ref();
        }
        None
    }

    pub fn assign(&self, name: &str, value: Value<'a>) -> Result<(), AssignError> {
        let mut current = Some(self);
        while let Some(env) = current {
            if let Some(binding) = env.0.bindings.borrow_mut().get_mut(name) {
                if !binding.mutable {
                    return Err(AssignError::Constant);
                }
                binding.value = value;
                return Ok(());
            }
            current = env.0.parent.as_ref();
        }
        Err(AssignError::Undeclared)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTRUCTION & COERCION
// ═══════════════════════════════════════════════════════════════════════════════

impl<'a> Value<'a> {
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn array(items: Vec<Value<'a>>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(entries: Vec<(String, Value<'a>)>) -> Self {
        Value::Object(Rc::new(RefCell::new(JsObject::from_entries(entries))))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::Class(_) | Value::Builtin(_) | Value::Method(_)
        )
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Function(_)
            | Value::Class(_)
            | Value::Builtin(_)
            | Value::Method(_)
            | Value::Intrinsic(_) => "function",
            Value::Array(_) | Value::Object(_) | Value::Markup(_) => "object",
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::Str(s) => string_to_number(s),
            Value::Array(items) => {
                let items = items.borrow();
                match items.len() {
                    0 => 0.0,
                    1 => items[0].to_number(),
                    _ => f64::NAN,
                }
            }
            _ => f64::NAN,
        }
    }

    /// `String(value)`.
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Str(s) => s.to_string(),
            Value::Array(items) => items
                .borrow()
                .iter()
                .map(|v| {
                    if v.is_nullish() {
                        String::new()
                    } else {
                        v.to_js_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) | Value::Markup(_) => "[object Object]".to_string(),
            Value::Function(f) => format!("function {}() {{ [code] }}", f.name),
            Value::Class(c) => format!("class {} {{ }}", c.name),
            Value::Builtin(_) | Value::Method(_) | Value::Intrinsic(_) => {
                "function () { [native code] }".to_string()
            }
        }
    }

    /// Short description for error messages.
    pub fn describe(&self) -> String {
        match self {
            Value::Str(s) => format!("\"{}\"", s),
            Value::Array(_) => "array".to_string(),
            Value::Object(_) | Value::Markup(_) => "object".to_string(),
            other if other.is_callable() => "function".to_string(),
            other => other.to_js_string(),
        }
    }
}

pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return i64::from_str_radix(hex, 16)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN);
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
    }
}

/// Number to string the way JavaScript prints it.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if abs >= 1e21 || abs < 1e-6 {
        let formatted = format!("{:e}", n);
        return match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => formatted,
        };
    }
    if n.fract() == 0.0 && abs < 9.007_199_254_740_992e15 {
        return format!("{}", n as i64);
    }
    format!("{}", n)
}

pub fn strict_equals<'a>(a: &Value<'a>, b: &Value<'a>) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
        (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        (Value::Class(x), Value::Class(y)) => Rc::ptr_eq(x, y),
        (Value::Markup(x), Value::Markup(y)) => Rc::ptr_eq(x, y),
        (Value::Builtin(x), Value::Builtin(y)) => x == y,
        (Value::Intrinsic(x), Value::Intrinsic(y)) => x == y,
        _ => false,
    }
}

pub fn loose_equals<'a>(a: &Value<'a>, b: &Value<'a>) -> bool {
    match (a, b) {
        (x, y) if x.is_nullish() && y.is_nullish() => true,
        (x, y) if x.is_nullish() || y.is_nullish() => false,
        (Value::Number(_), Value::Str(_))
        | (Value::Str(_), Value::Number(_))
        | (Value::Bool(_), _)
        | (_, Value::Bool(_)) => {
            let (x, y) = (a.to_number(), b.to_number());
            x == y
        }
        (Value::Array(_) | Value::Object(_), Value::Str(_) | Value::Number(_)) => {
            loose_equals(&Value::str(a.to_js_string()), b)
        }
        (Value::Str(_) | Value::Number(_), Value::Array(_) | Value::Object(_)) => {
            loose_equals(a, &Value::str(b.to_js_string()))
        }
        _ => strict_equals(a, b),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// JSON BRIDGE
// ═══════════════════════════════════════════════════════════════════════════════

pub fn from_json<'a>(json: &serde_json::Value) -> Value<'a> {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::str(s),
        serde_json::Value::Array(items) => Value::array(items.iter().map(from_json).collect()),
        serde_json::Value::Object(map) => Value::object(
            map.iter()
                .map(|(k, v)| (k.clone(), from_json(v)))
                .collect(),
        ),
    }
}

/// `None` for values JSON skips (undefined and functions).
pub fn to_json(value: &Value<'_>) -> Option<serde_json::Value> {
    Some(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 => {
            serde_json::Value::Number(serde_json::Number::from(*n as i64))
        }
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String(s.to_string()),
        Value::Array(items) => serde_json::Value::Array(
            items
                .borrow()
                .iter()
                .map(|v| to_json(v).unwrap_or(serde_json::Value::Null))
                .collect(),
        ),
        Value::Object(object) => {
            let mut map = serde_json::Map::new();
            for (k, v) in &object.borrow().entries {
                if let Some(json) = to_json(v) {
                    map.insert(k.clone(), json);
                }
            }
            serde_json::Value::Object(map)
        }
        Value::Markup(_) => serde_json::Value::Object(serde_json::Map::new()),
        _ => return None,
    })
}

impl fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Builtin(b) => write!(f, "[builtin {:?}]", b),
            Value::Intrinsic(i) => write!(f, "[intrinsic {:?}]", i),
            Value::Markup(nodes) => write!(f, "[markup x{}]", nodes.len()),
            other => f.write_str(&other.to_js_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(1.5e-7), "1.5e-7");
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(string_to_number(" 42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x1f"), 31.0);
        assert!(string_to_number("12px").is_nan());
    }

    #[test]
    fn test_truthiness_and_typeof() {
        assert!(!Value::str("").truthy());
        assert!(Value::str("0").truthy());
        assert!(!Value::Number(f64::NAN).truthy());
        assert!(Value::array(vec![]).truthy());
        assert_eq!(Value::Null.type_of(), "object");
        assert_eq!(Value::Builtin(Builtin::Mutator).type_of(), "function");
    }

    #[test]
    fn test_equality() {
        assert!(loose_equals(&Value::Null, &Value::Undefined));
        assert!(!strict_equals(&Value::Null, &Value::Undefined));
        assert!(loose_equals(&Value::Number(1.0), &Value::str("1")));
        assert!(loose_equals(&Value::Bool(true), &Value::Number(1.0)));
        let arr = Value::array(vec![]);
        assert!(strict_equals(&arr, &arr.clone()));
        assert!(!strict_equals(&arr, &Value::array(vec![])));
    }

    #[test]
    fn test_array_to_string() {
        let arr = Value::array(vec![Value::Number(1.0), Value::Null, Value::str("x")]);
        assert_eq!(arr.to_js_string(), "1,,x");
    }

    #[test]
    fn test_env_const_and_shadowing() {
        let root = Env::root();
        root.declare("a", Value::Number(1.0), false);
        let inner = root.child();
        inner.declare("b", Value::Number(2.0), true);

        assert_eq!(inner.assign("a", Value::Null), Err(AssignError::Constant));
        assert_eq!(inner.assign("c", Value::Null), Err(AssignError::Undeclared));
        assert!(inner.assign("b", Value::Number(3.0)).is_ok());
        assert_eq!(inner.lookup("b").map(|v| v.to_number()), Some(3.0));
        assert!(root.lookup("b").is_none());
    }

    #[test]
    fn test_json_bridge() {
        let json: serde_json::Value = serde_json::from_str(r#"{"a":[1,"x",null],"b":true}"#).unwrap();
        let value = from_json(&json);
        assert_eq!(to_json(&value), Some(json));
        assert_eq!(to_json(&Value::Undefined), None);
    }
}
