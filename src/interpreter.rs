//! Tree-walking evaluator for the preview subset of JavaScript and JSX.
//!
//! The evaluator walks the oxc AST directly. JSX is rendered eagerly: an
//! element expression evaluates to the [`RenderNode`]s it produces, so a
//! component call returns finished markup. Event handlers are never run
//! as part of a render; they are only trial-called to find which key they edit.

use std::rc::Rc;

use oxc_ast::ast::*;
use oxc_span::{GetSpan, Span};
use oxc_syntax::operator::LogicalOperator;

use crate::builtins;
use crate::error::{SandboxError, SourceLocation};
use crate::options::SandboxOptions;
use crate::render::{
    css_number_value, css_property_name, AttributeValue, EditableNode, ElementNode, RenderAttribute,
    RenderNode, RenderedTree, TextNode,
};
use crate::value::{
    format_number, loose_equals, strict_equals, AssignError, Builtin, Callable, ClassValue,
    Closure, Env, Intrinsic, JsObject, Value, WeakEnv,
};

/// Upper bound on iterations of a single loop statement.
const MAX_LOOP_ITERATIONS: usize = 100_000;

/// Longest array a script may materialize. Lengths up to 2^32-1 are legal
/// JavaScript but every slot is allocated here.
pub(crate) const MAX_ARRAY_LENGTH: usize = 1 << 24;

/// Longest string, in bytes, a script may build.
pub(crate) const MAX_STRING_LENGTH: usize = (1 << 29) - 24;

/// Argument fed to handlers while trial-calling them for their edit binding.
const TRIAL_SENTINEL: &str = "__PREVIEW_TRIAL__";

/// Handler props of the editable primitive, in trial order.
const EDITABLE_HANDLERS: &[&str] = &["onChange", "onSave", "onInput", "onBlur"];

/// Props the editable primitive consumes itself.
const EDITABLE_PROPS: &[&str] = &[
    "value",
    "field",
    "as",
    "tag",
    "multiline",
    "placeholder",
    "onChange",
    "onSave",
    "onInput",
    "onBlur",
    "children",
];

/// Abrupt completion of an evaluation step.
pub(crate) enum Fault<'a> {
    /// A JavaScript exception; catchable by `try`.
    Thrown {
        value: Value<'a>,
        offset: Option<u32>,
        stack: Vec<String>,
    },
    Unsupported {
        construct: String,
        offset: u32,
    },
}

pub(crate) type Eval<'a, T> = Result<T, Fault<'a>>;

enum Flow<'a> {
    Normal,
    Return(Value<'a>),
    Break,
    Continue,
}

pub(crate) struct Interpreter<'a> {
    source: &'a str,
    options: &'a SandboxOptions,
    mapping: Value<'a>,
    depth: usize,
    frames: Vec<String>,
    scopes: Vec<WeakEnv<'a>>,
    deferred_edits: Vec<(String, String)>,
    trial: Option<Vec<(String, String)>>,
    random_state: u64,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(source: &'a str, options: &'a SandboxOptions, mapping: Value<'a>) -> Self {
        Self {
            source,
            options,
            mapping,
            depth: 0,
            frames: Vec::new(),
            scopes: Vec::new(),
            deferred_edits: Vec::new(),
            trial: None,
            random_state: 0x2545_f491_4f6c_dd1d,
        }
    }

    pub(crate) fn into_deferred_edits(mut self) -> Vec<(String, String)> {
        std::mem::take(&mut self.deferred_edits)
    }

    fn scope(&mut self, parent: &Env<'a>) -> Env<'a> {
        let env = parent.child();
        self.scopes.push(env.downgrade());
        env
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PROGRAM
    // ═══════════════════════════════════════════════════════════════════════════

    /// Run every statement, then mount the trailing render call.
    pub(crate) fn run_program(
        &mut self,
        program: &'a Program<'a>,
        globals: &Env<'a>,
    ) -> Eval<'a, Vec<RenderNode>> {
        let env = self.scope(globals);
        let Some((last, rest)) = program.body.split_last() else {
            return Ok(Vec::new());
        };

        self.hoist(&program.body, &env);
        for stmt in rest {
            if let Flow::Return(_) = self.exec(stmt, &env)? {
                break;
            }
        }

        let Statement::ExpressionStatement(render) = last else {
            return Ok(Vec::new());
        };
        let Expression::CallExpression(call) = render.expression.without_parentheses() else {
            return Ok(Vec::new());
        };

        let callee = self.eval(&call.callee, &env)?;
        let args = self.eval_arguments(&call.arguments, &env)?;
        match callee {
            Value::Function(_) | Value::Class(_) => {
                let props = args.into_iter().next().unwrap_or_else(|| Value::object(vec![]));
                self.render_component(&callee, props, call.span)
            }
            other => {
                let result = self.call(&other, None, args, call.span)?;
                self.values_to_nodes(vec![result], call.span)
            }
        }
    }

    /// Whether the program ends with a call statement.
    pub(crate) fn has_render_call(program: &Program<'_>) -> bool {
        match program.body.last() {
            Some(Statement::ExpressionStatement(stmt)) => matches!(
                stmt.expression.without_parentheses(),
                Expression::CallExpression(_)
            ),
            _ => false,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STATEMENTS
    // ═══════════════════════════════════════════════════════════════════════════

    fn hoist(&mut self, stmts: &'a [Statement<'a>], env: &Env<'a>) {
        for stmt in stmts {
            if let Statement::FunctionDeclaration(func) = stmt {
                if let Some(id) = &func.id {
                    let closure = self.function_value(Callable::Function(func), id.name.as_str(), env);
                    env.declare(id.name.as_str(), closure, true);
                }
            }
        }
    }

    fn exec_block(&mut self, stmts: &'a [Statement<'a>], env: &Env<'a>) -> Eval<'a, Flow<'a>> {
        self.hoist(stmts, env);
        for stmt in stmts {
            match self.exec(stmt, env)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &'a Statement<'a>, env: &Env<'a>) -> Eval<'a, Flow<'a>> {
        match stmt {
            Statement::ExpressionStatement(s) => {
                self.eval(&s.expression, env)?;
                Ok(Flow::Normal)
            }
            Statement::VariableDeclaration(decl) => {
                self.declare_variables(decl, env)?;
                Ok(Flow::Normal)
            }
            Statement::FunctionDeclaration(_) | Statement::EmptyStatement(_) => Ok(Flow::Normal),
            Statement::TSTypeAliasDeclaration(_) | Statement::TSInterfaceDeclaration(_) => {
                Ok(Flow::Normal)
            }
            Statement::ClassDeclaration(class) => {
                let name = class
                    .id
                    .as_ref()
                    .map(|id| id.name.to_string())
                    .unwrap_or_else(|| "anonymous".to_string());
                let value = Value::Class(Rc::new(ClassValue {
                    name: name.clone(),
                    class,
                    env: env.clone(),
                }));
                env.declare(&name, value, true);
                Ok(Flow::Normal)
            }
            Statement::ReturnStatement(ret) => {
                let value = match &ret.argument {
                    Some(arg) => self.eval(arg, env)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Statement::IfStatement(stmt) => {
                if self.eval(&stmt.test, env)?.truthy() {
                    self.exec(&stmt.consequent, env)
                } else if let Some(alternate) = &stmt.alternate {
                    self.exec(alternate, env)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Statement::BlockStatement(block) => {
                let inner = self.scope(env);
                self.exec_block(&block.body, &inner)
            }
            Statement::ThrowStatement(stmt) => {
                let value = self.eval(&stmt.argument, env)?;
                Err(Fault::Thrown {
                    value,
                    offset: Some(stmt.span.start),
                    stack: self.stack_snapshot(),
                })
            }
            Statement::TryStatement(stmt) => self.exec_try(stmt, env),
            Statement::ForOfStatement(stmt) => self.exec_for_of(stmt, env),
            Statement::ForStatement(stmt) => self.exec_for(stmt, env),
            Statement::WhileStatement(stmt) => {
                let mut iterations = 0;
                while self.eval(&stmt.test, env)?.truthy() {
                    self.count_iteration(&mut iterations, stmt.span)?;
                    match self.exec(&stmt.body, env)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Statement::DoWhileStatement(stmt) => {
                let mut iterations = 0;
                loop {
                    self.count_iteration(&mut iterations, stmt.span)?;
                    match self.exec(&stmt.body, env)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if !self.eval(&stmt.test, env)?.truthy() {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }
            Statement::SwitchStatement(stmt) => self.exec_switch(stmt, env),
            Statement::BreakStatement(stmt) if stmt.label.is_none() => Ok(Flow::Break),
            Statement::ContinueStatement(stmt) if stmt.label.is_none() => Ok(Flow::Continue),
            other => self.unsupported(statement_name(other), other.span()),
        }
    }

    fn declare_variables(
        &mut self,
        decl: &'a VariableDeclaration<'a>,
        env: &Env<'a>,
    ) -> Eval<'a, ()> {
        let mutable = !matches!(decl.kind, VariableDeclarationKind::Const);
        for declarator in &decl.declarations {
            let value = match &declarator.init {
                Some(init) => self.eval_named(init, binding_name(&declarator.id), env)?,
                None => Value::Undefined,
            };
            self.bind_pattern(&declarator.id, value, env, mutable)?;
        }
        Ok(())
    }

    fn exec_try(&mut self, stmt: &'a TryStatement<'a>, env: &Env<'a>) -> Eval<'a, Flow<'a>> {
        let frames = self.frames.len();
        let depth = self.depth;
        let block_env = self.scope(env);
        let mut result = self.exec_block(&stmt.block.body, &block_env);

        let caught = match (&result, &stmt.handler) {
            (Err(Fault::Thrown { value, .. }), Some(handler)) => Some((value.clone(), handler)),
            _ => None,
        };
        if let Some((caught, handler)) = caught {
            self.frames.truncate(frames);
            self.depth = depth;
            let catch_env = self.scope(env);
            if let Some(param) = &handler.param {
                self.bind_pattern(&param.pattern, caught, &catch_env, true)?;
            }
            result = self.exec_block(&handler.body.body, &catch_env);
        }

        if let Some(finalizer) = &stmt.finalizer {
            let finally_env = self.scope(env);
            match self.exec_block(&finalizer.body, &finally_env)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        result
    }

    fn exec_for_of(&mut self, stmt: &'a ForOfStatement<'a>, env: &Env<'a>) -> Eval<'a, Flow<'a>> {
        let ForStatementLeft::VariableDeclaration(decl) = &stmt.left else {
            return self.unsupported("for-of over an assignment target", stmt.span);
        };
        if stmt.r#await {
            return self.unsupported("for await", stmt.span);
        }
        let Some(declarator) = decl.declarations.first() else {
            return Ok(Flow::Normal);
        };
        let mutable = !matches!(decl.kind, VariableDeclarationKind::Const);
        let iterable = self.eval(&stmt.right, env)?;
        let items = self.iterate(&iterable, stmt.right.span())?;

        let mut iterations = 0;
        for item in items {
            self.count_iteration(&mut iterations, stmt.span)?;
            let iteration_env = self.scope(env);
            self.bind_pattern(&declarator.id, item, &iteration_env, mutable)?;
            match self.exec(&stmt.body, &iteration_env)? {
                Flow::Break => break,
                Flow::Return(v) => return Ok(Flow::Return(v)),
                Flow::Normal | Flow::Continue => {}
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_for(&mut self, stmt: &'a ForStatement<'a>, env: &Env<'a>) -> Eval<'a, Flow<'a>> {
        let loop_env = self.scope(env);
        match &stmt.init {
            Some(ForStatementInit::VariableDeclaration(decl)) => {
                self.declare_variables(decl, &loop_env)?;
            }
            Some(init) => {
                if let Some(expr) = init.as_expression() {
                    self.eval(expr, &loop_env)?;
                }
            }
            None => {}
        }

        let mut iterations = 0;
        loop {
            if let Some(test) = &stmt.test {
                if !self.eval(test, &loop_env)?.truthy() {
                    break;
                }
            }
            self.count_iteration(&mut iterations, stmt.span)?;
            match self.exec(&stmt.body, &loop_env)? {
                Flow::Break => break,
                Flow::Return(v) => return Ok(Flow::Return(v)),
                Flow::Normal | Flow::Continue => {}
            }
            if let Some(update) = &stmt.update {
                self.eval(update, &loop_env)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_switch(&mut self, stmt: &'a SwitchStatement<'a>, env: &Env<'a>) -> Eval<'a, Flow<'a>> {
        let discriminant = self.eval(&stmt.discriminant, env)?;
        let switch_env = self.scope(env);

        let mut start = None;
        for (idx, case) in stmt.cases.iter().enumerate() {
            if let Some(test) = &case.test {
                let value = self.eval(test, &switch_env)?;
                if strict_equals(&discriminant, &value) {
                    start = Some(idx);
                    break;
                }
            }
        }
        let start = match start.or_else(|| stmt.cases.iter().position(|c| c.test.is_none())) {
            Some(idx) => idx,
            None => return Ok(Flow::Normal),
        };

        for case in stmt.cases.iter().skip(start) {
            match self.exec_block(&case.consequent, &switch_env)? {
                Flow::Normal => {}
                Flow::Break => break,
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn count_iteration(&self, iterations: &mut usize, span: Span) -> Eval<'a, ()> {
        *iterations += 1;
        if *iterations > MAX_LOOP_ITERATIONS {
            return Err(self.throw_error(
                "RangeError",
                format!("Loop exceeded {} iterations", MAX_LOOP_ITERATIONS),
                span,
            ));
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BINDINGS
    // ═══════════════════════════════════════════════════════════════════════════

    fn bind_pattern(
        &mut self,
        pattern: &'a BindingPattern<'a>,
        value: Value<'a>,
        env: &Env<'a>,
        mutable: bool,
    ) -> Eval<'a, ()> {
        match pattern {
            BindingPattern::BindingIdentifier(id) => {
                env.declare(id.name.as_str(), value, mutable);
                Ok(())
            }
            BindingPattern::ObjectPattern(object) => {
                if value.is_nullish() {
                    let first = object
                        .properties
                        .first()
                        .and_then(|p| static_key(&p.key))
                        .unwrap_or_default();
                    return Err(self.throw_error(
                        "TypeError",
                        format!(
                            "Cannot destructure property '{}' of '{}' as it is {}.",
                            first,
                            value.to_js_string(),
                            value.to_js_string()
                        ),
                        object.span,
                    ));
                }
                let mut used = Vec::new();
                for prop in &object.properties {
                    let key = self.property_key(&prop.key, env)?;
                    let item = self.get_member(&value, &key, prop.span)?;
                    used.push(key);
                    self.bind_pattern(&prop.value, item, env, mutable)?;
                }
                if let Some(rest) = &object.rest {
                    let remaining = match &value {
                        Value::Object(obj) => obj
                            .borrow()
                            .entries
                            .iter()
                            .filter(|(k, _)| !used.contains(k))
                            .cloned()
                            .collect(),
                        _ => Vec::new(),
                    };
                    self.bind_pattern(&rest.argument, Value::object(remaining), env, mutable)?;
                }
                Ok(())
            }
            BindingPattern::ArrayPattern(array) => {
                let items = self.iterate(&value, array.span)?;
                for (idx, element) in array.elements.iter().enumerate() {
                    if let Some(element) = element {
                        let item = items.get(idx).cloned().unwrap_or(Value::Undefined);
                        self.bind_pattern(element, item, env, mutable)?;
                    }
                }
                if let Some(rest) = &array.rest {
                    let remaining = items.into_iter().skip(array.elements.len()).collect();
                    self.bind_pattern(&rest.argument, Value::array(remaining), env, mutable)?;
                }
                Ok(())
            }
            BindingPattern::AssignmentPattern(assign) => {
                let value = if matches!(value, Value::Undefined) {
                    self.eval_named(&assign.right, binding_name(&assign.left), env)?
                } else {
                    value
                };
                self.bind_pattern(&assign.left, value, env, mutable)
            }
        }
    }

    fn property_key(&mut self, key: &'a PropertyKey<'a>, env: &Env<'a>) -> Eval<'a, String> {
        if let Some(name) = static_key(key) {
            return Ok(name);
        }
        match key.as_expression() {
            Some(expr) => Ok(property_key_string(&self.eval(expr, env)?)),
            None => self.unsupported("private name", key.span()),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXPRESSIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Evaluate, naming anonymous functions after the binding they land in.
    fn eval_named(
        &mut self,
        expr: &'a Expression<'a>,
        name: Option<&str>,
        env: &Env<'a>,
    ) -> Eval<'a, Value<'a>> {
        match (expr, name) {
            (Expression::ArrowFunctionExpression(arrow), Some(name)) => {
                Ok(self.function_value(Callable::Arrow(arrow), name, env))
            }
            (Expression::FunctionExpression(func), Some(name)) if func.id.is_none() => {
                Ok(self.function_value(Callable::Function(func), name, env))
            }
            _ => self.eval(expr, env),
        }
    }

    pub(crate) fn eval(&mut self, expr: &'a Expression<'a>, env: &Env<'a>) -> Eval<'a, Value<'a>> {
        match expr {
            Expression::BooleanLiteral(lit) => Ok(Value::Bool(lit.value)),
            Expression::NullLiteral(_) => Ok(Value::Null),
            Expression::NumericLiteral(lit) => Ok(Value::Number(lit.value)),
            Expression::StringLiteral(lit) => Ok(Value::str(lit.value.as_str())),
            Expression::TemplateLiteral(tpl) => {
                let mut out = String::new();
                for (idx, quasi) in tpl.quasis.iter().enumerate() {
                    match &quasi.value.cooked {
                        Some(cooked) => out.push_str(cooked.as_str()),
                        None => out.push_str(quasi.value.raw.as_str()),
                    }
                    if let Some(expr) = tpl.expressions.get(idx) {
                        out.push_str(&self.eval(expr, env)?.to_js_string());
                        self.check_string_length(out.len(), tpl.span)?;
                    }
                }
                Ok(Value::str(out))
            }
            Expression::Identifier(id) => self.lookup(id.name.as_str(), env, id.span),
            Expression::ThisExpression(_) => Ok(env.lookup("this").unwrap_or(Value::Undefined)),
            Expression::ArrayExpression(array) => {
                let mut items = Vec::new();
                for element in &array.elements {
                    match element {
                        ArrayExpressionElement::SpreadElement(spread) => {
                            let value = self.eval(&spread.argument, env)?;
                            items.extend(self.iterate(&value, spread.span)?);
                        }
                        ArrayExpressionElement::Elision(_) => items.push(Value::Undefined),
                        other => {
                            if let Some(expr) = other.as_expression() {
                                items.push(self.eval(expr, env)?);
                            }
                        }
                    }
                }
                Ok(Value::array(items))
            }
            Expression::ObjectExpression(object) => self.eval_object(object, env),
            Expression::FunctionExpression(func) => {
                let name = func
                    .id
                    .as_ref()
                    .map(|id| id.name.to_string())
                    .unwrap_or_else(|| "anonymous".to_string());
                Ok(self.function_value(Callable::Function(func), &name, env))
            }
            Expression::ArrowFunctionExpression(arrow) => {
                Ok(self.function_value(Callable::Arrow(arrow), "anonymous", env))
            }
            Expression::ClassExpression(class) => Ok(Value::Class(Rc::new(ClassValue {
                name: class
                    .id
                    .as_ref()
                    .map(|id| id.name.to_string())
                    .unwrap_or_else(|| "anonymous".to_string()),
                class,
                env: env.clone(),
            }))),
            Expression::StaticMemberExpression(member) => {
                Ok(self.static_member(member, env)?.unwrap_or(Value::Undefined))
            }
            Expression::ComputedMemberExpression(member) => {
                Ok(self.computed_member(member, env)?.unwrap_or(Value::Undefined))
            }
            Expression::CallExpression(call) => {
                Ok(self.call_expression(call, env)?.unwrap_or(Value::Undefined))
            }
            Expression::ChainExpression(chain) => {
                let result = match &chain.expression {
                    ChainElement::CallExpression(call) => self.call_expression(call, env)?,
                    ChainElement::StaticMemberExpression(member) => {
                        self.static_member(member, env)?
                    }
                    ChainElement::ComputedMemberExpression(member) => {
                        self.computed_member(member, env)?
                    }
                    ChainElement::TSNonNullExpression(inner) => {
                        self.chain_link(&inner.expression, env)?
                    }
                    ChainElement::PrivateFieldExpression(field) => {
                        return self.unsupported("private field", field.span)
                    }
                };
                Ok(result.unwrap_or(Value::Undefined))
            }
            Expression::NewExpression(new) => {
                let callee = self.eval(&new.callee, env)?;
                let args = self.eval_arguments(&new.arguments, env)?;
                match &callee {
                    Value::Class(class) => self.instantiate(class, args, new.span),
                    Value::Builtin(builtin) => {
                        builtins::call_builtin(self, *builtin, None, args, new.span)
                    }
                    _ => Err(self.throw_error(
                        "TypeError",
                        format!("{} is not a constructor", self.snippet(new.callee.span())),
                        new.span,
                    )),
                }
            }
            Expression::UnaryExpression(unary) => self.eval_unary(unary, env),
            Expression::BinaryExpression(binary) => {
                let left = self.eval(&binary.left, env)?;
                let right = self.eval(&binary.right, env)?;
                self.binary(binary.operator.as_str(), left, right, binary.span)
            }
            Expression::LogicalExpression(logical) => {
                let left = self.eval(&logical.left, env)?;
                let short_circuit = match logical.operator {
                    LogicalOperator::Or => left.truthy(),
                    LogicalOperator::And => !left.truthy(),
                    LogicalOperator::Coalesce => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(&logical.right, env)
                }
            }
            Expression::ConditionalExpression(cond) => {
                if self.eval(&cond.test, env)?.truthy() {
                    self.eval(&cond.consequent, env)
                } else {
                    self.eval(&cond.alternate, env)
                }
            }
            Expression::AssignmentExpression(assign) => self.eval_assignment(assign, env),
            Expression::UpdateExpression(update) => self.eval_update(update, env),
            Expression::SequenceExpression(seq) => {
                let mut last = Value::Undefined;
                for expr in &seq.expressions {
                    last = self.eval(expr, env)?;
                }
                Ok(last)
            }
            Expression::ParenthesizedExpression(paren) => self.eval(&paren.expression, env),
            Expression::TSAsExpression(inner) => self.eval(&inner.expression, env),
            Expression::TSSatisfiesExpression(inner) => self.eval(&inner.expression, env),
            Expression::TSNonNullExpression(inner) => self.eval(&inner.expression, env),
            Expression::JSXElement(element) => {
                let nodes = self.render_element(element, env)?;
                Ok(Value::Markup(Rc::new(nodes)))
            }
            Expression::JSXFragment(fragment) => {
                let children = self.eval_children(&fragment.children, env)?;
                let nodes = self.values_to_nodes(children, fragment.span)?;
                Ok(Value::Markup(Rc::new(nodes)))
            }
            Expression::AwaitExpression(e) => self.unsupported("await", e.span),
            Expression::YieldExpression(e) => self.unsupported("yield", e.span),
            Expression::RegExpLiteral(e) => self.unsupported("regular expression", e.span),
            Expression::BigIntLiteral(e) => self.unsupported("BigInt", e.span),
            Expression::TaggedTemplateExpression(e) => self.unsupported("tagged template", e.span),
            Expression::ImportExpression(e) => self.unsupported("dynamic import", e.span),
            Expression::Super(e) => self.unsupported("super property access", e.span),
            other => self.unsupported("expression", other.span()),
        }
    }

    fn lookup(&self, name: &str, env: &Env<'a>, span: Span) -> Eval<'a, Value<'a>> {
        if let Some(value) = env.lookup(name) {
            return Ok(value);
        }
        match name {
            "undefined" => Ok(Value::Undefined),
            "NaN" => Ok(Value::Number(f64::NAN)),
            "Infinity" => Ok(Value::Number(f64::INFINITY)),
            _ => Err(self.throw_error(
                "ReferenceError",
                format!("{} is not defined", name),
                span,
            )),
        }
    }

    fn eval_object(&mut self, object: &'a ObjectExpression<'a>, env: &Env<'a>) -> Eval<'a, Value<'a>> {
        let mut result = JsObject::new();
        for property in &object.properties {
            match property {
                ObjectPropertyKind::ObjectProperty(prop) => {
                    if !matches!(prop.kind, PropertyKind::Init) {
                        return self.unsupported("getter or setter", prop.span);
                    }
                    let key = self.property_key(&prop.key, env)?;
                    let value = self.eval_named(&prop.value, Some(&key), env)?;
                    result.set(key, value);
                }
                ObjectPropertyKind::SpreadProperty(spread) => {
                    let value = self.eval(&spread.argument, env)?;
                    for (key, item) in self.own_entries(&value) {
                        result.set(key, item);
                    }
                }
            }
        }
        Ok(Value::Object(Rc::new(std::cell::RefCell::new(result))))
    }

    /// Enumerable own entries, the way object spread sees them.
    pub(crate) fn own_entries(&self, value: &Value<'a>) -> Vec<(String, Value<'a>)> {
        match value {
            Value::Object(obj) => obj.borrow().entries.clone(),
            Value::Array(items) => items
                .borrow()
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v.clone()))
                .collect(),
            Value::Str(s) => s
                .chars()
                .enumerate()
                .map(|(i, c)| (i.to_string(), Value::str(c.to_string())))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Items of an iterable value.
    pub(crate) fn iterate(&self, value: &Value<'a>, span: Span) -> Eval<'a, Vec<Value<'a>>> {
        match value {
            Value::Array(items) => Ok(items.borrow().clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
            other => Err(self.throw_error(
                "TypeError",
                format!("{} is not iterable", other.describe()),
                span,
            )),
        }
    }

    fn eval_arguments(
        &mut self,
        arguments: &'a [Argument<'a>],
        env: &Env<'a>,
    ) -> Eval<'a, Vec<Value<'a>>> {
        let mut args = Vec::with_capacity(arguments.len());
        for arg in arguments {
            match arg {
                Argument::SpreadElement(spread) => {
                    let value = self.eval(&spread.argument, env)?;
                    args.extend(self.iterate(&value, spread.span)?);
                }
                other => {
                    if let Some(expr) = other.as_expression() {
                        args.push(self.eval(expr, env)?);
                    }
                }
            }
        }
        Ok(args)
    }

    // Member access and calls return `None` when an optional link
    // short-circuits the rest of the chain.

    fn chain_link(&mut self, expr: &'a Expression<'a>, env: &Env<'a>) -> Eval<'a, Option<Value<'a>>> {
        match expr {
            Expression::StaticMemberExpression(member) => self.static_member(member, env),
            Expression::ComputedMemberExpression(member) => self.computed_member(member, env),
            Expression::CallExpression(call) => self.call_expression(call, env),
            Expression::TSNonNullExpression(inner) => self.chain_link(&inner.expression, env),
            other => Ok(Some(self.eval(other, env)?)),
        }
    }

    fn static_member(
        &mut self,
        member: &'a StaticMemberExpression<'a>,
        env: &Env<'a>,
    ) -> Eval<'a, Option<Value<'a>>> {
        let Some(object) = self.chain_link(&member.object, env)? else {
            return Ok(None);
        };
        if member.optional && object.is_nullish() {
            return Ok(None);
        }
        self.get_member(&object, member.property.name.as_str(), member.span)
            .map(Some)
    }

    fn computed_member(
        &mut self,
        member: &'a ComputedMemberExpression<'a>,
        env: &Env<'a>,
    ) -> Eval<'a, Option<Value<'a>>> {
        let Some(object) = self.chain_link(&member.object, env)? else {
            return Ok(None);
        };
        if member.optional && object.is_nullish() {
            return Ok(None);
        }
        let key = property_key_string(&self.eval(&member.expression, env)?);
        self.get_member(&object, &key, member.span).map(Some)
    }

    fn call_expression(
        &mut self,
        call: &'a CallExpression<'a>,
        env: &Env<'a>,
    ) -> Eval<'a, Option<Value<'a>>> {
        let (callee, this) = match &call.callee {
            Expression::Super(_) => {
                let args = self.eval_arguments(&call.arguments, env)?;
                if let (Some(this), Some(props)) = (env.lookup("this"), args.into_iter().next()) {
                    self.set_member(&this, "props", props, call.span)?;
                }
                return Ok(Some(Value::Undefined));
            }
            Expression::StaticMemberExpression(member) => {
                let Some(object) = self.chain_link(&member.object, env)? else {
                    return Ok(None);
                };
                if member.optional && object.is_nullish() {
                    return Ok(None);
                }
                let method = self.get_member(&object, member.property.name.as_str(), member.span)?;
                (method, Some(object))
            }
            Expression::ComputedMemberExpression(member) => {
                let Some(object) = self.chain_link(&member.object, env)? else {
                    return Ok(None);
                };
                if member.optional && object.is_nullish() {
                    return Ok(None);
                }
                let key = property_key_string(&self.eval(&member.expression, env)?);
                let method = self.get_member(&object, &key, member.span)?;
                (method, Some(object))
            }
            other => match self.chain_link(other, env)? {
                Some(value) => (value, None),
                None => return Ok(None),
            },
        };

        if call.optional && callee.is_nullish() {
            return Ok(None);
        }
        if !callee.is_callable() {
            return Err(self.throw_error(
                "TypeError",
                format!("{} is not a function", self.snippet(call.callee.span())),
                call.span,
            ));
        }
        let args = self.eval_arguments(&call.arguments, env)?;
        self.call(&callee, this, args, call.span).map(Some)
    }

    fn eval_unary(&mut self, unary: &'a UnaryExpression<'a>, env: &Env<'a>) -> Eval<'a, Value<'a>> {
        let op = unary.operator.as_str();
        if op == "typeof" {
            if let Expression::Identifier(id) = &unary.argument {
                if env.lookup(id.name.as_str()).is_none() {
                    return Ok(Value::str("undefined"));
                }
            }
        }
        if op == "delete" {
            return match &unary.argument {
                Expression::StaticMemberExpression(member) => {
                    let object = self.eval(&member.object, env)?;
                    Ok(Value::Bool(delete_key(&object, member.property.name.as_str())))
                }
                Expression::ComputedMemberExpression(member) => {
                    let object = self.eval(&member.object, env)?;
                    let key = property_key_string(&self.eval(&member.expression, env)?);
                    Ok(Value::Bool(delete_key(&object, &key)))
                }
                _ => Ok(Value::Bool(true)),
            };
        }

        let value = self.eval(&unary.argument, env)?;
        Ok(match op {
            "-" => Value::Number(-value.to_number()),
            "+" => Value::Number(value.to_number()),
            "!" => Value::Bool(!value.truthy()),
            "~" => Value::Number(!to_int32(value.to_number()) as f64),
            "typeof" => Value::str(value.type_of()),
            "void" => Value::Undefined,
            other => return self.unsupported(&format!("operator {}", other), unary.span),
        })
    }

    pub(crate) fn binary(
        &self,
        op: &str,
        left: Value<'a>,
        right: Value<'a>,
        span: Span,
    ) -> Eval<'a, Value<'a>> {
        Ok(match op {
            "+" => {
                let sum = add(&left, &right);
                if let Value::Str(text) = &sum {
                    self.check_string_length(text.len(), span)?;
                }
                sum
            }
            "-" => Value::Number(left.to_number() - right.to_number()),
            "*" => Value::Number(left.to_number() * right.to_number()),
            "/" => Value::Number(left.to_number() / right.to_number()),
            "%" => Value::Number(left.to_number() % right.to_number()),
            "**" => Value::Number(left.to_number().powf(right.to_number())),
            "==" => Value::Bool(loose_equals(&left, &right)),
            "!=" => Value::Bool(!loose_equals(&left, &right)),
            "===" => Value::Bool(strict_equals(&left, &right)),
            "!==" => Value::Bool(!strict_equals(&left, &right)),
            "<" | "<=" | ">" | ">=" => Value::Bool(compare(op, &left, &right)),
            "&" => Value::Number((to_int32(left.to_number()) & to_int32(right.to_number())) as f64),
            "|" => Value::Number((to_int32(left.to_number()) | to_int32(right.to_number())) as f64),
            "^" => Value::Number((to_int32(left.to_number()) ^ to_int32(right.to_number())) as f64),
            "<<" => Value::Number(
                to_int32(left.to_number()).wrapping_shl(to_int32(right.to_number()) as u32 & 31)
                    as f64,
            ),
            ">>" => Value::Number(
                to_int32(left.to_number()).wrapping_shr(to_int32(right.to_number()) as u32 & 31)
                    as f64,
            ),
            ">>>" => Value::Number(
                (to_int32(left.to_number()) as u32)
                    .wrapping_shr(to_int32(right.to_number()) as u32 & 31) as f64,
            ),
            "in" => {
                let key = property_key_string(&left);
                match &right {
                    Value::Object(obj) => Value::Bool(obj.borrow().has(&key)),
                    Value::Array(items) => Value::Bool(
                        key == "length"
                            || key
                                .parse::<usize>()
                                .map(|i| i < items.borrow().len())
                                .unwrap_or(false),
                    ),
                    other => {
                        return Err(self.throw_error(
                            "TypeError",
                            format!(
                                "Cannot use 'in' operator to search for '{}' in {}",
                                key,
                                other.to_js_string()
                            ),
                            span,
                        ))
                    }
                }
            }
            "instanceof" => match (&left, &right) {
                (Value::Object(obj), Value::Class(class)) => Value::Bool(
                    obj.borrow()
                        .class
                        .as_ref()
                        .map(|c| Rc::ptr_eq(c, class))
                        .unwrap_or(false),
                ),
                _ => Value::Bool(false),
            },
            other => return self.unsupported(&format!("operator {}", other), span),
        })
    }

    fn eval_assignment(
        &mut self,
        assign: &'a AssignmentExpression<'a>,
        env: &Env<'a>,
    ) -> Eval<'a, Value<'a>> {
        let op = assign.operator.as_str();
        match &assign.left {
            AssignmentTarget::AssignmentTargetIdentifier(id) => {
                let name = id.name.as_str();
                let value = match op {
                    "=" => self.eval_named(&assign.right, Some(name), env)?,
                    _ => {
                        let current = self.lookup(name, env, id.span)?;
                        match self.compound(op, current, &assign.right, env, assign.span)? {
                            Some(value) => value,
                            None => return self.lookup(name, env, id.span),
                        }
                    }
                };
                self.assign_identifier(name, value.clone(), env, id.span)?;
                Ok(value)
            }
            AssignmentTarget::StaticMemberExpression(member) => {
                let object = self.eval(&member.object, env)?;
                let key = member.property.name.as_str();
                self.assign_member(object, key, op, &assign.right, env, assign.span)
            }
            AssignmentTarget::ComputedMemberExpression(member) => {
                let object = self.eval(&member.object, env)?;
                let key = property_key_string(&self.eval(&member.expression, env)?);
                self.assign_member(object, &key, op, &assign.right, env, assign.span)
            }
            other => self.unsupported("destructuring assignment", other.span()),
        }
    }

    fn assign_member(
        &mut self,
        object: Value<'a>,
        key: &str,
        op: &str,
        right: &'a Expression<'a>,
        env: &Env<'a>,
        span: Span,
    ) -> Eval<'a, Value<'a>> {
        let value = match op {
            "=" => self.eval(right, env)?,
            _ => {
                let current = self.get_member(&object, key, span)?;
                match self.compound(op, current.clone(), right, env, span)? {
                    Some(value) => value,
                    None => return Ok(current),
                }
            }
        };
        self.set_member(&object, key, value.clone(), span)?;
        Ok(value)
    }

    /// Value of a compound assignment; `None` when a logical assignment
    /// short-circuits and nothing is written.
    fn compound(
        &mut self,
        op: &str,
        current: Value<'a>,
        right: &'a Expression<'a>,
        env: &Env<'a>,
        span: Span,
    ) -> Eval<'a, Option<Value<'a>>> {
        let short_circuit = match op {
            "||=" => Some(current.truthy()),
            "&&=" => Some(!current.truthy()),
            "??=" => Some(!current.is_nullish()),
            _ => None,
        };
        match short_circuit {
            Some(true) => Ok(None),
            Some(false) => Ok(Some(self.eval(right, env)?)),
            None => {
                let right = self.eval(right, env)?;
                let binary_op = op.trim_end_matches('=');
                Ok(Some(self.binary(binary_op, current, right, span)?))
            }
        }
    }

    fn assign_identifier(
        &self,
        name: &str,
        value: Value<'a>,
        env: &Env<'a>,
        span: Span,
    ) -> Eval<'a, ()> {
        match env.assign(name, value) {
            Ok(()) => Ok(()),
            Err(AssignError::Constant) => Err(self.throw_error(
                "TypeError",
                "Assignment to constant variable.",
                span,
            )),
            Err(AssignError::Undeclared) => Err(self.throw_error(
                "ReferenceError",
                format!("{} is not defined", name),
                span,
            )),
        }
    }

    fn eval_update(&mut self, update: &'a UpdateExpression<'a>, env: &Env<'a>) -> Eval<'a, Value<'a>> {
        let delta = if update.operator.as_str() == "++" { 1.0 } else { -1.0 };
        let (old, new) = match &update.argument {
            SimpleAssignmentTarget::AssignmentTargetIdentifier(id) => {
                let old = self.lookup(id.name.as_str(), env, id.span)?.to_number();
                let new = old + delta;
                self.assign_identifier(id.name.as_str(), Value::Number(new), env, id.span)?;
                (old, new)
            }
            SimpleAssignmentTarget::StaticMemberExpression(member) => {
                let object = self.eval(&member.object, env)?;
                let key = member.property.name.as_str();
                let old = self.get_member(&object, key, member.span)?.to_number();
                self.set_member(&object, key, Value::Number(old + delta), member.span)?;
                (old, old + delta)
            }
            SimpleAssignmentTarget::ComputedMemberExpression(member) => {
                let object = self.eval(&member.object, env)?;
                let key = property_key_string(&self.eval(&member.expression, env)?);
                let old = self.get_member(&object, &key, member.span)?.to_number();
                self.set_member(&object, &key, Value::Number(old + delta), member.span)?;
                (old, old + delta)
            }
            other => return self.unsupported("update target", other.span()),
        };
        Ok(Value::Number(if update.prefix { new } else { old }))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PROPERTIES
    // ═══════════════════════════════════════════════════════════════════════════

    pub(crate) fn get_member(&mut self, object: &Value<'a>, key: &str, span: Span) -> Eval<'a, Value<'a>> {
        match object {
            Value::Undefined | Value::Null => Err(self.throw_error(
                "TypeError",
                format!(
                    "Cannot read properties of {} (reading '{}')",
                    object.to_js_string(),
                    key
                ),
                span,
            )),
            Value::Object(obj) => {
                if let Some(value) = obj.borrow().get(key) {
                    return Ok(value);
                }
                let class = obj.borrow().class.clone();
                match class {
                    Some(class) => self.class_member(&class, object, key, span),
                    None => Ok(Value::Undefined),
                }
            }
            Value::Array(items) => {
                if key == "length" {
                    return Ok(Value::Number(items.borrow().len() as f64));
                }
                if let Ok(idx) = key.parse::<usize>() {
                    return Ok(items.borrow().get(idx).cloned().unwrap_or(Value::Undefined));
                }
                Ok(self.method_or_undefined(object, key))
            }
            Value::Str(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.encode_utf16().count() as f64));
                }
                if let Ok(idx) = key.parse::<usize>() {
                    return Ok(s
                        .chars()
                        .nth(idx)
                        .map(|c| Value::str(c.to_string()))
                        .unwrap_or(Value::Undefined));
                }
                Ok(self.method_or_undefined(object, key))
            }
            Value::Function(closure) if key == "name" => Ok(Value::str(&closure.name)),
            Value::Class(class) if key == "name" => Ok(Value::str(&class.name)),
            Value::Intrinsic(Intrinsic::Fragment) if key == "name" => Ok(Value::str("Fragment")),
            _ => Ok(self.method_or_undefined(object, key)),
        }
    }

    fn method_or_undefined(&self, receiver: &Value<'a>, key: &str) -> Value<'a> {
        if builtins::has_method(receiver, key) {
            Value::Method(Rc::new(crate::value::BoundMethod {
                receiver: receiver.clone(),
                name: key.to_string(),
            }))
        } else {
            Value::Undefined
        }
    }

    fn class_member(
        &mut self,
        class: &Rc<ClassValue<'a>>,
        instance: &Value<'a>,
        key: &str,
        span: Span,
    ) -> Eval<'a, Value<'a>> {
        for element in &class.class.body.body {
            let ClassElement::MethodDefinition(method) = element else {
                continue;
            };
            if method.r#static || static_key(&method.key).as_deref() != Some(key) {
                continue;
            }
            let closure = Value::Function(Rc::new(Closure {
                name: format!("{}.{}", class.name, key),
                callable: Callable::Function(&method.value),
                env: class.env.clone(),
                this: Some(instance.clone()),
            }));
            return match method.kind {
                MethodDefinitionKind::Method => Ok(closure),
                MethodDefinitionKind::Get => self.call(&closure, Some(instance.clone()), vec![], span),
                _ => Ok(Value::Undefined),
            };
        }
        Ok(Value::Undefined)
    }

    pub(crate) fn set_member(
        &self,
        object: &Value<'a>,
        key: &str,
        value: Value<'a>,
        span: Span,
    ) -> Eval<'a, ()> {
        match object {
            Value::Undefined | Value::Null => Err(self.throw_error(
                "TypeError",
                format!(
                    "Cannot set properties of {} (setting '{}')",
                    object.to_js_string(),
                    key
                ),
                span,
            )),
            Value::Object(obj) => {
                obj.borrow_mut().set(key.to_string(), value);
                Ok(())
            }
            Value::Array(items) => {
                if key == "length" {
                    let len = self.array_length(value.to_number(), span)?;
                    items.borrow_mut().resize(len, Value::Undefined);
                } else if let Ok(idx) = key.parse::<usize>() {
                    let mut items = items.borrow_mut();
                    if idx >= items.len() {
                        let len = self.array_length(idx as f64 + 1.0, span)?;
                        items.resize(len, Value::Undefined);
                    }
                    items[idx] = value;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CALLS
    // ═══════════════════════════════════════════════════════════════════════════

    fn function_value(&self, callable: Callable<'a>, name: &str, env: &Env<'a>) -> Value<'a> {
        Value::Function(Rc::new(Closure {
            name: name.to_string(),
            callable,
            env: env.clone(),
            this: None,
        }))
    }

    pub(crate) fn call(
        &mut self,
        callee: &Value<'a>,
        this: Option<Value<'a>>,
        args: Vec<Value<'a>>,
        span: Span,
    ) -> Eval<'a, Value<'a>> {
        match callee {
            Value::Function(closure) => self.call_closure(closure, this, args, span),
            Value::Builtin(builtin) => builtins::call_builtin(self, *builtin, this, args, span),
            Value::Method(method) => {
                builtins::call_method(self, &method.receiver, &method.name, args, span)
            }
            Value::Class(class) => Err(self.throw_error(
                "TypeError",
                format!(
                    "Class constructor {} cannot be invoked without 'new'",
                    class.name
                ),
                span,
            )),
            other => Err(self.throw_error(
                "TypeError",
                format!("{} is not a function", other.describe()),
                span,
            )),
        }
    }

    fn call_closure(
        &mut self,
        closure: &Rc<Closure<'a>>,
        this: Option<Value<'a>>,
        args: Vec<Value<'a>>,
        span: Span,
    ) -> Eval<'a, Value<'a>> {
        if self.depth >= self.options.max_call_depth {
            return Err(self.throw_error(
                "RangeError",
                "Maximum call stack size exceeded",
                span,
            ));
        }

        let (params, is_async) = match closure.callable {
            Callable::Function(func) => (&func.params, func.r#async || func.generator),
            Callable::Arrow(arrow) => (&arrow.params, arrow.r#async),
        };
        if is_async {
            return self.unsupported("async or generator function call", span);
        }
        if params.rest.is_some() {
            return self.unsupported("rest parameter", params.span);
        }

        let env = self.scope(&closure.env);
        if let Callable::Function(_) = closure.callable {
            let receiver = closure.this.clone().or(this).unwrap_or(Value::Undefined);
            env.declare("this", receiver, false);
        }

        self.depth += 1;
        self.frames.push(closure.name.clone());
        let result = self.run_closure(closure.callable, params, args, &env);
        self.frames.pop();
        self.depth -= 1;
        result
    }

    fn run_closure(
        &mut self,
        callable: Callable<'a>,
        params: &'a FormalParameters<'a>,
        args: Vec<Value<'a>>,
        env: &Env<'a>,
    ) -> Eval<'a, Value<'a>> {
        let mut args = args.into_iter();
        for param in &params.items {
            let arg = args.next().unwrap_or(Value::Undefined);
            self.bind_pattern(&param.pattern, arg, env, true)?;
        }

        let body = match callable {
            Callable::Function(func) => match &func.body {
                Some(body) => body,
                None => return Ok(Value::Undefined),
            },
            Callable::Arrow(arrow) => {
                if arrow.expression {
                    if let Some(Statement::ExpressionStatement(stmt)) = arrow.body.statements.first()
                    {
                        return self.eval(&stmt.expression, env);
                    }
                }
                &arrow.body
            }
        };

        match self.exec_block(&body.statements, env)? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Undefined),
        }
    }

    fn instantiate(
        &mut self,
        class: &Rc<ClassValue<'a>>,
        args: Vec<Value<'a>>,
        span: Span,
    ) -> Eval<'a, Value<'a>> {
        if let Some(super_class) = &class.class.super_class {
            match self.eval(super_class, &class.env)? {
                Value::Intrinsic(Intrinsic::ComponentBase) => {}
                _ => return self.unsupported("class inheritance", super_class.span()),
            }
        }

        let mut object = JsObject::new();
        object.class = Some(class.clone());
        let instance = Value::Object(Rc::new(std::cell::RefCell::new(object)));
        if let Some(props) = args.first() {
            self.set_member(&instance, "props", props.clone(), span)?;
        }

        let env = self.scope(&class.env);
        env.declare("this", instance.clone(), false);
        self.frames.push(class.name.clone());

        let mut constructor = None;
        let mut outcome = Ok(());
        for element in &class.class.body.body {
            match element {
                ClassElement::PropertyDefinition(field) if !field.r#static => {
                    let key = match self.property_key(&field.key, &env) {
                        Ok(key) => key,
                        Err(fault) => {
                            outcome = Err(fault);
                            break;
                        }
                    };
                    let value = match &field.value {
                        Some(expr) => match self.eval_named(expr, Some(&key), &env) {
                            Ok(value) => value,
                            Err(fault) => {
                                outcome = Err(fault);
                                break;
                            }
                        },
                        None => Value::Undefined,
                    };
                    if let Err(fault) = self.set_member(&instance, &key, value, field.span) {
                        outcome = Err(fault);
                        break;
                    }
                }
                ClassElement::MethodDefinition(method)
                    if matches!(method.kind, MethodDefinitionKind::Constructor) =>
                {
                    constructor = Some(method);
                }
                _ => {}
            }
        }
        self.frames.pop();
        outcome?;

        if let Some(method) = constructor {
            let closure = Rc::new(Closure {
                name: class.name.clone(),
                callable: Callable::Function(&method.value),
                env: class.env.clone(),
                this: Some(instance.clone()),
            });
            self.call_closure(&closure, None, args, span)?;
        }
        Ok(instance)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // HOST MUTATOR
    // ═══════════════════════════════════════════════════════════════════════════

    /// A `setValue` call made by evaluated code.
    pub(crate) fn record_edit(&mut self, key: String, value: String) {
        match &mut self.trial {
            Some(recorded) => recorded.push((key, value)),
            None => {
                log::warn!(
                    "[PreviewNative] setValue('{}') called during render; deferred",
                    key
                );
                self.deferred_edits.push((key, value));
            }
        }
    }

    /// Find the key a handler forwards its input to, by calling it with a
    /// sentinel against a recording mutator.
    fn trial_binding(&mut self, handler: &Value<'a>, span: Span) -> Option<String> {
        if !handler.is_callable() || self.trial.is_some() {
            return None;
        }
        let frames = self.frames.len();
        let depth = self.depth;
        self.trial = Some(Vec::new());

        let event_target = Value::object(vec![
            ("value".to_string(), Value::str(TRIAL_SENTINEL)),
            ("textContent".to_string(), Value::str(TRIAL_SENTINEL)),
            ("innerText".to_string(), Value::str(TRIAL_SENTINEL)),
        ]);
        let event = Value::object(vec![
            ("target".to_string(), event_target.clone()),
            ("currentTarget".to_string(), event_target),
            ("preventDefault".to_string(), Value::Builtin(Builtin::Noop)),
            ("stopPropagation".to_string(), Value::Builtin(Builtin::Noop)),
        ]);

        let mut binding = None;
        for arg in [Value::str(TRIAL_SENTINEL), event] {
            let outcome = self.call(handler, None, vec![arg], span);
            self.frames.truncate(frames);
            self.depth = depth;
            if let Err(Fault::Unsupported { construct, .. }) = &outcome {
                log::debug!("[PreviewNative] Handler trial stopped at {}", construct);
            }
            let recorded = self.trial.as_mut().map(std::mem::take).unwrap_or_default();
            binding = recorded
                .into_iter()
                .find(|(_, value)| value.contains(TRIAL_SENTINEL))
                .map(|(key, _)| key);
            if binding.is_some() {
                break;
            }
        }

        self.trial = None;
        binding
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // JSX
    // ═══════════════════════════════════════════════════════════════════════════

    fn render_element(
        &mut self,
        element: &'a JSXElement<'a>,
        env: &Env<'a>,
    ) -> Eval<'a, Vec<RenderNode>> {
        let opening = &element.opening_element;
        let kind = match &opening.name {
            JSXElementName::Identifier(id) => Value::str(id.name.as_str()),
            JSXElementName::IdentifierReference(id) => {
                self.lookup(id.name.as_str(), env, id.span)?
            }
            JSXElementName::NamespacedName(ns) => {
                Value::str(format!("{}:{}", ns.namespace.name, ns.name.name))
            }
            JSXElementName::MemberExpression(member) => self.jsx_member(member, env)?,
            JSXElementName::ThisExpression(this) => {
                env.lookup("this").ok_or_else(|| Fault::Unsupported {
                    construct: "<this>".to_string(),
                    offset: this.span.start,
                })?
            }
        };

        let mut props = JsObject::new();
        for item in &opening.attributes {
            match item {
                JSXAttributeItem::Attribute(attr) => {
                    let name = match &attr.name {
                        JSXAttributeName::Identifier(id) => id.name.to_string(),
                        JSXAttributeName::NamespacedName(ns) => {
                            format!("{}:{}", ns.namespace.name, ns.name.name)
                        }
                    };
                    let value = match &attr.value {
                        None => Value::Bool(true),
                        Some(JSXAttributeValue::StringLiteral(lit)) => {
                            Value::str(decode_entities(lit.value.as_str()))
                        }
                        Some(JSXAttributeValue::ExpressionContainer(container)) => {
                            match container.expression.as_expression() {
                                Some(expr) => self.eval(expr, env)?,
                                None => Value::Undefined,
                            }
                        }
                        Some(JSXAttributeValue::Element(inner)) => {
                            Value::Markup(Rc::new(self.render_element(inner, env)?))
                        }
                        Some(JSXAttributeValue::Fragment(fragment)) => {
                            let children = self.eval_children(&fragment.children, env)?;
                            Value::Markup(Rc::new(self.values_to_nodes(children, fragment.span)?))
                        }
                    };
                    props.set(name, value);
                }
                JSXAttributeItem::SpreadAttribute(spread) => {
                    let value = self.eval(&spread.argument, env)?;
                    for (key, item) in self.own_entries(&value) {
                        props.set(key, item);
                    }
                }
            }
        }

        let children = self.eval_children(&element.children, env)?;
        self.mount(kind, props.entries, children, element.span)
    }

    fn jsx_member(&mut self, member: &'a JSXMemberExpression<'a>, env: &Env<'a>) -> Eval<'a, Value<'a>> {
        let object = match &member.object {
            JSXMemberExpressionObject::IdentifierReference(id) => {
                self.lookup(id.name.as_str(), env, id.span)?
            }
            JSXMemberExpressionObject::MemberExpression(inner) => self.jsx_member(inner, env)?,
            JSXMemberExpressionObject::ThisExpression(_) => {
                env.lookup("this").unwrap_or(Value::Undefined)
            }
        };
        self.get_member(&object, member.property.name.as_str(), member.span)
    }

    fn eval_children(
        &mut self,
        children: &'a [JSXChild<'a>],
        env: &Env<'a>,
    ) -> Eval<'a, Vec<Value<'a>>> {
        let mut values = Vec::new();
        for child in children {
            match child {
                JSXChild::Text(text) => {
                    let cleaned = clean_jsx_text(text.value.as_str());
                    if !cleaned.is_empty() {
                        values.push(Value::str(decode_entities(&cleaned)));
                    }
                }
                JSXChild::Element(element) => {
                    values.push(Value::Markup(Rc::new(self.render_element(element, env)?)));
                }
                JSXChild::Fragment(fragment) => {
                    let inner = self.eval_children(&fragment.children, env)?;
                    values.push(Value::Markup(Rc::new(
                        self.values_to_nodes(inner, fragment.span)?,
                    )));
                }
                JSXChild::ExpressionContainer(container) => {
                    if let Some(expr) = container.expression.as_expression() {
                        values.push(self.eval(expr, env)?);
                    }
                }
                JSXChild::Spread(spread) => {
                    let value = self.eval(&spread.expression, env)?;
                    values.extend(self.iterate(&value, spread.span)?);
                }
            }
        }
        Ok(values)
    }

    /// Render an element of any kind: a tag name, an intrinsic, or a
    /// component. Shared by JSX and `createElement`.
    pub(crate) fn mount(
        &mut self,
        kind: Value<'a>,
        props: Vec<(String, Value<'a>)>,
        children: Vec<Value<'a>>,
        span: Span,
    ) -> Eval<'a, Vec<RenderNode>> {
        match &kind {
            Value::Str(tag) => {
                let children = if children.is_empty() {
                    props
                        .iter()
                        .find(|(k, _)| k == "children")
                        .map(|(_, v)| vec![v.clone()])
                        .unwrap_or_default()
                } else {
                    children
                };
                let attributes = self.convert_attributes(props, span)?;
                let children = self.values_to_nodes(children, span)?;
                Ok(vec![RenderNode::Element(ElementNode {
                    tag: tag.to_string(),
                    attributes,
                    children,
                })])
            }
            Value::Intrinsic(Intrinsic::Fragment) => {
                if children.is_empty() {
                    let from_props = props
                        .into_iter()
                        .filter(|(k, _)| k == "children")
                        .map(|(_, v)| v)
                        .collect();
                    return self.values_to_nodes(from_props, span);
                }
                self.values_to_nodes(children, span)
            }
            Value::Intrinsic(Intrinsic::EditableText) => self.mount_editable(props, children, span),
            Value::Function(_) | Value::Class(_) => {
                let mut object = JsObject::from_entries(props);
                match children.len() {
                    0 => {}
                    1 => {
                        let only = children.into_iter().next().unwrap_or(Value::Undefined);
                        object.set("children".to_string(), only);
                    }
                    _ => object.set("children".to_string(), Value::array(children)),
                }
                let props = Value::Object(Rc::new(std::cell::RefCell::new(object)));
                self.render_component(&kind, props, span)
            }
            other => Err(self.throw_error(
                "TypeError",
                format!(
                    "Element type is invalid: expected a string (for built-in components) or a class/function (for composite components) but got: {}.",
                    other.type_of()
                ),
                span,
            )),
        }
    }

    pub(crate) fn render_component(
        &mut self,
        component: &Value<'a>,
        props: Value<'a>,
        span: Span,
    ) -> Eval<'a, Vec<RenderNode>> {
        let output = match component {
            Value::Class(class) => {
                let instance = self.instantiate(class, vec![props], span)?;
                let render = self.get_member(&instance, "render", span)?;
                if !render.is_callable() {
                    return Err(self.throw_error(
                        "TypeError",
                        format!("{} has no render method", class.name),
                        span,
                    ));
                }
                self.call(&render, Some(instance), vec![], span)?
            }
            other => self.call(other, None, vec![props], span)?,
        };
        self.values_to_nodes(vec![output], span)
    }

    fn mount_editable(
        &mut self,
        props: Vec<(String, Value<'a>)>,
        children: Vec<Value<'a>>,
        span: Span,
    ) -> Eval<'a, Vec<RenderNode>> {
        let prop = |name: &str| {
            props
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
                .filter(|v| !v.is_nullish())
        };

        let field = prop("field").map(|v| v.to_js_string());
        let value = match prop("value") {
            Some(value) => value.to_js_string(),
            None => match &field {
                Some(key) => self.mapping_value(key),
                None => {
                    let nodes = self.values_to_nodes(children, span)?;
                    RenderedTree::new(nodes).text_content()
                }
            },
        };

        let binding = match &field {
            Some(key) => Some(key.clone()),
            None => {
                let mut found = None;
                for name in EDITABLE_HANDLERS {
                    if let Some(handler) = prop(name) {
                        found = self.trial_binding(&handler, span);
                        if found.is_some() {
                            break;
                        }
                    }
                }
                found
            }
        };

        let multiline = prop("multiline").map(|v| v.truthy()).unwrap_or(false);
        let tag = match prop("as").or_else(|| prop("tag")) {
            Some(Value::Str(tag)) => tag.to_string(),
            _ if multiline => "div".to_string(),
            _ => "span".to_string(),
        };
        let placeholder = prop("placeholder").map(|v| v.to_js_string());

        let rest = props
            .iter()
            .filter(|(k, _)| !EDITABLE_PROPS.contains(&k.as_str()))
            .cloned()
            .collect();
        let attributes = self.convert_attributes(rest, span)?;

        Ok(vec![RenderNode::Editable(EditableNode {
            tag,
            value,
            binding,
            multiline,
            placeholder,
            attributes,
        })])
    }

    fn mapping_value(&self, key: &str) -> String {
        match &self.mapping {
            Value::Object(obj) => obj
                .borrow()
                .get(key)
                .map(|v| v.to_js_string())
                .unwrap_or_default(),
            _ => String::new(),
        }
    }

    fn convert_attributes(
        &mut self,
        props: Vec<(String, Value<'a>)>,
        span: Span,
    ) -> Eval<'a, Vec<RenderAttribute>> {
        let mut attributes = Vec::new();
        for (name, value) in props {
            if matches!(name.as_str(), "children" | "key" | "ref") {
                continue;
            }
            if name == "dangerouslySetInnerHTML" {
                log::debug!("[PreviewNative] Dropping dangerouslySetInnerHTML");
                continue;
            }
            if value.is_nullish() {
                continue;
            }

            let converted = if name == "style" {
                match &value {
                    Value::Object(_) => AttributeValue::Style(self.style_text(&value)),
                    other => AttributeValue::Style(other.to_js_string()),
                }
            } else if is_event_prop(&name) && value.is_callable() {
                AttributeValue::Handler {
                    binding: self.trial_binding(&value, span),
                }
            } else {
                match &value {
                    Value::Bool(b) if name.starts_with("aria-") || name.starts_with("data-") => {
                        AttributeValue::Text(b.to_string())
                    }
                    Value::Bool(b) => AttributeValue::Flag(*b),
                    Value::Markup(_) => continue,
                    other if other.is_callable() => continue,
                    other => AttributeValue::Text(other.to_js_string()),
                }
            };
            attributes.push(RenderAttribute {
                name,
                value: converted,
            });
        }
        Ok(attributes)
    }

    fn style_text(&self, style: &Value<'a>) -> String {
        self.own_entries(style)
            .into_iter()
            .filter(|(_, v)| !v.is_nullish() && !matches!(v, Value::Bool(_)))
            .map(|(key, v)| {
                let text = match &v {
                    Value::Number(n) => css_number_value(&key, *n, &format_number(*n)),
                    other => other.to_js_string(),
                };
                format!("{}: {}", css_property_name(&key), text)
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Flatten child values into nodes, React style.
    pub(crate) fn values_to_nodes(
        &self,
        values: Vec<Value<'a>>,
        span: Span,
    ) -> Eval<'a, Vec<RenderNode>> {
        let mut nodes = Vec::new();
        for value in values {
            self.push_child(value, &mut nodes, span)?;
        }
        Ok(nodes)
    }

    fn push_child(&self, value: Value<'a>, nodes: &mut Vec<RenderNode>, span: Span) -> Eval<'a, ()> {
        match value {
            Value::Undefined | Value::Null | Value::Bool(_) => {}
            Value::Str(_) | Value::Number(_) => push_text(nodes, value.to_js_string()),
            Value::Array(items) => {
                let items = items.borrow().clone();
                for item in items {
                    self.push_child(item, nodes, span)?;
                }
            }
            Value::Markup(markup) => {
                for node in markup.iter() {
                    match node {
                        RenderNode::Text(text) => push_text(nodes, text.value.clone()),
                        other => nodes.push(other.clone()),
                    }
                }
            }
            Value::Object(obj) => {
                let keys = obj.borrow().keys().join(", ");
                return Err(self.throw_error(
                    "Error",
                    format!(
                        "Objects are not valid as a React child (found: object with keys {{{}}}). If you meant to render a collection of children, use an array instead.",
                        keys
                    ),
                    span,
                ));
            }
            _ => {}
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    fn stack_snapshot(&self) -> Vec<String> {
        self.frames.iter().rev().cloned().collect()
    }

    pub(crate) fn throw_error(&self, name: &str, message: impl Into<String>, span: Span) -> Fault<'a> {
        Fault::Thrown {
            value: error_object(name, &message.into()),
            offset: Some(span.start),
            stack: self.stack_snapshot(),
        }
    }

    /// Validate a length a script asks an array to take.
    pub(crate) fn array_length(&self, len: f64, span: Span) -> Eval<'a, usize> {
        if !(0.0..=u32::MAX as f64).contains(&len) || len.fract() != 0.0 {
            return Err(self.throw_error("RangeError", "Invalid array length", span));
        }
        let len = len as usize;
        if len > MAX_ARRAY_LENGTH {
            return Err(self.throw_error(
                "RangeError",
                format!("Array length {} exceeds the preview limit of {}", len, MAX_ARRAY_LENGTH),
                span,
            ));
        }
        Ok(len)
    }

    pub(crate) fn check_string_length(&self, len: usize, span: Span) -> Eval<'a, ()> {
        if len > MAX_STRING_LENGTH {
            return Err(self.throw_error("RangeError", "Invalid string length", span));
        }
        Ok(())
    }

    pub(crate) fn unsupported<T>(&self, construct: &str, span: Span) -> Eval<'a, T> {
        Err(Fault::Unsupported {
            construct: construct.to_string(),
            offset: span.start,
        })
    }

    fn snippet(&self, span: Span) -> String {
        let text = self
            .source
            .get(span.start as usize..span.end as usize)
            .unwrap_or("expression");
        if text.chars().count() > 40 {
            format!("{}...", text.chars().take(40).collect::<String>())
        } else {
            text.to_string()
        }
    }

    pub(crate) fn next_random(&mut self) -> f64 {
        // xorshift64*
        let mut x = self.random_state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.random_state = x;
        (x.wrapping_mul(0x2545_f491_4f6c_dd1d) >> 11) as f64 / (1u64 << 53) as f64
    }

    pub(crate) fn fault_to_error(&self, fault: Fault<'a>) -> SandboxError {
        match fault {
            Fault::Thrown {
                value,
                offset,
                stack,
            } => SandboxError::Runtime {
                message: describe_thrown(&value),
                location: offset.map(|o| SourceLocation::from_offset(self.source, o)),
                stack,
            },
            Fault::Unsupported { construct, offset } => SandboxError::Unsupported {
                construct,
                location: Some(SourceLocation::from_offset(self.source, offset)),
            },
        }
    }
}

impl Drop for Interpreter<'_> {
    fn drop(&mut self) {
        for scope in self.scopes.drain(..) {
            if let Some(env) = scope.upgrade() {
                env.clear();
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

pub(crate) fn error_object<'a>(name: &str, message: &str) -> Value<'a> {
    Value::object(vec![
        ("name".to_string(), Value::str(name)),
        ("message".to_string(), Value::str(message)),
    ])
}

fn describe_thrown(value: &Value<'_>) -> String {
    if let Value::Object(obj) = value {
        let obj = obj.borrow();
        if let Some(message) = obj.get("message") {
            let name = obj
                .get("name")
                .map(|n| n.to_js_string())
                .unwrap_or_else(|| "Error".to_string());
            return format!("{}: {}", name, message.to_js_string());
        }
    }
    format!("Uncaught {}", value.to_js_string())
}

fn static_key(key: &PropertyKey<'_>) -> Option<String> {
    match key {
        PropertyKey::StaticIdentifier(id) => Some(id.name.to_string()),
        PropertyKey::StringLiteral(lit) => Some(lit.value.to_string()),
        PropertyKey::NumericLiteral(lit) => Some(format_number(lit.value)),
        _ => None,
    }
}

fn binding_name<'b>(pattern: &'b BindingPattern<'_>) -> Option<&'b str> {
    match pattern {
        BindingPattern::BindingIdentifier(id) => Some(id.name.as_str()),
        _ => None,
    }
}

pub(crate) fn property_key_string(value: &Value<'_>) -> String {
    value.to_js_string()
}

fn delete_key(object: &Value<'_>, key: &str) -> bool {
    match object {
        Value::Object(obj) => {
            obj.borrow_mut().remove(key);
            true
        }
        _ => true,
    }
}

fn add<'a>(left: &Value<'a>, right: &Value<'a>) -> Value<'a> {
    let stringy = |v: &Value<'a>| {
        matches!(
            v,
            Value::Str(_) | Value::Array(_) | Value::Object(_) | Value::Markup(_)
        )
    };
    if stringy(left) || stringy(right) {
        Value::str(format!("{}{}", left.to_js_string(), right.to_js_string()))
    } else {
        Value::Number(left.to_number() + right.to_number())
    }
}

fn compare(op: &str, left: &Value<'_>, right: &Value<'_>) -> bool {
    if let (Value::Str(a), Value::Str(b)) = (left, right) {
        return match op {
            "<" => a < b,
            "<=" => a <= b,
            ">" => a > b,
            _ => a >= b,
        };
    }
    let (a, b) = (left.to_number(), right.to_number());
    match op {
        "<" => a < b,
        "<=" => a <= b,
        ">" => a > b,
        _ => a >= b,
    }
}

pub(crate) fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    (n.trunc() % 4_294_967_296.0) as i64 as u32 as i32
}

fn is_event_prop(name: &str) -> bool {
    name.len() > 2
        && name.starts_with("on")
        && name[2..].chars().next().map(|c| c.is_ascii_uppercase()).unwrap_or(false)
}

fn push_text(nodes: &mut Vec<RenderNode>, text: String) {
    if let Some(RenderNode::Text(last)) = nodes.last_mut() {
        last.value.push_str(&text);
        return;
    }
    nodes.push(RenderNode::Text(TextNode { value: text }));
}

/// JSX text whitespace rules: lines are trimmed where they meet a line
/// break, blank lines vanish, and the remaining lines join with one space.
pub(crate) fn clean_jsx_text(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalized.split('\n').collect();
    let last_non_empty = lines
        .iter()
        .rposition(|line| line.chars().any(|c| c != ' ' && c != '\t'));

    let mut out = String::new();
    for (idx, line) in lines.iter().enumerate() {
        let mut trimmed = line.replace('\t', " ");
        if idx != 0 {
            trimmed = trimmed.trim_start_matches(' ').to_string();
        }
        if idx != lines.len() - 1 {
            trimmed = trimmed.trim_end_matches(' ').to_string();
        }
        if !trimmed.is_empty() {
            out.push_str(&trimmed);
            if Some(idx) != last_non_empty {
                out.push(' ');
            }
        }
    }
    out
}

pub(crate) fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail.find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                "copy" => Some('\u{a9}'),
                "reg" => Some('\u{ae}'),
                "trade" => Some('\u{2122}'),
                "hellip" => Some('\u{2026}'),
                "mdash" => Some('\u{2014}'),
                "ndash" => Some('\u{2013}'),
                "middot" => Some('\u{b7}'),
                "bull" => Some('\u{2022}'),
                "euro" => Some('\u{20ac}'),
                _ => {
                    let code = if let Some(hex) = entity.strip_prefix("#x") {
                        u32::from_str_radix(hex, 16).ok()
                    } else if let Some(dec) = entity.strip_prefix('#') {
                        dec.parse::<u32>().ok()
                    } else {
                        None
                    };
                    code.and_then(char::from_u32)
                }
            };
            ch.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn statement_name(stmt: &Statement<'_>) -> &'static str {
    match stmt {
        Statement::ImportDeclaration(_) => "import declaration",
        Statement::ExportDefaultDeclaration(_)
        | Statement::ExportNamedDeclaration(_)
        | Statement::ExportAllDeclaration(_) => "export declaration",
        Statement::ForInStatement(_) => "for-in loop",
        Statement::LabeledStatement(_) => "labeled statement",
        Statement::BreakStatement(_) | Statement::ContinueStatement(_) => "labeled jump",
        Statement::WithStatement(_) => "with statement",
        Statement::DebuggerStatement(_) => "debugger statement",
        Statement::TSEnumDeclaration(_) => "enum declaration",
        Statement::TSModuleDeclaration(_) => "namespace declaration",
        _ => "statement",
    }
}
