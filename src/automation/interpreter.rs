//! Tree-walking interpreter for compiled automation scripts
//!
//! Statements run strictly in order; every capability call is awaited before
//! the next statement starts. Scopes form a parent chain of `Rc<RefCell<_>>`
//! frames so closures can capture the scope they were defined in.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use futures::future::LocalBoxFuture;
use futures::FutureExt;

use super::ast::{BinaryOp, Expr, FunctionDef, Stmt, TemplatePart, UnaryOp, CATCH_BINDING};
use super::capability::Capabilities;
use super::error::RuntimeError;
use super::tasks::ScriptTask;
use super::value::{Builtin, Closure, Value};
use crate::terminal::LineKind;

pub type Env = Rc<RefCell<Scope>>;

#[derive(Debug)]
struct Binding {
    value: Value,
    constant: bool,
}

/// One frame of variable bindings
#[derive(Debug, Default)]
pub struct Scope {
    vars: HashMap<String, Binding>,
    parent: Option<Env>,
}

impl Scope {
    pub fn root() -> Env {
        Rc::new(RefCell::new(Scope::default()))
    }

    pub fn child(parent: &Env) -> Env {
        Rc::new(RefCell::new(Scope {
            vars: HashMap::new(),
            parent: Some(Rc::clone(parent)),
        }))
    }
}

fn lookup(env: &Env, name: &str) -> Option<Value> {
    let scope = env.borrow();
    match scope.vars.get(name) {
        Some(binding) => Some(binding.value.clone()),
        None => scope.parent.as_ref().and_then(|parent| lookup(parent, name)),
    }
}

fn declare(env: &Env, name: &str, value: Value, constant: bool) {
    env.borrow_mut()
        .vars
        .insert(name.to_string(), Binding { value, constant });
}

/// Assign to an existing binding; unknown names become globals
fn assign(env: &Env, name: &str, value: Value) -> Result<(), RuntimeError> {
    let mut current = Rc::clone(env);
    loop {
        let parent = {
            let mut scope = current.borrow_mut();
            if let Some(binding) = scope.vars.get_mut(name) {
                if binding.constant {
                    return Err(RuntimeError::thrown(format!(
                        "Assignment to constant variable '{name}'"
                    )));
                }
                binding.value = value;
                return Ok(());
            }
            scope.parent.clone()
        };
        match parent {
            Some(parent) => current = parent,
            None => {
                declare(&current, name, value, false);
                return Ok(());
            }
        }
    }
}

/// How a statement finished
#[derive(Debug)]
enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

enum PathKey {
    Field(String),
    Index(Value),
}

/// Run a whole program in a fresh global scope
pub async fn run_program(caps: &mut Capabilities<'_>, program: &[Stmt]) -> Result<(), RuntimeError> {
    let globals = Scope::root();
    let mut interpreter = Interpreter { caps };
    interpreter.exec_block(program, globals).await?;
    Ok(())
}

/// Call a script function value, as done when a registered script task runs
pub async fn call_function(
    caps: &mut Capabilities<'_>,
    callee: Value,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    let mut interpreter = Interpreter { caps };
    interpreter.call_value(callee, args).await
}

struct Interpreter<'c, 'a> {
    caps: &'c mut Capabilities<'a>,
}

impl<'c, 'a> Interpreter<'c, 'a> {
    fn exec_block<'s>(
        &'s mut self,
        stmts: &'s [Stmt],
        env: Env,
    ) -> LocalBoxFuture<'s, Result<Flow, RuntimeError>> {
        async move {
            // Named functions are visible throughout their block
            for stmt in stmts {
                if let Stmt::FnDef(def) = stmt {
                    if let Some(name) = &def.name {
                        let closure = Value::Function(Closure {
                            def: Arc::clone(def),
                            env: Rc::clone(&env),
                        });
                        declare(&env, name, closure, false);
                    }
                }
            }

            for stmt in stmts {
                match self.exec_stmt(stmt, &env).await? {
                    Flow::Normal => {}
                    flow => return Ok(flow),
                }
            }
            Ok(Flow::Normal)
        }
        .boxed_local()
    }

    async fn exec_stmt(&mut self, stmt: &Stmt, env: &Env) -> Result<Flow, RuntimeError> {
        match stmt {
            Stmt::Let {
                name,
                value,
                constant,
            } => {
                let value = match value {
                    Some(expr) => self.eval(expr, env).await?,
                    None => Value::Nil,
                };
                declare(env, name, value, *constant);
            }
            Stmt::Assign { target, value } => {
                let value = self.eval(value, env).await?;
                self.assign_target(target, value, env).await?;
            }
            Stmt::Expr(expr) => {
                self.eval(expr, env).await?;
            }
            Stmt::If {
                branches,
                otherwise,
            } => {
                for (condition, body) in branches {
                    if self.eval(condition, env).await?.is_truthy() {
                        return self.exec_block(body, Scope::child(env)).await;
                    }
                }
                if let Some(body) = otherwise {
                    return self.exec_block(body, Scope::child(env)).await;
                }
            }
            Stmt::ForRange {
                var,
                start,
                end,
                body,
            } => {
                let start = expect_number(&self.eval(start, env).await?, "Range start")?;
                let end = expect_number(&self.eval(end, env).await?, "Range end")?;
                let mut i = start;
                while i <= end {
                    let scope = Scope::child(env);
                    declare(&scope, var, Value::Number(i), false);
                    match self.exec_block(body, scope).await? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    i += 1.0;
                }
            }
            Stmt::ForEach {
                var,
                iterable,
                body,
            } => {
                let items = match self.eval(iterable, env).await? {
                    Value::Array(items) => items,
                    Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
                    other => {
                        return Err(RuntimeError::thrown(format!(
                            "{} is not iterable",
                            other.type_name()
                        )))
                    }
                };
                for item in items {
                    let scope = Scope::child(env);
                    declare(&scope, var, item, false);
                    match self.exec_block(body, scope).await? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            Stmt::While { condition, body } => {
                while self.eval(condition, env).await?.is_truthy() {
                    match self.exec_block(body, Scope::child(env)).await? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            Stmt::Try { body, handler } => match self.exec_block(body, Scope::child(env)).await {
                Ok(flow) => return Ok(flow),
                Err(err) => {
                    let scope = Scope::child(env);
                    declare(&scope, CATCH_BINDING, Value::error_object(err.to_string()), false);
                    return self.exec_block(handler, scope).await;
                }
            },
            // Hoisted by exec_block
            Stmt::FnDef(_) => {}
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, env).await?,
                    None => Value::Nil,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::Throw(expr) => {
                let value = self.eval(expr, env).await?;
                let message = match &value {
                    Value::Object(fields) => match fields.get("message") {
                        Some(message) => message.to_string(),
                        None => value.to_string(),
                    },
                    other => other.to_string(),
                };
                return Err(RuntimeError::Thrown(message));
            }
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    async fn assign_target(&mut self, target: &Expr, value: Value, env: &Env) -> Result<(), RuntimeError> {
        let mut path = Vec::new();
        let mut node = target;
        let root = loop {
            match node {
                Expr::Ident(name) => break name,
                Expr::Member { object, property } => {
                    path.push(PathKey::Field(property.clone()));
                    node = object.as_ref();
                }
                Expr::Index { object, index } => {
                    path.push(PathKey::Index(self.eval(index, env).await?));
                    node = object.as_ref();
                }
                _ => return Err(RuntimeError::thrown("Invalid assignment target")),
            }
        };

        if path.is_empty() {
            return assign(env, root, value);
        }

        path.reverse();
        let mut container = lookup(env, root)
            .ok_or_else(|| RuntimeError::thrown(format!("{root} is not defined")))?;
        set_path(&mut container, &path, value)?;
        assign(env, root, container)
    }

    fn eval<'s>(&'s mut self, expr: &'s Expr, env: &'s Env) -> LocalBoxFuture<'s, Result<Value, RuntimeError>> {
        async move {
            match expr {
                Expr::Number(n) => Ok(Value::Number(*n)),
                Expr::Str(s) => Ok(Value::Str(s.clone())),
                Expr::Bool(b) => Ok(Value::Bool(*b)),
                Expr::Nil => Ok(Value::Nil),
                Expr::Template(parts) => {
                    let mut out = String::new();
                    for part in parts {
                        match part {
                            TemplatePart::Literal(text) => out.push_str(text),
                            TemplatePart::Expr(expr) => out.push_str(&self.eval(expr, env).await?.to_string()),
                        }
                    }
                    Ok(Value::Str(out))
                }
                Expr::Array(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        values.push(self.eval(item, env).await?);
                    }
                    Ok(Value::Array(values))
                }
                Expr::Ident(name) => resolve(env, name),
                Expr::Unary { op, operand } => {
                    let value = self.eval(operand, env).await?;
                    match op {
                        UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                        UnaryOp::Neg => Ok(Value::Number(-expect_number(&value, "Operand of '-'")?)),
                    }
                }
                Expr::Binary { op, left, right } => {
                    let left = self.eval(left, env).await?;
                    match op {
                        BinaryOp::And if !left.is_truthy() => return Ok(left),
                        BinaryOp::Or if left.is_truthy() => return Ok(left),
                        BinaryOp::And | BinaryOp::Or => return self.eval(right, env).await,
                        _ => {}
                    }
                    let right = self.eval(right, env).await?;
                    binary(*op, left, right)
                }
                Expr::Call { callee, args } => {
                    let function = match callee.as_ref() {
                        Expr::Ident(name) => resolve_callable(env, name)?,
                        other => self.eval(other, env).await?,
                    };
                    let mut values = Vec::with_capacity(args.len());
                    for arg in args {
                        values.push(self.eval(arg, env).await?);
                    }
                    self.call_value(function, values).await
                }
                Expr::Member { object, property } => {
                    let object = self.eval(object, env).await?;
                    member(&object, property)
                }
                Expr::Index { object, index } => {
                    let object = self.eval(object, env).await?;
                    let index = self.eval(index, env).await?;
                    index_value(&object, &index)
                }
                Expr::Lambda(def) => Ok(Value::Function(Closure {
                    def: Arc::clone(def),
                    env: Rc::clone(env),
                })),
            }
        }
        .boxed_local()
    }

    fn call_value<'s>(&'s mut self, callee: Value, args: Vec<Value>) -> LocalBoxFuture<'s, Result<Value, RuntimeError>> {
        async move {
            match callee {
                Value::Function(closure) => self.call_closure(closure, args).await,
                Value::Builtin(builtin) => self.call_builtin(builtin, args).await,
                other => Err(RuntimeError::thrown(format!("{} is not a function", other.type_name()))),
            }
        }
        .boxed_local()
    }

    async fn call_closure(&mut self, closure: Closure, args: Vec<Value>) -> Result<Value, RuntimeError> {
        self.caps.enter_call()?;
        let result = self.run_closure(closure, args).await;
        self.caps.exit_call();
        result
    }

    async fn run_closure(&mut self, closure: Closure, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let def: Arc<FunctionDef> = closure.def;
        let scope = Scope::child(&closure.env);
        let mut args = args.into_iter();
        for param in &def.params {
            declare(&scope, param, args.next().unwrap_or(Value::Nil), false);
        }

        match self.exec_block(&def.body, scope).await? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Nil),
        }
    }

    async fn call_builtin(&mut self, builtin: Builtin, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let name = builtin.name();
        match builtin {
            Builtin::CreateFile => {
                let path = string_arg(&args, 0, name)?;
                let content = optional_text(&args, 1);
                Ok(self.caps.create_file(&path, &content).await?.into())
            }
            Builtin::DeleteFile => {
                let path = string_arg(&args, 0, name)?;
                Ok(self.caps.delete_file(&path).await?.into())
            }
            Builtin::ReadFile => {
                let path = string_arg(&args, 0, name)?;
                Ok(Value::Str(self.caps.read_file(&path).await?))
            }
            Builtin::WriteFile => {
                let path = string_arg(&args, 0, name)?;
                let content = optional_text(&args, 1);
                Ok(self.caps.write_file(&path, &content).await?.into())
            }
            Builtin::CreateDirectory => {
                let path = string_arg(&args, 0, name)?;
                Ok(self.caps.create_directory(&path).await?.into())
            }
            Builtin::DeleteDirectory => {
                let path = string_arg(&args, 0, name)?;
                Ok(self.caps.delete_directory(&path).await?.into())
            }
            Builtin::Print => {
                let text = join(&args, Value::print_text);
                self.caps.emit(LineKind::Info, text);
                Ok(Value::Bool(true))
            }
            Builtin::PrintError => {
                let text = join(&args, Value::to_string);
                self.caps.emit(LineKind::Error, text);
                Ok(Value::Bool(true))
            }
            Builtin::PrintSuccess => {
                let text = join(&args, Value::to_string);
                self.caps.emit(LineKind::Success, text);
                Ok(Value::Bool(true))
            }
            Builtin::Clear => {
                self.caps.clear();
                Ok(Value::Bool(true))
            }
            Builtin::Sleep => {
                let millis = match args.first() {
                    Some(value) => expect_number(value, "sleep duration")?,
                    None => 0.0,
                };
                self.caps.sleep(millis).await;
                Ok(Value::Nil)
            }
            Builtin::RunTask => {
                let mut args = args.into_iter();
                let task = match args.next() {
                    Some(Value::Str(task)) => task,
                    _ => return Err(RuntimeError::thrown("runTask expects a task name")),
                };
                let tasks = self.caps.tasks();
                tasks.invoke(&task, self.caps, args.collect()).await
            }
            Builtin::RegisterTask => {
                let task = string_arg(&args, 0, name)?;
                let description = optional_text(&args, 1);
                match args.get(2) {
                    Some(Value::Function(closure)) => {
                        let handler = ScriptTask::new(closure.clone());
                        self.caps.tasks().register(&task, &description, handler);
                        Ok(Value::Bool(true))
                    }
                    _ => Err(RuntimeError::thrown("registerTask expects a function handler")),
                }
            }
        }
    }
}

/// Variables shadow builtins; unknown names fall back to the capability set
fn resolve(env: &Env, name: &str) -> Result<Value, RuntimeError> {
    lookup(env, name)
        .or_else(|| Builtin::from_name(name).map(Value::Builtin))
        .ok_or_else(|| RuntimeError::thrown(format!("{name} is not defined")))
}

/// Like `resolve`, but a non-callable variable does not hide a builtin
///
/// Inside `catch`, `error` is bound to the caught error while `error "..."`
/// still prints.
fn resolve_callable(env: &Env, name: &str) -> Result<Value, RuntimeError> {
    match lookup(env, name) {
        Some(value) if value.is_callable() => Ok(value),
        found => match Builtin::from_name(name) {
            Some(builtin) => Ok(Value::Builtin(builtin)),
            None if found.is_some() => Err(RuntimeError::thrown(format!("{name} is not a function"))),
            None => Err(RuntimeError::thrown(format!("{name} is not defined"))),
        },
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, RuntimeError> {
    let value = match op {
        BinaryOp::Add => match (&left, &right) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
            (Value::Str(_), _) | (_, Value::Str(_)) => Value::Str(format!("{left}{right}")),
            _ => return Err(type_mismatch("+", &left, &right)),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let (Value::Number(a), Value::Number(b)) = (&left, &right) else {
                return Err(type_mismatch(op_symbol(op), &left, &right));
            };
            Value::Number(match op {
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            })
        }
        BinaryOp::Eq => Value::Bool(left.loose_eq(&right)),
        BinaryOp::NotEq => Value::Bool(!left.loose_eq(&right)),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let ordering = match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => return Err(type_mismatch(op_symbol(op), &left, &right)),
            };
            let Some(ordering) = ordering else {
                return Ok(Value::Bool(false));
            };
            Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::LtEq => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
        BinaryOp::And => if left.is_truthy() { right } else { left },
        BinaryOp::Or => if left.is_truthy() { left } else { right },
    };
    Ok(value)
}

fn op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        BinaryOp::Eq => "==",
        BinaryOp::NotEq => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::LtEq => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::GtEq => ">=",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
    }
}

fn type_mismatch(op: &str, left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::thrown(format!(
        "Cannot apply '{op}' to {} and {}",
        left.type_name(),
        right.type_name()
    ))
}

fn expect_number(value: &Value, what: &str) -> Result<f64, RuntimeError> {
    match value {
        Value::Number(n) => Ok(*n),
        other => Err(RuntimeError::thrown(format!(
            "{what} must be a number, got {}",
            other.type_name()
        ))),
    }
}

fn string_arg(args: &[Value], index: usize, function: &str) -> Result<String, RuntimeError> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s.clone()),
        Some(other) => Err(RuntimeError::thrown(format!(
            "{function} expects a string, got {}",
            other.type_name()
        ))),
        None => Err(RuntimeError::thrown(format!("{function} expects a path"))),
    }
}

fn optional_text(args: &[Value], index: usize) -> String {
    match args.get(index) {
        None | Some(Value::Nil) => String::new(),
        Some(value) => value.to_string(),
    }
}

fn join(args: &[Value], render: fn(&Value) -> String) -> String {
    args.iter().map(render).collect::<Vec<_>>().join(" ")
}

fn member(object: &Value, property: &str) -> Result<Value, RuntimeError> {
    match (object, property) {
        (Value::Str(s), "length") => Ok(Value::Number(s.chars().count() as f64)),
        (Value::Array(items), "length") => Ok(Value::Number(items.len() as f64)),
        (Value::Object(fields), _) => Ok(fields.get(property).cloned().unwrap_or(Value::Nil)),
        (Value::Nil, _) => Err(RuntimeError::thrown(format!(
            "Cannot read property '{property}' of null"
        ))),
        _ => Ok(Value::Nil),
    }
}

fn index_value(object: &Value, index: &Value) -> Result<Value, RuntimeError> {
    match (object, index) {
        (Value::Array(items), Value::Number(n)) => Ok(position(*n)
            .and_then(|i| items.get(i))
            .cloned()
            .unwrap_or(Value::Nil)),
        (Value::Str(s), Value::Number(n)) => Ok(position(*n)
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::Str(c.to_string()))
            .unwrap_or(Value::Nil)),
        (Value::Object(_), Value::Str(key)) => member(object, key),
        (Value::Nil, _) => Err(RuntimeError::thrown("Cannot index null")),
        _ => Err(RuntimeError::thrown(format!(
            "Cannot index {} with {}",
            object.type_name(),
            index.type_name()
        ))),
    }
}

/// Largest integer an `f64` holds exactly
const MAX_EXACT_INDEX: f64 = 9_007_199_254_740_991.0;

/// How far past the end an array assignment may reach
const MAX_INDEX_GAP: usize = 10_000;

fn position(n: f64) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0 && n <= MAX_EXACT_INDEX).then_some(n as usize)
}

fn set_path(container: &mut Value, path: &[PathKey], value: Value) -> Result<(), RuntimeError> {
    let Some((key, rest)) = path.split_first() else {
        *container = value;
        return Ok(());
    };

    let slot = match (container, key) {
        (Value::Object(fields), PathKey::Field(name))
        | (Value::Object(fields), PathKey::Index(Value::Str(name))) => {
            fields.entry(name.clone()).or_insert(Value::Nil)
        }
        (Value::Array(items), PathKey::Index(Value::Number(n))) => {
            let i = position(*n)
                .filter(|&i| i <= items.len() + MAX_INDEX_GAP)
                .ok_or_else(|| RuntimeError::thrown("Invalid array index"))?;
            if i >= items.len() {
                items.resize(i + 1, Value::Nil);
            }
            &mut items[i]
        }
        (other, _) => {
            return Err(RuntimeError::thrown(format!(
                "Cannot assign into {}",
                other.type_name()
            )))
        }
    };
    set_path(slot, rest, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::capability::fakes::{RecordingStore, VecSink};
    use crate::automation::parser::parse_program;
    use crate::automation::tasks::TaskRegistry;

    async fn run(source: &str) -> (Result<(), RuntimeError>, Vec<String>, Vec<String>) {
        let store = RecordingStore::default();
        let mut sink = VecSink::default();
        let program = parse_program(source).unwrap();
        let result = {
            let mut caps = Capabilities::new(&store, &mut sink, Rc::new(TaskRegistry::with_builtins()));
            run_program(&mut caps, &program).await
        };
        let lines = sink.texts().into_iter().map(str::to_string).collect();
        (result, lines, store.calls())
    }

    #[tokio::test]
    async fn test_arithmetic_and_interpolation() {
        let (result, lines, _) = run("let n = 2 + 3 * 4\nprint \"n = {n}\"\nprint n / 4").await;
        assert!(result.is_ok());
        assert_eq!(lines, vec!["n = 14", "3.5"]);
    }

    #[tokio::test]
    async fn test_loops() {
        let (_, lines, _) = run(
            "for i in 1..3 { print i }\n\
             for c in \"ab\" { print c }\n\
             let k = 0\nwhile k < 10 { k = k + 1\n if k == 2 { continue }\n if k > 3 { break }\n print \"k{k}\" }",
        )
        .await;
        assert_eq!(lines, vec!["1", "2", "3", "a", "b", "k1", "k3"]);
    }

    #[tokio::test]
    async fn test_functions_are_hoisted_and_capture_scope() {
        let (result, lines, _) = run(
            "print double(4)\n\
             fn double(x) { return x * 2 }\n\
             let base = 10\n\
             let add = fn(x) => x + base\n\
             print add(5)",
        )
        .await;
        assert!(result.is_ok(), "{result:?}");
        assert_eq!(lines, vec!["8", "15"]);
    }

    #[tokio::test]
    async fn test_try_catch_binds_error() {
        let (result, lines, _) = run(
            "try {\n throw \"boom\"\n} catch {\n error \"caught: {error.message}\"\n}\nprint \"after\"",
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(lines, vec!["caught: boom", "after"]);
    }

    #[tokio::test]
    async fn test_capabilities_run_in_order() {
        let (result, _, calls) = run(
            "createDirectory(\"docs\")\n\
             let r = createFile(\"docs/a.txt\", \"hi\")\n\
             if r.status == \"success\" { writeFile(\"docs/a.txt\", readFile(\"docs/a.txt\") + \"!\") }\n\
             deleteFile(\"docs/a.txt\")",
        )
        .await;
        assert!(result.is_ok(), "{result:?}");
        assert_eq!(
            calls,
            vec![
                "createDirectory(docs)",
                "createFile(docs/a.txt)",
                "readFile(docs/a.txt)",
                "writeFile(docs/a.txt)",
                "deleteFile(docs/a.txt)"
            ]
        );
    }

    #[tokio::test]
    async fn test_print_formats_objects_as_json() {
        let (_, lines, _) = run("let r = deleteFile(\"missing.txt\")\nprint \"result:\", r").await;
        assert_eq!(
            lines,
            vec!["result: {\n  \"message\": \"File not found\",\n  \"status\": \"error\"\n}"]
        );
    }

    #[tokio::test]
    async fn test_unknown_name_fails() {
        let (result, _, _) = run("print \"a\"\nmissing()\nprint \"b\"").await;
        assert_eq!(result, Err(RuntimeError::thrown("missing is not defined")));
    }

    #[tokio::test]
    async fn test_const_cannot_be_reassigned() {
        let (result, _, _) = run("const x = 1\nx = 2").await;
        assert!(matches!(result, Err(RuntimeError::Thrown(msg)) if msg.contains("constant")));
    }

    #[tokio::test]
    async fn test_member_and_index_assignment() {
        let (result, lines, _) = run(
            "let items = [1, 2]\nitems[2] = 3\nprint items.length, items[2]\n\
             let r = createFile(\"x.txt\")\nr.status = \"changed\"\nprint r.status",
        )
        .await;
        assert!(result.is_ok(), "{result:?}");
        assert_eq!(lines, vec!["3 3", "changed"]);
    }

    #[tokio::test]
    async fn test_out_of_range_index_assignment_fails() {
        let (result, _, _) = run("let a = []\na[100000000000000000000000000000] = 1").await;
        assert_eq!(result, Err(RuntimeError::thrown("Invalid array index")));

        let (result, _, _) = run("let a = [1]\na[100000000] = 1").await;
        assert_eq!(result, Err(RuntimeError::thrown("Invalid array index")));

        let (_, lines, _) = run("let a = []\na[3] = 1\nprint a.length, a[-1]").await;
        assert_eq!(lines, vec!["4 null"]);
    }

    #[tokio::test]
    async fn test_runaway_recursion_is_catchable() {
        let (result, lines, _) = run(
            "fn down(n) { return down(n + 1) }\n\
             try {\n down(0)\n} catch {\n print error.message\n}\n\
             fn count(n) { if n == 0 { return 0 }\n return 1 + count(n - 1) }\n\
             print count(20)",
        )
        .await;
        assert!(result.is_ok(), "{result:?}");
        assert_eq!(lines, vec!["Maximum call stack size exceeded", "20"]);
    }

    #[tokio::test]
    async fn test_clear_empties_output() {
        let (_, lines, _) = run("print \"gone\"\nclear\nsuccess \"kept\"").await;
        assert_eq!(lines, vec!["kept"]);
    }

    #[tokio::test]
    async fn test_script_registered_task() {
        let (result, lines, _) = run(
            "registerTask(\"greet\", \"Say hello\", fn(name) { print \"hello {name}\" })\n\
             runTask(\"greet\", \"ana\")",
        )
        .await;
        assert!(result.is_ok(), "{result:?}");
        assert_eq!(lines, vec!["hello ana"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_suspends() {
        let start = tokio::time::Instant::now();
        let (result, _, _) = run("await sleep 250").await;
        assert!(result.is_ok());
        assert!(start.elapsed() >= std::time::Duration::from_millis(250));
    }
}
