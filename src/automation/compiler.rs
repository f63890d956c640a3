//! Automation source to executable script
//!
//! Three dialects share one syntax tree. Which one applies is decided from
//! the comment-stripped source, in this order:
//!
//! 1. task definitions: the source mentions the word `task`
//! 2. simple commands: no `function` keyword and no `=>` arrow
//! 3. the advanced language, parsed by [`parse_program`]

use std::sync::LazyLock;

use regex_lite::Regex;
use serde::Serialize;
use tracing::debug;

use super::ast::{Expr, Stmt, TemplatePart};
use super::capability::Capabilities;
use super::error::{CompileError, RuntimeError};
use super::interpreter::run_program;
use super::parser::{parse_arguments, parse_program};
use crate::terminal::LineKind;

static TASK_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\btask\b").expect("task keyword pattern is valid"));

static FUNCTION_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bfunction\b|=>").expect("function keyword pattern is valid"));

static TASK_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"task\s+(?:"([^"]*)"|'([^']*)')\s*\{((?s:.*?))\}"#)
        .expect("task block pattern is valid")
});

static TASK_ARGUMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+):\s*(.+)").expect("task argument pattern is valid"));

/// Dialect a script was written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    TaskDefinition,
    SimpleCommand,
    Advanced,
}

/// Executable form of one automation block
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledScript {
    tier: Tier,
    program: Vec<Stmt>,
}

impl CompiledScript {
    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn program(&self) -> &[Stmt] {
        &self.program
    }

    /// Run against a capability set, stopping at the first unhandled failure
    pub async fn run(&self, caps: &mut Capabilities<'_>) -> Result<(), RuntimeError> {
        let result = run_program(caps, &self.program).await;
        if let Err(err) = &result {
            if self.tier == Tier::Advanced {
                caps.emit(LineKind::Error, format!("Automation error: {err}"));
            }
        }
        result
    }
}

/// Compile raw automation source
pub fn compile(source: &str) -> Result<CompiledScript, CompileError> {
    let source = strip_comments(source);
    let tier = select_tier(&source);

    let program = match tier {
        Tier::TaskDefinition => compile_tasks(&source)?,
        Tier::SimpleCommand => compile_commands(&source)?,
        Tier::Advanced => parse_program(&source)?,
    };
    validate(&program, Context::default())?;

    debug!("Compiled {:?} script with {} statement(s)", tier, program.len());
    Ok(CompiledScript { tier, program })
}

/// Pick the dialect for comment-free source
pub fn select_tier(source: &str) -> Tier {
    if TASK_KEYWORD.is_match(source) {
        Tier::TaskDefinition
    } else if !FUNCTION_KEYWORD.is_match(source) {
        Tier::SimpleCommand
    } else {
        Tier::Advanced
    }
}

/// Remove `//` comments line by line, leaving string literals intact
pub fn strip_comments(source: &str) -> String {
    source
        .lines()
        .map(strip_line_comment)
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_line_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut prev_slash = false;

    for (idx, ch) in line.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                }
            }
            None => {
                if ch == '/' && prev_slash {
                    return &line[..idx - 1];
                }
                if ch == '"' || ch == '\'' {
                    quote = Some(ch);
                }
            }
        }
        prev_slash = quote.is_none() && ch == '/';
    }
    line
}

/// `task "name" { key: value ... }` blocks become `runTask(name, values...)`
///
/// Key names are not used; values become positional arguments in order.
fn compile_tasks(source: &str) -> Result<Vec<Stmt>, CompileError> {
    let mut program = Vec::new();

    for caps in TASK_BLOCK.captures_iter(source) {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        let body = caps.get(3).map(|m| m.as_str()).unwrap_or_default();

        let mut args = vec![Expr::Str(name.to_string())];
        for line in body.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let Some(pair) = TASK_ARGUMENT.captures(line) else {
                continue;
            };
            let value = pair.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
            let values = parse_arguments(value).map_err(|err| {
                CompileError::new(format!("task \"{name}\": {}", err.reason))
            })?;
            args.extend(values);
        }

        program.push(Stmt::Expr(Expr::call("runTask", args)));
    }

    if program.is_empty() {
        debug!("Task dialect selected but no task blocks matched");
    }
    Ok(program)
}

/// One command per line: `create`, `delete`, `print`; anything else is ignored
fn compile_commands(source: &str) -> Result<Vec<Stmt>, CompileError> {
    let mut program = Vec::new();

    for (idx, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map(|(word, rest)| (word, rest.trim()))
            .unwrap_or((line, ""));

        let stmt = match word {
            "create" | "delete" => {
                if rest.is_empty() {
                    return Err(CompileError::at_line(idx + 1, format!("{word} expects a path")));
                }
                // A dot marks a file, anything else a folder
                let function = match (word, rest.contains('.')) {
                    ("create", true) => "createFile",
                    ("create", false) => "createDirectory",
                    (_, true) => "deleteFile",
                    (_, false) => "deleteDirectory",
                };
                Expr::call(function, vec![Expr::Str(rest.to_string())])
            }
            "print" => {
                let args = parse_arguments(rest).map_err(|err| {
                    CompileError::new(format!("print on line {}: {}", idx + 1, err.reason))
                })?;
                Expr::call("print", args)
            }
            other => {
                debug!("Ignoring unrecognized command '{}' on line {}", other, idx + 1);
                continue;
            }
        };
        program.push(Stmt::Expr(stmt));
    }

    Ok(program)
}

#[derive(Debug, Clone, Copy, Default)]
struct Context {
    in_function: bool,
    in_loop: bool,
}

/// Reject control flow that has nowhere to go
fn validate(stmts: &[Stmt], ctx: Context) -> Result<(), CompileError> {
    for stmt in stmts {
        match stmt {
            Stmt::Let { value, .. } => {
                if let Some(value) = value {
                    validate_expr(value)?;
                }
            }
            Stmt::Assign { target, value } => {
                validate_expr(target)?;
                validate_expr(value)?;
            }
            Stmt::Expr(expr) | Stmt::Throw(expr) => validate_expr(expr)?,
            Stmt::If {
                branches,
                otherwise,
            } => {
                for (condition, body) in branches {
                    validate_expr(condition)?;
                    validate(body, ctx)?;
                }
                if let Some(body) = otherwise {
                    validate(body, ctx)?;
                }
            }
            Stmt::ForRange {
                start, end, body, ..
            } => {
                validate_expr(start)?;
                validate_expr(end)?;
                validate(body, Context { in_loop: true, ..ctx })?;
            }
            Stmt::ForEach { iterable, body, .. } => {
                validate_expr(iterable)?;
                validate(body, Context { in_loop: true, ..ctx })?;
            }
            Stmt::While { condition, body } => {
                validate_expr(condition)?;
                validate(body, Context { in_loop: true, ..ctx })?;
            }
            Stmt::Try { body, handler } => {
                validate(body, ctx)?;
                validate(handler, ctx)?;
            }
            Stmt::FnDef(def) => validate(&def.body, FUNCTION_BODY)?,
            Stmt::Return(value) => {
                if !ctx.in_function {
                    return Err(CompileError::new("'return' outside of a function"));
                }
                if let Some(value) = value {
                    validate_expr(value)?;
                }
            }
            Stmt::Break if !ctx.in_loop => {
                return Err(CompileError::new("'break' outside of a loop"));
            }
            Stmt::Continue if !ctx.in_loop => {
                return Err(CompileError::new("'continue' outside of a loop"));
            }
            Stmt::Break | Stmt::Continue => {}
        }
    }
    Ok(())
}

const FUNCTION_BODY: Context = Context {
    in_function: true,
    in_loop: false,
};

fn validate_expr(expr: &Expr) -> Result<(), CompileError> {
    match expr {
        Expr::Lambda(def) => validate(&def.body, FUNCTION_BODY),
        Expr::Template(parts) => parts.iter().try_for_each(|part| match part {
            TemplatePart::Expr(expr) => validate_expr(expr),
            TemplatePart::Literal(_) => Ok(()),
        }),
        Expr::Array(items) => items.iter().try_for_each(validate_expr),
        Expr::Unary { operand, .. } => validate_expr(operand),
        Expr::Binary { left, right, .. } => {
            validate_expr(left)?;
            validate_expr(right)
        }
        Expr::Call { callee, args } => {
            validate_expr(callee)?;
            args.iter().try_for_each(validate_expr)
        }
        Expr::Member { object, .. } => validate_expr(object),
        Expr::Index { object, index } => {
            validate_expr(object)?;
            validate_expr(index)
        }
        Expr::Number(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Nil | Expr::Ident(_) => Ok(()),
    }
}
