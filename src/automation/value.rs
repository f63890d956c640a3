//! Runtime values of the automation language

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::ast::FunctionDef;
use super::interpreter::Env;

/// A value produced while a script runs
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Vec<Value>),
    /// Only produced by capability results and caught errors
    Object(BTreeMap<String, Value>),
    Function(Closure),
    Builtin(Builtin),
}

/// A user function together with the scope it was defined in
#[derive(Clone)]
pub struct Closure {
    pub def: Arc<FunctionDef>,
    pub env: Env,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The environment may contain this closure again
        f.debug_struct("Closure")
            .field("name", &self.def.name)
            .field("params", &self.def.params)
            .finish_non_exhaustive()
    }
}

/// Capabilities and helpers callable from every script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    CreateFile,
    DeleteFile,
    ReadFile,
    WriteFile,
    CreateDirectory,
    DeleteDirectory,
    Print,
    PrintError,
    PrintSuccess,
    Clear,
    Sleep,
    RunTask,
    RegisterTask,
}

impl Builtin {
    /// Resolve a script-visible name
    pub fn from_name(name: &str) -> Option<Self> {
        let builtin = match name {
            "createFile" => Builtin::CreateFile,
            "deleteFile" => Builtin::DeleteFile,
            "readFile" => Builtin::ReadFile,
            "writeFile" => Builtin::WriteFile,
            "createDirectory" => Builtin::CreateDirectory,
            "deleteDirectory" => Builtin::DeleteDirectory,
            "print" => Builtin::Print,
            "printError" | "error" => Builtin::PrintError,
            "printSuccess" | "success" => Builtin::PrintSuccess,
            "clear" => Builtin::Clear,
            "sleep" => Builtin::Sleep,
            "runTask" => Builtin::RunTask,
            "registerTask" => Builtin::RegisterTask,
            _ => return None,
        };
        Some(builtin)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::CreateFile => "createFile",
            Builtin::DeleteFile => "deleteFile",
            Builtin::ReadFile => "readFile",
            Builtin::WriteFile => "writeFile",
            Builtin::CreateDirectory => "createDirectory",
            Builtin::DeleteDirectory => "deleteDirectory",
            Builtin::Print => "print",
            Builtin::PrintError => "printError",
            Builtin::PrintSuccess => "printSuccess",
            Builtin::Clear => "clear",
            Builtin::Sleep => "sleep",
            Builtin::RunTask => "runTask",
            Builtin::RegisterTask => "registerTask",
        }
    }
}

impl Value {
    /// Truthiness used by conditions and logical operators
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Builtin(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) | Value::Builtin(_) => "function",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Builtin(_))
    }

    /// Text used by `print`: arrays and objects become pretty JSON
    pub fn print_text(&self) -> String {
        match self {
            Value::Array(_) | Value::Object(_) => {
                serde_json::to_string_pretty(&self.to_json()).unwrap_or_else(|_| self.to_string())
            }
            other => other.to_string(),
        }
    }

    /// Equality for `==`: same type and same contents, functions never equal
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.loose_eq(vb))
            }
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            _ => false,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Nil => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    serde_json::Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => items.iter().map(Value::to_json).collect(),
            Value::Object(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
            Value::Function(_) | Value::Builtin(_) => serde_json::Value::Null,
        }
    }

    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, Value::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// Object with a single `message` field, bound to `error` in `catch`
    pub fn error_object(message: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("message".to_string(), Value::Str(message.into()));
        Value::Object(fields)
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Str(s) => write!(f, "{s}"),
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(Value::to_string).collect();
                write!(f, "{}", parts.join(","))
            }
            Value::Object(_) => write!(f, "{}", self.to_json()),
            Value::Function(closure) => match &closure.def.name {
                Some(name) => write!(f, "[function {name}]"),
                None => write!(f, "[function]"),
            },
            Value::Builtin(builtin) => write!(f, "[function {}]", builtin.name()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(Value::Array(vec![]).is_truthy());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::Nil.to_string(), "null");
        assert_eq!(
            Value::Array(vec![Value::Number(1.0), Value::from("a")]).to_string(),
            "1,a"
        );
    }

    #[test]
    fn test_print_text_uses_pretty_json_for_objects() {
        let value = Value::error_object("boom");
        assert_eq!(value.print_text(), "{\n  \"message\": \"boom\"\n}");
        assert_eq!(Value::from("plain").print_text(), "plain");
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!({"status": "error", "message": "missing", "n": 2});
        let value = Value::from_json(json.clone());
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn test_loose_eq() {
        assert!(Value::from("a").loose_eq(&Value::from("a")));
        assert!(!Value::Number(1.0).loose_eq(&Value::from("1")));
        assert!(Value::Builtin(Builtin::Print).loose_eq(&Value::Builtin(Builtin::Print)));
    }

    #[test]
    fn test_builtin_aliases() {
        assert_eq!(Builtin::from_name("error"), Some(Builtin::PrintError));
        assert_eq!(Builtin::from_name("success"), Some(Builtin::PrintSuccess));
        assert_eq!(Builtin::from_name("registerTask"), Some(Builtin::RegisterTask));
        assert_eq!(Builtin::from_name("fetch"), None);
    }
}
