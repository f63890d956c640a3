//! Named tasks invocable from scripts and from the host

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;
use serde::Serialize;

use super::capability::Capabilities;
use super::error::RuntimeError;
use super::interpreter::call_function;
use super::value::{Closure, Value};
use crate::terminal::LineKind;

/// Handler run when a task is invoked
#[async_trait(?Send)]
pub trait TaskHandler {
    async fn run(&self, caps: &mut Capabilities<'_>, args: Vec<Value>) -> Result<Value, RuntimeError>;
}

struct Task {
    description: String,
    handler: Rc<dyn TaskHandler>,
}

/// Name and description of a registered task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskInfo {
    pub name: String,
    pub description: String,
}

/// Registry of tasks, shared by every script of a session
#[derive(Default)]
pub struct TaskRegistry {
    tasks: RefCell<HashMap<String, Task>>,
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.list())
            .finish()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in tasks
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(
            "scaffold",
            "Create a new project structure (name, template = \"basic\")",
            ScaffoldTask,
        );
        registry
    }

    /// Register a task; an existing task of the same name is replaced
    pub fn register(&self, name: &str, description: &str, handler: impl TaskHandler + 'static) {
        let task = Task {
            description: description.to_string(),
            handler: Rc::new(handler),
        };
        if self.tasks.borrow_mut().insert(name.to_string(), task).is_some() {
            tracing::warn!("Task {} re-registered, previous handler replaced", name);
        } else {
            tracing::debug!("Registered task {}", name);
        }
    }

    /// Registered tasks sorted by name
    pub fn list(&self) -> Vec<TaskInfo> {
        let mut tasks: Vec<TaskInfo> = self
            .tasks
            .borrow()
            .iter()
            .map(|(name, task)| TaskInfo {
                name: name.clone(),
                description: task.description.clone(),
            })
            .collect();
        tasks.sort_by(|a, b| a.name.cmp(&b.name));
        tasks
    }

    /// Run a task with positional arguments
    pub async fn invoke(
        &self,
        name: &str,
        caps: &mut Capabilities<'_>,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let handler = self
            .tasks
            .borrow()
            .get(name)
            .map(|task| Rc::clone(&task.handler))
            .ok_or_else(|| RuntimeError::TaskNotFound(name.to_string()))?;

        tracing::info!("Running task {} with {} argument(s)", name, args.len());
        handler.run(caps, args).await
    }
}

/// Task whose handler is a script function
pub struct ScriptTask {
    function: Closure,
}

impl ScriptTask {
    pub fn new(function: Closure) -> Self {
        Self { function }
    }
}

#[async_trait(?Send)]
impl TaskHandler for ScriptTask {
    async fn run(&self, caps: &mut Capabilities<'_>, args: Vec<Value>) -> Result<Value, RuntimeError> {
        call_function(caps, Value::Function(self.function.clone()), args).await
    }
}

/// Built-in `scaffold(name, template = "basic")`
pub struct ScaffoldTask;

const BASIC_TEMPLATE: &[(&str, &str)] = &[
    ("src/main.js", "// Main entry point"),
    ("src/styles.css", "/* Styles */"),
];

#[async_trait(?Send)]
impl TaskHandler for ScaffoldTask {
    async fn run(&self, caps: &mut Capabilities<'_>, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let name = match args.first() {
            Some(Value::Str(name)) if !name.trim().is_empty() => name.trim().to_string(),
            _ => return Err(RuntimeError::thrown("scaffold expects a project name")),
        };
        let template = match args.get(1) {
            None | Some(Value::Nil) => "basic".to_string(),
            Some(value) => value.to_string(),
        };

        caps.emit(LineKind::Info, format!("Creating {template} project: {name}"));
        caps.create_directory(&name).await?;

        if template == "basic" {
            caps.create_file(&format!("{name}/README.md"), &format!("# {name}"))
                .await?;
            for (path, content) in BASIC_TEMPLATE {
                caps.create_file(&format!("{name}/{path}"), content).await?;
            }
        }

        caps.emit(LineKind::Success, "Project created successfully!");
        Ok(Value::Bool(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::capability::fakes::{RecordingStore, VecSink};

    struct Echo(&'static str);

    #[async_trait(?Send)]
    impl TaskHandler for Echo {
        async fn run(&self, caps: &mut Capabilities<'_>, args: Vec<Value>) -> Result<Value, RuntimeError> {
            caps.emit(LineKind::Info, format!("{} {}", self.0, args.len()));
            Ok(Value::Nil)
        }
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let registry = Rc::new(TaskRegistry::new());
        registry.register("greet", "first", Echo("first"));
        registry.register("greet", "second", Echo("second"));

        let store = RecordingStore::default();
        let mut sink = VecSink::default();
        {
            let mut caps = Capabilities::new(&store, &mut sink, Rc::clone(&registry));
            registry
                .invoke("greet", &mut caps, vec![Value::from("a")])
                .await
                .unwrap();
        }
        assert_eq!(sink.texts(), vec!["second 1"]);
        assert_eq!(registry.list()[0].description, "second");
    }

    #[tokio::test]
    async fn test_missing_task() {
        let registry = Rc::new(TaskRegistry::new());
        let store = RecordingStore::default();
        let mut sink = VecSink::default();
        let mut caps = Capabilities::new(&store, &mut sink, Rc::clone(&registry));

        let err = registry.invoke("deploy", &mut caps, vec![]).await.unwrap_err();
        assert_eq!(err.to_string(), "Task \"deploy\" not found");
    }

    #[tokio::test]
    async fn test_scaffold_basic_template() {
        let registry = Rc::new(TaskRegistry::with_builtins());
        let store = RecordingStore::default();
        let mut sink = VecSink::default();
        {
            let mut caps = Capabilities::new(&store, &mut sink, Rc::clone(&registry));
            registry
                .invoke("scaffold", &mut caps, vec![Value::from("site")])
                .await
                .unwrap();
        }

        assert_eq!(
            store.calls(),
            vec![
                "createDirectory(site)",
                "createFile(site/README.md)",
                "createFile(site/src/main.js)",
                "createFile(site/src/styles.css)"
            ]
        );
        assert_eq!(
            store.files.lock().unwrap().get("site/README.md").map(String::as_str),
            Some("# site")
        );
        assert_eq!(
            sink.texts(),
            vec!["Creating basic project: site", "Project created successfully!"]
        );
    }

    #[tokio::test]
    async fn test_scaffold_other_template_only_creates_directory() {
        let registry = Rc::new(TaskRegistry::with_builtins());
        let store = RecordingStore::default();
        let mut sink = VecSink::default();
        {
            let mut caps = Capabilities::new(&store, &mut sink, Rc::clone(&registry));
            registry
                .invoke("scaffold", &mut caps, vec![Value::from("api"), Value::from("empty")])
                .await
                .unwrap();
        }
        assert_eq!(store.calls(), vec!["createDirectory(api)"]);
    }
}
