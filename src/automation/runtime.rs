//! Execution of automation blocks
//!
//! A [`Runtime`] runs one compiled script at a time: every entry point takes
//! `&mut self`, so two contexts can never write to the capability set or
//! interleave their output. Output of the running script goes to its own
//! [`ExecutionContext`] terminal and, when configured, to a stream of
//! [`OutputEvent`]s.

use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

use super::capability::{Capabilities, FileStore, OutputSink, RefreshHook};
use super::compiler::{compile, CompiledScript};
use super::error::{AutomationError, CompileError};
use super::extract::{find_automations, AutomationBlock};
use super::tasks::{TaskHandler, TaskInfo, TaskRegistry};
use super::value::Value;
use crate::terminal::{LineKind, Terminal, TerminalLine};

pub const START_MARKER: &str = "> Starting automation...";
pub const SUCCESS_MARKER: &str = "> Automation completed successfully";
pub const REFRESH_MARKER: &str = "> Refreshing workspace...";
pub const REFRESHED_MARKER: &str = "> Workspace refreshed";

/// Default pause before the refresh hook runs
pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Terminal update streamed while scripts run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutputEvent {
    Line {
        context_id: String,
        #[serde(flatten)]
        line: TerminalLine,
    },
    Cleared {
        context_id: String,
    },
}

/// State of one automation block instance
#[derive(Debug)]
pub struct ExecutionContext {
    pub id: String,
    pub source: String,
    compiled: Result<CompiledScript, CompileError>,
    terminal: Terminal,
    status: ExecutionStatus,
}

impl ExecutionContext {
    /// Compile `source` into a fresh idle context
    pub fn new(id: impl Into<String>, source: &str) -> Self {
        Self {
            id: id.into(),
            source: source.to_string(),
            compiled: compile(source),
            terminal: Terminal::new(),
            status: ExecutionStatus::Idle,
        }
    }

    pub fn terminal(&self) -> &Terminal {
        &self.terminal
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            context_id: self.id.clone(),
            status: self.status,
            terminal: self.terminal.clone(),
        }
    }
}

impl From<AutomationBlock> for ExecutionContext {
    fn from(block: AutomationBlock) -> Self {
        Self {
            id: block.id,
            source: block.source,
            compiled: block.compiled,
            terminal: Terminal::new(),
            status: ExecutionStatus::Idle,
        }
    }
}

/// Final state of one executed context
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub context_id: String,
    pub status: ExecutionStatus,
    pub terminal: Terminal,
}

/// Routes script output to one context's terminal and the event stream
struct ContextSink<'a> {
    context_id: &'a str,
    terminal: &'a mut Terminal,
    stream: Option<&'a UnboundedSender<OutputEvent>>,
}

impl<'a> ContextSink<'a> {
    fn send(&self, event: OutputEvent) {
        if let Some(stream) = self.stream {
            // Receiver gone means nobody is listening any more
            let _ = stream.send(event);
        }
    }
}

impl OutputSink for ContextSink<'_> {
    fn emit(&mut self, kind: LineKind, text: String) {
        let line = TerminalLine::new(kind, text);
        self.terminal.push(line.kind, line.text.clone());
        self.send(OutputEvent::Line {
            context_id: self.context_id.to_string(),
            line,
        });
    }

    fn clear(&mut self) {
        self.terminal.clear();
        self.send(OutputEvent::Cleared {
            context_id: self.context_id.to_string(),
        });
    }
}

/// Runs compiled scripts against a file store
pub struct Runtime {
    store: Arc<dyn FileStore>,
    tasks: Rc<TaskRegistry>,
    refresh: Option<Arc<dyn RefreshHook>>,
    refresh_delay: Duration,
    stream: Option<UnboundedSender<OutputEvent>>,
}

impl Runtime {
    /// Runtime with the built-in tasks registered
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self {
            store,
            tasks: Rc::new(TaskRegistry::with_builtins()),
            refresh: None,
            refresh_delay: DEFAULT_REFRESH_DELAY,
            stream: None,
        }
    }

    /// Notify `hook` after every successful run
    pub fn with_refresh(mut self, hook: Arc<dyn RefreshHook>, delay: Duration) -> Self {
        self.refresh = Some(hook);
        self.refresh_delay = delay;
        self
    }

    /// Stream every terminal update to `stream`
    pub fn with_output(mut self, stream: UnboundedSender<OutputEvent>) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn register_task(&self, name: &str, description: &str, handler: impl TaskHandler + 'static) {
        self.tasks.register(name, description, handler);
    }

    pub fn tasks(&self) -> Vec<TaskInfo> {
        self.tasks.list()
    }

    /// Invoke a task outside of any script, with output under `task:<name>`
    pub async fn invoke_task(&mut self, name: &str, args: Vec<Value>) -> Result<RunReport, AutomationError> {
        let context_id = format!("task:{name}");
        let mut terminal = Terminal::new();

        let result = {
            let mut sink = ContextSink {
                context_id: &context_id,
                terminal: &mut terminal,
                stream: self.stream.as_ref(),
            };
            let mut caps = Capabilities::new(self.store.as_ref(), &mut sink, Rc::clone(&self.tasks));
            self.tasks.invoke(name, &mut caps, args).await
        };

        match result {
            Ok(_) => Ok(RunReport {
                context_id,
                status: ExecutionStatus::Succeeded,
                terminal,
            }),
            Err(err) => {
                warn!("Task {} failed: {}", name, err);
                Err(err.into())
            }
        }
    }

    /// Run one context to completion and return its final status
    pub async fn execute(&mut self, context: &mut ExecutionContext) -> ExecutionStatus {
        let ExecutionContext {
            id,
            compiled,
            terminal,
            status,
            ..
        } = context;
        let mut sink = ContextSink {
            context_id: id.as_str(),
            terminal,
            stream: self.stream.as_ref(),
        };

        sink.clear();
        let script = match compiled {
            Ok(script) => script,
            Err(err) => {
                warn!("Skipping {}: {}", sink.context_id, err);
                sink.emit(LineKind::Error, format!("> {err}"));
                *status = ExecutionStatus::Failed;
                return *status;
            }
        };

        *status = ExecutionStatus::Running;
        info!("Running automation {}", sink.context_id);
        sink.emit(LineKind::System, START_MARKER.to_string());

        let result = {
            let mut caps = Capabilities::new(self.store.as_ref(), &mut sink, Rc::clone(&self.tasks));
            script.run(&mut caps).await
        };

        match result {
            Ok(()) => {
                info!("Automation {} completed", sink.context_id);
                sink.emit(LineKind::Success, SUCCESS_MARKER.to_string());
                *status = ExecutionStatus::Succeeded;
                if let Some(hook) = &self.refresh {
                    refresh_workspace(hook.as_ref(), self.refresh_delay, &mut sink).await;
                }
            }
            Err(err) => {
                error!("Automation {} failed: {}", sink.context_id, err);
                sink.emit(LineKind::Error, format!("> {err}"));
                *status = ExecutionStatus::Failed;
            }
        }
        *status
    }

    /// Run contexts one after another; a failure does not stop later ones
    pub async fn run_many(&mut self, contexts: &mut [ExecutionContext]) -> Vec<RunReport> {
        let mut reports = Vec::with_capacity(contexts.len());
        for context in contexts.iter_mut() {
            self.execute(context).await;
            reports.push(context.report());
        }

        let failed = reports
            .iter()
            .filter(|report| report.status == ExecutionStatus::Failed)
            .count();
        if failed > 0 {
            warn!("{} of {} automation(s) failed", failed, reports.len());
        }
        reports
    }

    /// Run every automation block of a document, in document order
    pub async fn compile_and_run(&mut self, text: &str) -> Result<Vec<RunReport>, AutomationError> {
        let blocks = find_automations(text);
        if blocks.is_empty() {
            return Err(AutomationError::NoAutomations);
        }
        let mut contexts: Vec<ExecutionContext> = blocks.into_iter().map(ExecutionContext::from).collect();
        Ok(self.run_many(&mut contexts).await)
    }

    /// Compile and run a single snippet of automation source
    pub async fn run_source(&mut self, id: &str, source: &str) -> Result<RunReport, AutomationError> {
        let compiled = compile(source)?;
        let mut context = ExecutionContext {
            id: id.to_string(),
            source: source.to_string(),
            compiled: Ok(compiled),
            terminal: Terminal::new(),
            status: ExecutionStatus::Idle,
        };
        self.execute(&mut context).await;
        Ok(context.report())
    }
}

async fn refresh_workspace(hook: &dyn RefreshHook, delay: Duration, sink: &mut ContextSink<'_>) {
    sink.emit(LineKind::System, REFRESH_MARKER.to_string());
    tokio::time::sleep(delay).await;
    match hook.refresh().await {
        Ok(()) => sink.emit(LineKind::Success, REFRESHED_MARKER.to_string()),
        Err(err) => {
            warn!("Workspace refresh failed: {:#}", err);
            sink.emit(LineKind::Error, format!("> Failed to refresh workspace: {err:#}"));
        }
    }
}
