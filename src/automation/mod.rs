//! Automation scripts embedded in notes
//!
//! Source is compiled by [`compile`] into a [`CompiledScript`] and executed by
//! a [`Runtime`] against a [`FileStore`].

pub mod ast;
pub mod capability;
pub mod compiler;
pub mod error;
pub mod extract;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod tasks;
pub mod value;

pub use capability::{Capabilities, FileStore, OpStatus, OutputSink, RefreshHook};
pub use compiler::{compile, select_tier, CompiledScript, Tier};
pub use error::{AutomationError, CompileError, RuntimeError};
pub use extract::{find_automations, replace_automations, strip_automations, AutomationBlock};
pub use runtime::{ExecutionContext, ExecutionStatus, OutputEvent, RunReport, Runtime};
pub use tasks::{TaskHandler, TaskInfo, TaskRegistry};
pub use value::Value;
