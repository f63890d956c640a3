//! Error taxonomy for the automation pipeline

use thiserror::Error;

/// Malformed automation source; the block is never executed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid automation syntax: {reason}")]
pub struct CompileError {
    pub reason: String,
}

impl CompileError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Attach a source line number to the reason
    pub fn at_line(line: usize, reason: impl std::fmt::Display) -> Self {
        Self::new(format!("{reason} (line {line})"))
    }
}

/// Failure raised while a compiled script runs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// `throw` in a script, or an evaluation fault such as an unknown name
    #[error("{0}")]
    Thrown(String),

    /// A capability call itself failed (as opposed to reporting a failed outcome)
    #[error("{0}")]
    Capability(String),

    #[error("Task \"{0}\" not found")]
    TaskNotFound(String),
}

impl RuntimeError {
    pub fn thrown(message: impl Into<String>) -> Self {
        RuntimeError::Thrown(message.into())
    }

    pub fn capability(err: anyhow::Error) -> Self {
        RuntimeError::Capability(format!("{err:#}"))
    }
}

/// Host-level failures of `compile_and_run`
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("No automations found in file")]
    NoAutomations,

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            CompileError::new("unexpected '}'").to_string(),
            "Invalid automation syntax: unexpected '}'"
        );
        assert_eq!(
            RuntimeError::TaskNotFound("deploy".into()).to_string(),
            "Task \"deploy\" not found"
        );
        assert_eq!(
            AutomationError::NoAutomations.to_string(),
            "No automations found in file"
        );
    }

    #[test]
    fn test_capability_error_keeps_context_chain() {
        let err = anyhow::anyhow!("permission denied").context("create notes.txt");
        assert_eq!(
            RuntimeError::capability(err).to_string(),
            "create notes.txt: permission denied"
        );
    }
}
