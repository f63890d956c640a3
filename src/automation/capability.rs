//! The fixed capability set a running script is allowed to touch

use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::RuntimeError;
use super::tasks::TaskRegistry;
use super::value::Value;
use crate::terminal::LineKind;

/// Deepest nesting of script function calls before a run is aborted
pub const MAX_CALL_DEPTH: usize = 32;

/// Outcome of a file operation that completed
///
/// A rejected operation (for example creating a directory that already
/// exists) is reported here, while a call that could not be carried out at
/// all is an `Err` from the [`FileStore`] method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum OpStatus {
    Success,
    Exists,
    Error { message: String },
}

impl OpStatus {
    pub fn error(message: impl Into<String>) -> Self {
        OpStatus::Error {
            message: message.into(),
        }
    }
}

impl From<OpStatus> for Value {
    fn from(status: OpStatus) -> Self {
        match serde_json::to_value(&status) {
            Ok(json) => Value::from_json(json),
            Err(_) => Value::Nil,
        }
    }
}

/// File and folder operations backing the script capabilities
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn create_file(&self, path: &str, content: &str) -> anyhow::Result<OpStatus>;
    async fn delete_file(&self, path: &str) -> anyhow::Result<OpStatus>;
    /// Missing files read as empty
    async fn read_file(&self, path: &str) -> anyhow::Result<String>;
    async fn write_file(&self, path: &str, content: &str) -> anyhow::Result<OpStatus>;
    async fn create_directory(&self, path: &str) -> anyhow::Result<OpStatus>;
    async fn delete_directory(&self, path: &str) -> anyhow::Result<OpStatus>;
}

/// Advisory notification sent after a successful run
#[async_trait]
pub trait RefreshHook: Send + Sync {
    async fn refresh(&self) -> anyhow::Result<()>;
}

/// Receiver of terminal output for the running script
pub trait OutputSink {
    fn emit(&mut self, kind: LineKind, text: String);
    fn clear(&mut self);
}

/// Everything a script can reach while it runs
pub struct Capabilities<'a> {
    files: &'a dyn FileStore,
    output: &'a mut dyn OutputSink,
    tasks: Rc<TaskRegistry>,
    call_depth: usize,
}

impl<'a> Capabilities<'a> {
    pub fn new(
        files: &'a dyn FileStore,
        output: &'a mut dyn OutputSink,
        tasks: Rc<TaskRegistry>,
    ) -> Self {
        Self {
            files,
            output,
            tasks,
            call_depth: 0,
        }
    }

    /// Count one more nested script call
    pub(crate) fn enter_call(&mut self) -> Result<(), RuntimeError> {
        if self.call_depth >= MAX_CALL_DEPTH {
            warn!("Call depth limit of {} reached", MAX_CALL_DEPTH);
            return Err(RuntimeError::thrown("Maximum call stack size exceeded"));
        }
        self.call_depth += 1;
        Ok(())
    }

    pub(crate) fn exit_call(&mut self) {
        self.call_depth = self.call_depth.saturating_sub(1);
    }

    pub fn tasks(&self) -> Rc<TaskRegistry> {
        Rc::clone(&self.tasks)
    }

    pub fn emit(&mut self, kind: LineKind, text: impl Into<String>) {
        self.output.emit(kind, text.into());
    }

    pub fn clear(&mut self) {
        self.output.clear();
    }

    pub async fn sleep(&self, millis: f64) {
        let millis = if millis.is_finite() && millis > 0.0 {
            millis as u64
        } else {
            0
        };
        debug!("Sleeping {}ms", millis);
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }

    pub async fn create_file(&self, path: &str, content: &str) -> Result<OpStatus, RuntimeError> {
        debug!("createFile {}", path);
        outcome("createFile", path, self.files.create_file(path, content).await)
    }

    pub async fn delete_file(&self, path: &str) -> Result<OpStatus, RuntimeError> {
        debug!("deleteFile {}", path);
        outcome("deleteFile", path, self.files.delete_file(path).await)
    }

    pub async fn read_file(&self, path: &str) -> Result<String, RuntimeError> {
        debug!("readFile {}", path);
        self.files.read_file(path).await.map_err(|err| {
            warn!("readFile {} failed: {:#}", path, err);
            RuntimeError::capability(err)
        })
    }

    pub async fn write_file(&self, path: &str, content: &str) -> Result<OpStatus, RuntimeError> {
        debug!("writeFile {}", path);
        outcome("writeFile", path, self.files.write_file(path, content).await)
    }

    pub async fn create_directory(&self, path: &str) -> Result<OpStatus, RuntimeError> {
        debug!("createDirectory {}", path);
        outcome("createDirectory", path, self.files.create_directory(path).await)
    }

    pub async fn delete_directory(&self, path: &str) -> Result<OpStatus, RuntimeError> {
        debug!("deleteDirectory {}", path);
        outcome("deleteDirectory", path, self.files.delete_directory(path).await)
    }
}

fn outcome(
    operation: &str,
    path: &str,
    result: anyhow::Result<OpStatus>,
) -> Result<OpStatus, RuntimeError> {
    match result {
        Ok(status) => {
            if let OpStatus::Error { message } = &status {
                debug!("{} {} reported: {}", operation, path, message);
            }
            Ok(status)
        }
        Err(err) => {
            warn!("{} {} failed: {:#}", operation, path, err);
            Err(RuntimeError::capability(err))
        }
    }
}

/// In-memory doubles shared by the automation tests
#[cfg(test)]
pub(crate) mod fakes {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use super::*;

    /// Records every call in order and keeps file contents in memory
    #[derive(Default)]
    pub struct RecordingStore {
        pub calls: Mutex<Vec<String>>,
        pub files: Mutex<BTreeMap<String, String>>,
        /// Calls whose path equals this fail outright
        pub fail_path: Option<String>,
    }

    impl RecordingStore {
        pub fn failing_on(path: &str) -> Self {
            Self {
                fail_path: Some(path.to_string()),
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String, path: &str) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(call);
            if self.fail_path.as_deref() == Some(path) {
                anyhow::bail!("storage unavailable for {path}");
            }
            Ok(())
        }
    }

    #[async_trait]
    impl FileStore for RecordingStore {
        async fn create_file(&self, path: &str, content: &str) -> anyhow::Result<OpStatus> {
            self.record(format!("createFile({path})"), path)?;
            self.files
                .lock()
                .unwrap()
                .insert(path.to_string(), content.to_string());
            Ok(OpStatus::Success)
        }

        async fn delete_file(&self, path: &str) -> anyhow::Result<OpStatus> {
            self.record(format!("deleteFile({path})"), path)?;
            match self.files.lock().unwrap().remove(path) {
                Some(_) => Ok(OpStatus::Success),
                None => Ok(OpStatus::error("File not found")),
            }
        }

        async fn read_file(&self, path: &str) -> anyhow::Result<String> {
            self.record(format!("readFile({path})"), path)?;
            Ok(self.files.lock().unwrap().get(path).cloned().unwrap_or_default())
        }

        async fn write_file(&self, path: &str, content: &str) -> anyhow::Result<OpStatus> {
            self.record(format!("writeFile({path})"), path)?;
            self.files
                .lock()
                .unwrap()
                .insert(path.to_string(), content.to_string());
            Ok(OpStatus::Success)
        }

        async fn create_directory(&self, path: &str) -> anyhow::Result<OpStatus> {
            self.record(format!("createDirectory({path})"), path)?;
            Ok(OpStatus::Success)
        }

        async fn delete_directory(&self, path: &str) -> anyhow::Result<OpStatus> {
            self.record(format!("deleteDirectory({path})"), path)?;
            Ok(OpStatus::Success)
        }
    }

    /// Collects emitted lines
    #[derive(Debug, Default)]
    pub struct VecSink {
        pub lines: Vec<(LineKind, String)>,
    }

    impl VecSink {
        pub fn texts(&self) -> Vec<&str> {
            self.lines.iter().map(|(_, text)| text.as_str()).collect()
        }
    }

    impl OutputSink for VecSink {
        fn emit(&mut self, kind: LineKind, text: String) {
            self.lines.push((kind, text));
        }

        fn clear(&mut self) {
            self.lines.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::{RecordingStore, VecSink};
    use super::*;

    #[test]
    fn test_op_status_serializes_with_status_tag() {
        assert_eq!(
            serde_json::to_value(OpStatus::Exists).unwrap(),
            serde_json::json!({"status": "exists"})
        );
        assert_eq!(
            serde_json::to_value(OpStatus::error("nope")).unwrap(),
            serde_json::json!({"status": "error", "message": "nope"})
        );
    }

    #[test]
    fn test_op_status_becomes_object_value() {
        let value = Value::from(OpStatus::error("missing"));
        let Value::Object(fields) = value else {
            panic!("expected object");
        };
        assert!(fields["status"].loose_eq(&Value::from("error")));
        assert!(fields["message"].loose_eq(&Value::from("missing")));
    }

    #[tokio::test]
    async fn test_failed_call_is_a_capability_error() {
        let store = RecordingStore::failing_on("locked.txt");
        let mut sink = VecSink::default();
        let caps = Capabilities::new(&store, &mut sink, Rc::new(TaskRegistry::new()));

        assert_eq!(caps.create_file("ok.txt", "").await, Ok(OpStatus::Success));
        let err = caps.create_file("locked.txt", "").await.unwrap_err();
        assert!(matches!(err, RuntimeError::Capability(msg) if msg.contains("storage unavailable")));
    }

    #[tokio::test]
    async fn test_failed_outcome_is_data() {
        let store = RecordingStore::default();
        let mut sink = VecSink::default();
        let caps = Capabilities::new(&store, &mut sink, Rc::new(TaskRegistry::new()));

        let status = caps.delete_file("ghost.txt").await.unwrap();
        assert_eq!(status, OpStatus::error("File not found"));
    }
}
