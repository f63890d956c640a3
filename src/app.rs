//! Application state: configuration, workspace, open documents and the
//! automation runtime

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc::UnboundedSender;

use crate::automation::{AutomationError, ExecutionContext, OutputEvent, RunReport, Runtime, TaskInfo, Value};
use crate::core::{AppConfig, Document, WorkspaceStore};
use crate::markup::RenderedDocument;

/// Main application state
pub struct MneApp {
    /// Application configuration
    pub config: AppConfig,
    /// Open documents indexed by path
    pub documents: HashMap<PathBuf, Document>,
    /// Currently active document path
    pub active_document: Option<PathBuf>,
    store: Arc<WorkspaceStore>,
    runtime: Runtime,
}

impl MneApp {
    /// Open the workspace chosen by `config` (or `workspace`, when given)
    pub fn new(config: AppConfig, workspace: Option<&Path>) -> Result<Self> {
        let root = config.workspace_root(workspace);
        let store = Arc::new(WorkspaceStore::open(root, config.workspace.clone())?);
        store.cleanup_temp_files();

        let mut runtime = Runtime::new(store.clone());
        if config.automation.refresh_after_run {
            runtime = runtime.with_refresh(store.clone(), config.automation.refresh_delay());
        }

        Ok(Self {
            config,
            documents: HashMap::new(),
            active_document: None,
            store,
            runtime,
        })
    }

    /// Stream terminal output of every run to `stream`
    pub fn with_output(mut self, stream: UnboundedSender<OutputEvent>) -> Self {
        self.runtime = self.runtime.with_output(stream);
        self
    }

    pub fn workspace(&self) -> &Path {
        self.store.root()
    }

    pub fn store(&self) -> &WorkspaceStore {
        &self.store
    }

    /// Record the current workspace in the recent list and persist it
    pub fn remember_workspace(&mut self) -> Result<()> {
        let path = AppConfig::config_path().context("Could not determine config directory")?;
        self.remember_workspace_in(&path)
    }

    /// Same as [`remember_workspace`](Self::remember_workspace), saving to `config_path`
    pub fn remember_workspace_in(&mut self, config_path: &Path) -> Result<()> {
        let root = self.store.root().to_path_buf();
        self.config.add_recent_workspace(root);
        self.config.save_to(config_path)
    }

    /// Open a document and make it active
    pub fn open_document(&mut self, path: &Path) -> Result<()> {
        if !self.documents.contains_key(path) {
            let doc = Document::open(path)?;
            self.documents.insert(path.to_path_buf(), doc);
        }
        self.active_document = Some(path.to_path_buf());
        Ok(())
    }

    /// Save the active document
    pub fn save_active_document(&mut self) -> Result<()> {
        if let Some(doc) = self.active_document_mut() {
            doc.save_mut()?;
        }
        Ok(())
    }

    /// Get the active document mutably
    pub fn active_document_mut(&mut self) -> Option<&mut Document> {
        self.active_document
            .as_ref()
            .and_then(|path| self.documents.get_mut(path))
    }

    /// Get the active document
    pub fn active_document(&self) -> Option<&Document> {
        self.active_document
            .as_ref()
            .and_then(|path| self.documents.get(path))
    }

    pub fn render_active(&self) -> Option<RenderedDocument> {
        self.active_document().map(Document::render)
    }

    pub fn preview_active(&self) -> Option<String> {
        self.active_document().map(Document::preview)
    }

    /// Run every automation block of the active document
    pub async fn run_active(&mut self) -> Result<Vec<RunReport>> {
        let content = self
            .active_document()
            .map(|doc| doc.content.clone())
            .context("No active document")?;
        Ok(self.runtime.compile_and_run(&content).await?)
    }

    /// Open `path` and run its automation blocks
    pub async fn run_file(&mut self, path: &Path) -> Result<Vec<RunReport>> {
        self.open_document(path)?;
        self.run_active().await
    }

    /// Run one automation block of the active document by id
    pub async fn run_block(&mut self, id: &str) -> Result<RunReport> {
        let block = self
            .active_document()
            .and_then(|doc| doc.automations().into_iter().find(|block| block.id == id))
            .with_context(|| format!("No automation block {id}"))?;
        let mut context = ExecutionContext::from(block);
        self.runtime.execute(&mut context).await;
        Ok(context.report())
    }

    pub fn tasks(&self) -> Vec<TaskInfo> {
        self.runtime.tasks()
    }

    /// Run a registered task with positional arguments
    pub async fn invoke_task(&mut self, name: &str, args: Vec<Value>) -> Result<RunReport, AutomationError> {
        self.runtime.invoke_task(name, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::ExecutionStatus;
    use crate::terminal::LineKind;
    use tempfile::TempDir;

    fn app(dir: &TempDir) -> MneApp {
        let mut config = AppConfig::default();
        config.automation.refresh_delay_ms = 0;
        MneApp::new(config, Some(&dir.path().join("ws"))).unwrap()
    }

    fn note(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("note.mne");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_run_file_against_workspace() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        let path = note(
            &dir,
            "# Setup\n\n```automation\ncreate docs/\ncreate docs/readme.txt\nprint \"done\"\n```\n",
        );

        let reports = app.run_file(&path).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, ExecutionStatus::Succeeded);
        assert!(app.workspace().join("docs/readme.txt").exists());

        let texts: Vec<_> = reports[0].terminal.texts_of(LineKind::Success).collect();
        assert!(texts.contains(&"> Workspace refreshed"));
        assert!(app.store().tree().await.len() >= 2);
    }

    #[tokio::test]
    async fn test_document_without_automations() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        let path = note(&dir, "just text");

        let err = app.run_file(&path).await.unwrap_err();
        assert_eq!(err.to_string(), "No automations found in file");
        assert!(app.render_active().unwrap().html.contains("<p>just text</p>"));
    }

    #[tokio::test]
    async fn test_run_block_by_id() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        let path = note(
            &dir,
            "```automation\nprint \"first\"\n```\n\n```automation\nprint \"second\"\n```",
        );
        app.open_document(&path).unwrap();

        let report = app.run_block("automation-1").await.unwrap();
        assert_eq!(report.context_id, "automation-1");
        assert_eq!(report.terminal.texts_of(LineKind::Info).collect::<Vec<_>>(), vec!["second"]);
        assert!(app.run_block("automation-9").await.is_err());
    }

    #[tokio::test]
    async fn test_scaffold_task() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        assert!(app.tasks().iter().any(|task| task.name == "scaffold"));

        // scaffold needs a project name
        assert!(app.invoke_task("scaffold", vec![]).await.is_err());

        let report = app.invoke_task("scaffold", vec![Value::from("site")]).await.unwrap();
        assert_eq!(report.status, ExecutionStatus::Succeeded);
        assert!(app.workspace().join("site").is_dir());

        assert!(matches!(
            app.invoke_task("missing", vec![]).await,
            Err(AutomationError::Runtime(_))
        ));
    }

    #[test]
    fn test_remembered_workspace_is_reopened() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.json");
        let mut first = app(&dir);
        first.remember_workspace_in(&config_path).unwrap();

        let config = AppConfig::load_from(&config_path).unwrap();
        assert_eq!(config.recent_workspaces, vec![dir.path().join("ws")]);
        let second = MneApp::new(config, None).unwrap();
        assert_eq!(second.workspace(), dir.path().join("ws"));
    }

    #[test]
    fn test_save_active_document() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        let path = note(&dir, "old");
        app.open_document(&path).unwrap();

        app.active_document_mut().unwrap().set_content("new".to_string());
        app.save_active_document().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        assert!(!app.active_document().unwrap().modified);
    }
}
