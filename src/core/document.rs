//! Note documents

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};

use crate::automation::{find_automations, AutomationBlock};
use crate::markup::{self, RenderedDocument};

/// A note file and its in-memory content
#[derive(Debug, Clone)]
pub struct Document {
    /// File path
    pub path: PathBuf,
    /// Document content
    pub content: String,
    /// Whether the document has unsaved changes
    pub modified: bool,
    /// Last modification time
    pub last_modified: Option<SystemTime>,
}

impl Document {
    /// Create a new empty document
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            content: String::new(),
            modified: false,
            last_modified: None,
        }
    }

    /// Open a document from a file
    pub fn open(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;

        let last_modified = fs::metadata(path).ok().and_then(|m| m.modified().ok());
        tracing::info!("Opened document: {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            content,
            modified: false,
            last_modified,
        })
    }

    /// Save the document to disk
    pub fn save(&self) -> Result<()> {
        fs::write(&self.path, &self.content)
            .with_context(|| format!("Failed to save file: {}", self.path.display()))?;
        tracing::info!("Saved document: {}", self.path.display());
        Ok(())
    }

    /// Save the document and update modified flag
    pub fn save_mut(&mut self) -> Result<()> {
        self.save()?;
        self.modified = false;
        self.last_modified = Some(SystemTime::now());
        Ok(())
    }

    /// First level-one heading, else the file name without extension
    pub fn title(&self) -> String {
        self.content
            .lines()
            .find_map(|line| line.strip_prefix("# "))
            .map(|title| title.trim().to_string())
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| {
                self.path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "Untitled".to_string())
            })
    }

    /// Update content and mark as modified
    pub fn set_content(&mut self, content: String) {
        if self.content != content {
            self.content = content;
            self.modified = true;
        }
    }

    pub fn render(&self) -> RenderedDocument {
        markup::render_document(&self.content)
    }

    pub fn preview(&self) -> String {
        markup::preview(&self.content)
    }

    pub fn automations(&self) -> Vec<AutomationBlock> {
        find_automations(&self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_title() {
        let mut doc = Document::new(PathBuf::from("/notes/daily.mne"));
        assert_eq!(doc.title(), "daily");

        doc.set_content("intro\n# Plan for today \nbody".to_string());
        assert!(doc.modified);
        assert_eq!(doc.title(), "Plan for today");
    }

    #[test]
    fn test_open_edit_save() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("note.mne");
        std::fs::write(&path, "# Note\n\n```automation\nprint \"hi\"\n```\n").unwrap();

        let mut doc = Document::open(&path).unwrap();
        assert!(!doc.modified);
        assert_eq!(doc.automations().len(), 1);
        assert!(doc.render().html.contains("<h1>Note</h1>"));

        doc.set_content("changed".to_string());
        doc.save_mut().unwrap();
        assert!(!doc.modified);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "changed");
    }

    #[test]
    fn test_open_missing_file_has_context() {
        let err = Document::open(Path::new("/definitely/missing.mne")).unwrap_err();
        assert!(err.to_string().contains("Failed to read file"));
    }

    #[test]
    fn test_unchanged_content_is_not_modified() {
        let mut doc = Document::new(PathBuf::from("a.mne"));
        doc.set_content(String::new());
        assert!(!doc.modified);
    }
}
