//! Workspace file operations and file tree management

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use walkdir::{DirEntry, WalkDir};

use super::config::WorkspaceSettings;
use crate::automation::{FileStore, OpStatus, RefreshHook};

/// Represents a file or directory in the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileNode {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    pub children: Vec<FileNode>,
}

impl FileNode {
    pub fn new(path: PathBuf, is_dir: bool) -> Self {
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());

        Self {
            name,
            path,
            is_dir,
            children: Vec::new(),
        }
    }

    /// Sort children: directories first, then files, alphabetically
    pub fn sort_children(&mut self) {
        self.children.sort_by(|a, b| match (a.is_dir, b.is_dir) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        });
        for child in &mut self.children {
            child.sort_children();
        }
    }

    /// Number of nodes below this one
    pub fn descendants(&self) -> usize {
        self.children
            .iter()
            .map(|child| 1 + child.descendants())
            .sum()
    }
}

/// File tree of a workspace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileTree {
    pub root: Option<FileNode>,
    pub root_path: Option<PathBuf>,
}

impl FileTree {
    /// Walk `path` into a tree, skipping hidden entries and `skip_dirs`
    pub fn from_path(path: &Path, settings: &WorkspaceSettings) -> Result<Self> {
        let keep = |entry: &DirEntry| {
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !name.starts_with('.')
                && !(entry.file_type().is_dir() && settings.skip_dirs.iter().any(|d| *d == name))
        };

        // Pre-order walk; the stack holds the open directory chain
        let mut stack: Vec<FileNode> = Vec::new();
        for entry in WalkDir::new(path)
            .max_depth(settings.max_depth)
            .into_iter()
            .filter_entry(keep)
        {
            let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
            while stack.len() > entry.depth() {
                close_last(&mut stack);
            }
            let node = FileNode::new(entry.path().to_path_buf(), entry.file_type().is_dir());
            if node.is_dir {
                stack.push(node);
            } else if let Some(parent) = stack.last_mut() {
                parent.children.push(node);
            }
        }
        while stack.len() > 1 {
            close_last(&mut stack);
        }

        let mut root = stack.pop();
        if let Some(root) = root.as_mut() {
            root.sort_children();
        }
        Ok(Self {
            root,
            root_path: Some(path.to_path_buf()),
        })
    }

    /// Find a node by path
    pub fn find_node(&self, path: &Path) -> Option<&FileNode> {
        self.root.as_ref().and_then(|root| Self::find_in_node(root, path))
    }

    fn find_in_node<'a>(node: &'a FileNode, path: &Path) -> Option<&'a FileNode> {
        if node.path == path {
            return Some(node);
        }

        node.children
            .iter()
            .find_map(|child| Self::find_in_node(child, path))
    }

    pub fn len(&self) -> usize {
        self.root.as_ref().map_or(0, FileNode::descendants)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn close_last(stack: &mut Vec<FileNode>) {
    if let Some(done) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(done);
        } else {
            stack.push(done);
        }
    }
}

/// File capabilities rooted at a workspace directory
#[derive(Debug)]
pub struct WorkspaceStore {
    root: PathBuf,
    settings: WorkspaceSettings,
    tree: RwLock<FileTree>,
}

impl WorkspaceStore {
    /// Open (and create if needed) the workspace at `root`
    pub fn open(root: impl Into<PathBuf>, settings: WorkspaceSettings) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create workspace: {}", root.display()))?;
        let tree = FileTree::from_path(&root, &settings)?;
        tracing::info!("Opened workspace: {}", root.display());

        Ok(Self {
            root,
            settings,
            tree: RwLock::new(tree),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Last built file tree
    pub async fn tree(&self) -> FileTree {
        self.tree.read().await.clone()
    }

    /// Map a workspace-relative path onto the disk
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        if path.trim().is_empty() {
            bail!("Empty path");
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => bail!("Path must stay inside the workspace: {path}"),
            }
        }
        Ok(self.root.join(relative))
    }

    fn with_default_extension(&self, path: &str) -> String {
        let has_dot = Path::new(path)
            .file_name()
            .is_some_and(|name| name.to_string_lossy().contains('.'));
        if has_dot {
            path.to_string()
        } else {
            format!("{path}.{}", self.settings.default_extension)
        }
    }

    /// Rename a file or directory in place; files get the default extension
    pub async fn rename(&self, old: &str, new_name: &str, is_file: bool) -> Result<OpStatus> {
        let from = self.resolve(old)?;
        if new_name.contains(['/', '\\']) {
            bail!("New name must not contain a path separator: {new_name}");
        }
        let new_name = if is_file {
            self.with_default_extension(new_name)
        } else {
            new_name.to_string()
        };
        let to = from.with_file_name(&new_name);

        if tokio::fs::metadata(&from).await.is_err() {
            return Ok(OpStatus::error(format!("{old} not found")));
        }
        if tokio::fs::metadata(&to).await.is_ok() {
            return Ok(OpStatus::Exists);
        }
        tokio::fs::rename(&from, &to)
            .await
            .with_context(|| format!("Failed to rename {} to {}", from.display(), to.display()))?;
        tracing::info!("Renamed {} to {}", old, new_name);
        Ok(OpStatus::Success)
    }

    /// Remove stray `*.tmp` files left by interrupted writes
    pub fn cleanup_temp_files(&self) -> usize {
        let stray = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|entry| {
                entry.file_type().is_file()
                    && entry.path().extension().is_some_and(|ext| ext == "tmp")
            })
            .map(|entry| entry.into_path());
        let removed = remove_files(stray);
        if removed > 0 {
            tracing::info!("Removed {} temporary file(s)", removed);
        }
        removed
    }
}

/// Remove each path, skipping the ones that cannot be removed
fn remove_files(paths: impl IntoIterator<Item = PathBuf>) -> usize {
    let mut removed = 0;
    for path in paths {
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
    removed
}

async fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

async fn atomic_write(path: &Path, content: &str) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let written = async {
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if let Err(err) = written {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err).with_context(|| format!("Failed to write {}", path.display()));
    }
    Ok(())
}

#[async_trait]
impl FileStore for WorkspaceStore {
    async fn create_file(&self, path: &str, content: &str) -> Result<OpStatus> {
        let target = self.resolve(&self.with_default_extension(path))?;
        create_parent(&target).await?;
        tokio::fs::write(&target, content)
            .await
            .with_context(|| format!("Failed to create file: {}", target.display()))?;
        tracing::info!("Created file: {}", target.display());
        Ok(OpStatus::Success)
    }

    async fn delete_file(&self, path: &str) -> Result<OpStatus> {
        let target = self.resolve(path)?;
        match tokio::fs::metadata(&target).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Ok(OpStatus::error("Not a file")),
            Err(_) => return Ok(OpStatus::error("File not found")),
        }
        tokio::fs::remove_file(&target)
            .await
            .with_context(|| format!("Failed to delete file: {}", target.display()))?;
        tracing::info!("Deleted file: {}", target.display());
        Ok(OpStatus::Success)
    }

    async fn read_file(&self, path: &str) -> Result<String> {
        let target = self.resolve(path)?;
        match tokio::fs::read_to_string(&target).await {
            Ok(content) => Ok(content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("readFile on missing file: {}", target.display());
                Ok(String::new())
            }
            Err(err) => Err(err).with_context(|| format!("Failed to read file: {}", target.display())),
        }
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<OpStatus> {
        let target = self.resolve(path)?;
        create_parent(&target).await?;
        atomic_write(&target, content).await?;
        tracing::debug!("Wrote file: {}", target.display());
        Ok(OpStatus::Success)
    }

    async fn create_directory(&self, path: &str) -> Result<OpStatus> {
        let target = self.resolve(path)?;
        if let Ok(meta) = tokio::fs::metadata(&target).await {
            return Ok(if meta.is_dir() {
                OpStatus::Exists
            } else {
                OpStatus::error("A file with that name exists")
            });
        }
        tokio::fs::create_dir_all(&target)
            .await
            .with_context(|| format!("Failed to create directory: {}", target.display()))?;
        tracing::info!("Created directory: {}", target.display());
        Ok(OpStatus::Success)
    }

    async fn delete_directory(&self, path: &str) -> Result<OpStatus> {
        let target = self.resolve(path)?;
        match tokio::fs::metadata(&target).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Ok(OpStatus::error("Not a directory")),
            Err(_) => return Ok(OpStatus::error("Directory not found")),
        }
        tokio::fs::remove_dir_all(&target)
            .await
            .with_context(|| format!("Failed to delete directory: {}", target.display()))?;
        tracing::info!("Deleted directory: {}", target.display());
        Ok(OpStatus::Success)
    }
}

#[async_trait]
impl RefreshHook for WorkspaceStore {
    async fn refresh(&self) -> Result<()> {
        let tree = FileTree::from_path(&self.root, &self.settings)?;
        tracing::info!("Workspace refreshed: {} entries", tree.len());
        *self.tree.write().await = tree;
        Ok(())
    }
}
