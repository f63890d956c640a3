//! Documents, workspace storage and configuration

pub mod config;
pub mod document;
pub mod file_system;

pub use config::{AppConfig, AutomationSettings, WorkspaceSettings};
pub use document::Document;
pub use file_system::{FileNode, FileTree, WorkspaceStore};
