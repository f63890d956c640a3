//! Application configuration management

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

const MAX_RECENT_WORKSPACES: usize = 10;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Last opened workspace path
    pub last_workspace: Option<PathBuf>,
    /// Recent workspaces, most recent first
    pub recent_workspaces: Vec<PathBuf>,
    /// Workspace store settings
    pub workspace: WorkspaceSettings,
    /// Automation runtime settings
    pub automation: AutomationSettings,
}

/// Workspace store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceSettings {
    /// Extension appended to `createFile` names without one
    pub default_extension: String,
    /// Directory names left out of the file tree
    pub skip_dirs: Vec<String>,
    /// Depth limit of the file tree
    pub max_depth: usize,
}

/// Automation runtime settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationSettings {
    /// Pause before the workspace refresh, in milliseconds
    pub refresh_delay_ms: u64,
    /// Refresh the workspace after each successful run
    pub refresh_after_run: bool,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            default_extension: "mne".to_string(),
            skip_dirs: vec!["node_modules".to_string(), "target".to_string()],
            max_depth: 10,
        }
    }
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            refresh_delay_ms: 100,
            refresh_after_run: true,
        }
    }
}

impl AutomationSettings {
    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }
}

impl AppConfig {
    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("com", "mne", "Mne")
    }

    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Load configuration from disk, defaults when absent
    pub fn load() -> Result<Self> {
        let path = Self::config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure config directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Add a workspace to recent workspaces and make it the last one
    pub fn add_recent_workspace(&mut self, path: PathBuf) {
        self.recent_workspaces.retain(|p| p != &path);
        self.recent_workspaces.insert(0, path.clone());
        self.recent_workspaces.truncate(MAX_RECENT_WORKSPACES);
        self.last_workspace = Some(path);
    }

    /// Workspace root: explicit override, then last workspace, then the
    /// project data directory
    pub fn workspace_root(&self, override_path: Option<&Path>) -> PathBuf {
        if let Some(path) = override_path {
            return path.to_path_buf();
        }
        if let Some(path) = &self.last_workspace {
            return path.clone();
        }
        Self::project_dirs()
            .map(|dirs| dirs.data_dir().join("workspace"))
            .unwrap_or_else(|| PathBuf::from("workspace"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.workspace.default_extension, "mne");
        assert_eq!(config.automation.refresh_delay(), Duration::from_millis(100));
        assert!(config.automation.refresh_after_run);
    }

    #[test]
    fn test_recent_workspaces_dedup_and_cap() {
        let mut config = AppConfig::default();
        for i in 0..12 {
            config.add_recent_workspace(PathBuf::from(format!("/w/{i}")));
        }
        config.add_recent_workspace(PathBuf::from("/w/5"));

        assert_eq!(config.recent_workspaces.len(), MAX_RECENT_WORKSPACES);
        assert_eq!(config.recent_workspaces[0], PathBuf::from("/w/5"));
        assert_eq!(
            config.recent_workspaces.iter().filter(|p| **p == PathBuf::from("/w/5")).count(),
            1
        );
        assert_eq!(config.last_workspace, Some(PathBuf::from("/w/5")));
    }

    #[test]
    fn test_workspace_root_resolution() {
        let mut config = AppConfig::default();
        assert_eq!(
            config.workspace_root(Some(Path::new("/explicit"))),
            PathBuf::from("/explicit")
        );
        config.last_workspace = Some(PathBuf::from("/last"));
        assert_eq!(config.workspace_root(None), PathBuf::from("/last"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.automation.refresh_delay_ms = 5;
        config.add_recent_workspace(PathBuf::from("/notes"));
        config.save_to(&path).unwrap();

        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_and_partial_json() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("none.json");
        assert_eq!(AppConfig::load_from(&missing).unwrap(), AppConfig::default());

        let partial = dir.path().join("partial.json");
        std::fs::write(&partial, r#"{"automation": {"refresh_after_run": false}}"#).unwrap();
        let config = AppConfig::load_from(&partial).unwrap();
        assert!(!config.automation.refresh_after_run);
        assert_eq!(config.automation.refresh_delay_ms, 100);
    }
}
