use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no project path configured")]
    MissingRoot,
    #[error("project path {0} does not exist")]
    RootNotFound(PathBuf),
    #[error("project path {0} is not a directory")]
    RootNotDir(PathBuf),
    #[error("batch window must be a finite number of seconds >= 0, got {0}")]
    InvalidBatchWindow(f64),
    #[error("invalid file pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Settings for one watched project.
///
/// Read once when a watch session starts; changing it afterwards only affects
/// the next session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub project_name: String,
    pub project_path: PathBuf,
    pub branch: String,
    pub remote_url: String,
    pub auto_commit: bool,
    pub auto_push: bool,
    pub batch_window_sec: f64,
    pub debounce_ms: u64,
    pub max_backups: usize,
    pub include_exts: Vec<String>,
    pub exclude_dirs: Vec<String>,
    pub include_file_patterns: Vec<String>,
    pub exclude_file_patterns: Vec<String>,
    pub mirror_on_start: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            project_name: String::new(),
            project_path: PathBuf::new(),
            branch: "main".to_string(),
            remote_url: String::new(),
            auto_commit: true,
            auto_push: true,
            batch_window_sec: 60.0,
            debounce_ms: 600,
            max_backups: 10,
            include_exts: [
                ".py", ".json", ".md", ".yml", ".yaml", ".ini", ".toml", ".sql", ".js", ".ts",
                ".html", ".css",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            exclude_dirs: [
                "style_check",
                ".git",
                ".idea",
                ".vscode",
                "__pycache__",
                ".venv",
                "venv",
                "node_modules",
                "dist",
                "build",
                ".auto_versions",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            include_file_patterns: Vec::new(),
            exclude_file_patterns: Vec::new(),
            mirror_on_start: true,
        }
    }
}

impl WatchConfig {
    /// `<config_dir>/autosync/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("autosync").join("config.json"))
    }

    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Malformed config {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingRoot);
        }
        let root = self.root();
        if !root.exists() {
            return Err(ConfigError::RootNotFound(root));
        }
        if !root.is_dir() {
            return Err(ConfigError::RootNotDir(root));
        }
        if !self.batch_window_sec.is_finite() || self.batch_window_sec < 0.0 {
            return Err(ConfigError::InvalidBatchWindow(self.batch_window_sec));
        }
        compile_patterns(&self.include_file_patterns)?;
        compile_patterns(&self.exclude_file_patterns)?;
        Ok(())
    }

    /// Project path with a leading `~` expanded.
    pub fn root(&self) -> PathBuf {
        match self.project_path.strip_prefix("~") {
            Ok(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| self.project_path.clone()),
            Err(_) => self.project_path.clone(),
        }
    }

    pub fn remote(&self) -> Option<&str> {
        let url = self.remote_url.trim();
        (!url.is_empty()).then_some(url)
    }

    /// Configured branch, `main` when left blank.
    pub fn branch_or_default(&self) -> &str {
        match self.branch.trim() {
            "" => "main",
            b => b,
        }
    }

    pub fn batch_window(&self) -> Duration {
        Duration::from_secs_f64(self.batch_window_sec.max(0.0))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Name used in commit messages and log lines.
    pub fn display_name(&self) -> String {
        if !self.project_name.trim().is_empty() {
            return self.project_name.trim().to_string();
        }
        let root = self.root();
        root.canonicalize()
            .unwrap_or(root)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "project".to_string())
    }
}

/// Patterns are anchored at the start of the file name.
pub(crate) fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| {
            Regex::new(&format!("^(?:{p})")).map_err(|source| ConfigError::InvalidPattern {
                pattern: p.to_string(),
                source,
            })
        })
        .collect()
}
