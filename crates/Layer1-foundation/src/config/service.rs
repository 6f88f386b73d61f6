//! Service Config - settings for the task service
//!
//! Loaded from `config.json` in the global config directory
//! (`~/.config/taskforge/`) and then from `<workspace>/.taskforge/`; the
//! project file wins over the global one.

use super::MatcherConfig;
use crate::storage::JsonStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name
pub const SERVICE_CONFIG_FILE: &str = "config.json";

/// Default task definitions file, relative to the workspace root
pub const DEFAULT_TASKS_FILE: &str = ".taskforge/tasks.json";

const DEFAULT_RELOAD_DEBOUNCE_MS: u64 = 50;
const DEFAULT_OUTPUT_DRAIN_TIMEOUT_MS: u64 = 2000;

// ============================================================================
// PTY size
// ============================================================================

/// Terminal size used for PTY-backed tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PtySizeConfig {
    pub rows: u16,
    pub cols: u16,
}

impl Default for PtySizeConfig {
    fn default() -> Self {
        Self { rows: 24, cols: 120 }
    }
}

// ============================================================================
// Service config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfig {
    /// Task definitions file; relative paths are taken from the workspace root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks_file: Option<PathBuf>,

    /// Quiet period after the last definitions change before reloading
    pub reload_debounce_ms: u64,

    /// How long an exited task waits for its output to be fully parsed
    pub output_drain_timeout_ms: u64,

    pub pty: PtySizeConfig,

    /// Matchers registered on top of the built-in ones
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<MatcherConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            tasks_file: None,
            reload_debounce_ms: DEFAULT_RELOAD_DEBOUNCE_MS,
            output_drain_timeout_ms: DEFAULT_OUTPUT_DRAIN_TIMEOUT_MS,
            pty: PtySizeConfig::default(),
            matchers: Vec::new(),
        }
    }
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Global config, then the workspace's project config on top
    pub fn load(workspace_root: &Path) -> Result<Self> {
        let mut config = Self::new();

        if let Ok(global) = JsonStore::global() {
            if let Some(overlay) = global.load_optional::<ServiceConfigOverlay>(SERVICE_CONFIG_FILE)? {
                config.merge(overlay);
            }
        }

        let project = JsonStore::project(workspace_root);
        if let Some(overlay) = project.load_optional::<ServiceConfigOverlay>(SERVICE_CONFIG_FILE)? {
            config.merge(overlay);
        }

        Ok(config)
    }

    /// Apply every field the overlay sets; matchers are replaced by name
    pub fn merge(&mut self, overlay: ServiceConfigOverlay) {
        if let Some(tasks_file) = overlay.tasks_file {
            self.tasks_file = Some(tasks_file);
        }
        if let Some(ms) = overlay.reload_debounce_ms {
            self.reload_debounce_ms = ms;
        }
        if let Some(ms) = overlay.output_drain_timeout_ms {
            self.output_drain_timeout_ms = ms;
        }
        if let Some(pty) = overlay.pty {
            self.pty = pty;
        }
        for matcher in overlay.matchers {
            self.matchers.retain(|m| m.name != matcher.name);
            self.matchers.push(matcher);
        }
    }

    /// Absolute path of the task definitions file
    pub fn tasks_path(&self, workspace_root: &Path) -> PathBuf {
        match &self.tasks_file {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => workspace_root.join(path),
            None => workspace_root.join(DEFAULT_TASKS_FILE),
        }
    }

    pub fn reload_debounce(&self) -> Duration {
        Duration::from_millis(self.reload_debounce_ms)
    }

    pub fn output_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.output_drain_timeout_ms)
    }
}

/// One config file as written: absent fields leave the layer below alone
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfigOverlay {
    pub tasks_file: Option<PathBuf>,
    pub reload_debounce_ms: Option<u64>,
    pub output_drain_timeout_ms: Option<u64>,
    pub pty: Option<PtySizeConfig>,

    #[serde(default)]
    pub matchers: Vec<MatcherConfig>,
}
