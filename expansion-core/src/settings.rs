use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::abi::Slot;

/// Host configuration, read from `~/.svc16/expansions.toml` unless another
/// path is given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    /// Tracing filter used when `RUST_LOG` is not set.
    pub log_filter: String,
    /// Triggers delivered to each expansion per run.
    pub triggers: usize,
    /// Value written to every slot before each trigger.
    pub fill: Slot,
    pub expansions: Vec<ExpansionConfig>,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            triggers: 1,
            fill: 0,
            expansions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionConfig {
    /// Path to the dynamic library
    pub library: PathBuf,
    /// Display name, defaults to the library file stem
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl HostSettings {
    /// Get the default settings path (~/.svc16/expansions.toml)
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".svc16").join("expansions.toml"))
    }

    /// Load settings from a TOML file. A missing file yields the defaults;
    /// a malformed one is an error, the file is hand written and is never
    /// replaced behind the user's back.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {path:?}"))?;

        let mut settings: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse settings in {path:?}"))?;

        // Relative library paths are relative to the settings file.
        if let Some(base) = path.parent() {
            for expansion in &mut settings.expansions {
                if expansion.library.is_relative() {
                    expansion.library = base.join(&expansion.library);
                }
            }
        }

        Ok(settings)
    }

    /// Write settings as pretty TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {parent:?}"))?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, contents).with_context(|| format!("Failed to write settings to {path:?}"))
    }

    pub fn enabled_expansions(&self) -> impl Iterator<Item = &ExpansionConfig> {
        self.expansions.iter().filter(|e| e.enabled)
    }
}
