//! Persisted tool configuration.
//!
//! A small YAML file remembering the current game and distribution, window
//! geometry and UI preferences.  Loading is lenient: unknown fields are
//! ignored, broken values fall back to defaults, and stale directory paths
//! are dropped.  Saving is atomic (temp sibling plus rename) so a crash on
//! exit never truncates it.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "emm.yaml";

const THEMES: [&str; 3] = ["system", "light", "dark"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: f64,
    pub height: f64,
    pub pos_x: f64,
    pub pos_y: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 900.0,
            height: 700.0,
            pos_x: 0.0,
            pos_y: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub current_game: String,
    /// Known game directories and their user-given labels.
    pub game_names: BTreeMap<String, String>,
    pub current_distro: String,
    pub current_section: i64,
    pub current_game_filter: i64,
    pub game_with_console: bool,
    pub window: WindowConfig,
    pub theme: String,
    pub lang: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            current_game: String::new(),
            game_names: BTreeMap::new(),
            current_distro: String::new(),
            current_section: 0,
            current_game_filter: 0,
            game_with_console: false,
            window: WindowConfig::default(),
            theme: "system".to_owned(),
            lang: "eng".to_owned(),
        }
    }
}

impl ToolConfig {
    /// Load a configuration, falling back to defaults on any damage and
    /// dropping references to directories that no longer exist.
    pub fn load(path: &Path) -> Self {
        let mut config = match fs::read_to_string(path) {
            Ok(text) => match serde_yaml::from_str::<ToolConfig>(&text) {
                Ok(config) => config,
                Err(err) => {
                    warn!(path = %path.display(), %err, "tool config unreadable, using defaults");
                    ToolConfig::default()
                }
            },
            Err(_) => ToolConfig::default(),
        };
        config.sanitize();
        config
    }

    fn sanitize(&mut self) {
        if !self.current_game.is_empty() && !Path::new(&self.current_game).is_dir() {
            self.current_game.clear();
        }
        if !self.current_distro.is_empty() && !Path::new(&self.current_distro).is_dir() {
            self.current_distro.clear();
        }
        self.game_names.retain(|path, _| Path::new(path).is_dir());
        if !THEMES.contains(&self.theme.as_str()) {
            self.theme = "system".to_owned();
        }
        if !emm_core::manifest::is_known_language(&self.lang) {
            self.lang = "eng".to_owned();
        }
    }

    /// Write the configuration atomically.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let yaml = serde_yaml::to_string(self)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let temp = tempfile::NamedTempFile::new_in(dir)?;
        fs::write(temp.path(), yaml)?;
        temp.persist(path).map_err(|err| err.error)?;
        Ok(())
    }
}
