//! This module provides functionality for loading and handling the application's configuration.
//!
//! It defines the `ChatConfig` struct, which holds the configuration parameters,
//! and a `load_config` function to load the configuration from a YAML file.
//! Every field has a default, so a partial (or empty) file is valid.
//!
//! # Examples
//!
//! ```no_run
//! use mdchat::config::{ChatConfig, load_config};
//!
//! let config: ChatConfig = load_config("/path/to/config.yaml").unwrap();
//! println!("{:?}", config);
//! ```

use serde::{Deserialize, Serialize};
use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
};
use tracing::*;

use crate::render::Theme;

/// Environment variable that can seed the credential vault on first use.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "MDCHAT_CONFIG";

/// Represents the application's configuration.
///
/// Relative `session_db_url` and `key_file` paths are resolved against the
/// config directory by [`ChatConfig::resolve_paths`].
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct ChatConfig {
    /// The base URL of the OpenAI-compatible API.
    pub api_base: String,

    /// Model used when the caller does not pick one.
    pub model: String,

    /// Models offered to the user.
    pub models: Vec<String>,

    // Upper bound on completion tokens; provider default when absent.
    pub max_tokens: Option<u32>,

    // Session database (SQLite file path)
    pub session_db_url: String,

    // File holding the vault key
    pub key_file: String,

    // Code highlighting theme for rendered HTML
    pub theme: Theme,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            models: vec![
                "gpt-3.5-turbo".to_string(),
                "gpt-4".to_string(),
                "gpt-4o".to_string(),
            ],
            max_tokens: None,
            session_db_url: "mdchat.db".to_string(),
            key_file: "secret.key".to_string(),
            theme: Theme::Dark,
        }
    }
}

impl ChatConfig {
    /// Make relative database and key paths absolute under `base_dir`.
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        self.session_db_url = resolve(base_dir, &self.session_db_url)
            .to_string_lossy()
            .to_string();
        self.key_file = resolve(base_dir, &self.key_file)
            .to_string_lossy()
            .to_string();
    }

    /// Pick `requested` if given, otherwise the configured default model.
    pub fn model_or_default(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_string)
            .unwrap_or_else(|| self.model.clone())
    }
}

fn resolve(base_dir: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Loads the application's configuration from a YAML file.
///
/// # Returns
///
/// - `Ok(ChatConfig)`: The loaded configuration.
/// - `Err(Box<dyn Error>)`: An error occurred while reading the file or parsing the YAML.
pub fn load_config(file: &str) -> Result<ChatConfig, Box<dyn Error>> {
    debug!("Loading config from {}", file);
    let content = fs::read_to_string(file)?;
    let config: ChatConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}

/// Load the config at `path`, falling back to defaults if the file does not exist yet.
pub fn load_or_default(path: &Path) -> Result<ChatConfig, Box<dyn Error>> {
    if path.exists() {
        load_config(&path.to_string_lossy())
    } else {
        info!(
            "No config at {}, using defaults (run `mdchat init` to create one)",
            path.display()
        );
        Ok(ChatConfig::default())
    }
}

/// Write `config` as YAML to `path`, creating parent directories.
pub fn write_config(path: &Path, config: &ChatConfig) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_yaml::to_string(config)?)?;
    Ok(())
}
