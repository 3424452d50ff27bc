//! # mdchat (library root)
//!
//! Core plumbing for the **mdchat** CLI: a chat client for OpenAI-compatible
//! completion APIs that keeps every conversation in a local SQLite file and
//! renders replies as highlighted HTML.
//!
//! - Completion contract and `async-openai` client (`api`).
//! - Conversation state machine and typed commands (`conversation`).
//! - Encrypted credential storage (`vault`) and display preferences (`preferences`).
//! - Sessions and their message logs (`session_store`).
//! - Markdown → HTML with `syntect` highlighting (`render`).
//! - CLI parsing (`commands`), configuration (`config`) and DB integration
//!   (`database`, `models`, `schema`).
//!
//! ## Storage layout
//! By default everything lives in the per-platform configuration directory:
//!
//! - macOS: `~/Library/Application Support/com.mdchat.mdchat/`
//! - Linux (XDG): `~/.config/mdchat/`
//! - Windows: `C:\Users\<you>\AppData\Roaming\mdchat\mdchat\config\`
//!
//! ```text
//! config.yaml   # ChatConfig
//! mdchat.db     # settings, api_keys, chat_sessions, chats
//! secret.key    # 32-byte vault key (0600 on Unix)
//! ```
//!
//! ## Modules
//! - [`api`], [`commands`], [`config`], [`conversation`], [`database`], [`error`],
//!   [`models`], [`preferences`], [`render`], [`schema`], [`session_store`], [`vault`]

use directories::ProjectDirs;
use std::{error::Error, ffi::OsString, path::PathBuf};

pub mod api;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod database;
pub mod error;
pub mod models;
pub mod preferences;
pub mod render;
pub mod schema;
pub mod session_store;
pub mod vault;

/// Return the per-platform configuration directory used by mdchat.
///
/// This uses [`directories::ProjectDirs`] with the application triple
/// `("com", "mdchat", "mdchat")`.
///
/// The directory is **not** created by this function; callers that need it should
/// create it with `fs::create_dir_all`.
///
/// # Errors
/// Returns an error if the platform configuration directory cannot be determined
/// (which is rare but possible in heavily sandboxed environments).
///
/// # Examples
/// ```rust
/// let cfg = mdchat::config_dir().expect("has a config dir");
/// println!("config at {}", cfg.display());
/// ```
pub fn config_dir() -> Result<PathBuf, Box<dyn Error>> {
    let proj_dirs = ProjectDirs::from("com", "mdchat", "mdchat")
        .ok_or("Unable to determine config directory")?;
    let config_dir = proj_dirs.config_dir().to_path_buf();

    Ok(config_dir)
}

/// Location of `config.yaml`: `$MDCHAT_CONFIG` when set, otherwise under [`config_dir`].
pub fn config_path() -> Result<PathBuf, Box<dyn Error>> {
    config_path_from(std::env::var_os(config::CONFIG_PATH_ENV))
}

fn config_path_from(env_override: Option<OsString>) -> Result<PathBuf, Box<dyn Error>> {
    match env_override {
        Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => Ok(config_dir()?.join("config.yaml")),
    }
}
