//! This module defines the command-line interface for the application using `clap`.
//!
//! It provides a `Cli` struct that represents the parsed command-line arguments,
//! and a `Commands` enum that represents the available subcommands and their
//! options.
//!
//! # Examples
//!
//! ```no_run
//! use clap::Parser;
//! use mdchat::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Commands::Ask { question, .. } => println!("asking {question}"),
//!     _ => {}
//! }
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::{
    conversation::ChatCommand,
    preferences::{MAX_FONT_SIZE, MIN_FONT_SIZE},
};

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Write a default config file and create the data directory.
    Init,

    /// Ask a single question, continuing a session when `-s` is given.
    #[clap(name = "ask", alias = "a")]
    Ask {
        /// The prompt to send.
        question: String,

        /// Model to use instead of the configured default.
        #[arg(short = 'm', long)]
        model: Option<String>,

        /// Id of an existing session to continue.
        #[arg(short = 's', long)]
        session: Option<String>,

        /// Also write the rendered reply as an HTML document.
        #[arg(long, value_name = "PATH")]
        html: Option<PathBuf>,
    },

    /// Chat in a loop. Lines starting with `/` are commands: `/new`, `/sessions`,
    /// `/open <id>`, `/models`, `/model [name]`, `/copy` and `/quit`.
    /// Ctrl-C cancels a pending reply, or quits at the prompt.
    #[clap(name = "interactive", alias = "i")]
    Interactive {
        #[arg(short = 'm', long)]
        model: Option<String>,

        #[arg(short = 's', long)]
        session: Option<String>,
    },

    /// List stored sessions.
    Sessions {
        /// Print as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Print the transcript of a session.
    Show { id: String },

    /// Give a session a new display name.
    Rename { id: String, name: String },

    /// Delete a session and all of its messages.
    Delete { id: String },

    /// Store (or clear) the API key in the encrypted vault.
    Key {
        #[arg(required_unless_present = "clear")]
        secret: Option<String>,

        #[arg(long, conflicts_with = "secret")]
        clear: bool,
    },

    /// Show or set the font used in rendered HTML.
    Font {
        family: Option<String>,

        #[arg(requires = "family", value_parser = clap::value_parser!(i32).range(i64::from(MIN_FONT_SIZE)..=i64::from(MAX_FONT_SIZE)))]
        size: Option<i32>,
    },

    /// Render a Markdown file to a standalone HTML document.
    Render {
        file: PathBuf,

        /// Output path; stdout when omitted.
        #[arg(short = 'o', long)]
        out: Option<PathBuf>,
    },
}

/// One line typed at the interactive prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplInput {
    Quit,
    Command(ChatCommand),
    /// Print the raw Markdown of the last reply.
    Copy,
    ListModels,
    /// `/model` without a name.
    ShowModel,
    SetModel(String),
    Prompt(String),
}

/// Classify an interactive line. Blank lines yield `None`.
pub fn parse_repl_line(line: &str) -> Option<ReplInput> {
    let input = line.trim();
    if input.is_empty() {
        return None;
    }

    let (head, rest) = input.split_once(' ').unwrap_or((input, ""));
    let rest = rest.trim();
    let parsed = match head {
        "/quit" | "/exit" => ReplInput::Quit,
        "/new" => ReplInput::Command(ChatCommand::NewSession),
        "/sessions" => ReplInput::Command(ChatCommand::ListSessions),
        "/open" => ReplInput::Command(ChatCommand::SelectSession {
            session_id: rest.to_string(),
        }),
        "/copy" => ReplInput::Copy,
        "/models" => ReplInput::ListModels,
        "/model" if rest.is_empty() => ReplInput::ShowModel,
        "/model" => ReplInput::SetModel(rest.to_string()),
        _ => ReplInput::Prompt(line.to_string()),
    };
    Some(parsed)
}
