//! Main module for the mdchat CLI application.
//!
//! Handles command parsing, configuration loading and start-up (database, vault
//! key, credential seeding), then dispatches to the conversation controller.
//!
//! # Examples
//!
//! ```sh
//! mdchat init
//! mdchat key sk-...
//! mdchat ask "How do I read a file in Rust?" --html answer.html
//! mdchat interactive -m gpt-4
//! ```

use clap::Parser;
use crossterm::style::Stylize;
use mdchat::{
    api::{OpenAiClient, Role},
    commands::{Cli, Commands, ReplInput, parse_repl_line},
    config::{self, ChatConfig},
    conversation::{ChatCommand, ChatOutcome, ConversationController, Submission, until_signalled},
    database::Database,
    error::ChatError,
    preferences::PreferenceStore,
    render::{RenderOptions, Renderer},
    session_store::SessionStore,
    vault::{CredentialVault, VaultKey},
};
use once_cell::sync::OnceCell;
use std::{
    env,
    error::Error,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    });
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run())
}

/// Everything a command needs once start-up succeeded.
struct App {
    config: ChatConfig,
    database: Database,
    key: VaultKey,
}

impl App {
    /// Load the config, open the database, load or create the vault key and
    /// seed the vault from `OPENAI_API_KEY` when it is empty.
    fn open(config_path: &Path) -> Result<Self, Box<dyn Error>> {
        let mut config = config::load_or_default(config_path)?;
        let base_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        config.resolve_paths(&base_dir);
        debug!("Config loaded: {:?}", config);

        for file in [&config.session_db_url, &config.key_file] {
            if let Some(parent) = Path::new(file).parent() {
                fs::create_dir_all(parent)?;
            }
        }

        let database = Database::open(config.session_db_url.clone())?;
        let key = VaultKey::load_or_create(Path::new(&config.key_file))?;
        let app = Self {
            config,
            database,
            key,
        };

        let from_env = env::var(config::API_KEY_ENV).ok();
        if app.vault().seed(from_env.as_deref())? {
            info!("Stored API key from {}", config::API_KEY_ENV);
        }

        Ok(app)
    }

    fn vault(&self) -> CredentialVault {
        CredentialVault::new(self.database.clone(), self.key.clone())
    }

    fn sessions(&self) -> SessionStore {
        SessionStore::new(self.database.clone())
    }

    fn preferences(&self) -> PreferenceStore {
        PreferenceStore::new(self.database.clone())
    }

    fn controller(&self) -> ConversationController<OpenAiClient> {
        ConversationController::new(
            OpenAiClient::from_config(&self.config),
            self.sessions(),
            self.vault(),
        )
    }

    fn render_options(&self) -> Result<RenderOptions, ChatError> {
        Ok(RenderOptions::new(
            &self.preferences().load()?,
            self.config.theme,
        ))
    }

    fn write_html(&self, markdown: &str, path: &Path) -> Result<(), Box<dyn Error>> {
        let html = Renderer::new().render_html(markdown, &self.render_options()?);
        fs::write(path, html)?;
        info!("Wrote HTML to {}", path.display());
        Ok(())
    }
}

/// Resolves when the user presses Ctrl-C; never, if the handler cannot be installed.
async fn interrupted() {
    until_signalled(tokio::signal::ctrl_c()).await
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config_path = mdchat::config_path()?;
    debug!("Using config file {}", config_path.display());

    if let Commands::Init = cli.command {
        write_default_config(&config_path)?;
    }

    let app = App::open(&config_path)?;

    match cli.command {
        Commands::Init => print_layout(&app, &config_path),
        Commands::Ask {
            question,
            model,
            session,
            html,
        } => {
            let mut controller = app.controller();
            if let Some(session_id) = session {
                controller.select_session(&session_id)?;
            }
            let model = app.config.model_or_default(model.as_deref());
            let submission = controller
                .submit_prompt_cancellable(&question, &model, interrupted())
                .await?;

            println!("{}", submission.content);
            print_session_footer(&submission);
            if let Some(path) = html {
                app.write_html(&submission.content, &path)?;
            }
        }
        Commands::Interactive { model, session } => {
            let model = app.config.model_or_default(model.as_deref());
            interactive(&app, model, session).await?;
        }
        Commands::Sessions { json } => {
            let sessions = app.sessions().list_sessions()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
            } else if sessions.is_empty() {
                println!("No sessions yet.");
            } else {
                for session in sessions {
                    println!("{}  {}", session.id.dark_grey(), session.name);
                }
            }
        }
        Commands::Show { id } => {
            let store = app.sessions();
            let session = store
                .get_session(&id)?
                .ok_or_else(|| ChatError::NotFound(format!("session {id}")))?;
            println!("{}\n", session.name.bold());
            for message in store.load_messages(&id)? {
                let label = match message.role {
                    Role::User => "you".green().bold(),
                    Role::Assistant => message.model.as_str().cyan().bold(),
                };
                println!("{label}\n{}\n", message.content);
            }
        }
        Commands::Rename { id, name } => {
            app.controller()
                .handle(ChatCommand::RenameSession {
                    session_id: id,
                    name,
                })
                .await?;
        }
        Commands::Delete { id } => {
            app.controller()
                .handle(ChatCommand::DeleteSession { session_id: id })
                .await?;
        }
        Commands::Key { secret, clear } => {
            if clear {
                app.vault().clear()?;
            } else if let Some(secret) = secret {
                app.controller()
                    .handle(ChatCommand::SaveCredential { secret })
                    .await?;
                println!("API key saved.");
            }
        }
        Commands::Font { family, size } => {
            let store = app.preferences();
            let current = store.load()?;
            match family {
                Some(family) => {
                    store.save(&family, size.unwrap_or(current.font_size))?;
                }
                None => println!("{} {}pt", current.font_family, current.font_size),
            }
        }
        Commands::Render { file, out } => {
            let markdown = fs::read_to_string(&file)?;
            match out {
                Some(path) => app.write_html(&markdown, &path)?,
                None => {
                    let html = Renderer::new().render_html(&markdown, &app.render_options()?);
                    println!("{html}");
                }
            }
        }
    }

    Ok(())
}

fn print_session_footer(submission: &Submission) {
    eprintln!(
        "{}",
        format!(
            "[{} · {} · {}]",
            submission.session_name, submission.session_id, submission.model
        )
        .dark_grey()
    );
}

/// Read prompts from stdin until EOF, `/quit` or Ctrl-C at the prompt.
async fn interactive(
    app: &App,
    mut model: String,
    session: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let mut controller = app.controller();
    if let Some(session_id) = session {
        controller.select_session(&session_id)?;
        for turn in controller.history() {
            println!("{} {}", format!("{}>", turn.role).dark_grey(), turn.content);
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", ">".cyan().bold());
        io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = interrupted() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        let Some(input) = parse_repl_line(&line) else {
            continue;
        };

        let command = match input {
            ReplInput::Quit => break,
            ReplInput::Command(command) => command,
            ReplInput::Copy => {
                println!("{}", controller.last_markdown().unwrap_or_default());
                continue;
            }
            ReplInput::ListModels => {
                for name in &app.config.models {
                    let marker = if *name == model { "*" } else { " " };
                    println!("{marker} {name}");
                }
                continue;
            }
            ReplInput::ShowModel => {
                println!("{model}");
                continue;
            }
            ReplInput::SetModel(name) => {
                model = name;
                continue;
            }
            ReplInput::Prompt(prompt) => {
                let result = controller
                    .submit_prompt_cancellable(&prompt, &model, interrupted())
                    .await;
                match result {
                    Ok(submission) => {
                        println!("{}\n", submission.content);
                        print_session_footer(&submission);
                    }
                    Err(err) => report(&err),
                }
                continue;
            }
        };

        match controller.handle(command).await {
            Ok(ChatOutcome::Sessions(sessions)) => {
                for session in sessions {
                    println!("{}  {}", session.id.dark_grey(), session.name);
                }
            }
            Ok(ChatOutcome::Selected { session, history }) => {
                println!("{} ({} messages)", session.name.bold(), history.len());
            }
            Ok(ChatOutcome::Cleared) => println!("{}", "New chat".dark_grey()),
            Ok(_) => {}
            Err(err) => report(&err),
        }
    }

    Ok(())
}

fn report(err: &ChatError) {
    eprintln!("{}", err.to_string().red());
}

/// Writes a default `config.yaml` unless one exists.
fn write_default_config(config_path: &Path) -> Result<(), Box<dyn Error>> {
    if config_path.exists() {
        info!("Keeping existing config at {}", config_path.display());
    } else {
        info!("Creating config file: {}", config_path.display());
        config::write_config(config_path, &ChatConfig::default())?;
    }
    Ok(())
}

fn print_layout(app: &App, config_path: &Path) {
    println!("Config:   {}", config_path.display());
    println!("Database: {}", PathBuf::from(&app.config.session_db_url).display());
    println!("Key file: {}", PathBuf::from(&app.config.key_file).display());
    if app.vault().load().is_none() {
        println!(
            "No API key stored yet; run `mdchat key <KEY>` or set {}.",
            config::API_KEY_ENV
        );
    }
}
