//! Command-line interface parsing and handling
//!
//! This module parses command-line arguments, loads configuration, and
//! dispatches into the chat UI or the one-shot subcommands.

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::api::models::{fetch_models, sort_models};
use crate::core::config::Config;
use crate::ui::chat_loop::run_chat;

#[derive(Parser)]
#[command(name = "confab")]
#[command(about = "A terminal chat client for local LLM inference servers")]
#[command(
    long_about = "Confab is a full-screen terminal chat client for local LLM inference \
servers (Ollama-compatible API). Conversations are persisted as one JSON file \
per chat and replies stream in as they are generated.\n\n\
Controls:\n\
  Type              Enter your message in the input field\n\
  Enter             Send the message\n\
  Tab               Switch between the chat list and the input field\n\
  Up/Down           Scroll the transcript / move in the chat list\n\
  d / Delete        Delete the selected chat (with confirmation)\n\
  Ctrl+D            Open settings (model for new chats)\n\
  Ctrl+C            Quit"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model for new chats (overrides the configured default)
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Inference server base URL (overrides the configured value)
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Directory chats are persisted into
    #[arg(long, global = true, value_name = "DIR")]
    pub chats_dir: Option<PathBuf>,

    /// Write diagnostic logs to this file
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the chat interface (default)
    Chat,
    /// List the models available on the server
    Models,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    if let Some(path) = &args.log {
        init_logging(path)?;
    }

    let config = match Config::load_from_path(&Config::get_config_path()) {
        Ok(config) => config,
        Err(err) => {
            // A broken config file should not keep the chat from starting.
            eprintln!("{err}; continuing with defaults");
            Config::default()
        }
    };

    let base_url = args.base_url.unwrap_or_else(|| config.base_url.clone());
    let model = args.model.unwrap_or_else(|| config.default_model.clone());
    let chats_dir = args.chats_dir.unwrap_or_else(Config::default_chats_dir);

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Models => {
            let client = reqwest::Client::new();
            let mut response = fetch_models(&client, &base_url).await?;
            sort_models(&mut response.models);
            for model in response.models {
                println!("{}", model.name);
            }
            Ok(())
        }
        Commands::Chat => run_chat(base_url, model, chats_dir).await,
    }
}

fn init_logging(path: &Path) -> Result<(), Box<dyn Error>> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}
