use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;

mod cli;
mod config;

use crate::config::{ChatConfig, ConfigDir, Profile};

#[derive(Parser)]
#[command(name = "repochat")]
#[command(about = "Chat with a GitHub repository from the terminal")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    chat: ChatArgs,

    /// Custom config directory (defaults to ~/.repochat)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Backend preset (overrides `profile` in config.toml)
    #[arg(long, global = true, value_enum)]
    profile: Option<Profile>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with a repository (default)
    Chat(ChatArgs),

    /// Check whether a repository can be analyzed, then exit
    Check(CheckArgs),

    /// Print the resolved configuration
    Config,
}

#[derive(Args)]
struct ChatArgs {
    /// Repository as `owner/repo` or a github.com URL
    target: Option<String>,
}

#[derive(Args)]
struct CheckArgs {
    /// Repository as `owner/repo` or a github.com URL
    target: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let dir = ConfigDir::new(cli.config_dir.clone())?;
    let config = ChatConfig::load(&dir, cli.profile.as_ref())?;

    match cli.command {
        Some(Commands::Chat(args)) => chat(&config, args).await,
        Some(Commands::Check(args)) => cli::check_command(&config, &args.target).await,
        Some(Commands::Config) => cli::config_command(&config),
        None => chat(&config, cli.chat).await,
    }
}

async fn chat(config: &ChatConfig, args: ChatArgs) -> Result<()> {
    match args.target {
        Some(target) => cli::chat_command(config, &target).await,
        None => anyhow::bail!("missing repository: try `repochat owner/repo`"),
    }
}

/// Logs go to stderr so they never mix with replies on stdout.
fn init_logging(debug: bool) {
    let default_directive = if debug {
        "repo_chat=debug,repo_session=debug,info"
    } else {
        "repo_chat=warn,repo_session=warn,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}
