use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use toolchat::{commands, AppConfig, Telemetry};

/// Chat with a local LLM that can call tools on MCP servers.
#[derive(Debug, Parser)]
#[command(name = "toolchat", version, about)]
struct Cli {
    /// Config file (default: $TOOLCHAT_CONFIG, ./toolchat.yaml, then the user config dir).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log to stderr instead of the log file.
    #[arg(long, global = true)]
    log_stderr: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive chat with tool calling (default).
    Chat,
    /// Send a single prompt to the model, without tools.
    Ask {
        /// Print the reply as it is generated.
        #[arg(long)]
        stream: bool,
        /// The prompt text.
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },
    /// List tools, resources and prompts of every configured server.
    Tools,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let telemetry = match Telemetry::init(cli.log_stderr) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("warning: logging disabled: {e:#}");
            Telemetry::disabled()
        }
    };

    let result = run(cli, &telemetry).await;
    if let Err(e) = &result {
        tracing::error!(error = %format!("{e:#}"), "toolchat failed");
        eprintln!("error: {e:#}");
    }
    telemetry.flush();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

async fn run(cli: Cli, telemetry: &Telemetry) -> anyhow::Result<()> {
    let (config, source) = AppConfig::load(cli.config.as_deref())?;
    match &source {
        Some(path) => tracing::info!(path = %path.display(), "using config file"),
        None => tracing::info!("no config file found, using defaults"),
    }

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => commands::chat::run(&config, telemetry).await,
        Command::Ask { stream, prompt } => {
            commands::ask::run(&config, telemetry, &prompt.join(" "), stream).await
        }
        Command::Tools => commands::tools::run(&config, telemetry).await,
    }
}
