//! Interactive chat command: the terminal REPL.
//!
//! Bridges stdin/stdout to the agent core (`ChatSession`) and wires the
//! configured servers and model endpoint into it.

use std::io::{BufRead, Write};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::agent_core::{ChatIo, ChatSession, TurnOutcome};
use crate::inference::InferenceClient;
use crate::mcp_client::ToolSession;
use crate::{AppConfig, Telemetry};

/// Exit status used when a second Ctrl-C forces the process down.
const INTERRUPTED_EXIT_CODE: i32 = 130;

// ─── Console IO ──────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
enum ConsoleEvent {
    Line(String),
    Interrupted,
    Eof,
}

/// Reads `You: ` prompts from stdin and prints outcomes to stdout.
///
/// Stdin is read on a dedicated OS thread, outside the runtime's blocking
/// pool. The first Ctrl-C ends the session at the next prompt; a second one
/// exits immediately.
pub struct ConsoleIo {
    events: mpsc::UnboundedReceiver<ConsoleEvent>,
}

impl ConsoleIo {
    /// Start the stdin reader thread and the interrupt watcher.
    /// Must be called from within a tokio runtime.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        spawn_stdin_reader(tx.clone());
        tokio::spawn(watch_interrupts(tx));
        Self::from_events(rx)
    }

    fn from_events(events: mpsc::UnboundedReceiver<ConsoleEvent>) -> Self {
        Self { events }
    }
}

fn spawn_stdin_reader(tx: mpsc::UnboundedSender<ConsoleEvent>) {
    let reader_tx = tx.clone();
    let spawned = std::thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if reader_tx.send(ConsoleEvent::Line(line)).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to read stdin");
                        break;
                    }
                }
            }
            let _ = reader_tx.send(ConsoleEvent::Eof);
        });

    if let Err(e) = spawned {
        tracing::error!(error = %e, "failed to start stdin reader");
        let _ = tx.send(ConsoleEvent::Eof);
    }
}

async fn watch_interrupts(tx: mpsc::UnboundedSender<ConsoleEvent>) {
    let mut presses = 0u32;
    loop {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            return;
        }
        presses += 1;
        if presses > 1 {
            tracing::warn!("second interrupt, exiting immediately");
            eprintln!();
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
        tracing::info!("interrupt received");
        if tx.send(ConsoleEvent::Interrupted).is_err() {
            return;
        }
    }
}

#[async_trait]
impl ChatIo for ConsoleIo {
    async fn read_line(&mut self) -> Option<String> {
        print!("You: ");
        let _ = std::io::stdout().flush();

        match self.events.recv().await {
            Some(ConsoleEvent::Line(line)) => Some(line),
            Some(ConsoleEvent::Interrupted) => {
                println!();
                tracing::info!("interrupted, ending chat session");
                None
            }
            Some(ConsoleEvent::Eof) | None => None,
        }
    }

    fn show(&mut self, outcome: &TurnOutcome) {
        match outcome {
            TurnOutcome::Reply(text) => println!("Assistant: {text}"),
            TurnOutcome::ToolReply {
                progress, reply, ..
            } => {
                if let Some(progress) = progress {
                    println!("{progress}");
                }
                println!("Assistant: {reply}");
            }
            TurnOutcome::Failed(error) => println!("Error: {error}"),
            TurnOutcome::Quit => println!("Goodbye."),
            TurnOutcome::Ignored => {}
        }
    }
}

// ─── Command ─────────────────────────────────────────────────────────────────

/// One session per configured server, in configured order.
pub fn build_sessions(config: &AppConfig, telemetry: &Telemetry) -> Vec<ToolSession> {
    config
        .servers
        .iter()
        .map(|server| ToolSession::from_config(server, telemetry.root()))
        .collect()
}

/// Run the REPL until the user quits.
pub async fn run(config: &AppConfig, telemetry: &Telemetry) -> anyhow::Result<()> {
    let model = InferenceClient::new(
        &config.llm.base_url,
        telemetry.inference_span(&config.llm.base_url),
    )?;
    let sessions = build_sessions(config, telemetry);

    tracing::info!(
        endpoint = %config.llm.base_url,
        model = %config.llm.model,
        servers = sessions.len(),
        "starting chat"
    );

    let mut chat = ChatSession::new(
        model,
        sessions,
        config.chat_settings(),
        telemetry.orchestrator_span(),
    );
    let mut io = ConsoleIo::spawn();
    chat.run(&mut io, None).await?;
    Ok(())
}
