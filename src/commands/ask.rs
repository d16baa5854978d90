//! One-shot completion without tools.

use std::io::Write;

use futures::StreamExt;

use crate::inference::{ChatMessage, InferenceClient};
use crate::{AppConfig, Telemetry};

/// Send `prompt` as a single user turn and print the reply.
///
/// With `stream`, fragments are printed as they arrive.
pub async fn run(
    config: &AppConfig,
    telemetry: &Telemetry,
    prompt: &str,
    stream: bool,
) -> anyhow::Result<()> {
    let client = InferenceClient::new(
        &config.llm.base_url,
        telemetry.inference_span(&config.llm.base_url),
    )?;
    let messages = [ChatMessage::user(prompt)];
    let options = config.completion_options();

    if !stream {
        let reply = client.chat_completion(&messages, &options).await?;
        println!("{reply}");
        return Ok(());
    }

    let fragments = client.chat_completion_stream(&messages, &options).await?;
    futures::pin_mut!(fragments);

    let mut stdout = std::io::stdout();
    while let Some(fragment) = fragments.next().await {
        let fragment = fragment?;
        write!(stdout, "{fragment}")?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}
