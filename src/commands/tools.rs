//! List everything each configured server advertises.

use crate::mcp_client::{Capability, CapabilityKind, ToolSession};
use crate::{AppConfig, Telemetry};

use super::chat::build_sessions;

/// Connect to every server, print its capabilities, disconnect.
///
/// A server that fails to connect is reported and skipped.
pub async fn run(config: &AppConfig, telemetry: &Telemetry) -> anyhow::Result<()> {
    let sessions = build_sessions(config, telemetry);
    if sessions.is_empty() {
        println!("No servers configured.");
        return Ok(());
    }

    for session in &sessions {
        print_session(session).await;
    }

    for session in &sessions {
        session.cleanup().await;
    }
    Ok(())
}

async fn print_session(session: &ToolSession) {
    println!("== {} ==", session.name());
    if let Err(e) = session.initialize().await {
        println!("  unavailable: {e}");
        return;
    }

    for kind in CapabilityKind::ALL {
        match session.list_capabilities(kind).await {
            Ok(caps) if caps.is_empty() => {}
            Ok(caps) => {
                println!("  {}s:", kind);
                for cap in &caps {
                    println!("    {}", describe(cap));
                }
            }
            Err(e) => tracing::debug!(server = session.name(), kind = %kind, error = %e, "listing failed"),
        }
    }
}

/// One-line summary of a capability.
pub fn describe(cap: &Capability) -> String {
    let label = match cap {
        Capability::Tool(t) => {
            let params: Vec<String> = t
                .parameters()
                .into_iter()
                .map(|p| if p.required { p.name } else { format!("{}?", p.name) })
                .collect();
            format!("{}({})", t.name, params.join(", "))
        }
        Capability::Resource(r) => format!("{} <{}>", r.name, r.uri),
        Capability::ResourceTemplate(r) => format!("{} <{}>", r.name, r.uri_template),
        Capability::Prompt(p) => {
            let args: Vec<&str> = p.arguments.iter().map(|a| a.name.as_str()).collect();
            format!("{}({})", p.name, args.join(", "))
        }
    };

    match cap.description() {
        Some(desc) if !desc.is_empty() => format!("{label} - {desc}"),
        _ => label,
    }
}
