pub mod agent_core;
pub mod commands;
pub mod config;
pub mod inference;
pub mod mcp_client;
pub mod telemetry;

pub use config::AppConfig;
pub use telemetry::Telemetry;

/// Return the platform-standard data directory for toolchat.
///
/// - macOS: `~/Library/Application Support/toolchat/`
/// - Windows: `{FOLDERID_RoamingAppData}\toolchat\`
/// - Linux: `$XDG_DATA_HOME/toolchat/` (fallback `~/.local/share/toolchat`)
///
/// Falls back to `~/.toolchat/` only if none of the above can be resolved.
pub fn data_dir() -> std::path::PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("toolchat");
    }
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".toolchat")
}
