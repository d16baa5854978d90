//! CLI commands.
//!
//! Each subcommand of the `toolchat` binary has a `run` entry point here.

pub mod ask;
pub mod chat;
pub mod tools;
