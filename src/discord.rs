//! Discord surface: serenity gateway wiring, the slash-command handlers,
//! and the serenity-backed chat host.

pub mod commands;
pub mod convert;
pub mod gateway;
pub mod host;

pub use gateway::run;
pub use host::DiscordHost;
