//! # pircbot
//!
//! An asynchronous IRC bot framework built around a layered dispatch engine.
//!
//! ## Features
//!
//! - **Line framing**: byte stream to protocol lines, tolerant of `\r\n` and bare `\n`
//! - **Raw listeners**: fan-out pattern matching on every protocol line
//! - **Three-tier dispatch**: command, direct-message and raw handlers with break-on-match
//! - **Dynamic patterns**: `:name:` placeholders resolved against live bot state on every message
//! - **Periodic jobs**: interval handlers started on connect and stopped before the socket closes
//! - **Hook modules**: behaviour bundles that can be reloaded while the bot is running
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pircbot::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BotConfig::new("irc.libera.chat")
//!         .with_name("pircbot")
//!         .with_channels(["#pircbot"]);
//!     let bot = Bot::new(config)?;
//!
//!     bot.register(Handler::command("hello", None, |ctx| async move {
//!         ctx.reply("Hello!").await
//!     }))
//!     .await;
//!
//!     bot.connect().await
//! }
//! ```

pub mod types;
pub mod config;
pub mod irc;
pub mod bot;

// Re-export commonly used items
pub mod prelude {
    pub use crate::bot::Bot;
    pub use crate::bot::hooks::{Handler, HandlerContext, HandlerSet, HookModule, JobContext, StaticModule};
    pub use crate::bot::jobs::JobStats;
    pub use crate::config::{BotConfig, ReplaceContext, Replacement};
    pub use crate::irc::Client;
    pub use crate::types::{DispatchError, HandlerArgs, HandlerKind, InboundMessage, Tier};
    pub use anyhow::Result;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
