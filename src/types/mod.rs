// src/types/mod.rs - Message, handler argument and error types shared across the dispatch engine

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Prefix characters that mark a target as a shared channel rather than a user
pub const CHANNEL_PREFIXES: [char; 2] = ['#', '&'];

/// Returns true when `target` names a shared channel
pub fn is_channel(target: &str) -> bool {
    target.starts_with(CHANNEL_PREFIXES)
}

/// A chat message received from the server, produced once per PRIVMSG line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Channel or nick the message was addressed to
    pub target: String,
    /// Full source prefix (`nick!user@host`)
    pub sender: String,
    pub text: String,
}

impl InboundMessage {
    pub fn new(target: impl Into<String>, sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            sender: sender.into(),
            text: text.into(),
        }
    }

    pub fn is_channel(&self) -> bool {
        is_channel(&self.target)
    }

    /// Nick portion of the sender prefix
    pub fn sender_nick(&self) -> &str {
        match self.sender.split_once('!') {
            Some((nick, _)) => nick,
            None => &self.sender,
        }
    }

    /// Where a reply should go: the channel for channel messages, the sender otherwise
    pub fn reply_target(&self) -> &str {
        if self.is_channel() {
            &self.target
        } else {
            self.sender_nick()
        }
    }
}

/// Captured groups handed to a matched handler.
///
/// Patterns with named groups bind by name, patterns with plain groups bind
/// by position. Groups that did not participate in the match are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerArgs {
    Positional(Vec<Option<String>>),
    Named(BTreeMap<String, Option<String>>),
}

impl Default for HandlerArgs {
    fn default() -> Self {
        HandlerArgs::Positional(Vec::new())
    }
}

impl HandlerArgs {
    /// Positional group by index (0 is the first group, not the whole match)
    pub fn get(&self, index: usize) -> Option<&str> {
        match self {
            HandlerArgs::Positional(groups) => groups.get(index).and_then(|g| g.as_deref()),
            HandlerArgs::Named(_) => None,
        }
    }

    pub fn named(&self, name: &str) -> Option<&str> {
        match self {
            HandlerArgs::Named(groups) => groups.get(name).and_then(|g| g.as_deref()),
            HandlerArgs::Positional(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            HandlerArgs::Positional(groups) => groups.len(),
            HandlerArgs::Named(groups) => groups.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The three ordered handler categories of the dispatch chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Command,
    DirectMessage,
    Raw,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Command => write!(f, "command"),
            Tier::DirectMessage => write!(f, "direct-message"),
            Tier::Raw => write!(f, "raw"),
        }
    }
}

/// Kind tag carried by every handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Command,
    DirectMessage,
    Raw,
    Periodic,
}

impl HandlerKind {
    /// Dispatch tier for the matching kinds; periodic handlers have none
    pub fn tier(&self) -> Option<Tier> {
        match self {
            HandlerKind::Command => Some(Tier::Command),
            HandlerKind::DirectMessage => Some(Tier::DirectMessage),
            HandlerKind::Raw => Some(Tier::Raw),
            HandlerKind::Periodic => None,
        }
    }
}

impl FromStr for HandlerKind {
    type Err = DispatchError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "command" => Ok(HandlerKind::Command),
            "privmsg" | "msg" | "direct" => Ok(HandlerKind::DirectMessage),
            "raw" => Ok(HandlerKind::Raw),
            "repeat" | "interval" | "periodic" => Ok(HandlerKind::Periodic),
            _ => Err(DispatchError::UnknownHandlerKind(tag.to_string())),
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKind::Command => write!(f, "command"),
            HandlerKind::DirectMessage => write!(f, "privmsg"),
            HandlerKind::Raw => write!(f, "raw"),
            HandlerKind::Periodic => write!(f, "periodic"),
        }
    }
}

/// Errors raised by the line reader, listener registry and dispatch chain
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("ambiguous handler pattern for '{handler}': {pattern:?} mixes named and unnamed groups")]
    AmbiguousPattern { handler: String, pattern: String },

    #[error("unknown handler kind: {0:?}")]
    UnknownHandlerKind(String),

    #[error("{kind} handler '{handler}' needs an interval, not a pattern")]
    IntervalRequired { kind: HandlerKind, handler: String },

    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("placeholder ':{name}:' could not be resolved: {reason}")]
    Placeholder { name: String, reason: String },

    #[error("not connected to a server")]
    NotConnected,

    #[error("connection failure: {0}")]
    Io(#[from] std::io::Error),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
