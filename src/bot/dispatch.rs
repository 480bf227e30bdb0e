// src/bot/dispatch.rs - Addressing prefix stripping and the three-tier dispatch chain

use log::{debug, error};
use regex::{Regex, RegexBuilder};
use std::sync::Arc;

use crate::bot::hooks::{Handler, HandlerContext, HandlerSet};
use crate::bot::substitution::{bind_args, ensure_unambiguous, resolve, PatternCache};
use crate::config::{BotConfig, ReplaceContext};
use crate::irc::Client;
use crate::types::{DispatchError, DispatchResult, HandlerArgs, InboundMessage, Tier};

/// Recognises a channel message addressed to the bot.
///
/// A message is addressed when it starts with one of the response names
/// (case-insensitive, optionally followed by `:` or `,`, then whitespace) or
/// with the command prefix. Built once from configuration.
#[derive(Debug, Clone)]
pub struct AddressingRule {
    regex: Option<Regex>,
}

impl AddressingRule {
    pub fn new(names: &[String], command: &str) -> DispatchResult<Self> {
        let names: Vec<String> = names
            .iter()
            .filter(|name| !name.is_empty())
            .map(|name| regex::escape(name))
            .collect();

        let mut alternatives = Vec::new();
        if !names.is_empty() {
            alternatives.push(format!(r"(?:{})[,:]?\s+", names.join("|")));
        }
        if !command.is_empty() {
            alternatives.push(regex::escape(command));
        }

        if alternatives.is_empty() {
            return Ok(Self { regex: None });
        }

        let pattern = format!(r"^(?:{})(.+)$", alternatives.join("|"));
        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| DispatchError::InvalidPattern { pattern, source })?;

        Ok(Self { regex: Some(regex) })
    }

    /// The addressed suffix of `text`, or `None` when the bot was not addressed
    pub fn strip<'a>(&self, text: &'a str) -> Option<&'a str> {
        let caps = self.regex.as_ref()?.captures(text)?;
        caps.get(1).map(|m| m.as_str())
    }
}

/// Routes chat messages through the command, direct-message and raw tiers
pub struct Dispatcher {
    addressing: AddressingRule,
    patterns: PatternCache,
    break_on_match: bool,
}

impl Dispatcher {
    pub fn new(config: &BotConfig) -> DispatchResult<Self> {
        Ok(Self {
            addressing: AddressingRule::new(&config.names, &config.command)?,
            patterns: PatternCache::new(),
            break_on_match: config.break_on_match,
        })
    }

    pub fn addressing(&self) -> &AddressingRule {
        &self.addressing
    }

    /// Route one message and return the tier that handled it, if any.
    ///
    /// Channel messages only reach the command tier when addressed, and then
    /// with the prefix removed. The direct-message and raw tiers always see
    /// the full text and are only tried while no earlier tier fired.
    pub async fn route(
        &self,
        handlers: &HandlerSet,
        client: &Client,
        message: InboundMessage,
    ) -> DispatchResult<Option<Tier>> {
        let subject = if message.is_channel() {
            self.addressing.strip(&message.text).map(str::to_string)
        } else {
            Some(message.text.clone())
        };

        if let Some(subject) = subject {
            if self.run_tier(Tier::Command, handlers, client, &message, &subject).await? {
                return Ok(Some(Tier::Command));
            }
        }

        for tier in [Tier::DirectMessage, Tier::Raw] {
            if self.run_tier(tier, handlers, client, &message, &message.text).await? {
                return Ok(Some(tier));
            }
        }

        Ok(None)
    }

    async fn run_tier(
        &self,
        tier: Tier,
        handlers: &HandlerSet,
        client: &Client,
        message: &InboundMessage,
        subject: &str,
    ) -> DispatchResult<bool> {
        let nick = client.nick().await;
        let mut fired = false;

        for handler in handlers.tier(tier) {
            let Some(template) = handler.pattern() else {
                continue;
            };

            let pattern = {
                let ctx = ReplaceContext {
                    config: client.config(),
                    nick: &nick,
                };
                resolve(template, &ctx)?
            };
            let regex = self.patterns.compile(&pattern).await?;

            let args = match regex.captures(subject) {
                Some(caps) => {
                    ensure_unambiguous(handler.name(), &pattern, &regex)?;
                    bind_args(&regex, &caps)
                }
                None => continue,
            };

            self.invoke(tier, handler, client, message, args).await;
            fired = true;
            if self.break_on_match {
                break;
            }
        }

        Ok(fired)
    }

    async fn invoke(&self, tier: Tier, handler: &Arc<Handler>, client: &Client, message: &InboundMessage, args: HandlerArgs) {
        let Some(callback) = handler.message_callback() else {
            return;
        };

        debug!("Firing {} handler '{}' for {}", tier, handler.name(), message.sender_nick());
        let ctx = HandlerContext {
            client: client.clone(),
            message: message.clone(),
            args,
            handler: handler.name().to_string(),
        };

        if let Err(e) = callback(ctx).await {
            error!("Handler '{}' failed: {:#}", handler.name(), e);
        }
    }
}
