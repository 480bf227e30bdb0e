// src/bot/builtins.rs - Fixed-format protocol reactions installed on every bot

use anyhow::Result;
use log::{debug, error, info, warn};

use crate::bot::Bot;
use crate::config::BotConfig;
use crate::irc::ListenerRegistry;
use crate::types::{DispatchResult, InboundMessage};

const NICK_IN_USE: &str = r"^:\S+ 433 \S+ (\S+)";
const PING: &str = r"^PING :(.*)";
const PRIVMSG: &str = r"^:(\S+) PRIVMSG (\S+) :(.*)";
const INVITE: &str = r"^:(\S+) INVITE \S+ :?(\S+)";
const MODE: &str = r"^\S+ MODE (\S+) :*\+([a-zA-Z]+)";

fn group(groups: &[Option<String>], index: usize) -> &str {
    groups.get(index).and_then(|g| g.as_deref()).unwrap_or("")
}

/// Install the built-in listeners; the reload command is skipped when
/// `reload_override` is set
pub fn register(registry: &mut ListenerRegistry<Bot>, config: &BotConfig) -> DispatchResult<()> {
    registry.register(NICK_IN_USE, |bot: Bot, groups| async move {
        let next = format!("{}_", bot.client().nick().await);
        warn!("Nick {} is already in use, trying {}", group(&groups, 0), next);
        bot.client().change_nick(&next).await?;
        Ok(())
    })?;

    registry.register(PING, |bot: Bot, groups| async move {
        bot.client().send_raw(&format!("PONG :{}", group(&groups, 0))).await?;
        Ok(())
    })?;

    registry.register(PRIVMSG, |bot: Bot, groups| async move {
        let message = InboundMessage::new(group(&groups, 1), group(&groups, 0), group(&groups, 2).trim());
        bot.receive_message(message).await?;
        Ok(())
    })?;

    registry.register(INVITE, |bot: Bot, groups| async move {
        let channel = group(&groups, 1);
        info!("Invited to {} by {}", channel, group(&groups, 0));
        bot.client().join(&[channel]).await?;
        Ok(())
    })?;

    registry.register(MODE, on_mode)?;

    if config.reload_override {
        debug!("Built-in reload command disabled");
    } else {
        registry.register(&config.reload_pattern(), |bot: Bot, groups| async move {
            info!("Reload requested by {}", group(&groups, 0));
            // A broken module keeps the previous handler set in place
            if let Err(e) = bot.load_hooks().await {
                error!("Reload failed: {:#}", e);
            }
            Ok(())
        })?;
    }

    Ok(())
}

/// User mode change: identify when the server sets `+i` and a password is
/// configured, then finish the connection's ready sequence
async fn on_mode(bot: Bot, groups: Vec<Option<String>>) -> Result<()> {
    let target = group(&groups, 0);
    if target != bot.client().nick().await {
        return Ok(());
    }

    let flags = group(&groups, 1);
    debug!("Mode +{} set on {}", flags, target);

    if flags.contains('i') {
        if let Some(password) = bot.config().password.as_deref() {
            bot.client().identify(password).await?;
        }
    }

    bot.on_ready().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn captures(pattern: &str, line: &str) -> Option<Vec<String>> {
        let regex = Regex::new(pattern).unwrap();
        regex.captures(line).map(|caps| {
            caps.iter()
                .skip(1)
                .map(|g| g.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect()
        })
    }

    #[test]
    fn test_builtin_line_formats() {
        assert_eq!(
            captures(NICK_IN_USE, ":irc.example.org 433 * PircBot :Nickname is already in use"),
            Some(vec!["PircBot".to_string()])
        );
        assert_eq!(captures(PING, "PING :irc.example.org"), Some(vec!["irc.example.org".to_string()]));
        assert_eq!(
            captures(PRIVMSG, ":alice!a@host PRIVMSG #rust :hello: there"),
            Some(vec!["alice!a@host".to_string(), "#rust".to_string(), "hello: there".to_string()])
        );
        assert_eq!(
            captures(INVITE, ":alice!a@host INVITE PircBot :#secret"),
            Some(vec!["alice!a@host".to_string(), "#secret".to_string()])
        );
        assert_eq!(
            captures(MODE, ":PircBot MODE PircBot :+iw"),
            Some(vec!["PircBot".to_string(), "iw".to_string()])
        );
        assert_eq!(captures(MODE, ":PircBot MODE PircBot :-i"), None);
    }

    #[test]
    fn test_reload_listener_is_optional() {
        let mut config = BotConfig::new("localhost");
        config.finalize();

        let mut registry = ListenerRegistry::new();
        register(&mut registry, &config).unwrap();
        assert_eq!(registry.len(), 6);

        let mut registry = ListenerRegistry::new();
        register(&mut registry, &config.clone().with_reload_override(true)).unwrap();
        assert_eq!(registry.len(), 5);
    }
}
