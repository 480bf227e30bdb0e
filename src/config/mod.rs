// src/config/mod.rs - Bot configuration: defaults, file/env loading and pattern replacements

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 6667;
pub const DEFAULT_NAME: &str = "PircBot";
pub const DEFAULT_REALNAME: &str = "pIRC Bot";
pub const DEFAULT_COMMAND: &str = "!";

/// Configuration for one bot instance.
///
/// Every option has a default. Options derived from others (`nick`, `ident`,
/// `names`) are left empty until [`BotConfig::finalize`] fills them, so
/// builder calls can change `name` first. Keys the bot does not recognise
/// are kept in `extra` and otherwise ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub host: String,
    pub port: u16,
    /// Original name of the bot
    pub name: String,
    /// Names the bot answers to when addressed in a channel
    pub names: Vec<String>,
    pub ident: String,
    /// Working nick, may change on collision
    pub nick: String,
    pub realname: String,
    /// Channels joined once the server signals readiness
    pub channels: Vec<String>,
    /// Command prefix character(s)
    pub command: String,
    /// NickServ password
    pub password: Option<String>,
    pub break_on_match: bool,
    /// Echo wire traffic at info level
    pub verbose: bool,
    /// Values substituted for `:name:` placeholders in handler patterns
    pub replace: BTreeMap<String, Replacement>,
    /// Disables the built-in reload listener
    pub reload_override: bool,
    pub reload_pattern: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_yaml::Value>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            name: DEFAULT_NAME.to_string(),
            names: Vec::new(),
            ident: String::new(),
            nick: String::new(),
            realname: DEFAULT_REALNAME.to_string(),
            channels: Vec::new(),
            command: DEFAULT_COMMAND.to_string(),
            password: env::var("PASSWORD").ok().filter(|p| !p.is_empty()),
            break_on_match: true,
            verbose: true,
            replace: BTreeMap::new(),
            reload_override: false,
            reload_pattern: None,
            extra: HashMap::new(),
        }
    }
}

impl BotConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a YAML file, or TOML when the extension is `.toml`
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read bot config: {}", path.display()))?;

        let mut config: BotConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content)
                .with_context(|| format!("Failed to parse bot config: {}", path.display()))?,
            _ => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse bot config: {}", path.display()))?,
        };
        config.finalize();

        if !config.extra.is_empty() {
            let mut keys: Vec<&String> = config.extra.keys().collect();
            keys.sort();
            debug!("Ignoring unrecognised config keys: {:?}", keys);
        }

        info!("Loaded bot config for {} from {}", config.nick, path.display());
        Ok(config)
    }

    /// Build configuration from `IRC_HOST`, `IRC_PORT`, `IRC_NICK`, `IRC_CHANNELS` and `PASSWORD`
    pub fn from_env() -> Result<Self> {
        let host = env::var("IRC_HOST").context("IRC_HOST environment variable not set")?;
        let mut config = Self::new(host);

        if let Ok(port) = env::var("IRC_PORT") {
            config.port = port
                .trim()
                .parse()
                .with_context(|| format!("IRC_PORT is not a valid port: {}", port))?;
        }

        if let Ok(nick) = env::var("IRC_NICK") {
            let nick = nick.trim();
            if !nick.is_empty() {
                config.name = nick.to_string();
            }
        }

        if let Ok(channels) = env::var("IRC_CHANNELS") {
            config.channels = channels
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        config.finalize();
        debug!("Channels: {:?}", config.channels);
        Ok(config)
    }

    /// Fill options derived from others when they were not given explicitly
    pub fn finalize(&mut self) {
        if self.nick.is_empty() {
            self.nick = self.name.clone();
        }
        if self.ident.is_empty() {
            self.ident = self.name.to_lowercase();
        }
        if self.names.is_empty() {
            self.names = vec![self.nick.clone()];
        }
    }

    /// Listener pattern for the built-in reload command
    pub fn reload_pattern(&self) -> String {
        match &self.reload_pattern {
            Some(pattern) => pattern.clone(),
            None => format!(r"^:(\S+) PRIVMSG (\S+) :{}reload$", regex::escape(&self.command)),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_nick(mut self, nick: impl Into<String>) -> Self {
        self.nick = nick.into();
        self
    }

    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    pub fn with_break_on_match(mut self, enabled: bool) -> Self {
        self.break_on_match = enabled;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_reload_override(mut self, disabled: bool) -> Self {
        self.reload_override = disabled;
        self
    }

    pub fn with_replacement(mut self, name: impl Into<String>, replacement: Replacement) -> Self {
        self.replace.insert(name.into(), replacement);
        self
    }
}

/// Bot state visible to replacement producers when a pattern is resolved
#[derive(Debug, Clone, Copy)]
pub struct ReplaceContext<'a> {
    pub config: &'a BotConfig,
    /// Current working nick
    pub nick: &'a str,
}

impl ReplaceContext<'_> {
    /// Value of a context field referenced from a template
    pub fn field(&self, key: &str) -> Option<&str> {
        match key {
            "nick" => Some(self.nick),
            "name" => Some(&self.config.name),
            "ident" => Some(&self.config.ident),
            "command" => Some(&self.config.command),
            "host" => Some(&self.config.host),
            _ => None,
        }
    }
}

pub type ReplacementFn = dyn Fn(&ReplaceContext<'_>) -> Result<String> + Send + Sync;

/// Producer for the text substituted in place of a `:name:` placeholder.
///
/// Templates are pattern text in which `{nick}`, `{name}`, `{ident}`,
/// `{command}` and `{host}` expand to the bot's current values (regex-escaped).
/// Computed replacements run a closure against the same context.
#[derive(Clone)]
pub enum Replacement {
    Template(String),
    Computed(Arc<ReplacementFn>),
}

impl Replacement {
    pub fn template(text: impl Into<String>) -> Self {
        Replacement::Template(text.into())
    }

    pub fn computed<F>(producer: F) -> Self
    where
        F: Fn(&ReplaceContext<'_>) -> Result<String> + Send + Sync + 'static,
    {
        Replacement::Computed(Arc::new(producer))
    }

    /// Produce the replacement text for the current context
    pub fn evaluate(&self, ctx: &ReplaceContext<'_>) -> Result<String> {
        match self {
            Replacement::Template(text) => Self::expand_template(text, ctx),
            Replacement::Computed(producer) => producer(ctx),
        }
    }

    fn expand_template(text: &str, ctx: &ReplaceContext<'_>) -> Result<String> {
        let mut expanded = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(open) = rest.find('{') {
            expanded.push_str(&rest[..open]);
            let after = &rest[open + 1..];

            match after.find('}').map(|close| (&after[..close], close)) {
                Some((key, close)) if is_field_name(key) => {
                    let value = ctx
                        .field(key)
                        .ok_or_else(|| anyhow::anyhow!("unknown context value '{{{}}}'", key))?;
                    expanded.push_str(&regex::escape(value));
                    rest = &after[close + 1..];
                }
                // Regex quantifiers such as `{2,3}` pass through untouched
                _ => {
                    expanded.push('{');
                    rest = after;
                }
            }
        }

        expanded.push_str(rest);
        Ok(expanded)
    }
}

fn is_field_name(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl fmt::Debug for Replacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Replacement::Template(text) => f.debug_tuple("Template").field(text).finish(),
            Replacement::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl<'de> Deserialize<'de> for Replacement {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Replacement::Template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_derived_defaults() {
        let mut config = BotConfig::new("irc.example.org").with_name("Helper");
        config.finalize();

        assert_eq!(config.host, "irc.example.org");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.nick, "Helper");
        assert_eq!(config.ident, "helper");
        assert_eq!(config.names, vec!["Helper".to_string()]);
        assert_eq!(config.command, "!");
        assert!(config.break_on_match);
        assert!(config.verbose);
    }

    #[test]
    fn test_explicit_values_survive_finalize() {
        let mut config = BotConfig::new("irc.example.org")
            .with_nick("Helper_")
            .with_names(["Helper", "H"]);
        config.finalize();

        assert_eq!(config.nick, "Helper_");
        assert_eq!(config.names, vec!["Helper".to_string(), "H".to_string()]);
        assert_eq!(config.ident, DEFAULT_NAME.to_lowercase());
    }

    #[test]
    fn test_reload_pattern_escapes_command() {
        let config = BotConfig::new("localhost").with_command("?");
        assert_eq!(config.reload_pattern(), r"^:(\S+) PRIVMSG (\S+) :\?reload$");
    }

    #[tokio::test]
    async fn test_load_yaml_with_unknown_keys() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("bot.yaml");
        tokio::fs::write(
            &path,
            "host: irc.example.org\nport: 6697\nname: Yamlbot\nchannels: ['#a', '#b']\nbreak_on_match: false\nreplace:\n  me: '{nick}'\nfavourite_colour: blue\n",
        )
        .await
        .unwrap();

        let config = BotConfig::load(&path).await.unwrap();
        assert_eq!(config.port, 6697);
        assert_eq!(config.nick, "Yamlbot");
        assert_eq!(config.channels, vec!["#a".to_string(), "#b".to_string()]);
        assert!(!config.break_on_match);
        assert!(config.extra.contains_key("favourite_colour"));
        assert!(matches!(config.replace.get("me"), Some(Replacement::Template(t)) if t == "{nick}"));
    }

    #[tokio::test]
    async fn test_load_toml() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("bot.toml");
        tokio::fs::write(&path, "host = \"irc.example.org\"\nnick = \"Tomlbot\"\ncommand = \"%\"\n")
            .await
            .unwrap();

        let config = BotConfig::load(&path).await.unwrap();
        assert_eq!(config.nick, "Tomlbot");
        assert_eq!(config.command, "%");
        assert_eq!(config.name, DEFAULT_NAME);
    }

    #[tokio::test]
    async fn test_load_missing_file_fails() {
        let temp_dir = tempdir().unwrap();
        let result = BotConfig::load(temp_dir.path().join("absent.yaml")).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_template_replacement_uses_current_context() {
        let mut config = BotConfig::new("localhost").with_name("Bot");
        config.finalize();

        let replacement = Replacement::template("(?:{nick}|{name})");
        let ctx = ReplaceContext { config: &config, nick: "Bot[2]" };
        assert_eq!(replacement.evaluate(&ctx).unwrap(), r"(?:Bot\[2\]|Bot)");
    }

    #[test]
    fn test_template_keeps_quantifiers() {
        let config = BotConfig::new("localhost");
        let replacement = Replacement::template(r"\d{2,3}x{4}");
        let ctx = ReplaceContext { config: &config, nick: "Bot" };
        assert_eq!(replacement.evaluate(&ctx).unwrap(), r"\d{2,3}x{4}");
    }

    #[test]
    fn test_template_with_unknown_field_fails() {
        let config = BotConfig::new("localhost");
        let replacement = Replacement::template("{channel}");
        let ctx = ReplaceContext { config: &config, nick: "Bot" };
        assert!(replacement.evaluate(&ctx).is_err());
    }

    #[test]
    fn test_computed_replacement() {
        let config = BotConfig::new("localhost");
        let replacement = Replacement::computed(|ctx| Ok(format!("{}|helper", ctx.nick)));
        let ctx = ReplaceContext { config: &config, nick: "Bot" };
        assert_eq!(replacement.evaluate(&ctx).unwrap(), "Bot|helper");
    }
}
