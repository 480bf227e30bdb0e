// src/bot/hooks.rs - Handler registration surface, behaviour modules and the hook catalog

use anyhow::Result;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use log::{debug, info};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::irc::Client;
use crate::types::{DispatchError, DispatchResult, HandlerArgs, HandlerKind, InboundMessage, Tier};

pub type HandlerFuture = BoxFuture<'static, Result<()>>;
pub type MessageCallback = Arc<dyn Fn(HandlerContext) -> HandlerFuture + Send + Sync>;
pub type JobCallback = Arc<dyn Fn(JobContext) -> HandlerFuture + Send + Sync>;

/// Everything a matched command, direct-message or raw handler gets to see
#[derive(Clone)]
pub struct HandlerContext {
    pub client: Client,
    pub message: InboundMessage,
    pub args: HandlerArgs,
    /// Name of the handler being invoked
    pub handler: String,
}

impl HandlerContext {
    pub fn target(&self) -> &str {
        &self.message.target
    }

    pub fn sender(&self) -> &str {
        &self.message.sender
    }

    /// Answer in the channel the message came from, or privately to the sender
    pub async fn reply(&self, text: &str) -> Result<()> {
        self.client.message(self.message.reply_target(), text).await?;
        Ok(())
    }
}

/// Handed to a periodic handler on every run
#[derive(Clone)]
pub struct JobContext {
    pub client: Client,
    pub job: String,
    /// 1 for the first run
    pub run: u64,
}

#[derive(Clone)]
enum Action {
    Match { pattern: String, callback: MessageCallback },
    Every { interval: Duration, callback: JobCallback },
}

/// A tagged handler function.
///
/// Built through one of the typed constructors; the dispatcher and job
/// supervisor only ever see this uniform value.
#[derive(Clone)]
pub struct Handler {
    name: String,
    kind: HandlerKind,
    action: Action,
}

impl Handler {
    /// Command handler, tried against the addressed suffix of a message.
    /// Without a pattern it matches exactly its own name.
    pub fn command<F, Fut>(name: &str, pattern: Option<&str>, callback: F) -> Self
    where
        F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::matching(HandlerKind::Command, name, pattern, callback)
    }

    /// Direct-message handler, tried against the full message text
    pub fn direct<F, Fut>(name: &str, pattern: Option<&str>, callback: F) -> Self
    where
        F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::matching(HandlerKind::DirectMessage, name, pattern, callback)
    }

    /// Raw handler, the last tier of the chain
    pub fn raw<F, Fut>(name: &str, pattern: Option<&str>, callback: F) -> Self
    where
        F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::matching(HandlerKind::Raw, name, pattern, callback)
    }

    pub fn periodic<F, Fut>(name: &str, interval: Duration, callback: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let callback: JobCallback = Arc::new(move |ctx: JobContext| -> HandlerFuture { Box::pin(callback(ctx)) });
        Self {
            name: name.to_string(),
            kind: HandlerKind::Periodic,
            action: Action::Every { interval, callback },
        }
    }

    /// Matching handler whose kind is given as a textual tag
    /// (`command`, `privmsg`, `raw`). Periodic tags are refused with
    /// `IntervalRequired`; those handlers are built with [`Handler::periodic`].
    pub fn tagged<F, Fut>(tag: &str, name: &str, pattern: Option<&str>, callback: F) -> DispatchResult<Self>
    where
        F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let kind: HandlerKind = tag.parse()?;
        if kind == HandlerKind::Periodic {
            return Err(DispatchError::IntervalRequired {
                kind,
                handler: name.to_string(),
            });
        }
        Ok(Self::matching(kind, name, pattern, callback))
    }

    fn matching<F, Fut>(kind: HandlerKind, name: &str, pattern: Option<&str>, callback: F) -> Self
    where
        F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let pattern = match pattern {
            Some(pattern) => pattern.to_string(),
            None => format!("^{}$", name),
        };
        let callback: MessageCallback =
            Arc::new(move |ctx: HandlerContext| -> HandlerFuture { Box::pin(callback(ctx)) });

        Self {
            name: name.to_string(),
            kind,
            action: Action::Match { pattern, callback },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    /// Pattern template, before placeholder substitution
    pub fn pattern(&self) -> Option<&str> {
        match &self.action {
            Action::Match { pattern, .. } => Some(pattern),
            Action::Every { .. } => None,
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        match &self.action {
            Action::Every { interval, .. } => Some(*interval),
            Action::Match { .. } => None,
        }
    }

    pub(crate) fn message_callback(&self) -> Option<&MessageCallback> {
        match &self.action {
            Action::Match { callback, .. } => Some(callback),
            Action::Every { .. } => None,
        }
    }

    pub(crate) fn job_callback(&self) -> Option<&JobCallback> {
        match &self.action {
            Action::Every { callback, .. } => Some(callback),
            Action::Match { .. } => None,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Handler");
        out.field("name", &self.name).field("kind", &self.kind);
        match &self.action {
            Action::Match { pattern, .. } => out.field("pattern", pattern),
            Action::Every { interval, .. } => out.field("interval", interval),
        };
        out.finish()
    }
}

/// An optional behaviour module that contributes handlers.
///
/// `hooks` is called again on every reload, so a module may return a
/// different set each time.
#[async_trait]
pub trait HookModule: Send + Sync {
    fn name(&self) -> &str;

    async fn hooks(&self) -> Result<Vec<Handler>>;
}

/// A module with a fixed list of handlers
pub struct StaticModule {
    name: String,
    handlers: Vec<Handler>,
}

impl StaticModule {
    pub fn new(name: impl Into<String>, handlers: Vec<Handler>) -> Self {
        Self {
            name: name.into(),
            handlers,
        }
    }
}

#[async_trait]
impl HookModule for StaticModule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn hooks(&self) -> Result<Vec<Handler>> {
        Ok(self.handlers.clone())
    }
}

/// Handlers partitioned by kind, each list in registration order.
/// Replaced wholesale on reload, never edited in place.
#[derive(Debug, Clone, Default)]
pub struct HandlerSet {
    pub commands: Vec<Arc<Handler>>,
    pub direct: Vec<Arc<Handler>>,
    pub raws: Vec<Arc<Handler>>,
    pub periodic: Vec<Arc<Handler>>,
}

impl HandlerSet {
    pub fn classify<I>(handlers: I) -> Self
    where
        I: IntoIterator<Item = Arc<Handler>>,
    {
        let mut set = Self::default();
        for handler in handlers {
            match handler.kind() {
                HandlerKind::Command => set.commands.push(handler),
                HandlerKind::DirectMessage => set.direct.push(handler),
                HandlerKind::Raw => set.raws.push(handler),
                HandlerKind::Periodic => set.periodic.push(handler),
            }
        }
        set
    }

    pub fn tier(&self, tier: Tier) -> &[Arc<Handler>] {
        match tier {
            Tier::Command => &self.commands,
            Tier::DirectMessage => &self.direct,
            Tier::Raw => &self.raws,
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len() + self.direct.len() + self.raws.len() + self.periodic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The bot's behaviour surface: its own handlers plus those of every module
#[derive(Default)]
pub struct HookCatalog {
    own: Vec<Arc<Handler>>,
    modules: Vec<Arc<dyn HookModule>>,
}

impl HookCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&mut self, handler: Handler) {
        debug!("Added {} handler '{}'", handler.kind(), handler.name());
        self.own.push(Arc::new(handler));
    }

    pub fn add_module(&mut self, module: Arc<dyn HookModule>) {
        info!("Added hook module '{}'", module.name());
        self.modules.push(module);
    }

    pub fn module_names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name().to_string()).collect()
    }

    /// Build a fresh handler set: own handlers first, then each module in the
    /// order it was added
    pub async fn classify(&self) -> Result<HandlerSet> {
        let mut handlers: Vec<Arc<Handler>> = self.own.clone();

        for module in &self.modules {
            let hooks = module.hooks().await?;
            debug!("Hook module '{}' provided {} handlers", module.name(), hooks.len());
            handlers.extend(hooks.into_iter().map(Arc::new));
        }

        Ok(HandlerSet::classify(handlers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str, kind: &str) -> Handler {
        Handler::tagged(kind, name, None, |_| async { Ok(()) }).unwrap()
    }

    #[test]
    fn test_default_pattern_is_exact_name() {
        let handler = Handler::command("ping", None, |_| async { Ok(()) });
        assert_eq!(handler.kind(), HandlerKind::Command);
        assert_eq!(handler.pattern(), Some("^ping$"));
        assert_eq!(handler.interval(), None);
        assert!(handler.message_callback().is_some());

        let explicit = Handler::raw("anything", Some("(.*)"), |_| async { Ok(()) });
        assert_eq!(explicit.pattern(), Some("(.*)"));
    }

    #[test]
    fn test_periodic_handler() {
        let handler = Handler::periodic("tick", Duration::from_secs(60), |_| async { Ok(()) });
        assert_eq!(handler.kind(), HandlerKind::Periodic);
        assert_eq!(handler.interval(), Some(Duration::from_secs(60)));
        assert_eq!(handler.pattern(), None);
        assert!(handler.job_callback().is_some());
        assert!(handler.message_callback().is_none());
    }

    #[test]
    fn test_unknown_tag_is_fatal() {
        let result = Handler::tagged("webhook", "hook", None, |_| async { Ok(()) });
        assert!(matches!(result, Err(DispatchError::UnknownHandlerKind(_))));

    }

    #[test]
    fn test_periodic_tag_needs_an_interval() {
        let result = Handler::tagged("repeat", "hook", None, |_| async { Ok(()) });
        match result {
            Err(DispatchError::IntervalRequired { kind, handler }) => {
                assert_eq!(kind, HandlerKind::Periodic);
                assert_eq!(handler, "hook");
            }
            other => panic!("expected interval error, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_keeps_registration_order() {
        let set = HandlerSet::classify(
            vec![
                noop("b", "command"),
                noop("x", "raw"),
                noop("a", "command"),
                noop("m", "privmsg"),
                Handler::periodic("tick", Duration::from_secs(1), |_| async { Ok(()) }),
            ]
            .into_iter()
            .map(Arc::new),
        );

        let names = |list: &[Arc<Handler>]| list.iter().map(|h| h.name().to_string()).collect::<Vec<_>>();
        assert_eq!(names(set.tier(Tier::Command)), vec!["b", "a"]);
        assert_eq!(names(set.tier(Tier::DirectMessage)), vec!["m"]);
        assert_eq!(names(set.tier(Tier::Raw)), vec!["x"]);
        assert_eq!(names(&set.periodic[..]), vec!["tick"]);
        assert_eq!(set.len(), 5);
    }

    #[tokio::test]
    async fn test_catalog_merges_modules_after_own_handlers() {
        let mut catalog = HookCatalog::new();
        catalog.add_handler(noop("own", "command"));
        catalog.add_module(Arc::new(StaticModule::new(
            "extras",
            vec![noop("extra", "command"), noop("greet", "privmsg")],
        )));

        let set = catalog.classify().await.unwrap();
        let commands: Vec<&str> = set.commands.iter().map(|h| h.name()).collect();
        assert_eq!(commands, vec!["own", "extra"]);
        assert_eq!(set.direct.len(), 1);
        assert_eq!(catalog.module_names(), vec!["extras".to_string()]);
    }

    struct FailingModule;

    #[async_trait]
    impl HookModule for FailingModule {
        fn name(&self) -> &str {
            "failing"
        }

        async fn hooks(&self) -> Result<Vec<Handler>> {
            Err(anyhow::anyhow!("script missing"))
        }
    }

    #[tokio::test]
    async fn test_catalog_surfaces_module_failure() {
        let mut catalog = HookCatalog::new();
        catalog.add_module(Arc::new(FailingModule));
        assert!(catalog.classify().await.is_err());
    }
}
