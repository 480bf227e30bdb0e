// src/irc/listeners.rs - Raw-line pattern registry with fan-out callbacks

use anyhow::Result;
use futures_util::future::BoxFuture;
use log::debug;
use regex::Regex;
use std::future::Future;
use std::sync::Arc;

use crate::types::{DispatchError, DispatchResult};

pub type ListenerCallback<C> = Arc<dyn Fn(C, Vec<Option<String>>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

struct Listener<C> {
    pattern: String,
    regex: Regex,
    callbacks: Vec<ListenerCallback<C>>,
}

/// Patterns matched against every raw protocol line.
///
/// Patterns are anchored at the start of the line. Every pattern that
/// matches fires all of its callbacks with the captured groups; there is no
/// winner. Registering the same pattern twice appends to its callback list.
pub struct ListenerRegistry<C> {
    listeners: Vec<Listener<C>>,
}

impl<C> Default for ListenerRegistry<C> {
    fn default() -> Self {
        Self { listeners: Vec::new() }
    }
}

impl<C: Clone + Send + 'static> ListenerRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&mut self, pattern: &str, callback: F) -> DispatchResult<()>
    where
        F: Fn(C, Vec<Option<String>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let callback: ListenerCallback<C> = Arc::new(
            move |ctx: C, groups: Vec<Option<String>>| -> BoxFuture<'static, Result<()>> {
                Box::pin(callback(ctx, groups))
            },
        );
        self.register_callback(pattern, callback)
    }

    pub fn register_callback(&mut self, pattern: &str, callback: ListenerCallback<C>) -> DispatchResult<()> {
        if let Some(listener) = self.listeners.iter_mut().find(|l| l.pattern == pattern) {
            listener.callbacks.push(callback);
            return Ok(());
        }

        let regex = Regex::new(&format!(r"\A(?:{})", pattern)).map_err(|source| DispatchError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        debug!("Registered listener: {}", pattern);
        self.listeners.push(Listener {
            pattern: pattern.to_string(),
            regex,
            callbacks: vec![callback],
        });
        Ok(())
    }

    /// Every callback whose pattern matches `line`, paired with that pattern's groups
    pub fn matches(&self, line: &str) -> Vec<(ListenerCallback<C>, Vec<Option<String>>)> {
        let mut fired = Vec::new();

        for listener in &self.listeners {
            let Some(caps) = listener.regex.captures(line) else {
                continue;
            };
            let groups: Vec<Option<String>> = caps
                .iter()
                .skip(1)
                .map(|group| group.map(|m| m.as_str().to_string()))
                .collect();

            for callback in &listener.callbacks {
                fired.push((Arc::clone(callback), groups.clone()));
            }
        }

        fired
    }

    /// Run every matching callback in turn, stopping at the first failure.
    /// Returns how many callbacks ran.
    pub async fn dispatch(&self, ctx: C, line: &str) -> Result<usize> {
        let fired = self.matches(line);
        let count = fired.len();
        for (callback, groups) in fired {
            callback(ctx.clone(), groups).await?;
        }
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(registry: &mut ListenerRegistry<Log>, pattern: &str, label: &'static str) {
        registry
            .register(pattern, move |log: Log, groups| async move {
                let groups: Vec<String> = groups.into_iter().map(|g| g.unwrap_or_else(|| "-".to_string())).collect();
                log.lock().unwrap().push(format!("{}:{}", label, groups.join(",")));
                Ok(())
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_every_matching_pattern_fires() {
        let mut registry = ListenerRegistry::new();
        recorder(&mut registry, r"^PING :(.*)", "ping");
        recorder(&mut registry, r"^(\S+) :(.*)", "generic");
        recorder(&mut registry, r"^:(\S+) PRIVMSG", "privmsg");

        let log: Log = Arc::default();
        let count = registry.dispatch(log.clone(), "PING :abc").await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(*log.lock().unwrap(), vec!["ping:abc".to_string(), "generic:PING,abc".to_string()]);
    }

    #[tokio::test]
    async fn test_shared_pattern_runs_all_callbacks() {
        let mut registry = ListenerRegistry::new();
        recorder(&mut registry, r"^PING :(.*)", "first");
        recorder(&mut registry, r"^PING :(.*)", "second");
        assert_eq!(registry.len(), 1);

        let log: Log = Arc::default();
        registry.dispatch(log.clone(), "PING :x").await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first:x".to_string(), "second:x".to_string()]);
    }

    #[tokio::test]
    async fn test_patterns_anchor_at_line_start() {
        let mut registry = ListenerRegistry::new();
        recorder(&mut registry, r"PING :(.*)", "ping");
        recorder(&mut registry, r"(a)?b", "optional");

        let log: Log = Arc::default();
        assert_eq!(registry.dispatch(log.clone(), ":server PING :x").await.unwrap(), 0);
        assert_eq!(registry.dispatch(log.clone(), "b").await.unwrap(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["optional:-".to_string()]);
    }

    #[tokio::test]
    async fn test_callback_failure_propagates() {
        let mut registry: ListenerRegistry<()> = ListenerRegistry::new();
        registry
            .register(r"^ERROR", |_, _| async move { Err(anyhow::anyhow!("closing link")) })
            .unwrap();

        assert!(registry.dispatch((), "ERROR :Closing Link").await.is_err());
        assert_eq!(registry.dispatch((), "PING :x").await.unwrap(), 0);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let mut registry: ListenerRegistry<()> = ListenerRegistry::new();
        let result = registry.register(r"^(unclosed", |_, _| async move { Ok(()) });
        assert!(matches!(result, Err(DispatchError::InvalidPattern { .. })));
        assert!(registry.is_empty());
    }
}
