// src/bot/substitution.rs - Placeholder substitution and compiled pattern cache

use log::{debug, trace};
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use crate::config::ReplaceContext;
use crate::types::{DispatchError, DispatchResult, HandlerArgs};

/// Compiled patterns kept before the cache is flushed
const CACHE_LIMIT: usize = 512;

/// Replace every `:name:` placeholder in `template`.
///
/// Names present in the replacement mapping are replaced by their producer's
/// output for the current context; other placeholders are removed. Runs on
/// every dispatch attempt so dynamic values are always current.
pub fn resolve(template: &str, ctx: &ReplaceContext<'_>) -> DispatchResult<String> {
    let mut resolved = String::with_capacity(template.len());
    let mut last = 0;
    let bytes = template.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos] != b':' {
            pos += 1;
            continue;
        }

        let name_start = pos + 1;
        let name_end = name_start
            + bytes[name_start..]
                .iter()
                .take_while(|&&b| b.is_ascii_alphanumeric() || b == b'_')
                .count();

        if bytes.get(name_end) != Some(&b':') {
            pos += 1;
            continue;
        }

        let name = &template[name_start..name_end];
        resolved.push_str(&template[last..pos]);

        if let Some(replacement) = ctx.config.replace.get(name) {
            let value = replacement.evaluate(ctx).map_err(|e| DispatchError::Placeholder {
                name: name.to_string(),
                reason: format!("{:#}", e),
            })?;
            resolved.push_str(&value);
        }

        last = name_end + 1;
        pos = last;
    }

    resolved.push_str(&template[last..]);
    if resolved != template {
        trace!("Resolved pattern {:?} -> {:?}", template, resolved);
    }
    Ok(resolved)
}

/// Caches compiled regexes keyed by their concrete (post-substitution) text.
///
/// Substitution itself is never cached; only the compile step for a pattern
/// string already seen is skipped.
#[derive(Default)]
pub struct PatternCache {
    compiled: Mutex<HashMap<String, Regex>>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn compile(&self, pattern: &str) -> DispatchResult<Regex> {
        let mut compiled = self.compiled.lock().await;
        if let Some(regex) = compiled.get(pattern) {
            return Ok(regex.clone());
        }

        let regex = Regex::new(pattern).map_err(|source| DispatchError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        if compiled.len() >= CACHE_LIMIT {
            debug!("Pattern cache full ({} entries), flushing", compiled.len());
            compiled.clear();
        }
        compiled.insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }

    pub async fn len(&self) -> usize {
        self.compiled.lock().await.len()
    }
}

/// Fail when a pattern mixes named and unnamed capture groups
pub fn ensure_unambiguous(handler: &str, pattern: &str, regex: &Regex) -> DispatchResult<()> {
    let total = regex.captures_len().saturating_sub(1);
    let named = regex.capture_names().flatten().count();

    if named > 0 && total > named {
        return Err(DispatchError::AmbiguousPattern {
            handler: handler.to_string(),
            pattern: pattern.to_string(),
        });
    }
    Ok(())
}

/// Bind a match's groups by name when the pattern names them, by position otherwise
pub fn bind_args(regex: &Regex, caps: &Captures<'_>) -> HandlerArgs {
    let names: Vec<&str> = regex.capture_names().flatten().collect();

    if names.is_empty() {
        let groups = caps
            .iter()
            .skip(1)
            .map(|group| group.map(|m| m.as_str().to_string()))
            .collect();
        return HandlerArgs::Positional(groups);
    }

    let groups: BTreeMap<String, Option<String>> = names
        .into_iter()
        .map(|name| (name.to_string(), caps.name(name).map(|m| m.as_str().to_string())))
        .collect();
    HandlerArgs::Named(groups)
}
