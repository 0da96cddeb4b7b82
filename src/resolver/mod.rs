//! Entity resolution.
//!
//! Maps a token's (type, identifier) to an entity in the knowledge graph by
//! trying the type's ordered [`strategy`] table. The first strategy that
//! returns a row with a `curie` wins and is recorded as the match method.
//! A failing strategy is a miss, never an error.

use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::graph::GraphQueryExecutor;
use crate::token::{ParsedToken, SimplifiedType};

mod memo;
pub mod strategy;

pub use memo::ResolutionMemo;
pub use strategy::{strategies_for, LookupKey, Strategy};

/// The (token text, type, identifier) triple that determines a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResolutionKey {
    /// Literal token text.
    pub token_text: String,
    /// Token type.
    pub simplified_type: SimplifiedType,
    /// Dictionary identifier, if any.
    pub primary_identifier: Option<String>,
}

impl ResolutionKey {
    /// Creates a key.
    pub fn new(
        token_text: impl Into<String>,
        simplified_type: SimplifiedType,
        primary_identifier: Option<String>,
    ) -> Self {
        Self {
            token_text: token_text.into(),
            simplified_type,
            primary_identifier,
        }
    }

    /// Key for a parsed token.
    #[must_use]
    pub fn for_token(token: &ParsedToken) -> Self {
        Self::new(
            token.token_text(),
            token.simplified_type(),
            token.descriptor.primary_identifier.clone(),
        )
    }
}

/// Outcome of resolving one key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResolutionResult {
    /// Whether an entity was found.
    pub found: bool,
    /// Resolved entity id (curie).
    pub entity_id: Option<String>,
    /// Resolved entity label.
    pub entity_label: Option<String>,
    /// Name of the strategy that matched.
    pub method: Option<String>,
}

impl ResolutionResult {
    /// A miss.
    #[must_use]
    pub fn not_found() -> Self {
        Self::default()
    }

    /// A hit via the named strategy.
    pub fn found(entity_id: impl Into<String>, entity_label: Option<String>, method: impl Into<String>) -> Self {
        Self {
            found: true,
            entity_id: Some(entity_id.into()),
            entity_label,
            method: Some(method.into()),
        }
    }
}

/// Resolves tokens against a graph executor.
pub struct EntityResolver {
    executor: Arc<dyn GraphQueryExecutor>,
}

impl std::fmt::Debug for EntityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityResolver").finish_non_exhaustive()
    }
}

impl EntityResolver {
    /// Creates a resolver over the given executor.
    pub fn new(executor: Arc<dyn GraphQueryExecutor>) -> Self {
        Self { executor }
    }

    /// Resolves a key.
    ///
    /// Returns `not_found` immediately for unknown tokens and tokens without
    /// an identifier.
    #[must_use]
    pub fn resolve(&self, key: &ResolutionKey) -> ResolutionResult {
        let Some(identifier) = key.primary_identifier.as_deref() else {
            return ResolutionResult::not_found();
        };
        if key.simplified_type.is_unknown() || identifier.trim().is_empty() {
            return ResolutionResult::not_found();
        }
        let lookup = LookupKey {
            identifier,
            token_text: &key.token_text,
        };
        self.resolve_with(strategies_for(key.simplified_type), &lookup)
    }

    /// Runs an explicit strategy table against a lookup key.
    #[must_use]
    pub fn resolve_with(&self, strategies: &[Strategy], lookup: &LookupKey<'_>) -> ResolutionResult {
        for strategy in strategies {
            let Some(query) = (strategy.build)(lookup) else {
                continue;
            };
            let rows = match self.executor.execute(&query) {
                Ok(rows) => rows,
                Err(e) => {
                    log::debug!("Strategy {} failed for '{}': {e}", strategy.name, lookup.identifier);
                    continue;
                }
            };
            let hit = rows.iter().find_map(|row| {
                let curie = row.get("curie")?.as_str()?;
                let label = row.get("label").and_then(|v| v.as_str()).map(str::to_string);
                Some((curie.to_string(), label))
            });
            if let Some((curie, label)) = hit {
                return ResolutionResult::found(curie, label, strategy.name);
            }
        }
        ResolutionResult::not_found()
    }

    /// Resolves every key once, using up to `workers` threads.
    ///
    /// The returned memo holds an entry for every input key.
    #[must_use]
    pub fn resolve_all(&self, keys: &[ResolutionKey], workers: usize) -> ResolutionMemo {
        let memo = ResolutionMemo::new();
        let workers = workers.clamp(1, keys.len().max(1));

        if workers == 1 {
            for key in keys {
                memo.get_or_resolve(key, |k| self.resolve(k));
            }
            return memo;
        }

        let (tx, rx) = crossbeam_channel::bounded::<&ResolutionKey>(workers * 2);
        thread::scope(|scope| {
            for _ in 0..workers {
                let rx = rx.clone();
                let memo = &memo;
                scope.spawn(move || {
                    for key in rx {
                        memo.get_or_resolve(key, |k| self.resolve(k));
                    }
                });
            }
            drop(rx);
            for key in keys {
                // Receivers only disappear if every worker panicked; scope
                // re-raises that on exit.
                if tx.send(key).is_err() {
                    break;
                }
            }
            drop(tx);
        });
        memo
    }
}
