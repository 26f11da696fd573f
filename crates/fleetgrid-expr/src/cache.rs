//! Bounded cache of compiled programs keyed by source hash.
//!
//! Eviction is FIFO: when full, `put` drops the entry that was inserted
//! first, regardless of how often it has been read since. Reads take the
//! shared lock only; hit and miss counters are atomics so concurrent `get`
//! calls never serialize on a writer.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::compiler::CompiledExpression;

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct CacheEntry {
    program: CompiledExpression,
    inserted_at: Instant,
    /// Tie-break for entries inserted within the same clock tick.
    seq: u64,
}

pub struct ExpressionCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    max_size: usize,
    next_seq: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ExpressionCache {
    /// A cache holding at most `max_size` programs (minimum 1).
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_size: max_size.max(1),
            next_seq: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn get(&self, hash: &str) -> Option<CompiledExpression> {
        let entries = self.entries.read().expect("expression cache lock");
        match entries.get(hash) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(hash = %hash, "expression cache hit");
                Some(entry.program.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(hash = %hash, "expression cache miss");
                None
            }
        }
    }

    /// Insert a program. Replacing an existing key keeps its original
    /// insertion position.
    pub fn put(&self, hash: &str, program: CompiledExpression) {
        let mut entries = self.entries.write().expect("expression cache lock");

        if let Some(entry) = entries.get_mut(hash) {
            entry.program = program;
            return;
        }

        if entries.len() >= self.max_size {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| (entry.inserted_at, entry.seq))
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                let evictions = self.evictions.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    evicted = %oldest,
                    max_size = self.max_size,
                    evictions,
                    "expression cache full, evicted oldest entry"
                );
            }
        }

        entries.insert(
            hash.to_string(),
            CacheEntry {
                program,
                inserted_at: Instant::now(),
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            },
        );
    }

    /// Drop every entry and reset all counters.
    pub fn clear(&self) {
        let mut entries = self.entries.write().expect("expression cache lock");
        let dropped = entries.len();
        entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        tracing::info!(dropped, "expression cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read().expect("expression cache lock");
        CacheStats {
            size: entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("expression cache lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ExpressionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionCache")
            .field("max_size", &self.max_size)
            .field("stats", &self.stats())
            .finish()
    }
}
