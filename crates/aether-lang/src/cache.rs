use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{
    Program,
    ast::parser::Parser,
    error::InnerError,
    lexer::Lexer,
    optimizer::{OptimizationFlags, Optimizer},
};

pub type Fingerprint = [u8; 32];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheOptions {
    /// Maximum number of entries; the oldest inserted entry is evicted when full.
    pub capacity: Option<usize>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    program: Program,
    flags: OptimizationFlags,
}

/// Optimized programs keyed by a fingerprint of their source and the
/// optimization flags that produced them.
#[derive(Debug, Default)]
pub struct AstCache {
    entries: FxHashMap<Fingerprint, CacheEntry>,
    order: VecDeque<Fingerprint>,
    options: CacheOptions,
    hits: u64,
    misses: u64,
}

/// SHA-256 over the source bytes followed by the flag byte.
pub fn fingerprint(source: &str, flags: OptimizationFlags) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([flags.bits()]);

    let mut fingerprint = [0u8; 32];
    fingerprint.copy_from_slice(&hasher.finalize());
    fingerprint
}

/// Tokenizes, parses and optimizes `source` without touching any cache.
pub fn compile(source: &str, flags: OptimizationFlags) -> Result<Program, InnerError> {
    let tokens = Lexer::new().tokenize(source)?;
    let program = Parser::new(&tokens).parse()?;
    Ok(Optimizer::new(flags).optimize(&program))
}

impl AstCache {
    pub fn new(options: CacheOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    /// Returns the optimized program for `source` and whether it came from the
    /// cache. Failed compilations count as a miss and are not stored.
    pub fn get_or_compile(
        &mut self,
        source: &str,
        flags: OptimizationFlags,
    ) -> Result<(Program, bool), InnerError> {
        let key = fingerprint(source, flags);

        if let Some(entry) = self.entries.get(&key).filter(|entry| entry.flags == flags) {
            self.hits += 1;
            tracing::debug!(hits = self.hits, "AST cache hit");
            return Ok((entry.program.clone(), true));
        }

        self.misses += 1;
        tracing::debug!(misses = self.misses, "AST cache miss");

        let program = compile(source, flags)?;
        self.insert(
            key,
            CacheEntry {
                program: program.clone(),
                flags,
            },
        );

        Ok((program, false))
    }

    fn insert(&mut self, key: Fingerprint, entry: CacheEntry) {
        if let Some(capacity) = self.options.capacity {
            if capacity == 0 {
                return;
            }

            while self.entries.len() >= capacity {
                match self.order.pop_front() {
                    Some(oldest) => {
                        self.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
        }

        if self.entries.insert(key, entry).is_none() {
            self.order.push_back(key);
        }
    }

    /// Drops every entry. Hit and miss counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            size: self.entries.len(),
        }
    }
}
