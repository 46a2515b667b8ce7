//! Compiled-expression cache.
//!
//! Compiling an expression (lexing, parsing, program construction) is far
//! more expensive than a hash lookup, and the same handful of condition
//! expressions gate many tuples. The cache is keyed by source string, so a
//! redefinition under the same name with a new expression naturally misses.

use std::sync::Arc;

use dashmap::DashMap;

use super::expression::ConditionExpression;
use super::ConditionError;

/// Thread-safe cache of compiled condition expressions.
///
/// Entries are `Arc`-wrapped; cloning out of the cache is cheap. The cache
/// is unbounded — condition corpora are small (well under the thousands) —
/// and can be dropped wholesale with [`ConditionExpressionCache::clear`]
/// when definitions are bulk-replaced.
#[derive(Debug, Default)]
pub struct ConditionExpressionCache {
    cache: DashMap<String, Arc<ConditionExpression>>,
}

impl ConditionExpressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the compiled form of `expression`, compiling on first use.
    ///
    /// Compile failures are not cached; a broken expression is re-reported
    /// on every evaluation attempt.
    pub fn get_or_parse(&self, expression: &str) -> Result<Arc<ConditionExpression>, ConditionError> {
        if let Some(cached) = self.cache.get(expression) {
            return Ok(Arc::clone(cached.value()));
        }
        let compiled = Arc::new(ConditionExpression::parse(expression)?);
        self.cache
            .insert(expression.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
