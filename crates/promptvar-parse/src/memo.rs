//! Memoized parsing keyed by exact template text.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use promptvar_core::TemplateParseResult;

use crate::parser::{ParserOptions, TemplateParser};

/// Default number of memoized templates.
pub const DEFAULT_MEMO_CAPACITY: usize = 256;

/// A parser that remembers results for recently parsed templates.
///
/// Parsing is pure, so a result keyed by the exact template text (the options
/// are fixed per instance) can be shared freely.
#[derive(Debug)]
pub struct CachedParser {
    parser: TemplateParser,
    capacity: usize,
    entries: Mutex<IndexMap<String, Arc<TemplateParseResult>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedParser {
    /// Create a lenient cached parser with the default capacity.
    pub fn new() -> Self {
        Self::with_options(ParserOptions::default(), DEFAULT_MEMO_CAPACITY)
    }

    /// Create a cached parser with explicit options and capacity.
    pub fn with_options(options: ParserOptions, capacity: usize) -> Self {
        Self {
            parser: TemplateParser::with_options(options),
            capacity: capacity.max(1),
            entries: Mutex::new(IndexMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Parse `text`, reusing a memoized result when available.
    pub fn parse(&self, text: &str) -> Arc<TemplateParseResult> {
        {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(index) = entries.get_index_of(text) {
                let last = entries.len() - 1;
                entries.move_index(index, last);
                self.hits.fetch_add(1, Ordering::Relaxed);
                if let Some((_, result)) = entries.get_index(last) {
                    return Arc::clone(result);
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let result = Arc::new(self.parser.parse(text));

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(text.to_string(), Arc::clone(&result));
        while entries.len() > self.capacity {
            entries.shift_remove_index(0);
        }

        result
    }

    /// The underlying uncached parser.
    pub fn parser(&self) -> &TemplateParser {
        &self.parser
    }

    /// Number of memoized templates.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Check if nothing is memoized.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Memo hits and misses so far.
    pub fn counters(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    /// Forget every memoized result.
    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Default for CachedParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memo_returns_shared_result() {
        let parser = CachedParser::new();
        let first = parser.parse("{{a}}");
        let second = parser.parse("{{a}}");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(parser.counters(), (1, 1));
    }

    #[test]
    fn test_memo_evicts_least_recent() {
        let parser = CachedParser::with_options(ParserOptions::default(), 2);
        let a = parser.parse("{{a}}");
        parser.parse("{{b}}");
        // Touch "a" so "b" becomes the oldest.
        parser.parse("{{a}}");
        parser.parse("{{c}}");

        assert_eq!(parser.len(), 2);
        assert!(Arc::ptr_eq(&a, &parser.parse("{{a}}")));
        let (_, misses) = parser.counters();
        parser.parse("{{b}}");
        assert_eq!(parser.counters().1, misses + 1);
    }
}
