use std::sync::atomic::{AtomicU64, Ordering};

use ahash::RandomState;
use dashmap::DashMap;

/// Per-term counters kept by [`DocumentFrequency`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TermStats {
    /// documents containing the term at least once
    pub doc_count: u64,
    /// occurrences over the whole corpus
    pub total_count: u64,
}

/// keep document count and term statistics in a thread-safe way
///
/// Documents are added concurrently from the rayon pool, so the map is a
/// `DashMap` and the document counter an atomic.
#[derive(Debug, Default)]
pub struct DocumentFrequency {
    /// number of documents added
    doc_num: AtomicU64,
    // term statistics in corpus
    term_stats: DashMap<Box<str>, TermStats, RandomState>,
}

impl DocumentFrequency {
    /// Create a new instance
    pub fn new() -> Self {
        Self {
            doc_num: AtomicU64::new(0),
            term_stats: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Add one document given its distinct terms and their counts
    pub fn add_document<T>(&self, counts: impl IntoIterator<Item = (T, u64)>)
    where
        T: AsRef<str>,
    {
        self.doc_num.fetch_add(1, Ordering::Relaxed);
        for (term, count) in counts {
            self.term_stats
                .entry(term.as_ref().into())
                .and_modify(|stats| {
                    stats.doc_count += 1;
                    stats.total_count += count;
                })
                .or_insert(TermStats { doc_count: 1, total_count: count });
        }
    }

    /// Get the number of documents added
    pub fn doc_num(&self) -> u64 {
        self.doc_num.load(Ordering::Relaxed)
    }

    /// Get the document frequency of a term
    #[cfg(test)]
    pub fn doc_count(&self, term: &str) -> u64 {
        self.term_stats.get(term).map_or(0, |stats| stats.doc_count)
    }

    /// Get the current vocabulary size (number of unique terms)
    #[inline]
    pub fn vocab_size(&self) -> usize {
        self.term_stats.len()
    }

    /// Consume the counter into plain `(term, stats)` pairs
    pub fn into_stats(self) -> Vec<(Box<str>, TermStats)> {
        self.term_stats.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use rayon::prelude::*;

    use super::*;

    #[test]
    fn counts_documents_and_totals() {
        let df = DocumentFrequency::new();
        df.add_document([("rust", 2u64), ("fast", 1)]);
        df.add_document([("rust", 1u64)]);
        assert_eq!(df.doc_num(), 2);
        assert_eq!(df.doc_count("rust"), 2);
        assert_eq!(df.doc_count("fast"), 1);
        assert_eq!(df.doc_count("slow"), 0);
        assert_eq!(df.vocab_size(), 2);

        let mut stats = df.into_stats();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(stats[1].1, TermStats { doc_count: 2, total_count: 3 });
    }

    #[test]
    fn concurrent_adds_are_not_lost() {
        let df = DocumentFrequency::new();
        (0..1000).into_par_iter().for_each(|i| {
            df.add_document([("shared", 1u64), (if i % 2 == 0 { "even" } else { "odd" }, 1)]);
        });
        assert_eq!(df.doc_num(), 1000);
        assert_eq!(df.doc_count("shared"), 1000);
        assert_eq!(df.doc_count("even"), 500);
    }
}
