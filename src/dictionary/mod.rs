pub mod bow;
pub mod token;

use ahash::{AHashMap, AHashSet, RandomState};
use indexmap::IndexSet;
use tracing::{debug, info};

use crate::config::DictionaryConfig;
use crate::error::{Result, TopicError};
use crate::utils::size::HeapSize;
use crate::utils::sort::radix_sort_by_id;

use self::token::TokenizedCorpus;

/// One `(vocabulary id, count)` pair of a bag-of-words document
pub type BowEntry = (u32, u32);

/// Token <-> id mapping with document frequencies.
///
/// The id of a token is its position in `token2id`. Ids follow the first
/// occurrence of each token in the corpus and are compacted after filtering,
/// so they stay dense and keep their relative order.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    token2id: IndexSet<Box<str>, RandomState>,
    /// document frequency per id
    dfs: Vec<u64>,
    num_docs: u64,
    /// total tokens processed
    num_pos: u64,
    /// sum over documents of their distinct tokens
    num_nnz: u64,
}

impl Vocabulary {
    /// Build from the token corpus and prune by the frequency bounds.
    ///
    /// A token survives when `no_below <= df <= no_above * num_docs`; then at
    /// most `keep_n` tokens with the highest document frequency are kept.
    pub fn build(corpus: &TokenizedCorpus, config: &DictionaryConfig) -> Result<Self> {
        let mut vocab = Self::count(corpus);
        debug!(distinct = vocab.len(), docs = vocab.num_docs, "dictionary counted");
        vocab.filter_extremes(config);
        if vocab.is_empty() {
            return Err(TopicError::EmptyVocabulary { stage: "dictionary" });
        }
        info!(
            tokens = vocab.len(),
            docs = vocab.num_docs,
            no_below = config.no_below,
            no_above = config.no_above,
            "dictionary built"
        );
        Ok(vocab)
    }

    /// Unfiltered dictionary of every token
    fn count(corpus: &TokenizedCorpus) -> Self {
        let mut token2id: IndexSet<Box<str>, RandomState> = IndexSet::with_hasher(RandomState::new());
        let mut dfs: Vec<u64> = Vec::new();
        let mut num_pos = 0u64;
        let mut num_nnz = 0u64;
        let mut seen: AHashSet<usize> = AHashSet::new();

        for doc in corpus.iter() {
            seen.clear();
            num_pos += doc.len() as u64;
            for token in doc {
                let id = match token2id.get_index_of(token.as_str()) {
                    Some(id) => id,
                    None => {
                        token2id.insert(token.as_str().into());
                        dfs.push(0);
                        dfs.len() - 1
                    }
                };
                if seen.insert(id) {
                    dfs[id] += 1;
                }
            }
            num_nnz += seen.len() as u64;
        }

        Self {
            token2id,
            dfs,
            num_docs: corpus.len() as u64,
            num_pos,
            num_nnz,
        }
    }

    fn filter_extremes(&mut self, config: &DictionaryConfig) {
        // 整数に切り捨て
        let no_above_abs = (config.no_above * self.num_docs as f64) as u64;
        let no_below = config.no_below as u64;
        let mut good: Vec<usize> = (0..self.dfs.len())
            .filter(|&id| self.dfs[id] >= no_below && self.dfs[id] <= no_above_abs)
            .collect();

        if let Some(keep_n) = config.keep_n {
            if good.len() > keep_n {
                // stable, so equal frequencies keep the earlier id
                good.sort_by(|&a, &b| self.dfs[b].cmp(&self.dfs[a]));
                good.truncate(keep_n);
                good.sort_unstable();
            }
        }
        let removed = self.dfs.len() - good.len();

        let mut token2id = IndexSet::with_capacity_and_hasher(good.len(), RandomState::new());
        let mut dfs = Vec::with_capacity(good.len());
        for id in good {
            if let Some(token) = self.token2id.get_index(id) {
                token2id.insert(token.clone());
                dfs.push(self.dfs[id]);
            }
        }
        self.token2id = token2id;
        self.dfs = dfs;
        debug!(removed, kept = self.dfs.len(), "dictionary filtered");
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.token2id.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.token2id.is_empty()
    }

    pub fn id(&self, token: &str) -> Option<u32> {
        self.token2id.get_index_of(token).map(|id| id as u32)
    }

    pub fn token(&self, id: u32) -> Option<&str> {
        self.token2id.get_index(id as usize).map(|token| &**token)
    }

    /// Document frequency of an id
    pub fn doc_freq(&self, id: u32) -> Option<u64> {
        self.dfs.get(id as usize).copied()
    }

    pub fn num_docs(&self) -> u64 {
        self.num_docs
    }

    pub fn num_pos(&self) -> u64 {
        self.num_pos
    }

    pub fn num_nnz(&self) -> u64 {
        self.num_nnz
    }

    /// `(token, id)` pairs in id order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.token2id.iter().enumerate().map(|(id, token)| (&**token, id as u32))
    }

    /// Count the known tokens of a document, sorted by id.
    /// Unknown tokens are skipped.
    pub fn doc2bow<T: AsRef<str>>(&self, tokens: &[T]) -> Vec<BowEntry> {
        let mut counts: AHashMap<u32, u32> = AHashMap::new();
        for token in tokens {
            if let Some(id) = self.id(token.as_ref()) {
                *counts.entry(id).or_insert(0) += 1;
            }
        }
        let mut bow: Vec<BowEntry> = counts.into_iter().collect();
        radix_sort_by_id(&mut bow);
        bow
    }
}

impl HeapSize for Vocabulary {
    fn heap_bytes(&self) -> usize {
        self.token2id.iter().map(|k| k.len() + std::mem::size_of::<Box<str>>()).sum::<usize>()
            + self.dfs.capacity() * std::mem::size_of::<u64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(docs: &[&str]) -> TokenizedCorpus {
        TokenizedCorpus::from_tokens(
            docs.iter()
                .map(|d| d.split_whitespace().map(str::to_owned).collect())
                .collect(),
        )
    }

    fn sample() -> TokenizedCorpus {
        corpus(&[
            "apple banana apple",
            "banana cherry",
            "banana date",
            "cherry elder",
            "banana apple fig",
        ])
    }

    #[test]
    fn counts_document_frequency_not_occurrences() {
        let vocab = Vocabulary::build(&sample(), &DictionaryConfig::new(1, 1.0)).unwrap();
        assert_eq!(vocab.len(), 6);
        let apple = vocab.id("apple").unwrap();
        assert_eq!(vocab.doc_freq(apple), Some(2));
        assert_eq!(vocab.num_docs(), 5);
        assert_eq!(vocab.num_pos(), 12);
        assert_eq!(vocab.num_nnz(), 11);
    }

    #[test]
    fn ids_follow_first_occurrence_and_stay_dense() {
        let vocab = Vocabulary::build(&sample(), &DictionaryConfig::new(2, 1.0)).unwrap();
        let tokens: Vec<&str> = vocab.iter().map(|(t, _)| t).collect();
        assert_eq!(tokens, vec!["apple", "banana", "cherry"]);
        assert_eq!(vocab.id("cherry"), Some(2));
        assert_eq!(vocab.token(1), Some("banana"));
        assert_eq!(vocab.token(3), None);
    }

    #[test]
    fn no_above_drops_common_tokens() {
        // banana is in 4 of 5 documents, limit is int(0.6 * 5) = 3
        let vocab = Vocabulary::build(&sample(), &DictionaryConfig::new(1, 0.6)).unwrap();
        assert_eq!(vocab.id("banana"), None);
        assert!(vocab.id("apple").is_some());
    }

    #[test]
    fn keep_n_prefers_frequent_tokens() {
        let config = DictionaryConfig { no_below: 1, no_above: 1.0, keep_n: Some(2) };
        let vocab = Vocabulary::build(&sample(), &config).unwrap();
        let tokens: Vec<&str> = vocab.iter().map(|(t, _)| t).collect();
        // banana (4), then apple and cherry tie at 2; apple was seen first
        assert_eq!(tokens, vec!["apple", "banana"]);
    }

    #[test]
    fn tightening_bounds_never_grows_the_vocabulary() {
        let corpus = sample();
        let mut previous = usize::MAX;
        for no_below in 1..=4 {
            let size = Vocabulary::build(&corpus, &DictionaryConfig::new(no_below, 1.0))
                .map(|v| v.len())
                .unwrap_or(0);
            assert!(size <= previous);
            previous = size;
        }
        let mut previous = usize::MAX;
        for no_above in [1.0, 0.8, 0.6, 0.4, 0.2] {
            let size = Vocabulary::build(&corpus, &DictionaryConfig::new(1, no_above))
                .map(|v| v.len())
                .unwrap_or(0);
            assert!(size <= previous);
            previous = size;
        }
    }

    #[test]
    fn identical_single_word_documents_give_one_token() {
        let vocab = Vocabulary::build(&corpus(&["x", "x", "x"]), &DictionaryConfig::new(1, 1.0)).unwrap();
        assert_eq!(vocab.len(), 1);
        assert_eq!(vocab.token(0), Some("x"));
    }

    #[test]
    fn everything_filtered_is_empty_vocabulary() {
        let err = Vocabulary::build(&sample(), &DictionaryConfig::new(10, 1.0)).unwrap_err();
        assert!(matches!(err, TopicError::EmptyVocabulary { stage: "dictionary" }));
    }

    #[test]
    fn doc2bow_is_sorted_and_skips_unknown_tokens() {
        let vocab = Vocabulary::build(&sample(), &DictionaryConfig::new(2, 1.0)).unwrap();
        let bow = vocab.doc2bow(&["cherry", "apple", "zebra", "apple", "banana"]);
        assert_eq!(bow, vec![(0, 2), (1, 1), (2, 1)]);
    }
}
