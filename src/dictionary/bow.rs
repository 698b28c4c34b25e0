use rayon::prelude::*;
use tracing::debug;

use crate::dictionary::{token::TokenizedCorpus, BowEntry, Vocabulary};
use crate::utils::size::HeapSize;

// 1エントリ8bytes, id と count の u32 ペア
#[allow(dead_code)]
const BOW_ENTRY_SIZE: usize = core::mem::size_of::<BowEntry>();
static_assertions::const_assert!(BOW_ENTRY_SIZE == 8);

/// Integer corpus: one sorted `(id, count)` list per document, in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BagOfWordsCorpus {
    docs: Vec<Vec<BowEntry>>,
}

impl BagOfWordsCorpus {
    /// Convert every token sequence through `vocabulary`.
    ///
    /// Takes the `TokenizedCorpus` by value; token strings are released
    /// document by document and none survive the call.
    pub fn build(tokens: TokenizedCorpus, vocabulary: &Vocabulary) -> Self {
        let docs: Vec<Vec<BowEntry>> = tokens
            .into_inner()
            .into_par_iter()
            .map(|doc| vocabulary.doc2bow(doc.as_slice()))
            .collect();
        let corpus = Self { docs };
        debug!(docs = corpus.len(), nnz = corpus.num_nnz(), "bag-of-words corpus built");
        corpus
    }

    pub fn from_docs(docs: Vec<Vec<BowEntry>>) -> Self {
        Self { docs }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn docs(&self) -> &[Vec<BowEntry>] {
        &self.docs
    }

    pub fn get(&self, doc: usize) -> Option<&[BowEntry]> {
        self.docs.get(doc).map(Vec::as_slice)
    }

    /// stored `(id, count)` pairs
    pub fn num_nnz(&self) -> usize {
        self.docs.iter().map(Vec::len).sum()
    }

    /// total token count
    pub fn num_tokens(&self) -> u64 {
        self.docs.iter().flatten().map(|&(_, count)| count as u64).sum()
    }
}

impl HeapSize for BagOfWordsCorpus {
    fn heap_bytes(&self) -> usize {
        self.docs.heap_bytes()
    }
}

#[cfg(test)]
mod tests {
    use ahash::AHashMap;

    use super::*;
    use crate::config::DictionaryConfig;

    fn tokens(docs: &[&str]) -> TokenizedCorpus {
        TokenizedCorpus::from_tokens(
            docs.iter()
                .map(|d| d.split_whitespace().map(str::to_owned).collect())
                .collect(),
        )
    }

    #[test]
    fn counts_match_direct_token_counts() {
        let docs = ["a b a c a", "b b d", "c a d d", "e"];
        let corpus = tokens(&docs);
        let vocab = Vocabulary::build(&corpus, &DictionaryConfig::new(2, 1.0)).unwrap();
        let bow = BagOfWordsCorpus::build(corpus, &vocab);
        assert_eq!(bow.len(), docs.len());

        for (doc, text) in docs.iter().enumerate() {
            let mut decoded: AHashMap<u32, u32> = AHashMap::new();
            for &(id, count) in bow.get(doc).unwrap() {
                *decoded.entry(id).or_insert(0) += count;
            }
            for (&id, &count) in &decoded {
                let token = vocab.token(id).unwrap();
                let direct = text.split_whitespace().filter(|t| *t == token).count() as u32;
                assert_eq!(count, direct, "doc {doc} token {token}");
            }
        }
        // "e" only appears once and was filtered, so the last document is empty
        assert!(bow.get(3).unwrap().is_empty());
    }

    #[test]
    fn entries_are_sorted_by_id() {
        let corpus = tokens(&["z y x w", "w x y z"]);
        let vocab = Vocabulary::build(&corpus, &DictionaryConfig::new(1, 1.0)).unwrap();
        let bow = BagOfWordsCorpus::build(corpus, &vocab);
        for doc in bow.docs() {
            assert!(doc.windows(2).all(|w| w[0].0 < w[1].0));
        }
        assert_eq!(bow.num_tokens(), 8);
        assert_eq!(bow.num_nnz(), 8);
    }
}
