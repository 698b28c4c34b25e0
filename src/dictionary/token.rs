use rayon::prelude::*;

use crate::loader::DocumentSet;
use crate::utils::size::HeapSize;

/// Whitespace tokens of every document, in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenizedCorpus {
    docs: Vec<Vec<String>>,
}

impl TokenizedCorpus {
    pub fn from_tokens(docs: Vec<Vec<String>>) -> Self {
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

    pub fn iter(&self) -> impl Iterator<Item = &[String]> {
        self.docs.iter().map(Vec::as_slice)
    }

    pub fn get(&self, doc: usize) -> Option<&[String]> {
        self.docs.get(doc).map(Vec::as_slice)
    }

    /// total number of tokens
    pub fn num_pos(&self) -> usize {
        self.docs.iter().map(Vec::len).sum()
    }

    /// Hand the token lists over; the corpus is gone afterwards
    pub fn into_inner(self) -> Vec<Vec<String>> {
        self.docs
    }
}

impl HeapSize for TokenizedCorpus {
    fn heap_bytes(&self) -> usize {
        self.docs.heap_bytes()
    }
}

/// Split every document on whitespace.
///
/// Takes the `DocumentSet` by value: each text is released as soon as its
/// tokens exist, and the set itself is gone when this returns.
pub fn tokenize(docs: DocumentSet) -> TokenizedCorpus {
    let docs = docs
        .into_inner()
        .into_par_iter()
        .map(|text| text.split_whitespace().map(str::to_owned).collect())
        .collect();
    TokenizedCorpus { docs }
}
