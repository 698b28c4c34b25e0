pub mod analyzer;
pub mod corpus;
pub mod tfidf;

use std::marker::PhantomData;

use ahash::AHashMap;
use rayon::prelude::*;
use sprs::CsMat;
use tracing::{debug, info};

use crate::config::VectorizerConfig;
use crate::error::{Result, TopicError};
use crate::loader::DocumentSet;
use crate::utils::size::HeapSize;
use crate::vectorizer::{
    analyzer::TermAnalyzer,
    corpus::{DocumentFrequency, TermStats},
    tfidf::{DefaultTfidfEngine, TfidfEngine},
};

/// Column id -> surface term of a [`WeightedTermMatrix`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermVocabulary {
    terms: Vec<Box<str>>,
}

impl TermVocabulary {
    #[inline]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn term(&self, column: usize) -> Option<&str> {
        self.terms.get(column).map(|t| &**t)
    }

    pub fn terms(&self) -> &[Box<str>] {
        &self.terms
    }
}

impl HeapSize for TermVocabulary {
    fn heap_bytes(&self) -> usize {
        self.terms.heap_bytes()
    }
}

/// Sparse documents x terms matrix of non-negative TF-IDF weights (CSR).
/// Rows align with the `DocumentSet` it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedTermMatrix {
    matrix: CsMat<f64>,
}

impl WeightedTermMatrix {
    /// Wrap an existing CSR matrix, e.g. for tests
    pub fn from_csr(matrix: CsMat<f64>) -> Self {
        debug_assert!(matrix.is_csr());
        Self { matrix }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.matrix.rows()
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.matrix.cols()
    }

    #[inline]
    pub fn nnz(&self) -> usize {
        self.matrix.nnz()
    }

    pub fn csr(&self) -> &CsMat<f64> {
        &self.matrix
    }

    /// `(column, weight)` entries of one document row
    pub fn row(&self, doc: usize) -> Vec<(usize, f64)> {
        self.matrix
            .outer_view(doc)
            .map(|row| row.iter().map(|(col, &w)| (col, w)).collect())
            .unwrap_or_default()
    }
}

impl HeapSize for WeightedTermMatrix {
    fn heap_bytes(&self) -> usize {
        let nnz = self.matrix.nnz();
        nnz * (std::mem::size_of::<usize>() + std::mem::size_of::<f64>())
            + (self.matrix.rows() + 1) * std::mem::size_of::<usize>()
    }
}

/// TF-IDF vectorizer for the factorization branch.
///
/// Fitting makes two passes over the documents: the first only counts
/// document frequencies, the second builds the weighted rows for the
/// surviving terms. No per-document count table is held between the passes.
#[derive(Debug, Clone)]
pub struct TfidfVectorizer<E = DefaultTfidfEngine>
where
    E: TfidfEngine,
{
    config: VectorizerConfig,
    analyzer: TermAnalyzer,
    _marker: PhantomData<E>,
}

impl TfidfVectorizer<DefaultTfidfEngine> {
    pub fn new(config: VectorizerConfig) -> Result<Self> {
        Self::with_engine(config)
    }
}

impl<E> TfidfVectorizer<E>
where
    E: TfidfEngine + Send + Sync,
{
    pub fn with_engine(config: VectorizerConfig) -> Result<Self> {
        Ok(Self {
            config,
            analyzer: TermAnalyzer::new()?,
            _marker: PhantomData,
        })
    }

    /// Build the weighted matrix and its vocabulary
    pub fn fit_transform(&self, docs: &DocumentSet) -> Result<(WeightedTermMatrix, TermVocabulary)> {
        let frequency = DocumentFrequency::new();
        docs.as_slice().par_iter().for_each(|doc| {
            frequency.add_document(self.analyzer.term_counts(doc));
        });
        let doc_num = frequency.doc_num();
        debug!(docs = doc_num, distinct = frequency.vocab_size(), "document frequencies counted");

        let selected = self.select_terms(frequency.into_stats(), doc_num);
        if selected.is_empty() {
            return Err(TopicError::EmptyVocabulary { stage: "vectorizer" });
        }

        let idf: Vec<f64> = selected.iter().map(|(_, stats)| E::idf(doc_num, stats.doc_count)).collect();
        let vocabulary = TermVocabulary {
            terms: selected.into_iter().map(|(term, _)| term).collect(),
        };
        let column_of: AHashMap<&str, usize> = vocabulary
            .terms
            .iter()
            .enumerate()
            .map(|(col, term)| (&**term, col))
            .collect();

        let rows: Vec<Vec<(usize, f64)>> = docs
            .as_slice()
            .par_iter()
            .map(|doc| {
                let mut row: Vec<(usize, f64)> = self
                    .analyzer
                    .term_counts(doc)
                    .into_iter()
                    .filter_map(|(term, count)| {
                        column_of.get(term.as_str()).map(|&col| (col, count as f64 * idf[col]))
                    })
                    .collect();
                row.sort_unstable_by_key(|&(col, _)| col);
                E::normalize(&mut row);
                row
            })
            .collect();

        let matrix = assemble_csr(rows, vocabulary.len());
        info!(
            documents = matrix.rows(),
            terms = matrix.cols(),
            nnz = matrix.nnz(),
            "tf-idf matrix built"
        );
        Ok((matrix, vocabulary))
    }

    /// Apply the document-frequency bounds, then the vocabulary cap.
    /// Returned terms are in lexicographic order.
    fn select_terms(&self, stats: Vec<(Box<str>, TermStats)>, doc_num: u64) -> Vec<(Box<str>, TermStats)> {
        let max_doc_count = self.config.max_df * doc_num as f64;
        let min_doc_count = self.config.min_df as u64;
        let mut kept: Vec<(Box<str>, TermStats)> = stats
            .into_iter()
            .filter(|(_, s)| s.doc_count as f64 <= max_doc_count && s.doc_count >= min_doc_count)
            .collect();

        if kept.len() > self.config.max_features {
            kept.sort_unstable_by(|a, b| {
                b.1.total_count.cmp(&a.1.total_count).then_with(|| a.0.cmp(&b.0))
            });
            kept.truncate(self.config.max_features);
        }
        kept.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        kept
    }
}

fn assemble_csr(rows: Vec<Vec<(usize, f64)>>, cols: usize) -> WeightedTermMatrix {
    let nnz = rows.iter().map(Vec::len).sum();
    let mut indptr = Vec::with_capacity(rows.len() + 1);
    let mut indices = Vec::with_capacity(nnz);
    let mut data = Vec::with_capacity(nnz);
    indptr.push(0);
    let n_rows = rows.len();
    for row in rows {
        for (col, weight) in row {
            indices.push(col);
            data.push(weight);
        }
        indptr.push(indices.len());
    }
    // rows are sorted and in range, so the structure is valid
    WeightedTermMatrix {
        matrix: CsMat::new((n_rows, cols), indptr, indices, data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs() -> DocumentSet {
        DocumentSet::from_texts([
            "rust safe fast",
            "rust fast fast",
            "python slow",
            "rust python",
            "everywhere rust python fast safe slow everywhere",
        ])
    }

    fn vectorizer(max_df: f64, min_df: usize, max_features: usize) -> TfidfVectorizer {
        TfidfVectorizer::new(VectorizerConfig { max_df, min_df, max_features }).unwrap()
    }

    #[test]
    fn vocabulary_is_sorted_and_bounded_by_document_frequency() {
        // rust is in 4/5 documents (0.8 > 0.75), everywhere only in 1
        let (matrix, vocab) = vectorizer(0.75, 2, 100).fit_transform(&docs()).unwrap();
        let terms: Vec<&str> = vocab.terms().iter().map(|t| &**t).collect();
        assert_eq!(terms, vec!["fast", "python", "safe", "slow"]);
        assert_eq!(matrix.rows(), 5);
        assert_eq!(matrix.cols(), 4);
    }

    #[test]
    fn max_features_keeps_most_frequent_terms() {
        let (_, vocab) = vectorizer(1.0, 1, 2).fit_transform(&docs()).unwrap();
        // fast: 4 occurrences, rust: 4 occurrences; both beat the rest
        let terms: Vec<&str> = vocab.terms().iter().map(|t| &**t).collect();
        assert_eq!(terms, vec!["fast", "rust"]);
    }

    #[test]
    fn rows_are_l2_normalized_and_non_negative() {
        let (matrix, _) = vectorizer(1.0, 1, 100).fit_transform(&docs()).unwrap();
        for doc in 0..matrix.rows() {
            let entries = matrix.row(doc);
            assert!(entries.iter().all(|&(_, w)| w >= 0.0));
            let norm: f64 = entries.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-9, "row {doc} norm {norm}");
        }
    }

    #[test]
    fn repeated_terms_weigh_more() {
        let (matrix, vocab) = vectorizer(1.0, 1, 100).fit_transform(&docs()).unwrap();
        let fast = vocab.terms().iter().position(|t| &**t == "fast").unwrap();
        let rust = vocab.terms().iter().position(|t| &**t == "rust").unwrap();
        let row: AHashMap<usize, f64> = matrix.row(1).into_iter().collect();
        assert!(row[&fast] > row[&rust]);
    }

    #[test]
    fn nothing_surviving_is_empty_vocabulary() {
        let err = vectorizer(1.0, 10, 100).fit_transform(&docs()).unwrap_err();
        assert!(matches!(err, TopicError::EmptyVocabulary { stage: "vectorizer" }));
    }
}
