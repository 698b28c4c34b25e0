/// This crate discovers topics in a large text corpus with two independent
/// models, NMF over a TF-IDF matrix and LDA trained by parallel workers,
/// while keeping at most one generation of large structures in memory.
pub mod config;
pub mod dictionary;
pub mod error;
pub mod lda;
pub mod loader;
pub mod nmf;
pub mod pipeline;
pub mod report;
pub mod utils;
pub mod vectorizer;

/// Pipeline Error
/// One enum for every stage. `TopicError::stage()` names the stage that
/// failed (`loader`, `vectorizer`, `nmf`, `dictionary`, `lda`, `report`,
/// `config`), which is what the binary reports on exit.
pub use error::{Result, TopicError};

/// Run Configuration
/// `PipelineConfig` aggregates the settings of every stage. Defaults
/// reproduce the reference run (60% sample, K = 5, 4 workers, 10 passes,
/// chunks of 2000 documents).
///
/// `Cli` is the `clap` surface of the same settings; every flag can also be
/// read from a `TOPICS_*` environment variable.
pub use config::{Cli, DictionaryConfig, LdaConfig, NmfConfig, PipelineConfig, SamplingConfig, VectorizerConfig};

/// Document Set
/// The filtered, sampled corpus text. Loaded once per run from JSON Lines,
/// JSON or CBOR records carrying a `clean_text` field.
///
/// # Ownership
/// The NMF branch only borrows it. The LDA branch takes it by value and
/// tokenizing consumes it.
pub use loader::{load_documents, read_documents, DocumentSet};

/// TF-IDF Vectorizer
/// Converts a `DocumentSet` into an L2-normalized sparse weighted term
/// matrix (`sprs` CSR) and its column vocabulary.
///
/// `TfidfVectorizer<E>` has one generic parameter:
/// - `E`: TF-IDF calculation engine type (e.g., `DefaultTfidfEngine`)
pub use vectorizer::{TermVocabulary, TfidfVectorizer, WeightedTermMatrix};

/// TF-IDF Engine
/// Supplies idf and row normalization to the vectorizer. Replace it to
/// change the weighting scheme.
pub use vectorizer::tfidf::{DefaultTfidfEngine, TfidfEngine};

/// Factorization Engine (NMF)
/// Multiplicative-update NMF. `Nmf::fit` returns `TopicFactors` whose
/// entries are never negative.
pub use nmf::{Nmf, TopicFactors};

/// Tokenizer, Vocabulary and Bag-of-Words Corpus
/// `tokenize` consumes the `DocumentSet`, `Vocabulary::build` applies the
/// `no_below` / `no_above` bounds, and `BagOfWordsCorpus::build` consumes
/// the `TokenizedCorpus`.
pub use dictionary::{bow::BagOfWordsCorpus, token::tokenize, token::TokenizedCorpus, BowEntry, Vocabulary};

/// Parallel LDA Trainer
/// Batch variational Bayes over chunks of the bag-of-words corpus. Chunks
/// are processed by worker threads fed over channels; each pass ends at a
/// barrier where the chunk statistics are summed before the topics change.
///
/// `LdaTrainer<E>` has one generic parameter:
/// - `E`: per-chunk inference step (e.g., `VariationalEngine`)
pub use lda::{LdaModel, LdaTrainer};

/// Inference Engine
/// The expectation step run by the workers.
pub use lda::engine::{ChunkStats, InferenceEngine, VariationalEngine};

/// Result Reporter
/// `TopicSummary` holds the ranked terms of one model and renders the
/// `Thema i: ...` lines. `Reporter` owns the append-only artifact.
pub use report::{ModelKind, Reporter, TopicSummary, TopicTerm};

/// Pipeline
/// `run` executes the whole staged run and returns both summaries.
pub use pipeline::{run, PipelineOutcome};
