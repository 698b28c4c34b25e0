//! Run configuration, fixed at process start.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TopicError};

/// Down-sampling of the loaded corpus
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Fraction of non-empty documents to keep, in (0, 1]
    pub fraction: f64,
    pub seed: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self { fraction: 0.60, seed: 42 }
    }
}

/// Bounds of the TF-IDF vectorizer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VectorizerConfig {
    /// Terms in more than this fraction of documents are dropped
    pub max_df: f64,
    /// Terms in fewer than this many documents are dropped
    pub min_df: usize,
    /// Upper bound on matrix columns
    pub max_features: usize,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self { max_df: 0.95, min_df: 2, max_features: 5000 }
    }
}

impl VectorizerConfig {
    pub fn max_df(mut self, max_df: f64) -> Self {
        self.max_df = max_df;
        self
    }

    pub fn min_df(mut self, min_df: usize) -> Self {
        self.min_df = min_df;
        self
    }

    pub fn max_features(mut self, max_features: usize) -> Self {
        self.max_features = max_features;
        self
    }
}

/// Multiplicative-update NMF settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NmfConfig {
    pub num_topics: usize,
    pub max_iter: usize,
    /// Relative error improvement below which iteration stops early
    pub tol: f64,
    /// Used for initialization only
    pub seed: u64,
}

impl Default for NmfConfig {
    fn default() -> Self {
        Self { num_topics: 5, max_iter: 500, tol: 1e-4, seed: 42 }
    }
}

impl NmfConfig {
    pub fn new(num_topics: usize) -> Self {
        Self { num_topics, ..Default::default() }
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Frequency bounds of the id-mapped dictionary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DictionaryConfig {
    /// Minimum document count
    pub no_below: usize,
    /// Maximum document-frequency fraction
    pub no_above: f64,
    /// Keep at most this many tokens after the bound filter
    pub keep_n: Option<usize>,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        Self { no_below: 3, no_above: 0.5, keep_n: Some(100_000) }
    }
}

impl DictionaryConfig {
    pub fn new(no_below: usize, no_above: f64) -> Self {
        Self { no_below, no_above, keep_n: None }
    }
}

/// Parallel LDA trainer settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LdaConfig {
    pub num_topics: usize,
    /// Requested worker count, clamped to the available parallelism
    pub workers: usize,
    pub passes: usize,
    /// Documents per chunk
    pub chunk_size: usize,
    /// Max variational updates per document
    pub iterations: usize,
    /// Mean absolute gamma change treated as converged
    pub gamma_threshold: f64,
    pub seed: u64,
}

impl Default for LdaConfig {
    fn default() -> Self {
        Self {
            num_topics: 5,
            workers: 4,
            passes: 10,
            chunk_size: 2000,
            iterations: 50,
            gamma_threshold: 0.001,
            seed: 42,
        }
    }
}

impl LdaConfig {
    pub fn new(num_topics: usize) -> Self {
        Self { num_topics, ..Default::default() }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn passes(mut self, passes: usize) -> Self {
        self.passes = passes;
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Everything one run needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub sampling: SamplingConfig,
    pub vectorizer: VectorizerConfig,
    pub nmf: NmfConfig,
    pub dictionary: DictionaryConfig,
    pub lda: LdaConfig,
    /// Terms reported per topic
    pub top_n: usize,
    /// Render LDA topics as `0.052*term`
    pub lda_weights: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("data/corpus_cleaned.jsonl"),
            output: PathBuf::from("data/topics_output.txt"),
            sampling: SamplingConfig::default(),
            vectorizer: VectorizerConfig::default(),
            nmf: NmfConfig::default(),
            dictionary: DictionaryConfig::default(),
            lda: LdaConfig::default(),
            top_n: 10,
            lda_weights: false,
        }
    }
}

impl PipelineConfig {
    /// Reject values no stage can work with
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(TopicError::InvalidConfig(msg));
        let f = self.sampling.fraction;
        if !(f > 0.0 && f <= 1.0) {
            return invalid(format!("sample fraction must be in (0, 1], got {f}"));
        }
        if self.nmf.num_topics == 0 || self.lda.num_topics == 0 {
            return invalid("topic count must be positive".into());
        }
        if self.lda.workers == 0 {
            return invalid("worker count must be positive".into());
        }
        if self.lda.passes == 0 {
            return invalid("pass count must be positive".into());
        }
        if self.lda.chunk_size == 0 {
            return invalid("chunk size must be positive".into());
        }
        if self.lda.iterations == 0 {
            return invalid("inference iterations must be positive".into());
        }
        if self.top_n == 0 {
            return invalid("top-n must be positive".into());
        }
        let max_df = self.vectorizer.max_df;
        if !(max_df > 0.0 && max_df <= 1.0) {
            return invalid(format!("max_df must be in (0, 1], got {max_df}"));
        }
        if self.vectorizer.max_features == 0 {
            return invalid("max_features must be positive".into());
        }
        let no_above = self.dictionary.no_above;
        if !(no_above > 0.0 && no_above <= 1.0) {
            return invalid(format!("no_above must be in (0, 1], got {no_above}"));
        }
        Ok(())
    }
}

/// Command-line surface; every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "topic-discovery", version, about = "Discover topics with NMF and multi-worker LDA")]
pub struct Cli {
    /// Serialized corpus (.jsonl, .json or .cbor records with a `clean_text` field)
    #[arg(long, env = "TOPICS_INPUT", default_value = "data/corpus_cleaned.jsonl")]
    pub input: PathBuf,

    /// Report artifact, truncated once at startup
    #[arg(long, env = "TOPICS_OUTPUT", default_value = "data/topics_output.txt")]
    pub output: PathBuf,

    /// Sampling rate (0.60 = 60% of the documents)
    #[arg(long, env = "TOPICS_SAMPLE_FRAC", default_value_t = 0.60)]
    pub sample_frac: f64,

    /// Topic count K used by both models
    #[arg(long, env = "TOPICS_NUM_TOPICS", default_value_t = 5)]
    pub num_topics: usize,

    /// LDA worker count
    #[arg(long, env = "TOPICS_WORKERS", default_value_t = 4)]
    pub workers: usize,

    /// Full LDA passes over the corpus
    #[arg(long, env = "TOPICS_PASSES", default_value_t = 10)]
    pub passes: usize,

    /// Documents per LDA chunk
    #[arg(long, env = "TOPICS_CHUNK_SIZE", default_value_t = 2000)]
    pub chunk_size: usize,

    /// Random seed for sampling, NMF init and LDA
    #[arg(long, env = "TOPICS_SEED", default_value_t = 42)]
    pub seed: u64,

    /// TF-IDF: drop terms in more than this fraction of documents
    #[arg(long, env = "TOPICS_MAX_DF", default_value_t = 0.95)]
    pub max_df: f64,

    /// TF-IDF: drop terms in fewer than this many documents
    #[arg(long, env = "TOPICS_MIN_DF", default_value_t = 2)]
    pub min_df: usize,

    /// TF-IDF: maximum vocabulary size
    #[arg(long, env = "TOPICS_MAX_FEATURES", default_value_t = 5000)]
    pub max_features: usize,

    /// NMF iteration budget
    #[arg(long, env = "TOPICS_NMF_MAX_ITER", default_value_t = 500)]
    pub nmf_max_iter: usize,

    /// Dictionary: minimum document count
    #[arg(long, env = "TOPICS_NO_BELOW", default_value_t = 3)]
    pub no_below: usize,

    /// Dictionary: maximum document-frequency fraction
    #[arg(long, env = "TOPICS_NO_ABOVE", default_value_t = 0.5)]
    pub no_above: f64,

    /// Terms reported per topic
    #[arg(long, env = "TOPICS_TOP_N", default_value_t = 10)]
    pub top_n: usize,

    /// Print LDA topics with their probabilities
    #[arg(long, env = "TOPICS_LDA_WEIGHTS", default_value_t = false)]
    pub lda_weights: bool,

    /// Log filter (overridden by RUST_LOG)
    #[arg(long, env = "TOPICS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Converts the parsed CLI into a `PipelineConfig`.
    pub fn build_config(&self) -> PipelineConfig {
        let defaults = PipelineConfig::default();
        PipelineConfig {
            input: self.input.clone(),
            output: self.output.clone(),
            sampling: SamplingConfig { fraction: self.sample_frac, seed: self.seed },
            vectorizer: VectorizerConfig {
                max_df: self.max_df,
                min_df: self.min_df,
                max_features: self.max_features,
            },
            nmf: NmfConfig {
                num_topics: self.num_topics,
                max_iter: self.nmf_max_iter,
                seed: self.seed,
                ..defaults.nmf
            },
            dictionary: DictionaryConfig {
                no_below: self.no_below,
                no_above: self.no_above,
                ..defaults.dictionary
            },
            lda: LdaConfig {
                num_topics: self.num_topics,
                workers: self.workers,
                passes: self.passes,
                chunk_size: self.chunk_size,
                seed: self.seed,
                ..defaults.lda
            },
            top_n: self.top_n,
            lda_weights: self.lda_weights,
        }
    }
}
