//! Staged run: load once, then an NMF branch and an LDA branch that never
//! hold their large structures at the same time.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::config::PipelineConfig;
use crate::dictionary::{bow::BagOfWordsCorpus, token::tokenize, Vocabulary};
use crate::error::Result;
use crate::lda::LdaTrainer;
use crate::loader::{load_documents, DocumentSet};
use crate::nmf::Nmf;
use crate::report::{Reporter, TopicSummary};
use crate::utils::size::{format_bytes, HeapSize};
use crate::vectorizer::TfidfVectorizer;

/// What a successful run produced
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub nmf: TopicSummary,
    pub lda: TopicSummary,
    /// documents after sampling
    pub documents: usize,
    /// wall clock of the whole LDA train call
    pub lda_duration: Duration,
    pub total_duration: Duration,
    pub report: PathBuf,
}

/// Run both branches and write the report.
///
/// The artifact is truncated once at the start. Topic sections are only
/// written once both models exist; on failure the run stops at the failing
/// stage and the artifact is marked aborted, never finished.
pub fn run(config: &PipelineConfig) -> Result<PipelineOutcome> {
    config.validate()?;
    let started = Instant::now();
    let reporter = Reporter::reset(&config.output, config.sampling.fraction)?;
    info!(report = %reporter.path().display(), "report reset");

    match run_stages(config, &reporter, started) {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            error!(stage = err.stage(), %err, "run failed");
            // the abort marker is best effort, the stage error wins
            if let Err(report_err) = reporter.abort(&err) {
                error!(%report_err, "could not mark report as aborted");
            }
            Err(err)
        }
    }
}

fn run_stages(config: &PipelineConfig, reporter: &Reporter, started: Instant) -> Result<PipelineOutcome> {
    let docs = load_documents(&config.input, &config.sampling)?;
    let documents = docs.len();

    // only the small summary is held across the LDA branch
    let nmf = nmf_branch(&docs, config)?;

    // the document set moves into the LDA branch and is gone after tokenizing
    let (lda, lda_duration) = lda_branch(docs, config)?;

    // both sections or none
    reporter.append(&nmf)?;
    reporter.append(&lda)?;

    let total_duration = started.elapsed();
    reporter.finish(total_duration.as_secs_f64() / 60.0)?;
    info!(
        minutes = total_duration.as_secs_f64() / 60.0,
        lda_seconds = lda_duration.as_secs_f64(),
        "run complete"
    );

    Ok(PipelineOutcome {
        nmf,
        lda,
        documents,
        lda_duration,
        total_duration,
        report: reporter.path().to_path_buf(),
    })
}

/// Vectorize, factorize and summarize. Matrix and factors are released
/// before returning; only the summary survives.
pub fn nmf_branch(docs: &DocumentSet, config: &PipelineConfig) -> Result<TopicSummary> {
    info!("NMF branch started");
    let vectorizer = TfidfVectorizer::new(config.vectorizer)?;
    let (matrix, vocabulary) = vectorizer.fit_transform(docs)?;
    info!(
        rows = matrix.rows(),
        cols = matrix.cols(),
        nnz = matrix.nnz(),
        resident = %format_bytes(matrix.heap_bytes()),
        "term matrix built"
    );

    let factors = Nmf::new(config.nmf)?.fit(&matrix);
    let matrix_bytes = matrix.heap_bytes();
    drop(matrix);
    info!(released = %format_bytes(matrix_bytes), "term matrix released");

    let summary = factors.top_terms(&vocabulary, config.top_n);
    let factor_bytes = factors.heap_bytes();
    drop(factors);
    drop(vocabulary);
    info!(released = %format_bytes(factor_bytes), "NMF factors released");
    Ok(summary)
}

/// Tokenize, build the dictionary and the integer corpus, train.
///
/// Each step consumes its input, so at most one generation of large
/// structures is alive at a time.
pub fn lda_branch(docs: DocumentSet, config: &PipelineConfig) -> Result<(TopicSummary, Duration)> {
    info!("LDA branch started");
    let doc_bytes = docs.heap_bytes();
    let tokens = tokenize(docs);
    info!(
        docs = tokens.len(),
        tokens = tokens.num_pos(),
        released = %format_bytes(doc_bytes),
        resident = %format_bytes(tokens.heap_bytes()),
        "documents tokenized"
    );

    let vocabulary = Vocabulary::build(&tokens, &config.dictionary)?;
    let token_bytes = tokens.heap_bytes();
    let corpus = BagOfWordsCorpus::build(tokens, &vocabulary);
    info!(
        docs = corpus.len(),
        nnz = corpus.num_nnz(),
        released = %format_bytes(token_bytes),
        resident = %format_bytes(corpus.heap_bytes() + vocabulary.heap_bytes()),
        "bag-of-words corpus ready"
    );

    let model = LdaTrainer::new(config.lda)?.train(&corpus, vocabulary.len())?;
    let corpus_bytes = corpus.heap_bytes();
    drop(corpus);
    info!(released = %format_bytes(corpus_bytes), "bag-of-words corpus released");

    let summary = model.top_terms(&vocabulary, config.top_n).with_weights(config.lda_weights);
    Ok((summary, model.duration()))
}
