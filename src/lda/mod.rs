pub mod engine;
pub mod pool;

use std::sync::Arc;
use std::time::{Duration, Instant};

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Gamma};
use tracing::{debug, info};

use crate::config::LdaConfig;
use crate::dictionary::{bow::BagOfWordsCorpus, BowEntry, Vocabulary};
use crate::error::{Result, TopicError};
use crate::report::{ModelKind, TopicSummary, TopicTerm};
use crate::utils::size::HeapSize;
use crate::utils::sort::top_k_desc;

use self::engine::{
    chunk_seed, exp_dirichlet_expectation_rows, infer_document, ChunkContext, InferenceEngine,
    VariationalEngine, GAMMA_SCALE, GAMMA_SHAPE,
};
use self::pool::{chunk_ranges, effective_workers, with_workers, InferenceParams};

/// Trained LDA topic model.
///
/// Holds the variational topic-term parameters; immutable once training
/// returns.
#[derive(Debug, Clone)]
pub struct LdaModel {
    /// K x V
    lambda: Array2<f64>,
    alpha: f64,
    eta: f64,
    iterations: usize,
    gamma_threshold: f64,
    seed: u64,
    /// wall clock of the whole train call
    duration: Duration,
    workers: usize,
    passes: usize,
}

impl LdaModel {
    #[inline]
    pub fn num_topics(&self) -> usize {
        self.lambda.nrows()
    }

    #[inline]
    pub fn num_terms(&self) -> usize {
        self.lambda.ncols()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// workers actually used after clamping
    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn eta(&self) -> f64 {
        self.eta
    }

    /// Term probabilities of topic `k`, summing to one
    pub fn topic_distribution(&self, k: usize) -> Option<Array1<f64>> {
        if k >= self.num_topics() {
            return None;
        }
        let row = self.lambda.row(k);
        let total = row.sum();
        Some(row.mapv(|x| x / total))
    }

    /// `(id, probability)` of the `n` most probable terms of topic `k`,
    /// ties to the lower id
    pub fn topic_terms(&self, k: usize, n: usize) -> Vec<(u32, f64)> {
        let Some(dist) = self.topic_distribution(k) else {
            return Vec::new();
        };
        let probs = dist.to_vec();
        top_k_desc(&probs, n)
            .into_iter()
            .map(|id| (id as u32, probs[id]))
            .collect()
    }

    /// Top `n` terms of every topic, named through `vocabulary`
    pub fn top_terms(&self, vocabulary: &Vocabulary, n: usize) -> TopicSummary {
        let topics = (0..self.num_topics())
            .map(|k| {
                self.topic_terms(k, n)
                    .into_iter()
                    .filter_map(|(id, p)| vocabulary.token(id).map(|token| TopicTerm::new(token, p)))
                    .collect()
            })
            .collect();
        TopicSummary::new(ModelKind::Lda, topics)
    }

    /// Topic mixture of an unseen document, summing to one.
    ///
    /// Ids outside the model vocabulary are ignored. Deterministic for a
    /// given model and document.
    pub fn document_topics(&self, bow: &[BowEntry]) -> Result<Vec<f64>> {
        let known: Vec<BowEntry> = bow
            .iter()
            .copied()
            .filter(|&(id, _)| (id as usize) < self.num_terms())
            .collect();
        let exp_elogbeta = exp_dirichlet_expectation_rows(&self.lambda);
        let ctx = ChunkContext {
            exp_elogbeta: &exp_elogbeta,
            alpha: self.alpha,
            iterations: self.iterations,
            gamma_threshold: self.gamma_threshold,
            seed: self.seed,
            pass: 0,
            chunk: 0,
        };
        // one row of K draws
        let init = gamma_draws(1, self.num_topics(), chunk_seed(self.seed, usize::MAX, 0))?.row(0).to_owned();
        let gamma = infer_document(&known, init, &ctx).gamma;
        let total = gamma.sum();
        Ok(gamma.iter().map(|g| g / total).collect())
    }
}

impl HeapSize for LdaModel {
    fn heap_bytes(&self) -> usize {
        self.lambda.len() * std::mem::size_of::<f64>()
    }
}

/// Parallel LDA trainer
///
/// # Type Parameters
/// - `E`: per-chunk inference step, [`VariationalEngine`] unless replaced
#[derive(Debug, Clone)]
pub struct LdaTrainer<E = VariationalEngine>
where
    E: InferenceEngine,
{
    config: LdaConfig,
    engine: E,
}

impl LdaTrainer<VariationalEngine> {
    pub fn new(config: LdaConfig) -> Result<Self> {
        Self::with_engine(config, VariationalEngine)
    }
}

impl<E> LdaTrainer<E>
where
    E: InferenceEngine,
{
    pub fn with_engine(config: LdaConfig, engine: E) -> Result<Self> {
        if config.num_topics == 0 {
            return Err(TopicError::InvalidConfig("topic count must be positive".into()));
        }
        if config.passes == 0 || config.iterations == 0 {
            return Err(TopicError::InvalidConfig("passes and iterations must be positive".into()));
        }
        Ok(Self { config, engine })
    }

    pub fn config(&self) -> &LdaConfig {
        &self.config
    }

    /// Train over `corpus` with `num_terms` vocabulary entries.
    ///
    /// Passes run strictly one after the other; within a pass the chunks are
    /// processed by the workers in any order and aggregated at a barrier
    /// before the topic parameters change.
    ///
    /// # Errors
    /// - `EmptyTrainingSet` when there is no token to train on; raised before
    ///   any worker exists
    /// - `WorkerFailure` when a pass fails again after its one retry
    pub fn train(&self, corpus: &BagOfWordsCorpus, num_terms: usize) -> Result<LdaModel> {
        let started = Instant::now();
        if corpus.is_empty() || corpus.num_tokens() == 0 || num_terms == 0 {
            return Err(TopicError::EmptyTrainingSet);
        }

        let k = self.config.num_topics;
        let prior = 1.0 / k as f64;
        let chunks = chunk_ranges(corpus.len(), self.config.chunk_size);
        let num_chunks = chunks.len();
        let workers = effective_workers(self.config.workers, num_chunks);
        info!(
            docs = corpus.len(),
            terms = num_terms,
            topics = k,
            workers,
            passes = self.config.passes,
            chunks = num_chunks,
            "LDA training started"
        );

        let params = InferenceParams {
            alpha: prior,
            iterations: self.config.iterations,
            gamma_threshold: self.config.gamma_threshold,
            seed: self.config.seed,
        };
        let mut lambda = gamma_draws(k, num_terms, self.config.seed)?;

        with_workers(
            &self.engine,
            corpus.docs(),
            chunks,
            workers,
            params,
            |dispatcher| {
                for pass in 0..self.config.passes {
                    let pass_started = Instant::now();
                    let exp_elogbeta = Arc::new(exp_dirichlet_expectation_rows(&lambda));
                    let stats = dispatcher.run_pass(pass, Arc::clone(&exp_elogbeta))?;

                    // M-step: λ = η + sstats ∘ exp(E[log β])
                    let updated = stats.sstats * &*exp_elogbeta + prior;
                    let change = (&updated - &lambda).mapv(f64::abs).mean().unwrap_or(0.0);
                    lambda = updated;
                    info!(
                        pass = pass + 1,
                        of = self.config.passes,
                        converged = stats.converged,
                        docs = stats.docs,
                        chunks = dispatcher.num_chunks(),
                        mean_change = change,
                        elapsed_ms = pass_started.elapsed().as_millis() as u64,
                        "LDA pass complete"
                    );
                }
                Ok(())
            },
        )?;

        let duration = started.elapsed();
        info!(seconds = duration.as_secs_f64(), workers, "LDA training finished");
        Ok(LdaModel {
            lambda,
            alpha: prior,
            eta: prior,
            iterations: self.config.iterations,
            gamma_threshold: self.config.gamma_threshold,
            seed: self.config.seed,
            duration,
            workers,
            passes: self.config.passes,
        })
    }
}

/// rows x cols matrix of Gamma(100, 1/100) draws
fn gamma_draws(rows: usize, cols: usize, seed: u64) -> Result<Array2<f64>> {
    let dist = Gamma::new(GAMMA_SHAPE, GAMMA_SCALE)
        .map_err(|err| TopicError::InvalidConfig(format!("gamma prior: {err}")))?;
    let mut rng = StdRng::seed_from_u64(seed);
    let draws = Array2::from_shape_simple_fn((rows, cols), || dist.sample(&mut rng));
    debug!(rows, cols, "variational parameters initialised");
    Ok(draws)
}
