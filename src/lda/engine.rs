use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Gamma};
use statrs::function::gamma::digamma;
use thiserror::Error;

use crate::dictionary::BowEntry;

/// shape and scale of the Gamma draw used to initialise variational parameters
pub const GAMMA_SHAPE: f64 = 100.0;
pub const GAMMA_SCALE: f64 = 1.0 / 100.0;
/// avoids division by zero in phi normalizers
const PHI_FLOOR: f64 = 1e-100;

/// Failure of one chunk's inference step
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct InferenceError(pub String);

/// Read-only inputs of one chunk's E-step
#[derive(Debug, Clone, Copy)]
pub struct ChunkContext<'a> {
    /// `exp(E[log beta])`, K x V, fixed for the whole pass
    pub exp_elogbeta: &'a Array2<f64>,
    /// symmetric document-topic prior
    pub alpha: f64,
    pub iterations: usize,
    pub gamma_threshold: f64,
    /// seed of this chunk's gamma initialisation
    pub seed: u64,
    pub pass: usize,
    pub chunk: usize,
}

/// Sufficient statistics produced by one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkStats {
    /// K x V, still to be multiplied by `exp(E[log beta])`
    pub sstats: Array2<f64>,
    /// documents whose gamma converged before the iteration cap
    pub converged: usize,
    pub docs: usize,
}

impl ChunkStats {
    pub fn zeros(num_topics: usize, num_terms: usize) -> Self {
        Self {
            sstats: Array2::zeros((num_topics, num_terms)),
            converged: 0,
            docs: 0,
        }
    }

    /// Add another chunk's contribution. Plain element-wise sums, so the
    /// result does not depend on the order chunks are merged in.
    pub fn merge(&mut self, other: &ChunkStats) {
        self.sstats += &other.sstats;
        self.converged += other.converged;
        self.docs += other.docs;
    }
}

/// The per-document (expectation) step run by the workers.
///
/// Implementations must only read the corpus and the context; all writes go
/// into the returned statistics.
pub trait InferenceEngine: Send + Sync {
    fn infer_chunk(&self, docs: &[Vec<BowEntry>], ctx: &ChunkContext<'_>) -> Result<ChunkStats, InferenceError>;
}

/// Variational Bayes E-step
#[derive(Debug, Clone, Copy, Default)]
pub struct VariationalEngine;

impl InferenceEngine for VariationalEngine {
    fn infer_chunk(&self, docs: &[Vec<BowEntry>], ctx: &ChunkContext<'_>) -> Result<ChunkStats, InferenceError> {
        let (num_topics, num_terms) = ctx.exp_elogbeta.dim();
        let gamma_init = Gamma::new(GAMMA_SHAPE, GAMMA_SCALE)
            .map_err(|err| InferenceError(format!("gamma prior: {err}")))?;
        let mut rng = StdRng::seed_from_u64(ctx.seed);
        let mut stats = ChunkStats::zeros(num_topics, num_terms);

        for doc in docs {
            if let Some(&(id, _)) = doc.iter().find(|&&(id, _)| id as usize >= num_terms) {
                return Err(InferenceError(format!("term id {id} outside vocabulary of {num_terms}")));
            }
            let init = Array1::from_shape_simple_fn(num_topics, || gamma_init.sample(&mut rng));
            let inferred = infer_document(doc, init, ctx);
            if inferred.converged {
                stats.converged += 1;
            }
            // sstats[:, ids] += outer(exp(E[log theta]), cts / phinorm)
            for (slot, &(id, _)) in doc.iter().enumerate() {
                let scaled = inferred.counts_over_phinorm[slot];
                let mut column = stats.sstats.column_mut(id as usize);
                column.scaled_add(scaled, &inferred.exp_elogtheta);
            }
            stats.docs += 1;
        }
        Ok(stats)
    }
}

/// Result of fitting one document's variational parameters
#[derive(Debug, Clone)]
pub struct DocumentInference {
    pub gamma: Array1<f64>,
    pub exp_elogtheta: Array1<f64>,
    /// `count / phinorm` per entry of the document
    pub counts_over_phinorm: Vec<f64>,
    pub converged: bool,
}

/// Fit gamma for one document against a fixed `exp(E[log beta])`
pub fn infer_document(doc: &[BowEntry], mut gamma: Array1<f64>, ctx: &ChunkContext<'_>) -> DocumentInference {
    let num_topics = gamma.len();
    let ids: Vec<usize> = doc.iter().map(|&(id, _)| id as usize).collect();
    let counts: Vec<f64> = doc.iter().map(|&(_, count)| count as f64).collect();
    let beta_d = ctx.exp_elogbeta.select(Axis(1), &ids);

    let mut exp_elogtheta = dirichlet_expectation_exp(gamma.view());
    let mut phinorm = phi_normalizer(&exp_elogtheta, &beta_d);
    let mut converged = ids.is_empty();

    for _ in 0..ctx.iterations {
        let last = gamma.clone();
        let ratio: Array1<f64> = counts.iter().zip(phinorm.iter()).map(|(c, p)| c / p).collect();
        // gamma = alpha + exp(E[log theta]) * (ratio . beta_d^T)
        let weighted = beta_d.dot(&ratio);
        gamma = &exp_elogtheta * &weighted + ctx.alpha;
        exp_elogtheta = dirichlet_expectation_exp(gamma.view());
        phinorm = phi_normalizer(&exp_elogtheta, &beta_d);

        let mean_change = (&gamma - &last).mapv(f64::abs).sum() / num_topics as f64;
        if mean_change < ctx.gamma_threshold {
            converged = true;
            break;
        }
    }

    let counts_over_phinorm = counts.iter().zip(phinorm.iter()).map(|(c, p)| c / p).collect();
    DocumentInference {
        gamma,
        exp_elogtheta,
        counts_over_phinorm,
        converged,
    }
}

fn phi_normalizer(exp_elogtheta: &Array1<f64>, beta_d: &Array2<f64>) -> Array1<f64> {
    exp_elogtheta.dot(beta_d) + PHI_FLOOR
}

/// `exp(psi(x) - psi(sum(x)))` of a Dirichlet parameter vector
pub fn dirichlet_expectation_exp(param: ArrayView1<'_, f64>) -> Array1<f64> {
    let total = digamma(param.sum());
    param.mapv(|x| (digamma(x) - total).exp())
}

/// Row-wise `exp(E[log beta])` of the topic-term parameters
pub fn exp_dirichlet_expectation_rows(lambda: &Array2<f64>) -> Array2<f64> {
    let mut out = Array2::zeros(lambda.raw_dim());
    for (row, mut target) in lambda.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
        target.assign(&dirichlet_expectation_exp(row));
    }
    out
}

/// Deterministic seed for a chunk, independent of which worker runs it
pub fn chunk_seed(seed: u64, pass: usize, chunk: usize) -> u64 {
    // splitmix64 finalizer over the three inputs
    let mut z = seed
        ^ (pass as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (chunk as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
