//! Non-negative matrix factorization by multiplicative updates.
//!
//! Given a weighted term matrix X (documents x terms) find W (documents x K)
//! and H (K x terms), both non-negative, with X ≈ W H under the Frobenius
//! norm. Rows of H are the topics.

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use sprs::CsMat;
use tracing::{debug, info};

use crate::config::NmfConfig;
use crate::error::{Result, TopicError};
use crate::report::{ModelKind, TopicSummary, TopicTerm};
use crate::utils::size::HeapSize;
use crate::utils::sort::top_k_desc;
use crate::vectorizer::{TermVocabulary, WeightedTermMatrix};

/// keeps denominators away from zero
const EPSILON: f64 = f64::EPSILON;
/// error is evaluated every this many iterations
const CHECK_EVERY: usize = 10;

/// Output of [`Nmf::fit`]
#[derive(Debug, Clone)]
pub struct TopicFactors {
    /// K x V
    pub topic_by_term: Array2<f64>,
    /// N x K
    pub document_by_topic: Array2<f64>,
    /// Frobenius norm of X - W H at the end
    pub reconstruction_err: f64,
    pub n_iter: usize,
}

impl TopicFactors {
    #[inline]
    pub fn num_topics(&self) -> usize {
        self.topic_by_term.nrows()
    }

    /// Top `n` terms of every topic, ties to the lower column
    pub fn top_terms(&self, vocabulary: &TermVocabulary, n: usize) -> TopicSummary {
        let topics = self
            .topic_by_term
            .axis_iter(Axis(0))
            .map(|row| {
                let weights = row.to_vec();
                top_k_desc(&weights, n)
                    .into_iter()
                    .filter_map(|col| {
                        vocabulary
                            .term(col)
                            .map(|term| TopicTerm::new(term, weights[col]))
                    })
                    .collect()
            })
            .collect();
        TopicSummary::new(ModelKind::Nmf, topics)
    }

    /// Strongest topic of every document
    #[cfg(test)]
    pub fn dominant_topics(&self) -> Vec<usize> {
        self.document_by_topic
            .axis_iter(Axis(0))
            .map(|row| top_k_desc(&row.to_vec(), 1).first().copied().unwrap_or(0))
            .collect()
    }
}

impl HeapSize for TopicFactors {
    fn heap_bytes(&self) -> usize {
        (self.topic_by_term.len() + self.document_by_topic.len()) * std::mem::size_of::<f64>()
    }
}

/// Factorization engine
#[derive(Debug, Clone)]
pub struct Nmf {
    config: NmfConfig,
}

impl Nmf {
    pub fn new(config: NmfConfig) -> Result<Self> {
        if config.num_topics == 0 {
            return Err(TopicError::InvalidConfig("topic count must be positive".into()));
        }
        Ok(Self { config })
    }

    /// Factorize `matrix`. Never fails on non-convergence: after the
    /// iteration budget the current estimate is returned.
    pub fn fit(&self, matrix: &WeightedTermMatrix) -> TopicFactors {
        let x = matrix.csr();
        let (n, v) = (x.rows(), x.cols());
        let k = self.config.num_topics;

        let (mut w, mut h) = self.initialize(x, k);
        let norm_x = x.data().iter().map(|val| val * val).sum::<f64>();

        let error_at_init = reconstruction_err(x, norm_x, &w, &h);
        let mut previous_error = error_at_init;
        let mut n_iter = 0;

        for iter in 1..=self.config.max_iter {
            n_iter = iter;

            // H <- H * (W^T X) / (W^T W H)
            let numerator = wt_x(x, &w, v);
            let denominator = w.t().dot(&w).dot(&h);
            h.zip_mut_with(&numerator, |hv, &num| *hv *= num);
            h.zip_mut_with(&denominator, |hv, &den| *hv = (*hv / (den + EPSILON)).max(0.0));

            // W <- W * (X H^T) / (W H H^T)
            let numerator = x_ht(x, &h, n);
            let denominator = w.dot(&h.dot(&h.t()));
            w.zip_mut_with(&numerator, |wv, &num| *wv *= num);
            w.zip_mut_with(&denominator, |wv, &den| *wv = (*wv / (den + EPSILON)).max(0.0));

            if self.config.tol > 0.0 && iter % CHECK_EVERY == 0 {
                let error = reconstruction_err(x, norm_x, &w, &h);
                debug!(iter, error, "nmf progress");
                if error_at_init > 0.0 && (previous_error - error) / error_at_init < self.config.tol {
                    break;
                }
                previous_error = error;
            }
        }

        let error = reconstruction_err(x, norm_x, &w, &h);
        info!(topics = k, iterations = n_iter, reconstruction_err = error, "nmf finished");
        TopicFactors {
            topic_by_term: h,
            document_by_topic: w,
            reconstruction_err: error,
            n_iter,
        }
    }

    /// Scaled absolute normal entries: `sqrt(mean(X) / K) * |N(0, 1)|`
    fn initialize(&self, x: &CsMat<f64>, k: usize) -> (Array2<f64>, Array2<f64>) {
        let (n, v) = (x.rows(), x.cols());
        let cells = (n * v).max(1) as f64;
        let mean = x.data().iter().sum::<f64>() / cells;
        let avg = (mean / k as f64).sqrt();

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut draw = || -> f64 {
            let z: f64 = StandardNormal.sample(&mut rng);
            avg * z.abs()
        };
        let h = Array2::from_shape_simple_fn((k, v), &mut draw);
        let w = Array2::from_shape_simple_fn((n, k), &mut draw);
        (w, h)
    }
}

/// W^T X, K x V
fn wt_x(x: &CsMat<f64>, w: &Array2<f64>, v: usize) -> Array2<f64> {
    let k = w.ncols();
    let mut out = Array2::zeros((k, v));
    for (i, row) in x.outer_iterator().enumerate() {
        let wi = w.row(i);
        for (j, &val) in row.iter() {
            for t in 0..k {
                out[[t, j]] += wi[t] * val;
            }
        }
    }
    out
}

/// X H^T, N x K
fn x_ht(x: &CsMat<f64>, h: &Array2<f64>, n: usize) -> Array2<f64> {
    let k = h.nrows();
    let mut out = Array2::zeros((n, k));
    for (i, row) in x.outer_iterator().enumerate() {
        for (j, &val) in row.iter() {
            for t in 0..k {
                out[[i, t]] += val * h[[t, j]];
            }
        }
    }
    out
}

/// ||X - W H||_F without materializing W H:
/// ||X||^2 - 2 <X, W H> + sum((W^T W) * (H H^T))
fn reconstruction_err(x: &CsMat<f64>, norm_x: f64, w: &Array2<f64>, h: &Array2<f64>) -> f64 {
    let k = h.nrows();
    let mut cross = 0.0;
    for (i, row) in x.outer_iterator().enumerate() {
        for (j, &val) in row.iter() {
            let approx: f64 = (0..k).map(|t| w[[i, t]] * h[[t, j]]).sum();
            cross += val * approx;
        }
    }
    let gram = (&w.t().dot(w) * &h.dot(&h.t())).sum();
    (norm_x - 2.0 * cross + gram).max(0.0).sqrt()
}

#[cfg(test)]
mod tests {
    use sprs::TriMat;

    use super::*;

    /// two obvious blocks: docs 0-2 use terms 0-1, docs 3-5 use terms 2-3
    fn block_matrix() -> WeightedTermMatrix {
        let mut tri = TriMat::new((6, 4));
        for doc in 0..3 {
            tri.add_triplet(doc, 0, 0.8);
            tri.add_triplet(doc, 1, 0.6);
        }
        for doc in 3..6 {
            tri.add_triplet(doc, 2, 0.6);
            tri.add_triplet(doc, 3, 0.8);
        }
        WeightedTermMatrix::from_csr(tri.to_csr())
    }

    #[test]
    fn factors_are_non_negative_with_expected_shapes() {
        let matrix = block_matrix();
        for k in 1..=4 {
            let factors = Nmf::new(NmfConfig::new(k).max_iter(50)).unwrap().fit(&matrix);
            assert_eq!(factors.topic_by_term.dim(), (k, 4));
            assert_eq!(factors.document_by_topic.dim(), (6, k));
            assert!(factors.topic_by_term.iter().all(|&x| x >= 0.0 && x.is_finite()));
            assert!(factors.document_by_topic.iter().all(|&x| x >= 0.0 && x.is_finite()));
        }
    }

    #[test]
    fn recovers_block_structure() {
        let matrix = block_matrix();
        let factors = Nmf::new(NmfConfig::new(2).max_iter(300)).unwrap().fit(&matrix);
        assert!(factors.reconstruction_err < 0.5, "err {}", factors.reconstruction_err);
        let dominant = factors.dominant_topics();
        assert_eq!(dominant[0], dominant[2]);
        assert_eq!(dominant[3], dominant[5]);
        assert_ne!(dominant[0], dominant[3]);
    }

    #[test]
    fn same_seed_gives_same_factors() {
        let matrix = block_matrix();
        let nmf = Nmf::new(NmfConfig::new(2).max_iter(40).seed(7)).unwrap();
        let a = nmf.fit(&matrix);
        let b = nmf.fit(&matrix);
        assert_eq!(a.topic_by_term, b.topic_by_term);
        assert_eq!(a.document_by_topic, b.document_by_topic);
    }

    #[test]
    fn zero_matrix_stays_zero() {
        let tri: TriMat<f64> = TriMat::new((3, 2));
        let matrix = WeightedTermMatrix::from_csr(tri.to_csr());
        let factors = Nmf::new(NmfConfig::new(2).max_iter(5)).unwrap().fit(&matrix);
        assert!(factors.topic_by_term.iter().all(|&x| x == 0.0));
        assert_eq!(factors.reconstruction_err, 0.0);
    }

    #[test]
    fn rejects_zero_topics() {
        assert!(Nmf::new(NmfConfig::new(0)).is_err());
    }
}
