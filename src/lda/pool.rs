//! Thread pool running the per-chunk inference step of every pass.
//!
//! Workers receive chunk assignments over a task queue and send statistics
//! back over a result queue; they never touch shared mutable state. The
//! driver blocks until every chunk of a pass is back before it returns the
//! aggregated statistics, which makes the end of each pass a hard barrier.

use std::collections::BTreeMap;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use ndarray::Array2;
use tracing::{debug, trace, warn};

use crate::dictionary::BowEntry;
use crate::error::{Result, TopicError};
use crate::lda::engine::{chunk_seed, ChunkContext, ChunkStats, InferenceEngine, InferenceError};

/// Per-run inputs every worker shares
#[derive(Debug, Clone, Copy)]
pub(crate) struct InferenceParams {
    pub alpha: f64,
    pub iterations: usize,
    pub gamma_threshold: f64,
    pub seed: u64,
}

struct ChunkTask {
    pass: usize,
    attempt: usize,
    chunk: usize,
    docs: Range<usize>,
    exp_elogbeta: Arc<Array2<f64>>,
}

struct ChunkResult {
    pass: usize,
    attempt: usize,
    chunk: usize,
    outcome: std::result::Result<ChunkStats, InferenceError>,
}

/// First failed chunk of an attempt
#[derive(Debug, Clone)]
struct ChunkFailure {
    chunk: usize,
    reason: String,
}

/// Worker count actually used: never more than the machine offers or than
/// there are chunks to hand out, never zero.
pub fn effective_workers(requested: usize, chunks: usize) -> usize {
    let available = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    let workers = requested.min(available).min(chunks).max(1);
    if workers < requested {
        warn!(requested, available, chunks, workers, "worker count clamped");
    }
    workers
}

/// Document ranges of consecutive chunks of at most `chunk_size` documents
pub(crate) fn chunk_ranges(num_docs: usize, chunk_size: usize) -> Vec<Range<usize>> {
    let chunk_size = chunk_size.max(1);
    (0..num_docs)
        .step_by(chunk_size)
        .map(|start| start..(start + chunk_size).min(num_docs))
        .collect()
}

/// Spawn `workers` scoped threads over `docs`, hand the driver a
/// [`PassDispatcher`] over `chunks`, and join every worker before returning.
pub(crate) fn with_workers<E, T, F>(
    engine: &E,
    docs: &[Vec<BowEntry>],
    chunks: Vec<Range<usize>>,
    workers: usize,
    params: InferenceParams,
    drive: F,
) -> Result<T>
where
    E: InferenceEngine,
    F: FnOnce(&PassDispatcher) -> Result<T>,
{
    thread::scope(|scope| {
        let (task_tx, task_rx) = unbounded::<ChunkTask>();
        let (result_tx, result_rx) = bounded::<ChunkResult>(workers * 2);

        for worker_id in 0..workers {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || worker_loop(worker_id, task_rx, result_tx, engine, docs, params));
        }
        // only the workers hold these ends now
        drop(task_rx);
        drop(result_tx);

        let dispatcher = PassDispatcher { task_tx, result_rx, chunks };
        drive(&dispatcher)
        // dispatcher drops here, the task queue closes and the workers exit
    })
}

fn worker_loop<E: InferenceEngine>(
    worker_id: usize,
    tasks: Receiver<ChunkTask>,
    results: Sender<ChunkResult>,
    engine: &E,
    docs: &[Vec<BowEntry>],
    params: InferenceParams,
) {
    for task in tasks.iter() {
        let ctx = ChunkContext {
            exp_elogbeta: &*task.exp_elogbeta,
            alpha: params.alpha,
            iterations: params.iterations,
            gamma_threshold: params.gamma_threshold,
            seed: chunk_seed(params.seed, task.pass, task.chunk),
            pass: task.pass,
            chunk: task.chunk,
        };
        let outcome = match docs.get(task.docs.clone()) {
            Some(chunk_docs) => panic::catch_unwind(AssertUnwindSafe(|| engine.infer_chunk(chunk_docs, &ctx)))
                .unwrap_or_else(|payload| Err(InferenceError(panic_message(payload.as_ref())))),
            None => Err(InferenceError(format!("chunk range {:?} outside corpus", task.docs))),
        };
        trace!(worker_id, pass = task.pass, chunk = task.chunk, ok = outcome.is_ok(), "chunk processed");
        let result = ChunkResult {
            pass: task.pass,
            attempt: task.attempt,
            chunk: task.chunk,
            outcome,
        };
        if results.send(result).is_err() {
            break;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("worker panicked: {msg}")
    } else {
        "worker panicked".to_string()
    }
}

/// Driver side of the pool: hands out one pass at a time
pub(crate) struct PassDispatcher {
    task_tx: Sender<ChunkTask>,
    result_rx: Receiver<ChunkResult>,
    chunks: Vec<Range<usize>>,
}

impl PassDispatcher {
    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Run every chunk once against `exp_elogbeta` and return the summed
    /// statistics. A failed attempt is discarded and the pass rerun once;
    /// a second failed attempt is fatal.
    pub fn run_pass(
        &self,
        pass: usize,
        exp_elogbeta: Arc<Array2<f64>>,
    ) -> Result<ChunkStats> {
        let first = match self.attempt(pass, 0, &exp_elogbeta) {
            Ok(stats) => return Ok(stats),
            Err(failure) => failure,
        };
        warn!(pass, chunk = first.chunk, reason = %first.reason, "pass failed, retrying once");

        match self.attempt(pass, 1, &exp_elogbeta) {
            Ok(stats) => Ok(stats),
            Err(second) => {
                let reason = if second.chunk == first.chunk {
                    format!("failed twice: {}", second.reason)
                } else {
                    format!("retry failed after chunk {} had failed: {}", first.chunk, second.reason)
                };
                Err(TopicError::WorkerFailure { chunk: second.chunk, pass, reason })
            }
        }
    }

    fn attempt(
        &self,
        pass: usize,
        attempt: usize,
        exp_elogbeta: &Arc<Array2<f64>>,
    ) -> std::result::Result<ChunkStats, ChunkFailure> {
        let (num_topics, num_terms) = exp_elogbeta.dim();
        for (chunk, docs) in self.chunks.iter().enumerate() {
            let task = ChunkTask {
                pass,
                attempt,
                chunk,
                docs: docs.clone(),
                exp_elogbeta: Arc::clone(exp_elogbeta),
            };
            if self.task_tx.send(task).is_err() {
                return Err(ChunkFailure { chunk, reason: "no worker left to take the chunk".into() });
            }
        }

        // chunks may finish in any order; they are summed in chunk order
        let mut total = ChunkStats::zeros(num_topics, num_terms);
        let mut pending: BTreeMap<usize, ChunkStats> = BTreeMap::new();
        let mut next_chunk = 0usize;
        let mut failure: Option<ChunkFailure> = None;

        // barrier: every task sent above is answered before returning
        for _ in 0..self.chunks.len() {
            let result = match self.result_rx.recv() {
                Ok(result) => result,
                Err(_) => {
                    return Err(ChunkFailure { chunk: next_chunk, reason: "worker pool disconnected".into() });
                }
            };
            debug_assert_eq!((result.pass, result.attempt), (pass, attempt));

            match result.outcome {
                Ok(stats) if failure.is_none() => {
                    pending.insert(result.chunk, stats);
                    while let Some(stats) = pending.remove(&next_chunk) {
                        total.merge(&stats);
                        next_chunk += 1;
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    if failure.is_none() {
                        pending.clear();
                        failure = Some(ChunkFailure { chunk: result.chunk, reason: err.0 });
                    }
                }
            }
        }

        match failure {
            Some(failure) => Err(failure),
            None => {
                debug!(pass, attempt, chunks = next_chunk, "pass statistics aggregated");
                Ok(total)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::lda::engine::VariationalEngine;

    fn params() -> InferenceParams {
        InferenceParams { alpha: 0.5, iterations: 20, gamma_threshold: 0.001, seed: 7 }
    }

    fn docs() -> Vec<Vec<BowEntry>> {
        vec![
            vec![(0, 2), (1, 1)],
            vec![(1, 3)],
            vec![(2, 1), (3, 2)],
            vec![(0, 1), (3, 1)],
            vec![(2, 4)],
        ]
    }

    fn beta() -> Arc<Array2<f64>> {
        Arc::new(Array2::from_elem((2, 4), 0.25))
    }

    /// One pass over `docs` split into chunks of `chunk_size`
    fn one_pass<E: InferenceEngine>(engine: &E, chunk_size: usize, workers: usize, pass: usize) -> Result<ChunkStats> {
        let docs = docs();
        with_workers(engine, &docs, chunk_ranges(docs.len(), chunk_size), workers, params(), |d| {
            d.run_pass(pass, beta())
        })
    }

    /// Fails `chunk` the first `failures` times it is asked for it
    struct FlakyEngine {
        chunk: usize,
        failures: AtomicUsize,
        panics: bool,
    }

    impl InferenceEngine for FlakyEngine {
        fn infer_chunk(&self, docs: &[Vec<BowEntry>], ctx: &ChunkContext<'_>) -> std::result::Result<ChunkStats, InferenceError> {
            if ctx.chunk == self.chunk {
                let left = self.failures.load(Ordering::SeqCst);
                if left > 0 {
                    self.failures.store(left - 1, Ordering::SeqCst);
                    if self.panics {
                        panic!("chunk {} exploded", ctx.chunk);
                    }
                    return Err(InferenceError(format!("chunk {} refused", ctx.chunk)));
                }
            }
            VariationalEngine.infer_chunk(docs, ctx)
        }
    }

    #[test]
    fn chunk_ranges_cover_the_corpus() {
        assert_eq!(chunk_ranges(5, 2), vec![0..2, 2..4, 4..5]);
        assert_eq!(chunk_ranges(4, 10), vec![0..4]);
        assert!(chunk_ranges(0, 3).is_empty());
    }

    #[test]
    fn effective_workers_is_clamped_and_positive() {
        assert_eq!(effective_workers(4, 1), 1);
        assert_eq!(effective_workers(0, 3), 1);
        let available = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        assert!(effective_workers(usize::MAX, usize::MAX) <= available);
    }

    #[test]
    fn pass_result_does_not_depend_on_worker_count() {
        let single = one_pass(&VariationalEngine, 1, 1, 0).unwrap();
        let many = one_pass(&VariationalEngine, 1, 4, 0).unwrap();
        assert_eq!(single.docs, 5);
        assert_eq!(single, many);
    }

    #[test]
    fn failed_chunk_is_retried_once() {
        let engine = FlakyEngine { chunk: 1, failures: AtomicUsize::new(1), panics: false };
        let stats = one_pass(&engine, 2, 2, 0).unwrap();
        let clean = one_pass(&VariationalEngine, 2, 2, 0).unwrap();
        // the failed attempt left nothing behind
        assert_eq!(stats, clean);
    }

    #[test]
    fn repeated_failure_is_fatal() {
        let engine = FlakyEngine { chunk: 2, failures: AtomicUsize::new(2), panics: false };
        let err = one_pass(&engine, 2, 2, 3).unwrap_err();
        match err {
            TopicError::WorkerFailure { chunk, pass, reason } => {
                assert_eq!((chunk, pass), (2, 3));
                assert!(reason.contains("failed twice"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn worker_panic_becomes_a_chunk_failure() {
        let engine = FlakyEngine { chunk: 0, failures: AtomicUsize::new(2), panics: true };
        let err = one_pass(&engine, 2, 2, 0).unwrap_err();
        assert!(matches!(err, TopicError::WorkerFailure { chunk: 0, .. }));
        assert!(err.to_string().contains("exploded"));
    }
}
