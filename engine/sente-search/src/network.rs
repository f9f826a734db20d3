//! The evaluator contract and reference implementations.
//!
//! The evaluator is modelled as an asynchronous batched service: a worker
//! submits a position together with a completion callback and returns
//! immediately; the service may coalesce submissions from many workers and
//! deliver results in any order. The simulation engine tolerates
//! out-of-order delivery by construction.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use thiserror::Error;
use tracing::{debug, warn};

use sente_core::Position;

/// Errors surfaced by an evaluator.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error("evaluator is shutting down")]
    Unavailable,

    #[error("cache of {requested} bytes is below the minimum of {minimum}")]
    CacheTooSmall { requested: usize, minimum: usize },
}

/// One evaluator response: a policy over `size * size + 1` entries (the
/// last is the pass move) in the frame of the requested symmetry, and a
/// win-rate in [0, 1] from the perspective of the player to move.
#[derive(Debug, Clone)]
pub struct NetResult {
    pub policy: Vec<f32>,
    pub winrate: f32,
}

/// Completion continuation handed over at submission time.
pub type NetCallback = Box<dyn FnOnce(Result<NetResult, NetError>) + Send + 'static>;

/// An asynchronous position evaluator.
///
/// Implementations must invoke the callback exactly once for every request,
/// including requests still queued at shutdown (with
/// [`NetError::Unavailable`]), so that in-flight simulations can always
/// settle their virtual-loss accounting.
pub trait Network<P: Position>: Send + Sync + 'static {
    /// Submit a position for evaluation. Must not block on the evaluation
    /// itself; the callback may run on any thread, including the caller's.
    fn request(&self, position: &P, symmetry: usize, callback: NetCallback);

    /// Number of submitted evaluations whose callback has not run yet.
    fn pending(&self) -> usize;

    /// Estimated footprint of the evaluator's result cache.
    fn estimated_cache_size(&self) -> usize {
        0
    }

    /// Resize the result cache. Infeasible sizes are reported
    /// synchronously.
    fn resize_cache(&self, _bytes: usize) -> Result<(), NetError> {
        Ok(())
    }
}

/// Uniform-policy evaluator with a neutral win-rate, delivered
/// synchronously on the calling thread. With one worker thread this makes
/// the whole search deterministic, which the tests rely on.
#[derive(Debug, Clone, Default)]
pub struct UniformNetwork;

impl UniformNetwork {
    pub fn new() -> Self {
        Self
    }
}

/// Uniform policy over the legal moves of `position`.
pub fn uniform_result<P: Position>(position: &P) -> NetResult {
    let size = position.board_size();
    let mut policy = vec![0.0; size * size + 1];
    let legal = position.legal_moves(position.to_move());
    let p = 1.0 / legal.len().max(1) as f32;
    for mv in legal {
        if let Some(index) = mv.policy_index(size) {
            policy[index] = p;
        }
    }
    NetResult {
        policy,
        winrate: 0.5,
    }
}

impl<P: Position> Network<P> for UniformNetwork {
    fn request(&self, position: &P, _symmetry: usize, callback: NetCallback) {
        // A uniform policy is symmetric, so the frame does not matter.
        callback(Ok(uniform_result(position)));
    }

    fn pending(&self) -> usize {
        0
    }
}

struct Job<P> {
    position: P,
    symmetry: usize,
    callback: NetCallback,
}

/// Evaluation function backing a [`BatchedNetwork`].
pub type EvalFn<P> = Arc<dyn Fn(&P, usize) -> Result<NetResult, NetError> + Send + Sync>;

/// Coalesces requests from many workers into batches on a dedicated
/// thread. Results are delivered from that thread, out of order with
/// respect to the submitting workers.
pub struct BatchedNetwork<P: Position> {
    sender: Option<Sender<Job<P>>>,
    pending: Arc<AtomicUsize>,
    cache_bytes: AtomicUsize,
    min_cache_bytes: usize,
    worker: Option<JoinHandle<()>>,
}

impl<P: Position> BatchedNetwork<P> {
    /// `batch_size` positions are collected (or until `batch_wait`
    /// passes) before the batch is evaluated with `eval`.
    pub fn new(eval: EvalFn<P>, batch_size: usize, batch_wait: Duration) -> Self {
        let (sender, receiver) = unbounded::<Job<P>>();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_pending = Arc::clone(&pending);
        let worker = std::thread::Builder::new()
            .name("sente-evaluator".into())
            .spawn(move || batch_loop(receiver, eval, batch_size.max(1), batch_wait, worker_pending))
            .expect("spawn evaluator thread");
        Self {
            sender: Some(sender),
            pending,
            cache_bytes: AtomicUsize::new(64 << 20),
            min_cache_bytes: 1 << 20,
            worker: Some(worker),
        }
    }
}

fn batch_loop<P: Position>(
    receiver: Receiver<Job<P>>,
    eval: EvalFn<P>,
    batch_size: usize,
    batch_wait: Duration,
    pending: Arc<AtomicUsize>,
) {
    let mut batch: Vec<Job<P>> = Vec::with_capacity(batch_size);
    loop {
        batch.clear();
        match receiver.recv() {
            Ok(job) => batch.push(job),
            Err(_) => return,
        }
        let deadline = std::time::Instant::now() + batch_wait;
        while batch.len() < batch_size {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            match receiver.recv_timeout(remaining) {
                Ok(job) => batch.push(job),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!(batch = batch.len(), "evaluating batch");
        for job in batch.drain(..) {
            let result = eval(&job.position, job.symmetry);
            (job.callback)(result);
            pending.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl<P: Position> Network<P> for BatchedNetwork<P> {
    fn request(&self, position: &P, symmetry: usize, callback: NetCallback) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let job = Job {
            position: position.clone(),
            symmetry,
            callback,
        };
        let refused = match self.sender.as_ref() {
            Some(sender) => match sender.send(job) {
                Ok(()) => return,
                Err(back) => back.0,
            },
            None => job,
        };
        // Queue closed: settle the request so virtual losses still drain.
        warn!("evaluator queue closed, failing request");
        self.pending.fetch_sub(1, Ordering::SeqCst);
        (refused.callback)(Err(NetError::Unavailable));
    }

    fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn estimated_cache_size(&self) -> usize {
        self.cache_bytes.load(Ordering::SeqCst)
    }

    fn resize_cache(&self, bytes: usize) -> Result<(), NetError> {
        if bytes < self.min_cache_bytes {
            return Err(NetError::CacheTooSmall {
                requested: bytes,
                minimum: self.min_cache_bytes,
            });
        }
        self.cache_bytes.store(bytes, Ordering::SeqCst);
        Ok(())
    }
}

impl<P: Position> Drop for BatchedNetwork<P> {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain what is queued and
        // exit; every queued job still receives its callback.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use games_go::GoPosition;
    use std::sync::mpsc;

    #[test]
    fn uniform_policy_covers_legal_moves() {
        let state = GoPosition::new(5, 7.5);
        let result = uniform_result(&state);
        let sum: f32 = result.policy.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        // 25 points plus pass.
        assert_eq!(result.policy.iter().filter(|&&p| p > 0.0).count(), 26);
        assert!((result.winrate - 0.5).abs() < 1e-6);
    }

    #[test]
    fn uniform_network_delivers_synchronously() {
        let state = GoPosition::new(5, 7.5);
        let network = UniformNetwork::new();
        let (tx, rx) = mpsc::channel();
        network.request(
            &state,
            0,
            Box::new(move |result| {
                tx.send(result.unwrap().winrate).unwrap();
            }),
        );
        assert_eq!(rx.try_recv().unwrap(), 0.5);
        assert_eq!(Network::<GoPosition>::pending(&network), 0);
    }

    #[test]
    fn batched_network_delivers_every_request() {
        let eval: EvalFn<GoPosition> = Arc::new(|position, _| Ok(uniform_result(position)));
        let network = BatchedNetwork::new(eval, 4, Duration::from_millis(5));
        let state = GoPosition::new(5, 7.5);

        let (tx, rx) = mpsc::channel();
        for _ in 0..10 {
            let tx = tx.clone();
            network.request(
                &state,
                0,
                Box::new(move |result| {
                    tx.send(result.is_ok()).unwrap();
                }),
            );
        }
        for _ in 0..10 {
            assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        }
        assert_eq!(network.pending(), 0);
    }

    #[test]
    fn cache_resize_rejects_infeasible_sizes() {
        let eval: EvalFn<GoPosition> = Arc::new(|position, _| Ok(uniform_result(position)));
        let network = BatchedNetwork::new(eval, 1, Duration::from_millis(1));
        assert!(matches!(
            network.resize_cache(16),
            Err(NetError::CacheTooSmall { .. })
        ));
        assert!(network.resize_cache(32 << 20).is_ok());
        assert_eq!(network.estimated_cache_size(), 32 << 20);
    }
}
