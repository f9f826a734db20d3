//! The root controller.
//!
//! `UctSearch` owns the tree, a pool of long-lived worker threads and the
//! evaluator. A search episode reuses the existing tree when the new game
//! state is reachable from the previous root (hash-verified at every
//! step), wakes the workers, then sleeps in short ticks deciding whether
//! to keep going; discarded subtrees are freed asynchronously once the
//! previous episode's simulations drain.

use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use sente_core::{Color, Move, Position};

use crate::analysis::{principal_variation, AnalysisEntry};
use crate::config::{OptionsError, SearchOptions, UNLIMITED_PLAYOUTS};
use crate::latch::Latch;
use crate::network::Network;
use crate::node::{self, UctNode};
use crate::reclaim;
use crate::simulation::{complete_expansion, play_simulation, BackupData};

/// Host hints for move selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassFlags {
    /// Prefer the best non-pass child when the search wants to pass.
    pub no_pass: bool,
    /// Never resign.
    pub no_resign: bool,
}

/// A snapshot of search counters.
#[derive(Debug, Clone)]
pub struct SearchStats {
    pub playouts: u32,
    pub positions: u32,
    pub failed_simulations: u32,
    pub root_visits: u32,
    pub root_virtual_loss: u32,
    pub tree_handles: usize,
    pub inflated_nodes: usize,
    pub pending_evaluations: usize,
}

/// State shared between the controller, the workers and the evaluator
/// callbacks. The root slot (tree, root state, episode pending counter) is
/// guarded by `root_latch`; everything else is atomic.
pub(crate) struct SearchShared<P: Position, N: Network<P>> {
    options: SearchOptions,
    pub(crate) network: N,
    max_playouts: AtomicU32,
    max_visits: AtomicU32,

    root_latch: Latch,
    root: UnsafeCell<Box<UctNode>>,
    rootstate: UnsafeCell<P>,
    episode_pending: UnsafeCell<Arc<AtomicI32>>,
    episode: AtomicU32,

    run: AtomicBool,
    terminate: AtomicBool,
    pub(crate) root_prepared: AtomicBool,
    pub(crate) playouts: AtomicU32,
    pub(crate) positions: AtomicU32,
    failed_simulations: AtomicU32,

    idle: Mutex<()>,
    wakeup: Condvar,
}

unsafe impl<P: Position, N: Network<P>> Send for SearchShared<P, N> {}
unsafe impl<P: Position, N: Network<P>> Sync for SearchShared<P, N> {}

impl<P: Position, N: Network<P>> SearchShared<P, N> {
    pub(crate) fn options(&self) -> &SearchOptions {
        &self.options
    }

    fn running(&self) -> bool {
        self.run.load(Ordering::SeqCst)
            && node::tree_handle_count() < self.options.max_tree_size
    }

    /// Count limits, charging in-flight simulations against both caps so
    /// that completions landing later cannot overshoot by more than one
    /// trailing simulation per worker.
    fn stop_by_counts(&self, root: &UctNode, pending: &AtomicI32) -> bool {
        let in_flight = pending.load(Ordering::SeqCst).max(0) as u32;
        self.playouts.load(Ordering::SeqCst) + in_flight
            >= self.max_playouts.load(Ordering::SeqCst)
            || root.visits() + root.virtual_loss() >= self.max_visits.load(Ordering::SeqCst)
    }

    fn stop_reached(&self) -> bool {
        loop {
            if self.root_latch.acquire_reader() {
                let stop = unsafe {
                    let root: &UctNode = &**self.root.get();
                    let pending: &Arc<AtomicI32> = &*self.episode_pending.get();
                    self.stop_by_counts(root, pending)
                };
                self.root_latch.release_reader();
                return stop;
            }
            std::hint::spin_loop();
        }
    }

    /// Simulations of the current episode that have not settled yet.
    fn episode_in_flight(&self) -> i32 {
        loop {
            if self.root_latch.acquire_reader() {
                let in_flight =
                    unsafe { (*self.episode_pending.get()).load(Ordering::SeqCst) };
                self.root_latch.release_reader();
                return in_flight;
            }
            std::hint::spin_loop();
        }
    }

    /// Root visits, read under the global reader latch.
    fn root_visits(&self) -> u32 {
        self.with_root(|root| root.visits())
    }

    /// Run `f` against the current root under the global reader latch.
    /// Spins only against the controller's own brief exclusive sections.
    pub(crate) fn with_root<R>(&self, f: impl FnOnce(&UctNode) -> R) -> R {
        loop {
            if self.root_latch.acquire_reader() {
                let result = f(unsafe { &**self.root.get() });
                self.root_latch.release_reader();
                return result;
            }
            std::hint::spin_loop();
        }
    }

    /// Start one simulation if the episode still wants more. `None` when
    /// refused (stop condition reached or the root slot is being swapped);
    /// otherwise whether the simulation made progress, so the worker can
    /// back off from a saturated frontier instead of spinning on it.
    fn try_start_simulation(self: &Arc<Self>) -> Option<bool> {
        if !self.root_latch.acquire_reader() {
            return None;
        }
        let root_ptr;
        let state;
        let pending;
        unsafe {
            let root: &UctNode = &**self.root.get();
            if self.stop_by_counts(root, &*self.episode_pending.get()) {
                self.root_latch.release_reader();
                return None;
            }
            root_ptr = NonNull::from(root);
            state = (*self.rootstate.get()).clone();
            pending = Arc::clone(&*self.episode_pending.get());
        }
        pending.fetch_add(1, Ordering::SeqCst);
        let episode = self.episode.load(Ordering::SeqCst);
        self.root_latch.release_reader();

        Some(play_simulation(self, state, root_ptr, pending, episode))
    }

    /// Hand an expansion to the evaluator. The submitting simulation keeps
    /// the writer latch of the expansion node; the callback resumes it.
    pub(crate) fn submit_expansion(self: &Arc<Self>, bd: BackupData<P>) {
        let shared = Arc::clone(self);
        let position = bd.state.clone();
        let symmetry = bd.symmetry;
        self.network.request(
            &position,
            symmetry,
            Box::new(move |result| complete_expansion(&shared, bd, result)),
        );
    }

    pub(crate) fn finish_playout(&self, pending: &AtomicI32) {
        pending.fetch_sub(1, Ordering::SeqCst);
        self.playouts.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn fail_simulation(&self, pending: &AtomicI32) {
        pending.fetch_sub(1, Ordering::SeqCst);
        self.failed_simulations.fetch_add(1, Ordering::SeqCst);
    }

    /// Release the expanding simulation's pending slot once the evaluator
    /// answered. Merged simulations released theirs when they failed; only
    /// their virtual losses were left for the expander to convert.
    pub(crate) fn settle_expansion(&self, pending: &AtomicI32, playout: bool) {
        pending.fetch_sub(1, Ordering::SeqCst);
        if playout {
            self.playouts.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed_simulations.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn notify_workers(&self) {
        let _guard = self.idle.lock().unwrap();
        self.wakeup.notify_all();
    }
}

fn worker_loop<P: Position, N: Network<P>>(shared: Arc<SearchShared<P, N>>) {
    loop {
        if shared.terminate.load(Ordering::SeqCst) {
            return;
        }
        if shared.running() {
            match shared.try_start_simulation() {
                Some(true) => continue,
                Some(false) => {
                    // The frontier is saturated with in-flight expansions;
                    // give the evaluator a moment to deliver.
                    std::thread::sleep(Duration::from_micros(200));
                    continue;
                }
                None => {}
            }
        }
        let guard = shared.idle.lock().unwrap();
        let _unused = shared
            .wakeup
            .wait_timeout(guard, Duration::from_millis(10))
            .unwrap();
    }
}

/// A parallel PUCT search over positions of type `P`, evaluated by `N`.
pub struct UctSearch<P: Position, N: Network<P>> {
    shared: Arc<SearchShared<P, N>>,
    workers: Vec<JoinHandle<()>>,
    reclaimers: Vec<JoinHandle<()>>,
    game: P,
    last_rootstate: Option<P>,
}

impl<P: Position, N: Network<P>> UctSearch<P, N> {
    /// Spawn the worker pool and take an initial snapshot of `game`.
    pub fn new(game: P, network: N, options: SearchOptions) -> Result<Self, OptionsError> {
        options.validate()?;
        let shared = Arc::new(SearchShared {
            max_playouts: AtomicU32::new(options.max_playouts),
            max_visits: AtomicU32::new(options.max_visits),
            options,
            network,
            root_latch: Latch::new_open(),
            root: UnsafeCell::new(Box::new(UctNode::new(Move::Pass, 0.0))),
            rootstate: UnsafeCell::new(game.clone()),
            episode_pending: UnsafeCell::new(Arc::new(AtomicI32::new(0))),
            episode: AtomicU32::new(0),
            run: AtomicBool::new(false),
            terminate: AtomicBool::new(false),
            root_prepared: AtomicBool::new(false),
            playouts: AtomicU32::new(0),
            positions: AtomicU32::new(0),
            failed_simulations: AtomicU32::new(0),
            idle: Mutex::new(()),
            wakeup: Condvar::new(),
        });

        let workers = (0..shared.options.num_threads)
            .map(|i| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("sente-worker-{i}"))
                    .spawn(move || worker_loop(shared))
                    .expect("spawn worker thread")
            })
            .collect();

        Ok(Self {
            shared,
            workers,
            reclaimers: Vec::new(),
            game,
            last_rootstate: None,
        })
    }

    /// The host-visible game state the next episode will search from.
    pub fn game(&self) -> &P {
        &self.game
    }

    pub fn game_mut(&mut self) -> &mut P {
        &mut self.game
    }

    pub fn set_playout_limit(&self, playouts: u32) {
        self.shared
            .max_playouts
            .store(playouts.min(UNLIMITED_PLAYOUTS), Ordering::SeqCst);
    }

    pub fn set_visit_limit(&self, visits: u32) {
        self.shared
            .max_visits
            .store(visits.min(UNLIMITED_PLAYOUTS), Ordering::SeqCst);
    }

    pub fn stats(&self) -> SearchStats {
        let (root_visits, root_virtual_loss) = self
            .shared
            .with_root(|root| (root.visits(), root.virtual_loss()));
        SearchStats {
            playouts: self.shared.playouts.load(Ordering::SeqCst),
            positions: self.shared.positions.load(Ordering::SeqCst),
            failed_simulations: self.shared.failed_simulations.load(Ordering::SeqCst),
            root_visits,
            root_virtual_loss,
            tree_handles: node::tree_handle_count(),
            inflated_nodes: node::inflated_node_count(),
            pending_evaluations: self.shared.network.pending(),
        }
    }

    /// Number of handles in the current tree, root included.
    pub fn tree_node_count(&self) -> usize {
        self.shared.with_root(|root| root.count_nodes())
    }

    /// Resynchronise the tree with the externally advanced game state and
    /// wake the workers. Reuses the subtree reached by replaying the
    /// intervening moves when possible, otherwise starts a fresh tree;
    /// either way the discarded nodes go to the reclaimer.
    pub fn update_root(&mut self) {
        let shared = Arc::clone(&self.shared);
        shared.root_latch.lock_exclusive();
        unsafe {
            *shared.rootstate.get() = self.game.clone();
        }

        let mut to_delete = Vec::new();
        if !self.advance_to_new_rootstate(&mut to_delete) {
            // A partially advanced walk already queued the original root
            // in front; a clean miss queues the whole tree here.
            let fresh = Box::new(UctNode::new(Move::Pass, 0.0));
            let old = unsafe { std::mem::replace(&mut *shared.root.get(), fresh) };
            to_delete.push(old);
        }

        let old_pending = unsafe {
            std::mem::replace(
                &mut *shared.episode_pending.get(),
                Arc::new(AtomicI32::new(0)),
            )
        };
        if !to_delete.is_empty() {
            debug!(subtrees = to_delete.len(), "detaching replaced subtrees");
            self.reclaimers.push(reclaim::spawn(to_delete, old_pending));
        }

        shared.episode.fetch_add(1, Ordering::SeqCst);
        shared.playouts.store(0, Ordering::SeqCst);
        shared.positions.store(0, Ordering::SeqCst);
        shared.failed_simulations.store(0, Ordering::SeqCst);
        let prepared = unsafe { (**shared.root.get()).has_children() };
        shared.root_prepared.store(prepared, Ordering::SeqCst);
        shared.root_latch.unlock_exclusive();

        shared.run.store(true, Ordering::SeqCst);
        shared.notify_workers();

        // Wait for the first expansion so there is always something legal
        // to return, unless the limits forbid searching at all. A root
        // expansion already submitted still counts as searching.
        while !shared.root_prepared.load(Ordering::SeqCst)
            && shared.running()
            && !shared.terminate.load(Ordering::SeqCst)
            && (!shared.stop_reached() || shared.episode_in_flight() > 0)
        {
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    /// Walk the existing tree to the new root state. Every step is
    /// verified by replaying the move on the previous root state and
    /// comparing hashes. Detached ancestors are pushed onto `to_delete`,
    /// oldest first.
    fn advance_to_new_rootstate(&mut self, to_delete: &mut Vec<Box<UctNode>>) -> bool {
        let last = match &self.last_rootstate {
            Some(last) => last.clone(),
            None => return false,
        };
        let new = self.game.clone();

        if last.komi() != new.komi() {
            return false;
        }
        let depth = new.movenum() as i64 - last.movenum() as i64;
        if depth < 0 {
            return false;
        }

        let mut test = new.clone();
        for _ in 0..depth {
            if !test.undo() {
                return false;
            }
        }
        if last.hash() != test.hash() {
            return false;
        }

        debug!(depth, "advancing root forward in tree");
        let mut replay = last;
        for _ in 0..depth {
            if !test.forward() {
                return false;
            }
            let mv = match test.last_move() {
                Some(mv) => mv,
                None => return false,
            };

            let placeholder = Box::new(UctNode::new(Move::Pass, 0.0));
            let old_root =
                unsafe { std::mem::replace(&mut *self.shared.root.get(), placeholder) };
            let child = old_root.detach_child(mv);
            to_delete.push(old_root);
            match child {
                Some(subtree) => unsafe {
                    *self.shared.root.get() = subtree;
                },
                None => {
                    debug!(%mv, "tree has not expanded this far");
                    return false;
                }
            }
            if replay.play(mv).is_err() {
                return false;
            }
        }

        // Can still mismatch if the same player moved twice in a row.
        replay.hash() == test.hash()
    }

    fn stop_thinking(&self, elapsed: Duration, time_for_move: Duration) -> bool {
        self.shared.stop_reached() || elapsed >= time_for_move
    }

    /// Estimated playouts still to come, from the measured rate once it is
    /// trustworthy (at least one second and one hundred playouts).
    fn est_playouts_left(&self, elapsed: Duration, time_for_move: Duration) -> u32 {
        let playouts = self.shared.playouts.load(Ordering::SeqCst);
        let playouts_left = self
            .shared
            .max_playouts
            .load(Ordering::SeqCst)
            .saturating_sub(playouts)
            .min(
                self.shared
                    .max_visits
                    .load(Ordering::SeqCst)
                    .saturating_sub(self.shared.root_visits()),
            );

        if elapsed < Duration::from_secs(1) || playouts < 100 {
            return playouts_left;
        }
        let rate = playouts as f64 / elapsed.as_secs_f64();
        let time_left = time_for_move.saturating_sub(elapsed).as_secs_f64();
        playouts_left.min((rate * time_left).ceil() as u32)
    }

    /// Deactivate root children that can no longer catch up with the
    /// leader in the remaining budget. Returns (pruned, total) over the
    /// root's children.
    fn prune_noncontenders(
        &self,
        elapsed: Duration,
        time_for_move: Duration,
        prune: bool,
    ) -> Option<(usize, usize)> {
        let est_left = self.est_playouts_left(elapsed, time_for_move) as i64;
        self.shared.with_root(|root| {
            root.with_children(|children| {
                let mut leader = 0u32;
                for child in children.iter().filter(|c| c.valid()) {
                    leader = leader.max(child.visits());
                }
                let min_required = leader as i64 - est_left;
                let mut pruned = 0;
                for child in children.iter().filter(|c| c.valid()) {
                    let has_enough = child.visits() as i64 >= min_required;
                    if !has_enough {
                        pruned += 1;
                    }
                    if prune {
                        if has_enough {
                            if let Some(node) = child.get() {
                                node.set_active(true);
                            }
                        } else {
                            child.set_active(false);
                        }
                    }
                }
                (pruned, children.len())
            })
        })
    }

    /// Whether a child other than the leader could still win the move.
    /// Stopping early is only worth it when at least half a second of the
    /// budget would be saved, and never when unused time does not carry
    /// over.
    fn have_alternate_moves(&self, elapsed: Duration, time_for_move: Duration) -> bool {
        if !self.shared.options.time_management {
            return true;
        }
        let (pruned, total) = match self.prune_noncontenders(elapsed, time_for_move, true) {
            Some(counts) => counts,
            None => return true,
        };
        if pruned + 1 < total {
            return true;
        }
        if !self.shared.options.can_accumulate_time
            || self.shared.max_playouts.load(Ordering::SeqCst) < UNLIMITED_PLAYOUTS
        {
            return true;
        }
        let saved = time_for_move.saturating_sub(elapsed);
        if saved > Duration::from_millis(500) {
            info!(saved_ms = saved.as_millis() as u64, "only one contender left, stopping early");
            false
        } else {
            true
        }
    }

    /// Run one search episode and return the chosen move.
    pub fn think(&mut self, color: Color, flags: PassFlags) -> Move {
        let start = Instant::now();
        self.game.set_to_move(color);
        self.update_root();

        let time_for_move = Duration::from_millis(self.shared.options.time_for_move_ms);
        let analyze_interval = Duration::from_millis(self.shared.options.analyze_interval_ms);
        debug!(
            %color,
            budget_ms = time_for_move.as_millis() as u64,
            "thinking"
        );

        let mut last_dump = Duration::ZERO;
        loop {
            let elapsed = start.elapsed();
            let keep_running = self.shared.running()
                && !self.stop_thinking(elapsed, time_for_move)
                && self.have_alternate_moves(elapsed, time_for_move);
            if !keep_running {
                break;
            }
            let tick = Duration::from_millis(50)
                .min(time_for_move.saturating_sub(elapsed))
                .max(Duration::from_millis(1));
            std::thread::sleep(tick);
            if start.elapsed() - last_dump > analyze_interval {
                last_dump = start.elapsed();
                self.dump_progress();
            }
        }

        self.shared.run.store(false, Ordering::SeqCst);
        self.shared.notify_workers();

        if node::tree_handle_count() >= self.shared.options.max_tree_size {
            warn!(
                nodes = node::tree_handle_count(),
                cap = self.shared.options.max_tree_size,
                "tree-size cap reached, search stopped early"
            );
        }

        // Reactivate everything pruning deactivated.
        let _ = self.shared.with_root(|root| {
            root.with_children(|children| {
                for child in children {
                    if let Some(node) = child.get() {
                        node.set_active(true);
                    }
                }
            })
        });

        let bestmove = if self.shared.with_root(|root| root.has_children()) {
            self.best_move(color, flags)
        } else {
            Move::Pass
        };

        let stats = self.stats();
        let elapsed = start.elapsed().as_secs_f64().max(1e-3);
        info!(
            %bestmove,
            playouts = stats.playouts,
            visits = stats.root_visits,
            nodes = stats.tree_handles,
            inflated = stats.inflated_nodes,
            playouts_per_s = format!("{:.0}", stats.playouts as f64 / elapsed),
            positions_per_s = format!("{:.0}", stats.positions as f64 / elapsed),
            "episode finished"
        );
        self.dump_stats(color);

        self.last_rootstate = Some(self.game.clone());
        bestmove
    }

    /// Search until `input_pending` reports host input (or a limit is
    /// reached). No move is chosen.
    pub fn ponder<F: Fn() -> bool>(&mut self, input_pending: F) {
        self.update_root();
        let analyze_interval = Duration::from_millis(self.shared.options.analyze_interval_ms);
        let mut last_dump = Instant::now();
        while !input_pending()
            && self.shared.running()
            && !self.shared.stop_reached()
        {
            std::thread::sleep(Duration::from_millis(20));
            if last_dump.elapsed() > analyze_interval {
                last_dump = Instant::now();
                self.dump_progress();
            }
        }
        self.shared.run.store(false, Ordering::SeqCst);
        self.shared.notify_workers();
        self.last_rootstate = Some(self.game.clone());
    }

    /// Root-child statistics for the analysis stream, best first.
    pub fn analysis(&self) -> Vec<AnalysisEntry> {
        let color = self.game.to_move();
        let mut entries = self
            .shared
            .with_root(|root| {
                root.with_children(|children| {
                    children
                        .iter()
                        .filter(|c| c.visits() > 0)
                        .map(|c| {
                            let mut pv = c.mov().to_string();
                            let mut state = self.game.clone();
                            if state.play(c.mov()).is_ok() {
                                if let Some(node) = c.get() {
                                    let mut tail = String::new();
                                    principal_variation(&mut state, node, &mut tail);
                                    if !tail.is_empty() {
                                        pv.push(' ');
                                        pv.push_str(&tail);
                                    }
                                }
                            }
                            AnalysisEntry {
                                mov: c.mov(),
                                visits: c.visits(),
                                winrate: c.raw_eval(color),
                                prior: c.policy(),
                                pv,
                            }
                        })
                        .collect::<Vec<_>>()
                })
            })
            .unwrap_or_default();
        entries.sort_by(|a, b| a.compare(b));
        entries
    }

    fn dump_progress(&self) {
        let stats = self.stats();
        let color = self.game.to_move();
        let winrate = self.shared.with_root(|root| root.raw_eval(color));
        let mut pv = String::new();
        let mut state = self.game.clone();
        self.shared
            .with_root(|root| principal_variation(&mut state, root, &mut pv));
        debug!(
            playouts = stats.playouts,
            positions = stats.positions,
            visits = stats.root_visits,
            winrate = format!("{:.2}%", winrate * 100.0),
            %pv,
            "search progress"
        );
    }

    /// Log the top root children, best first. Always shows at least two
    /// moves so a forced answer still has context.
    fn dump_stats(&self, color: Color) {
        let _ = self.shared.with_root(|root| {
            root.sort_children_by_visits(color);
            root.with_children(|children| {
                if children.first().map_or(true, |c| c.first_visit()) {
                    return;
                }
                for (shown, child) in children.iter().enumerate() {
                    if shown >= 2 && child.visits() == 0 {
                        break;
                    }
                    let mut pv = child.mov().to_string();
                    let mut state = self.game.clone();
                    if state.play(child.mov()).is_ok() {
                        if let Some(node) = child.get() {
                            let mut tail = String::new();
                            principal_variation(&mut state, node, &mut tail);
                            if !tail.is_empty() {
                                pv.push(' ');
                                pv.push_str(&tail);
                            }
                        }
                    }
                    debug!(
                        mv = %child.mov(),
                        visits = child.visits(),
                        winrate = format!("{:.2}%", child.raw_eval(color) * 100.0),
                        prior = format!("{:.2}%", child.policy() * 100.0),
                        %pv,
                        "root child"
                    );
                }
            })
        });
    }

    fn best_move(&mut self, color: Color, flags: PassFlags) -> Move {
        let movenum = self.game.movenum();
        let random_move_count = self.shared.options.random_move_count;

        let chosen = self.shared.with_root(|root| {
            root.sort_children_by_visits(color);
            if movenum < random_move_count {
                root.randomize_first_proportionally(&mut rand::thread_rng());
            }
            root.with_children(|children| {
                children
                    .first()
                    .map(|c| (c.mov(), c.first_visit(), c.raw_eval(color)))
            })
            .flatten()
        });
        let (mut bestmove, first_visit, mut besteval) = match chosen {
            Some(chosen) => chosen,
            None => return Move::Pass,
        };
        if first_visit {
            besteval = 0.5;
        }

        // Best valid alternative to passing, if any.
        let nopass = self.shared.with_root(|root| {
            root.with_children(|children| {
                children
                    .iter()
                    .filter(|c| c.valid() && c.mov() != Move::Pass)
                    .max_by_key(|c| c.visits())
                    .map(|c| (c.mov(), c.first_visit(), c.raw_eval(color)))
            })
            .flatten()
        });

        if flags.no_pass {
            if bestmove == Move::Pass {
                match nopass {
                    Some((mv, nopass_first, eval)) => {
                        info!(%mv, "preferring not to pass");
                        bestmove = mv;
                        besteval = if nopass_first { 1.0 } else { eval };
                    }
                    None => info!("pass is the only acceptable move"),
                }
            }
        } else {
            let relative_score = color.sign() * self.game.final_score();
            if bestmove == Move::Pass {
                if relative_score < 0.0 {
                    match nopass {
                        Some((mv, nopass_first, eval)) => {
                            info!(%mv, "avoiding pass because it loses");
                            bestmove = mv;
                            besteval = if nopass_first { 1.0 } else { eval };
                        }
                        None => info!("passing loses but there is no alternative"),
                    }
                } else if relative_score > 0.0 {
                    debug!("passing wins");
                } else if let Some((mv, nopass_first, eval)) = nopass {
                    // A draw: prefer an alternative that might still win.
                    if !nopass_first && eval > 0.5 {
                        info!(%mv, "avoiding pass, alternative could win");
                        bestmove = mv;
                        besteval = eval;
                    }
                }
            } else if self.game.last_move() == Some(Move::Pass) {
                // Opponent passed and we did not consider passing out.
                if relative_score > 0.0 {
                    info!("passing wins, passing out");
                    bestmove = Move::Pass;
                } else if relative_score == 0.0 && besteval < 0.5 {
                    info!("passing draws, settling on evaluation");
                    bestmove = Move::Pass;
                } else {
                    trace!("passing does not win, playing on");
                }
            }
        }

        if bestmove != Move::Pass && self.should_resign(flags, besteval, color) {
            info!(eval = format!("{:.2}%", besteval * 100.0), "resigning");
            bestmove = Move::Resign;
        }
        bestmove
    }

    fn should_resign(&self, flags: PassFlags, besteval: f32, color: Color) -> bool {
        if flags.no_resign {
            return false;
        }
        let resign_pct = self.shared.options.resign_pct;
        if resign_pct == 0 {
            return false;
        }

        let intersections = self.game.board_size() * self.game.board_size();
        let movenum = self.game.movenum();
        if movenum as usize <= intersections / 4 {
            return false;
        }

        let is_default = resign_pct < 0;
        let threshold = 0.01 * if is_default { 10.0 } else { resign_pct as f32 };
        if besteval > threshold {
            return false;
        }

        let handicap = self.game.handicap();
        if handicap > 0 && color == Color::White && is_default {
            // Allow a lower eval for White in handicap games, blending the
            // thresholds over roughly the first 0.6 * intersections moves.
            let handicap_threshold = threshold / (1 + handicap) as f32;
            let blend = (movenum as f32 / (0.6 * intersections as f32)).min(1.0);
            let blended = blend * threshold + (1.0 - blend) * handicap_threshold;
            if besteval > blended {
                return false;
            }
        }

        true
    }
}

impl<P: Position, N: Network<P>> Drop for UctSearch<P, N> {
    fn drop(&mut self) {
        self.shared.terminate.store(true, Ordering::SeqCst);
        self.shared.run.store(false, Ordering::SeqCst);
        self.shared.notify_workers();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }

        // Let outstanding evaluator callbacks settle while the tree is
        // still alive.
        let pending = {
            self.shared.root_latch.lock_exclusive();
            let pending = unsafe { Arc::clone(&*self.shared.episode_pending.get()) };
            self.shared.root_latch.unlock_exclusive();
            pending
        };
        let deadline = Instant::now() + Duration::from_secs(10);
        while pending.load(Ordering::SeqCst) > 0 {
            if Instant::now() > deadline {
                warn!("evaluator callbacks did not drain, leaking tree");
                std::mem::forget(self.reclaimers.drain(..).collect::<Vec<_>>());
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }

        for reclaimer in self.reclaimers.drain(..) {
            let _ = reclaimer.join();
        }
    }
}
