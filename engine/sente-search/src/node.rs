//! Tree nodes, child handles and the PUCT selector.
//!
//! A node's child list is a contiguous sequence of small handles. Each
//! handle starts as a stub of move and prior and is inflated into a full
//! node on first visit-through; inflation is one-way and idempotent. The
//! child list itself is installed exactly once, under the node's writer
//! latch, and only ever re-ordered afterwards (under the controller's
//! exclusive latch, never inside the selector).
//!
//! Statistics updated on backup (`visits`, the value sum, `virtual_loss`)
//! are plain atomics updated without holding the latch; the selector is
//! robust to reading them racily.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use once_cell::sync::OnceCell;
use rand::Rng;
use sente_core::{symmetry, Color, Move, Position};

use crate::config::SearchOptions;
use crate::latch::Latch;
use crate::network::NetResult;

/// Total number of child handles alive, across all trees in the process.
static TREE_HANDLES: AtomicUsize = AtomicUsize::new(0);

/// Number of inflated nodes alive.
static INFLATED_NODES: AtomicUsize = AtomicUsize::new(0);

/// Child handles currently alive. The root controller compares this against
/// the tree-size cap.
pub fn tree_handle_count() -> usize {
    TREE_HANDLES.load(Ordering::Relaxed)
}

/// Inflated nodes currently alive.
pub fn inflated_node_count() -> usize {
    INFLATED_NODES.load(Ordering::Relaxed)
}

/// Marks `accumulated_vl` as drained. Set once by the expander and never
/// cleared; late arrivals seeing it fall back to the standard failure
/// discipline. A later expansion attempt (after an evaluator failure)
/// re-opens the field when it seeds its own contribution.
const VL_CLOSED: u32 = 1 << 31;

/// A node of the search tree: one game position reached via a specific
/// last move.
pub struct UctNode {
    mov: Move,
    policy: f32,
    latch: Latch,
    visits: AtomicU32,
    /// Sum of backed-up evaluations from Black's perspective, f64 bits.
    black_evals: AtomicU64,
    /// Raw evaluator win-rate at this node (Black's perspective), f32 bits.
    net_eval: AtomicU32,
    virtual_loss: AtomicU32,
    accumulated_vl: AtomicU32,
    expansion_episode: AtomicU32,
    active: AtomicBool,
    valid: AtomicBool,
    children: UnsafeCell<Vec<NodePointer>>,
}

// The child list is guarded by `latch`; everything else is atomic.
unsafe impl Send for UctNode {}
unsafe impl Sync for UctNode {}

impl UctNode {
    pub fn new(mov: Move, policy: f32) -> Self {
        INFLATED_NODES.fetch_add(1, Ordering::Relaxed);
        Self {
            mov,
            policy,
            latch: Latch::new(),
            visits: AtomicU32::new(0),
            black_evals: AtomicU64::new(0f64.to_bits()),
            net_eval: AtomicU32::new(0.5f32.to_bits()),
            virtual_loss: AtomicU32::new(0),
            accumulated_vl: AtomicU32::new(0),
            expansion_episode: AtomicU32::new(0),
            active: AtomicBool::new(true),
            valid: AtomicBool::new(true),
            children: UnsafeCell::new(Vec::new()),
        }
    }

    #[inline]
    pub fn mov(&self) -> Move {
        self.mov
    }

    #[inline]
    pub fn policy(&self) -> f32 {
        self.policy
    }

    #[inline]
    pub fn latch(&self) -> &Latch {
        &self.latch
    }

    #[inline]
    pub fn visits(&self) -> u32 {
        self.visits.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn first_visit(&self) -> bool {
        self.visits() == 0
    }

    #[inline]
    pub fn has_children(&self) -> bool {
        self.latch.is_expanded()
    }

    /// True until the child list has been populated.
    #[inline]
    pub fn expandable(&self) -> bool {
        !self.latch.is_expanded()
    }

    #[inline]
    pub fn valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    /// Mark the move leading here as proven illegal (superko).
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }

    #[inline]
    pub fn active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    #[inline]
    pub fn virtual_loss(&self) -> u32 {
        self.virtual_loss.load(Ordering::SeqCst)
    }

    /// Add `n` in-flight simulations to this node.
    pub fn add_virtual_loss(&self, n: u32) {
        self.virtual_loss.fetch_add(n, Ordering::SeqCst);
    }

    /// Remove `n` in-flight simulations without recording a visit.
    pub fn undo_virtual_loss(&self, n: u32) {
        let prev = self.virtual_loss.fetch_sub(n, Ordering::SeqCst);
        debug_assert!(prev >= n);
    }

    /// Record `multiplicity` completed simulations carrying `eval` (Black's
    /// perspective), converting the same number of virtual losses.
    pub fn update(&self, eval: f32, multiplicity: u32) {
        self.visits.fetch_add(multiplicity, Ordering::SeqCst);
        atomic_add_f64(&self.black_evals, eval as f64 * multiplicity as f64);
        let prev = self.virtual_loss.fetch_sub(multiplicity, Ordering::SeqCst);
        debug_assert!(prev >= multiplicity);
    }

    /// Mean value from `color`'s perspective. 0.5 before the first visit.
    pub fn raw_eval(&self, color: Color) -> f32 {
        let visits = self.visits();
        if visits == 0 {
            return 0.5;
        }
        let black = f64::from_bits(self.black_evals.load(Ordering::SeqCst)) as f32;
        match color {
            Color::Black => black / visits as f32,
            Color::White => 1.0 - black / visits as f32,
        }
    }

    /// Accumulated wins for `color`, counting each virtual loss as a loss.
    fn wins_for(&self, color: Color) -> f32 {
        let visits = self.visits() as f32;
        let black = f64::from_bits(self.black_evals.load(Ordering::SeqCst)) as f32;
        match color {
            Color::Black => black,
            Color::White => visits - black,
        }
    }

    /// Raw evaluator win-rate from `color`'s perspective.
    pub fn net_eval(&self, color: Color) -> f32 {
        let black = f32::from_bits(self.net_eval.load(Ordering::SeqCst));
        match color {
            Color::Black => black,
            Color::White => 1.0 - black,
        }
    }

    /// Stamp the expanding episode and seed the in-flight accumulator with
    /// the expander's own contribution. Clears a stale drain marker left
    /// by a failed expansion attempt. Caller holds the writer latch.
    pub fn begin_expansion(&self, episode: u32) {
        self.expansion_episode.store(episode, Ordering::SeqCst);
        self.accumulated_vl
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some((v & !VL_CLOSED) + 1)
            })
            .ok();
    }

    /// Episode of the expansion currently (or last) in flight here.
    /// Simulations from other episodes must not merge into it: the
    /// expander settles merged pending slots against its own episode's
    /// counter, and converts losses along its own root path.
    pub fn expansion_episode(&self) -> u32 {
        self.expansion_episode.load(Ordering::SeqCst)
    }

    /// Register an expansion-coincident failure: the caller's virtual
    /// losses stay on the path and the in-flight expander will convert them
    /// on backup. Returns false once the expander has already drained the
    /// field (or the node turned out to be expanded), in which case the
    /// caller must fall back to the standard failure discipline.
    #[must_use]
    pub fn register_coincident_vl(&self) -> bool {
        loop {
            if self.latch.is_expanded() {
                return false;
            }
            let v = self.accumulated_vl.load(Ordering::SeqCst);
            if v & VL_CLOSED != 0 {
                return false;
            }
            if self
                .accumulated_vl
                .compare_exchange_weak(v, v + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Consume the in-flight multiplicity in one step, closing the field
    /// against late registrations. Caller holds the writer latch.
    pub fn drain_accumulated_vl(&self) -> u32 {
        self.accumulated_vl.swap(VL_CLOSED, Ordering::SeqCst) & !VL_CLOSED
    }

    /// In-flight contributions currently registered.
    pub fn accumulated_vl(&self) -> u32 {
        self.accumulated_vl.load(Ordering::SeqCst) & !VL_CLOSED
    }

    /// Install the child list from an evaluator result and record the
    /// node's raw win-rate. The policy arrives in the frame of `symmetry`
    /// and is read back through the transform. Children below
    /// `min_psa_ratio` of the strongest sibling prior are omitted; the
    /// remainder is ordered by prior. Caller holds the writer latch; the
    /// list becomes visible when the latch is released with the expanded
    /// flag.
    pub fn create_children<P: Position>(
        &self,
        result: &NetResult,
        sym: usize,
        state: &P,
        min_psa_ratio: f32,
    ) {
        let size = state.board_size();
        let legal = state.legal_moves(state.to_move());

        let mut priors: Vec<(Move, f32)> = legal
            .into_iter()
            .filter_map(|mv| {
                let index = mv.policy_index(size)?;
                let p = result
                    .policy
                    .get(symmetry::transform_index(sym, index, size))
                    .copied()
                    .unwrap_or(0.0);
                Some((mv, p))
            })
            .collect();

        let total: f32 = priors.iter().map(|(_, p)| p).sum();
        if total > f32::MIN_POSITIVE {
            for (_, p) in priors.iter_mut() {
                *p /= total;
            }
        } else {
            let uniform = 1.0 / priors.len().max(1) as f32;
            for (_, p) in priors.iter_mut() {
                *p = uniform;
            }
        }

        let max_prior = priors.iter().map(|(_, p)| *p).fold(0.0f32, f32::max);
        let cutoff = min_psa_ratio * max_prior;
        priors.retain(|(_, p)| *p >= cutoff);
        priors.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let black_eval = match state.to_move() {
            Color::Black => result.winrate,
            Color::White => 1.0 - result.winrate,
        };
        self.net_eval.store(black_eval.to_bits(), Ordering::SeqCst);

        let children = unsafe { &mut *self.children.get() };
        debug_assert!(children.is_empty());
        children.extend(priors.into_iter().map(|(mv, p)| NodePointer::new(mv, p)));
    }

    /// Run `f` over the child list under a reader latch. `None` when the
    /// node has no children yet or a writer is present.
    pub fn with_children<R>(&self, f: impl FnOnce(&[NodePointer]) -> R) -> Option<R> {
        if !self.latch.acquire_reader() {
            return None;
        }
        let result = f(unsafe { &*self.children.get() });
        self.latch.release_reader();
        Some(result)
    }

    /// PUCT child choice. Caller holds a reader latch on this node.
    ///
    /// Scores every valid (and, at the root, active) child by its mean
    /// value with virtual-loss pessimism plus the exploration term;
    /// unvisited children use the first-play urgency. Ties break on the
    /// higher prior, then on child order. Returns the inflated chosen
    /// child and the backup scaling factor, or `None` when every child has
    /// been invalidated.
    pub fn select_child(
        &self,
        color: Color,
        is_root: bool,
        options: &SearchOptions,
    ) -> Option<(&UctNode, f32)> {
        let children = unsafe { &*self.children.get() };

        let reduction = if is_root {
            options.fpu_root_reduction
        } else {
            options.fpu_reduction
        };
        let fpu_eval = (self.raw_eval(color) - reduction).clamp(0.0, 1.0);

        let mut n_eff = 0u64;
        for child in children {
            if child.valid() {
                n_eff += (child.visits() + child.virtual_loss()) as u64;
            }
        }
        let numerator = (n_eff as f32).sqrt();

        let mut best: Option<&NodePointer> = None;
        let mut best_score = f32::NEG_INFINITY;
        let mut best_policy = f32::NEG_INFINITY;
        for child in children {
            if !child.valid() {
                continue;
            }
            if is_root && !child.active() {
                continue;
            }
            let visits = child.visits();
            let in_flight = (visits + child.virtual_loss()) as f32;
            let q = if visits == 0 {
                fpu_eval
            } else {
                // Visits > 0 implies the handle is inflated.
                let wins = child.get().map_or(0.0, |n| n.wins_for(color));
                wins / in_flight
            };
            let u = options.puct * child.policy() * numerator / (1.0 + in_flight);
            let score = q + u;
            if score > best_score || (score == best_score && child.policy() > best_policy) {
                best = Some(child);
                best_score = score;
                best_policy = child.policy();
            }
        }

        best.map(|child| (child.inflate(), 1.0))
    }

    /// Re-order children by descending visits, breaking ties by the mean
    /// value for `color`. Output paths only.
    pub fn sort_children_by_visits(&self, color: Color) {
        self.latch.lock_exclusive();
        let children = unsafe { &mut *self.children.get() };
        children.sort_by(|a, b| {
            b.visits()
                .cmp(&a.visits())
                .then_with(|| {
                    let ea = a.get().map_or(0.0, |n| n.raw_eval(color));
                    let eb = b.get().map_or(0.0, |n| n.raw_eval(color));
                    eb.partial_cmp(&ea).unwrap_or(std::cmp::Ordering::Equal)
                })
        });
        self.latch.unlock_exclusive();
    }

    /// Swap a child into first place with probability proportional to its
    /// visit count. Used for opening variety.
    pub fn randomize_first_proportionally<R: Rng>(&self, rng: &mut R) {
        self.latch.lock_exclusive();
        let children = unsafe { &mut *self.children.get() };
        let total: u64 = children.iter().map(|c| c.visits() as u64).sum();
        if total > 0 {
            let mut pick = rng.gen_range(0..total);
            for i in 0..children.len() {
                let visits = children[i].visits() as u64;
                if pick < visits {
                    children.swap(0, i);
                    break;
                }
                pick -= visits;
            }
        }
        self.latch.unlock_exclusive();
    }

    /// Detach the subtree reached by `mv`, leaving the handle as an empty
    /// stub. `None` when the tree was never expanded that far.
    pub fn detach_child(&self, mv: Move) -> Option<Box<UctNode>> {
        self.latch.lock_exclusive();
        let children = unsafe { &mut *self.children.get() };
        let taken = children
            .iter_mut()
            .find(|c| c.mov() == mv)
            .and_then(|c| c.take());
        self.latch.unlock_exclusive();
        taken
    }

    /// Number of handles in this subtree, including this node.
    pub fn count_nodes(&self) -> usize {
        1 + self
            .with_children(|children| {
                children
                    .iter()
                    .map(|c| c.get().map_or(0, |n| n.count_nodes()))
                    .sum::<usize>()
                    + children.len()
            })
            .unwrap_or(0)
    }
}

impl Drop for UctNode {
    fn drop(&mut self) {
        INFLATED_NODES.fetch_sub(1, Ordering::Relaxed);
    }
}

/// A child handle: move and prior, lazily inflated into an owning node.
pub struct NodePointer {
    mov: Move,
    policy: f32,
    cell: OnceCell<Box<UctNode>>,
}

impl NodePointer {
    pub fn new(mov: Move, policy: f32) -> Self {
        TREE_HANDLES.fetch_add(1, Ordering::Relaxed);
        Self {
            mov,
            policy,
            cell: OnceCell::new(),
        }
    }

    #[inline]
    pub fn mov(&self) -> Move {
        self.mov
    }

    #[inline]
    pub fn policy(&self) -> f32 {
        self.policy
    }

    /// The inflated node, creating it on first use. Idempotent: every
    /// observer sees the same node.
    pub fn inflate(&self) -> &UctNode {
        self.cell
            .get_or_init(|| Box::new(UctNode::new(self.mov, self.policy)))
    }

    /// The inflated node, if any.
    #[inline]
    pub fn get(&self) -> Option<&UctNode> {
        self.cell.get().map(|b| b.as_ref())
    }

    /// Take ownership of the inflated node, leaving an empty stub.
    pub fn take(&mut self) -> Option<Box<UctNode>> {
        self.cell.take()
    }

    #[inline]
    pub fn visits(&self) -> u32 {
        self.get().map_or(0, |n| n.visits())
    }

    #[inline]
    pub fn virtual_loss(&self) -> u32 {
        self.get().map_or(0, |n| n.virtual_loss())
    }

    #[inline]
    pub fn first_visit(&self) -> bool {
        self.visits() == 0
    }

    /// Mean value for `color`; 0.5 for an unvisited handle.
    pub fn raw_eval(&self, color: Color) -> f32 {
        self.get().map_or(0.5, |n| n.raw_eval(color))
    }

    /// Stubs cannot have been proven illegal yet.
    pub fn valid(&self) -> bool {
        self.get().map_or(true, |n| n.valid())
    }

    /// Stubs are active until pruning touches them.
    pub fn active(&self) -> bool {
        self.get().map_or(true, |n| n.active())
    }

    /// Pruning state is kept on the node, so setting it inflates.
    pub fn set_active(&self, active: bool) {
        self.inflate().set_active(active);
    }
}

impl Drop for NodePointer {
    fn drop(&mut self) {
        TREE_HANDLES.fetch_sub(1, Ordering::Relaxed);
    }
}

fn atomic_add_f64(cell: &AtomicU64, delta: f64) {
    let mut current = cell.load(Ordering::SeqCst);
    loop {
        let next = (f64::from_bits(current) + delta).to_bits();
        match cell.compare_exchange_weak(current, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return,
            Err(observed) => current = observed,
        }
    }
}
