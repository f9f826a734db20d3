//! The per-simulation state machine.
//!
//! A simulation walks from the root, classifying each node it enters:
//! terminal positions are scored locally, expanded nodes are descended
//! through the selector under a reader latch, unexpanded nodes are either
//! claimed for expansion (the writer submits the position to the evaluator
//! and returns, still owning the latch) or produce a failure.
//!
//! Virtual-loss custody: a simulation adds one virtual loss to every node
//! it enters, the root included. A completed backup converts those losses
//! into visits; a standard failure walks back removing them; an
//! expansion-coincident failure instead registers with the expansion
//! target, whose expander converts the whole in-flight multiplicity in one
//! backup when the evaluation arrives.

use std::ptr::NonNull;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use rand::Rng;
use smallvec::SmallVec;
use tracing::{trace, warn};

use sente_core::{symmetry, Color, Move, Position};

use crate::network::{NetError, NetResult, Network};
use crate::node::UctNode;
use crate::search::SearchShared;

/// One step of a simulation's path: the node entered and the scaling
/// factor of the edge that led there (uniformly 1.0 unless per-edge
/// weighting is enabled).
#[derive(Clone, Copy)]
pub(crate) struct PathStep {
    pub node: NonNull<UctNode>,
    pub factor: f32,
}

pub(crate) type Path = SmallVec<[PathStep; 64]>;

/// Everything an expansion needs to resume when the evaluator answers.
pub(crate) struct BackupData<P: Position> {
    pub path: Path,
    pub state: P,
    pub symmetry: usize,
    pub pending: Arc<std::sync::atomic::AtomicI32>,
}

// Path nodes stay alive until the episode's pending counter drains; the
// reclaimer enforces that before freeing any detached subtree.
unsafe impl<P: Position> Send for BackupData<P> {}

/// Win-rate (Black's perspective) derived from a final board score.
pub fn eval_from_score(score: f32) -> f32 {
    if score > 0.0 {
        1.0
    } else if score < 0.0 {
        0.0
    } else {
        0.5
    }
}

/// Update every ancestor of the path's last node, leaf-to-root.
fn backup_ancestors(path: &[PathStep], eval: f32, multiplicity: u32) {
    let mut weight = match path.last() {
        Some(step) => step.factor,
        None => return,
    };
    for step in path.iter().rev().skip(1) {
        weight *= step.factor;
        unsafe { step.node.as_ref() }.update(eval * weight, multiplicity);
    }
}

/// Remove `multiplicity` virtual losses from every node on the path.
fn undo_path(path: &[PathStep], multiplicity: u32) {
    for step in path.iter().rev() {
        unsafe { step.node.as_ref() }.undo_virtual_loss(multiplicity);
    }
}

/// Run one simulation from the root. The caller has already registered it
/// with the episode's pending counter. Returns false when the walk merged
/// into (or bounced off) an expansion already in flight, meaning the
/// caller learns nothing by immediately trying again.
pub(crate) fn play_simulation<P: Position, N: Network<P>>(
    shared: &Arc<SearchShared<P, N>>,
    mut state: P,
    root: NonNull<UctNode>,
    pending: Arc<std::sync::atomic::AtomicI32>,
    episode: u32,
) -> bool {
    let options = shared.options();
    let mut path: Path = SmallVec::new();
    let mut node_ptr = root;
    let mut factor = 1.0f32;
    let mut is_root = true;

    loop {
        let node = unsafe { node_ptr.as_ref() };
        node.add_virtual_loss(1);
        path.push(PathStep {
            node: node_ptr,
            factor,
        });

        // Two consecutive passes end the game; score it locally.
        if state.passes() >= 2 {
            let eval = eval_from_score(state.final_score());
            node.update(eval, 1);
            backup_ancestors(&path, eval, 1);
            shared.finish_playout(&pending);
            return true;
        }

        if node.expandable() {
            if node.latch().acquire_writer() {
                node.begin_expansion(episode);
                let sym = if options.use_symmetries {
                    rand::thread_rng().gen_range(0..symmetry::NUM_SYMMETRIES)
                } else {
                    symmetry::IDENTITY
                };
                shared.submit_expansion(BackupData {
                    path,
                    state,
                    symmetry: sym,
                    pending,
                });
                return true;
            }
            // Someone else is expanding this node. If that expansion
            // belongs to our own episode (same root, hence the same path),
            // leave our losses with it; the expander converts the whole
            // in-flight multiplicity in one backup. Expansions from
            // another episode cannot vouch for our path, so unwind.
            if node.expansion_episode() != episode || !node.register_coincident_vl() {
                undo_path(&path, 1);
            }
            shared.fail_simulation(&pending);
            return false;
        }

        if !node.latch().acquire_reader() {
            undo_path(&path, 1);
            shared.fail_simulation(&pending);
            return false;
        }
        let selected = node.select_child(state.to_move(), is_root, options);
        node.latch().release_reader();

        let (child, child_factor) = match selected {
            Some(choice) => choice,
            None => {
                // Every child invalidated: fall back on the stored
                // evaluator win-rate instead of expanding further.
                trace!(mv = %node.mov(), "all children invalidated");
                let eval = node.net_eval(Color::Black);
                node.update(eval, 1);
                backup_ancestors(&path, eval, 1);
                shared.finish_playout(&pending);
                return true;
            }
        };

        let mv = child.mov();
        if state.play(mv).is_err() {
            child.invalidate();
            undo_path(&path, 1);
            shared.fail_simulation(&pending);
            return true;
        }
        if mv != Move::Pass && state.superko() {
            child.invalidate();
            undo_path(&path, 1);
            shared.fail_simulation(&pending);
            return true;
        }

        node_ptr = NonNull::from(child);
        factor = child_factor;
        is_root = false;
    }
}

/// Expansion continuation, run when the evaluator delivers (or fails) a
/// request. The simulation that submitted it still owns the writer latch
/// of the path's last node.
pub(crate) fn complete_expansion<P: Position, N: Network<P>>(
    shared: &Arc<SearchShared<P, N>>,
    bd: BackupData<P>,
    result: Result<NetResult, NetError>,
) {
    let step = match bd.path.last() {
        Some(step) => *step,
        None => return,
    };
    let node = unsafe { step.node.as_ref() };

    let net = match result {
        Ok(net) => net,
        Err(error) => {
            warn!(%error, "evaluation failed, unwinding simulation");
            let multiplicity = node.drain_accumulated_vl();
            node.latch().release_writer(false);
            undo_path(&bd.path, multiplicity);
            shared.settle_expansion(&bd.pending, false);
            return;
        }
    };

    let is_root = bd.path.len() == 1;
    let min_ratio = if is_root {
        0.0
    } else {
        shared.options().min_psa_ratio
    };
    let first_visit = node.first_visit();

    node.create_children(&net, bd.symmetry, &bd.state, min_ratio);
    let multiplicity = node.drain_accumulated_vl();
    let eval = match bd.state.to_move() {
        Color::Black => net.winrate,
        Color::White => 1.0 - net.winrate,
    };
    if first_visit {
        // The in-flight multiplicity observed at expansion time becomes
        // real visits in one step.
        node.update(eval, multiplicity);
    }
    node.latch().release_writer(true);
    if is_root && shared.with_root(|root| std::ptr::eq(root, node)) {
        // Only the current root counts; a stale root expansion from a
        // superseded episode must not signal readiness.
        shared.root_prepared.store(true, Ordering::SeqCst);
    }

    shared.positions.fetch_add(1, Ordering::SeqCst);
    if first_visit {
        backup_ancestors(&bd.path, eval, multiplicity);
        shared.settle_expansion(&bd.pending, true);
    } else {
        undo_path(&bd.path, multiplicity);
        shared.settle_expansion(&bd.pending, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_from_score_orientation() {
        assert_eq!(eval_from_score(3.5), 1.0);
        assert_eq!(eval_from_score(-0.5), 0.0);
        assert_eq!(eval_from_score(0.0), 0.5);
    }

    #[test]
    fn backup_walks_ancestors_only() {
        let grandparent = UctNode::new(Move::Pass, 1.0);
        let parent = UctNode::new(Move::Pass, 1.0);
        let leaf = UctNode::new(Move::Pass, 1.0);
        for node in [&grandparent, &parent, &leaf] {
            node.add_virtual_loss(1);
        }
        let path: Vec<PathStep> = [&grandparent, &parent, &leaf]
            .into_iter()
            .map(|n| PathStep {
                node: NonNull::from(n),
                factor: 1.0,
            })
            .collect();

        backup_ancestors(&path, 1.0, 1);

        assert_eq!(leaf.visits(), 0);
        assert_eq!(parent.visits(), 1);
        assert_eq!(grandparent.visits(), 1);
        assert_eq!(parent.virtual_loss(), 0);
        // The leaf's loss is converted by its own update, not the walk.
        assert_eq!(leaf.virtual_loss(), 1);
    }

    #[test]
    fn undo_path_removes_all_losses() {
        let a = UctNode::new(Move::Pass, 1.0);
        let b = UctNode::new(Move::Pass, 1.0);
        a.add_virtual_loss(2);
        b.add_virtual_loss(2);
        let path: Vec<PathStep> = [&a, &b]
            .into_iter()
            .map(|n| PathStep {
                node: NonNull::from(n),
                factor: 1.0,
            })
            .collect();

        undo_path(&path, 2);
        assert_eq!(a.virtual_loss(), 0);
        assert_eq!(b.virtual_loss(), 0);
    }
}
