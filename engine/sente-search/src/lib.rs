//! Parallel Monte-Carlo tree search with a learned policy-value evaluator.
//!
//! This crate implements the concurrent core of a PUCT engine for
//! two-player zero-sum board games. Many worker threads descend a shared
//! tree, each simulation classifying every node it enters:
//!
//! 1. **Read**: the node has children; pick one by the PUCT criterion with
//!    virtual-loss pessimism and keep descending.
//! 2. **Write**: the node is a frontier leaf; claim it, submit the
//!    position to the asynchronous batched evaluator and return — the
//!    completion callback installs the children and backs the result up
//!    along the recorded path.
//! 3. **Fail**: the node's latch was refused; account the virtual losses
//!    and abandon the walk rather than block.
//! 4. **Backup**: the game ended here (or every child is invalidated);
//!    score locally and back up.
//!
//! Latches never block a worker, so throughput survives the evaluator's
//! batch boundaries at the cost of some wasted walks, which virtual loss
//! steers other workers away from.
//!
//! The rules engine and the evaluator are abstract interfaces
//! ([`sente_core::Position`] and [`Network`]); the search carries no
//! knowledge of any concrete game or model.
//!
//! # Usage
//!
//! ```rust,ignore
//! use games_go::GoPosition;
//! use sente_core::Color;
//! use sente_search::{PassFlags, SearchOptions, UctSearch, UniformNetwork};
//!
//! let game = GoPosition::new(19, 7.5);
//! let options = SearchOptions::default().with_playouts(1600);
//! let mut search = UctSearch::new(game, UniformNetwork::new(), options)?;
//! let mv = search.think(Color::Black, PassFlags::default());
//! ```

pub mod analysis;
pub mod config;
pub mod latch;
pub mod network;
pub mod node;
mod reclaim;
pub mod search;
mod simulation;

pub use analysis::{info_line, AnalysisEntry};
pub use config::{OptionsError, SearchOptions, UNLIMITED_PLAYOUTS};
pub use network::{
    uniform_result, BatchedNetwork, EvalFn, NetCallback, NetError, NetResult, Network,
    UniformNetwork,
};
pub use node::{inflated_node_count, tree_handle_count, NodePointer, UctNode};
pub use search::{PassFlags, SearchStats, UctSearch};
pub use simulation::eval_from_score;
