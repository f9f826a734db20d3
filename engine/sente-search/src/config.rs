//! Search configuration.
//!
//! A `SearchOptions` value is an immutable snapshot captured when the
//! search is constructed; workers read it by reference. Only the playout
//! and visit limits can be adjusted afterwards, through the dedicated
//! setters on the search.

use thiserror::Error;

/// Sentinel for "no playout/visit limit". Half the integer range so that
/// concurrent trailing simulations cannot overflow the comparison.
pub const UNLIMITED_PLAYOUTS: u32 = u32::MAX / 2;

/// Invalid search configuration, reported synchronously.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("num_threads must be greater than 0")]
    NoThreads,
    #[error("max_tree_size must be greater than 0")]
    NoTree,
}

/// Configuration for a parallel PUCT search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Number of long-lived worker threads.
    pub num_threads: usize,

    /// Stop once this many playouts completed in the episode.
    pub max_playouts: u32,

    /// Stop once the root has this many visits.
    pub max_visits: u32,

    /// Stop expanding once the tree holds this many child handles.
    pub max_tree_size: usize,

    /// Exploration constant of the PUCT formula.
    pub puct: f32,

    /// First-play urgency reduction: an unvisited child is scored with the
    /// parent's mean value minus this amount.
    pub fpu_reduction: f32,

    /// First-play urgency reduction applied at the root.
    pub fpu_root_reduction: f32,

    /// Children whose normalised prior falls below this fraction of the
    /// strongest sibling prior are dropped at expansion. The root always
    /// keeps every legal move.
    pub min_psa_ratio: f32,

    /// Evaluate each expansion under a random dihedral symmetry.
    pub use_symmetries: bool,

    /// Resignation threshold in percent. 0 disables resignation, a
    /// negative value selects the built-in default of 10%.
    pub resign_pct: i32,

    /// Pick the first move proportionally to visit counts while the game
    /// has fewer moves than this.
    pub random_move_count: u32,

    /// Wall-clock budget for one `think` call, in milliseconds.
    pub time_for_move_ms: u64,

    /// How often the controller emits search-progress diagnostics, in
    /// milliseconds.
    pub analyze_interval_ms: u64,

    /// Whether unused time carries over to later moves. When it cannot,
    /// pruning never stops the search early.
    pub can_accumulate_time: bool,

    /// Enable pruning of non-contending root children.
    pub time_management: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            num_threads: 2,
            max_playouts: UNLIMITED_PLAYOUTS,
            max_visits: UNLIMITED_PLAYOUTS,
            max_tree_size: 4_000_000,
            puct: 0.8,
            fpu_reduction: 0.25,
            fpu_root_reduction: 0.25,
            min_psa_ratio: 0.0,
            use_symmetries: true,
            resign_pct: -1,
            random_move_count: 0,
            time_for_move_ms: 5_000,
            analyze_interval_ms: 250,
            can_accumulate_time: true,
            time_management: true,
        }
    }
}

impl SearchOptions {
    /// Deterministic single-threaded settings for tests.
    pub fn for_testing() -> Self {
        Self {
            num_threads: 1,
            max_playouts: 100,
            max_visits: UNLIMITED_PLAYOUTS,
            use_symmetries: false,
            time_for_move_ms: 60_000,
            ..Self::default()
        }
    }

    pub fn with_threads(mut self, n: usize) -> Self {
        self.num_threads = n;
        self
    }

    pub fn with_playouts(mut self, n: u32) -> Self {
        self.max_playouts = n.min(UNLIMITED_PLAYOUTS);
        self
    }

    pub fn with_visits(mut self, n: u32) -> Self {
        self.max_visits = n.min(UNLIMITED_PLAYOUTS);
        self
    }

    pub fn with_puct(mut self, c: f32) -> Self {
        self.puct = c;
        self
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.num_threads == 0 {
            return Err(OptionsError::NoThreads);
        }
        if self.max_tree_size == 0 {
            return Err(OptionsError::NoTree);
        }
        Ok(())
    }
}
