//! The rules-engine contract the search engine is parameterised over.
//!
//! The search never implements game rules itself; it consumes them through
//! this trait. Implementations carry their own move history so the search
//! can verify tree reuse by replaying moves between two externally advanced
//! states.

use thiserror::Error;

use crate::color::Color;
use crate::vertex::Move;

/// An attempted move that the rules engine refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IllegalMove {
    #[error("vertex is occupied")]
    Occupied,
    #[error("move is suicide")]
    Suicide,
    #[error("move '{0}' cannot be played")]
    Unplayable(Move),
}

/// A game position with history.
///
/// Positions are cloned freely by the search (once per simulation), so
/// implementations should keep `Clone` cheap, e.g. by sharing immutable
/// snapshots.
pub trait Position: Clone + Send + 'static {
    /// Side length of the square board.
    fn board_size(&self) -> usize;

    /// Compensation points added to White's score.
    fn komi(&self) -> f32;

    /// Number of handicap stones the game started with.
    fn handicap(&self) -> u32;

    /// Player to move.
    fn to_move(&self) -> Color;

    /// Force the player to move, e.g. when the host asks the engine to
    /// generate a move for a specific color.
    fn set_to_move(&mut self, color: Color);

    /// Number of consecutive passes ending at the current position.
    fn passes(&self) -> u32;

    /// Number of moves played from the initial position.
    fn movenum(&self) -> u32;

    /// The move that produced the current position, if any.
    fn last_move(&self) -> Option<Move>;

    /// All moves `color` may play, including `Move::Pass`. Superko is not
    /// checked here; it is detected after playing.
    fn legal_moves(&self, color: Color) -> Vec<Move>;

    /// Play a move for the player to move. Superko violations are accepted
    /// here and reported by [`Position::superko`] afterwards.
    fn play(&mut self, mv: Move) -> Result<(), IllegalMove>;

    /// Whether the current position repeats an earlier position of the game
    /// (positional superko).
    fn superko(&self) -> bool;

    /// Final score with dead-stone-free area counting. Positive means Black
    /// wins.
    fn final_score(&self) -> f32;

    /// Hash of the current position including the player to move.
    fn hash(&self) -> u64;

    /// Step one move back in history. Returns false at the initial position.
    fn undo(&mut self) -> bool;

    /// Step one move forward again after [`Position::undo`]. Returns false
    /// when there is nothing to redo.
    fn forward(&mut self) -> bool;
}
