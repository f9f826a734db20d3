//! Go rules engine for the Sente search
//!
//! Implements the [`Position`] contract over a Go board: capture logic,
//! suicide-excluding move generation, incremental Zobrist hashing,
//! positional-superko detection after play, and Tromp-Taylor area scoring.
//! The position keeps its whole history as shared snapshots, which makes
//! cloning cheap (one `Arc` bump per move played) and gives the search the
//! undo/forward walk it needs for hash-verified tree reuse.

mod board;
mod zobrist;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use sente_core::{Color, IllegalMove, Move, Position, Vertex};

use crate::board::GoBoard;
use crate::zobrist::ZOBRIST;

pub use crate::zobrist::MAX_SIZE;

/// One immutable snapshot of the game after a move.
#[derive(Debug)]
struct Entry {
    board: GoBoard,
    to_move: Color,
    passes: u32,
    movenum: u32,
    last: Option<Move>,
}

/// A Go position with full history.
#[derive(Clone)]
pub struct GoPosition {
    komi: f32,
    handicap: u32,
    states: Vec<Arc<Entry>>,
    cur: usize,
}

impl GoPosition {
    /// An empty board with Black to move.
    pub fn new(size: usize, komi: f32) -> Self {
        let initial = Entry {
            board: GoBoard::new(size),
            to_move: Color::Black,
            passes: 0,
            movenum: 0,
            last: None,
        };
        Self {
            komi,
            handicap: 0,
            states: vec![Arc::new(initial)],
            cur: 0,
        }
    }

    fn current(&self) -> &Entry {
        &self.states[self.cur]
    }

    pub fn set_komi(&mut self, komi: f32) {
        self.komi = komi;
    }

    pub fn set_handicap(&mut self, handicap: u32) {
        self.handicap = handicap;
    }

    /// Stone at `v`: 0 empty, 1 black, 2 white.
    pub fn stone_at(&self, v: Vertex) -> u8 {
        self.current().board.get(v)
    }

    /// Text rendering for `showboard`.
    pub fn render(&self) -> String {
        self.current().board.render()
    }
}

impl Position for GoPosition {
    fn board_size(&self) -> usize {
        self.current().board.size()
    }

    fn komi(&self) -> f32 {
        self.komi
    }

    fn handicap(&self) -> u32 {
        self.handicap
    }

    fn to_move(&self) -> Color {
        self.current().to_move
    }

    fn set_to_move(&mut self, color: Color) {
        if self.current().to_move == color {
            return;
        }
        let current = self.current();
        let replaced = Entry {
            board: current.board.clone(),
            to_move: color,
            passes: current.passes,
            movenum: current.movenum,
            last: current.last,
        };
        self.states[self.cur] = Arc::new(replaced);
    }

    fn passes(&self) -> u32 {
        self.current().passes
    }

    fn movenum(&self) -> u32 {
        self.current().movenum
    }

    fn last_move(&self) -> Option<Move> {
        self.current().last
    }

    fn legal_moves(&self, color: Color) -> Vec<Move> {
        let board = &self.current().board;
        let size = board.size();
        let mut moves = Vec::with_capacity(size * size + 1);
        for index in 0..size * size {
            let v = Vertex::from_index(index, size);
            if board.is_legal(v, color) {
                moves.push(Move::Play(v));
            }
        }
        moves.push(Move::Pass);
        moves
    }

    fn play(&mut self, mv: Move) -> Result<(), IllegalMove> {
        let current = self.current();
        let next = match mv {
            Move::Resign => return Err(IllegalMove::Unplayable(mv)),
            Move::Pass => Entry {
                board: current.board.clone(),
                to_move: current.to_move.opponent(),
                passes: current.passes + 1,
                movenum: current.movenum + 1,
                last: Some(Move::Pass),
            },
            Move::Play(v) => {
                let mut board = current.board.clone();
                board.play(v, current.to_move)?;
                Entry {
                    board,
                    to_move: current.to_move.opponent(),
                    passes: 0,
                    movenum: current.movenum + 1,
                    last: Some(mv),
                }
            }
        };
        self.states.truncate(self.cur + 1);
        self.states.push(Arc::new(next));
        self.cur += 1;
        Ok(())
    }

    /// Positional superko: the current stone arrangement already occurred
    /// earlier in the game. Callers check this after placing a stone;
    /// passes repeat the previous arrangement by construction and are not
    /// violations.
    fn superko(&self) -> bool {
        let hash = self.current().board.hash();
        self.states[..self.cur].iter().any(|e| e.board.hash() == hash)
    }

    fn final_score(&self) -> f32 {
        let (black, white) = self.current().board.area();
        black as f32 - white as f32 - self.komi
    }

    fn hash(&self) -> u64 {
        let entry = self.current();
        let mut hash = entry.board.hash();
        if entry.to_move == Color::White {
            hash ^= ZOBRIST.white_to_move;
        }
        hash
    }

    fn undo(&mut self) -> bool {
        if self.cur == 0 {
            return false;
        }
        self.cur -= 1;
        true
    }

    fn forward(&mut self) -> bool {
        if self.cur + 1 >= self.states.len() {
            return false;
        }
        self.cur += 1;
        true
    }
}
