//! Board vertices and moves.
//!
//! A `Vertex` names an intersection on a square board. A `Move` is either a
//! placement on a vertex, a pass, or a resignation (the latter only ever
//! appears as a search result, never inside the tree).

use std::fmt;

use thiserror::Error;

/// GTP column letters skip 'I'.
const COLUMNS: &[u8] = b"ABCDEFGHJKLMNOPQRSTUVWXYZ";

/// An intersection on the board. `x` is the column (0-based from the left),
/// `y` the row (0-based from the bottom).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Vertex {
    pub x: u8,
    pub y: u8,
}

impl Vertex {
    #[inline]
    pub fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }

    /// Linear index on a `size` x `size` board.
    #[inline]
    pub fn index(self, size: usize) -> usize {
        self.y as usize * size + self.x as usize
    }

    /// Inverse of [`Vertex::index`].
    #[inline]
    pub fn from_index(index: usize, size: usize) -> Self {
        Self {
            x: (index % size) as u8,
            y: (index / size) as u8,
        }
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", COLUMNS[self.x as usize] as char, self.y + 1)
    }
}

/// A move in a two-player board game with passing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Move {
    Play(Vertex),
    Pass,
    Resign,
}

/// Error parsing a move from its text form.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid vertex '{0}'")]
pub struct ParseMoveError(pub String);

impl Move {
    /// Index of this move in a policy vector of `size * size + 1` entries,
    /// where the last entry is the pass move. `None` for resignation.
    #[inline]
    pub fn policy_index(self, size: usize) -> Option<usize> {
        match self {
            Move::Play(v) => Some(v.index(size)),
            Move::Pass => Some(size * size),
            Move::Resign => None,
        }
    }

    /// Parse GTP move text ("D4", "pass", "resign").
    pub fn from_text(text: &str, size: usize) -> Result<Move, ParseMoveError> {
        let lower = text.to_ascii_lowercase();
        match lower.as_str() {
            "pass" => return Ok(Move::Pass),
            "resign" => return Ok(Move::Resign),
            _ => {}
        }
        let bytes = text.as_bytes();
        if bytes.len() < 2 {
            return Err(ParseMoveError(text.into()));
        }
        let col = bytes[0].to_ascii_uppercase();
        let x = COLUMNS
            .iter()
            .position(|&c| c == col)
            .ok_or_else(|| ParseMoveError(text.into()))?;
        let y: usize = text[1..]
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .ok_or_else(|| ParseMoveError(text.into()))?;
        if x >= size || y >= size {
            return Err(ParseMoveError(text.into()));
        }
        Ok(Move::Play(Vertex::new(x as u8, y as u8)))
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Move::Play(v) => write!(f, "{v}"),
            Move::Pass => write!(f, "pass"),
            Move::Resign => write!(f, "resign"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_index_roundtrip() {
        let v = Vertex::new(3, 15);
        assert_eq!(Vertex::from_index(v.index(19), 19), v);
    }

    #[test]
    fn policy_index_layout() {
        assert_eq!(Move::Play(Vertex::new(0, 0)).policy_index(9), Some(0));
        assert_eq!(Move::Play(Vertex::new(8, 8)).policy_index(9), Some(80));
        assert_eq!(Move::Pass.policy_index(9), Some(81));
        assert_eq!(Move::Resign.policy_index(9), None);
    }

    #[test]
    fn parse_skips_i_column() {
        // Column J is the 9th file on a GTP board.
        let mv = Move::from_text("J1", 19).unwrap();
        assert_eq!(mv, Move::Play(Vertex::new(8, 0)));
        assert!(Move::from_text("I1", 19).is_err());
    }

    #[test]
    fn parse_pass_and_resign() {
        assert_eq!(Move::from_text("PASS", 19), Ok(Move::Pass));
        assert_eq!(Move::from_text("resign", 19), Ok(Move::Resign));
    }

    #[test]
    fn parse_rejects_off_board() {
        assert!(Move::from_text("T20", 19).is_err());
        assert!(Move::from_text("A0", 19).is_err());
    }

    #[test]
    fn display_roundtrip() {
        for text in ["D4", "Q16", "A1", "T19"] {
            let mv = Move::from_text(text, 19).unwrap();
            assert_eq!(mv.to_string(), text);
        }
    }
}
