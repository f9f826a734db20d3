//! Core traits and types for the Sente search engine
//!
//! This crate provides the vocabulary shared by the search engine, the game
//! rules implementations and the host controller:
//! - `Color` and `Move`: player and move identification
//! - `Position`: the rules-engine contract the search is parameterised over
//! - `symmetry`: dihedral board transforms used when evaluating positions

pub mod color;
pub mod position;
pub mod symmetry;
pub mod vertex;

pub use color::Color;
pub use position::{IllegalMove, Position};
pub use vertex::{Move, Vertex};
