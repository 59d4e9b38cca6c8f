#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_const_for_fn,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

//! Chiron, a self-learning chess engine.
//!
//! The crate provides the engine core: a bitboard board representation with
//! incremental Zobrist hashing, a legal move generator, a root-parallel
//! iterative-deepening alpha-beta search, an incrementally updated
//! NNUE-style evaluator, and a self-play orchestrator that retrains the
//! evaluator online from the games it generates. Text front-ends (UCI, CLI)
//! are hosts of this library, not part of it.

mod macros;

pub mod attacks;
pub mod board;
pub mod chessmove;
pub mod elo;
pub mod errors;
pub mod historytable;
pub mod lookups;
pub mod nnue;
pub mod perft;
pub mod pgn;
pub mod piece;
pub mod rng;
pub mod search;
pub mod selfplay;
pub mod squareset;
pub mod teacher;
pub mod threadlocal;
pub mod timemgmt;
pub mod trainer;
pub mod transpositiontable;
pub mod types;

/// The name of the engine.
pub static NAME: &str = "Chiron";
/// The version of the engine.
pub static VERSION: &str = env!("CARGO_PKG_VERSION");

/// The canonical FEN of the standard starting position.
pub static STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
