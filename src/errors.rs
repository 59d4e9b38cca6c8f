use std::io;

use thiserror::Error;

/// Errors that can occur when parsing a FEN string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FenParseError {
    #[error("FEN string is missing fields")]
    MissingFields,
    #[error("unexpected character in piece placement: '{0}'")]
    UnexpectedCharacter(char),
    #[error("piece placement ran off the board")]
    PlacementOverflow,
    #[error("expected side to be 'w' or 'b', got \"{0}\"")]
    InvalidSide(String),
    #[error("invalid castling format: \"{0}\"")]
    InvalidCastling(String),
    #[error("invalid en passant square: \"{0}\"")]
    InvalidEnPassant(String),
    #[error("invalid halfmove clock: \"{0}\"")]
    InvalidHalfmoveClock(String),
    #[error("invalid fullmove number: \"{0}\"")]
    InvalidFullmoveNumber(String),
}

/// Errors that can occur when parsing or applying SAN (Standard Algebraic
/// Notation) moves.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanError {
    #[error("invalid san: {0:?}")]
    InvalidSan(String),
    #[error("illegal san: {0:?}")]
    IllegalMove(String),
    #[error("ambiguous san: {0:?}")]
    AmbiguousMove(String),
}

/// Internal consistency violations during make/undo. These indicate a bug in
/// the caller, never a recoverable condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IllegalMoveError {
    #[error("attempted to move a piece from the empty square {0}")]
    EmptyFromSquare(crate::types::Square),
    #[error("capture move without a target piece on {0}")]
    MissingCaptureTarget(crate::types::Square),
}

/// Errors that can occur when loading or saving a network parameter file.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("invalid network file: magic mismatch")]
    BadMagic,
    #[error("unsupported network version: {0}")]
    UnsupportedVersion(u32),
    #[error("unexpected feature count {got}, expected {expected}")]
    FeatureCountMismatch { got: u32, expected: u32 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Errors surfaced by an external teacher engine.
#[derive(Debug, Error)]
pub enum TeacherError {
    #[error("teacher returned {got} scores for {requested} positions")]
    ScoreCountMismatch { requested: usize, got: usize },
    #[error("teacher process failure: {0}")]
    Process(String),
}

/// Errors that can abort a single self-play game. Game failures are logged
/// and the worker moves on to the next game; they never tear down the run.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("failed to parse FEN: {0}")]
    Fen(#[from] FenParseError),
    #[error("failed to render SAN: {0}")]
    San(#[from] SanError),
    #[error("illegal move during play: {0}")]
    IllegalMove(#[from] IllegalMoveError),
}
