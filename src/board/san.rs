//! Standard Algebraic Notation rendering and parsing.
//!
//! Rendering disambiguates against the legal move list; parsing is its
//! inverse, matching the input against the rendered form of every legal
//! move.

use crate::{
    board::{movegen::MoveList, Board},
    chessmove::Move,
    errors::SanError,
    piece::PieceType,
};

fn piece_letter(piece_type: PieceType) -> Option<char> {
    match piece_type {
        PieceType::Pawn => None,
        other => Some(other.char().to_ascii_uppercase()),
    }
}

/// Strips check, mate and annotation glyphs, which never disambiguate.
fn canonicalize(san: &str) -> String {
    san.chars().filter(|c| !matches!(c, '+' | '#' | '!' | '?')).collect()
}

impl Board {
    /// Renders `m` in SAN. `m` must be legal in the current position.
    pub fn move_to_san(&mut self, m: Move) -> Result<String, SanError> {
        let mut san = String::with_capacity(8);

        if m.is_castle() {
            san.push_str(if m.is_kingside_castle() { "O-O" } else { "O-O-O" });
        } else {
            let moving_piece = self
                .piece_type_at(m.from())
                .ok_or_else(|| SanError::IllegalMove(m.to_string()))?;

            if let Some(letter) = piece_letter(moving_piece) {
                san.push(letter);

                // another piece of the same kind may reach the same square;
                // add the smallest disambiguator that settles it.
                let mut needs_file = false;
                let mut needs_rank = false;
                let mut conflict = false;
                let mut legal = MoveList::new();
                self.generate_legal(&mut legal);
                for candidate in legal {
                    if candidate.to() == m.to()
                        && candidate.from() != m.from()
                        && self.piece_type_at(candidate.from()) == Some(moving_piece)
                    {
                        conflict = true;
                        if candidate.from().file() == m.from().file() {
                            needs_file = true;
                        }
                        if candidate.from().rank() == m.from().rank() {
                            needs_rank = true;
                        }
                    }
                }
                if conflict {
                    if !needs_file {
                        san.push(m.from().file().char());
                    } else if !needs_rank {
                        san.push(m.from().rank().char());
                    } else {
                        san.push(m.from().file().char());
                        san.push(m.from().rank().char());
                    }
                }
            } else if m.is_capture() {
                san.push(m.from().file().char());
            }

            if m.is_capture() {
                san.push('x');
            }
            san.push_str(m.to().name());

            if let Some(promo) = m.promotion() {
                san.push('=');
                san.push(promo.char().to_ascii_uppercase());
            }
        }

        let state = self.make_move(m).map_err(|_| SanError::IllegalMove(m.to_string()))?;
        let opponent_in_check = self.in_check(self.side_to_move());
        let opponent_has_moves = !self.legal_moves().is_empty();
        self.undo_move(m, &state);

        if opponent_in_check {
            san.push(if opponent_has_moves { '+' } else { '#' });
        }

        Ok(san)
    }

    /// Resolves a SAN string against the current position's legal moves.
    pub fn san_to_move(&mut self, san: &str) -> Result<Move, SanError> {
        let canonical = canonicalize(san);
        if canonical.is_empty() {
            return Err(SanError::InvalidSan(san.to_string()));
        }
        let mut legal = MoveList::new();
        self.generate_legal(&mut legal);
        let mut found = None;
        for m in legal {
            let rendered = self.move_to_san(m)?;
            if canonicalize(&rendered) == canonical {
                if found.is_some() {
                    return Err(SanError::AmbiguousMove(san.to_string()));
                }
                found = Some(m);
            }
        }
        found.ok_or_else(|| SanError::IllegalMove(san.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Square;

    fn play(board: &mut Board, san: &str) {
        let m = board.san_to_move(san).unwrap();
        board.make_move(m).unwrap();
    }

    #[test]
    fn renders_basic_moves() {
        let mut board = Board::starting_position();
        let e4 = board.san_to_move("e4").unwrap();
        assert_eq!(e4.from(), Square::E2);
        assert_eq!(e4.to(), Square::E4);
        assert_eq!(board.move_to_san(e4).unwrap(), "e4");
    }

    #[test]
    fn renders_captures_checks_and_mate() {
        let mut board = Board::starting_position();
        for san in ["e4", "e5", "Qh5", "Ke7"] {
            play(&mut board, san);
        }
        let mate = board.san_to_move("Qxe5").unwrap();
        assert!(mate.is_capture());
        assert_eq!(board.move_to_san(mate).unwrap(), "Qxe5#");
    }

    #[test]
    fn renders_castling() {
        let mut board =
            Board::from_fen("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1").unwrap();
        let kingside = board.san_to_move("O-O").unwrap();
        assert!(kingside.is_kingside_castle());
        let queenside = board.san_to_move("O-O-O").unwrap();
        assert!(queenside.is_castle() && !queenside.is_kingside_castle());
    }

    #[test]
    fn disambiguates_by_file_and_rank() {
        // two knights can reach d2; they sit on the same rank.
        let mut board = Board::from_fen("k7/8/8/8/8/8/8/KN3N2 w - - 0 1").unwrap();
        let m = board.san_to_move("Nbd2").unwrap();
        assert_eq!(m.from(), Square::B1);
        let rendered = board.move_to_san(m).unwrap();
        assert_eq!(rendered, "Nbd2");
    }

    #[test]
    fn renders_promotion() {
        let mut board = Board::from_fen("8/P6k/8/8/8/8/8/K7 w - - 0 1").unwrap();
        let m = board.san_to_move("a8=Q").unwrap();
        assert_eq!(m.promotion(), Some(PieceType::Queen));
        assert!(board.move_to_san(m).unwrap().starts_with("a8=Q"));
    }

    #[test]
    fn rejects_illegal_san() {
        let mut board = Board::starting_position();
        assert!(matches!(board.san_to_move("Qh5"), Err(SanError::IllegalMove(_))));
        assert!(matches!(board.san_to_move(""), Err(SanError::InvalidSan(_))));
    }
}
