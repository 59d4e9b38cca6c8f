use arrayvec::ArrayVec;

use crate::{
    attacks::{bishop_attacks, king_attacks, knight_attacks, pawn_attacks, queen_attacks, rook_attacks},
    board::{Board, CastlingRights},
    chessmove::{Move, MoveFlags},
    piece::{Colour, PieceType},
    squareset::SquareSet,
    types::{Rank, Square},
};

pub const MAX_POSITION_MOVES: usize = 256;

/// A fixed-capacity list of moves. 256 comfortably exceeds the maximum
/// number of moves in any legal chess position.
pub type MoveList = ArrayVec<Move, MAX_POSITION_MOVES>;

static PROMOTION_TARGETS: [PieceType; 4] =
    [PieceType::Queen, PieceType::Rook, PieceType::Bishop, PieceType::Knight];

impl Board {
    /// Emits every pseudo-legal move for the side to move: moves that obey
    /// piece movement rules but may leave the own king in check.
    pub fn generate_pseudo_legal(&self, moves: &mut MoveList) {
        moves.clear();

        let us = self.side_to_move();
        let them = us.flip();
        let friendly = self.occupancy(us);
        let enemy = self.occupancy(them);
        let occupied = self.occupancy_all();

        let promotion_rank = match us {
            Colour::White => Rank::Seven,
            Colour::Black => Rank::Two,
        };
        let double_push_rank = match us {
            Colour::White => Rank::Two,
            Colour::Black => Rank::Seven,
        };

        for from in self.pieces(us, PieceType::Pawn) {
            if let Some(forward) = from.pawn_push(us) {
                if !occupied.contains_square(forward) {
                    if from.rank() == promotion_rank {
                        for promo in PROMOTION_TARGETS {
                            moves.push(Move::new_promo(from, forward, promo, false));
                        }
                    } else {
                        moves.push(Move::new(from, forward, MoveFlags::QUIET));
                        if from.rank() == double_push_rank {
                            let double = forward.pawn_push(us).expect("double push stays on the board");
                            if !occupied.contains_square(double) {
                                moves.push(Move::new(from, double, MoveFlags::DOUBLE_PUSH));
                            }
                        }
                    }
                }
            }

            for to in pawn_attacks(us, from) & enemy {
                if from.rank() == promotion_rank {
                    for promo in PROMOTION_TARGETS {
                        moves.push(Move::new_promo(from, to, promo, true));
                    }
                } else {
                    moves.push(Move::new(from, to, MoveFlags::CAPTURE));
                }
            }

            if let Some(ep_sq) = self.ep_square() {
                if pawn_attacks(us, from).contains_square(ep_sq) {
                    moves.push(Move::new(
                        from,
                        ep_sq,
                        MoveFlags::CAPTURE.union(MoveFlags::EN_PASSANT),
                    ));
                }
            }
        }

        let mut push_piece_moves = |from: Square, targets: SquareSet| {
            for to in targets - friendly {
                let flags =
                    if enemy.contains_square(to) { MoveFlags::CAPTURE } else { MoveFlags::QUIET };
                moves.push(Move::new(from, to, flags));
            }
        };

        for from in self.pieces(us, PieceType::Knight) {
            push_piece_moves(from, knight_attacks(from));
        }
        for from in self.pieces(us, PieceType::Bishop) {
            push_piece_moves(from, bishop_attacks(from, occupied));
        }
        for from in self.pieces(us, PieceType::Rook) {
            push_piece_moves(from, rook_attacks(from, occupied));
        }
        for from in self.pieces(us, PieceType::Queen) {
            push_piece_moves(from, queen_attacks(from, occupied));
        }

        if let Some(from) = self.king_square(us) {
            push_piece_moves(from, king_attacks(from));
            self.generate_castling(us, them, from, moves);
        }
    }

    fn generate_castling(&self, us: Colour, them: Colour, king_sq: Square, moves: &mut MoveList) {
        if self.in_check(us) {
            return;
        }
        let rights = self.castling_rights();
        let (kingside, queenside, rank_base) = match us {
            Colour::White => (CastlingRights::WK, CastlingRights::WQ, 0u8),
            Colour::Black => (CastlingRights::BK, CastlingRights::BQ, 56u8),
        };

        let sq = |offset: u8| Square::new(rank_base + offset).expect("castling squares are on the board");

        // kingside: f and g files must be empty and unattacked.
        if rights.contains(kingside)
            && !self.occupancy_all().contains_square(sq(5))
            && !self.occupancy_all().contains_square(sq(6))
            && !self.is_square_attacked(sq(5), them)
            && !self.is_square_attacked(sq(6), them)
        {
            moves.push(Move::new(king_sq, sq(6), MoveFlags::KING_CASTLE));
        }

        // queenside: b, c and d files empty; c and d unattacked.
        if rights.contains(queenside)
            && !self.occupancy_all().contains_square(sq(1))
            && !self.occupancy_all().contains_square(sq(2))
            && !self.occupancy_all().contains_square(sq(3))
            && !self.is_square_attacked(sq(2), them)
            && !self.is_square_attacked(sq(3), them)
        {
            moves.push(Move::new(king_sq, sq(2), MoveFlags::QUEEN_CASTLE));
        }
    }

    /// Emits exactly the legal moves: pseudo-legal moves filtered by
    /// make / own-king-safe / undo.
    pub fn generate_legal(&mut self, moves: &mut MoveList) {
        let mut pseudo = MoveList::new();
        self.generate_pseudo_legal(&mut pseudo);

        moves.clear();
        let us = self.side_to_move();
        for &m in &pseudo {
            let Ok(state) = self.make_move(m) else {
                continue;
            };
            if !self.in_check(us) {
                moves.push(m);
            }
            self.undo_move(m, &state);
        }
    }

    /// Convenience wrapper used by code that wants an owned list.
    pub fn legal_moves(&mut self) -> MoveList {
        let mut moves = MoveList::new();
        self.generate_legal(&mut moves);
        moves
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twenty_moves_from_the_start() {
        let mut board = Board::starting_position();
        assert_eq!(board.legal_moves().len(), 20);
    }

    #[test]
    fn legal_equals_filtered_pseudo_legal() {
        let fens = [
            crate::STARTING_FEN,
            "rnbq1k1r/pppp1ppp/5n2/4p3/1bB1P3/5N2/PPPP1PPP/RNBQ1RK1 w - - 0 1",
            "r3k2r/pP3ppp/8/3pP3/8/8/PPP3PP/R3K2R w KQkq d6 0 2",
            "8/8/8/8/8/8/PPP5/K6k w - - 0 1",
        ];
        for fen in fens {
            let mut board = Board::from_fen(fen).unwrap();
            let mut pseudo = MoveList::new();
            board.generate_pseudo_legal(&mut pseudo);
            let us = board.side_to_move();
            let mut filtered = Vec::new();
            for &m in &pseudo {
                let state = board.make_move(m).unwrap();
                if !board.in_check(us) {
                    filtered.push(m);
                }
                board.undo_move(m, &state);
            }
            let legal = board.legal_moves();
            assert_eq!(legal.as_slice(), filtered.as_slice(), "{fen}");
        }
    }

    #[test]
    fn pinned_piece_cannot_move() {
        // the e4 knight is pinned against the white king by the e8 rook.
        let mut board = Board::from_fen("4r3/8/8/8/4N3/8/8/4K3 w - - 0 1").unwrap();
        let legal = board.legal_moves();
        assert!(legal.iter().all(|m| m.from() != Square::E4));
    }

    #[test]
    fn castling_blocked_through_attacked_square() {
        // the black rook on f8 attacks f1, barring kingside castling.
        let mut board = Board::from_fen("5r1k/8/8/8/8/8/8/R3K2R w KQ - 0 1").unwrap();
        let legal = board.legal_moves();
        assert!(!legal.iter().any(|m| m.is_kingside_castle()));
        assert!(legal.iter().any(|m| m.is_castle() && !m.is_kingside_castle()));
    }

    #[test]
    fn no_castling_while_in_check() {
        let mut board = Board::from_fen("4r2k/8/8/8/8/8/8/R3K2R w KQ - 0 1").unwrap();
        let legal = board.legal_moves();
        assert!(!legal.iter().any(|m| m.is_castle()));
    }

    #[test]
    fn promotions_generate_all_four_pieces() {
        let mut board = Board::from_fen("8/P6k/8/8/8/8/8/K7 w - - 0 1").unwrap();
        let legal = board.legal_moves();
        let promos: Vec<_> = legal.iter().filter(|m| m.is_promotion()).collect();
        assert_eq!(promos.len(), 4);
    }

    #[test]
    fn stalemate_has_no_legal_moves() {
        let mut board = Board::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        assert!(board.legal_moves().is_empty());
        assert!(!board.in_check(Colour::Black));
    }

    #[test]
    fn checkmate_has_no_legal_moves() {
        let mut board = Board::from_fen("7k/7Q/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        assert!(board.legal_moves().is_empty());
        assert!(board.in_check(Colour::Black));
    }
}
