//! Sliding-piece attacks, computed ray-by-ray against a blocker set.
//!
//! Rays run until the first blocker inclusive; callers mask out friendly
//! pieces afterwards. Classical ray walks are fast enough here and keep the
//! semantics obvious.

use crate::{
    piece::{Colour, PieceType},
    squareset::SquareSet,
    types::Square,
};

pub use crate::lookups::{king_attacks, knight_attacks, pawn_attacks};

fn ray_attacks(sq: Square, blockers: SquareSet, deltas: &[(i8, i8)]) -> SquareSet {
    let mut attacks = SquareSet::EMPTY;
    let rank = sq.rank().index() as i8;
    let file = sq.file().index() as i8;
    for &(dr, df) in deltas {
        let mut r = rank + dr;
        let mut f = file + df;
        while (0..8).contains(&r) && (0..8).contains(&f) {
            #[allow(clippy::cast_sign_loss)]
            // SAFETY: r and f were both bounds-checked above.
            let target = unsafe { Square::new_unchecked((r * 8 + f) as u8) };
            attacks = attacks.add_square(target);
            if blockers.contains_square(target) {
                break;
            }
            r += dr;
            f += df;
        }
    }
    attacks
}

/// The squares a bishop on `sq` attacks, given `blockers`.
pub fn bishop_attacks(sq: Square, blockers: SquareSet) -> SquareSet {
    ray_attacks(sq, blockers, &[(1, 1), (1, -1), (-1, 1), (-1, -1)])
}

/// The squares a rook on `sq` attacks, given `blockers`.
pub fn rook_attacks(sq: Square, blockers: SquareSet) -> SquareSet {
    ray_attacks(sq, blockers, &[(1, 0), (-1, 0), (0, 1), (0, -1)])
}

/// The squares a queen on `sq` attacks, given `blockers`.
pub fn queen_attacks(sq: Square, blockers: SquareSet) -> SquareSet {
    bishop_attacks(sq, blockers) | rook_attacks(sq, blockers)
}

/// Attack set dispatch for non-pawn piece types.
pub fn attacks_for(piece_type: PieceType, colour: Colour, sq: Square, blockers: SquareSet) -> SquareSet {
    match piece_type {
        PieceType::Pawn => pawn_attacks(colour, sq),
        PieceType::Knight => knight_attacks(sq),
        PieceType::Bishop => bishop_attacks(sq, blockers),
        PieceType::Rook => rook_attacks(sq, blockers),
        PieceType::Queen => queen_attacks(sq, blockers),
        PieceType::King => king_attacks(sq),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rook_on_empty_board() {
        let attacks = rook_attacks(Square::A1, SquareSet::EMPTY);
        assert_eq!(attacks.count(), 14);
        assert!(attacks.contains_square(Square::A8));
        assert!(attacks.contains_square(Square::H1));
        assert!(!attacks.contains_square(Square::B2));
    }

    #[test]
    fn rays_stop_at_first_blocker_inclusive() {
        let blockers = SquareSet::from_square(Square::A4);
        let attacks = rook_attacks(Square::A1, blockers);
        assert!(attacks.contains_square(Square::A4));
        assert!(!attacks.contains_square(Square::A5));
    }

    #[test]
    fn bishop_diagonals() {
        let attacks = bishop_attacks(Square::D4, SquareSet::EMPTY);
        assert_eq!(attacks.count(), 13);
        assert!(attacks.contains_square(Square::A1));
        assert!(attacks.contains_square(Square::H8));
        assert!(attacks.contains_square(Square::A7));
        assert!(attacks.contains_square(Square::G1));
    }

    #[test]
    fn queen_is_bishop_union_rook() {
        let blockers = SquareSet::from_square(Square::D6) | SquareSet::from_square(Square::F4);
        let queen = queen_attacks(Square::D4, blockers);
        assert_eq!(queen, bishop_attacks(Square::D4, blockers) | rook_attacks(Square::D4, blockers));
    }
}
