//! Move-path enumeration, the standard correctness gauntlet for the move
//! generator and make/undo.

use crate::board::{movegen::MoveList, Board};

pub fn perft(board: &mut Board, depth: usize) -> u64 {
    if depth == 0 {
        return 1;
    }

    let mut moves = MoveList::new();
    board.generate_legal(&mut moves);

    if depth == 1 {
        return moves.len() as u64;
    }

    let mut count = 0;
    for &m in &moves {
        let state = board.make_move(m).expect("legal move failed to apply");
        count += perft(board, depth - 1);
        board.undo_move(m, &state);
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(fen: &str, expectations: &[(usize, u64)]) {
        let mut board = Board::from_fen(fen).unwrap();
        for &(depth, expected) in expectations {
            assert_eq!(perft(&mut board, depth), expected, "depth {depth} of {fen}");
        }
    }

    #[test]
    fn start_position_shallow() {
        run(crate::STARTING_FEN, &[(1, 20), (2, 400), (3, 8_902), (4, 197_281)]);
    }

    #[test]
    #[ignore = "slow; run with --ignored for the full gauntlet"]
    fn start_position_deep() {
        run(crate::STARTING_FEN, &[(5, 4_865_609), (6, 119_060_324)]);
    }

    #[test]
    fn italian_structure_shallow() {
        run(
            "rnbq1k1r/pppp1ppp/5n2/4p3/1bB1P3/5N2/PPPP1PPP/RNBQ1RK1 w - - 0 1",
            &[(1, 29), (2, 956), (3, 28_900)],
        );
    }

    #[test]
    #[ignore = "slow; run with --ignored for the full gauntlet"]
    fn italian_structure_deep() {
        run(
            "rnbq1k1r/pppp1ppp/5n2/4p3/1bB1P3/5N2/PPPP1PPP/RNBQ1RK1 w - - 0 1",
            &[(4, 951_029)],
        );
    }

    #[test]
    fn perft_zero_is_one() {
        let mut board = Board::starting_position();
        assert_eq!(perft(&mut board, 0), 1);
    }
}
