//! The NNUE-style evaluator: per-colour feature accumulators, a forward
//! pass over the hidden layer, and a lazily-loaded network capability.

pub mod network;

use std::{
    path::{Path, PathBuf},
    sync::{Arc, OnceLock, RwLock},
};

use crate::{
    board::Board,
    chessmove::Move,
    piece::{Colour, PieceType},
};

pub use network::{
    feature_index, Network, ACTIVATION_SCALE, DEFAULT_HIDDEN, FEATURE_COUNT, MAX_EVALUATION,
};

/// The summed input-weight contributions of the active features, one vector
/// per colour. After a full rebuild each neuron equals the sum of weights of
/// that colour's active features.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Accumulator {
    pub white: Vec<i32>,
    pub black: Vec<i32>,
}

impl Accumulator {
    #[must_use]
    pub fn new(hidden_size: usize) -> Self {
        Self { white: vec![0; hidden_size], black: vec![0; hidden_size] }
    }

    pub fn reset(&mut self, hidden_size: usize) {
        self.white.clear();
        self.white.resize(hidden_size, 0);
        self.black.clear();
        self.black.resize(hidden_size, 0);
    }

    fn perspective_mut(&mut self, colour: Colour) -> &mut Vec<i32> {
        match colour {
            Colour::White => &mut self.white,
            Colour::Black => &mut self.black,
        }
    }
}

impl Network {
    fn apply_feature(
        &self,
        accum: &mut Accumulator,
        colour: Colour,
        piece_type: PieceType,
        sq: crate::types::Square,
        sign: i32,
    ) {
        let feature = feature_index(colour, piece_type, sq);
        let side = accum.perspective_mut(colour);
        for (neuron, value) in side.iter_mut().enumerate() {
            *value += sign * self.input_weight(feature, neuron);
        }
    }

    /// Rebuilds the accumulator from nothing by scanning all twelve piece
    /// square-sets.
    pub fn build_accumulator(&self, board: &Board, accum: &mut Accumulator) {
        accum.reset(self.hidden_size());
        for colour in [Colour::White, Colour::Black] {
            for piece_type in PieceType::all() {
                for sq in board.pieces(colour, piece_type) {
                    self.apply_feature(accum, colour, piece_type, sq, 1);
                }
            }
        }
    }

    /// Produces the accumulator for the position after `m`, starting from
    /// the accumulator of `board` (the position before the move).
    pub fn update_accumulator(
        &self,
        board: &Board,
        m: Move,
        base: &Accumulator,
        dest: &mut Accumulator,
    ) {
        dest.clone_from(base);

        let us = board.side_to_move();
        let Some(moving_piece) = board.piece_type_at(m.from()) else {
            return;
        };

        self.apply_feature(dest, us, moving_piece, m.from(), -1);
        let placed_piece = m.promotion().unwrap_or(moving_piece);
        self.apply_feature(dest, us, placed_piece, m.to(), 1);

        if m.is_capture() {
            let them = us.flip();
            if m.is_en_passant() {
                let cap_sq = m.to().pawn_behind(us).expect("en-passant target has a square behind it");
                self.apply_feature(dest, them, PieceType::Pawn, cap_sq, -1);
            } else if let Some(victim) = board.piece_type_at(m.to()) {
                self.apply_feature(dest, them, victim, m.to(), -1);
            }
        }

        if m.is_castle() {
            let (rook_from, rook_to) = match (us, m.is_kingside_castle()) {
                (Colour::White, true) => (crate::types::Square::H1, crate::types::Square::F1),
                (Colour::White, false) => (crate::types::Square::A1, crate::types::Square::D1),
                (Colour::Black, true) => (crate::types::Square::H8, crate::types::Square::F8),
                (Colour::Black, false) => (crate::types::Square::A8, crate::types::Square::D8),
            };
            self.apply_feature(dest, us, PieceType::Rook, rook_from, -1);
            self.apply_feature(dest, us, PieceType::Rook, rook_to, 1);
        }
    }

    /// The raw network output before centipawn scaling and orientation.
    pub fn forward(&self, accum: &Accumulator) -> f64 {
        let mut raw = f64::from(self.bias());
        for neuron in 0..self.hidden_size() {
            let pre = accum.white[neuron] - accum.black[neuron] + self.hidden_bias(neuron);
            let activation = (f64::from(pre) / ACTIVATION_SCALE).tanh() * ACTIVATION_SCALE;
            raw += activation * f64::from(self.output_weight(neuron));
        }
        raw
    }

    /// The centipawn evaluation of `board` from the side to move's
    /// perspective.
    #[allow(clippy::cast_possible_truncation)]
    pub fn evaluate(&self, board: &Board, accum: &Accumulator) -> i32 {
        let scaled = self.forward(accum) * f64::from(self.scale());
        let score = (scaled.round() as i64).clamp(-i64::from(MAX_EVALUATION), i64::from(MAX_EVALUATION)) as i32;
        match board.side_to_move() {
            Colour::White => score,
            Colour::Black => -score,
        }
    }
}

#[derive(Default)]
struct EvaluatorSlot {
    path: Option<PathBuf>,
    network: Option<Arc<Network>>,
}

/// A lazily-loading owner of the evaluation network.
///
/// The first caller to [`Self::network`] triggers the load; failures fall
/// back to the default material weights. Rebinding the path invalidates the
/// cached network, so the next call reloads.
#[derive(Default)]
pub struct Evaluator {
    slot: RwLock<EvaluatorSlot>,
}

impl Evaluator {
    #[must_use]
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { slot: RwLock::new(EvaluatorSlot { path, network: None }) }
    }

    /// Points the evaluator at a new network file and drops the cache.
    pub fn set_network_path(&self, path: impl AsRef<Path>) {
        let mut slot = self.slot.write().expect("evaluator lock poisoned");
        slot.path = Some(path.as_ref().to_path_buf());
        slot.network = None;
    }

    /// The loaded network, loading it on first touch. Concurrent first
    /// callers observe a single completed load.
    pub fn network(&self) -> Arc<Network> {
        {
            let slot = self.slot.read().expect("evaluator lock poisoned");
            if let Some(network) = &slot.network {
                return Arc::clone(network);
            }
        }

        let mut slot = self.slot.write().expect("evaluator lock poisoned");
        if let Some(network) = &slot.network {
            return Arc::clone(network);
        }

        let network = match &slot.path {
            Some(path) => match Network::load_from_file(path) {
                Ok(network) => network,
                Err(err) => {
                    eprintln!("info string network fallback: {err}");
                    Network::default()
                }
            },
            None => Network::default(),
        };
        let network = Arc::new(network);
        slot.network = Some(Arc::clone(&network));
        network
    }
}

/// A process-scoped default evaluator, for hosts that do not manage their
/// own. Nothing in the crate requires using it.
pub fn default_evaluator() -> Arc<Evaluator> {
    static INSTANCE: OnceLock<Arc<Evaluator>> = OnceLock::new();
    Arc::clone(INSTANCE.get_or_init(|| Arc::new(Evaluator::new(None))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::movegen::MoveList;

    #[test]
    fn start_position_evaluates_to_zero() {
        let board = Board::starting_position();
        let net = Network::default();
        let mut accum = Accumulator::default();
        net.build_accumulator(&board, &mut accum);
        assert_eq!(net.evaluate(&board, &accum), 0);
    }

    #[test]
    fn material_imbalance_has_expected_sign() {
        let net = Network::default();
        let mut accum = Accumulator::default();

        let board = Board::from_fen("8/8/8/8/8/8/4P3/7K w - - 0 1").unwrap();
        net.build_accumulator(&board, &mut accum);
        assert!(net.evaluate(&board, &accum) > 0);

        let board = Board::from_fen("8/8/8/8/8/8/4p3/7k w - - 0 1").unwrap();
        net.build_accumulator(&board, &mut accum);
        assert!(net.evaluate(&board, &accum) < 0);
    }

    #[test]
    fn evaluation_flips_with_side_to_move() {
        let net = Network::default();
        let mut accum = Accumulator::default();
        let white_up = "4k3/8/8/8/8/8/4P3/4K3 w - - 0 1";
        let board = Board::from_fen(white_up).unwrap();
        net.build_accumulator(&board, &mut accum);
        let as_white = net.evaluate(&board, &accum);

        let board = Board::from_fen(&white_up.replace(" w ", " b ")).unwrap();
        net.build_accumulator(&board, &mut accum);
        let as_black = net.evaluate(&board, &accum);

        assert!(as_white > 0);
        assert_eq!(as_white, -as_black);
    }

    #[test]
    fn incremental_updates_match_rebuilds() {
        // walk a few plies of a line with a capture, a castle and a double
        // push, updating incrementally and rebuilding at every step.
        let net = Network::default();
        let mut board =
            Board::from_fen("r3k2r/pP3ppp/8/3pP3/8/8/PPP3PP/R3K2R w KQkq d6 0 2").unwrap();
        let mut accum = Accumulator::default();
        net.build_accumulator(&board, &mut accum);

        for _ in 0..4 {
            let mut moves = MoveList::new();
            board.generate_legal(&mut moves);
            let Some(&m) = moves.iter().max_by_key(|m| {
                i32::from(m.is_castle()) * 4
                    + i32::from(m.is_en_passant()) * 3
                    + i32::from(m.is_promotion()) * 2
                    + i32::from(m.is_capture())
            }) else {
                break;
            };

            let mut updated = Accumulator::default();
            net.update_accumulator(&board, m, &accum, &mut updated);
            board.make_move(m).unwrap();

            let mut rebuilt = Accumulator::default();
            net.build_accumulator(&board, &mut rebuilt);
            assert_eq!(updated, rebuilt, "after {m}");
            accum = updated;
        }
    }

    #[test]
    fn lazy_load_falls_back_on_missing_file() {
        let evaluator = Evaluator::new(Some("definitely/not/a/real/path.nnue".into()));
        let network = evaluator.network();
        assert_eq!(network.hidden_size(), DEFAULT_HIDDEN);
        // repeated calls hand back the same cached instance.
        assert!(Arc::ptr_eq(&network, &evaluator.network()));
    }

    #[test]
    fn rebinding_the_path_invalidates_the_cache() {
        let evaluator = Evaluator::new(None);
        let first = evaluator.network();
        evaluator.set_network_path("also/not/a/real/path.nnue");
        let second = evaluator.network();
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
