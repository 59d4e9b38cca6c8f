//! Online SGD training of the evaluation network.
//!
//! Targets are centipawns relative to the side to move. Each batch performs
//! plain stochastic gradient descent with optional L2 decay, using the same
//! forward formulas as evaluation so that training and play never disagree.

use std::{
    fs,
    io::{BufRead, BufReader, Write},
    path::Path,
};

use crate::{
    board::Board,
    errors::{FenParseError, NetworkError},
    nnue::{feature_index, Accumulator, Network, ACTIVATION_SCALE},
    piece::{Colour, PieceType},
};

const WEIGHT_LIMIT: i32 = 40_000;

#[allow(clippy::cast_possible_truncation)]
fn clamp_weight(value: f64) -> i32 {
    (value.round() as i64).clamp(-i64::from(WEIGHT_LIMIT), i64::from(WEIGHT_LIMIT)) as i32
}

/// Flips a result-derived target so the label is always relative to the
/// side to move in `fen`.
#[must_use]
pub fn orient_target_for_fen(fen: &str, target: i32) -> i32 {
    if target == 0 {
        return 0;
    }
    match fen.split_whitespace().nth(1) {
        Some("b" | "B") => -target,
        _ => target,
    }
}

/// A single training sample: a position and its target evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrainingExample {
    pub fen: String,
    /// Centipawns from the point of view of the side to move in `fen`.
    pub target_cp: i32,
}

/// A mutable network plus atomic checkpointing.
pub struct ParameterSet {
    network: Network,
}

impl ParameterSet {
    #[must_use]
    pub fn new(hidden_size: usize) -> Self {
        Self { network: Network::material_default(hidden_size) }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), NetworkError> {
        self.network = Network::load_from_file(path)?;
        Ok(())
    }

    /// Atomically replaces the checkpoint at `path`: the bytes are written
    /// to a temporary sibling and renamed over the target. If the rename is
    /// refused, the target is removed and the rename retried once before
    /// giving up.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), NetworkError> {
        let path = path.as_ref();
        let mut temp = path.as_os_str().to_owned();
        temp.push(".tmp");
        let temp = std::path::PathBuf::from(temp);

        self.network.save_to_file(&temp)?;

        if let Err(first) = fs::rename(&temp, path) {
            let _ = fs::remove_file(path);
            if fs::rename(&temp, path).is_err() {
                let _ = fs::remove_file(&temp);
                return Err(NetworkError::Io(first));
            }
        }
        Ok(())
    }
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self::new(crate::nnue::DEFAULT_HIDDEN)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TrainerConfig {
    pub learning_rate: f64,
    pub regularisation: f64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self { learning_rate: 0.05, regularisation: 0.0005 }
    }
}

/// Gradient-descent optimiser for the evaluation network.
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    #[must_use]
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    /// What the current parameters predict for `example`, in centipawns
    /// from the side to move.
    pub fn evaluate_example(
        &self,
        example: &TrainingExample,
        parameters: &ParameterSet,
    ) -> Result<i32, FenParseError> {
        let board = Board::from_fen(&example.fen)?;
        let net = parameters.network();
        let mut accum = Accumulator::default();
        net.build_accumulator(&board, &mut accum);
        Ok(net.evaluate(&board, &accum))
    }

    /// One SGD pass over `batch`, applied example by example.
    #[allow(clippy::too_many_lines)]
    pub fn train_batch(
        &self,
        batch: &[TrainingExample],
        parameters: &mut ParameterSet,
    ) -> Result<(), FenParseError> {
        if batch.is_empty() {
            return Ok(());
        }

        let lr = self.config.learning_rate;
        let decay = self.config.regularisation;
        let net = parameters.network_mut();
        let hidden = net.hidden_size();

        let mut white_features = Vec::with_capacity(32);
        let mut black_features = Vec::with_capacity(32);
        let mut white_accum = vec![0i32; hidden];
        let mut black_accum = vec![0i32; hidden];
        let mut activations = vec![0.0f64; hidden];
        let mut derivatives = vec![0.0f64; hidden];

        for example in batch {
            let board = Board::from_fen(&example.fen)?;

            white_features.clear();
            black_features.clear();
            for colour in [Colour::White, Colour::Black] {
                for piece_type in PieceType::all() {
                    for sq in board.pieces(colour, piece_type) {
                        let feature = feature_index(colour, piece_type, sq);
                        match colour {
                            Colour::White => white_features.push(feature),
                            Colour::Black => black_features.push(feature),
                        }
                    }
                }
            }

            white_accum.fill(0);
            black_accum.fill(0);
            for &feature in &white_features {
                for (neuron, value) in white_accum.iter_mut().enumerate() {
                    *value += net.input_weight(feature, neuron);
                }
            }
            for &feature in &black_features {
                for (neuron, value) in black_accum.iter_mut().enumerate() {
                    *value += net.input_weight(feature, neuron);
                }
            }

            let mut raw = f64::from(net.bias());
            for neuron in 0..hidden {
                let pre = white_accum[neuron] - black_accum[neuron] + net.hidden_bias(neuron);
                let tanh_val = (f64::from(pre) / ACTIVATION_SCALE).tanh();
                activations[neuron] = tanh_val * ACTIVATION_SCALE;
                derivatives[neuron] = 1.0 - tanh_val * tanh_val;
                raw += activations[neuron] * f64::from(net.output_weight(neuron));
            }

            let orientation =
                if board.side_to_move() == Colour::White { 1.0 } else { -1.0 };
            let predicted_cp = orientation * raw * f64::from(net.scale());
            let error = f64::from(example.target_cp) - predicted_cp;
            let lr_error = lr * error * orientation * f64::from(net.scale());

            let bias_current = f64::from(net.bias());
            let mut bias_next = bias_current + lr_error;
            if decay > 0.0 {
                bias_next -= decay * bias_current;
            }
            net.set_bias(clamp_weight(bias_next));

            for neuron in 0..hidden {
                let output_current = f64::from(net.output_weight(neuron));
                let mut output_next = output_current + lr_error * activations[neuron];
                if decay > 0.0 {
                    output_next -= decay * output_current;
                }
                #[allow(clippy::cast_possible_truncation)]
                net.set_output_weight(neuron, output_next as f32);

                let grad_pre = lr_error * output_current * derivatives[neuron];
                let hidden_current = f64::from(net.hidden_bias(neuron));
                let mut hidden_next = hidden_current + grad_pre;
                if decay > 0.0 {
                    hidden_next -= decay * hidden_current;
                }
                net.set_hidden_bias(neuron, clamp_weight(hidden_next));

                if grad_pre.abs() < 1e-12 {
                    continue;
                }

                for &feature in &white_features {
                    let current = f64::from(net.input_weight(feature, neuron));
                    let mut next = current + grad_pre;
                    if decay > 0.0 {
                        next -= decay * current;
                    }
                    net.set_input_weight(feature, neuron, clamp_weight(next));
                }
                for &feature in &black_features {
                    let current = f64::from(net.input_weight(feature, neuron));
                    let mut next = current - grad_pre;
                    if decay > 0.0 {
                        next -= decay * current;
                    }
                    net.set_input_weight(feature, neuron, clamp_weight(next));
                }
            }
        }

        Ok(())
    }
}

impl Default for Trainer {
    fn default() -> Self {
        Self::new(TrainerConfig::default())
    }
}

/// Reads `<FEN>|<centipawns>` records, one per line. Blank lines are
/// ignored and malformed numeric fields skipped.
pub fn load_training_file(path: impl AsRef<Path>) -> std::io::Result<Vec<TrainingExample>> {
    let reader = BufReader::new(fs::File::open(path)?);
    let mut data = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let Some((fen, score)) = line.split_once('|') else {
            continue;
        };
        let Ok(target_cp) = score.trim().parse() else {
            continue;
        };
        data.push(TrainingExample { fen: fen.trim().to_string(), target_cp });
    }
    Ok(data)
}

pub fn save_training_file(
    path: impl AsRef<Path>,
    data: &[TrainingExample],
) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    for example in data {
        writeln!(file, "{}|{}", example.fen, example.target_cp)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("chiron-trainer-{}-{name}", std::process::id()))
    }

    #[test]
    fn repeated_training_shrinks_the_error() {
        let example = TrainingExample { fen: "8/8/8/4k3/8/8/4P3/4K3 w - - 0 1".into(), target_cp: 200 };
        let mut parameters = ParameterSet::new(8);
        // a small step size: output-weight updates scale with the
        // activation magnitude, so the single-example loop needs a gentle
        // learning rate to descend instead of oscillating.
        let trainer = Trainer::new(TrainerConfig { learning_rate: 1e-5, regularisation: 0.0 });

        let initial = trainer.evaluate_example(&example, &parameters).unwrap();
        let initial_err = (example.target_cp - initial).abs();
        for _ in 0..100 {
            trainer.train_batch(std::slice::from_ref(&example), &mut parameters).unwrap();
        }
        let trained = trainer.evaluate_example(&example, &parameters).unwrap();
        let trained_err = (example.target_cp - trained).abs();

        assert!(trained_err < initial_err, "error went from {initial_err} to {trained_err}");
        assert!(trained_err < 50);
    }

    #[test]
    fn checkpoint_round_trip_preserves_predictions() {
        let example = TrainingExample { fen: "8/8/8/4k3/8/8/4P3/4K3 w - - 0 1".into(), target_cp: 200 };
        let mut parameters = ParameterSet::default();
        let trainer = Trainer::new(TrainerConfig { learning_rate: 0.1, regularisation: 0.0 });
        trainer.train_batch(std::slice::from_ref(&example), &mut parameters).unwrap();
        let before = trainer.evaluate_example(&example, &parameters).unwrap();

        let path = temp_path("checkpoint.nnue");
        parameters.save(&path).unwrap();
        let mut reloaded = ParameterSet::default();
        reloaded.load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let after = trainer.evaluate_example(&example, &reloaded).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn black_to_move_targets_are_side_relative() {
        // a position where white is a pawn up, seen from black's clock.
        let example = TrainingExample { fen: "4k3/8/8/8/8/8/4P3/4K3 b - - 0 1".into(), target_cp: -100 };
        let parameters = ParameterSet::default();
        let trainer = Trainer::default();
        // black to move sees a negative score out of the box; training
        // toward the oriented target must not blow it up.
        let predicted = trainer.evaluate_example(&example, &parameters).unwrap();
        assert!(predicted < 0);
    }

    #[test]
    fn training_file_round_trips_and_skips_junk() {
        let path = temp_path("data.txt");
        let data = vec![
            TrainingExample { fen: crate::STARTING_FEN.into(), target_cp: 17 },
            TrainingExample { fen: "4k3/8/8/8/8/8/8/4K3 w - - 0 1".into(), target_cp: -1000 },
        ];
        save_training_file(&path, &data).unwrap();

        // sprinkle in junk that the loader must ignore.
        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents.push_str("\nnot a record\nsome/fen|not-a-number\n\n");
        std::fs::write(&path, &contents).unwrap();

        let loaded = load_training_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, data);
    }

    #[test]
    fn save_replaces_existing_checkpoints() {
        let path = temp_path("replace.nnue");
        let parameters = ParameterSet::new(2);
        parameters.save(&path).unwrap();
        let first = std::fs::metadata(&path).unwrap().len();
        let parameters = ParameterSet::new(4);
        parameters.save(&path).unwrap();
        let second = std::fs::metadata(&path).unwrap().len();
        std::fs::remove_file(&path).unwrap();
        assert!(second > first);
    }
}
