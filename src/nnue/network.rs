//! Network parameters and the versioned on-disk format.
//!
//! The file layout is little-endian:
//! magic `NNUE`, `u32` version, `u32` feature count, then for version 2 a
//! `u32` hidden size, `i32` output bias, `f32` scale, the hidden biases as
//! `i16`, the output weights as `f32`, and the input weights as `i16` in
//! row-major `[neuron][feature]` order. Version 1 files carry a single
//! material layer and are upgraded on load.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use crate::{
    errors::NetworkError,
    lookups::PIECE_VALUES,
    piece::{Colour, PieceType},
    types::Square,
};

/// Two colours times six piece kinds times sixty-four squares.
pub const FEATURE_COUNT: usize = 2 * 6 * 64;

/// Hidden layer width used when no file dictates one.
pub const DEFAULT_HIDDEN: usize = 16;

/// Pre-activations are squashed with `tanh(pre / SCALE) * SCALE`.
pub const ACTIVATION_SCALE: f64 = 4096.0;

/// Evaluations are clamped to this magnitude, well below the mate band.
pub const MAX_EVALUATION: i32 = 30_000;

const MAGIC: [u8; 4] = *b"NNUE";
const VERSION_V1: u32 = 1;
const VERSION_V2: u32 = 2;

/// The index into the flattened feature array for a piece on a square.
pub fn feature_index(colour: Colour, piece_type: PieceType, sq: Square) -> usize {
    colour.index() * 6 * 64 + piece_type.index() * 64 + sq.index()
}

/// A compact NNUE-style network: one hidden layer over piece-square
/// features, a scalar output bias, and a centipawn scale.
#[derive(Clone, Debug, PartialEq)]
pub struct Network {
    hidden_size: usize,
    input_weights: Vec<i32>,
    hidden_biases: Vec<i32>,
    output_weights: Vec<f32>,
    bias: i32,
    scale: f32,
}

impl Network {
    fn with_storage(hidden_size: usize) -> Self {
        let hidden_size = hidden_size.max(1);
        Self {
            hidden_size,
            input_weights: vec![0; hidden_size * FEATURE_COUNT],
            hidden_biases: vec![0; hidden_size],
            output_weights: vec![0.0; hidden_size],
            bias: 0,
            scale: 1.0,
        }
    }

    /// A network that reproduces a pure material evaluator: every neuron
    /// carries the static piece values, output weights average the neurons.
    #[must_use]
    pub fn material_default(hidden_size: usize) -> Self {
        let mut net = Self::with_storage(hidden_size);
        #[allow(clippy::cast_precision_loss)]
        let output = 1.0 / net.hidden_size as f32;
        net.output_weights.fill(output);

        for neuron in 0..net.hidden_size {
            for colour in [Colour::White, Colour::Black] {
                for piece_type in PieceType::all() {
                    let value = PIECE_VALUES[piece_type];
                    for sq in Square::all() {
                        let feature = feature_index(colour, piece_type, sq);
                        net.input_weights[neuron * FEATURE_COUNT + feature] = value;
                    }
                }
            }
        }

        net
    }

    pub const fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    pub const fn bias(&self) -> i32 {
        self.bias
    }

    pub const fn scale(&self) -> f32 {
        self.scale
    }

    pub fn set_bias(&mut self, bias: i32) {
        self.bias = bias;
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale;
    }

    pub fn input_weight(&self, feature: usize, neuron: usize) -> i32 {
        self.input_weights[neuron * FEATURE_COUNT + feature]
    }

    pub fn set_input_weight(&mut self, feature: usize, neuron: usize, value: i32) {
        self.input_weights[neuron * FEATURE_COUNT + feature] = value;
    }

    pub fn hidden_bias(&self, neuron: usize) -> i32 {
        self.hidden_biases[neuron]
    }

    pub fn set_hidden_bias(&mut self, neuron: usize, value: i32) {
        self.hidden_biases[neuron] = value;
    }

    pub fn output_weight(&self, neuron: usize) -> f32 {
        self.output_weights[neuron]
    }

    pub fn set_output_weight(&mut self, neuron: usize, value: f32) {
        self.output_weights[neuron] = value;
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, NetworkError> {
        let mut reader = BufReader::new(File::open(path)?);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(NetworkError::BadMagic);
        }

        let version = read_u32(&mut reader)?;
        let feature_count = read_u32(&mut reader)?;
        if feature_count as usize != FEATURE_COUNT {
            return Err(NetworkError::FeatureCountMismatch {
                got: feature_count,
                expected: u32::try_from(FEATURE_COUNT).expect("feature count fits in u32"),
            });
        }

        match version {
            VERSION_V1 => {
                let bias = read_i32(&mut reader)?;
                let scale = read_f32(&mut reader)?;
                let mut net = Self::with_storage(1);
                for feature in 0..FEATURE_COUNT {
                    net.input_weights[feature] = i32::from(read_i16(&mut reader)?);
                }
                net.output_weights.fill(1.0);
                net.bias = bias;
                net.scale = scale;
                Ok(net)
            }
            VERSION_V2 => {
                let hidden_size = read_u32(&mut reader)? as usize;
                let bias = read_i32(&mut reader)?;
                let scale = read_f32(&mut reader)?;
                let mut net = Self::with_storage(hidden_size);
                for neuron in 0..net.hidden_size {
                    net.hidden_biases[neuron] = i32::from(read_i16(&mut reader)?);
                }
                for neuron in 0..net.hidden_size {
                    net.output_weights[neuron] = read_f32(&mut reader)?;
                }
                for weight in &mut net.input_weights {
                    *weight = i32::from(read_i16(&mut reader)?);
                }
                net.bias = bias;
                net.scale = scale;
                Ok(net)
            }
            other => Err(NetworkError::UnsupportedVersion(other)),
        }
    }

    /// Writes the network in the version-2 format. Weights are narrowed to
    /// `i16` on the way out, matching the fixed-precision file layout.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), NetworkError> {
        let mut writer = BufWriter::new(File::create(path)?);

        writer.write_all(&MAGIC)?;
        writer.write_all(&VERSION_V2.to_le_bytes())?;
        let feature_count = u32::try_from(FEATURE_COUNT).expect("feature count fits in u32");
        writer.write_all(&feature_count.to_le_bytes())?;
        let hidden = u32::try_from(self.hidden_size).expect("hidden size fits in u32");
        writer.write_all(&hidden.to_le_bytes())?;
        writer.write_all(&self.bias.to_le_bytes())?;
        writer.write_all(&self.scale.to_le_bytes())?;

        for &bias in &self.hidden_biases {
            write_narrowed_i16(&mut writer, bias)?;
        }
        for &weight in &self.output_weights {
            writer.write_all(&weight.to_le_bytes())?;
        }
        for &weight in &self.input_weights {
            write_narrowed_i16(&mut writer, weight)?;
        }

        writer.flush()?;
        Ok(())
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::material_default(DEFAULT_HIDDEN)
    }
}

fn read_u32(reader: &mut impl Read) -> Result<u32, NetworkError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32(reader: &mut impl Read) -> Result<i32, NetworkError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f32(reader: &mut impl Read) -> Result<f32, NetworkError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn read_i16(reader: &mut impl Read) -> Result<i16, NetworkError> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(i16::from_le_bytes(buf))
}

#[allow(clippy::cast_possible_truncation)]
fn write_narrowed_i16(writer: &mut impl Write, value: i32) -> Result<(), NetworkError> {
    let narrowed = value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
    writer.write_all(&narrowed.to_le_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("chiron-{}-{name}", std::process::id()))
    }

    #[test]
    fn feature_index_layout() {
        assert_eq!(feature_index(Colour::White, PieceType::Pawn, Square::A1), 0);
        assert_eq!(feature_index(Colour::White, PieceType::Knight, Square::A1), 64);
        assert_eq!(feature_index(Colour::Black, PieceType::Pawn, Square::A1), 384);
        assert_eq!(feature_index(Colour::Black, PieceType::King, Square::H8), 767);
    }

    #[test]
    fn save_load_round_trips() {
        let mut net = Network::material_default(4);
        net.set_bias(123);
        net.set_scale(0.75);
        net.set_hidden_bias(2, -55);
        net.set_input_weight(100, 1, 777);
        net.set_output_weight(3, 0.5);

        let path = temp_path("net-roundtrip.nnue");
        net.save_to_file(&path).unwrap();
        let reloaded = Network::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(reloaded, net);
    }

    #[test]
    fn rejects_bad_magic() {
        let path = temp_path("net-bad-magic.nnue");
        std::fs::write(&path, b"JUNKJUNKJUNK").unwrap();
        let err = Network::load_from_file(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, NetworkError::BadMagic));
    }

    #[test]
    fn rejects_wrong_feature_count() {
        let path = temp_path("net-bad-features.nnue");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"NNUE");
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&512u32.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();
        let err = Network::load_from_file(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, NetworkError::FeatureCountMismatch { got: 512, .. }));
    }

    #[test]
    fn upgrades_version_one_files() {
        let path = temp_path("net-v1.nnue");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"NNUE");
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&(FEATURE_COUNT as u32).to_le_bytes());
        bytes.extend_from_slice(&7i32.to_le_bytes());
        bytes.extend_from_slice(&2.0f32.to_le_bytes());
        for i in 0..FEATURE_COUNT {
            #[allow(clippy::cast_possible_truncation)]
            bytes.extend_from_slice(&((i % 100) as i16).to_le_bytes());
        }
        std::fs::write(&path, &bytes).unwrap();
        let net = Network::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(net.hidden_size(), 1);
        assert_eq!(net.bias(), 7);
        assert!((net.scale() - 2.0).abs() < f32::EPSILON);
        assert!((net.output_weight(0) - 1.0).abs() < f32::EPSILON);
        assert_eq!(net.input_weight(99, 0), 99);
    }
}
