//! The self-play orchestrator.
//!
//! Plays engine-vs-engine games on a pool of worker threads, logs results
//! as JSONL and PGN, tracks ratings, and optionally feeds every visited
//! position into the online trainer. After each training flush the updated
//! network checkpoint replaces the engines' network paths, so subsequent
//! games play with the new weights.

use std::{
    collections::HashMap,
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
    time::Instant,
};

use anyhow::{anyhow, Context};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;

use crate::{
    board::Board,
    chessmove::Move,
    elo::EloTracker,
    errors::GameError,
    nnue::{Evaluator, DEFAULT_HIDDEN},
    search::{is_mate_score, Search, SearchLimits, SearchResult, MATE_VALUE},
    teacher::{validate_response, TeacherOracle},
    trainer::{orient_target_for_fen, ParameterSet, Trainer, TrainerConfig, TrainingExample},
};

/// Per-side engine settings for a self-play game.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub name: String,
    pub max_depth: i32,
    /// Transposition table size in entries.
    pub table_size: usize,
    pub network_path: Option<PathBuf>,
    pub threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: crate::NAME.to_string(),
            max_depth: 6,
            table_size: 1 << 20,
            network_path: None,
            threads: 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SelfPlayConfig {
    pub games: u32,
    pub white: EngineConfig,
    pub black: EngineConfig,
    /// Pair up colour assignments so neither engine gets a fixed colour.
    pub alternate_colors: bool,
    /// 0 disables the ply cap.
    pub max_ply: u32,
    pub capture_results: bool,
    pub capture_pgn: bool,
    /// Record every position's FEN into the game record. Forced on when
    /// training is enabled.
    pub record_fens: bool,
    pub verbose: bool,
    pub results_log: Option<PathBuf>,
    pub pgn_path: Option<PathBuf>,
    pub append_logs: bool,
    /// 0 seeds the move-randomization RNG from entropy.
    pub seed: u64,
    /// Number of games played concurrently.
    pub concurrency: usize,
    pub enable_training: bool,
    pub training_batch_size: usize,
    pub training_learning_rate: f64,
    pub training_output_path: Option<PathBuf>,
    pub training_history_dir: Option<PathBuf>,
    pub training_hidden_size: usize,
    /// Positions per request to the teacher engine, when one is attached.
    pub teacher_chunk_size: usize,
    /// Softmax temperature for randomized move selection; 0 is
    /// deterministic.
    pub randomness_temperature: f64,
    /// Apply randomness below this ply; 0 applies it to the entire game.
    pub randomness_max_ply: u32,
    /// Consider at most this many root moves when randomizing; 0 means all.
    pub randomness_top_moves: usize,
    /// Only randomize among moves within this many centipawns of the best.
    pub randomness_score_margin: i32,
}

impl Default for SelfPlayConfig {
    fn default() -> Self {
        Self {
            games: 1,
            white: EngineConfig::default(),
            black: EngineConfig::default(),
            alternate_colors: true,
            max_ply: 1024,
            capture_results: true,
            capture_pgn: true,
            record_fens: false,
            verbose: false,
            results_log: Some(PathBuf::from("selfplay_results.jsonl")),
            pgn_path: Some(PathBuf::from("selfplay_games.pgn")),
            append_logs: true,
            seed: 0,
            concurrency: 1,
            enable_training: false,
            training_batch_size: 256,
            training_learning_rate: 0.05,
            training_output_path: None,
            training_history_dir: None,
            training_hidden_size: DEFAULT_HIDDEN,
            teacher_chunk_size: 256,
            randomness_temperature: 0.7,
            randomness_max_ply: 24,
            randomness_top_moves: 4,
            randomness_score_margin: 40,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GameResult {
    WhiteWin,
    BlackWin,
    Draw,
}

impl GameResult {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WhiteWin => "1-0",
            Self::BlackWin => "0-1",
            Self::Draw => "1/2-1/2",
        }
    }

    pub const fn white_score(self) -> f64 {
        match self {
            Self::WhiteWin => 1.0,
            Self::BlackWin => 0.0,
            Self::Draw => 0.5,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Termination {
    Checkmate,
    Stalemate,
    FiftyMoveRule,
    ThreefoldRepetition,
    InsufficientMaterial,
    MaxPly,
    Draw,
    Error,
}

impl Termination {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Checkmate => "checkmate",
            Self::Stalemate => "stalemate",
            Self::FiftyMoveRule => "fifty-move-rule",
            Self::ThreefoldRepetition => "threefold-repetition",
            Self::InsufficientMaterial => "insufficient-material",
            Self::MaxPly => "max-ply",
            Self::Draw => "draw",
            Self::Error => "error",
        }
    }
}

/// Everything recorded about one finished game.
#[derive(Clone, Debug)]
pub struct GameRecord {
    pub white_player: String,
    pub black_player: String,
    pub result: GameResult,
    pub termination: Termination,
    pub ply_count: u32,
    pub moves_san: Vec<String>,
    pub fens: Vec<String>,
    pub start_fen: String,
    pub end_fen: String,
    pub duration_ms: f64,
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    game: u32,
    white: &'a str,
    black: &'a str,
    result: &'a str,
    termination: &'a str,
    ply_count: u32,
    duration_ms: f64,
    start_fen: &'a str,
    end_fen: &'a str,
    moves: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    fens: Option<&'a [String]>,
}

#[derive(Default)]
struct LogStreams {
    results: Option<BufWriter<fs::File>>,
    pgn: Option<BufWriter<fs::File>>,
    results_failed: bool,
    pgn_failed: bool,
    opened: bool,
}

struct TrainingState {
    trainer: Trainer,
    parameters: ParameterSet,
    buffer: Vec<TrainingExample>,
    teacher_queue: Vec<String>,
    iteration: u32,
    total_collected: usize,
    total_trained: usize,
    history_prefix: String,
    history_extension: String,
    disabled: bool,
    fatal: Option<String>,
}

pub struct SelfPlayOrchestrator {
    config: Mutex<SelfPlayConfig>,
    rng: Mutex<StdRng>,
    logs: Mutex<LogStreams>,
    training: Mutex<TrainingState>,
    teacher: Option<Box<dyn TeacherOracle>>,
    elo: Mutex<EloTracker>,
}

impl SelfPlayOrchestrator {
    #[must_use]
    pub fn new(config: SelfPlayConfig) -> Self {
        Self::with_teacher(config, None)
    }

    #[must_use]
    pub fn with_teacher(mut config: SelfPlayConfig, teacher: Option<Box<dyn TeacherOracle>>) -> Self {
        let rng = if config.seed == 0 {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(config.seed)
        };

        let (history_prefix, history_extension) = history_naming(config.training_output_path.as_deref());

        let mut training = TrainingState {
            trainer: Trainer::new(TrainerConfig {
                learning_rate: config.training_learning_rate,
                regularisation: 0.0005,
            }),
            parameters: ParameterSet::new(config.training_hidden_size),
            buffer: Vec::new(),
            teacher_queue: Vec::new(),
            iteration: 0,
            total_collected: 0,
            total_trained: 0,
            history_prefix,
            history_extension,
            disabled: false,
            fatal: None,
        };

        if config.enable_training {
            config.record_fens = true;
            training.buffer.reserve(config.training_batch_size);
            if let Some(output) = &config.training_output_path {
                if output.exists() {
                    if let Err(err) = training.parameters.load(output) {
                        eprintln!("info string resuming from fresh weights: {err}");
                    } else {
                        if config.white.network_path.is_none() {
                            config.white.network_path = Some(output.clone());
                        }
                        if config.black.network_path.is_none() {
                            config.black.network_path = Some(output.clone());
                        }
                    }
                }
            }
            training.iteration = config.training_history_dir.as_deref().map_or(0, |dir| {
                detect_existing_history_iteration(dir, &training.history_prefix, &training.history_extension)
            });
            training.total_trained = training.iteration as usize * config.training_batch_size;
            training.total_collected = training.total_trained;
        }

        Self {
            config: Mutex::new(config),
            rng: Mutex::new(rng),
            logs: Mutex::new(LogStreams::default()),
            training: Mutex::new(training),
            teacher,
            elo: Mutex::new(EloTracker::default()),
        }
    }

    /// Plays every configured game on `concurrency` worker threads, then
    /// flushes the remaining training buffer. Training failures abort the
    /// run with an error; individual game failures only mark their record.
    pub fn run(&self) -> anyhow::Result<()> {
        self.ensure_streams()?;

        let (total_games, concurrency) = {
            let config = self.lock_config();
            (config.games, config.concurrency.max(1))
        };

        let next_game = AtomicU32::new(0);
        std::thread::scope(|s| {
            for _ in 0..concurrency {
                s.spawn(|| loop {
                    if self.training_fatal() {
                        break;
                    }
                    let game = next_game.fetch_add(1, Ordering::Relaxed);
                    if game >= total_games {
                        break;
                    }
                    let (mut white, mut black, alternate) = {
                        let config = self.lock_config();
                        (config.white.clone(), config.black.clone(), config.alternate_colors)
                    };
                    if alternate && candidate_plays_black(game) {
                        std::mem::swap(&mut white, &mut black);
                    }
                    self.play_game(game, &white, &black, true);
                });
            }
        });

        self.finalize_training()
    }

    /// Plays one game and, when `log_outputs` is set, records it in the
    /// logs, the rating book and the training buffer.
    pub fn play_game(
        &self,
        game_index: u32,
        white: &EngineConfig,
        black: &EngineConfig,
        log_outputs: bool,
    ) -> GameRecord {
        self.log_verbose(|| {
            format!(
                "[Game {}] Start: {} (White, depth {}) vs {} (Black, depth {})",
                game_index + 1,
                white.name,
                white.max_depth,
                black.name,
                black.max_depth
            )
        });

        let record = match self.play_single_game(game_index, white, black) {
            Ok(record) => record,
            Err(err) => {
                self.log_verbose(|| format!("[Game {}] abandoned: {err}", game_index + 1));
                GameRecord {
                    white_player: white.name.clone(),
                    black_player: black.name.clone(),
                    result: GameResult::Draw,
                    termination: Termination::Error,
                    ply_count: 0,
                    moves_san: Vec::new(),
                    fens: Vec::new(),
                    start_fen: crate::STARTING_FEN.to_string(),
                    end_fen: crate::STARTING_FEN.to_string(),
                    duration_ms: 0.0,
                }
            }
        };

        if log_outputs {
            self.log_result(game_index, &record);
            self.write_pgn(game_index, &record);
            if record.termination != Termination::Error {
                self.record_elo(&record);
                self.handle_training(&record);
            }
        }

        self.log_verbose(|| {
            format!(
                "[Game {}] Final: {} ({}) after {} ply in {:.2}s",
                game_index + 1,
                record.result.as_str(),
                record.termination.as_str(),
                record.ply_count,
                record.duration_ms / 1000.0
            )
        });

        record
    }

    #[allow(clippy::too_many_lines)]
    fn play_single_game(
        &self,
        game_index: u32,
        white: &EngineConfig,
        black: &EngineConfig,
    ) -> Result<GameRecord, GameError> {
        let (max_ply, record_fens, randomness) = {
            let config = self.lock_config();
            (
                config.max_ply,
                config.record_fens,
                RandomnessSnapshot {
                    temperature: config.randomness_temperature,
                    max_ply: config.randomness_max_ply,
                    top_moves: config.randomness_top_moves,
                    score_margin: config.randomness_score_margin,
                },
            )
        };

        let mut board = Board::starting_position();

        let mut record = GameRecord {
            white_player: white.name.clone(),
            black_player: black.name.clone(),
            result: GameResult::Draw,
            termination: Termination::Draw,
            ply_count: 0,
            moves_san: Vec::new(),
            fens: Vec::new(),
            start_fen: board.fen(),
            end_fen: String::new(),
            duration_ms: 0.0,
        };

        let mut white_search = build_search(white);
        let mut black_search = build_search(black);
        white_search.new_game();
        black_search.new_game();

        let start_time = Instant::now();

        let mut repetition: HashMap<u64, u32> = HashMap::new();
        repetition.insert(board.zobrist_key(), 1);

        let mut ply = 0u32;
        let mut outcome = None;

        while outcome.is_none() {
            if max_ply > 0 && ply >= max_ply {
                outcome = Some((GameResult::Draw, Termination::MaxPly));
                break;
            }

            let (search, cfg) = if board.side_to_move() == crate::piece::Colour::White {
                (&mut white_search, white)
            } else {
                (&mut black_search, black)
            };

            let limits = SearchLimits::depth(cfg.max_depth);
            let result = search.search(&board, &limits);

            if result.best_move.is_none() {
                // no move to play: the game ended one ply ago.
                let side = board.side_to_move();
                if board.in_check(side) {
                    let winner = if side == crate::piece::Colour::White {
                        GameResult::BlackWin
                    } else {
                        GameResult::WhiteWin
                    };
                    outcome = Some((winner, Termination::Checkmate));
                } else {
                    outcome = Some((GameResult::Draw, Termination::Stalemate));
                }
                break;
            }

            let chosen = self.select_move(&result, ply, &randomness).expect("search found a move");

            self.log_move(game_index, &mut board, cfg, &result, chosen, ply);

            let san = board.move_to_san(chosen)?;
            board.make_move(chosen)?;
            record.moves_san.push(san);
            ply += 1;

            let count = repetition.entry(board.zobrist_key()).or_insert(0);
            *count += 1;
            let repetitions = *count;

            if record_fens {
                record.fens.push(board.fen());
            }

            if board.halfmove_clock() >= 100 {
                outcome = Some((GameResult::Draw, Termination::FiftyMoveRule));
            } else if repetitions >= 3 {
                outcome = Some((GameResult::Draw, Termination::ThreefoldRepetition));
            } else if board.insufficient_material() {
                outcome = Some((GameResult::Draw, Termination::InsufficientMaterial));
            }
        }

        if let Some((result, termination)) = outcome {
            record.result = result;
            record.termination = termination;
        }
        record.end_fen = board.fen();
        record.ply_count = u32::try_from(record.moves_san.len()).unwrap_or(u32::MAX);
        record.duration_ms = start_time.elapsed().as_secs_f64() * 1000.0;

        Ok(record)
    }

    /// Picks the move to play from a finished search: a softmax sample over
    /// the best few root moves early in the game, the top move otherwise.
    fn select_move(
        &self,
        result: &SearchResult,
        ply: u32,
        randomness: &RandomnessSnapshot,
    ) -> Option<Move> {
        let best = result.best_move?;
        let temperature = randomness.temperature;

        let engaged = temperature > 0.0
            && (randomness.max_ply == 0 || ply < randomness.max_ply)
            && result.root_moves.len() >= 2;
        if !engaged {
            return Some(best);
        }

        let k = if randomness.top_moves > 0 {
            randomness.top_moves.min(result.root_moves.len())
        } else {
            result.root_moves.len()
        };
        let top = &result.root_moves[..k];
        let best_score = top[0].score;
        let candidates: Vec<_> = top
            .iter()
            .filter(|rm| best_score - rm.score <= randomness.score_margin)
            .collect();
        if candidates.len() <= 1 {
            return Some(best);
        }

        let weights: Vec<f64> = candidates
            .iter()
            .map(|rm| (f64::from(rm.score - best_score) / temperature).exp())
            .collect();
        let total: f64 = weights.iter().sum();

        let mut roll = self.rng.lock().expect("rng lock poisoned").gen::<f64>() * total;
        for (candidate, weight) in candidates.iter().zip(&weights) {
            roll -= weight;
            if roll <= 0.0 {
                return Some(candidate.m);
            }
        }
        Some(candidates.last().expect("candidate list is non-empty").m)
    }

    fn ensure_streams(&self) -> anyhow::Result<()> {
        // config comes first; the lock order everywhere is
        // training -> config -> logs.
        let (results_path, pgn_path, append) = {
            let config = self.lock_config();
            (
                config.capture_results.then(|| config.results_log.clone()).flatten(),
                config.capture_pgn.then(|| config.pgn_path.clone()).flatten(),
                config.append_logs,
            )
        };

        let mut logs = self.logs.lock().expect("log lock poisoned");
        if logs.opened {
            return Ok(());
        }
        if let Some(path) = results_path {
            logs.results = Some(open_log(&path, append)?);
        }
        if let Some(path) = pgn_path {
            logs.pgn = Some(open_log(&path, append)?);
        }
        logs.opened = true;
        Ok(())
    }

    /// Appends the game as a single JSON line. Log writes are best-effort:
    /// after the first failure the stream is dropped silently.
    fn log_result(&self, game_index: u32, record: &GameRecord) {
        let include_fens = !record.fens.is_empty();
        let json = JsonRecord {
            game: game_index + 1,
            white: &record.white_player,
            black: &record.black_player,
            result: record.result.as_str(),
            termination: record.termination.as_str(),
            ply_count: record.ply_count,
            duration_ms: record.duration_ms,
            start_fen: &record.start_fen,
            end_fen: &record.end_fen,
            moves: &record.moves_san,
            fens: include_fens.then_some(record.fens.as_slice()),
        };
        let Ok(line) = serde_json::to_string(&json) else {
            return;
        };

        let mut logs = self.logs.lock().expect("log lock poisoned");
        if logs.results_failed {
            return;
        }
        if let Some(stream) = &mut logs.results {
            let outcome = writeln!(stream, "{line}").and_then(|()| stream.flush());
            if outcome.is_err() {
                logs.results_failed = true;
            }
        }
    }

    fn write_pgn(&self, game_index: u32, record: &GameRecord) {
        let mut logs = self.logs.lock().expect("log lock poisoned");
        if logs.pgn_failed {
            return;
        }
        let Some(stream) = &mut logs.pgn else {
            return;
        };

        let date = chrono::Local::now().format("%Y.%m.%d");
        let body = format_movetext(&record.moves_san);
        let outcome = write!(
            stream,
            "[Event \"{} self-play\"]\n[Site \"Local\"]\n[Date \"{date}\"]\n[Round \"{}\"]\n\
             [White \"{}\"]\n[Black \"{}\"]\n[Result \"{}\"]\n[Termination \"{}\"]\n\
             [PlyCount \"{}\"]\n[FEN \"{}\"]\n[SetUp \"1\"]\n\n{}{}{}\n\n",
            crate::NAME,
            game_index + 1,
            record.white_player,
            record.black_player,
            record.result.as_str(),
            record.termination.as_str(),
            record.ply_count,
            record.start_fen,
            body,
            if body.is_empty() { "" } else { " " },
            record.result.as_str(),
        )
        .and_then(|()| stream.flush());
        if outcome.is_err() {
            logs.pgn_failed = true;
        }
    }

    fn record_elo(&self, record: &GameRecord) {
        let mut elo = self.elo.lock().expect("elo lock poisoned");
        let update = elo.record_game(
            &record.white_player,
            &record.black_player,
            record.result.white_score(),
        );
        drop(elo);
        self.log_verbose(|| {
            format!(
                "[Elo] {} {:.1} ({:+.1}) | {} {:.1} ({:+.1})",
                update.white.name,
                update.white.rating,
                update.white.delta,
                update.black.name,
                update.black.rating,
                update.black.delta
            )
        });
    }

    /// Queues the game's positions for training and flushes a batch when
    /// enough have accumulated. Runs entirely under the training mutex;
    /// training is rare next to search time, so holding the lock through
    /// the gradient step keeps the contract simple.
    fn handle_training(&self, record: &GameRecord) {
        let config = self.lock_config();
        if !config.enable_training {
            return;
        }
        let batch_size = config.training_batch_size;
        let chunk_size = config.teacher_chunk_size.max(1);
        drop(config);

        let mut training = self.training.lock().expect("training lock poisoned");
        if training.disabled {
            return;
        }

        let target = match record.result {
            GameResult::WhiteWin => 1000,
            GameResult::BlackWin => -1000,
            GameResult::Draw => 0,
        };

        let positions = std::iter::once(&record.start_fen).chain(&record.fens);
        let mut added = 0usize;
        if self.teacher.is_some() {
            for fen in positions {
                training.teacher_queue.push(fen.clone());
                added += 1;
            }
        } else {
            for fen in positions {
                let target_cp = orient_target_for_fen(fen, target);
                training.buffer.push(TrainingExample { fen: fen.clone(), target_cp });
                added += 1;
            }
        }
        training.total_collected += added;
        let buffered = training.buffer.len();
        drop(training);

        self.log_verbose(|| {
            format!("[Train] Collected {added} positions (buffer {buffered}/{batch_size})")
        });

        let mut training = self.training.lock().expect("training lock poisoned");
        self.drain_teacher_queue(&mut training, chunk_size, false);
        self.train_buffer_if_ready(&mut training, batch_size, false);
    }

    /// Ships queued FENs to the teacher in `chunk_size` batches. A short
    /// response poisons the training pipeline for the rest of the run.
    fn drain_teacher_queue(&self, training: &mut TrainingState, chunk_size: usize, force: bool) {
        let Some(teacher) = &self.teacher else {
            return;
        };
        while !training.disabled
            && (training.teacher_queue.len() >= chunk_size
                || (force && !training.teacher_queue.is_empty()))
        {
            let take = chunk_size.min(training.teacher_queue.len());
            let batch: Vec<String> = training.teacher_queue.drain(..take).collect();
            let scored = teacher.evaluate(&batch).and_then(|scores| {
                validate_response(batch.len(), &scores).map(|()| scores)
            });
            match scored {
                Ok(scores) => {
                    for (fen, target_cp) in batch.into_iter().zip(scores) {
                        training.buffer.push(TrainingExample { fen, target_cp });
                    }
                }
                Err(err) => {
                    training.disabled = true;
                    training.fatal = Some(format!("teacher annotation failed: {err}"));
                }
            }
        }
    }

    fn train_buffer_if_ready(&self, training: &mut TrainingState, batch_size: usize, force: bool) {
        if training.disabled || training.buffer.is_empty() {
            return;
        }
        if !force && training.buffer.len() < batch_size {
            return;
        }

        let batch = std::mem::take(&mut training.buffer);
        let batch_len = batch.len();
        let TrainingState { trainer, parameters, .. } = &mut *training;
        if let Err(err) = trainer.train_batch(&batch, parameters) {
            training.disabled = true;
            training.fatal = Some(format!("training batch failed: {err}"));
            return;
        }
        training.total_trained += batch_len;
        training.iteration += 1;
        let iteration = training.iteration;
        let total_trained = training.total_trained;

        if let Err(err) = self.checkpoint(training) {
            training.disabled = true;
            training.fatal = Some(format!("checkpoint failed: {err}"));
            return;
        }

        self.log_verbose(|| {
            format!("[Train] Iteration {iteration} trained on {batch_len} positions (total {total_trained})")
        });
    }

    /// Writes the updated network atomically, mirrors it into the history
    /// directory, and points both engines at the new file.
    fn checkpoint(&self, training: &mut TrainingState) -> anyhow::Result<()> {
        let (output_path, history_dir) = {
            let config = self.lock_config();
            (config.training_output_path.clone(), config.training_history_dir.clone())
        };
        let Some(output_path) = output_path else {
            return Ok(());
        };

        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        training
            .parameters
            .save(&output_path)
            .with_context(|| format!("saving checkpoint to {}", output_path.display()))?;

        {
            let mut config = self.lock_config();
            config.white.network_path = Some(output_path.clone());
            config.black.network_path = Some(output_path.clone());
        }

        if let Some(history_dir) = history_dir {
            fs::create_dir_all(&history_dir)
                .with_context(|| format!("creating {}", history_dir.display()))?;
            let snapshot = history_dir.join(format!(
                "{}-iter{:06}{}",
                training.history_prefix, training.iteration, training.history_extension
            ));
            training
                .parameters
                .save(&snapshot)
                .with_context(|| format!("saving snapshot to {}", snapshot.display()))?;
        }

        Ok(())
    }

    fn finalize_training(&self) -> anyhow::Result<()> {
        let (enabled, batch_size, chunk_size) = {
            let config = self.lock_config();
            (config.enable_training, config.training_batch_size, config.teacher_chunk_size.max(1))
        };
        if enabled {
            let mut training = self.training.lock().expect("training lock poisoned");
            self.drain_teacher_queue(&mut training, chunk_size, true);
            self.train_buffer_if_ready(&mut training, batch_size, true);
        }

        let training = self.training.lock().expect("training lock poisoned");
        match &training.fatal {
            Some(message) => Err(anyhow!("{message}")),
            None => Ok(()),
        }
    }

    /// A snapshot of every tracked player's rating, best first.
    pub fn rating_snapshot(&self) -> Vec<crate::elo::PlayerSummary> {
        self.elo.lock().expect("elo lock poisoned").snapshot()
    }

    fn training_fatal(&self) -> bool {
        self.training.lock().expect("training lock poisoned").fatal.is_some()
    }

    fn lock_config(&self) -> std::sync::MutexGuard<'_, SelfPlayConfig> {
        self.config.lock().expect("config lock poisoned")
    }

    fn log_move(
        &self,
        game_index: u32,
        board: &mut Board,
        cfg: &EngineConfig,
        result: &SearchResult,
        chosen: Move,
        ply: u32,
    ) {
        self.log_verbose(|| {
            let move_number = ply / 2 + 1;
            let dots = if ply % 2 == 0 { "." } else { "..." };
            let san = board.move_to_san(chosen).unwrap_or_else(|_| chosen.to_string());
            let mover = board.side_to_move();
            let mut line = format!(
                "[Game {}] {move_number}{dots} {} plays {san} | eval {} | depth {} | nodes {}",
                game_index + 1,
                cfg.name,
                format_evaluation(result.score, mover),
                result.depth,
                result.nodes
            );
            let pv = pv_to_san(board, &result.pv);
            if !pv.is_empty() {
                line.push_str(" | pv ");
                line.push_str(&pv);
            }
            line
        });
    }

    fn log_verbose(&self, message: impl FnOnce() -> String) {
        let verbose = self.lock_config().verbose;
        if verbose {
            let _logs = self.logs.lock().expect("log lock poisoned");
            println!("{}", message());
        }
    }
}

#[derive(Clone, Copy)]
struct RandomnessSnapshot {
    temperature: f64,
    max_ply: u32,
    top_moves: usize,
    score_margin: i32,
}

fn build_search(config: &EngineConfig) -> Search {
    let evaluator = Arc::new(Evaluator::new(config.network_path.clone()));
    let mut search = Search::new(config.table_size, evaluator);
    search.set_threads(config.threads);
    search
}

/// Colour assignment for paired games: both orders of each pairing appear
/// across rounds, so a deterministic first-move edge cannot bias a match.
pub(crate) fn candidate_plays_black(game_index: u32) -> bool {
    let pair = game_index / 2;
    let parity = game_index % 2;
    (pair % 2 == 0) == (parity == 1)
}

fn open_log(path: &Path, append: bool) -> anyhow::Result<BufWriter<fs::File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .with_context(|| format!("opening log {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn history_naming(output_path: Option<&Path>) -> (String, String) {
    let prefix = output_path
        .and_then(Path::file_stem)
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "chiron-selfplay".to_string());
    let extension = output_path
        .and_then(Path::extension)
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_else(|| ".nnue".to_string());
    (prefix, extension)
}

/// The highest `NNNNNN` among `<prefix>-iterNNNNNN<ext>` files in the
/// history directory, so interrupted runs keep counting upward.
fn detect_existing_history_iteration(dir: &Path, prefix: &str, extension: &str) -> u32 {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let marker = format!("{prefix}-iter");
    entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let stem = name.strip_suffix(extension)?;
            let digits = stem.strip_prefix(&marker)?;
            digits.parse::<u32>().ok()
        })
        .max()
        .unwrap_or(0)
}

fn format_movetext(moves: &[String]) -> String {
    let mut text = String::new();
    for (i, san) in moves.iter().enumerate() {
        if i % 2 == 0 {
            text.push_str(&format!("{}. ", i / 2 + 1));
        }
        text.push_str(san);
        if i + 1 < moves.len() {
            text.push(' ');
        }
    }
    text
}

/// Renders a principal variation as a SAN line, stopping at the first move
/// that fails to apply.
fn pv_to_san(board: &Board, pv: &[Move]) -> String {
    let mut copy = board.clone();
    let mut line = String::new();
    for &m in pv {
        let Ok(san) = copy.move_to_san(m) else {
            break;
        };
        if copy.make_move(m).is_err() {
            break;
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(&san);
    }
    line
}

fn format_evaluation(score: i32, mover: crate::piece::Colour) -> String {
    if is_mate_score(score) {
        let mate_moves = (MATE_VALUE - score.abs() + 1) / 2;
        let winner = if score > 0 { mover } else { mover.flip() };
        let sign = if score < 0 { '-' } else { '+' };
        format!("{sign}M{mate_moves} ({winner} mates in {mate_moves})")
    } else {
        format!("{:+.2} ({score} cp)", f64::from(score) / 100.0)
    }
}
