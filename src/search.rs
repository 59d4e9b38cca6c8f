//! Iterative-deepening negamax with aspiration windows, null-move pruning,
//! late-move reduction, quiescence, and root-parallel workers.
//!
//! Worker 0 is the calling thread. Helper workers pull root-move indices
//! from an atomic counter, search below a shared alpha, and raise a shared
//! cutoff flag on a beta cut; everything else they touch is their own
//! [`SearchContext`].

use std::{
    sync::{
        atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use crate::{
    board::{movegen::MoveList, Board},
    chessmove::Move,
    lookups::mvv_lva_score,
    nnue::{Evaluator, Network},
    piece::PieceType,
    threadlocal::SearchContext,
    timemgmt::{TimeAllocator, TimeManager},
    transpositiontable::{Flag, TranspositionTable},
};

pub const INFINITY: i32 = 32_000;
pub const MATE_VALUE: i32 = 32_000;
pub const MATE_SCORE_THRESHOLD: i32 = MATE_VALUE - 512;
pub const DRAW_SCORE: i32 = 0;
pub const MAX_DEPTH: i32 = 128;

const ASPIRATION_WINDOW: i32 = 18;
const NULL_MOVE_REDUCTION: i32 = 2;

pub const fn is_mate_score(score: i32) -> bool {
    score.abs() > MATE_SCORE_THRESHOLD
}

/// Limits for one root search, as handed over by the host.
#[derive(Clone, Debug)]
pub struct SearchLimits {
    pub max_depth: i32,
    /// 0 disables the node limit.
    pub node_limit: u64,
    /// A fixed time allocation; negative means unset.
    pub move_time_ms: i64,
    pub time_left_ms: [i64; 2],
    pub increment_ms: [i64; 2],
    pub moves_to_go: u32,
    pub infinite: bool,
    pub ponder: bool,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_depth: 64,
            node_limit: 0,
            move_time_ms: -1,
            time_left_ms: [0; 2],
            increment_ms: [0; 2],
            moves_to_go: 0,
            infinite: false,
            ponder: false,
        }
    }
}

impl SearchLimits {
    #[must_use]
    pub fn depth(max_depth: i32) -> Self {
        Self { max_depth, ..Self::default() }
    }
}

/// A root move with the score it received in the last completed iteration.
#[derive(Clone, Copy, Debug)]
pub struct RootMove {
    pub m: Move,
    pub score: i32,
}

/// Aggregated information from the last completed search iteration.
#[derive(Clone, Debug, Default)]
pub struct SearchResult {
    pub best_move: Option<Move>,
    pub score: i32,
    pub depth: i32,
    pub seldepth: i32,
    pub nodes: u64,
    pub pv: Vec<Move>,
    pub elapsed: Duration,
    /// Root moves ordered by score descending; read-only for callers.
    pub root_moves: Vec<RootMove>,
}

pub struct Search {
    tt: TranspositionTable,
    evaluator: Arc<Evaluator>,
    time_allocator: Box<dyn TimeAllocator>,
    contexts: Vec<SearchContext>,
    thread_count: usize,
}

impl Search {
    #[must_use]
    pub fn new(tt_entries: usize, evaluator: Arc<Evaluator>) -> Self {
        Self {
            tt: TranspositionTable::new(tt_entries),
            evaluator,
            time_allocator: Box::new(TimeManager::default()),
            contexts: Vec::new(),
            thread_count: 1,
        }
    }

    pub fn set_threads(&mut self, threads: usize) {
        self.thread_count = threads.max(1);
    }

    pub fn set_table_size_mb(&mut self, megabytes: usize) {
        let bytes = megabytes * 1024 * 1024;
        self.tt.resize(bytes / 16);
    }

    pub fn set_time_allocator(&mut self, allocator: Box<dyn TimeAllocator>) {
        self.time_allocator = allocator;
    }

    pub fn set_evaluator(&mut self, evaluator: Arc<Evaluator>) {
        self.evaluator = evaluator;
    }

    /// Clears the transposition table and all per-worker heuristics.
    pub fn new_game(&mut self) {
        self.tt.clear();
        for ctx in &mut self.contexts {
            ctx.reset();
        }
    }

    /// Searches with an internal stop flag and no info reporting.
    pub fn search(&mut self, board: &Board, limits: &SearchLimits) -> SearchResult {
        let stop = AtomicBool::new(false);
        self.search_with(board, limits, &stop, None)
    }

    /// Searches with external stop control and per-iteration info reporting.
    #[allow(clippy::too_many_lines)]
    pub fn search_with(
        &mut self,
        board: &Board,
        limits: &SearchLimits,
        stop_flag: &AtomicBool,
        info_cb: Option<&dyn Fn(&SearchResult)>,
    ) -> SearchResult {
        let network = self.evaluator.network();
        let start_time = Instant::now();
        let time_budget_ms = self.compute_time_budget(board, limits);

        let max_depth = limits.max_depth.clamp(1, MAX_DEPTH);
        while self.contexts.len() < self.thread_count {
            self.contexts.push(SearchContext::new(max_depth, network.hidden_size()));
        }
        for ctx in &mut self.contexts {
            ctx.ensure_capacity(max_depth, network.hidden_size());
            ctx.reset();
        }

        self.tt.new_search();

        let mut root_accumulator = crate::nnue::Accumulator::new(network.hidden_size());
        network.build_accumulator(board, &mut root_accumulator);

        let job = SearchJob {
            tt: &self.tt,
            network: network.as_ref(),
            stop: stop_flag,
            nodes: AtomicU64::new(0),
            seldepth: AtomicI32::new(0),
            start_time,
            time_budget_ms,
            node_limit: limits.node_limit,
        };

        let mut best = SearchResult::default();
        let mut last_best: Option<Move> = None;
        let mut aspiration = ASPIRATION_WINDOW;
        let mut previous_score = 0;

        for depth in 1..=max_depth {
            if job.should_stop() {
                break;
            }

            for ctx in &mut self.contexts {
                ctx.repetition_stack.clear();
                ctx.repetition_stack.push(board.zobrist_key());
                ctx.accumulators[0].clone_from(&root_accumulator);
            }

            let mut alpha = (-INFINITY).max(previous_score - aspiration);
            let mut beta = INFINITY.min(previous_score + aspiration);
            let mut score = 0;
            let mut completed_window = false;
            let mut iteration = RootOutcome::default();

            loop {
                iteration =
                    job.search_root(&mut self.contexts, board, depth, alpha, beta, self.thread_count);
                score = iteration.score;
                if stop_flag.load(Ordering::SeqCst) {
                    break;
                }

                let mut widened = false;
                if score <= alpha {
                    if alpha <= -INFINITY {
                        completed_window = true;
                        break;
                    }
                    alpha = (-INFINITY).max(alpha - aspiration);
                    widened = true;
                } else if score >= beta {
                    if beta >= INFINITY {
                        completed_window = true;
                        break;
                    }
                    beta = INFINITY.min(beta + aspiration);
                    widened = true;
                } else {
                    completed_window = true;
                    break;
                }

                if widened {
                    aspiration = (aspiration * 2).min(INFINITY);
                    if aspiration > INFINITY / 2 {
                        alpha = -INFINITY;
                        beta = INFINITY;
                    }
                }

                if job.should_stop() {
                    break;
                }
            }

            if stop_flag.load(Ordering::SeqCst) || !completed_window {
                break;
            }

            previous_score = score;
            aspiration = ASPIRATION_WINDOW;

            best.depth = depth;
            best.score = score;
            best.nodes = job.nodes.load(Ordering::Relaxed);
            best.seldepth = job.seldepth.load(Ordering::Relaxed);
            best.elapsed = start_time.elapsed();
            best.pv = job.extract_pv(board, depth);
            best.root_moves = iteration.root_moves;
            if let Some(&first) = best.pv.first() {
                best.best_move = Some(first);
                last_best = Some(first);
            } else if let Some(m) = iteration.best_move {
                best.best_move = Some(m);
                last_best = Some(m);
            } else if last_best.is_some() {
                best.best_move = last_best;
            }

            if let Some(cb) = info_cb {
                cb(&best);
            }

            if is_mate_score(score) {
                break;
            }
            if limits.node_limit != 0 && best.nodes >= limits.node_limit {
                break;
            }
        }

        if best.best_move.is_none() {
            best.best_move = last_best;
        }
        if best.elapsed.is_zero() {
            best.elapsed = start_time.elapsed();
        }

        best
    }

    fn compute_time_budget(&self, board: &Board, limits: &SearchLimits) -> i64 {
        if limits.move_time_ms >= 0 {
            return limits.move_time_ms;
        }
        if limits.infinite {
            return 0;
        }
        let us = board.side_to_move();
        let time_left = limits.time_left_ms[us.index()];
        let increment = limits.increment_ms[us.index()];
        if time_left <= 0 && increment <= 0 {
            return 0;
        }
        self.time_allocator
            .allocate_time_ms(time_left, increment, board.fullmove_number(), limits.moves_to_go)
            .max(0)
    }
}

impl Default for Search {
    fn default() -> Self {
        Self::new(1 << 20, crate::nnue::default_evaluator())
    }
}

#[derive(Default)]
struct RootOutcome {
    score: i32,
    best_move: Option<Move>,
    root_moves: Vec<RootMove>,
}

struct SearchJob<'a> {
    tt: &'a TranspositionTable,
    network: &'a Network,
    stop: &'a AtomicBool,
    nodes: AtomicU64,
    seldepth: AtomicI32,
    start_time: Instant,
    time_budget_ms: i64,
    node_limit: u64,
}

impl SearchJob<'_> {
    /// True once the external stop fires, the node limit is reached, or the
    /// time budget has elapsed; latches into the stop flag so it stays true.
    fn should_stop(&self) -> bool {
        if self.stop.load(Ordering::SeqCst) {
            return true;
        }
        if self.node_limit != 0 && self.nodes.load(Ordering::Relaxed) >= self.node_limit {
            self.stop.store(true, Ordering::SeqCst);
            return true;
        }
        if self.time_budget_ms > 0 {
            #[allow(clippy::cast_possible_truncation)]
            let elapsed_ms = self.start_time.elapsed().as_millis() as i64;
            if elapsed_ms >= self.time_budget_ms {
                self.stop.store(true, Ordering::SeqCst);
                return true;
            }
        }
        false
    }

    fn update_seldepth(&self, ply: usize) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let ply = ply as i32;
        let mut current = self.seldepth.load(Ordering::Relaxed);
        while current < ply {
            match self.seldepth.compare_exchange_weak(
                current,
                ply,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    fn search_root(
        &self,
        contexts: &mut [SearchContext],
        board: &Board,
        depth: i32,
        alpha: i32,
        beta: i32,
        thread_count: usize,
    ) -> RootOutcome {
        let tt_move = self.tt.probe(board.zobrist_key(), 0).and_then(|hit| hit.m);

        let mut root_board = board.clone();
        let mut moves = MoveList::new();
        root_board.generate_legal(&mut moves);

        if moves.is_empty() {
            let score =
                if board.in_check(board.side_to_move()) { -MATE_VALUE + 1 } else { DRAW_SCORE };
            return RootOutcome { score, best_move: None, root_moves: Vec::new() };
        }

        let us = board.side_to_move();
        let history = &contexts[0].history;
        moves.sort_by(|a, b| {
            let a_tt = Some(*a) == tt_move;
            let b_tt = Some(*b) == tt_move;
            if a_tt != b_tt {
                return b_tt.cmp(&a_tt);
            }
            let (a_score, b_score) = if a.is_capture() || b.is_capture() {
                (root_mvv_lva(board, *a), root_mvv_lva(board, *b))
            } else {
                (history.get(us, *a), history.get(us, *b))
            };
            b_score.cmp(&a_score)
        });

        let alpha_original = alpha;
        let mut alpha = alpha;
        let mut scores: Vec<Option<i32>> = vec![None; moves.len()];

        // evaluate the first move on the calling thread to seed alpha with
        // a real bound before fanning out.
        let (main_ctx, helper_ctxs) = contexts.split_at_mut(1);
        let first = moves[0];
        let first_value = self.search_root_move(&mut main_ctx[0], board, first, depth, alpha, beta);
        scores[0] = Some(first_value);
        let mut best_score = first_value;
        let mut best_move = Some(first);
        alpha = alpha.max(first_value);
        if first_value >= beta {
            self.store_root(board, depth, best_score, best_move, alpha_original, beta);
            return RootOutcome {
                score: best_score,
                best_move,
                root_moves: collect_root_moves(&moves, &scores),
            };
        }

        let next_index = AtomicUsize::new(1);
        let shared_alpha = AtomicI32::new(alpha);
        let cutoff = AtomicBool::new(false);
        let shared_best = Mutex::new((best_score, best_move));
        let shared_scores = Mutex::new(scores);

        let worker = |ctx: &mut SearchContext| loop {
            if cutoff.load(Ordering::Relaxed) || self.should_stop() {
                break;
            }
            let idx = next_index.fetch_add(1, Ordering::Relaxed);
            if idx >= moves.len() {
                break;
            }
            let local_alpha = shared_alpha.load(Ordering::Relaxed);
            let value = self.search_root_move(ctx, board, moves[idx], depth, local_alpha, beta);
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            let mut best = shared_best.lock().expect("root best lock poisoned");
            shared_scores.lock().expect("root score lock poisoned")[idx] = Some(value);
            if value > best.0 {
                *best = (value, Some(moves[idx]));
            }
            if value > shared_alpha.load(Ordering::Relaxed) {
                shared_alpha.store(value, Ordering::Relaxed);
            }
            if value >= beta {
                cutoff.store(true, Ordering::Relaxed);
            }
        };

        std::thread::scope(|s| {
            let worker_ref = &worker;
            for ctx in helper_ctxs.iter_mut().take(thread_count.saturating_sub(1)) {
                s.spawn(move || worker_ref(ctx));
            }
            worker(&mut main_ctx[0]);
        });

        let (final_score, final_move) = *shared_best.lock().expect("root best lock poisoned");
        let scores = shared_scores.into_inner().expect("root score lock poisoned");
        best_score = final_score;
        best_move = final_move;
        if best_score == -INFINITY {
            best_score = alpha;
        }

        self.store_root(board, depth, best_score, best_move, alpha_original, beta);
        RootOutcome {
            score: best_score,
            best_move,
            root_moves: collect_root_moves(&moves, &scores),
        }
    }

    fn store_root(
        &self,
        board: &Board,
        depth: i32,
        best_score: i32,
        best_move: Option<Move>,
        alpha_original: i32,
        beta: i32,
    ) {
        let flag = if best_score <= alpha_original {
            Flag::Alpha
        } else if best_score >= beta {
            Flag::Beta
        } else {
            Flag::Exact
        };
        if !self.should_stop() {
            self.tt.store(board.zobrist_key(), depth, best_score, best_move, flag, 0);
        }
    }

    fn search_root_move(
        &self,
        ctx: &mut SearchContext,
        board: &Board,
        m: Move,
        depth: i32,
        alpha: i32,
        beta: i32,
    ) -> i32 {
        if self.should_stop() {
            return 0;
        }

        ctx.repetition_stack.clear();
        ctx.repetition_stack.push(board.zobrist_key());

        let (base, rest) = ctx.accumulators.split_at_mut(1);
        self.network.update_accumulator(board, m, &base[0], &mut rest[0]);

        let mut local_board = board.clone();
        local_board.make_move(m).expect("root move is legal");
        ctx.repetition_stack.push(local_board.zobrist_key());

        let value = -self.negamax(ctx, &mut local_board, depth - 1, -beta, -alpha, true, 1);

        ctx.repetition_stack.pop();
        value
    }

    #[allow(clippy::too_many_lines, clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    fn negamax(
        &self,
        ctx: &mut SearchContext,
        board: &mut Board,
        depth: i32,
        mut alpha: i32,
        beta: i32,
        allow_null: bool,
        ply: usize,
    ) -> i32 {
        if self.should_stop() {
            return 0;
        }

        self.update_seldepth(ply);
        self.nodes.fetch_add(1, Ordering::Relaxed);

        // the stacks carry slack beyond the depth limit; if a check-laden
        // line outruns it, settle for the static eval.
        if ply + 1 >= ctx.accumulators.len() {
            return self.network.evaluate(board, &ctx.accumulators[ply]);
        }

        let in_check = board.in_check(board.side_to_move());
        ctx.stack[ply].in_check = in_check;

        if board.halfmove_clock() >= 100 {
            return DRAW_SCORE;
        }
        let key = board.zobrist_key();
        if ctx.repetition_stack.iter().filter(|&&k| k == key).count() >= 3 {
            return DRAW_SCORE;
        }

        if depth <= 0 {
            return self.quiescence(ctx, board, alpha, beta, ply);
        }

        let mut tt_move = None;
        if let Some(hit) = self.tt.probe(key, ply as i32) {
            tt_move = hit.m;
            if hit.depth >= depth {
                match hit.flag {
                    Flag::Exact => return hit.score,
                    Flag::Alpha if hit.score <= alpha => return hit.score,
                    Flag::Beta if hit.score >= beta => return hit.score,
                    _ => {}
                }
            }
        }

        let static_eval = self.network.evaluate(board, &ctx.accumulators[ply]);
        ctx.stack[ply].static_eval = static_eval;
        let alpha_original = alpha;

        if !in_check && allow_null && depth >= 3 && static_eval >= beta {
            let state = board.make_null_move();
            ctx.repetition_stack.push(board.zobrist_key());
            // the null move leaves the pieces alone, so the child's
            // accumulator is a straight copy.
            let (base, rest) = ctx.accumulators.split_at_mut(ply + 1);
            rest[0].clone_from(&base[ply]);
            let null_score = -self.negamax(
                ctx,
                board,
                depth - 1 - NULL_MOVE_REDUCTION,
                -beta,
                -beta + 1,
                false,
                ply + 1,
            );
            ctx.repetition_stack.pop();
            board.undo_null_move(&state);
            if null_score >= beta {
                return beta;
            }
        }

        let mut moves = MoveList::new();
        board.generate_legal(&mut moves);
        if moves.is_empty() {
            if in_check {
                return -MATE_VALUE + ply as i32;
            }
            return DRAW_SCORE;
        }

        let us = board.side_to_move();
        {
            let killers = ctx.killers[ply];
            let history = &ctx.history;
            let order_key = |m: &Move| -> (i32, i32, i32) {
                if Some(*m) == tt_move {
                    (3, 0, 0)
                } else if m.is_capture() {
                    (2, root_mvv_lva(board, *m), 0)
                } else if killers[0] == Some(*m) {
                    (1, 2, history.get(us, *m))
                } else if killers[1] == Some(*m) {
                    (1, 1, history.get(us, *m))
                } else {
                    (0, 0, history.get(us, *m))
                }
            };
            moves.sort_by(|a, b| order_key(b).cmp(&order_key(a)));
        }

        let mut best_score = -INFINITY;
        let mut best_move = None;

        for (move_index, &m) in moves.iter().enumerate() {
            let (base, rest) = ctx.accumulators.split_at_mut(ply + 1);
            self.network.update_accumulator(board, m, &base[ply], &mut rest[0]);
            let state = board.make_move(m).expect("generated move is legal");
            ctx.repetition_stack.push(board.zobrist_key());

            let gives_check = board.in_check(board.side_to_move());
            let can_reduce = !m.is_capture()
                && !m.is_promotion()
                && !gives_check
                && !in_check
                && depth >= 3
                && move_index >= 3;

            let score = if can_reduce {
                let reduction = 1 + i32::from(move_index > 6);
                let reduced_depth = (depth - 1 - reduction).max(1);
                let reduced =
                    -self.negamax(ctx, board, reduced_depth, -alpha - 1, -alpha, true, ply + 1);
                if reduced > alpha {
                    -self.negamax(ctx, board, depth - 1, -beta, -alpha, true, ply + 1)
                } else {
                    reduced
                }
            } else {
                -self.negamax(ctx, board, depth - 1, -beta, -alpha, true, ply + 1)
            };

            ctx.repetition_stack.pop();
            board.undo_move(m, &state);

            if score > best_score {
                best_score = score;
                best_move = Some(m);
            }
            if score > alpha {
                alpha = score;
            }

            if alpha >= beta {
                if !m.is_capture() && !m.is_promotion() {
                    ctx.insert_killer(ply, m);
                    ctx.history.update(us, m, depth);
                }
                break;
            }
        }

        if best_move.is_none() {
            best_move = Some(moves[0]);
        }

        let flag = if best_score <= alpha_original {
            Flag::Alpha
        } else if best_score >= beta {
            Flag::Beta
        } else {
            Flag::Exact
        };
        if !self.should_stop() {
            self.tt.store(key, depth, best_score, best_move, flag, ply as i32);
        }
        best_score
    }

    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    fn quiescence(
        &self,
        ctx: &mut SearchContext,
        board: &mut Board,
        mut alpha: i32,
        beta: i32,
        ply: usize,
    ) -> i32 {
        if self.should_stop() {
            return 0;
        }

        self.nodes.fetch_add(1, Ordering::Relaxed);

        if ply + 1 >= ctx.accumulators.len() {
            return self.network.evaluate(board, &ctx.accumulators[ply]);
        }

        // a check is not a quiet position; fall back to a one-ply search
        // that considers every evasion.
        if board.in_check(board.side_to_move()) {
            return self.negamax(ctx, board, 1, alpha, beta, false, ply);
        }

        let stand_pat = self.network.evaluate(board, &ctx.accumulators[ply]);
        if stand_pat >= beta {
            return beta;
        }
        if stand_pat > alpha {
            alpha = stand_pat;
        }

        let mut moves = MoveList::new();
        board.generate_legal(&mut moves);
        moves.retain(|m| m.is_capture() || m.is_promotion());
        moves.sort_by_key(|&m| std::cmp::Reverse(root_mvv_lva(board, m)));

        for &m in &moves {
            let (base, rest) = ctx.accumulators.split_at_mut(ply + 1);
            self.network.update_accumulator(board, m, &base[ply], &mut rest[0]);
            let state = board.make_move(m).expect("generated move is legal");
            ctx.repetition_stack.push(board.zobrist_key());
            let score = -self.quiescence(ctx, board, -beta, -alpha, ply + 1);
            ctx.repetition_stack.pop();
            board.undo_move(m, &state);

            if score >= beta {
                return beta;
            }
            if score > alpha {
                alpha = score;
            }
        }

        alpha
    }

    /// Rebuilds the principal variation by walking the transposition table
    /// from the root, bailing out on an empty slot, an illegal entry, or a
    /// repeated key.
    fn extract_pv(&self, board: &Board, depth: i32) -> Vec<Move> {
        let mut pv = Vec::new();
        let mut copy = board.clone();
        let mut seen = std::collections::HashSet::new();
        let limit = (depth + 8).min(MAX_DEPTH);
        for _ in 0..limit {
            let key = copy.zobrist_key();
            if !seen.insert(key) {
                break;
            }
            let Some(hit) = self.tt.probe(key, 0) else {
                break;
            };
            let Some(m) = hit.m else {
                break;
            };
            if !copy.legal_moves().contains(&m) {
                break;
            }
            if copy.make_move(m).is_err() {
                break;
            }
            pv.push(m);
        }
        pv
    }
}

fn root_mvv_lva(board: &Board, m: Move) -> i32 {
    if !m.is_capture() {
        return 0;
    }
    let victim = if m.is_en_passant() {
        PieceType::Pawn
    } else {
        board.piece_type_at(m.to()).unwrap_or(PieceType::Pawn)
    };
    let attacker = board.piece_type_at(m.from()).unwrap_or(PieceType::Pawn);
    mvv_lva_score(victim, attacker)
}

fn collect_root_moves(moves: &[Move], scores: &[Option<i32>]) -> Vec<RootMove> {
    let mut root_moves: Vec<RootMove> = moves
        .iter()
        .zip(scores)
        .filter_map(|(&m, &score)| score.map(|score| RootMove { m, score }))
        .collect();
    root_moves.sort_by_key(|rm| std::cmp::Reverse(rm.score));
    root_moves
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_search(fen: &str, depth: i32) -> SearchResult {
        let mut search = Search::new(1 << 16, Arc::new(Evaluator::new(None)));
        let board = Board::from_fen(fen).unwrap();
        search.search(&board, &SearchLimits::depth(depth))
    }

    #[test]
    fn best_move_is_legal_from_start() {
        let mut search = Search::new(1 << 16, Arc::new(Evaluator::new(None)));
        let board = Board::starting_position();
        let result = search.search(&board, &SearchLimits::depth(2));
        let legal = board.clone().legal_moves();
        let best = result.best_move.expect("the start position has moves");
        assert!(legal.contains(&best));
        assert_eq!(result.depth, 2);
        assert!(result.nodes > 0);
    }

    #[test]
    fn finds_back_rank_mate_in_one() {
        let result = quick_search("6k1/5ppp/8/8/8/8/5PPP/3R2K1 w - - 0 1", 3);
        assert!(result.score > MATE_SCORE_THRESHOLD);
        let best = result.best_move.unwrap();
        assert_eq!(best.to(), crate::types::Square::D8);
    }

    #[test]
    fn reports_mate_against_the_side_to_move() {
        // black is getting mated next move whatever happens.
        let result = quick_search("7k/7Q/6K1/8/8/8/8/8 b - - 0 1", 3);
        assert!(result.best_move.is_none());
        assert!(result.score < -MATE_SCORE_THRESHOLD);
    }

    #[test]
    fn null_move_pruning_fails_high() {
        let evaluator = Arc::new(Evaluator::new(None));
        let network = evaluator.network();
        let board = Board::from_fen("8/8/8/8/8/8/PPP5/K6k w - - 0 1").unwrap();

        let stop = AtomicBool::new(false);
        let tt = TranspositionTable::new(1 << 10);
        let job = SearchJob {
            tt: &tt,
            network: network.as_ref(),
            stop: &stop,
            nodes: AtomicU64::new(0),
            seldepth: AtomicI32::new(0),
            start_time: Instant::now(),
            time_budget_ms: 0,
            node_limit: 0,
        };
        let mut ctx = SearchContext::new(8, network.hidden_size());
        network.build_accumulator(&board, &mut ctx.accumulators[0]);
        ctx.repetition_stack.push(board.zobrist_key());

        let mut board = board;
        let score = job.negamax(&mut ctx, &mut board, 3, 0, 50, true, 0);
        assert!(score >= 50);
    }

    #[test]
    fn node_limit_stops_the_search() {
        let mut search = Search::new(1 << 16, Arc::new(Evaluator::new(None)));
        let board = Board::starting_position();
        let limits = SearchLimits { node_limit: 200, max_depth: 64, ..SearchLimits::default() };
        let result = search.search(&board, &limits);
        // the limit is checked between nodes and iterations, so we may
        // overshoot within an iteration, but never by orders of magnitude.
        assert!(result.nodes < 1_000_000);
        assert!(result.depth >= 1);
    }

    #[test]
    fn prior_stop_yields_empty_result() {
        let mut search = Search::new(1 << 16, Arc::new(Evaluator::new(None)));
        let board = Board::starting_position();
        let stop = AtomicBool::new(true);
        let result = search.search_with(&board, &SearchLimits::depth(5), &stop, None);
        assert_eq!(result.depth, 0);
    }

    #[test]
    fn info_callback_fires_per_completed_depth() {
        use std::sync::atomic::AtomicUsize;
        let mut search = Search::new(1 << 16, Arc::new(Evaluator::new(None)));
        let board = Board::starting_position();
        let stop = AtomicBool::new(false);
        let calls = AtomicUsize::new(0);
        let cb = |_info: &SearchResult| {
            calls.fetch_add(1, Ordering::Relaxed);
        };
        let result = search.search_with(&board, &SearchLimits::depth(3), &stop, Some(&cb));
        assert_eq!(calls.load(Ordering::Relaxed), usize::try_from(result.depth).unwrap());
    }

    #[test]
    fn single_thread_search_is_deterministic() {
        let run = || {
            let mut search = Search::new(1 << 16, Arc::new(Evaluator::new(None)));
            let board =
                Board::from_fen("rnbq1k1r/pppp1ppp/5n2/4p3/1bB1P3/5N2/PPPP1PPP/RNBQ1RK1 w - - 0 1")
                    .unwrap();
            let result = search.search(&board, &SearchLimits::depth(3));
            (result.best_move, result.score)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn multi_threaded_root_search_returns_legal_move() {
        let mut search = Search::new(1 << 16, Arc::new(Evaluator::new(None)));
        search.set_threads(2);
        let board = Board::starting_position();
        let result = search.search(&board, &SearchLimits::depth(3));
        let legal = board.clone().legal_moves();
        assert!(legal.contains(&result.best_move.unwrap()));
    }

    #[test]
    fn root_moves_are_reported_in_score_order() {
        let mut search = Search::new(1 << 16, Arc::new(Evaluator::new(None)));
        let board = Board::starting_position();
        let result = search.search(&board, &SearchLimits::depth(2));
        assert!(!result.root_moves.is_empty());
        for pair in result.root_moves.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(result.root_moves[0].m, result.best_move.unwrap());
    }
}
