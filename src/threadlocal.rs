//! Per-worker search state.
//!
//! Each root-parallel worker owns one [`SearchContext`]: an accumulator
//! stack, a static-eval/in-check stack, killer slots, a history table and a
//! repetition-key stack. Only the transposition table and the root
//! coordination atomics are shared between workers.

use crate::{chessmove::Move, historytable::HistoryTable, nnue::Accumulator};

#[derive(Clone, Copy, Default)]
pub struct StackEntry {
    pub static_eval: i32,
    pub in_check: bool,
}

pub struct SearchContext {
    /// One accumulator per ply, updated on make and discarded on undo.
    pub accumulators: Vec<Accumulator>,
    pub stack: Vec<StackEntry>,
    pub killers: Vec<[Option<Move>; 2]>,
    pub history: HistoryTable,
    /// Zobrist keys of the line from the search root to the current node.
    pub repetition_stack: Vec<u64>,
}

impl SearchContext {
    #[must_use]
    pub fn new(max_depth: i32, hidden_size: usize) -> Self {
        let mut ctx = Self {
            accumulators: Vec::new(),
            stack: Vec::new(),
            killers: Vec::new(),
            history: HistoryTable::new(),
            repetition_stack: Vec::new(),
        };
        ctx.ensure_capacity(max_depth, hidden_size);
        ctx
    }

    /// Grows the ply-indexed stacks to cover `max_depth` plus slack for
    /// quiescence and check extensions.
    pub fn ensure_capacity(&mut self, max_depth: i32, hidden_size: usize) {
        #[allow(clippy::cast_sign_loss)]
        let required = (max_depth.max(0) as usize + 5).max(64);
        if self.accumulators.len() < required {
            self.accumulators.resize_with(required, || Accumulator::new(hidden_size));
        }
        for accumulator in &mut self.accumulators {
            if accumulator.white.len() != hidden_size {
                accumulator.reset(hidden_size);
            }
        }
        if self.stack.len() < required {
            self.stack.resize(required, StackEntry::default());
        }
        if self.killers.len() < required {
            self.killers.resize(required, [None; 2]);
        }
        self.repetition_stack.reserve(512);
    }

    /// Forgets everything learned in previous searches.
    pub fn reset(&mut self) {
        for killers in &mut self.killers {
            *killers = [None; 2];
        }
        self.history.clear();
        self.repetition_stack.clear();
    }

    /// Stores a new killer at `ply`, shifting the previous one down.
    pub fn insert_killer(&mut self, ply: usize, m: Move) {
        let killers = &mut self.killers[ply];
        if killers[0] == Some(m) {
            return;
        }
        killers[1] = killers[0];
        killers[0] = Some(m);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chessmove::MoveFlags, types::Square};

    #[test]
    fn killers_shift_on_insert() {
        let mut ctx = SearchContext::new(8, 4);
        let a = Move::new(Square::E2, Square::E4, MoveFlags::QUIET);
        let b = Move::new(Square::D2, Square::D4, MoveFlags::QUIET);
        ctx.insert_killer(3, a);
        ctx.insert_killer(3, b);
        assert_eq!(ctx.killers[3], [Some(b), Some(a)]);
        // re-inserting the current first killer changes nothing.
        ctx.insert_killer(3, b);
        assert_eq!(ctx.killers[3], [Some(b), Some(a)]);
    }

    #[test]
    fn capacity_covers_depth_plus_slack() {
        let ctx = SearchContext::new(100, 4);
        assert!(ctx.accumulators.len() >= 105);
        assert!(ctx.stack.len() >= 105);
        assert!(ctx.killers.len() >= 105);
    }
}
