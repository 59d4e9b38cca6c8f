use crate::{chessmove::Move, piece::Colour};

const HISTORY_MAX: i32 = 4000;

/// Butterfly history: how often quiet moves from a square to a square have
/// caused cutoffs, per side.
#[derive(Clone)]
pub struct HistoryTable {
    table: Box<[[[i32; 64]; 64]; 2]>,
}

impl HistoryTable {
    #[must_use]
    pub fn new() -> Self {
        Self { table: Box::new([[[0; 64]; 64]; 2]) }
    }

    pub fn clear(&mut self) {
        for side in self.table.iter_mut() {
            for from in side.iter_mut() {
                from.fill(0);
            }
        }
    }

    pub fn get(&self, colour: Colour, m: Move) -> i32 {
        self.table[colour.index()][m.from().index()][m.to().index()]
    }

    /// Rewards a quiet move that caused a cutoff with a depth-squared
    /// bonus, saturating at the history cap.
    pub fn update(&mut self, colour: Colour, m: Move, depth: i32) {
        let bonus = depth * depth;
        let entry = &mut self.table[colour.index()][m.from().index()][m.to().index()];
        *entry = (*entry + bonus).clamp(-HISTORY_MAX, HISTORY_MAX);
    }
}

impl Default for HistoryTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chessmove::MoveFlags, types::Square};

    #[test]
    fn bonus_accumulates_and_saturates() {
        let mut history = HistoryTable::new();
        let m = Move::new(Square::G1, Square::F3, MoveFlags::QUIET);
        history.update(Colour::White, m, 4);
        assert_eq!(history.get(Colour::White, m), 16);
        assert_eq!(history.get(Colour::Black, m), 0);
        for _ in 0..1000 {
            history.update(Colour::White, m, 10);
        }
        assert_eq!(history.get(Colour::White, m), 4000);
    }

    #[test]
    fn clear_resets_everything() {
        let mut history = HistoryTable::new();
        let m = Move::new(Square::G1, Square::F3, MoveFlags::QUIET);
        history.update(Colour::White, m, 4);
        history.clear();
        assert_eq!(history.get(Colour::White, m), 0);
    }
}
