//! The time-budget capability.
//!
//! The search calls [`TimeAllocator::allocate_time_ms`] once at the start of
//! each root search (unless the limits carry a fixed move time or are
//! infinite). Hosts supply their own implementation; the default heuristic
//! spends a small fraction of the remaining clock plus part of the
//! increment.

/// Allocates a per-move time budget from clock state.
pub trait TimeAllocator: Send + Sync {
    fn allocate_time_ms(
        &self,
        time_left_ms: i64,
        increment_ms: i64,
        move_number: u32,
        moves_to_go: u32,
    ) -> i64;
}

/// The built-in allocation heuristic.
#[derive(Clone, Copy, Debug)]
pub struct TimeManager {
    /// Fraction of remaining time to invest each move.
    pub base_allocation: f64,
    /// Additional fraction of the increment to invest.
    pub increment_bonus: f64,
    pub min_time_ms: i64,
    pub max_time_ms: i64,
}

impl Default for TimeManager {
    fn default() -> Self {
        Self { base_allocation: 0.04, increment_bonus: 0.5, min_time_ms: 10, max_time_ms: 2000 }
    }
}

impl TimeAllocator for TimeManager {
    #[allow(clippy::cast_possible_truncation)]
    fn allocate_time_ms(
        &self,
        time_left_ms: i64,
        increment_ms: i64,
        _move_number: u32,
        moves_to_go: u32,
    ) -> i64 {
        if time_left_ms <= 0 {
            return self.min_time_ms.min(increment_ms.max(0));
        }

        #[allow(clippy::cast_precision_loss)]
        let mut allocation = if moves_to_go > 0 {
            // split the remaining time across the moves to the control,
            // keeping a small safety share back.
            time_left_ms as f64 / f64::from(moves_to_go.max(2))
        } else {
            time_left_ms as f64 * self.base_allocation
        };
        #[allow(clippy::cast_precision_loss)]
        {
            allocation += increment_ms.max(0) as f64 * self.increment_bonus;
        }

        let budget = allocation as i64;
        budget.clamp(self.min_time_ms, self.max_time_ms.min(time_left_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spends_a_fraction_of_the_clock() {
        let tm = TimeManager::default();
        let budget = tm.allocate_time_ms(60_000, 0, 10, 0);
        assert_eq!(budget, 2000); // 4% of a minute, capped at the maximum
        let budget = tm.allocate_time_ms(10_000, 0, 10, 0);
        assert_eq!(budget, 400);
    }

    #[test]
    fn increments_extend_the_budget() {
        let tm = TimeManager::default();
        let without = tm.allocate_time_ms(10_000, 0, 10, 0);
        let with = tm.allocate_time_ms(10_000, 1000, 10, 0);
        assert_eq!(with, without + 500);
    }

    #[test]
    fn moves_to_go_divides_the_clock() {
        let tm = TimeManager::default();
        let budget = tm.allocate_time_ms(30_000, 0, 10, 30);
        assert_eq!(budget, 1000);
    }

    #[test]
    fn never_exceeds_the_remaining_clock() {
        let tm = TimeManager::default();
        let budget = tm.allocate_time_ms(50, 0, 10, 0);
        assert!(budget <= 50);
    }
}
