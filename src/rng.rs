//! A tiny deterministic PRNG used to build the Zobrist key tables.
//!
//! The generator is a 128-bit xorshift with a fixed seed, so the key tables
//! are identical on every run and on every platform, and can be computed in
//! const context.

const SEED: u128 = 0x2A0A_63F2_4348_4952_4F4E_9918_0A6D_BC3A;

pub struct XorShiftState {
    state: u128,
}

impl XorShiftState {
    pub const fn new() -> Self {
        Self { state: SEED }
    }

    /// Generates the next random number in the sequence, consuming self.
    /// This is done to allow for const evaluation.
    pub const fn next_self(mut self) -> (u64, Self) {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        #[allow(clippy::cast_possible_truncation)]
        let r = x as u64; // truncation is the intended behavior here.
        let r = r ^ (x >> 64) as u64; // add in the high bits.
        (r, self)
    }
}

#[cfg(test)]
mod tests {
    use super::XorShiftState;

    #[test]
    fn deterministic_across_instances() {
        let (a, _) = XorShiftState::new().next_self();
        let (b, _) = XorShiftState::new().next_self();
        assert_eq!(a, b);
    }

    #[test]
    fn produces_distinct_values() {
        let mut state = XorShiftState::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            let key;
            (key, state) = state.next_self();
            assert!(seen.insert(key));
        }
    }
}
