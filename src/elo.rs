//! An in-memory Elo rating book for tracking self-play progress.

use std::collections::HashMap;

fn expected_score(rating_a: f64, rating_b: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((rating_b - rating_a) / 400.0))
}

/// A player's standing at a point in time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlayerSummary {
    pub name: String,
    pub rating: f64,
    /// Rating change from the most recent game.
    pub delta: f64,
    pub games: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub score: f64,
}

/// Both players' standings after a recorded game.
#[derive(Clone, Debug, Default)]
pub struct GameUpdate {
    pub white: PlayerSummary,
    pub black: PlayerSummary,
    pub expected_white: f64,
    pub result: f64,
}

#[derive(Clone, Debug, Default)]
struct PlayerStats {
    rating: f64,
    games: u32,
    wins: u32,
    draws: u32,
    losses: u32,
    score: f64,
}

pub struct EloTracker {
    initial_rating: f64,
    k_factor: f64,
    players: HashMap<String, PlayerStats>,
}

impl EloTracker {
    #[must_use]
    pub fn new(initial_rating: f64, k_factor: f64) -> Self {
        Self { initial_rating, k_factor, players: HashMap::new() }
    }

    /// Records a finished game. `white_score` is 1 for a white win, 0.5 for
    /// a draw and 0 for a loss; scores above 0.75 or below 0.25 classify as
    /// decisive results.
    pub fn record_game(&mut self, white: &str, black: &str, white_score: f64) -> GameUpdate {
        let initial = self.initial_rating;
        let white_rating =
            self.players.entry(white.to_string()).or_insert_with(|| PlayerStats { rating: initial, ..Default::default() }).rating;
        let black_rating =
            self.players.entry(black.to_string()).or_insert_with(|| PlayerStats { rating: initial, ..Default::default() }).rating;

        let expected_white = expected_score(white_rating, black_rating);
        let expected_black = 1.0 - expected_white;
        let black_score = 1.0 - white_score;

        let summarize = |stats: &PlayerStats, name: &str, delta: f64| PlayerSummary {
            name: name.to_string(),
            rating: stats.rating,
            delta,
            games: stats.games,
            wins: stats.wins,
            draws: stats.draws,
            losses: stats.losses,
            score: stats.score,
        };

        let white_stats = self.players.get_mut(white).expect("white player was just inserted");
        white_stats.rating += self.k_factor * (white_score - expected_white);
        if white_score > 0.75 {
            white_stats.wins += 1;
        } else if white_score < 0.25 {
            white_stats.losses += 1;
        } else {
            white_stats.draws += 1;
        }
        white_stats.games += 1;
        white_stats.score += white_score;
        let white_summary = summarize(white_stats, white, white_stats.rating - white_rating);

        let black_stats = self.players.get_mut(black).expect("black player was just inserted");
        black_stats.rating += self.k_factor * (black_score - expected_black);
        if white_score > 0.75 {
            black_stats.losses += 1;
        } else if white_score < 0.25 {
            black_stats.wins += 1;
        } else {
            black_stats.draws += 1;
        }
        black_stats.games += 1;
        black_stats.score += black_score;
        let black_summary = summarize(black_stats, black, black_stats.rating - black_rating);

        GameUpdate {
            white: white_summary,
            black: black_summary,
            expected_white,
            result: white_score,
        }
    }

    /// Every tracked player, best rating first, ties broken by name.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PlayerSummary> {
        let mut table: Vec<PlayerSummary> = self
            .players
            .iter()
            .map(|(name, stats)| PlayerSummary {
                name: name.clone(),
                rating: stats.rating,
                delta: 0.0,
                games: stats.games,
                wins: stats.wins,
                draws: stats.draws,
                losses: stats.losses,
                score: stats.score,
            })
            .collect();
        table.sort_by(|lhs, rhs| {
            rhs.rating
                .partial_cmp(&lhs.rating)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| lhs.name.cmp(&rhs.name))
        });
        table
    }
}

impl Default for EloTracker {
    fn default() -> Self {
        Self::new(1500.0, 24.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_players_split_the_pot() {
        let mut tracker = EloTracker::default();
        let update = tracker.record_game("alpha", "beta", 0.5);
        assert!((update.expected_white - 0.5).abs() < 1e-9);
        assert!((update.white.rating - 1500.0).abs() < 1e-9);
        assert!((update.black.rating - 1500.0).abs() < 1e-9);
        assert_eq!(update.white.draws, 1);
        assert_eq!(update.black.draws, 1);
    }

    #[test]
    fn winner_takes_twelve_points_from_an_equal_opponent() {
        let mut tracker = EloTracker::default();
        let update = tracker.record_game("alpha", "beta", 1.0);
        assert!((update.white.rating - 1512.0).abs() < 1e-9);
        assert!((update.black.rating - 1488.0).abs() < 1e-9);
        assert_eq!(update.white.wins, 1);
        assert_eq!(update.black.losses, 1);
        assert!((update.white.delta - 12.0).abs() < 1e-9);
    }

    #[test]
    fn snapshot_sorts_by_rating_then_name() {
        let mut tracker = EloTracker::default();
        tracker.record_game("alpha", "beta", 1.0);
        tracker.record_game("gamma", "delta", 0.5);
        let table = tracker.snapshot();
        assert_eq!(table[0].name, "alpha");
        // the two drawn players stay at the initial rating, alphabetically.
        assert_eq!(table[1].name, "delta");
        assert_eq!(table[2].name, "gamma");
        assert_eq!(table[3].name, "beta");
    }

    #[test]
    fn favourites_gain_little_from_expected_wins() {
        let mut tracker = EloTracker::default();
        for _ in 0..10 {
            tracker.record_game("strong", "weak", 1.0);
        }
        let table = tracker.snapshot();
        let strong = table.iter().find(|p| p.name == "strong").unwrap();
        // each successive win is worth less than the one before.
        assert!(strong.rating < 1500.0 + 10.0 * 12.0);
        assert!(strong.rating > 1500.0);
        assert_eq!(strong.games, 10);
        assert!((strong.score - 10.0).abs() < 1e-9);
    }
}
