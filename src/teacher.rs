//! The teacher-engine capability.
//!
//! In teacher mode the orchestrator labels positions with an external
//! engine's evaluations instead of game results. The core only sees this
//! contract: a batch of FENs in, an equally sized batch of centipawn
//! scores out. Spawning and speaking to the actual engine process is the
//! host's business.

use crate::errors::TeacherError;

/// Scores positions on behalf of the training pipeline.
///
/// Implementations must return exactly one centipawn score per requested
/// FEN, each relative to the side to move.
pub trait TeacherOracle: Send + Sync {
    fn evaluate(&self, fens: &[String]) -> Result<Vec<i32>, TeacherError>;
}

/// Checks a teacher response against the batch it was produced for.
pub fn validate_response(requested: usize, scores: &[i32]) -> Result<(), TeacherError> {
    if scores.len() == requested {
        Ok(())
    } else {
        Err(TeacherError::ScoreCountMismatch { requested, got: scores.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlatOracle;

    impl TeacherOracle for FlatOracle {
        fn evaluate(&self, fens: &[String]) -> Result<Vec<i32>, TeacherError> {
            Ok(vec![0; fens.len()])
        }
    }

    #[test]
    fn matching_batch_sizes_validate() {
        let oracle = FlatOracle;
        let fens = vec![crate::STARTING_FEN.to_string(); 3];
        let scores = oracle.evaluate(&fens).unwrap();
        assert!(validate_response(fens.len(), &scores).is_ok());
    }

    #[test]
    fn short_responses_are_rejected() {
        let err = validate_response(4, &[1, 2]).unwrap_err();
        assert!(matches!(err, TeacherError::ScoreCountMismatch { requested: 4, got: 2 }));
    }
}
