//! PGN import for the training pipeline.
//!
//! Replays the movetext of each game and emits one training example per
//! position, labelled with the game result oriented to the side to move.

use std::{fs, path::Path};

use crate::{
    board::Board,
    trainer::{orient_target_for_fen, save_training_file, TrainingExample},
};

/// Removes brace comments and parenthesised variations.
fn strip_comments(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut in_brace = false;
    let mut paren_depth = 0usize;
    for c in input.chars() {
        match c {
            '{' => in_brace = true,
            '}' => in_brace = false,
            '(' => paren_depth += 1,
            ')' => paren_depth = paren_depth.saturating_sub(1),
            _ if !in_brace && paren_depth == 0 => output.push(c),
            _ => {}
        }
    }
    output
}

fn result_to_target(result: &str) -> i32 {
    match result {
        "1-0" => 1000,
        "0-1" => -1000,
        _ => 0,
    }
}

fn is_move_number(token: &str) -> bool {
    token.chars().next().is_some_and(|c| c.is_ascii_digit())
}

fn is_result_token(token: &str) -> bool {
    matches!(token, "1-0" | "0-1" | "1/2-1/2" | "*")
}

/// Converts PGN text into training examples. Games without a decisive
/// result produce draws; pass `include_draws = false` to skip those.
#[must_use]
pub fn import_str(content: &str, include_draws: bool) -> Vec<TrainingExample> {
    let content = strip_comments(content);

    let mut board = Board::starting_position();
    let mut positions: Vec<String> = Vec::new();
    let mut current_result = String::new();
    let mut examples = Vec::new();

    let flush =
        |positions: &mut Vec<String>, result: &str, examples: &mut Vec<TrainingExample>| {
            if positions.is_empty() {
                return;
            }
            let target = result_to_target(result);
            if include_draws || target != 0 {
                for fen in positions.drain(..) {
                    let target_cp = orient_target_for_fen(&fen, target);
                    examples.push(TrainingExample { fen, target_cp });
                }
            } else {
                positions.clear();
            }
        };

    let mut tokens = content.split_whitespace();
    while let Some(token) = tokens.next() {
        if let Some(rest) = token.strip_prefix('[') {
            flush(&mut positions, &current_result, &mut examples);
            board = Board::starting_position();
            current_result.clear();

            // glue the header back together until the closing bracket.
            let mut header = rest.to_string();
            while !header.ends_with(']') {
                let Some(next) = tokens.next() else {
                    break;
                };
                header.push(' ');
                header.push_str(next);
            }

            if let Some((tag, value)) = header.split_once(' ') {
                if tag == "Result" {
                    current_result =
                        value.trim_end_matches(']').trim_matches('"').to_string();
                }
            }
            continue;
        }

        if is_result_token(token) {
            let result =
                if current_result.is_empty() { token } else { current_result.as_str() };
            let result = result.to_string();
            flush(&mut positions, &result, &mut examples);
            board = Board::starting_position();
            current_result.clear();
            continue;
        }

        if is_move_number(token) {
            continue;
        }

        // movetext token: record the position before the move, then play it.
        let fen = board.fen();
        match board.san_to_move(token) {
            Ok(m) => {
                if board.make_move(m).is_ok() {
                    positions.push(fen);
                }
            }
            Err(_) => {
                // skip malformed tokens, as annotations sometimes slip through.
            }
        }
    }

    flush(&mut positions, &current_result, &mut examples);
    examples
}

pub fn import_file(
    path: impl AsRef<Path>,
    include_draws: bool,
) -> std::io::Result<Vec<TrainingExample>> {
    let content = fs::read_to_string(path)?;
    Ok(import_str(&content, include_draws))
}

/// Imports a PGN database and writes it out as a training file.
pub fn write_dataset(
    pgn_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    include_draws: bool,
) -> std::io::Result<()> {
    let data = import_file(pgn_path, include_draws)?;
    save_training_file(output_path, &data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scholars_mate_targets_are_side_to_move_relative() {
        let examples = import_str("1. e4 e5 2. Qh5 Ke7 3. Qxe5# 1-0", true);
        assert!(examples.len() >= 2);
        // white to move in the first position, black in the second.
        assert_eq!(examples[0].fen, crate::STARTING_FEN);
        assert_eq!(examples[0].target_cp, 1000);
        assert_eq!(examples[1].target_cp, -1000);
        assert_eq!(examples.len(), 5);
    }

    #[test]
    fn draws_can_be_filtered() {
        let pgn = "1. e4 e5 1/2-1/2";
        assert_eq!(import_str(pgn, true).len(), 2);
        assert!(import_str(pgn, false).is_empty());
    }

    #[test]
    fn draw_targets_are_zero() {
        for example in import_str("1. d4 d5 2. c4 c6 1/2-1/2", true) {
            assert_eq!(example.target_cp, 0);
        }
    }

    #[test]
    fn result_header_overrides_trailing_token() {
        let pgn = "[Event \"test\"]\n[Result \"0-1\"]\n\n1. f3 e5 2. g4 Qh4# 0-1";
        let examples = import_str(pgn, true);
        assert_eq!(examples.len(), 4);
        assert_eq!(examples[0].target_cp, -1000); // white to move, black won
        assert_eq!(examples[1].target_cp, 1000);
    }

    #[test]
    fn comments_and_variations_are_stripped() {
        let pgn = "1. e4 {best by test} e5 (1... c5 {sicilian}) 2. Nf3 1-0";
        let examples = import_str(pgn, true);
        assert_eq!(examples.len(), 3);
    }

    #[test]
    fn multiple_games_reset_the_board() {
        let pgn = "[Result \"1-0\"]\n1. e4 1-0\n[Result \"0-1\"]\n1. d4 0-1";
        let examples = import_str(pgn, true);
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].target_cp, 1000);
        assert_eq!(examples[1].target_cp, -1000);
    }
}
