use sente_core::{Color, IllegalMove, Move, Position, Vertex};

use crate::GoPosition;

fn play_all(position: &mut GoPosition, moves: &[&str]) {
    for text in moves {
        let mv = Move::from_text(text, position.board_size()).unwrap();
        position.play(mv).unwrap();
    }
}

#[test]
fn new_board_is_empty_with_black_to_move() {
    let position = GoPosition::new(9, 7.5);
    assert_eq!(position.board_size(), 9);
    assert_eq!(position.to_move(), Color::Black);
    assert_eq!(position.movenum(), 0);
    assert_eq!(position.passes(), 0);
    // 81 points plus pass.
    assert_eq!(position.legal_moves(Color::Black).len(), 82);
}

#[test]
fn play_alternates_and_counts_moves() {
    let mut position = GoPosition::new(9, 7.5);
    play_all(&mut position, &["E5", "C3"]);
    assert_eq!(position.movenum(), 2);
    assert_eq!(position.to_move(), Color::Black);
    assert_eq!(
        position.last_move(),
        Some(Move::from_text("C3", 9).unwrap())
    );
    assert_eq!(position.stone_at(Vertex::new(4, 4)), 1);
    assert_eq!(position.stone_at(Vertex::new(2, 2)), 2);
}

#[test]
fn occupied_point_is_rejected() {
    let mut position = GoPosition::new(9, 7.5);
    play_all(&mut position, &["E5"]);
    let err = position.play(Move::from_text("E5", 9).unwrap()).unwrap_err();
    assert_eq!(err, IllegalMove::Occupied);
    // The failed attempt must not change the position.
    assert_eq!(position.movenum(), 1);
}

#[test]
fn single_stone_is_captured() {
    let mut position = GoPosition::new(9, 7.5);
    // White A1 is smothered by Black A2 and B1.
    play_all(&mut position, &["A2", "A1", "B1"]);
    assert_eq!(position.stone_at(Vertex::new(0, 0)), 0);
}

#[test]
fn suicide_is_illegal() {
    let mut position = GoPosition::new(9, 7.5);
    // Black surrounds A1, then White may not play into it.
    play_all(&mut position, &["A2", "E5", "B1"]);
    let err = position.play(Move::from_text("A1", 9).unwrap()).unwrap_err();
    assert_eq!(err, IllegalMove::Suicide);
    // And move generation excludes it.
    let legal = position.legal_moves(Color::White);
    assert!(!legal.contains(&Move::from_text("A1", 9).unwrap()));
}

#[test]
fn capture_into_surrounded_point_is_legal() {
    let mut position = GoPosition::new(9, 7.5);
    // Black builds a one-liberty eye at A1 occupied by White; taking it
    // back is a capture, not suicide.
    play_all(&mut position, &["A2", "A1", "B1"]);
    // White A1 was captured; White retaking A1 would be suicide now, but
    // Black filling its own eye is allowed under Tromp-Taylor rules.
    assert!(position
        .legal_moves(Color::Black)
        .contains(&Move::from_text("A1", 9).unwrap()));
}

#[test]
fn ko_recapture_violates_superko() {
    let mut position = GoPosition::new(9, 7.5);
    // Classic ko shape around B2/C2.
    play_all(
        &mut position,
        &["B1", "C1", "A2", "D2", "B3", "C3", "C2", "B2"],
    );
    // White just captured at B2 (removing Black C2). Black retaking at C2
    // reproduces the position before White's capture.
    assert!(!position.superko());
    position.play(Move::from_text("C2", 9).unwrap()).unwrap();
    assert!(position.superko());
}

#[test]
fn passes_count_consecutively() {
    let mut position = GoPosition::new(9, 7.5);
    play_all(&mut position, &["E5"]);
    position.play(Move::Pass).unwrap();
    assert_eq!(position.passes(), 1);
    position.play(Move::Pass).unwrap();
    assert_eq!(position.passes(), 2);
    // A stone resets the run of passes.
    let mut other = GoPosition::new(9, 7.5);
    other.play(Move::Pass).unwrap();
    play_all(&mut other, &["E5"]);
    assert_eq!(other.passes(), 0);
}

#[test]
fn empty_board_scores_komi_for_white() {
    let position = GoPosition::new(9, 7.5);
    assert_eq!(position.final_score(), -7.5);
}

#[test]
fn lone_black_stone_owns_the_board() {
    let mut position = GoPosition::new(5, 7.5);
    play_all(&mut position, &["C3"]);
    // All 25 points become Black area.
    assert_eq!(position.final_score(), 25.0 - 7.5);
}

#[test]
fn undo_and_forward_replay_history() {
    let mut position = GoPosition::new(9, 7.5);
    play_all(&mut position, &["E5", "C3"]);
    let hash_after = position.hash();

    assert!(position.undo());
    assert!(position.undo());
    assert_eq!(position.movenum(), 0);
    assert!(!position.undo());

    assert!(position.forward());
    assert!(position.forward());
    assert_eq!(position.hash(), hash_after);
    assert!(!position.forward());
}

#[test]
fn play_truncates_the_redo_tail() {
    let mut position = GoPosition::new(9, 7.5);
    play_all(&mut position, &["E5", "C3"]);
    assert!(position.undo());
    play_all(&mut position, &["D4"]);
    assert!(!position.forward());
    assert_eq!(position.movenum(), 2);
}

#[test]
fn play_undo_play_reproduces_the_hash() {
    let mut position = GoPosition::new(9, 7.5);
    play_all(&mut position, &["E5"]);
    let first = position.hash();
    assert!(position.undo());
    play_all(&mut position, &["E5"]);
    assert_eq!(position.hash(), first);
}

#[test]
fn hash_distinguishes_player_to_move() {
    let mut position = GoPosition::new(9, 7.5);
    let black_to_move = position.hash();
    position.set_to_move(Color::White);
    assert_ne!(position.hash(), black_to_move);
    position.set_to_move(Color::Black);
    assert_eq!(position.hash(), black_to_move);
}

#[test]
fn clones_are_independent() {
    let mut position = GoPosition::new(9, 7.5);
    play_all(&mut position, &["E5"]);
    let mut copy = position.clone();
    play_all(&mut copy, &["C3"]);
    assert_eq!(position.movenum(), 1);
    assert_eq!(copy.movenum(), 2);
}
