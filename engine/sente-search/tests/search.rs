//! End-to-end search scenarios over the Go rules engine.
//!
//! Deterministic tests use a single worker with the synchronous
//! `UniformNetwork`; the concurrency tests run a real worker pool against
//! the batched evaluator.

use std::sync::Arc;
use std::time::{Duration, Instant};

use games_go::GoPosition;
use sente_core::{Color, Move, Position};
use sente_search::{
    uniform_result, BatchedNetwork, EvalFn, NetResult, PassFlags, SearchOptions, UctSearch,
    UniformNetwork,
};

fn play_all(position: &mut GoPosition, moves: &[&str]) {
    for text in moves {
        let mv = Move::from_text(text, position.board_size()).unwrap();
        position.play(mv).unwrap();
    }
}

fn single_threaded(playouts: u32) -> SearchOptions {
    SearchOptions::for_testing().with_playouts(playouts)
}

/// Waits until outstanding evaluator callbacks settle.
fn drain(search: &UctSearch<GoPosition, BatchedNetwork<GoPosition>>) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while search.stats().pending_evaluations > 0 {
        assert!(Instant::now() < deadline, "evaluator never drained");
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Synchronous evaluator that boosts one policy entry, for pinning down
/// which move a prior-driven choice must pick.
struct BoostedNetwork {
    index: usize,
}

impl sente_search::Network<GoPosition> for BoostedNetwork {
    fn request(
        &self,
        position: &GoPosition,
        _symmetry: usize,
        callback: sente_search::NetCallback,
    ) {
        let mut result: NetResult = uniform_result(position);
        result.policy[self.index] = 0.9;
        callback(Ok(result));
    }

    fn pending(&self) -> usize {
        0
    }
}

#[test]
fn single_playout_returns_the_argmax_prior() {
    let game = GoPosition::new(5, 7.5);
    let favourite = Move::from_text("C3", 5).unwrap();
    let network = BoostedNetwork {
        index: favourite.policy_index(5).unwrap(),
    };
    let mut search = UctSearch::new(game, network, single_threaded(1)).unwrap();

    // One playout expands the root and nothing else; the chosen move can
    // only come from the priors.
    let mv = search.think(Color::Black, PassFlags::default());
    assert_eq!(mv, favourite);
    assert_eq!(search.stats().positions, 1);
}

#[test]
fn single_playout_expands_the_root_once() {
    let game = GoPosition::new(5, 7.5);
    let mut search = UctSearch::new(game, UniformNetwork::new(), single_threaded(1)).unwrap();

    let mv = search.think(Color::Black, PassFlags::default());

    let stats = search.stats();
    // Exactly one evaluator request, for the root position.
    assert_eq!(stats.positions, 1);
    assert_eq!(stats.playouts, 1);
    // Uniform priors: the argmax is the first legal move in board order.
    assert!(matches!(mv, Move::Play(_)));
    assert_eq!(stats.root_virtual_loss, 0);
}

#[test]
fn single_thread_never_fails_a_simulation() {
    let game = GoPosition::new(5, 7.5);
    let mut search = UctSearch::new(game, UniformNetwork::new(), single_threaded(100)).unwrap();

    search.think(Color::Black, PassFlags::default());

    let stats = search.stats();
    assert_eq!(stats.failed_simulations, 0);
    assert_eq!(stats.playouts, 100);
    assert_eq!(stats.root_virtual_loss, 0);
}

#[test]
fn zero_playouts_returns_without_evaluating() {
    let game = GoPosition::new(5, 7.5);
    let mut search = UctSearch::new(game, UniformNetwork::new(), single_threaded(0)).unwrap();

    let mv = search.think(Color::Black, PassFlags::default());

    let stats = search.stats();
    assert_eq!(stats.positions, 0);
    assert_eq!(stats.playouts, 0);
    // Nothing searched: the root has no children and passing is the only
    // answer on offer.
    assert_eq!(mv, Move::Pass);
}

#[test]
fn playout_budget_is_respected() {
    let game = GoPosition::new(5, 7.5);
    let mut search = UctSearch::new(game, UniformNetwork::new(), single_threaded(40)).unwrap();

    search.think(Color::Black, PassFlags::default());
    assert!(search.stats().playouts <= 40);
}

#[test]
fn tree_is_reused_across_moves() {
    let game = GoPosition::new(5, 7.5);
    let mut search = UctSearch::new(game, UniformNetwork::new(), single_threaded(80)).unwrap();

    let mv = search.think(Color::Black, PassFlags::default());
    assert!(matches!(mv, Move::Play(_)));

    // The host plays the chosen move, as a genmove would.
    search.game_mut().play(mv).unwrap();

    // Resynchronise without searching: the reused subtree keeps the
    // visits it accumulated under the old root.
    search.set_playout_limit(0);
    search.update_root();

    let stats = search.stats();
    assert!(stats.root_visits > 0, "subtree was not reused");
    assert!(search.tree_node_count() > 1);
}

#[test]
fn update_root_twice_is_a_no_op_on_the_tree() {
    let game = GoPosition::new(5, 7.5);
    let mut search = UctSearch::new(game, UniformNetwork::new(), single_threaded(60)).unwrap();
    search.think(Color::Black, PassFlags::default());

    search.set_playout_limit(0);
    search.update_root();
    let nodes = search.tree_node_count();
    let visits = search.stats().root_visits;

    search.update_root();
    assert_eq!(search.tree_node_count(), nodes);
    assert_eq!(search.stats().root_visits, visits);
}

#[test]
fn komi_change_resets_the_tree() {
    let game = GoPosition::new(5, 7.5);
    let mut search = UctSearch::new(game, UniformNetwork::new(), single_threaded(60)).unwrap();
    search.think(Color::Black, PassFlags::default());
    assert!(search.stats().root_visits > 0);

    search.game_mut().set_komi(0.5);
    search.set_playout_limit(0);
    search.update_root();
    assert_eq!(search.stats().root_visits, 0);
}

#[test]
fn superko_child_is_invalidated_and_avoided() {
    let mut game = GoPosition::new(9, 7.5);
    // Ko: White has just taken at B2; Black retaking at C2 would repeat.
    play_all(
        &mut game,
        &["B1", "C1", "A2", "D2", "B3", "C3", "C2", "B2"],
    );
    let ko_recapture = Move::from_text("C2", 9).unwrap();

    let mut options = single_threaded(400);
    // Spread the search over every root child so the ko move gets tried.
    options.fpu_reduction = 0.0;
    options.fpu_root_reduction = 0.0;
    let mut search = UctSearch::new(game, UniformNetwork::new(), options).unwrap();

    let mv = search.think(Color::Black, PassFlags::default());

    let stats = search.stats();
    assert!(
        stats.failed_simulations > 0,
        "the ko recapture was never attempted"
    );
    assert_ne!(mv, ko_recapture);
    // The invalidated child never collects a visit, so it cannot appear
    // in the analysis stream either.
    assert!(search.analysis().iter().all(|e| e.mov != ko_recapture));
    assert_eq!(stats.root_virtual_loss, 0);
}

#[test]
fn winning_pass_is_taken() {
    let mut game = GoPosition::new(5, 7.5);
    // Black holds the whole board; White already passed. Passing ends the
    // game with a Black win on area.
    play_all(&mut game, &["C3"]);
    game.play(Move::Pass).unwrap();

    let mut options = single_threaded(300);
    options.fpu_reduction = 0.0;
    options.fpu_root_reduction = 0.0;
    let mut search = UctSearch::new(game, UniformNetwork::new(), options).unwrap();

    let mv = search.think(Color::Black, PassFlags::default());
    assert_eq!(mv, Move::Pass);
}

#[test]
fn no_pass_flag_prefers_a_board_move() {
    let mut game = GoPosition::new(5, 7.5);
    play_all(&mut game, &["C3"]);
    game.play(Move::Pass).unwrap();

    let mut options = single_threaded(300);
    options.fpu_reduction = 0.0;
    options.fpu_root_reduction = 0.0;
    let mut search = UctSearch::new(game, UniformNetwork::new(), options).unwrap();

    let flags = PassFlags {
        no_pass: true,
        no_resign: false,
    };
    let mv = search.think(Color::Black, flags);
    assert!(matches!(mv, Move::Play(_)));
}

#[test]
fn hopeless_position_resigns() {
    // An evaluator convinced Black is lost, whoever is asked.
    let eval: EvalFn<GoPosition> = Arc::new(|position: &GoPosition, _| {
        let mut result = uniform_result(position);
        result.winrate = match position.to_move() {
            Color::Black => 0.02,
            Color::White => 0.98,
        };
        Ok(result)
    });
    let network = BatchedNetwork::new(eval, 4, Duration::from_millis(1));

    let mut game = GoPosition::new(5, 7.5);
    // Past a quarter of the intersections in move count.
    play_all(&mut game, &["A1", "B1", "A2", "B2", "A3", "B3", "A4", "B4"]);

    let mut search = UctSearch::new(game, network, single_threaded(120)).unwrap();
    let mv = search.think(Color::Black, PassFlags::default());
    drain(&search);
    assert_eq!(mv, Move::Resign);
}

#[test]
fn no_resign_flag_suppresses_resignation() {
    let eval: EvalFn<GoPosition> = Arc::new(|position: &GoPosition, _| {
        let mut result = uniform_result(position);
        result.winrate = match position.to_move() {
            Color::Black => 0.02,
            Color::White => 0.98,
        };
        Ok(result)
    });
    let network = BatchedNetwork::new(eval, 4, Duration::from_millis(1));

    let mut game = GoPosition::new(5, 7.5);
    play_all(&mut game, &["A1", "B1", "A2", "B2", "A3", "B3", "A4", "B4"]);

    let mut search = UctSearch::new(game, network, single_threaded(120)).unwrap();
    let flags = PassFlags {
        no_pass: false,
        no_resign: true,
    };
    let mv = search.think(Color::Black, flags);
    drain(&search);
    assert_ne!(mv, Move::Resign);
}

#[test]
fn concurrent_search_respects_the_visit_cap() {
    let game = GoPosition::new(9, 7.5);
    let options = SearchOptions::default()
        .with_threads(8)
        .with_visits(200)
        .with_playouts(sente_search::UNLIMITED_PLAYOUTS);
    let eval: EvalFn<GoPosition> = Arc::new(|position: &GoPosition, _| Ok(uniform_result(position)));
    let network = BatchedNetwork::new(eval, 8, Duration::from_millis(1));
    let mut search = UctSearch::new(game, network, options).unwrap();

    search.think(Color::Black, PassFlags::default());
    drain(&search);

    let stats = search.stats();
    assert!(stats.root_visits <= 200 + 8, "visits {}", stats.root_visits);

    // Visits flowing through children never exceed the root's.
    let children_visits: u32 = search.analysis().iter().map(|e| e.visits).sum();
    assert!(children_visits <= stats.root_visits);

    // At rest, every virtual loss has been accounted.
    assert_eq!(stats.root_virtual_loss, 0);
}

#[test]
fn batched_evaluator_matches_synchronous_accounting() {
    let game = GoPosition::new(5, 7.5);
    let eval: EvalFn<GoPosition> = Arc::new(|position: &GoPosition, _| Ok(uniform_result(position)));
    let network = BatchedNetwork::new(eval, 4, Duration::from_millis(1));
    let options = SearchOptions::default()
        .with_threads(4)
        .with_playouts(300)
        .with_visits(sente_search::UNLIMITED_PLAYOUTS);
    let mut search = UctSearch::new(game, network, options).unwrap();

    search.think(Color::Black, PassFlags::default());
    drain(&search);

    let stats = search.stats();
    assert!(stats.playouts >= 1);
    assert_eq!(stats.root_virtual_loss, 0);
    assert!(stats.root_visits >= stats.playouts.saturating_sub(8));
}

#[test]
fn analysis_is_sorted_and_carries_pvs() {
    let game = GoPosition::new(5, 7.5);
    let mut search = UctSearch::new(game, UniformNetwork::new(), single_threaded(150)).unwrap();
    search.think(Color::Black, PassFlags::default());

    let entries = search.analysis();
    assert!(!entries.is_empty());
    for pair in entries.windows(2) {
        assert!(pair[0].visits >= pair[1].visits);
    }
    // The leading entry has a principal variation starting with its move.
    assert!(entries[0].pv.starts_with(&entries[0].mov.to_string()));
    assert!(entries[0].prior > 0.0);
}

#[test]
fn set_visit_limit_takes_effect_between_episodes() {
    let game = GoPosition::new(5, 7.5);
    let options = SearchOptions::for_testing().with_playouts(sente_search::UNLIMITED_PLAYOUTS);
    let mut search = UctSearch::new(game, UniformNetwork::new(), options).unwrap();

    search.set_visit_limit(30);
    search.think(Color::Black, PassFlags::default());
    assert!(search.stats().root_visits <= 30 + 1);
}
