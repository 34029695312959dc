//! Concurrency guarantees of the engine: one bet per user per round, no
//! bet slips in after a round is frozen, ticks never double-declare and
//! there is never more than one live round.

use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use wingo::clock::ManualClock;
use wingo::errors::{StateConflict, WingoError};
use wingo::games::types::{BetResult, RoundId, RoundStatus};
use wingo::{GameEngine, PlaceBetRequest, WingoConfig};

fn engine() -> (Arc<GameEngine>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let mut config = WingoConfig::default();
    config.risk.max_loss = dec!(1000000);
    let engine = GameEngine::builder()
        .with_config(config)
        .with_clock(clock.clone())
        .with_rng_seed(99)
        .build()
        .expect("valid engine");
    (Arc::new(engine), clock)
}

fn request(user: &str, round_id: RoundId, selection: &str, amount: Decimal) -> PlaceBetRequest {
    PlaceBetRequest {
        user_id: user.to_string(),
        round_id,
        bet_type: "NUMBER".to_string(),
        selection: selection.to_string(),
        amount,
    }
}

async fn live_rounds(engine: &GameEngine) -> usize {
    engine
        .recent_rounds(usize::MAX)
        .await
        .unwrap()
        .iter()
        .filter(|r| !r.status.is_terminal())
        .count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_bets_debit_once() {
    let (engine, _) = engine();
    let round = engine.ensure_open_round().await.unwrap();
    engine.credit_wallet("racer", dec!(1000), "seed").await.unwrap();

    let attempts = (0..20).map(|i| {
        let engine = engine.clone();
        let selection = (i % 10).to_string();
        tokio::spawn(async move {
            engine
                .place_bet(request("racer", round.id, &selection, dec!(40)))
                .await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| {
            matches!(
                r,
                Err(WingoError::StateConflict(StateConflict::DuplicateBet { .. }))
            )
        })
        .count();

    assert_eq!(accepted, 1);
    assert_eq!(duplicates, 19);
    assert_eq!(engine.balance("racer").await.unwrap(), dec!(960));
    assert_eq!(engine.round_bets(round.id).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bets_racing_a_declaration_are_settled_or_rejected() {
    let (engine, _) = engine();
    let round = engine.ensure_open_round().await.unwrap();
    let players: Vec<String> = (0..50).map(|i| format!("p{:02}", i)).collect();
    for player in &players {
        engine.credit_wallet(player, dec!(100), "seed").await.unwrap();
    }

    let mut tasks = Vec::new();
    for (i, player) in players.iter().enumerate() {
        let bet_engine = engine.clone();
        let player = player.clone();
        let selection = (i % 10).to_string();
        tasks.push(tokio::spawn(async move {
            bet_engine
                .place_bet(request(&player, round.id, &selection, dec!(100)))
                .await
                .map(|_| ())
        }));
        if i == 25 {
            let engine = engine.clone();
            tasks.push(tokio::spawn(async move {
                engine.declare_system(round.id).await.map(|_| ())
            }));
        }
    }
    for joined in join_all(tasks).await {
        match joined.unwrap() {
            Ok(()) => {}
            Err(WingoError::StateConflict(StateConflict::RoundNotOpen { .. })) => {}
            Err(e) => panic!("unexpected error {}", e),
        }
    }

    let declared = engine.round(round.id).await.unwrap();
    assert_eq!(declared.status, RoundStatus::ResultDeclared);
    let snapshot = declared.snapshot.unwrap();

    let bets = engine.round_bets(round.id).await.unwrap();
    assert!(bets.iter().all(|b| b.result.is_final()));
    assert_eq!(
        bets.iter().map(|b| b.amount).sum::<Decimal>(),
        snapshot.collection,
        "every accepted bet was in the frozen set"
    );
    assert_eq!(
        bets.iter()
            .map(|b| b.win_amount.unwrap_or_default())
            .sum::<Decimal>(),
        snapshot.payout
    );

    for player in &players {
        let placed = bets.iter().find(|b| &b.user_id == player);
        let balance = engine.balance(player).await.unwrap();
        match placed {
            Some(bet) if bet.result == BetResult::Won => {
                assert_eq!(balance, bet.win_amount.unwrap())
            }
            Some(_) => assert_eq!(balance, Decimal::ZERO),
            None => assert_eq!(balance, dec!(100), "rejected stake untouched"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ticks_declare_once() {
    let (engine, clock) = engine();
    let round = engine.ensure_open_round().await.unwrap();
    clock.advance(chrono::Duration::seconds(61));

    let ticks = (0..10).map(|_| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.tick().await })
    });
    let reports: Vec<_> = join_all(ticks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let declarations: Vec<_> = reports.iter().flat_map(|r| r.declared.iter()).collect();
    assert_eq!(declarations.len(), 1);
    assert_eq!(declarations[0].round_id, round.id);
    assert!(reports.iter().any(|r| !r.skipped));
    assert_eq!(live_rounds(&engine).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn at_most_one_live_round() {
    let (engine, _) = engine();

    let opens = (0..20).map(|_| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.ensure_open_round().await })
    });
    let ids: Vec<_> = join_all(opens)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap().id)
        .collect();
    assert!(ids.iter().all(|id| *id == ids[0]));

    // Declarations and cancellations interleaved with opens
    for i in 0..10 {
        let current = engine.current_round().await.unwrap().unwrap();
        let closer = {
            let engine = engine.clone();
            tokio::spawn(async move {
                if i % 2 == 0 {
                    engine.declare_system(current.id).await.map(|_| ())
                } else {
                    engine.cancel(current.id).await.map(|_| ())
                }
            })
        };
        let openers: Vec<_> = (0..5)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.ensure_open_round().await })
            })
            .collect();

        closer.await.unwrap().unwrap();
        for opened in join_all(openers).await {
            opened.unwrap().unwrap();
        }
        assert_eq!(live_rounds(&engine).await, 1);
    }
}
