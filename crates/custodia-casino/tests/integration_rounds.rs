//! Integration test: provably fair rounds settled against the ledger
//!
//! GATE → DEBIT → ROLL → RESOLVE → CREDIT → COMMIT → PUBLISH → VERIFY
//!
//! Rolls are steered by searching client seeds against a known server seed,
//! so win and loss paths are exercised deterministically.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use custodia_casino::*;
use custodia_ledger::{AssetLedger, MemoryStore};
use custodia_notifier::SettlementNotifier;
use custodia_types::*;
use rust_decimal::Decimal;

const SERVER_SEED: &str = "5f2b8c1d9e3a4f6b7c8d9e0f1a2b3c4d5e6f708192a3b4c5d6e7f8091a2b3c4d";

fn dec(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("custodia_casino=debug,custodia_ledger=info")
        .try_init();
}

struct Table {
    store: Arc<MemoryStore>,
    executor: RoundExecutor,
    notifier: SettlementNotifier,
}

fn table() -> Table {
    let store = Arc::new(MemoryStore::new());
    let ledger = AssetLedger::new(
        store.clone(),
        RetryPolicy {
            lock_wait_ms: 500,
            max_retries: 10,
            backoff_base_ms: 1,
            backoff_max_ms: 20,
        },
    );
    let notifier = SettlementNotifier::new(4_096);
    let fairness = FairnessEngine::with_epoch(
        &FairnessConfig::default(),
        SeedEpoch::from_secret(EpochId(1), SERVER_SEED.into(), Utc::now()),
    );
    let executor = RoundExecutor::new(
        ledger,
        Arc::new(fairness),
        Arc::new(RiskGovernor::default()),
        notifier.clone(),
        &CasinoConfig::default(),
    );
    Table {
        store,
        executor,
        notifier,
    }
}

impl Table {
    fn player(&self, bx: i64) -> AccountId {
        let account = AccountId::new();
        self.executor
            .ledger()
            .credit("seed", account, "BX", dec(bx))
            .unwrap();
        account
    }

    fn balance(&self, account: AccountId) -> Decimal {
        self.executor.ledger().balance(account, "BX").unwrap()
    }
}

/// First client seed whose roll at `nonce` satisfies `pred`.
fn client_seed_where(nonce: u64, pred: impl Fn(Decimal) -> bool) -> String {
    (0..10_000)
        .map(|i| format!("client-{i}"))
        .find(|seed| pred(roll(SERVER_SEED, seed, nonce).unwrap().value))
        .unwrap()
}

fn dice(account: AccountId, bet: Decimal, multiplier: i64, client_seed: String) -> PlayRequest {
    PlayRequest {
        account,
        game: GameKind::threshold(dec(100)),
        bet,
        client_seed,
        parameter: Some(dec(multiplier)),
    }
}

#[test]
fn threshold_rolls_split_at_fifty() {
    let game = GameKind::threshold(dec(100));
    let edge = RiskGovernor::default().current_edge();

    let win = game.resolve(dec(10), Decimal::new(4_999, 2), Some(dec(2))).unwrap();
    assert!(win.win);
    assert_eq!(apply_edge(win.payout, edge), dec(20) * (Decimal::ONE - edge));

    let loss = game.resolve(dec(10), Decimal::new(5_001, 2), Some(dec(2))).unwrap();
    assert!(!loss.win);
    assert_eq!(loss.payout, Decimal::ZERO);
}

#[test]
fn winning_round_credits_discounted_payout() {
    init_tracing();
    let t = table();
    let alice = t.player(100);
    let mut events = t.notifier.subscribe();
    let seed = client_seed_where(0, |r| r < dec(50));

    let round = t.executor.play(dice(alice, dec(10), 2, seed)).unwrap();
    assert!(round.win);
    assert!(round.roll < dec(50));
    assert_eq!(round.payout, Decimal::new(194, 1));
    assert_eq!(t.balance(alice), Decimal::new(1094, 1));
    assert_eq!(round.seed_commitment, commitment(SERVER_SEED));

    let published = events.drain();
    assert_eq!(published.len(), 1);
    match &published[0] {
        SettlementEvent::RoundSettled { round: event } => {
            assert_eq!(event.id, round.id);
            assert_eq!(event.proof, round.proof);
        }
        other => panic!("unexpected event {}", other.name()),
    }
    let json = serde_json::to_string(&published[0]).unwrap();
    assert!(!json.contains(SERVER_SEED));
}

#[test]
fn losing_round_only_debits() {
    init_tracing();
    let t = table();
    let alice = t.player(100);
    let seed = client_seed_where(0, |r| r >= dec(50));

    let round = t.executor.play(dice(alice, dec(10), 2, seed)).unwrap();
    assert!(!round.win);
    assert_eq!(round.payout, Decimal::ZERO);
    assert_eq!(t.balance(alice), dec(90));
    assert_eq!(t.executor.ledger().journal(alice, "BX").unwrap().len(), 2);
    assert_eq!(t.executor.risk().totals().net(), dec(10));
}

#[test]
fn round_verifies_only_against_its_own_epoch() {
    init_tracing();
    let t = table();
    let alice = t.player(1_000);
    let mut rounds = Vec::new();
    for _ in 0..6 {
        rounds.push(t.executor.play(dice(alice, dec(1), 2, "steady".into())).unwrap());
    }
    let fifth = rounds.pop().unwrap();
    assert_eq!(fifth.nonce, 5);
    let old_commitment = fifth.seed_commitment.clone();

    let new_commitment = t.executor.fairness().rotate(Utc::now());
    assert_ne!(old_commitment, new_commitment);

    t.executor.verify(&fifth).unwrap();
    let mut forged = fifth.clone();
    forged.seed_commitment = new_commitment;
    let err = t.executor.verify(&forged).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FairnessIntegrity);

    let revealed = t.executor.fairness().reveal_previous_seed().unwrap();
    assert_eq!(revealed.epoch_id, EpochId(1));
    assert_eq!(revealed.commitment, old_commitment);
    verify_revealed(&revealed, &fifth).unwrap();
    assert!(verify_revealed(&revealed, &forged).is_err());

    // Rounds after the rotation start a fresh nonce sequence.
    let next = t.executor.play(dice(alice, dec(1), 2, "steady".into())).unwrap();
    assert_eq!(next.epoch_id, EpochId(2));
    assert_eq!(next.nonce, 0);
    assert!(verify_revealed(&revealed, &next).is_err());
}

#[test]
fn tampered_roll_fails_verification() {
    init_tracing();
    let t = table();
    let alice = t.player(10);
    let mut round = t.executor.play(dice(alice, dec(1), 3, "x".into())).unwrap();
    round.roll = if round.roll < dec(50) { dec(99) } else { dec(1) };
    assert_eq!(
        t.executor.verify(&round).unwrap_err().kind(),
        ErrorKind::FairnessIntegrity
    );
    round.nonce = 7;
    assert!(t.executor.verify(&round).is_err());
}

#[test]
fn failed_commit_leaves_no_trace() {
    init_tracing();
    let t = table();
    let alice = t.player(50);
    let mut events = t.notifier.subscribe();

    t.store.fail_next_commits(1);
    let err = t
        .executor
        .play(dice(alice, dec(10), 2, "unlucky".into()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(t.balance(alice), dec(50));
    assert_eq!(t.executor.risk().totals().rounds, 0);
    assert!(events.drain().is_empty());

    // The aborted round consumed nonce 0; it is never handed out again.
    let round = t
        .executor
        .play(dice(alice, dec(10), 2, "unlucky".into()))
        .unwrap();
    assert_eq!(round.nonce, 1);
    t.executor.ledger().reconcile().unwrap();
}

#[test]
fn concurrent_rounds_get_unique_nonces_and_conserve_value() {
    init_tracing();
    let t = Arc::new(table());
    let alice = t.player(10_000);
    let mut events = t.notifier.subscribe();

    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let t = Arc::clone(&t);
            thread::spawn(move || {
                (0..25)
                    .map(|n| {
                        let game = if n % 2 == 0 {
                            GameKind::coin_flip()
                        } else {
                            GameKind::slots()
                        };
                        t.executor
                            .play(PlayRequest {
                                account: alice,
                                game,
                                bet: dec(2),
                                client_seed: format!("w{worker}"),
                                parameter: None,
                            })
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let rounds: Vec<GameRound> = workers
        .into_iter()
        .flat_map(|w| w.join().unwrap())
        .collect();

    let nonces: BTreeSet<u64> = rounds.iter().map(|r| r.nonce).collect();
    assert_eq!(nonces, (0..200).collect());

    let paid: Decimal = rounds.iter().map(|r| r.payout).sum();
    assert_eq!(t.balance(alice), dec(10_000) - dec(400) + paid);
    let totals = t.executor.risk().totals();
    assert_eq!(totals.rounds, 200);
    assert_eq!(totals.wagered, dec(400));
    assert_eq!(totals.paid_out, paid);

    for round in &rounds {
        t.executor.verify(round).unwrap();
    }

    let board = Leaderboard::new();
    let counted = events.drain().iter().filter(|e| board.apply(e)).count();
    assert_eq!(counted, 200);
    assert_eq!(board.profit_of(alice), paid - dec(400));
    t.executor.ledger().reconcile().unwrap();
}

#[test]
fn rotation_during_play_keeps_rounds_verifiable() {
    init_tracing();
    let t = Arc::new(table());
    let players: Vec<AccountId> = (0..4).map(|_| t.player(1_000)).collect();

    let rotator = {
        let t = Arc::clone(&t);
        thread::spawn(move || {
            for _ in 0..5 {
                t.executor.fairness().rotate(Utc::now());
                thread::yield_now();
            }
        })
    };
    let workers: Vec<_> = players
        .iter()
        .map(|&player| {
            let t = Arc::clone(&t);
            thread::spawn(move || {
                (0..20)
                    .map(|_| {
                        t.executor
                            .play(dice(player, dec(1), 4, "spin".into()))
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    rotator.join().unwrap();
    let rounds: Vec<GameRound> = workers
        .into_iter()
        .flat_map(|w| w.join().unwrap())
        .collect();

    assert_eq!(t.executor.fairness().active_epoch().id(), EpochId(6));
    for round in &rounds {
        t.executor.verify(round).unwrap();
        if round.epoch_id != EpochId(6) {
            let revealed = t.executor.fairness().reveal(round.epoch_id).unwrap();
            verify_revealed(&revealed, round).unwrap();
        }
    }
    t.executor.ledger().reconcile().unwrap();
}
