//! Two store handles on one database file, finalizing matches that share a
//! bot from separate threads.

use arena_core::{Bot, MatchRecord, Outcome, Placement, Rating, RatingModel, Standing};
use std::sync::{Arc, Barrier};
use std::thread;
use tournament::{SqliteStore, Store};

const MATCHES_PER_WORKER: u64 = 25;

fn two_player_match(winner: &str, loser: &str) -> MatchRecord {
    let mut record = MatchRecord::pending(vec![winner.to_string(), loser.to_string()]);
    record.ranking = [winner, loser]
        .iter()
        .enumerate()
        .map(|(slot, bot)| Placement {
            bot: bot.to_string(),
            slot,
            reported_rank: slot as u32 + 1,
            outcome: Outcome::Finished,
            last_frame_alive: None,
            error_log: None,
        })
        .collect();
    record
}

#[test]
fn test_concurrent_workers_lose_no_updates() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("tournament.db");

    let setup = SqliteStore::open(&db).unwrap();
    for name in ["shared", "left", "right"] {
        setup.register_bot(name, Rating::default(), true).unwrap();
    }
    drop(setup);

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = ["left", "right"]
        .into_iter()
        .map(|opponent| {
            let db = db.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                // Separate connection per worker, as with separate processes
                let store = SqliteStore::open(&db).unwrap();
                let model = RatingModel::default();
                barrier.wait();
                for _ in 0..MATCHES_PER_WORKER {
                    let record = two_player_match("shared", opponent);
                    store
                        .record_match(&record, &|bots: &[Bot]| {
                            let standings: Vec<Standing> = bots
                                .iter()
                                .zip(&record.ranking)
                                .map(|(bot, p)| Standing {
                                    rating: bot.rating(),
                                    rank: p.reported_rank,
                                    outcome: p.outcome,
                                })
                                .collect();
                            model.update(&standings)
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let store = SqliteStore::open(&db).unwrap();
    let shared = store.bot("shared").unwrap().unwrap();
    assert_eq!(shared.matches_played, 2 * MATCHES_PER_WORKER);
    assert_eq!(store.bot("left").unwrap().unwrap().matches_played, MATCHES_PER_WORKER);
    assert_eq!(store.bot("right").unwrap().unwrap().matches_played, MATCHES_PER_WORKER);
    assert_eq!(store.match_count().unwrap(), 2 * MATCHES_PER_WORKER);
}

#[test]
fn test_rating_sees_committed_state_of_other_handle() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("tournament.db");
    let first = SqliteStore::open(&db).unwrap();
    let second = SqliteStore::open(&db).unwrap();
    first.register_bot("alice", Rating::new(25.0, 8.0), true).unwrap();
    first.register_bot("bob", Rating::new(25.0, 8.0), true).unwrap();

    let bump = |bots: &[Bot]| -> Vec<Rating> {
        bots.iter().map(|b| Rating::new(b.mu + 1.0, b.sigma)).collect()
    };
    first.record_match(&two_player_match("alice", "bob"), &bump).unwrap();
    second.record_match(&two_player_match("bob", "alice"), &bump).unwrap();

    // Both increments applied on top of each other, not over each other
    let alice = first.bot("alice").unwrap().unwrap();
    assert_eq!(alice.mu, 27.0);
    assert_eq!(alice.matches_played, 2);
}
