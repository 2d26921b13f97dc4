mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{save, temp_store};
use statekeep::snapshot::normalize;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_for_one_user_are_all_retained() {
    let (_tmp, store) = temp_store(64).await;
    let store = Arc::new(store);

    let mut tasks = Vec::new();
    for i in 1..=24u64 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            store.append("alice", &save(i, i as i64)).await.unwrap()
        }));
    }
    for t in tasks {
        assert!(t.await.unwrap().stored);
    }

    let doc = store.load("alice").await.unwrap();
    let mut coins: Vec<u64> = doc.snapshots.iter().map(|s| s.coins).collect();
    coins.sort_unstable();
    assert_eq!(coins, (1..=24).collect::<Vec<u64>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_still_respect_capacity() {
    let (_tmp, store) = temp_store(5).await;
    let store = Arc::new(store);

    let tasks: Vec<_> = (1..=30u64)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.append("alice", &save(i, i as i64)).await.unwrap() })
        })
        .collect();
    let mut totals = Vec::new();
    for t in tasks {
        totals.push(t.await.unwrap().total.unwrap());
    }

    assert!(totals.iter().all(|&t| t <= 5));
    assert_eq!(store.load("alice").await.unwrap().snapshots.len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_for_different_users_do_not_interact() {
    let (_tmp, store) = temp_store(10).await;
    let store = Arc::new(store);

    let tasks: Vec<_> = ["alice", "bob", "carol", "dave"]
        .into_iter()
        .flat_map(|user| (1..=5u64).map(move |i| (user, i)))
        .map(|(user, i)| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.append(user, &save(i, i as i64)).await.unwrap() })
        })
        .collect();
    for t in tasks {
        t.await.unwrap();
    }

    for user in ["alice", "bob", "carol", "dave"] {
        assert_eq!(store.summaries(user).await.len(), 5, "user {}", user);
    }
}

/// Clients that disconnect mid-save drop their append future. Whatever those
/// abandoned writes did, every append that did complete must still be there.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn abandoned_appends_never_overwrite_completed_ones() {
    let (_tmp, store) = temp_store(256).await;
    let store = Arc::new(store);

    let tasks: Vec<_> = (1..=40u64)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let doc = save(i, i as i64);
                let append = store.append("alice", &doc);
                if i % 2 == 0 {
                    tokio::time::timeout(Duration::from_micros(50 * i), append)
                        .await
                        .ok()
                        .map(|r| (i, r.unwrap()))
                } else {
                    Some((i, append.await.unwrap()))
                }
            })
        })
        .collect();
    let mut completed = Vec::new();
    for t in tasks {
        if let Some((i, out)) = t.await.unwrap() {
            assert!(out.stored);
            completed.push(i);
        }
    }

    // Abandoned writers finish in the background before the lock is free again
    store.append("alice", &save(99, 99)).await.unwrap();

    let doc = store.load("alice").await.unwrap();
    let kept: Vec<u64> = doc.snapshots.iter().map(|s| s.coins).collect();
    for i in completed.iter().chain([99].iter()) {
        assert!(kept.contains(i), "completed append {} was lost", i);
    }
}

/// The on-disk format is a whole-document overwrite. Two writers that each
/// load the same prior document and save without the per-user lock lose the
/// first writer's entry: last writer wins.
#[tokio::test]
async fn unlocked_read_modify_write_loses_the_first_update() {
    let (_tmp, store) = temp_store(10).await;
    store.append("alice", &save(1, 1)).await.unwrap();

    let mut tab_a = store.load("alice").await.unwrap();
    let mut tab_b = store.load("alice").await.unwrap();
    tab_a.push_capped(normalize(&save(2, 2)), store.capacity());
    tab_b.push_capped(normalize(&save(3, 3)), store.capacity());

    store.save("alice", &tab_a).await.unwrap();
    store.save("alice", &tab_b).await.unwrap();

    let doc = store.load("alice").await.unwrap();
    let coins: Vec<u64> = doc.snapshots.iter().map(|s| s.coins).collect();
    assert_eq!(coins, vec![1, 3], "tab A's save is silently discarded");
}
