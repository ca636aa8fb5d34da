//! Slip synchronisation across the local cache and the remote store.

use std::sync::Arc;
use std::time::Duration;

use pickslip::remote::sqlite::SqliteBackend;
use pickslip::slip::{SlipPhase, SlipStore};
use pickslip::storage::{JsonFileCache, LocalCache, MemoryCache};
use pickslip::types::{CachedSlipEntry, SlipItem};
use tokio_test::assert_ok;

use crate::mock_remote::{identity, pick, MockRemote};

const DEBOUNCE: Duration = Duration::from_millis(1000);

fn temp_cache() -> Arc<JsonFileCache> {
    let path = std::env::temp_dir().join(format!("pickslip_it_{}.json", uuid::Uuid::new_v4()));
    Arc::new(JsonFileCache::new(path, "bet_slip"))
}

fn store(remote: &MockRemote, cache: Arc<dyn LocalCache>) -> SlipStore {
    SlipStore::with_debounce(Arc::new(remote.clone()), cache, DEBOUNCE)
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_remote_down_loads_cached_items() {
    let remote = MockRemote::new();
    remote.set_error("connection refused");

    let cache = temp_cache();
    let entries: Vec<CachedSlipEntry> = [pick("a", "-110"), pick("b", "+150")]
        .into_iter()
        .map(|p| CachedSlipEntry::from(&SlipItem::new(p, "earlier")))
        .collect();
    assert_ok!(cache.write(&entries));

    let slip = store(&remote, cache.clone());
    slip.start_session(Some(identity("u1"))).await;

    assert_eq!(slip.phase(), SlipPhase::Ready);
    assert_eq!(slip.len(), 2);
    assert!(slip.is_in_slip("a"));
    assert!(slip.is_in_slip("b"));
    assert!((slip.combined_odds() - (1.0 + 100.0 / 110.0) * 2.5).abs() < 1e-9);

    let _ = std::fs::remove_file(cache.path());
}

#[tokio::test]
async fn test_remote_slip_overwrites_stale_cache() {
    let remote = MockRemote::new();
    remote.seed_slip("u1", &[pick("r1", "1.91"), pick("r2", "2.20")]);

    let cache = temp_cache();
    cache
        .write(&[CachedSlipEntry::from(&SlipItem::new(pick("stale", "-110"), "old"))])
        .unwrap();

    let slip = store(&remote, cache.clone());
    slip.start_session(Some(identity("u1"))).await;

    let ids: Vec<String> = slip.items().into_iter().map(|i| i.pick.id).collect();
    assert_eq!(ids, vec!["r1", "r2"]);

    let cached: Vec<String> = cache
        .read()
        .unwrap()
        .unwrap()
        .into_iter()
        .map(|e| e.prediction.id)
        .collect();
    assert_eq!(cached, vec!["r1", "r2"]);

    let _ = std::fs::remove_file(cache.path());
}

#[tokio::test(start_paused = true)]
async fn test_burst_produces_single_write_with_final_state() {
    let remote = MockRemote::new();
    let slip = store(&remote, Arc::new(MemoryCache::new()));
    slip.start_session(Some(identity("u1"))).await;

    slip.add_to_slip(pick("a", "-110"));
    tokio::time::sleep(Duration::from_millis(300)).await;
    slip.add_to_slip(pick("b", "+120"));
    tokio::time::sleep(Duration::from_millis(300)).await;
    slip.add_to_slip(pick("c", "2.05"));
    slip.remove_from_slip("a");

    tokio::time::sleep(Duration::from_millis(999)).await;
    settle().await;
    assert!(remote.writes().is_empty());

    tokio::time::sleep(Duration::from_millis(2)).await;
    settle().await;

    let writes = remote.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].user_id, "u1");
    assert_eq!(writes[0].pick_ids, vec!["b", "c"]);
    assert_eq!(remote.stored_ids("u1"), vec!["b", "c"]);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_cancels_pending_write() {
    let remote = MockRemote::new();
    let slip = store(&remote, Arc::new(MemoryCache::new()));
    slip.start_session(Some(identity("u1"))).await;

    slip.add_to_slip(pick("a", "-110"));
    assert!(slip.has_pending_flush());
    slip.end_session();
    assert!(!slip.has_pending_flush());

    tokio::time::sleep(Duration::from_millis(5000)).await;
    settle().await;
    assert!(remote.writes().is_empty());
    assert_eq!(slip.phase(), SlipPhase::Uninitialized);
}

#[tokio::test(start_paused = true)]
async fn test_failed_flush_is_retried_by_next_mutation() {
    let remote = MockRemote::new();
    let slip = store(&remote, Arc::new(MemoryCache::new()));
    slip.start_session(Some(identity("u1"))).await;

    remote.set_error("503 Service Unavailable");
    slip.add_to_slip(pick("a", "-110"));
    tokio::time::sleep(Duration::from_millis(1500)).await;
    settle().await;
    assert!(remote.writes().is_empty());
    assert_eq!(slip.len(), 1);

    remote.clear_error();
    slip.add_to_slip(pick("b", "-110"));
    tokio::time::sleep(Duration::from_millis(1500)).await;
    settle().await;
    assert_eq!(remote.stored_ids("u1"), vec!["a", "b"]);
}

#[tokio::test(start_paused = true)]
async fn test_signed_out_session_never_reaches_remote() {
    let remote = MockRemote::new();
    let cache = Arc::new(MemoryCache::new());
    let slip = store(&remote, cache.clone());
    slip.start_session(None).await;

    slip.add_to_slip(pick("a", "-110"));
    slip.flush_now().await;
    tokio::time::sleep(Duration::from_millis(3000)).await;
    settle().await;

    assert!(remote.writes().is_empty());
    assert_eq!(cache.read().unwrap().unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_sessions_last_write_wins() {
    let remote = MockRemote::new();
    let first = store(&remote, Arc::new(MemoryCache::new()));
    let second = store(&remote, Arc::new(MemoryCache::new()));
    first.start_session(Some(identity("u1"))).await;
    second.start_session(Some(identity("u1"))).await;

    first.add_to_slip(pick("from-first", "-110"));
    first.flush_now().await;
    second.add_to_slip(pick("from-second", "+200"));
    second.flush_now().await;

    assert_eq!(remote.stored_ids("u1"), vec!["from-second"]);
}

#[tokio::test]
async fn test_sqlite_round_trip_across_sessions() {
    let backend = Arc::new(SqliteBackend::connect("sqlite::memory:").await.unwrap());

    let slip = SlipStore::with_debounce(backend.clone(), Arc::new(MemoryCache::new()), DEBOUNCE);
    slip.start_session(Some(identity("u1"))).await;
    slip.add_to_slip(pick("a", "1.91"));
    slip.add_to_slip(pick("b", "2.20"));
    slip.flush_now().await;
    slip.end_session();

    let fresh = SlipStore::with_debounce(backend, Arc::new(MemoryCache::new()), DEBOUNCE);
    fresh.start_session(Some(identity("u1"))).await;
    let ids: Vec<String> = fresh.items().into_iter().map(|i| i.pick.id).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert!((fresh.potential_payout(1000.0) - 4202.0).abs() < 1e-6);
}

#[tokio::test(start_paused = true)]
async fn test_mutations_refused_while_loading() {
    let remote = MockRemote::new();
    remote.set_delay("u1", Duration::from_millis(500));
    remote.set_error("connection refused");
    let cache = Arc::new(
        MemoryCache::with_entries(&[CachedSlipEntry::from(&SlipItem::new(pick("cached", "-110"), "earlier"))])
            .unwrap(),
    );
    let slip = store(&remote, cache.clone());

    let during_load = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(slip.phase(), SlipPhase::Loading);
        assert!(slip.is_empty());
        assert!(!slip.add_to_slip(pick("early", "+150")));
        assert!(!slip.remove_from_slip("cached"));
        assert!(!slip.clear());
        assert!(!slip.has_pending_flush());
    };
    tokio::join!(slip.start_session(Some(identity("u1"))), during_load);

    // The load failed, so the cache is the fallback and must be intact
    assert_eq!(slip.phase(), SlipPhase::Ready);
    let ids: Vec<String> = slip.items().into_iter().map(|i| i.pick.id).collect();
    assert_eq!(ids, vec!["cached"]);
    let cached: Vec<String> = cache
        .read()
        .unwrap()
        .unwrap()
        .into_iter()
        .map(|e| e.prediction.id)
        .collect();
    assert_eq!(cached, vec!["cached"]);
    assert!(remote.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_superseded_session_load_is_discarded() {
    let remote = MockRemote::new();
    remote.seed_slip("alice", &[pick("alice-1", "-110"), pick("alice-2", "+200")]);
    remote.set_delay("alice", Duration::from_millis(500));
    let cache = Arc::new(MemoryCache::new());
    let slip = store(&remote, cache.clone());

    let switch_user = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        slip.start_session(Some(identity("bob"))).await;
        assert_eq!(slip.phase(), SlipPhase::Ready);
    };
    tokio::join!(slip.start_session(Some(identity("alice"))), switch_user);

    // Alice's load finished last but belongs to a replaced session
    assert_eq!(slip.identity().map(|id| id.user_id), Some("bob".to_string()));
    assert_eq!(slip.phase(), SlipPhase::Ready);
    assert!(slip.is_empty());
    assert!(cache.read().unwrap().is_none());

    assert!(slip.add_to_slip(pick("bob-1", "1.91")));
    assert_eq!(cache.read().unwrap().unwrap().len(), 1);
}
