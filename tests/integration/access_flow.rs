//! Access control against a subscription backend.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use pickslip::access::{AccessControl, AccessPolicy, Tier};
use pickslip::remote::sqlite::SqliteBackend;
use pickslip::types::SubscriptionRow;

use crate::mock_remote::{identity, pick, MockRemote};

fn control(remote: &MockRemote, admin: Option<&str>) -> AccessControl {
    AccessControl::new(
        Arc::new(remote.clone()),
        AccessPolicy {
            admin_email: admin.map(str::to_string),
        },
    )
}

#[tokio::test]
async fn test_starter_cannot_view_pro_but_admin_can() {
    let remote = MockRemote::new();
    remote.seed_subscription("u1", "starter", "active");
    remote.seed_subscription("boss", "starter", "active");

    let access = control(&remote, Some("BOSS@example.com"));
    let snapshot = access.refresh(Some(&identity("u1"))).await;
    assert_eq!(snapshot.tier, Tier::Starter);
    assert!(!access.can_view(Tier::Pro));
    assert!(access.can_view(Tier::Starter));
    assert_eq!(access.capabilities().max_daily_picks, Some(10));

    let snapshot = access.refresh(Some(&identity("boss"))).await;
    assert!(snapshot.is_admin);
    assert!(access.can_view(Tier::Elite));
    assert_eq!(access.capabilities().max_daily_picks, None);
}

#[tokio::test]
async fn test_backend_failure_fails_closed() {
    let remote = MockRemote::new();
    remote.seed_subscription("u1", "elite", "active");
    let access = control(&remote, None);

    assert_eq!(access.refresh(Some(&identity("u1"))).await.tier, Tier::Elite);

    remote.set_error("timeout");
    let snapshot = access.refresh(Some(&identity("u1"))).await;
    assert_eq!(snapshot.tier, Tier::None);
    assert!(!snapshot.loading);
    assert!(!access.can_view(Tier::Starter));
}

#[tokio::test]
async fn test_inactive_and_unknown_tiers_grant_nothing() {
    let remote = MockRemote::new();
    remote.seed_subscription("u1", "pro", "canceled");
    remote.seed_subscription("u2", "platinum", "active");
    let access = control(&remote, None);

    assert_eq!(access.refresh(Some(&identity("u1"))).await.tier, Tier::None);
    assert_eq!(access.refresh(Some(&identity("u2"))).await.tier, Tier::None);
}

#[tokio::test]
async fn test_starter_daily_allowance_trims_picks() {
    let remote = MockRemote::new();
    remote.seed_subscription("u1", "basic", "active");
    let access = control(&remote, None);
    access.refresh(Some(&identity("u1"))).await;

    let picks: Vec<_> = (0..14).map(|i| pick(&format!("p{i}"), "-110")).collect();
    assert_eq!(access.visible_picks(&picks).len(), 10);

    access.sign_out();
    assert_eq!(access.tier(), Tier::None);
    assert_eq!(access.visible_picks(&picks).len(), 14);
}

#[tokio::test]
async fn test_sqlite_subscription_lookup() {
    let backend = Arc::new(SqliteBackend::connect("sqlite::memory:").await.unwrap());
    backend
        .insert_subscription(
            "u1",
            &SubscriptionRow {
                tier: "pro".to_string(),
                status: "active".to_string(),
                current_period_end: None,
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();

    let access = AccessControl::new(backend, AccessPolicy::default());
    let snapshot = access.refresh(Some(&identity("u1"))).await;
    assert_eq!(snapshot.tier, Tier::Pro);
    assert!(access.can_view(Tier::Starter));
    assert!(!access.can_view(Tier::Elite));
}

#[tokio::test(start_paused = true)]
async fn test_elite_reads_none_while_refresh_is_pending() {
    let remote = MockRemote::new();
    remote.seed_subscription("u1", "elite", "active");
    remote.set_delay("u1", Duration::from_millis(500));
    let access = control(&remote, None);
    let user = identity("u1");

    let during_refresh = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(access.tier(), Tier::None);
        assert!(access.is_loading());
        assert!(!access.can_view(Tier::Starter));
    };
    let (snapshot, ()) = tokio::join!(access.refresh(Some(&user)), during_refresh);

    assert_eq!(snapshot.tier, Tier::Elite);
    assert!(!access.is_loading());
    assert!(access.can_view(Tier::Elite));
}

#[tokio::test(start_paused = true)]
async fn test_superseded_refresh_is_discarded() {
    let remote = MockRemote::new();
    remote.seed_subscription("u1", "elite", "active");
    remote.seed_subscription("u2", "pro", "active");
    remote.set_delay("u1", Duration::from_millis(500));
    let access = control(&remote, None);
    let (slow, fast) = (identity("u1"), identity("u2"));

    let newer = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        access.refresh(Some(&fast)).await
    };
    let (stale, current) = tokio::join!(access.refresh(Some(&slow)), newer);

    assert_eq!(current.tier, Tier::Pro);
    // The slow Elite answer landed last and was dropped
    assert_eq!(stale.tier, Tier::Pro);
    assert_eq!(access.tier(), Tier::Pro);
    assert!(!access.can_view(Tier::Elite));
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_during_refresh_wins() {
    let remote = MockRemote::new();
    remote.seed_subscription("u1", "elite", "active");
    remote.set_delay("u1", Duration::from_millis(500));
    let access = control(&remote, None);
    let user = identity("u1");

    let sign_out = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        access.sign_out();
    };
    tokio::join!(access.refresh(Some(&user)), sign_out);

    assert_eq!(access.tier(), Tier::None);
    assert!(!access.is_loading());
}
