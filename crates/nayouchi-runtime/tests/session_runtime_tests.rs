//! Integration tests for the session runtime
//!
//! Runs real session tasks against in-memory channels wired to a fake backend,
//! covering live propagation between participants, subscription lifecycle,
//! stale replies and connectivity loss.

mod support;

use std::sync::Arc;
use std::time::Duration;

use nayouchi_core::{Address, Role, SessionError, TransportError};
use nayouchi_runtime::{
    AppContext, Confirmation, GroupId, MemoryChannel, MemoryReply, Name, NayouchiError,
    ParticipantId, RecordedCall, SessionConfig, SessionPhase, SessionSnapshot, SharedChannel,
    Topic,
};
use serde_json::{json, Value};
use support::{eventually, FakeBackend};

const SETTLE: Duration = Duration::from_secs(2);

// ----------------------------------------------------------------------------
// Live Propagation
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_two_participants_see_shared_match() {
    let backend = FakeBackend::new();
    backend.seed_group(
        "g1",
        "Baby",
        &[("u1", "Kim", Role::Initiator), ("u2", "Sam", Role::Initiator)],
    );

    let (kim, _) = backend.context("u1").await;
    let (sam, _) = backend.context("u2").await;
    let g1 = GroupId::new("g1");

    kim.session().enter_group(g1.clone()).await.unwrap();
    sam.session().enter_group(g1.clone()).await.unwrap();

    kim.session().propose("Smith").await.unwrap();
    sam.session().propose("Smith").await.unwrap();

    let smith = Name::new("Smith");
    for context in [&kim, &sam] {
        let snapshot = context
            .session()
            .wait_until(SETTLE, |s| s.duplicates().contains(&smith))
            .await
            .expect("both sessions should see the match");
        let group = snapshot.group.expect("in group");
        assert_eq!(group.stats.values().sum::<usize>(), 2);
        assert!(group.is_match(&smith));
    }
}

#[tokio::test]
async fn test_create_group_enters_naming_then_names() {
    let backend = FakeBackend::new();
    let (context, channel) = backend.context("u1").await;

    let snapshot = context.session().snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Listing);
    assert_eq!(snapshot.groups, Some(vec![]));

    context.session().create_group("Trip").await.unwrap();
    let snapshot = context.session().snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Naming);
    let group = snapshot.group.expect("entered the new group");
    assert_eq!(group.name, "Trip");
    assert!(group.me.is_initiator());
    assert_eq!(channel.subscription_count(&Topic::for_group(&group.id)), 1);

    // proposing is gated until a display name exists
    let err = context.session().propose("Smith").await.unwrap_err();
    assert!(matches!(
        err,
        NayouchiError::Session(SessionError::NameRequired { .. })
    ));

    context.session().set_user_name("Kim").await.unwrap();
    context
        .session()
        .wait_until(SETTLE, |s| s.phase == SessionPhase::InGroup)
        .await
        .expect("push refresh should clear the naming state");
    context.session().propose("Smith").await.unwrap();
}

// ----------------------------------------------------------------------------
// Subscription Lifecycle
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_enter_leave_enter_keeps_one_subscription() {
    let backend = FakeBackend::new();
    backend.seed_group("g1", "Baby", &[("u1", "Kim", Role::Initiator)]);
    let (context, channel) = backend.context("u1").await;
    let g1 = GroupId::new("g1");
    let topic = Topic::for_group(&g1);

    context.session().enter_group(g1.clone()).await.unwrap();
    context.session().leave_group().await.unwrap();
    assert_eq!(channel.subscription_count(&topic), 0);
    assert_eq!(context.session().snapshot().phase, SessionPhase::Listing);

    context.session().enter_group(g1.clone()).await.unwrap();
    assert_eq!(channel.subscription_count(&topic), 1);
    assert_eq!(channel.active_topics(), vec![topic.clone()]);

    let subscribes = channel
        .calls()
        .into_iter()
        .filter(|c| matches!(c, RecordedCall::Subscribe(_)))
        .count();
    assert_eq!(subscribes, 2);
}

#[tokio::test]
async fn test_switching_groups_moves_subscription() {
    let backend = FakeBackend::new();
    backend.seed_group("g1", "Baby", &[("u1", "Kim", Role::Initiator)]);
    backend.seed_group("g2", "Band", &[("u1", "Kim", Role::Proposer)]);
    let (context, channel) = backend.context("u1").await;

    context.session().enter_group(GroupId::new("g1")).await.unwrap();
    context.session().enter_group(GroupId::new("g2")).await.unwrap();

    assert_eq!(channel.active_topics(), vec![Topic::new("grp-g2")]);
    assert_eq!(context.session().snapshot().subscription, Some(Topic::new("grp-g2")));
}

#[tokio::test]
async fn test_resign_returns_to_list() {
    let backend = FakeBackend::new();
    backend.seed_group(
        "g1",
        "Baby",
        &[("u1", "Kim", Role::Initiator), ("u2", "Sam", Role::Initiator)],
    );
    let (context, channel) = backend.context("u1").await;
    context.session().enter_group(GroupId::new("g1")).await.unwrap();

    let err = context.session().resign(Confirmation::Declined).await.unwrap_err();
    assert!(err.is_precondition());

    context.session().resign(Confirmation::Granted).await.unwrap();
    let snapshot = context.session().snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Listing);
    assert_eq!(snapshot.groups, Some(vec![]));
    assert!(channel.active_topics().is_empty());
}

// ----------------------------------------------------------------------------
// Stale Replies and Preconditions
// ----------------------------------------------------------------------------

fn group_reply(id: &str) -> Value {
    json!({
        "id": id,
        "name": format!("Group {}", id),
        "me": { "name": "Kim", "role": "INITIATOR", "nominations": [] }
    })
}

#[tokio::test]
async fn test_stale_enter_reply_is_discarded() {
    let channel = MemoryChannel::open_with(|address, body| match address {
        Address::List => MemoryReply::Value(json!([])),
        Address::Enter if body["grp"] == "slow" => MemoryReply::Hold,
        Address::Enter => MemoryReply::Value(group_reply(body["grp"].as_str().unwrap_or_default())),
        _ => MemoryReply::Value(json!({ "result": "success" })),
    });
    let shared: SharedChannel = Arc::new(channel.clone());
    let context = AppContext::builder(ParticipantId::new("u1"))
        .with_channel(shared)
        .with_session_config(SessionConfig::testing())
        .build_and_start()
        .await
        .unwrap();

    let session = context.session().clone();
    let slow = tokio::spawn(async move { session.enter_group(GroupId::new("slow")).await });
    assert!(eventually(|| channel.held().len() == 1).await);

    context.session().enter_group(GroupId::new("fast")).await.unwrap();
    assert!(channel.release(0, Ok(group_reply("slow"))));

    let result = slow.await.unwrap();
    assert!(matches!(
        result,
        Err(NayouchiError::Session(SessionError::Superseded { .. }))
    ));
    let snapshot = context.session().snapshot();
    assert_eq!(snapshot.group.map(|g| g.id), Some(GroupId::new("fast")));
    assert_eq!(channel.active_topics(), vec![Topic::new("grp-fast")]);
}

#[tokio::test]
async fn test_precondition_errors_do_not_touch_channel() {
    let backend = FakeBackend::new();
    let (context, channel) = backend.context("u1").await;
    channel.clear_calls();

    for result in [
        context.session().propose("Smith").await,
        context.session().remove_name("Smith").await,
        context.session().add_member("sam@example.org").await,
        context.session().leave_group().await,
    ] {
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            NayouchiError::Session(SessionError::RequiresGroup { .. })
        ));
    }
    assert!(channel.calls().is_empty());
}

#[tokio::test]
async fn test_upgrade_requires_initiator() {
    let backend = FakeBackend::new();
    backend.seed_group(
        "g1",
        "Baby",
        &[("u1", "Kim", Role::Proposer), ("u2", "Sam", Role::Initiator)],
    );
    let (context, channel) = backend.context("u1").await;
    context.session().enter_group(GroupId::new("g1")).await.unwrap();
    channel.clear_calls();

    let err = context
        .session()
        .upgrade("Sam", Confirmation::Granted)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NayouchiError::Session(SessionError::NotInitiator { .. })
    ));
    assert!(channel.addresses().is_empty());
}

// ----------------------------------------------------------------------------
// Connectivity
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_connectivity_loss_is_reported_and_recovered() {
    let backend = FakeBackend::new();
    backend.seed_group("g1", "Baby", &[("u1", "Kim", Role::Initiator)]);
    let (context, channel) = backend.context("u1").await;
    let mut connectivity = context.connectivity();
    assert!(connectivity.is_connected());

    channel.close();
    let state = connectivity.changed().await.unwrap();
    assert!(!state.is_connected());

    let err = context
        .session()
        .enter_group(GroupId::new("g1"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NayouchiError::Transport(TransportError::NotConnected)
    ));
    assert_eq!(context.session().snapshot().phase, SessionPhase::Listing);

    channel.open();
    connectivity
        .wait_connected(Duration::from_secs(1))
        .await
        .unwrap();
    context.session().enter_group(GroupId::new("g1")).await.unwrap();
    assert_eq!(context.session().snapshot().phase, SessionPhase::InGroup);
}

#[tokio::test]
async fn test_reconnect_resyncs_group_snapshot() {
    let backend = FakeBackend::new();
    backend.seed_group(
        "g1",
        "Baby",
        &[("u1", "Kim", Role::Initiator), ("u2", "Sam", Role::Initiator)],
    );
    let (kim, kim_channel) = backend.context("u1").await;
    let (sam, _) = backend.context("u2").await;
    let g1 = GroupId::new("g1");

    kim.session().enter_group(g1.clone()).await.unwrap();
    sam.session().enter_group(g1).await.unwrap();

    // Sam's nomination is announced while Kim is offline
    kim_channel.close();
    sam.session().propose("Smith").await.unwrap();
    let kim_stats = |s: &SessionSnapshot| {
        s.group
            .as_ref()
            .map_or(0, |g| g.stats.values().sum::<usize>())
    };
    assert_eq!(kim_stats(&kim.session().snapshot()), 0);

    kim_channel.open();
    let snapshot = kim
        .session()
        .wait_until(SETTLE, |s| kim_stats(s) == 1)
        .await
        .expect("group snapshot refreshed after reconnect");
    assert_eq!(snapshot.phase, SessionPhase::InGroup);
    assert_eq!(kim_channel.subscription_count(&Topic::new("grp-g1")), 1);
}

#[tokio::test]
async fn test_reconnect_relists_groups() {
    let backend = FakeBackend::new();
    let (context, channel) = backend.context("u1").await;
    assert_eq!(context.session().snapshot().groups, Some(vec![]));

    channel.close();
    backend.seed_group("g1", "Baby", &[("u1", "Kim", Role::Initiator)]);
    channel.open();

    context
        .session()
        .wait_until(SETTLE, |s| s.groups.as_ref().map_or(false, |g| g.len() == 1))
        .await
        .expect("group list refreshed after reconnect");
}

#[tokio::test]
async fn test_shutdown_stops_session_task() {
    let backend = FakeBackend::new();
    let (mut context, _) = backend.context("u1").await;
    assert!(context.is_running());

    context.shutdown().await.unwrap();
    assert!(!context.is_running());
    assert!(context.session().fetch_groups().await.is_err());
}
