mod common;

use common::{TestApp, TestUser, short_run_id};
use parley_server::client::{ChatStore, EventPump, HttpChatApi, RevokeState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};

/// Bridges a live gateway connection into the broadcast feed the agent's
/// event pump consumes.
async fn attach_agent(
    app: &TestApp,
    user: &TestUser,
) -> (Arc<Mutex<ChatStore<HttpChatApi>>>, EventPump<HttpChatApi>) {
    let api = Arc::new(HttpChatApi::new(app.server_url.clone(), user.token.clone()));
    let store = Arc::new(Mutex::new(ChatStore::new(api, user.user_id)));

    let (feed_tx, feed_rx) = broadcast::channel(64);
    let mut ws = app.connect_ws(&user.token).await;
    tokio::spawn(async move {
        while let Some(event) = ws.next_event_timeout(Duration::from_secs(30)).await {
            if feed_tx.send(event).is_err() {
                break;
            }
        }
    });

    let mut pump = EventPump::new(Arc::clone(&store));
    pump.subscribe(feed_rx);

    (store, pump)
}

async fn eventually<F>(what: &str, check: F)
where
    F: AsyncFn() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if check().await {
            return;
        }
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for: {what}");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn test_agent_applies_pushes_to_the_open_conversation() {
    let app = TestApp::spawn().await;
    let run_id = short_run_id();

    let alice = app.register_user(&format!("alice_agent_{run_id}")).await;
    let bob = app.register_user(&format!("bob_agent_{run_id}")).await;

    let (store, _pump) = attach_agent(&app, &bob).await;
    store.lock().await.open_conversation(alice.user_id).await.expect("open conversation");
    store.lock().await.refresh_users().await.expect("refresh sidebar");
    assert!(store.lock().await.users().iter().any(|user| user.id == alice.user_id));

    // A live creation push lands in the open conversation.
    let sent = app.send_message(&alice.token, bob.user_id, "push me", &[]).await;
    eventually("creation push applied", async || {
        store.lock().await.messages().iter().any(|local| local.message.id == sent.id)
    })
    .await;

    // The agent observes the sender's presence via the broadcast snapshots.
    eventually("presence snapshot applied", async || store.lock().await.is_online(bob.user_id))
        .await;

    // A revocation push tombstones the local copy.
    let resp = app.revoke_message_raw(&alice.token, sent.id).await;
    assert_eq!(resp.status(), 200);
    eventually("revocation push applied", async || {
        let store = store.lock().await;
        let local = store.messages().iter().find(|local| local.message.id == sent.id).cloned();
        local.is_some_and(|local| {
            local.revoke_state == RevokeState::Revoked && local.message.text.is_empty()
        })
    })
    .await;
}

#[tokio::test]
async fn test_agent_sends_and_revokes_through_the_rest_seam() {
    let app = TestApp::spawn().await;
    let run_id = short_run_id();

    let alice = app.register_user(&format!("alice_seam_{run_id}")).await;
    let bob = app.register_user(&format!("bob_seam_{run_id}")).await;

    let (store, _pump) = attach_agent(&app, &bob).await;
    store.lock().await.open_conversation(alice.user_id).await.expect("open conversation");

    let sent = store
        .lock()
        .await
        .send_message("from the agent".to_string(), vec![])
        .await
        .expect("send through agent");

    // The server persisted it for the peer.
    let conversation = app.get_conversation(&alice.token, bob.user_id).await;
    assert_eq!(conversation.len(), 1);
    assert_eq!(conversation[0].id, sent.id);

    // Optimistic revoke confirms against the live server.
    store.lock().await.revoke_message(sent.id).await.expect("revoke through agent");
    {
        let store = store.lock().await;
        assert_eq!(store.messages()[0].revoke_state, RevokeState::Revoked);
    }
    let conversation = app.get_conversation(&alice.token, bob.user_id).await;
    assert!(conversation[0].deleted);
}

#[tokio::test]
async fn test_agent_rolls_back_a_rejected_revoke() {
    let app = TestApp::spawn().await;
    let run_id = short_run_id();

    let alice = app.register_user(&format!("alice_roll_{run_id}")).await;
    let bob = app.register_user(&format!("bob_roll_{run_id}")).await;

    let (store, _pump) = attach_agent(&app, &bob).await;
    store.lock().await.open_conversation(alice.user_id).await.expect("open conversation");

    // Alice's message arrives by push; Bob may not revoke it.
    let sent = app.send_message(&alice.token, bob.user_id, "not yours", &[]).await;
    eventually("creation push applied", async || {
        store.lock().await.messages().iter().any(|local| local.message.id == sent.id)
    })
    .await;

    let result = store.lock().await.revoke_message(sent.id).await;
    assert!(result.is_err(), "foreign revoke must be rejected");

    let store = store.lock().await;
    let local = store.messages().iter().find(|local| local.message.id == sent.id).expect("local copy");
    assert_eq!(local.revoke_state, RevokeState::Pristine);
    assert_eq!(local.message.text, "not yours");

    // Server state is untouched as well.
    drop(store);
    let conversation = app.get_conversation(&alice.token, bob.user_id).await;
    assert!(!conversation[0].deleted);
}
