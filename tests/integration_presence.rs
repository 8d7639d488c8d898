mod common;

use common::{TestApp, short_run_id};
use parley_server::domain::event::ServerEvent;

#[tokio::test]
async fn test_connect_broadcasts_the_full_snapshot() {
    let app = TestApp::spawn().await;
    let run_id = short_run_id();

    let alice = app.register_user(&format!("alice_pres_{run_id}")).await;
    let bob = app.register_user(&format!("bob_pres_{run_id}")).await;

    let mut alice_ws = app.connect_ws(&alice.token).await;
    alice_ws
        .wait_for("own presence snapshot", |event| {
            matches!(event, ServerEvent::GetOnlineUsers(online) if online.contains(&alice.user_id))
        })
        .await;

    let _bob_ws = app.connect_ws(&bob.token).await;
    alice_ws
        .wait_for("snapshot including both users", |event| {
            matches!(
                event,
                ServerEvent::GetOnlineUsers(online)
                    if online.contains(&alice.user_id) && online.contains(&bob.user_id)
            )
        })
        .await;
}

#[tokio::test]
async fn test_disconnect_broadcasts_the_departure() {
    let app = TestApp::spawn().await;
    let run_id = short_run_id();

    let alice = app.register_user(&format!("alice_dep_{run_id}")).await;
    let bob = app.register_user(&format!("bob_dep_{run_id}")).await;

    let mut alice_ws = app.connect_ws(&alice.token).await;
    let bob_ws = app.connect_ws(&bob.token).await;
    alice_ws
        .wait_for("snapshot including bob", |event| {
            matches!(event, ServerEvent::GetOnlineUsers(online) if online.contains(&bob.user_id))
        })
        .await;

    bob_ws.close().await;

    alice_ws
        .wait_for("snapshot without bob", |event| {
            matches!(
                event,
                ServerEvent::GetOnlineUsers(online)
                    if online.contains(&alice.user_id) && !online.contains(&bob.user_id)
            )
        })
        .await;
}

#[tokio::test]
async fn test_reconnect_supersedes_the_previous_connection() {
    let app = TestApp::spawn().await;
    let run_id = short_run_id();

    let alice = app.register_user(&format!("alice_re_{run_id}")).await;
    let bob = app.register_user(&format!("bob_re_{run_id}")).await;

    let mut first_ws = app.connect_ws(&bob.token).await;
    first_ws
        .wait_for("own presence snapshot", |event| {
            matches!(event, ServerEvent::GetOnlineUsers(online) if online.contains(&bob.user_id))
        })
        .await;

    // The second connection for the same user wins; the server closes the
    // superseded one.
    let mut second_ws = app.connect_ws(&bob.token).await;
    first_ws.wait_for_close().await;

    // The user never appears offline across the handover, and new messages
    // route to the surviving connection.
    let sent = app.send_message(&alice.token, bob.user_id, "to the new socket", &[]).await;
    let event = second_ws
        .wait_for("newMessage on the new connection", |event| {
            matches!(event, ServerEvent::NewMessage(message) if message.id == sent.id)
        })
        .await;
    match event {
        ServerEvent::NewMessage(message) => assert_eq!(message.text, "to the new socket"),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_handshake_rejects_an_invalid_token() {
    let app = TestApp::spawn().await;

    let result = tokio_tungstenite::connect_async(format!("{}?token=invalid", app.ws_url)).await;
    assert!(result.is_err(), "handshake must be rejected");
}

#[tokio::test]
async fn test_gateway_tolerates_client_pings() {
    let app = TestApp::spawn().await;
    let run_id = short_run_id();

    let alice = app.register_user(&format!("alice_ping_{run_id}")).await;
    let mut ws = app.connect_ws(&alice.token).await;
    ws.wait_for("own presence snapshot", |event| matches!(event, ServerEvent::GetOnlineUsers(_)))
        .await;

    ws.send_ping().await;

    // The connection stays up: a subsequent broadcast still arrives.
    let bob = app.register_user(&format!("bob_ping_{run_id}")).await;
    let _bob_ws = app.connect_ws(&bob.token).await;
    ws.wait_for("snapshot including bob", |event| {
        matches!(event, ServerEvent::GetOnlineUsers(online) if online.contains(&bob.user_id))
    })
    .await;
}
