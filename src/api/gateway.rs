use crate::api::AppState;
use crate::services::auth::verify_token;
use axum::{
    extract::{
        Query, State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    http::Extensions,
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use opentelemetry::{global, metrics::UpDownCounter};
use serde::Deserialize;
use tower_http::request_id::RequestId;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    active_connections: UpDownCounter<i64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("parley-server");
        Self {
            active_connections: meter
                .i64_up_down_counter("parley_websocket_active_connections")
                .with_description("Number of active WebSocket connections")
                .build(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WsParams {
    token: String,
}

/// Upgrades the connection after verifying the handshake token; the token's
/// subject becomes the session's user identity.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    extensions: Extensions,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let request_id = extensions
        .get::<RequestId>()
        .map(|id| id.header_value().to_str().unwrap_or_default().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match verify_token(&params.token, &state.config.auth.jwt_secret) {
        Ok(claims) => ws.on_upgrade(move |socket| handle_socket(socket, state, claims.sub, request_id)),
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket handshake failed: invalid token");
            axum::http::StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid, request_id: String) {
    let span = tracing::info_span!(
        "websocket_session",
        request_id = %request_id,
        user_id = %user_id,
        otel.kind = "server",
        ws.session_id = %Uuid::new_v4()
    );

    async move {
        let metrics = Metrics::new();
        metrics.active_connections.add(1, &[]);
        tracing::info!("WebSocket connected");

        // Registration announces the presence change to everyone, including
        // this session's own fresh outbound queue.
        let (registration, mut events_rx) = state.router.connection_opened(user_id);

        let (mut ws_sink, mut ws_stream) = socket.split();
        let mut shutdown_rx = state.shutdown_rx.clone();

        loop {
            if *shutdown_rx.borrow() {
                tracing::info!("Shutdown signal received, closing WebSocket");
                let _ = ws_sink
                    .send(WsMessage::Close(Some(axum::extract::ws::CloseFrame {
                        code: axum::extract::ws::close_code::AWAY,
                        reason: "Server shutting down".into(),
                    })))
                    .await;
                break;
            }

            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {}

                msg = ws_stream.next() => {
                    let continue_loop = match msg {
                        Some(Ok(WsMessage::Close(_))) | None => false,
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "WebSocket error");
                            false
                        }
                        Some(Ok(WsMessage::Ping(_))) => {
                            tracing::debug!("Received heartbeat ping from client");
                            true
                        }
                        Some(Ok(WsMessage::Pong(_))) => {
                            tracing::debug!("Received heartbeat pong from client");
                            true
                        }
                        Some(Ok(WsMessage::Text(t))) => {
                            tracing::warn!("Received unexpected text message: {}", t);
                            true
                        }
                        Some(Ok(WsMessage::Binary(_))) => {
                            tracing::warn!("Received unexpected binary message");
                            true
                        }
                    };

                    if !continue_loop { break; }
                }

                event = events_rx.recv() => {
                    match event {
                        Some(event) => {
                            match serde_json::to_string(&event) {
                                Ok(json) => {
                                    if ws_sink.send(WsMessage::Text(json.into())).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    tracing::error!(error = %e, "Failed to serialize push event");
                                }
                            }
                        }
                        // Queue sender dropped: this registration was
                        // superseded by a newer connection for the same user.
                        None => {
                            tracing::info!("Connection superseded, closing WebSocket");
                            break;
                        }
                    }
                }
            }
        }

        let _ = ws_sink.close().await;
        state.router.connection_closed(registration);

        metrics.active_connections.add(-1, &[]);
        tracing::info!("WebSocket disconnected");
    }
    .instrument(span)
    .await;
}
