#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

use parley_server::api::{AppState, app_router};
use parley_server::config::Config;
use parley_server::services::message_service::MessageService;
use parley_server::services::presence::PresenceRegistry;
use parley_server::services::router::DeliveryRouter;
use parley_server::storage;
use parley_server::storage::message_repo::MessageRepository;
use parley_server::storage::user_repo::UserRepository;
use parley_server::telemetry;
use parley_server::workers::PresenceSweeper;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::Instrument;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    let telemetry_guard = telemetry::init_telemetry(&config.telemetry)?;

    let boot_span = tracing::info_span!("boot_server");
    let (listener, router, shutdown_tx, shutdown_rx, sweeper) = async {
        // Phase 1: Infrastructure
        let pool = storage::init_pool(&config.database_url).await?;
        storage::run_migrations(&pool).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        parley_server::spawn_signal_handler(shutdown_tx.clone());

        // Phase 2: Component wiring
        let presence = Arc::new(PresenceRegistry::new(config.websocket.outbound_buffer_size));
        let delivery = DeliveryRouter::new(presence);
        let message_service = MessageService::new(
            MessageRepository::new(pool.clone()),
            UserRepository::new(pool),
            delivery.clone(),
            config.messaging.clone(),
        );
        let sweeper = PresenceSweeper::new(delivery.clone(), config.presence.sweep_interval_secs);

        let state = AppState {
            config: config.clone(),
            message_service,
            router: delivery,
            shutdown_rx: shutdown_rx.clone(),
        };

        // Phase 3: Listener and router
        let router = app_router(state);
        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
        tracing::info!(address = %addr, "listening");
        let listener = tokio::net::TcpListener::bind(addr).await?;

        Ok::<_, anyhow::Error>((listener, router, shutdown_tx, shutdown_rx, sweeper))
    }
    .instrument(boot_span)
    .await?;

    // Phase 4: Runtime
    let sweeper_task = tokio::spawn(sweeper.run(shutdown_rx.clone()));

    let mut serve_rx = shutdown_rx;
    let server = axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = serve_rx.wait_for(|&s| s).await;
        });

    if let Err(e) = server.await {
        tracing::error!(error = %e, "Server error");
    }

    // Phase 5: Graceful shutdown
    let _ = shutdown_tx.send(true);
    tokio::select! {
        _ = sweeper_task => {
            tracing::info!("Background tasks finished.");
        }
        () = tokio::time::sleep(std::time::Duration::from_secs(config.server.shutdown_timeout_secs)) => {
            tracing::warn!("Timeout waiting for background tasks to finish.");
        }
    }

    telemetry_guard.shutdown();
    Ok(())
}
