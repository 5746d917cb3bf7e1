//! `cw-gateway` binary entry point: load config, build shared state, bind,
//! serve — extended with the scheduler's background loop and a
//! graceful-shutdown path that SIGTERMs all running agents, waits up to
//! 30s, then SIGKILLs survivors.

mod app;
mod auth;
mod error;
mod http;
mod ws;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use cw_agent::AgentOrchestrator;
use cw_broadcast::BroadcastHub;
use cw_core::CwConfig;
use cw_kanban::KanbanQueue;
use cw_notify::{ChannelManager, TelegramChannel};
use cw_scheduler::SchedulerEngine;
use cw_steering::SteeringEngine;
use cw_store::Store;
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cw_gateway=info,tower_http=info".into()),
        )
        .init();

    let config_path = std::env::var("CW_CONFIG").ok();
    let config = CwConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({}), using defaults", e);
        CwConfig::default()
    });

    std::fs::create_dir_all(&config.workspace.path).ok();
    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let store = Arc::new(Store::open(&config.database.path, &config.database.message_encryption_key)?);
    let broadcast = Arc::new(BroadcastHub::new());
    let kanban = Arc::new(KanbanQueue::new(store.clone(), broadcast.clone()));
    let steering = Arc::new(SteeringEngine::new(store.clone()));

    let mut channel_manager = ChannelManager::new();
    if let Some(tg) = &config.telegram {
        channel_manager.register(Box::new(TelegramChannel::new(
            tg.bot_token.clone(),
            tg.chat_id.clone(),
        )));
    }
    channel_manager.connect_all().await;
    let notify = Some(Arc::new(channel_manager));

    let workspace_path = PathBuf::from(&config.workspace.path);
    let orchestrator = AgentOrchestrator::new(
        store.clone(),
        kanban.clone(),
        broadcast.clone(),
        steering.clone(),
        notify.clone(),
        config.orchestrator.clone(),
        workspace_path.clone(),
    );

    let scheduler = Arc::new(SchedulerEngine::new(
        store.clone(),
        kanban.clone(),
        orchestrator.clone(),
        broadcast.clone(),
        config.orchestrator.clone(),
        workspace_path,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    let state = Arc::new(app::AppState::new(
        config.clone(),
        store,
        broadcast,
        kanban,
        steering,
        orchestrator.clone(),
        scheduler,
        notify,
    ));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    info!("cardwright gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down: stopping running agents and the scheduler");
    let _ = shutdown_tx.send(true);
    orchestrator.shutdown_all().await;
    let _ = scheduler_task.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
