// =============================================================================
// Aurora Kernel — Main Entry Point
// =============================================================================
//
// Wires together the clock, adapter, engine loop, and dashboard, then runs
// until either an operator Ctrl+C or the configured max runtime elapses.
// =============================================================================

mod adapter;
mod api;
mod app_state;
mod clock;
mod config;
mod datahub;
mod engine;
mod events;
mod gates;
mod queues;
mod snapshot;
mod trigger_card;
mod trigger_card_validator;
mod types;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use adapter::ibkr::IbkrAdapter;
use adapter::mock::MockAdapter;
use adapter::{AdapterError, MarketAdapter};
use app_state::AppState;
use clock::{Session, SharedClock, SystemClock};
use config::{FeedType, ProcessConfig};
use datahub::DataHub;
use engine::{EngineConfig, EngineLoop};
use queues::{CommandQueue, InboundQueue};
use trigger_card::TriggerCardLogger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("aurora-kernel starting");

    let args: Vec<String> = std::env::args().collect();
    let ProcessConfig { max_runtime_s } = config::get_process_config(&args);
    let run_id = uuid::Uuid::new_v4().to_string();

    let clock: SharedClock = Arc::new(SystemClock::new());
    let session = Session::default();

    let inbound = Arc::new(InboundQueue::new(1000));
    let commands = Arc::new(CommandQueue::new(100));
    let datahub = Arc::new(DataHub::new());

    let logger_config = config::get_trigger_card_logger_config();
    let logger = if logger_config.enabled {
        Some(Arc::new(TriggerCardLogger::new(
            run_id.clone(),
            logger_config.log_dir.clone(),
            logger_config.cadence_hz,
            clock.clone(),
        )))
    } else {
        None
    };

    let feed_type = config::get_feed_type();
    info!(feed_type = ?feed_type, run_id = %run_id, "feed selected");

    let running = Arc::new(AtomicBool::new(true));

    let (instrument_symbol, instrument_tick_size, contract) = match feed_type {
        FeedType::Ibkr => {
            let contract = config::get_ibkr_contract_config()?;
            let symbol = contract.symbol.clone();
            (symbol, 0.25, Some(contract))
        }
        FeedType::Mock => ("MNQ".to_string(), 0.25, None),
    };

    let engine = Arc::new(EngineLoop::new(
        EngineConfig::default(),
        instrument_symbol,
        instrument_tick_size,
        contract.clone(),
        clock.clone(),
        session,
        inbound.clone(),
        commands.clone(),
        datahub.clone(),
        logger,
        run_id.clone(),
    ));

    let adapter_running = running.clone();
    let adapter_task: tokio::task::JoinHandle<()> = match feed_type {
        FeedType::Mock => {
            let mock = Arc::new(MockAdapter::new(clock.clone(), inbound.clone()));
            mock.connect().await?;
            tokio::spawn(async move {
                mock.run_quote_loop(adapter_running).await;
            })
        }
        FeedType::Ibkr => {
            let connection = config::get_ibkr_connection_config();
            let contract = contract.expect("validated above");
            let ibkr = Arc::new(IbkrAdapter::new(
                connection,
                contract,
                clock.clone(),
                inbound.clone(),
            ));
            match ibkr.connect().await {
                Ok(()) => {
                    if let Err(e) = ibkr.qualify_contract().await {
                        warn!(error = %e, "contract qualification failed");
                    } else if let Err(e) = ibkr.subscribe_market_data().await {
                        warn!(error = %e, "market data subscription failed");
                    }
                }
                Err(e) => error!(error = %e, "IBKR adapter failed to connect"),
            }
            tokio::spawn(async move {
                while adapter_running.load(Ordering::Relaxed) {
                    match ibkr.run_event_loop_iteration().await {
                        Ok(()) => {}
                        Err(AdapterError::IdentityCollision(code)) => {
                            error!(code, "fatal client identity collision — exiting");
                            std::process::exit(1);
                        }
                        Err(e) => warn!(error = %e, "adapter event loop error"),
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
            })
        }
    };

    let engine_task = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run().await })
    };

    let app_state = Arc::new(AppState::new(
        datahub.clone(),
        commands.clone(),
        clock.clone(),
        run_id.clone(),
    ));
    let bind_addr = std::env::var("AURORA_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());
    let api_task = {
        let bind_addr = bind_addr.clone();
        tokio::spawn(async move {
            let app = api::rest::router(app_state);
            let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!(error = %e, addr = %bind_addr, "failed to bind API server");
                    return;
                }
            };
            info!(addr = %bind_addr, "dashboard API listening");
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "API server failed");
            }
        })
    };

    info!(max_runtime_s, "kernel running; Ctrl+C to stop early");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            warn!("shutdown signal received");
        }
        _ = tokio::time::sleep(std::time::Duration::from_secs_f64(max_runtime_s)) => {
            info!("max runtime elapsed");
        }
    }

    running.store(false, Ordering::Relaxed);
    engine.stop();
    api_task.abort();

    let shutdown_timeout = std::time::Duration::from_secs(5);
    if tokio::time::timeout(shutdown_timeout, engine_task).await.is_err() {
        warn!("engine task did not shut down within timeout");
    }
    if tokio::time::timeout(shutdown_timeout, adapter_task).await.is_err() {
        warn!("adapter task did not shut down within timeout");
    }

    info!("aurora-kernel shut down complete");
    Ok(())
}
