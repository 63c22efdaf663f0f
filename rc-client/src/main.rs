//! Race Control Client
//!
//! Connects to a running simulator, logs the session and reports contacts
//! until interrupted.

use anyhow::{bail, Context, Result};
use chrono::Local;
use rc_client::{AppState, ClientConfig, ContactDetector};
use rc_core::{listener_fn, Event, Publisher};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// `--config <path>`, `-c <path>` or a bare path
fn config_path_from_args() -> Result<Option<PathBuf>> {
    let mut args = std::env::args().skip(1);
    let mut path = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let value = args.next().context("--config requires a path")?;
                path = Some(PathBuf::from(value));
            }
            other if other.starts_with('-') => bail!("Unknown argument: {}", other),
            other => path = Some(PathBuf::from(other)),
        }
    }
    Ok(path)
}

fn log_event(event: &Event, _publisher: &mut Publisher) {
    match event {
        Event::ConnectionOpened {
            connection_id,
            read_only,
            ..
        } => info!(connection_id, read_only, "Connection opened"),
        Event::ConnectionFailed { reason } => warn!("Connection failed: {}", reason),
        Event::ConnectionClosed => info!("Connection closed"),
        Event::SessionChanged { session_id, .. } => info!(session = %session_id, "New session"),
        Event::CarConnected(car) => {
            let driver = car
                .driver()
                .map(|driver| format!("{} {}", driver.first_name, driver.last_name))
                .unwrap_or_default();
            info!(car = %car.car_number_string(), team = %car.team_name, %driver, "Car connected");
        }
        Event::Contact(contact) => {
            let cars: Vec<String> = contact.cars().iter().map(|car| car.car_number_string()).collect();
            info!(
                at = %contact.system_timestamp().with_timezone(&Local).format("%H:%M:%S"),
                cars = %cars.join(" "),
                "Contact reported"
            );
        }
        _ => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config_path_from_args()?;
    let config = ClientConfig::load_or_default(config_path.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.log_level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Race Control client");

    let state = AppState::new(config);
    state.bus.register(state.replay_offset.clone());
    state.bus.register(ContactDetector::from_state(&state));
    state.bus.register(listener_fn(log_event));

    state
        .client
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", state.config.address()))?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Shutting down");
            state.client.shutdown().await;
        }
        _ = state.client.wait_closed() => {
            warn!("Connection lost");
        }
    }

    Ok(())
}
