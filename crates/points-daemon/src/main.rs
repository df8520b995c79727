//! Points control daemon.
//!
//! Wires the servo hardware, the persisted point collection and the
//! control API together, then serves until `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `points-config.yaml` plus environment
//! 2. Initialize structured logging (tracing)
//! 3. Read the shared secret
//! 4. Select the hardware driver
//! 5. Open the store and load the collection (a corrupt database aborts)
//! 6. Serve the control API

mod config;
mod error;

use std::path::Path;
use std::sync::Arc;

use points_core::{Hardware, MockPwm, ServoPulse};
use points_server::{AppState, ServerConfig};
use points_store::PointStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{ConfigError, HardwareConfig, LoggingConfig, MOCK_DRIVER, PointsConfig};
use crate::error::DaemonError;

/// Application entry point for the points daemon.
///
/// # Errors
///
/// Returns an error if any startup step fails or the server stops with
/// a fatal error.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    run().await?;
    Ok(())
}

async fn run() -> Result<(), DaemonError> {
    // 1. Load configuration.
    let config = PointsConfig::load(|key| std::env::var(key).ok())?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!(
        host = config.server.host,
        port = config.server.port,
        database = %config.storage.database.display(),
        backup_dir = %config.storage.backup_dir.display(),
        "points-daemon starting"
    );

    // 3. Read the shared secret.
    let secret = read_secret(&config.storage.secret_file)?;

    // 4. Select hardware.
    let hardware = select_hardware(&config.hardware)?;

    // 5. Open the store and load state.
    let store = PointStore::open(&config.storage.database, &config.storage.backup_dir)?;
    let points = store.load(hardware)?;
    if points.is_empty() {
        warn!("collection is empty; add points with POST /points/add");
    }
    info!(
        points = points.len(),
        free_channels = points.free_channels().len(),
        "collection loaded"
    );

    // 6. Serve.
    let state = Arc::new(AppState::new(points, store, secret));
    let server = ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    };
    points_server::start_server(&server, state).await?;

    info!("points-daemon shutdown complete");
    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Read the shared secret: the first line of `path`, trimmed.
fn read_secret(path: &Path) -> Result<String, DaemonError> {
    let contents = std::fs::read_to_string(path).map_err(|source| DaemonError::Secret {
        path: path.to_path_buf(),
        source,
    })?;
    let secret = contents.lines().next().unwrap_or_default().trim();
    if secret.is_empty() {
        return Err(DaemonError::EmptySecret(path.to_path_buf()));
    }
    Ok(secret.to_owned())
}

/// Build the hardware handle for the configured driver.
fn select_hardware(config: &HardwareConfig) -> Result<Hardware, ConfigError> {
    match config.driver.as_str() {
        MOCK_DRIVER => {
            info!(
                driver = MOCK_DRIVER,
                i2c_address = config.i2c_address,
                pwm_frequency_hz = config.pwm_frequency_hz,
                "hardware selected; pulses are logged, not sent"
            );
            Ok(Hardware::with_pwm(Arc::new(MockPwm::new()) as Arc<dyn ServoPulse>))
        }
        other => Err(ConfigError::UnsupportedDriver(other.to_owned())),
    }
}
