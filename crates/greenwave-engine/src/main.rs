//! Control-plane binary for the Greenwave traffic signal controller.
//!
//! This is the main entry point that wires together the simulation
//! session, the detection feed, the control loop, and the Observer API.
//! It loads configuration, initializes all subsystems, and runs the
//! control loop until a shutdown is requested.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `greenwave-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Create the TCP simulation link and session manager
//! 4. Create the shared control state
//! 5. Create the detection feed and spawn the poll loop
//! 6. Start the Observer API server
//! 7. Install the Ctrl-C shutdown handler
//! 8. Run the control loop
//! 9. Tear down and log the result
//!
//! The session is NOT opened automatically: lifecycle entry points are
//! explicit, so the operator connects and starts stepping through the
//! control API (or an orchestrator does).

mod callback;
mod detection_http;
mod error;
mod sim_link;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use greenwave_core::config::ControlConfig;
use greenwave_core::control::ControlState;
use greenwave_core::metrics::ReferenceEstimator;
use greenwave_core::scheduler;
use greenwave_core::session::SessionManager;
use greenwave_detect::{spawn_detection_loop, DetectionFeed, FeedOptions};
use greenwave_observer::state::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::callback::ObserverCallback;
use crate::detection_http::HttpDetectionSource;
use crate::error::EngineError;
use crate::sim_link::TcpSimulationLink;

/// Application entry point for the control plane.
///
/// Initializes all subsystems and runs the control loop.
///
/// # Errors
///
/// Returns an error if any initialization step fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .with_target(true)
        .init();

    info!("greenwave-engine starting");
    info!(
        sim_host = config.simulation.host,
        sim_port = config.simulation.port,
        scenario = config.simulation.scenario,
        step_interval_ms = config.simulation.step_interval_ms,
        switch_margin = config.policy.switch_margin,
        "Configuration loaded"
    );

    // 3. Create the simulation link and session manager.
    let link = TcpSimulationLink::new(
        Duration::from_millis(config.simulation.connect_timeout_ms),
        Duration::from_millis(config.simulation.command_timeout_ms),
    );
    let mut session = SessionManager::new(Box::new(link), config.simulation.clone());
    info!("Session manager initialized (disconnected)");

    // 4. Create the shared control state.
    let control = Arc::new(ControlState::new(config.simulation.step_interval_ms));

    // 5. Create the detection feed and spawn the poll loop.
    let feed = DetectionFeed::new(FeedOptions {
        confidence_threshold: config.detection.confidence_threshold,
        staleness_ms: config.detection.staleness_ms,
        pedestrian_threshold: config.policy.pedestrian_threshold,
    });
    let detection_task = if config.detection.endpoint.is_empty() {
        info!("Detection endpoint not configured, feed stays empty (simulation-only decisions)");
        None
    } else {
        let source = HttpDetectionSource::new(
            config.detection.endpoint.clone(),
            Duration::from_millis(config.detection.poll_interval_ms),
        );
        let task = spawn_detection_loop(
            Box::new(source),
            feed.clone(),
            Duration::from_millis(config.detection.poll_interval_ms),
        );
        info!(
            endpoint = config.detection.endpoint,
            poll_interval_ms = config.detection.poll_interval_ms,
            "Detection poll loop started"
        );
        Some(task)
    };

    // 6. Start the Observer API server.
    let app_state = Arc::new(AppState::with_control(Arc::clone(&control)));
    let observer_handle =
        greenwave_observer::spawn_observer(config.infrastructure.observer_port, Arc::clone(&app_state))
            .await
            .map_err(|e| EngineError::Observer {
                message: format!("{e}"),
            })?;
    info!(
        port = config.infrastructure.observer_port,
        "Observer API server started"
    );

    // 7. Install the Ctrl-C shutdown handler.
    {
        let shutdown_control = Arc::clone(&control);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, requesting shutdown");
                shutdown_control.request_shutdown();
            }
        });
    }

    info!("Awaiting operator connect (POST /api/control/connect)");

    // 8. Run the control loop.
    let estimator = ReferenceEstimator::from_policy(&config.policy);
    let mut callback = ObserverCallback::new(app_state);
    let result = scheduler::run_control_loop(
        &mut session,
        &control,
        &feed,
        &estimator,
        &config.policy,
        &mut callback,
        config.simulation.max_steps,
    )
    .await;

    // 9. Tear down.
    session.disconnect();
    if let Some(task) = detection_task {
        task.shutdown().await;
    }
    observer_handle.abort();

    info!(
        end_reason = ?result.end_reason,
        total_steps = result.total_steps,
        final_step = result.last_summary.as_ref().map(|s| s.step),
        "greenwave-engine shutdown complete"
    );

    Ok(())
}

/// Load the control-plane configuration from `greenwave-config.yaml`.
///
/// Looks for the config file relative to the current working directory;
/// defaults are used when it does not exist.
fn load_config() -> Result<ControlConfig, EngineError> {
    let config_path = Path::new("greenwave-config.yaml");
    if config_path.exists() {
        let config = ControlConfig::from_file(config_path)?;
        Ok(config)
    } else {
        Ok(ControlConfig::default())
    }
}
