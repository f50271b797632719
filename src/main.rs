mod actuator;
mod capture;
mod config;
mod session;
mod stream;
mod web;

use actuator::Actuator;
use anyhow::{anyhow, Context, Result};
use capture::{run_capture, ProcessSource};
use clap::Parser;
use config::{Cli, RobotConfig};
use session::RobotSessionController;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use stream::FrameBroadcastHub;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt as tracing_fmt, prelude::*, EnvFilter};

/// Exit code for an unreadable or invalid configuration
const EXIT_CONFIG: i32 = 4;

/// Exit code when the robot stops because a service failed
const EXIT_RUNTIME: i32 = 5;

/// How long servers get to finish after the shutdown signal
const SERVER_DRAIN_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    let config = match RobotConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };

    // Nothing else starts unless the motor controller comes up
    let actuator = match actuator::connect(&config.actuator) {
        Ok(actuator) => actuator,
        Err(e) => {
            error!("{}", e);
            std::process::exit(e.exit_code());
        }
    };
    info!("Motor controller ready: {}", actuator.name());

    if let Err(e) = run(config, actuator, !cli.no_gesture).await {
        error!("Robot stopped: {:#}", e);
        std::process::exit(EXIT_RUNTIME);
    }
    info!("Robot stopped");
}

/// Why the robot is shutting down
enum ShutdownCause {
    Signal,
    ClientRequest,
    ServiceFailed(anyhow::Error),
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal => write!(f, "termination signal"),
            Self::ClientRequest => write!(f, "client request"),
            Self::ServiceFailed(e) => write!(f, "service failure: {:#}", e),
        }
    }
}

async fn run(config: RobotConfig, actuator: Arc<dyn Actuator>, gesture: bool) -> Result<()> {
    let hub = Arc::new(FrameBroadcastHub::new());
    let session = Arc::new(RobotSessionController::new(
        actuator.clone(),
        config.drive.clone(),
        config.head.clone(),
    ));

    // Servers stop when this turns true
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    // Set by the web route when the client sends Escape
    let (request_tx, mut request_rx) = watch::channel(false);
    let request_tx = Arc::new(request_tx);

    let web_listener = TcpListener::bind(&config.web.bind)
        .await
        .with_context(|| format!("Failed to bind command server to {}", config.web.bind))?;
    let stream_listener = TcpListener::bind(&config.stream.bind)
        .await
        .with_context(|| format!("Failed to bind stream server to {}", config.stream.bind))?;
    let source = ProcessSource::spawn(&config.capture)?;

    if gesture {
        session.shake().await;
    } else {
        session.center_head().await;
    }

    let mut capture_task: JoinHandle<Result<()>> = {
        let hub = hub.clone();
        let capture_config = config.capture.clone();
        tokio::spawn(async move { run_capture(source, &hub, &capture_config).await })
    };

    let mut stream_task = tokio::spawn(stream::serve(
        stream_listener,
        hub.clone(),
        Arc::new(config.stream.clone()),
        shutdown_rx.clone(),
    ));

    let mut web_task = {
        let session = session.clone();
        let web_config = config.web.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            web::serve(web_listener, session, request_tx, &web_config, shutdown_rx).await
        })
    };

    info!("Robot running");

    let cause = tokio::select! {
        _ = shutdown_signal() => {
            // Halt before anything else so a runaway robot stops immediately
            session.emergency_stop().await;
            ShutdownCause::Signal
        }
        Ok(_) = request_rx.wait_for(|requested| *requested) => ShutdownCause::ClientRequest,
        result = &mut capture_task => ShutdownCause::ServiceFailed(task_failure("capture", result)),
        result = &mut stream_task => ShutdownCause::ServiceFailed(task_failure("stream server", result)),
        result = &mut web_task => ShutdownCause::ServiceFailed(task_failure("command server", result)),
    };

    info!("Shutting down: {}", cause);

    info!("Stopping motors");
    session.emergency_stop().await;

    info!("Centering head");
    if gesture {
        session.shake().await;
    } else {
        session.center_head().await;
    }

    info!("Stopping video");
    hub.close();
    capture_task.abort();

    info!("Stopping servers");
    shutdown_tx.send_replace(true);
    // A server that already ended was consumed by the select above
    let mut servers: Vec<_> = [stream_task, web_task]
        .into_iter()
        .filter(|task| !task.is_finished())
        .collect();
    let drained = tokio::time::timeout(
        SERVER_DRAIN_TIMEOUT,
        futures::future::join_all(servers.iter_mut()),
    )
    .await;
    if drained.is_err() {
        warn!("Servers did not stop in time; aborting");
        for task in &servers {
            task.abort();
        }
    }

    if let Err(e) = actuator.stop().await {
        warn!("Final stop failed: {}", e);
    }
    if let Err(e) = actuator.disable_head_actuators().await {
        warn!("Powering down head failed: {}", e);
    }

    match cause {
        ShutdownCause::ServiceFailed(e) => Err(e),
        _ => Ok(()),
    }
}

/// Turn a finished service task into the error that ended it
fn task_failure(
    name: &str,
    result: std::result::Result<Result<()>, tokio::task::JoinError>,
) -> anyhow::Error {
    match result {
        Ok(Ok(())) => anyhow!("{} exited", name),
        Ok(Err(e)) => e.context(format!("{} failed", name)),
        Err(e) => anyhow!("{} task panicked: {}", name, e),
    }
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Ctrl+C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
