//! Signal agent binary entry point
//!
//! Connects the device to its signaling server, announces the device
//! identity, and keeps the channel alive until interrupted.
//!
//! # Usage
//!
//! ```bash
//! # Connect to the default signaling server
//! cargo run -p signal-agent
//!
//! # Custom server and identity
//! cargo run -p signal-agent -- \
//!   --addr localhost:8080 \
//!   --serial 123456789 \
//!   --mac 00:1A:2B:3C:4D:5E
//!
//! # Reconnect automatically when the server drops the session
//! cargo run -p signal-agent -- --on-drop reconnect --backoff exponential --jitter
//! ```
//!
//! # Exit status
//!
//! - `0`: stopped by SIGINT/SIGTERM
//! - `1`: connection dropped by the server or network (`--on-drop exit`)
//! - `2`: invalid configuration

use clap::Parser;
use signal_client::{
    BackoffStrategy, ClientConfig, ClientOutcome, DeviceIdentity, DropPolicy, ReconnectConfig,
    ShutdownReason, ShutdownSignal, SignalClient,
};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Signal Agent
///
/// Keeps a WebSocket signaling channel alive for this device.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket service address for signaling (host:port)
    #[arg(long, default_value = signal_client::config::DEFAULT_ADDRESS, env = "SIGNAL_ADDR")]
    addr: String,

    /// URL scheme
    #[arg(long, default_value = "ws", env = "SIGNAL_SCHEME")]
    scheme: String,

    /// Request path on the signaling server
    #[arg(long, default_value = signal_client::config::DEFAULT_PATH, env = "SIGNAL_PATH")]
    path: String,

    /// Device serial number announced on connect
    #[arg(long, default_value = "123456789", env = "DEVICE_SERIAL")]
    serial: String,

    /// Device hardware address announced on connect
    #[arg(long, default_value = "00:1A:2B:3C:4D:5E", env = "DEVICE_MAC")]
    mac: String,

    /// Heartbeat period in milliseconds
    #[arg(long, default_value_t = 5000)]
    heartbeat_ms: u64,

    /// Dial + handshake timeout in milliseconds
    #[arg(long, default_value_t = 45_000)]
    handshake_timeout_ms: u64,

    /// How long to wait for the server to acknowledge a close, in milliseconds
    #[arg(long, default_value_t = 1000)]
    close_timeout_ms: u64,

    /// Delay strategy between failed dials
    #[arg(long, value_enum, default_value = "fixed")]
    backoff: Backoff,

    /// Delay before retrying a failed dial, in milliseconds
    #[arg(long, default_value_t = 5000)]
    retry_delay_ms: u64,

    /// Upper bound for exponential backoff, in milliseconds
    #[arg(long, default_value_t = 60_000)]
    max_retry_delay_ms: u64,

    /// Randomize retry delays by ±25%
    #[arg(long, default_value_t = false)]
    jitter: bool,

    /// What to do when the server or network drops an established session
    #[arg(long, value_enum, default_value = "exit", env = "SIGNAL_ON_DROP")]
    on_drop: OnDrop,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", env = "SIGNAL_LOG_FORMAT")]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum Backoff {
    /// Same delay before every retry
    Fixed,
    /// Doubling delay, capped by --max-retry-delay-ms
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OnDrop {
    /// Exit with status 1
    Exit,
    /// Dial again
    Reconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum LogFormat {
    /// Human readable
    Text,
    /// One JSON object per line
    Json,
}

impl Args {
    fn to_config(&self) -> ClientConfig {
        ClientConfig {
            address: self.addr.clone(),
            scheme: self.scheme.clone(),
            path: self.path.clone(),
            identity: DeviceIdentity::new(self.serial.clone(), self.mac.clone()),
            heartbeat_interval_ms: self.heartbeat_ms,
            handshake_timeout_ms: self.handshake_timeout_ms,
            close_timeout_ms: self.close_timeout_ms,
            reconnect: ReconnectConfig {
                strategy: match self.backoff {
                    Backoff::Fixed => BackoffStrategy::Fixed,
                    Backoff::Exponential => BackoffStrategy::Exponential,
                },
                base_delay_ms: self.retry_delay_ms,
                max_delay_ms: self.max_retry_delay_ms,
                jitter: self.jitter,
            },
            on_drop: match self.on_drop {
                OnDrop::Exit => DropPolicy::Exit,
                OnDrop::Reconnect => DropPolicy::Reconnect,
            },
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_format);

    // Set up SIGINT/SIGTERM handler before anything can block
    let shutdown = ShutdownSignal::new();
    let shutdown_handler = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if !shutdown_handler.trigger(ShutdownReason::Interrupt) {
            eprintln!("Shutdown already in progress, forcing immediate exit");
            std::process::exit(130);
        }
    }) {
        error!(error = %e, "Failed to install signal handler");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get().min(4))
        .thread_name("signal-worker")
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(async_main(args, shutdown)) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Signal agent failed");
            ExitCode::FAILURE
        }
    }
}

async fn async_main(args: Args, shutdown: ShutdownSignal) -> anyhow::Result<ExitCode> {
    info!(version = signal_client::version(), "Starting Version: {}", signal_client::version());

    let config = args.to_config();
    let client = match SignalClient::websocket(config) {
        Ok(client) => client,
        Err(e) if e.is_config_error() => {
            error!(error = %e, "Invalid configuration");
            return Ok(ExitCode::from(2));
        }
        Err(e) => return Err(e.into()),
    };

    let config = client.config();
    let endpoint = config.endpoint()?;
    info!(
        endpoint = %endpoint,
        serial = %config.identity.serial,
        mac = %config.identity.mac,
        heartbeat_ms = config.heartbeat_interval_ms,
        retry_delay_ms = config.reconnect.base_delay_ms,
        on_drop = ?config.on_drop,
        "Configuration loaded"
    );

    let outcome = client.run(shutdown.listener()).await?;

    let code = match &outcome {
        ClientOutcome::Interrupted { acknowledged: true } => {
            info!("Connection closed gracefully");
            ExitCode::SUCCESS
        }
        ClientOutcome::Interrupted { acknowledged: false } => {
            warn!("Server did not acknowledge close, exiting anyway");
            ExitCode::SUCCESS
        }
        ClientOutcome::InterruptedBeforeConnect => {
            info!("Interrupted before a connection was established");
            ExitCode::SUCCESS
        }
        ClientOutcome::CloseFailed(cause) => {
            error!(cause = %cause, "Could not send close frame, exiting");
            ExitCode::SUCCESS
        }
        ClientOutcome::ConnectionLost(cause) => {
            error!(cause = %cause, "Connection lost");
            ExitCode::FAILURE
        }
    };

    Ok(code)
}

fn init_tracing(format: LogFormat) {
    // RUST_LOG wins; default to info
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}
