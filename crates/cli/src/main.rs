mod config_commands;
mod run_commands;
mod send_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "relay", about = "Relay: auto-reply for Twilio and WhatsApp Web")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (default: ./relay.toml, then ~/.config/relay/relay.toml).
    #[arg(long, global = true, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll Twilio for inbound messages and auto-reply.
    Poll {
        /// Seconds between fetches (overrides poll.interval_seconds).
        #[arg(long)]
        interval: Option<u64>,
        /// Minutes of history to look at on start (overrides poll.lookback_minutes).
        #[arg(long)]
        lookback: Option<u64>,
    },
    /// Receive WhatsApp Web messages through the sidecar and auto-reply.
    Web {
        /// Sidecar WebSocket URL (overrides web.sidecar_url).
        #[arg(long, env = "RELAY_SIDECAR_URL")]
        sidecar_url: Option<String>,
    },
    /// Expose a Twilio webhook, register it, and auto-reply until Ctrl-C.
    Webhook {
        /// Local port (overrides webhook.port).
        #[arg(long)]
        port: Option<u16>,
        /// Public base URL; skips the tunnel (overrides webhook.public_url).
        #[arg(long, env = "RELAY_PUBLIC_URL")]
        public_url: Option<String>,
    },
    /// Send a single message.
    Send(send_commands::SendArgs),
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "relay starting");

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Poll { interval, lookback } => {
            run_commands::poll(config_path, interval, lookback).await
        },
        Commands::Web { sidecar_url } => run_commands::web(config_path, sidecar_url).await,
        Commands::Webhook { port, public_url } => {
            run_commands::webhook(config_path, port, public_url).await
        },
        Commands::Send(args) => send_commands::handle_send(config_path, args).await,
        Commands::Config { action } => config_commands::handle_config(config_path, action),
    }
}
