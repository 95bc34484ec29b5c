use clap::Parser;
use log::info;
use server::network::Server;
use shared::{CLIENT_TIMEOUT_SECS, DEFAULT_PORT, SNAPSHOT_INTERVAL_MS};
use std::time::Duration;

/// Authoritative state relay for the multiplayer platformer shooter
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// UDP port to listen on
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Snapshot broadcast interval in milliseconds
    #[clap(short, long, default_value_t = SNAPSHOT_INTERVAL_MS)]
    snapshot_interval: u64,

    /// Maximum number of concurrent sessions
    #[clap(short, long, default_value = "32")]
    max_sessions: usize,

    /// Seconds of silence before a session is considered gone
    #[clap(short, long, default_value_t = CLIENT_TIMEOUT_SECS)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    info!(
        "Starting relay on {} ({}ms snapshot tick, {} max sessions)",
        addr, args.snapshot_interval, args.max_sessions
    );

    let mut server = Server::new(
        &addr,
        Duration::from_millis(args.snapshot_interval),
        args.max_sessions,
        Duration::from_secs(args.timeout),
    )
    .await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    }
}
