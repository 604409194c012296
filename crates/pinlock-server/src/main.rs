//! Pinlock server binary.
//!
//! # Usage
//!
//! ```bash
//! # Generate a key once: 32 random bytes, hex-encoded
//! head -c 32 /dev/urandom | xxd -p -c 64 > pinlock.key
//!
//! pinlock-server --bind 127.0.0.1:8096 --key pinlock.key
//! ```

use std::time::Duration;

use clap::Parser;
use pinlock_server::{Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Pinlock PIN-unlock server
#[derive(Parser, Debug)]
#[command(name = "pinlock-server")]
#[command(about = "PIN-unlock server with ECDH handshake sessions")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "127.0.0.1:8096")]
    bind: String,

    /// Path to the static signing key (32-byte hex seed)
    #[arg(short, long)]
    key: std::path::PathBuf,

    /// Handshake session lifetime in seconds
    #[arg(long, default_value_t = pinlock_core::DEFAULT_SESSION_LIFETIME_SECS)]
    session_lifetime: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("pinlock server starting");
    tracing::info!("session lifetime: {}s", args.session_lifetime);

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        key_path: args.key,
        session_lifetime: Duration::from_secs(args.session_lifetime),
    };

    // A missing or invalid static key refuses startup here, before any
    // request can be served.
    let server = Server::bind(config).await?;

    server.run().await?;

    Ok(())
}
