//! Kazusa - STOMP Message Broker
//!
//! This is the main entry point for the Kazusa server.
//! It sets up logging, starts the broker core and accepts connections
//! until Ctrl+C is pressed.

use kazusa::broker::{Broker, BrokerConfig};
use kazusa::connection::{handle_connection, ConnectionStats};
use kazusa::protocol::ConnectionId;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// Broker core settings
    broker: BrokerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: kazusa::DEFAULT_HOST.to_string(),
            port: kazusa::DEFAULT_PORT,
            broker: BrokerConfig::default(),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    if i + 1 < args.len() {
                        config.host = args[i + 1].clone();
                        i += 2;
                    } else {
                        eprintln!("Error: --host requires a value");
                        std::process::exit(1);
                    }
                }
                "--port" | "-p" => {
                    if i + 1 < args.len() {
                        config.port = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid port number");
                            std::process::exit(1);
                        });
                        i += 2;
                    } else {
                        eprintln!("Error: --port requires a value");
                        std::process::exit(1);
                    }
                }
                "--idle-ms" | "-i" => {
                    if i + 1 < args.len() {
                        let ms: u64 = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid idle interval");
                            std::process::exit(1);
                        });
                        config.broker.manager.idle_interval = Duration::from_millis(ms);
                        i += 2;
                    } else {
                        eprintln!("Error: --idle-ms requires a value");
                        std::process::exit(1);
                    }
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("Kazusa version {}", kazusa::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn print_help() {
    println!(
        r#"
Kazusa - STOMP Message Broker

USAGE:
    kazusa [OPTIONS]

OPTIONS:
    -h, --host <HOST>     Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>     Port to listen on (default: 61613)
    -i, --idle-ms <MS>    Frame manager idle poll interval (default: 1000)
    -v, --version         Print version information
        --help            Print this help message

LOGGING:
    Set RUST_LOG to change verbosity, e.g. RUST_LOG=kazusa=debug

CONNECTING:
    Any STOMP client works; by hand (^@ is Ctrl+@):
    $ telnet 127.0.0.1 61613
    CONNECT
    accept-version:1.2
    host:localhost

    ^@
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Kazusa v{} starting", kazusa::VERSION);

    // Start the broker core (frame bucket + manager)
    let broker = Broker::init(config.broker.clone())?;

    // Create connection statistics
    let stats = Arc::new(ConnectionStats::new());

    // Bind the TCP listener
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", config.bind_address());

    // Set up graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    // Main accept loop
    tokio::select! {
        _ = accept_loop(listener, &broker, Arc::clone(&stats)) => {}
        _ = shutdown => {}
    }

    let freed = broker.shutdown();
    info!(
        frames_freed = freed,
        frames_dispatched = broker.manager_stats().processed(),
        "Server shutdown complete"
    );
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(listener: TcpListener, broker: &Broker, stats: Arc<ConnectionStats>) {
    let mut next_id = 0u64;

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                next_id += 1;
                let assembler = broker.assembler();
                let stats = Arc::clone(&stats);

                // Spawn a task to handle this connection
                tokio::spawn(async move {
                    handle_connection(stream, addr, ConnectionId::new(next_id), assembler, stats)
                        .await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
