//! CLI entrypoint for the socket DUT server.

use std::path::PathBuf;

use clap::Parser;
use sockdut_server::structured_log::{LogEntry, LogLevel};
use sockdut_server::{PosixServer, ServerConfig};

/// Replays socket calls from a remote test driver on this machine.
#[derive(Debug, Parser)]
#[command(name = "posix-server")]
#[command(about = "Remote socket-control endpoint for protocol conformance tests")]
struct Cli {
    /// IP address to listen on for driver connections.
    #[arg(long, default_value = "0.0.0.0")]
    ip: String,
    /// TCP port to listen on for driver connections.
    #[arg(long)]
    port: u16,
    /// Structured JSONL log path (stderr when omitted).
    #[arg(long)]
    log: Option<PathBuf>,
    /// Minimum log level: trace, debug, info, warn or error.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = ServerConfig::new(&cli.ip, cli.port, cli.log, &cli.log_level)?;
    let run_id = format!("posix-server-{}", std::process::id());
    let log = config.open_log(&run_id)?;

    log.log(
        LogEntry::new(LogLevel::Info, "server_starting")
            .with_details(serde_json::json!({ "ip": cli.ip, "port": cli.port })),
    );
    let server = PosixServer::bind(&config, log.clone())?;
    server.serve()?;
    log.event(LogLevel::Info, "server_finished");
    Ok(())
}
