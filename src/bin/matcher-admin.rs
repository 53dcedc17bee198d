use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use waypoint_match::auth::{seal_handshake, unix_now};
use waypoint_match::config::AuthConfig;
use waypoint_match::protocol::admin::{read_snapshot, AdminRequest};

#[derive(Parser)]
#[command(name = "matcher-admin")]
#[command(about = "Telemetry CLI for the waypoint-match server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "127.0.0.1:7003")]
    address: String,

    /// AES-128 key as 32 hex characters. Defaults to the built-in admin key.
    #[arg(short, long)]
    key: Option<String>,

    /// Handshake code. Defaults to the built-in admin code.
    #[arg(long)]
    code: Option<u64>,

    /// Handshake protocol version.
    #[arg(long)]
    protocol_version: Option<u8>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print one counters snapshot
    Snapshot,
    /// Print a snapshot every interval until interrupted
    Watch {
        #[arg(short, long, default_value_t = 5)]
        interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let defaults = AuthConfig::default().admin;

    let key: [u8; 16] = hex::decode(cli.key.as_deref().unwrap_or(&defaults.key))?
        .try_into()
        .map_err(|_| "admin key must be 16 bytes")?;
    let handshake = seal_handshake(
        cli.protocol_version.unwrap_or(defaults.protocol_version),
        key,
        cli.code.unwrap_or(defaults.code),
        unix_now(),
    );

    let mut stream = TcpStream::connect(&cli.address).await?;
    stream.write_all(&handshake).await?;

    match cli.command {
        Commands::Snapshot => print_snapshot(&mut stream).await?,
        Commands::Watch { interval_secs } => {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
            loop {
                ticker.tick().await;
                print_snapshot(&mut stream).await?;
            }
        }
    }

    Ok(())
}

async fn print_snapshot(stream: &mut TcpStream) -> Result<(), Box<dyn std::error::Error>> {
    stream.write_all(&AdminRequest::Snapshot.encode()).await?;
    let snapshot = read_snapshot(stream).await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
