use std::error::Error;
use std::net::SocketAddr;
use std::time::Duration;

use chrono::Utc;
use clap::{App, Arg};
use groundstation::config::{self, DEFAULT_INGEST_PORT};
use groundstation::{simulator, PacketGenerator};
use tokio::net::UdpSocket;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_INTERVAL_MS: &str = "1000";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let default_target = format!("127.0.0.1:{}", DEFAULT_INGEST_PORT);
    let matches = App::new("packet-generator")
        .version(env!("CARGO_PKG_VERSION"))
        .about("🛰️  Sends simulated telemetry frames to a ground station")
        .arg(
            Arg::with_name("target")
                .short("t")
                .long("target")
                .value_name("ADDR")
                .help("UDP address of the ingest service")
                .takes_value(true)
                .default_value(&default_target),
        )
        .arg(
            Arg::with_name("interval-ms")
                .short("i")
                .long("interval-ms")
                .value_name("MS")
                .help("Delay between packets in milliseconds")
                .takes_value(true)
                .default_value(DEFAULT_INTERVAL_MS),
        )
        .arg(
            Arg::with_name("count")
                .short("n")
                .long("count")
                .value_name("N")
                .help("Stop after N packets (default: run until interrupted)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .value_name("SEED")
                .help("Seed for reproducible packet contents")
                .takes_value(true),
        )
        .get_matches();

    let target: SocketAddr = config::parse_value("--target", matches.value_of("target").unwrap_or_default())?;
    let interval_ms: u64 = config::parse_value(
        "--interval-ms",
        matches.value_of("interval-ms").unwrap_or(DEFAULT_INTERVAL_MS),
    )?;
    let count: Option<u64> = matches
        .value_of("count")
        .map(|n| config::parse_value("--count", n))
        .transpose()?;
    let seed: Option<u64> = matches
        .value_of("seed")
        .map(|s| config::parse_value("--seed", s))
        .transpose()?;

    let mut generator = match seed {
        Some(seed) => PacketGenerator::seeded(seed),
        None => PacketGenerator::new(),
    };

    let bind_addr: SocketAddr = if target.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect(target).await?;
    info!(%target, interval_ms, "Sending telemetry packets");

    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    let mut sent = 0u64;

    loop {
        if count.is_some_and(|limit| sent >= limit) {
            break;
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = ticker.tick() => {}
        }

        let seq = generator.sequence_count();
        let anomalous = simulator::is_anomaly_slot(seq);
        let frame = generator.next_frame(Utc::now().timestamp() as u64);

        match socket.send(&frame).await {
            Ok(_) => {
                sent += 1;
                if anomalous {
                    info!(seq, packet = sent, "Sent anomalous telemetry packet");
                } else {
                    info!(seq, packet = sent, "Sent normal telemetry packet");
                }
            }
            Err(e) => warn!(error = %e, seq, "Failed to send telemetry packet"),
        }
    }

    info!(sent, "Packet generator stopped");
    Ok(())
}
