use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use clap::{App, Arg, ArgMatches, SubCommand};
use colored::*;
use groundstation::anomaly::{MAX_TEMPERATURE_C, MIN_ALTITUDE_KM, MIN_BATTERY_PERCENT, MIN_SIGNAL_DB};
use groundstation::config::{self, DEFAULT_FEED_PORT};
use groundstation::{
    BroadcastHub, IngestListener, LiveFeed, MemoryStore, ServiceConfig, TelemetryPipeline, TelemetryReading,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_HOST: &str = "127.0.0.1";
const HUB_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let port = DEFAULT_FEED_PORT.to_string();
    let matches = App::new("groundstation")
        .version(env!("CARGO_PKG_VERSION"))
        .about("📡 Ground station telemetry ingest and live feed")
        .subcommand(
            SubCommand::with_name("server")
                .about("🚀 Run the UDP ingest service and live feed")
                .long_about(
                    "Listens for telemetry frames over UDP, stores every reading in memory and \
                     streams readings to connected feed clients. Settings default from \
                     GROUNDSTATION_* environment variables; flags override them.",
                )
                .arg(
                    Arg::with_name("ingest-addr")
                        .long("ingest-addr")
                        .value_name("ADDR")
                        .help("UDP address to receive telemetry on")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("feed-addr")
                        .long("feed-addr")
                        .value_name("ADDR")
                        .help("TCP address for the live feed")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("max-in-flight")
                        .long("max-in-flight")
                        .value_name("N")
                        .help("Drop frames once N are being handled (0 = unlimited)")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("strict-length")
                        .long("strict-length")
                        .help("Reject frames whose packet length field does not match"),
                )
                .arg(
                    Arg::with_name("retention")
                        .long("retention")
                        .value_name("N")
                        .help("Keep at most N readings in memory (0 = unlimited)")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("monitor")
                .about("📊 Stream live telemetry from a running server")
                .arg(
                    Arg::with_name("host")
                        .short("h")
                        .long("host")
                        .value_name("HOST")
                        .help("Feed host address")
                        .takes_value(true)
                        .default_value(DEFAULT_HOST),
                )
                .arg(
                    Arg::with_name("port")
                        .short("p")
                        .long("port")
                        .value_name("PORT")
                        .help("Feed port")
                        .takes_value(true)
                        .default_value(&port),
                )
                .arg(
                    Arg::with_name("format")
                        .short("f")
                        .long("format")
                        .value_name("FORMAT")
                        .help("Output format")
                        .takes_value(true)
                        .possible_values(&["json", "table", "compact"])
                        .default_value("table"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        ("server", Some(sub_matches)) => handle_server(sub_matches).await?,
        ("monitor", Some(sub_matches)) => handle_monitor(sub_matches).await?,
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
            println!("{}", "Quick start:".bright_green());
            println!("  {} Start the ingest service", "groundstation server".bright_cyan());
            println!("  {} Watch live telemetry", "groundstation monitor".bright_cyan());
            println!("  {} Send test packets", "packet-generator".bright_cyan());
        }
    }

    Ok(())
}

fn server_config(matches: &ArgMatches<'_>) -> Result<ServiceConfig, Box<dyn Error>> {
    let mut config = ServiceConfig::from_env()?;

    if let Some(addr) = matches.value_of("ingest-addr") {
        config.ingest.bind_addr = config::parse_value("--ingest-addr", addr)?;
    }
    if let Some(addr) = matches.value_of("feed-addr") {
        config.feed.bind_addr = config::parse_value("--feed-addr", addr)?;
    }
    if let Some(limit) = matches.value_of("max-in-flight") {
        config.ingest.max_in_flight = config::parse_value("--max-in-flight", limit)?;
    }
    if matches.is_present("strict-length") {
        config.ingest.strict_length = true;
    }
    if let Some(retention) = matches.value_of("retention") {
        let retention: usize = config::parse_value("--retention", retention)?;
        config.store.retention = Some(retention).filter(|&n| n > 0);
    }

    Ok(config)
}

async fn handle_server(matches: &ArgMatches<'_>) -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = server_config(matches)?;
    info!(
        ingest = %config.ingest.bind_addr,
        feed = %config.feed.bind_addr,
        max_in_flight = config.ingest.max_in_flight,
        strict_length = config.ingest.strict_length,
        retention = ?config.store.retention,
        "Starting ground station"
    );

    let store = Arc::new(MemoryStore::with_retention(config.store.retention));
    let (hub, hub_task) = BroadcastHub::spawn(config.feed.send_timeout());
    let pipeline = Arc::new(
        TelemetryPipeline::new(store, hub.clone()).with_strict_length(config.ingest.strict_length),
    );

    let listener = match IngestListener::bind(&config.ingest, pipeline).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, "Cannot start ingest listener");
            return Err(e.into());
        }
    };
    let stats = listener.stats();
    let feed = LiveFeed::bind(config.feed.bind_addr, hub.clone()).await?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => warn!(error = %e, "Failed to listen for shutdown signal"),
        }
        signal_token.cancel();
    });

    let ingest_task = tokio::spawn(listener.run(shutdown.clone()));
    let feed_task = tokio::spawn(feed.run(shutdown.clone()));
    let (ingest_result, feed_result) = tokio::join!(ingest_task, feed_task);
    if let Err(e) = ingest_result {
        error!(error = %e, "Ingest task failed");
    }
    if let Err(e) = feed_result {
        error!(error = %e, "Feed task failed");
    }

    drop(hub);
    match tokio::time::timeout(HUB_DRAIN_TIMEOUT, hub_task).await {
        Ok(Ok(hub_stats)) => info!(
            published = hub_stats.published,
            delivered = hub_stats.delivered,
            pruned = hub_stats.pruned,
            "Broadcast hub drained"
        ),
        Ok(Err(e)) => error!(error = %e, "Broadcast hub task failed"),
        Err(_) => warn!("Broadcast hub still has live handles at shutdown"),
    }

    let stats = stats.get();
    info!(
        received = stats.frames_received,
        dropped = stats.frames_dropped,
        receive_errors = stats.receive_errors,
        "Ground station stopped"
    );
    Ok(())
}

async fn handle_monitor(matches: &ArgMatches<'_>) -> Result<(), Box<dyn Error>> {
    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port: u16 = config::parse_value("--port", matches.value_of("port").unwrap_or_default())?;
    let format = matches.value_of("format").unwrap_or("table");

    let addr = format!("{}:{}", host, port);
    let stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("{} Failed to connect to live feed at {}", "❌".red(), addr.bright_white());
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                eprintln!("{} Server is not running. Start it with:", "💡".yellow());
                eprintln!("   {}", "groundstation server".bright_cyan());
            } else {
                eprintln!("{} Network error: {}", "🔌".yellow(), e.to_string().bright_red());
            }
            return Err(e.into());
        }
    };

    if format == "table" {
        print_table_header();
    }

    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        if format == "json" {
            println!("{}", line);
            continue;
        }

        match serde_json::from_str::<TelemetryReading>(&line) {
            Ok(reading) if format == "compact" => print_compact_row(&reading),
            Ok(reading) => print_table_row(&reading),
            Err(e) => eprintln!("{} Unreadable feed line: {}", "⚠️".yellow(), e),
        }
    }

    println!("{}", "Feed closed by server".dimmed());
    Ok(())
}

fn print_table_header() {
    println!("{}", "┌──────────────────────────────────────────────────────────────────────────┐".bright_white());
    println!("{}", "│                       📡 GROUND STATION TELEMETRY                        │".bright_blue().bold());
    println!("{}", "├──────────────────────────────────────────────────────────────────────────┤".bright_white());
    println!("{}", "│ Time (UTC)          │   Temp   │ Battery │  Altitude │  Signal  │ Status  │".bright_white());
    println!("{}", "├──────────────────────────────────────────────────────────────────────────┤".bright_white());
}

fn print_table_row(reading: &TelemetryReading) {
    let time_str = reading.timestamp().format("%Y-%m-%d %H:%M:%S").to_string();

    let temp = format!("{:>6.1}°C", reading.temperature());
    let temp_str = if reading.temperature() > MAX_TEMPERATURE_C { temp.red() } else { temp.white() };
    let battery = format!("{:>6.1}%", reading.battery());
    let battery_str = if reading.battery() < MIN_BATTERY_PERCENT { battery.red() } else { battery.green() };
    let altitude = format!("{:>7.1}km", reading.altitude());
    let altitude_str = if reading.altitude() < MIN_ALTITUDE_KM { altitude.red() } else { altitude.white() };
    let signal = format!("{:>6.1}dB", reading.signal());
    let signal_str = if reading.signal() < MIN_SIGNAL_DB { signal.red() } else { signal.white() };
    let status_str = if reading.is_anomaly() { "ANOMALY".bright_red() } else { "NOMINAL".bright_green() };

    println!(
        "│ {} │ {} │ {} │ {} │ {} │ {} │",
        time_str, temp_str, battery_str, altitude_str, signal_str, status_str
    );
}

fn print_compact_row(reading: &TelemetryReading) {
    let status = if reading.is_anomaly() { "ANOM".red() } else { "OK".green() };
    println!(
        "[{}] {} | {:.1}°C | {:.1}% | {:.1}km | {:.1}dB",
        reading.timestamp().timestamp(),
        status,
        reading.temperature(),
        reading.battery(),
        reading.altitude(),
        reading.signal()
    );
}
