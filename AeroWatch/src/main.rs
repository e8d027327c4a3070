use std::sync::Arc;

use aeroconfig::Config;
use aerofeeds::{
    AnalyticsResponse, FeedsClient, IncidentRequest, NewStream, Stream, StreamStatus,
};
use aeromonitor::{Monitor, MonitorSettings, StreamBoard, TileStatus};
use aeroplayback::{HlsEngineFactory, HttpProbe};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "aerowatch", about = "Operations monitor for drone video feeds")]
struct Cli {
    /// Configuration directory (defaults to $AEROWATCH_CONFIG, then .aerowatch)
    #[arg(long, global = true, default_value = "")]
    config_dir: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the monitor until Ctrl+C (default)
    Watch,
    /// Manage stream registrations
    #[command(subcommand)]
    Streams(StreamsCommand),
    /// List the places with registered streams
    Places,
    /// Show people and vehicle analytics for a stream
    Analytics { stream_key: String },
    /// Escalate an incident through the bridge
    Incident {
        #[arg(long)]
        incident_id: String,
        #[arg(long, conflicts_with = "place")]
        stream_key: Option<String>,
        #[arg(long)]
        place: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum StreamsCommand {
    /// List registered streams
    List {
        /// Only streams currently publishing
        #[arg(long)]
        live: bool,
    },
    /// Register a new stream
    Create {
        #[arg(long)]
        pilot: String,
        #[arg(long)]
        place: String,
    },
    /// Remove a stream registration
    Delete { id: String },
}

fn init_logging(config: &Config) -> Result<()> {
    if !config.get_log_enable_console()? {
        return Ok(());
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.get_log_min_level().unwrap_or_default().to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_config(&cli.config_dir).context("Failed to load configuration")?;
    init_logging(&config)?;

    let client = FeedsClient::from_config(&config)?;

    match cli.command.unwrap_or(Command::Watch) {
        Command::Watch => watch_feeds(&config, client).await,
        Command::Streams(StreamsCommand::List { live }) => {
            let streams = if live {
                client.list_streams_with_status(StreamStatus::Live).await?
            } else {
                client.list_streams().await?
            };
            for stream in &streams {
                print_stream(stream);
            }
            Ok(())
        }
        Command::Streams(StreamsCommand::Create { pilot, place }) => {
            let stream = client.create_stream(&NewStream::new(pilot, place)?).await?;
            print_stream(&stream);
            println!("  publish to: {}", stream.rtmp_publish_url());
            Ok(())
        }
        Command::Streams(StreamsCommand::Delete { id }) => {
            client.delete_stream(&id).await?;
            println!("Deleted stream {}", id);
            Ok(())
        }
        Command::Places => {
            let streams = client.list_streams().await?;
            for place in aerofeeds::places(&streams) {
                println!("{}", place);
            }
            Ok(())
        }
        Command::Analytics { stream_key } => {
            match client.combined_analytics(&stream_key).await {
                Some(combined) => {
                    print_analytics("people", combined.people.as_ref());
                    print_analytics("vehicles", combined.vehicles.as_ref());
                }
                None => println!("No analytics available for {}", stream_key),
            }
            Ok(())
        }
        Command::Incident {
            incident_id,
            stream_key,
            place,
        } => {
            let request =
                IncidentRequest::from_selection(&incident_id, stream_key.as_deref(), place.as_deref())?;
            let reply = client.trigger_incident(&request).await?;
            println!("{}", serde_json::to_string_pretty(&reply.0)?);
            Ok(())
        }
    }
}

async fn watch_feeds(config: &Config, client: FeedsClient) -> Result<()> {
    let settings = MonitorSettings::from_config(config)?;
    // Playlists, segments and probes share one connection pool
    let http = reqwest::Client::new();
    let factory = Arc::new(HlsEngineFactory::with_settings(http.clone(), settings.hls.clone()));
    let probe = Arc::new(HttpProbe::with_client(http));

    let monitor = Monitor::start(client, settings, factory, probe)?;
    let mut board = monitor.board();
    let mut tiles = monitor.tiles();

    info!("AeroWatch is ready, press Ctrl+C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Ok(()) = board.changed() => report_board(&board),
            Ok(()) = tiles.changed() => report_tiles(&tiles),
        }
    }

    info!("Shutting down");
    monitor.shutdown().await;
    Ok(())
}

fn report_board(board: &watch::Receiver<StreamBoard>) {
    let board = board.borrow();
    if let Some(error) = &board.error {
        warn!("{}", error);
    }
}

fn report_tiles(tiles: &watch::Receiver<Vec<TileStatus>>) {
    for tile in tiles.borrow().iter() {
        debug!(
            stream_key = %tile.stream_key,
            pill = %tile.pill,
            fragments = tile.fragments,
            "{} @ {}",
            tile.pilot,
            tile.place
        );
    }
}

fn print_stream(stream: &Stream) {
    println!(
        "{:<8} {:<16} {} @ {}",
        stream.status.as_str(),
        stream.stream_key,
        stream.display_pilot(),
        stream.display_place()
    );
    println!("  id: {}  hls: {}", stream.id, stream.hls_url);
}

fn print_analytics(label: &str, response: Option<&AnalyticsResponse>) {
    match response {
        Some(r) => println!(
            "{:<9} unique={} in frame={} density={} ({} frames, {}s window)",
            label, r.total_unique, r.current_frame_count, r.density, r.analyzed_frames, r.window_seconds
        ),
        None => println!("{:<9} unavailable", label),
    }
}
