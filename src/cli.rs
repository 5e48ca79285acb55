use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::info;

use crate::{
    config::{ConfigStore, TrackerConfig},
    export::{self, ExportKind, Replay},
    recovery::RecoveryStore,
    session::SessionState,
    utils::time::format_clock,
};

/// Inspect recorded runs and crash-recovery records.
#[derive(Parser)]
#[command(
    name = "runlog",
    version = env!("CARGO_PKG_VERSION"),
    about = "GPS run recorder: replay exports and manage crash-recovery records",
    long_about = None
)]
pub struct Cli {
    /// Configuration file (JSON). Missing files fall back to defaults.
    #[arg(global = true, long = "config")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load an export file and print its summary
    View {
        /// Path to a Run_*.json export
        file: PathBuf,

        /// Print the scrubber frame at this track point index
        #[arg(long = "at")]
        at: Option<usize>,
    },

    /// Show or wipe the crash-recovery record
    Recovery {
        #[arg(long = "db")]
        db: PathBuf,

        #[arg(long = "discard", help = "Delete the record instead of showing it")]
        discard: bool,
    },

    /// Write the crash-recovery record out as a TRACK export
    ExportRecovery {
        #[arg(long = "db")]
        db: PathBuf,

        #[arg(long = "out")]
        out: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> Result<TrackerConfig> {
    match path {
        Some(path) => Ok(ConfigStore::new(path.to_path_buf())?.config()),
        None => {
            let mut config = TrackerConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::View { file, at } => view(&file, at),
        Commands::Recovery { db, discard } => recovery(db, discard, &config).await,
        Commands::ExportRecovery { db, out } => export_recovery(db, &out, &config).await,
    }
}

fn view(file: &Path, at: Option<usize>) -> Result<()> {
    let replay = Replay::open(file)?;

    println!("Version:  {}", replay.version().unwrap_or("unknown"));
    if let Some(date) = replay.date() {
        println!("Date:     {date}");
    }
    println!("Points:   {}", replay.track_points().len());
    println!("Distance: {:.2} km", replay.total_distance_m() / 1000.0);
    println!("Duration: {}", replay.duration().unwrap_or("--:--"));
    if let Some(bounds) = replay.bounds() {
        println!(
            "Bounds:   {:.5},{:.5} .. {:.5},{:.5}",
            bounds.south_west.latitude,
            bounds.south_west.longitude,
            bounds.north_east.latitude,
            bounds.north_east.longitude
        );
    }

    println!("Photos:   {}", replay.photos().len());
    for (index, photo) in replay.photos().iter().enumerate() {
        let heading = photo
            .heading
            .map(|h| format!(" heading {h}°"))
            .unwrap_or_default();
        println!(
            "  #{index} at {:.5},{:.5}{heading} ({} chars)",
            photo.latitude,
            photo.longitude,
            photo.image.len()
        );
    }

    if let Some(index) = at {
        let frame = replay.scrub(index).ok_or_else(|| match replay.slider_max() {
            Some(max) => anyhow!("index {index} out of range (0..={max})"),
            None => anyhow!("track is empty"),
        })?;
        println!("{}", frame.label);
    }
    Ok(())
}

async fn recovery(db: PathBuf, discard: bool, config: &TrackerConfig) -> Result<()> {
    let store = RecoveryStore::open(db, config.storage_max_pages)?;

    if discard {
        store.clear().await?;
        println!("Recovery record discarded");
        return Ok(());
    }

    match store.load().await? {
        None => println!("No unfinished run"),
        Some(snapshot) => {
            let started = chrono::DateTime::from_timestamp_millis(snapshot.started_at_ms)
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| snapshot.started_at_ms.to_string());
            let recorded = snapshot
                .track_points
                .last()
                .map(|p| format_clock(p.elapsed_secs))
                .unwrap_or_else(|| format_clock(0.0));
            println!("Unfinished run started {started}");
            println!("Points:   {}", snapshot.track_points.len());
            println!("Distance: {:.2} km", snapshot.total_distance_m / 1000.0);
            println!("Recorded: {recorded}");
        }
    }
    Ok(())
}

async fn export_recovery(db: PathBuf, out: &Path, config: &TrackerConfig) -> Result<()> {
    let store = RecoveryStore::open(db, config.storage_max_pages)?;
    let snapshot = store
        .load()
        .await?
        .context("no unfinished run to export")?;

    let mut state = SessionState::new();
    state.restore(snapshot);

    let bundle = export::bundle(&state, ExportKind::Track, Utc::now());
    let path = bundle.write_to(out)?;
    info!("recovered run written to {}", path.display());
    println!("{}", path.display());
    Ok(())
}
