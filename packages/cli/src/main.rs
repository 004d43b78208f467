#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line driver for the chart annotation core.
//!
//! Loads station and navigation unit datasets from JSON files, replays a
//! pan script against a map session and prints every annotation diff the
//! session produces, followed by the final visible set.
//!
//! Uses `indicatif-log-bridge` (via [`chart_map_cli_utils::init_logger`])
//! so log output and the per-dataset loading spinners share the terminal.

mod script;
mod surface;

use std::path::PathBuf;
use std::sync::Arc;

use chart_map_annotation_models::DatasetKind;
use chart_map_cli_utils::LoadingSpinner;
use chart_map_config::MapConfig;
use chart_map_overlay::{
    ChartOverlay, MemoryPreferenceStore, OverlayPreferenceStore, TomlPreferenceStore,
};
use chart_map_session::{LoadOutcome, MapSession, spawn_loader, spawn_session};
use chart_map_source::{AnnotationSource, JsonFileSource};
use clap::Parser;

use crate::surface::ConsoleSurface;

#[derive(Parser)]
#[command(
    name = "chart_map_cli",
    about = "Replay map pans against the chart annotation core"
)]
struct Cli {
    /// JSON file of navigation units
    #[arg(long)]
    nav_units: Option<PathBuf>,
    /// JSON file of tide prediction stations
    #[arg(long)]
    tide_stations: Option<PathBuf>,
    /// JSON file of tidal current stations (one record per depth bin)
    #[arg(long)]
    current_stations: Option<PathBuf>,
    /// JSON file of buoy stations
    #[arg(long)]
    buoys: Option<PathBuf>,
    /// JSON pan script to replay
    #[arg(long)]
    script: Option<PathBuf>,
    /// Map config TOML file
    #[arg(long, env = chart_map_config::CONFIG_ENV_VAR)]
    config: Option<PathBuf>,
    /// Overlay preferences TOML file. Preferences are not persisted if
    /// omitted.
    #[arg(long)]
    preferences: Option<PathBuf>,
    /// Logical map view whose overlay preferences are used
    #[arg(long, default_value = "map")]
    view_id: String,
    /// Chart layer to show; enables the chart overlay. Repeatable.
    #[arg(long = "overlay-layer")]
    overlay_layers: Vec<u32>,
}

impl Cli {
    fn sources(&self) -> Vec<Arc<dyn AnnotationSource>> {
        [
            (DatasetKind::NavUnit, &self.nav_units),
            (DatasetKind::TidalHeightStation, &self.tide_stations),
            (DatasetKind::TidalCurrentStation, &self.current_stations),
            (DatasetKind::BuoyStation, &self.buoys),
        ]
        .into_iter()
        .filter_map(|(kind, path)| {
            path.as_ref()
                .map(|path| Arc::new(JsonFileSource::new(kind, path)) as Arc<dyn AnnotationSource>)
        })
        .collect()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = chart_map_cli_utils::init_logger();
    let cli = Cli::parse();

    let config = MapConfig::load(cli.config.as_deref())?;
    let store: Arc<dyn OverlayPreferenceStore> = match &cli.preferences {
        Some(path) => Arc::new(TomlPreferenceStore::new(path)),
        None => Arc::new(MemoryPreferenceStore::default()),
    };
    let overlay = ChartOverlay::restore(cli.view_id.clone(), store);
    let steps = cli.script.as_deref().map(script::load).transpose()?;

    let surface = ConsoleSurface::new(multi.clone(), config.diff_chunk_size);
    let (handle, task) = spawn_session(MapSession::new(&config, surface, overlay));

    if !cli.overlay_layers.is_empty() {
        handle.set_overlay_layers(cli.overlay_layers.clone()).await?;
        handle.set_overlay_enabled(true).await?;
    }

    let loaders: Vec<_> = cli
        .sources()
        .into_iter()
        .map(|source| {
            let spinner = LoadingSpinner::start(&multi, source.dataset().label());
            let loader = spawn_loader(handle.clone(), Arc::clone(&source));
            (source, spinner, loader)
        })
        .collect();

    let Some(steps) = steps else {
        log::warn!("No --script given; nothing will be shown on the map");
        for (source, spinner, loader) in loaders {
            finish_loader(&*source, &spinner, loader.await??);
        }
        handle.shutdown().await?;
        task.await?;
        return Ok(());
    };

    let replay = {
        let handle = handle.clone();
        tokio::spawn(async move {
            for step in steps {
                tokio::time::sleep(step.delay()).await;
                handle.region_did_change(step.region).await?;
            }
            Ok::<_, chart_map_session::SessionError>(())
        })
    };

    for (source, spinner, loader) in loaders {
        finish_loader(&*source, &spinner, loader.await??);
    }
    replay.await??;

    // Let the last throttled pan settle before stopping.
    tokio::time::sleep(config.throttle_interval()).await;
    handle.shutdown().await?;
    let session = task.await?;

    println!();
    println!(
        "Final visible set ({} annotations, {} markers on the map, {} diffs applied):",
        session.rendered().len(),
        session.surface().markers(),
        session.surface().diffs()
    );
    for annotation in session.rendered() {
        println!("  {}", surface::describe(annotation));
    }

    Ok(())
}

fn finish_loader(source: &dyn AnnotationSource, spinner: &LoadingSpinner, outcome: LoadOutcome) {
    match outcome {
        LoadOutcome::Delivered { records } => {
            spinner.finish(format!("Loaded {records} records: {}", source.label()));
        }
        LoadOutcome::Failed(e) => {
            spinner.finish(format!("Failed: {}: {e}", source.label()));
        }
    }
}
