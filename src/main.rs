//! Pyramid Export - tiled multi-resolution export of multi-dimensional images.
//!
//! This binary exports raw planar stacks and inspects the resulting
//! containers.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pyramid_export::{
    config::{Cli, Command, ExportConfig, InspectConfig},
    container::{ContainerReader, RawContainerReader},
    export::PyramidExporter,
    source::RawStackSource,
    ExportError,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Export(config) => run_export(config).await,
        Command::Inspect(config) => run_inspect(config),
    }
}

// =============================================================================
// Export Command
// =============================================================================

async fn run_export(config: ExportConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let source = match RawStackSource::open(&config.input, config.layout()) {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to open {}: {}", config.input.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let options = config.export_options();
    info!("Configuration:");
    info!("  Input: {}", config.input.display());
    info!("  Output: {}", options.output.display());
    info!(
        "  Tiles: {}x{}, downsample {}, {} threads, {} tiles in queue",
        options.tile_width,
        options.tile_height,
        options.downsample,
        options.threads,
        options.max_tiles_in_queue
    );

    let exporter = PyramidExporter::new(options);
    let cancel = exporter.cancel_handle();
    let mut task = tokio::task::spawn_blocking(move || exporter.export(&source));

    let joined = tokio::select! {
        joined = &mut task => joined,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, canceling export...");
            cancel.cancel();
            task.await
        }
    };

    let summary = match joined {
        Ok(Ok(summary)) => summary,
        Ok(Err(ExportError::Canceled)) => {
            warn!("Export canceled; partial output removed");
            return ExitCode::FAILURE;
        }
        Ok(Err(e)) => {
            error!("Export failed: {}", e);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("Export task failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if config.json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize summary: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("Wrote {}", summary.output.display());
        for level in &summary.levels {
            println!(
                "  level {}: {}x{} ({}x{} tiles)",
                level.level, level.width, level.height, level.tiles_x, level.tiles_y
            );
        }
        println!(
            "  {} tiles, {} planes, {:.2}s",
            summary.tiles_written,
            summary.plane_count,
            summary.elapsed.as_secs_f64()
        );
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Inspect Command
// =============================================================================

fn run_inspect(config: InspectConfig) -> ExitCode {
    init_logging(config.verbose);

    let reader = match RawContainerReader::open(&config.path) {
        Ok(reader) => reader,
        Err(e) => {
            eprintln!("Error: {}: {}", config.path.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let header = reader.header();

    if config.json {
        match serde_json::to_string_pretty(header) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    println!("{}", config.path.display());
    println!("  pixel kind: {}", reader.pixel_kind());
    println!("  planes:     {}", reader.plane_count());
    println!("  tile size:  {}x{}", header.tile_width, header.tile_height);
    for (level, entry) in header.levels.iter().enumerate() {
        println!(
            "  level {}: {}x{} ({}x{} tiles) at offset {}",
            level,
            entry.width,
            entry.height,
            header.tiles_x(level),
            header.tiles_y(level),
            entry.data_offset
        );
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "pyramid_export=debug"
    } else {
        "pyramid_export=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
