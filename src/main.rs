//! tiled-pyramid - inspect tiled pyramidal TIFF images and decode their tiles.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiled_pyramid::{
    config::{Cli, Command, InspectConfig, TileConfig},
    source::{ContainerSource, FileSource},
    tile::{OutputFormat, Tile, TileEncoder},
    ImageHandle, PyramidCatalog,
};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Inspect(config) => run_inspect(config),
        Command::Tile(config) => run_tile(config),
    }
}

/// Initialize the tracing/logging subsystem. Logs go to stderr.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tiled_pyramid=debug"
    } else {
        "tiled_pyramid=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Inspect Command
// =============================================================================

fn run_inspect(config: InspectConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let mut handle = ImageHandle::new(FileSource::new(config.source.resolver()));
    if let Err(e) = handle.open(config.x, config.y) {
        error!("{}", e);
        return ExitCode::FAILURE;
    }
    handle.close();

    let Some(catalog) = handle.catalog() else {
        error!("No catalog was built");
        return ExitCode::FAILURE;
    };

    if config.json {
        match serde_json::to_string_pretty(catalog) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize catalog: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_catalog(&handle.source().name(config.x, config.y), catalog);
    }

    ExitCode::SUCCESS
}

fn print_catalog(name: &str, catalog: &PyramidCatalog) {
    println!("{}", name);
    println!("═════════════════════════════════");
    println!("Scheme:      {:?}", catalog.scheme);
    println!(
        "Samples:     {} x {}-bit {:?}, {:?}",
        catalog.channels, catalog.bits_per_channel, catalog.sample_type, catalog.colour_space
    );
    let (tw, th) = catalog.tile_size();
    println!("Tile size:   {}x{}", tw, th);
    if let Some(res) = catalog.resolution {
        println!("Density:     {} x {} per {:?}", res.x, res.y, res.unit);
    }
    println!("Range:       {:?} .. {:?}", catalog.min_values, catalog.max_values);
    if let Some(icc) = &catalog.icc_profile {
        println!("ICC profile: {} bytes", icc.len());
    }

    println!();
    println!("Resolutions (smallest first):");
    for (res, level) in catalog.levels.iter().rev().enumerate() {
        println!(
            "  {:>2}: {:>6} x {:<6} tiles {}x{} ({} x {}) at {}",
            res,
            level.image_width,
            level.image_height,
            level.tile_width,
            level.tile_height,
            level.tiles_across(),
            level.tiles_down(),
            level.locator
        );
    }

    if catalog.is_stack() {
        println!();
        println!("Stack layers:");
        for layer in &catalog.stack {
            println!(
                "  {:>2}: directory {}{}",
                layer.sequence_index,
                layer.directory,
                layer
                    .name
                    .as_deref()
                    .map(|n| format!(" \"{}\"", n))
                    .unwrap_or_default()
            );
        }
    }

    if !catalog.metadata.is_empty() {
        println!();
        println!("Metadata:");
        for (key, value) in &catalog.metadata {
            println!("  {}: {}", key, value);
        }
    }
}

// =============================================================================
// Tile Command
// =============================================================================

fn run_tile(config: TileConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let mut handle = ImageHandle::new(FileSource::new(config.source.resolver()));
    let tile = match handle.get_tile(config.x, config.y, config.resolution, config.tile) {
        Ok(tile) => tile,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    handle.close();

    if config.json {
        match serde_json::to_string_pretty(&tile) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize tile: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!(
            "Tile {} of resolution {} from {}: {}x{}, {} x {}-bit {:?} {:?}, {} bytes",
            tile.tile_index,
            tile.resolution,
            tile.source,
            tile.width,
            tile.height,
            tile.channels,
            tile.bits_per_channel,
            tile.sample_type,
            tile.colour_space,
            tile.data_length
        );
    }

    if let Some(path) = &config.output {
        let bytes = match encode_output(&tile, &config) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        };
        if let Err(e) = std::fs::write(path, &bytes) {
            error!("Failed to write {}: {}", path.display(), e);
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}

/// Encode the tile for the requested output file, falling back to raw
/// samples when the extension or sample layout has no image encoding.
fn encode_output(tile: &Tile, config: &TileConfig) -> Result<bytes::Bytes, String> {
    let format = match config.output_extension().as_deref().and_then(OutputFormat::from_extension) {
        Some(OutputFormat::Jpeg { .. }) => OutputFormat::Jpeg {
            quality: config.quality,
        },
        Some(format) => format,
        None => return Ok(tile.data.clone()),
    };

    let encoder = TileEncoder::new(format);
    if !encoder.supports(tile) {
        warn!(
            channels = tile.channels,
            bits = tile.bits_per_channel,
            "Sample layout cannot be encoded as {:?}; writing raw samples",
            format
        );
        return Ok(tile.data.clone());
    }

    encoder.encode(tile).map_err(|e| e.to_string())
}
