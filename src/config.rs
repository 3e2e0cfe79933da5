//! Command-line configuration for the `tiled-pyramid` binary.
//!
//! Options can also be set through environment variables with the
//! `PYRAMID_` prefix:
//!
//! - `PYRAMID_PATH` - TIFF file to read
//! - `PYRAMID_PATTERN` - file name template with `{x}` / `{y}` placeholders
//! - `PYRAMID_JPEG_QUALITY` - quality of JPEG tile output (default: 80)

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::source::{FileResolver, SequencePattern, SingleFile};
use crate::tile::DEFAULT_JPEG_QUALITY;

// =============================================================================
// CLI Structure
// =============================================================================

/// tiled-pyramid - inspect tiled pyramidal TIFF images and decode their tiles.
#[derive(Parser, Debug, Clone)]
#[command(name = "tiled-pyramid")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the resolution levels, stack layers and metadata of an image.
    Inspect(InspectConfig),

    /// Decode one tile and optionally write it to a file.
    Tile(TileConfig),
}

// =============================================================================
// Container selection
// =============================================================================

/// Which file(s) an image is read from.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Path to a tiled TIFF file.
    #[arg(env = "PYRAMID_PATH")]
    pub path: Option<PathBuf>,

    /// File name template for image sequences, e.g. `scan_{x}_{y}.tif`.
    #[arg(long, env = "PYRAMID_PATTERN")]
    pub pattern: Option<String>,
}

impl SourceArgs {
    pub fn validate(&self) -> Result<(), String> {
        match (&self.path, &self.pattern) {
            (Some(_), Some(_)) => Err("Give either a path or --pattern, not both".to_string()),
            (None, None) => Err(
                "No image given. Pass a path, --pattern, or set PYRAMID_PATH".to_string(),
            ),
            (None, Some(pattern)) if !SequencePattern::new(pattern.as_str()).has_placeholders() => {
                Err("--pattern must contain {x} or {y}".to_string())
            }
            _ => Ok(()),
        }
    }

    /// File resolver for the selected container(s). Call `validate()` first.
    pub fn resolver(&self) -> Box<dyn FileResolver> {
        match (&self.pattern, &self.path) {
            (Some(pattern), _) => Box::new(SequencePattern::new(pattern.as_str())),
            (None, Some(path)) => Box::new(SingleFile::new(path.clone())),
            (None, None) => Box::new(SingleFile::new(PathBuf::new())),
        }
    }
}

// =============================================================================
// Inspect Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Horizontal sequence position.
    #[arg(short, long, default_value_t = 0)]
    pub x: usize,

    /// Vertical sequence position.
    #[arg(short, long, default_value_t = 0)]
    pub y: usize,

    /// Print the catalog as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl InspectConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.source.validate()
    }
}

// =============================================================================
// Tile Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct TileConfig {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Resolution, 0 being the smallest.
    #[arg(short, long)]
    pub resolution: usize,

    /// Tile index, row-major from the top-left tile.
    #[arg(short, long)]
    pub tile: u32,

    /// Horizontal sequence position (stack layer for stacks).
    #[arg(short, long, default_value_t = 0)]
    pub x: usize,

    /// Vertical sequence position.
    #[arg(short, long, default_value_t = 0)]
    pub y: usize,

    /// Write the tile here: `.png` and `.jpg` are encoded when the samples
    /// allow it, anything else receives the raw samples.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// JPEG quality for `.jpg` output (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "PYRAMID_JPEG_QUALITY")]
    pub quality: u8,

    /// Print the tile descriptor as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl TileConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.source.validate()?;

        if self.quality == 0 || self.quality > 100 {
            return Err("quality must be between 1 and 100".to_string());
        }

        if let Some(parent) = self.output.as_deref().and_then(Path::parent) {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(format!(
                    "Output directory {} does not exist",
                    parent.display()
                ));
            }
        }

        Ok(())
    }

    /// Lower-cased extension of the output file, if any.
    pub fn output_extension(&self) -> Option<String> {
        self.output
            .as_deref()
            .and_then(Path::extension)
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    }
}

// =============================================================================
// Tests
// =============================================================================
