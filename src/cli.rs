use std::path::PathBuf;

use clap::Parser;

use crate::case::{DEFAULT_FIELD, DEFAULT_STREAMLINE_DIR, DEFAULT_TRACK_FILE};
use crate::frame::DEFAULT_STRIDE;
use crate::ingest::DEFAULT_MAX_WORKERS;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "foamtrack",
    about = "Load an OpenFOAM case and its streamline tracks for rendering"
)]
pub struct Args {
    /// Maximum number of track files parsed at once
    #[arg(short = 'j', long = "max-workers", value_name = "N", default_value_t = DEFAULT_MAX_WORKERS)]
    pub max_workers: usize,

    /// Streamline file name inside each timestep directory
    #[arg(long = "track-file", value_name = "NAME", default_value = DEFAULT_TRACK_FILE)]
    pub track_file: String,

    /// Streamline directory, relative to the case
    #[arg(long = "streamline-dir", value_name = "DIR", default_value = DEFAULT_STREAMLINE_DIR)]
    pub streamline_dir: PathBuf,

    /// Cell field read from each timestep directory
    #[arg(long, value_name = "NAME", default_value = DEFAULT_FIELD)]
    pub field: String,

    /// Keep every N-th streamline point
    #[arg(long, value_name = "N", default_value_t = DEFAULT_STRIDE)]
    pub stride: usize,

    /// Uniform mesh scale applied after loading
    #[arg(long, value_name = "F", default_value_t = 1.0)]
    pub scale: f64,

    /// Print every parsed streamline point
    #[arg(long = "dump-points")]
    pub dump_points: bool,

    /// Write the report to FILE instead of stdout
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<String>,

    /// OpenFOAM case directory
    #[arg(value_name = "CASE_DIR")]
    pub case_dir: PathBuf,
}
