use std::path::PathBuf;

use crate::case::CaseLayout;
use crate::cli::Args;
use crate::error::{FoamError, Result};
use crate::frame::FrameOptions;
use crate::ingest::IngestConfig;

/// Runtime configuration derived from CLI arguments
#[derive(Clone, Debug)]
pub struct Config {
    pub case_dir: PathBuf,
    pub layout: CaseLayout,
    pub ingest: IngestConfig,
    pub frame: FrameOptions,
    pub dump_points: bool,
    pub output_file: Option<String>,
}

impl Config {
    /// Build configuration from parsed CLI arguments
    pub fn from_args(args: &Args) -> Result<Self> {
        if args.max_workers == 0 {
            return Err(FoamError::InvalidConfig("--max-workers must be at least 1".into()));
        }
        if args.stride == 0 {
            return Err(FoamError::InvalidConfig("--stride must be at least 1".into()));
        }
        if !args.scale.is_finite() || args.scale <= 0.0 {
            return Err(FoamError::InvalidConfig(format!(
                "--scale must be a positive number, got {}",
                args.scale
            )));
        }

        Ok(Config {
            case_dir: args.case_dir.clone(),
            layout: CaseLayout {
                streamline_dir: args.streamline_dir.clone(),
                track_file: args.track_file.clone(),
                field: args.field.clone(),
            },
            ingest: IngestConfig {
                max_workers: args.max_workers,
                mesh_scale: args.scale,
            },
            frame: FrameOptions {
                stride: args.stride,
                ..FrameOptions::default()
            },
            dump_points: args.dump_points,
            output_file: args.output.clone(),
        })
    }
}
