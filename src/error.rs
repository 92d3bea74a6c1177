use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FoamError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot open {}: {source}", path.display())]
    FileUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid numeric token {token:?} on line {line}")]
    NumericParse { token: String, line: usize },

    #[error("row {index} out of range (len {len})")]
    OutOfRange { index: usize, len: usize },

    #[error("parser thread for {} panicked", .0.display())]
    WorkerPanicked(PathBuf),

    #[error("timestep data queried before ingestion finished")]
    NotReady,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FoamError {
    /// Wrap an open failure with the path that could not be read
    pub fn unavailable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FoamError::FileUnavailable {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, FoamError>;
