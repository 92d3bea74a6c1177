//! Ingestion of OpenFOAM case output for visualization
//!
//! Reads the `constant/polyMesh` topology and per-timestep cell fields, scans
//! legacy VTK streamline tracks for every timestep on a bounded thread pool,
//! and derives render-ready vertex, index and color buffers.

pub mod buffer;
pub mod case;
pub mod cli;
pub mod color;
pub mod config;
pub mod debug;
pub mod error;
pub mod foam;
pub mod frame;
pub mod ingest;
pub mod input;
pub mod obj;
pub mod output;
pub mod tokenize;
pub mod vtk;

pub use error::{FoamError, Result};
