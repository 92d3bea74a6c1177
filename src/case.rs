//! OpenFOAM case directory layout
//!
//! ```text
//! case/
//!   0/  0.5/  287/            timestep directories holding cell fields (U, p, ...)
//!   constant/polyMesh/        points, faces, owner, neighbour
//!   postProcessing/sets/streamlines/<timestep>/track0.vtk
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{FoamError, Result};

pub const DEFAULT_STREAMLINE_DIR: &str = "postProcessing/sets/streamlines";
pub const DEFAULT_TRACK_FILE: &str = "track0.vtk";
pub const DEFAULT_FIELD: &str = "U";

/// Identity of one timestep directory
///
/// Ordered by numeric value; the directory name breaks ties so that "1" and
/// "1.0" stay distinct keys.
#[derive(Clone, Debug)]
pub struct Timestep {
    pub name: String,
    pub value: f64,
}

impl Timestep {
    /// Parse a directory name; None unless it is a finite non-negative number
    pub fn parse(name: &str) -> Option<Timestep> {
        let value: f64 = name.parse().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        Some(Timestep {
            name: name.to_string(),
            value,
        })
    }
}

impl PartialEq for Timestep {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timestep {}

impl PartialOrd for Timestep {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestep {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value
            .total_cmp(&other.value)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl fmt::Display for Timestep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Where the per-timestep files live relative to the case root
#[derive(Clone, Debug)]
pub struct CaseLayout {
    pub streamline_dir: PathBuf,
    pub track_file: String,
    pub field: String,
}

impl Default for CaseLayout {
    fn default() -> Self {
        Self {
            streamline_dir: PathBuf::from(DEFAULT_STREAMLINE_DIR),
            track_file: DEFAULT_TRACK_FILE.to_string(),
            field: DEFAULT_FIELD.to_string(),
        }
    }
}

impl CaseLayout {
    pub fn track_path(&self, case_dir: &Path, timestep: &Timestep) -> PathBuf {
        case_dir
            .join(&self.streamline_dir)
            .join(&timestep.name)
            .join(&self.track_file)
    }

    pub fn field_path(&self, case_dir: &Path, timestep: &Timestep) -> PathBuf {
        case_dir.join(&timestep.name).join(&self.field)
    }
}

pub fn poly_mesh_dir(case_dir: &Path) -> PathBuf {
    case_dir.join("constant").join("polyMesh")
}

/// Keep names that look like timesteps, sorted numerically
pub fn timesteps_from_names<I, S>(names: I) -> Vec<Timestep>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut steps: Vec<Timestep> = names
        .into_iter()
        .filter(|name| !name.as_ref().contains(".orig"))
        .filter_map(|name| Timestep::parse(name.as_ref()))
        .collect();
    steps.sort();
    steps.dedup();
    steps
}

/// List the timestep directories directly under `case_dir`
pub fn discover_timesteps(case_dir: &Path) -> Result<Vec<Timestep>> {
    let entries = fs::read_dir(case_dir).map_err(|e| FoamError::unavailable(case_dir, e))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(name) => debug!(?name, "skipping non UTF-8 directory name"),
        }
    }

    let steps = timesteps_from_names(names);
    if steps.is_empty() {
        return Err(FoamError::UnsupportedFormat(format!(
            "no timestep directories in {}",
            case_dir.display()
        )));
    }
    Ok(steps)
}
