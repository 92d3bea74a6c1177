//! Parallel Timestep Ingestion Controller
//!
//! One track file per timestep is parsed on its own scoped thread, with at most
//! `max_workers` threads in flight. Finished workers announce their slot on a
//! completion channel; the controller joins them and only then launches the
//! next job. Results land in a shared [`TimestepCollection`] in completion
//! order and are always looked up by their [`Timestep`] tag.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use crossbeam_channel::Sender;
use tracing::{debug, info, warn};

use crate::case::{self, CaseLayout, Timestep};
use crate::error::{FoamError, Result};
use crate::foam::FoamMesh;
use crate::frame::{self, Frame, FrameOptions};
use crate::vtk::{self, FoamVtkSnapshot};

pub const DEFAULT_MAX_WORKERS: usize = 40;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IngestConfig {
    /// Upper bound on parser threads alive at once
    pub max_workers: usize,
    /// Uniform factor applied to the mesh right after it is read
    pub mesh_scale: f64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            mesh_scale: 1.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TrackJob {
    pub timestep: Timestep,
    pub path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct TaggedSnapshot {
    pub timestep: Timestep,
    pub snapshot: FoamVtkSnapshot,
}

/// Parsed snapshots in the order their workers finished
#[derive(Clone, Debug, Default)]
pub struct TimestepCollection {
    entries: Vec<TaggedSnapshot>,
}

impl TimestepCollection {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, entry: TaggedSnapshot) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, timestep: &Timestep) -> Option<&FoamVtkSnapshot> {
        self.entries
            .iter()
            .find(|entry| entry.timestep == *timestep)
            .map(|entry| &entry.snapshot)
    }

    /// Entries in completion order
    pub fn iter(&self) -> std::slice::Iter<'_, TaggedSnapshot> {
        self.entries.iter()
    }

    /// Entries sorted by timestep
    pub fn ordered(&self) -> Vec<&TaggedSnapshot> {
        let mut entries: Vec<&TaggedSnapshot> = self.entries.iter().collect();
        entries.sort_by(|a, b| a.timestep.cmp(&b.timestep));
        entries
    }
}

#[derive(Debug)]
pub enum SlotState {
    Pending,
    Done,
    Failed(FoamError),
}

/// What happened to one submitted job
#[derive(Debug)]
pub struct SlotOutcome {
    pub timestep: Timestep,
    pub path: PathBuf,
    pub state: SlotState,
}

impl SlotOutcome {
    pub fn error(&self) -> Option<&FoamError> {
        match &self.state {
            SlotState::Failed(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct IngestReport {
    pub collection: TimestepCollection,
    /// One entry per job, in submission order
    pub slots: Vec<SlotOutcome>,
    /// Most workers observed running at the same time
    pub peak_active: usize,
}

impl IngestReport {
    pub fn failures(&self) -> impl Iterator<Item = &SlotOutcome> {
        self.slots.iter().filter(|slot| slot.error().is_some())
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Signals completion when dropped, so a panicking worker is still reaped
struct Completion<'a> {
    slot: usize,
    active: &'a AtomicUsize,
    done: Sender<usize>,
}

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        let _ = self.done.send(self.slot);
    }
}

/// Parse every job's track file with the VTK scanner
pub fn ingest_tracks(jobs: &[TrackJob], config: &IngestConfig) -> IngestReport {
    ingest_with(jobs, config, vtk::scan_file)
}

/// Run `parse` over every job on a bounded set of scoped threads
pub fn ingest_with<F>(jobs: &[TrackJob], config: &IngestConfig, parse: F) -> IngestReport
where
    F: Fn(&Path) -> Result<FoamVtkSnapshot> + Sync,
{
    let cap = config.max_workers.max(1);
    let collection = Mutex::new(TimestepCollection::with_capacity(jobs.len()));
    let mut states: Vec<SlotState> = jobs.iter().map(|_| SlotState::Pending).collect();
    let active = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);
    let (done_tx, done_rx) = crossbeam_channel::unbounded::<usize>();

    thread::scope(|scope| {
        let mut in_flight = HashMap::with_capacity(cap.min(jobs.len()));
        let mut cursor = 0;

        while cursor < jobs.len() || !in_flight.is_empty() {
            while in_flight.len() < cap && cursor < jobs.len() {
                let slot = cursor;
                cursor += 1;
                let job = &jobs[slot];
                let (collection, active, peak, parse) = (&collection, &active, &peak, &parse);
                let done = done_tx.clone();

                info!(timestep = %job.timestep, path = %job.path.display(), "starting parser thread");
                let handle = scope.spawn(move || -> Result<()> {
                    let running = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(running, Ordering::SeqCst);
                    let _completion = Completion { slot, active, done };

                    let snapshot = parse(&job.path)?;
                    lock(collection).push(TaggedSnapshot {
                        timestep: job.timestep.clone(),
                        snapshot,
                    });
                    Ok(())
                });
                in_flight.insert(slot, handle);
            }

            let Ok(slot) = done_rx.recv() else {
                break;
            };
            let Some(handle) = in_flight.remove(&slot) else {
                continue;
            };
            let job = &jobs[slot];
            states[slot] = match handle.join() {
                Ok(Ok(())) => {
                    debug!(timestep = %job.timestep, "parser thread finished");
                    SlotState::Done
                }
                Ok(Err(e)) => {
                    warn!(timestep = %job.timestep, error = %e, "skipping timestep");
                    SlotState::Failed(e)
                }
                Err(_) => {
                    warn!(timestep = %job.timestep, "parser thread panicked");
                    SlotState::Failed(FoamError::WorkerPanicked(job.path.clone()))
                }
            };
        }
    });

    let slots = jobs
        .iter()
        .zip(states)
        .map(|(job, state)| SlotOutcome {
            timestep: job.timestep.clone(),
            path: job.path.clone(),
            state,
        })
        .collect();

    IngestReport {
        collection: collection.into_inner().unwrap_or_else(PoisonError::into_inner),
        slots,
        peak_active: peak.load(Ordering::SeqCst),
    }
}

/// Everything loaded for one case directory
///
/// `load` runs once; every query before it completes returns
/// [`FoamError::NotReady`].
#[derive(Debug)]
pub struct IngestSession {
    case_dir: PathBuf,
    layout: CaseLayout,
    config: IngestConfig,
    timesteps: Vec<Timestep>,
    mesh: Option<FoamMesh>,
    report: Option<IngestReport>,
}

impl IngestSession {
    pub fn new(case_dir: impl Into<PathBuf>, layout: CaseLayout, config: IngestConfig) -> Self {
        Self {
            case_dir: case_dir.into(),
            layout,
            config,
            timesteps: Vec::new(),
            mesh: None,
            report: None,
        }
    }

    /// Discover timesteps, read the mesh and fields, then parse every track file
    pub fn load(&mut self) -> Result<()> {
        let timesteps = case::discover_timesteps(&self.case_dir)?;
        let mut mesh = FoamMesh::load(&case::poly_mesh_dir(&self.case_dir))?;
        if self.config.mesh_scale != 1.0 {
            mesh.scale(self.config.mesh_scale);
        }

        for timestep in &timesteps {
            let path = self.layout.field_path(&self.case_dir, timestep);
            match mesh.load_timestep_field(timestep.clone(), &path) {
                Ok(rows) => debug!(timestep = %timestep, rows, "loaded cell field"),
                Err(e) => warn!(timestep = %timestep, error = %e, "no cell field"),
            }
        }

        let jobs: Vec<TrackJob> = timesteps
            .iter()
            .map(|timestep| TrackJob {
                timestep: timestep.clone(),
                path: self.layout.track_path(&self.case_dir, timestep),
            })
            .collect();
        let report = ingest_tracks(&jobs, &self.config);
        info!(
            timesteps = jobs.len(),
            parsed = report.collection.len(),
            failed = report.failure_count(),
            peak_active = report.peak_active,
            "ingestion finished"
        );

        self.timesteps = timesteps;
        self.mesh = Some(mesh);
        self.report = Some(report);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.report.is_some()
    }

    pub fn case_dir(&self) -> &Path {
        &self.case_dir
    }

    pub fn timesteps(&self) -> Result<&[Timestep]> {
        self.report.as_ref().ok_or(FoamError::NotReady)?;
        Ok(&self.timesteps)
    }

    pub fn mesh(&self) -> Result<&FoamMesh> {
        self.mesh.as_ref().ok_or(FoamError::NotReady)
    }

    pub fn report(&self) -> Result<&IngestReport> {
        self.report.as_ref().ok_or(FoamError::NotReady)
    }

    pub fn collection(&self) -> Result<&TimestepCollection> {
        Ok(&self.report()?.collection)
    }

    /// The parsed snapshot for `timestep`, or None if its track file failed
    pub fn snapshot(&self, timestep: &Timestep) -> Result<Option<&FoamVtkSnapshot>> {
        Ok(self.collection()?.get(timestep))
    }

    pub fn frame(&self, timestep: &Timestep, options: &FrameOptions) -> Result<Frame> {
        let snapshot = self.snapshot(timestep)?;
        Ok(frame::build_frame(self.mesh()?, snapshot, timestep, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::vtk::PointDataset;

    fn jobs(names: &[&str]) -> Vec<TrackJob> {
        names
            .iter()
            .map(|name| TrackJob {
                timestep: Timestep::parse(name).unwrap(),
                path: PathBuf::from(format!("{name}.vtk")),
            })
            .collect()
    }

    fn fake_snapshot(path: &Path) -> FoamVtkSnapshot {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("0");
        let value: f64 = stem.parse().unwrap_or(0.0);
        FoamVtkSnapshot {
            points: PointDataset::new(1, vec![[value, 0.0, 0.0]]),
            ..FoamVtkSnapshot::default()
        }
    }

    #[test]
    fn test_results_tagged_by_timestep() {
        let jobs = jobs(&["0", "10", "20", "30"]);
        let config = IngestConfig {
            max_workers: 4,
            ..IngestConfig::default()
        };
        // later timesteps finish first
        let report = ingest_with(&jobs, &config, |path| {
            let snap = fake_snapshot(path);
            let delay = 40 - snap.points.rows[0][0] as u64;
            thread::sleep(Duration::from_millis(delay));
            Ok(snap)
        });

        assert_eq!(report.collection.len(), 4);
        for job in &jobs {
            let snap = report.collection.get(&job.timestep).unwrap();
            assert_eq!(snap.points.rows[0][0], job.timestep.value);
        }
        let ordered: Vec<&str> = report
            .collection
            .ordered()
            .iter()
            .map(|e| e.timestep.name.as_str())
            .collect();
        assert_eq!(ordered, vec!["0", "10", "20", "30"]);
    }

    #[test]
    fn test_worker_cap() {
        let jobs = jobs(&["1", "2", "3", "4", "5", "6", "7"]);
        let config = IngestConfig {
            max_workers: 2,
            ..IngestConfig::default()
        };
        let report = ingest_with(&jobs, &config, |path| {
            thread::sleep(Duration::from_millis(5));
            Ok(fake_snapshot(path))
        });
        assert_eq!(report.collection.len(), 7);
        assert!(report.peak_active >= 1);
        assert!(report.peak_active <= 2);
    }

    #[test]
    fn test_failures_isolated() {
        let jobs = jobs(&["1", "2", "3"]);
        let report = ingest_with(&jobs, &IngestConfig::default(), |path| {
            if path == Path::new("2.vtk") {
                Err(FoamError::UnsupportedFormat("binary".into()))
            } else {
                Ok(fake_snapshot(path))
            }
        });
        assert_eq!(report.collection.len(), 2);
        assert_eq!(report.failure_count(), 1);
        assert!(matches!(report.slots[1].state, SlotState::Failed(_)));
        assert!(matches!(report.slots[0].state, SlotState::Done));
        assert!(report.collection.get(&jobs[1].timestep).is_none());
    }

    #[test]
    fn test_panicking_worker_reaped() {
        let jobs = jobs(&["1", "2"]);
        let report = ingest_with(&jobs, &IngestConfig::default(), |path| {
            if path == Path::new("1.vtk") {
                panic!("parser blew up");
            }
            Ok(fake_snapshot(path))
        });
        assert_eq!(report.collection.len(), 1);
        assert!(matches!(
            report.slots[0].state,
            SlotState::Failed(FoamError::WorkerPanicked(_))
        ));
    }

    #[test]
    fn test_empty_job_list() {
        let report = ingest_tracks(&[], &IngestConfig::default());
        assert!(report.collection.is_empty());
        assert_eq!(report.peak_active, 0);
    }

    #[test]
    fn test_queries_before_load() {
        let session = IngestSession::new("/nowhere", CaseLayout::default(), IngestConfig::default());
        let ts = Timestep::parse("0").unwrap();
        assert!(!session.is_ready());
        assert!(matches!(session.collection(), Err(FoamError::NotReady)));
        assert!(matches!(session.snapshot(&ts), Err(FoamError::NotReady)));
        assert!(matches!(session.mesh(), Err(FoamError::NotReady)));
        assert!(matches!(
            session.frame(&ts, &FrameOptions::default()),
            Err(FoamError::NotReady)
        ));
    }

    #[test]
    fn test_load_missing_case_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = IngestSession::new(
            dir.path().join("missing"),
            CaseLayout::default(),
            IngestConfig::default(),
        );
        assert!(matches!(session.load(), Err(FoamError::FileUnavailable { .. })));
        assert!(!session.is_ready());
    }
}
