//! Property tests for the scanner, statistics, buffer and ingestion pool

use std::io::Cursor;
use std::path::{Path, PathBuf};

use proptest::prelude::*;

use foamtrack::buffer::GrowableBuffer;
use foamtrack::case::Timestep;
use foamtrack::color::FieldStats;
use foamtrack::ingest::{IngestConfig, TrackJob, ingest_with};
use foamtrack::vtk::{FoamVtkSnapshot, PointDataset, scan_reader};

fn arb_points() -> impl Strategy<Value = Vec<[f64; 3]>> {
    prop::collection::vec(prop::array::uniform3(-1.0e3f64..1.0e3), 1..40)
}

/// Lay the point tokens out `per_line` at a time
fn vtk_text(declared: usize, tokens: &[String], per_line: usize) -> String {
    let mut text = format!("# vtk DataFile Version 2.0\nt\nASCII\nDATASET POLYDATA\nPOINTS {} float\n", declared);
    for chunk in tokens.chunks(per_line) {
        text.push_str(&chunk.join(" "));
        text.push('\n');
    }
    text.push_str(&format!("POINT_DATA {}\n", declared));
    text
}

fn flatten(points: &[[f64; 3]]) -> Vec<String> {
    points.iter().flatten().map(|c| c.to_string()).collect()
}

proptest! {
    #[test]
    fn wrapped_points_recovered_exactly(points in arb_points(), per_line in 1usize..8) {
        let text = vtk_text(points.len(), &flatten(&points), per_line);
        let snapshot = scan_reader(Cursor::new(text.into_bytes())).unwrap();
        prop_assert_eq!(snapshot.points.declared_count, points.len());
        prop_assert_eq!(snapshot.points.expanded_count, points.len() * 3);
        prop_assert_eq!(snapshot.points.rows, points);
    }

    #[test]
    fn truncated_points_never_fail(points in arb_points(), cut in 0usize..120, per_line in 1usize..8) {
        let tokens = flatten(&points);
        let kept = cut.min(tokens.len());
        let text = vtk_text(points.len(), &tokens[..kept], per_line);
        let snapshot = scan_reader(Cursor::new(text.into_bytes())).unwrap();
        prop_assert_eq!(snapshot.points.len(), kept / 3);
        prop_assert_eq!(&snapshot.points.rows[..], &points[..kept / 3]);
        prop_assert_eq!(snapshot.points.is_truncated(), kept / 3 < points.len());
    }

    #[test]
    fn normalize_stays_in_unit_range(
        samples in prop::collection::vec(-1.0e6f64..1.0e6, 0..64),
        value in -1.0e7f64..1.0e7,
    ) {
        let stats = FieldStats::from_samples(samples.iter().copied());
        let v = stats.normalize(value);
        prop_assert!((0.0..=1.0).contains(&v));
        prop_assert!(stats.std_dev >= 0.0);
    }

    #[test]
    fn buffer_length_within_capacity(rows in prop::collection::vec(prop::array::uniform3(any::<f64>()), 0..200)) {
        let mut buffer: GrowableBuffer<f64, 3> = GrowableBuffer::new();
        for row in &rows {
            buffer.append(*row);
            prop_assert!(buffer.len() <= buffer.capacity());
        }
        prop_assert_eq!(buffer.len(), rows.len());
        prop_assert_eq!(buffer.total_writes(), rows.len() * 3);
    }

    #[test]
    fn pool_respects_worker_cap(jobs in 0usize..12, cap in 1usize..6) {
        let jobs: Vec<TrackJob> = (0..jobs)
            .map(|i| TrackJob {
                timestep: Timestep::parse(&i.to_string()).unwrap(),
                path: PathBuf::from(i.to_string()),
            })
            .collect();
        let config = IngestConfig { max_workers: cap, ..IngestConfig::default() };
        let report = ingest_with(&jobs, &config, |_path: &Path| {
            Ok(FoamVtkSnapshot {
                points: PointDataset::new(1, vec![[0.0; 3]]),
                ..FoamVtkSnapshot::default()
            })
        });
        prop_assert_eq!(report.collection.len(), jobs.len());
        prop_assert!(report.peak_active <= cap.min(jobs.len()));
        for job in &jobs {
            prop_assert!(report.collection.get(&job.timestep).is_some());
        }
    }
}
