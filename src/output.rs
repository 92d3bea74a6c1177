use std::fs::File;
use std::io::{self, BufWriter, Write};

use crate::color::FieldStats;
use crate::config::Config;
use crate::foam::FoamMesh;
use crate::frame::{self, FrameOptions};
use crate::ingest::{IngestReport, SlotState};
use crate::vtk::{FoamVtkSnapshot, PointDataset};

/// Write one summary line for the mesh and one per submitted timestep
pub fn write_report<W: Write>(
    writer: W,
    mesh: &FoamMesh,
    report: &IngestReport,
    options: &FrameOptions,
) -> io::Result<()> {
    let mut writer = BufWriter::new(writer);

    writeln!(
        writer,
        "mesh: {} vertices, {} faces, {} cells, {} fields",
        mesh.vertices().len(),
        mesh.face_count(),
        mesh.cell_count(),
        mesh.field_count()
    )?;

    for slot in &report.slots {
        match &slot.state {
            SlotState::Failed(e) => writeln!(writer, "{}: failed: {}", slot.timestep, e)?,
            SlotState::Pending => writeln!(writer, "{}: not parsed", slot.timestep)?,
            SlotState::Done => {
                let Some(snapshot) = report.collection.get(&slot.timestep) else {
                    continue;
                };
                let frame = frame::build_frame(mesh, Some(snapshot), &slot.timestep, options);
                write_timestep(&mut writer, &slot.timestep.name, snapshot)?;
                writeln!(
                    writer,
                    ", frame {} points {} triangles",
                    frame.points.len(),
                    frame.triangle_count()
                )?;
            }
        }
    }

    writeln!(
        writer,
        "{} of {} timesteps parsed, peak {} parser threads",
        report.collection.len(),
        report.slots.len(),
        report.peak_active
    )?;
    writer.flush()
}

fn count(dataset: &PointDataset) -> String {
    format!("{}/{}", dataset.len(), dataset.declared_count)
}

fn write_timestep<W: Write>(writer: &mut W, name: &str, snapshot: &FoamVtkSnapshot) -> io::Result<()> {
    let stats = FieldStats::from_rows(&snapshot.magnitude.rows);
    write!(
        writer,
        "{}: points {}, field {}, lines {}, depth {}, mean {:.4} stddev {:.4}",
        name,
        count(&snapshot.points),
        count(&snapshot.magnitude),
        snapshot.line_topology.len(),
        snapshot.depth,
        stats.mean,
        stats.std_dev
    )
}

/// The `-o` file if given, else stdout
pub fn open_output(config: &Config) -> io::Result<Box<dyn Write>> {
    match &config.output_file {
        Some(path) => {
            let file = File::create(path)?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(io::stdout())),
    }
}
