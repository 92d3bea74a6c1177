use std::io::{self, Write};

use crate::case::Timestep;
use crate::vtk::FoamVtkSnapshot;

/// Dump every recovered streamline point with its field sample
///
/// Points past the end of a truncated field print `-` in place of the sample.
pub fn dump_points<W: Write>(
    writer: &mut W,
    timestep: &Timestep,
    snapshot: &FoamVtkSnapshot,
) -> io::Result<()> {
    writeln!(
        writer,
        "timestep {}: total points {}",
        timestep,
        snapshot.points.len()
    )?;

    for (index, [x, y, z]) in snapshot.points.rows.iter().enumerate() {
        write!(writer, "{}: {} {} {}", index, x, y, z)?;
        match snapshot.magnitude.rows.get(index) {
            Some([u, v, w]) => writeln!(writer, " | {} {} {}", u, v, w)?,
            None => writeln!(writer, " | -")?,
        }
    }

    Ok(())
}
