//! Magnitude statistics and color derivation
//!
//! Field samples are normalized against `mean ± 2.5σ` (sample standard
//! deviation), mapped onto the blue to red band of the HSV wheel and converted
//! to RGB. Mesh colors are then carried from cells to faces to vertices.

use crate::foam::{CellField, FoamMesh};
use crate::vtk::FoamVtkSnapshot;

/// Half-width of the display range in standard deviations
pub const CLIP_SIGMAS: f64 = 2.5;

/// Hue of a normalized value of 0
pub const HUE_SPAN_DEGREES: f64 = 240.0;

/// Alpha used for streamline points
pub const POINT_ALPHA: u8 = 50;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ColorSample {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl ColorSample {
    pub const OPAQUE_BLACK: ColorSample = ColorSample::new(0, 0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Build from unit-range RGB, clamping each channel
    pub fn from_unit_rgb(rgb: [f64; 3], a: u8) -> Self {
        let channel = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::new(channel(rgb[0]), channel(rgb[1]), channel(rgb[2]), a)
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Mean and sample standard deviation over every component of a field
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldStats {
    pub mean: f64,
    pub std_dev: f64,
    pub count: usize,
}

impl FieldStats {
    /// Two passes: mean, then `sum((x - mean)^2) / (n - 1)`.
    ///
    /// Fewer than two samples give a standard deviation of zero.
    pub fn from_samples<I>(samples: I) -> FieldStats
    where
        I: IntoIterator<Item = f64>,
        I::IntoIter: Clone,
    {
        let samples = samples.into_iter();
        let (sum, count) = samples
            .clone()
            .fold((0.0, 0usize), |(sum, n), x| (sum + x, n + 1));
        if count == 0 {
            return FieldStats {
                mean: 0.0,
                std_dev: 0.0,
                count,
            };
        }

        let mean = sum / count as f64;
        let std_dev = if count < 2 {
            0.0
        } else {
            let squares: f64 = samples.map(|x| (x - mean).powi(2)).sum();
            (squares / (count - 1) as f64).sqrt()
        };

        FieldStats {
            mean,
            std_dev,
            count,
        }
    }

    /// Stats over every component of every row
    pub fn from_rows<const W: usize>(rows: &[[f64; W]]) -> FieldStats {
        FieldStats::from_samples(rows.iter().flat_map(|row| row.iter().copied()))
    }

    /// `[mean - 2.5σ, mean + 2.5σ]`
    pub fn display_range(&self) -> (f64, f64) {
        let half = self.std_dev * CLIP_SIGMAS;
        (self.mean - half, self.mean + half)
    }

    /// Map a sample into `[0, 1]`, clipping outside the display range
    pub fn normalize(&self, value: f64) -> f64 {
        let (min, max) = self.display_range();
        let half = self.std_dev * CLIP_SIGMAS;
        if value < min {
            0.0
        } else if value > max {
            1.0
        } else if half > 0.0 {
            // same as (value - min) / (max - min), but exact at the mean
            (0.5 + (value - self.mean) / (2.0 * half)).clamp(0.0, 1.0)
        } else {
            0.5
        }
    }
}

/// Normalized value to hue, in degrees
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HueMap {
    /// `240·(1 − v)`, used for mesh cells
    Linear,
    /// `240·(1 − v²)`, used for streamline points
    Quadratic,
}

impl HueMap {
    pub fn hue_degrees(self, v: f64) -> f64 {
        match self {
            HueMap::Linear => HUE_SPAN_DEGREES * (1.0 - v),
            HueMap::Quadratic => HUE_SPAN_DEGREES * (1.0 - v * v),
        }
    }
}

/// Standard six-sector HSV to RGB; hue in degrees, s and v in `[0, 1]`
pub fn hsv_to_rgb(hue: f64, s: f64, v: f64) -> [f64; 3] {
    if s <= 0.0 {
        return [v, v, v];
    }

    let h = hue.rem_euclid(360.0) / 60.0;
    let sector = h.floor();
    let f = h - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    match sector as u8 {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}

/// Color each component independently and average the results
pub fn sample_color(stats: &FieldStats, components: &[f64], hue: HueMap, alpha: u8) -> ColorSample {
    if components.is_empty() {
        return ColorSample::new(0, 0, 0, alpha);
    }

    let mut sum = [0.0; 3];
    for &value in components {
        let rgb = hsv_to_rgb(hue.hue_degrees(stats.normalize(value)), 1.0, 1.0);
        for (acc, channel) in sum.iter_mut().zip(rgb) {
            *acc += channel;
        }
    }

    let n = components.len() as f64;
    ColorSample::from_unit_rgb([sum[0] / n, sum[1] / n, sum[2] / n], alpha)
}

/// One color per cell from a scalar or vector cell field
pub fn cell_colors(field: &CellField, hue: HueMap) -> Vec<ColorSample> {
    let stats = match field {
        CellField::Scalar(rows) => FieldStats::from_rows(rows.rows()),
        CellField::Vector(rows) => FieldStats::from_rows(rows.rows()),
    };
    (0..field.len())
        .filter_map(|index| field.cell(index))
        .map(|components| sample_color(&stats, components, hue, 255))
        .collect()
}

fn average(a: ColorSample, b: ColorSample) -> ColorSample {
    let mid = |x: u8, y: u8| ((x as u16 + y as u16) / 2) as u8;
    ColorSample::new(mid(a.r, b.r), mid(a.g, b.g), mid(a.b, b.b), 255)
}

/// Internal faces average owner and neighbour; boundary faces take the owner
///
/// Cells missing from `cells` (a truncated field) count as opaque black.
pub fn face_colors(mesh: &FoamMesh, cells: &[ColorSample]) -> Vec<ColorSample> {
    let cell = |index: u32| {
        cells
            .get(index as usize)
            .copied()
            .unwrap_or(ColorSample::OPAQUE_BLACK)
    };

    (0..mesh.face_count())
        .map(|face| {
            let owner = mesh.owner_of(face).map_or(ColorSample::OPAQUE_BLACK, cell);
            match mesh.neighbour_of(face) {
                Some(neighbour) => average(owner, cell(neighbour)),
                None => ColorSample { a: 255, ..owner },
            }
        })
        .collect()
}

/// Average the colors of every face touching each vertex
pub fn vertex_colors(mesh: &FoamMesh, faces: &[ColorSample]) -> Vec<ColorSample> {
    let mut sums = vec![[0u32; 3]; mesh.vertices().len()];
    let mut counts = vec![0u32; mesh.vertices().len()];

    for (index, color) in faces.iter().enumerate().take(mesh.face_count()) {
        let Ok(labels) = mesh.face(index) else {
            continue;
        };
        for &v in labels {
            let v = v as usize;
            let (Some(sum), Some(count)) = (sums.get_mut(v), counts.get_mut(v)) else {
                continue;
            };
            sum[0] += color.r as u32;
            sum[1] += color.g as u32;
            sum[2] += color.b as u32;
            *count += 1;
        }
    }

    sums.iter()
        .zip(&counts)
        .map(|(sum, &count)| {
            if count == 0 {
                ColorSample::OPAQUE_BLACK
            } else {
                ColorSample::new(
                    (sum[0] / count) as u8,
                    (sum[1] / count) as u8,
                    (sum[2] / count) as u8,
                    255,
                )
            }
        })
        .collect()
}

/// Colors for every `stride`-th streamline point from the snapshot's own field
///
/// Points without a matching field sample come out transparent black.
pub fn point_colors(snapshot: &FoamVtkSnapshot, stride: usize, alpha: u8) -> Vec<ColorSample> {
    let stats = FieldStats::from_rows(&snapshot.magnitude.rows);
    (0..snapshot.points.len())
        .step_by(stride.max(1))
        .map(|i| match snapshot.magnitude.rows.get(i) {
            Some(row) => sample_color(&stats, row, HueMap::Quadratic, alpha),
            None => ColorSample::default(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::GrowableBuffer;
    use crate::foam::FaceList;
    use crate::vtk::PointDataset;

    #[test]
    fn test_stats_known_samples() {
        let stats = FieldStats::from_samples([1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(stats.mean, 3.0);
        assert_eq!(stats.std_dev, 2.5f64.sqrt());
        assert!((stats.std_dev - 1.581).abs() < 1e-3);
        assert_eq!(stats.count, 5);
    }

    #[test]
    fn test_stats_single_and_empty() {
        assert_eq!(FieldStats::from_samples([4.0]).std_dev, 0.0);
        assert_eq!(FieldStats::from_samples(Vec::<f64>::new()).count, 0);
    }

    #[test]
    fn test_normalize_clipping() {
        let stats = FieldStats::from_samples([1.0, 2.0, 3.0, 4.0, 5.0]);
        let sigma = stats.std_dev;
        assert_eq!(stats.normalize(stats.mean + 3.0 * sigma), 1.0);
        assert_eq!(stats.normalize(stats.mean - 3.0 * sigma), 0.0);
        assert_eq!(stats.normalize(stats.mean), 0.5);
    }

    #[test]
    fn test_normalize_zero_width_range() {
        let stats = FieldStats::from_samples([2.0, 2.0, 2.0]);
        assert_eq!(stats.normalize(2.0), 0.5);
        assert_eq!(stats.normalize(2.5), 1.0);
    }

    #[test]
    fn test_hue_maps() {
        assert_eq!(HueMap::Linear.hue_degrees(0.0), 240.0);
        assert_eq!(HueMap::Linear.hue_degrees(1.0), 0.0);
        assert_eq!(HueMap::Linear.hue_degrees(0.5), 120.0);
        assert_eq!(HueMap::Quadratic.hue_degrees(0.5), 180.0);
    }

    #[test]
    fn test_hsv_sectors() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), [1.0, 0.0, 0.0]);
        assert_eq!(hsv_to_rgb(120.0, 1.0, 1.0), [0.0, 1.0, 0.0]);
        assert_eq!(hsv_to_rgb(240.0, 1.0, 1.0), [0.0, 0.0, 1.0]);
        assert_eq!(hsv_to_rgb(180.0, 1.0, 1.0), [0.0, 1.0, 1.0]);
        assert_eq!(hsv_to_rgb(300.0, 0.0, 0.25), [0.25, 0.25, 0.25]);
    }

    #[test]
    fn test_sample_color_averages_components() {
        let stats = FieldStats::from_samples([0.0, 1.0, 2.0, 3.0, 4.0]);
        // far below gives blue, far above gives red
        let c = sample_color(&stats, &[-100.0, 100.0], HueMap::Linear, 255);
        assert_eq!(c, ColorSample::new(128, 0, 128, 255));
    }

    fn two_cell_mesh() -> FoamMesh {
        let vertices: GrowableBuffer<f64, 3> = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [5.0, 5.0, 5.0],
        ]
        .into_iter()
        .collect();
        let faces = FaceList {
            faces: vec![[0, 1, 2, 3], [0, 1, 2, 2]].into_iter().collect(),
            arity: vec![4, 3],
            truncated: 0,
        };
        FoamMesh::from_parts(vertices, faces, vec![0, 1], vec![1]).unwrap()
    }

    #[test]
    fn test_face_and_vertex_propagation() {
        let mesh = two_cell_mesh();
        let cells = [
            ColorSample::new(200, 0, 0, 255),
            ColorSample::new(0, 0, 100, 255),
        ];
        let faces = face_colors(&mesh, &cells);
        assert_eq!(faces[0], ColorSample::new(100, 0, 50, 255));
        assert_eq!(faces[1], cells[1]);

        let verts = vertex_colors(&mesh, &faces);
        // vertex 0 touches both faces, vertex 3 only the first
        assert_eq!(verts[0], ColorSample::new(50, 0, 75, 255));
        assert_eq!(verts[3], faces[0]);
        // vertex 4 is not referenced
        assert_eq!(verts[4], ColorSample::OPAQUE_BLACK);
    }

    #[test]
    fn test_short_cell_list_renders_black() {
        let mesh = two_cell_mesh();
        let faces = face_colors(&mesh, &[ColorSample::new(200, 0, 0, 255)]);
        // face 0 averages cell 0 with the missing cell 1
        assert_eq!(faces[0], ColorSample::new(100, 0, 0, 255));
        assert_eq!(faces[1], ColorSample::OPAQUE_BLACK);

        let verts = vertex_colors(&mesh, &faces[..1]);
        assert_eq!(verts[3], faces[0]);
        assert_eq!(verts[4], ColorSample::OPAQUE_BLACK);
    }

    #[test]
    fn test_scalar_cell_colors() {
        let field = CellField::Scalar([[0.0], [1.0], [2.0]].into_iter().collect());
        let colors = cell_colors(&field, HueMap::Linear);
        assert_eq!(colors.len(), 3);
        // the middle cell sits at the mean: hue 120, pure green
        assert_eq!(colors[1], ColorSample::new(0, 255, 0, 255));
        assert!(colors[0].b > colors[0].r);
        assert!(colors[2].r > colors[2].b);
    }

    #[test]
    fn test_cell_colors_extremes() {
        let field = CellField::Vector(std::iter::repeat_n([0.0; 3], 9).chain([[1000.0; 3]]).collect());
        let colors = cell_colors(&field, HueMap::Linear);
        assert_eq!(colors.len(), 10);
        // the outlier sits above mean + 2.5σ and clips to red
        assert_eq!(colors[9], ColorSample::new(255, 0, 0, 255));
    }

    #[test]
    fn test_point_colors_stride() {
        let snapshot = FoamVtkSnapshot {
            points: PointDataset::new(5, vec![[0.0; 3]; 5]),
            magnitude: PointDataset::new(3, vec![[1.0; 3], [2.0; 3], [3.0; 3]]),
            line_topology: Vec::new(),
            depth: 2,
        };
        let colors = point_colors(&snapshot, 2, POINT_ALPHA);
        assert_eq!(colors.len(), 3);
        assert_eq!(colors[0].a, POINT_ALPHA);
        assert_eq!(colors[2], ColorSample::default());
    }
}
