//! Render-ready geometry for one timestep

use crate::case::Timestep;
use crate::color::{self, ColorSample, HueMap, POINT_ALPHA};
use crate::foam::FoamMesh;
use crate::vtk::FoamVtkSnapshot;

pub const DEFAULT_POSITION_SCALE: f64 = 80.0;
pub const DEFAULT_POINT_SIZE: f64 = 5.0;
pub const DEFAULT_STRIDE: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameOptions {
    pub mesh_scale: f64,
    pub point_scale: f64,
    /// Keep every `stride`-th streamline point
    pub stride: usize,
    /// Exchange y and z so the solver's vertical axis points up
    pub swap_yz: bool,
    pub point_alpha: u8,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            mesh_scale: DEFAULT_POSITION_SCALE * DEFAULT_POINT_SIZE,
            point_scale: DEFAULT_POSITION_SCALE,
            stride: DEFAULT_STRIDE,
            swap_yz: true,
            point_alpha: POINT_ALPHA,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Frame {
    pub timestep: Timestep,
    pub vertices: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    pub face_colors: Vec<ColorSample>,
    pub vertex_colors: Vec<ColorSample>,
    pub points: Vec<[f32; 3]>,
    pub point_colors: Vec<ColorSample>,
}

impl Frame {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

fn place(row: &[f64; 3], scale: f64, swap_yz: bool) -> [f32; 3] {
    let [x, y, z] = row.map(|c| (c * scale) as f32);
    if swap_yz { [x, z, y] } else { [x, y, z] }
}

/// Combine the mesh, its cell field for `timestep` and the streamline snapshot
///
/// A timestep without a loaded cell field renders opaque black. A missing
/// snapshot (the track file failed to parse) renders the mesh alone.
pub fn build_frame(
    mesh: &FoamMesh,
    snapshot: Option<&FoamVtkSnapshot>,
    timestep: &Timestep,
    options: &FrameOptions,
) -> Frame {
    let vertices = mesh
        .vertices()
        .iter()
        .map(|row| place(row, options.mesh_scale, options.swap_yz))
        .collect();

    let (face_colors, vertex_colors) = match mesh.field(timestep) {
        Some(field) => {
            let cells = color::cell_colors(field, HueMap::Linear);
            let faces = color::face_colors(mesh, &cells);
            let vertices = color::vertex_colors(mesh, &faces);
            (faces, vertices)
        }
        None => (
            vec![ColorSample::OPAQUE_BLACK; mesh.face_count()],
            vec![ColorSample::OPAQUE_BLACK; mesh.vertices().len()],
        ),
    };

    let stride = options.stride.max(1);
    let (points, point_colors) = match snapshot {
        Some(snapshot) => (
            snapshot
                .points
                .rows
                .iter()
                .step_by(stride)
                .map(|row| place(row, options.point_scale, options.swap_yz))
                .collect(),
            color::point_colors(snapshot, stride, options.point_alpha),
        ),
        None => (Vec::new(), Vec::new()),
    };

    Frame {
        timestep: timestep.clone(),
        vertices,
        indices: mesh.face_vertex_indices().flat().collect(),
        face_colors,
        vertex_colors,
        points,
        point_colors,
    }
}
