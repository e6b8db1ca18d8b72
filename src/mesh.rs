use glam::Vec3;

use crate::grid::{VoxelGrid, ISDONE};
use crate::surface_nets::{Extraction, CUBE_CORNERS};

/// Renderer-ready surface buffers.
///
/// `indices` triples are wound counter-clockwise seen from outside the
/// surface; `atom_index` gives the input atom owning each vertex.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "with_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SurfaceMesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    pub atom_index: Vec<u32>,
}

impl SurfaceMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Convert the mesh to an OBJ file.
    pub fn to_obj(&self) -> String {
        use std::fmt::Write as FmtWrite;

        let mut s = String::new();
        writeln!(&mut s, "# Generated by the molsurf library").unwrap();

        writeln!(&mut s, "\n# Vertex positions:").unwrap();
        for p in &self.positions {
            writeln!(&mut s, "v {} {} {}", p[0], p[1], p[2]).unwrap();
        }

        writeln!(&mut s, "\n# Vertex normals:").unwrap();
        assert_eq!(self.positions.len(), self.normals.len());
        for n in &self.normals {
            writeln!(&mut s, "vn {} {} {}", n[0], n[1], n[2]).unwrap();
        }

        writeln!(&mut s, "\n# Triangle faces:").unwrap();
        assert_eq!(self.indices.len() % 3, 0);
        for t in self.indices.chunks(3) {
            // OBJ face indices are 1-based.
            writeln!(&mut s, "f {} {} {}", t[0] + 1, t[1] + 1, t[2] + 1).unwrap();
        }

        writeln!(&mut s, "\n# End of obj file.").unwrap();

        s
    }
}

/// Copies atom attribution out of the grid, reprojects vertices to world
/// units and computes smooth normals. The grid is no longer needed afterward.
pub(crate) fn finalize(grid: &VoxelGrid, atom_count: usize, ext: Extraction) -> SurfaceMesh {
    let atom_index = attribute_atoms(grid, &ext, atom_count);
    let positions = world_positions(grid, &ext.vertices);
    let normals = smooth_normals(&positions, &ext.indices);

    SurfaceMesh {
        positions,
        normals,
        indices: ext.indices,
        atom_index,
    }
}

/// Owning atom per vertex: the nearest grid node's assignment, or the first
/// inside corner of the generating cell when that node is unassigned.
fn attribute_atoms(grid: &VoxelGrid, ext: &Extraction, atom_count: usize) -> Vec<u32> {
    ext.vertices
        .iter()
        .zip(&ext.cells)
        .map(|(v, cell)| {
            let (i, j, k) = (v.x.round() as i32, v.y.round() as i32, v.z.round() as i32);
            let mut id = if grid.contains(i, j, k) {
                grid.atom_id[grid.index(i as usize, j as usize, k as usize)]
            } else {
                -1
            };
            if id < 0 {
                for corner in &CUBE_CORNERS {
                    let idx = grid.index(
                        cell[0] as usize + corner[0] as usize,
                        cell[1] as usize + corner[1] as usize,
                        cell[2] as usize + corner[2] as usize,
                    );
                    if grid.bits[idx] & ISDONE != 0 && grid.atom_id[idx] >= 0 {
                        id = grid.atom_id[idx];
                        break;
                    }
                }
            }
            let id = id.max(0) as u32;
            debug_assert!((id as usize) < atom_count);
            id
        })
        .collect()
}

fn world_positions(grid: &VoxelGrid, vertices: &[Vec3]) -> Vec<[f32; 3]> {
    #[cfg(feature = "with_rayon")]
    {
        use rayon::prelude::*;

        vertices
            .par_iter()
            .map(|v| grid.world_from_grid(*v).into())
            .collect()
    }

    #[cfg(not(feature = "with_rayon"))]
    {
        vertices
            .iter()
            .map(|v| grid.world_from_grid(*v).into())
            .collect()
    }
}

/// Area-weighted smooth normals: each triangle adds its unnormalized cross
/// product to its three vertices, accumulators are normalized at the end.
/// Vertices untouched by any triangle keep the zero vector.
fn smooth_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut accum = vec![Vec3::ZERO; positions.len()];

    for tri in indices.chunks_exact(3) {
        let a = Vec3::from(positions[tri[0] as usize]);
        let b = Vec3::from(positions[tri[1] as usize]);
        let c = Vec3::from(positions[tri[2] as usize]);
        let n = (b - a).cross(c - a);
        accum[tri[0] as usize] += n;
        accum[tri[1] as usize] += n;
        accum[tri[2] as usize] += n;
    }

    let normalize = |n: &mut Vec3| {
        let len_sq = n.length_squared();
        if len_sq > 0.0 {
            *n /= len_sq.sqrt();
        }
    };

    #[cfg(feature = "with_rayon")]
    {
        use rayon::prelude::*;

        accum.par_iter_mut().for_each(normalize);
    }

    #[cfg(not(feature = "with_rayon"))]
    {
        accum.iter_mut().for_each(normalize);
    }

    accum.into_iter().map(Into::into).collect()
}
