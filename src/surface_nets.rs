use glam::Vec3;

use crate::grid::VoxelGrid;

/// Cell corners in (dx, dy, dz) order; the corner index doubles as a bit
/// pattern with x as the high bit.
pub(crate) const CUBE_CORNERS: [[i32; 3]; 8] = [
    [0, 0, 0],
    [0, 0, 1],
    [0, 1, 0],
    [0, 1, 1],
    [1, 0, 0],
    [1, 0, 1],
    [1, 1, 0],
    [1, 1, 1],
];

/// The 12 cube edges as corner index pairs.
const CUBE_EDGES: [[usize; 2]; 12] = [
    [0, 1],
    [0, 2],
    [0, 4],
    [1, 3],
    [1, 5],
    [2, 3],
    [2, 6],
    [3, 7],
    [4, 5],
    [4, 6],
    [5, 7],
    [6, 7],
];

/// Raw extractor output, still in grid coordinates and with quad winding not
/// yet settled.
pub(crate) struct Extraction {
    /// One vertex per sign-changing cell, at the centroid of its mid-edge
    /// crossings.
    pub vertices: Vec<Vec3>,
    /// Generating cell of each vertex.
    pub cells: Vec<[u32; 3]>,
    /// Triangle indices, two triangles per stitched quad.
    pub indices: Vec<u32>,
}

/// Extracts the isosurface of the binary inside field: one vertex per cell
/// whose corners disagree, quads stitched across the cell's negative faces,
/// each split into two triangles.
pub(crate) fn extract(grid: &VoxelGrid) -> Extraction {
    let [nx, ny, nz] = grid.dims();
    let (cx, cy, cz) = (nx - 1, ny - 1, nz - 1);

    // Dense cell -> vertex map; -1 marks cells without a crossing.
    let mut cell_vertex = vec![-1i32; cx * cy * cz];
    let cell_index = |i: usize, j: usize, k: usize| (i * cy + j) * cz + k;

    let mut vertices = Vec::new();
    let mut cells = Vec::new();

    for i in 0..cx {
        for j in 0..cy {
            for k in 0..cz {
                let mut flags = [false; 8];
                let mut inside_count = 0;
                for (f, c) in flags.iter_mut().zip(&CUBE_CORNERS) {
                    *f = grid.inside(i as i32 + c[0], j as i32 + c[1], k as i32 + c[2]);
                    inside_count += usize::from(*f);
                }
                if inside_count == 0 || inside_count == 8 {
                    continue;
                }

                // Average the midpoints of all sign-changing edges.
                let mut sum = Vec3::ZERO;
                let mut crossings = 0;
                for [a, b] in &CUBE_EDGES {
                    if flags[*a] != flags[*b] {
                        let pa = CUBE_CORNERS[*a];
                        let pb = CUBE_CORNERS[*b];
                        sum += 0.5
                            * Vec3::new(
                                (pa[0] + pb[0]) as f32,
                                (pa[1] + pb[1]) as f32,
                                (pa[2] + pb[2]) as f32,
                            );
                        crossings += 1;
                    }
                }
                debug_assert!(crossings > 0);

                cell_vertex[cell_index(i, j, k)] = vertices.len() as i32;
                vertices.push(Vec3::new(i as f32, j as f32, k as f32) + sum / crossings as f32);
                cells.push([i as u32, j as u32, k as u32]);
            }
        }
    }

    // Stitch quads toward the already-visited side. Each face quad joins the
    // four cells around a shared grid edge; it is emitted only when all four
    // produced a vertex.
    let mut indices = Vec::new();
    let emit_quad = |corner_cells: [[usize; 3]; 4], indices: &mut Vec<u32>| {
        let mut quad = [0u32; 4];
        for (slot, [ci, cj, ck]) in quad.iter_mut().zip(&corner_cells) {
            let v = cell_vertex[cell_index(*ci, *cj, *ck)];
            if v < 0 {
                return;
            }
            *slot = v as u32;
        }
        let [a, b, c, d] = quad;
        indices.extend_from_slice(&[a, b, c, a, c, d]);
    };

    for cell in &cells {
        let [i, j, k] = [cell[0] as usize, cell[1] as usize, cell[2] as usize];
        if i > 0 && k > 0 {
            emit_quad(
                [[i, j, k], [i - 1, j, k], [i - 1, j, k - 1], [i, j, k - 1]],
                &mut indices,
            );
        }
        if j > 0 && k > 0 {
            emit_quad(
                [[i, j, k], [i, j - 1, k], [i, j - 1, k - 1], [i, j, k - 1]],
                &mut indices,
            );
        }
        if i > 0 && j > 0 {
            emit_quad(
                [[i, j, k], [i - 1, j, k], [i - 1, j - 1, k], [i, j - 1, k]],
                &mut indices,
            );
        }
    }

    Extraction {
        vertices,
        cells,
        indices,
    }
}
