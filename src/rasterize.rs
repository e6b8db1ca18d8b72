use ahash::AHashMap;

use crate::grid::{VoxelGrid, INOUT, ISDONE};
use crate::Atom;

/// Depth columns of one rasterized sphere.
///
/// `depth[j * half_width + k]` is the maximum offset along the swept axis for
/// the column at lateral offsets `(j, k)`, or -1 when the column misses the
/// sphere. Iterating columns instead of cells keeps the fill at O(w²) per
/// octant.
struct SphereTemplate {
    half_width: i32,
    depth: Vec<i32>,
}

impl SphereTemplate {
    fn build(scaled_radius: f32) -> Self {
        let half_width = (scaled_radius + 0.5).floor() as i32 + 1;
        let w = half_width as usize;
        let sq = scaled_radius * scaled_radius;
        let mut depth = vec![-1; w * w];
        for j in 0..w {
            for k in 0..w {
                let lateral = (j * j + k * k) as f32;
                if lateral <= sq {
                    depth[j * w + k] = (sq - lateral).sqrt().floor() as i32;
                }
            }
        }
        Self { half_width, depth }
    }
}

/// Grid node nearest the atom center.
fn center_voxel(grid: &VoxelGrid, atom: &Atom) -> [i32; 3] {
    let g = grid.grid_from_world(atom.center());
    [
        (0.5 + g.x).floor() as i32,
        (0.5 + g.y).floor() as i32,
        (0.5 + g.z).floor() as i32,
    ]
}

/// Marks INOUT for every voxel inside some probe-inflated atom sphere, then
/// mirrors the occupancy into ISDONE (the starting field for SAS and SES).
pub(crate) fn fill_inflated(grid: &mut VoxelGrid, atoms: &[Atom], probe: f32) {
    fill(grid, atoms, probe, INOUT);
    for bits in &mut grid.bits {
        if *bits & INOUT != 0 {
            *bits |= ISDONE;
        }
    }
}

/// Marks ISDONE for every voxel inside some bare atom sphere (the VDW field,
/// no probe inflation).
pub(crate) fn fill_vdw(grid: &mut VoxelGrid, atoms: &[Atom]) {
    fill(grid, atoms, 0.0, ISDONE);
}

fn fill(grid: &mut VoxelGrid, atoms: &[Atom], probe: f32, flag: u8) {
    let scale = grid.scale();
    let centers: Vec<[i32; 3]> = atoms.iter().map(|a| center_voxel(grid, a)).collect();

    // Templates are shared between atoms whose scaled radii round to the
    // same key; the first such atom builds the template.
    let mut templates: AHashMap<u32, SphereTemplate> = AHashMap::new();

    for (id, atom) in atoms.iter().enumerate() {
        let scaled_radius = (atom.radius + probe) * scale;
        let key = (scaled_radius + 0.5).round() as u32;
        let template = templates
            .entry(key)
            .or_insert_with(|| SphereTemplate::build(scaled_radius));
        fill_atom(grid, template, &centers, id, flag);
    }
}

fn fill_atom(
    grid: &mut VoxelGrid,
    template: &SphereTemplate,
    centers: &[[i32; 3]],
    id: usize,
    flag: u8,
) {
    let [cx, cy, cz] = centers[id];
    let w = template.half_width;

    for j in 0..w {
        for k in 0..w {
            let d = template.depth[(j * w + k) as usize];
            if d < 0 {
                continue;
            }
            // Only the eight strict-corner octants are swept; the face- and
            // edge-aligned ones must stay excluded. The j = 0 and k = 0
            // columns cover the axis planes.
            for ii in [-1i32, 0, 1] {
                for jj in [-1i32, 0, 1] {
                    for kk in [-1i32, 0, 1] {
                        if ii == 0 || jj == 0 || kk == 0 {
                            continue;
                        }
                        let mi = ii * j;
                        let mk = kk * k;
                        for i in 0..=d {
                            let mj = jj * i;
                            let (si, sj, sk) = (cx + mi, cy + mj, cz + mk);
                            if !grid.contains(si, sj, sk) {
                                continue;
                            }
                            let idx = grid.index(si as usize, sj as usize, sk as usize);
                            if grid.bits[idx] & flag == 0 {
                                grid.bits[idx] |= flag;
                                grid.atom_id[idx] = id as i32;
                            } else {
                                let owner = grid.atom_id[idx];
                                if owner < 0 {
                                    grid.atom_id[idx] = id as i32;
                                } else if owner != id as i32 {
                                    // The nearer atom (by squared offset from
                                    // its center node) claims the voxel;
                                    // exact ties keep the earlier atom.
                                    let [ox, oy, oz] = centers[owner as usize];
                                    let d_new = mi * mi + mj * mj + mk * mk;
                                    let d_old = (si - ox) * (si - ox)
                                        + (sj - oy) * (sj - oy)
                                        + (sk - oz) * (sk - oz);
                                    if d_new < d_old {
                                        grid.atom_id[idx] = id as i32;
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}
