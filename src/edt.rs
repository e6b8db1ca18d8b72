use crate::grid::{VoxelGrid, INOUT, ISBOUND, ISDONE, NEIGHBORS_26};

/// Marks every occupied voxel with an unoccupied 26-neighbor as a boundary
/// seed for the distance transform.
pub(crate) fn build_boundary(grid: &mut VoxelGrid) {
    let [nx, ny, nz] = grid.dims();
    for i in 0..nx {
        for j in 0..ny {
            for k in 0..nz {
                let idx = grid.index(i, j, k);
                if grid.bits[idx] & INOUT == 0 {
                    continue;
                }
                for nb in &NEIGHBORS_26 {
                    // Offset components map to the (i, k, j) axis order; the
                    // swap must be kept as is to reproduce reference output.
                    let ti = i as i32 + nb[0];
                    let tj = j as i32 + nb[2];
                    let tk = k as i32 + nb[1];
                    if grid.contains(ti, tj, tk)
                        && grid.bits[grid.index(ti as usize, tj as usize, tk as usize)] & INOUT
                            == 0
                    {
                        grid.bits[idx] |= ISBOUND;
                        break;
                    }
                }
            }
        }
    }
}

/// Propagates squared Euclidean distances inward from the boundary seeds and
/// re-tags ISBOUND as "solvent-excluded solid": every occupied voxel deeper
/// than the probe radius, plus everything the propagation never reached.
pub(crate) fn carve_depth(grid: &mut VoxelGrid, probe: f32) {
    let [nx, ny, nz] = grid.dims();
    let cut = f64::from(grid.scale() * probe);
    let cut_sq = cut * cut;
    // Propagation runs slightly past the probe depth so the shell straddling
    // the cutoff is fully populated.
    let keep_limit = 1.0404 * cut_sq;

    let mut bound_point = vec![[0i32; 3]; grid.bits.len()];
    let mut frontier: Vec<[i32; 3]> = Vec::new();

    for i in 0..nx {
        for j in 0..ny {
            for k in 0..nz {
                let idx = grid.index(i, j, k);
                grid.bits[idx] &= !ISDONE;
                if grid.bits[idx] & INOUT != 0 && grid.bits[idx] & ISBOUND != 0 {
                    let p = [i as i32, j as i32, k as i32];
                    bound_point[idx] = p;
                    grid.dist[idx] = 0.0;
                    grid.bits[idx] |= ISDONE;
                    grid.bits[idx] &= !ISBOUND;
                    frontier.push(p);
                }
            }
        }
    }

    let mut shells = 0usize;
    while !frontier.is_empty() {
        shells += 1;
        let reached = propagate_shell(grid, &mut bound_point, &frontier);
        frontier.clear();
        for p in reached {
            let idx = grid.index(p[0] as usize, p[1] as usize, p[2] as usize);
            grid.bits[idx] &= !ISBOUND;
            if grid.dist[idx] <= keep_limit {
                frontier.push(p);
            }
        }
    }
    log::debug!("distance field settled after {shells} shells");

    let cutsf = f64::from((grid.scale() - 0.5).max(0.0));
    let cutoff = cut_sq - 0.5 / (0.1 + cutsf);
    for idx in 0..grid.bits.len() {
        grid.bits[idx] &= !ISBOUND;
        if grid.bits[idx] & INOUT != 0
            && (grid.bits[idx] & ISDONE == 0 || grid.dist[idx] >= cutoff)
        {
            grid.bits[idx] |= ISBOUND;
        }
    }
}

/// One frontier expansion. Newly reached voxels inherit the source boundary
/// point of whoever reached them; already-settled voxels are tightened when a
/// strictly nearer source shows up, and re-queued only if they are not in the
/// frontier already (ISBOUND doubles as the in-frontier marker here).
fn propagate_shell(
    grid: &mut VoxelGrid,
    bound_point: &mut [[i32; 3]],
    frontier: &[[i32; 3]],
) -> Vec<[i32; 3]> {
    let mut reached = Vec::new();

    for p in frontier {
        let src = bound_point[grid.index(p[0] as usize, p[1] as usize, p[2] as usize)];
        for nb in &NEIGHBORS_26 {
            let ti = p[0] + nb[0];
            let tj = p[1] + nb[1];
            let tk = p[2] + nb[2];
            if !grid.contains(ti, tj, tk) {
                continue;
            }
            let idx = grid.index(ti as usize, tj as usize, tk as usize);
            if grid.bits[idx] & INOUT == 0 {
                continue;
            }
            let dx = f64::from(ti - src[0]);
            let dy = f64::from(tj - src[1]);
            let dz = f64::from(tk - src[2]);
            let d_sq = dx * dx + dy * dy + dz * dz;

            if grid.bits[idx] & ISDONE == 0 {
                bound_point[idx] = src;
                grid.dist[idx] = d_sq;
                grid.bits[idx] |= ISDONE | ISBOUND;
                reached.push([ti, tj, tk]);
            } else if d_sq < grid.dist[idx] {
                bound_point[idx] = src;
                grid.dist[idx] = d_sq;
                if grid.bits[idx] & ISBOUND == 0 {
                    grid.bits[idx] |= ISBOUND;
                    reached.push([ti, tj, tk]);
                }
            }
        }
    }
    reached
}
