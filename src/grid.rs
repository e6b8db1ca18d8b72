use glam::Vec3;

use crate::Atom;
use crate::Error;
use crate::SurfaceKind;
use crate::SurfaceOptions;

/// Voxel lies inside some probe-inflated sphere (occupancy pass).
pub(crate) const INOUT: u8 = 1;
/// Voxel is inside for the surface kind being built (the final field).
pub(crate) const ISDONE: u8 = 2;
/// Voxel is on the active boundary (transient during the EDT).
pub(crate) const ISBOUND: u8 = 4;

/// Voxels per world unit when no voxel size is requested.
const DEFAULT_SCALE: f32 = 2.0;
/// Extents with a larger bounding volume than this get the halved scale.
const LARGE_EXTENT_VOLUME: f32 = 1e6;
/// Padding in voxels added around the inflated extent.
const MARGIN_VOXELS: f32 = 5.5;

/// Hard ceiling on grid allocation. Beyond this the caller should retry with
/// a larger voxel size.
pub const MAX_GRID_VOXELS: u64 = 1 << 28;

/// The 26-neighborhood in the canonical order: face neighbors, then edge
/// neighbors, then corner neighbors. EDT propagation visits neighbors in this
/// order, which fixes tie-breaks and makes output reproducible.
pub(crate) const NEIGHBORS_26: [[i32; 3]; 26] = [
    [1, 0, 0],
    [-1, 0, 0],
    [0, 1, 0],
    [0, -1, 0],
    [0, 0, 1],
    [0, 0, -1],
    [1, 1, 0],
    [1, -1, 0],
    [-1, 1, 0],
    [-1, -1, 0],
    [1, 0, 1],
    [1, 0, -1],
    [-1, 0, 1],
    [-1, 0, -1],
    [0, 1, 1],
    [0, 1, -1],
    [0, -1, 1],
    [0, -1, -1],
    [1, 1, 1],
    [1, 1, -1],
    [1, -1, 1],
    [-1, 1, 1],
    [1, -1, -1],
    [-1, -1, 1],
    [-1, 1, -1],
    [-1, -1, -1],
];

/// Scaled-integer voxelization of one engine invocation.
///
/// World point `p` maps to grid coordinate `scale * (p + translation)`; a
/// grid unit is `1/scale` world units. The three side arrays share the
/// linear index `(i, j, k) -> (i * ny + j) * nz + k`.
#[derive(Debug)]
pub(crate) struct VoxelGrid {
    scale: f32,
    translation: Vec3,
    nx: usize,
    ny: usize,
    nz: usize,
    pub(crate) bits: Vec<u8>,
    pub(crate) dist: Vec<f64>,
    pub(crate) atom_id: Vec<i32>,
}

impl VoxelGrid {
    /// Sizes and allocates the grid for the given atoms (§ extent setup):
    /// inflate the bounding box by each atom's radius (plus probe for
    /// probe-inflated kinds), pad by the margin, snap to the voxel lattice.
    pub(crate) fn new(
        atoms: &[Atom],
        kind: SurfaceKind,
        options: &SurfaceOptions,
    ) -> Result<Self, Error> {
        if atoms.is_empty() {
            return Err(Error::EmptyInput);
        }

        let probe = if kind.uses_probe() {
            options.probe_radius
        } else {
            0.0
        };

        let mut pmin = Vec3::splat(f32::INFINITY);
        let mut pmax = Vec3::splat(f32::NEG_INFINITY);
        for atom in atoms {
            let inflate = Vec3::splat(atom.radius + probe);
            pmin = pmin.min(atom.center() - inflate);
            pmax = pmax.max(atom.center() + inflate);
        }

        let scale = match options.voxel_size {
            Some(voxel_size) => (1.0 / voxel_size).round().max(1.0),
            None => {
                let size = pmax - pmin;
                if size.x * size.y * size.z > LARGE_EXTENT_VOLUME {
                    DEFAULT_SCALE / 2.0
                } else {
                    DEFAULT_SCALE
                }
            }
        };

        let pad = Vec3::splat(MARGIN_VOXELS / scale + probe);
        let pmin = (((pmin - pad) * scale).floor()) / scale;
        let pmax = (((pmax + pad) * scale).ceil()) / scale;

        let nx = (scale * (pmax.x - pmin.x)).ceil() as usize + 1;
        let ny = (scale * (pmax.y - pmin.y)).ceil() as usize + 1;
        let nz = (scale * (pmax.z - pmin.z)).ceil() as usize + 1;

        let voxels = nx as u64 * ny as u64 * nz as u64;
        if voxels > MAX_GRID_VOXELS {
            return Err(Error::AllocationFailure(voxels));
        }
        let voxels = voxels as usize;

        log::debug!(
            "grid {nx}x{ny}x{nz} at {scale} voxels/unit for {} atoms",
            atoms.len()
        );

        Ok(Self {
            scale,
            translation: -pmin,
            nx,
            ny,
            nz,
            bits: vec![0; voxels],
            dist: vec![-1.0; voxels],
            atom_id: vec![-1; voxels],
        })
    }

    pub(crate) fn scale(&self) -> f32 {
        self.scale
    }

    pub(crate) fn dims(&self) -> [usize; 3] {
        [self.nx, self.ny, self.nz]
    }

    #[inline]
    pub(crate) fn index(&self, i: usize, j: usize, k: usize) -> usize {
        debug_assert!(i < self.nx && j < self.ny && k < self.nz);
        (i * self.ny + j) * self.nz + k
    }

    #[inline]
    pub(crate) fn contains(&self, i: i32, j: i32, k: i32) -> bool {
        i >= 0
            && j >= 0
            && k >= 0
            && (i as usize) < self.nx
            && (j as usize) < self.ny
            && (k as usize) < self.nz
    }

    /// Grid coordinate of a world point.
    #[inline]
    pub(crate) fn grid_from_world(&self, p: Vec3) -> Vec3 {
        self.scale * (p + self.translation)
    }

    /// World coordinate of a grid point.
    #[inline]
    pub(crate) fn world_from_grid(&self, g: Vec3) -> Vec3 {
        g / self.scale - self.translation
    }

    /// Inside flag of a node, outside-of-grid nodes read as outside.
    #[inline]
    pub(crate) fn inside(&self, i: i32, j: i32, k: i32) -> bool {
        self.contains(i, j, k)
            && self.bits[self.index(i as usize, j as usize, k as usize)] & ISDONE != 0
    }

    /// Trilinear interpolation of the binary inside field at a grid-space
    /// point. Coordinates are clamped to the node lattice.
    pub(crate) fn sample_inside(&self, p: Vec3) -> f32 {
        debug_assert!(self.nx >= 2 && self.ny >= 2 && self.nz >= 2);
        let fx = p.x.clamp(0.0, (self.nx - 1) as f32);
        let fy = p.y.clamp(0.0, (self.ny - 1) as f32);
        let fz = p.z.clamp(0.0, (self.nz - 1) as f32);

        let ix = (fx as usize).min(self.nx - 2);
        let iy = (fy as usize).min(self.ny - 2);
        let iz = (fz as usize).min(self.nz - 2);

        let tx = fx - ix as f32;
        let ty = fy - iy as f32;
        let tz = fz - iz as f32;

        let f = |di: usize, dj: usize, dk: usize| -> f32 {
            if self.bits[self.index(ix + di, iy + dj, iz + dk)] & ISDONE != 0 {
                1.0
            } else {
                0.0
            }
        };

        let c00 = f(0, 0, 0) * (1.0 - tx) + f(1, 0, 0) * tx;
        let c10 = f(0, 1, 0) * (1.0 - tx) + f(1, 1, 0) * tx;
        let c01 = f(0, 0, 1) * (1.0 - tx) + f(1, 0, 1) * tx;
        let c11 = f(0, 1, 1) * (1.0 - tx) + f(1, 1, 1) * tx;

        let c0 = c00 * (1.0 - ty) + c10 * ty;
        let c1 = c01 * (1.0 - ty) + c11 * ty;

        c0 * (1.0 - tz) + c1 * tz
    }

    /// Central-difference gradient of the interpolated inside field. Points
    /// toward increasing insideness, so the outward direction is its
    /// negation.
    pub(crate) fn inside_gradient(&self, p: Vec3) -> Vec3 {
        const H: f32 = 0.5;
        Vec3::new(
            self.sample_inside(p + H * Vec3::X) - self.sample_inside(p - H * Vec3::X),
            self.sample_inside(p + H * Vec3::Y) - self.sample_inside(p - H * Vec3::Y),
            self.sample_inside(p + H * Vec3::Z) - self.sample_inside(p - H * Vec3::Z),
        )
    }

    /// Collapses the working bits into the single inside field in ISDONE.
    /// After this, INOUT and ISBOUND carry no meaning.
    pub(crate) fn finalize_field(&mut self, kind: SurfaceKind) {
        match kind {
            // The rasterizer already left the inside field in ISDONE.
            SurfaceKind::Vdw | SurfaceKind::Sas => {
                for bits in &mut self.bits {
                    *bits &= !ISBOUND;
                }
            }
            // The carved band in ISBOUND is the solvent-excluded solid.
            SurfaceKind::Ses => {
                for bits in &mut self.bits {
                    *bits = if *bits & ISBOUND != 0 {
                        (*bits | ISDONE) & !ISBOUND
                    } else {
                        *bits & !(ISDONE | ISBOUND)
                    };
                }
            }
        }
    }
}
