//! Voxel-based molecular surface mesher.
//!
//! Builds closed, outward-oriented triangle meshes for the van der Waals
//! (VDW), solvent-accessible (SAS) and solvent-excluded (SES) surfaces of a
//! set of atoms. Atoms go in as `{x, y, z, radius}` tuples, meshes come out
//! as flat position/normal/index buffers with a per-vertex atom id; parsing,
//! radius tables and rendering belong to the caller.

// crate-specific exceptions:
#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod atom;
pub use atom::*;

mod grid;
pub use grid::*;

mod rasterize;

mod edt;

mod surface_nets;

mod orient;

mod mesh;
pub use mesh::*;

use grid::VoxelGrid;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("no atoms supplied")]
    EmptyInput,

    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("voxel grid of {0} cells exceeds the allocation limit")]
    AllocationFailure(u64),

    #[error("surface computation was cancelled")]
    Aborted,

    #[error("internal invariant violated: {0}")]
    InternalInvariant(&'static str),
}

/// Which molecular surface to build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "with_serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SurfaceKind {
    /// Union of the bare atom spheres.
    Vdw,
    /// Union of the probe-inflated atom spheres.
    Sas,
    /// The solvent-excluded surface: the SAS volume carved back by the probe
    /// depth through a Euclidean distance transform.
    Ses,
}

impl SurfaceKind {
    pub(crate) fn uses_probe(self) -> bool {
        match self {
            Self::Vdw => false,
            Self::Sas | Self::Ses => true,
        }
    }
}

/// Cooperative cancellation handle. Clone it, hand one clone to the engine
/// via [`SurfaceOptions::signal`] and trip it from anywhere.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Knobs of one surface computation.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "with_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SurfaceOptions {
    /// Solvent probe radius in world units. Ignored for [`SurfaceKind::Vdw`].
    pub probe_radius: f32,

    /// Target voxel edge length in world units. When set, the grid runs at
    /// `max(1, round(1 / voxel_size))` voxels per unit; when unset the grid
    /// defaults to half-unit voxels, falling back to unit voxels for very
    /// large extents.
    pub voxel_size: Option<f32>,

    /// Observed between pipeline stages only (after grid setup,
    /// rasterization, the distance transform and extraction); a running
    /// stage is never interrupted mid-way.
    #[cfg_attr(feature = "with_serde", serde(skip))]
    pub signal: Option<CancelToken>,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            probe_radius: 1.4,
            voxel_size: None,
            signal: None,
        }
    }
}

/// Van der Waals surface of the given atoms.
pub fn vdw_surface(atoms: &[Atom], options: &SurfaceOptions) -> Result<SurfaceMesh, Error> {
    build_surface(atoms, SurfaceKind::Vdw, options)
}

/// Solvent-accessible surface of the given atoms.
pub fn sas_surface(atoms: &[Atom], options: &SurfaceOptions) -> Result<SurfaceMesh, Error> {
    build_surface(atoms, SurfaceKind::Sas, options)
}

/// Solvent-excluded surface of the given atoms.
pub fn ses_surface(atoms: &[Atom], options: &SurfaceOptions) -> Result<SurfaceMesh, Error> {
    build_surface(atoms, SurfaceKind::Ses, options)
}

/// Runs the full pipeline for one surface kind. An empty atom list yields an
/// empty mesh rather than an error.
pub fn build_surface(
    atoms: &[Atom],
    kind: SurfaceKind,
    options: &SurfaceOptions,
) -> Result<SurfaceMesh, Error> {
    validate(atoms, options)?;
    if atoms.is_empty() {
        return Ok(SurfaceMesh::default());
    }

    let checkpoint = |stage: &str| -> Result<(), Error> {
        if options
            .signal
            .as_ref()
            .is_some_and(CancelToken::is_cancelled)
        {
            log::debug!("cancelled after {stage}");
            return Err(Error::Aborted);
        }
        Ok(())
    };

    let mut grid = VoxelGrid::new(atoms, kind, options)?;
    checkpoint("grid setup")?;

    match kind {
        SurfaceKind::Vdw => rasterize::fill_vdw(&mut grid, atoms),
        SurfaceKind::Sas | SurfaceKind::Ses => {
            rasterize::fill_inflated(&mut grid, atoms, options.probe_radius);
        }
    }
    checkpoint("rasterization")?;

    if kind == SurfaceKind::Ses {
        edt::build_boundary(&mut grid);
        edt::carve_depth(&mut grid, options.probe_radius);
        checkpoint("distance transform")?;
    }

    grid.finalize_field(kind);
    let mut extraction = surface_nets::extract(&grid);
    checkpoint("extraction")?;

    orient::orient_quads(&grid, &mut extraction);
    orient::drop_degenerate(&mut extraction);
    orient::orient_components(&grid, &mut extraction);

    let vertex_count = extraction.vertices.len();
    if extraction
        .indices
        .iter()
        .any(|&i| i as usize >= vertex_count)
    {
        return Err(Error::InternalInvariant("triangle index out of range"));
    }

    let mesh = mesh::finalize(&grid, atoms.len(), extraction);
    log::debug!(
        "{kind:?} surface: {} vertices, {} triangles",
        mesh.vertex_count(),
        mesh.triangle_count()
    );
    Ok(mesh)
}

fn validate(atoms: &[Atom], options: &SurfaceOptions) -> Result<(), Error> {
    atom::validate_atoms(atoms)?;
    if !options.probe_radius.is_finite() || options.probe_radius < 0.0 {
        return Err(Error::InvalidInput("probe radius must be non-negative"));
    }
    if let Some(voxel_size) = options.voxel_size {
        if !voxel_size.is_finite() || voxel_size <= 0.0 {
            return Err(Error::InvalidInput("voxel size must be positive"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn atom(x: f32, y: f32, z: f32, radius: f32) -> Atom {
        Atom::new(Vec3::new(x, y, z), radius)
    }

    fn options_with_voxel(voxel_size: f32) -> SurfaceOptions {
        SurfaceOptions {
            voxel_size: Some(voxel_size),
            ..SurfaceOptions::default()
        }
    }

    /// Signed volume enclosed by the mesh, positive for outward winding.
    fn enclosed_volume(mesh: &SurfaceMesh) -> f64 {
        let mut volume = 0.0f64;
        for tri in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [
                mesh.positions[tri[0] as usize].map(f64::from),
                mesh.positions[tri[1] as usize].map(f64::from),
                mesh.positions[tri[2] as usize].map(f64::from),
            ];
            let cross = [
                b[1] * c[2] - b[2] * c[1],
                b[2] * c[0] - b[0] * c[2],
                b[0] * c[1] - b[1] * c[0],
            ];
            volume += (a[0] * cross[0] + a[1] * cross[1] + a[2] * cross[2]) / 6.0;
        }
        volume
    }

    /// Number of connected components over shared vertices.
    fn component_count(mesh: &SurfaceMesh) -> usize {
        let n = mesh.vertex_count();
        let mut parent: Vec<usize> = (0..n).collect();
        fn find(parent: &mut Vec<usize>, mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }
        for tri in mesh.indices.chunks_exact(3) {
            let a = find(&mut parent, tri[0] as usize);
            let b = find(&mut parent, tri[1] as usize);
            let c = find(&mut parent, tri[2] as usize);
            parent[b] = a;
            parent[c] = a;
        }
        let mut roots = std::collections::BTreeSet::new();
        for &i in &mesh.indices {
            let root = find(&mut parent, i as usize);
            roots.insert(root);
        }
        roots.len()
    }

    /// V - E + T over the triangles actually referenced.
    fn euler_characteristic(mesh: &SurfaceMesh) -> i64 {
        let mut vertices = std::collections::BTreeSet::new();
        let mut edges = std::collections::BTreeSet::new();
        for tri in mesh.indices.chunks_exact(3) {
            for &v in tri {
                vertices.insert(v);
            }
            for (u, v) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                edges.insert((u.min(v), u.max(v)));
            }
        }
        vertices.len() as i64 - edges.len() as i64 + (mesh.indices.len() / 3) as i64
    }

    fn assert_well_formed(mesh: &SurfaceMesh, atom_count: usize) {
        assert_eq!(mesh.positions.len(), mesh.normals.len());
        assert_eq!(mesh.positions.len(), mesh.atom_index.len());
        assert_eq!(mesh.indices.len() % 3, 0);

        for tri in mesh.indices.chunks_exact(3) {
            assert!(tri[0] != tri[1] && tri[1] != tri[2] && tri[0] != tri[2]);
            for &v in tri {
                assert!((v as usize) < mesh.vertex_count());
            }
            let a = Vec3::from(mesh.positions[tri[0] as usize]);
            let b = Vec3::from(mesh.positions[tri[1] as usize]);
            let c = Vec3::from(mesh.positions[tri[2] as usize]);
            assert!((b - a).cross(c - a).length_squared() > 0.0, "zero-area triangle");
        }
        for n in &mesh.normals {
            let len = Vec3::from(*n).length();
            assert!(len == 0.0 || (len - 1.0).abs() < 1e-4);
        }
        for &id in &mesh.atom_index {
            assert!((id as usize) < atom_count);
        }
    }

    #[test]
    fn single_atom_vdw_is_a_sphere() {
        let atoms = [atom(0.0, 0.0, 0.0, 1.7)];
        let mesh = vdw_surface(&atoms, &options_with_voxel(0.5)).unwrap();

        assert_well_formed(&mesh, atoms.len());
        assert_eq!(component_count(&mesh), 1);
        assert_eq!(euler_characteristic(&mesh), 2);
        assert!(mesh.atom_index.iter().all(|&id| id == 0));

        let ideal = 4.0 / 3.0 * std::f64::consts::PI * 1.7f64.powi(3);
        let volume = enclosed_volume(&mesh);
        assert!(
            (volume - ideal).abs() / ideal < 0.1,
            "volume {volume} vs ideal {ideal}"
        );
    }

    #[test]
    fn overlapping_atoms_fuse_into_one_component() {
        let atoms = [atom(0.0, 0.0, 0.0, 1.0), atom(1.5, 0.0, 0.0, 1.0)];
        let mesh = vdw_surface(&atoms, &options_with_voxel(0.25)).unwrap();

        assert_well_formed(&mesh, atoms.len());
        assert_eq!(component_count(&mesh), 1);
        assert!(mesh.vertex_count() >= 200, "got {}", mesh.vertex_count());
    }

    #[test]
    fn distant_atoms_stay_separate_components() {
        let atoms = [atom(0.0, 0.0, 0.0, 1.0), atom(10.0, 0.0, 0.0, 1.0)];
        let mesh = vdw_surface(&atoms, &options_with_voxel(0.25)).unwrap();

        assert_well_formed(&mesh, atoms.len());
        assert_eq!(component_count(&mesh), 2);

        // Each sphere is attributed wholly to its own atom.
        for (p, &id) in mesh.positions.iter().zip(&mesh.atom_index) {
            let expected = u32::from(p[0] > 5.0);
            assert_eq!(id, expected, "vertex at {p:?}");
        }
    }

    #[test]
    fn sas_volume_matches_the_inflated_sphere() {
        let atoms = [atom(0.0, 0.0, 0.0, 1.7)];
        let mesh = sas_surface(&atoms, &SurfaceOptions::default()).unwrap();

        assert_well_formed(&mesh, atoms.len());
        let ideal = 4.0 / 3.0 * std::f64::consts::PI * (1.7f64 + 1.4).powi(3);
        let volume = enclosed_volume(&mesh);
        assert!(
            (volume - ideal).abs() / ideal < 0.15,
            "volume {volume} vs ideal {ideal}"
        );
    }

    #[test]
    fn ses_cluster_is_one_closed_component() {
        let height = 3.0 * 3.0f32.sqrt() / 2.0;
        let atoms = [
            atom(0.0, 0.0, 0.0, 1.9),
            atom(3.0, 0.0, 0.0, 1.9),
            atom(1.5, height, 0.0, 1.9),
        ];
        let mesh = ses_surface(&atoms, &SurfaceOptions::default()).unwrap();

        assert_well_formed(&mesh, atoms.len());
        assert_eq!(component_count(&mesh), 1);
        assert!(enclosed_volume(&mesh) > 0.0);
        assert!(mesh.vertex_count() > 200);
    }

    #[test]
    fn empty_input_yields_an_empty_mesh() {
        let mesh = vdw_surface(&[], &SurfaceOptions::default()).unwrap();
        assert_eq!(mesh.vertex_count(), 0);
        assert_eq!(mesh.triangle_count(), 0);
    }

    #[test]
    fn all_kinds_produce_well_formed_meshes() {
        let atoms = [
            atom(0.0, 0.0, 0.0, 1.5),
            atom(1.8, 0.3, -0.2, 1.2),
            atom(0.5, 1.6, 0.8, 1.4),
        ];
        for kind in [SurfaceKind::Vdw, SurfaceKind::Sas, SurfaceKind::Ses] {
            let mesh = build_surface(&atoms, kind, &SurfaceOptions::default()).unwrap();
            assert!(mesh.vertex_count() > 0, "{kind:?} produced nothing");
            assert_well_formed(&mesh, atoms.len());
            assert!(enclosed_volume(&mesh) > 0.0, "{kind:?} wound inward");
        }
    }

    #[test]
    fn output_is_deterministic() {
        let atoms = [
            atom(0.0, 0.0, 0.0, 1.5),
            atom(1.8, 0.3, -0.2, 1.2),
            atom(0.5, 1.6, 0.8, 1.4),
        ];
        let first = ses_surface(&atoms, &SurfaceOptions::default()).unwrap();
        let second = ses_surface(&atoms, &SurfaceOptions::default()).unwrap();
        assert_eq!(first.positions, second.positions);
        assert_eq!(first.normals, second.normals);
        assert_eq!(first.indices, second.indices);
        assert_eq!(first.atom_index, second.atom_index);
    }

    #[test]
    fn lattice_aligned_translation_shifts_positions_only() {
        let delta = Vec3::new(1.0, 2.0, -1.5);
        let base = [atom(0.0, 0.0, 0.0, 1.7)];
        let moved = [Atom::new(delta, 1.7)];
        let opts = options_with_voxel(0.5);

        let a = vdw_surface(&base, &opts).unwrap();
        let b = vdw_surface(&moved, &opts).unwrap();

        assert_eq!(a.indices, b.indices);
        assert_eq!(a.atom_index, b.atom_index);
        assert_eq!(a.vertex_count(), b.vertex_count());
        for (pa, pb) in a.positions.iter().zip(&b.positions) {
            let shifted = Vec3::from(*pa) + delta;
            assert!((Vec3::from(*pb) - shifted).length() < 1e-4);
        }
    }

    #[test]
    fn finer_voxels_add_vertices() {
        let atoms = [atom(0.0, 0.0, 0.0, 1.7)];
        let coarse = vdw_surface(&atoms, &options_with_voxel(0.5)).unwrap();
        let fine = vdw_surface(&atoms, &options_with_voxel(0.25)).unwrap();
        assert!(fine.vertex_count() >= coarse.vertex_count());
    }

    #[test]
    fn invalid_inputs_fail_before_allocation() {
        let good = [atom(0.0, 0.0, 0.0, 1.0)];

        let bad_probe = SurfaceOptions {
            probe_radius: -1.0,
            ..SurfaceOptions::default()
        };
        assert_eq!(
            sas_surface(&good, &bad_probe).unwrap_err(),
            Error::InvalidInput("probe radius must be non-negative")
        );

        let bad_voxel = SurfaceOptions {
            voxel_size: Some(0.0),
            ..SurfaceOptions::default()
        };
        assert_eq!(
            vdw_surface(&good, &bad_voxel).unwrap_err(),
            Error::InvalidInput("voxel size must be positive")
        );

        let bad_atom = [atom(f32::INFINITY, 0.0, 0.0, 1.0)];
        assert!(matches!(
            vdw_surface(&bad_atom, &SurfaceOptions::default()),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn oversized_grids_are_refused() {
        let atoms = [atom(0.0, 0.0, 0.0, 1.0), atom(3000.0, 3000.0, 3000.0, 1.0)];
        let result = vdw_surface(&atoms, &options_with_voxel(0.25));
        assert!(matches!(result, Err(Error::AllocationFailure(_))));
    }

    #[test]
    fn cancelled_token_aborts_between_stages() {
        let token = CancelToken::new();
        token.cancel();
        let opts = SurfaceOptions {
            signal: Some(token),
            ..SurfaceOptions::default()
        };
        let atoms = [atom(0.0, 0.0, 0.0, 1.0)];
        assert_eq!(ses_surface(&atoms, &opts).unwrap_err(), Error::Aborted);
    }
}
