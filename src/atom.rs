use glam::Vec3;

use crate::Error;

/// One sphere of the input molecule.
///
/// The position in the input slice is the atom id reported back through
/// [`SurfaceMesh::atom_index`](crate::SurfaceMesh::atom_index).
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "with_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Atom {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub radius: f32,
}

impl Atom {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self {
            x: center.x,
            y: center.y,
            z: center.z,
            radius,
        }
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

impl From<(Vec3, f32)> for Atom {
    fn from((center, radius): (Vec3, f32)) -> Self {
        Self::new(center, radius)
    }
}

/// Rejects non-finite coordinates and non-positive radii before any grid
/// memory is touched.
pub(crate) fn validate_atoms(atoms: &[Atom]) -> Result<(), Error> {
    for atom in atoms {
        if !(atom.x.is_finite() && atom.y.is_finite() && atom.z.is_finite()) {
            return Err(Error::InvalidInput("atom coordinate is not finite"));
        }
        if !atom.radius.is_finite() || atom.radius <= 0.0 {
            return Err(Error::InvalidInput("atom radius must be positive"));
        }
    }
    Ok(())
}
