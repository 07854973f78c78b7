use glam::DVec3;

/// Periodic correction to the force between two particles, summing the contributions of every
/// periodic image but the nearest one.
///
/// Implemented for closures taking the nearest-image separation, e.g. interpolating a
/// pretabulated correction grid.
pub trait Ewald {
    /// Correction to the force on a particle from another at the given nearest-image separation
    /// (receiver minus supplier).
    fn correction(&self, separation: DVec3) -> DVec3;
}

impl<F> Ewald for F
where
    F: Fn(DVec3) -> DVec3,
{
    #[inline]
    fn correction(&self, separation: DVec3) -> DVec3 {
        self(separation)
    }
}

/// No periodic correction, leaving only the force from the nearest image.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoEwald;

impl Ewald for NoEwald {
    #[inline]
    fn correction(&self, _: DVec3) -> DVec3 {
        DVec3::ZERO
    }
}
