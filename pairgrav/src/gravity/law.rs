use crate::gravity::{Ewald, ShortRangeTable};
use glam::DVec3;

/// Force law evaluated on the pairs of a kernel.
pub trait PairForce {
    /// Name of the kernel using this force law.
    const NAME: &'static str;

    /// Force per unit coupling on a particle from another at the given raw separation (receiver
    /// minus supplier), or `None` if the pair does not interact.
    fn force(&self, separation: DVec3, softening2: f64) -> Option<DVec3>;
}

/// Maps each component of `separation` onto the nearest periodic image in a box of side
/// `boxsize`, within `[-boxsize / 2, boxsize / 2)`.
///
/// Separations are assumed to be less than a box size apart from their nearest image.
#[inline]
pub fn nearest_image(separation: DVec3, boxsize: f64) -> DVec3 {
    let half = 0.5 * boxsize;
    DVec3::from_array(separation.to_array().map(|x| {
        if x >= half {
            x - boxsize
        } else if x < -half {
            x + boxsize
        } else {
            x
        }
    }))
}

/// Softened Newtonian force per unit coupling, `-r / (r² + ε²)^(3/2)`.
///
/// Particles sharing their position exert no force on each other.
#[inline]
pub fn newtonian(separation: DVec3, softening2: f64) -> DVec3 {
    let r2 = separation.length_squared() + softening2;
    if r2 == 0.0 {
        return DVec3::ZERO;
    }
    -separation / (r2 * r2.sqrt())
}

/// Newtonian force from the nearest periodic image plus the Ewald correction for every other
/// image.
#[derive(Clone, Copy, Debug)]
pub struct Periodic<'a, E> {
    /// Side length of the periodic box.
    pub boxsize: f64,
    /// Correction for the images past the nearest one.
    pub ewald: &'a E,
}

impl<E: Ewald> PairForce for Periodic<'_, E> {
    const NAME: &'static str = "pairwise";

    #[inline]
    fn force(&self, separation: DVec3, softening2: f64) -> Option<DVec3> {
        let separation = nearest_image(separation, self.boxsize);
        Some(self.ewald.correction(separation) + newtonian(separation, softening2))
    }
}

/// Tabulated short-range part of the force from the nearest periodic image, vanishing at and
/// beyond the cutoff.
#[derive(Clone, Copy, Debug)]
pub struct ShortRange<'a> {
    /// Side length of the periodic box.
    pub boxsize: f64,
    /// Squared reach of the force.
    pub cutoff2: f64,
    /// Tabulated force factors.
    pub table: &'a ShortRangeTable,
}

impl PairForce for ShortRange<'_> {
    const NAME: &'static str = "pairwise_shortrange";

    #[inline]
    fn force(&self, separation: DVec3, softening2: f64) -> Option<DVec3> {
        let separation = nearest_image(separation, self.boxsize);
        let r2 = separation.length_squared();
        // The cutoff applies to the unsoftened distance.
        if r2 >= self.cutoff2 {
            return None;
        }
        Some(separation * self.table.lookup(r2 + softening2))
    }
}

/// Newtonian force in open space.
#[derive(Clone, Copy, Debug, Default)]
pub struct NonPeriodic;

impl PairForce for NonPeriodic {
    const NAME: &'static str = "pairwise_nonperiodic";

    #[inline]
    fn force(&self, separation: DVec3, softening2: f64) -> Option<DVec3> {
        Some(newtonian(separation, softening2))
    }
}
