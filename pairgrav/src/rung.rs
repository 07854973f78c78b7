/// Number of rungs, i.e. of distinct time step sizes a particle can be assigned.
pub const N_RUNGS: usize = 8;

/// Number of effective rungs. Particles about to jump to a neighbouring rung are charged on
/// rungs offset past the literal ones, see [`effective_rung`].
pub const N_EFFECTIVE_RUNGS: usize = 3 * N_RUNGS;

/// Scheduled move of a particle to a neighbouring rung at the end of the current step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum RungJump {
    /// Moves to the next lower rung.
    Down = -1,
    /// Stays on its current rung.
    #[default]
    Stay = 0,
    /// Moves to the next higher rung.
    Up = 1,
}

impl TryFrom<i8> for RungJump {
    type Error = i8;

    #[inline]
    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Down),
            0 => Ok(Self::Stay),
            1 => Ok(Self::Up),
            _ => Err(value),
        }
    }
}

/// Index into tables of time step integrals for a particle on `rung` with the given scheduled
/// jump.
///
/// Staying particles use their literal rung. Particles about to drop use `rung + N_RUNGS` and
/// particles about to rise use `rung + 2 * N_RUNGS`.
#[inline]
pub const fn effective_rung(rung: usize, jump: RungJump) -> usize {
    match jump {
        RungJump::Stay => rung,
        RungJump::Down => rung + N_RUNGS,
        RungJump::Up => rung + 2 * N_RUNGS,
    }
}

/// Summary of how the particles of a population are spread over rungs.
///
/// All bounds lie in `[0, N_RUNGS)` and `lowest_populated <= highest_populated`. The lowest active
/// rung may lie above populated rungs, whose particles are then inactive this step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RungState {
    /// Lowest rung due for a kick this step.
    pub lowest_active: usize,
    /// Lowest rung holding any particle.
    pub lowest_populated: usize,
    /// Highest rung holding any particle.
    pub highest_populated: usize,
}

impl RungState {
    /// Computes the populated rung range of the given rung indices.
    ///
    /// # Panics
    ///
    /// Panics if a rung or `lowest_active` is out of range.
    pub fn new(rungs: &[u8], lowest_active: usize) -> Self {
        let (lowest_populated, highest_populated) = rungs.iter().fold(
            (N_RUNGS - 1, 0),
            |(lowest, highest), &rung| {
                let rung = rung as usize;
                assert!(rung < N_RUNGS, "rung {rung} outside of [0, {N_RUNGS})");
                (lowest.min(rung), highest.max(rung))
            },
        );
        // An empty population is considered to populate the active rung only.
        let (lowest_populated, highest_populated) = if rungs.is_empty() {
            (lowest_active, lowest_active)
        } else {
            (lowest_populated, highest_populated)
        };

        let state = Self {
            lowest_active,
            lowest_populated,
            highest_populated,
        };
        state.check();
        state
    }

    /// Returns true if particles on `rung` are due for a kick.
    #[inline]
    pub const fn is_active(&self, rung: usize) -> bool {
        rung >= self.lowest_active
    }

    /// Asserts the ordering of the rung bounds.
    #[inline]
    pub fn check(&self) {
        assert!(
            self.lowest_active < N_RUNGS
                && self.lowest_populated <= self.highest_populated
                && self.highest_populated < N_RUNGS,
            "inconsistent rung state {self:?}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_rungs() {
        assert_eq!(effective_rung(3, RungJump::Stay), 3);
        assert_eq!(effective_rung(3, RungJump::Down), 3 + N_RUNGS);
        assert_eq!(effective_rung(3, RungJump::Up), 3 + 2 * N_RUNGS);
        assert!(effective_rung(N_RUNGS - 1, RungJump::Up) < N_EFFECTIVE_RUNGS);
    }

    #[test]
    fn jump_from_flag() {
        assert_eq!(RungJump::try_from(-1), Ok(RungJump::Down));
        assert_eq!(RungJump::try_from(0), Ok(RungJump::Stay));
        assert_eq!(RungJump::try_from(1), Ok(RungJump::Up));
        assert_eq!(RungJump::try_from(2), Err(2));
    }

    #[test]
    fn populated_range() {
        let state = RungState::new(&[2, 5, 3, 2], 1);
        assert_eq!(state.lowest_populated, 2);
        assert_eq!(state.highest_populated, 5);
        assert!(state.is_active(1));
        assert!(!state.is_active(0));

        let empty = RungState::new(&[], 0);
        assert_eq!(empty, RungState::default());
    }

    #[test]
    #[should_panic]
    fn rung_out_of_range() {
        RungState::new(&[N_RUNGS as u8], 0);
    }

    #[test]
    fn inactive_populated_rungs() {
        let state = RungState::new(&[0, 1, 2], 2);
        assert_eq!(state.lowest_populated, 0);
        assert!(!state.is_active(1));
        assert!(state.is_active(2));
    }

    #[test]
    #[should_panic]
    fn active_out_of_range() {
        RungState::new(&[1, 2], N_RUNGS);
    }
}
