use crate::config::Interaction;
use thiserror::Error;

/// Errors detected while setting up interactions, tilings and tables.
///
/// Violated invariants of an already constructed state (rung indices out of range, corrupted
/// tile occupancy) are not represented here: they panic.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The cutoff of an interaction is zero or negative.
    #[error("cutoff of {interaction:?} must be positive, got {cutoff}")]
    NonPositiveCutoff {
        /// Interaction the cutoff belongs to.
        interaction: Interaction,
        /// Offending value.
        cutoff: f64,
    },
    /// The long/short-range split scale of an interaction is zero or negative.
    #[error("scale of {interaction:?} must be positive, got {scale}")]
    NonPositiveScale {
        /// Interaction the scale belongs to.
        interaction: Interaction,
        /// Offending value.
        scale: f64,
    },
    /// The periodic box size is zero or negative.
    #[error("box size must be positive, got {0}")]
    NonPositiveBoxsize(f64),
    /// No short-range parameters are configured for the interaction.
    #[error("no short-range parameters configured for {0:?}")]
    MissingInteraction(Interaction),
    /// The tilings of the interaction were requested before being initialised.
    #[error("tilings of {0:?} have not been initialised")]
    UninitialisedTiling(Interaction),
    /// The tiles of an interaction are narrower than its cutoff, so that interacting particles
    /// may lie in tiles that are not neighbours.
    #[error("tiles of {interaction:?} are {extent} wide, narrower than the cutoff {cutoff}")]
    TilesNarrowerThanCutoff {
        /// Interaction the tiles belong to.
        interaction: Interaction,
        /// Smallest side length of a tile.
        extent: f64,
        /// Cutoff of the interaction.
        cutoff: f64,
    },
    /// Receiver and supplier subtilings of an interaction differ in geometry.
    #[error("receiver and supplier subtilings of {0:?} differ")]
    MismatchedSubtiling(Interaction),
    /// The short-range table needs at least two samples.
    #[error("short-range table needs at least 2 samples, got {0}")]
    InvalidTableSize(usize),
    /// A tiling was requested with zero tiles along some axis.
    #[error("tiling shape must be non-zero along every axis, got {0:?}")]
    InvalidTilingShape([usize; 3]),
    /// The time-integral table does not cover every (effective) rung.
    #[error("expected {expected} gravity factors, found {found}")]
    GravityFactorsLength {
        /// Required number of entries.
        expected: usize,
        /// Number of entries supplied.
        found: usize,
    },
    /// Per-particle arrays handed to a population disagree in length.
    #[error("expected {expected} particles, found {found}")]
    ParticleCountMismatch {
        /// Number of particles in the population.
        expected: usize,
        /// Length of the offending array.
        found: usize,
    },
}

/// Result type of fallible operations of this crate.
pub type Result<T> = std::result::Result<T, Error>;
