use crate::error::{Error, Result};
use std::collections::HashMap;

/// Default number of samples of the short-range force table.
pub const SHORTRANGE_TABLE_SIZE: usize = 1 << 20;

/// Ratio between the default cutoff and the long/short-range split scale.
pub const CUTOFF_OVER_SCALE: f64 = 4.5;

/// Pairwise interactions evaluated on tiles.
///
/// Each interaction has its own cutoff, force split scale and tilings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Interaction {
    /// Newtonian gravity.
    Gravity,
}

/// Parameters of the short-range part of an interaction.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShortRangeParams {
    /// Long/short-range force split scale.
    pub scale: f64,
    /// Maximum reach of the short-range force.
    pub cutoff: f64,
    /// Number of subtiles per tile along each axis.
    pub subtiles: [usize; 3],
}

impl ShortRangeParams {
    /// Creates parameters with the given split scale and the conventional cutoff of
    /// [`CUTOFF_OVER_SCALE`] times the scale, with a single subtile per tile.
    #[inline]
    pub fn from_scale(scale: f64) -> Self {
        Self {
            scale,
            cutoff: CUTOFF_OVER_SCALE * scale,
            subtiles: [1; 3],
        }
    }

    /// Returns these parameters with the given subtile decomposition.
    #[inline]
    pub fn with_subtiles(self, subtiles: [usize; 3]) -> Self {
        Self { subtiles, ..self }
    }

    /// Returns these parameters with the given cutoff.
    #[inline]
    pub fn with_cutoff(self, cutoff: f64) -> Self {
        Self { cutoff, ..self }
    }

    pub(crate) fn validate(&self, interaction: Interaction) -> Result<()> {
        if !(self.cutoff > 0.0) {
            return Err(Error::NonPositiveCutoff {
                interaction,
                cutoff: self.cutoff,
            });
        }
        if !(self.scale > 0.0) {
            return Err(Error::NonPositiveScale {
                interaction,
                scale: self.scale,
            });
        }
        if self.subtiles.contains(&0) {
            return Err(Error::InvalidTilingShape(self.subtiles));
        }
        Ok(())
    }
}

/// Simulation-wide parameters needed by the pairwise force computation.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Side length of the periodic box.
    pub boxsize: f64,
    /// Gravitational constant.
    pub g_newton: f64,
    /// Short-range parameters of each interaction.
    pub shortrange: HashMap<Interaction, ShortRangeParams>,
    /// Number of samples of the short-range force table.
    pub shortrange_table_size: usize,
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            boxsize: 1.0,
            g_newton: 1.0,
            shortrange: HashMap::new(),
            shortrange_table_size: SHORTRANGE_TABLE_SIZE,
        }
    }
}

impl Config {
    /// Creates a configuration for a box of the given size and gravitational constant, without any
    /// short-range parameters.
    #[inline]
    pub fn new(boxsize: f64, g_newton: f64) -> Self {
        Self {
            boxsize,
            g_newton,
            ..Default::default()
        }
    }

    /// Returns this configuration with the short-range parameters of `interaction` set.
    #[inline]
    pub fn with_shortrange(mut self, interaction: Interaction, params: ShortRangeParams) -> Self {
        self.shortrange.insert(interaction, params);
        self
    }

    /// Returns this configuration with the given number of short-range table samples.
    #[inline]
    pub fn with_table_size(self, shortrange_table_size: usize) -> Self {
        Self {
            shortrange_table_size,
            ..self
        }
    }

    /// Returns the short-range parameters of `interaction`.
    #[inline]
    pub fn params(&self, interaction: Interaction) -> Result<&ShortRangeParams> {
        self.shortrange
            .get(&interaction)
            .ok_or(Error::MissingInteraction(interaction))
    }

    /// Checks every parameter, failing on the first invalid one.
    pub fn validate(&self) -> Result<()> {
        if !(self.boxsize > 0.0) {
            return Err(Error::NonPositiveBoxsize(self.boxsize));
        }
        if self.shortrange_table_size < 2 {
            return Err(Error::InvalidTableSize(self.shortrange_table_size));
        }
        self.shortrange
            .iter()
            .try_for_each(|(&interaction, params)| params.validate(interaction))
    }
}
