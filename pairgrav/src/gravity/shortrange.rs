use crate::{
    config::{Interaction, ShortRangeParams},
    error::{Error, Result},
};
use std::{f64::consts::PI, sync::OnceLock};

/// Factor of the short-range gravitational force at distance `sqrt(r2)`, with `scale` the
/// long/short-range split scale.
///
/// The short-range force on a particle is this factor times its separation vector, i.e.
/// `-r⁻³ (x/√π exp(-x²/4) + erfc(x/2))` with `x = r/scale`. The factor is set to zero at `r = 0`.
#[inline]
pub fn shortrange_factor(r2: f64, scale: f64) -> f64 {
    if r2 == 0.0 {
        return 0.0;
    }
    let r = r2.sqrt();
    let x = r / scale;
    -(x / PI.sqrt() * (-0.25 * x * x).exp() + libm::erfc(0.5 * x)) / (r2 * r)
}

/// Short-range force factors sampled uniformly in squared distance.
///
/// Samples span `[0, (2 * cutoff)²]`, leaving room for softening to push pairs past the cutoff.
#[derive(Clone, Debug, PartialEq)]
pub struct ShortRangeTable {
    factors: Vec<f64>,
    max_r2: f64,
    scale: f64,
    samples_per_r2: f64,
}

impl ShortRangeTable {
    /// Tabulates the short-range force of `interaction` with the given number of samples.
    pub fn new(interaction: Interaction, params: &ShortRangeParams, size: usize) -> Result<Self> {
        params.validate(interaction)?;
        if size < 2 {
            return Err(Error::InvalidTableSize(size));
        }

        let max_r2 = (2.0 * params.cutoff).powi(2);
        let step = max_r2 / (size - 1) as f64;
        let factors = (0..size)
            .map(|n| shortrange_factor(n as f64 * step, params.scale))
            .collect();

        Ok(Self {
            factors,
            max_r2,
            scale: params.scale,
            samples_per_r2: (size - 1) as f64 / max_r2,
        })
    }

    /// Number of samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.factors.len()
    }

    /// Returns true if the table has no samples, which never happens for a constructed table.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Largest tabulated squared distance.
    #[inline]
    pub const fn max_r2(&self) -> f64 {
        self.max_r2
    }

    /// Split scale the table was computed with.
    #[inline]
    pub const fn scale(&self) -> f64 {
        self.scale
    }

    /// Tabulated factors.
    #[inline]
    pub fn factors(&self) -> &[f64] {
        &self.factors
    }

    /// Factor of the nearest sample at or below `r2`, clamped to the last sample.
    #[inline]
    pub fn lookup(&self, r2: f64) -> f64 {
        let index = (r2 * self.samples_per_r2) as usize;
        self.factors[index.min(self.factors.len() - 1)]
    }

    /// Factor linearly interpolated between the samples around `r2`, clamped to the last sample.
    #[inline]
    pub fn interpolate(&self, r2: f64) -> f64 {
        let position = r2 * self.samples_per_r2;
        let last = self.factors.len() - 1;
        let index = position as usize;
        if index >= last {
            return self.factors[last];
        }
        let weight = position - index as f64;
        self.factors[index] * (1.0 - weight) + self.factors[index + 1] * weight
    }
}

/// A [`ShortRangeTable`] tabulated on first use.
///
/// Once built, the table is never rebuilt and can be shared between threads for lookups.
#[derive(Debug, Default)]
pub struct LazyShortRangeTable {
    table: OnceLock<ShortRangeTable>,
}

impl LazyShortRangeTable {
    /// Creates a holder with no table built yet.
    #[inline]
    pub const fn new() -> Self {
        Self {
            table: OnceLock::new(),
        }
    }

    /// Returns true if the table has been built.
    #[inline]
    pub fn is_built(&self) -> bool {
        self.table.get().is_some()
    }

    /// Returns the table, if built.
    #[inline]
    pub fn get(&self) -> Option<&ShortRangeTable> {
        self.table.get()
    }

    /// Returns the table, building it with the given parameters if it has not been built yet.
    ///
    /// Parameters passed after the table has been built are ignored.
    pub fn get_or_build(
        &self,
        interaction: Interaction,
        params: &ShortRangeParams,
        size: usize,
    ) -> Result<&ShortRangeTable> {
        if let Some(table) = self.table.get() {
            return Ok(table);
        }

        let table = ShortRangeTable::new(interaction, params, size)?;
        tracing::info!(
            ?interaction,
            size,
            max_r2 = table.max_r2(),
            scale = table.scale(),
            "tabulated short-range force"
        );
        Ok(self.table.get_or_init(|| table))
    }
}
