/// Periodic corrections beyond the nearest image.
pub mod ewald;
/// Force laws of the kernels.
pub mod law;
/// Tabulated short-range force.
pub mod shortrange;

pub use ewald::*;
pub use law::*;
pub use shortrange::*;

use crate::{
    config::{Config, Interaction},
    error::{Error, Result},
    pairing::PairingCache,
    pairs::{Context, PairRequest, ParticlePairs, Supplier},
    population::{PairingLevel, Population, PopulationView},
    rung::N_EFFECTIVE_RUNGS,
};
use std::{f64::consts::PI, ops::Index};

/// Gravitational potential in Fourier space for the squared wavenumber `k2`.
#[inline]
pub fn gravity_potential(k2: f64, g_newton: f64) -> f64 {
    -4.0 * PI * g_newton / k2
}

/// Long-range part of the gravitational potential in Fourier space for the squared wavenumber
/// `k2`, with `scale` the long/short-range split scale.
#[inline]
pub fn gravity_longrange_potential(k2: f64, g_newton: f64, scale: f64) -> f64 {
    (-k2 * scale * scale).exp() * gravity_potential(k2, g_newton)
}

/// Time-integrated coupling between a receiver and a supplier, for every effective rung.
///
/// Entry `k` holds `G * mass_r * mass_s * ∫ dt` over the step of a particle on effective rung `k`,
/// so that a force per unit coupling times the entry is a momentum change.
#[derive(Clone, Debug, PartialEq)]
pub struct GravityFactors(Vec<f64>);

impl GravityFactors {
    /// Computes the factors from the gravitational constant, the particle masses of both sides and
    /// the time integrals of each effective rung.
    pub fn new(g_newton: f64, mass_r: f64, mass_s: f64, integrals: &[f64]) -> Result<Self> {
        let coupling = g_newton * mass_r * mass_s;
        Self::from_factors(integrals.iter().map(|integral| coupling * integral).collect())
    }

    /// Uses precomputed factors, one per effective rung.
    pub fn from_factors(factors: Vec<f64>) -> Result<Self> {
        if factors.len() != N_EFFECTIVE_RUNGS {
            return Err(Error::GravityFactorsLength {
                expected: N_EFFECTIVE_RUNGS,
                found: factors.len(),
            });
        }
        Ok(Self(factors))
    }

    /// The same factor for every effective rung.
    #[inline]
    pub fn uniform(factor: f64) -> Self {
        Self(vec![factor; N_EFFECTIVE_RUNGS])
    }

    /// Factors of each effective rung.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

impl Index<usize> for GravityFactors {
    type Output = f64;

    #[inline]
    fn index(&self, rung: usize) -> &f64 {
        &self.0[rung]
    }
}

/// Pairwise gravity engine of a process.
///
/// Owns the configuration, the subtile pairings built so far and the short-range force table, and
/// applies the momentum changes of the particle pairs of a receiver and a supplier population.
///
/// # Example
///
/// ```
/// use pairgrav::prelude::*;
/// use glam::DVec3;
///
/// let config = Config::new(10.0, 1.0);
/// let mut gravity = Gravity::new(config, Context::new(0))?;
///
/// let pos = vec![DVec3::new(1.0, 1.0, 1.0), DVec3::new(3.0, 1.0, 1.0)];
/// let mom = vec![DVec3::ZERO; 2];
/// let domain = Domain::from_boxsize(10.0);
/// let mut population = Population::new("matter", 1.0, 0.0, pos, mom, domain)?;
///
/// let request = PairRequest::domain(Interaction::Gravity, 0);
/// let factors = GravityFactors::uniform(1.0);
/// gravity.pairwise_nonperiodic(&mut population, Supplier::Receiver, request, &factors)?;
///
/// assert_eq!(population.momenta.mom[0], DVec3::new(0.25, 0.0, 0.0));
/// assert_eq!(population.momenta.mom[1], DVec3::new(-0.25, 0.0, 0.0));
/// # Ok::<(), pairgrav::Error>(())
/// ```
#[derive(Debug)]
pub struct Gravity {
    config: Config,
    context: Context,
    pairings: PairingCache,
    table: LazyShortRangeTable,
}

impl Gravity {
    /// Creates a new [`Gravity`] engine after validating the configuration.
    pub fn new(config: Config, context: Context) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            context,
            pairings: PairingCache::new(),
            table: LazyShortRangeTable::new(),
        })
    }

    /// Configuration of the engine.
    #[inline]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Execution context of the engine.
    #[inline]
    pub const fn context(&self) -> Context {
        self.context
    }

    /// Subtile pairings built so far.
    #[inline]
    pub const fn pairings(&self) -> &PairingCache {
        &self.pairings
    }

    /// Short-range force table of gravity, building it on first use.
    pub fn shortrange_table(&self) -> Result<&ShortRangeTable> {
        let params = self.config.params(Interaction::Gravity)?;
        self.table
            .get_or_build(Interaction::Gravity, params, self.config.shortrange_table_size)
    }

    /// Gravitational potential in Fourier space for the squared wavenumber `k2`.
    #[inline]
    pub fn potential(&self, k2: f64) -> f64 {
        gravity_potential(k2, self.config.g_newton)
    }

    /// Long-range part of the gravitational potential in Fourier space for the squared wavenumber
    /// `k2`.
    pub fn longrange_potential(&self, k2: f64) -> Result<f64> {
        let scale = self.config.params(Interaction::Gravity)?.scale;
        Ok(gravity_longrange_potential(k2, self.config.g_newton, scale))
    }

    /// Time-integrated couplings of `receiver` and `supplier` from the time integrals of each
    /// effective rung.
    pub fn gravity_factors(
        &self,
        receiver: &Population,
        supplier: &Population,
        integrals: &[f64],
    ) -> Result<GravityFactors> {
        GravityFactors::new(
            self.config.g_newton,
            receiver.mass(),
            supplier.mass(),
            integrals,
        )
    }

    /// Enumerates the particle pairs of `receiver` and `supplier`, or of the receiver with itself
    /// if `supplier` is `None`.
    pub fn particle_pairs<'a>(
        &'a mut self,
        receiver: PopulationView<'a>,
        supplier: Option<PopulationView<'a>>,
        request: PairRequest<'a>,
    ) -> Result<ParticlePairs<'a>> {
        self.pairer().particle_pairs(receiver, supplier, request)
    }

    /// Applies the full periodic gravitational force between the requested pairs, made of the
    /// Newtonian force of the nearest image and the `ewald` correction for the other images.
    pub fn pairwise<E: Ewald>(
        &mut self,
        receiver: &mut Population,
        supplier: Supplier<'_>,
        request: PairRequest<'_>,
        factors: &GravityFactors,
        ewald: &E,
    ) -> Result<()> {
        let law = Periodic {
            boxsize: self.config.boxsize,
            ewald,
        };
        self.pairer().apply(receiver, supplier, request, factors, &law)
    }

    /// Applies the short-range part of the periodic gravitational force between the requested
    /// pairs closer than the cutoff.
    pub fn pairwise_shortrange(
        &mut self,
        receiver: &mut Population,
        supplier: Supplier<'_>,
        request: PairRequest<'_>,
        factors: &GravityFactors,
    ) -> Result<()> {
        let Self {
            config,
            context,
            pairings,
            table,
        } = self;
        let config = &*config;

        let params = config.params(Interaction::Gravity)?;
        let law = ShortRange {
            boxsize: config.boxsize,
            cutoff2: params.cutoff * params.cutoff,
            table: table.get_or_build(Interaction::Gravity, params, config.shortrange_table_size)?,
        };
        Pairer {
            config,
            context: *context,
            pairings,
        }
        .apply(receiver, supplier, request, factors, &law)
    }

    /// Applies the Newtonian gravitational force between the requested pairs, ignoring periodic
    /// images.
    pub fn pairwise_nonperiodic(
        &mut self,
        receiver: &mut Population,
        supplier: Supplier<'_>,
        request: PairRequest<'_>,
        factors: &GravityFactors,
    ) -> Result<()> {
        self.pairer()
            .apply(receiver, supplier, request, factors, &NonPeriodic)
    }

    #[inline]
    fn pairer(&mut self) -> Pairer<'_> {
        Pairer {
            config: &self.config,
            context: self.context,
            pairings: &mut self.pairings,
        }
    }
}

// Borrowed state needed to pair particles, split off the engine so that the short-range table can
// be borrowed alongside.
struct Pairer<'a> {
    config: &'a Config,
    context: Context,
    pairings: &'a mut PairingCache,
}

impl<'a> Pairer<'a> {
    fn particle_pairs<'b>(
        self,
        receiver: PopulationView<'b>,
        supplier: Option<PopulationView<'b>>,
        request: PairRequest<'b>,
    ) -> Result<ParticlePairs<'b>>
    where
        'a: 'b,
    {
        let cutoff = match request.level {
            PairingLevel::Domain => f64::INFINITY,
            PairingLevel::Tile => self.config.params(request.interaction)?.cutoff,
        };
        ParticlePairs::new(
            receiver,
            supplier,
            request,
            cutoff,
            self.context.rank,
            self.pairings,
        )
    }

    fn apply<L: PairForce>(
        self,
        receiver: &mut Population,
        supplier: Supplier<'_>,
        request: PairRequest<'_>,
        factors: &GravityFactors,
        law: &L,
    ) -> Result<()> {
        let (supplier_name, softening_s) = match &supplier {
            Supplier::Receiver => (receiver.name().to_owned(), receiver.softening_length()),
            Supplier::Other(supplier) => (supplier.name().to_owned(), supplier.softening_length()),
        };
        let span = tracing::debug_span!(
            "kernel",
            kernel = L::NAME,
            receiver = receiver.name(),
            supplier = supplier_name.as_str(),
            rank_supplier = request.rank_supplier,
        );
        let _enter = span.enter();

        let softening = 0.5 * (receiver.softening_length() + softening_s);
        let softening2 = softening * softening;
        let only_supply = request.only_supply;
        let local = request.rank_supplier == self.context.rank;
        let mut pairs_count = 0usize;

        let (view_r, momenta_r) = receiver.split_mut();
        match supplier {
            Supplier::Receiver => {
                let mom = &mut momenta_r.mom;
                self.particle_pairs(view_r, None, request)?
                    .for_each(|work| {
                        let Some(force) = law.force(work.separation, softening2) else {
                            return;
                        };
                        pairs_count += 1;
                        if work.apply_to_i {
                            mom[work.i] += force * factors[work.rung_i];
                        }
                        if !only_supply && work.apply_to_j {
                            mom[work.j] -= force * factors[work.rung_j];
                        }
                    });
            }
            Supplier::Other(supplier) => {
                let (view_s, momenta_s) = supplier.split_mut();
                let mom_r = &mut momenta_r.mom;
                // Kicks owed to remote particles are deferred until reduced across processes.
                let mom_s = if local {
                    &mut momenta_s.mom
                } else {
                    &mut momenta_s.delta_mom
                };
                self.particle_pairs(view_r, Some(view_s), request)?
                    .for_each(|work| {
                        let Some(force) = law.force(work.separation, softening2) else {
                            return;
                        };
                        pairs_count += 1;
                        if work.apply_to_i {
                            mom_r[work.i] += force * factors[work.rung_i];
                        }
                        if !only_supply && work.apply_to_j {
                            mom_s[work.j] -= force * factors[work.rung_j];
                        }
                    });
            }
        }

        tracing::debug!(pairs = pairs_count, "applied pair forces");
        Ok(())
    }
}
