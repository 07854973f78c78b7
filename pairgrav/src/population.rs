use crate::{
    config::{Interaction, ShortRangeParams},
    error::{Error, Result},
    rung::{RungJump, RungState},
    tiling::Tiling,
};
use glam::DVec3;
use std::collections::HashMap;

/// Box of space owned by the local process.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Domain {
    /// Lower corner of the domain.
    pub location: DVec3,
    /// Side lengths of the domain.
    pub extent: DVec3,
}

impl Domain {
    /// Creates a new [`Domain`] with the given lower corner and side lengths.
    #[inline]
    pub const fn new(location: DVec3, extent: DVec3) -> Self {
        Self { location, extent }
    }

    /// Creates a cubic [`Domain`] spanning a whole periodic box of the given size.
    #[inline]
    pub fn from_boxsize(boxsize: f64) -> Self {
        Self::new(DVec3::ZERO, DVec3::splat(boxsize))
    }
}

/// Granularity at which particle pairs are searched for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PairingLevel {
    /// Particles are paired through the tiles and subtiles of an interaction.
    Tile,
    /// Every particle of the domain is paired with every other, through the trivial tiling.
    Domain,
}

/// Tilings of a population for a single interaction.
#[derive(Clone, Debug)]
pub struct InteractionTilings {
    /// Tiles of the domain, at least one cutoff wide.
    pub tiles: Tiling,
    /// Subtiling of a single tile, relocated onto the tile being paired.
    pub subtiles: Tiling,
    /// Second subtiling used for the supplier side when a population interacts with itself.
    pub subtiles_secondary: Option<Tiling>,
}

impl InteractionTilings {
    /// Splits the tilings for pairing a population with itself, creating the secondary subtiling
    /// on first use.
    ///
    /// Receiver and supplier tiles are sorted into subtiles independently, so each side needs its
    /// own subtiling.
    pub fn split_self(&mut self) -> (&Tiling, &mut Tiling, &mut Tiling) {
        let Self {
            tiles,
            subtiles,
            subtiles_secondary,
        } = self;
        let secondary = subtiles_secondary.get_or_insert_with(|| subtiles.clone());
        (&*tiles, subtiles, secondary)
    }
}

/// Named tilings of a population.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TilingName {
    /// Tiles of an interaction.
    Tiles(Interaction),
    /// Subtiles of an interaction.
    Subtiles(Interaction),
    /// Secondary subtiles of an interaction, used when a population interacts with itself.
    SubtilesSecondary(Interaction),
    /// Single tile spanning the whole domain.
    Trivial,
}

/// Every tiling of a population.
#[derive(Clone, Debug)]
pub struct Tilings {
    domain: Domain,
    trivial: Tiling,
    interactions: HashMap<Interaction, InteractionTilings>,
}

impl Tilings {
    /// Creates the tilings of a population living in `domain`, with only the trivial tiling set
    /// up.
    #[inline]
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            trivial: Tiling::trivial(domain.location, domain.extent),
            interactions: HashMap::new(),
        }
    }

    /// Domain covered by the tilings.
    #[inline]
    pub const fn domain(&self) -> &Domain {
        &self.domain
    }

    /// The tiling made of a single tile covering the domain.
    #[inline]
    pub const fn trivial(&self) -> &Tiling {
        &self.trivial
    }

    /// Returns the tiling with the given name, if it exists.
    pub fn get(&self, name: &TilingName) -> Option<&Tiling> {
        match name {
            TilingName::Trivial => Some(&self.trivial),
            TilingName::Tiles(interaction) => self.interactions.get(interaction).map(|t| &t.tiles),
            TilingName::Subtiles(interaction) => {
                self.interactions.get(interaction).map(|t| &t.subtiles)
            }
            TilingName::SubtilesSecondary(interaction) => self
                .interactions
                .get(interaction)
                .and_then(|t| t.subtiles_secondary.as_ref()),
        }
    }

    /// Tilings of the given interaction.
    #[inline]
    pub fn interaction(&self, interaction: Interaction) -> Result<&InteractionTilings> {
        self.interactions
            .get(&interaction)
            .ok_or(Error::UninitialisedTiling(interaction))
    }

    /// Mutable tilings of the given interaction.
    #[inline]
    pub fn interaction_mut(&mut self, interaction: Interaction) -> Result<&mut InteractionTilings> {
        self.interactions
            .get_mut(&interaction)
            .ok_or(Error::UninitialisedTiling(interaction))
    }

    /// Mutable trivial tiling.
    #[inline]
    pub fn trivial_mut(&mut self) -> &mut Tiling {
        &mut self.trivial
    }

    fn insert(&mut self, interaction: Interaction, tilings: InteractionTilings) {
        self.interactions.insert(interaction, tilings);
    }
}

/// Positions and rung assignment of the particles of a population.
#[derive(Clone, Debug, Default)]
pub struct Particles {
    pos: Vec<DVec3>,
    rungs: Vec<u8>,
    rung_jumps: Vec<RungJump>,
    rung_state: RungState,
    generation: u64,
}

impl Particles {
    /// Creates particles at the given positions, all on rung 0, which is active.
    pub fn new(pos: Vec<DVec3>) -> Self {
        let len = pos.len();
        Self {
            pos,
            rungs: vec![0; len],
            rung_jumps: vec![RungJump::Stay; len],
            rung_state: RungState::default(),
            generation: 0,
        }
    }

    /// Number of particles.
    #[inline]
    pub fn len(&self) -> usize {
        self.pos.len()
    }

    /// Returns true if there are no particles.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pos.is_empty()
    }

    /// Positions of the particles.
    #[inline]
    pub fn pos(&self) -> &[DVec3] {
        &self.pos
    }

    /// Mutable positions of the particles.
    ///
    /// Tilings sorted before are stale and get re-sorted before the next pairing.
    #[inline]
    pub fn pos_mut(&mut self) -> &mut [DVec3] {
        self.generation += 1;
        &mut self.pos
    }

    /// Rung of each particle.
    #[inline]
    pub fn rungs(&self) -> &[u8] {
        &self.rungs
    }

    /// Scheduled rung jump of each particle.
    #[inline]
    pub fn rung_jumps(&self) -> &[RungJump] {
        &self.rung_jumps
    }

    /// Rung bounds of the particles.
    #[inline]
    pub const fn rung_state(&self) -> &RungState {
        &self.rung_state
    }

    /// Counter bumped whenever positions, rungs or active rungs may have changed, telling
    /// tilings when they have to be re-sorted.
    #[inline]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Assigns the particles to the given rungs, with rungs from `lowest_active` upwards due for a
    /// kick.
    ///
    /// Tilings sorted before are stale and get re-sorted before the next pairing.
    ///
    /// # Panics
    ///
    /// Panics if a rung is out of range.
    pub fn set_rungs(&mut self, rungs: Vec<u8>, lowest_active: usize) -> Result<()> {
        self.check_len(rungs.len())?;
        self.rung_state = RungState::new(&rungs, lowest_active);
        self.rungs = rungs;
        self.generation += 1;
        Ok(())
    }

    /// Changes which rungs are due for a kick.
    ///
    /// Occupancy flags of the tilings sorted before are stale, and the tilings get re-sorted
    /// before the next pairing.
    ///
    /// # Panics
    ///
    /// Panics if `lowest_active` is out of range.
    pub fn set_lowest_active(&mut self, lowest_active: usize) {
        self.rung_state.lowest_active = lowest_active;
        self.rung_state.check();
        self.generation += 1;
    }

    /// Schedules the rung jumps of the particles.
    pub fn set_rung_jumps(&mut self, rung_jumps: Vec<RungJump>) -> Result<()> {
        self.check_len(rung_jumps.len())?;
        self.rung_jumps = rung_jumps;
        Ok(())
    }

    fn check_len(&self, found: usize) -> Result<()> {
        if found != self.len() {
            return Err(Error::ParticleCountMismatch {
                expected: self.len(),
                found,
            });
        }
        Ok(())
    }
}

/// Momenta of the particles of a population.
#[derive(Clone, Debug, Default)]
pub struct Momenta {
    /// Momentum of each particle.
    pub mom: Vec<DVec3>,
    /// Momentum changes owed to the particles by other processes, to be reduced across processes
    /// before being applied.
    pub delta_mom: Vec<DVec3>,
}

/// Borrowed view of a population, without its momenta.
#[derive(Debug)]
pub struct PopulationView<'a> {
    /// Name of the population.
    pub name: &'a str,
    /// Whether rung jumps are taken into account.
    pub use_rungs: bool,
    /// Particles of the population.
    pub particles: &'a Particles,
    /// Tilings of the population.
    pub tilings: &'a mut Tilings,
}

/// Collection of particles sharing their physical properties.
#[derive(Clone, Debug)]
pub struct Population {
    name: String,
    mass: f64,
    softening_length: f64,
    use_rungs: bool,
    /// Positions and rungs of the particles.
    pub particles: Particles,
    /// Momenta of the particles.
    pub momenta: Momenta,
    /// Tilings sorting the particles in space.
    pub tilings: Tilings,
}

impl Population {
    /// Creates a new [`Population`] of particles with the given positions and momenta, living in
    /// `domain`.
    pub fn new(
        name: impl Into<String>,
        mass: f64,
        softening_length: f64,
        pos: Vec<DVec3>,
        mom: Vec<DVec3>,
        domain: Domain,
    ) -> Result<Self> {
        if mom.len() != pos.len() {
            return Err(Error::ParticleCountMismatch {
                expected: pos.len(),
                found: mom.len(),
            });
        }

        let len = pos.len();
        let mut population = Self {
            name: name.into(),
            mass,
            softening_length,
            use_rungs: true,
            particles: Particles::new(pos),
            momenta: Momenta {
                mom,
                delta_mom: vec![DVec3::ZERO; len],
            },
            tilings: Tilings::new(domain),
        };
        population.tile(PairingLevel::Domain, Interaction::Gravity)?;
        Ok(population)
    }

    /// Returns this population with rung jumps taken into account or not.
    #[inline]
    pub fn with_rungs(self, use_rungs: bool) -> Self {
        Self { use_rungs, ..self }
    }

    /// Name of the population.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mass of every particle.
    #[inline]
    pub const fn mass(&self) -> f64 {
        self.mass
    }

    /// Softening length of every particle.
    #[inline]
    pub const fn softening_length(&self) -> f64 {
        self.softening_length
    }

    /// Whether rung jumps are taken into account.
    #[inline]
    pub const fn use_rungs(&self) -> bool {
        self.use_rungs
    }

    /// Number of particles.
    #[inline]
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    /// Returns true if the population has no particles.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Sets up the tiles and subtiles used for `interaction`.
    ///
    /// The domain is divided into as many tiles as fit along each axis while being at least one
    /// cutoff wide, so that interacting particles always lie in neighbouring tiles. The tiles are
    /// sorted right away.
    pub fn init_tilings(&mut self, interaction: Interaction, params: &ShortRangeParams) -> Result<()> {
        if !(params.cutoff > 0.0) {
            return Err(Error::NonPositiveCutoff {
                interaction,
                cutoff: params.cutoff,
            });
        }

        let domain = *self.tilings.domain();
        let shape = (domain.extent / params.cutoff)
            .floor()
            .max(DVec3::ONE)
            .to_array()
            .map(|n| n as usize);

        if shape.iter().any(|&n| n < 3) {
            tracing::warn!(
                population = %self.name,
                ?interaction,
                tiles = ?shape,
                cutoff = params.cutoff,
                "fewer than 3 tiles along an axis, pairs through distant periodic images are missed"
            );
        }

        let mut tiles = Tiling::new(shape, domain.location, domain.extent)?;
        tiles.sort_all(&self.particles);
        let subtiles = Tiling::new(params.subtiles, domain.location, tiles.tile_extent())?;

        tracing::debug!(
            population = %self.name,
            ?interaction,
            tiles = ?shape,
            subtiles = ?params.subtiles,
            "initialised tilings"
        );

        self.tilings.insert(
            interaction,
            InteractionTilings {
                tiles,
                subtiles,
                subtiles_secondary: None,
            },
        );
        Ok(())
    }

    /// Re-sorts the particles into the top-level tiling of the given level, e.g. after particles
    /// have moved or rungs have changed.
    pub fn tile(&mut self, level: PairingLevel, interaction: Interaction) -> Result<()> {
        match level {
            PairingLevel::Domain => self.tilings.trivial_mut().sort_all(&self.particles),
            PairingLevel::Tile => self
                .tilings
                .interaction_mut(interaction)?
                .tiles
                .sort_all(&self.particles),
        }
        Ok(())
    }

    /// Splits the population into a view of everything but its momenta, and its momenta.
    #[inline]
    pub fn split_mut(&mut self) -> (PopulationView<'_>, &mut Momenta) {
        let Self {
            name,
            use_rungs,
            particles,
            momenta,
            tilings,
            ..
        } = self;
        (
            PopulationView {
                name: name.as_str(),
                use_rungs: *use_rungs,
                particles: &*particles,
                tilings,
            },
            momenta,
        )
    }

    /// Adds the deferred momentum changes to the momenta and clears them.
    ///
    /// To be called once the deferred changes have been reduced across processes.
    pub fn apply_deferred(&mut self) {
        let Momenta { mom, delta_mom } = &mut self.momenta;
        for (mom, delta) in mom.iter_mut().zip(delta_mom.iter_mut()) {
            *mom += *delta;
            *delta = DVec3::ZERO;
        }
    }

    /// Discards the deferred momentum changes.
    #[inline]
    pub fn clear_deferred(&mut self) {
        self.momenta.delta_mom.fill(DVec3::ZERO);
    }
}
