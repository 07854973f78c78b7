use crate::{
    config::Interaction,
    error::{Error, Result},
    pairing::{neighbour_class, PairingCache, SubtilePairings, N_NEIGHBOUR_CLASSES},
    population::{InteractionTilings, PairingLevel, Particles, Population, PopulationView},
    rung::effective_rung,
    tiling::{Occupancy, RungBuckets, Tiling},
};
use glam::DVec3;

/// Execution context of the local process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Context {
    /// Rank of the local process.
    pub rank: usize,
}

impl Context {
    /// Creates the context of the process with the given rank.
    #[inline]
    pub const fn new(rank: usize) -> Self {
        Self { rank }
    }
}

/// Population supplying the force felt by the receiver.
#[derive(Debug)]
pub enum Supplier<'a> {
    /// The receiver interacts with itself.
    Receiver,
    /// Another population, local or imported from another process.
    Other(&'a mut Population),
}

/// Which particles of a receiver and a supplier to pair up.
#[derive(Clone, Copy, Debug)]
pub struct PairRequest<'a> {
    /// Interaction selecting the cutoff and tilings.
    pub interaction: Interaction,
    /// Granularity of the pairing.
    pub level: PairingLevel,
    /// Receiver tiles to visit.
    pub tiles_receiver: &'a [usize],
    /// Supplier tiles to visit.
    pub tiles_supplier: &'a [usize],
    /// Rank of the process owning the supplier.
    pub rank_supplier: usize,
    /// If true, the supplier only supplies force and never receives a kick, and only active
    /// receiver particles are paired.
    pub only_supply: bool,
}

impl<'a> PairRequest<'a> {
    /// Requests every pair within the single tile of the trivial tiling, for a supplier owned by
    /// `rank_supplier`.
    #[inline]
    pub fn domain(interaction: Interaction, rank_supplier: usize) -> Self {
        Self {
            interaction,
            level: PairingLevel::Domain,
            tiles_receiver: &[0],
            tiles_supplier: &[0],
            rank_supplier,
            only_supply: false,
        }
    }

    /// Requests the pairs between the given receiver and supplier tiles of an interaction, for a
    /// supplier owned by `rank_supplier`.
    ///
    /// Every supplier tile must neighbour every receiver tile through a single periodic image,
    /// which in a periodic domain requires at least three tiles along each axis. When a population
    /// is paired with itself, each unordered pair of tiles must be requested only once.
    #[inline]
    pub fn tiles(
        interaction: Interaction,
        tiles_receiver: &'a [usize],
        tiles_supplier: &'a [usize],
        rank_supplier: usize,
    ) -> Self {
        Self {
            interaction,
            level: PairingLevel::Tile,
            tiles_receiver,
            tiles_supplier,
            rank_supplier,
            only_supply: false,
        }
    }

    /// Returns this request with the given `only_supply` flag.
    #[inline]
    pub fn only_supply(self, only_supply: bool) -> Self {
        Self {
            only_supply,
            ..self
        }
    }
}

/// A pair of particles `i` of the receiver and `j` of the supplier.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PairWork {
    /// Index of the receiver particle.
    pub i: usize,
    /// Index of the supplier particle.
    pub j: usize,
    /// Effective rung of `i`, indexing time step integrals.
    pub rung_i: usize,
    /// Effective rung of `j`, indexing time step integrals.
    pub rung_j: usize,
    /// Position of `i` minus position of `j`, without periodic wrapping.
    pub separation: DVec3,
    /// Whether the force on `i` should be applied.
    pub apply_to_i: bool,
    /// Whether the opposite force on `j` should be applied.
    pub apply_to_j: bool,
}

// One side of the pairing. Without a subtiling, each tile is its own single subtile.
#[derive(Debug)]
struct Side<'a> {
    particles: &'a Particles,
    use_rungs: bool,
    tiling: &'a Tiling,
    subtiling: Option<&'a mut Tiling>,
}

impl<'a> Side<'a> {
    #[inline]
    fn new(
        particles: &'a Particles,
        use_rungs: bool,
        tiling: &'a Tiling,
        subtiling: Option<&'a mut Tiling>,
    ) -> Self {
        Self {
            particles,
            use_rungs,
            tiling,
            subtiling,
        }
    }

    #[inline]
    fn sort_tile(&mut self, tile_index: usize) {
        if let Some(subtiling) = self.subtiling.as_deref_mut() {
            subtiling.relocate(self.tiling.tile_location(tile_index));
            subtiling.sort(self.tiling, tile_index, self.particles);
        }
    }

    #[inline]
    fn subtile(&self, tile_index: usize, subtile_index: usize) -> (&RungBuckets, Occupancy) {
        match self.subtiling.as_deref() {
            Some(subtiling) => (
                subtiling.buckets(subtile_index),
                subtiling.occupancy(subtile_index),
            ),
            None => (
                self.tiling.buckets(tile_index),
                self.tiling.occupancy(tile_index),
            ),
        }
    }

    #[inline]
    fn effective_rung(&self, particle: usize, rung: usize) -> usize {
        if self.use_rungs {
            effective_rung(rung, self.particles.rung_jumps()[particle])
        } else {
            rung
        }
    }
}

/// Enumeration of the particle pairs between a receiver and a supplier.
///
/// Pairs are visited tile by tile, then by subtile pairing, rung and particle. When a population
/// is paired with itself on the local process, each unordered pair of particles within a tile is
/// visited once. Tiles are re-sorted into subtiles as the enumeration goes, so the tilings stay
/// borrowed until it has run to completion.
#[derive(Debug)]
pub struct ParticlePairs<'a> {
    receiver: Side<'a>,
    supplier: Side<'a>,
    pairings: &'a SubtilePairings,
    request: PairRequest<'a>,
    local: bool,
}

impl<'a> ParticlePairs<'a> {
    /// Sets up the enumeration of the pairs between `receiver` and `supplier`, or between the
    /// receiver and itself if `supplier` is `None`.
    ///
    /// Subtiles further apart than `cutoff` are never paired. `local_rank` is the rank of this
    /// process. Top-level tilings sorted before particles moved or rungs changed are re-sorted.
    ///
    /// # Errors
    ///
    /// At the tile level, fails if the tilings of the interaction are missing, if tiles are
    /// narrower than `cutoff` or if the supplier subtiling differs from the receiver's.
    ///
    /// # Panics
    ///
    /// Panics if the receiver is asked to supply itself from another process.
    pub fn new(
        receiver: PopulationView<'a>,
        supplier: Option<PopulationView<'a>>,
        request: PairRequest<'a>,
        cutoff: f64,
        local_rank: usize,
        cache: &'a mut PairingCache,
    ) -> Result<Self> {
        let local = match &supplier {
            None => {
                assert_eq!(
                    request.rank_supplier, local_rank,
                    "a population can only supply itself locally"
                );
                true
            }
            Some(supplier) => {
                supplier.name == receiver.name && request.rank_supplier == local_rank
            }
        };

        let interaction = request.interaction;
        let PopulationView {
            particles: particles_r,
            use_rungs: use_rungs_r,
            tilings: tilings_r,
            ..
        } = receiver;

        let (receiver, supplier, handle) = match (request.level, supplier) {
            (PairingLevel::Domain, None) => {
                refresh(tilings_r.trivial_mut(), particles_r);
                let trivial: &'a Tiling = tilings_r.trivial();
                (
                    Side::new(particles_r, use_rungs_r, trivial, None),
                    Side::new(particles_r, use_rungs_r, trivial, None),
                    cache.get_pairing(trivial, cutoff),
                )
            }
            (PairingLevel::Domain, Some(supplier)) => {
                refresh(tilings_r.trivial_mut(), particles_r);
                refresh(supplier.tilings.trivial_mut(), supplier.particles);
                let trivial_r: &'a Tiling = tilings_r.trivial();
                let trivial_s: &'a Tiling = supplier.tilings.trivial();
                (
                    Side::new(particles_r, use_rungs_r, trivial_r, None),
                    Side::new(supplier.particles, supplier.use_rungs, trivial_s, None),
                    cache.get_pairing(trivial_r, cutoff),
                )
            }
            (PairingLevel::Tile, None) => {
                let tilings = tilings_r.interaction_mut(interaction)?;
                refresh(&mut tilings.tiles, particles_r);
                check_extent(&tilings.tiles, interaction, cutoff)?;
                let handle = cache.get_pairing(&tilings.subtiles, cutoff);

                if tilings.subtiles.is_trivial() {
                    // Each tile is its own single subtile.
                    let tiles: &'a Tiling = &tilings.tiles;
                    (
                        Side::new(particles_r, use_rungs_r, tiles, None),
                        Side::new(particles_r, use_rungs_r, tiles, None),
                        handle,
                    )
                } else {
                    let (tiles, subtiles, secondary) = tilings.split_self();
                    (
                        Side::new(particles_r, use_rungs_r, tiles, Some(subtiles)),
                        Side::new(particles_r, use_rungs_r, tiles, Some(secondary)),
                        handle,
                    )
                }
            }
            (PairingLevel::Tile, Some(supplier)) => {
                let InteractionTilings {
                    tiles: tiles_r,
                    subtiles: subtiles_r,
                    ..
                } = tilings_r.interaction_mut(interaction)?;
                let InteractionTilings {
                    tiles: tiles_s,
                    subtiles: subtiles_s,
                    ..
                } = supplier.tilings.interaction_mut(interaction)?;
                refresh(tiles_r, particles_r);
                refresh(tiles_s, supplier.particles);
                check_extent(tiles_r, interaction, cutoff)?;
                check_extent(tiles_s, interaction, cutoff)?;
                // The pairings of the receiver subtiling hold for the supplier's too.
                if subtiles_r.shape() != subtiles_s.shape()
                    || subtiles_r.tile_extent() != subtiles_s.tile_extent()
                {
                    return Err(Error::MismatchedSubtiling(interaction));
                }
                let handle = cache.get_pairing(subtiles_r, cutoff);

                let trivial = subtiles_r.is_trivial();
                let (subtiles_r, subtiles_s) = if trivial {
                    (None, None)
                } else {
                    (Some(subtiles_r), Some(subtiles_s))
                };
                (
                    Side::new(particles_r, use_rungs_r, tiles_r, subtiles_r),
                    Side::new(supplier.particles, supplier.use_rungs, tiles_s, subtiles_s),
                    handle,
                )
            }
        };

        let cache: &'a PairingCache = cache;

        Ok(Self {
            receiver,
            supplier,
            pairings: cache.get(handle),
            request,
            local,
        })
    }

    /// Returns true if receiver and supplier are the same population on the local process.
    #[inline]
    pub const fn is_local(&self) -> bool {
        self.local
    }

    /// Calls `f` on every pair, in a fixed order.
    pub fn for_each<F>(mut self, mut f: F)
    where
        F: FnMut(PairWork),
    {
        let PairRequest {
            tiles_receiver,
            tiles_supplier,
            only_supply,
            ..
        } = self.request;
        let (particles_r, particles_s) = (self.receiver.particles, self.supplier.particles);
        let rungs_r = *particles_r.rung_state();
        let rungs_s = *particles_s.rung_state();
        let pos_r = particles_r.pos();
        let pos_s = particles_s.pos();

        // Receiver rungs initiating pairs, inactive ones only pairing with active supplier rungs.
        let first_rung_r = if only_supply {
            rungs_r.lowest_active
        } else {
            rungs_r.lowest_populated
        };

        for &tile_r in tiles_receiver {
            let occupancy = self.receiver.tiling.occupancy(tile_r);
            if !is_receiving(occupancy, only_supply) {
                continue;
            }
            self.receiver.sort_tile(tile_r);
            let index3d_r = self.receiver.tiling.tile_index3d(tile_r);
            let mut count = 0usize;

            for &tile_s in tiles_supplier {
                if !self.supplier.tiling.occupancy(tile_s).is_populated() {
                    continue;
                }
                self.supplier.sort_tile(tile_s);
                let index3d_s = self.supplier.tiling.tile_index3d(tile_s);

                let offset = std::array::from_fn(|d| index3d_s[d] as isize - index3d_r[d] as isize);
                let class = neighbour_class(offset);
                let pairings = self.pairings.class(class);
                let same_tile = self.local && tile_r == tile_s;
                // Centre pairings hold r <= s only, which is a full pairing for distinct tiles
                // once mirrored.
                let mirrored = class == CENTRE_CLASS && !same_tile;

                let receiver = &self.receiver;
                let supplier = &self.supplier;
                for subtile_r in 0..pairings.len() {
                    let (buckets_r, occupancy) = receiver.subtile(tile_r, subtile_r);
                    if !is_receiving(occupancy, only_supply) {
                        continue;
                    }

                    let mirrored_partners = mirrored.then(|| {
                        (0..subtile_r).filter(move |&s| {
                            pairings.partners(s).binary_search(&subtile_r).is_ok()
                        })
                    });
                    let partners = mirrored_partners
                        .into_iter()
                        .flatten()
                        .chain(pairings.partners(subtile_r).iter().copied());

                    for subtile_s in partners {
                        let (buckets_s, occupancy) = supplier.subtile(tile_s, subtile_s);
                        if !occupancy.is_populated() {
                            continue;
                        }
                        let same_subtile = same_tile && subtile_r == subtile_s;

                        for rung_r in first_rung_r..=rungs_r.highest_populated {
                            let bucket_r = &buckets_r[rung_r];
                            if bucket_r.is_empty() {
                                continue;
                            }

                            let (apply_to_i, mut first_rung_s) =
                                if !only_supply && !rungs_r.is_active(rung_r) {
                                    (false, rungs_s.lowest_active)
                                } else {
                                    (true, rungs_s.lowest_populated)
                                };
                            // Lower supplier rungs were paired when they were the receiver rung.
                            if same_subtile {
                                first_rung_s = first_rung_s.max(rung_r);
                            }

                            for rung_s in first_rung_s..=rungs_s.highest_populated {
                                let bucket_s = &buckets_s[rung_s];
                                if bucket_s.is_empty() {
                                    continue;
                                }
                                let apply_to_j = !only_supply && rungs_s.is_active(rung_s);
                                let same_rung = same_subtile && rung_r == rung_s;

                                for (n, &i) in bucket_r.iter().enumerate() {
                                    let rung_i = receiver.effective_rung(i, rung_r);
                                    let start = if same_rung { n + 1 } else { 0 };

                                    for &j in &bucket_s[start..] {
                                        let rung_j = if only_supply {
                                            rung_s
                                        } else {
                                            supplier.effective_rung(j, rung_s)
                                        };

                                        count += 1;
                                        f(PairWork {
                                            i,
                                            j,
                                            rung_i,
                                            rung_j,
                                            separation: pos_r[i] - pos_s[j],
                                            apply_to_i,
                                            apply_to_j,
                                        });
                                    }
                                }
                            }
                        }
                    }
                }
            }
            tracing::trace!(tile = tile_r, pairs = count, "paired receiver tile");
        }
    }
}

const CENTRE_CLASS: usize = N_NEIGHBOUR_CLASSES / 2;

// Re-sorts a top-level tiling that no longer matches its particles.
#[inline]
fn refresh(tiling: &mut Tiling, particles: &Particles) {
    if tiling.refresh(particles) {
        tracing::debug!(tiles = ?tiling.shape(), "re-sorted stale tiling");
    }
}

// Interacting particles only lie in neighbouring tiles if tiles are at least one cutoff wide.
fn check_extent(tiles: &Tiling, interaction: Interaction, cutoff: f64) -> Result<()> {
    let extent = tiles.tile_extent().min_element();
    // Tolerates rounding of the tile extent when the domain is a multiple of the cutoff.
    if extent * (1.0 + 1e-12) < cutoff {
        return Err(Error::TilesNarrowerThanCutoff {
            interaction,
            extent,
            cutoff,
        });
    }
    Ok(())
}

#[inline]
fn is_receiving(occupancy: Occupancy, only_supply: bool) -> bool {
    if only_supply {
        occupancy.is_active()
    } else {
        occupancy.is_populated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ShortRangeParams,
        population::{Domain, TilingName},
        rung::{RungJump, N_RUNGS},
    };
    use rand::prelude::*;
    use std::collections::HashMap;

    fn random_population(name: &str, len: usize, boxsize: f64, seed: u64) -> Population {
        let mut rng = StdRng::seed_from_u64(seed);
        let pos = (0..len)
            .map(|_| DVec3::from_array([0.0; 3].map(|_| rng.gen_range(0.0..boxsize))))
            .collect();
        Population::new(
            name,
            1.0,
            0.0,
            pos,
            vec![DVec3::ZERO; len],
            Domain::from_boxsize(boxsize),
        )
        .unwrap()
    }

    fn collect(
        receiver: &mut Population,
        supplier: Supplier<'_>,
        request: PairRequest<'_>,
        cutoff: f64,
        cache: &mut PairingCache,
    ) -> Vec<PairWork> {
        let (view_r, _) = receiver.split_mut();
        let view_s = match supplier {
            Supplier::Receiver => None,
            Supplier::Other(supplier) => Some(supplier.split_mut().0),
        };
        let mut pairs = Vec::new();
        ParticlePairs::new(view_r, view_s, request, cutoff, 0, cache)
            .unwrap()
            .for_each(|work| pairs.push(work));
        pairs
    }

    fn unordered_counts(pairs: &[PairWork]) -> HashMap<(usize, usize), usize> {
        let mut counts = HashMap::new();
        for work in pairs {
            *counts.entry((work.i.min(work.j), work.i.max(work.j))).or_default() += 1;
        }
        counts
    }

    #[test]
    fn domain_self_pairs_once() {
        let mut population = random_population("matter", 40, 1.0, 7);
        let mut rungs: Vec<u8> = (0..40).map(|i| (i % 3) as u8).collect();
        rungs[0] = 5;
        population.particles.set_rungs(rungs, 0).unwrap();
        population.tile(PairingLevel::Domain, Interaction::Gravity).unwrap();

        let cache = &mut PairingCache::new();
        let request = PairRequest::domain(Interaction::Gravity, 0);
        let pairs = collect(&mut population, Supplier::Receiver, request, f64::INFINITY, cache);

        assert_eq!(pairs.len(), 40 * 39 / 2);
        let counts = unordered_counts(&pairs);
        assert_eq!(counts.len(), 40 * 39 / 2);
        assert!(counts.keys().all(|&(i, j)| i != j));
        assert!(pairs.iter().all(|w| w.apply_to_i && w.apply_to_j));
    }

    #[test]
    fn tile_self_pairs_once() {
        let boxsize = 3.0;
        let cutoff = 1.0;
        let mut population = random_population("matter", 150, boxsize, 11);
        let params = ShortRangeParams::from_scale(0.2)
            .with_cutoff(cutoff)
            .with_subtiles([2, 2, 2]);
        population.init_tilings(Interaction::Gravity, &params).unwrap();

        let tiles = population
            .tilings
            .interaction(Interaction::Gravity)
            .unwrap()
            .tiles
            .clone();
        assert_eq!(tiles.shape(), [3; 3]);

        // Each unordered tile pair is requested once, with periodic neighbours.
        let cache = &mut PairingCache::new();
        let mut pairs = Vec::new();
        for tile_r in 0..tiles.size() {
            let tiles_r = [tile_r];
            let tiles_s: Vec<_> = (tile_r..tiles.size()).collect();
            let request = PairRequest::tiles(Interaction::Gravity, &tiles_r, &tiles_s, 0);
            pairs.extend(collect(
                &mut population,
                Supplier::Receiver,
                request,
                cutoff,
                cache,
            ));
        }

        let counts = unordered_counts(&pairs);
        assert!(counts.values().all(|&count| count == 1));
        assert!(counts.keys().all(|&(i, j)| i != j));

        let pos = population.particles.pos();
        for i in 0..pos.len() {
            for j in (i + 1)..pos.len() {
                let d = pos[i] - pos[j];
                let d = d - (d / boxsize).round() * boxsize;
                if d.length() <= cutoff {
                    assert!(counts.contains_key(&(i, j)), "missing pair {i} {j}");
                }
            }
        }
    }

    #[test]
    fn inactive_pairs_skipped() {
        let mut population = random_population("matter", 30, 1.0, 3);
        let rungs: Vec<u8> = (0..30).map(|i| (i % 4) as u8).collect();
        population.particles.set_rungs(rungs.clone(), 2).unwrap();
        population.tile(PairingLevel::Domain, Interaction::Gravity).unwrap();

        let cache = &mut PairingCache::new();
        let request = PairRequest::domain(Interaction::Gravity, 0);
        let pairs = collect(&mut population, Supplier::Receiver, request, f64::INFINITY, cache);

        let active = |i: usize| rungs[i] >= 2;
        let expected = (0..30)
            .flat_map(|i| ((i + 1)..30).map(move |j| (i, j)))
            .filter(|&(i, j)| active(i) || active(j))
            .count();
        assert_eq!(pairs.len(), expected);
        assert_eq!(unordered_counts(&pairs).len(), expected);

        for work in &pairs {
            assert_eq!(work.apply_to_i, active(work.i));
            assert_eq!(work.apply_to_j, active(work.j));
            assert!(work.apply_to_i || work.apply_to_j);
        }
    }

    #[test]
    fn only_supply_between_populations() {
        let mut receiver = random_population("matter", 12, 1.0, 1);
        let mut supplier = random_population("matter", 9, 1.0, 2);
        receiver
            .particles
            .set_rungs((0..12).map(|i| (i % 2) as u8).collect(), 1)
            .unwrap();
        supplier
            .particles
            .set_rung_jumps(vec![RungJump::Up; 9])
            .unwrap();
        receiver.tile(PairingLevel::Domain, Interaction::Gravity).unwrap();

        let cache = &mut PairingCache::new();
        // Imported from another process.
        let request = PairRequest::domain(Interaction::Gravity, 1).only_supply(true);
        let pairs = collect(
            &mut receiver,
            Supplier::Other(&mut supplier),
            request,
            f64::INFINITY,
            cache,
        );

        assert_eq!(pairs.len(), 6 * 9);
        for work in &pairs {
            assert_eq!(work.i % 2, 1);
            assert!(work.apply_to_i && !work.apply_to_j);
            assert_eq!(work.rung_i, 1);
            assert_eq!(work.rung_j, 0);
            let separation = receiver.particles.pos()[work.i] - supplier.particles.pos()[work.j];
            assert_eq!(work.separation, separation);
        }
    }

    #[test]
    fn distinct_populations_pair_fully() {
        let mut receiver = random_population("matter", 10, 1.0, 5);
        let mut supplier = random_population("neutrinos", 7, 1.0, 6);
        receiver
            .particles
            .set_rung_jumps((0..10).map(|i| [RungJump::Down, RungJump::Stay][i % 2]).collect())
            .unwrap();

        let cache = &mut PairingCache::new();
        let request = PairRequest::domain(Interaction::Gravity, 0);
        let pairs = collect(
            &mut receiver,
            Supplier::Other(&mut supplier),
            request,
            f64::INFINITY,
            cache,
        );

        assert_eq!(pairs.len(), 70);
        for work in &pairs {
            let expected = if work.i % 2 == 0 { N_RUNGS } else { 0 };
            assert_eq!(work.rung_i, expected);
        }
    }

    #[test]
    fn tile_distinct_populations_pair_fully() {
        let cutoff = 1.0;
        let params = ShortRangeParams::from_scale(0.2)
            .with_cutoff(cutoff)
            .with_subtiles([3, 3, 3]);
        let mut receiver = random_population("matter", 40, 3.0, 21);
        let mut supplier = random_population("neutrinos", 40, 3.0, 22);
        receiver.init_tilings(Interaction::Gravity, &params).unwrap();
        supplier.init_tilings(Interaction::Gravity, &params).unwrap();

        let cache = &mut PairingCache::new();
        let tiles: Vec<_> = (0..27).collect();
        let request = PairRequest::tiles(Interaction::Gravity, &tiles, &tiles, 0);
        let pairs = collect(
            &mut receiver,
            Supplier::Other(&mut supplier),
            request,
            cutoff,
            cache,
        );

        let mut seen = std::collections::HashSet::new();
        for work in &pairs {
            assert!(seen.insert((work.i, work.j)), "pair visited twice");
        }

        let (pos_r, pos_s) = (receiver.particles.pos(), supplier.particles.pos());
        for (i, &r) in pos_r.iter().enumerate() {
            for (j, &s) in pos_s.iter().enumerate() {
                let d = r - s;
                let d = d - (d / 3.0).round() * 3.0;
                if d.length() <= cutoff {
                    assert!(seen.contains(&(i, j)), "missing pair {i} {j}");
                }
            }
        }
    }

    #[test]
    fn tiles_narrower_than_cutoff() {
        let mut population = random_population("matter", 20, 4.0, 13);
        let params = ShortRangeParams::from_scale(0.2).with_cutoff(0.25);
        population.init_tilings(Interaction::Gravity, &params).unwrap();

        let cache = &mut PairingCache::new();
        let tiles = [0];
        let request = PairRequest::tiles(Interaction::Gravity, &tiles, &tiles, 0);
        let (view, _) = population.split_mut();
        let result = ParticlePairs::new(view, None, request, 1.0, 0, cache);
        assert_eq!(
            result.err(),
            Some(Error::TilesNarrowerThanCutoff {
                interaction: Interaction::Gravity,
                extent: 0.25,
                cutoff: 1.0,
            })
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn mismatched_subtilings() {
        let params = ShortRangeParams::from_scale(0.2).with_cutoff(1.0);
        let mut receiver = random_population("matter", 10, 3.0, 14);
        let mut supplier = random_population("neutrinos", 10, 3.0, 15);
        receiver
            .init_tilings(Interaction::Gravity, &params.with_subtiles([2, 2, 2]))
            .unwrap();
        supplier
            .init_tilings(Interaction::Gravity, &params.with_subtiles([3, 3, 3]))
            .unwrap();

        let cache = &mut PairingCache::new();
        let tiles = [0];
        let request = PairRequest::tiles(Interaction::Gravity, &tiles, &tiles, 0);
        let (view_r, _) = receiver.split_mut();
        let (view_s, _) = supplier.split_mut();
        let result = ParticlePairs::new(view_r, Some(view_s), request, 1.0, 0, cache);
        assert_eq!(
            result.err(),
            Some(Error::MismatchedSubtiling(Interaction::Gravity))
        );
    }

    #[test]
    fn single_subtile_pairs_once() {
        let boxsize = 3.0;
        let cutoff = 1.0;
        let mut population = random_population("matter", 120, boxsize, 17);
        let params = ShortRangeParams::from_scale(0.2).with_cutoff(cutoff);
        population.init_tilings(Interaction::Gravity, &params).unwrap();

        let cache = &mut PairingCache::new();
        let mut pairs = Vec::new();
        for tile_r in 0..27 {
            let tiles_r = [tile_r];
            let tiles_s: Vec<_> = (tile_r..27).collect();
            let request = PairRequest::tiles(Interaction::Gravity, &tiles_r, &tiles_s, 0);
            pairs.extend(collect(
                &mut population,
                Supplier::Receiver,
                request,
                cutoff,
                cache,
            ));
        }

        // Tiles are paired directly, without a second subtiling.
        assert!(population
            .tilings
            .get(&TilingName::SubtilesSecondary(Interaction::Gravity))
            .is_none());

        let counts = unordered_counts(&pairs);
        assert!(counts.values().all(|&count| count == 1));
        let pos = population.particles.pos();
        for i in 0..pos.len() {
            for j in (i + 1)..pos.len() {
                let d = pos[i] - pos[j];
                let d = d - (d / boxsize).round() * boxsize;
                if d.length() <= cutoff {
                    assert!(counts.contains_key(&(i, j)), "missing pair {i} {j}");
                }
            }
        }
    }

    #[test]
    fn lowered_active_rung_receives() {
        let mut receiver = random_population("matter", 3, 1.0, 18);
        let mut supplier = random_population("neutrinos", 2, 1.0, 19);
        receiver.particles.set_rungs(vec![1; 3], 2).unwrap();
        receiver.tile(PairingLevel::Domain, Interaction::Gravity).unwrap();
        assert!(!receiver.tilings.trivial().occupancy(0).is_active());

        receiver.particles.set_lowest_active(1);
        let cache = &mut PairingCache::new();
        let request = PairRequest::domain(Interaction::Gravity, 1).only_supply(true);
        let pairs = collect(
            &mut receiver,
            Supplier::Other(&mut supplier),
            request,
            f64::INFINITY,
            cache,
        );

        assert_eq!(pairs.len(), 6);
        assert!(pairs.iter().all(|w| w.apply_to_i && w.rung_i == 1));
        assert!(receiver.tilings.trivial().occupancy(0).is_active());
    }

    #[test]
    fn moved_particles_resorted() {
        let params = ShortRangeParams::from_scale(0.2).with_cutoff(1.0);
        let mut population = random_population("matter", 2, 3.0, 20);
        population.particles.pos_mut()[0] = DVec3::splat(0.5);
        population.particles.pos_mut()[1] = DVec3::splat(2.5);
        population.init_tilings(Interaction::Gravity, &params).unwrap();

        // Both particles move into the central tile without re-tiling.
        population.particles.pos_mut()[0] = DVec3::splat(1.4);
        population.particles.pos_mut()[1] = DVec3::splat(1.6);

        let cache = &mut PairingCache::new();
        let tiles = [13];
        let request = PairRequest::tiles(Interaction::Gravity, &tiles, &tiles, 0);
        let pairs = collect(&mut population, Supplier::Receiver, request, 1.0, cache);
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn rung_jumps_ignored_without_rungs() {
        let mut population = random_population("matter", 5, 1.0, 9).with_rungs(false);
        population
            .particles
            .set_rung_jumps(vec![RungJump::Up; 5])
            .unwrap();

        let cache = &mut PairingCache::new();
        let request = PairRequest::domain(Interaction::Gravity, 0);
        let pairs = collect(&mut population, Supplier::Receiver, request, f64::INFINITY, cache);
        assert_eq!(pairs.len(), 10);
        assert!(pairs.iter().all(|w| w.rung_i == 0 && w.rung_j == 0));
    }
}
