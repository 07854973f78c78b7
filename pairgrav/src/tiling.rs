use crate::{
    error::{Error, Result},
    population::Particles,
    rung::N_RUNGS,
};
use glam::DVec3;

/// Content of a tile with respect to the active rungs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Occupancy {
    /// The tile holds no particle.
    #[default]
    Empty,
    /// The tile holds particles, none of them on an active rung.
    Inactive,
    /// The tile holds at least one particle on an active rung.
    Active,
}

impl Occupancy {
    /// Returns true if the tile holds any particle.
    #[inline]
    pub const fn is_populated(self) -> bool {
        !matches!(self, Self::Empty)
    }

    /// Returns true if the tile holds a particle on an active rung.
    #[inline]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Particle indices of a tile, bucketed by rung.
pub type RungBuckets = [Vec<usize>; N_RUNGS];

/// Regular 3D grid of tiles over a box, holding the indices of the particles inside each tile.
///
/// Tiles are numbered in row-major order, with the last axis varying fastest. Within a tile,
/// particle indices are bucketed by rung and keep the order in which they were sorted.
///
/// A tiling sorted with [`sort_all`](Self::sort_all) remembers the
/// [generation](Particles::generation) of the particles it was sorted with, so that it can tell
/// when moved particles or changed rungs have made it stale.
#[derive(Clone, Debug)]
pub struct Tiling {
    shape: [usize; 3],
    location: DVec3,
    tile_extent: DVec3,
    buckets: Vec<RungBuckets>,
    occupancy: Vec<Occupancy>,
    generation: Option<u64>,
}

impl Tiling {
    /// Creates an empty tiling of the box starting at `location` with the given `extent`, divided
    /// into `shape` tiles.
    pub fn new(shape: [usize; 3], location: DVec3, extent: DVec3) -> Result<Self> {
        if shape.contains(&0) {
            return Err(Error::InvalidTilingShape(shape));
        }

        let size = shape.iter().product();
        let tile_extent = extent / DVec3::new(shape[0] as f64, shape[1] as f64, shape[2] as f64);

        Ok(Self {
            shape,
            location,
            tile_extent,
            buckets: (0..size)
                .map(|_| std::array::from_fn(|_| Vec::new()))
                .collect(),
            occupancy: vec![Occupancy::Empty; size],
            generation: None,
        })
    }

    /// Creates an empty tiling made of a single tile covering the box.
    #[inline]
    pub fn trivial(location: DVec3, extent: DVec3) -> Self {
        Self {
            shape: [1; 3],
            location,
            tile_extent: extent,
            buckets: vec![std::array::from_fn(|_| Vec::new())],
            occupancy: vec![Occupancy::Empty],
            generation: None,
        }
    }

    /// Number of tiles along each axis.
    #[inline]
    pub const fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Total number of tiles.
    #[inline]
    pub fn size(&self) -> usize {
        self.occupancy.len()
    }

    /// Returns true if the tiling consists of a single tile.
    #[inline]
    pub fn is_trivial(&self) -> bool {
        self.shape == [1; 3]
    }

    /// Lower corner of the tiled box.
    #[inline]
    pub const fn location(&self) -> DVec3 {
        self.location
    }

    /// Side lengths of a single tile.
    #[inline]
    pub const fn tile_extent(&self) -> DVec3 {
        self.tile_extent
    }

    /// Moves the tiled box so that its lower corner is at `location`, keeping its extent.
    ///
    /// Tile contents are left untouched and have to be re-sorted.
    #[inline]
    pub fn relocate(&mut self, location: DVec3) {
        self.location = location;
    }

    /// Converts a 1D tile index to a 3D one.
    #[inline]
    pub fn tile_index3d(&self, index: usize) -> [usize; 3] {
        let [_, ny, nz] = self.shape;
        [index / (ny * nz), (index / nz) % ny, index % nz]
    }

    /// Converts a 3D tile index to a 1D one.
    #[inline]
    pub fn tile_index(&self, [i, j, k]: [usize; 3]) -> usize {
        let [_, ny, nz] = self.shape;
        (i * ny + j) * nz + k
    }

    /// Lower corner of the tile with the given index.
    #[inline]
    pub fn tile_location(&self, index: usize) -> DVec3 {
        let [i, j, k] = self.tile_index3d(index);
        self.location + DVec3::new(i as f64, j as f64, k as f64) * self.tile_extent
    }

    /// Indices of the tiles neighbouring the tile `tile_index` when the tiling wraps around
    /// periodically, the tile itself included, in increasing order.
    pub fn periodic_neighbours(&self, tile_index: usize) -> Vec<usize> {
        let index3d = self.tile_index3d(tile_index);
        let mut neighbours: Vec<_> = (0..27)
            .map(|n| {
                let offset = [n / 9, (n / 3) % 3, n % 3];
                self.tile_index(std::array::from_fn(|d| {
                    (index3d[d] + self.shape[d] + offset[d] - 1) % self.shape[d]
                }))
            })
            .collect();
        neighbours.sort_unstable();
        neighbours.dedup();
        neighbours
    }

    /// Index of the tile containing `position`.
    ///
    /// Positions outside of the box are assigned to the closest boundary tile.
    #[inline]
    pub fn tile_of(&self, position: DVec3) -> usize {
        let scaled = ((position - self.location) / self.tile_extent).to_array();
        self.tile_index(std::array::from_fn(|dim| {
            (scaled[dim].max(0.0) as usize).min(self.shape[dim] - 1)
        }))
    }

    /// Sorts every particle into the tiles.
    pub fn sort_all(&mut self, particles: &Particles) {
        self.clear();
        for (i, (&position, &rung)) in particles.pos().iter().zip(particles.rungs()).enumerate() {
            let tile = self.tile_of(position);
            self.buckets[tile][rung as usize].push(i);
        }
        self.update_occupancy(particles.rung_state().lowest_active);
        self.generation = Some(particles.generation());
    }

    /// Returns true if the tiling was last sorted with [`sort_all`](Self::sort_all) against the
    /// current state of `particles`.
    #[inline]
    pub fn is_sorted_for(&self, particles: &Particles) -> bool {
        self.generation == Some(particles.generation())
    }

    /// Sorts every particle into the tiles unless the tiling is already up to date, returning
    /// true if it had to be sorted.
    pub fn refresh(&mut self, particles: &Particles) -> bool {
        if self.is_sorted_for(particles) {
            return false;
        }
        self.sort_all(particles);
        true
    }

    /// Sorts the particles of the tile `tile_index` of `parent` into the tiles of this tiling,
    /// typically a subtiling relocated onto that tile.
    pub fn sort(&mut self, parent: &Tiling, tile_index: usize, particles: &Particles) {
        self.clear();
        self.generation = None;
        let pos = particles.pos();
        for (rung, bucket) in parent.buckets[tile_index].iter().enumerate() {
            for &i in bucket {
                let tile = self.tile_of(pos[i]);
                self.buckets[tile][rung].push(i);
            }
        }
        self.update_occupancy(particles.rung_state().lowest_active);
    }

    /// Particle indices in the given tile and rung.
    #[inline]
    pub fn rung_bucket(&self, tile_index: usize, rung: usize) -> &[usize] {
        &self.buckets[tile_index][rung]
    }

    /// Particle indices in the given tile, bucketed by rung.
    #[inline]
    pub fn buckets(&self, tile_index: usize) -> &RungBuckets {
        &self.buckets[tile_index]
    }

    /// Number of particles on each rung of the given tile.
    #[inline]
    pub fn rung_counts(&self, tile_index: usize) -> [usize; N_RUNGS] {
        std::array::from_fn(|rung| self.buckets[tile_index][rung].len())
    }

    /// Number of particles in the given tile.
    #[inline]
    pub fn count(&self, tile_index: usize) -> usize {
        self.buckets[tile_index].iter().map(Vec::len).sum()
    }

    /// Content of the given tile with respect to the active rungs.
    #[inline]
    pub fn occupancy(&self, tile_index: usize) -> Occupancy {
        self.occupancy[tile_index]
    }

    fn clear(&mut self) {
        self.buckets.iter_mut().flatten().for_each(Vec::clear);
    }

    fn update_occupancy(&mut self, lowest_active: usize) {
        for (occupancy, buckets) in self.occupancy.iter_mut().zip(&self.buckets) {
            *occupancy = if buckets[lowest_active..].iter().any(|b| !b.is_empty()) {
                Occupancy::Active
            } else if buckets[..lowest_active].iter().any(|b| !b.is_empty()) {
                Occupancy::Inactive
            } else {
                Occupancy::Empty
            };
        }
    }
}
