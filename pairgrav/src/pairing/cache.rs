use crate::{
    pairing::{neighbour_offset, N_NEIGHBOUR_CLASSES},
    tiling::Tiling,
};
use std::collections::HashMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Supplier subtiles paired with each receiver subtile, for one neighbour class.
///
/// Partners of all receiver subtiles are stored contiguously, without spare capacity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NeighbourPairings {
    offsets: Vec<usize>,
    partners: Vec<usize>,
}

impl NeighbourPairings {
    /// Pairs the subtiles of a receiver tile with those of a supplier tile located `offset` tiles
    /// away, keeping pairs within `cutoff` of each other.
    ///
    /// When `offset` is zero the tile is paired with itself and only pairs `(r, s)` with
    /// `r <= s` are kept.
    pub fn new(subtiling: &Tiling, offset: [isize; 3], cutoff: f64) -> Self {
        let size = subtiling.size();
        let shape = subtiling.shape();
        let extent = subtiling.tile_extent().to_array();
        let same_tile = offset == [0; 3];

        let mut offsets = Vec::with_capacity(size + 1);
        let mut partners = Vec::new();
        offsets.push(0);

        for r in 0..size {
            // Index of the receiver subtile in the frame of the supplier tile.
            let index3d_r = subtiling.tile_index3d(r);
            let shifted: [isize; 3] =
                std::array::from_fn(|d| index3d_r[d] as isize - offset[d] * shape[d] as isize);

            if cutoff > 0.0 {
                let start = if same_tile { r } else { 0 };
                partners.extend((start..size).filter(|&s| {
                    let index3d_s = subtiling.tile_index3d(s);
                    let r2: f64 = (0..3)
                        .map(|d| {
                            // Subtiles apart along an axis are one subtile closer than their
                            // index difference, as they are separated by their facing sides.
                            let cells = (shifted[d] - index3d_s[d] as isize).unsigned_abs();
                            (cells.saturating_sub(1) as f64 * extent[d]).powi(2)
                        })
                        .sum();
                    r2 <= cutoff * cutoff
                }));
            }
            offsets.push(partners.len());
        }
        partners.shrink_to_fit();

        Self { offsets, partners }
    }

    /// Supplier subtiles paired with the receiver subtile `r`, in increasing order.
    #[inline]
    pub fn partners(&self, r: usize) -> &[usize] {
        &self.partners[self.offsets[r]..self.offsets[r + 1]]
    }

    /// Number of receiver subtiles.
    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Returns true if there are no receiver subtiles.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of subtile pairs.
    #[inline]
    pub fn pair_count(&self) -> usize {
        self.partners.len()
    }
}

/// Subtile pairings for each of the [`N_NEIGHBOUR_CLASSES`] neighbour classes of a subtiling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubtilePairings {
    classes: Vec<NeighbourPairings>,
}

impl SubtilePairings {
    /// Computes the pairings of every neighbour class for the given subtiling and cutoff.
    ///
    /// A non-positive cutoff results in no pairs at all.
    pub fn new(subtiling: &Tiling, cutoff: f64) -> Self {
        #[cfg(feature = "parallel")]
        let classes = (0..N_NEIGHBOUR_CLASSES)
            .into_par_iter()
            .map(|class| NeighbourPairings::new(subtiling, neighbour_offset(class), cutoff))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let classes = (0..N_NEIGHBOUR_CLASSES)
            .map(|class| NeighbourPairings::new(subtiling, neighbour_offset(class), cutoff))
            .collect();

        Self { classes }
    }

    /// Pairings of the given neighbour class, see [`neighbour_class`](super::neighbour_class).
    #[inline]
    pub fn class(&self, class: usize) -> &NeighbourPairings {
        &self.classes[class]
    }

    /// Total number of subtile pairs over all neighbour classes.
    #[inline]
    pub fn pair_count(&self) -> usize {
        self.classes.iter().map(NeighbourPairings::pair_count).sum()
    }
}

/// Stable handle to an entry of a [`PairingCache`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PairingHandle(usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PairingKey {
    shape: [usize; 3],
    extent: [u64; 3],
    cutoff: u64,
}

impl PairingKey {
    #[inline]
    fn new(subtiling: &Tiling, cutoff: f64) -> Self {
        Self {
            shape: subtiling.shape(),
            extent: subtiling.tile_extent().to_array().map(f64::to_bits),
            cutoff: cutoff.to_bits(),
        }
    }
}

/// Memoized [`SubtilePairings`], keyed by subtiling geometry and cutoff.
///
/// Subtile pairings only depend on the shape and subtile extent of a subtiling, not on where it
/// is located, so relocated subtilings and subtilings of other populations with the same geometry
/// share their entries. Entries are never evicted.
#[derive(Clone, Debug, Default)]
pub struct PairingCache {
    entries: Vec<SubtilePairings>,
    indices: HashMap<PairingKey, PairingHandle>,
}

impl PairingCache {
    /// Creates an empty cache.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle of the pairings of `subtiling` with the given cutoff, computing them if
    /// they are not cached yet.
    pub fn get_pairing(&mut self, subtiling: &Tiling, cutoff: f64) -> PairingHandle {
        let key = PairingKey::new(subtiling, cutoff);
        if let Some(&handle) = self.indices.get(&key) {
            return handle;
        }

        let pairings = SubtilePairings::new(subtiling, cutoff);
        tracing::debug!(
            shape = ?subtiling.shape(),
            cutoff,
            pairs = pairings.pair_count(),
            "built subtile pairings"
        );

        let handle = PairingHandle(self.entries.len());
        self.entries.push(pairings);
        self.indices.insert(key, handle);
        handle
    }

    /// Returns the pairings behind the given handle.
    #[inline]
    pub fn get(&self, handle: PairingHandle) -> &SubtilePairings {
        &self.entries[handle.0]
    }

    /// Number of cached entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of subtile pairs stored over all entries.
    #[inline]
    pub fn pair_count(&self) -> usize {
        self.entries.iter().map(SubtilePairings::pair_count).sum()
    }
}
