/// Cached subtile pairings.
pub mod cache;

pub use cache::*;

/// Number of ways two tiles can neighbour each other, themselves included.
pub const N_NEIGHBOUR_CLASSES: usize = 27;

/// Maps the 3D offset between two neighbouring tiles to one of the [`N_NEIGHBOUR_CLASSES`]
/// neighbour classes.
///
/// Neighbouring tiles are at most one tile apart along each axis. Larger offsets stem from pairs
/// connected through a periodic boundary and are folded back: an offset above `1` is the same
/// neighbour as `-1` and an offset below `-1` is the same neighbour as `+1`.
#[inline]
pub fn neighbour_class(offset: [isize; 3]) -> usize {
    offset
        .map(|o| match o {
            o if o > 1 => -1,
            o if o < -1 => 1,
            o => o,
        })
        .iter()
        .fold(0, |class, &o| class * 3 + (o + 1) as usize)
}

/// Offset between neighbouring tiles corresponding to the given neighbour class.
#[inline]
pub fn neighbour_offset(class: usize) -> [isize; 3] {
    debug_assert!(class < N_NEIGHBOUR_CLASSES);
    [class / 9, (class / 3) % 3, class % 3].map(|o| o as isize - 1)
}
