#![warn(missing_docs)]
//! # Pairgrav
//!
//! Pairgrav is the particle-particle part of a tiled gravity solver for distributed cosmological
//! N-body simulations.
//!
//! ## Goals
//!
//! The crate pairs up particles that are close enough to interact and applies the resulting
//! momentum changes, either for the full Newtonian force with periodic corrections or for the
//! short-range part of a long/short-range split of the force. It does not include anything related
//! to mesh solvers, time integration or communication between processes, and instead only focuses
//! on pairing particles and kicking them.
//!
//! ### Tiles and subtiles
//!
//! The domain owned by a process is divided into tiles at least one cutoff wide, so that
//! interacting particles always lie in the same or neighbouring tiles. Each tile is further
//! divided into subtiles when it is paired, and subtiles of two tiles are only paired if they lie
//! within the cutoff of each other. The subtiles paired for each of the 27 ways two tiles can
//! neighbour each other are computed once per subtiling geometry and cutoff, and cached in a
//! [`PairingCache`].
//!
//! Within subtiles, particles are bucketed by rung (time step level) so that only pairs where at
//! least one particle is due for a kick are visited.
//!
//! Enable the `parallel` feature to build subtile pairings on multiple threads with
//! [rayon](https://github.com/rayon-rs/rayon).
//!
//! ## Using Pairgrav
//!
//! A [`Population`] holds particles sharing their mass and softening length. A [`Gravity`] engine
//! applies the force a supplier population exerts on a receiver population, the supplier being
//! the receiver itself, another local population or particles imported from another process.
//!
//! ```
//! use pairgrav::prelude::*;
//! use glam::DVec3;
//!
//! let boxsize = 4.0;
//! let params = ShortRangeParams::from_scale(0.25).with_subtiles([2, 2, 2]);
//! let config = Config::new(boxsize, 1.0)
//!     .with_shortrange(Interaction::Gravity, params)
//!     .with_table_size(1 << 12);
//! let mut gravity = Gravity::new(config, Context::new(0))?;
//!
//! let pos = vec![DVec3::splat(1.0), DVec3::splat(1.5), DVec3::splat(3.9)];
//! let mom = vec![DVec3::ZERO; 3];
//! let mut matter = Population::new("matter", 1.0, 0.01, pos, mom, Domain::from_boxsize(boxsize))?;
//! matter.init_tilings(Interaction::Gravity, &params)?;
//!
//! // Each pair of tiles is requested once. With three tiles per axis, all tiles neighbour each
//! // other through the periodic boundaries.
//! let tiles = matter.tilings.interaction(Interaction::Gravity)?.tiles.size();
//! let factors = GravityFactors::uniform(1e-3);
//! for tile in 0..tiles {
//!     let receivers = [tile];
//!     let suppliers: Vec<_> = (tile..tiles).collect();
//!     let request = PairRequest::tiles(Interaction::Gravity, &receivers, &suppliers, 0);
//!     gravity.pairwise_shortrange(&mut matter, Supplier::Receiver, request, &factors)?;
//! }
//!
//! let total: DVec3 = matter.momenta.mom.iter().sum();
//! assert!(total.length() < 1e-12);
//! # Ok::<(), pairgrav::Error>(())
//! ```
//!
//! Pairs can also be enumerated without applying any force with [`Gravity::particle_pairs`].

/// Configuration of the interactions.
pub mod config;
/// Errors returned when setting up interactions.
pub mod error;
/// Gravitational kernels and potentials.
pub mod gravity;
/// Canonical neighbour classes and cached subtile pairings.
pub mod pairing;
/// Enumeration of the particle pairs of a receiver and a supplier.
pub mod pairs;
/// Populations of particles and their tilings.
pub mod population;
/// Time step levels of particles.
pub mod rung;
/// Regular grids of tiles sorting particles by position and rung.
pub mod tiling;

pub use config::*;
pub use error::{Error, Result};
pub use gravity::Gravity;
pub use pairing::PairingCache;
pub use pairs::*;
pub use population::*;

/// Most commonly used types.
pub mod prelude {
    pub use crate::{
        config::{Config, Interaction, ShortRangeParams},
        error::Error,
        gravity::{Ewald, Gravity, GravityFactors, NoEwald},
        pairs::{Context, PairRequest, PairWork, Supplier},
        population::{Domain, PairingLevel, Population},
        rung::{RungJump, N_RUNGS},
    };
}
