use approx::assert_relative_eq;
use glam::DVec3;
use pairgrav::prelude::*;
use rand::prelude::*;
use std::collections::HashMap;

const BOXSIZE: f64 = 4.0;
const SCALE: f64 = 0.2;

fn params() -> ShortRangeParams {
    // Four tiles and eight subtiles per tile along each axis.
    ShortRangeParams::from_scale(SCALE).with_subtiles([2, 2, 2])
}

fn gravity() -> Gravity {
    let config = Config::new(BOXSIZE, 1.0)
        .with_shortrange(Interaction::Gravity, params())
        .with_table_size(1 << 16);
    Gravity::new(config, Context::new(0)).unwrap()
}

fn random_population(name: &str, len: usize, seed: u64) -> Population {
    let mut rng = StdRng::seed_from_u64(seed);
    let pos = (0..len)
        .map(|_| DVec3::from_array([0.0; 3].map(|_| rng.gen_range(0.0..BOXSIZE))))
        .collect();
    let mut population = Population::new(
        name,
        1.0,
        0.01,
        pos,
        vec![DVec3::ZERO; len],
        Domain::from_boxsize(BOXSIZE),
    )
    .unwrap();
    population.init_tilings(Interaction::Gravity, &params()).unwrap();
    population
}

fn tile_count(population: &Population) -> usize {
    population
        .tilings
        .interaction(Interaction::Gravity)
        .unwrap()
        .tiles
        .size()
}

// Neighbouring tiles of `tile` with an index at least as high, so that each unordered pair of
// tiles is visited once.
fn half_shell(population: &Population, tile: usize) -> Vec<usize> {
    let tiles = &population
        .tilings
        .interaction(Interaction::Gravity)
        .unwrap()
        .tiles;
    tiles
        .periodic_neighbours(tile)
        .into_iter()
        .filter(|&s| s >= tile)
        .collect()
}

fn min_image_distance(a: DVec3, b: DVec3) -> f64 {
    let d = a - b;
    (d - (d / BOXSIZE).round() * BOXSIZE).length()
}

fn self_pairs(
    gravity: &mut Gravity,
    population: &mut Population,
) -> HashMap<(usize, usize), usize> {
    let mut counts = HashMap::new();
    for tile in 0..tile_count(population) {
        let receivers = [tile];
        let suppliers = half_shell(population, tile);
        let request = PairRequest::tiles(Interaction::Gravity, &receivers, &suppliers, 0);
        let (view, _) = population.split_mut();
        gravity
            .particle_pairs(view, None, request)
            .unwrap()
            .for_each(|work| {
                let key = (work.i.min(work.j), work.i.max(work.j));
                *counts.entry(key).or_default() += 1;
            });
    }
    counts
}

#[test]
fn tile_pairs_cover_cutoff_once() {
    let mut gravity = gravity();
    let mut population = random_population("matter", 400, 42);
    assert_eq!(tile_count(&population), 64);

    let counts = self_pairs(&mut gravity, &mut population);
    assert!(counts.values().all(|&count| count == 1));
    assert!(counts.keys().all(|&(i, j)| i != j));

    let pos = population.particles.pos();
    let cutoff = params().cutoff;
    let mut within = 0;
    for i in 0..pos.len() {
        for j in (i + 1)..pos.len() {
            if min_image_distance(pos[i], pos[j]) <= cutoff {
                within += 1;
                assert!(counts.contains_key(&(i, j)), "missing pair ({i}, {j})");
            }
        }
    }
    assert!(within > 0);
    // Subtiles prune most of the far pairs.
    assert!(counts.len() < pos.len() * (pos.len() - 1) / 2);

    // One cached entry serves every tile.
    assert_eq!(gravity.pairings().len(), 1);
}

#[test]
fn tiles_agree_with_domain() {
    let mut gravity = gravity();
    let mut tiled = random_population("matter", 300, 7);
    let mut whole = tiled.clone();
    let factors = GravityFactors::uniform(1e-4);

    for tile in 0..tile_count(&tiled) {
        let receivers = [tile];
        let suppliers = half_shell(&tiled, tile);
        let request = PairRequest::tiles(Interaction::Gravity, &receivers, &suppliers, 0);
        gravity
            .pairwise_shortrange(&mut tiled, Supplier::Receiver, request, &factors)
            .unwrap();
    }

    let request = PairRequest::domain(Interaction::Gravity, 0);
    gravity
        .pairwise_shortrange(&mut whole, Supplier::Receiver, request, &factors)
        .unwrap();

    for (tiled, whole) in tiled.momenta.mom.iter().zip(&whole.momenta.mom) {
        assert_relative_eq!(tiled.x, whole.x, epsilon = 1e-12, max_relative = 1e-9);
        assert_relative_eq!(tiled.y, whole.y, epsilon = 1e-12, max_relative = 1e-9);
        assert_relative_eq!(tiled.z, whole.z, epsilon = 1e-12, max_relative = 1e-9);
    }
}

#[test]
fn inactive_particles_not_kicked() {
    let mut gravity = gravity();
    let mut population = random_population("matter", 200, 3);
    let rungs: Vec<u8> = (0..200).map(|i| (i % N_RUNGS) as u8).collect();
    population.particles.set_rungs(rungs.clone(), 5).unwrap();
    population
        .tile(PairingLevel::Tile, Interaction::Gravity)
        .unwrap();

    let factors = GravityFactors::uniform(1e-4);
    for tile in 0..tile_count(&population) {
        let receivers = [tile];
        let suppliers = half_shell(&population, tile);
        let request = PairRequest::tiles(Interaction::Gravity, &receivers, &suppliers, 0);
        gravity
            .pairwise_shortrange(&mut population, Supplier::Receiver, request, &factors)
            .unwrap();
    }

    let mom = &population.momenta.mom;
    for (i, &rung) in rungs.iter().enumerate() {
        if rung < 5 {
            assert_eq!(mom[i], DVec3::ZERO, "inactive particle {i} kicked");
        }
    }
    assert!(mom.iter().any(|&m| m != DVec3::ZERO));

    // Pairs of inactive particles are never visited.
    let counts = self_pairs(&mut gravity, &mut population);
    assert!(counts.keys().all(|&(i, j)| rungs[i] >= 5 || rungs[j] >= 5));
}

#[test]
fn remote_kicks_deferred() {
    let factors = GravityFactors::uniform(1e-4);
    let receiver = random_population("matter", 150, 11);
    let supplier = random_population("neutrinos", 150, 12);

    let run = |rank_supplier: usize| {
        let mut gravity = gravity();
        let (mut receiver, mut supplier) = (receiver.clone(), supplier.clone());
        for tile in 0..tile_count(&receiver) {
            let receivers = [tile];
            let suppliers = receiver
                .tilings
                .interaction(Interaction::Gravity)
                .unwrap()
                .tiles
                .periodic_neighbours(tile);
            let request =
                PairRequest::tiles(Interaction::Gravity, &receivers, &suppliers, rank_supplier);
            gravity
                .pairwise_shortrange(
                    &mut receiver,
                    Supplier::Other(&mut supplier),
                    request,
                    &factors,
                )
                .unwrap();
        }
        (receiver, supplier)
    };

    let (local_r, local_s) = run(0);
    let (remote_r, mut remote_s) = run(1);

    assert_eq!(local_r.momenta.mom, remote_r.momenta.mom);
    assert!(local_s.momenta.delta_mom.iter().all(|&m| m == DVec3::ZERO));
    assert!(remote_s.momenta.mom.iter().all(|&m| m == DVec3::ZERO));

    remote_s.apply_deferred();
    assert_eq!(local_s.momenta.mom, remote_s.momenta.mom);

    let total: DVec3 = local_r
        .momenta
        .mom
        .iter()
        .chain(&local_s.momenta.mom)
        .sum();
    assert!(local_r.momenta.mom.iter().any(|&m| m != DVec3::ZERO));
    assert!(total.length() < 1e-12);
}
