use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Noisy straight tracks in the interchange layout `[track_id, time, coords..]`.
///
/// Each track runs its own line from a start drawn in `[5, 25)` per axis to
/// an end drawn in `[60, 80)`, sampled at `n_steps` frames with additive
/// Gaussian noise of standard deviation `noise`. Row order is track-major:
/// row `k * n_steps + s` holds track `k + 1` at time `s`.
pub fn noisy_lines(
    n_tracks: usize,
    n_steps: usize,
    dim: usize,
    noise: f64,
    seed: u64,
) -> DMatrix<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut flat = Vec::with_capacity(n_tracks * n_steps * (2 + dim));

    for track in 0..n_tracks {
        let start: Vec<f64> = (0..dim).map(|_| rng.random_range(5.0..25.0)).collect();
        let stop: Vec<f64> = (0..dim).map(|_| rng.random_range(60.0..80.0)).collect();
        for step in 0..n_steps {
            let w = if n_steps > 1 {
                step as f64 / (n_steps - 1) as f64
            } else {
                0.0
            };
            flat.push((track + 1) as f64);
            flat.push(step as f64);
            for d in 0..dim {
                let jitter: f64 = rng.sample(StandardNormal);
                flat.push(start[d] + w * (stop[d] - start[d]) + noise * jitter);
            }
        }
    }

    DMatrix::from_row_slice(n_tracks * n_steps, 2 + dim, &flat)
}
