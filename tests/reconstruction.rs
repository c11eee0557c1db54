mod common;

use approx::assert_abs_diff_eq;
use common::noisy_lines;
use driftcast::Driftcast;
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Build a timed query `[time, coords..]` from one row of the data table.
fn timed_query(data: &DMatrix<f64>, row: usize) -> DMatrix<f64> {
    let dim = data.ncols() - 2;
    let mut flat = vec![data[(row, 1)]];
    flat.extend((0..dim).map(|d| data[(row, 2 + d)]));
    DMatrix::from_row_slice(1, 1 + dim, &flat)
}

#[test]
fn single_track_is_replayed_exactly_without_jitter() {
    // One noisy 3-D track: every step model holds exactly one training pair,
    // so the walk must ride the stored positions bit for bit.
    let data = noisy_lines(1, 60, 3, 1.0, 7);
    let mut engine = Driftcast::builder()
        .data(data.clone())
        .radius(5.0)
        .n_samples(25)
        .build();

    let mut rng = StdRng::seed_from_u64(1);
    let rows = engine
        .run(&timed_query(&data, 0), &mut rng)
        .unwrap()
        .into_tracks()
        .unwrap();

    assert_eq!(rows.shape(), (25 * 60, 5));
    for sample in 0..25 {
        for step in 0..60 {
            let row = sample * 60 + step;
            assert_eq!(rows[(row, 1)], step as f64);
            for d in 0..3 {
                assert_eq!(rows[(row, 2 + d)], data[(step, 2 + d)]);
            }
        }
    }
}

#[test]
fn jitter_averages_back_onto_the_track() {
    let data = noisy_lines(1, 30, 2, 0.8, 3);
    let mut engine = Driftcast::builder()
        .data(data.clone())
        .radius(5.0)
        .n_samples(200)
        .sigma(0.5)
        .build();

    let mut rng = StdRng::seed_from_u64(2);
    let rows = engine
        .run(&timed_query(&data, 0), &mut rng)
        .unwrap()
        .into_tracks()
        .unwrap();
    assert_eq!(rows.shape(), (200 * 30, 4));

    // The per-step sample mean stays well within the jitter amplitude of the
    // underlying track.
    for step in 0..30 {
        for d in 0..2 {
            let mean: f64 = (0..200)
                .map(|sample| rows[(sample * 30 + step, 2 + d)])
                .sum::<f64>()
                / 200.0;
            assert_abs_diff_eq!(mean, data[(step, 2 + d)], epsilon = 0.5);
        }
    }
}

#[test]
fn reverse_traversal_replays_the_track_backward() {
    let data = noisy_lines(1, 40, 2, 0.5, 5);
    let mut engine = Driftcast::builder()
        .data(data.clone())
        .radius(5.0)
        .n_samples(2)
        .reverse(true)
        .build();

    // A bare query starts at the traversal head, which is now the last frame.
    let last = 39;
    let query = DMatrix::from_row_slice(1, 2, &[data[(last, 2)], data[(last, 3)]]);
    let mut rng = StdRng::seed_from_u64(3);
    let rows = engine.run(&query, &mut rng).unwrap().into_tracks().unwrap();

    assert_eq!(rows.shape(), (2 * 40, 4));
    for sample in 0..2 {
        for step in 0..40 {
            let row = sample * 40 + step;
            let source = last - step;
            assert_eq!(rows[(row, 1)], source as f64);
            assert_eq!(rows[(row, 2)], data[(source, 2)]);
            assert_eq!(rows[(row, 3)], data[(source, 3)]);
        }
    }
}

#[test]
fn heatmap_cells_follow_the_track() {
    let data = noisy_lines(1, 50, 2, 1.0, 13);
    let mut engine = Driftcast::builder()
        .data(data.clone())
        .radius(5.0)
        .n_samples(10)
        .heatmap(true)
        .build();

    let mut rng = StdRng::seed_from_u64(4);
    let grid = engine
        .run(&timed_query(&data, 0), &mut rng)
        .unwrap()
        .into_heatmap()
        .unwrap();

    assert_eq!(grid.shape()[0], 50);
    assert_eq!(grid.total(), 10 * 50);

    // Without jitter all samples coincide: one occupied cell per time step,
    // sitting on the rounded track coordinates.
    let occupied: Vec<(Vec<usize>, u64)> = grid.nonzero().collect();
    assert_eq!(occupied.len(), 50);

    let mut seen_steps = vec![false; 50];
    for (idx, count) in occupied {
        assert_eq!(count, 10);
        let t = idx[0];
        assert!(!seen_steps[t]);
        seen_steps[t] = true;

        let time = grid.times()[t];
        for d in 0..2 {
            let coordinate = idx[1 + d] as i64 + grid.origin()[d];
            assert_eq!(coordinate, data[(time as usize, 2 + d)].round() as i64);
        }
    }
    assert!(seen_steps.iter().all(|&seen| seen));
}
