//! # Sequential trajectory synthesis
//!
//! Overview
//! -----------------
//!
//! Given a fitted [`StepModelBank`](crate::regression::StepModelBank), this
//! module grows synthetic tracks out of seed positions. Each sample:
//!
//! 1. resolves its starting slot on the traversal (the nearest observed time
//!    when the query carries one, the traversal head otherwise),
//! 2. optionally snaps to a historical start: with binding enabled, the seed
//!    is replaced by one of the observed positions within the radius at the
//!    starting step, cycled deterministically across samples,
//! 3. walks the remaining steps, advancing through each step model and
//!    holding still whenever a model has no training data in range,
//! 4. optionally jitters every advanced position with isotropic Gaussian
//!    noise before emitting it.
//!
//! Emitted rows share the interchange layout of the input table,
//! `[track_id, time, coord_1, .., coord_D]`, with fresh identifiers allocated
//! above the historical ones.

use std::cmp::Ordering;

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::constants::{Position, TimeStep, TrackId, META_COLUMNS};
use crate::driftcast_errors::DriftcastError;
use crate::regression::StepModelBank;
use crate::tracks::TrackStore;

/// One resolved seed: an optional explicit start time and a spatial position.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QueryPoint {
    pub time: Option<TimeStep>,
    pub position: Position,
}

/// Interpret a query table against the fitted spatial dimensionality.
///
/// Three row layouts are accepted, discriminated by width:
///
/// * `D` columns: bare positions, started from the traversal head,
/// * `D + 1` columns: `[time, coord_1, .., coord_D]`,
/// * `D + 2` columns: full interchange rows whose leading identifier is
///   ignored, so historical rows can be replayed as queries directly.
///
/// Any other width is a [`DriftcastError::DimensionMismatch`].
pub(crate) fn parse_queries(
    table: &DMatrix<f64>,
    dim: usize,
) -> Result<Vec<QueryPoint>, DriftcastError> {
    let ncols = table.ncols();
    let offset = if ncols == dim {
        0
    } else if ncols == dim + 1 {
        1
    } else if ncols == dim + META_COLUMNS {
        META_COLUMNS
    } else {
        return Err(DriftcastError::DimensionMismatch {
            expected: dim,
            got: ncols,
        });
    };

    let mut points = Vec::with_capacity(table.nrows());
    for i in 0..table.nrows() {
        // The time column, when present, sits right before the coordinates.
        let time = (offset > 0).then(|| table[(i, offset - 1)].round() as TimeStep);
        let position = DVector::from_fn(dim, |k, _| table[(i, offset + k)]);
        points.push(QueryPoint { time, position });
    }
    Ok(points)
}

/// Stateless sampling pass over a fitted model bank.
///
/// Borrows the fitted state and the sampling knobs from the engine; one
/// instance serves exactly one batch.
pub(crate) struct Synthesizer<'a> {
    pub bank: &'a StepModelBank,
    pub store: &'a TrackStore,
    pub radius: f64,
    pub n_samples: usize,
    pub sigma: f64,
    pub bind_to_existing: bool,
}

impl Synthesizer<'_> {
    /// Grow `n_samples` synthetic tracks per query and collect their rows.
    ///
    /// Samples are drawn in deterministic order (query by query, sample by
    /// sample, step by step), so a seeded generator reproduces the batch
    /// exactly.
    ///
    /// Return
    /// ----------
    /// * Synthesized rows `[track_id, time, coord_1, .., coord_D]`, grouped
    ///   by sample, each sample ordered along the traversal.
    pub fn run(&self, queries: &[QueryPoint], rng: &mut impl Rng) -> DMatrix<f64> {
        let width = META_COLUMNS + self.store.dim();
        let mut flat: Vec<f64> = Vec::new();
        let mut n_rows = 0;
        let mut next_id = self.store.max_track_id() + 1;

        for query in queries {
            let start_idx = match query.time {
                Some(t) => self.bank.nearest_time_index(t),
                None => 0,
            };
            let anchors = if self.bind_to_existing {
                self.starting_anchors(start_idx, &query.position)
            } else {
                Vec::new()
            };

            for sample in 0..self.n_samples {
                let start = if anchors.is_empty() {
                    query.position.clone()
                } else {
                    anchors[sample % anchors.len()].clone()
                };
                n_rows += self.walk(start_idx, start, next_id, rng, &mut flat);
                next_id += 1;
            }
        }

        DMatrix::from_row_slice(n_rows, width, &flat)
    }

    /// Emit one synthetic track from `start_idx` to the traversal end.
    ///
    /// The starting row is emitted as-is; every later row is the step-model
    /// prediction (or the held position) plus optional jitter. Returns the
    /// number of rows pushed.
    fn walk(
        &self,
        start_idx: usize,
        mut position: Position,
        id: TrackId,
        rng: &mut impl Rng,
        flat: &mut Vec<f64>,
    ) -> usize {
        let times = self.bank.times();
        push_row(flat, id, times[start_idx], &position);

        for step in &self.bank.steps()[start_idx..] {
            if let Some(predicted) = step.predict(&position) {
                position = predicted;
            }
            if self.sigma > 0.0 {
                for coord in position.iter_mut() {
                    let noise: f64 = rng.sample(StandardNormal);
                    *coord += self.sigma * noise;
                }
            }
            push_row(flat, id, step.t_to(), &position);
        }

        1 + (self.bank.n_steps() - start_idx)
    }

    /// Historical starting positions within the radius of a seed.
    ///
    /// The pool is the training origins of the departing step, or the raw
    /// time bucket when the walk starts at the traversal end. Matches are
    /// sorted lexicographically and deduplicated so the cycling order is
    /// stable across runs.
    fn starting_anchors(&self, start_idx: usize, query: &Position) -> Vec<Position> {
        let within = |position: &Position| (position - query).norm() <= self.radius;

        let mut pool: Vec<Position> = match self.bank.step_at(start_idx) {
            Some(step) => step.origins().iter().filter(|p| within(p)).cloned().collect(),
            // No departing step at the traversal end: use the bucket itself.
            None => self
                .store
                .positions_at(self.bank.times()[start_idx])
                .iter()
                .map(|(_, position)| position)
                .filter(|p| within(p))
                .cloned()
                .collect(),
        };

        pool.sort_unstable_by(lexicographic);
        pool.dedup();
        pool
    }
}

/// Append one interchange row to the flat buffer.
fn push_row(flat: &mut Vec<f64>, id: TrackId, time: TimeStep, position: &Position) {
    flat.push(id as f64);
    flat.push(time as f64);
    flat.extend(position.iter().copied());
}

/// Coordinate-wise total order, used to stabilize anchor cycling.
fn lexicographic(a: &Position, b: &Position) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.total_cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}
