//! # Per-time-step neighbor regression
//!
//! Overview
//! -----------------
//!
//! The engine never fits one global motion model. Instead, every pair of
//! consecutive time steps `(t, t')` along the traversal order gets its own
//! [`StepModel`]: the set of displacement training pairs formed by tracks
//! observed at **both** endpoints. Prediction is a radius-bounded weighted
//! average over the training origins near a query position:
//!
//! - candidates are all training pairs whose origin lies within `radius` of
//!   the query (the boundary is inclusive),
//! - with [`Weighting::Distance`], each candidate contributes with weight
//!   `1/distance`; a candidate coinciding with the query dominates exactly,
//!   and several coincident candidates average their targets,
//! - with [`Weighting::Uniform`], all candidates contribute equally,
//! - an empty neighborhood yields no prediction at all.
//!
//! [`StepModelBank`] materializes one model per consecutive time pair and
//! keeps them in traversal order, which is ascending time or, when the engine
//! is configured to walk backward, descending time.
//!
//! Tracks with gaps degrade gracefully: a track absent from either endpoint
//! of a step simply contributes no training pair to that step.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use ahash::RandomState;
use itertools::Itertools;
use nalgebra::DVector;
use smallvec::SmallVec;

use crate::constants::{Neighborhood, Position, TimeStep, DIST_EPS};
use crate::driftcast_errors::DriftcastError;
use crate::tracks::TrackStore;

/// How training pairs near a query are weighted during prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Weighting {
    /// Inverse-distance weighting, exact hits dominate.
    #[default]
    Distance,
    /// Every candidate in the radius contributes equally.
    Uniform,
}

impl fmt::Display for Weighting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Weighting::Distance => write!(f, "distance"),
            Weighting::Uniform => write!(f, "uniform"),
        }
    }
}

impl FromStr for Weighting {
    type Err = DriftcastError;

    /// Parse a weighting scheme name, ignoring case and surrounding spaces.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "distance" => Ok(Weighting::Distance),
            "uniform" => Ok(Weighting::Uniform),
            _ => Err(DriftcastError::UnknownWeighting(s.to_string())),
        }
    }
}

/// Displacement regressor for one consecutive time pair of the traversal.
///
/// Holds the training origins observed at the departure step and the matched
/// targets of the same tracks at the arrival step.
///
/// See also
/// ------------
/// * [`StepModelBank::fit`] – Builds one model per consecutive time pair.
/// * [`StepModel::predict`] – Radius-bounded weighted average.
#[derive(Debug, Clone)]
pub struct StepModel {
    t_from: TimeStep,
    t_to: TimeStep,
    dim: usize,
    origins: Vec<Position>,
    targets: Vec<Position>,
    radius: f64,
    weighting: Weighting,
}

impl StepModel {
    /// Departure time step of this model.
    #[inline]
    pub fn t_from(&self) -> TimeStep {
        self.t_from
    }

    /// Arrival time step of this model.
    #[inline]
    pub fn t_to(&self) -> TimeStep {
        self.t_to
    }

    /// Number of spatial coordinates per position.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of training pairs backing this model.
    #[inline]
    pub fn n_pairs(&self) -> usize {
        self.origins.len()
    }

    /// True when no track is observed at both endpoints of the step.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// Neighborhood radius used by [`predict`](Self::predict).
    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Active weighting scheme.
    #[inline]
    pub fn weighting(&self) -> Weighting {
        self.weighting
    }

    /// Retag this model with another weighting scheme.
    ///
    /// Training pairs are untouched, so this never requires a refit.
    #[inline]
    pub fn set_weighting(&mut self, weighting: Weighting) {
        self.weighting = weighting;
    }

    /// Training origins (positions at the departure step).
    #[inline]
    pub fn origins(&self) -> &[Position] {
        &self.origins
    }

    /// Training targets (positions of the same tracks at the arrival step).
    #[inline]
    pub fn targets(&self) -> &[Position] {
        &self.targets
    }

    /// Predict where a particle at `query` moves over this step.
    ///
    /// Collects every training origin within `radius` of the query (inclusive
    /// boundary) and averages the matched targets according to the active
    /// [`Weighting`].
    ///
    /// Arguments
    /// -----------------
    /// * `query`: Position at the departure step. Must have [`dim`](Self::dim)
    ///   coordinates.
    ///
    /// Return
    /// ----------
    /// * `Some(position)` at the arrival step,
    /// * `None` when no training origin lies within the radius, in which case
    ///   callers keep the particle where it is.
    pub fn predict(&self, query: &Position) -> Option<Position> {
        let mut neighborhood: Neighborhood = SmallVec::new();
        for (idx, origin) in self.origins.iter().enumerate() {
            let distance = (origin - query).norm();
            if distance <= self.radius {
                neighborhood.push((idx, distance));
            }
        }
        if neighborhood.is_empty() {
            return None;
        }

        match self.weighting {
            Weighting::Uniform => Some(self.target_mean(neighborhood.iter().map(|&(idx, _)| idx))),
            Weighting::Distance => {
                // Exact hits dominate, ties among them average out.
                let coincident: SmallVec<[usize; 4]> = neighborhood
                    .iter()
                    .filter(|&&(_, distance)| distance <= DIST_EPS)
                    .map(|&(idx, _)| idx)
                    .collect();
                if !coincident.is_empty() {
                    return Some(self.target_mean(coincident.into_iter()));
                }

                let mut acc = DVector::zeros(self.dim);
                let mut total = 0.0;
                for &(idx, distance) in &neighborhood {
                    let weight = 1.0 / distance;
                    acc.axpy(weight, &self.targets[idx], 1.0);
                    total += weight;
                }
                acc /= total;
                Some(acc)
            }
        }
    }

    /// Plain average of the targets selected by `indices`.
    fn target_mean(&self, indices: impl IntoIterator<Item = usize>) -> Position {
        let mut acc = DVector::zeros(self.dim);
        let mut count = 0.0;
        for idx in indices {
            acc += &self.targets[idx];
            count += 1.0;
        }
        acc /= count;
        acc
    }
}

/// All step models of one fit, ordered along the traversal.
///
/// The traversal order is the sorted time axis of the dataset, reversed when
/// the engine walks backward. `steps[i]` regresses the displacement from
/// `times[i]` to `times[i + 1]`.
#[derive(Debug, Clone)]
pub struct StepModelBank {
    times: Vec<TimeStep>,
    steps: Vec<StepModel>,
}

impl StepModelBank {
    /// Fit one [`StepModel`] per consecutive time pair of the traversal.
    ///
    /// For each pair `(t, t')`, tracks observed at both endpoints contribute
    /// one training pair (origin at `t`, target at `t'`). Tracks missing from
    /// either bucket are skipped for that step.
    ///
    /// Arguments
    /// -----------------
    /// * `store`: Time-bucketed observations, must hold at least one time step.
    /// * `radius`: Neighborhood radius forwarded to every model. Expected to
    ///   be strictly positive, which the engine validates before fitting.
    /// * `reverse`: When true, walk the time axis from latest to earliest.
    /// * `weighting`: Initial weighting scheme of every model.
    ///
    /// Return
    /// ----------
    /// * A bank with `n_times - 1` models (none for a single-step movie).
    ///
    /// See also
    /// ------------
    /// * [`TrackStore::positions_at`] – Source of the per-step buckets.
    pub fn fit(store: &TrackStore, radius: f64, reverse: bool, weighting: Weighting) -> Self {
        let mut times: Vec<TimeStep> = store.times().to_vec();
        if reverse {
            times.reverse();
        }

        let dim = store.dim();
        let steps = times
            .iter()
            .copied()
            .tuple_windows()
            .map(|(t_from, t_to)| {
                let arrivals: HashMap<_, _, RandomState> = store
                    .positions_at(t_to)
                    .iter()
                    .map(|(id, position)| (*id, position))
                    .collect();

                let mut origins = Vec::new();
                let mut targets = Vec::new();
                for (id, position) in store.positions_at(t_from) {
                    if let Some(target) = arrivals.get(id) {
                        origins.push(position.clone());
                        targets.push((*target).clone());
                    }
                }

                StepModel {
                    t_from,
                    t_to,
                    dim,
                    origins,
                    targets,
                    radius,
                    weighting,
                }
            })
            .collect();

        Self { times, steps }
    }

    /// Time steps in traversal order.
    #[inline]
    pub fn times(&self) -> &[TimeStep] {
        &self.times
    }

    /// Number of time steps along the traversal.
    #[inline]
    pub fn n_times(&self) -> usize {
        self.times.len()
    }

    /// Number of step models (`n_times - 1`, or zero for a single-step movie).
    #[inline]
    pub fn n_steps(&self) -> usize {
        self.steps.len()
    }

    /// All step models in traversal order.
    #[inline]
    pub fn steps(&self) -> &[StepModel] {
        &self.steps
    }

    /// Model regressing the displacement from `times[idx]` to `times[idx + 1]`.
    #[inline]
    pub fn step_at(&self, idx: usize) -> Option<&StepModel> {
        self.steps.get(idx)
    }

    /// Retag every model with another weighting scheme without refitting.
    pub fn set_weighting(&mut self, weighting: Weighting) {
        for step in &mut self.steps {
            step.set_weighting(weighting);
        }
    }

    /// Index of the traversal time closest to `time`.
    ///
    /// Ties resolve to the earlier traversal position, so a query time halfway
    /// between two steps starts walking from the one encountered first.
    pub fn nearest_time_index(&self, time: TimeStep) -> usize {
        let mut best = 0;
        let mut best_gap = TimeStep::MAX;
        for (idx, &t) in self.times.iter().enumerate() {
            let gap = (t - time).abs();
            if gap < best_gap {
                best_gap = gap;
                best = idx;
            }
        }
        best
    }
}

#[cfg(test)]
mod test_step_model {
    use super::*;

    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};

    fn store(rows: &[[f64; 4]]) -> TrackStore {
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        TrackStore::from_table(&DMatrix::from_row_slice(rows.len(), 4, &flat)).unwrap()
    }

    fn model_1d(origins: &[f64], targets: &[f64], radius: f64, weighting: Weighting) -> StepModel {
        StepModel {
            t_from: 0,
            t_to: 1,
            dim: 1,
            origins: origins.iter().map(|&x| DVector::from_element(1, x)).collect(),
            targets: targets.iter().map(|&x| DVector::from_element(1, x)).collect(),
            radius,
            weighting,
        }
    }

    #[test]
    fn weighting_parses_and_displays() {
        assert_eq!("distance".parse::<Weighting>().unwrap(), Weighting::Distance);
        assert_eq!(" Uniform ".parse::<Weighting>().unwrap(), Weighting::Uniform);
        assert_eq!(Weighting::Distance.to_string(), "distance");
        assert_eq!(Weighting::Uniform.to_string(), "uniform");
        assert!(matches!(
            "nearest".parse::<Weighting>(),
            Err(DriftcastError::UnknownWeighting(_))
        ));
        assert_eq!(Weighting::default(), Weighting::Distance);
    }

    #[test]
    fn empty_neighborhood_yields_none() {
        let model = model_1d(&[10.0], &[11.0], 2.0, Weighting::Distance);
        let query = DVector::from_element(1, 0.0);
        assert!(model.predict(&query).is_none());
    }

    #[test]
    fn radius_boundary_is_inclusive() {
        let model = model_1d(&[2.0], &[7.0], 2.0, Weighting::Uniform);
        let query = DVector::from_element(1, 0.0);
        let predicted = model.predict(&query).unwrap();
        assert_relative_eq!(predicted[0], 7.0);
    }

    #[test]
    fn uniform_weighting_averages_targets() {
        let model = model_1d(&[1.0, -3.0], &[10.0, 20.0], 5.0, Weighting::Uniform);
        let query = DVector::from_element(1, 0.0);
        let predicted = model.predict(&query).unwrap();
        assert_relative_eq!(predicted[0], 15.0);
    }

    #[test]
    fn distance_weighting_favors_near_origins() {
        // Distances 1 and 3 give weights 1 and 1/3.
        let model = model_1d(&[1.0, -3.0], &[10.0, 20.0], 5.0, Weighting::Distance);
        let query = DVector::from_element(1, 0.0);
        let predicted = model.predict(&query).unwrap();
        assert_relative_eq!(predicted[0], 12.5, epsilon = 1e-12);
    }

    #[test]
    fn coincident_origin_dominates_distance_weighting() {
        let model = model_1d(&[0.0, 0.5], &[5.0, 100.0], 5.0, Weighting::Distance);
        let query = DVector::from_element(1, 0.0);
        let predicted = model.predict(&query).unwrap();
        assert_relative_eq!(predicted[0], 5.0);
    }

    #[test]
    fn coincident_ties_average_their_targets() {
        let model = model_1d(&[0.0, 0.0, 0.5], &[5.0, 7.0, 100.0], 5.0, Weighting::Distance);
        let query = DVector::from_element(1, 0.0);
        let predicted = model.predict(&query).unwrap();
        assert_relative_eq!(predicted[0], 6.0);
    }

    #[test]
    fn uniform_weighting_ignores_coincidence() {
        let model = model_1d(&[0.0, 0.5], &[5.0, 100.0], 5.0, Weighting::Uniform);
        let query = DVector::from_element(1, 0.0);
        let predicted = model.predict(&query).unwrap();
        assert_relative_eq!(predicted[0], 52.5);
    }

    #[test]
    fn fit_pairs_tracks_present_at_both_endpoints() {
        // Track 1 covers t0..t2, track 2 skips t1.
        let store = store(&[
            [1.0, 0.0, 0.0, 0.0],
            [1.0, 1.0, 1.0, 0.0],
            [1.0, 2.0, 2.0, 0.0],
            [2.0, 0.0, 5.0, 0.0],
            [2.0, 2.0, 7.0, 0.0],
        ]);
        let bank = StepModelBank::fit(&store, 10.0, false, Weighting::Distance);

        assert_eq!(bank.times(), &[0, 1, 2]);
        assert_eq!(bank.n_steps(), 2);
        assert_eq!(bank.step_at(0).unwrap().n_pairs(), 1);
        assert_eq!(bank.step_at(1).unwrap().n_pairs(), 1);
    }

    #[test]
    fn fit_leaves_disjoint_steps_empty() {
        let store = store(&[[1.0, 0.0, 0.0, 0.0], [2.0, 1.0, 9.0, 9.0]]);
        let bank = StepModelBank::fit(&store, 10.0, false, Weighting::Distance);

        let step = bank.step_at(0).unwrap();
        assert!(step.is_empty());
        assert!(step.predict(&DVector::from_element(2, 0.0)).is_none());
    }

    #[test]
    fn reverse_fit_walks_backward() {
        let store = store(&[
            [1.0, 0.0, 0.0, 0.0],
            [1.0, 1.0, 1.0, 0.0],
            [1.0, 2.0, 3.0, 0.0],
        ]);
        let bank = StepModelBank::fit(&store, 10.0, true, Weighting::Distance);

        assert_eq!(bank.times(), &[2, 1, 0]);
        let first = bank.step_at(0).unwrap();
        assert_eq!(first.t_from(), 2);
        assert_eq!(first.t_to(), 1);
        assert_eq!(first.origins()[0][0], 3.0);
        assert_eq!(first.targets()[0][0], 1.0);
    }

    #[test]
    fn set_weighting_retags_every_step() {
        let store = store(&[
            [1.0, 0.0, 0.0, 0.0],
            [1.0, 1.0, 1.0, 0.0],
            [1.0, 2.0, 2.0, 0.0],
        ]);
        let mut bank = StepModelBank::fit(&store, 10.0, false, Weighting::Distance);
        bank.set_weighting(Weighting::Uniform);
        assert!(bank.steps().iter().all(|s| s.weighting() == Weighting::Uniform));
    }

    #[test]
    fn nearest_time_snaps_with_earlier_tie_break() {
        let store = store(&[
            [1.0, 0.0, 0.0, 0.0],
            [1.0, 10.0, 1.0, 0.0],
            [1.0, 20.0, 2.0, 0.0],
        ]);
        let forward = StepModelBank::fit(&store, 10.0, false, Weighting::Distance);
        assert_eq!(forward.nearest_time_index(12), 1);
        assert_eq!(forward.nearest_time_index(-3), 0);
        // 5 is equidistant from 0 and 10, the earlier traversal entry wins.
        assert_eq!(forward.nearest_time_index(5), 0);

        let backward = StepModelBank::fit(&store, 10.0, true, Weighting::Distance);
        // Same tie on a reversed axis resolves to 10 instead.
        assert_eq!(backward.times(), &[20, 10, 0]);
        assert_eq!(backward.nearest_time_index(5), 1);
    }
}
