//! # Driftcast engine: configuration, lazy fitting and synthesis entry points
//!
//! Overview
//! -----------------
//!
//! [`Driftcast`] is the crate's central state. It owns:
//!
//! - the observed track table and the sampling configuration,
//! - the lazily fitted model state (a [`TrackStore`] plus a
//!   [`StepModelBank`]), guarded by a single dirty flag.
//!
//! Construction never validates and never fits. The first synthesis call (or
//! an explicit [`fit`](Driftcast::fit)) materializes the models; reconfiguring
//! anything that feeds the fit (`data`, `radius`, `reverse`) drops them and
//! arms a refit. Sampling knobs (`n_samples`, `sigma`, `bind_to_existing`,
//! `heatmap`) leave the fitted state untouched, and `weights` is retagged on
//! the live models in place.
//!
//! Example
//! -----------------
//!
//! ```rust
//! use driftcast::{Driftcast, Weighting};
//! use nalgebra::DMatrix;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! // Two tracks drifting +1 along x per step: [track_id, time, x, y].
//! let data = DMatrix::from_row_slice(6, 4, &[
//!     1.0, 0.0, 0.0, 0.0,
//!     1.0, 1.0, 1.0, 0.0,
//!     1.0, 2.0, 2.0, 0.0,
//!     2.0, 0.0, 0.0, 1.0,
//!     2.0, 1.0, 1.0, 1.0,
//!     2.0, 2.0, 2.0, 1.0,
//! ]);
//!
//! let mut engine = Driftcast::builder()
//!     .data(data)
//!     .radius(5.0)
//!     .n_samples(2)
//!     .bind_to_existing(false)
//!     .weights(Weighting::Distance)
//!     .build();
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let queries = DMatrix::from_row_slice(1, 2, &[0.0, 0.5]);
//! let rows = engine.run(&queries, &mut rng)?.into_tracks().unwrap();
//!
//! // Two samples walking the three observed time steps.
//! assert_eq!(rows.shape(), (6, 4));
//! # Ok::<(), driftcast::DriftcastError>(())
//! ```
//!
//! See also
//! ------------
//! * [`crate::regression`] – Per-step neighbor regression.
//! * [`crate::heatmap`] – Occupancy grid output.

use nalgebra::DMatrix;
use rand::Rng;

use crate::constants::TimeStep;
use crate::driftcast_errors::DriftcastError;
use crate::heatmap::Heatmap;
use crate::regression::{StepModel, StepModelBank, Weighting};
use crate::synthesis::{parse_queries, Synthesizer};
use crate::tracks::{BucketStats, TrackStore};

/// Fitted state, built atomically and dropped on invalidation.
#[derive(Debug, Clone)]
struct FittedModel {
    store: TrackStore,
    bank: StepModelBank,
}

/// Batch output of [`Driftcast::run`]: raw rows or their rasterized grid.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisOutput {
    /// Synthesized rows `[track_id, time, coord_1, .., coord_D]`.
    Tracks(DMatrix<f64>),
    /// Occupancy counts of the same rows over time and space.
    Heatmap(Heatmap),
}

impl SynthesisOutput {
    /// True when the batch produced raw rows.
    #[inline]
    pub fn is_tracks(&self) -> bool {
        matches!(self, SynthesisOutput::Tracks(_))
    }

    /// True when the batch produced an occupancy grid.
    #[inline]
    pub fn is_heatmap(&self) -> bool {
        matches!(self, SynthesisOutput::Heatmap(_))
    }

    /// Borrow the rows, if this batch produced rows.
    pub fn as_tracks(&self) -> Option<&DMatrix<f64>> {
        match self {
            SynthesisOutput::Tracks(rows) => Some(rows),
            SynthesisOutput::Heatmap(_) => None,
        }
    }

    /// Borrow the grid, if this batch produced a grid.
    pub fn as_heatmap(&self) -> Option<&Heatmap> {
        match self {
            SynthesisOutput::Heatmap(grid) => Some(grid),
            SynthesisOutput::Tracks(_) => None,
        }
    }

    /// Consume the batch into rows, if it produced rows.
    pub fn into_tracks(self) -> Option<DMatrix<f64>> {
        match self {
            SynthesisOutput::Tracks(rows) => Some(rows),
            SynthesisOutput::Heatmap(_) => None,
        }
    }

    /// Consume the batch into a grid, if it produced a grid.
    pub fn into_heatmap(self) -> Option<Heatmap> {
        match self {
            SynthesisOutput::Heatmap(grid) => Some(grid),
            SynthesisOutput::Tracks(_) => None,
        }
    }
}

/// Trajectory regression and synthesis engine.
///
/// Holds the dataset, the sampling configuration and the lazily fitted model
/// bank. See the [module documentation](self) for the lifecycle rules.
#[derive(Debug, Clone)]
pub struct Driftcast {
    /// Observed rows `[track_id, time, coord_1, .., coord_D]`, if assigned.
    data: Option<DMatrix<f64>>,
    /// Neighborhood radius shared by regression and binding.
    radius: f64,
    /// Synthetic tracks grown per query position.
    n_samples: usize,
    /// Walk the time axis from latest to earliest when true.
    reverse: bool,
    /// Weighting scheme applied by every step model.
    weights: Weighting,
    /// Standard deviation of the per-step Gaussian jitter, `<= 0` disables it.
    sigma: f64,
    /// Snap seeds to historical starting positions when true.
    bind_to_existing: bool,
    /// Emit an occupancy grid instead of raw rows when true.
    heatmap: bool,
    /// Dirty flag: false whenever the fitted state is out of date.
    fitted: bool,
    model: Option<FittedModel>,
}

impl Default for Driftcast {
    fn default() -> Self {
        Self::new()
    }
}

impl Driftcast {
    /// Create an engine with no dataset and the stock configuration:
    /// `radius = 30`, `n_samples = 25`, forward traversal, distance
    /// weighting, no jitter, binding enabled, row output.
    pub fn new() -> Self {
        Self {
            data: None,
            radius: 30.0,
            n_samples: 25,
            reverse: false,
            weights: Weighting::Distance,
            sigma: 0.0,
            bind_to_existing: true,
            heatmap: false,
            fitted: false,
            model: None,
        }
    }

    /// Fluent construction starting from the stock configuration.
    pub fn builder() -> DriftcastBuilder {
        DriftcastBuilder::new()
    }

    // ---------------------------------------------------------------------
    // Configuration access
    // ---------------------------------------------------------------------

    /// Observed track table, if assigned.
    #[inline]
    pub fn data(&self) -> Option<&DMatrix<f64>> {
        self.data.as_ref()
    }

    /// Neighborhood radius shared by regression and binding.
    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Number of synthetic tracks grown per query position.
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// True when the traversal runs from latest to earliest time.
    #[inline]
    pub fn reverse(&self) -> bool {
        self.reverse
    }

    /// Active weighting scheme.
    #[inline]
    pub fn weights(&self) -> Weighting {
        self.weights
    }

    /// Standard deviation of the per-step jitter.
    #[inline]
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// True when seeds snap to historical starting positions.
    #[inline]
    pub fn bind_to_existing(&self) -> bool {
        self.bind_to_existing
    }

    /// True when batches rasterize into an occupancy grid.
    #[inline]
    pub fn heatmap(&self) -> bool {
        self.heatmap
    }

    /// True when the fitted state matches the current configuration.
    #[inline]
    pub fn fitted(&self) -> bool {
        self.fitted
    }

    /// Assign a new track table and arm a refit.
    pub fn set_data(&mut self, data: DMatrix<f64>) {
        self.data = Some(data);
        self.invalidate();
    }

    /// Drop the track table and arm a refit; the next fit attempt fails.
    pub fn clear_data(&mut self) {
        self.data = None;
        self.invalidate();
    }

    /// Change the neighborhood radius and arm a refit.
    pub fn set_radius(&mut self, radius: f64) {
        self.radius = radius;
        self.invalidate();
    }

    /// Flip the traversal direction and arm a refit.
    pub fn set_reverse(&mut self, reverse: bool) {
        self.reverse = reverse;
        self.invalidate();
    }

    /// Switch the weighting scheme.
    ///
    /// Live models are retagged in place: the fitted state stays valid and no
    /// refit happens.
    pub fn set_weights(&mut self, weights: Weighting) {
        self.weights = weights;
        if let Some(model) = &mut self.model {
            model.bank.set_weighting(weights);
        }
    }

    /// Change the per-query sample count. Sampling only, no refit.
    pub fn set_n_samples(&mut self, n_samples: usize) {
        self.n_samples = n_samples;
    }

    /// Change the jitter amplitude. Sampling only, no refit.
    pub fn set_sigma(&mut self, sigma: f64) {
        self.sigma = sigma;
    }

    /// Toggle binding to historical starts. Sampling only, no refit.
    pub fn set_bind_to_existing(&mut self, bind_to_existing: bool) {
        self.bind_to_existing = bind_to_existing;
    }

    /// Toggle grid output. Presentation only, no refit.
    pub fn set_heatmap(&mut self, heatmap: bool) {
        self.heatmap = heatmap;
    }

    fn invalidate(&mut self) {
        self.fitted = false;
        self.model = None;
    }

    // ---------------------------------------------------------------------
    // Fitting
    // ---------------------------------------------------------------------

    /// Materialize the per-step models for the current configuration.
    ///
    /// No-op when the fitted state is already current. The new state is built
    /// completely before it replaces the old one, so a failed fit leaves the
    /// engine unfitted rather than half-updated.
    ///
    /// Return
    /// ----------
    /// * `Err(DriftcastError::InvalidConfiguration)` when no dataset is
    ///   assigned, the dataset is empty or too narrow, or the radius is not
    ///   strictly positive.
    pub fn fit(&mut self) -> Result<(), DriftcastError> {
        if self.fitted && self.model.is_some() {
            return Ok(());
        }

        let data = self.data.as_ref().ok_or_else(|| {
            DriftcastError::InvalidConfiguration("no track table assigned".into())
        })?;
        if !(self.radius > 0.0) {
            return Err(DriftcastError::InvalidConfiguration(format!(
                "radius must be strictly positive, got {}",
                self.radius
            )));
        }

        let store = TrackStore::from_table(data)?;
        let bank = StepModelBank::fit(&store, self.radius, self.reverse, self.weights);
        self.model = Some(FittedModel { store, bank });
        self.fitted = true;
        Ok(())
    }

    /// Fitted step models in traversal order, empty while unfitted.
    #[inline]
    pub fn models(&self) -> &[StepModel] {
        self.model.as_ref().map_or(&[], |model| model.bank.steps())
    }

    /// Spatial dimensionality of the fitted dataset.
    #[inline]
    pub fn dim(&self) -> Option<usize> {
        self.model.as_ref().map(|model| model.store.dim())
    }

    /// Traversal times of the fitted state, in walk order.
    #[inline]
    pub fn traversal_times(&self) -> Option<&[TimeStep]> {
        self.model.as_ref().map(|model| model.bank.times())
    }

    /// Row-count statistics of the fitted time buckets.
    pub fn bucket_stats(&self) -> Option<BucketStats> {
        self.model.as_ref().and_then(|model| model.store.bucket_stats())
    }

    // ---------------------------------------------------------------------
    // Synthesis
    // ---------------------------------------------------------------------

    /// Run one batch: fit if needed, synthesize, and package the configured
    /// output flavor.
    ///
    /// Arguments
    /// -----------------
    /// * `queries`: Seed rows in any of the accepted widths (`D`, `D + 1`
    ///   with a leading time, or full `D + 2` interchange rows).
    /// * `rng`: Random number generator driving jitter (e.g. [`StdRng`](rand::rngs::StdRng)).
    ///
    /// Return
    /// ----------
    /// * [`SynthesisOutput::Tracks`] with the synthesized rows, or
    ///   [`SynthesisOutput::Heatmap`] when grid output is enabled.
    /// * `Err` on configuration or query-shape problems; the batch is then
    ///   produced entirely or not at all.
    pub fn run(
        &mut self,
        queries: &DMatrix<f64>,
        rng: &mut impl Rng,
    ) -> Result<SynthesisOutput, DriftcastError> {
        if self.heatmap {
            Ok(SynthesisOutput::Heatmap(self.rasterize(queries, rng)?))
        } else {
            Ok(SynthesisOutput::Tracks(self.synthesize(queries, rng)?))
        }
    }

    /// Convenience wrapper around [`run`](Self::run) for a single seed row.
    pub fn run_point(
        &mut self,
        point: &[f64],
        rng: &mut impl Rng,
    ) -> Result<SynthesisOutput, DriftcastError> {
        let queries = DMatrix::from_row_slice(1, point.len(), point);
        self.run(&queries, rng)
    }

    /// Synthesize raw rows for a query batch, regardless of the heatmap flag.
    pub fn synthesize(
        &mut self,
        queries: &DMatrix<f64>,
        rng: &mut impl Rng,
    ) -> Result<DMatrix<f64>, DriftcastError> {
        if self.n_samples == 0 {
            return Err(DriftcastError::InvalidConfiguration(
                "n_samples must be at least 1".into(),
            ));
        }
        self.fit()?;
        let model = self.model.as_ref().ok_or_else(|| {
            DriftcastError::InvalidConfiguration("fitted state unavailable".into())
        })?;

        let points = parse_queries(queries, model.store.dim())?;
        let sampler = Synthesizer {
            bank: &model.bank,
            store: &model.store,
            radius: self.radius,
            n_samples: self.n_samples,
            sigma: self.sigma,
            bind_to_existing: self.bind_to_existing,
        };
        Ok(sampler.run(&points, rng))
    }

    /// Synthesize and rasterize a query batch, regardless of the heatmap flag.
    pub fn rasterize(
        &mut self,
        queries: &DMatrix<f64>,
        rng: &mut impl Rng,
    ) -> Result<Heatmap, DriftcastError> {
        let rows = self.synthesize(queries, rng)?;
        let model = self.model.as_ref().ok_or_else(|| {
            DriftcastError::InvalidConfiguration("fitted state unavailable".into())
        })?;
        Ok(Heatmap::rasterize(
            &rows,
            model.bank.times(),
            model.store.dim(),
        ))
    }
}

/// Fluent builder for [`Driftcast`].
///
/// Mirrors the engine setters. `build` never validates: bad values surface as
/// [`DriftcastError::InvalidConfiguration`] on the first fit attempt.
#[derive(Debug, Clone)]
pub struct DriftcastBuilder {
    engine: Driftcast,
}

impl Default for DriftcastBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DriftcastBuilder {
    /// Start from the stock configuration of [`Driftcast::new`].
    pub fn new() -> Self {
        Self {
            engine: Driftcast::new(),
        }
    }

    pub fn data(mut self, data: DMatrix<f64>) -> Self {
        self.engine.data = Some(data);
        self
    }
    pub fn radius(mut self, radius: f64) -> Self {
        self.engine.radius = radius;
        self
    }
    pub fn n_samples(mut self, n_samples: usize) -> Self {
        self.engine.n_samples = n_samples;
        self
    }
    pub fn reverse(mut self, reverse: bool) -> Self {
        self.engine.reverse = reverse;
        self
    }
    pub fn weights(mut self, weights: Weighting) -> Self {
        self.engine.weights = weights;
        self
    }
    pub fn sigma(mut self, sigma: f64) -> Self {
        self.engine.sigma = sigma;
        self
    }
    pub fn bind_to_existing(mut self, bind_to_existing: bool) -> Self {
        self.engine.bind_to_existing = bind_to_existing;
        self
    }
    pub fn heatmap(mut self, heatmap: bool) -> Self {
        self.engine.heatmap = heatmap;
        self
    }

    /// Finish the build. The engine stays unfitted until first use.
    pub fn build(self) -> Driftcast {
        self.engine
    }
}
