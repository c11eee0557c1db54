//! # Track ingestion and per-time-step indexing
//!
//! Overview
//! -----------------
//!
//! Observed particle tracks enter the engine as a dense numeric table with one
//! row per (track, time) observation: `[track_id, time, coord_1, .., coord_D]`.
//! This module normalizes that table into a [`TrackStore`], the time-bucketed
//! index every later stage works against:
//!
//! - rows are grouped by their (rounded) time step,
//! - within a bucket, rows are sorted by ascending track identifier,
//! - a duplicated `(track_id, time)` pair keeps the last row seen,
//! - the sorted list of distinct time steps defines the movie time axis.
//!
//! Tracks may have gaps: a track absent from a bucket simply contributes
//! nothing at that time. No interpolation is performed here.
//!
//! The store also exposes [`BucketStats`], a small summary of how many rows
//! each time step carries, useful to eyeball dataset health before a fit.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;

use ahash::RandomState;
use nalgebra::{DMatrix, DVector};

use crate::constants::{
    Position, TimeBucket, TimeStep, TrackId, ID_COLUMN, META_COLUMNS, TIME_COLUMN,
};
use crate::driftcast_errors::DriftcastError;

/// Time-bucketed index of observed track positions.
///
/// Built once per fit from the raw row table, then queried read-only by the
/// regression and synthesis stages.
///
/// See also
/// ------------
/// * [`TrackStore::from_table`] – Construction and normalization rules.
/// * [`crate::regression::StepModelBank`] – Consumer pairing consecutive buckets.
#[derive(Debug, Clone)]
pub struct TrackStore {
    /// Number of spatial coordinates per position.
    dim: usize,
    /// Distinct observed time steps, sorted ascending.
    times: Vec<TimeStep>,
    /// Observed positions grouped by time step.
    buckets: HashMap<TimeStep, TimeBucket, RandomState>,
    /// Total number of retained rows across all buckets.
    n_rows: usize,
    /// Number of distinct track identifiers.
    n_tracks: usize,
    /// Largest track identifier seen, used to allocate synthetic identifiers.
    max_track_id: TrackId,
}

impl TrackStore {
    /// Build a store from a raw row table `[track_id, time, coord_1, .., coord_D]`.
    ///
    /// Identifier and time columns are normalized by rounding to the nearest
    /// integer. Rows sharing a `(track_id, time)` pair after rounding collapse
    /// to the last row in table order.
    ///
    /// Arguments
    /// -----------------
    /// * `table`: Observation rows, one per (track, time) sample. Must have at
    ///   least one row and at least three columns.
    ///
    /// Return
    /// ----------
    /// * `Ok(TrackStore)` with sorted time buckets,
    /// * `Err(DriftcastError::InvalidConfiguration)` if the table is empty or
    ///   too narrow to carry a spatial coordinate.
    pub fn from_table(table: &DMatrix<f64>) -> Result<Self, DriftcastError> {
        if table.ncols() < META_COLUMNS + 1 {
            return Err(DriftcastError::InvalidConfiguration(format!(
                "track table needs at least {} columns ([track_id, time, coord_1, ..]), got {}",
                META_COLUMNS + 1,
                table.ncols()
            )));
        }
        if table.nrows() == 0 {
            return Err(DriftcastError::InvalidConfiguration(
                "track table is empty".into(),
            ));
        }

        let dim = table.ncols() - META_COLUMNS;
        let mut buckets: HashMap<TimeStep, TimeBucket, RandomState> = HashMap::default();
        let mut slots: HashMap<(TimeStep, TrackId), usize, RandomState> = HashMap::default();
        let mut ids: HashSet<TrackId, RandomState> = HashSet::default();
        let mut max_track_id = TrackId::MIN;

        for i in 0..table.nrows() {
            let id = table[(i, ID_COLUMN)].round() as TrackId;
            let time = table[(i, TIME_COLUMN)].round() as TimeStep;
            let position: Position = DVector::from_fn(dim, |k, _| table[(i, META_COLUMNS + k)]);

            ids.insert(id);
            max_track_id = max_track_id.max(id);

            let bucket = buckets.entry(time).or_default();
            match slots.entry((time, id)) {
                // Revisited pair: the last row in table order wins.
                Entry::Occupied(slot) => bucket[*slot.get()].1 = position,
                Entry::Vacant(slot) => {
                    slot.insert(bucket.len());
                    bucket.push((id, position));
                }
            }
        }

        let mut times: Vec<TimeStep> = buckets.keys().copied().collect();
        times.sort_unstable();
        for bucket in buckets.values_mut() {
            bucket.sort_unstable_by_key(|(id, _)| *id);
        }
        let n_rows = buckets.values().map(Vec::len).sum();

        Ok(Self {
            dim,
            times,
            buckets,
            n_rows,
            n_tracks: ids.len(),
            max_track_id,
        })
    }

    /// Number of spatial coordinates per position.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Distinct observed time steps, sorted ascending.
    #[inline]
    pub fn times(&self) -> &[TimeStep] {
        &self.times
    }

    /// Observed `(track_id, position)` pairs at one time step, sorted by
    /// ascending identifier. Empty when the time step was never observed.
    #[inline]
    pub fn positions_at(&self, time: TimeStep) -> &[(TrackId, Position)] {
        self.buckets.get(&time).map_or(&[], |bucket| bucket.as_slice())
    }

    /// Total number of retained observation rows.
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of distinct track identifiers.
    #[inline]
    pub fn n_tracks(&self) -> usize {
        self.n_tracks
    }

    /// Number of distinct observed time steps.
    #[inline]
    pub fn n_times(&self) -> usize {
        self.times.len()
    }

    /// Largest track identifier in the dataset.
    ///
    /// Synthetic tracks are numbered starting right above this value so they
    /// never collide with historical ones.
    #[inline]
    pub fn max_track_id(&self) -> TrackId {
        self.max_track_id
    }

    /// Compute distribution statistics for the number of rows per time step.
    ///
    /// Percentiles use the *nearest-rank* method: the index is
    /// `round(q × (N-1))` for quantile `q ∈ [0,1]`, clamped to the valid
    /// range, which stays robust for short movies.
    ///
    /// Return
    /// ----------
    /// * `None` if the store holds no bucket.
    /// * `Some(BucketStats)` with the summary statistics otherwise.
    pub fn bucket_stats(&self) -> Option<BucketStats> {
        let mut counts: Vec<usize> = self.buckets.values().map(Vec::len).collect();
        if counts.is_empty() {
            return None;
        }

        counts.sort_unstable();

        #[inline]
        fn q_index(n: usize, q: f64) -> usize {
            let pos = q * (n as f64 - 1.0);
            let idx = pos.round() as isize;
            idx.clamp(0, (n as isize) - 1) as usize
        }

        let n = counts.len();
        Some(BucketStats {
            min: counts[0],
            p25: counts[q_index(n, 0.25)],
            median: counts[q_index(n, 0.50)],
            p95: counts[q_index(n, 0.95)],
            max: counts[n - 1],
        })
    }
}

/// Summary statistics of row counts per time step.
///
/// Produced by [`TrackStore::bucket_stats`]. Implements a compact one-line
/// [`Display`](fmt::Display) by default and a pretty multi-line layout with
/// the alternate flag (`{:#}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketStats {
    pub min: usize,
    pub p25: usize,
    pub median: usize,
    pub p95: usize,
    pub max: usize,
}

impl fmt::Display for BucketStats {
    /// Compact by default; pretty multi-line when using the alternate flag (`{:#}`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            // Pretty, multi-line, aligned output (ASCII-only for portability).
            writeln!(f, "Track rows per time step")?;
            writeln!(f, "------------------------")?;
            writeln!(f, "min    : {}", self.min)?;
            writeln!(f, "p25    : {}", self.p25)?;
            writeln!(f, "median : {}", self.median)?;
            writeln!(f, "p95    : {}", self.p95)?;
            write!(f, "max    : {}", self.max)
        } else {
            // Compact single-line for logs and quick prints.
            write!(
                f,
                "min={}, p25={}, median={}, p95={}, max={}",
                self.min, self.p25, self.median, self.p95, self.max
            )
        }
    }
}
