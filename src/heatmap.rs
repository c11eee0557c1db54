//! # Rasterization of synthesized tracks into an occupancy grid
//!
//! Overview
//! -----------------
//!
//! As an alternative to raw synthesized rows, the engine can aggregate all
//! samples into a [`Heatmap`]: a dense integer grid of rank `1 + D` whose
//! first axis is the traversal time and whose remaining axes span the spatial
//! bounding box of the rounded sample coordinates.
//!
//! Each synthesized row increments exactly one cell, so the grid total always
//! equals the number of rows that went in. The spatial axes are tight around
//! the data and anchored by a per-axis [`origin`](Heatmap::origin): adding the
//! origin back to a cell index recovers the rounded coordinate it bins.

use std::collections::HashMap;
use std::fmt;

use ahash::RandomState;
use nalgebra::DMatrix;
use smallvec::SmallVec;

use crate::constants::{TimeStep, META_COLUMNS, TIME_COLUMN};

/// Occupancy counts of synthesized samples over time and space.
///
/// Built by the engine when heatmap output is requested. Cells are stored
/// row-major with the time axis first.
///
/// See also
/// ------------
/// * [`crate::driftcast::Driftcast::rasterize`] – Synthesis entry point
///   producing this grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heatmap {
    /// Extents per axis: `[n_times, side_1, .., side_D]`.
    shape: Vec<usize>,
    /// Rounded minimum coordinate per spatial axis.
    origin: Vec<i64>,
    /// Traversal times labelling the first axis.
    times: Vec<TimeStep>,
    /// Flattened cell counts, row-major.
    counts: Vec<u64>,
}

impl Heatmap {
    /// Bin synthesized rows `[track_id, time, coord_1, .., coord_D]` into a
    /// fresh grid.
    ///
    /// Spatial coordinates are rounded to the nearest integer and the grid
    /// spans their exact bounding box. The time axis always covers the full
    /// traversal, even when no sample reaches some of its steps.
    ///
    /// Arguments
    /// -----------------
    /// * `rows`: Synthesized rows, `META_COLUMNS + dim` columns each.
    /// * `times`: Traversal times, in walk order.
    /// * `dim`: Number of spatial coordinates per row.
    pub(crate) fn rasterize(rows: &DMatrix<f64>, times: &[TimeStep], dim: usize) -> Self {
        let time_index: HashMap<TimeStep, usize, RandomState> = times
            .iter()
            .enumerate()
            .map(|(idx, &t)| (t, idx))
            .collect();

        let n = rows.nrows();
        let mut grid_coords: Vec<SmallVec<[i64; 4]>> = Vec::with_capacity(n);
        let mut mins = vec![i64::MAX; dim];
        let mut maxs = vec![i64::MIN; dim];
        for i in 0..n {
            let mut cell = SmallVec::with_capacity(dim);
            for k in 0..dim {
                let g = rows[(i, META_COLUMNS + k)].round() as i64;
                mins[k] = mins[k].min(g);
                maxs[k] = maxs[k].max(g);
                cell.push(g);
            }
            grid_coords.push(cell);
        }

        let (origin, sides): (Vec<i64>, Vec<usize>) = if n == 0 {
            (vec![0; dim], vec![0; dim])
        } else {
            let sides = mins
                .iter()
                .zip(&maxs)
                .map(|(lo, hi)| (hi - lo + 1) as usize)
                .collect();
            (mins, sides)
        };

        let mut shape = Vec::with_capacity(1 + dim);
        shape.push(times.len());
        shape.extend(sides);

        let volume: usize = shape.iter().product();
        let mut counts = vec![0_u64; volume];

        for (i, cell) in grid_coords.iter().enumerate() {
            let t = rows[(i, TIME_COLUMN)].round() as TimeStep;
            let time_idx = time_index
                .get(&t)
                .copied()
                .expect("synthesized rows carry traversal times only");
            let mut flat = time_idx;
            for (k, &g) in cell.iter().enumerate() {
                flat = flat * shape[1 + k] + (g - origin[k]) as usize;
            }
            counts[flat] += 1;
        }

        Self {
            shape,
            origin,
            times: times.to_vec(),
            counts,
        }
    }

    /// Extents per axis: `[n_times, side_1, .., side_D]`.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Rounded minimum coordinate per spatial axis.
    ///
    /// Adding the origin to a spatial cell index recovers the rounded
    /// coordinate the cell bins.
    #[inline]
    pub fn origin(&self) -> &[i64] {
        &self.origin
    }

    /// Traversal times labelling the first axis.
    #[inline]
    pub fn times(&self) -> &[TimeStep] {
        &self.times
    }

    /// Flattened cell counts, row-major with the time axis first.
    #[inline]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Number of axes (`1 + D`).
    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Count stored at a multi-dimensional cell index.
    ///
    /// Panics
    /// ----------
    /// * If `idx` does not have exactly [`rank`](Self::rank) entries or any
    ///   entry falls outside the grid.
    pub fn at(&self, idx: &[usize]) -> u64 {
        self.counts[self.flat_index(idx)]
    }

    /// Total number of binned samples, one per synthesized row.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Iterate over occupied cells as `(index, count)` pairs.
    pub fn nonzero(&self) -> impl Iterator<Item = (Vec<usize>, u64)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count > 0)
            .map(|(flat, &count)| (self.unflatten(flat), count))
    }

    fn flat_index(&self, idx: &[usize]) -> usize {
        assert_eq!(idx.len(), self.shape.len(), "heatmap index rank mismatch");
        let mut flat = 0;
        for (axis, &i) in idx.iter().enumerate() {
            assert!(
                i < self.shape[axis],
                "heatmap index out of bounds on axis {axis}"
            );
            flat = flat * self.shape[axis] + i;
        }
        flat
    }

    fn unflatten(&self, mut flat: usize) -> Vec<usize> {
        let mut idx = vec![0; self.shape.len()];
        for axis in (0..self.shape.len()).rev() {
            idx[axis] = flat % self.shape[axis];
            flat /= self.shape[axis];
        }
        idx
    }
}

impl fmt::Display for Heatmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let occupied = self.counts.iter().filter(|&&c| c > 0).count();
        write!(
            f,
            "heatmap shape={:?} origin={:?} occupied={}/{}",
            self.shape,
            self.origin,
            occupied,
            self.counts.len()
        )
    }
}
