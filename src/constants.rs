//! # Constants and type definitions for Driftcast
//!
//! This module centralizes the **table layout constants** and **common type
//! definitions** used throughout the `Driftcast` library.
//!
//! ## Overview
//!
//! - Core type aliases used across the crate
//! - Layout of the numeric row table `[track_id, time, coord_1, .., coord_D]`
//! - Tolerances for distance comparisons
//!
//! These definitions are used by all main modules, including track ingestion,
//! step regression, and trajectory synthesis.

use nalgebra::DVector;
use smallvec::SmallVec;

// -------------------------------------------------------------------------------------------------
// Row table layout
// -------------------------------------------------------------------------------------------------

/// Number of metadata columns leading a row table (`track_id` and `time`)
pub const META_COLUMNS: usize = 2;

/// Column index of the track identifier in a row table
pub const ID_COLUMN: usize = 0;

/// Column index of the time step in a row table
pub const TIME_COLUMN: usize = 1;

/// Distances at or below this threshold count as an exact coincidence
/// between a query position and a training origin
pub const DIST_EPS: f64 = 1e-12;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Identifier of a particle track.
///
/// Carried as a float column in the row table and normalized by rounding
/// on ingestion.
pub type TrackId = i64;

/// Discrete acquisition step along the movie time axis
pub type TimeStep = i64;

/// A spatial position of runtime dimensionality (2-D, 3-D, or higher)
pub type Position = DVector<f64>;

// -------------------------------------------------------------------------------------------------
// Data containers
// -------------------------------------------------------------------------------------------------

/// All tracks observed at one time step, sorted by ascending [`TrackId`]
pub type TimeBucket = Vec<(TrackId, Position)>;

/// A small, inline-optimized set of training-pair indices with their
/// distances to a query position.
pub type Neighborhood = SmallVec<[(usize, f64); 8]>;
