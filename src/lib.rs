//! # Driftcast
//!
//! Data-driven regression and synthesis of particle trajectories.
//!
//! Given a movie of tracked particles, `Driftcast` fits one neighbor
//! regressor per consecutive pair of time steps and grows synthetic tracks
//! from arbitrary seed positions by chaining those per-step predictions,
//! optionally jittered and optionally snapped onto historical starting
//! positions. Batches come back either as raw interchange rows or rasterized
//! into an occupancy heatmap.
//!
//! ## Module map
//!
//! - [`driftcast`] – The engine: configuration, lazy fitting, synthesis
//!   entry points.
//! - [`tracks`] – Ingestion of the numeric row table into time buckets.
//! - [`regression`] – Per-step neighbor regression models.
//! - [`heatmap`] – Occupancy grid aggregation of synthesized rows.
//! - [`constants`] – Shared type aliases and table layout.
//! - [`driftcast_errors`] – The crate error type.
//!
//! See the [`driftcast`] module documentation for a worked example.

pub mod constants;
pub mod driftcast;
pub mod driftcast_errors;
pub mod heatmap;
pub mod regression;
mod synthesis;
pub mod tracks;

pub use crate::constants::{TimeStep, TrackId};
pub use crate::driftcast::{Driftcast, DriftcastBuilder, SynthesisOutput};
pub use crate::driftcast_errors::DriftcastError;
pub use crate::heatmap::Heatmap;
pub use crate::regression::{StepModel, StepModelBank, Weighting};
pub use crate::tracks::{BucketStats, TrackStore};
