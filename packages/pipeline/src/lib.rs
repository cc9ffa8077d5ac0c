#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Fire alert pipeline.
//!
//! Each stage is a pure function over an owned collection:
//!
//! 1. [`proximity`] flags detections near industrial heat sources and keeps
//!    today's non-industrial points.
//! 2. [`classify`] joins the survivors against the administrative,
//!    conservation-unit and buffer-zone layers.
//! 3. [`gate`] keeps points inside a protected area.
//! 4. [`dedup`] decides whether the result differs from the last alert.
//!
//! [`run`] wires the stages to the fetch, delivery and state collaborators.

pub mod classify;
pub mod config;
pub mod dedup;
pub mod gate;
pub mod proximity;
pub mod reference;
pub mod run;

use fire_alert_spatial::SpatialError;

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Reference data (industrial sites or a polygon layer) could not be
    /// loaded.
    #[error("Reference data unavailable: {0}")]
    ReferenceData(#[from] SpatialError),
}
