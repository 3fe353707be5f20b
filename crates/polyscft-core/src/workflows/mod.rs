//! # Workflows Module
//!
//! Top-level simulation procedures that combine the [`crate::engine`]
//! components into complete runs.
//!
//! ## Architecture
//!
//! - **Saddle-Point Search** ([`saddle_point`]) - Relaxes the pressure field of
//!   an incompressible AB melt for a given exchange field
//! - **Langevin Dynamics** ([`langevin`]) - Predictor-corrector field-theoretic
//!   simulation of the exchange field, with a saddle-point search after every
//!   stage
//!
//! Both workflows update the caller's fields in place and report progress
//! through [`crate::engine::progress::ProgressReporter`].

pub mod langevin;
pub mod saddle_point;
