//! # polyscft
//!
//! Self-consistent field theory and Langevin field-theoretic simulation of AB
//! diblock copolymer melts on periodic three-dimensional grids.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless descriptions of the simulation box
//!   and polymer chain, the `SpectralTransform` capability with its `rustfft`
//!   backend, and contour quadrature rules.
//!
//! - **[`engine`]: The Numerical Core.** The pseudo-spectral `PropagatorSolver`
//!   and the `AndersonMixing` accelerator with its `HistoryBuffer`, together
//!   with configuration, progress reporting and the error type.
//!
//! - **[`workflows`]: The Public API.** Complete procedures built on the
//!   engine: the saddle-point search and Langevin dynamics.

pub mod core;
pub mod engine;
pub mod workflows;
