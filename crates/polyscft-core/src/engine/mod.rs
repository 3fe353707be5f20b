//! # Engine Module
//!
//! Stateful numerical machinery of the self-consistent field iteration: the
//! propagator solver that turns fields into concentrations and the Anderson
//! accelerator that turns residuals into the next fields.
//!
//! ## Architecture
//!
//! - **Propagator Solver** ([`propagator`]) - Pseudo-spectral solution of the
//!   modified diffusion equation, generic over the spectral backend
//! - **Anderson Mixing** ([`anderson`]) - History-based acceleration of the
//!   outer fixed-point iteration with adaptive simple mixing as fallback
//! - **History Storage** ([`history`]) - Fixed-capacity ring buffer backing the
//!   accelerator
//! - **Configuration** ([`config`]) - Validated parameter sets and builders
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress events
//! - **Error Handling** ([`error`]) - Engine-wide error type
//!
//! Solvers and accelerators own their scratch storage; one instance serves one
//! simulation at a time.

pub mod anderson;
pub mod config;
pub mod error;
pub mod history;
pub mod progress;
pub mod propagator;
