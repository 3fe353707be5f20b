//! # Core Module
//!
//! Stateless building blocks for self-consistent field calculations of polymer
//! melts: the discretized simulation box, the chain description, the spectral
//! transform capability and contour quadrature rules.
//!
//! ## Architecture
//!
//! - **Geometry** ([`grid`]) - Uniform periodic grid, volume integrals and the
//!   weighted inner products used throughout the engine
//! - **Chain Description** ([`chain`]) - Composition, contour discretization and
//!   chain statistics model of an AB diblock copolymer
//! - **Spectral Transforms** ([`spectral`]) - The `SpectralTransform` capability
//!   and its `rustfft` backend
//! - **Quadrature** ([`quadrature`]) - Weights for integrating along the chain
//!   contour
//!
//! Nothing in this layer keeps state between calls; the stateful solvers live in
//! [`crate::engine`].

pub mod chain;
pub mod grid;
pub mod quadrature;
pub mod spectral;
