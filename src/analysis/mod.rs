//! Numerical engine: backgrounds, areas, charge correction, composition and
//! peak decomposition.
//!
//! ```text
//!   Spectrum ──► charge ──► shirley ──► integrate ──► composition
//!                              │
//!                              └──► fitting (lineshape + solver)
//! ```

pub mod baseline;
pub mod charge;
pub mod composition;
pub mod extremum;
pub mod fitting;
pub mod integrate;
pub mod lineshape;
pub mod shirley;
pub mod solver;
