//! Data layer: core types and loading.
//!
//! Architecture:
//! ```text
//!  .csv (instrument export) / .json / .parquet
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  parse file → SpectralDataset
//!   └──────────┘
//!        │
//!        ▼
//!   ┌────────────────┐
//!   │ SpectralDataset │  Vec<Spectrum>, tag index
//!   └────────────────┘
//! ```

pub mod loader;
pub mod model;
