//! XPS spectrum analysis: charge correction, Shirley backgrounds, atomic
//! composition and pseudo-Voigt peak decomposition.

pub mod analysis;
pub mod config;
pub mod data;
pub mod pipeline;
pub mod report;
