//! Core principal component processing modules

pub mod eigen;
pub mod finalize;
pub mod pipeline;
pub mod project;
pub mod statistics;

// Re-export main types
pub use eigen::{decompose, EigenDecomposition};
pub use finalize::{finalize, PrincipalComponentImage};
pub use pipeline::{PcaParams, PcaPipeline};
pub use project::{component_standard_deviations, project, DegeneratePolicy, ProjectionParams};
pub use statistics::{compute_band_statistics, BandStatistics};
