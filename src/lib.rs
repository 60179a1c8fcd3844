//! rasterpca: A Fast, Modular Principal Component Transform for Multi-Band Rasters
//!
//! This library extracts decorrelated, variance-ranked feature bands from a
//! multi-band raster: band statistics over a spatial region, eigen
//! decomposition of the band covariance, SD-normalized projection of every
//! pixel, and mask-preserving output with explained-variance metadata.

pub mod core;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, CoordinateSystem, GeoTransform, PcaError, PcaResult, PixelMask, RasterBand,
    RasterGrid, RasterReal, RasterStack, Region, StackMetadata,
};

pub use crate::core::{
    BandStatistics, DegeneratePolicy, EigenDecomposition, PcaParams, PcaPipeline,
    PrincipalComponentImage, ProjectionParams,
};
