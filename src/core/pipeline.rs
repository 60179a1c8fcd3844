//! End-to-end principal component pipeline.
//!
//! Chains region statistics, eigen decomposition, projection, and mask
//! propagation into one invocation. Each stage is a pure function over
//! immutable inputs; nothing is cached between runs.

use crate::core::eigen::decompose;
use crate::core::finalize::{finalize, PrincipalComponentImage};
use crate::core::project::{component_standard_deviations, project, ProjectionParams};
use crate::core::statistics::compute_band_statistics;
use crate::types::{PcaResult, RasterStack, Region};

/// Pipeline parameters
#[derive(Debug, Clone, Default)]
pub struct PcaParams {
    /// Projection/normalization parameters
    pub projection: ProjectionParams,
}

/// Principal component pipeline processor
pub struct PcaPipeline {
    params: PcaParams,
}

impl PcaPipeline {
    /// Create a pipeline with default parameters
    pub fn new() -> Self {
        Self {
            params: PcaParams::default(),
        }
    }

    /// Create a pipeline with custom parameters
    pub fn with_params(params: PcaParams) -> Self {
        Self { params }
    }

    /// Run the full transform: statistics over `region`, eigen
    /// decomposition, per-pixel projection of the whole stack, and mask
    /// propagation.
    pub fn run(&self, stack: &RasterStack, region: &Region) -> PcaResult<PrincipalComponentImage> {
        log::info!(
            "PCA over {} bands, {}x{} pixels, scale {}",
            stack.band_count(),
            stack.shape().0,
            stack.shape().1,
            region.scale
        );

        let stats = compute_band_statistics(stack, region)?;
        log::debug!(
            "Statistics from {} sample positions",
            stats.pixels_scanned
        );

        let eigen = decompose(&stats.covariance)?;
        let sds = component_standard_deviations(&eigen.eigenvalues, &self.params.projection)?;
        let raw = project(stack, &stats.means, &eigen.eigenvectors, &sds)?;
        let image = finalize(raw, stack, &eigen.eigenvalues, sds)?;

        log::info!("PCA complete: {} components", image.stack.band_count());
        Ok(image)
    }
}

impl Default for PcaPipeline {
    fn default() -> Self {
        Self::new()
    }
}
