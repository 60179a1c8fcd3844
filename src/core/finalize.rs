//! Mask reapplication and variance-share metadata.

use crate::types::{PcaError, PcaResult, RasterBand, RasterStack};
use std::collections::BTreeMap;

/// Final output of the pipeline: SD-normalized principal component bands
/// carrying the source mask and explained-variance metadata.
#[derive(Debug, Clone)]
pub struct PrincipalComponentImage {
    /// Component bands `pc1..pcP`, masked like the source stack
    pub stack: RasterStack,
    /// Eigenvalues in component order (descending)
    pub eigenvalues: Vec<f64>,
    /// Component standard deviations used for normalization
    pub standard_deviations: Vec<f64>,
    /// Zero-padded component ordinal ("01", "02", ...) to percentage of
    /// total variance, rounded to two decimals
    pub variance_share: BTreeMap<String, f64>,
}

impl PrincipalComponentImage {
    /// The leading `n` component bands, for downstream band selection.
    /// Which `n` captures enough variance is the caller's decision,
    /// informed by [`variance_share`](Self::variance_share).
    pub fn select_components(&self, n: usize) -> &[RasterBand] {
        let n = n.min(self.stack.band_count());
        &self.stack.bands()[..n]
    }
}

/// Reapply the source mask to the raw component bands and attach
/// explained-variance metadata.
///
/// Every pixel invalid in the source becomes invalid (and NaN) in every
/// component band. Variance shares are `100 * eigenvalue_k / sum`, rounded
/// to two decimals and keyed by zero-padded 1-based ordinal.
///
/// # Errors
/// [`PcaError::DegenerateComponent`] when the eigenvalue total is not
/// positive (no variance to apportion).
pub fn finalize(
    raw_components: RasterStack,
    source: &RasterStack,
    eigenvalues: &[f64],
    standard_deviations: Vec<f64>,
) -> PcaResult<PrincipalComponentImage> {
    let total: f64 = eigenvalues.iter().sum();
    if !(total > 0.0) {
        return Err(PcaError::DegenerateComponent {
            component: 1,
            eigenvalue: eigenvalues.first().copied().unwrap_or(0.0),
        });
    }

    let mask = source.mask().clone();
    let mut bands = raw_components.bands().to_vec();
    for band in &mut bands {
        for ((r, c), valid) in mask.indexed_iter() {
            if !*valid {
                band.data[[r, c]] = f32::NAN;
            }
        }
    }

    let mut variance_share = BTreeMap::new();
    for (k, &ev) in eigenvalues.iter().enumerate() {
        let pct = 100.0 * ev / total;
        variance_share.insert(format!("{:02}", k + 1), (pct * 100.0).round() / 100.0);
    }

    log::info!("Variance shares: {:?}", variance_share);

    let stack = RasterStack::new(
        bands,
        mask,
        source.geo_transform().clone(),
        source.coordinate_system().clone(),
        source.metadata().clone(),
    )?;

    Ok(PrincipalComponentImage {
        stack,
        eigenvalues: eigenvalues.to_vec(),
        standard_deviations,
        variance_share,
    })
}
