//! Pixel projection onto the eigenvector basis.
//!
//! Each pixel's band vector is mean-centered, left-multiplied by the
//! eigenvector matrix, and normalized by the component standard deviation
//! `sqrt(|eigenvalue|)`. The absolute value guards against small negative
//! eigenvalues a near-singular covariance matrix can produce in floating
//! point.

use crate::types::{
    PcaError, PcaResult, PixelMask, RasterBand, RasterGrid, RasterStack,
};
use ndarray::Array2;

/// How to normalize a component whose eigenvalue is (near) zero.
///
/// Degenerate or collinear input bands make the SD divisor vanish; neither
/// policy ever lets a non-finite value propagate silently.
#[derive(Debug, Clone, Copy)]
pub enum DegeneratePolicy {
    /// Fail with [`PcaError::DegenerateComponent`]
    Fail,
    /// Clamp the SD divisor to the given minimum
    Floor { min_sd: f64 },
}

/// Projection parameters
#[derive(Debug, Clone)]
pub struct ProjectionParams {
    /// Degenerate-eigenvalue handling
    pub degenerate: DegeneratePolicy,
    /// An eigenvalue is degenerate when `|ev| <= epsilon * sum(|ev|)`
    pub epsilon: f64,
}

impl Default for ProjectionParams {
    fn default() -> Self {
        Self {
            degenerate: DegeneratePolicy::Fail,
            epsilon: 1e-12,
        }
    }
}

/// SD divisor per component: `sqrt(|eigenvalue_k|)`, subject to the
/// degenerate policy.
///
/// # Errors
/// [`PcaError::DegenerateComponent`] under [`DegeneratePolicy::Fail`] when a
/// component's eigenvalue falls below the relative epsilon threshold.
pub fn component_standard_deviations(
    eigenvalues: &[f64],
    params: &ProjectionParams,
) -> PcaResult<Vec<f64>> {
    let total: f64 = eigenvalues.iter().map(|ev| ev.abs()).sum();
    let mut sds = Vec::with_capacity(eigenvalues.len());

    for (k, &ev) in eigenvalues.iter().enumerate() {
        let degenerate = ev.abs() <= params.epsilon * total;
        let sd = match (degenerate, params.degenerate) {
            (true, DegeneratePolicy::Fail) => {
                return Err(PcaError::DegenerateComponent {
                    component: k + 1,
                    eigenvalue: ev,
                });
            }
            (true, DegeneratePolicy::Floor { min_sd }) => min_sd,
            (false, DegeneratePolicy::Floor { min_sd }) => ev.abs().sqrt().max(min_sd),
            (false, DegeneratePolicy::Fail) => ev.abs().sqrt(),
        };
        sds.push(sd);
    }
    Ok(sds)
}

/// Project every pixel of a stack onto the eigenvector basis.
///
/// Component k of a pixel is the dot product of eigenvector row k with the
/// mean-centered band vector, divided by `sds[k]`. Output bands are named
/// `pc1..pcP` in descending-variance order. Pixels that are masked or carry
/// a non-finite sample in any band become NaN in every component; the
/// output mask is left fully valid for the finalize stage to overwrite.
///
/// # Errors
/// [`PcaError::InvalidStack`] when `means`, `eigenvectors`, or `sds`
/// disagree with the stack's band count.
pub fn project(
    stack: &RasterStack,
    means: &[f64],
    eigenvectors: &Array2<f64>,
    sds: &[f64],
) -> PcaResult<RasterStack> {
    let n_bands = stack.band_count();
    if means.len() != n_bands
        || eigenvectors.dim() != (n_bands, n_bands)
        || sds.len() != n_bands
    {
        return Err(PcaError::InvalidStack(format!(
            "projection inputs disagree with band count {}",
            n_bands
        )));
    }

    let (rows, cols) = stack.shape();
    log::info!(
        "Projecting {}x{} pixels onto {} principal components",
        rows,
        cols,
        n_bands
    );

    let mut outputs: Vec<RasterGrid> = (0..n_bands)
        .map(|_| Array2::from_elem((rows, cols), f32::NAN))
        .collect();

    let mut centered = vec![0.0f64; n_bands];
    for r in 0..rows {
        for c in 0..cols {
            if !stack.mask()[[r, c]] {
                continue;
            }
            let mut all_valid = true;
            for b in 0..n_bands {
                let v = stack.bands()[b].data[[r, c]];
                if !v.is_finite() {
                    all_valid = false;
                    break;
                }
                centered[b] = v as f64 - means[b];
            }
            if !all_valid {
                continue;
            }
            for k in 0..n_bands {
                let mut score = 0.0f64;
                for b in 0..n_bands {
                    score += eigenvectors[[k, b]] * centered[b];
                }
                outputs[k][[r, c]] = (score / sds[k]) as f32;
            }
        }
    }

    let bands: Vec<RasterBand> = outputs
        .into_iter()
        .enumerate()
        .map(|(k, data)| RasterBand::new(format!("pc{}", k + 1), data))
        .collect();

    RasterStack::new(
        bands,
        PixelMask::from_elem((rows, cols), true),
        stack.geo_transform().clone(),
        stack.coordinate_system().clone(),
        stack.metadata().clone(),
    )
}
