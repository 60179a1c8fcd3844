//! Region statistics: per-band means and band-to-band covariance.
//!
//! Statistics are gathered over a deterministic sample grid derived from the
//! requested region and scale. Mean-centering happens before the covariance
//! pass so large-magnitude band values do not cancel catastrophically, and
//! every band pair is restricted to its jointly-valid pixels.

use crate::types::{PcaError, PcaResult, RasterStack, Region};
use ndarray::Array2;

/// Image size above which statistics are gathered in parallel row stripes
pub const PARALLEL_PIXEL_THRESHOLD: usize = 1_000_000;

const STRIPE_ROWS: usize = 256;

/// Per-band means and band-to-band covariance over a sampled region
#[derive(Debug, Clone)]
pub struct BandStatistics {
    /// Sample mean per band (valid pixels of that band only)
    pub means: Vec<f64>,
    /// Sample covariance (divisor n - 1, jointly-valid pixels per pair)
    pub covariance: Array2<f64>,
    /// Jointly-valid sample count per band pair
    pub sample_counts: Array2<u64>,
    /// Pixel positions visited on the sample grid
    pub pixels_scanned: usize,
}

/// Deterministic sample grid: a pixel window plus a uniform stride.
///
/// The same positions are visited for every band, so band-pair statistics
/// can never misalign under subsampling.
#[derive(Debug, Clone, Copy)]
struct SampleGrid {
    row0: usize,
    row1: usize,
    col0: usize,
    col1: usize,
    step: usize,
}

impl SampleGrid {
    fn sampled_rows(&self) -> usize {
        (self.row1 - self.row0 + self.step - 1) / self.step
    }

    fn sampled_cols(&self) -> usize {
        (self.col1 - self.col0 + self.step - 1) / self.step
    }

    fn sampled_pixels(&self) -> usize {
        self.sampled_rows() * self.sampled_cols()
    }
}

/// Mergeable partial sums for the mean pass
#[derive(Debug, Clone)]
struct MeanAccumulator {
    sums: Vec<f64>,
    counts: Vec<u64>,
}

impl MeanAccumulator {
    fn new(n_bands: usize) -> Self {
        Self {
            sums: vec![0.0; n_bands],
            counts: vec![0; n_bands],
        }
    }

    fn merge(mut self, other: Self) -> Self {
        for b in 0..self.sums.len() {
            self.sums[b] += other.sums[b];
            self.counts[b] += other.counts[b];
        }
        self
    }
}

/// Mergeable partial sums for the centered cross-product pass
#[derive(Debug, Clone)]
struct CrossAccumulator {
    cross: Array2<f64>,
    counts: Array2<u64>,
}

impl CrossAccumulator {
    fn new(n_bands: usize) -> Self {
        Self {
            cross: Array2::zeros((n_bands, n_bands)),
            counts: Array2::zeros((n_bands, n_bands)),
        }
    }

    fn merge(mut self, other: Self) -> Self {
        self.cross += &other.cross;
        self.counts += &other.counts;
        self
    }
}

/// Compute per-band means and the band-to-band covariance matrix of a stack
/// within a region.
///
/// Sampling policy: the region bounds are mapped to a pixel window through
/// the stack's geotransform and sampled on a uniform stride of
/// `round(scale / pixel_size)` pixels. If the strided grid still exceeds the
/// region's pixel budget, the stride is enlarged by
/// `ceil(sqrt(sampled / max_pixels))` so coverage shrinks symmetrically for
/// every band.
///
/// # Errors
/// * [`PcaError::InvalidStack`] - fewer than two bands
/// * [`PcaError::InvalidRegion`] - non-positive scale or pixel budget
/// * [`PcaError::InsufficientData`] - region misses the raster, no valid
///   pixels, or a band pair with fewer than two jointly-valid samples
pub fn compute_band_statistics(stack: &RasterStack, region: &Region) -> PcaResult<BandStatistics> {
    let n_bands = stack.band_count();
    if n_bands < 2 {
        return Err(PcaError::InvalidStack(format!(
            "covariance requires at least 2 bands, got {}",
            n_bands
        )));
    }

    let grid = resolve_sample_grid(stack, region)?;
    let sampled = grid.sampled_pixels();

    log::info!(
        "Region statistics: window {}x{} pixels, stride {}, {} sample positions",
        grid.row1 - grid.row0,
        grid.col1 - grid.col0,
        grid.step,
        sampled
    );

    let rows: Vec<usize> = (grid.row0..grid.row1).step_by(grid.step).collect();

    let mean_acc = if sampled > PARALLEL_PIXEL_THRESHOLD {
        accumulate_means_parallel(stack, &grid, &rows)
    } else {
        accumulate_means(stack, &grid, &rows)
    };

    let total_valid: u64 = mean_acc.counts.iter().sum();
    if total_valid == 0 {
        return Err(PcaError::InsufficientData(
            "no valid pixels within region".to_string(),
        ));
    }
    for (b, &count) in mean_acc.counts.iter().enumerate() {
        if count == 0 {
            return Err(PcaError::InsufficientData(format!(
                "band '{}' has no valid pixels within region",
                stack.bands()[b].name
            )));
        }
    }

    let means: Vec<f64> = mean_acc
        .sums
        .iter()
        .zip(&mean_acc.counts)
        .map(|(&s, &c)| s / c as f64)
        .collect();

    let cross_acc = if sampled > PARALLEL_PIXEL_THRESHOLD {
        accumulate_cross_parallel(stack, &grid, &rows, &means)
    } else {
        accumulate_cross(stack, &grid, &rows, &means)
    };

    let mut covariance = Array2::<f64>::zeros((n_bands, n_bands));
    let mut sample_counts = Array2::<u64>::zeros((n_bands, n_bands));
    for i in 0..n_bands {
        for j in i..n_bands {
            let n = cross_acc.counts[[i, j]];
            if n < 2 {
                return Err(PcaError::InsufficientData(format!(
                    "band pair ({}, {}) has {} jointly-valid samples, need at least 2",
                    stack.bands()[i].name,
                    stack.bands()[j].name,
                    n
                )));
            }
            let cov = cross_acc.cross[[i, j]] / (n - 1) as f64;
            covariance[[i, j]] = cov;
            covariance[[j, i]] = cov;
            sample_counts[[i, j]] = n;
            sample_counts[[j, i]] = n;
        }
    }

    log::debug!(
        "Band means: {:?}, diagonal variances: {:?}",
        means,
        (0..n_bands).map(|b| covariance[[b, b]]).collect::<Vec<_>>()
    );

    Ok(BandStatistics {
        means,
        covariance,
        sample_counts,
        pixels_scanned: sampled,
    })
}

/// Resolve region bounds + scale + budget into a pixel window and stride
fn resolve_sample_grid(stack: &RasterStack, region: &Region) -> PcaResult<SampleGrid> {
    if !(region.scale > 0.0) {
        return Err(PcaError::InvalidRegion(format!(
            "scale must be positive, got {}",
            region.scale
        )));
    }
    if region.max_pixels == 0 {
        return Err(PcaError::InvalidRegion(
            "pixel budget must be positive".to_string(),
        ));
    }

    let (n_rows, n_cols) = stack.shape();
    let gt = stack.geo_transform();

    // North-up: (min_x, max_y) is the top-left corner of the window
    let (top_row, left_col) = gt.map_to_pixel(region.bounds.min_x, region.bounds.max_y);
    let (bottom_row, right_col) = gt.map_to_pixel(region.bounds.max_x, region.bounds.min_y);

    let row0 = top_row.floor().max(0.0) as usize;
    let row1 = (bottom_row.ceil() as isize).min(n_rows as isize).max(0) as usize;
    let col0 = left_col.floor().max(0.0) as usize;
    let col1 = (right_col.ceil() as isize).min(n_cols as isize).max(0) as usize;

    if row0 >= row1 || col0 >= col1 {
        return Err(PcaError::InsufficientData(
            "region does not intersect raster extent".to_string(),
        ));
    }

    let pixel_size = gt.pixel_width.abs();
    let mut step = ((region.scale / pixel_size).round() as usize).max(1);

    let mut grid = SampleGrid {
        row0,
        row1,
        col0,
        col1,
        step,
    };

    if grid.sampled_pixels() > region.max_pixels {
        let ratio = grid.sampled_pixels() as f64 / region.max_pixels as f64;
        let factor = (ratio.sqrt().ceil() as usize).max(2);
        step *= factor;
        grid.step = step;
        while grid.sampled_pixels() > region.max_pixels {
            grid.step += 1;
        }
        log::warn!(
            "Pixel budget {} exceeded, stride widened to {} ({} sample positions)",
            region.max_pixels,
            grid.step,
            grid.sampled_pixels()
        );
    }

    Ok(grid)
}

fn accumulate_means(stack: &RasterStack, grid: &SampleGrid, rows: &[usize]) -> MeanAccumulator {
    rows.iter()
        .map(|&r| accumulate_means_stripe(stack, grid, &[r]))
        .fold(MeanAccumulator::new(stack.band_count()), |a, b| a.merge(b))
}

fn accumulate_means_parallel(
    stack: &RasterStack,
    grid: &SampleGrid,
    rows: &[usize],
) -> MeanAccumulator {
    use rayon::prelude::*;

    log::debug!("Mean pass over {} rows in parallel stripes", rows.len());
    rows.par_chunks(STRIPE_ROWS)
        .map(|stripe| accumulate_means_stripe(stack, grid, stripe))
        .reduce(
            || MeanAccumulator::new(stack.band_count()),
            |a, b| a.merge(b),
        )
}

fn accumulate_means_stripe(
    stack: &RasterStack,
    grid: &SampleGrid,
    rows: &[usize],
) -> MeanAccumulator {
    let n_bands = stack.band_count();
    let mut acc = MeanAccumulator::new(n_bands);
    for &r in rows {
        for c in (grid.col0..grid.col1).step_by(grid.step) {
            if !stack.mask()[[r, c]] {
                continue;
            }
            for b in 0..n_bands {
                let v = stack.bands()[b].data[[r, c]];
                if v.is_finite() {
                    acc.sums[b] += v as f64;
                    acc.counts[b] += 1;
                }
            }
        }
    }
    acc
}

fn accumulate_cross(
    stack: &RasterStack,
    grid: &SampleGrid,
    rows: &[usize],
    means: &[f64],
) -> CrossAccumulator {
    rows.iter()
        .map(|&r| accumulate_cross_stripe(stack, grid, &[r], means))
        .fold(CrossAccumulator::new(stack.band_count()), |a, b| {
            a.merge(b)
        })
}

fn accumulate_cross_parallel(
    stack: &RasterStack,
    grid: &SampleGrid,
    rows: &[usize],
    means: &[f64],
) -> CrossAccumulator {
    use rayon::prelude::*;

    log::debug!("Covariance pass over {} rows in parallel stripes", rows.len());
    rows.par_chunks(STRIPE_ROWS)
        .map(|stripe| accumulate_cross_stripe(stack, grid, stripe, means))
        .reduce(
            || CrossAccumulator::new(stack.band_count()),
            |a, b| a.merge(b),
        )
}

fn accumulate_cross_stripe(
    stack: &RasterStack,
    grid: &SampleGrid,
    rows: &[usize],
    means: &[f64],
) -> CrossAccumulator {
    let n_bands = stack.band_count();
    let mut acc = CrossAccumulator::new(n_bands);
    let mut centered = vec![0.0f64; n_bands];
    let mut valid = vec![false; n_bands];

    for &r in rows {
        for c in (grid.col0..grid.col1).step_by(grid.step) {
            if !stack.mask()[[r, c]] {
                continue;
            }
            for b in 0..n_bands {
                let v = stack.bands()[b].data[[r, c]];
                valid[b] = v.is_finite();
                centered[b] = if valid[b] { v as f64 - means[b] } else { 0.0 };
            }
            for i in 0..n_bands {
                if !valid[i] {
                    continue;
                }
                for j in i..n_bands {
                    if valid[j] {
                        acc.cross[[i, j]] += centered[i] * centered[j];
                        acc.counts[[i, j]] += 1;
                    }
                }
            }
        }
    }
    acc
}
