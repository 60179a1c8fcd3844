use approx::assert_relative_eq;
use ndarray::{Array, Array2};
use rasterpca::core::{compute_band_statistics, decompose, project};
use rasterpca::{
    CoordinateSystem, DegeneratePolicy, GeoTransform, PcaError, PcaParams, PcaPipeline, PixelMask,
    ProjectionParams, RasterBand, RasterStack, Region, StackMetadata,
};

/// Deterministic pseudo-random sequence (no RNG dependency needed)
struct Lcg(u64);

impl Lcg {
    fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as f64 / (1u64 << 31) as f64
    }
}

/// Synthetic 3-band stack: two latent signals mixed into three bands with
/// distinct loadings, so the covariance has full rank and a dominant axis.
fn synthetic_stack(rows: usize, cols: usize) -> RasterStack {
    let mut lcg = Lcg(42);
    let mut b1 = Array2::<f32>::zeros((rows, cols));
    let mut b2 = Array2::<f32>::zeros((rows, cols));
    let mut b3 = Array2::<f32>::zeros((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            let s = lcg.next_f64();
            let t = lcg.next_f64();
            let noise = lcg.next_f64() - 1.0;
            b1[[r, c]] = (1000.0 + 40.0 * s + 5.0 * t) as f32;
            b2[[r, c]] = (500.0 + 25.0 * s - 12.0 * t) as f32;
            b3[[r, c]] = (2000.0 - 10.0 * s + 30.0 * t + noise) as f32;
        }
    }
    let mut metadata = StackMetadata::default();
    metadata.source_id = "synthetic-composite".to_string();
    RasterStack::new(
        vec![
            RasterBand::new("red", b1),
            RasterBand::new("nir", b2),
            RasterBand::new("elev", b3),
        ],
        PixelMask::from_elem((rows, cols), true),
        GeoTransform::north_up(400000.0, 350000.0, 30.0, 30.0),
        CoordinateSystem::Projected { epsg: 32647 },
        metadata,
    )
    .unwrap()
}

/// Sample variance (divisor n - 1) over valid pixels of one band
fn band_variance(data: &Array2<f32>) -> f64 {
    let values: Vec<f64> = data
        .iter()
        .filter(|v| v.is_finite())
        .map(|&v| v as f64)
        .collect();
    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64
}

#[test]
fn test_full_pipeline_output_shape_and_names() {
    let _ = env_logger::try_init();

    let stack = synthetic_stack(32, 32);
    let region = Region::covering(&stack);
    let image = PcaPipeline::new().run(&stack, &region).unwrap();

    assert_eq!(image.stack.band_count(), 3);
    assert_eq!(image.stack.shape(), (32, 32));
    let names: Vec<&str> = image.stack.bands().iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["pc1", "pc2", "pc3"]);
    assert_eq!(image.stack.metadata().source_id, "synthetic-composite");
    assert_eq!(image.eigenvalues.len(), 3);
    assert!(image.eigenvalues[0] >= image.eigenvalues[1]);
    assert!(image.eigenvalues[1] >= image.eigenvalues[2]);
}

#[test]
fn test_variance_shares_sum_to_one_hundred() {
    let stack = synthetic_stack(32, 32);
    let image = PcaPipeline::new()
        .run(&stack, &Region::covering(&stack))
        .unwrap();

    assert_eq!(image.variance_share.len(), 3);
    assert!(image.variance_share.contains_key("01"));
    assert!(image.variance_share.contains_key("03"));
    let sum: f64 = image.variance_share.values().sum();
    assert!(
        (sum - 100.0).abs() < 0.05,
        "variance shares sum to {}, expected ~100",
        sum
    );
}

#[test]
fn test_mask_propagates_to_every_component() {
    let base = synthetic_stack(16, 16);
    let mut mask = PixelMask::from_elem((16, 16), true);
    mask[[0, 0]] = false;
    mask[[7, 9]] = false;
    mask[[15, 15]] = false;
    let stack = RasterStack::new(
        base.bands().to_vec(),
        mask.clone(),
        base.geo_transform().clone(),
        base.coordinate_system().clone(),
        base.metadata().clone(),
    )
    .unwrap();

    let image = PcaPipeline::new()
        .run(&stack, &Region::covering(&stack))
        .unwrap();

    assert_eq!(image.stack.mask(), stack.mask());
    for band in image.stack.bands() {
        assert!(band.data[[0, 0]].is_nan());
        assert!(band.data[[7, 9]].is_nan());
        assert!(band.data[[15, 15]].is_nan());
        assert!(!band.data[[3, 3]].is_nan());
    }
}

#[test]
fn test_eigenvalues_idempotent_across_runs() {
    let stack = synthetic_stack(24, 24);
    let region = Region::covering(&stack);
    let first = PcaPipeline::new().run(&stack, &region).unwrap();
    let second = PcaPipeline::new().run(&stack, &region).unwrap();

    for (a, b) in first.eigenvalues.iter().zip(&second.eigenvalues) {
        assert_relative_eq!(*a, *b, max_relative = 1e-9);
    }
}

#[test]
fn test_projected_variance_reproduces_eigenvalue() {
    let stack = synthetic_stack(32, 32);
    let region = Region::covering(&stack);

    let stats = compute_band_statistics(&stack, &region).unwrap();
    let eigen = decompose(&stats.covariance).unwrap();

    // Before SD-normalization (unit divisors): component variance over the
    // same region reproduces the eigenvalue.
    let unit_sds = vec![1.0; eigen.eigenvalues.len()];
    let raw = project(&stack, &stats.means, &eigen.eigenvectors, &unit_sds).unwrap();
    for (k, &ev) in eigen.eigenvalues.iter().enumerate() {
        let var = band_variance(&raw.bands()[k].data);
        assert_relative_eq!(var, ev, max_relative = 1e-3);
    }

    // After SD-normalization every component has unit variance.
    let image = PcaPipeline::new().run(&stack, &region).unwrap();
    for band in image.stack.bands() {
        let var = band_variance(&band.data);
        assert_relative_eq!(var, 1.0, max_relative = 1e-3);
    }
}

#[test]
fn test_collinear_bands_fail_by_default() {
    let rows = 16;
    let cols = 16;
    let b1: Array2<f32> = Array::from_shape_fn((rows, cols), |(r, c)| (r * cols + c) as f32);
    let b2 = b1.mapv(|v| 2.0 * v);
    let stack = RasterStack::new(
        vec![RasterBand::new("b1", b1), RasterBand::new("b2", b2)],
        PixelMask::from_elem((rows, cols), true),
        GeoTransform::north_up(0.0, rows as f64, 1.0, 1.0),
        CoordinateSystem::Geographic,
        StackMetadata::default(),
    )
    .unwrap();

    let result = PcaPipeline::new().run(&stack, &Region::covering(&stack));
    match result {
        Err(PcaError::DegenerateComponent { component, .. }) => assert_eq!(component, 2),
        other => panic!("expected DegenerateComponent, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_collinear_bands_finite_under_floor_policy() {
    let rows = 16;
    let cols = 16;
    let b1: Array2<f32> = Array::from_shape_fn((rows, cols), |(r, c)| (r * cols + c) as f32);
    let b2 = b1.mapv(|v| 2.0 * v);
    let stack = RasterStack::new(
        vec![RasterBand::new("b1", b1), RasterBand::new("b2", b2)],
        PixelMask::from_elem((rows, cols), true),
        GeoTransform::north_up(0.0, rows as f64, 1.0, 1.0),
        CoordinateSystem::Geographic,
        StackMetadata::default(),
    )
    .unwrap();

    let params = PcaParams {
        projection: ProjectionParams {
            degenerate: DegeneratePolicy::Floor { min_sd: 1e-3 },
            epsilon: 1e-12,
        },
    };
    let image = PcaPipeline::with_params(params)
        .run(&stack, &Region::covering(&stack))
        .unwrap();

    // No infinities or NaN leak into valid pixels
    for band in image.stack.bands() {
        for &v in band.data.iter() {
            assert!(v.is_finite(), "non-finite component value {}", v);
        }
    }
}

#[test]
fn test_fully_masked_region_fails() {
    let base = synthetic_stack(8, 8);
    let stack = RasterStack::new(
        base.bands().to_vec(),
        PixelMask::from_elem((8, 8), false),
        base.geo_transform().clone(),
        base.coordinate_system().clone(),
        base.metadata().clone(),
    )
    .unwrap();

    let result = PcaPipeline::new().run(&stack, &Region::covering(&stack));
    assert!(matches!(result, Err(PcaError::InsufficientData(_))));
}

#[test]
fn test_select_components_returns_leading_prefix() {
    let stack = synthetic_stack(16, 16);
    let image = PcaPipeline::new()
        .run(&stack, &Region::covering(&stack))
        .unwrap();

    let selected = image.select_components(2);
    assert_eq!(selected.len(), 2);
    assert_eq!(selected[0].name, "pc1");
    assert_eq!(selected[1].name, "pc2");
}
