use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Real-valued raster sample data
pub type RasterReal = f32;

/// 2D raster data array (row x col)
pub type RasterGrid = Array2<RasterReal>;

/// Per-pixel validity mask (row x col), true = valid
pub type PixelMask = Array2<bool>;

/// Coordinate system enumeration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CoordinateSystem {
    /// Geographic coordinates (latitude, longitude)
    Geographic,
    /// Projected coordinates (e.g., UTM)
    Projected { epsg: u32 },
}

/// Geospatial bounding box
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

/// Geospatial transformation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with the given origin and pixel size.
    /// `pixel_height` is stored negative (rows increase southward).
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            top_left_x,
            pixel_width,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_height.abs(),
        }
    }

    /// True when the transform carries no rotation terms
    pub fn is_north_up(&self) -> bool {
        self.rotation_x == 0.0 && self.rotation_y == 0.0
    }

    /// Map a map-space coordinate to fractional (row, col)
    pub fn map_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let col = (x - self.top_left_x) / self.pixel_width;
        let row = (y - self.top_left_y) / self.pixel_height;
        (row, col)
    }
}

/// Descriptive metadata carried alongside a raster stack
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackMetadata {
    /// Identifier of the source product or composite
    pub source_id: String,
    /// Acquisition or compositing timestamp, if known
    pub acquired: Option<DateTime<Utc>>,
    /// Free-form key/value properties
    pub properties: HashMap<String, String>,
}

/// A single named raster band
#[derive(Debug, Clone)]
pub struct RasterBand {
    pub name: String,
    pub data: RasterGrid,
}

impl RasterBand {
    pub fn new(name: impl Into<String>, data: RasterGrid) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Ordered stack of co-registered raster bands sharing one pixel grid,
/// one validity mask, and one spatial reference.
///
/// Per-band nodata is expressed as non-finite samples; a pixel is valid
/// for a band iff the shared mask is set and the band's sample is finite.
#[derive(Debug, Clone)]
pub struct RasterStack {
    bands: Vec<RasterBand>,
    mask: PixelMask,
    geo_transform: GeoTransform,
    coordinate_system: CoordinateSystem,
    metadata: StackMetadata,
}

impl RasterStack {
    /// Assemble a stack from co-registered bands.
    ///
    /// Fails with [`PcaError::InvalidStack`] when no bands are given, when
    /// band shapes disagree with the mask, or when the geotransform is
    /// rotated (only north-up rasters are supported).
    pub fn new(
        bands: Vec<RasterBand>,
        mask: PixelMask,
        geo_transform: GeoTransform,
        coordinate_system: CoordinateSystem,
        metadata: StackMetadata,
    ) -> PcaResult<Self> {
        if bands.is_empty() {
            return Err(PcaError::InvalidStack(
                "raster stack requires at least one band".to_string(),
            ));
        }
        let shape = mask.dim();
        for band in &bands {
            if band.data.dim() != shape {
                return Err(PcaError::InvalidStack(format!(
                    "band '{}' has shape {:?}, expected {:?}",
                    band.name,
                    band.data.dim(),
                    shape
                )));
            }
        }
        if !geo_transform.is_north_up() {
            return Err(PcaError::InvalidStack(
                "rotated geotransforms are not supported".to_string(),
            ));
        }
        Ok(Self {
            bands,
            mask,
            geo_transform,
            coordinate_system,
            metadata,
        })
    }

    /// Number of bands P
    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// (rows, cols) of the shared pixel grid
    pub fn shape(&self) -> (usize, usize) {
        self.mask.dim()
    }

    pub fn bands(&self) -> &[RasterBand] {
        &self.bands
    }

    pub fn mask(&self) -> &PixelMask {
        &self.mask
    }

    pub fn geo_transform(&self) -> &GeoTransform {
        &self.geo_transform
    }

    pub fn coordinate_system(&self) -> &CoordinateSystem {
        &self.coordinate_system
    }

    pub fn metadata(&self) -> &StackMetadata {
        &self.metadata
    }

    /// Map-space bounding box of the full pixel grid
    pub fn extent(&self) -> BoundingBox {
        let (rows, cols) = self.shape();
        let gt = &self.geo_transform;
        let x0 = gt.top_left_x;
        let x1 = gt.top_left_x + cols as f64 * gt.pixel_width;
        let y0 = gt.top_left_y;
        let y1 = gt.top_left_y + rows as f64 * gt.pixel_height;
        BoundingBox {
            min_x: x0.min(x1),
            max_x: x0.max(x1),
            min_y: y0.min(y1),
            max_y: y0.max(y1),
        }
    }

    /// Whether the pixel at (row, col) is valid in the given band
    pub fn is_valid(&self, band: usize, row: usize, col: usize) -> bool {
        self.mask[[row, col]] && self.bands[band].data[[row, col]].is_finite()
    }
}

/// Spatial extent plus sampling resolution bounding a statistics computation
#[derive(Debug, Clone)]
pub struct Region {
    /// Extent in the stack's coordinate system
    pub bounds: BoundingBox,
    /// Target sample resolution in CRS units (must be > 0)
    pub scale: f64,
    /// Maximum number of pixels considered for statistics
    pub max_pixels: usize,
}

impl Region {
    pub fn new(bounds: BoundingBox, scale: f64, max_pixels: usize) -> Self {
        Self {
            bounds,
            scale,
            max_pixels,
        }
    }

    /// Region covering the full extent of a stack at its native resolution
    pub fn covering(stack: &RasterStack) -> Self {
        Self {
            bounds: stack.extent(),
            scale: stack.geo_transform().pixel_width.abs(),
            max_pixels: usize::MAX,
        }
    }
}

/// Error types for principal component processing
#[derive(Debug, thiserror::Error)]
pub enum PcaError {
    #[error("Invalid raster stack: {0}")]
    InvalidStack(String),

    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid covariance matrix: {0}")]
    InvalidMatrix(String),

    #[error("Eigen decomposition did not converge: {0}")]
    NumericalConvergence(String),

    #[error("Degenerate component {component}: eigenvalue {eigenvalue:e} too close to zero")]
    DegenerateComponent { component: usize, eigenvalue: f64 },
}

/// Result type for principal component operations
pub type PcaResult<T> = Result<T, PcaError>;
