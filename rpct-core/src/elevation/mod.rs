//! Elevation lookup from a Digital Elevation Model.
//!
//! The DEM itself and the coordinate transformation into its CRS are
//! collaborators behind [`ElevationRaster`] and [`CoordinateTransform`], so the
//! same [`ElevationSource`] runs over GDAL datasets or in-memory grids.

mod cache;
mod memory;
pub(crate) mod resample;
mod source;

pub use cache::{block_key, BlockCache, CACHE_BLOCK_SIZE, DEFAULT_CACHE_CAPACITY};
pub use memory::MemoryRaster;
pub use resample::cubic_spline_kernel;
pub use source::{DemSample, ElevationSource};

use std::fmt;
use std::str::FromStr;

use crate::coordinate::GeoTransform;
use crate::error::{ConstructionError, ElevationError};

/// Read access to a single-band elevation raster
pub trait ElevationRaster {
    /// Raster dimensions (width, height) in pixels
    fn raster_size(&self) -> (usize, usize);

    /// Pixel/line to georeferenced coordinates
    fn geo_transform(&self) -> GeoTransform;

    fn no_data_value(&self) -> Option<f64>;

    /// Read a window as row-major `f64` values (`width * height` of them)
    fn read_window(
        &self,
        x_off: usize,
        y_off: usize,
        width: usize,
        height: usize,
    ) -> Result<Vec<f64>, ElevationError>;
}

/// Transformation from WGS84 long/lat/height into the DEM CRS.
///
/// `zs` receives the vertical shift of the target datum when the transform
/// carries one.
pub trait CoordinateTransform {
    fn transform(
        &self,
        xs: &mut [f64],
        ys: &mut [f64],
        zs: &mut [f64],
    ) -> Result<(), ElevationError>;
}

/// An opened DEM and, if its CRS is not WGS84, the transform into it
pub struct DemHandle {
    pub raster: Box<dyn ElevationRaster>,
    pub to_dem: Option<Box<dyn CoordinateTransform>>,
}

impl DemHandle {
    pub fn new(raster: impl ElevationRaster + 'static) -> Self {
        Self {
            raster: Box::new(raster),
            to_dem: None,
        }
    }

    pub fn with_transform(mut self, to_dem: impl CoordinateTransform + 'static) -> Self {
        self.to_dem = Some(Box::new(to_dem));
        self
    }
}

/// What the transformer asks of a [`DemOpener`]
#[derive(Debug, Clone, Copy)]
pub struct DemRequest<'a> {
    pub path: &'a str,
    /// Overrides the CRS reported by the dataset
    pub srs_override: Option<&'a str>,
    pub apply_vdatum_shift: bool,
    /// Representative long/lat of the scene, used to detect no-op transforms
    pub reference: (f64, f64),
}

/// Opens DEM datasets by path
pub trait DemOpener {
    fn open(&self, request: &DemRequest<'_>) -> Result<DemHandle, ConstructionError>;
}

impl<F> DemOpener for F
where
    F: Fn(&DemRequest<'_>) -> Result<DemHandle, ConstructionError>,
{
    fn open(&self, request: &DemRequest<'_>) -> Result<DemHandle, ConstructionError> {
        self(request)
    }
}

/// DEM resampling algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DemResampling {
    /// Single input pixel
    Nearest,
    /// 2x2 kernel
    #[default]
    Bilinear,
    /// 4x4 cubic B-spline kernel
    Cubic,
}

impl DemResampling {
    pub fn name(&self) -> &'static str {
        match self {
            DemResampling::Nearest => "near",
            DemResampling::Bilinear => "bilinear",
            DemResampling::Cubic => "cubic",
        }
    }

    /// Extra columns beyond the sampled span needed by the kernel
    pub(crate) fn extra_columns(&self) -> usize {
        match self {
            DemResampling::Nearest => 0,
            DemResampling::Bilinear => 1,
            DemResampling::Cubic => 3,
        }
    }

    /// Rows the kernel reads
    pub(crate) fn kernel_rows(&self) -> usize {
        match self {
            DemResampling::Nearest => 1,
            DemResampling::Bilinear => 2,
            DemResampling::Cubic => 4,
        }
    }
}

impl FromStr for DemResampling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("near") {
            Ok(DemResampling::Nearest)
        } else if s.eq_ignore_ascii_case("bilinear") {
            Ok(DemResampling::Bilinear)
        } else if s.eq_ignore_ascii_case("cubic") {
            Ok(DemResampling::Cubic)
        } else {
            Err(format!("Unknown interpolation {}", s))
        }
    }
}

impl fmt::Display for DemResampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Empirical check that a transform to the DEM CRS leaves long/lat untouched
/// (e.g. a DEM in NAD83).
///
/// Checks the four near-world corners, the origin and `reference`.
pub fn is_noop_transform(transform: &dyn CoordinateTransform, reference: (f64, f64)) -> bool {
    let mut xs = [-179.0, 179.0, 179.0, -179.0, 0.0, reference.0];
    let mut ys = [89.0, 89.0, -89.0, -89.0, 0.0, reference.1];
    let mut zs = [0.0; 6];
    let expected_x = xs;
    let expected_y = ys;

    if transform.transform(&mut xs, &mut ys, &mut zs).is_err() {
        return false;
    }

    xs.iter()
        .zip(expected_x.iter())
        .chain(ys.iter().zip(expected_y.iter()))
        .all(|(got, want)| (got - want).abs() < 1.0e-12)
}
