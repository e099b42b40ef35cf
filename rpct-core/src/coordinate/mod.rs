//! Coordinate types and affine geotransforms

mod geotransform;

pub use geotransform::GeoTransform;

/// Geodetic coordinates (WGS84 longitude/latitude in degrees, height in meters)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LlaCoord {
    pub lon: f64,
    pub lat: f64,
    pub alt: f64,
}

/// Image coordinates, top-left corner of the top-left pixel at (0, 0)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageCoord {
    pub pixel: f64,
    pub line: f64,
}
