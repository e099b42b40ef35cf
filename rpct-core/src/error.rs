use thiserror::Error;

/// Common errors across the RPC transformer
#[derive(Error, Debug)]
pub enum RpctError {
    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("Elevation error: {0}")]
    Elevation(#[from] ElevationError),

    #[error("Construction error: {0}")]
    Construction(#[from] ConstructionError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failure of a single point within a transform call.
///
/// Sibling points of the same batch are unaffected by these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("No usable elevation at ({lon}, {lat})")]
    ElevationUnavailable { lon: f64, lat: f64 },

    #[error("Elevation lost at iteration {iteration} of the inverse solution")]
    ConvergenceElevationLost { iteration: usize },

    #[error("Projection did not converge after {iterations} iterations (pixel error {pixel_error})")]
    ConvergenceFailed { iterations: usize, pixel_error: f64 },

    #[error("Point ({lon}, {lat}) is outside the RPC footprint")]
    FootprintViolation { lon: f64, lat: f64 },

    #[error("Heights are required for image to ground transformation")]
    MissingHeights,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ElevationError {
    #[error("No elevation at DEM (pixel, line) = ({dem_pixel}, {dem_line})")]
    Unavailable { dem_pixel: f64, dem_line: f64 },

    #[error("DEM read failed: {0}")]
    Read(String),

    #[error("DEM coordinate transform failed: {0}")]
    CoordinateTransform(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstructionError {
    #[error("Cannot open DEM: {0}")]
    DemOpen(String),

    #[error("DEM geotransform is not invertible")]
    InvalidDemGeoTransform,

    #[error("Cannot invert geotransform")]
    SingularSeed,

    #[error("Invalid value for {key}: {value}")]
    InvalidOption { key: String, value: String },

    #[error("Missing RPC parameter: {0}")]
    MissingCoefficient(String),
}

pub type Result<T> = std::result::Result<T, RpctError>;
