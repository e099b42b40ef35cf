pub mod coordinate;
pub mod elevation;
pub mod error;
pub mod options;
pub mod sensor;
pub mod transformer;

pub use coordinate::{GeoTransform, ImageCoord, LlaCoord};
pub use elevation::{
    CoordinateTransform, DemHandle, DemOpener, DemRequest, DemResampling, DemSample,
    ElevationRaster, ElevationSource, MemoryRaster,
};
pub use error::{ConstructionError, ElevationError, ProjectionError, Result, RpctError};
pub use options::{DebugSettings, TransformerOptions};
pub use sensor::{RpcCoefficients, RpcModel};
pub use transformer::{Footprint, InverseSolution, RpcTransformer, TransformOutcome};
