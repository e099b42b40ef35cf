//! GDAL collaborators of the RPC transformer: DEM rasters, CRS
//! transformations and RPC metadata.

pub mod dem;
pub mod error;
pub mod image;
pub mod metadata;

use std::sync::Arc;

pub use dem::{GdalCoordTransform, GdalDem, GdalDemOpener};
pub use error::{IoError, Result};
pub use image::RpcImage;
pub use metadata::{extract_rpc, rpc_metadata};

use rpct_core::{RpcCoefficients, RpcTransformer, TransformerOptions};

/// Create a transformer whose DEM, if any, is opened with GDAL
pub fn create_rpc_transformer(
    coeffs: RpcCoefficients,
    reversed: bool,
    options: &TransformerOptions,
) -> Result<RpcTransformer> {
    Ok(RpcTransformer::new(
        coeffs,
        reversed,
        options,
        Some(Arc::new(GdalDemOpener)),
    )?)
}

/// Rebuild a serialized transformer, reopening its DEM with GDAL
pub fn deserialize_rpc_transformer(xml: &str) -> Result<RpcTransformer> {
    Ok(RpcTransformer::from_xml(xml, Some(Arc::new(GdalDemOpener)))?)
}
