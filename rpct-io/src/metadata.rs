//! RPC metadata domain of GDAL datasets

use std::collections::HashMap;

use gdal::{Dataset, Metadata};
use rpct_core::RpcCoefficients;

use crate::error::{IoError, Result};

/// `KEY=VALUE` items of the RPC metadata domain, if present
pub fn rpc_metadata(dataset: &Dataset) -> Option<HashMap<String, String>> {
    let items = dataset.metadata_domain("RPC")?;

    let metadata: HashMap<String, String> = items
        .iter()
        .filter_map(|item| item.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect();

    (!metadata.is_empty()).then_some(metadata)
}

/// Extract RPC from GDAL dataset
pub fn extract_rpc(dataset: &Dataset) -> Result<RpcCoefficients> {
    let metadata = rpc_metadata(dataset)
        .ok_or_else(|| IoError::MissingRpc(dataset.description().unwrap_or_default()))?;

    Ok(RpcCoefficients::from_metadata(&metadata)?)
}

/// Write coefficients into the RPC metadata domain
pub fn write_rpc(dataset: &mut Dataset, coeffs: &RpcCoefficients) -> Result<()> {
    for (key, value) in coeffs.to_metadata() {
        dataset.set_metadata_item(&key, &value, "RPC")?;
    }
    Ok(())
}
