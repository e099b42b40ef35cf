use std::path::Path;
use std::sync::Arc;

use gdal::Dataset;
use rpct_core::{RpcCoefficients, RpcTransformer, TransformerOptions};

use crate::dem::GdalDemOpener;
use crate::error::{IoError, Result};
use crate::metadata::extract_rpc;

/// Image with an RPC sensor model
pub struct RpcImage {
    dataset: Dataset,
    width: usize,
    height: usize,
    rpc: RpcCoefficients,
}

impl RpcImage {
    /// Open an image and read its RPC metadata
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let dataset = Dataset::open(path.as_ref())?;
        Self::from_dataset(dataset).map_err(|e| match e {
            IoError::MissingRpc(_) => IoError::MissingRpc(path.as_ref().display().to_string()),
            other => other,
        })
    }

    pub fn from_dataset(dataset: Dataset) -> Result<Self> {
        let (width, height) = dataset.raster_size();
        let rpc = extract_rpc(&dataset)?;

        Ok(Self {
            dataset,
            width,
            height,
            rpc,
        })
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Image dimensions (width, height)
    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn rpc(&self) -> &RpcCoefficients {
        &self.rpc
    }

    /// Pixel/line to long/lat transformer for this image, DEMs opened
    /// through GDAL
    pub fn transformer(&self, options: &TransformerOptions) -> Result<RpcTransformer> {
        Ok(RpcTransformer::new(
            self.rpc.clone(),
            false,
            options,
            Some(Arc::new(GdalDemOpener)),
        )?)
    }
}
