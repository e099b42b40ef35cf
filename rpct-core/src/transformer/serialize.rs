//! `<RPCTransformer>` XML form of a transformer: options plus the RPC
//! coefficients as `<MDI key="...">` metadata items.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::RpcTransformer;
use crate::elevation::DemOpener;
use crate::error::{Result, RpctError};
use crate::options::{
    TransformerOptions, RPC_DEM, RPC_DEMINTERPOLATION, RPC_DEM_APPLY_VDATUM_SHIFT,
    RPC_DEM_MISSING_VALUE, RPC_DEM_SRS, RPC_FOOTPRINT, RPC_HEIGHT, RPC_HEIGHT_SCALE,
    RPC_MAX_ITERATIONS, RPC_PIXEL_ERROR_THRESHOLD,
};
use crate::sensor::RpcCoefficients;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "RPCTransformer")]
struct TransformerXml {
    #[serde(rename = "Reversed")]
    reversed: u8,

    #[serde(rename = "HeightOffset")]
    height_offset: f64,

    #[serde(rename = "HeightScale", default, skip_serializing_if = "Option::is_none")]
    height_scale: Option<f64>,

    #[serde(rename = "DEMPath", default, skip_serializing_if = "Option::is_none")]
    dem_path: Option<String>,

    #[serde(rename = "DEMInterpolation", default, skip_serializing_if = "Option::is_none")]
    dem_interpolation: Option<String>,

    #[serde(rename = "DEMMissingValue", default, skip_serializing_if = "Option::is_none")]
    dem_missing_value: Option<f64>,

    #[serde(rename = "DEMApplyVDatumShift", default, skip_serializing_if = "Option::is_none")]
    dem_apply_vdatum_shift: Option<bool>,

    #[serde(rename = "DEMSRS", default, skip_serializing_if = "Option::is_none")]
    dem_srs: Option<String>,

    #[serde(rename = "PixErrThreshold")]
    pixel_error_threshold: f64,

    #[serde(rename = "MaxIterations", default)]
    max_iterations: usize,

    #[serde(rename = "Footprint", default, skip_serializing_if = "Option::is_none")]
    footprint: Option<String>,

    #[serde(rename = "Metadata")]
    metadata: MetadataXml,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MetadataXml {
    #[serde(rename = "MDI", default)]
    items: Vec<MetadataItem>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MetadataItem {
    #[serde(rename = "@key")]
    key: String,
    #[serde(rename = "$text", default)]
    value: String,
}

impl TransformerXml {
    fn from_transformer(transformer: &RpcTransformer) -> Self {
        let options = &transformer.options;

        Self {
            reversed: u8::from(transformer.reversed),
            height_offset: options.height_offset,
            height_scale: (options.height_scale != 1.0).then_some(options.height_scale),
            dem_path: options.dem_path.clone(),
            dem_interpolation: options
                .dem_path
                .as_ref()
                .map(|_| options.dem_resampling.to_string()),
            dem_missing_value: options.dem_path.as_ref().and(options.dem_missing_value),
            dem_apply_vdatum_shift: options
                .dem_path
                .as_ref()
                .map(|_| options.apply_vdatum_shift),
            dem_srs: options.dem_path.as_ref().and(options.dem_srs.clone()),
            pixel_error_threshold: options.pixel_error_threshold,
            max_iterations: options.max_iterations,
            footprint: options.footprint.clone(),
            metadata: MetadataXml {
                items: transformer
                    .model
                    .coefficients()
                    .to_metadata()
                    .into_iter()
                    .map(|(key, value)| MetadataItem { key, value })
                    .collect(),
            },
        }
    }

    /// Option pairs in the form [`TransformerOptions::from_pairs`] accepts
    fn option_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            (RPC_HEIGHT, self.height_offset.to_string()),
            (
                RPC_HEIGHT_SCALE,
                self.height_scale.unwrap_or(1.0).to_string(),
            ),
            (RPC_PIXEL_ERROR_THRESHOLD, self.pixel_error_threshold.to_string()),
            (RPC_MAX_ITERATIONS, self.max_iterations.to_string()),
        ];

        if let Some(path) = &self.dem_path {
            pairs.push((RPC_DEM, path.clone()));
        }
        if let Some(interpolation) = &self.dem_interpolation {
            pairs.push((RPC_DEMINTERPOLATION, interpolation.clone()));
        }
        if let Some(missing) = self.dem_missing_value {
            pairs.push((RPC_DEM_MISSING_VALUE, missing.to_string()));
        }
        if let Some(shift) = self.dem_apply_vdatum_shift {
            pairs.push((
                RPC_DEM_APPLY_VDATUM_SHIFT,
                if shift { "YES" } else { "NO" }.to_string(),
            ));
        }
        if let Some(srs) = &self.dem_srs {
            pairs.push((RPC_DEM_SRS, srs.clone()));
        }
        if let Some(footprint) = &self.footprint {
            pairs.push((RPC_FOOTPRINT, footprint.clone()));
        }

        pairs
    }
}

impl RpcTransformer {
    /// Serialize the transformer as an `<RPCTransformer>` XML tree
    pub fn to_xml(&self) -> Result<String> {
        quick_xml::se::to_string(&TransformerXml::from_transformer(self))
            .map_err(|e| RpctError::Serialization(e.to_string()))
    }

    /// Rebuild a transformer from [`RpcTransformer::to_xml`] output.
    ///
    /// Goes through [`RpcTransformer::new`], so a DEM named in the XML is
    /// reopened with `opener`.
    pub fn from_xml(xml: &str, opener: Option<Arc<dyn DemOpener>>) -> Result<Self> {
        let tree: TransformerXml =
            quick_xml::de::from_str(xml).map_err(|e| RpctError::Serialization(e.to_string()))?;

        let metadata: HashMap<String, String> = tree
            .metadata
            .items
            .iter()
            .map(|item| (item.key.clone(), item.value.clone()))
            .collect();
        let coeffs = RpcCoefficients::from_metadata(&metadata)?;
        let options = TransformerOptions::from_pairs(tree.option_pairs())?;

        RpcTransformer::new(coeffs, tree.reversed != 0, &options, opener)
    }
}
