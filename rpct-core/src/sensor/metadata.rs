//! Conversion between [`RpcCoefficients`] and the RPC metadata domain
//! (`LINE_OFF=...`, `LINE_NUM_COEFF=c1 c2 ... c20`, ...).

use std::collections::HashMap;

use super::rpc::RpcCoefficients;
use crate::error::{ConstructionError, Result, RpctError};

const COEFF_KEYS: [&str; 4] = [
    "LINE_NUM_COEFF",
    "LINE_DEN_COEFF",
    "SAMP_NUM_COEFF",
    "SAMP_DEN_COEFF",
];

impl RpcCoefficients {
    /// Build coefficients from RPC metadata key/value pairs
    pub fn from_metadata(metadata: &HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            line_num_coeff: parse_coeff_array(metadata, "LINE_NUM_COEFF")?,
            line_den_coeff: parse_coeff_array(metadata, "LINE_DEN_COEFF")?,
            samp_num_coeff: parse_coeff_array(metadata, "SAMP_NUM_COEFF")?,
            samp_den_coeff: parse_coeff_array(metadata, "SAMP_DEN_COEFF")?,

            lat_off: parse_single(metadata, "LAT_OFF")?,
            lat_scale: parse_single(metadata, "LAT_SCALE")?,
            lon_off: parse_single(metadata, "LONG_OFF")?,
            lon_scale: parse_single(metadata, "LONG_SCALE")?,
            height_off: parse_single(metadata, "HEIGHT_OFF")?,
            height_scale: parse_single(metadata, "HEIGHT_SCALE")?,
            line_off: parse_single(metadata, "LINE_OFF")?,
            line_scale: parse_single(metadata, "LINE_SCALE")?,
            samp_off: parse_single(metadata, "SAMP_OFF")?,
            samp_scale: parse_single(metadata, "SAMP_SCALE")?,

            err_bias: parse_optional(metadata, "ERR_BIAS")?,
            err_rand: parse_optional(metadata, "ERR_RAND")?,

            min_lon: parse_optional(metadata, "MIN_LONG")?.unwrap_or(-180.0),
            min_lat: parse_optional(metadata, "MIN_LAT")?.unwrap_or(-90.0),
            max_lon: parse_optional(metadata, "MAX_LONG")?.unwrap_or(180.0),
            max_lat: parse_optional(metadata, "MAX_LAT")?.unwrap_or(90.0),
        })
    }

    /// Render coefficients as RPC metadata key/value pairs
    pub fn to_metadata(&self) -> Vec<(String, String)> {
        let mut md = Vec::with_capacity(21);

        if let Some(bias) = self.err_bias {
            md.push(("ERR_BIAS".to_string(), bias.to_string()));
        }
        if let Some(rand) = self.err_rand {
            md.push(("ERR_RAND".to_string(), rand.to_string()));
        }

        let scalars = [
            ("LINE_OFF", self.line_off),
            ("SAMP_OFF", self.samp_off),
            ("LAT_OFF", self.lat_off),
            ("LONG_OFF", self.lon_off),
            ("HEIGHT_OFF", self.height_off),
            ("LINE_SCALE", self.line_scale),
            ("SAMP_SCALE", self.samp_scale),
            ("LAT_SCALE", self.lat_scale),
            ("LONG_SCALE", self.lon_scale),
            ("HEIGHT_SCALE", self.height_scale),
            ("MIN_LONG", self.min_lon),
            ("MIN_LAT", self.min_lat),
            ("MAX_LONG", self.max_lon),
            ("MAX_LAT", self.max_lat),
        ];
        for (key, value) in scalars {
            md.push((key.to_string(), value.to_string()));
        }

        let arrays = [
            &self.line_num_coeff,
            &self.line_den_coeff,
            &self.samp_num_coeff,
            &self.samp_den_coeff,
        ];
        for (key, coeffs) in COEFF_KEYS.iter().zip(arrays) {
            let joined = coeffs
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            md.push((key.to_string(), joined));
        }

        md
    }
}

fn lookup<'a>(metadata: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    metadata
        .get(key)
        .or_else(|| {
            metadata
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
        .map(|v| v.trim())
}

fn parse_value(key: &str, value: &str) -> Result<f64> {
    value
        .parse()
        .map_err(|_| RpctError::InvalidInput(format!("Failed to parse RPC parameter: {}", key)))
}

fn parse_coeff_array(metadata: &HashMap<String, String>, key: &str) -> Result<[f64; 20]> {
    let value =
        lookup(metadata, key).ok_or_else(|| ConstructionError::MissingCoefficient(key.to_string()))?;

    let values = value
        .split_whitespace()
        .map(|token| parse_value(key, token))
        .collect::<Result<Vec<f64>>>()?;

    let mut coeffs = [0.0; 20];
    if values.len() != coeffs.len() {
        return Err(RpctError::InvalidInput(format!(
            "Expected 20 values for {}, got {}",
            key,
            values.len()
        )));
    }
    coeffs.copy_from_slice(&values);

    Ok(coeffs)
}

fn parse_single(metadata: &HashMap<String, String>, key: &str) -> Result<f64> {
    let value =
        lookup(metadata, key).ok_or_else(|| ConstructionError::MissingCoefficient(key.to_string()))?;
    parse_value(key, value)
}

fn parse_optional(metadata: &HashMap<String, String>, key: &str) -> Result<Option<f64>> {
    lookup(metadata, key)
        .map(|value| parse_value(key, value))
        .transpose()
}
