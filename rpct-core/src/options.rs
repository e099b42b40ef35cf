//! Transformer options, parsed from `KEY=VALUE` style pairs.

use std::env;
use std::path::PathBuf;

use crate::elevation::DemResampling;
use crate::error::ConstructionError;

pub const DEFAULT_PIXEL_ERROR_THRESHOLD: f64 = 0.1;

pub const RPC_HEIGHT: &str = "RPC_HEIGHT";
pub const RPC_HEIGHT_SCALE: &str = "RPC_HEIGHT_SCALE";
pub const RPC_DEM: &str = "RPC_DEM";
pub const RPC_DEMINTERPOLATION: &str = "RPC_DEMINTERPOLATION";
pub const RPC_DEM_MISSING_VALUE: &str = "RPC_DEM_MISSING_VALUE";
pub const RPC_DEM_SRS: &str = "RPC_DEM_SRS";
pub const RPC_DEM_APPLY_VDATUM_SHIFT: &str = "RPC_DEM_APPLY_VDATUM_SHIFT";
pub const RPC_PIXEL_ERROR_THRESHOLD: &str = "RPC_PIXEL_ERROR_THRESHOLD";
pub const RPC_MAX_ITERATIONS: &str = "RPC_MAX_ITERATIONS";
pub const RPC_FOOTPRINT: &str = "RPC_FOOTPRINT";

pub const RPC_INVERSE_VERBOSE: &str = "RPC_INVERSE_VERBOSE";
pub const RPC_INVERSE_LOG: &str = "RPC_INVERSE_LOG";
pub const RPC_DEM_OPTIM: &str = "RPC_DEM_OPTIM";

/// Debugging and tuning switches, normally taken from the environment
#[derive(Debug, Clone, PartialEq)]
pub struct DebugSettings {
    /// Trace every inverse iteration at debug level
    pub inverse_verbose: bool,
    /// CSV file rewritten with the iterations of each inverse solution
    pub inverse_log: Option<PathBuf>,
    /// Allow the whole-line DEM fast path
    pub dem_optim: bool,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            inverse_verbose: false,
            inverse_log: None,
            dem_optim: true,
        }
    }
}

impl DebugSettings {
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(value) = env::var(RPC_INVERSE_VERBOSE) {
            settings.inverse_verbose = parse_bool(&value);
        }
        if let Some(path) = env::var_os(RPC_INVERSE_LOG) {
            settings.inverse_log = Some(PathBuf::from(path));
        }
        if let Ok(value) = env::var(RPC_DEM_OPTIM) {
            settings.dem_optim = parse_bool(&value);
        }
        settings
    }
}

/// Resolved transformer configuration
#[derive(Debug, Clone, PartialEq)]
pub struct TransformerOptions {
    /// Added to every height (`RPC_HEIGHT`)
    pub height_offset: f64,
    /// Applied to DEM values (`RPC_HEIGHT_SCALE`)
    pub height_scale: f64,
    pub dem_path: Option<String>,
    pub dem_resampling: DemResampling,
    /// Used where the DEM has nodata or no coverage
    pub dem_missing_value: Option<f64>,
    /// Overrides the DEM's own CRS
    pub dem_srs: Option<String>,
    pub apply_vdatum_shift: bool,
    /// Convergence criterion of the inverse solution, in pixels
    pub pixel_error_threshold: f64,
    /// Iteration cap of the inverse solution, 0 for automatic
    pub max_iterations: usize,
    /// WKT or GeoJSON validity polygon in long/lat
    pub footprint: Option<String>,
    pub debug: DebugSettings,
}

impl Default for TransformerOptions {
    fn default() -> Self {
        Self {
            height_offset: 0.0,
            height_scale: 1.0,
            dem_path: None,
            dem_resampling: DemResampling::default(),
            dem_missing_value: None,
            dem_srs: None,
            apply_vdatum_shift: true,
            pixel_error_threshold: DEFAULT_PIXEL_ERROR_THRESHOLD,
            max_iterations: 0,
            footprint: None,
            debug: DebugSettings::default(),
        }
    }
}

impl TransformerOptions {
    /// Parse options from key/value pairs, keys are case-insensitive.
    ///
    /// Debug settings start from the environment and are overridden by
    /// matching keys.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ConstructionError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = Self {
            debug: DebugSettings::from_env(),
            ..Self::default()
        };

        for (key, value) in pairs {
            let key = key.as_ref().trim().to_ascii_uppercase();
            let value = value.as_ref().trim();

            match key.as_str() {
                RPC_HEIGHT => options.height_offset = parse_f64(&key, value)?,
                RPC_HEIGHT_SCALE => options.height_scale = parse_f64(&key, value)?,
                RPC_DEM => options.dem_path = Some(value.to_string()),
                RPC_DEMINTERPOLATION => {
                    options.dem_resampling = value.parse().unwrap_or_else(|_| {
                        log::debug!("Unknown interpolation {}. Defaulting to bilinear", value);
                        DemResampling::Bilinear
                    })
                }
                RPC_DEM_MISSING_VALUE => options.dem_missing_value = Some(parse_f64(&key, value)?),
                RPC_DEM_SRS => options.dem_srs = Some(value.to_string()),
                RPC_DEM_APPLY_VDATUM_SHIFT => options.apply_vdatum_shift = parse_bool(value),
                RPC_PIXEL_ERROR_THRESHOLD => {
                    let threshold = parse_f64(&key, value)?;
                    // Also rejects NaN
                    if !(threshold > 0.0) {
                        return Err(invalid(&key, value));
                    }
                    options.pixel_error_threshold = threshold;
                }
                RPC_MAX_ITERATIONS => {
                    options.max_iterations = value.parse().map_err(|_| invalid(&key, value))?
                }
                RPC_FOOTPRINT => options.footprint = Some(value.to_string()),
                RPC_INVERSE_VERBOSE => options.debug.inverse_verbose = parse_bool(value),
                RPC_INVERSE_LOG => options.debug.inverse_log = Some(PathBuf::from(value)),
                RPC_DEM_OPTIM => options.debug.dem_optim = parse_bool(value),
                _ => log::debug!("Ignoring unknown RPC transformer option {}", key),
            }
        }

        Ok(options)
    }

    /// Render the transformer options (not the debug settings) as pairs
    /// accepted by [`TransformerOptions::from_pairs`].
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            (RPC_HEIGHT.to_string(), self.height_offset.to_string()),
            (RPC_HEIGHT_SCALE.to_string(), self.height_scale.to_string()),
        ];

        if let Some(path) = &self.dem_path {
            pairs.push((RPC_DEM.to_string(), path.clone()));
            pairs.push((
                RPC_DEMINTERPOLATION.to_string(),
                self.dem_resampling.to_string(),
            ));
            if let Some(missing) = self.dem_missing_value {
                pairs.push((RPC_DEM_MISSING_VALUE.to_string(), missing.to_string()));
            }
            pairs.push((
                RPC_DEM_APPLY_VDATUM_SHIFT.to_string(),
                if self.apply_vdatum_shift { "TRUE" } else { "FALSE" }.to_string(),
            ));
            if let Some(srs) = &self.dem_srs {
                pairs.push((RPC_DEM_SRS.to_string(), srs.clone()));
            }
        }

        pairs.push((
            RPC_PIXEL_ERROR_THRESHOLD.to_string(),
            self.pixel_error_threshold.to_string(),
        ));
        pairs.push((RPC_MAX_ITERATIONS.to_string(), self.max_iterations.to_string()));

        if let Some(footprint) = &self.footprint {
            pairs.push((RPC_FOOTPRINT.to_string(), footprint.clone()));
        }

        pairs
    }
}

/// Anything but NO/FALSE/OFF/0 is true
pub fn parse_bool(value: &str) -> bool {
    let value = value.trim();
    !["NO", "FALSE", "OFF", "0"]
        .iter()
        .any(|no| value.eq_ignore_ascii_case(no))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConstructionError> {
    value.parse().map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: &str) -> ConstructionError {
    ConstructionError::InvalidOption {
        key: key.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = TransformerOptions::default();
        assert_eq!(options.height_offset, 0.0);
        assert_eq!(options.height_scale, 1.0);
        assert_eq!(options.dem_resampling, DemResampling::Bilinear);
        assert!(options.apply_vdatum_shift);
        assert_eq!(options.pixel_error_threshold, 0.1);
        assert_eq!(options.max_iterations, 0);
        assert!(options.debug.dem_optim);
    }

    #[test]
    fn test_parse_all_options() {
        let options = TransformerOptions::from_pairs([
            ("RPC_HEIGHT", "125.5"),
            ("rpc_height_scale", "0.3048"),
            ("RPC_DEM", "/data/dem.tif"),
            ("RPC_DEMInterpolation", "CUBIC"),
            ("RPC_DEM_MISSING_VALUE", "-10"),
            ("RPC_DEM_SRS", "EPSG:4326+5773"),
            ("RPC_DEM_APPLY_VDATUM_SHIFT", "off"),
            ("RPC_PIXEL_ERROR_THRESHOLD", "0.05"),
            ("RPC_MAX_ITERATIONS", "40"),
            ("RPC_FOOTPRINT", "POLYGON((0 0,1 0,1 1,0 1,0 0))"),
            ("RPC_INVERSE_VERBOSE", "YES"),
        ])
        .unwrap();

        assert_eq!(options.height_offset, 125.5);
        assert_eq!(options.height_scale, 0.3048);
        assert_eq!(options.dem_path.as_deref(), Some("/data/dem.tif"));
        assert_eq!(options.dem_resampling, DemResampling::Cubic);
        assert_eq!(options.dem_missing_value, Some(-10.0));
        assert_eq!(options.dem_srs.as_deref(), Some("EPSG:4326+5773"));
        assert!(!options.apply_vdatum_shift);
        assert_eq!(options.pixel_error_threshold, 0.05);
        assert_eq!(options.max_iterations, 40);
        assert!(options.footprint.is_some());
        assert!(options.debug.inverse_verbose);
    }

    #[test]
    fn test_unknown_interpolation_defaults_to_bilinear() {
        let options = TransformerOptions::from_pairs([("RPC_DEMINTERPOLATION", "lanczos")]).unwrap();
        assert_eq!(options.dem_resampling, DemResampling::Bilinear);
    }

    #[test]
    fn test_invalid_numbers() {
        let err = TransformerOptions::from_pairs([("RPC_HEIGHT", "high")]).unwrap_err();
        assert_eq!(
            err,
            ConstructionError::InvalidOption {
                key: "RPC_HEIGHT".to_string(),
                value: "high".to_string()
            }
        );

        assert!(TransformerOptions::from_pairs([("RPC_PIXEL_ERROR_THRESHOLD", "0")]).is_err());
        assert!(TransformerOptions::from_pairs([("RPC_PIXEL_ERROR_THRESHOLD", "-1")]).is_err());
        assert!(TransformerOptions::from_pairs([("RPC_MAX_ITERATIONS", "-3")]).is_err());
    }

    #[test]
    fn test_parse_bool() {
        for no in ["NO", "false", "Off", "0", " no "] {
            assert!(!parse_bool(no), "{no}");
        }
        for yes in ["YES", "true", "on", "1", "anything"] {
            assert!(parse_bool(yes), "{yes}");
        }
    }

    #[test]
    fn test_pairs_roundtrip() {
        let options = TransformerOptions {
            height_offset: 12.25,
            dem_path: Some("dem.tif".to_string()),
            dem_resampling: DemResampling::Nearest,
            dem_missing_value: Some(0.1 + 0.2),
            apply_vdatum_shift: false,
            pixel_error_threshold: 0.01,
            max_iterations: 7,
            footprint: Some("POLYGON((0 0,1 0,1 1,0 0))".to_string()),
            ..TransformerOptions::default()
        };

        let mut back = TransformerOptions::from_pairs(options.to_pairs()).unwrap();
        back.debug = options.debug.clone();
        assert_eq!(back, options);
    }

    #[test]
    fn test_dem_keys_only_rendered_with_dem() {
        let pairs = TransformerOptions::default().to_pairs();
        assert!(pairs.iter().all(|(k, _)| k != RPC_DEMINTERPOLATION));
        assert!(pairs.iter().any(|(k, v)| k == RPC_MAX_ITERATIONS && v == "0"));
    }
}
