use std::sync::atomic::{AtomicUsize, Ordering};

use super::polynomial::{compute_terms, evaluate4, NUM_TERMS};
use crate::coordinate::{ImageCoord, LlaCoord};

/// Maximum number of normalized-range diagnostics emitted per process
pub const MAX_ABS_VALUE_WARNINGS: usize = 20;

/// Normalized values beyond this magnitude are reported
const NORMALIZED_WARNING_LIMIT: f64 = 1.5;

static NORMALIZATION_WARNINGS: AtomicUsize = AtomicUsize::new(0);

/// Number of normalized-range diagnostics emitted so far
pub fn normalization_warning_count() -> usize {
    NORMALIZATION_WARNINGS.load(Ordering::Relaxed)
}

/// Re-arm the normalized-range diagnostic
pub fn reset_normalization_warnings() {
    NORMALIZATION_WARNINGS.store(0, Ordering::Relaxed);
}

/// RPC (Rational Polynomial Coefficients) for satellite imagery
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCoefficients {
    // Polynomial coefficients (20 each)
    pub line_num_coeff: [f64; 20],
    pub line_den_coeff: [f64; 20],
    pub samp_num_coeff: [f64; 20],
    pub samp_den_coeff: [f64; 20],

    // Normalization offsets and scales
    pub lat_off: f64,
    pub lat_scale: f64,
    pub lon_off: f64,
    pub lon_scale: f64,
    pub height_off: f64,
    pub height_scale: f64,
    pub line_off: f64,
    pub line_scale: f64,
    pub samp_off: f64,
    pub samp_scale: f64,

    // RMS errors in meters, when known
    pub err_bias: Option<f64>,
    pub err_rand: Option<f64>,

    // Validity box, [-180, 180] x [-90, 90] when unknown
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl Default for RpcCoefficients {
    fn default() -> Self {
        Self {
            line_num_coeff: [0.0; 20],
            line_den_coeff: [0.0; 20],
            samp_num_coeff: [0.0; 20],
            samp_den_coeff: [0.0; 20],
            lat_off: 0.0,
            lat_scale: 1.0,
            lon_off: 0.0,
            lon_scale: 1.0,
            height_off: 0.0,
            height_scale: 1.0,
            line_off: 0.0,
            line_scale: 1.0,
            samp_off: 0.0,
            samp_scale: 1.0,
            err_bias: None,
            err_rand: None,
            min_lon: -180.0,
            min_lat: -90.0,
            max_lon: 180.0,
            max_lat: 90.0,
        }
    }
}

impl RpcCoefficients {
    /// True when a validity box narrower than the whole world is present
    pub fn has_bounding_box(&self) -> bool {
        self.min_lon != -180.0 || self.max_lon != 180.0
    }

    /// Same model for an image resampled by the given ratios
    pub fn rescaled(&self, ratio_x: f64, ratio_y: f64) -> Self {
        let mut coeffs = self.clone();
        if ratio_x != 1.0 || ratio_y != 1.0 {
            coeffs.line_off /= ratio_y;
            coeffs.line_scale /= ratio_y;
            coeffs.samp_off /= ratio_x;
            coeffs.samp_scale /= ratio_x;
        }
        coeffs
    }
}

/// RPC sensor model for ground-to-image projection
#[derive(Debug, Clone)]
pub struct RpcModel {
    coeffs: RpcCoefficients,
    // LINE_NUM, LINE_DEN, SAMP_NUM, SAMP_DEN back to back
    packed: [f64; 4 * NUM_TERMS],
}

impl RpcModel {
    /// Create a new RPC model from coefficients
    pub fn new(coeffs: RpcCoefficients) -> Self {
        let mut packed = [0.0; 4 * NUM_TERMS];
        packed[..NUM_TERMS].copy_from_slice(&coeffs.line_num_coeff);
        packed[NUM_TERMS..2 * NUM_TERMS].copy_from_slice(&coeffs.line_den_coeff);
        packed[2 * NUM_TERMS..3 * NUM_TERMS].copy_from_slice(&coeffs.samp_num_coeff);
        packed[3 * NUM_TERMS..].copy_from_slice(&coeffs.samp_den_coeff);

        Self { coeffs, packed }
    }

    /// Get reference to coefficients
    pub fn coefficients(&self) -> &RpcCoefficients {
        &self.coeffs
    }

    /// Project geodetic coordinates to image pixel/line.
    ///
    /// `lla.alt` is the ellipsoidal height already including any ground
    /// offset. A zero denominator yields infinite or NaN coordinates.
    pub fn lla_to_image(&self, lla: &LlaCoord) -> ImageCoord {
        let c = &self.coeffs;

        // Avoid dateline issues
        let mut diff_lon = lla.lon - c.lon_off;
        if diff_lon < -270.0 {
            diff_lon += 360.0;
        } else if diff_lon > 270.0 {
            diff_lon -= 360.0;
        }

        let u = diff_lon / c.lon_scale;
        let v = (lla.lat - c.lat_off) / c.lat_scale;
        let w = (lla.alt - c.height_off) / c.height_scale;

        report_out_of_range(lla, u, v, w);

        let terms = compute_terms(u, v, w);
        let [line_num, line_den, samp_num, samp_den] = evaluate4(&terms, &self.packed);

        let result_x = samp_num / samp_den;
        let result_y = line_num / line_den;

        // RPCs put (0, 0) at the center of the upper left pixel
        ImageCoord {
            pixel: result_x * c.samp_scale + c.samp_off + 0.5,
            line: result_y * c.line_scale + c.line_off + 0.5,
        }
    }
}

fn report_out_of_range(lla: &LlaCoord, u: f64, v: f64, w: f64) {
    if NORMALIZATION_WARNINGS.load(Ordering::Relaxed) >= MAX_ABS_VALUE_WARNINGS {
        return;
    }

    let mut warned = false;
    for (name, value) in [("longitude", u), ("latitude", v), ("height", w)] {
        if value.abs() > NORMALIZED_WARNING_LIMIT {
            warned = true;
            log::debug!(
                "Normalized {} for (lon,lat,height)=({},{},{}) is {}, i.e. with an absolute \
                 value of > 1, which may cause numeric stability problems",
                name,
                lla.lon,
                lla.lat,
                lla.alt,
                value
            );
        }
    }

    if warned {
        let previous = NORMALIZATION_WARNINGS
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                (n < MAX_ABS_VALUE_WARNINGS).then_some(n + 1)
            });
        if previous == Ok(MAX_ABS_VALUE_WARNINGS - 1) {
            log::debug!("No more such debug warnings will be emitted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn create_simple_rpc() -> RpcCoefficients {
        let mut coeffs = RpcCoefficients {
            lat_off: 39.0,
            lat_scale: 0.1,
            lon_off: -77.0,
            lon_scale: 0.1,
            height_off: 100.0,
            height_scale: 500.0,
            line_off: 5000.0,
            line_scale: 5000.0,
            samp_off: 5000.0,
            samp_scale: 5000.0,
            ..Default::default()
        };

        // Simple linear RPC, line from latitude and sample from longitude
        coeffs.line_num_coeff[2] = -1.0;
        coeffs.line_den_coeff[0] = 1.0;
        coeffs.samp_num_coeff[1] = 1.0;
        coeffs.samp_den_coeff[0] = 1.0;

        coeffs
    }

    fn identity_like() -> RpcCoefficients {
        let mut coeffs = RpcCoefficients::default();
        coeffs.line_num_coeff[1] = 1.0;
        coeffs.line_den_coeff[0] = 1.0;
        coeffs.samp_num_coeff[2] = 1.0;
        coeffs.samp_den_coeff[0] = 1.0;
        coeffs
    }

    #[test]
    fn test_identity_like_reference() {
        let rpc = RpcModel::new(identity_like());

        // Line follows the normalized longitude, sample the normalized latitude
        let img = rpc.lla_to_image(&LlaCoord {
            lon: 0.3,
            lat: 0.2,
            alt: 0.0,
        });
        assert_abs_diff_eq!(img.pixel, 0.7, epsilon = 1e-12);
        assert_abs_diff_eq!(img.line, 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_offset_point_maps_to_image_offsets() {
        let rpc = RpcModel::new(create_simple_rpc());

        let img = rpc.lla_to_image(&LlaCoord {
            lon: -77.0,
            lat: 39.0,
            alt: 100.0,
        });
        assert_abs_diff_eq!(img.pixel, 5000.5, epsilon = 1e-9);
        assert_abs_diff_eq!(img.line, 5000.5, epsilon = 1e-9);
    }

    #[test]
    fn test_rpc_linear_projection() {
        let rpc = RpcModel::new(create_simple_rpc());

        let img = rpc.lla_to_image(&LlaCoord {
            lon: -76.95,
            lat: 39.02,
            alt: 100.0,
        });
        // 0.5 normalized sample, -0.2 normalized line
        assert_abs_diff_eq!(img.pixel, 7500.5, epsilon = 1e-6);
        assert_abs_diff_eq!(img.line, 4000.5, epsilon = 1e-6);
    }

    #[test]
    fn test_rational_denominator() {
        let mut coeffs = identity_like();
        // Denominator 1 + w, height normalized by scale 1
        coeffs.samp_den_coeff[3] = 1.0;
        let rpc = RpcModel::new(coeffs);

        let img = rpc.lla_to_image(&LlaCoord {
            lon: 0.0,
            lat: 0.6,
            alt: 1.0,
        });
        assert_abs_diff_eq!(img.pixel, 0.3 + 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_dateline_wrap() {
        let mut coeffs = create_simple_rpc();
        coeffs.lon_off = 179.5;
        coeffs.lon_scale = 1.0;
        let rpc = RpcModel::new(coeffs);

        let west = rpc.lla_to_image(&LlaCoord {
            lon: -179.9,
            lat: 39.0,
            alt: 100.0,
        });
        let east = rpc.lla_to_image(&LlaCoord {
            lon: 180.1,
            lat: 39.0,
            alt: 100.0,
        });
        assert_abs_diff_eq!(west.pixel, east.pixel, epsilon = 1e-9);
        assert_abs_diff_eq!(west.line, east.line, epsilon = 1e-9);
    }

    #[test]
    fn test_forward_is_deterministic() {
        let rpc = RpcModel::new(create_simple_rpc());
        let lla = LlaCoord {
            lon: -77.03,
            lat: 38.97,
            alt: 250.0,
        };

        let a = rpc.lla_to_image(&lla);
        let b = rpc.lla_to_image(&lla);
        assert_eq!(a.pixel.to_bits(), b.pixel.to_bits());
        assert_eq!(a.line.to_bits(), b.line.to_bits());
    }

    #[test]
    fn test_zero_denominator_propagates() {
        let mut coeffs = create_simple_rpc();
        coeffs.line_den_coeff = [0.0; 20];
        coeffs.samp_den_coeff = [0.0; 20];
        let rpc = RpcModel::new(coeffs);

        let img = rpc.lla_to_image(&LlaCoord {
            lon: -76.95,
            lat: 39.0,
            alt: 100.0,
        });
        assert!(img.pixel.is_infinite());
        // 0 / 0
        assert!(img.line.is_nan());
    }

    #[test]
    fn test_normalization_warnings_are_capped() {
        let rpc = RpcModel::new(create_simple_rpc());
        reset_normalization_warnings();

        // Far outside the normalization box: still produces numbers
        for i in 0..(MAX_ABS_VALUE_WARNINGS + 5) {
            let img = rpc.lla_to_image(&LlaCoord {
                lon: -60.0 + i as f64,
                lat: 39.0,
                alt: 100.0,
            });
            assert!(img.pixel.is_finite());
        }
        assert_eq!(normalization_warning_count(), MAX_ABS_VALUE_WARNINGS);
    }

    #[test]
    fn test_rescaled() {
        let coeffs = create_simple_rpc();
        let half = coeffs.rescaled(2.0, 4.0);
        assert_eq!(half.samp_off, 2500.0);
        assert_eq!(half.samp_scale, 2500.0);
        assert_eq!(half.line_off, 1250.0);
        assert_eq!(half.line_scale, 1250.0);
        assert_eq!(half.lat_off, coeffs.lat_off);

        assert_eq!(coeffs.rescaled(1.0, 1.0), coeffs);
    }

    #[test]
    fn test_has_bounding_box() {
        let mut coeffs = create_simple_rpc();
        assert!(!coeffs.has_bounding_box());
        coeffs.min_lon = -77.1;
        coeffs.max_lon = -76.9;
        assert!(coeffs.has_bounding_box());
    }
}
