//! Resampling kernels shared by point queries and the whole-line fast path.

use super::DemResampling;
use crate::error::ElevationError;

/// Region of the raster a kernel needs, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Window {
    pub x_off: usize,
    pub y_off: usize,
    pub width: usize,
    pub height: usize,
}

/// Cubic B-spline kernel
pub fn cubic_spline_kernel(x: f64) -> f64 {
    if x > 2.0 {
        return 0.0;
    }

    let xm1 = x - 1.0;
    let xp1 = x + 1.0;
    let xp2 = x + 2.0;

    let a = if xp2 <= 0.0 { 0.0 } else { xp2 * xp2 * xp2 };
    let b = if xp1 <= 0.0 { 0.0 } else { xp1 * xp1 * xp1 };
    let c = if x <= 0.0 { 0.0 } else { x * x * x };
    let d = if xm1 <= 0.0 { 0.0 } else { xm1 * xm1 * xm1 };

    (a - 4.0 * b + 6.0 * c - 4.0 * d) / 6.0
}

pub(crate) fn is_no_data(value: f64, no_data: Option<f64>) -> bool {
    match no_data {
        None => false,
        Some(nd) if nd.is_nan() => value.is_nan(),
        Some(nd) => {
            value == nd
                || (value - nd).abs() < 1e-10
                || (nd != 0.0 && (1.0 - value / nd).abs() < 1e-10)
        }
    }
}

/// Interpolate the raster at fractional pixel/line `(x, y)`.
///
/// `extract` fills a row-major buffer with the values of the requested window.
/// Returns `Ok(None)` when the location is outside the raster or only nodata
/// is available. Cubic degrades to bilinear, and bilinear to nearest, where
/// the kernel would leave the raster.
pub(crate) fn interpolate_at<F>(
    resampling: DemResampling,
    raster_size: (usize, usize),
    no_data: Option<f64>,
    x: f64,
    y: f64,
    mut extract: F,
) -> Result<Option<f64>, ElevationError>
where
    F: FnMut(&Window, &mut [f64]) -> Result<(), ElevationError>,
{
    let (width, height) = raster_size;
    if width == 0 || height == 0 {
        return Ok(None);
    }
    // Written so that NaN coordinates are rejected too
    if !(x >= 0.0 && x <= width as f64 && y >= 0.0 && y <= height as f64) {
        return Ok(None);
    }

    // Pixel center convention for the interpolating kernels
    let cx = x - 0.5;
    let cy = y - 0.5;
    let ix = cx.floor();
    let iy = cy.floor();
    let dx = cx - ix;
    let dy = cy - iy;

    if resampling == DemResampling::Cubic {
        if let Some(window) = kernel_window(ix as i64 - 1, iy as i64 - 1, 4, raster_size) {
            let mut values = [0.0; 16];
            extract(&window, &mut values)?;
            return Ok(cubic(&values, dx, dy, no_data));
        }
    }

    if resampling != DemResampling::Nearest {
        if let Some(window) = kernel_window(ix as i64, iy as i64, 2, raster_size) {
            let mut values = [0.0; 4];
            extract(&window, &mut values)?;
            return Ok(bilinear(&values, dx, dy, no_data));
        }
    }

    let window = Window {
        x_off: (x as usize).min(width - 1),
        y_off: (y as usize).min(height - 1),
        width: 1,
        height: 1,
    };
    let mut value = [0.0; 1];
    extract(&window, &mut value)?;

    Ok((!is_no_data(value[0], no_data)).then_some(value[0]))
}

fn kernel_window(x0: i64, y0: i64, size: usize, raster_size: (usize, usize)) -> Option<Window> {
    let (width, height) = raster_size;
    let fits = x0 >= 0
        && y0 >= 0
        && x0 as usize + size <= width
        && y0 as usize + size <= height;

    fits.then_some(Window {
        x_off: x0 as usize,
        y_off: y0 as usize,
        width: size,
        height: size,
    })
}

fn bilinear(values: &[f64; 4], dx: f64, dy: f64, no_data: Option<f64>) -> Option<f64> {
    // Any nodata sample disables interpolation, any valid neighbour is used instead
    if values.iter().any(|&v| is_no_data(v, no_data)) {
        return values.iter().copied().find(|&v| !is_no_data(v, no_data));
    }

    let dx1 = 1.0 - dx;
    let dy1 = 1.0 - dy;
    let top = values[0] * dx1 + values[1] * dx;
    let bottom = values[2] * dx1 + values[3] * dx;

    Some(top * dy1 + bottom * dy)
}

fn cubic(values: &[f64; 16], dx: f64, dy: f64, no_data: Option<f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut sum_weight = 0.0;

    for k_i in 0..4 {
        for k_j in 0..4 {
            let weight = cubic_spline_kernel((k_j as f64 - 1.0) - dx)
                * cubic_spline_kernel((k_i as f64 - 1.0) - dy);

            let value = values[k_i * 4 + k_j];
            if is_no_data(value, no_data) {
                continue;
            }

            sum += value * weight;
            sum_weight += weight;
        }
    }

    (sum_weight != 0.0).then(|| sum / sum_weight)
}
