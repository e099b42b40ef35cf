//! Whole-line forward transform: when every point of a batch lies on the
//! same latitude of a north-up geographic DEM, the needed DEM rows are read
//! once and every point is resampled from memory.

use std::sync::atomic::{AtomicBool, Ordering};

use super::{RpcTransformer, TransformOutcome};
use crate::coordinate::LlaCoord;
use crate::elevation::resample::{interpolate_at, Window};
use crate::elevation::{DemResampling, ElevationSource};
use crate::error::ElevationError;

/// Smallest batch worth a window read
const MIN_BATCH_POINTS: usize = 10;

static ANNOUNCED: AtomicBool = AtomicBool::new(false);

impl RpcTransformer {
    /// Returns `None` when the fast path does not apply and the points must
    /// go through the per-point path.
    pub(super) fn transform_whole_line(
        &self,
        xs: &mut [f64],
        ys: &mut [f64],
        zs: Option<&[f64]>,
    ) -> Option<TransformOutcome> {
        let dem = self.dem.as_ref()?;
        if xs.len() < MIN_BATCH_POINTS || dem.has_transform() || !self.options.debug.dem_optim {
            return None;
        }

        let inverse = dem.inverse_geo_transform();
        if !(inverse[1] > 0.0 && inverse[2] == 0.0 && inverse[4] == 0.0) {
            return None;
        }

        let lat = ys[0];
        if !lat.is_finite() || ys.iter().any(|&y| y != lat) || xs.iter().any(|x| !x.is_finite()) {
            return None;
        }

        let (min_lon, max_lon) = xs
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
        let window = line_window(dem, min_lon, max_lon, lat)?;

        let data = match dem.read_window(&window) {
            Ok(data) if data.len() == window.width * window.height => data,
            Ok(_) => return None,
            Err(e) => {
                log::debug!("Whole-line DEM read failed, using per-point path: {}", e);
                return None;
            }
        };

        if !ANNOUNCED.swap(true, Ordering::Relaxed) {
            log::debug!("Using whole-line DEM transform");
        }

        let mut outcome = TransformOutcome::with_capacity(xs.len());
        for i in 0..xs.len() {
            let lon = xs[i];
            let height = zs.map_or(0.0, |zs| zs[i]);

            if let Err(e) = self.check_footprint(lon, lat) {
                xs[i] = f64::INFINITY;
                ys[i] = f64::INFINITY;
                outcome.push(Err(e));
                continue;
            }

            let (dem_pixel, dem_line) = inverse.apply(lon, lat);
            let sampled = interpolate_at(
                dem.resampling(),
                dem.raster_size(),
                dem.no_data(),
                dem_pixel,
                dem_line,
                |requested, out| copy_from_window(&data, &window, requested, out),
            );

            let status = match sampled {
                Ok(Some(value)) => {
                    let ground = self.compose_height(0.0, value);
                    let image = self.model.lla_to_image(&LlaCoord {
                        lon,
                        lat,
                        alt: height + ground,
                    });
                    xs[i] = image.pixel;
                    ys[i] = image.line;
                    Ok(())
                }
                // Missing value and dateline handling live in the per-point path
                _ => match self.geo_to_image(lon, lat, height) {
                    Ok(image) => {
                        xs[i] = image.pixel;
                        ys[i] = image.line;
                        Ok(())
                    }
                    Err(e) => {
                        xs[i] = f64::INFINITY;
                        ys[i] = f64::INFINITY;
                        Err(e)
                    }
                },
            };
            outcome.push(status);
        }

        Some(outcome)
    }
}

/// DEM window covering the kernels of all longitudes in `[min_lon, max_lon]`
/// at `lat`, or `None` if it leaves the raster.
fn line_window(dem: &ElevationSource, min_lon: f64, max_lon: f64, lat: f64) -> Option<Window> {
    let inverse = dem.inverse_geo_transform();
    let resampling = dem.resampling();

    let (mut x1, mut y1) = inverse.apply(min_lon, lat);
    let (mut x2, _) = inverse.apply(max_lon, lat);

    // Pixel center convention for the interpolating kernels
    if resampling != DemResampling::Nearest {
        x1 -= 0.5;
        y1 -= 0.5;
        x2 -= 0.5;
    }

    let mut x_left = x1.floor();
    let mut width = x2.floor() - x_left + 1.0;
    let mut y_top = y1.floor();
    if resampling == DemResampling::Cubic {
        x_left -= 1.0;
        y_top -= 1.0;
    }
    width += resampling.extra_columns() as f64;
    let height = resampling.kernel_rows() as f64;

    let (raster_width, raster_height) = dem.raster_size();
    let inside = x_left >= 0.0
        && y_top >= 0.0
        && x_left + width <= raster_width as f64
        && y_top + height <= raster_height as f64;

    inside.then(|| Window {
        x_off: x_left as usize,
        y_off: y_top as usize,
        width: width as usize,
        height: height as usize,
    })
}

fn copy_from_window(
    data: &[f64],
    window: &Window,
    requested: &Window,
    out: &mut [f64],
) -> Result<(), ElevationError> {
    let fits = requested.x_off >= window.x_off
        && requested.y_off >= window.y_off
        && requested.x_off + requested.width <= window.x_off + window.width
        && requested.y_off + requested.height <= window.y_off + window.height;
    if !fits {
        return Err(ElevationError::Read(format!(
            "Kernel at ({}, {}) outside the whole-line window",
            requested.x_off, requested.y_off
        )));
    }

    for row in 0..requested.height {
        let start = (requested.y_off - window.y_off + row) * window.width + requested.x_off
            - window.x_off;
        out[row * requested.width..(row + 1) * requested.width]
            .copy_from_slice(&data[start..start + requested.width]);
    }

    Ok(())
}
