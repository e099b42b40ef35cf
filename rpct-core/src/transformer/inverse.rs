use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::RpcTransformer;
use crate::coordinate::LlaCoord;
use crate::error::{ElevationError, ProjectionError};

/// Errors below this many pixels count towards the boost
const SMALL_ERROR: f64 = 2.0;

/// Consecutive small errors before the step is boosted
const BOOST_AFTER: usize = 5;

const BOOST_FACTOR: f64 = 10.0;

/// Long/lat found for a pixel/line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InverseSolution {
    pub lon: f64,
    pub lat: f64,
    /// Forward evaluations performed, convergence included
    pub iterations: usize,
}

/// Guess and residual of the previous iteration
#[derive(Debug, Clone, Copy)]
struct Previous {
    lon: f64,
    lat: f64,
    dx: f64,
    dy: f64,
}

impl RpcTransformer {
    /// Iteratively find the long/lat that projects to `(pixel, line)` at
    /// `height` above the ground.
    ///
    /// The affine seed provides both the initial guess and the step
    /// direction. With a DEM, sign flips of the residual on both axes average
    /// the last two guesses, and a residual stuck under 2 pixels boosts the
    /// step.
    pub fn solve_inverse(
        &self,
        pixel: f64,
        line: f64,
        height: f64,
    ) -> Result<InverseSolution, ProjectionError> {
        let seed = &self.pixel_to_geo;
        let (mut lon, mut lat) = seed.apply(pixel, line);

        let verbose = self.options.debug.inverse_verbose;
        if verbose {
            log::debug!("Computing inverse transform for (pixel,line)=({},{})", pixel, line);
        }
        let mut iteration_log = self
            .options
            .debug
            .inverse_log
            .as_deref()
            .and_then(|path| match IterationLog::create(path) {
                Ok(trace) => Some(trace),
                Err(e) => {
                    log::warn!("Cannot write RPC inverse log {}: {}", path.display(), e);
                    None
                }
            });

        let has_dem = self.dem.is_some();
        let max_iterations = self.max_iterations();
        let threshold = self.options.pixel_error_threshold;

        let mut previous: Option<Previous> = None;
        let mut small_errors = 0;
        let mut error = f64::INFINITY;

        for iteration in 0..max_iterations {
            let ground = match self.dem_height(lon, lat) {
                Ok(h) => h,
                // The seed may fall outside the DEM
                Err(e) if iteration == 0 => self.first_guess_height(&e, pixel, line, lon, lat),
                Err(_) => {
                    log::debug!(
                        "Iteration {} for (pixel, line) = ({}, {}): No elevation value at {} {}. \
                         Erroring out",
                        iteration,
                        pixel,
                        line,
                        lon,
                        lat
                    );
                    return Err(ProjectionError::ConvergenceElevationLost { iteration });
                }
            };

            let back = self.model.lla_to_image(&LlaCoord {
                lon,
                lat,
                alt: height + ground,
            });
            let dx = back.pixel - pixel;
            let dy = back.line - line;

            if verbose {
                log::debug!(
                    "Iter {}: dx={:.2}, dy={:.2}, long={}, lat={}, height={}",
                    iteration,
                    dx,
                    dy,
                    lon,
                    lat,
                    height + ground
                );
            }
            if let Some(trace) = iteration_log.as_mut() {
                if let Err(e) = trace.record(iteration, lon, lat, height + ground, dx, dy) {
                    log::warn!("Cannot write RPC inverse log: {}", e);
                    iteration_log = None;
                }
            }

            error = dx.abs().max(dy.abs());
            if error < threshold {
                if verbose {
                    log::debug!("Converged!");
                }
                return Ok(InverseSolution {
                    lon,
                    lat,
                    iterations: iteration + 1,
                });
            }

            if has_dem {
                if let Some(prev) = previous {
                    if dx * prev.dx < 0.0 && dy * prev.dy < 0.0 {
                        if verbose {
                            log::debug!(
                                "Oscillation detected. Taking mean of 2 previous results as new guess"
                            );
                        }
                        lon = (dx.abs() * prev.lon + prev.dx.abs() * lon) / (dx.abs() + prev.dx.abs());
                        lat = (dy.abs() * prev.lat + prev.dy.abs() * lat) / (dy.abs() + prev.dy.abs());
                        previous = None;
                        small_errors = 0;
                        continue;
                    }
                }
            }

            let mut boost = 1.0;
            if has_dem && small_errors >= BOOST_AFTER && error < SMALL_ERROR {
                boost = BOOST_FACTOR;
                if verbose {
                    log::debug!("Applying boost factor {}", BOOST_FACTOR);
                }
            }

            if error < SMALL_ERROR {
                small_errors += 1;
            } else {
                small_errors = 0;
            }

            let next_lon = lon - dx * seed[1] * boost - dy * seed[2] * boost;
            let next_lat = lat - dx * seed[4] * boost - dy * seed[5] * boost;

            previous = Some(Previous { lon, lat, dx, dy });
            lon = next_lon;
            lat = next_lat;
        }

        log::debug!(
            "Failed after {} iterations for (pixel, line) = ({}, {}): got {}, {}, error {}",
            max_iterations,
            pixel,
            line,
            lon,
            lat,
            error
        );

        Err(ProjectionError::ConvergenceFailed {
            iterations: max_iterations,
            pixel_error: error,
        })
    }

    /// Height for a first guess outside the DEM: the DEM value at the closest
    /// raster edge, else the reference height.
    fn first_guess_height(
        &self,
        err: &ElevationError,
        pixel: f64,
        line: f64,
        lon: f64,
        lat: f64,
    ) -> f64 {
        if let (Some(dem), ElevationError::Unavailable { dem_pixel, dem_line }) = (&self.dem, err) {
            log::debug!("DEM (pixel, line) = ({}, {})", dem_pixel, dem_line);

            let (width, height) = dem.raster_size();
            let snapped_pixel = snap_to_raster(*dem_pixel, width);
            let snapped_line = snap_to_raster(*dem_line, height);

            if let Ok(Some(value)) = dem.sample_pixel(snapped_pixel, snapped_line) {
                let ground = self.options.height_offset + value * self.options.height_scale;
                log::debug!(
                    "Iteration 0 for (pixel, line) = ({}, {}): No elevation value at {} {}. \
                     Using elevation {} at DEM (pixel, line) = ({}, {}) (snapping to boundaries) \
                     instead",
                    pixel,
                    line,
                    lon,
                    lat,
                    ground,
                    snapped_pixel,
                    snapped_line
                );
                return ground;
            }
        }

        log::debug!(
            "Iteration 0 for (pixel, line) = ({}, {}): No elevation value at {} {}. \
             Using elevation {} of reference point instead",
            pixel,
            line,
            lon,
            lat,
            self.reference_z
        );
        self.reference_z
    }
}

fn snap_to_raster(coord: f64, size: usize) -> f64 {
    let size = size as f64;
    if coord >= size {
        size - 0.5
    } else if coord < 0.0 {
        0.5
    } else {
        coord
    }
}

/// CSV trace of the iterations of one inverse solution, with a `.csvt`
/// column type sidecar.
struct IterationLog {
    writer: BufWriter<File>,
}

impl IterationLog {
    fn create(path: &Path) -> io::Result<Self> {
        fs::write(
            path.with_extension("csvt"),
            "Integer,Real,Real,Real,String,Real,Real\n",
        )?;

        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "iter,long,lat,height,WKT,error_pixel_x,error_pixel_y")?;

        Ok(Self { writer })
    }

    fn record(
        &mut self,
        iteration: usize,
        lon: f64,
        lat: f64,
        height: f64,
        dx: f64,
        dy: f64,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "{},{:.12},{:.12},{:.6},\"POINT({:.12} {:.12})\",{:.6},{:.6}",
            iteration, lon, lat, height, lon, lat, dx, dy
        )?;
        self.writer.flush()
    }
}
