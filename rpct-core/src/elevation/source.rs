use std::cell::RefCell;
use std::rc::Rc;

use super::cache::{block_key, BlockCache, CACHE_BLOCK_SIZE, DEFAULT_CACHE_CAPACITY};
use super::resample::{interpolate_at, Window};
use super::{CoordinateTransform, DemHandle, DemResampling, ElevationRaster};
use crate::coordinate::GeoTransform;
use crate::error::{ConstructionError, ElevationError};

/// Elevation looked up for a long/lat
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemSample {
    /// Interpolated DEM value, or the configured missing value
    pub value: f64,
    /// Shift from the DEM vertical datum to the ellipsoid (0 if not applied)
    pub vdatum_shift: f64,
    /// Location sampled in the DEM raster
    pub dem_pixel: f64,
    pub dem_line: f64,
}

/// Resampled access to a DEM through an LRU cache of raster blocks
pub struct ElevationSource {
    raster: Box<dyn ElevationRaster>,
    to_dem: Option<Box<dyn CoordinateTransform>>,
    geo_transform: GeoTransform,
    inverse_geo_transform: GeoTransform,
    raster_size: (usize, usize),
    no_data: Option<f64>,
    resampling: DemResampling,
    missing_value: Option<f64>,
    apply_vdatum_shift: bool,
    cache: RefCell<BlockCache>,
}

impl ElevationSource {
    pub fn new(
        handle: DemHandle,
        resampling: DemResampling,
        missing_value: Option<f64>,
        apply_vdatum_shift: bool,
    ) -> Result<Self, ConstructionError> {
        let DemHandle { raster, to_dem } = handle;

        let geo_transform = raster.geo_transform();
        let inverse_geo_transform = geo_transform
            .invert()
            .ok_or(ConstructionError::InvalidDemGeoTransform)?;
        let raster_size = raster.raster_size();
        let no_data = raster.no_data_value();

        log::debug!(
            "DEM {}x{} ({}), transform to DEM CRS: {}",
            raster_size.0,
            raster_size.1,
            resampling,
            if to_dem.is_some() { "yes" } else { "no" }
        );

        Ok(Self {
            raster,
            to_dem,
            geo_transform,
            inverse_geo_transform,
            raster_size,
            no_data,
            resampling,
            missing_value,
            apply_vdatum_shift,
            cache: RefCell::new(BlockCache::new(DEFAULT_CACHE_CAPACITY)),
        })
    }

    pub fn resampling(&self) -> DemResampling {
        self.resampling
    }

    pub fn missing_value(&self) -> Option<f64> {
        self.missing_value
    }

    pub fn raster_size(&self) -> (usize, usize) {
        self.raster_size
    }

    pub fn geo_transform(&self) -> &GeoTransform {
        &self.geo_transform
    }

    /// Georeferenced coordinates to DEM pixel/line
    pub fn inverse_geo_transform(&self) -> &GeoTransform {
        &self.inverse_geo_transform
    }

    /// True when long/lat must be transformed into the DEM CRS
    pub fn has_transform(&self) -> bool {
        self.to_dem.is_some()
    }

    pub(crate) fn no_data(&self) -> Option<f64> {
        self.no_data
    }

    /// Resample the DEM at fractional pixel/line, without missing value
    /// substitution.
    pub fn sample_pixel(&self, x: f64, y: f64) -> Result<Option<f64>, ElevationError> {
        interpolate_at(
            self.resampling,
            self.raster_size,
            self.no_data,
            x,
            y,
            |window, out| self.fetch_cached(window, out),
        )
    }

    /// Elevation at a WGS84 long/lat.
    ///
    /// Longitudes beyond ±180 are retried on the other side of the
    /// antimeridian when the DEM is geographic and covers the whole globe.
    /// Falls back to the missing value when one is configured, also when the
    /// raster read fails.
    pub fn sample_at(&self, lon: f64, lat: f64) -> Result<DemSample, ElevationError> {
        let mut x = lon;
        let mut y = lat;
        let mut vdatum_shift = 0.0;

        if let Some(to_dem) = &self.to_dem {
            let mut xs = [x];
            let mut ys = [y];
            let mut zs = [0.0];
            to_dem.transform(&mut xs, &mut ys, &mut zs)?;
            x = xs[0];
            y = ys[0];

            // The transform goes ellipsoid -> DEM datum, heights go the other way
            if self.apply_vdatum_shift {
                vdatum_shift = -zs[0];
            }
        }

        let mut retried = false;
        loop {
            let (dem_pixel, dem_line) = self.inverse_geo_transform.apply(x, y);

            // A failed read counts as no value
            match self.sample_pixel(dem_pixel, dem_line) {
                Ok(Some(value)) => {
                    return Ok(DemSample {
                        value,
                        vdatum_shift,
                        dem_pixel,
                        dem_line,
                    })
                }
                Ok(None) => {}
                Err(e) => log::debug!("DEM read at ({}, {}) failed: {}", dem_pixel, dem_line, e),
            }

            if !retried && self.to_dem.is_none() && lon.abs() >= 180.0 && self.spans_antimeridian() {
                x = if lon >= 180.0 { lon - 360.0 } else { lon + 360.0 };
                y = lat;
                retried = true;
                continue;
            }

            return match self.missing_value {
                Some(value) => Ok(DemSample {
                    value,
                    vdatum_shift,
                    dem_pixel,
                    dem_line,
                }),
                None => Err(ElevationError::Unavailable {
                    dem_pixel,
                    dem_line,
                }),
            };
        }
    }

    /// Uncached read straight from the raster
    pub(crate) fn read_window(&self, window: &Window) -> Result<Vec<f64>, ElevationError> {
        self.raster
            .read_window(window.x_off, window.y_off, window.width, window.height)
    }

    fn spans_antimeridian(&self) -> bool {
        let min_lon = self.geo_transform[0];
        let max_lon = min_lon + self.raster_size.0 as f64 * self.geo_transform[1];
        (min_lon + 180.0).abs() < 0.1 && (max_lon - 180.0).abs() < 0.1
    }

    fn fetch_cached(&self, window: &Window, out: &mut [f64]) -> Result<(), ElevationError> {
        for row in 0..window.height {
            let y = window.y_off + row;
            for col in 0..window.width {
                let x = window.x_off + col;
                let (block_row, block_col) = (y / CACHE_BLOCK_SIZE, x / CACHE_BLOCK_SIZE);
                let (block, block_width) = self.block(block_row, block_col)?;

                let offset = (y % CACHE_BLOCK_SIZE) * block_width + x % CACHE_BLOCK_SIZE;
                out[row * window.width + col] = block[offset];
            }
        }

        Ok(())
    }

    /// Fetch a block through the cache, returning it with its width
    fn block(&self, block_row: usize, block_col: usize) -> Result<(Rc<[f64]>, usize), ElevationError> {
        let (width, height) = self.raster_size;
        let x_off = block_col * CACHE_BLOCK_SIZE;
        let y_off = block_row * CACHE_BLOCK_SIZE;
        let block_width = CACHE_BLOCK_SIZE.min(width - x_off);
        let block_height = CACHE_BLOCK_SIZE.min(height - y_off);

        let key = block_key(block_row, block_col);
        let mut cache = self.cache.borrow_mut();
        if let Some(block) = cache.get(key) {
            return Ok((block, block_width));
        }

        let values = self
            .raster
            .read_window(x_off, y_off, block_width, block_height)?;
        if values.len() != block_width * block_height {
            return Err(ElevationError::Read(format!(
                "Expected {} values for block ({}, {}), got {}",
                block_width * block_height,
                block_row,
                block_col,
                values.len()
            )));
        }

        let block: Rc<[f64]> = Rc::from(values);
        cache.insert(key, Rc::clone(&block));

        Ok((block, block_width))
    }
}
