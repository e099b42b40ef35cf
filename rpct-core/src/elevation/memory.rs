use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{s, Array2};

use super::{DemHandle, DemOpener, DemRequest, ElevationRaster};
use crate::coordinate::GeoTransform;
use crate::error::{ConstructionError, ElevationError};

/// In-memory elevation grid.
///
/// Clones share the grid and the read counter, which makes it convenient to
/// hand one copy to a transformer and keep another to inspect I/O.
#[derive(Debug, Clone)]
pub struct MemoryRaster {
    data: Arc<Array2<f64>>,
    geo_transform: GeoTransform,
    no_data: Option<f64>,
    reads: Arc<AtomicUsize>,
}

impl MemoryRaster {
    /// `data` is indexed `[line, pixel]`
    pub fn new(data: Array2<f64>, geo_transform: GeoTransform) -> Self {
        Self {
            data: Arc::new(data),
            geo_transform,
            no_data: None,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_no_data(mut self, no_data: f64) -> Self {
        self.no_data = Some(no_data);
        self
    }

    /// Number of `read_window` calls served so far
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }
}

impl ElevationRaster for MemoryRaster {
    fn raster_size(&self) -> (usize, usize) {
        let (rows, cols) = self.data.dim();
        (cols, rows)
    }

    fn geo_transform(&self) -> GeoTransform {
        self.geo_transform
    }

    fn no_data_value(&self) -> Option<f64> {
        self.no_data
    }

    fn read_window(
        &self,
        x_off: usize,
        y_off: usize,
        width: usize,
        height: usize,
    ) -> Result<Vec<f64>, ElevationError> {
        let (cols, rows) = self.raster_size();
        if x_off + width > cols || y_off + height > rows {
            return Err(ElevationError::Read(format!(
                "Window {}x{} at ({}, {}) outside {}x{} raster",
                width, height, x_off, y_off, cols, rows
            )));
        }

        self.reads.fetch_add(1, Ordering::Relaxed);

        let window = self
            .data
            .slice(s![y_off..y_off + height, x_off..x_off + width]);
        Ok(window.iter().copied().collect())
    }
}

/// Serves the same grid for any DEM path
impl DemOpener for MemoryRaster {
    fn open(&self, _request: &DemRequest<'_>) -> Result<DemHandle, ConstructionError> {
        Ok(DemHandle::new(self.clone()))
    }
}
