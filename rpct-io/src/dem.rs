//! GDAL-backed DEM access for the RPC transformer

use std::path::Path;

use gdal::config::{
    clear_thread_local_config_option, get_thread_local_config_option,
    set_thread_local_config_option,
};
use gdal::errors::GdalError;
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use gdal::{Dataset, DatasetOptions, GdalOpenFlags};
use rpct_core::elevation::is_noop_transform;
use rpct_core::{
    ConstructionError, CoordinateTransform, DemHandle, DemOpener, DemRequest, ElevationError,
    ElevationRaster, GeoTransform,
};

use crate::error::Result;

const REPORT_COMPD_CS: &str = "GTIFF_REPORT_COMPD_CS";

/// Single-band DEM read through GDAL
pub struct GdalDem {
    dataset: Dataset,
    size: (usize, usize),
    geo_transform: GeoTransform,
    no_data: Option<f64>,
}

impl GdalDem {
    pub fn new(dataset: Dataset) -> Result<Self> {
        let band = dataset.rasterband(1)?;
        let no_data = band.no_data_value();
        let geo_transform = GeoTransform::new(dataset.geo_transform()?);
        let size = dataset.raster_size();

        Ok(Self {
            dataset,
            size,
            geo_transform,
            no_data,
        })
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }
}

impl ElevationRaster for GdalDem {
    fn raster_size(&self) -> (usize, usize) {
        self.size
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
    ) -> std::result::Result<Vec<f64>, ElevationError> {
        let read = || -> gdal::errors::Result<Vec<f64>> {
            let band = self.dataset.rasterband(1)?;
            let buffer = band.read_as::<f64>(
                (x_off as isize, y_off as isize),
                (width, height),
                (width, height),
                None,
            )?;
            Ok(buffer.data().to_vec())
        };

        read().map_err(|e| ElevationError::Read(e.to_string()))
    }
}

/// WGS84 to DEM CRS transformation
pub struct GdalCoordTransform {
    transform: CoordTransform,
}

impl GdalCoordTransform {
    pub fn new(source: &SpatialRef, target: &SpatialRef) -> Result<Self> {
        Ok(Self {
            transform: CoordTransform::new(source, target)?,
        })
    }
}

impl CoordinateTransform for GdalCoordTransform {
    fn transform(
        &self,
        xs: &mut [f64],
        ys: &mut [f64],
        zs: &mut [f64],
    ) -> std::result::Result<(), ElevationError> {
        self.transform
            .transform_coords(xs, ys, zs)
            .map_err(|e| ElevationError::CoordinateTransform(e.to_string()))
    }
}

/// Opens DEMs named by `RPC_DEM` through GDAL
#[derive(Debug, Clone, Copy, Default)]
pub struct GdalDemOpener;

impl DemOpener for GdalDemOpener {
    fn open(&self, request: &DemRequest<'_>) -> std::result::Result<DemHandle, ConstructionError> {
        open_dem(request).map_err(|e| ConstructionError::DemOpen(format!("{}: {}", request.path, e)))
    }
}

/// Open the DEM and, unless it is already in WGS84, the transformation into
/// its CRS.
pub fn open_dem(request: &DemRequest<'_>) -> Result<DemHandle> {
    let dataset = open_read_only(Path::new(request.path), request.apply_vdatum_shift)?;
    if dataset.raster_count() < 1 {
        return Err(GdalError::BadArgument(format!(
            "{} has no raster band",
            request.path
        ))
        .into());
    }

    let dem_srs = match request.srs_override {
        Some(definition) => Some(SpatialRef::from_definition(definition)?),
        None => dataset.spatial_ref().ok(),
    };

    let to_dem = match dem_srs {
        Some(dem_srs) => wgs84_to_dem(dem_srs, request.reference, request.apply_vdatum_shift)?,
        None => None,
    };

    let raster = GdalDem::new(dataset)?;
    let handle = DemHandle::new(raster);
    Ok(match to_dem {
        Some(transform) => handle.with_transform(transform),
        None => handle,
    })
}

fn open_read_only(path: &Path, report_compound: bool) -> Result<Dataset> {
    let options = DatasetOptions {
        open_flags: GdalOpenFlags::GDAL_OF_READONLY | GdalOpenFlags::GDAL_OF_RASTER,
        ..Default::default()
    };

    if !report_compound {
        return Ok(Dataset::open_ex(path, options)?);
    }

    // Vertical datum of GeoTIFF DEMs is only reported on request
    let previous = get_thread_local_config_option(REPORT_COMPD_CS, "")?;
    set_thread_local_config_option(REPORT_COMPD_CS, "YES")?;
    let dataset = Dataset::open_ex(path, options);
    if previous.is_empty() {
        clear_thread_local_config_option(REPORT_COMPD_CS)?;
    } else {
        set_thread_local_config_option(REPORT_COMPD_CS, &previous)?;
    }

    Ok(dataset?)
}

fn wgs84_to_dem(
    mut dem_srs: SpatialRef,
    reference: (f64, f64),
    apply_vdatum_shift: bool,
) -> Result<Option<GdalCoordTransform>> {
    // Without the shift only the horizontal CRS matters
    if !apply_vdatum_shift && dem_srs.is_compound() {
        strip_vertical(&mut dem_srs)?;
    }
    let compound = dem_srs.is_compound();

    // 3D WGS84 so the transform carries the geoid offset
    let mut wgs84 = SpatialRef::from_epsg(if compound { 4979 } else { 4326 })?;
    wgs84.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    dem_srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);

    if dem_srs == wgs84 {
        return Ok(None);
    }

    let transform = GdalCoordTransform::new(&wgs84, &dem_srs)?;
    if !compound && is_noop_transform(&transform, reference) {
        log::debug!("Short-circuit coordinate transformation from DEM SRS to WGS 84 due to apparent nop");
        return Ok(None);
    }

    Ok(Some(transform))
}

/// Reduce a compound CRS to its horizontal part
fn strip_vertical(srs: &mut SpatialRef) -> Result<()> {
    let rv = unsafe { gdal_sys::OSRStripVertical(srs.to_c_hsrs()) };
    if rv != gdal_sys::OGRErr::OGRERR_NONE {
        return Err(GdalError::OgrError {
            err: rv,
            method_name: "OSRStripVertical",
        }
        .into());
    }
    Ok(())
}
