//! RPC transformer: ground to image through the rational polynomials, image
//! to ground by iterative inversion, with optional DEM heights and footprint.

mod batch;
mod footprint;
mod inverse;
mod serialize;

pub use footprint::Footprint;
pub use inverse::InverseSolution;

use std::sync::Arc;

use crate::coordinate::{GeoTransform, ImageCoord, LlaCoord};
use crate::elevation::{DemOpener, DemRequest, ElevationSource};
use crate::error::{ConstructionError, ElevationError, ProjectionError, Result, RpctError};
use crate::options::TransformerOptions;
use crate::sensor::{RpcCoefficients, RpcModel};

/// Step in degrees used to linearize the model around the reference point
const REFERENCE_DELTA: f64 = 1e-4;

/// Reference pixel/line beyond this is considered implausible
const MAX_REFERENCE_PIXEL: f64 = 100_000.0;

/// Per-point status of a [`RpcTransformer::transform`] call
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutcome {
    points: Vec<std::result::Result<(), ProjectionError>>,
}

impl TransformOutcome {
    fn with_capacity(n: usize) -> Self {
        Self {
            points: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, status: std::result::Result<(), ProjectionError>) {
        self.points.push(status);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// True when every point was transformed
    pub fn all_succeeded(&self) -> bool {
        self.points.iter().all(|p| p.is_ok())
    }

    pub fn succeeded(&self, index: usize) -> bool {
        matches!(self.points.get(index), Some(Ok(())))
    }

    /// Per-point success flags
    pub fn success_flags(&self) -> Vec<bool> {
        self.points.iter().map(|p| p.is_ok()).collect()
    }

    pub fn error(&self, index: usize) -> Option<&ProjectionError> {
        self.points.get(index).and_then(|p| p.as_ref().err())
    }

    /// Failed points with their cause
    pub fn failures(&self) -> impl Iterator<Item = (usize, &ProjectionError)> {
        self.points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.as_ref().err().map(|e| (i, e)))
    }
}

/// Transformer between image pixel/line and WGS84 long/lat/height
pub struct RpcTransformer {
    model: RpcModel,
    reversed: bool,
    options: TransformerOptions,
    dem: Option<ElevationSource>,
    footprint: Option<Footprint>,
    /// Affine pixel/line -> long/lat approximation seeding the inverse
    pixel_to_geo: GeoTransform,
    reference_z: f64,
    opener: Option<Arc<dyn DemOpener>>,
}

impl RpcTransformer {
    /// Create a transformer.
    ///
    /// Without `reversed`, the forward direction (`dst_to_src = false`) goes
    /// from pixel/line/height to long/lat/height. `opener` is required when
    /// `options` name a DEM and is kept to reopen it in
    /// [`RpcTransformer::create_similar`].
    pub fn new(
        coeffs: RpcCoefficients,
        reversed: bool,
        options: &TransformerOptions,
        opener: Option<Arc<dyn DemOpener>>,
    ) -> Result<Self> {
        let footprint = options
            .footprint
            .as_deref()
            .and_then(|text| match Footprint::parse(text) {
                Ok(footprint) => Some(footprint),
                Err(e) => {
                    log::warn!("{}. RPC_FOOTPRINT will be ignored", e);
                    None
                }
            });

        let dem = match &options.dem_path {
            Some(path) => {
                let opener = opener.as_ref().ok_or_else(|| {
                    ConstructionError::DemOpen(format!("{}: no DEM opener available", path))
                })?;
                let request = DemRequest {
                    path,
                    srs_override: options.dem_srs.as_deref(),
                    apply_vdatum_shift: options.apply_vdatum_shift,
                    reference: reference_location(&coeffs),
                };
                let handle = opener.open(&request)?;
                log::info!("Using DEM {} ({} interpolation)", path, options.dem_resampling);

                Some(ElevationSource::new(
                    handle,
                    options.dem_resampling,
                    options.dem_missing_value,
                    options.apply_vdatum_shift,
                )?)
            }
            None => None,
        };

        let mut transformer = Self {
            model: RpcModel::new(coeffs),
            reversed,
            options: options.clone(),
            dem,
            footprint,
            pixel_to_geo: GeoTransform::new([0.0, 1.0, 0.0, 0.0, 0.0, 1.0]),
            reference_z: 0.0,
            opener,
        };
        transformer.init_seed()?;

        Ok(transformer)
    }

    /// Linearize the model around a reference point and invert it
    fn init_seed(&mut self) -> Result<()> {
        let coeffs = self.model.coefficients();

        let mut reference = None;
        if coeffs.has_bounding_box() {
            let (lon, lat) = reference_location(coeffs);
            let image = self.reference_image(lon, lat);
            if is_plausible_reference(&image) {
                reference = Some((lon, lat, image));
            }
        }
        let (ref_lon, ref_lat, ref_image) = match reference {
            Some(reference) => reference,
            None => {
                let (lon, lat) = (coeffs.lon_off, coeffs.lat_off);
                (lon, lat, self.reference_image(lon, lat))
            }
        };

        self.reference_z = self.height_at(ref_lon, ref_lat).unwrap_or(0.0);

        let along_lon = self.model.lla_to_image(&LlaCoord {
            lon: ref_lon + REFERENCE_DELTA,
            lat: ref_lat,
            alt: self.reference_z,
        });
        let along_lat = self.model.lla_to_image(&LlaCoord {
            lon: ref_lon,
            lat: ref_lat + REFERENCE_DELTA,
            alt: self.reference_z,
        });

        let mut geo_to_pixel = [0.0; 6];
        geo_to_pixel[1] = (along_lon.pixel - ref_image.pixel) / REFERENCE_DELTA;
        geo_to_pixel[4] = (along_lon.line - ref_image.line) / REFERENCE_DELTA;
        geo_to_pixel[2] = (along_lat.pixel - ref_image.pixel) / REFERENCE_DELTA;
        geo_to_pixel[5] = (along_lat.line - ref_image.line) / REFERENCE_DELTA;
        geo_to_pixel[0] = ref_image.pixel - geo_to_pixel[1] * ref_lon - geo_to_pixel[2] * ref_lat;
        geo_to_pixel[3] = ref_image.line - geo_to_pixel[4] * ref_lon - geo_to_pixel[5] * ref_lat;

        self.pixel_to_geo = GeoTransform::new(geo_to_pixel)
            .invert()
            .ok_or(ConstructionError::SingularSeed)?;

        log::debug!(
            "RPC reference point ({}, {}) -> ({}, {}), height {}",
            ref_lon,
            ref_lat,
            ref_image.pixel,
            ref_image.line,
            self.reference_z
        );

        Ok(())
    }

    /// Full forward path with DEM, or the bare model at height 0
    fn reference_image(&self, lon: f64, lat: f64) -> ImageCoord {
        self.geo_to_image(lon, lat, 0.0).unwrap_or_else(|_| {
            self.model.lla_to_image(&LlaCoord {
                lon,
                lat,
                alt: 0.0,
            })
        })
    }

    /// Same model for an image resampled by the given ratios, with all
    /// options preserved and the DEM reopened.
    pub fn create_similar(&self, ratio_x: f64, ratio_y: f64) -> Result<Self> {
        Self::new(
            self.model.coefficients().rescaled(ratio_x, ratio_y),
            self.reversed,
            &self.options,
            self.opener.clone(),
        )
    }

    pub fn model(&self) -> &RpcModel {
        &self.model
    }

    pub fn coefficients(&self) -> &RpcCoefficients {
        self.model.coefficients()
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    pub fn options(&self) -> &TransformerOptions {
        &self.options
    }

    pub fn elevation(&self) -> Option<&ElevationSource> {
        self.dem.as_ref()
    }

    pub fn footprint(&self) -> Option<&Footprint> {
        self.footprint.as_ref()
    }

    /// Affine pixel/line to long/lat approximation used as inverse seed
    pub fn pixel_to_geo(&self) -> &GeoTransform {
        &self.pixel_to_geo
    }

    /// Terrain height at the reference point
    pub fn reference_height(&self) -> f64 {
        self.reference_z
    }

    /// Iteration cap of the inverse solution
    pub fn max_iterations(&self) -> usize {
        match self.options.max_iterations {
            0 if self.dem.is_some() => 20,
            0 => 10,
            n => n,
        }
    }

    /// Ground height above the ellipsoid at long/lat
    pub fn height_at(&self, lon: f64, lat: f64) -> std::result::Result<f64, ProjectionError> {
        self.dem_height(lon, lat).map_err(|e| {
            log::debug!("No elevation at ({}, {}): {}", lon, lat, e);
            ProjectionError::ElevationUnavailable { lon, lat }
        })
    }

    fn dem_height(&self, lon: f64, lat: f64) -> std::result::Result<f64, ElevationError> {
        match &self.dem {
            None => Ok(self.options.height_offset),
            Some(dem) => {
                let sample = dem.sample_at(lon, lat)?;
                Ok(self.compose_height(sample.vdatum_shift, sample.value))
            }
        }
    }

    fn compose_height(&self, vdatum_shift: f64, dem_value: f64) -> f64 {
        vdatum_shift + self.options.height_offset + dem_value * self.options.height_scale
    }

    fn check_footprint(&self, lon: f64, lat: f64) -> std::result::Result<(), ProjectionError> {
        match &self.footprint {
            Some(footprint) if !footprint.contains(lon, lat) => {
                Err(ProjectionError::FootprintViolation { lon, lat })
            }
            _ => Ok(()),
        }
    }

    /// Project long/lat with `height` above the ground to pixel/line
    pub fn geo_to_image(
        &self,
        lon: f64,
        lat: f64,
        height: f64,
    ) -> std::result::Result<ImageCoord, ProjectionError> {
        self.check_footprint(lon, lat)?;
        let ground = self.height_at(lon, lat)?;

        Ok(self.model.lla_to_image(&LlaCoord {
            lon,
            lat,
            alt: height + ground,
        }))
    }

    /// Locate pixel/line with `height` above the ground
    pub fn image_to_geo(
        &self,
        pixel: f64,
        line: f64,
        height: f64,
    ) -> std::result::Result<LlaCoord, ProjectionError> {
        let solution = self.solve_inverse(pixel, line, height)?;
        self.check_footprint(solution.lon, solution.lat)?;

        Ok(LlaCoord {
            lon: solution.lon,
            lat: solution.lat,
            alt: height,
        })
    }

    /// Transform points in place.
    ///
    /// `dst_to_src` selects long/lat -> pixel/line unless the transformer is
    /// reversed. Failed points are set to infinity; the outcome reports them
    /// individually. Heights are required for pixel/line -> long/lat.
    pub fn transform(
        &self,
        dst_to_src: bool,
        xs: &mut [f64],
        ys: &mut [f64],
        zs: Option<&mut [f64]>,
    ) -> Result<TransformOutcome> {
        if xs.len() != ys.len() || zs.as_ref().is_some_and(|zs| zs.len() != xs.len()) {
            return Err(RpctError::InvalidInput(format!(
                "Coordinate arrays differ in length ({} x, {} y)",
                xs.len(),
                ys.len()
            )));
        }

        if dst_to_src != self.reversed {
            return Ok(self.transform_to_image(xs, ys, zs.as_deref()));
        }

        match zs {
            Some(zs) => Ok(self.transform_to_geo(xs, ys, zs)),
            None => Err(ProjectionError::MissingHeights.into()),
        }
    }

    fn transform_to_image(&self, xs: &mut [f64], ys: &mut [f64], zs: Option<&[f64]>) -> TransformOutcome {
        if let Some(outcome) = self.transform_whole_line(xs, ys, zs) {
            return outcome;
        }

        let mut outcome = TransformOutcome::with_capacity(xs.len());
        for i in 0..xs.len() {
            let height = zs.map_or(0.0, |zs| zs[i]);
            let status = self.geo_to_image(xs[i], ys[i], height).map(|image| {
                xs[i] = image.pixel;
                ys[i] = image.line;
            });
            if status.is_err() {
                xs[i] = f64::INFINITY;
                ys[i] = f64::INFINITY;
            }
            outcome.push(status);
        }

        outcome
    }

    fn transform_to_geo(&self, xs: &mut [f64], ys: &mut [f64], zs: &[f64]) -> TransformOutcome {
        let mut outcome = TransformOutcome::with_capacity(xs.len());
        for i in 0..xs.len() {
            let status = self.image_to_geo(xs[i], ys[i], zs[i]).map(|lla| {
                xs[i] = lla.lon;
                ys[i] = lla.lat;
            });
            if status.is_err() {
                xs[i] = f64::INFINITY;
                ys[i] = f64::INFINITY;
            }
            outcome.push(status);
        }

        outcome
    }

    /// Project many ground points, with the whole-line optimisation when
    /// applicable.
    pub fn geo_to_image_points(
        &self,
        points: &[LlaCoord],
    ) -> Vec<std::result::Result<ImageCoord, ProjectionError>> {
        let mut xs: Vec<f64> = points.iter().map(|p| p.lon).collect();
        let mut ys: Vec<f64> = points.iter().map(|p| p.lat).collect();
        let zs: Vec<f64> = points.iter().map(|p| p.alt).collect();

        let outcome = self.transform_to_image(&mut xs, &mut ys, Some(&zs));
        outcome
            .points
            .into_iter()
            .enumerate()
            .map(|(i, status)| {
                status.map(|_| ImageCoord {
                    pixel: xs[i],
                    line: ys[i],
                })
            })
            .collect()
    }

    /// Locate many image points, each with its height above the ground
    pub fn image_to_geo_points(
        &self,
        points: &[(ImageCoord, f64)],
    ) -> Vec<std::result::Result<LlaCoord, ProjectionError>> {
        points
            .iter()
            .map(|(image, height)| self.image_to_geo(image.pixel, image.line, *height))
            .collect()
    }
}

/// Center of the validity box if there is one, else the offset point
fn reference_location(coeffs: &RpcCoefficients) -> (f64, f64) {
    if coeffs.has_bounding_box() {
        (
            (coeffs.min_lon + coeffs.max_lon) * 0.5,
            (coeffs.min_lat + coeffs.max_lat) * 0.5,
        )
    } else {
        (coeffs.lon_off, coeffs.lat_off)
    }
}

fn is_plausible_reference(image: &ImageCoord) -> bool {
    (0.0..=MAX_REFERENCE_PIXEL).contains(&image.pixel)
        && (0.0..=MAX_REFERENCE_PIXEL).contains(&image.line)
}
