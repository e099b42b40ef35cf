use geo::{BoundingRect, Contains, Geometry, Point, Rect};
use geojson::GeoJson;
use wkt::Wkt;

use crate::error::{Result, RpctError};

/// Validity region of an RPC model in long/lat, prepared for repeated
/// point-in-polygon tests.
#[derive(Debug, Clone)]
pub struct Footprint {
    source: String,
    geometry: Geometry<f64>,
    bounds: Option<Rect<f64>>,
}

impl Footprint {
    /// Parse a WKT or GeoJSON (leading `{`) geometry
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();

        let geometry = if trimmed.starts_with('{') {
            let geojson: GeoJson = trimmed.parse().map_err(|e| {
                RpctError::InvalidInput(format!("Invalid GeoJSON footprint: {}", e))
            })?;
            Geometry::<f64>::try_from(geojson).map_err(|e| {
                RpctError::InvalidInput(format!("Unsupported GeoJSON footprint: {}", e))
            })?
        } else {
            let wkt: Wkt<f64> = trimmed
                .parse()
                .map_err(|e| RpctError::InvalidInput(format!("Invalid WKT footprint: {}", e)))?;
            Geometry::<f64>::try_from(wkt).map_err(|e| {
                RpctError::InvalidInput(format!("Unsupported WKT footprint: {}", e))
            })?
        };

        let bounds = geometry.bounding_rect();

        Ok(Self {
            source: text.to_string(),
            geometry,
            bounds,
        })
    }

    /// Text the footprint was parsed from
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn geometry(&self) -> &Geometry<f64> {
        &self.geometry
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let Some(bounds) = self.bounds else {
            return false;
        };

        let (min, max) = (bounds.min(), bounds.max());
        if !(lon >= min.x && lon <= max.x && lat >= min.y && lat <= max.y) {
            return false;
        }

        self.geometry.contains(&Point::new(lon, lat))
    }
}
