//! Coordinate reference systems accepted for input geometries.

use std::fmt;
use std::str::FromStr;

use geo::MapCoords;
use geo_types::{Coord, MultiPolygon};

use crate::error::Nldas2Error;

const MERCATOR_EXTENT: f64 = 20037508.342789244;

/// Well-known CRS codes a geometry may be given in.
///
/// Results are always in geographic WGS84 (EPSG:4326).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Crs {
    /// WGS84 Geographic (lon/lat in degrees)
    #[default]
    Epsg4326,
    /// NAD83 Geographic, within grid precision of WGS84
    Epsg4269,
    /// Web Mercator (meters)
    Epsg3857,
}

impl Crs {
    const SUPPORTED: [&'static str; 3] = ["EPSG:4326", "EPSG:4269", "EPSG:3857"];

    pub fn epsg(&self) -> u32 {
        match self {
            Crs::Epsg4326 => 4326,
            Crs::Epsg4269 => 4269,
            Crs::Epsg3857 => 3857,
        }
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self, Crs::Epsg4326 | Crs::Epsg4269)
    }

    /// Converts a coordinate in this CRS to WGS84 lon/lat.
    pub fn to_wgs84(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Crs::Epsg4326 | Crs::Epsg4269 => (x, y),
            Crs::Epsg3857 => {
                let lon = x / MERCATOR_EXTENT * 180.0;
                let lat = y / MERCATOR_EXTENT * 180.0;
                let lat = (2.0 * lat.to_radians().exp().atan() - std::f64::consts::FRAC_PI_2)
                    .to_degrees();
                (lon, lat)
            }
        }
    }

    pub(crate) fn reproject(&self, geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        if self.is_geographic() {
            return geometry.clone();
        }
        geometry.map_coords(|c| {
            let (x, y) = self.to_wgs84(c.x, c.y);
            Coord { x, y }
        })
    }
}

impl FromStr for Crs {
    type Err = Nldas2Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        match normalized.as_str() {
            "EPSG:4326" | "CRS:84" | "4326" | "WGS84" => Ok(Crs::Epsg4326),
            "EPSG:4269" | "4269" => Ok(Crs::Epsg4269),
            "EPSG:3857" | "EPSG:900913" | "3857" => Ok(Crs::Epsg3857),
            _ => Err(Nldas2Error::input_value("geo_crs", Self::SUPPORTED)),
        }
    }
}

impl TryFrom<u32> for Crs {
    type Error = Nldas2Error;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        code.to_string().parse()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}
