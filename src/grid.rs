//! The NLDAS2 0.125° forcing grid.

use geo::{BoundingRect, Relate};
use geo_types::{MultiPolygon, Polygon, Rect, coord};
use ndarray::Array2;
use serde::Serialize;

use crate::crs::Crs;
use crate::error::Nldas2Error;

/// Grid extent as `(west, south, east, north)` in degrees.
pub const BOUNDS: (f64, f64, f64, f64) = (-125.0, 25.0, -67.0, 53.0);
pub const RESOLUTION: f64 = 0.125;
pub const N_LON: usize = 464;
pub const N_LAT: usize = 224;

const BOUNDS_TEXT: &str = "(-125.0, 25.0, -67.0, 53.0)";

pub fn lon_center(i: usize) -> f64 {
    BOUNDS.0 + RESOLUTION * (i as f64 + 0.5)
}

pub fn lat_center(j: usize) -> f64 {
    BOUNDS.1 + RESOLUTION * (j as f64 + 0.5)
}

fn cell(i: usize, j: usize) -> Rect<f64> {
    let (w, s) = (BOUNDS.0 + RESOLUTION * i as f64, BOUNDS.1 + RESOLUTION * j as f64);
    Rect::new(coord! { x: w, y: s }, coord! { x: w + RESOLUTION, y: s + RESOLUTION })
}

fn in_bounds(lon: f64, lat: f64) -> bool {
    lon >= BOUNDS.0 && lon <= BOUNDS.2 && lat >= BOUNDS.1 && lat <= BOUNDS.3
}

/// Checks that every `(lon, lat)` lies within the grid extent.
pub(crate) fn validate_coords(coords: &[(f64, f64)]) -> Result<(), Nldas2Error> {
    if coords.is_empty() {
        return Err(Nldas2Error::input_type(
            "coords",
            "list of (lon, lat) pairs",
            "[(lon, lat), ...]",
        ));
    }
    if coords
        .iter()
        .any(|&(lon, lat)| !lon.is_finite() || !lat.is_finite() || !in_bounds(lon, lat))
    {
        return Err(Nldas2Error::input_range("coords", BOUNDS_TEXT));
    }
    Ok(())
}

/// Parses a `"lon,lat"` pair.
pub fn parse_coord(s: &str) -> Result<(f64, f64), Nldas2Error> {
    let bad = || Nldas2Error::input_type("coords", "lon,lat pair", "-100.5,40.25");
    let (lon, lat) = s.split_once(',').ok_or_else(bad)?;
    let lon: f64 = lon.trim().parse().map_err(|_| bad())?;
    let lat: f64 = lat.trim().parse().map_err(|_| bad())?;
    Ok((lon, lat))
}

/// Input geometry accepted by the geometry-based queries.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl Geometry {
    /// Axis-aligned rectangle as a polygon.
    pub fn from_bbox(west: f64, south: f64, east: f64, north: f64) -> Self {
        Geometry::Polygon(Rect::new(coord! { x: west, y: south }, coord! { x: east, y: north }).to_polygon())
    }

    pub(crate) fn to_multi(&self) -> MultiPolygon<f64> {
        match self {
            Geometry::Polygon(p) => MultiPolygon::new(vec![p.clone()]),
            Geometry::MultiPolygon(mp) => mp.clone(),
        }
    }
}

impl From<Polygon<f64>> for Geometry {
    fn from(p: Polygon<f64>) -> Self {
        Geometry::Polygon(p)
    }
}

impl From<MultiPolygon<f64>> for Geometry {
    fn from(mp: MultiPolygon<f64>) -> Self {
        Geometry::MultiPolygon(mp)
    }
}

/// Grid cells touched by a geometry, within its clipped window.
///
/// `lon`/`lat` are the cell centers of the window (ascending); `mask[[j, i]]`
/// is true when cell `(lon[i], lat[j])` intersects the geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct GridMask {
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
    pub mask: Array2<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridMaskSummary {
    pub n_lon: usize,
    pub n_lat: usize,
    pub touched: usize,
    pub bounds: (f64, f64, f64, f64),
}

impl GridMask {
    /// Cell centers of the touched cells as `(lon, lat)`, lon-major.
    pub fn points(&self) -> Vec<(f64, f64)> {
        let mut out = Vec::new();
        for (i, &lon) in self.lon.iter().enumerate() {
            for (j, &lat) in self.lat.iter().enumerate() {
                if self.mask[[j, i]] {
                    out.push((lon, lat));
                }
            }
        }
        out
    }

    pub fn touched(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }

    pub fn summary(&self) -> GridMaskSummary {
        let half = RESOLUTION / 2.0;
        let first = |v: &[f64]| v.first().copied().unwrap_or(f64::NAN);
        let last = |v: &[f64]| v.last().copied().unwrap_or(f64::NAN);
        GridMaskSummary {
            n_lon: self.lon.len(),
            n_lat: self.lat.len(),
            touched: self.touched(),
            bounds: (
                first(&self.lon) - half,
                first(&self.lat) - half,
                last(&self.lon) + half,
                last(&self.lat) + half,
            ),
        }
    }
}

/// Computes the mask of NLDAS2 cells touched by `geometry` given in `crs`.
///
/// A cell counts as touched when it shares area with the geometry; cells that
/// only meet it along an edge or at a corner are left out.
pub fn get_grid_mask(geometry: &Geometry, crs: Crs) -> anyhow::Result<GridMask> {
    let geom = crs.reproject(&geometry.to_multi());
    let outside = || Nldas2Error::input_range("geometry", BOUNDS_TEXT);

    let rect = geom.bounding_rect().ok_or_else(outside)?;
    let (min, max) = (rect.min(), rect.max());
    if ![min.x, min.y, max.x, max.y].iter().all(|v| v.is_finite()) {
        return Err(outside().into());
    }
    if max.x < BOUNDS.0 || min.x > BOUNDS.2 || max.y < BOUNDS.1 || min.y > BOUNDS.3 {
        return Err(outside().into());
    }

    let index = |v: f64, origin: f64, n: usize| -> usize {
        (((v - origin) / RESOLUTION).floor().max(0.0) as usize).min(n - 1)
    };
    let (i0, i1) = (index(min.x, BOUNDS.0, N_LON), index(max.x, BOUNDS.0, N_LON));
    let (j0, j1) = (index(min.y, BOUNDS.1, N_LAT), index(max.y, BOUNDS.1, N_LAT));

    let mut touched = Vec::new();
    for i in i0..=i1 {
        for j in j0..=j1 {
            let c = cell(i, j).to_polygon();
            if geom.0.iter().any(|p| shares_area(p, &c)) {
                touched.push((i, j));
            }
        }
    }
    if touched.is_empty() {
        return Err(outside().into());
    }

    // Clip the window to the touched cells.
    let (ci0, ci1) = minmax(touched.iter().map(|t| t.0));
    let (cj0, cj1) = minmax(touched.iter().map(|t| t.1));
    let lon: Vec<f64> = (ci0..=ci1).map(lon_center).collect();
    let lat: Vec<f64> = (cj0..=cj1).map(lat_center).collect();
    let mut mask = Array2::from_elem((lat.len(), lon.len()), false);
    for (i, j) in touched {
        mask[[j - cj0, i - ci0]] = true;
    }

    log::debug!(
        "geometry touches {} of {} cells in its window",
        mask.iter().filter(|&&m| m).count(),
        mask.len()
    );
    Ok(GridMask { lon, lat, mask })
}

fn shares_area(a: &Polygon<f64>, b: &Polygon<f64>) -> bool {
    let m = a.relate(b);
    m.is_intersects() && !m.is_touches()
}

fn minmax(it: impl Iterator<Item = usize>) -> (usize, usize) {
    it.fold((usize::MAX, 0), |(lo, hi), v| (lo.min(v), hi.max(v)))
}
