use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use ndarray::{Array3, Axis, Slice};

use crate::frame::{TIME_FORMAT, format_value};
use crate::grid::RESOLUTION;
use crate::variables::VariableAttrs;

#[derive(Debug, Clone, PartialEq)]
pub struct DataVariable {
    pub attrs: VariableAttrs,
    /// Indexed `[time, y, x]`.
    pub values: Array3<f64>,
}

/// Affine transform in GDAL order: `x = c + a*col + b*row`, `y = f + d*col + e*row`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub c: f64,
    pub a: f64,
    pub b: f64,
    pub f: f64,
    pub d: f64,
    pub e: f64,
}

impl GeoTransform {
    /// Transform of a regular grid from its cell-center coordinates.
    pub fn from_centers(x: &[f64], y: &[f64]) -> Option<Self> {
        let dx = spacing(x)?;
        let dy = spacing(y)?;
        Some(Self {
            c: x[0] - dx / 2.0,
            a: dx,
            b: 0.0,
            f: y[0] - dy / 2.0,
            d: 0.0,
            e: dy,
        })
    }
}

impl fmt::Display for GeoTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.c, self.a, self.b, self.f, self.d, self.e
        )
    }
}

/// Uniform spacing of `v`, or the grid resolution for a single value.
fn spacing(v: &[f64]) -> Option<f64> {
    match v {
        [] => None,
        [_] => Some(RESOLUTION),
        [first, second, ..] => {
            let step = second - first;
            let regular = v.windows(2).all(|w| ((w[1] - w[0]) - step).abs() < 1e-9);
            regular.then_some(step)
        }
    }
}

/// Hourly forcing as labeled 3-D arrays with dims `(time, y, x)`.
///
/// The spatial dims are named `lat`/`lon` for coordinate queries and `y`/`x`
/// for geometry queries; their values are always WGS84 degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct ForcingDataset {
    pub time: Vec<NaiveDateTime>,
    pub y: Vec<f64>,
    pub x: Vec<f64>,
    pub y_name: String,
    pub x_name: String,
    pub data_vars: Vec<(String, DataVariable)>,
    pub attrs: BTreeMap<String, String>,
}

impl ForcingDataset {
    pub(crate) fn new(
        time: Vec<NaiveDateTime>,
        y: Vec<f64>,
        x: Vec<f64>,
        y_name: &str,
        x_name: &str,
        data_vars: Vec<(String, DataVariable)>,
    ) -> Self {
        let mut attrs = BTreeMap::new();
        attrs.insert("tz".to_string(), "UTC".to_string());
        attrs.insert("crs".to_string(), "EPSG:4326".to_string());
        if let Some(t) = GeoTransform::from_centers(&x, &y) {
            attrs.insert("transform".to_string(), t.to_string());
        }
        Self {
            time,
            y,
            x,
            y_name: y_name.to_string(),
            x_name: x_name.to_string(),
            data_vars,
            attrs,
        }
    }

    pub fn dims(&self) -> [&str; 3] {
        ["time", self.y_name.as_str(), self.x_name.as_str()]
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.time.len(), self.y.len(), self.x.len())
    }

    pub fn crs(&self) -> &str {
        self.attrs.get("crs").map(String::as_str).unwrap_or("EPSG:4326")
    }

    pub fn transform(&self) -> Option<GeoTransform> {
        GeoTransform::from_centers(&self.x, &self.y)
    }

    pub fn names(&self) -> Vec<&str> {
        self.data_vars.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn variable(&self, name: &str) -> Option<&DataVariable> {
        self.data_vars
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Keeps time steps within `start..=end`.
    pub fn select_time(&self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        let lo = self.time.partition_point(|t| *t < start);
        let hi = self.time.partition_point(|t| *t <= end).max(lo);
        let data_vars = self
            .data_vars
            .iter()
            .map(|(n, v)| {
                (
                    n.clone(),
                    DataVariable {
                        attrs: v.attrs.clone(),
                        values: v.values.slice_axis(Axis(0), Slice::from(lo..hi)).to_owned(),
                    },
                )
            })
            .collect();
        Self {
            time: self.time[lo..hi].to_vec(),
            data_vars,
            ..self.clone()
        }
    }

    /// Writes the dataset in long form: `time,<y>,<x>,<vars...>`.
    ///
    /// Cells where every variable is NaN are skipped.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut w = csv::Writer::from_writer(writer);
        let mut header = vec![
            "time".to_string(),
            self.y_name.clone(),
            self.x_name.clone(),
        ];
        header.extend(self.data_vars.iter().map(|(n, _)| n.clone()));
        w.write_record(&header)?;

        for (ti, t) in self.time.iter().enumerate() {
            for (yi, y) in self.y.iter().enumerate() {
                for (xi, x) in self.x.iter().enumerate() {
                    let values: Vec<f64> = self
                        .data_vars
                        .iter()
                        .map(|(_, v)| v.values[[ti, yi, xi]])
                        .collect();
                    if values.iter().all(|v| v.is_nan()) {
                        continue;
                    }
                    let mut record =
                        vec![t.format(TIME_FORMAT).to_string(), y.to_string(), x.to_string()];
                    record.extend(values.into_iter().map(format_value));
                    w.write_record(&record)?;
                }
            }
        }
        w.flush().context("failed to flush CSV output")?;
        Ok(())
    }
}
