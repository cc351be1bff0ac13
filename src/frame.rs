use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;

use crate::dataset::{DataVariable, ForcingDataset};
use crate::parse::Series;
use crate::request::TimeRange;
use crate::snow::{SnowParams, kelvin_to_celsius};
use crate::variables::{Variable, VariableAttrs};

pub(crate) const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Row label of a [`ForcingFrame`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameIndex {
    pub lon: f64,
    pub lat: f64,
    pub time: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub attrs: VariableAttrs,
    pub values: Vec<f64>,
}

/// Hourly forcing in long form: one row per `(lon, lat, time)`, one column per variable.
///
/// Rows are grouped by location in request order and sorted by time within a
/// location. Missing samples are NaN.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ForcingFrame {
    index: Vec<FrameIndex>,
    columns: Vec<Column>,
}

impl ForcingFrame {
    /// Merges the series fetched for one location.
    ///
    /// Chunks of the same variable are concatenated, every variable is
    /// aligned on the union of timestamps, and rows outside `range` are
    /// dropped.
    pub(crate) fn from_point(
        lon: f64,
        lat: f64,
        variables: &[Variable],
        series: Vec<Series>,
        range: &TimeRange,
    ) -> Self {
        let mut per_var: BTreeMap<&str, BTreeMap<NaiveDateTime, f64>> = BTreeMap::new();
        for s in &series {
            let entry = per_var.entry(s.name.as_str()).or_default();
            for (t, v) in s.times.iter().zip(&s.values) {
                entry.insert(*t, *v);
            }
        }

        let times: BTreeSet<NaiveDateTime> = per_var
            .values()
            .flat_map(|m| m.keys().copied())
            .filter(|t| range.contains(*t))
            .collect();

        let index = times
            .iter()
            .map(|&time| FrameIndex { lon, lat, time })
            .collect();
        let columns = variables
            .iter()
            .map(|v| {
                let samples = per_var.get(v.nldas_name());
                let values = times
                    .iter()
                    .map(|t| samples.and_then(|m| m.get(t)).copied().unwrap_or(f64::NAN))
                    .collect();
                Column {
                    name: v.name().to_string(),
                    attrs: v.attrs(),
                    values,
                }
            })
            .collect();

        Self { index, columns }
    }

    /// Stacks frames with identical columns, keeping their order.
    pub(crate) fn concat(frames: Vec<ForcingFrame>) -> Result<Self> {
        let mut iter = frames.into_iter();
        let Some(mut out) = iter.next() else {
            return Ok(Self::default());
        };
        for frame in iter {
            let same = out.columns.len() == frame.columns.len()
                && out
                    .columns
                    .iter()
                    .zip(&frame.columns)
                    .all(|(a, b)| a.name == b.name);
            if !same {
                bail!("cannot concatenate frames with different columns");
            }
            out.index.extend(frame.index);
            for (a, b) in out.columns.iter_mut().zip(frame.columns) {
                a.values.extend(b.values);
            }
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[FrameIndex] {
        &self.index
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Appends a `snow` column computed from `prcp` and `temp`.
    ///
    /// Must run before `temp` is converted to °C.
    pub(crate) fn add_snow(&mut self, params: &SnowParams) -> Result<()> {
        let prcp = self.column("prcp").context("snow requires the prcp column")?;
        let temp = self.column("temp").context("snow requires the temp column")?;
        let values = params.snow_from_kelvin(prcp, temp);
        let units = self
            .columns
            .iter()
            .find(|c| c.name == "prcp")
            .map(|c| c.attrs.units.clone())
            .unwrap_or_else(|| "mm".to_string());
        self.columns.push(Column {
            name: "snow".to_string(),
            attrs: VariableAttrs::new("", "Snow precipitation", &units),
            values,
        });
        Ok(())
    }

    pub(crate) fn temp_to_celsius(&mut self) {
        if let Some(col) = self.columns.iter_mut().find(|c| c.name == "temp") {
            col.values.iter_mut().for_each(|v| *v = kelvin_to_celsius(*v));
            col.attrs.units = "degC".to_string();
        }
    }

    /// Writes `lon,lat,time,<columns...>` rows.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut w = csv::Writer::from_writer(writer);
        let mut header = vec!["lon".to_string(), "lat".to_string(), "time".to_string()];
        header.extend(self.columns.iter().map(|c| c.name.clone()));
        w.write_record(&header)?;

        for (row, ix) in self.index.iter().enumerate() {
            let mut record = vec![
                ix.lon.to_string(),
                ix.lat.to_string(),
                ix.time.format(TIME_FORMAT).to_string(),
            ];
            record.extend(self.columns.iter().map(|c| format_value(c.values[row])));
            w.write_record(&record)?;
        }
        w.flush().context("failed to flush CSV output")?;
        Ok(())
    }

    /// Pivots into a labeled dataset with dims `(time, lat, lon)`.
    pub fn to_dataset(&self) -> ForcingDataset {
        let mut lons: Vec<f64> = self.index.iter().map(|ix| ix.lon).collect();
        let mut lats: Vec<f64> = self.index.iter().map(|ix| ix.lat).collect();
        sort_dedup(&mut lons);
        sort_dedup(&mut lats);
        self.pivot(lons, lats, "lat", "lon")
    }

    /// Pivots onto a fixed grid window; rows whose location is not in the
    /// window are dropped.
    pub(crate) fn pivot(
        &self,
        x: Vec<f64>,
        y: Vec<f64>,
        y_name: &str,
        x_name: &str,
    ) -> ForcingDataset {
        let times: Vec<NaiveDateTime> = self
            .index
            .iter()
            .map(|ix| ix.time)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let t_pos: BTreeMap<NaiveDateTime, usize> =
            times.iter().enumerate().map(|(i, t)| (*t, i)).collect();

        let shape = (times.len(), y.len(), x.len());
        let mut data_vars: Vec<(String, DataVariable)> = self
            .columns
            .iter()
            .map(|c| {
                (
                    c.name.clone(),
                    DataVariable {
                        attrs: c.attrs.clone(),
                        values: ndarray::Array3::from_elem(shape, f64::NAN),
                    },
                )
            })
            .collect();

        for (row, ix) in self.index.iter().enumerate() {
            let (Some(yi), Some(xi)) = (position(&y, ix.lat), position(&x, ix.lon)) else {
                continue;
            };
            let ti = t_pos[&ix.time];
            for (col, (_, var)) in self.columns.iter().zip(data_vars.iter_mut()) {
                var.values[[ti, yi, xi]] = col.values[row];
            }
        }

        ForcingDataset::new(times, y, x, y_name, x_name, data_vars)
    }
}

fn sort_dedup(v: &mut Vec<f64>) {
    v.sort_by(f64::total_cmp);
    v.dedup();
}

fn position(coords: &[f64], v: f64) -> Option<usize> {
    coords.iter().position(|c| (c - v).abs() < 1e-9)
}

pub(crate) fn format_value(v: f64) -> String {
    if v.is_nan() { String::new() } else { v.to_string() }
}
