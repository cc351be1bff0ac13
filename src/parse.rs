use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{Nldas2Error, service_error_from_body};

/// Fill value the service writes for missing samples.
pub(crate) const FILL_VALUE: f64 = -9999.0;

const HEADER_MARKER: &str = "Date&Time";

/// One hourly series for a single point and variable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Series {
    /// NLDAS variable name, e.g. `TMP2m`.
    pub name: String,
    pub times: Vec<NaiveDateTime>,
    pub values: Vec<f64>,
}

impl Series {
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// Parses an `asc2` time-series body.
///
/// Data rows follow the `Date&Time` header line and come in two layouts:
/// `YYYY-MM-DD HHZ value` or `YYYY-MM-DDTHH:MM:SS value`.
/// A body that is not blank but has no header is a failure page.
pub(crate) fn parse_asc2(body: &str, name: &str) -> Result<Series, Nldas2Error> {
    if body.trim().is_empty() {
        return Ok(Series::empty(name));
    }

    let mut lines = body.lines();
    if !lines.by_ref().any(|l| l.trim_start().starts_with(HEADER_MARKER)) {
        return Err(service_error_from_body(body));
    }

    let mut series = Series::empty(name);
    for line in lines {
        let Some((time, value)) = parse_row(line) else {
            continue;
        };
        if value.is_nan() || value == FILL_VALUE {
            continue;
        }
        series.times.push(time);
        series.values.push(value);
    }
    Ok(series)
}

fn parse_row(line: &str) -> Option<(NaiveDateTime, f64)> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    match fields.as_slice() {
        [date, hour, value] => {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
            let hour: u32 = hour.trim_end_matches(['Z', 'z']).parse().ok()?;
            let time = NaiveTime::from_hms_opt(hour, 0, 0)?;
            Some((date.and_time(time), value.parse().ok()?))
        }
        [stamp, value] => {
            let stamp = stamp.trim_end_matches(['Z', 'z']);
            let time = NaiveDateTime::parse_from_str(stamp, "%Y-%m-%dT%H:%M:%S").ok()?;
            Some((time, value.parse().ok()?))
        }
        _ => None,
    }
}
