use anyhow::Result;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::error::Nldas2Error;
use crate::snow::SnowParams;
use crate::variables::Variable;

/// Longest span the service accepts in one time-series request.
pub(crate) const MAX_CHUNK_DAYS: i64 = 10_000;

const SERVICE_TIME_FORMAT: &str = "%Y-%m-%dT%H";
const VALID_RANGE: &str = "1979-01-01 to yesterday";

/// First hour of the NLDAS2 forcing record.
pub(crate) fn record_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1979, 1, 1)
        .and_then(|d| d.and_hms_opt(13, 0, 0))
        .unwrap_or_default()
}

/// A parsed date bound and whether it carried a time of day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct DateBound {
    pub(crate) at: NaiveDateTime,
    pub(crate) date_only: bool,
}

/// Parses `YYYY-MM-DD` with an optional `T`/space separated `HH`, `HH:MM` or
/// `HH:MM:SS` suffix.
pub(crate) fn parse_date(name: &str, s: &str) -> Result<DateBound, Nldas2Error> {
    let bad = || Nldas2Error::input_type(name, "date string", "2010-01-01 or 2010-01-01T06");
    let s = s.trim();
    let (date_part, time_part) = match s.find(['T', ' ']) {
        Some(idx) => (&s[..idx], Some(s[idx + 1..].trim())),
        None => (s, None),
    };

    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| bad())?;
    let Some(time_part) = time_part else {
        return Ok(DateBound {
            at: date.and_time(NaiveTime::MIN),
            date_only: true,
        });
    };

    let mut fields = [0u32; 3];
    let parts: Vec<&str> = time_part.split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return Err(bad());
    }
    for (slot, part) in fields.iter_mut().zip(&parts) {
        if part.is_empty() || part.len() > 2 {
            return Err(bad());
        }
        *slot = part.parse().map_err(|_| bad())?;
    }
    let time = NaiveTime::from_hms_opt(fields[0], fields[1], fields[2]).ok_or_else(bad)?;
    Ok(DateBound {
        at: date.and_time(time),
        date_only: false,
    })
}

/// Validated request window.
///
/// `start..=end` is the window returned to callers. The service is queried up
/// to `request_end`, one day past the parsed end bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TimeRange {
    pub(crate) start: NaiveDateTime,
    pub(crate) end: NaiveDateTime,
    pub(crate) request_end: NaiveDateTime,
}

impl TimeRange {
    pub(crate) fn new(start_date: &str, end_date: &str, now: NaiveDateTime) -> Result<Self> {
        let start = parse_date("start_date", start_date)?;
        let end = parse_date("end_date", end_date)?;

        let request_end = end.at + Duration::days(1);
        if start.at < record_start() {
            return Err(Nldas2Error::input_range("start_date", VALID_RANGE).into());
        }
        if request_end > now - Duration::days(1) {
            return Err(Nldas2Error::input_range("end_date", VALID_RANGE).into());
        }
        if start.at > end.at {
            return Err(Nldas2Error::input_range("start_date", "before end_date").into());
        }

        let last = if end.date_only {
            end.at + Duration::days(1) - Duration::seconds(1)
        } else {
            end.at
        };

        Ok(Self {
            start: start.at,
            end: last,
            request_end,
        })
    }

    pub(crate) fn contains(&self, t: NaiveDateTime) -> bool {
        t >= self.start && t <= self.end
    }

    /// Consecutive `(start, end)` pairs no longer than [`MAX_CHUNK_DAYS`].
    pub(crate) fn chunks(&self) -> Vec<(NaiveDateTime, NaiveDateTime)> {
        let step = Duration::days(MAX_CHUNK_DAYS);
        let mut bounds = Vec::new();
        let mut t = self.start;
        while t <= self.request_end {
            bounds.push(t);
            t += step;
        }
        if bounds.last().is_some_and(|last| *last < self.request_end) {
            bounds.push(self.request_end);
        }
        bounds.windows(2).map(|w| (w[0], w[1])).collect()
    }
}

/// What to fetch: a date window, the variables, and optional post-processing.
///
/// ```
/// use nldas2::{ForcingQuery, SnowParams};
///
/// let query = ForcingQuery::new("2000-01-01", "2000-01-12")
///     .variables(["prcp", "temp"])
///     .snow(SnowParams::default());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ForcingQuery {
    start_date: String,
    end_date: String,
    variables: Option<Vec<String>>,
    snow: Option<SnowParams>,
    celsius: bool,
}

impl ForcingQuery {
    /// Both bounds are inclusive; a date-only `end_date` covers the whole day.
    pub fn new(start_date: impl Into<String>, end_date: impl Into<String>) -> Self {
        Self {
            start_date: start_date.into(),
            end_date: end_date.into(),
            variables: None,
            snow: None,
            celsius: false,
        }
    }

    /// Restricts the request to these short names (see [`Variable`]).
    pub fn variables<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Adds a `snow` column; `prcp` and `temp` are fetched even if not listed.
    pub fn snow(mut self, params: SnowParams) -> Self {
        self.snow = Some(params);
        self
    }

    /// Reports `temp` in °C instead of K.
    pub fn celsius(mut self, on: bool) -> Self {
        self.celsius = on;
        self
    }

    pub(crate) fn resolve(&self, now: NaiveDateTime) -> Result<ResolvedQuery> {
        let range = TimeRange::new(&self.start_date, &self.end_date, now)?;
        let mut variables = Variable::resolve(self.variables.as_deref())?;
        if let Some(params) = &self.snow {
            params.validate()?;
            for v in [Variable::Prcp, Variable::Temp] {
                if !variables.contains(&v) {
                    variables.push(v);
                }
            }
        }
        Ok(ResolvedQuery {
            range,
            variables,
            snow: self.snow,
            celsius: self.celsius,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedQuery {
    pub(crate) range: TimeRange,
    pub(crate) variables: Vec<Variable>,
    pub(crate) snow: Option<SnowParams>,
    pub(crate) celsius: bool,
}

/// Query parameters of one time-series request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ServiceQuery {
    #[serde(rename = "type")]
    pub(crate) kind: &'static str,
    pub(crate) location: String,
    pub(crate) variable: String,
    #[serde(rename = "startDate")]
    pub(crate) start_date: String,
    #[serde(rename = "endDate")]
    pub(crate) end_date: String,
}

impl ServiceQuery {
    pub(crate) fn new(
        lon: f64,
        lat: f64,
        variable: Variable,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Self {
        Self {
            kind: "asc2",
            location: format!("GEOM:POINT({:?}, {:?})", lon, lat),
            variable: variable.service_id(),
            start_date: start.format(SERVICE_TIME_FORMAT).to_string(),
            end_date: end.format(SERVICE_TIME_FORMAT).to_string(),
        }
    }

    /// NLDAS name of the requested variable (the text after the last `:`).
    pub(crate) fn nldas_name(&self) -> &str {
        self.variable.rsplit(':').next().unwrap_or(&self.variable)
    }

    pub(crate) fn point(&self) -> Option<(f64, f64)> {
        let inner = self.location.split('(').nth(1)?.trim_end_matches(')');
        let (lon, lat) = inner.split_once(',')?;
        Some((lon.trim().parse().ok()?, lat.trim().parse().ok()?))
    }
}

/// Builds the product of points, date chunks and variables, in that nesting order.
pub(crate) fn build_queries(
    points: &[(f64, f64)],
    range: &TimeRange,
    variables: &[Variable],
) -> Vec<ServiceQuery> {
    let chunks = range.chunks();
    let mut out = Vec::with_capacity(points.len() * chunks.len() * variables.len());
    for &(lon, lat) in points {
        for &(s, e) in &chunks {
            for &v in variables {
                out.push(ServiceQuery::new(lon, lat, v, s, e));
            }
        }
    }
    out
}
