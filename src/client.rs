use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::thread;
use std::time::Duration;

use crate::config::{ConfigOverrides, load_config};
use crate::crs::Crs;
use crate::dataset::ForcingDataset;
use crate::error::format_http_error;
use crate::frame::ForcingFrame;
use crate::grid::{Geometry, get_grid_mask, validate_coords};
use crate::parse::parse_asc2;
use crate::request::{ForcingQuery, ResolvedQuery, ServiceQuery, build_queries};
use crate::util::{backoff, retriable_status};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Time-series service URL, typically the GES DISC `timeseries.cgi` endpoint.
    pub url: String,
    /// Optional Earthdata Login bearer token.
    pub token: Option<String>,
    /// Whether to verify TLS certificates.
    pub verify: bool,
    /// Number of concurrent requests.
    pub max_workers: usize,
    /// Per-request timeout.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Client {
    url: String,
    token: Option<String>,

    max_workers: usize,
    retry_max: usize,
    sleep_max: Duration,
    progress: bool,

    http: HttpClient,
}

impl Client {
    /// Creates a client using environment variables and/or `.nldas2rc`.
    ///
    /// This is equivalent to `Client::new(ConfigOverrides::default())`.
    pub fn from_env() -> Result<Self> {
        Self::new(ConfigOverrides::default())
    }

    /// Creates a client using (in order of precedence):
    /// - explicit `overrides`
    /// - environment variables `NLDAS2_URL`, `NLDAS2_TOKEN`, `NLDAS2_VERIFY`,
    ///   `NLDAS2_MAX_WORKERS`, `NLDAS2_TIMEOUT`
    /// - config file from `NLDAS2_RC` or `.nldas2rc`
    /// - built-in defaults
    pub fn new(overrides: ConfigOverrides) -> Result<Self> {
        Self::from_config(load_config(overrides)?)
    }

    pub fn from_config(cfg: ClientConfig) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("nldas2-rs/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("nldas2-rs")),
        );

        let mut builder = HttpClient::builder()
            .default_headers(default_headers)
            .timeout(cfg.timeout);

        if !cfg.verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder.build().context("failed to build HTTP client")?;

        Ok(Self {
            url: cfg.url,
            token: cfg.token,
            max_workers: cfg.max_workers.max(1),
            retry_max: 5,
            sleep_max: Duration::from_secs(30),
            progress: true,
            http,
        })
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_retry_max(mut self, retry_max: usize) -> Self {
        self.retry_max = retry_max.max(1);
        self
    }

    pub fn with_sleep_max(mut self, sleep_max: Duration) -> Self {
        self.sleep_max = sleep_max;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Hourly forcing for a single location.
    pub fn get_byloc(&self, lon: f64, lat: f64, query: &ForcingQuery) -> Result<ForcingFrame> {
        self.get_bycoords(&[(lon, lat)], query)
    }

    /// Hourly forcing for a list of `(lon, lat)` coordinates, as a long-form frame.
    pub fn get_bycoords(&self, coords: &[(f64, f64)], query: &ForcingQuery) -> Result<ForcingFrame> {
        validate_coords(coords)?;
        let resolved = query.resolve(chrono::Utc::now().naive_utc())?;
        self.fetch_points(coords, &resolved)
    }

    /// Same as [`Client::get_bycoords`] but pivoted to dims `(time, lat, lon)`.
    pub fn get_bycoords_dataset(
        &self,
        coords: &[(f64, f64)],
        query: &ForcingQuery,
    ) -> Result<ForcingDataset> {
        Ok(self.get_bycoords(coords, query)?.to_dataset())
    }

    /// Hourly forcing for every 0.125° cell the geometry touches.
    ///
    /// The result covers the clipped window of touched cells with dims
    /// `(time, y, x)`; untouched cells inside the window are NaN.
    pub fn get_bygeom(
        &self,
        geometry: &Geometry,
        geo_crs: Crs,
        query: &ForcingQuery,
    ) -> Result<ForcingDataset> {
        let resolved = query.resolve(chrono::Utc::now().naive_utc())?;
        let mask = get_grid_mask(geometry, geo_crs)?;
        log::info!(
            "geometry touches {} NLDAS2 cells ({} x {} window)",
            mask.touched(),
            mask.lon.len(),
            mask.lat.len()
        );

        let frame = self.fetch_points(&mask.points(), &resolved)?;
        Ok(frame.pivot(mask.lon, mask.lat, "y", "x"))
    }

    fn fetch_points(&self, points: &[(f64, f64)], q: &ResolvedQuery) -> Result<ForcingFrame> {
        let queries = build_queries(points, &q.range, &q.variables);
        log::info!(
            "requesting {} series ({} points, {} variables)",
            queries.len(),
            points.len(),
            q.variables.len()
        );
        let bodies = self.fetch_all(&queries)?;

        let per_point = queries.len() / points.len().max(1);
        let mut frames = Vec::with_capacity(points.len());
        for (p, &(lon, lat)) in points.iter().enumerate() {
            let range = p * per_point..(p + 1) * per_point;
            let mut series = Vec::with_capacity(per_point);
            for (query, body) in queries[range.clone()].iter().zip(&bodies[range]) {
                let parsed = parse_asc2(body, query.nldas_name()).with_context(|| {
                    format!("failed to parse {} at {:?}", query.nldas_name(), query.point())
                })?;
                series.push(parsed);
            }
            frames.push(ForcingFrame::from_point(lon, lat, &q.variables, series, &q.range));
        }

        let mut frame = ForcingFrame::concat(frames)?;
        if let Some(params) = &q.snow {
            frame.add_snow(params)?;
        }
        if q.celsius {
            frame.temp_to_celsius();
        }
        Ok(frame)
    }

    /// Fetches every query on a pool of `max_workers` threads, preserving order.
    fn fetch_all(&self, queries: &[ServiceQuery]) -> Result<Vec<String>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_workers)
            .build()
            .context("failed to build worker pool")?;

        let pb = if self.progress && queries.len() > 1 {
            let pb = ProgressBar::new(queries.len() as u64);
            pb.set_style(
                ProgressStyle::with_template("{spinner:.green} {pos}/{len} series {wide_bar} {eta}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
            );
            Some(pb)
        } else {
            None
        };

        let bodies = pool.install(|| {
            queries
                .par_iter()
                .map(|q| {
                    let body = self.fetch_text(q);
                    if let Some(pb) = &pb {
                        pb.inc(1);
                    }
                    body
                })
                .collect::<Result<Vec<_>>>()
        });

        if let Some(pb) = &pb {
            pb.finish_and_clear();
        }
        bodies
    }

    fn fetch_text(&self, query: &ServiceQuery) -> Result<String> {
        log::debug!(
            "GET {} variable={} location={} {}..{}",
            self.url,
            query.variable,
            query.location,
            query.start_date,
            query.end_date
        );
        let resp = self.robust_request(|| self.apply_auth(self.http.get(&self.url).query(query)).send())?;

        let status = resp.status();
        let url = resp.url().to_string();
        let text = resp
            .text()
            .with_context(|| format!("failed to read response body from {}", url))?;
        if !status.is_success() {
            return Err(format_http_error(status, &url, &text).into());
        }
        Ok(text)
    }

    fn apply_auth(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token.trim()),
            None => req,
        }
    }

    fn robust_request<F>(&self, mut f: F) -> Result<Response>
    where
        F: FnMut() -> std::result::Result<Response, reqwest::Error>,
    {
        let mut tries = 0usize;
        let mut sleep = Duration::from_secs(1);
        loop {
            let result = f();

            match result {
                Ok(resp) => {
                    if retriable_status(resp.status().as_u16()) {
                        tries += 1;
                        if tries >= self.retry_max {
                            return Ok(resp);
                        }
                        log::warn!(
                            "HTTP {} from {}, retrying in {:?}",
                            resp.status(),
                            resp.url(),
                            sleep
                        );
                        thread::sleep(sleep);
                        sleep = backoff(sleep, self.sleep_max);
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    tries += 1;
                    if tries >= self.retry_max {
                        return Err(err).context("could not connect to the NLDAS2 service");
                    }
                    // timeouts / transient connection errors
                    log::warn!("request failed ({}), retrying in {:?}", err, sleep);
                    thread::sleep(sleep);
                    sleep = backoff(sleep, self.sleep_max);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Nldas2Error;

    fn client() -> Client {
        Client::from_config(ClientConfig {
            url: "http://127.0.0.1:9/timeseries.cgi".to_string(),
            token: None,
            verify: true,
            max_workers: 2,
            timeout: Duration::from_secs(1),
        })
        .unwrap()
        .with_progress(false)
        .with_retry_max(1)
    }

    fn domain_error(err: &anyhow::Error) -> &Nldas2Error {
        err.downcast_ref::<Nldas2Error>().expect("domain error")
    }

    #[test]
    fn empty_coords_are_rejected_before_any_request() {
        let err = client()
            .get_bycoords(&[], &ForcingQuery::new("2000-01-01", "2000-01-02"))
            .unwrap_err();
        assert!(matches!(domain_error(&err), Nldas2Error::InputType { name, .. } if name == "coords"));
    }

    #[test]
    fn out_of_grid_coords_are_rejected() {
        let err = client()
            .get_byloc(2.35, 48.85, &ForcingQuery::new("2000-01-01", "2000-01-02"))
            .unwrap_err();
        assert!(matches!(domain_error(&err), Nldas2Error::InputRange { name, .. } if name == "coords"));
    }

    #[test]
    fn bad_variable_is_rejected() {
        let query = ForcingQuery::new("2000-01-01", "2000-01-02").variables(["prcp", "tmax"]);
        let err = client().get_byloc(-100.0, 40.0, &query).unwrap_err();
        assert!(matches!(domain_error(&err), Nldas2Error::InputValue { .. }));
    }

    #[test]
    fn geometry_dates_checked_first() {
        let g = Geometry::from_bbox(-100.1, 40.1, -99.9, 40.2);
        let err = client()
            .get_bygeom(&g, Crs::Epsg4326, &ForcingQuery::new("1975-01-01", "1975-01-02"))
            .unwrap_err();
        assert!(matches!(domain_error(&err), Nldas2Error::InputRange { name, .. } if name == "start_date"));
    }

    #[test]
    fn unreachable_service_is_a_connection_error() {
        let err = client()
            .get_byloc(-100.0, 40.0, &ForcingQuery::new("2000-01-01", "2000-01-01").variables(["prcp"]))
            .unwrap_err();
        assert!(err.downcast_ref::<Nldas2Error>().is_none());
        assert!(format!("{err:#}").contains("could not connect"));
    }
}
