//! End-to-end fetch tests against a local HTTP server that speaks just enough
//! of the time-series service: one `asc2` body per GET, chosen by a handler.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use nldas2::geo_types::polygon;
use nldas2::{Client, ClientConfig, Crs, ForcingQuery, Geometry, Nldas2Error};

#[derive(Debug)]
struct Request {
    params: HashMap<String, String>,
    headers: HashMap<String, String>,
}

impl Request {
    fn param(&self, key: &str) -> &str {
        self.params.get(key).map(String::as_str).unwrap_or("")
    }

    /// `(lon, lat)` from `GEOM:POINT(lon, lat)`.
    fn point(&self) -> (f64, f64) {
        let inner = self
            .param("location")
            .trim_start_matches("GEOM:POINT(")
            .trim_end_matches(')');
        let (lon, lat) = inner.split_once(',').unwrap();
        (lon.trim().parse().unwrap(), lat.trim().parse().unwrap())
    }

    fn nldas_name(&self) -> &str {
        self.param("variable").rsplit(':').next().unwrap()
    }
}

struct Service {
    url: String,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl Service {
    fn start<F>(handler: F) -> Self
    where
        F: Fn(&Request, usize) -> (u16, String) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/timeseries.cgi", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let (hits_srv, requests_srv) = (hits.clone(), requests.clone());
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let Some(req) = read_request(&stream) else { continue };
                let n = hits_srv.fetch_add(1, Ordering::SeqCst);
                let (status, body) = handler(&req, n);
                requests_srv.lock().unwrap().push(req);
                let reason = if status == 200 { "OK" } else { "Error" };
                let _ = write!(
                    stream,
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.flush();
            }
        });

        Self {
            url,
            hits,
            requests,
        }
    }

    fn client(&self) -> Client {
        Client::from_config(ClientConfig {
            url: self.url.clone(),
            token: None,
            verify: true,
            max_workers: 2,
            timeout: Duration::from_secs(10),
        })
        .unwrap()
        .with_progress(false)
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn read_request(stream: &std::net::TcpStream) -> Option<Request> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let target = line.split_whitespace().nth(1)?;
    let query = target.split_once('?').map(|(_, q)| q).unwrap_or("");
    let params = query
        .split('&')
        .filter_map(|kv| kv.split_once('='))
        .map(|(k, v)| (decode(k), decode(v)))
        .collect();

    let mut headers = HashMap::new();
    loop {
        let mut h = String::new();
        if reader.read_line(&mut h).ok()? == 0 || h.trim().is_empty() {
            break;
        }
        if let Some((k, v)) = h.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }
    Some(Request { params, headers })
}

fn decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap();
                out.push(u8::from_str_radix(hex, 16).unwrap());
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8(out).unwrap()
}

/// An `asc2` body with one `YYYY-MM-DD HHZ value` row per sample.
fn asc2(rows: &[(&str, f64)]) -> String {
    let mut body = String::from("prod_name: NLDAS_FORA0125_H.002\nDate&Time       Data\n");
    for (stamp, value) in rows {
        body.push_str(&format!("{stamp}  {value}\n"));
    }
    body
}

/// `2000-01-01T05` -> `2000-01-01 05Z`.
fn row_stamp(service_date: &str) -> String {
    let (date, hour) = service_date.split_once('T').unwrap();
    format!("{date} {hour}Z")
}

fn hour(y: i32, m: u32, d: u32, h: u32) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

// ============================================================================
// Point requests
// ============================================================================

#[test]
fn multi_point_series_land_on_their_own_rows() {
    let service = Service::start(|req, _| {
        let (lon, _) = req.point();
        let base = if lon < -95.0 { 1.5 } else { 11.5 };
        let offset = if req.nldas_name() == "TMP2m" { 260.0 } else { 0.0 };
        let body = asc2(&[
            ("2000-01-01 00Z", base + offset),
            ("2000-01-01 01Z", base + 1.0 + offset),
            ("2000-01-02 00Z", 99.0),
        ]);
        (200, body)
    });

    let query = ForcingQuery::new("2000-01-01", "2000-01-01").variables(["prcp", "temp"]);
    let frame = service
        .client()
        .get_bycoords(&[(-100.0, 40.0), (-90.0, 35.0)], &query)
        .unwrap();

    // Two points x one chunk x two variables
    assert_eq!(service.hits(), 4);
    assert_eq!(frame.len(), 4);
    assert_eq!(frame.column("prcp").unwrap(), &[1.5, 2.5, 11.5, 12.5]);
    assert_eq!(frame.column("temp").unwrap(), &[261.5, 262.5, 271.5, 272.5]);

    let index = frame.index();
    assert_eq!((index[0].lon, index[0].lat), (-100.0, 40.0));
    assert_eq!((index[3].lon, index[3].lat), (-90.0, 35.0));
    assert_eq!(index[3].time, hour(2000, 1, 1, 1));

    let requests = service.requests.lock().unwrap();
    let first = &requests[0];
    assert_eq!(first.param("type"), "asc2");
    assert_eq!(first.param("startDate"), "2000-01-01T00");
    assert_eq!(first.param("endDate"), "2000-01-02T00");
}

#[test]
fn chunk_boundary_rows_are_not_duplicated() {
    // Each chunk answers with a sample at both of its ends, so the shared
    // boundary hour arrives twice.
    let service = Service::start(|req, _| {
        let body = asc2(&[
            (row_stamp(req.param("startDate")).as_str(), 1.0),
            (row_stamp(req.param("endDate")).as_str(), 2.0),
        ]);
        (200, body)
    });

    let query = ForcingQuery::new("1980-01-01", "2010-01-01").variables(["prcp"]);
    let frame = service.client().get_byloc(-100.0, 40.0, &query).unwrap();

    assert_eq!(service.hits(), 2);
    let times: Vec<_> = frame.index().iter().map(|ix| ix.time).collect();
    assert_eq!(times, vec![hour(1980, 1, 1, 0), hour(2007, 5, 19, 0)]);
}

#[test]
fn bearer_token_is_sent() {
    let service = Service::start(|_, _| (200, asc2(&[("2000-01-01 00Z", 1.0)])));
    let client = Client::from_config(ClientConfig {
        url: service.url.clone(),
        token: Some("secret-token\n".to_string()),
        verify: true,
        max_workers: 1,
        timeout: Duration::from_secs(10),
    })
    .unwrap()
    .with_progress(false);

    let query = ForcingQuery::new("2000-01-01", "2000-01-01").variables(["prcp"]);
    client.get_byloc(-100.0, 40.0, &query).unwrap();

    let requests = service.requests.lock().unwrap();
    assert_eq!(requests[0].headers["authorization"], "Bearer secret-token");
    assert!(requests[0].headers["user-agent"].starts_with("nldas2-rs/"));
}

// ============================================================================
// Failures and retries
// ============================================================================

#[test]
fn failure_page_becomes_service_error() {
    let service = Service::start(|_, _| {
        (
            200,
            "<html><body><p><strong>Bad location</strong></p></body></html>".to_string(),
        )
    });

    let query = ForcingQuery::new("2000-01-01", "2000-01-01").variables(["prcp"]);
    let err = service.client().get_byloc(-100.0, 40.0, &query).unwrap_err();
    assert_eq!(
        err.downcast_ref::<Nldas2Error>(),
        Some(&Nldas2Error::Service("Bad location".to_string()))
    );
}

#[test]
fn unavailable_service_is_retried() {
    let service = Service::start(|_, n| {
        if n == 0 {
            (503, String::new())
        } else {
            (200, asc2(&[("2000-01-01 00Z", 0.25)]))
        }
    });

    let query = ForcingQuery::new("2000-01-01", "2000-01-01").variables(["prcp"]);
    let frame = service.client().get_byloc(-100.0, 40.0, &query).unwrap();
    assert_eq!(service.hits(), 2);
    assert_eq!(frame.column("prcp").unwrap(), &[0.25]);
}

#[test]
fn unauthorized_is_an_http_error() {
    let service = Service::start(|_, _| (401, "denied".to_string()));

    let query = ForcingQuery::new("2000-01-01", "2000-01-01").variables(["prcp"]);
    let err = service.client().get_byloc(-100.0, 40.0, &query).unwrap_err();
    assert_eq!(service.hits(), 1);
    match err.downcast_ref::<Nldas2Error>() {
        Some(Nldas2Error::Http(msg)) => assert!(msg.contains("NLDAS2_TOKEN"), "{msg}"),
        other => panic!("expected an HTTP error, got {other:?}"),
    }
}

// ============================================================================
// Geometry requests
// ============================================================================

#[test]
fn geometry_pivots_touched_cells_onto_window() {
    let service = Service::start(|req, _| {
        let (lon, lat) = req.point();
        (200, asc2(&[("2000-01-01 00Z", lon + lat)]))
    });

    // Touches three of the four cells in its 2 x 2 window.
    let triangle = polygon![
        (x: -100.24, y: 40.01),
        (x: -100.03, y: 40.01),
        (x: -100.24, y: 40.22),
    ];
    let query = ForcingQuery::new("2000-01-01", "2000-01-01").variables(["prcp"]);
    let ds = service
        .client()
        .get_bygeom(&Geometry::from(triangle), Crs::Epsg4326, &query)
        .unwrap();

    assert_eq!(service.hits(), 3);
    assert_eq!(ds.dims(), ["time", "y", "x"]);
    assert_eq!(ds.shape(), (1, 2, 2));
    assert_eq!(ds.x, vec![-100.1875, -100.0625]);
    assert_eq!(ds.y, vec![40.0625, 40.1875]);

    let prcp = &ds.variable("prcp").unwrap().values;
    assert_eq!(prcp[[0, 0, 0]], -100.1875 + 40.0625);
    assert_eq!(prcp[[0, 1, 0]], -100.1875 + 40.1875);
    assert_eq!(prcp[[0, 0, 1]], -100.0625 + 40.0625);
    assert!(prcp[[0, 1, 1]].is_nan());
}
