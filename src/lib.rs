//! A small Rust client for hourly NLDAS2 atmospheric forcing data.
//!
//! This crate queries the NASA GES DISC hydrology time-series service for the
//! eight NLDAS2 forcing variables (precipitation, potential evaporation,
//! temperature, wind, humidity, radiation) and returns them either as a
//! long-form [`ForcingFrame`] or as labeled 3-D arrays in a [`ForcingDataset`].
//!
//! ## Quick start
//! - Optionally configure the service via environment variables (`NLDAS2_URL`,
//!   `NLDAS2_TOKEN`, `NLDAS2_MAX_WORKERS`) or a `.nldas2rc` file (supported in
//!   the current directory and in your home directory).
//! - Call [`Client::get_bycoords`] with a list of `(lon, lat)` pairs, or
//!   [`Client::get_bygeom`] with a polygon.
//!
//! ```no_run
//! use anyhow::Result;
//! use nldas2::{Client, ForcingQuery, SnowParams};
//!
//! fn main() -> Result<()> {
//!     let client = Client::from_env()?;
//!     let query = ForcingQuery::new("2000-01-01", "2000-01-12")
//!         .variables(["prcp", "temp"])
//!         .snow(SnowParams::default());
//!     let frame = client.get_bycoords(&[(-69.77, 45.07), (-69.31, 45.45)], &query)?;
//!     frame.write_csv(std::io::stdout())?;
//!     Ok(())
//! }
//! ```
//!
//! Invalid input and service failures surface as [`Nldas2Error`] values inside
//! the returned [`anyhow::Error`].

#![forbid(unsafe_code)]

mod client;
mod config;
mod crs;
mod dataset;
mod error;
mod frame;
mod grid;
mod parse;
mod request;
mod snow;
mod util;
mod variables;

pub use client::{Client, ClientConfig};
pub use config::{ConfigOverrides, DEFAULT_URL};
pub use crs::Crs;
pub use dataset::{DataVariable, ForcingDataset, GeoTransform};
pub use error::Nldas2Error;
pub use frame::{Column, ForcingFrame, FrameIndex};
pub use grid::{
    BOUNDS, Geometry, GridMask, GridMaskSummary, RESOLUTION, get_grid_mask, parse_coord,
};
pub use request::ForcingQuery;
pub use snow::{SnowParams, T_RAIN, T_SNOW, kelvin_to_celsius};
pub use variables::{Variable, VariableAttrs};

/// Re-exported so callers can build geometries without a direct dependency.
pub use geo_types;
