//! Deterministic quantization of geographic coordinates onto a fixed grid.
//!
//! Every point on the map belongs to exactly one cell. Cells span a fixed
//! latitudinal band (~50 m) and a longitudinal band widened by `1/cos(lat)`
//! so cells stay approximately square as latitude increases. The mapping is
//! pure: the same coordinate always quantizes to the same [`CellId`], and
//! any two points inside a snapped cell share its id.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Latitudinal span of one grid cell in degrees (~50 m on the ground).
pub const LAT_SPAN_DEG: f64 = 0.00045;

/// Lower clamp for `cos(lat)` so longitudinal spans stay finite near the
/// poles instead of degenerating into slivers.
pub const MIN_COS_LAT: f64 = 0.01;

/// Mean Earth radius in meters, used for great-circle distances.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("coordinate out of range: lat={lat}, lon={lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },

    #[error("malformed cell id: {0}")]
    MalformedCellId(String),
}

/// Stable identity of a grid cell.
///
/// Rendered as `"{lat_index}_{lon_index}"`, the indices being the floored
/// quotients of the coordinate by the cell spans at that latitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId {
    pub lat_index: i64,
    pub lon_index: i64,
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.lat_index, self.lon_index)
    }
}

impl FromStr for CellId {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || GridError::MalformedCellId(s.to_string());
        let (lat, lon) = s.split_once('_').ok_or_else(malformed)?;
        Ok(CellId {
            lat_index: lat.parse().map_err(|_| malformed())?,
            lon_index: lon.parse().map_err(|_| malformed())?,
        })
    }
}

/// Axis-aligned bounding rectangle of a cell, in degrees.
///
/// South and west edges are inclusive; north and east belong to the
/// neighboring cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Rect {
    /// Midpoint of the rectangle as `(lat, lon)`.
    pub fn centroid(&self) -> (f64, f64) {
        (
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.south && lat < self.north && lon >= self.west && lon < self.east
    }
}

/// Longitudinal span of a cell at the given latitude, in degrees.
pub fn lon_span_deg(lat: f64) -> f64 {
    LAT_SPAN_DEG / lat.to_radians().cos().max(MIN_COS_LAT)
}

fn validate(lat: f64, lon: f64) -> Result<(), GridError> {
    // NaN fails both range checks, so it is rejected here as well.
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(GridError::InvalidCoordinate { lat, lon });
    }
    Ok(())
}

/// Quantize a coordinate to its cell identity.
pub fn cell_id(lat: f64, lon: f64) -> Result<CellId, GridError> {
    validate(lat, lon)?;
    Ok(CellId {
        lat_index: (lat / LAT_SPAN_DEG).floor() as i64,
        lon_index: (lon / lon_span_deg(lat)).floor() as i64,
    })
}

/// Bounding rectangle of the cell containing the coordinate.
///
/// The longitudinal span is taken at the query latitude, matching
/// [`cell_id`], so the returned rectangle always contains the query point.
pub fn cell_bounds(lat: f64, lon: f64) -> Result<Rect, GridError> {
    validate(lat, lon)?;
    let lon_span = lon_span_deg(lat);
    let south = (lat / LAT_SPAN_DEG).floor() * LAT_SPAN_DEG;
    let west = (lon / lon_span).floor() * lon_span;
    Ok(Rect {
        south,
        west,
        north: south + LAT_SPAN_DEG,
        east: west + lon_span,
    })
}

/// Great-circle distance between two `(lat, lon)` points in meters.
pub fn haversine_distance_m(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}
