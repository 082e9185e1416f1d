//! Geographic coordinates and bounding boxes.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mean earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;
pub const MIN_LONG: f64 = -180.0;
pub const MAX_LONG: f64 = 180.0;

/// A point on the globe in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub long: f64,
}

impl Coord {
    /// Create a validated coordinate
    pub fn new(lat: f64, long: f64) -> Result<Self> {
        if !lat.is_finite() || !long.is_finite() {
            return Err(Error::InvalidCoordinate(format!("{lat},{long}")));
        }
        if !(MIN_LAT..=MAX_LAT).contains(&lat) || !(MIN_LONG..=MAX_LONG).contains(&long) {
            return Err(Error::InvalidCoordinate(format!(
                "{lat},{long} is outside [-90,90] x [-180,180]"
            )));
        }
        Ok(Self { lat, long })
    }

    /// Create a coordinate, clamping latitude and wrapping longitude
    #[must_use]
    pub fn normalized(lat: f64, long: f64) -> Self {
        Self {
            lat: lat.clamp(MIN_LAT, MAX_LAT),
            long: wrap_long(long),
        }
    }

    /// Great-circle distance in kilometres (haversine)
    #[must_use]
    pub fn distance_km(&self, other: &Coord) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = lat2 - lat1;
        let dlong = (other.long - self.long).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlong / 2.0).sin().powi(2);
        // Rounding can push `a` slightly above 1 for antipodal points
        let a = a.clamp(0.0, 1.0);
        2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4},{:.4}", self.lat, self.long)
    }
}

impl FromStr for Coord {
    type Err = Error;

    /// Parse `"lat,long"`
    fn from_str(s: &str) -> Result<Self> {
        let (lat, long) = s
            .split_once(',')
            .ok_or_else(|| Error::InvalidCoordinate(format!("expected \"lat,long\", got {s:?}")))?;
        let lat: f64 = lat
            .trim()
            .parse()
            .map_err(|_| Error::InvalidCoordinate(format!("bad latitude in {s:?}")))?;
        let long: f64 = long
            .trim()
            .parse()
            .map_err(|_| Error::InvalidCoordinate(format!("bad longitude in {s:?}")))?;
        Coord::new(lat, long)
    }
}

/// Wrap a longitude into [-180, 180)
#[inline]
#[must_use]
pub fn wrap_long(long: f64) -> f64 {
    (long - MIN_LONG).rem_euclid(360.0) + MIN_LONG
}

/// A rectangle given by its south-west and north-east corners.
///
/// A box whose north-east longitude is smaller than its south-west longitude
/// crosses the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub sw: Coord,
    pub ne: Coord,
}

impl BoundingBox {
    #[must_use]
    pub fn new(sw: Coord, ne: Coord) -> Self {
        Self { sw, ne }
    }

    /// The whole globe
    #[must_use]
    pub fn world() -> Self {
        Self {
            sw: Coord { lat: MIN_LAT, long: MIN_LONG },
            ne: Coord { lat: MAX_LAT, long: MAX_LONG },
        }
    }

    #[inline]
    #[must_use]
    pub fn crosses_antimeridian(&self) -> bool {
        self.ne.long < self.sw.long
    }

    #[must_use]
    pub fn contains(&self, coord: &Coord) -> bool {
        if coord.lat < self.sw.lat || coord.lat > self.ne.lat {
            return false;
        }
        if self.crosses_antimeridian() {
            coord.long >= self.sw.long || coord.long <= self.ne.long
        } else {
            coord.long >= self.sw.long && coord.long <= self.ne.long
        }
    }

    #[must_use]
    pub fn center(&self) -> Coord {
        let lat = (self.sw.lat + self.ne.lat) / 2.0;
        let long = if self.crosses_antimeridian() {
            wrap_long((self.sw.long + self.ne.long + 360.0) / 2.0)
        } else {
            (self.sw.long + self.ne.long) / 2.0
        };
        Coord { lat, long }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coord() {
        let coord: Coord = "40.7128, -74.0060".parse().unwrap();
        assert!((coord.lat - 40.7128).abs() < 1e-12);
        assert!((coord.long + 74.006).abs() < 1e-12);

        assert!("40.7".parse::<Coord>().is_err());
        assert!("91,0".parse::<Coord>().is_err());
        assert!("abc,0".parse::<Coord>().is_err());
    }

    #[test]
    fn test_distance() {
        let london = Coord::new(51.5074, -0.1278).unwrap();
        let paris = Coord::new(48.8566, 2.3522).unwrap();
        let d = london.distance_km(&paris);
        assert!((d - 343.5).abs() < 2.0, "got {d}");
        assert_eq!(london.distance_km(&london), 0.0);

        let north = Coord::new(90.0, 0.0).unwrap();
        let south = Coord::new(-90.0, 0.0).unwrap();
        let half = std::f64::consts::PI * EARTH_RADIUS_KM;
        assert!((north.distance_km(&south) - half).abs() < 1e-6);
    }

    #[test]
    fn test_wrap_long() {
        assert_eq!(wrap_long(190.0), -170.0);
        assert_eq!(wrap_long(-190.0), 170.0);
        assert_eq!(wrap_long(180.0), -180.0);
        assert_eq!(wrap_long(12.5), 12.5);
    }

    #[test]
    fn test_bounding_box_antimeridian() {
        let bbox = BoundingBox::new(
            Coord::new(-10.0, 170.0).unwrap(),
            Coord::new(10.0, -170.0).unwrap(),
        );
        assert!(bbox.crosses_antimeridian());
        assert!(bbox.contains(&Coord::new(0.0, 179.0).unwrap()));
        assert!(bbox.contains(&Coord::new(0.0, -175.0).unwrap()));
        assert!(!bbox.contains(&Coord::new(0.0, 0.0).unwrap()));
        let center = bbox.center();
        assert!((center.long.abs() - 180.0).abs() < 1e-9);
    }
}
