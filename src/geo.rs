/// Mean Earth radius used for all distance math, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

/// Great-circle distance between two coordinates (haversine), in meters.
///
/// Symmetric in its arguments and exactly zero for identical points.
pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos()
            * b.latitude.to_radians().cos()
            * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

/// Sum of consecutive great-circle distances along a path.
pub fn path_length<I>(points: I) -> f64
where
    I: IntoIterator<Item = Coordinate>,
{
    let mut total = 0.0;
    let mut previous: Option<Coordinate> = None;
    for point in points {
        if let Some(prev) = previous {
            total += distance(prev, point);
        }
        previous = Some(point);
    }
    total
}
