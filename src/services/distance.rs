//! Great-circle distance over an ordered point sequence

use crate::domain::types::GpsPoint;

/// Mean Earth radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Haversine distance between two coordinates, in kilometers
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Total distance along an arrival-ordered point sequence, in kilometers.
/// Fewer than two points yields 0.0.
pub fn route_km(points: &[GpsPoint]) -> f64 {
    points
        .windows(2)
        .map(|pair| haversine_km(pair[0].lat, pair[0].lon, pair[1].lat, pair[1].lon))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lon: f64) -> GpsPoint {
        GpsPoint { timestamp: "2024-05-01 08:00:00".to_string(), lat, lon, speed: 0.0 }
    }

    #[test]
    fn test_identical_coordinates_zero() {
        assert_eq!(haversine_km(24.86, 67.0, 24.86, 67.0), 0.0);
    }

    #[test]
    fn test_one_degree_latitude() {
        // One degree of latitude is ~111.2 km
        let d = haversine_km(24.0, 67.0, 25.0, 67.0);
        assert!((d - 111.19).abs() < 0.2, "got {d}");
    }

    #[test]
    fn test_monotonic_in_coordinate_delta() {
        let base = haversine_km(24.86, 67.0, 24.87, 67.0);
        let wider = haversine_km(24.86, 67.0, 24.88, 67.0);
        let widest = haversine_km(24.86, 67.0, 24.90, 67.0);

        assert!(base < wider);
        assert!(wider < widest);
    }

    #[test]
    fn test_route_with_fewer_than_two_points() {
        assert_eq!(route_km(&[]), 0.0);
        assert_eq!(route_km(&[point(24.86, 67.0)]), 0.0);
    }

    #[test]
    fn test_route_sums_consecutive_pairs() {
        let points = [point(24.86, 67.0), point(24.87, 67.0), point(24.88, 67.0)];

        let total = route_km(&points);
        let legs = haversine_km(24.86, 67.0, 24.87, 67.0) + haversine_km(24.87, 67.0, 24.88, 67.0);

        assert!((total - legs).abs() < 1e-12);
        assert!(total > 2.0 && total < 2.5, "got {total}");
    }
}
