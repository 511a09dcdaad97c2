use crate::models::job::GeoPoint;

const EARTH_RADIUS_MILES: f64 = 3_959.0;

pub fn haversine_miles(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_MILES * central_angle
}

#[cfg(test)]
mod tests {
    use super::haversine_miles;
    use crate::models::job::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 51.5074,
            lng: -0.1278,
        };
        let distance = haversine_miles(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn london_to_manchester_is_around_163_miles() {
        let london = GeoPoint {
            lat: 51.5074,
            lng: -0.1278,
        };
        let manchester = GeoPoint {
            lat: 53.4808,
            lng: -2.2426,
        };
        let distance = haversine_miles(&london, &manchester);
        assert!((distance - 163.0).abs() < 5.0);
    }
}
