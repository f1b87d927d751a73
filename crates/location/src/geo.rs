use serde::Deserialize;
use tabi_core::GeoPoint;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometres.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Bounds {
    pub lat_range: [f64; 2],
    pub lng_range: [f64; 2],
}

impl Bounds {
    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.lat_range[0]..=self.lat_range[1]).contains(&point.lat)
            && (self.lng_range[0]..=self.lng_range[1]).contains(&point.lng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokyo_to_osaka_is_about_400km() {
        let tokyo = GeoPoint::new(35.6762, 139.6503);
        let osaka = GeoPoint::new(34.6937, 135.5023);
        let distance = haversine_km(tokyo, osaka);
        assert!((390.0..410.0).contains(&distance), "{distance}");
        assert!(haversine_km(tokyo, tokyo) < 1e-9);
    }

    #[test]
    fn bounds_are_inclusive() {
        let bounds = Bounds {
            lat_range: [20.0, 46.0],
            lng_range: [122.0, 154.0],
        };
        assert!(bounds.contains(GeoPoint::new(20.0, 154.0)));
        assert!(!bounds.contains(GeoPoint::new(48.8, 2.35)));
    }
}
