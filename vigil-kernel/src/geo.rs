use crate::models::GeoPoint;
use uuid::Uuid;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Distance orthodromique en kilomètres entre deux points.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * h.sqrt().asin() * EARTH_RADIUS_KM
}

/// Candidat le plus proche de l'origine, par distance strictement croissante.
/// À égalité le premier rencontré gagne. None si aucun candidat exploitable.
pub fn nearest(origin: GeoPoint, candidates: &[(Uuid, GeoPoint)]) -> Option<Uuid> {
    let mut best: Option<(Uuid, f64)> = None;
    for (id, point) in candidates {
        let km = haversine_km(origin, *point);
        if !km.is_finite() {
            continue;
        }
        if best.map_or(true, |(_, b)| km < b) {
            best = Some((*id, km));
        }
    }
    best.map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_distance() {
        // New York vers Los Angeles : environ 3940 km
        let nyc = GeoPoint { latitude: 40.7128, longitude: -74.0060 };
        let la = GeoPoint { latitude: 34.0522, longitude: -118.2437 };
        let d = haversine_km(nyc, la);
        assert!((d - 3940.0).abs() < 100.0, "got {d}");
    }

    #[test]
    fn zero_distance_between_identical_points() {
        let p = GeoPoint { latitude: 41.3, longitude: 69.2 };
        assert!(haversine_km(p, p) < 1e-9);
    }

    #[test]
    fn closest_candidate_wins() {
        let origin = GeoPoint { latitude: 41.3, longitude: 69.2 };
        let at_origin = Uuid::new_v4();
        let five_km = Uuid::new_v4();
        let fifty_km = Uuid::new_v4();
        // 0.045° de latitude font à peu près 5 km
        let candidates = vec![
            (fifty_km, GeoPoint { latitude: 41.75, longitude: 69.2 }),
            (at_origin, origin),
            (five_km, GeoPoint { latitude: 41.345, longitude: 69.2 }),
        ];
        assert_eq!(nearest(origin, &candidates), Some(at_origin));
    }

    #[test]
    fn no_candidates_means_no_target() {
        let origin = GeoPoint { latitude: 41.3, longitude: 69.2 };
        assert_eq!(nearest(origin, &[]), None);
    }

    #[test]
    fn ties_go_to_the_first_candidate() {
        let origin = GeoPoint { latitude: 41.3, longitude: 69.2 };
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let spot = GeoPoint { latitude: 41.4, longitude: 69.2 };
        assert_eq!(nearest(origin, &[(first, spot), (second, spot)]), Some(first));
    }
}
