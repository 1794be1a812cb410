//! Great-circle geometry used when no routed distance is available.

use crate::models::check_in::Coordinate;

/// Mean Earth radius in meters (IUGG).
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// Haversine distance between two coordinates, in meters.
pub fn great_circle_distance(origin: Coordinate, destination: Coordinate) -> f64 {
    let phi1 = origin.lat.to_radians();
    let phi2 = destination.lat.to_radians();
    let delta_phi = (destination.lat - origin.lat).to_radians();
    let delta_lambda = (destination.long - origin.long).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` marginally above 1 for antipodal points.
    let c = 2.0 * a.clamp(0.0, 1.0).sqrt().asin();

    EARTH_RADIUS_METERS * c
}
