//! Route legs, the routing-service HTTP adapter, and a haversine fallback.
//!
//! The scheduling core never fetches routes itself; legs arrive already
//! resolved through a [`RouteProvider`](crate::traits::RouteProvider).

use serde::{Deserialize, Serialize};

use crate::stop::StopType;
use crate::traits::RouteProvider;

pub const METERS_PER_MILE: f64 = 1609.344;

/// Average highway speed assumption for the haversine fallback.
const DEFAULT_SPEED_MPH: f64 = 55.0;

/// Earth radius in miles.
const EARTH_RADIUS_MILES: f64 = 3958.8;

#[derive(Debug)]
pub enum RouteError {
    Http(reqwest::Error),
    /// The routing service answered but could not produce a route.
    Provider(String),
    NoRoute,
}

impl From<reqwest::Error> for RouteError {
    fn from(err: reqwest::Error) -> Self {
        RouteError::Http(err)
    }
}

/// What the routing provider returns for one origin/destination pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEstimate {
    pub distance_miles: f64,
    pub duration_hours: f64,
    /// Route geometry as (lat, lng) points, when the provider supplies one.
    pub waypoints: Vec<(f64, f64)>,
}

/// Which terminal stop a leg ends at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegKind {
    /// Deadhead travel to the pickup.
    ToPickup,
    /// Loaded travel to the delivery.
    ToDelivery,
}

impl LegKind {
    pub fn terminal_stop(self) -> StopType {
        match self {
            LegKind::ToPickup => StopType::Pickup,
            LegKind::ToDelivery => StopType::Delivery,
        }
    }
}

/// One resolved leg of a trip route. Legs chain head-to-tail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub kind: LegKind,
    pub origin: (f64, f64),
    pub destination: (f64, f64),
    pub origin_address: String,
    pub destination_address: String,
    pub distance_miles: f64,
    pub duration_hours: f64,
    pub waypoints: Vec<(f64, f64)>,
}

impl RouteLeg {
    /// Resolve a leg through the routing provider.
    ///
    /// Provider failure is a hard failure for the leg; no distance is ever
    /// guessed.
    pub fn resolve(
        provider: &impl RouteProvider,
        kind: LegKind,
        origin: (f64, f64),
        origin_address: impl Into<String>,
        destination: (f64, f64),
        destination_address: impl Into<String>,
    ) -> Result<Self, RouteError> {
        let estimate = provider.route_between(origin, destination)?;
        Ok(Self {
            kind,
            origin,
            destination,
            origin_address: origin_address.into(),
            destination_address: destination_address.into(),
            distance_miles: estimate.distance_miles,
            duration_hours: estimate.duration_hours,
            waypoints: estimate.waypoints,
        })
    }

    /// Average speed implied by the provider's estimate.
    pub fn average_speed_mph(&self) -> f64 {
        if self.duration_hours <= 0.0 {
            0.0
        } else {
            self.distance_miles / self.duration_hours
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoutingConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "driving".to_string(),
            timeout_secs: 10,
        }
    }
}

/// HTTP adapter for an OSRM-compatible routing service.
#[derive(Debug, Clone)]
pub struct RoutingClient {
    config: RoutingConfig,
    client: reqwest::blocking::Client,
}

impl RoutingClient {
    pub fn new(config: RoutingConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }
}

impl RouteProvider for RoutingClient {
    fn route_between(
        &self,
        from: (f64, f64),
        to: (f64, f64),
    ) -> Result<RouteEstimate, RouteError> {
        let url = format!(
            "{}/route/v1/{}/{:.6},{:.6};{:.6},{:.6}?overview=full&geometries=geojson",
            self.config.base_url, self.config.profile, from.1, from.0, to.1, to.0
        );

        let body: RouteResponse = self
            .client
            .get(url)
            .send()?
            .error_for_status()?
            .json()?;

        if body.code != "Ok" {
            return Err(RouteError::Provider(body.message.unwrap_or(body.code)));
        }

        let route = body.routes.into_iter().next().ok_or(RouteError::NoRoute)?;
        let waypoints = route
            .geometry
            .map(|g| {
                g.coordinates
                    .into_iter()
                    .map(|[lng, lat]| (lat, lng))
                    .collect()
            })
            .unwrap_or_default();

        Ok(RouteEstimate {
            distance_miles: route.distance / METERS_PER_MILE,
            duration_hours: route.duration / 3600.0,
            waypoints,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    code: String,
    message: Option<String>,
    #[serde(default)]
    routes: Vec<RouteBody>,
}

#[derive(Debug, Deserialize)]
struct RouteBody {
    /// Meters.
    distance: f64,
    /// Seconds.
    duration: f64,
    geometry: Option<RouteGeometry>,
}

#[derive(Debug, Deserialize)]
struct RouteGeometry {
    /// GeoJSON (lng, lat) pairs.
    coordinates: Vec<[f64; 2]>,
}

/// Haversine-based route provider (fallback when no routing service is
/// reachable).
///
/// Estimates distance and time from great-circle distance and an assumed
/// speed. Less accurate than road-network routing (ignores roads) but always
/// available.
#[derive(Debug, Clone)]
pub struct HaversineRouter {
    /// Assumed average driving speed in mph.
    pub speed_mph: f64,
}

impl Default for HaversineRouter {
    fn default() -> Self {
        Self {
            speed_mph: DEFAULT_SPEED_MPH,
        }
    }
}

impl HaversineRouter {
    pub fn new(speed_mph: f64) -> Self {
        Self { speed_mph }
    }

    /// Great-circle distance between two points in miles.
    pub fn haversine_miles(from: (f64, f64), to: (f64, f64)) -> f64 {
        let (lat1, lng1) = from;
        let (lat2, lng2) = to;

        let lat1_rad = lat1.to_radians();
        let lat2_rad = lat2.to_radians();
        let delta_lat = (lat2 - lat1).to_radians();
        let delta_lng = (lng2 - lng1).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_MILES * c
    }
}

impl RouteProvider for HaversineRouter {
    fn route_between(
        &self,
        from: (f64, f64),
        to: (f64, f64),
    ) -> Result<RouteEstimate, RouteError> {
        let miles = Self::haversine_miles(from, to);
        Ok(RouteEstimate {
            distance_miles: miles,
            duration_hours: miles / self.speed_mph,
            waypoints: vec![from, to],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_same_point() {
        let dist = HaversineRouter::haversine_miles((36.1, -115.1), (36.1, -115.1));
        assert!(dist < 0.001, "Same point should have ~0 distance");
    }

    #[test]
    fn test_haversine_known_distance() {
        // Las Vegas (36.17, -115.14) to Los Angeles (34.05, -118.24)
        // Actual distance ~230 miles
        let dist = HaversineRouter::haversine_miles((36.17, -115.14), (34.05, -118.24));
        assert!(
            dist > 215.0 && dist < 250.0,
            "LV to LA should be ~230mi, got {}",
            dist
        );
    }

    #[test]
    fn test_haversine_route_estimate() {
        let router = HaversineRouter::new(55.0);
        let estimate = router.route_between((36.17, -115.14), (34.05, -118.24)).unwrap();

        assert!((estimate.duration_hours - estimate.distance_miles / 55.0).abs() < 1e-9);
        assert_eq!(estimate.waypoints.len(), 2);
    }

    #[test]
    fn test_resolve_leg() {
        let router = HaversineRouter::default();
        let leg = RouteLeg::resolve(
            &router,
            LegKind::ToDelivery,
            (36.17, -115.14),
            "Las Vegas, NV",
            (34.05, -118.24),
            "Los Angeles, CA",
        )
        .unwrap();

        assert_eq!(leg.kind, LegKind::ToDelivery);
        assert!(leg.distance_miles > 200.0);
        assert!(leg.average_speed_mph() > 0.0);
    }

    #[test]
    fn test_parse_route_response() {
        let raw = r#"{
            "code": "Ok",
            "routes": [{
                "distance": 160934.4,
                "duration": 7200.0,
                "geometry": {"coordinates": [[-115.14, 36.17], [-115.5, 35.8], [-118.24, 34.05]]}
            }]
        }"#;
        let body: RouteResponse = serde_json::from_str(raw).unwrap();

        assert_eq!(body.code, "Ok");
        let route = &body.routes[0];
        assert!((route.distance / METERS_PER_MILE - 100.0).abs() < 1e-6);
        let geometry = route.geometry.as_ref().unwrap();
        // GeoJSON order is (lng, lat)
        assert_eq!(geometry.coordinates[0], [-115.14, 36.17]);
    }

    #[test]
    fn test_parse_error_response() {
        let raw = r#"{"code": "NoRoute", "message": "Impossible route between points"}"#;
        let body: RouteResponse = serde_json::from_str(raw).unwrap();

        assert_eq!(body.code, "NoRoute");
        assert!(body.routes.is_empty());
    }
}
