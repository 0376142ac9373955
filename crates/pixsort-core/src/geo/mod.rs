//! Reverse geocoding against polygon boundary datasets.

pub mod boundary;
pub mod store;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::Labels;

pub use boundary::{point_in_polygon, BoundaryIndex, BoundarySet};
pub use store::{GeocodeStore, JsonGeocodeStore};

/// Resolved administrative names. `None` renders as the unknown sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    pub province: Option<String>,
    pub city: Option<String>,
}

impl Place {
    pub fn province_name<'a>(&'a self, labels: &'a Labels) -> &'a str {
        self.province.as_deref().unwrap_or(&labels.unknown_province)
    }

    pub fn city_name<'a>(&'a self, labels: &'a Labels) -> &'a str {
        self.city.as_deref().unwrap_or(&labels.unknown_city)
    }
}

/// Coordinates rounded to micro-degrees, used as the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoordKey {
    lat_e6: i64,
    lon_e6: i64,
}

impl CoordKey {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat_e6: (lat * 1e6).round() as i64,
            lon_e6: (lon * 1e6).round() as i64,
        }
    }
}

impl fmt::Display for CoordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat_e6, self.lon_e6)
    }
}

impl FromStr for CoordKey {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s.split_once(',').unwrap_or((s, ""));
        Ok(Self {
            lat_e6: lat.trim().parse()?,
            lon_e6: lon.trim().parse()?,
        })
    }
}

/// Run-scoped resolver. Lookups go run cache, then persistent store,
/// then the boundary polygons.
pub struct GeoResolver<'a> {
    index: Option<&'a BoundaryIndex>,
    store: Option<&'a dyn GeocodeStore>,
    cache: HashMap<CoordKey, Place>,
}

impl<'a> GeoResolver<'a> {
    pub fn new(index: Option<&'a BoundaryIndex>, store: Option<&'a dyn GeocodeStore>) -> Self {
        Self {
            index,
            store,
            cache: HashMap::new(),
        }
    }

    pub fn has_boundaries(&self) -> bool {
        self.index.is_some()
    }

    pub fn resolve(&mut self, lat: f64, lon: f64) -> Place {
        let key = CoordKey::new(lat, lon);
        if let Some(place) = self.cache.get(&key) {
            return place.clone();
        }
        let place = match self.store.and_then(|store| store.lookup(key)) {
            Some(place) => place,
            None => {
                let place = self.locate(lat, lon);
                if let Some(store) = self.store {
                    store.record(key, &place);
                }
                place
            }
        };
        self.cache.insert(key, place.clone());
        place
    }

    /// Distinct coordinates resolved so far in this run.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn locate(&self, lat: f64, lon: f64) -> Place {
        let Some(index) = self.index else {
            return Place::default();
        };
        Place {
            province: index.province(lat, lon).map(String::from),
            city: index.city(lat, lon).map(String::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn index() -> BoundaryIndex {
        let provinces = BoundarySet::from_json(
            r#"{"features": [{"properties": {"name": "Sichuan"},
                "geometry": {"coordinates": [[[100,26],[108,26],[108,34],[100,34]]]}}]}"#,
        )
        .unwrap();
        let cities = BoundarySet::from_json(
            r#"{"features": [{"properties": {"name": "Chengdu"},
                "geometry": {"coordinates": [[[103,30],[105,30],[105,31.5],[103,31.5]]]}}]}"#,
        )
        .unwrap();
        BoundaryIndex::from_sets(provinces, cities)
    }

    #[derive(Default)]
    struct CountingStore {
        lookups: AtomicUsize,
        records: AtomicUsize,
    }

    impl GeocodeStore for CountingStore {
        fn lookup(&self, _key: CoordKey) -> Option<Place> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            None
        }
        fn record(&self, _key: CoordKey, _place: &Place) {
            self.records.fetch_add(1, Ordering::SeqCst);
        }
        fn flush(&self) -> Result<(), crate::error::GeoError> {
            Ok(())
        }
    }

    #[test]
    fn test_resolve_with_sentinels() {
        let index = index();
        let labels = Labels::default();
        let mut geo = GeoResolver::new(Some(&index), None);
        let mut names = |lat, lon| {
            let place = geo.resolve(lat, lon);
            (
                place.province_name(&labels).to_string(),
                place.city_name(&labels).to_string(),
            )
        };
        assert_eq!(names(30.66, 104.06), ("Sichuan".to_string(), "Chengdu".to_string()));
        assert_eq!(names(27.0, 102.0), ("Sichuan".to_string(), "Unknown City".to_string()));
        assert_eq!(
            names(-33.0, 151.0),
            ("Unknown Province".to_string(), "Unknown City".to_string())
        );
    }

    #[test]
    fn test_run_cache_short_circuits_store() {
        let index = index();
        let store = CountingStore::default();
        let mut geo = GeoResolver::new(Some(&index), Some(&store));
        let first = geo.resolve(30.66, 104.06);
        let second = geo.resolve(30.6600001, 104.0600001);
        assert_eq!(first, second);
        assert_eq!(geo.cached(), 1);
        assert_eq!(store.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(store.records.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_without_boundaries_everything_is_unknown() {
        let mut geo = GeoResolver::new(None, None);
        assert!(!geo.has_boundaries());
        assert_eq!(geo.resolve(30.66, 104.06), Place::default());
    }

    #[test]
    fn test_coord_key_text_form() {
        let key = CoordKey::new(-33.868812, 151.209296);
        assert_eq!(key.to_string(), "-33868812,151209296");
        assert_eq!("-33868812,151209296".parse::<CoordKey>().unwrap(), key);
        assert!("nonsense".parse::<CoordKey>().is_err());
    }
}
