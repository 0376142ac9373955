//! Administrative boundary datasets and point-in-polygon lookup.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::GeoError;

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Option<Properties>,
    #[serde(default)]
    geometry: Option<Geometry>,
}

#[derive(Deserialize)]
struct Properties {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct Geometry {
    coordinates: Coordinates,
}

/// Polygon and MultiPolygon nesting; positions may carry extra ordinates.
#[derive(Deserialize)]
#[serde(untagged)]
enum Coordinates {
    Polygon(Vec<Vec<Vec<f64>>>),
    MultiPolygon(Vec<Vec<Vec<Vec<f64>>>>),
}

/// `(longitude, latitude)`
pub type Vertex = (f64, f64);

/// One polygon: outer ring first, holes after.
#[derive(Debug, Clone)]
pub struct Polygon {
    rings: Vec<Vec<Vertex>>,
    min: Vertex,
    max: Vertex,
}

impl Polygon {
    pub fn new(rings: Vec<Vec<Vertex>>) -> Option<Self> {
        let outer = rings.first().filter(|ring| ring.len() >= 3)?;
        let mut min = outer[0];
        let mut max = outer[0];
        for &(lon, lat) in outer {
            min = (min.0.min(lon), min.1.min(lat));
            max = (max.0.max(lon), max.1.max(lat));
        }
        Some(Self { rings, min, max })
    }

    /// Even-odd rule over every ring, so holes are excluded.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        if lon < self.min.0 || lon > self.max.0 || lat < self.min.1 || lat > self.max.1 {
            return false;
        }
        self.rings
            .iter()
            .filter(|ring| point_in_polygon(lon, lat, ring))
            .count()
            % 2
            == 1
    }
}

/// Ray casting: count crossings of a horizontal ray from the point.
pub fn point_in_polygon(lon: f64, lat: f64, ring: &[Vertex]) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];
        if (yi > lat) != (yj > lat) && lon < (xj - xi) * (lat - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    polygons: Vec<Polygon>,
}

impl Region {
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.polygons.iter().any(|p| p.contains(lon, lat))
    }
}

/// Named regions in dataset order.
#[derive(Debug, Clone, Default)]
pub struct BoundarySet {
    regions: Vec<Region>,
}

impl BoundarySet {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let collection: FeatureCollection = serde_json::from_str(json)?;
        let regions = collection
            .features
            .into_iter()
            .filter_map(|feature| {
                let name = feature.properties?.name.filter(|n| !n.trim().is_empty())?;
                let polygons: Vec<Polygon> = match feature.geometry?.coordinates {
                    Coordinates::Polygon(rings) => Polygon::new(to_rings(rings)).into_iter().collect(),
                    Coordinates::MultiPolygon(polygons) => polygons
                        .into_iter()
                        .filter_map(|rings| Polygon::new(to_rings(rings)))
                        .collect(),
                };
                (!polygons.is_empty()).then(|| Region {
                    name: name.trim().to_string(),
                    polygons,
                })
            })
            .collect();
        Ok(Self { regions })
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// First region containing the point.
    pub fn locate(&self, lat: f64, lon: f64) -> Option<&str> {
        self.regions
            .iter()
            .find(|region| region.contains(lon, lat))
            .map(|region| region.name.as_str())
    }
}

fn to_rings(rings: Vec<Vec<Vec<f64>>>) -> Vec<Vec<Vertex>> {
    rings
        .into_iter()
        .map(|ring| {
            ring.into_iter()
                .filter_map(|position| match position.as_slice() {
                    [lon, lat, ..] => Some((*lon, *lat)),
                    _ => None,
                })
                .collect()
        })
        .collect()
}

/// Province and city datasets loaded for one run, plus a fingerprint of
/// their contents for the persistent cache.
#[derive(Debug, Clone, Default)]
pub struct BoundaryIndex {
    provinces: BoundarySet,
    cities: BoundarySet,
    fingerprint: String,
}

impl BoundaryIndex {
    pub fn load(provinces: Option<&Path>, cities: Option<&Path>) -> Result<Self, GeoError> {
        let mut hasher = Sha256::new();
        let mut load_one = |label: &str, path: Option<&Path>| -> Result<BoundarySet, GeoError> {
            let Some(path) = path else {
                return Ok(BoundarySet::default());
            };
            let json = fs::read_to_string(path).map_err(|source| GeoError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            hasher.update(label.as_bytes());
            hasher.update(json.as_bytes());
            let set = BoundarySet::from_json(&json).map_err(|source| GeoError::Dataset {
                path: path.to_path_buf(),
                source,
            })?;
            tracing::info!(path = %path.display(), regions = set.len(), "loaded {} boundaries", label);
            Ok(set)
        };
        let provinces = load_one("provinces", provinces)?;
        let cities = load_one("cities", cities)?;
        Ok(Self {
            provinces,
            cities,
            fingerprint: hex::encode(hasher.finalize()),
        })
    }

    pub fn from_sets(provinces: BoundarySet, cities: BoundarySet) -> Self {
        Self {
            provinces,
            cities,
            fingerprint: String::new(),
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn province(&self, lat: f64, lon: f64) -> Option<&str> {
        self.provinces.locate(lat, lon)
    }

    pub fn city(&self, lat: f64, lon: f64) -> Option<&str> {
        self.cities.locate(lat, lon)
    }
}
