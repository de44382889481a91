use geo::Geometry;
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use log::{debug, warn};
use std::fs;
use std::path::Path;

use crate::error::{FiatError, Result};
use crate::geo_core::{Crs, GeoCore, Region};

/// A vector feature: geometry plus its attribute table row
#[derive(Debug, Clone, PartialEq)]
pub struct VectorFeature {
    pub geometry: Geometry<f64>,
    pub properties: JsonObject,
}

impl VectorFeature {
    pub fn new(geometry: Geometry<f64>) -> Self {
        VectorFeature {
            geometry,
            properties: JsonObject::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Attribute as text; numbers are formatted, null is `None`
    pub fn property_str(&self, key: &str) -> Option<String> {
        match self.properties.get(key)? {
            JsonValue::Null => None,
            JsonValue::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Attribute as a number; numeric strings are parsed
    pub fn property_f64(&self, key: &str) -> Option<f64> {
        match self.properties.get(key)? {
            JsonValue::Number(n) => n.as_f64(),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// In-memory vector layer with a single CRS
#[derive(Debug, Clone, PartialEq)]
pub struct VectorLayer {
    pub crs: Crs,
    pub features: Vec<VectorFeature>,
}

impl VectorLayer {
    pub fn new(crs: Crs) -> Self {
        VectorLayer {
            crs,
            features: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Read a GeoJSON file
    ///
    /// The CRS comes from `crs_override` (the catalog), then from a legacy
    /// `crs` member, and defaults to WGS84 as RFC 7946 prescribes.
    pub fn read_geojson(path: &Path, crs_override: Option<Crs>) -> Result<Self> {
        if !path.exists() {
            return Err(FiatError::MissingSource(format!("{:?}", path)));
        }
        let text = fs::read_to_string(path).map_err(|e| FiatError::io(path, e))?;
        let geojson: GeoJson = text.parse()?;
        let layer = Self::from_geojson(geojson, crs_override)?;
        debug!("Read {} features from {:?}", layer.len(), path);
        Ok(layer)
    }

    pub fn from_geojson(geojson: GeoJson, crs_override: Option<Crs>) -> Result<Self> {
        let (features, foreign) = match geojson {
            GeoJson::FeatureCollection(fc) => (fc.features, fc.foreign_members),
            GeoJson::Feature(f) => (vec![f], None),
            GeoJson::Geometry(g) => (vec![Feature::from(g)], None),
        };

        let crs = match crs_override {
            Some(crs) => crs,
            None => foreign
                .as_ref()
                .and_then(legacy_crs)
                .transpose()?
                .unwrap_or(Crs::WGS84),
        };

        let mut layer = VectorLayer::new(crs);
        for feature in features {
            let Some(geometry) = feature.geometry else {
                warn!("Skipping feature without geometry");
                continue;
            };
            let geometry: Geometry<f64> = geometry.value.try_into()?;
            layer.features.push(VectorFeature {
                geometry,
                properties: feature.properties.unwrap_or_default(),
            });
        }
        Ok(layer)
    }

    /// Keep the features intersecting the region
    pub fn clip_to_region(mut self, region: &Region) -> Result<Self> {
        let region_geom = region.in_crs(self.crs)?;
        let before = self.features.len();
        self.features.retain(|f| {
            use geo::Intersects;
            region_geom.intersects(&f.geometry)
        });
        debug!(
            "Clipped layer to region: {} of {} features kept",
            self.features.len(),
            before
        );
        Ok(self)
    }

    /// Reproject all geometries to `crs`
    pub fn to_crs(mut self, crs: Crs) -> Result<Self> {
        if self.crs == crs {
            return Ok(self);
        }
        for feature in &mut self.features {
            feature.geometry = GeoCore::reproject_geometry(&feature.geometry, self.crs, crs)?;
        }
        self.crs = crs;
        Ok(self)
    }

    pub fn to_geojson(&self) -> GeoJson {
        let features = self
            .features
            .iter()
            .map(|f| Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&f.geometry))),
                id: None,
                properties: Some(f.properties.clone()),
                foreign_members: None,
            })
            .collect();

        let mut crs_member = JsonObject::new();
        crs_member.insert(
            "crs".to_string(),
            serde_json::json!({
                "type": "name",
                "properties": { "name": format!("urn:ogc:def:crs:EPSG::{}", self.crs.epsg()) }
            }),
        );

        GeoJson::FeatureCollection(FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(crs_member),
        })
    }

    /// Write the layer as GeoJSON, creating parent folders on demand
    pub fn write_geojson(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| FiatError::io(parent, e))?;
        }
        fs::write(path, self.to_geojson().to_string()).map_err(|e| FiatError::io(path, e))?;
        debug!("Wrote {} features to {:?}", self.len(), path);
        Ok(())
    }
}

/// CRS from the pre-RFC 7946 `crs` member
fn legacy_crs(foreign: &JsonObject) -> Option<Result<Crs>> {
    let name = foreign
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()?;
    Some(Crs::parse(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_core::BoundingBox;
    use geo::point;

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::32617" } },
        "features": [
            { "type": "Feature", "properties": { "fd_id": 7, "occtype": "RES1-1SNB", "found_ht": "2.5" },
              "geometry": { "type": "Point", "coordinates": [10.0, 20.0] } },
            { "type": "Feature", "properties": { "fd_id": 8, "occtype": null },
              "geometry": { "type": "Point", "coordinates": [100.0, 200.0] } },
            { "type": "Feature", "properties": {}, "geometry": null }
        ]
    }"#;

    #[test]
    fn test_read_legacy_crs_and_properties() {
        let layer = VectorLayer::from_geojson(SAMPLE.parse().unwrap(), None).unwrap();
        assert_eq!(layer.crs.epsg(), 32617);
        assert_eq!(layer.len(), 2);
        let first = &layer.features[0];
        assert_eq!(first.property_str("occtype").as_deref(), Some("RES1-1SNB"));
        assert_eq!(first.property_f64("fd_id"), Some(7.0));
        assert_eq!(first.property_f64("found_ht"), Some(2.5));
        assert_eq!(layer.features[1].property_str("occtype"), None);
    }

    #[test]
    fn test_clip_to_region() {
        let layer = VectorLayer::from_geojson(SAMPLE.parse().unwrap(), None).unwrap();
        let region = Region::from_bbox(BoundingBox::new(0.0, 0.0, 50.0, 50.0), layer.crs);
        let clipped = layer.clip_to_region(&region).unwrap();
        assert_eq!(clipped.len(), 1);
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("points.geojson");
        let mut layer = VectorLayer::new(Crs::from_epsg(28992));
        layer.features.push(
            VectorFeature::new(Geometry::Point(point!(x: 1.0, y: 2.0)))
                .with_property("Object ID", 1),
        );
        layer.write_geojson(&path).unwrap();

        let back = VectorLayer::read_geojson(&path, None).unwrap();
        assert_eq!(back, layer);
    }
}
