use std::fmt;
use std::path::Path;

use geo::{BoundingRect, Coord, Geometry, Intersects, Polygon, Rect};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{FiatError, Result};

/// Coordinate reference system, identified by its EPSG code
///
/// Accepts `4326`, `"EPSG:4326"`, `"epsg:4326"` and OGC URNs such as
/// `"urn:ogc:def:crs:EPSG::28992"` when deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "CrsInput", into = "String")]
pub struct Crs {
    epsg: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CrsInput {
    Code(u32),
    Text(String),
}

impl TryFrom<CrsInput> for Crs {
    type Error = FiatError;

    fn try_from(value: CrsInput) -> Result<Self> {
        match value {
            CrsInput::Code(code) => Ok(Crs::from_epsg(code)),
            CrsInput::Text(text) => Crs::parse(&text),
        }
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}

impl Crs {
    pub const WGS84: Crs = Crs { epsg: 4326 };

    pub fn from_epsg(epsg: u32) -> Self {
        Crs { epsg }
    }

    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    /// Parse a textual CRS reference
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let lower = trimmed.to_ascii_lowercase();

        if lower.ends_with("crs84") {
            return Ok(Crs::WGS84);
        }

        let code = if let Some(rest) = lower.strip_prefix("epsg:") {
            rest
        } else if lower.starts_with("urn:ogc:def:crs:epsg") {
            lower.rsplit(':').next().unwrap_or("")
        } else {
            lower.as_str()
        };

        code.trim()
            .parse::<u32>()
            .map(Crs::from_epsg)
            .map_err(|_| FiatError::config(format!("unrecognised CRS '{}'", text)))
    }

    /// Geographic (lat/lon) systems live in the 4000-4999 EPSG block
    pub fn is_geographic(&self) -> bool {
        (4000..5000).contains(&self.epsg)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

/// Bounding box structure
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        Rect::new(
            Coord {
                x: self.min_x,
                y: self.min_y,
            },
            Coord {
                x: self.max_x,
                y: self.max_y,
            },
        )
        .to_polygon()
    }

    /// Bounding box of a geometry, `None` for empty geometries
    pub fn of(geometry: &Geometry<f64>) -> Option<Self> {
        geometry
            .bounding_rect()
            .map(|r| BoundingBox::new(r.min().x, r.min().y, r.max().x, r.max().y))
    }

    /// Transform bounding box to another CRS
    ///
    /// Points along all four edges are projected, so the result still covers
    /// the box when the projection bends its edges.
    pub fn transform(&self, from: Crs, to: Crs) -> Result<Self> {
        if from == to {
            return Ok(*self);
        }
        const EDGE_STEPS: usize = 20;

        let mut bbox = BoundingBox::new(
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
        );
        for i in 0..=EDGE_STEPS {
            let t = i as f64 / EDGE_STEPS as f64;
            let x = self.min_x + t * (self.max_x - self.min_x);
            let y = self.min_y + t * (self.max_y - self.min_y);
            for (px, py) in [(x, self.min_y), (x, self.max_y), (self.min_x, y), (self.max_x, y)] {
                let (tx, ty) = GeoCore::transform_coords(from, to, px, py)?;
                bbox.min_x = bbox.min_x.min(tx);
                bbox.min_y = bbox.min_y.min(ty);
                bbox.max_x = bbox.max_x.max(tx);
                bbox.max_y = bbox.max_y.max(ty);
            }
        }
        Ok(bbox)
    }
}

/// Model region used to clip vector sources
#[derive(Debug, Clone)]
pub struct Region {
    pub geometry: Geometry<f64>,
    pub crs: Crs,
}

impl Region {
    pub fn from_bbox(bbox: BoundingBox, crs: Crs) -> Self {
        Region {
            geometry: Geometry::Polygon(bbox.to_polygon()),
            crs,
        }
    }

    /// Union of all features of a GeoJSON file
    pub fn from_geojson<P: AsRef<Path>>(path: P) -> Result<Self> {
        let layer = crate::collect::vector::VectorLayer::read_geojson(path.as_ref(), None)?;
        let mut geometries: Vec<Geometry<f64>> =
            layer.features.into_iter().map(|f| f.geometry).collect();
        let geometry = match geometries.len() {
            0 => {
                return Err(FiatError::config(format!(
                    "region file {:?} has no features",
                    path.as_ref()
                )))
            }
            1 => geometries.remove(0),
            _ => Geometry::GeometryCollection(geo::GeometryCollection(geometries)),
        };
        Ok(Region {
            geometry,
            crs: layer.crs,
        })
    }

    /// Region geometry expressed in `crs`
    pub fn in_crs(&self, crs: Crs) -> Result<Geometry<f64>> {
        GeoCore::reproject_geometry(&self.geometry, self.crs, crs)
    }

    pub fn intersects(&self, geometry: &Geometry<f64>) -> bool {
        self.geometry.intersects(geometry)
    }
}

/// Holds the model CRS and region and provides the CRS plumbing
#[derive(Debug, Clone, Default)]
pub struct GeoCore {
    pub crs: Option<Crs>,
    pub region: Option<Region>,
}

impl GeoCore {
    pub fn new(crs: Crs) -> Self {
        GeoCore {
            crs: Some(crs),
            region: None,
        }
    }

    pub fn get_crs(&self) -> Option<Crs> {
        self.crs
    }

    pub fn set_crs(&mut self, crs: Crs) {
        self.crs = Some(crs);
    }

    pub fn get_region(&self) -> Option<&Region> {
        self.region.as_ref()
    }

    pub fn set_region(&mut self, region: Option<Region>) {
        self.region = region;
    }

    /// Transform coordinates from one CRS to another
    #[cfg(feature = "proj")]
    pub fn transform_coords(from: Crs, to: Crs, x: f64, y: f64) -> Result<(f64, f64)> {
        if from == to {
            return Ok((x, y));
        }
        let proj = proj::Proj::new_known_crs(&from.to_string(), &to.to_string(), None)?;
        Ok(proj.convert((x, y))?)
    }

    /// Transform coordinates from one CRS to another
    #[cfg(not(feature = "proj"))]
    pub fn transform_coords(from: Crs, to: Crs, x: f64, y: f64) -> Result<(f64, f64)> {
        if from == to {
            return Ok((x, y));
        }
        Err(FiatError::CrsMismatch {
            expected: to.to_string(),
            found: from.to_string(),
        })
    }

    /// Reproject a geometry, a no-op when both systems are equal
    pub fn reproject_geometry(
        geometry: &Geometry<f64>,
        from: Crs,
        to: Crs,
    ) -> Result<Geometry<f64>> {
        if from == to {
            return Ok(geometry.clone());
        }
        debug!("Reprojecting geometry from {} to {}", from, to);
        Self::reproject_with(geometry, from, to)
    }

    #[cfg(feature = "proj")]
    fn reproject_with(geometry: &Geometry<f64>, from: Crs, to: Crs) -> Result<Geometry<f64>> {
        use geo::MapCoords;

        let proj = proj::Proj::new_known_crs(&from.to_string(), &to.to_string(), None)?;
        let projected = geometry.try_map_coords(|c| {
            proj.convert((c.x, c.y))
                .map(|(x, y)| Coord { x, y })
        })?;
        Ok(projected)
    }

    #[cfg(not(feature = "proj"))]
    fn reproject_with(geometry: &Geometry<f64>, from: Crs, to: Crs) -> Result<Geometry<f64>> {
        debug!("No PROJ support, cannot reproject {:?}", geometry.bounding_rect());
        Err(FiatError::CrsMismatch {
            expected: to.to_string(),
            found: from.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::point;

    #[test]
    fn test_crs_parse_variants() {
        assert_eq!(Crs::parse("EPSG:4326").unwrap(), Crs::WGS84);
        assert_eq!(Crs::parse("epsg:28992").unwrap().epsg(), 28992);
        assert_eq!(Crs::parse("32617").unwrap().epsg(), 32617);
        assert_eq!(
            Crs::parse("urn:ogc:def:crs:EPSG::3857").unwrap().epsg(),
            3857
        );
        assert_eq!(Crs::parse("urn:ogc:def:crs:OGC:1.3:CRS84").unwrap(), Crs::WGS84);
        assert!(Crs::parse("not a crs").is_err());
    }

    #[test]
    fn test_crs_serde() {
        #[derive(Deserialize, Serialize)]
        struct Holder {
            crs: Crs,
        }
        let a: Holder = toml::from_str("crs = \"epsg:4326\"").unwrap();
        let b: Holder = toml::from_str("crs = 4326").unwrap();
        assert_eq!(a.crs, b.crs);
        assert_eq!(toml::to_string(&a).unwrap().trim(), "crs = \"EPSG:4326\"");
    }

    #[test]
    fn test_crs_is_geographic() {
        assert!(Crs::WGS84.is_geographic());
        assert!(!Crs::from_epsg(32617).is_geographic());
    }

    #[test]
    fn test_bounding_box() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let region = Region::from_bbox(bbox, Crs::WGS84);
        assert!(region.intersects(&Geometry::Point(point!(x: 0.5, y: 0.5))));
        assert!(!region.intersects(&Geometry::Point(point!(x: 2.0, y: 0.5))));
        assert_eq!(BoundingBox::of(&region.geometry), Some(bbox));
    }

    #[test]
    fn test_reproject_same_crs_is_identity() {
        let geom = Geometry::Point(point!(x: 3.0, y: 4.0));
        let out = GeoCore::reproject_geometry(&geom, Crs::WGS84, Crs::WGS84).unwrap();
        assert_eq!(out, geom);
    }

    #[cfg(not(feature = "proj"))]
    #[test]
    fn test_reproject_without_proj_fails() {
        let geom = Geometry::Point(point!(x: 3.0, y: 4.0));
        let err = GeoCore::reproject_geometry(&geom, Crs::WGS84, Crs::from_epsg(3857));
        assert!(matches!(err, Err(FiatError::CrsMismatch { .. })));
    }

    #[test]
    fn test_bbox_transform_same_crs() {
        let bbox = BoundingBox::new(-84.0, 0.0, -78.0, 40.0);
        assert_eq!(bbox.transform(Crs::WGS84, Crs::WGS84).unwrap(), bbox);
    }

    #[cfg(feature = "proj")]
    #[test]
    fn test_bbox_transform_covers_bent_edges() {
        let bbox = BoundingBox::new(-84.0, 0.0, -78.0, 40.0);
        let utm = Crs::from_epsg(32617);
        let out = bbox.transform(Crs::WGS84, utm).unwrap();
        // meridians converge, so the widest extent is on the equator and the
        // upper corners lie above the top edge midpoint
        for (lon, lat) in [(-84.0, 40.0), (-78.0, 0.0), (-81.0, 40.0), (-84.0, 0.0), (-78.0, 40.0)] {
            let (x, y) = GeoCore::transform_coords(Crs::WGS84, utm, lon, lat).unwrap();
            assert!(out.min_x <= x && x <= out.max_x, "x of ({}, {})", lon, lat);
            assert!(out.min_y <= y && y <= out.max_y, "y of ({}, {})", lon, lat);
        }
    }
}
