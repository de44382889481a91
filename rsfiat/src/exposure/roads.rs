use geo::{Centroid, EuclideanLength, Geometry, HaversineLength};
use log::{info, warn};
use std::collections::BTreeMap;

use crate::collect::tables::Table;
use crate::collect::vector::VectorLayer;
use crate::commons::basic_functions::format_number;
use crate::error::{FiatError, Result};
use crate::exposure::columns::*;
use crate::exposure::exposure_vector::ExposureVector;
use crate::exposure::row::{ExposureRow, ExtractionMethod};
use crate::vulnerability::ROAD_FUNCTION;

/// Primary Object Type of road segments
pub const ROADS_OBJECT_TYPE: &str = "roads";

const ROAD_TYPE_COLUMN: &str = "road_type";
const DAMAGE_PER_LENGTH_COLUMN: &str = "damage_per_length";
const LANES_ATTRIBUTE: &str = "lanes";
const M_TO_FT: f64 = 3.280_839_9;

/// Maximum damage per unit of road length, per lane
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoadDamage {
    per_type: BTreeMap<String, f64>,
    default: Option<f64>,
}

impl RoadDamage {
    /// The same damage for every road type
    pub fn uniform(damage_per_length: f64) -> Self {
        RoadDamage {
            per_type: BTreeMap::new(),
            default: Some(damage_per_length),
        }
    }

    /// Table with `road_type` and `damage_per_length` columns; a road type
    /// of `*` is the fallback
    pub fn from_table(table: &Table) -> Result<Self> {
        table.require_column(ROAD_TYPE_COLUMN)?;
        table.require_column(DAMAGE_PER_LENGTH_COLUMN)?;
        let mut damage = RoadDamage::default();
        for row in 0..table.len() {
            let Some(road_type) = table.get(row, ROAD_TYPE_COLUMN) else {
                continue;
            };
            let value = table.get_f64(row, DAMAGE_PER_LENGTH_COLUMN).ok_or_else(|| {
                FiatError::config(format!("road damage of '{}' is not numeric", road_type))
            })?;
            if road_type == "*" {
                damage.default = Some(value);
            } else {
                damage.per_type.insert(road_type.to_string(), value);
            }
        }
        Ok(damage)
    }

    pub fn get(&self, road_type: &str) -> Option<f64> {
        self.per_type.get(road_type).copied().or(self.default)
    }
}

impl ExposureVector {
    /// Add road segments to the exposure
    ///
    /// Segments are kept when their `type_attribute` is one of `road_types`
    /// (all typed segments when `None`). Object IDs continue after the
    /// existing assets. Maximum damage is the segment length (in the
    /// exposure unit) times the damage per length, times the lane count when
    /// the segment has one.
    pub fn setup_roads(
        &mut self,
        roads: VectorLayer,
        road_types: Option<&[String]>,
        type_attribute: &str,
        road_damage: &RoadDamage,
    ) -> Result<usize> {
        let roads = roads.to_crs(self.crs)?;
        let in_feet = matches!(self.unit.as_deref(), Some("ft") | Some("feet"));
        let geographic = self.crs.is_geographic();
        let start = self.rows.len();
        let mut next_id = self.next_object_id();

        let mut geometries = Vec::new();
        let mut skipped = 0usize;
        for feature in roads.features {
            let Some(road_type) = feature.property_str(type_attribute) else {
                continue;
            };
            if road_types.is_some_and(|types| !types.contains(&road_type)) {
                continue;
            }
            let length = match &feature.geometry {
                Geometry::LineString(line) if geographic => line.haversine_length(),
                Geometry::MultiLineString(lines) if geographic => lines.haversine_length(),
                Geometry::LineString(line) => line.euclidean_length(),
                Geometry::MultiLineString(lines) => lines.euclidean_length(),
                _ => {
                    skipped += 1;
                    continue;
                }
            };
            // haversine lengths are in meters
            let length = if geographic && in_feet { length * M_TO_FT } else { length };

            let mut row = ExposureRow::new(next_id);
            next_id += 1;
            row.object_name = feature.property_str("name");
            row.primary_object_type = Some(ROADS_OBJECT_TYPE.to_string());
            row.secondary_object_type = Some(road_type.clone());
            if let Some(c) = feature.geometry.centroid() {
                row.x = Some(c.x());
                row.y = Some(c.y());
            }
            row.extraction_method = Some(ExtractionMethod::Centroid);
            row.ground_floor_height = Some(0.0);
            row.damage_functions
                .insert(REQUIRED_DAMAGE_TYPE.to_string(), ROAD_FUNCTION.to_string());
            match road_damage.get(&road_type) {
                Some(per_length) => {
                    let lanes = feature.property_f64(LANES_ATTRIBUTE).unwrap_or(1.0);
                    row.max_potential_damage.insert(
                        REQUIRED_DAMAGE_TYPE.to_string(),
                        (length * per_length * lanes * 100.0).round() / 100.0,
                    );
                }
                None => warn!("No road damage value for road type '{}'", road_type),
            }
            row.extra
                .insert(SEGMENT_LENGTH.to_string(), format_number((length * 100.0).round() / 100.0));

            self.rows.push(row);
            geometries.push(feature.geometry);
        }
        if skipped > 0 {
            warn!("Skipped {} road features that are not lines", skipped);
        }

        let added = geometries.len();
        self.set_geometries("roads", start, geometries.into_iter());
        info!("Set up {} road segments", added);
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::vector::VectorFeature;
    use crate::geo_core::Crs;
    use geo::line_string;

    fn roads() -> VectorLayer {
        let mut layer = VectorLayer::new(Crs::from_epsg(32617));
        layer.features.push(
            VectorFeature::new(Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 30.0, y: 40.0)]))
                .with_property("highway", "primary")
                .with_property("lanes", 2),
        );
        layer.features.push(
            VectorFeature::new(Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)]))
                .with_property("highway", "residential")
                .with_property("name", "Main St"),
        );
        layer.features.push(
            VectorFeature::new(Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 5.0, y: 0.0)]))
                .with_property("highway", "footway"),
        );
        layer
    }

    #[test]
    fn test_roads_continue_ids_and_price_by_length() {
        let mut exposure = ExposureVector::new(Crs::from_epsg(32617));
        exposure.rows.push(ExposureRow::new(4));
        let types = vec!["primary".to_string(), "residential".to_string()];

        let added = exposure
            .setup_roads(roads(), Some(&types), "highway", &RoadDamage::uniform(10.0))
            .unwrap();
        assert_eq!(added, 2);

        let primary = &exposure.rows[1];
        assert_eq!(primary.object_id, 5);
        assert_eq!(primary.primary_object_type.as_deref(), Some("roads"));
        assert_eq!(primary.secondary_object_type.as_deref(), Some("primary"));
        assert_eq!(primary.damage_functions["Structure"], "roads");
        // 50 long, two lanes
        assert_eq!(primary.max_potential_damage["Structure"], 1000.0);
        assert_eq!(primary.get(SEGMENT_LENGTH).as_deref(), Some("50"));
        assert_eq!(primary.x, Some(15.0));

        let residential = &exposure.rows[2];
        assert_eq!(residential.object_id, 6);
        assert_eq!(residential.object_name.as_deref(), Some("Main St"));
        assert_eq!(residential.max_potential_damage["Structure"], 100.0);

        let ids: Vec<f64> = exposure.geoms["roads"]
            .features
            .iter()
            .map(|f| f.property_f64(OBJECT_ID).unwrap())
            .collect();
        assert_eq!(ids, vec![5.0, 6.0]);
    }

    #[test]
    fn test_road_damage_table_fallback() {
        let table =
            Table::from_csv_str("road_type,damage_per_length\nprimary,20\n*,1\n").unwrap();
        let damage = RoadDamage::from_table(&table).unwrap();
        assert_eq!(damage.get("primary"), Some(20.0));
        assert_eq!(damage.get("footway"), Some(1.0));

        let mut exposure = ExposureVector::new(Crs::from_epsg(32617));
        exposure.setup_roads(roads(), None, "highway", &damage).unwrap();
        assert_eq!(exposure.len(), 3);
        assert_eq!(exposure.rows[2].max_potential_damage["Structure"], 5.0);
    }
}
