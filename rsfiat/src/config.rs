//! Build configuration: which setup steps to run and with what options
//!
//! ```toml
//! [setup_global_settings]
//! crs = "EPSG:4326"
//!
//! [setup_vulnerability]
//! vulnerability_fn = "hazus_vulnerability_curves"
//! vulnerability_identifiers_and_linking_fn = "hazus_linking"
//! unit = "ft"
//! functions_max = ["AGR1"]
//!
//! [setup_exposure_buildings]
//! asset_locations = "nsi"
//! occupancy_type = "nsi"
//! max_potential_damage = "nsi"
//! ground_floor_height = 1
//! unit = "ft"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::commons::basic_functions::OneOrMany;
use crate::error::{FiatError, Result};
use crate::exposure::{ExtractionMethod, GroundFloorHeight};
use crate::geo_core::{BoundingBox, Crs};
use crate::hazard::HazardRequest;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildConfig {
    #[serde(default)]
    pub setup_global_settings: Option<GlobalSettings>,
    #[serde(default)]
    pub setup_output: Option<OutputSettings>,
    #[serde(default)]
    pub setup_vulnerability: Option<VulnerabilitySettings>,
    #[serde(default)]
    pub setup_road_vulnerability: Option<RoadVulnerabilitySettings>,
    #[serde(default)]
    pub setup_exposure_buildings: Option<ExposureBuildingsSettings>,
    #[serde(default)]
    pub setup_exposure_roads: Option<ExposureRoadsSettings>,
    #[serde(default)]
    pub setup_aggregation_areas: Option<AggregationAreaSettings>,
    #[serde(default)]
    pub setup_social_vulnerability_index: Option<SocialVulnerabilitySettings>,
    #[serde(default)]
    pub setup_hazard: Option<HazardRequest>,
    /// Raster exposure; accepted so configurations parse, rejected at build
    #[serde(default)]
    pub setup_exposure_raster: Option<toml::Table>,
}

impl BuildConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| FiatError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Model region: a GeoJSON file or a lon/lat bounding box
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RegionSettings {
    File { file: String },
    Bbox { bbox: [f64; 4] },
}

impl RegionSettings {
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        match self {
            RegionSettings::Bbox { bbox } => Some(BoundingBox::new(bbox[0], bbox[1], bbox[2], bbox[3])),
            RegionSettings::File { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GlobalSettings {
    pub crs: Crs,
    #[serde(default)]
    pub region: Option<RegionSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_output_csv_name")]
    pub output_csv_name: String,
    #[serde(default = "default_output_vector_name")]
    pub output_vector_name: String,
}

fn default_output_dir() -> String {
    "output".to_string()
}

fn default_output_csv_name() -> String {
    "output.csv".to_string()
}

fn default_output_vector_name() -> String {
    "spatial.geojson".to_string()
}

impl Default for OutputSettings {
    fn default() -> Self {
        OutputSettings {
            output_dir: default_output_dir(),
            output_csv_name: default_output_csv_name(),
            output_vector_name: default_output_vector_name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VulnerabilitySettings {
    /// Curve table: catalog name or CSV path
    pub vulnerability_fn: String,
    /// Linking table: catalog name or CSV path
    pub vulnerability_identifiers_and_linking_fn: String,
    pub unit: String,
    #[serde(default = "default_functions_mean")]
    pub functions_mean: OneOrMany<String>,
    #[serde(default)]
    pub functions_max: Option<OneOrMany<String>>,
    #[serde(default)]
    pub step_size: Option<f64>,
}

fn default_functions_mean() -> OneOrMany<String> {
    OneOrMany::One("default".to_string())
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoadVulnerabilitySettings {
    pub vertical_unit: String,
    #[serde(default = "default_threshold")]
    pub threshold_value: f64,
    #[serde(default)]
    pub min_hazard_value: f64,
    #[serde(default = "default_max_hazard")]
    pub max_hazard_value: f64,
    #[serde(default = "default_step_hazard")]
    pub step_hazard_value: f64,
}

fn default_threshold() -> f64 {
    0.6
}

fn default_max_hazard() -> f64 {
    10.0
}

fn default_step_hazard() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExposureBuildingsSettings {
    pub asset_locations: String,
    pub occupancy_type: String,
    pub max_potential_damage: String,
    #[serde(default)]
    pub ground_floor_height: Option<GroundFloorHeight>,
    pub unit: String,
    #[serde(default)]
    pub extraction_method: ExtractionMethod,
    #[serde(default = "default_damage_types")]
    pub damage_types: Vec<String>,
    /// Country to select from JRC damage values
    #[serde(default)]
    pub country: Option<String>,
    /// Occupancy attribute of the occupancy source (multiple sources only)
    #[serde(default = "default_occupancy_attribute")]
    pub occupancy_attribute: String,
    #[serde(default)]
    pub primary_attribute: Option<String>,
}

fn default_damage_types() -> Vec<String> {
    vec!["structure".to_string(), "content".to_string()]
}

fn default_occupancy_attribute() -> String {
    "occupancy".to_string()
}

/// Road damage as one value per length unit or a table per road type
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RoadDamageSettings {
    PerLength(f64),
    Table(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExposureRoadsSettings {
    pub roads_fn: String,
    #[serde(default)]
    pub road_types: Option<Vec<String>>,
    pub road_damage: RoadDamageSettings,
    pub unit: String,
    #[serde(default = "default_road_type_attribute")]
    pub road_type_attribute: String,
}

fn default_road_type_attribute() -> String {
    "highway".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AggregationAreaSettings {
    pub aggregation_area_fn: OneOrMany<String>,
    pub attribute_names: OneOrMany<String>,
    pub label_names: OneOrMany<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SocialVulnerabilitySettings {
    /// Polygons carrying the index, e.g. census block groups
    pub svi_fn: String,
    #[serde(default = "default_svi_index")]
    pub index_attribute: String,
    #[serde(default = "default_svi_key")]
    pub key_attribute: String,
}

fn default_svi_index() -> String {
    "SVI".to_string()
}

fn default_svi_key() -> String {
    "GEOID".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
[setup_global_settings]
crs = "epsg:4326"
region = { bbox = [-80.08, 32.70, -79.87, 32.86] }

[setup_output]
output_dir = "output"

[setup_vulnerability]
vulnerability_fn = "hazus_vulnerability_curves"
vulnerability_identifiers_and_linking_fn = "hazus_linking"
functions_max = ["AGR1"]
unit = "ft"

[setup_exposure_buildings]
asset_locations = "nsi"
occupancy_type = "nsi"
max_potential_damage = "nsi"
ground_floor_height = 1
unit = "ft"

[setup_exposure_roads]
roads_fn = "osm_roads"
road_types = ["primary", "secondary"]
road_damage = 70
unit = "ft"

[setup_aggregation_areas]
aggregation_area_fn = ["base_zones", "land_use"]
attribute_names = ["ZONE_BASE", "LAND_USE"]
label_names = ["Zoning_map", "Land_use_map"]

[setup_hazard]
map_fn = ["flood_rp10", "flood_rp100"]
risk_output = true
crs = "EPSG:4326"
"#;

    #[test]
    fn test_parse_full_config() {
        let config = BuildConfig::from_toml_str(CONFIG).unwrap();

        let global = config.setup_global_settings.unwrap();
        assert_eq!(global.crs, Crs::WGS84);
        assert!(global.region.unwrap().bounding_box().is_some());

        let output = config.setup_output.unwrap();
        assert_eq!(output.output_csv_name, "output.csv");

        let vulnerability = config.setup_vulnerability.unwrap();
        assert_eq!(vulnerability.functions_mean, OneOrMany::One("default".to_string()));
        assert_eq!(
            vulnerability.functions_max,
            Some(OneOrMany::Many(vec!["AGR1".to_string()]))
        );

        let buildings = config.setup_exposure_buildings.unwrap();
        assert_eq!(buildings.ground_floor_height, Some(GroundFloorHeight::Constant(1.0)));
        assert_eq!(buildings.extraction_method, ExtractionMethod::Centroid);
        assert_eq!(buildings.damage_types, vec!["structure", "content"]);

        let roads = config.setup_exposure_roads.unwrap();
        assert_eq!(roads.road_damage, RoadDamageSettings::PerLength(70.0));
        assert_eq!(roads.road_type_attribute, "highway");

        let hazard = config.setup_hazard.unwrap();
        assert!(hazard.risk_output);
        assert_eq!(hazard.map_fn.len(), 2);

        assert!(config.setup_social_vulnerability_index.is_none());
        assert!(config.setup_exposure_raster.is_none());
    }

    #[test]
    fn test_ground_floor_height_attribute() {
        let config = BuildConfig::from_toml_str(
            r#"
[setup_exposure_buildings]
asset_locations = "buildings"
occupancy_type = "landuse"
max_potential_damage = "jrc_damage_values"
ground_floor_height = "found_ht"
unit = "m"
extraction_method = "area"
country = "Netherlands"
"#,
        )
        .unwrap();
        let buildings = config.setup_exposure_buildings.unwrap();
        assert_eq!(
            buildings.ground_floor_height,
            Some(GroundFloorHeight::Attribute("found_ht".to_string()))
        );
        assert_eq!(buildings.extraction_method, ExtractionMethod::Area);
    }

    #[test]
    fn test_unknown_extraction_method_rejected() {
        let result = BuildConfig::from_toml_str(
            r#"
[setup_exposure_buildings]
asset_locations = "nsi"
occupancy_type = "nsi"
max_potential_damage = "nsi"
unit = "m"
extraction_method = "nearest"
"#,
        );
        assert!(result.is_err());
    }
}
