use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::commons::basic_functions::format_number;
use crate::error::{FiatError, Result};
use crate::exposure::columns::*;

/// How the hazard is sampled at an asset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    #[default]
    Centroid,
    Area,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionMethod::Centroid => write!(f, "centroid"),
            ExtractionMethod::Area => write!(f, "area"),
        }
    }
}

impl FromStr for ExtractionMethod {
    type Err = FiatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "centroid" => Ok(ExtractionMethod::Centroid),
            "area" => Ok(ExtractionMethod::Area),
            other => Err(FiatError::config(format!(
                "unknown extraction method '{}', use 'centroid' or 'area'",
                other
            ))),
        }
    }
}

/// One asset of the exposure table
///
/// Per damage type columns (`Damage Function: Structure`, ...) are keyed by
/// the damage type as written in the header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExposureRow {
    pub object_id: i64,
    pub object_name: Option<String>,
    pub primary_object_type: Option<String>,
    pub secondary_object_type: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub extraction_method: Option<ExtractionMethod>,
    pub ground_floor_height: Option<f64>,
    pub ground_elevation: Option<f64>,
    pub damage_functions: BTreeMap<String, String>,
    pub max_potential_damage: BTreeMap<String, f64>,
    pub aggregation_labels: BTreeMap<String, String>,
    /// Any other column, e.g. `SVI`
    pub extra: BTreeMap<String, String>,
}

impl ExposureRow {
    pub fn new(object_id: i64) -> Self {
        ExposureRow {
            object_id,
            ..Default::default()
        }
    }

    /// Occupancy used for linking: secondary type, else primary type
    pub fn occupancy(&self) -> Option<&str> {
        self.secondary_object_type
            .as_deref()
            .or(self.primary_object_type.as_deref())
    }

    /// Cell value by column name, formatted for CSV output
    pub fn get(&self, column: &str) -> Option<String> {
        match column {
            OBJECT_ID => Some(self.object_id.to_string()),
            OBJECT_NAME => self.object_name.clone(),
            PRIMARY_OBJECT_TYPE => self.primary_object_type.clone(),
            SECONDARY_OBJECT_TYPE => self.secondary_object_type.clone(),
            X_COORDINATE => self.x.map(format_number),
            Y_COORDINATE => self.y.map(format_number),
            EXTRACTION_METHOD => self.extraction_method.map(|m| m.to_string()),
            GROUND_FLOOR_HEIGHT => self.ground_floor_height.map(format_number),
            GROUND_ELEVATION => self.ground_elevation.map(format_number),
            _ => {
                if let Some(dt) = column.strip_prefix(DAMAGE_FUNCTION_PREFIX) {
                    self.damage_functions.get(dt).cloned()
                } else if let Some(dt) = column.strip_prefix(MAX_POTENTIAL_DAMAGE_PREFIX) {
                    self.max_potential_damage.get(dt).map(|v| format_number(*v))
                } else if let Some(label) = column.strip_prefix(AGGREGATION_LABEL_PREFIX) {
                    self.aggregation_labels.get(label).cloned()
                } else {
                    self.extra.get(column).cloned()
                }
            }
        }
    }

    /// Set a cell from its text form; empty text clears optional cells
    pub fn set(&mut self, column: &str, value: &str) -> Result<()> {
        let value = value.trim();
        let text = (!value.is_empty()).then(|| value.to_string());
        match column {
            OBJECT_ID => self.object_id = parse_id(value)?,
            OBJECT_NAME => self.object_name = text,
            PRIMARY_OBJECT_TYPE => self.primary_object_type = text,
            SECONDARY_OBJECT_TYPE => self.secondary_object_type = text,
            X_COORDINATE => self.x = parse_number(column, value)?,
            Y_COORDINATE => self.y = parse_number(column, value)?,
            EXTRACTION_METHOD => {
                self.extraction_method = text.map(|t| t.parse()).transpose()?
            }
            GROUND_FLOOR_HEIGHT => self.ground_floor_height = parse_number(column, value)?,
            GROUND_ELEVATION => self.ground_elevation = parse_number(column, value)?,
            _ => {
                if let Some(dt) = column.strip_prefix(DAMAGE_FUNCTION_PREFIX) {
                    set_or_clear(&mut self.damage_functions, dt, text);
                } else if let Some(dt) = column.strip_prefix(MAX_POTENTIAL_DAMAGE_PREFIX) {
                    set_or_clear(
                        &mut self.max_potential_damage,
                        dt,
                        parse_number(column, value)?,
                    );
                } else if let Some(label) = column.strip_prefix(AGGREGATION_LABEL_PREFIX) {
                    set_or_clear(&mut self.aggregation_labels, label, text);
                } else {
                    set_or_clear(&mut self.extra, column, text);
                }
            }
        }
        Ok(())
    }
}

fn set_or_clear<V>(map: &mut BTreeMap<String, V>, key: &str, value: Option<V>) {
    match value {
        Some(v) => {
            map.insert(key.to_string(), v);
        }
        None => {
            map.remove(key);
        }
    }
}

/// Object IDs may come in as `12` or `12.0`
fn parse_id(value: &str) -> Result<i64> {
    if let Ok(id) = value.parse::<i64>() {
        return Ok(id);
    }
    match value.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 => Ok(v as i64),
        _ => Err(FiatError::config(format!("invalid Object ID '{}'", value))),
    }
}

fn parse_number(column: &str, value: &str) -> Result<Option<f64>> {
    if value.is_empty() || value.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    value
        .parse::<f64>()
        .map(Some)
        .map_err(|_| FiatError::config(format!("'{}' is not a number in column '{}'", value, column)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get_columns() {
        let mut row = ExposureRow::new(0);
        row.set(OBJECT_ID, "42.0").unwrap();
        row.set(EXTRACTION_METHOD, "Centroid").unwrap();
        row.set(&damage_function("Structure"), "RES1").unwrap();
        row.set(&max_potential_damage("Content"), "1500.5").unwrap();
        row.set(&aggregation_label("Zoning"), "Z1").unwrap();
        row.set("SVI", "0.3").unwrap();
        row.set(GROUND_ELEVATION, "").unwrap();

        assert_eq!(row.object_id, 42);
        assert_eq!(row.get(EXTRACTION_METHOD).as_deref(), Some("centroid"));
        assert_eq!(row.get("Damage Function: Structure").as_deref(), Some("RES1"));
        assert_eq!(row.get("Max Potential Damage: Content").as_deref(), Some("1500.5"));
        assert_eq!(row.get("Aggregation Label: Zoning").as_deref(), Some("Z1"));
        assert_eq!(row.get("SVI").as_deref(), Some("0.3"));
        assert_eq!(row.get(GROUND_ELEVATION), None);
    }

    #[test]
    fn test_bad_values_rejected() {
        let mut row = ExposureRow::new(1);
        assert!(row.set(OBJECT_ID, "abc").is_err());
        assert!(row.set(GROUND_FLOOR_HEIGHT, "high").is_err());
        assert!(row.set(EXTRACTION_METHOD, "nearest").is_err());
    }

    #[test]
    fn test_occupancy_falls_back_to_primary() {
        let mut row = ExposureRow::new(1);
        row.primary_object_type = Some("RES".to_string());
        assert_eq!(row.occupancy(), Some("RES"));
        row.secondary_object_type = Some("RES1".to_string());
        assert_eq!(row.occupancy(), Some("RES1"));
    }
}
