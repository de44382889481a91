use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::collect::tables::Table;
use crate::error::{FiatError, Result};

/// Maximum damage per occupancy and damage type, per unit of floor area
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DamageValues {
    values: BTreeMap<String, BTreeMap<String, f64>>,
}

impl DamageValues {
    pub fn insert(&mut self, occupancy: &str, damage_type: &str, value: f64) {
        self.values
            .entry(occupancy.to_lowercase())
            .or_default()
            .insert(damage_type.to_lowercase(), value);
    }

    /// Case-insensitive lookup
    pub fn get(&self, occupancy: &str, damage_type: &str) -> Option<f64> {
        self.values
            .get(&occupancy.to_lowercase())?
            .get(&damage_type.to_lowercase())
            .copied()
    }

    pub fn contains(&self, occupancy: &str) -> bool {
        self.values.contains_key(&occupancy.to_lowercase())
    }

    pub fn occupancies(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Pick the preprocessing from the table layout: a `Country` column
    /// means JRC values, otherwise Hazus
    pub fn from_table(table: &Table, country: Option<&str>) -> Result<Self> {
        if table.column_index("Country").is_some() {
            let country = country.ok_or_else(|| {
                FiatError::config("JRC damage values need a 'country' to select from")
            })?;
            preprocess_jrc_damage_values(table, country, &JrcAdjustments::default())
        } else {
            preprocess_hazus_damage_values(table)
        }
    }
}

/// Corrections applied to the JRC construction costs, per building class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JrcAdjustments {
    pub construction_cost_vs_depreciated_value_res: f64,
    pub construction_cost_vs_depreciated_value_com: f64,
    pub construction_cost_vs_depreciated_value_ind: f64,
    pub max_damage_content_inventory_res: f64,
    pub max_damage_content_inventory_com: f64,
    pub max_damage_content_inventory_ind: f64,
    pub undamageable_part_res: f64,
    pub undamageable_part_com: f64,
    pub undamageable_part_ind: f64,
    pub material_used_res: f64,
    pub material_used_com: f64,
    pub material_used_ind: f64,
}

impl Default for JrcAdjustments {
    fn default() -> Self {
        JrcAdjustments {
            construction_cost_vs_depreciated_value_res: 0.6,
            construction_cost_vs_depreciated_value_com: 0.6,
            construction_cost_vs_depreciated_value_ind: 0.6,
            max_damage_content_inventory_res: 0.5,
            max_damage_content_inventory_com: 1.0,
            max_damage_content_inventory_ind: 1.5,
            undamageable_part_res: 0.4,
            undamageable_part_com: 0.4,
            undamageable_part_ind: 0.4,
            material_used_res: 1.0,
            material_used_com: 1.0,
            material_used_ind: 1.0,
        }
    }
}

impl JrcAdjustments {
    /// (depreciation, content share, undamageable part, material used)
    fn for_class(&self, class: BuildingClass) -> (f64, f64, f64, f64) {
        match class {
            BuildingClass::Residential => (
                self.construction_cost_vs_depreciated_value_res,
                self.max_damage_content_inventory_res,
                self.undamageable_part_res,
                self.material_used_res,
            ),
            BuildingClass::Commercial => (
                self.construction_cost_vs_depreciated_value_com,
                self.max_damage_content_inventory_com,
                self.undamageable_part_com,
                self.material_used_com,
            ),
            BuildingClass::Industrial => (
                self.construction_cost_vs_depreciated_value_ind,
                self.max_damage_content_inventory_ind,
                self.undamageable_part_ind,
                self.material_used_ind,
            ),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum BuildingClass {
    Residential,
    Commercial,
    Industrial,
}

impl BuildingClass {
    const ALL: [BuildingClass; 3] = [
        BuildingClass::Residential,
        BuildingClass::Commercial,
        BuildingClass::Industrial,
    ];

    fn name(self) -> &'static str {
        match self {
            BuildingClass::Residential => "residential",
            BuildingClass::Commercial => "commercial",
            BuildingClass::Industrial => "industrial",
        }
    }

    fn cost_column(self) -> &'static str {
        match self {
            BuildingClass::Residential => "Construction Cost Residential (2010 €)",
            BuildingClass::Commercial => "Construction Cost Commercial (2010 €)",
            BuildingClass::Industrial => "Construction Cost Industrial (2010 €)",
        }
    }
}

/// Structure, content and total damage per building class for one country
/// of the JRC construction cost table
pub fn preprocess_jrc_damage_values(
    table: &Table,
    country: &str,
    adjustments: &JrcAdjustments,
) -> Result<DamageValues> {
    let row = (0..table.len())
        .find(|&row| {
            table
                .get(row, "Country")
                .is_some_and(|c| c.eq_ignore_ascii_case(country.trim()))
        })
        .ok_or_else(|| {
            FiatError::config(format!("country '{}' not found in the JRC damage values", country))
        })?;

    let mut values = DamageValues::default();
    for class in BuildingClass::ALL {
        let base = table.get_f64(row, class.cost_column()).ok_or_else(|| {
            FiatError::config(format!(
                "no numeric '{}' for country '{}'",
                class.cost_column(),
                country
            ))
        })?;
        let (depreciation, content_share, undamageable, material) = adjustments.for_class(class);

        let structure = base * depreciation * (1.0 - undamageable) * material;
        let content = structure * content_share;
        values.insert(class.name(), "structure", structure);
        values.insert(class.name(), "content", content);
        values.insert(class.name(), "total", structure + content);
        debug!(
            "JRC {} damage for {}: structure {:.2}, content {:.2}",
            class.name(),
            country,
            structure,
            content
        );
    }
    Ok(values)
}

const HAZUS_STRUCTURE: &str = "Maximum structure damage [$/sq.ft] (2018)";
const HAZUS_CONTENT_SHARE: &str = "Maximum content damages [% of maximum structural damages]";
const HAZUS_OCCUPANCY: &str = "Occupancy/utility type";

/// Structure and content damage per Hazus occupancy type
pub fn preprocess_hazus_damage_values(table: &Table) -> Result<DamageValues> {
    table.require_column(HAZUS_OCCUPANCY)?;
    table.require_column(HAZUS_STRUCTURE)?;
    table.require_column(HAZUS_CONTENT_SHARE)?;

    let mut values = DamageValues::default();
    for row in 0..table.len() {
        let Some(occupancy) = table.get(row, HAZUS_OCCUPANCY) else {
            continue;
        };
        let (Some(structure), Some(share)) = (
            table.get_f64(row, HAZUS_STRUCTURE),
            table.get_f64(row, HAZUS_CONTENT_SHARE),
        ) else {
            return Err(FiatError::config(format!(
                "Hazus damage values for '{}' are not numeric",
                occupancy
            )));
        };
        values.insert(occupancy, "structure", structure);
        values.insert(occupancy, "content", structure * share / 100.0);
    }
    info!("Read Hazus damage values for {} occupancy types", values.len());
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    const JRC: &str = "Country;Construction Cost Residential (2010 €);Construction Cost Commercial (2010 €);Construction Cost Industrial (2010 €)
Netherlands;700;600;500
Belgium;650;550;450
";

    #[test]
    fn test_jrc_default_adjustments() {
        let table = Table::from_csv_str(JRC).unwrap();
        let values =
            preprocess_jrc_damage_values(&table, "netherlands", &JrcAdjustments::default()).unwrap();

        // 700 * 0.6 * (1 - 0.4) * 1
        let structure = values.get("residential", "structure").unwrap();
        assert!((structure - 252.0).abs() < 1e-9);
        assert!((values.get("residential", "content").unwrap() - 126.0).abs() < 1e-9);
        assert!((values.get("residential", "total").unwrap() - 378.0).abs() < 1e-9);
        // industrial content share is 1.5
        assert!((values.get("Industrial", "Content").unwrap() - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_jrc_unknown_country() {
        let table = Table::from_csv_str(JRC).unwrap();
        let result = preprocess_jrc_damage_values(&table, "Atlantis", &JrcAdjustments::default());
        assert!(matches!(result, Err(FiatError::Configuration(_))));
    }

    #[test]
    fn test_hazus_content_from_percentage() {
        let table = Table::from_csv_str(
            "Occupancy/utility type,Maximum structure damage [$/sq.ft] (2018),Maximum content damages [% of maximum structural damages]\nRES1,100,50\nCOM1,80,100\n",
        )
        .unwrap();
        let values = DamageValues::from_table(&table, None).unwrap();
        assert_eq!(values.get("RES1", "structure"), Some(100.0));
        assert_eq!(values.get("res1", "content"), Some(50.0));
        assert_eq!(values.get("COM1", "content"), Some(80.0));
        assert!(!values.contains("IND1"));
    }

    #[test]
    fn test_from_table_needs_country_for_jrc() {
        let table = Table::from_csv_str(JRC).unwrap();
        assert!(DamageValues::from_table(&table, None).is_err());
        assert_eq!(DamageValues::from_table(&table, Some("Belgium")).unwrap().len(), 3);
    }
}
