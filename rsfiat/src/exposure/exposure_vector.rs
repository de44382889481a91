use geo::{Area, Centroid, ChamberlainDuquetteArea, Geometry, Point};
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::collect::tables::Table;
use crate::collect::vector::{VectorFeature, VectorLayer};
use crate::commons::basic_functions::{capitalize, format_number};
use crate::commons::spatial_join::{FeatureIndex, PointIndex};
use crate::error::{FiatError, Result};
use crate::exposure::columns::*;
use crate::exposure::damage_values::DamageValues;
use crate::exposure::row::{ExposureRow, ExtractionMethod};
use crate::geo_core::Crs;
use crate::vulnerability::{FunctionLink, Vulnerability};

/// Square meters to square feet
const SQ_M_TO_SQ_FT: f64 = 10.763_910_4;

/// Ground floor height given as one number or as a source attribute
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum GroundFloorHeight {
    Constant(f64),
    Attribute(String),
}

/// Assets an operation applies to: `"all"` or a list of Object IDs
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "SelectionInput")]
pub enum ObjectSelection {
    All,
    Ids(Vec<i64>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SelectionInput {
    Keyword(String),
    Ids(Vec<i64>),
}

impl TryFrom<SelectionInput> for ObjectSelection {
    type Error = FiatError;

    fn try_from(value: SelectionInput) -> Result<Self> {
        match value {
            SelectionInput::Keyword(k) if k.eq_ignore_ascii_case("all") => Ok(ObjectSelection::All),
            SelectionInput::Keyword(k) => Err(FiatError::config(format!(
                "object selection must be 'all' or a list of Object IDs, got '{}'",
                k
            ))),
            SelectionInput::Ids(ids) => Ok(ObjectSelection::Ids(ids)),
        }
    }
}

/// Reference for raising ground floor heights
#[derive(Debug, Clone)]
pub enum HeightReference {
    /// Raise to `raise_by` above datum where the floor is lower
    Datum,
    /// Raise to `raise_by` above the reference value found under each asset
    Geom { layer: VectorLayer, attribute: String },
}

/// The exposure table of a FIAT model plus the asset geometries
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureVector {
    pub rows: Vec<ExposureRow>,
    pub crs: Crs,
    /// Length unit of heights and hazard depths ("m" or "ft")
    pub unit: Option<String>,
    /// Geometry layers by name (`buildings`, `roads`), linked by Object ID
    pub geoms: BTreeMap<String, VectorLayer>,
}

impl ExposureVector {
    pub fn new(crs: Crs) -> Self {
        ExposureVector {
            rows: Vec::new(),
            crs,
            unit: None,
            geoms: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn next_object_id(&self) -> i64 {
        self.rows.iter().map(|r| r.object_id).max().unwrap_or(0) + 1
    }

    /// Read a translation table: FIAT column name -> source attribute name
    pub fn read_translation(path: &Path) -> Result<BTreeMap<String, String>> {
        if !path.exists() {
            return Err(FiatError::MissingSource(format!("{:?}", path)));
        }
        let text = fs::read_to_string(path).map_err(|e| FiatError::io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Fill the table from one vector source whose attributes map onto FIAT
    /// columns through `translation`
    ///
    /// Without a translation the source attributes must already carry FIAT
    /// column names. Missing coordinates are taken from the geometry
    /// centroid.
    pub fn setup_buildings_from_single_source(
        &mut self,
        source: VectorLayer,
        translation: Option<&BTreeMap<String, String>>,
        ground_floor_height: Option<&GroundFloorHeight>,
        extraction_method: ExtractionMethod,
    ) -> Result<()> {
        let source = source.to_crs(self.crs)?;
        let mut rows = Vec::with_capacity(source.len());

        for feature in &source.features {
            let mut row = ExposureRow::new(0);
            match translation {
                Some(translation) => {
                    for (column, attribute) in translation {
                        if let Some(value) = feature.property_str(attribute) {
                            row.set(column, &value)?;
                        }
                    }
                }
                None => {
                    for key in feature.properties.keys() {
                        if let Some(value) = feature.property_str(key) {
                            row.set(key, &value)?;
                        }
                    }
                }
            }
            fill_coordinates(&mut row, &feature.geometry);
            if let Some(GroundFloorHeight::Attribute(attribute)) = ground_floor_height {
                row.ground_floor_height = feature.property_f64(attribute);
            }
            rows.push(row);
        }

        let has_ids = translation.map_or(true, |t| t.contains_key(OBJECT_ID));
        self.rows = rows;
        if !has_ids || !self.object_ids_unique() {
            self.reassign_object_ids();
        }

        match ground_floor_height {
            Some(GroundFloorHeight::Constant(value)) => self.setup_ground_floor_height(*value),
            Some(GroundFloorHeight::Attribute(attribute)) => {
                let missing = self.rows.iter().filter(|r| r.ground_floor_height.is_none()).count();
                if missing > 0 {
                    warn!(
                        "{} assets have no '{}', their ground floor height is set to 0",
                        missing, attribute
                    );
                    for row in &mut self.rows {
                        row.ground_floor_height.get_or_insert(0.0);
                    }
                }
            }
            None => {
                if self.rows.iter().any(|r| r.ground_floor_height.is_none()) {
                    self.setup_ground_floor_height(0.0);
                }
            }
        }
        self.setup_extraction_method(extraction_method);
        self.set_geometries("buildings", 0, source.features.into_iter().map(|f| f.geometry));

        info!("Set up {} buildings from a single source", self.len());
        Ok(())
    }

    /// Fill the table from separate location, occupancy and damage sources
    ///
    /// Each location takes the occupancy of the first occupancy polygon
    /// under its centroid. Maximum potential damage is the damage value of
    /// that occupancy times the footprint area (points use the value as is).
    #[allow(clippy::too_many_arguments)]
    pub fn setup_buildings_from_multiple_sources(
        &mut self,
        locations: VectorLayer,
        occupancy: VectorLayer,
        occupancy_attribute: &str,
        primary_attribute: Option<&str>,
        damage_values: &DamageValues,
        damage_types: &[String],
        ground_floor_height: Option<&GroundFloorHeight>,
        extraction_method: ExtractionMethod,
    ) -> Result<()> {
        let locations = locations.to_crs(self.crs)?;
        let occupancy = occupancy.to_crs(self.crs)?;
        let index = FeatureIndex::new(&occupancy);

        let mut rows = Vec::with_capacity(locations.len());
        let mut unmatched = 0usize;
        let mut no_damage = BTreeSet::new();

        for (i, feature) in locations.features.iter().enumerate() {
            let mut row = ExposureRow::new(i as i64 + 1);
            fill_coordinates(&mut row, &feature.geometry);

            match index.first_at_centroid(&feature.geometry) {
                Some(hit) => {
                    let zone = &occupancy.features[hit];
                    row.secondary_object_type = zone.property_str(occupancy_attribute);
                    row.primary_object_type = match primary_attribute {
                        Some(attribute) => zone.property_str(attribute),
                        None => row.secondary_object_type.clone(),
                    };
                }
                None => unmatched += 1,
            }

            let area = self.footprint_area(&feature.geometry);
            for damage_type in damage_types {
                let value = [row.secondary_object_type.as_deref(), row.primary_object_type.as_deref()]
                    .into_iter()
                    .flatten()
                    .find_map(|occ| damage_values.get(occ, damage_type));
                match value {
                    Some(value) => {
                        let total = if area > 0.0 { value * area } else { value };
                        row.max_potential_damage
                            .insert(capitalize(damage_type), (total * 100.0).round() / 100.0);
                    }
                    None => {
                        if let Some(occ) = row.occupancy() {
                            no_damage.insert(occ.to_string());
                        }
                    }
                }
            }

            if let Some(GroundFloorHeight::Attribute(attribute)) = ground_floor_height {
                row.ground_floor_height = feature.property_f64(attribute);
            }
            rows.push(row);
        }

        if unmatched > 0 {
            warn!("{} asset locations are outside the occupancy map", unmatched);
        }
        for occ in &no_damage {
            warn!("No maximum damage values for occupancy '{}'", occ);
        }

        self.rows = rows;
        match ground_floor_height {
            Some(GroundFloorHeight::Constant(value)) => self.setup_ground_floor_height(*value),
            Some(GroundFloorHeight::Attribute(_)) => {
                for row in &mut self.rows {
                    row.ground_floor_height.get_or_insert(0.0);
                }
            }
            None => self.setup_ground_floor_height(0.0),
        }
        self.setup_extraction_method(extraction_method);
        self.set_geometries("buildings", 0, locations.features.into_iter().map(|f| f.geometry));

        info!("Set up {} buildings from multiple sources", self.len());
        Ok(())
    }

    /// Footprint area in the exposure length unit squared, 0 for points
    fn footprint_area(&self, geometry: &Geometry<f64>) -> f64 {
        if self.crs.is_geographic() {
            let sq_m = geometry.chamberlain_duquette_unsigned_area();
            match self.unit.as_deref() {
                Some("ft") | Some("feet") => sq_m * SQ_M_TO_SQ_FT,
                _ => sq_m,
            }
        } else {
            geometry.unsigned_area()
        }
    }

    /// Replace (or add) a geometry layer, tagging features with the Object
    /// IDs of the rows from `start` on, in the same order
    pub(crate) fn set_geometries(
        &mut self,
        name: &str,
        start: usize,
        geometries: impl Iterator<Item = Geometry<f64>>,
    ) {
        let mut layer = VectorLayer::new(self.crs);
        for (row, geometry) in self.rows[start..].iter().zip(geometries) {
            layer
                .features
                .push(VectorFeature::new(geometry).with_property(OBJECT_ID, row.object_id));
        }
        self.geoms.insert(name.to_string(), layer);
    }

    pub fn object_ids_unique(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.rows.len());
        self.rows.iter().all(|r| seen.insert(r.object_id))
    }

    /// Give every row a sequential Object ID starting at 1
    pub fn reassign_object_ids(&mut self) {
        warn!(
            "Object IDs are missing or not unique, assigning 1 to {}",
            self.rows.len()
        );
        for (i, row) in self.rows.iter_mut().enumerate() {
            row.object_id = i as i64 + 1;
        }
    }

    /// Reassign Object IDs when they are not unique; returns whether it did
    pub fn dedupe_object_ids(&mut self) -> bool {
        if self.object_ids_unique() {
            return false;
        }
        self.reassign_object_ids();
        let ids: Vec<i64> = self.rows.iter().map(|r| r.object_id).collect();
        for layer in self.geoms.values_mut() {
            if layer.len() == ids.len() {
                for (feature, id) in layer.features.iter_mut().zip(&ids) {
                    feature.properties.insert(OBJECT_ID.to_string(), (*id).into());
                }
            }
        }
        true
    }

    pub fn setup_ground_floor_height(&mut self, ground_floor_height: f64) {
        for row in &mut self.rows {
            row.ground_floor_height = Some(ground_floor_height);
        }
    }

    pub fn setup_extraction_method(&mut self, extraction_method: ExtractionMethod) {
        for row in &mut self.rows {
            row.extraction_method = Some(extraction_method);
        }
    }

    /// Take ground floor heights from the nearest point within `max_dist`
    ///
    /// Returns the number of updated assets.
    pub fn update_ground_floor_height_from_points(
        &mut self,
        points: VectorLayer,
        attribute: &str,
        max_dist: f64,
    ) -> Result<usize> {
        let points = points.to_crs(self.crs)?;
        let index = PointIndex::new(&points);
        let geometries = self.asset_geometries();

        let mut updated = 0;
        for (row, geometry) in self.rows.iter_mut().zip(geometries) {
            let Some(centroid) = geometry.as_ref().and_then(|g| g.centroid()) else {
                continue;
            };
            let value = index
                .nearest_within(centroid, max_dist)
                .and_then(|idx| points.features[idx].property_f64(attribute));
            if let Some(value) = value {
                row.ground_floor_height = Some(value);
                updated += 1;
            }
        }
        info!(
            "Updated the ground floor height of {} assets from '{}'",
            updated, attribute
        );
        Ok(updated)
    }

    /// Raise the ground floor height of the selected assets
    pub fn raise_ground_floor_height(
        &mut self,
        selection: &ObjectSelection,
        raise_by: f64,
        reference: &HeightReference,
    ) -> Result<()> {
        if self.rows.iter().all(|r| r.ground_floor_height.is_none()) {
            warn!(
                "Trying to update the Ground Floor Height but the attribute does not yet exist in the exposure data."
            );
            return Ok(());
        }
        let idx = self.get_object_ids(selection);
        info!(
            "Setting the ground floor height of {} properties to {}",
            idx.len(),
            format_number(raise_by)
        );

        match reference {
            HeightReference::Datum => {
                for i in idx {
                    let row = &mut self.rows[i];
                    if row.ground_floor_height.is_some_and(|gfh| gfh < raise_by) {
                        row.ground_floor_height = Some(raise_by);
                    }
                }
            }
            HeightReference::Geom { layer, attribute } => {
                let layer = layer.clone().to_crs(self.crs)?;
                let index = FeatureIndex::new(&layer);
                let geometries = self.asset_geometries();
                for i in idx {
                    let reference_value = geometries[i]
                        .as_ref()
                        .map(|g| {
                            index
                                .intersecting(g)
                                .into_iter()
                                .filter_map(|hit| layer.features[hit].property_f64(attribute))
                                .map(|v| v.max(0.0))
                                .fold(0.0, f64::max)
                        })
                        .unwrap_or(0.0);
                    self.rows[i].ground_floor_height = Some(reference_value + raise_by);
                }
            }
        }
        Ok(())
    }

    /// Set the maximum potential damage of the selected assets
    ///
    /// `damage_types` of `None` targets every damage type already present.
    pub fn setup_max_potential_damage(
        &mut self,
        selection: &ObjectSelection,
        damage_types: Option<&[String]>,
        max_potential_damage: f64,
    ) -> usize {
        let damage_types: Vec<String> = match damage_types {
            Some(types) => types.iter().map(|t| capitalize(t)).collect(),
            None => self.damage_types(MAX_POTENTIAL_DAMAGE_PREFIX),
        };
        let idx = self.get_object_ids(selection);
        info!(
            "Setup the maximum potential damage of {} properties.",
            idx.len()
        );
        for &i in &idx {
            for damage_type in &damage_types {
                self.rows[i]
                    .max_potential_damage
                    .insert(damage_type.clone(), max_potential_damage);
            }
        }
        idx.len()
    }

    /// Overwrite maximum potential damages from a table with an `Object ID`
    /// column and `Max Potential Damage: <type>` columns
    pub fn update_max_potential_damage(&mut self, updates: &Table) -> Result<usize> {
        info!(
            "Updating the maximum potential damage of {} properties.",
            updates.len()
        );
        if updates.column_index(OBJECT_ID).is_none() {
            warn!(
                "Trying to update the maximum potential damages but no 'Object ID' column is found."
            );
            return Ok(0);
        }
        let damage_columns: Vec<&String> = updates
            .headers
            .iter()
            .filter(|h| h.starts_with(MAX_POTENTIAL_DAMAGE_PREFIX))
            .collect();
        let positions: HashMap<i64, usize> = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, r)| (r.object_id, i))
            .collect();

        let mut updated = 0;
        for u in 0..updates.len() {
            let Some(id) = updates.get(u, OBJECT_ID) else {
                continue;
            };
            let id = id
                .parse::<f64>()
                .map_err(|_| FiatError::config(format!("invalid Object ID '{}'", id)))?
                as i64;
            let Some(&i) = positions.get(&id) else {
                debug!("Object ID {} not in the exposure data", id);
                continue;
            };
            for column in &damage_columns {
                if let Some(value) = updates.get(u, column) {
                    self.rows[i].set(column, value)?;
                }
            }
            updated += 1;
        }
        Ok(updated)
    }

    /// Link the selected assets to floodproofed copies of their damage
    /// functions, truncated at `floodproof_to`
    pub fn truncate_damage_function(
        &mut self,
        selection: &ObjectSelection,
        floodproof_to: f64,
        damage_types: &[String],
        vulnerability: &mut Vulnerability,
    ) -> Result<()> {
        let idx = self.get_object_ids(selection);
        info!(
            "Floodproofing {} properties for {} {} of water.",
            idx.len(),
            format_number(floodproof_to),
            vulnerability.unit
        );
        let mut renamed: HashMap<String, String> = HashMap::new();
        for i in idx {
            for damage_type in damage_types {
                let damage_type = capitalize(damage_type);
                let Some(current) = self.rows[i].damage_functions.get(&damage_type).cloned() else {
                    continue;
                };
                let new_name = match renamed.get(&current) {
                    Some(name) => name.clone(),
                    None => {
                        let name = vulnerability.truncate(&current, floodproof_to)?;
                        renamed.insert(current.clone(), name.clone());
                        name
                    }
                };
                self.rows[i].damage_functions.insert(damage_type, new_name);
            }
        }
        Ok(())
    }

    /// Set damage functions from occupancy links
    ///
    /// Links without a damage type apply to all `damage_types`. Returns the
    /// number of assets that received at least one damage function.
    pub fn link_exposure_vulnerability(
        &mut self,
        links: &[FunctionLink],
        damage_types: &[String],
    ) -> usize {
        let mut by_occupancy: HashMap<&str, Vec<&FunctionLink>> = HashMap::new();
        for link in links {
            by_occupancy
                .entry(link.exposure_link.as_str())
                .or_default()
                .push(link);
        }

        let mut linked = 0;
        let mut unlinked = BTreeSet::new();
        for row in &mut self.rows {
            let Some(occupancy) = row.occupancy().map(str::to_string) else {
                continue;
            };
            let Some(matches) = by_occupancy.get(occupancy.as_str()) else {
                unlinked.insert(occupancy);
                continue;
            };
            for link in matches {
                match &link.damage_type {
                    Some(dt) => {
                        row.damage_functions
                            .insert(capitalize(dt), link.function_name.clone());
                    }
                    None => {
                        for dt in damage_types {
                            row.damage_functions
                                .insert(capitalize(dt), link.function_name.clone());
                        }
                    }
                }
            }
            linked += 1;
        }
        for occupancy in unlinked {
            warn!("No damage function linked to occupancy '{}'", occupancy);
        }
        linked
    }

    /// Damage types present in any row for the given column prefix
    fn damage_types(&self, prefix: &str) -> Vec<String> {
        let mut types = BTreeSet::new();
        for row in &self.rows {
            let keys = if prefix == DAMAGE_FUNCTION_PREFIX {
                row.damage_functions.keys().collect::<Vec<_>>()
            } else {
                row.max_potential_damage.keys().collect::<Vec<_>>()
            };
            types.extend(keys.into_iter().cloned());
        }
        types.into_iter().collect()
    }

    /// Columns with at least one value, in output order
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = FIXED_COLUMNS
            .iter()
            .filter(|c| **c == OBJECT_ID || self.rows.iter().any(|r| r.get(c).is_some()))
            .map(|c| c.to_string())
            .collect();

        let mut damage_types = self.damage_types(DAMAGE_FUNCTION_PREFIX);
        for dt in self.damage_types(MAX_POTENTIAL_DAMAGE_PREFIX) {
            if !damage_types.contains(&dt) {
                damage_types.push(dt);
            }
        }
        // Structure first, then the others alphabetically
        damage_types.sort_by_key(|dt| (dt != REQUIRED_DAMAGE_TYPE, dt.clone()));
        for dt in &damage_types {
            if self.rows.iter().any(|r| r.damage_functions.contains_key(dt)) {
                columns.push(damage_function(dt));
            }
        }
        for dt in &damage_types {
            if self.rows.iter().any(|r| r.max_potential_damage.contains_key(dt)) {
                columns.push(max_potential_damage(dt));
            }
        }

        let labels: BTreeSet<&String> = self
            .rows
            .iter()
            .flat_map(|r| r.aggregation_labels.keys())
            .collect();
        columns.extend(labels.into_iter().map(|l| aggregation_label(l)));

        let mut extra: Vec<&String> = Vec::new();
        for row in &self.rows {
            for key in row.extra.keys() {
                if !extra.contains(&key) {
                    extra.push(key);
                }
            }
        }
        columns.extend(extra.into_iter().cloned());
        columns
    }

    /// Required columns absent from the table, each logged as a warning
    pub fn check_required_columns(&self) -> Vec<String> {
        let columns = self.columns();
        let mut missing = Vec::new();
        for column in REQUIRED_COLUMNS {
            if !columns.iter().any(|c| c == column) {
                warn!("Required column {} not found in exposure data.", column);
                missing.push(column.to_string());
            }
        }
        for column in [
            damage_function(REQUIRED_DAMAGE_TYPE),
            max_potential_damage(REQUIRED_DAMAGE_TYPE),
        ] {
            if !columns.contains(&column) {
                warn!("Required variable column {} not found in exposure data.", column);
                missing.push(column);
            }
        }
        missing
    }

    /// Fail on the first missing required column
    pub fn validate(&self) -> Result<()> {
        match self.check_required_columns().into_iter().next() {
            Some(column) => Err(FiatError::RequiredColumnMissing(column)),
            None => Ok(()),
        }
    }

    /// Row positions of the selected assets
    pub fn get_object_ids(&self, selection: &ObjectSelection) -> Vec<usize> {
        match selection {
            ObjectSelection::All => (0..self.rows.len()).collect(),
            ObjectSelection::Ids(ids) => {
                let wanted: HashSet<i64> = ids.iter().copied().collect();
                self.rows
                    .iter()
                    .enumerate()
                    .filter(|(_, r)| wanted.contains(&r.object_id))
                    .map(|(i, _)| i)
                    .collect()
            }
        }
    }

    /// Rows whose primary type is not a non-building type, optionally
    /// restricted to one primary type (`"ALL"` keeps every building)
    pub fn get_buildings(
        &self,
        object_type: Option<&str>,
        non_building_names: &[String],
    ) -> Vec<&ExposureRow> {
        self.rows
            .iter()
            .filter(|r| {
                !r.primary_object_type
                    .as_ref()
                    .is_some_and(|t| non_building_names.contains(t))
            })
            .filter(|r| match object_type {
                Some(t) if !t.eq_ignore_ascii_case("all") => {
                    r.primary_object_type.as_deref() == Some(t)
                }
                _ => true,
            })
            .collect()
    }

    pub fn primary_object_types(&self) -> Vec<String> {
        unique(self.rows.iter().filter_map(|r| r.primary_object_type.clone()))
    }

    pub fn secondary_object_types(&self) -> Vec<String> {
        unique(self.rows.iter().filter_map(|r| r.secondary_object_type.clone()))
    }

    /// Geometry per row: from the geometry layers, else the X/Y point
    pub fn asset_geometries(&self) -> Vec<Option<Geometry<f64>>> {
        let mut by_id: HashMap<i64, &Geometry<f64>> = HashMap::new();
        for layer in self.geoms.values() {
            for feature in &layer.features {
                if let Some(id) = feature.property_f64(OBJECT_ID) {
                    by_id.entry(id as i64).or_insert(&feature.geometry);
                }
            }
        }
        self.rows
            .iter()
            .map(|row| match by_id.get(&row.object_id) {
                Some(geometry) => Some((*geometry).clone()),
                None => match (row.x, row.y) {
                    (Some(x), Some(y)) => Some(Geometry::Point(Point::new(x, y))),
                    _ => None,
                },
            })
            .collect()
    }

    /// Write the exposure table
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| FiatError::io(parent, e))?;
        }
        let columns = self.columns();
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&columns)?;
        for row in &self.rows {
            writer.write_record(columns.iter().map(|c| row.get(c).unwrap_or_default()))?;
        }
        writer.flush().map_err(|e| FiatError::io(path, e))?;
        debug!("Wrote {} exposure rows to {:?}", self.len(), path);
        Ok(())
    }

    /// Read an exposure table; the delimiter is detected
    pub fn read_csv(path: &Path, crs: Crs) -> Result<Self> {
        let table = Table::read_csv(path)?;
        table.require_column(OBJECT_ID)?;

        let mut exposure = ExposureVector::new(crs);
        for cells in &table.rows {
            let mut row = ExposureRow::new(0);
            for (column, value) in table.headers.iter().zip(cells) {
                row.set(column, value)?;
            }
            exposure.rows.push(row);
        }
        info!("Read {} exposure rows from {:?}", exposure.len(), path);
        Ok(exposure)
    }
}

fn fill_coordinates(row: &mut ExposureRow, geometry: &Geometry<f64>) {
    if row.x.is_some() && row.y.is_some() {
        return;
    }
    if let Some(c) = geometry.centroid() {
        row.x = Some(c.x());
        row.y = Some(c.y());
    }
}

fn unique(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values.filter(|v| seen.insert(v.clone())).collect()
}
