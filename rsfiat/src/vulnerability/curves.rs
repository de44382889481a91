use csv::{ReaderBuilder, WriterBuilder};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::collect::tables::Table;
use crate::commons::basic_functions::{detect_delimiter, format_number, OneOrMany};
use crate::error::{FiatError, Result};
use crate::vulnerability::function::{road_function, ExtractionPolicy, VulnerabilityFunction};

pub const CURVE_ID: &str = "ID";
pub const LINK_NAME: &str = "Damage Function Name";
pub const LINK_ID: &str = "Damage Function ID";
pub const LINK_EXPOSURE: &str = "Exposure Link";
pub const LINK_DAMAGE_TYPE: &str = "Damage Type";

/// Name of the road step curve
pub const ROAD_FUNCTION: &str = "roads";

/// Links an exposure occupancy type to a damage function for one damage type
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionLink {
    pub function_name: String,
    pub function_id: String,
    pub exposure_link: String,
    pub damage_type: Option<String>,
}

impl FunctionLink {
    /// Rows of a linking table; rows without a name or id are skipped
    pub fn from_table(table: &Table) -> Result<Vec<Self>> {
        table.require_column(LINK_NAME)?;
        table.require_column(LINK_EXPOSURE)?;
        let has_ids = table.column_index(LINK_ID).is_some();

        let mut links = Vec::with_capacity(table.len());
        for row in 0..table.len() {
            let (Some(name), Some(link)) = (table.get(row, LINK_NAME), table.get(row, LINK_EXPOSURE))
            else {
                debug!("Skipping incomplete linking row {}", row + 1);
                continue;
            };
            links.push(FunctionLink {
                function_name: name.to_string(),
                function_id: if has_ids {
                    table.get(row, LINK_ID).unwrap_or(name).to_string()
                } else {
                    name.to_string()
                },
                exposure_link: link.to_string(),
                damage_type: table.get(row, LINK_DAMAGE_TYPE).map(str::to_string),
            });
        }
        Ok(links)
    }
}

/// The damage functions of a model and how they link to exposure
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vulnerability {
    pub unit: String,
    functions: Vec<VulnerabilityFunction>,
    pub links: Vec<FunctionLink>,
}

impl Vulnerability {
    pub fn new(unit: &str) -> Self {
        Vulnerability {
            unit: unit.to_string(),
            functions: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Build the functions named in a linking table from a curve table
    ///
    /// The curve table has an `ID` column and one numeric column per hazard
    /// intensity. Functions listed in `functions_max` use the maximum over
    /// the footprint, all others the mean (`"default"` in `functions_mean`
    /// stands for all of them).
    pub fn from_tables(
        curves: &Table,
        linking: &Table,
        unit: &str,
        functions_mean: &OneOrMany<String>,
        functions_max: Option<&OneOrMany<String>>,
        step_size: Option<f64>,
    ) -> Result<Self> {
        let id_idx = curves.require_column(CURVE_ID)?;
        let depth_columns: Vec<(usize, f64)> = curves
            .headers
            .iter()
            .enumerate()
            .filter_map(|(i, h)| h.trim().parse::<f64>().ok().map(|d| (i, d)))
            .collect();
        if depth_columns.is_empty() {
            return Err(FiatError::config(
                "vulnerability curve table has no hazard intensity columns",
            ));
        }

        let max_names: BTreeSet<String> = functions_max
            .map(|names| names.to_vec().into_iter().collect())
            .unwrap_or_default();
        let mean_names: BTreeSet<String> = functions_mean.to_vec().into_iter().collect();

        let mut curve_points: BTreeMap<&str, Vec<(f64, f64)>> = BTreeMap::new();
        for row in &curves.rows {
            let Some(id) = row.get(id_idx).filter(|s| !s.is_empty()) else {
                continue;
            };
            let points = depth_columns
                .iter()
                .filter_map(|(i, depth)| {
                    row.get(*i)
                        .and_then(|v| v.trim().parse::<f64>().ok())
                        .map(|v| (*depth, v))
                })
                .collect();
            curve_points.insert(id.as_str(), points);
        }

        let links = FunctionLink::from_table(linking)?;
        let mut vulnerability = Vulnerability::new(unit);
        for link in &links {
            if vulnerability.get(&link.function_name).is_some() {
                continue;
            }
            let Some(points) = curve_points.get(link.function_id.as_str()) else {
                warn!(
                    "Damage function '{}' ({}) is not in the curve table",
                    link.function_name, link.function_id
                );
                continue;
            };
            let mut function = VulnerabilityFunction::new(&link.function_name, unit, points.clone());
            function.method = if max_names.contains(&function.name) {
                if mean_names.contains(&function.name) {
                    warn!(
                        "Damage function '{}' listed as mean and max, using max",
                        function.name
                    );
                }
                ExtractionPolicy::Max
            } else {
                ExtractionPolicy::Mean
            };
            if let Some(step) = step_size {
                function = function.resampled(step)?;
            }
            vulnerability.functions.push(function);
        }
        vulnerability.links = links;

        info!(
            "Set up {} damage functions in {}",
            vulnerability.functions.len(),
            unit
        );
        Ok(vulnerability)
    }

    pub fn functions(&self) -> &[VulnerabilityFunction] {
        &self.functions
    }

    pub fn get(&self, name: &str) -> Option<&VulnerabilityFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.functions.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Add a function, replacing one with the same name
    pub fn add(&mut self, function: VulnerabilityFunction) {
        match self.functions.iter_mut().find(|f| f.name == function.name) {
            Some(existing) => *existing = function,
            None => self.functions.push(function),
        }
    }

    /// Add the road step curve named `roads`
    pub fn setup_road_vulnerability(
        &mut self,
        threshold: f64,
        min_hazard_value: f64,
        max_hazard_value: f64,
        step: f64,
    ) -> Result<()> {
        let unit = self.unit.clone();
        let function = road_function(
            ROAD_FUNCTION,
            &unit,
            threshold,
            min_hazard_value,
            max_hazard_value,
            step,
        )?;
        info!(
            "Road damage function: full damage from {} {}",
            format_number(threshold),
            unit
        );
        self.add(function);
        Ok(())
    }

    /// Register the floodproofed variant of `name` and return its name
    pub fn truncate(&mut self, name: &str, floodproof_to: f64) -> Result<String> {
        let function = self
            .get(name)
            .ok_or_else(|| FiatError::config(format!("unknown damage function '{}'", name)))?
            .truncated(floodproof_to);
        let new_name = function.name.clone();
        if self.get(&new_name).is_none() {
            debug!("Created damage function '{}'", new_name);
            self.functions.push(function);
        }
        Ok(new_name)
    }

    /// Write the curves in the Delft-FIAT layout
    ///
    /// ```text
    /// #UNIT=m
    /// #method,mean,max
    /// water depth,AGR1,RES1
    /// 0,0,0
    /// ```
    ///
    /// Every function is sampled at the union of all depths.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| FiatError::io(parent, e))?;
        }
        let mut writer = WriterBuilder::new().flexible(true).from_path(path)?;
        writer.write_record([format!("#UNIT={}", self.unit)])?;

        let mut methods = vec!["#method".to_string()];
        methods.extend(self.functions.iter().map(|f| f.method.to_string()));
        writer.write_record(&methods)?;

        let mut header = vec!["water depth".to_string()];
        header.extend(self.functions.iter().map(|f| f.name.clone()));
        writer.write_record(&header)?;

        let mut depths: Vec<f64> = self.functions.iter().flat_map(|f| f.depths()).collect();
        depths.sort_by(f64::total_cmp);
        depths.dedup();
        for depth in depths {
            let mut record = vec![format_number(depth)];
            record.extend(
                self.functions
                    .iter()
                    .map(|f| format_number((f.value_at(depth) * 1e6).round() / 1e6)),
            );
            writer.write_record(&record)?;
        }
        writer.flush().map_err(|e| FiatError::io(path, e))?;
        debug!("Wrote {} damage functions to {:?}", self.len(), path);
        Ok(())
    }

    /// Read curves written by [`Vulnerability::write_csv`]
    pub fn read_csv(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FiatError::MissingSource(format!("{:?}", path)));
        }
        let text = fs::read_to_string(path).map_err(|e| FiatError::io(path, e))?;
        let mut reader = ReaderBuilder::new()
            .delimiter(detect_delimiter(&text))
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let mut unit = String::new();
        let mut methods: Vec<ExtractionPolicy> = Vec::new();
        let mut names: Vec<String> = Vec::new();
        let mut columns: Vec<Vec<(f64, f64)>> = Vec::new();

        for record in reader.records() {
            let record = record?;
            let Some(first) = record.get(0) else {
                continue;
            };
            if let Some(u) = first.strip_prefix("#UNIT=") {
                unit = u.to_string();
            } else if first.eq_ignore_ascii_case("#method") {
                methods = record
                    .iter()
                    .skip(1)
                    .map(str::parse)
                    .collect::<Result<Vec<_>>>()?;
            } else if names.is_empty() {
                names = record.iter().skip(1).map(str::to_string).collect();
                columns = vec![Vec::new(); names.len()];
            } else {
                let depth: f64 = first.parse().map_err(|_| {
                    FiatError::config(format!("bad depth '{}' in {:?}", first, path))
                })?;
                for (column, value) in columns.iter_mut().zip(record.iter().skip(1)) {
                    if let Ok(value) = value.parse::<f64>() {
                        column.push((depth, value));
                    }
                }
            }
        }

        let mut vulnerability = Vulnerability::new(&unit);
        for (i, (name, points)) in names.into_iter().zip(columns).enumerate() {
            let mut function = VulnerabilityFunction::new(&name, &unit, points);
            function.method = methods.get(i).copied().unwrap_or_default();
            vulnerability.functions.push(function);
        }
        Ok(vulnerability)
    }
}
