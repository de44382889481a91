use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::commons::basic_functions::format_number;
use crate::error::{FiatError, Result};
use crate::geo_core::Crs;

/// Georeferencing of a regular grid
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub width: usize,
    pub height: usize,
    /// GDAL affine transform: origin x, pixel width, row rotation,
    /// origin y, column rotation, pixel height
    pub transform: [f64; 6],
    pub crs: Option<Crs>,
    pub nodata: Option<f64>,
}

impl Grid {
    pub fn new(width: usize, height: usize, transform: [f64; 6]) -> Self {
        Grid {
            width,
            height,
            transform,
            crs: None,
            nodata: None,
        }
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows run from north to south
    pub fn is_north_up(&self) -> bool {
        self.transform[5] < 0.0
    }

    /// Same shape, transform and CRS (nodata is ignored)
    pub fn same_georeference(&self, other: &Grid) -> bool {
        const EPS: f64 = 1e-9;
        self.width == other.width
            && self.height == other.height
            && self.crs == other.crs
            && self
                .transform
                .iter()
                .zip(other.transform.iter())
                .all(|(a, b)| (a - b).abs() <= EPS * a.abs().max(1.0))
    }
}

/// Whether a hazard dataset describes one event or a set of return periods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Analysis {
    Event,
    Risk,
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Analysis::Event => write!(f, "event"),
            Analysis::Risk => write!(f, "risk"),
        }
    }
}

/// Metadata attached to every ingested hazard map
#[derive(Debug, Clone, PartialEq)]
pub struct HazardAttrs {
    pub return_period: Option<String>,
    pub hazard_type: String,
    pub name: String,
    pub analysis: Analysis,
}

impl HazardAttrs {
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(
            "returnperiod".to_string(),
            self.return_period.clone().unwrap_or_else(|| "None".to_string()),
        );
        map.insert("type".to_string(), self.hazard_type.clone());
        map.insert("name".to_string(), self.name.clone());
        map.insert("analysis".to_string(), self.analysis.to_string());
        map
    }
}

/// A single-band hazard grid held in memory
#[derive(Debug, Clone, PartialEq)]
pub struct HazardRaster {
    pub name: String,
    pub grid: Grid,
    pub data: Vec<f64>,
    pub unit: Option<String>,
    pub attrs: Option<HazardAttrs>,
}

impl HazardRaster {
    pub fn new(name: &str, grid: Grid, data: Vec<f64>) -> Result<Self> {
        if data.len() != grid.len() {
            return Err(FiatError::config(format!(
                "raster '{}' has {} cells, grid expects {}",
                name,
                data.len(),
                grid.len()
            )));
        }
        Ok(HazardRaster {
            name: name.to_string(),
            grid,
            data,
            unit: None,
            attrs: None,
        })
    }

    /// Replace the on-disk fill value and NaN cells by `nodata`
    pub fn set_nodata(&mut self, nodata: f64) {
        let previous = self.grid.nodata;
        for value in &mut self.data {
            if is_nodata(*value, previous) {
                *value = nodata;
            }
        }
        self.grid.nodata = Some(nodata);
    }

    /// Flip a south-up grid so rows run from north to south
    pub fn to_north_up(&mut self) {
        if self.grid.is_north_up() || self.grid.height == 0 {
            return;
        }
        let width = self.grid.width;
        let height = self.grid.height;
        for row in 0..height / 2 {
            let (top, bottom) = self.data.split_at_mut((height - 1 - row) * width);
            top[row * width..(row + 1) * width].swap_with_slice(&mut bottom[..width]);
        }
        let t = &mut self.grid.transform;
        t[3] += t[5] * height as f64;
        t[5] = -t[5];
    }

    /// Scale all valid cells by a constant factor
    pub fn scale(&mut self, factor: f64) {
        let nodata = self.grid.nodata;
        for value in &mut self.data {
            if !is_nodata(*value, nodata) {
                *value *= factor;
            }
        }
    }
}

fn is_nodata(value: f64, nodata: Option<f64>) -> bool {
    value.is_nan() || nodata.is_some_and(|nd| value == nd)
}

/// N hazard maps stacked along a return-period axis
#[derive(Debug, Clone, PartialEq)]
pub struct RiskDataset {
    pub name: String,
    pub grid: Grid,
    /// One band per return period, ascending
    pub bands: Vec<Vec<f64>>,
    pub return_periods: Vec<f64>,
    pub names: Vec<String>,
    pub hazard_type: String,
    pub unit: Option<String>,
}

impl RiskDataset {
    /// Stack rasters sorted by return period
    ///
    /// Every raster must carry a return period, share the grid of the first
    /// one, and return periods must be unique.
    pub fn stack(name: &str, mut rasters: Vec<(f64, HazardRaster)>) -> Result<Self> {
        if rasters.is_empty() {
            return Err(FiatError::config("no hazard maps to stack"));
        }
        rasters.sort_by(|a, b| a.0.total_cmp(&b.0));

        for pair in rasters.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(FiatError::config(format!(
                    "hazard maps '{}' and '{}' share return period {}",
                    pair[0].1.name,
                    pair[1].1.name,
                    format_number(pair[0].0)
                )));
            }
        }

        let grid = rasters[0].1.grid.clone();
        let nodata = grid.nodata;
        let first_name = rasters[0].1.name.clone();
        let hazard_type = rasters[0]
            .1
            .attrs
            .as_ref()
            .map(|a| a.hazard_type.clone())
            .unwrap_or_default();
        let unit = rasters[0].1.unit.clone();

        let mut bands = Vec::with_capacity(rasters.len());
        let mut return_periods = Vec::with_capacity(rasters.len());
        let mut names = Vec::with_capacity(rasters.len());

        for (rp, mut raster) in rasters {
            if !raster.grid.same_georeference(&grid) {
                return Err(FiatError::GridMismatch(first_name.clone(), raster.name));
            }
            if let Some(nd) = nodata {
                if raster.grid.nodata != nodata {
                    raster.set_nodata(nd);
                }
            }
            bands.push(raster.data);
            return_periods.push(rp);
            names.push(raster.name);
        }

        Ok(RiskDataset {
            name: name.to_string(),
            grid,
            bands,
            return_periods,
            names,
            hazard_type,
            unit,
        })
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Dataset attributes as written next to the bands
    pub fn attrs(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(
            "returnperiod".to_string(),
            format!(
                "[{}]",
                self.return_periods
                    .iter()
                    .map(|rp| format_number(*rp))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        );
        map.insert("name".to_string(), format!("[{}]", self.names.join(", ")));
        map.insert("type".to_string(), self.hazard_type.clone());
        map.insert("analysis".to_string(), Analysis::Risk.to_string());
        map
    }
}

/// The model's hazard registry
#[derive(Debug, Clone, PartialEq)]
pub enum HazardMaps {
    Event(BTreeMap<String, HazardRaster>),
    Risk(RiskDataset),
}

impl HazardMaps {
    pub fn names(&self) -> Vec<String> {
        match self {
            HazardMaps::Event(maps) => maps.keys().cloned().collect(),
            HazardMaps::Risk(risk) => vec![risk.name.clone()],
        }
    }
}
