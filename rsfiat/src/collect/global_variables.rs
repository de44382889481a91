use std::path::PathBuf;

/// Model sub folders, created on demand when writing
pub const FOLDERS: [&str; 4] = ["hazard", "exposure", "vulnerability", "output"];

pub const SETTINGS_FILE: &str = "settings.toml";
pub const EXPOSURE_CSV: &str = "exposure/exposure.csv";
pub const VULNERABILITY_CSV: &str = "vulnerability/vulnerability_curves.csv";
pub const RISK_MAP_NAME: &str = "risk_map";

/// Default nodata for hazard grids without one
pub const DEFAULT_NODATA: f64 = -9999.0;

/// Offset between the floodproofing level and the first damaging depth
pub const TRUNCATION_OFFSET: f64 = 0.01;

pub fn exposure_geom_path(name: &str) -> PathBuf {
    PathBuf::from("exposure").join(format!("{}.geojson", name))
}

pub fn hazard_path(name: &str) -> PathBuf {
    PathBuf::from("hazard").join(format!("{}.tif", name))
}
