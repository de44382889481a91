use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::collect::data_catalog::{DataCatalog, SourceRef};
use crate::commons::basic_functions::OneOrMany;
use crate::error::{FiatError, Result};
use crate::geo_core::Crs;

/// Loading hint for large hazard files, either a block size or `"auto"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkHint {
    Size(u64),
    Named(String),
}

/// The `setup_hazard` section of a build configuration
///
/// Every parameter but `map_fn` may be given once for all maps or once per
/// map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardRequest {
    /// File paths or data catalog names
    pub map_fn: OneOrMany<String>,
    #[serde(default = "default_map_type")]
    pub map_type: OneOrMany<String>,
    #[serde(default)]
    pub rp: Option<OneOrMany<f64>>,
    #[serde(default)]
    pub crs: Option<OneOrMany<Crs>>,
    #[serde(default)]
    pub nodata: Option<OneOrMany<f64>>,
    /// Variable of a multi-variable file (NetCDF)
    #[serde(default)]
    pub var: Option<OneOrMany<String>>,
    #[serde(default)]
    pub chunks: Option<OneOrMany<ChunkHint>>,
    #[serde(default = "default_hazard_type")]
    pub hazard_type: String,
    /// Stack all maps into one risk dataset
    #[serde(default)]
    pub risk_output: bool,
    /// Unit of the hazard values when the catalog does not declare one
    #[serde(default)]
    pub unit: Option<String>,
    /// Factor applied when hazard and exposure units differ; derived from the
    /// two units when omitted
    #[serde(default)]
    pub unit_conversion_factor: Option<f64>,
}

fn default_map_type() -> OneOrMany<String> {
    OneOrMany::One("water_depth".to_string())
}

fn default_hazard_type() -> String {
    "flooding".to_string()
}

impl HazardRequest {
    pub fn new(map_fn: impl Into<OneOrMany<String>>) -> Self {
        HazardRequest {
            map_fn: map_fn.into(),
            map_type: default_map_type(),
            rp: None,
            crs: None,
            nodata: None,
            var: None,
            chunks: None,
            hazard_type: default_hazard_type(),
            risk_output: false,
            unit: None,
            unit_conversion_factor: None,
        }
    }

    /// Expand the request into one `HazardMapSpec` per map
    pub fn normalise(&self) -> Result<Vec<HazardMapSpec>> {
        let sources = self.map_fn.to_vec();
        let n = sources.len();
        if n == 0 {
            return Err(FiatError::config("'map_fn' lists no hazard maps"));
        }

        let map_types = self.map_type.broadcast(n, "map_type")?;
        let rps = broadcast_optional(&self.rp, n, "rp")?;
        let crs = broadcast_optional(&self.crs, n, "crs")?;
        let nodata = broadcast_optional(&self.nodata, n, "nodata")?;
        let vars = broadcast_optional(&self.var, n, "var")?;
        let chunks = broadcast_optional(&self.chunks, n, "chunks")?;

        Ok(sources
            .into_iter()
            .enumerate()
            .map(|(i, source)| HazardMapSpec {
                source,
                map_type: map_types[i].clone(),
                rp: rps[i],
                crs: crs[i],
                nodata: nodata[i],
                var: vars[i].clone(),
                chunks: chunks[i].clone(),
            })
            .collect())
    }
}

fn broadcast_optional<T: Clone>(
    value: &Option<OneOrMany<T>>,
    n: usize,
    what: &str,
) -> Result<Vec<Option<T>>> {
    match value {
        Some(v) => Ok(v.broadcast(n, what)?.into_iter().map(Some).collect()),
        None => Ok(vec![None; n]),
    }
}

/// One hazard map after parameter broadcasting
#[derive(Debug, Clone, PartialEq)]
pub struct HazardMapSpec {
    pub source: String,
    pub map_type: String,
    pub rp: Option<f64>,
    pub crs: Option<Crs>,
    pub nodata: Option<f64>,
    pub var: Option<String>,
    pub chunks: Option<ChunkHint>,
}

impl HazardMapSpec {
    /// Registry name: catalog name or file stem, suffixed with the variable
    pub fn map_name(&self, source: &SourceRef) -> String {
        let base = match source {
            SourceRef::Catalog { name, .. } => name.clone(),
            SourceRef::Path(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.source.clone()),
        };
        match &self.var {
            Some(var) => format!("{}_{}", base, var),
            None => base,
        }
    }
}

/// Resolve every map source and make sure its file exists and its name is unique
///
/// Nothing is loaded before all maps pass.
pub fn resolve_sources(
    map_specs: &[HazardMapSpec],
    catalog: &DataCatalog,
) -> Result<Vec<(SourceRef, String)>> {
    let mut resolved = Vec::with_capacity(map_specs.len());
    for map_spec in map_specs {
        let source = catalog.resolve_source(&map_spec.source);
        if !source.path().exists() {
            return Err(FiatError::MissingSource(match source.catalog_name() {
                Some(name) => format!("hazard map '{}' at {:?}", name, source.path()),
                None => format!("hazard map {:?}", source.path()),
            }));
        }
        let name = map_spec.map_name(&source);
        resolved.push((source, name));
    }

    let mut seen = BTreeSet::new();
    for (_, name) in &resolved {
        if !seen.insert(name.as_str()) {
            return Err(FiatError::DuplicateMapName(name.clone()));
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_scalars_broadcast_to_all_maps() {
        let request: HazardRequest = toml::from_str(
            r#"
map_fn = ["a_rp2.tif", "a_rp10.tif", "a_rp100.tif"]
crs = "EPSG:32617"
nodata = -1.0
chunks = "auto"
"#,
        )
        .unwrap();
        let map_specs = request.normalise().unwrap();
        assert_eq!(map_specs.len(), 3);
        assert!(map_specs.iter().all(|s| s.map_type == "water_depth"));
        assert!(map_specs.iter().all(|s| s.crs == Some(Crs::from_epsg(32617))));
        assert!(map_specs.iter().all(|s| s.nodata == Some(-1.0)));
        assert!(map_specs.iter().all(|s| s.rp.is_none()));
        assert!(map_specs
            .iter()
            .all(|s| s.chunks == Some(ChunkHint::Named("auto".to_string()))));
    }

    #[test]
    fn test_list_length_mismatch_is_configuration_error() {
        let mut request = HazardRequest::new(OneOrMany::Many(vec![
            "a.tif".to_string(),
            "b.tif".to_string(),
            "c.tif".to_string(),
        ]));
        request.rp = Some(OneOrMany::Many(vec![2.0, 10.0]));
        assert!(matches!(
            request.normalise(),
            Err(FiatError::Configuration(_))
        ));
    }

    #[test]
    fn test_map_name_with_variable() {
        let mut map_spec = HazardRequest::new("data/flood.nc".to_string())
            .normalise()
            .unwrap()
            .remove(0);
        let source = SourceRef::Path(PathBuf::from("data/flood.nc"));
        assert_eq!(map_spec.map_name(&source), "flood");
        map_spec.var = Some("max_depth".to_string());
        assert_eq!(map_spec.map_name(&source), "flood_max_depth");
    }

    #[test]
    fn test_missing_file_fails_before_loading() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.tif");
        std::fs::write(&present, b"").unwrap();
        let missing = dir.path().join("missing.tif");

        let request = HazardRequest::new(OneOrMany::Many(vec![
            present.to_string_lossy().into_owned(),
            missing.to_string_lossy().into_owned(),
        ]));
        let map_specs = request.normalise().unwrap();
        match resolve_sources(&map_specs, &DataCatalog::new()) {
            Err(FiatError::MissingSource(msg)) => assert!(msg.contains("missing.tif")),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("flood.tif");
        std::fs::create_dir(dir.path().join("other")).unwrap();
        let second = dir.path().join("other").join("flood.tif");
        std::fs::write(&first, b"").unwrap();
        std::fs::write(&second, b"").unwrap();

        let request = HazardRequest::new(OneOrMany::Many(vec![
            first.to_string_lossy().into_owned(),
            second.to_string_lossy().into_owned(),
        ]));
        let map_specs = request.normalise().unwrap();
        assert!(matches!(
            resolve_sources(&map_specs, &DataCatalog::new()),
            Err(FiatError::DuplicateMapName(name)) if name == "flood"
        ));
    }
}
