use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{FiatError, Result};
use crate::geo_core::Crs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    RasterDataset,
    GeoDataFrame,
    GeoDataset,
    DataFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    Vector,
    Raster,
    Netcdf,
    Csv,
    Xlsx,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub category: Option<String>,
    /// Unit of the values in the source (hazard maps: "m" or "ft")
    #[serde(default)]
    pub unit: Option<String>,
}

/// One named source of the data catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub path: PathBuf,
    pub data_type: DataType,
    pub driver: Driver,
    #[serde(default)]
    pub crs: Option<Crs>,
    #[serde(default)]
    pub meta: Meta,
    /// JSON table mapping FIAT column names to source attribute names
    #[serde(default)]
    pub translation_fn: Option<PathBuf>,
    /// Any further driver options
    #[serde(default)]
    pub attributes: BTreeMap<String, toml::Value>,
}

/// Named geospatial sources, read from a TOML catalog document
///
/// ```toml
/// [nsi]
/// path = "exposure/nsi.geojson"
/// data_type = "GeoDataFrame"
/// driver = "vector"
/// crs = 4326
/// translation_fn = "exposure/nsi_to_fiat.json"
/// meta = { category = "exposure" }
/// ```
///
/// Relative paths are resolved against the directory of the catalog file.
#[derive(Debug, Clone, Default)]
pub struct DataCatalog {
    root: Option<PathBuf>,
    sources: BTreeMap<String, CatalogEntry>,
}

impl DataCatalog {
    pub fn new() -> Self {
        DataCatalog::default()
    }

    /// Read a catalog document
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| FiatError::io(path, e))?;
        let mut catalog = DataCatalog::from_toml_str(&text)?;
        catalog.root = path.parent().map(Path::to_path_buf);
        info!(
            "Read data catalog {:?} with {} sources",
            path,
            catalog.sources.len()
        );
        Ok(catalog)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let sources: BTreeMap<String, CatalogEntry> = toml::from_str(text)?;
        Ok(DataCatalog {
            root: None,
            sources,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    /// Look up a source, failing with `MissingSource` for unknown names
    pub fn get_source(&self, name: &str) -> Result<&CatalogEntry> {
        self.sources
            .get(name)
            .ok_or_else(|| FiatError::MissingSource(format!("data catalog entry '{}'", name)))
    }

    /// Absolute (or catalog-relative) path of a source
    pub fn resolve_path(&self, name: &str) -> Result<PathBuf> {
        let entry = self.get_source(name)?;
        Ok(self.resolve(&entry.path))
    }

    /// Path of the translation table of a source, if it has one
    pub fn translation_path(&self, name: &str) -> Result<Option<PathBuf>> {
        let entry = self.get_source(name)?;
        Ok(entry.translation_fn.as_ref().map(|p| self.resolve(p)))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Resolve either a catalog name or a direct path
    ///
    /// Names known to the catalog win over paths.
    pub fn resolve_source(&self, source: &str) -> SourceRef {
        if let Some(entry) = self.sources.get(source) {
            SourceRef::Catalog {
                name: source.to_string(),
                path: self.resolve(&entry.path),
            }
        } else {
            SourceRef::Path(PathBuf::from(source))
        }
    }
}

/// A source reference after catalog lookup
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRef {
    Catalog { name: String, path: PathBuf },
    Path(PathBuf),
}

impl SourceRef {
    pub fn path(&self) -> &Path {
        match self {
            SourceRef::Catalog { path, .. } => path,
            SourceRef::Path(path) => path,
        }
    }

    pub fn catalog_name(&self) -> Option<&str> {
        match self {
            SourceRef::Catalog { name, .. } => Some(name),
            SourceRef::Path(_) => None,
        }
    }
}
