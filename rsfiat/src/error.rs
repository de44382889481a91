use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building a FIAT model.
///
/// Structural problems (configuration, missing sources, name collisions)
/// abort the build. Data quality problems are logged by the callers and are
/// only turned into errors through explicit validation.
#[derive(Debug, Error)]
pub enum FiatError {
    /// Parameter lists that cannot be broadcast, unknown options, bad values
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A file or catalog entry that does not exist
    #[error("missing source: {0}")]
    MissingSource(String),

    /// A return period is required but could not be derived
    #[error("could not resolve the return period of hazard map '{0}'")]
    ReturnPeriodResolution(String),

    /// Two hazard maps would be stored under the same name
    #[error("duplicate hazard map name '{0}'")]
    DuplicateMapName(String),

    /// Exposure data lacks a mandatory column
    #[error("required column '{0}' not found in exposure data")]
    RequiredColumnMissing(String),

    /// Two datasets use different coordinate reference systems
    #[error("CRS mismatch: expected {expected}, found {found}")]
    CrsMismatch { expected: String, found: String },

    /// Rasters that must share a grid do not
    #[error("grid mismatch between hazard maps '{0}' and '{1}'")]
    GridMismatch(String, String),

    /// A setup step that exists in the configuration but is not available
    #[error("operation '{0}' is not supported")]
    UnsupportedOperation(String),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    GeoJson(#[from] geojson::Error),

    #[error(transparent)]
    Tiff(#[from] tiff::TiffError),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),

    #[error(transparent)]
    Xml(#[from] quick_xml::DeError),

    #[cfg(feature = "gdal")]
    #[error(transparent)]
    Gdal(#[from] gdal::errors::GdalError),

    #[cfg(feature = "proj")]
    #[error(transparent)]
    Proj(#[from] proj::ProjError),

    #[cfg(feature = "proj")]
    #[error(transparent)]
    ProjCreate(#[from] proj::ProjCreateError),
}

impl FiatError {
    /// Wrap an `io::Error` with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FiatError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        FiatError::Configuration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, FiatError>;
