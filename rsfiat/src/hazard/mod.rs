//! Hazard map ingestion and return-period stacking

pub mod ingest;
pub mod raster;
pub mod raster_io;
pub mod request;

pub use ingest::{ingest_hazard_maps, HazardIngestion};
pub use raster::{Analysis, Grid, HazardMaps, HazardRaster, RiskDataset};
pub use raster_io::{GeoTiffIo, RasterReader, RasterWriter};
pub use request::{HazardMapSpec, HazardRequest};
