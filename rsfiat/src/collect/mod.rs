pub mod data_catalog;
pub mod global_variables;
pub mod tables;
pub mod vector;

pub use data_catalog::{CatalogEntry, DataCatalog, DataType, Driver, SourceRef};
pub use vector::{VectorFeature, VectorLayer};
