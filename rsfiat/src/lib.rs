//! Build Delft-FIAT flood risk models: exposure tables, damage functions,
//! hazard maps and the settings that tie them together.

pub mod aggregation;
pub mod collect;
pub mod commons;
pub mod config;
pub mod error;
pub mod exposure;
pub mod geo_core;
pub mod hazard;
pub mod model;
pub mod settings;
pub mod vulnerability;

pub use config::BuildConfig;
pub use error::{FiatError, Result};
pub use model::{FiatModel, SetupStep};
