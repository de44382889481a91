//! Depth-damage curves and their link to exposure

pub mod curves;
pub mod function;

pub use curves::{FunctionLink, Vulnerability, ROAD_FUNCTION};
pub use function::{ExtractionPolicy, VulnerabilityFunction};
