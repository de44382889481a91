//! Spatial joins that add zone labels and social vulnerability to exposure

pub mod aggregation_areas;
pub mod social_vulnerability;

pub use aggregation_areas::join_exposure_aggregation_areas;
pub use social_vulnerability::join_social_vulnerability;
