//! Exposure table: buildings, roads and their damage attributes

pub mod columns;
pub mod damage_values;
pub mod exposure_vector;
pub mod roads;
pub mod row;

pub use damage_values::{DamageValues, JrcAdjustments};
pub use exposure_vector::{ExposureVector, GroundFloorHeight, HeightReference, ObjectSelection};
pub use roads::RoadDamage;
pub use row::{ExposureRow, ExtractionMethod};
