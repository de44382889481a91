//! Column names of the Delft-FIAT exposure table

pub const OBJECT_ID: &str = "Object ID";
pub const OBJECT_NAME: &str = "Object Name";
pub const PRIMARY_OBJECT_TYPE: &str = "Primary Object Type";
pub const SECONDARY_OBJECT_TYPE: &str = "Secondary Object Type";
pub const X_COORDINATE: &str = "X Coordinate";
pub const Y_COORDINATE: &str = "Y Coordinate";
pub const EXTRACTION_METHOD: &str = "Extraction Method";
pub const GROUND_FLOOR_HEIGHT: &str = "Ground Floor Height";
pub const GROUND_ELEVATION: &str = "Ground Elevation";

pub const DAMAGE_FUNCTION_PREFIX: &str = "Damage Function: ";
pub const MAX_POTENTIAL_DAMAGE_PREFIX: &str = "Max Potential Damage: ";
pub const AGGREGATION_LABEL_PREFIX: &str = "Aggregation Label: ";

pub const SVI: &str = "SVI";
pub const SVI_KEY_DOMAIN: &str = "SVI_key_domain";
pub const SEGMENT_LENGTH: &str = "Segment Length";

pub const REQUIRED_COLUMNS: [&str; 3] = [OBJECT_ID, EXTRACTION_METHOD, GROUND_FLOOR_HEIGHT];

/// Damage type whose damage function and max damage columns are mandatory
pub const REQUIRED_DAMAGE_TYPE: &str = "Structure";

/// Fixed columns in the order they are written
pub const FIXED_COLUMNS: [&str; 9] = [
    OBJECT_ID,
    OBJECT_NAME,
    PRIMARY_OBJECT_TYPE,
    SECONDARY_OBJECT_TYPE,
    X_COORDINATE,
    Y_COORDINATE,
    EXTRACTION_METHOD,
    GROUND_FLOOR_HEIGHT,
    GROUND_ELEVATION,
];

pub fn damage_function(damage_type: &str) -> String {
    format!("{}{}", DAMAGE_FUNCTION_PREFIX, damage_type)
}

pub fn max_potential_damage(damage_type: &str) -> String {
    format!("{}{}", MAX_POTENTIAL_DAMAGE_PREFIX, damage_type)
}

pub fn aggregation_label(label: &str) -> String {
    format!("{}{}", AGGREGATION_LABEL_PREFIX, label)
}
