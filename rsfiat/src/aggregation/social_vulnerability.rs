use log::{info, warn};

use crate::collect::vector::VectorLayer;
use crate::commons::spatial_join::FeatureIndex;
use crate::error::Result;
use crate::exposure::columns::{SVI, SVI_KEY_DOMAIN};
use crate::exposure::ExposureVector;

/// Attach the social vulnerability index of the area each asset lies in
///
/// Sets `SVI` from `index_attribute` and `SVI_key_domain` from
/// `key_attribute`. Returns the number of assets that received a value;
/// when none do, a warning is logged and the exposure is left as is.
pub fn join_social_vulnerability(
    exposure: &mut ExposureVector,
    layer: VectorLayer,
    index_attribute: &str,
    key_attribute: &str,
) -> Result<usize> {
    let layer = layer.to_crs(exposure.crs)?;
    let index = FeatureIndex::new(&layer);
    let geometries = exposure.asset_geometries();

    let matches: Vec<Option<(Option<String>, Option<String>)>> = geometries
        .iter()
        .map(|g| {
            let hit = index.first_at_centroid(g.as_ref()?)?;
            let feature = &layer.features[hit];
            Some((
                feature.property_str(index_attribute),
                feature.property_str(key_attribute),
            ))
        })
        .collect();

    let matched = matches.iter().filter(|m| m.is_some()).count();
    if matched == 0 {
        warn!(
            "No assets fall inside the social vulnerability areas, '{}' is not added",
            SVI
        );
        return Ok(0);
    }

    for (row, found) in exposure.rows.iter_mut().zip(matches) {
        let Some((svi, key)) = found else {
            continue;
        };
        if let Some(svi) = svi {
            row.extra.insert(SVI.to_string(), svi);
        }
        if let Some(key) = key {
            row.extra.insert(SVI_KEY_DOMAIN.to_string(), key);
        }
    }
    info!(
        "Joined the social vulnerability index to {} of {} assets",
        matched,
        exposure.len()
    );
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::vector::VectorFeature;
    use crate::exposure::ExposureRow;
    use crate::geo_core::Crs;
    use geo::{polygon, Geometry};

    fn blockgroups() -> VectorLayer {
        let mut layer = VectorLayer::new(Crs::WGS84);
        layer.features.push(
            VectorFeature::new(Geometry::Polygon(polygon![
                (x: -80.0, y: 32.7), (x: -79.9, y: 32.7), (x: -79.9, y: 32.8), (x: -80.0, y: 32.8)
            ]))
            .with_property("SVI", 0.42)
            .with_property("GEOID", "450190001001"),
        );
        layer
    }

    fn exposure(points: &[(f64, f64)]) -> ExposureVector {
        let mut exposure = ExposureVector::new(Crs::WGS84);
        for (i, (x, y)) in points.iter().enumerate() {
            let mut row = ExposureRow::new(i as i64 + 1);
            row.x = Some(*x);
            row.y = Some(*y);
            exposure.rows.push(row);
        }
        exposure
    }

    #[test]
    fn test_svi_attached() {
        let mut exposure = exposure(&[(-79.95, 32.75), (-81.0, 33.0)]);
        let matched = join_social_vulnerability(&mut exposure, blockgroups(), "SVI", "GEOID").unwrap();
        assert_eq!(matched, 1);
        assert_eq!(exposure.rows[0].get(SVI).as_deref(), Some("0.42"));
        assert_eq!(exposure.rows[0].get(SVI_KEY_DOMAIN).as_deref(), Some("450190001001"));
        assert_eq!(exposure.rows[1].get(SVI), None);
    }

    #[test]
    fn test_no_match_leaves_exposure_unchanged() {
        let mut exposure = exposure(&[(5.0, 52.0)]);
        let before = exposure.clone();
        let matched = join_social_vulnerability(&mut exposure, blockgroups(), "SVI", "GEOID").unwrap();
        assert_eq!(matched, 0);
        assert_eq!(exposure, before);
    }
}
