use log::{info, warn};

use crate::collect::vector::VectorLayer;
use crate::commons::basic_functions::OneOrMany;
use crate::commons::spatial_join::FeatureIndex;
use crate::error::{FiatError, Result};
use crate::exposure::ExposureVector;

/// Label every asset with the zone its centroid falls in, one
/// `Aggregation Label: <label>` column per layer
///
/// `attribute_names` and `label_names` are broadcast over the layers. Assets
/// outside every zone of a layer get no label for it.
pub fn join_exposure_aggregation_areas(
    exposure: &mut ExposureVector,
    layers: Vec<VectorLayer>,
    attribute_names: &OneOrMany<String>,
    label_names: &OneOrMany<String>,
) -> Result<()> {
    if layers.is_empty() {
        return Err(FiatError::config("no aggregation area layers given"));
    }
    let attributes = attribute_names.broadcast(layers.len(), "attribute_names")?;
    let labels = label_names.broadcast(layers.len(), "label_names")?;
    let geometries = exposure.asset_geometries();

    for ((layer, attribute), label) in layers.into_iter().zip(attributes).zip(labels) {
        let layer = layer.to_crs(exposure.crs)?;
        let index = FeatureIndex::new(&layer);

        let mut outside = 0usize;
        for (row, geometry) in exposure.rows.iter_mut().zip(&geometries) {
            let zone = geometry
                .as_ref()
                .and_then(|g| index.first_at_centroid(g))
                .and_then(|hit| layer.features[hit].property_str(&attribute));
            match zone {
                Some(zone) => {
                    row.aggregation_labels.insert(label.clone(), zone);
                }
                None => {
                    row.aggregation_labels.remove(&label);
                    outside += 1;
                }
            }
        }
        if outside > 0 {
            warn!(
                "{} assets are outside the '{}' aggregation areas",
                outside, label
            );
        }
        info!("Added aggregation label '{}' from attribute '{}'", label, attribute);
    }
    Ok(())
}
