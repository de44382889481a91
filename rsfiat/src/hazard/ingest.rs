use log::{debug, info, warn};
use std::collections::BTreeMap;
use toml::Value;

use crate::collect::data_catalog::{DataCatalog, SourceRef};
use crate::collect::global_variables::{hazard_path, DEFAULT_NODATA, RISK_MAP_NAME};
use crate::commons::basic_functions::{format_number, parse_return_period};
use crate::error::{FiatError, Result};
use crate::hazard::raster::{Analysis, HazardAttrs, HazardMaps, HazardRaster, RiskDataset};
use crate::hazard::raster_io::RasterReader;
use crate::hazard::request::{resolve_sources, HazardMapSpec, HazardRequest};

/// Outcome of hazard ingestion: the registry plus the settings it implies
#[derive(Debug, Clone, PartialEq)]
pub struct HazardIngestion {
    pub maps: HazardMaps,
    /// Dotted FIAT settings keys, e.g. `hazard.crs`
    pub config_updates: BTreeMap<String, Value>,
}

/// Load, normalise and register the hazard maps of a request
///
/// All sources are checked for existence and name collisions before the
/// first map is read. With `risk_output` the maps are stacked along their
/// return periods into a single dataset named `risk_map`.
pub fn ingest_hazard_maps(
    request: &HazardRequest,
    catalog: &DataCatalog,
    reader: &dyn RasterReader,
    exposure_unit: Option<&str>,
    unit_conversion_factor: f64,
) -> Result<HazardIngestion> {
    let map_specs = request.normalise()?;
    let sources = resolve_sources(&map_specs, catalog)?;

    if !request.risk_output && map_specs.len() > 1 {
        info!(
            "{} event hazard maps are kept as separate maps",
            map_specs.len()
        );
    }

    let mut loaded: Vec<(Option<f64>, HazardRaster)> = Vec::with_capacity(map_specs.len());
    for (map_spec, (source, name)) in map_specs.iter().zip(sources) {
        info!("Reading hazard map '{}' from {:?}", name, source.path());
        if let Some(chunks) = &map_spec.chunks {
            debug!("Chunk hint {:?} for '{}' ignored, maps are read whole", chunks, name);
        }
        let mut raster = reader.read(source.path(), map_spec.var.as_deref())?;
        raster.name = name.clone();

        normalise_grid(&mut raster, map_spec, &source, catalog)?;

        let hazard_unit = catalog_unit(&source, catalog).or_else(|| request.unit.clone());
        raster.unit = hazard_unit.clone();
        match (exposure_unit, hazard_unit.as_deref()) {
            (Some(exposure), Some(hazard)) if !same_unit(exposure, hazard) => {
                info!(
                    "Converting hazard map '{}' from {} to {} (factor {})",
                    name, hazard, exposure, unit_conversion_factor
                );
                raster.scale(unit_conversion_factor);
                raster.unit = Some(exposure.to_string());
            }
            (Some(_), None) => {
                warn!("Hazard map '{}' has no unit, values are used as is", name)
            }
            _ => {}
        }

        let rp = if request.risk_output {
            let rp = match map_spec.rp {
                Some(rp) => rp,
                None => source
                    .path()
                    .file_stem()
                    .and_then(|stem| parse_return_period(&stem.to_string_lossy()))
                    .or_else(|| parse_return_period(&name))
                    .ok_or_else(|| FiatError::ReturnPeriodResolution(name.clone()))?,
            };
            debug!("Hazard map '{}' has return period {}", name, format_number(rp));
            Some(rp)
        } else {
            map_spec.rp
        };

        raster.attrs = Some(HazardAttrs {
            return_period: rp.map(format_number),
            hazard_type: request.hazard_type.clone(),
            name: name.clone(),
            analysis: if request.risk_output {
                Analysis::Risk
            } else {
                Analysis::Event
            },
        });
        loaded.push((rp, raster));
    }

    let elevation_reference = elevation_reference(&map_specs[0].map_type);
    let crs = loaded[0].1.grid.crs;

    let maps = if request.risk_output {
        let rasters = loaded
            .into_iter()
            .map(|(rp, raster)| match rp {
                Some(rp) => Ok((rp, raster)),
                None => Err(FiatError::ReturnPeriodResolution(raster.name)),
            })
            .collect::<Result<Vec<_>>>()?;
        let risk = RiskDataset::stack(RISK_MAP_NAME, rasters)?;
        info!(
            "Stacked {} hazard maps into '{}' with return periods [{}]",
            risk.band_count(),
            RISK_MAP_NAME,
            risk.return_periods
                .iter()
                .map(|rp| format_number(*rp))
                .collect::<Vec<_>>()
                .join(", ")
        );
        HazardMaps::Risk(risk)
    } else {
        HazardMaps::Event(
            loaded
                .into_iter()
                .map(|(_, raster)| (raster.name.clone(), raster))
                .collect(),
        )
    };

    let mut config_updates = BTreeMap::new();
    let files: Vec<Value> = maps
        .names()
        .iter()
        .map(|name| Value::String(hazard_path(name).to_string_lossy().replace('\\', "/")))
        .collect();
    config_updates.insert(
        "hazard.file".to_string(),
        if files.len() == 1 {
            files[0].clone()
        } else {
            Value::Array(files)
        },
    );
    if let Some(crs) = crs {
        config_updates.insert("hazard.crs".to_string(), Value::String(crs.to_string()));
    }
    config_updates.insert(
        "hazard.elevation_reference".to_string(),
        Value::String(elevation_reference.to_string()),
    );
    config_updates.insert(
        "hazard.spatial_reference".to_string(),
        Value::String(elevation_reference.to_string()),
    );
    if let HazardMaps::Risk(risk) = &maps {
        config_updates.insert(
            "hazard.return_periods".to_string(),
            Value::Array(risk.return_periods.iter().map(|rp| Value::Float(*rp)).collect()),
        );
    }
    config_updates.insert("hazard.risk".to_string(), Value::Boolean(request.risk_output));
    config_updates.insert(
        "hazard.settings.subset".to_string(),
        match &maps {
            HazardMaps::Risk(risk) => Value::String(risk.name.clone()),
            HazardMaps::Event(events) => {
                Value::Array(events.keys().cloned().map(Value::String).collect())
            }
        },
    );
    config_updates.insert(
        "hazard.multiband.var_as_band".to_string(),
        Value::Boolean(request.risk_output),
    );

    Ok(HazardIngestion {
        maps,
        config_updates,
    })
}

/// `dem` for water depth maps, `datum` for water level maps
pub fn elevation_reference(map_type: &str) -> &'static str {
    if map_type == "water_depth" {
        "dem"
    } else {
        "datum"
    }
}

fn length_unit(unit: &str) -> Option<&'static str> {
    match unit.trim().to_ascii_lowercase().as_str() {
        "m" | "meter" | "meters" | "metre" | "metres" => Some("m"),
        "ft" | "foot" | "feet" => Some("ft"),
        _ => None,
    }
}

/// Whether two unit names denote the same length unit (`ft` and `feet` do)
pub fn same_unit(a: &str, b: &str) -> bool {
    a == b || matches!((length_unit(a), length_unit(b)), (Some(x), Some(y)) if x == y)
}

/// Factor that converts hazard values in `from` into `to`
///
/// Pairs without a known factor are a configuration error.
pub fn unit_conversion_factor(from: &str, to: &str) -> Result<f64> {
    if same_unit(from, to) {
        return Ok(1.0);
    }
    match (length_unit(from), length_unit(to)) {
        (Some("m"), Some("ft")) => Ok(1.0 / 0.3048),
        (Some("ft"), Some("m")) => Ok(0.3048),
        _ => Err(FiatError::config(format!(
            "no conversion from hazard unit '{}' to exposure unit '{}'",
            from, to
        ))),
    }
}

fn catalog_unit(source: &SourceRef, catalog: &DataCatalog) -> Option<String> {
    let name = source.catalog_name()?;
    catalog.get_source(name).ok()?.meta.unit.clone()
}

/// Give the raster an explicit CRS and nodata value in north-up order
fn normalise_grid(
    raster: &mut HazardRaster,
    map_spec: &HazardMapSpec,
    source: &SourceRef,
    catalog: &DataCatalog,
) -> Result<()> {
    let catalog_crs = source
        .catalog_name()
        .and_then(|name| catalog.get_source(name).ok())
        .and_then(|entry| entry.crs);
    let crs = map_spec
        .crs
        .or(raster.grid.crs)
        .or(catalog_crs)
        .ok_or_else(|| {
            FiatError::config(format!(
                "hazard map '{}' has no CRS, set 'crs' for it",
                raster.name
            ))
        })?;
    if raster.grid.crs.is_some_and(|found| found != crs) {
        warn!(
            "Hazard map '{}' declares {:?}, using {}",
            raster.name,
            raster.grid.crs.map(|c| c.to_string()),
            crs
        );
    }
    raster.grid.crs = Some(crs);

    let nodata = map_spec
        .nodata
        .or(raster.grid.nodata)
        .unwrap_or(DEFAULT_NODATA);
    raster.set_nodata(nodata);
    raster.to_north_up();
    Ok(())
}
