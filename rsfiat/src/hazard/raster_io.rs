use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek};
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

use crate::collect::global_variables::hazard_path;
use crate::error::{FiatError, Result};
use crate::geo_core::Crs;
use crate::hazard::raster::{Grid, HazardMaps, HazardRaster};

/// Loads a single band of a raster file
pub trait RasterReader {
    /// Read `path`; `var` selects a variable (NetCDF) or named band
    fn read(&self, path: &Path, var: Option<&str>) -> Result<HazardRaster>;
}

/// A named band borrowed for writing
pub struct RasterBand<'a> {
    pub name: &'a str,
    pub data: &'a [f64],
}

/// Writes one or more bands sharing a grid into a single file
pub trait RasterWriter {
    fn write(&self, path: &Path, grid: &Grid, bands: &[RasterBand<'_>]) -> Result<()> {
        self.write_with_metadata(path, grid, bands, &BTreeMap::new())
    }

    /// Write the bands plus dataset-level metadata items
    fn write_with_metadata(
        &self,
        path: &Path,
        grid: &Grid,
        bands: &[RasterBand<'_>],
        metadata: &BTreeMap<String, String>,
    ) -> Result<()>;
}

/// Write the hazard registry below `root`, one file per event map or a
/// single multi-band file for a risk dataset
pub fn write_hazard_maps(
    writer: &dyn RasterWriter,
    root: &Path,
    maps: &HazardMaps,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    match maps {
        HazardMaps::Event(rasters) => {
            for (name, raster) in rasters {
                let path = root.join(hazard_path(name));
                ensure_parent(&path)?;
                let metadata = raster
                    .attrs
                    .as_ref()
                    .map(|attrs| attrs.to_map())
                    .unwrap_or_default();
                writer.write_with_metadata(
                    &path,
                    &raster.grid,
                    &[RasterBand {
                        name,
                        data: &raster.data,
                    }],
                    &metadata,
                )?;
                written.push(path);
            }
        }
        HazardMaps::Risk(risk) => {
            let path = root.join(hazard_path(&risk.name));
            ensure_parent(&path)?;
            let bands: Vec<RasterBand<'_>> = risk
                .names
                .iter()
                .zip(risk.bands.iter())
                .map(|(name, data)| RasterBand { name, data })
                .collect();
            writer.write_with_metadata(&path, &risk.grid, &bands, &risk.attrs())?;
            written.push(path);
        }
    }
    Ok(written)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| FiatError::io(parent, e))?;
    }
    Ok(())
}

// GeoTIFF tag codes
const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_METADATA: u16 = 42112;
const GDAL_NODATA: u16 = 42113;

// GeoKey ids
const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;
const USER_DEFINED: u32 = 32767;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Pure Rust GeoTIFF backend
///
/// Reads the first page (or the page whose description matches `var`) of
/// integer or float GeoTIFFs and writes one `f64` page per band.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffIo;

impl RasterReader for GeoTiffIo {
    fn read(&self, path: &Path, var: Option<&str>) -> Result<HazardRaster> {
        if is_netcdf(path) {
            return Err(FiatError::UnsupportedOperation(format!(
                "reading NetCDF {:?} without the gdal feature",
                path
            )));
        }
        let file = File::open(path).map_err(|e| FiatError::io(path, e))?;
        let mut decoder = Decoder::new(BufReader::new(file))?;

        if let Some(var) = var {
            while description(&mut decoder)?.as_deref() != Some(var) {
                if !decoder.more_images() {
                    return Err(FiatError::MissingSource(format!(
                        "band '{}' in {:?}",
                        var, path
                    )));
                }
                decoder.next_image()?;
            }
        }

        let (width, height) = decoder.dimensions()?;
        let mut grid = Grid::new(width as usize, height as usize, read_transform(&mut decoder)?);
        grid.crs = read_crs(&mut decoder)?;
        grid.nodata = read_nodata(&mut decoder)?;
        let data = to_f64(decoder.read_image()?)?;

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!("Read {}x{} raster from {:?}", width, height, path);
        HazardRaster::new(&name, grid, data)
    }
}

impl RasterWriter for GeoTiffIo {
    fn write_with_metadata(
        &self,
        path: &Path,
        grid: &Grid,
        bands: &[RasterBand<'_>],
        metadata: &BTreeMap<String, String>,
    ) -> Result<()> {
        let geo_keys = grid.crs.map(geo_keys).transpose()?;
        let metadata_xml = if metadata.is_empty() {
            None
        } else {
            Some(metadata_to_xml(metadata)?)
        };
        let file = File::create(path).map_err(|e| FiatError::io(path, e))?;
        let mut encoder = TiffEncoder::new(BufWriter::new(file))?;

        for (idx, band) in bands.iter().enumerate() {
            if band.data.len() != grid.len() {
                return Err(FiatError::config(format!(
                    "band '{}' does not match the {}x{} grid",
                    band.name, grid.width, grid.height
                )));
            }
            let mut image =
                encoder.new_image::<colortype::Gray64Float>(grid.width as u32, grid.height as u32)?;
            let dir = image.encoder();
            dir.write_tag(Tag::ImageDescription, band.name)?;

            let t = grid.transform;
            if t[2] == 0.0 && t[4] == 0.0 {
                dir.write_tag(tag(MODEL_PIXEL_SCALE), &[t[1], -t[5], 0.0][..])?;
                dir.write_tag(tag(MODEL_TIEPOINT), &[0.0, 0.0, 0.0, t[0], t[3], 0.0][..])?;
            } else {
                let matrix = [
                    t[1], t[2], 0.0, t[0], //
                    t[4], t[5], 0.0, t[3], //
                    0.0, 0.0, 0.0, 0.0, //
                    0.0, 0.0, 0.0, 1.0,
                ];
                dir.write_tag(tag(MODEL_TRANSFORMATION), &matrix[..])?;
            }
            if let Some(keys) = &geo_keys {
                dir.write_tag(tag(GEO_KEY_DIRECTORY), &keys[..])?;
            }
            if let Some(nodata) = grid.nodata {
                dir.write_tag(tag(GDAL_NODATA), nodata.to_string().as_str())?;
            }
            // GDAL takes dataset metadata from the first page
            if let (0, Some(xml)) = (idx, &metadata_xml) {
                dir.write_tag(tag(GDAL_METADATA), xml.as_str())?;
            }
            image.write_data(band.data)?;
        }
        debug!("Wrote {} band(s) to {:?}", bands.len(), path);
        Ok(())
    }
}

fn is_netcdf(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("nc"))
}

fn description<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<String>> {
    Ok(match decoder.find_tag(Tag::ImageDescription)? {
        Some(value) => Some(value.into_string()?.trim_end_matches('\0').to_string()),
        None => None,
    })
}

fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<[f64; 6]> {
    if let Some(value) = decoder.find_tag(tag(MODEL_TRANSFORMATION))? {
        let m = value.into_f64_vec()?;
        if m.len() >= 8 {
            return Ok([m[3], m[0], m[1], m[7], m[4], m[5]]);
        }
    }

    let scale = decoder.find_tag(tag(MODEL_PIXEL_SCALE))?;
    let tiepoint = decoder.find_tag(tag(MODEL_TIEPOINT))?;
    match (scale, tiepoint) {
        (Some(scale), Some(tiepoint)) => {
            let s = scale.into_f64_vec()?;
            let tp = tiepoint.into_f64_vec()?;
            if s.len() < 2 || tp.len() < 6 {
                return Err(FiatError::config("malformed GeoTIFF georeferencing tags"));
            }
            Ok([tp[3] - tp[0] * s[0], s[0], 0.0, tp[4] + tp[1] * s[1], 0.0, -s[1]])
        }
        _ => Err(FiatError::config("GeoTIFF has no georeferencing")),
    }
}

fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<Crs>> {
    let Some(value) = decoder.find_tag(tag(GEO_KEY_DIRECTORY))? else {
        return Ok(None);
    };
    let keys = value.into_u32_vec()?;
    // header: version, revision, minor revision, key count
    let entries = keys.get(4..).unwrap_or(&[]);
    let mut projected = None;
    let mut geographic = None;
    for key in entries.chunks_exact(4) {
        // location 0 means the value is stored inline
        if key[1] != 0 || key[3] == USER_DEFINED {
            continue;
        }
        match key[0] as u16 {
            PROJECTED_CS_TYPE => projected = Some(key[3]),
            GEOGRAPHIC_TYPE => geographic = Some(key[3]),
            _ => {}
        }
    }
    Ok(projected.or(geographic).map(Crs::from_epsg))
}

/// GeoKey directory of a CRS; the code must fit an inline SHORT key
fn geo_keys(crs: Crs) -> Result<Vec<u16>> {
    let code = u16::try_from(crs.epsg())
        .ok()
        .filter(|code| u32::from(*code) != USER_DEFINED)
        .ok_or_else(|| {
            FiatError::UnsupportedOperation(format!("writing {} as a GeoTIFF key", crs))
        })?;
    let (model_type, crs_key) = if crs.is_geographic() {
        (2, GEOGRAPHIC_TYPE)
    } else {
        (1, PROJECTED_CS_TYPE)
    };
    Ok(vec![
        1, 1, 0, 3, //
        GT_MODEL_TYPE, 0, 1, model_type, //
        GT_RASTER_TYPE, 0, 1, 1, //
        crs_key, 0, 1, code,
    ])
}

/// `<GDALMetadata>` document of the GDAL_METADATA tag
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename = "GDALMetadata")]
struct GdalMetadata {
    #[serde(rename = "Item", default)]
    items: Vec<MetadataItem>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MetadataItem {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "$text", default)]
    value: String,
}

fn metadata_to_xml(metadata: &BTreeMap<String, String>) -> Result<String> {
    let document = GdalMetadata {
        items: metadata
            .iter()
            .map(|(name, value)| MetadataItem {
                name: name.clone(),
                value: value.clone(),
            })
            .collect(),
    };
    Ok(quick_xml::se::to_string(&document)?)
}

impl GeoTiffIo {
    /// Dataset metadata items stored in the GDAL_METADATA tag
    pub fn read_metadata(&self, path: &Path) -> Result<BTreeMap<String, String>> {
        let file = File::open(path).map_err(|e| FiatError::io(path, e))?;
        let mut decoder = Decoder::new(BufReader::new(file))?;
        let Some(value) = decoder.find_tag(tag(GDAL_METADATA))? else {
            return Ok(BTreeMap::new());
        };
        let xml = value.into_string()?;
        let document: GdalMetadata = quick_xml::de::from_str(xml.trim_end_matches('\0'))?;
        Ok(document
            .items
            .into_iter()
            .map(|item| (item.name, item.value))
            .collect())
    }
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<f64>> {
    let Some(value) = decoder.find_tag(tag(GDAL_NODATA))? else {
        return Ok(None);
    };
    let text = value.into_string()?;
    Ok(text.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse().ok())
}

fn to_f64(result: DecodingResult) -> Result<Vec<f64>> {
    Ok(match result {
        DecodingResult::F64(v) => v,
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        #[allow(unreachable_patterns)]
        _ => {
            return Err(FiatError::UnsupportedOperation(
                "GeoTIFF sample format".to_string(),
            ))
        }
    })
}

/// GDAL backend, opens anything GDAL can read including NetCDF variables
#[cfg(feature = "gdal")]
#[derive(Debug, Clone, Copy, Default)]
pub struct GdalIo;

#[cfg(feature = "gdal")]
impl RasterReader for GdalIo {
    fn read(&self, path: &Path, var: Option<&str>) -> Result<HazardRaster> {
        use gdal::Dataset;

        let open_path = match var {
            Some(var) if is_netcdf(path) => format!("NETCDF:\"{}\":{}", path.display(), var),
            _ => path.to_string_lossy().into_owned(),
        };
        let dataset = Dataset::open(&open_path)?;
        let (width, height) = dataset.raster_size();

        let mut grid = Grid::new(width, height, dataset.geo_transform()?);
        grid.crs = dataset
            .spatial_ref()
            .ok()
            .and_then(|srs| srs.auth_code().ok())
            .map(|code| Crs::from_epsg(code as u32));

        let band = dataset.rasterband(1)?;
        grid.nodata = band.no_data_value();
        let buffer = band.read_as::<f64>((0, 0), (width, height), (width, height), None)?;

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!("Read {}x{} raster from {}", width, height, open_path);
        HazardRaster::new(&name, grid, buffer.data().to_vec())
    }
}

#[cfg(feature = "gdal")]
impl RasterWriter for GdalIo {
    fn write_with_metadata(
        &self,
        path: &Path,
        grid: &Grid,
        bands: &[RasterBand<'_>],
        metadata: &BTreeMap<String, String>,
    ) -> Result<()> {
        use gdal::raster::Buffer;
        use gdal::spatial_ref::SpatialRef;
        use gdal::{DriverManager, Metadata};

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut dataset =
            driver.create_with_band_type::<f64, _>(path, grid.width, grid.height, bands.len())?;
        dataset.set_geo_transform(&grid.transform)?;
        if let Some(crs) = grid.crs {
            dataset.set_spatial_ref(&SpatialRef::from_epsg(crs.epsg())?)?;
        }
        for (key, value) in metadata {
            dataset.set_metadata_item(key, value, "")?;
        }

        for (idx, band) in bands.iter().enumerate() {
            let mut raster_band = dataset.rasterband(idx + 1)?;
            let mut buffer = Buffer::new((grid.width, grid.height), band.data.to_vec());
            raster_band.write((0, 0), (grid.width, grid.height), &mut buffer)?;
            raster_band.set_no_data_value(grid.nodata)?;
            raster_band.set_description(band.name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hazard::raster::{Analysis, HazardAttrs, RiskDataset};

    fn sample_grid() -> Grid {
        Grid {
            width: 3,
            height: 2,
            transform: [500000.0, 10.0, 0.0, 4000020.0, 0.0, -10.0],
            crs: Some(Crs::from_epsg(32617)),
            nodata: Some(-9999.0),
        }
    }

    #[test]
    fn test_geotiff_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flood_rp10.tif");
        let data = vec![0.0, 0.5, 1.0, -9999.0, 2.0, 3.5];
        GeoTiffIo
            .write(&path, &sample_grid(), &[RasterBand { name: "flood_rp10", data: &data }])
            .unwrap();

        let raster = GeoTiffIo.read(&path, None).unwrap();
        assert_eq!(raster.name, "flood_rp10");
        assert_eq!(raster.grid.width, 3);
        assert_eq!(raster.grid.height, 2);
        assert_eq!(raster.grid.crs, Some(Crs::from_epsg(32617)));
        assert_eq!(raster.grid.nodata, Some(-9999.0));
        assert_eq!(raster.grid.transform, sample_grid().transform);
        assert_eq!(raster.data, data);
    }

    #[test]
    fn test_read_named_band() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("risk_map.tif");
        let first = vec![1.0; 6];
        let second = vec![2.0; 6];
        GeoTiffIo
            .write(
                &path,
                &sample_grid(),
                &[
                    RasterBand { name: "rp2", data: &first },
                    RasterBand { name: "rp10", data: &second },
                ],
            )
            .unwrap();

        let band = GeoTiffIo.read(&path, Some("rp10")).unwrap();
        assert_eq!(band.data, second);
        assert!(matches!(
            GeoTiffIo.read(&path, Some("rp500")),
            Err(FiatError::MissingSource(_))
        ));
    }

    #[test]
    fn test_netcdf_needs_gdal() {
        let result = GeoTiffIo.read(Path::new("flood.nc"), Some("depth"));
        assert!(matches!(result, Err(FiatError::UnsupportedOperation(_))));
    }

    #[test]
    fn test_write_hazard_maps_layout() {
        let dir = tempfile::tempdir().unwrap();
        let raster = |name: &str, v: f64| HazardRaster::new(name, sample_grid(), vec![v; 6]).unwrap();

        let mut events = BTreeMap::new();
        events.insert("flood".to_string(), raster("flood", 1.0));
        let written =
            write_hazard_maps(&GeoTiffIo, dir.path(), &HazardMaps::Event(events)).unwrap();
        assert_eq!(written, vec![dir.path().join("hazard").join("flood.tif")]);

        let risk = RiskDataset::stack(
            "risk_map",
            vec![(2.0, raster("rp2", 1.0)), (10.0, raster("rp10", 2.0))],
        )
        .unwrap();
        let written = write_hazard_maps(&GeoTiffIo, dir.path(), &HazardMaps::Risk(risk)).unwrap();
        assert!(written[0].ends_with("hazard/risk_map.tif"));
        assert_eq!(GeoTiffIo.read(&written[0], Some("rp10")).unwrap().data, vec![2.0; 6]);
    }

    #[test]
    fn test_hazard_metadata_written_as_gdal_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let raster = |name: &str, v: f64| HazardRaster::new(name, sample_grid(), vec![v; 6]).unwrap();

        let mut event = raster("flood_rp10", 1.0);
        event.attrs = Some(HazardAttrs {
            return_period: Some("10".to_string()),
            hazard_type: "flooding".to_string(),
            name: "flood_rp10".to_string(),
            analysis: Analysis::Event,
        });
        let mut events = BTreeMap::new();
        events.insert("flood_rp10".to_string(), event);
        let written =
            write_hazard_maps(&GeoTiffIo, dir.path(), &HazardMaps::Event(events)).unwrap();
        let metadata = GeoTiffIo.read_metadata(&written[0]).unwrap();
        assert_eq!(metadata["returnperiod"], "10");
        assert_eq!(metadata["type"], "flooding");
        assert_eq!(metadata["analysis"], "event");

        let risk = RiskDataset::stack(
            "risk_map",
            vec![(100.0, raster("flood_rp100", 3.0)), (2.0, raster("flood_rp2", 1.0))],
        )
        .unwrap();
        let written = write_hazard_maps(&GeoTiffIo, dir.path(), &HazardMaps::Risk(risk)).unwrap();
        let metadata = GeoTiffIo.read_metadata(&written[0]).unwrap();
        assert_eq!(metadata["returnperiod"], "[2, 100]");
        assert_eq!(metadata["name"], "[flood_rp2, flood_rp100]");
        assert_eq!(metadata["analysis"], "risk");
        // bands still readable next to the metadata
        assert_eq!(GeoTiffIo.read(&written[0], Some("flood_rp100")).unwrap().data, vec![3.0; 6]);
    }

    #[test]
    fn test_plain_write_has_no_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.tif");
        GeoTiffIo
            .write(&path, &sample_grid(), &[RasterBand { name: "plain", data: &[0.0; 6] }])
            .unwrap();
        assert!(GeoTiffIo.read_metadata(&path).unwrap().is_empty());
    }

    #[test]
    fn test_code_beyond_geokey_range_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web_mercator.tif");
        let mut grid = sample_grid();
        grid.crs = Some(Crs::from_epsg(102100));
        let result = GeoTiffIo.write(&path, &grid, &[RasterBand { name: "b", data: &[0.0; 6] }]);
        assert!(matches!(result, Err(FiatError::UnsupportedOperation(_))));
        assert!(!path.exists());
    }
}
