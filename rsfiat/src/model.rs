use anyhow::Context;
use log::{info, warn};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::aggregation::{join_exposure_aggregation_areas, join_social_vulnerability};
use crate::collect::data_catalog::DataCatalog;
use crate::collect::global_variables::{
    exposure_geom_path, EXPOSURE_CSV, FOLDERS, SETTINGS_FILE, VULNERABILITY_CSV,
};
use crate::collect::tables::Table;
use crate::collect::vector::VectorLayer;
use crate::config::{
    AggregationAreaSettings, BuildConfig, ExposureBuildingsSettings, ExposureRoadsSettings,
    GlobalSettings, OutputSettings, RegionSettings, RoadDamageSettings,
    RoadVulnerabilitySettings, SocialVulnerabilitySettings, VulnerabilitySettings,
};
use crate::error::{FiatError, Result};
use crate::exposure::{DamageValues, ExposureVector, RoadDamage};
use crate::geo_core::{Crs, GeoCore, Region};
use crate::hazard::ingest::unit_conversion_factor;
use crate::hazard::raster_io::write_hazard_maps;
use crate::hazard::{ingest_hazard_maps, HazardMaps, HazardRequest, RasterReader, RasterWriter};
use crate::settings::FiatSettings;
use crate::vulnerability::Vulnerability;

/// Setup steps of a build, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    GlobalSettings,
    Output,
    Vulnerability,
    RoadVulnerability,
    ExposureBuildings,
    ExposureRoads,
    AggregationAreas,
    SocialVulnerabilityIndex,
    Hazard,
    /// Not available, fails when configured
    ExposureRaster,
}

impl SetupStep {
    pub const ORDER: [SetupStep; 10] = [
        SetupStep::GlobalSettings,
        SetupStep::Output,
        SetupStep::Vulnerability,
        SetupStep::RoadVulnerability,
        SetupStep::ExposureBuildings,
        SetupStep::ExposureRoads,
        SetupStep::AggregationAreas,
        SetupStep::SocialVulnerabilityIndex,
        SetupStep::Hazard,
        SetupStep::ExposureRaster,
    ];

    /// Configuration section name
    pub fn name(&self) -> &'static str {
        match self {
            SetupStep::GlobalSettings => "setup_global_settings",
            SetupStep::Output => "setup_output",
            SetupStep::Vulnerability => "setup_vulnerability",
            SetupStep::RoadVulnerability => "setup_road_vulnerability",
            SetupStep::ExposureBuildings => "setup_exposure_buildings",
            SetupStep::ExposureRoads => "setup_exposure_roads",
            SetupStep::AggregationAreas => "setup_aggregation_areas",
            SetupStep::SocialVulnerabilityIndex => "setup_social_vulnerability_index",
            SetupStep::Hazard => "setup_hazard",
            SetupStep::ExposureRaster => "setup_exposure_raster",
        }
    }
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A Delft-FIAT model under construction
///
/// Holds everything a build produces: the region and CRS, the exposure
/// table, the damage functions, the hazard maps and the settings document.
/// Nothing is written until [`FiatModel::write`].
pub struct FiatModel {
    root: PathBuf,
    pub catalog: DataCatalog,
    pub geo_core: GeoCore,
    pub exposure: Option<ExposureVector>,
    pub vulnerability: Option<Vulnerability>,
    pub hazard: Option<HazardMaps>,
    pub settings: FiatSettings,
    pub output: OutputSettings,
    reader: Box<dyn RasterReader>,
    writer: Box<dyn RasterWriter>,
}

impl FiatModel {
    /// Create an empty model writing to `root`
    ///
    /// Rasters go through the GDAL backend when the `gdal` feature is on,
    /// the GeoTIFF backend otherwise.
    pub fn new<P: AsRef<Path>>(root: P, catalog: DataCatalog) -> Self {
        #[cfg(feature = "gdal")]
        let (reader, writer): (Box<dyn RasterReader>, Box<dyn RasterWriter>) = (
            Box::new(crate::hazard::raster_io::GdalIo),
            Box::new(crate::hazard::raster_io::GdalIo),
        );
        #[cfg(not(feature = "gdal"))]
        let (reader, writer): (Box<dyn RasterReader>, Box<dyn RasterWriter>) =
            (Box::new(crate::hazard::GeoTiffIo), Box::new(crate::hazard::GeoTiffIo));

        FiatModel {
            root: root.as_ref().to_path_buf(),
            catalog,
            geo_core: GeoCore::default(),
            exposure: None,
            vulnerability: None,
            hazard: None,
            settings: FiatSettings::new(),
            output: OutputSettings::default(),
            reader,
            writer,
        }
    }

    /// Replace the raster backends
    pub fn with_raster_io(
        mut self,
        reader: Box<dyn RasterReader>,
        writer: Box<dyn RasterWriter>,
    ) -> Self {
        self.reader = reader;
        self.writer = writer;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn set_root<P: AsRef<Path>>(&mut self, root: P) {
        self.root = root.as_ref().to_path_buf();
    }

    pub fn crs(&self) -> Option<Crs> {
        self.geo_core.get_crs()
    }

    pub fn region(&self) -> Option<&Region> {
        self.geo_core.get_region()
    }

    /// Run every configured step in order
    pub fn build(&mut self, config: &BuildConfig) -> Result<()> {
        info!("Building FIAT model in {:?}", self.root);
        for step in SetupStep::ORDER {
            self.run_step(step, config)?;
        }
        Ok(())
    }

    /// Run one step if the configuration has a section for it
    pub fn run_step(&mut self, step: SetupStep, config: &BuildConfig) -> Result<()> {
        let configured = match step {
            SetupStep::GlobalSettings => config
                .setup_global_settings
                .as_ref()
                .map(|s| self.setup_global_settings(s)),
            SetupStep::Output => config.setup_output.as_ref().map(|s| {
                self.setup_output(s);
                Ok(())
            }),
            SetupStep::Vulnerability => config
                .setup_vulnerability
                .as_ref()
                .map(|s| self.setup_vulnerability(s)),
            SetupStep::RoadVulnerability => config
                .setup_road_vulnerability
                .as_ref()
                .map(|s| self.setup_road_vulnerability(s)),
            SetupStep::ExposureBuildings => config
                .setup_exposure_buildings
                .as_ref()
                .map(|s| self.setup_exposure_buildings(s)),
            SetupStep::ExposureRoads => config
                .setup_exposure_roads
                .as_ref()
                .map(|s| self.setup_exposure_roads(s)),
            SetupStep::AggregationAreas => config
                .setup_aggregation_areas
                .as_ref()
                .map(|s| self.setup_aggregation_areas(s)),
            SetupStep::SocialVulnerabilityIndex => config
                .setup_social_vulnerability_index
                .as_ref()
                .map(|s| self.setup_social_vulnerability_index(s)),
            SetupStep::Hazard => config.setup_hazard.as_ref().map(|s| self.setup_hazard(s)),
            SetupStep::ExposureRaster => config
                .setup_exposure_raster
                .as_ref()
                .map(|_| self.setup_exposure_raster()),
        };
        match configured {
            Some(result) => {
                info!("Ran {}", step);
                result
            }
            None => Ok(()),
        }
    }

    pub fn setup_global_settings(&mut self, settings: &GlobalSettings) -> Result<()> {
        self.geo_core.set_crs(settings.crs);
        let region = match &settings.region {
            Some(RegionSettings::File { file }) => {
                let path = self.catalog.resolve_source(file).path().to_path_buf();
                Some(Region::from_geojson(path)?)
            }
            Some(region @ RegionSettings::Bbox { .. }) => match region.bounding_box() {
                Some(bbox) => Some(Region::from_bbox(
                    bbox.transform(Crs::WGS84, settings.crs)?,
                    settings.crs,
                )),
                None => None,
            },
            None => None,
        };
        self.geo_core.set_region(region);
        self.settings.set("global.crs", settings.crs.to_string())?;
        Ok(())
    }

    pub fn setup_output(&mut self, settings: &OutputSettings) {
        self.output = settings.clone();
    }

    pub fn setup_vulnerability(&mut self, settings: &VulnerabilitySettings) -> Result<()> {
        let curves = self.load_table(&settings.vulnerability_fn)?;
        let linking = self.load_table(&settings.vulnerability_identifiers_and_linking_fn)?;
        let vulnerability = Vulnerability::from_tables(
            &curves,
            &linking,
            &settings.unit,
            &settings.functions_mean,
            settings.functions_max.as_ref(),
            settings.step_size,
        )?;
        self.vulnerability = Some(vulnerability);
        Ok(())
    }

    pub fn setup_road_vulnerability(&mut self, settings: &RoadVulnerabilitySettings) -> Result<()> {
        let vulnerability = self
            .vulnerability
            .get_or_insert_with(|| Vulnerability::new(&settings.vertical_unit));
        if vulnerability.unit != settings.vertical_unit {
            warn!(
                "Road damage function in {} added to functions in {}",
                settings.vertical_unit, vulnerability.unit
            );
        }
        vulnerability.setup_road_vulnerability(
            settings.threshold_value,
            settings.min_hazard_value,
            settings.max_hazard_value,
            settings.step_hazard_value,
        )
    }

    /// Buildings from one source when locations, occupancy and damage all
    /// name the same source, from three sources otherwise
    pub fn setup_exposure_buildings(&mut self, settings: &ExposureBuildingsSettings) -> Result<()> {
        let locations = self.load_vector(&settings.asset_locations)?;
        let crs = self.crs().unwrap_or(locations.crs);
        let mut exposure = ExposureVector::new(crs);
        exposure.unit = Some(settings.unit.clone());

        let single_source = settings.asset_locations == settings.occupancy_type
            && settings.occupancy_type == settings.max_potential_damage;
        if single_source {
            let translation = match self.catalog.contains(&settings.asset_locations) {
                true => self
                    .catalog
                    .translation_path(&settings.asset_locations)?
                    .map(|path| ExposureVector::read_translation(&path))
                    .transpose()?,
                false => None,
            };
            exposure.setup_buildings_from_single_source(
                locations,
                translation.as_ref(),
                settings.ground_floor_height.as_ref(),
                settings.extraction_method,
            )?;
        } else {
            let occupancy = self.load_vector(&settings.occupancy_type)?;
            let damage_table = self.load_table(&settings.max_potential_damage)?;
            let damage_values = DamageValues::from_table(&damage_table, settings.country.as_deref())?;
            exposure.setup_buildings_from_multiple_sources(
                locations,
                occupancy,
                &settings.occupancy_attribute,
                settings.primary_attribute.as_deref(),
                &damage_values,
                &settings.damage_types,
                settings.ground_floor_height.as_ref(),
                settings.extraction_method,
            )?;
        }

        match &self.vulnerability {
            Some(vulnerability) => {
                let linked =
                    exposure.link_exposure_vulnerability(&vulnerability.links, &settings.damage_types);
                info!("Linked damage functions to {} of {} assets", linked, exposure.len());
            }
            None => warn!("No vulnerability set up, damage functions are not linked"),
        }
        exposure.check_required_columns();
        self.exposure = Some(exposure);
        Ok(())
    }

    pub fn setup_exposure_roads(&mut self, settings: &ExposureRoadsSettings) -> Result<()> {
        let roads = self.load_vector(&settings.roads_fn)?;
        let road_damage = match &settings.road_damage {
            RoadDamageSettings::PerLength(value) => RoadDamage::uniform(*value),
            RoadDamageSettings::Table(source) => RoadDamage::from_table(&self.load_table(source)?)?,
        };
        let crs = self.crs().unwrap_or(roads.crs);
        let exposure = self.exposure.get_or_insert_with(|| ExposureVector::new(crs));
        if exposure.unit.is_none() {
            exposure.unit = Some(settings.unit.clone());
        }
        exposure.setup_roads(
            roads,
            settings.road_types.as_deref(),
            &settings.road_type_attribute,
            &road_damage,
        )?;
        Ok(())
    }

    pub fn setup_aggregation_areas(&mut self, settings: &AggregationAreaSettings) -> Result<()> {
        let layers = settings
            .aggregation_area_fn
            .to_vec()
            .iter()
            .map(|source| self.load_vector(source))
            .collect::<Result<Vec<_>>>()?;
        let exposure = self.exposure_mut(SetupStep::AggregationAreas)?;
        join_exposure_aggregation_areas(
            exposure,
            layers,
            &settings.attribute_names,
            &settings.label_names,
        )
    }

    pub fn setup_social_vulnerability_index(
        &mut self,
        settings: &SocialVulnerabilitySettings,
    ) -> Result<()> {
        let layer = self.load_vector(&settings.svi_fn)?;
        let exposure = self.exposure_mut(SetupStep::SocialVulnerabilityIndex)?;
        join_social_vulnerability(
            exposure,
            layer,
            &settings.index_attribute,
            &settings.key_attribute,
        )?;
        Ok(())
    }

    /// Ingest hazard maps, converting them to the exposure unit
    pub fn setup_hazard(&mut self, request: &HazardRequest) -> Result<()> {
        let exposure_unit = self.exposure.as_ref().and_then(|e| e.unit.clone());
        let factor = match (
            request.unit_conversion_factor,
            self.hazard_unit(request),
            exposure_unit.as_deref(),
        ) {
            (Some(factor), _, _) => factor,
            (None, Some(from), Some(to)) => unit_conversion_factor(&from, to)?,
            _ => 1.0,
        };
        let ingestion = ingest_hazard_maps(
            request,
            &self.catalog,
            self.reader.as_ref(),
            exposure_unit.as_deref(),
            factor,
        )?;
        self.settings.extend(&ingestion.config_updates)?;
        self.hazard = Some(ingestion.maps);
        Ok(())
    }

    pub fn setup_exposure_raster(&mut self) -> Result<()> {
        Err(FiatError::UnsupportedOperation(
            SetupStep::ExposureRaster.name().to_string(),
        ))
    }

    /// Unit of the first map: catalog metadata, else the request
    fn hazard_unit(&self, request: &HazardRequest) -> Option<String> {
        let first = request.map_fn.to_vec().into_iter().next()?;
        self.catalog
            .get_source(&first)
            .ok()
            .and_then(|entry| entry.meta.unit.clone())
            .or_else(|| request.unit.clone())
    }

    fn exposure_mut(&mut self, step: SetupStep) -> Result<&mut ExposureVector> {
        self.exposure.as_mut().ok_or_else(|| {
            FiatError::config(format!("{} needs exposure data, set up buildings first", step))
        })
    }

    /// A table from a catalog name or a file path
    pub fn load_table(&self, source: &str) -> Result<Table> {
        let source = self.catalog.resolve_source(source);
        Table::read_csv(source.path())
    }

    /// A vector layer from a catalog name or a file path, clipped to the
    /// model region
    pub fn load_vector(&self, source: &str) -> Result<VectorLayer> {
        let resolved = self.catalog.resolve_source(source);
        let crs = match resolved.catalog_name() {
            Some(name) => self.catalog.get_source(name)?.crs,
            None => None,
        };
        let layer = VectorLayer::read_geojson(resolved.path(), crs)?;
        let layer = match self.region() {
            Some(region) => layer.clip_to_region(region)?,
            None => layer,
        };
        info!("Loaded {} features from '{}'", layer.len(), source);
        Ok(layer)
    }

    /// Write all model files below the root
    ///
    /// The exposure table is validated first; a missing required column
    /// aborts the write.
    pub fn write(&mut self) -> anyhow::Result<()> {
        info!("Writing model data to {:?}", self.root);
        for folder in FOLDERS {
            let path = self.root.join(folder);
            fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create model folder {:?}", path))?;
        }

        self.settings
            .set("output.path", self.output.output_dir.clone())?;
        self.settings
            .set("output.csv.name", self.output.output_csv_name.clone())?;
        self.settings
            .set("output.geom.name1", self.output.output_vector_name.clone())?;

        if let Some(exposure) = &self.exposure {
            exposure.validate()?;
            let csv_path = self.root.join(EXPOSURE_CSV);
            exposure
                .write_csv(&csv_path)
                .with_context(|| format!("Failed to write exposure table {:?}", csv_path))?;
            self.settings.set("exposure.csv.file", EXPOSURE_CSV)?;
            self.settings.set("exposure.geom.crs", exposure.crs.to_string())?;
            if let Some(unit) = &exposure.unit {
                self.settings.set("exposure.geom.unit", unit.clone())?;
            }

            for (i, (name, layer)) in exposure.geoms.iter().enumerate() {
                let relative = exposure_geom_path(name);
                let path = self.root.join(&relative);
                layer
                    .write_geojson(&path)
                    .with_context(|| format!("Failed to write exposure geometries {:?}", path))?;
                self.settings.set(
                    &format!("exposure.geom.file{}", i + 1),
                    relative.to_string_lossy().replace('\\', "/"),
                )?;
            }
        }

        if let Some(vulnerability) = &self.vulnerability {
            let path = self.root.join(VULNERABILITY_CSV);
            vulnerability
                .write_csv(&path)
                .with_context(|| format!("Failed to write damage functions {:?}", path))?;
            self.settings.set("vulnerability.file", VULNERABILITY_CSV)?;
            self.settings
                .set("vulnerability.unit", vulnerability.unit.clone())?;
        }

        if let Some(hazard) = &self.hazard {
            let written = write_hazard_maps(self.writer.as_ref(), &self.root, hazard)
                .context("Failed to write hazard maps")?;
            info!("Wrote {} hazard files", written.len());
        }

        let settings_path = self.root.join(SETTINGS_FILE);
        self.settings
            .write(&settings_path)
            .with_context(|| format!("Failed to write settings {:?}", settings_path))?;
        Ok(())
    }

    /// Restore a written model: settings, exposure and damage functions
    ///
    /// Hazard rasters stay on disk; the settings still reference them.
    pub fn read<P: AsRef<Path>>(root: P, catalog: DataCatalog) -> anyhow::Result<Self> {
        let mut model = FiatModel::new(root, catalog);
        info!("Reading model data from {:?}", model.root);

        let settings_path = model.root.join(SETTINGS_FILE);
        model.settings = FiatSettings::read(&settings_path)
            .with_context(|| format!("Failed to read settings {:?}", settings_path))?;

        let crs = match model.settings.get_str("global.crs") {
            Some(text) => Some(Crs::parse(text)?),
            None => None,
        };
        if let Some(crs) = crs {
            model.geo_core.set_crs(crs);
        }

        if let Some(output_dir) = model.settings.get_str("output.path") {
            model.output.output_dir = output_dir.to_string();
        }
        if let Some(name) = model.settings.get_str("output.csv.name") {
            model.output.output_csv_name = name.to_string();
        }
        if let Some(name) = model.settings.get_str("output.geom.name1") {
            model.output.output_vector_name = name.to_string();
        }

        if let Some(csv) = model.settings.get_str("exposure.csv.file") {
            let path = model.root.join(csv);
            let exposure_crs = match model.settings.get_str("exposure.geom.crs") {
                Some(text) => Crs::parse(text)?,
                None => crs.unwrap_or(Crs::WGS84),
            };
            let mut exposure = ExposureVector::read_csv(&path, exposure_crs)
                .with_context(|| format!("Failed to read exposure table {:?}", path))?;
            exposure.unit = model
                .settings
                .get_str("exposure.geom.unit")
                .map(str::to_string);

            for i in 1.. {
                let Some(file) = model.settings.get_str(&format!("exposure.geom.file{}", i)) else {
                    break;
                };
                let path = model.root.join(file);
                let layer = VectorLayer::read_geojson(&path, Some(exposure_crs))
                    .with_context(|| format!("Failed to read exposure geometries {:?}", path))?;
                let name = Path::new(file)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| format!("geom{}", i));
                exposure.geoms.insert(name, layer);
            }
            model.exposure = Some(exposure);
        }

        if let Some(file) = model.settings.get_str("vulnerability.file") {
            let path = model.root.join(file);
            model.vulnerability = Some(
                Vulnerability::read_csv(&path)
                    .with_context(|| format!("Failed to read damage functions {:?}", path))?,
            );
        }
        Ok(model)
    }
}
