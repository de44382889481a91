use serde_json::json;
use std::fs;
use std::path::Path;

use rsfiat::collect::DataCatalog;
use rsfiat::exposure::columns::{OBJECT_ID, SVI};
use rsfiat::hazard::raster_io::RasterBand;
use rsfiat::hazard::{GeoTiffIo, Grid, HazardMaps, RasterWriter};
use rsfiat::settings::FiatSettings;
use rsfiat::{BuildConfig, FiatError, FiatModel};

const EPSG: u32 = 32617;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn point(x: f64, y: f64, props: serde_json::Value) -> serde_json::Value {
    json!({
        "type": "Feature",
        "geometry": { "type": "Point", "coordinates": [x, y] },
        "properties": props
    })
}

fn square(x0: f64, x1: f64, props: serde_json::Value) -> serde_json::Value {
    json!({
        "type": "Feature",
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[x0, 0.0], [x1, 0.0], [x1, 400.0], [x0, 400.0], [x0, 0.0]]]
        },
        "properties": props
    })
}

fn write_json(path: &Path, value: serde_json::Value) {
    fs::write(path, value.to_string()).unwrap();
}

fn write_hazard(path: &Path, value: f64) {
    let mut grid = Grid::new(4, 4, [0.0, 100.0, 0.0, 400.0, 0.0, -100.0]);
    grid.crs = Some(rsfiat::geo_core::Crs::from_epsg(EPSG));
    grid.nodata = Some(-9999.0);
    let data = vec![value; 16];
    GeoTiffIo
        .write(path, &grid, &[RasterBand { name: "depth", data: &data }])
        .unwrap();
}

/// Source data and catalog of a small model in UTM 17N
fn setup_sources(dir: &Path) {
    write_json(
        &dir.join("nsi.geojson"),
        json!({
            "type": "FeatureCollection",
            "features": [
                point(100.0, 100.0, json!({"fd_id": 501, "occtype": "RES1-1SNB", "st_damcat": "RES",
                    "found_ht": 2.0, "val_struct": 150000.0, "val_cont": 75000.0})),
                point(200.0, 150.0, json!({"fd_id": 502, "occtype": "RES1-1SNB", "st_damcat": "RES",
                    "found_ht": 1.5, "val_struct": 120000.0, "val_cont": 60000.0})),
                point(300.0, 250.0, json!({"fd_id": 503, "occtype": "COM1", "st_damcat": "COM",
                    "found_ht": 0.5, "val_struct": 500000.0, "val_cont": 400000.0})),
            ]
        }),
    );
    write_json(
        &dir.join("nsi_to_fiat.json"),
        json!({
            "Object ID": "fd_id",
            "Primary Object Type": "st_damcat",
            "Secondary Object Type": "occtype",
            "Max Potential Damage: Structure": "val_struct",
            "Max Potential Damage: Content": "val_cont"
        }),
    );
    write_json(
        &dir.join("zones.geojson"),
        json!({
            "type": "FeatureCollection",
            "features": [
                square(0.0, 250.0, json!({"ZONE_BASE": "A"})),
                square(250.0, 400.0, json!({"ZONE_BASE": "B"})),
            ]
        }),
    );
    write_json(
        &dir.join("svi.geojson"),
        json!({
            "type": "FeatureCollection",
            "features": [square(0.0, 400.0, json!({"SVI": 0.25, "GEOID": "45019"}))]
        }),
    );
    fs::write(dir.join("curves.csv"), "ID,0,1,2\nRES1_BA,0,0.5,1\nCOM1_BA,0,0.3,0.6\n").unwrap();
    fs::write(
        dir.join("linking.csv"),
        "Damage Function Name,Damage Function ID,Exposure Link,Damage Type\nRES1,RES1_BA,RES1-1SNB,\nCOM1,COM1_BA,COM1,\n",
    )
    .unwrap();
    for (name, value) in [("flood_rp100", 1.2), ("flood_rp2", 0.1), ("flood_rp10", 0.5)] {
        write_hazard(&dir.join(format!("{}.tif", name)), value);
    }

    fs::write(
        dir.join("catalog.toml"),
        format!(
            r#"
[nsi]
path = "nsi.geojson"
data_type = "GeoDataFrame"
driver = "vector"
crs = {epsg}
translation_fn = "nsi_to_fiat.json"

[zones]
path = "zones.geojson"
data_type = "GeoDataFrame"
driver = "vector"
crs = {epsg}

[svi]
path = "svi.geojson"
data_type = "GeoDataFrame"
driver = "vector"
crs = {epsg}

[curves]
path = "curves.csv"
data_type = "DataFrame"
driver = "csv"

[linking]
path = "linking.csv"
data_type = "DataFrame"
driver = "csv"

[flood_rp100]
path = "flood_rp100.tif"
data_type = "RasterDataset"
driver = "raster"
meta = {{ unit = "m" }}

[flood_rp2]
path = "flood_rp2.tif"
data_type = "RasterDataset"
driver = "raster"
meta = {{ unit = "m" }}

[flood_rp10]
path = "flood_rp10.tif"
data_type = "RasterDataset"
driver = "raster"
meta = {{ unit = "m" }}
"#,
            epsg = EPSG
        ),
    )
    .unwrap();
}

const CONFIG: &str = r#"
[setup_global_settings]
crs = "EPSG:32617"

[setup_output]
output_dir = "output"

[setup_vulnerability]
vulnerability_fn = "curves"
vulnerability_identifiers_and_linking_fn = "linking"
unit = "m"
functions_max = ["COM1"]

[setup_road_vulnerability]
vertical_unit = "m"

[setup_exposure_buildings]
asset_locations = "nsi"
occupancy_type = "nsi"
max_potential_damage = "nsi"
ground_floor_height = "found_ht"
unit = "m"

[setup_aggregation_areas]
aggregation_area_fn = "zones"
attribute_names = "ZONE_BASE"
label_names = "Zoning_map"

[setup_social_vulnerability_index]
svi_fn = "svi"

[setup_hazard]
map_fn = ["flood_rp100", "flood_rp2", "flood_rp10"]
risk_output = true
"#;

#[test]
fn test_build_write_read_model() {
    init_logger();
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    setup_sources(data.path());

    let catalog = DataCatalog::from_file(data.path().join("catalog.toml")).unwrap();
    let config = BuildConfig::from_toml_str(CONFIG).unwrap();
    let mut model = FiatModel::new(out.path(), catalog);
    model.build(&config).unwrap();

    let exposure = model.exposure.as_ref().unwrap();
    let ids: Vec<i64> = exposure.rows.iter().map(|r| r.object_id).collect();
    assert_eq!(ids, vec![501, 502, 503]);
    assert_eq!(exposure.rows[0].damage_functions["Structure"], "RES1");
    assert_eq!(exposure.rows[2].damage_functions["Content"], "COM1");
    assert_eq!(exposure.rows[1].ground_floor_height, Some(1.5));
    assert_eq!(exposure.rows[0].aggregation_labels["Zoning_map"], "A");
    assert_eq!(exposure.rows[2].aggregation_labels["Zoning_map"], "B");
    assert_eq!(exposure.rows[1].get(SVI).as_deref(), Some("0.25"));

    let built: Vec<_> = exposure
        .rows
        .iter()
        .map(|r| (r.object_id, r.damage_functions.clone()))
        .collect();

    let vulnerability = model.vulnerability.as_ref().unwrap();
    assert!(vulnerability.get("roads").is_some());
    let function_count = vulnerability.len();

    match model.hazard.as_ref().unwrap() {
        HazardMaps::Risk(risk) => {
            assert_eq!(risk.return_periods, vec![2.0, 10.0, 100.0]);
            assert_eq!(risk.names, vec!["flood_rp2", "flood_rp10", "flood_rp100"]);
            assert_eq!(risk.bands[0][0], 0.1);
        }
        HazardMaps::Event(_) => panic!("expected a risk dataset"),
    }

    model.write().unwrap();
    for file in [
        "exposure/exposure.csv",
        "exposure/buildings.geojson",
        "vulnerability/vulnerability_curves.csv",
        "hazard/risk_map.tif",
        "settings.toml",
    ] {
        assert!(out.path().join(file).exists(), "{} not written", file);
    }

    let settings = FiatSettings::read(&out.path().join("settings.toml")).unwrap();
    assert_eq!(settings.get_str("hazard.crs"), Some("EPSG:32617"));
    assert_eq!(settings.get_str("hazard.elevation_reference"), Some("dem"));
    assert_eq!(settings.get_str("exposure.csv.file"), Some("exposure/exposure.csv"));

    let read = FiatModel::read(out.path(), DataCatalog::new()).unwrap();
    let reread = read.exposure.as_ref().unwrap();
    assert_eq!(reread.len(), 3);
    for (row, (object_id, damage_functions)) in reread.rows.iter().zip(&built) {
        assert_eq!(row.object_id, *object_id);
        assert_eq!(&row.damage_functions, damage_functions);
    }
    let buildings = &reread.geoms["buildings"];
    assert_eq!(buildings.features[2].property_f64(OBJECT_ID), Some(503.0));
    assert_eq!(read.vulnerability.as_ref().unwrap().len(), function_count);
}

#[test]
fn test_missing_hazard_map_stops_build() {
    init_logger();
    let data = tempfile::tempdir().unwrap();
    setup_sources(data.path());
    fs::remove_file(data.path().join("flood_rp2.tif")).unwrap();

    let catalog = DataCatalog::from_file(data.path().join("catalog.toml")).unwrap();
    let config = BuildConfig::from_toml_str(CONFIG).unwrap();
    let mut model = FiatModel::new(data.path().join("model"), catalog);

    let result = model.build(&config);
    assert!(matches!(result, Err(FiatError::MissingSource(msg)) if msg.contains("flood_rp2")));
    assert!(model.hazard.is_none());
}
