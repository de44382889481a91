use anyhow::{Context, Result};
use rsfiat::collect::DataCatalog;
use rsfiat::hazard::HazardMaps;
use rsfiat::{BuildConfig, FiatModel};
use std::env;

/// Example: build a Delft-FIAT model from a data catalog and a build config
///
/// cargo run --example build_from_config -- catalog.toml build.toml ./fiat_model
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 4 {
        anyhow::bail!("usage: {} <catalog.toml> <build.toml> <model root>", args[0]);
    }

    println!("=== Example: Building a FIAT model ===\n");

    let catalog = DataCatalog::from_file(&args[1])
        .with_context(|| format!("Failed to read data catalog {}", args[1]))?;
    let config = BuildConfig::from_file(&args[2])
        .with_context(|| format!("Failed to read build configuration {}", args[2]))?;

    let mut model = FiatModel::new(&args[3], catalog);
    model.build(&config).context("Model build failed")?;

    if let Some(exposure) = &model.exposure {
        println!("Exposure:");
        println!("  - Assets: {}", exposure.len());
        println!("  - Occupancy types: {}", exposure.secondary_object_types().join(", "));
    }
    if let Some(vulnerability) = &model.vulnerability {
        println!("Vulnerability:");
        println!("  - Damage functions: {} ({})", vulnerability.len(), vulnerability.unit);
    }
    match &model.hazard {
        Some(HazardMaps::Risk(risk)) => {
            println!("Hazard (risk):");
            println!("  - Return periods: {:?}", risk.return_periods);
        }
        Some(HazardMaps::Event(maps)) => {
            println!("Hazard (event):");
            println!("  - Maps: {}", maps.keys().cloned().collect::<Vec<_>>().join(", "));
        }
        None => {}
    }

    model.write()?;
    println!("\nModel written to {:?}", model.root());

    Ok(())
}
