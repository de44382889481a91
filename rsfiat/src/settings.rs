use log::debug;
use std::fs;
use std::path::Path;
use toml::{Table, Value};

use crate::error::{FiatError, Result};

/// The Delft-FIAT `settings.toml` document, addressed with dotted keys
/// such as `hazard.settings.subset`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FiatSettings {
    table: Table,
}

impl FiatSettings {
    pub fn new() -> Self {
        FiatSettings::default()
    }

    pub fn as_table(&self) -> &Table {
        &self.table
    }

    /// Set a value, creating intermediate tables
    ///
    /// Fails when an intermediate key already holds a non-table value.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        let mut parts: Vec<&str> = key.split('.').collect();
        let last = parts
            .pop()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| FiatError::config(format!("invalid settings key '{}'", key)))?;

        let mut table = &mut self.table;
        for part in parts {
            let entry = table
                .entry(part.to_string())
                .or_insert_with(|| Value::Table(Table::new()));
            table = match entry {
                Value::Table(t) => t,
                _ => {
                    return Err(FiatError::config(format!(
                        "settings key '{}' is not a table in '{}'",
                        part, key
                    )))
                }
            };
        }
        table.insert(last.to_string(), value.into());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut parts = key.split('.');
        let mut value = self.table.get(parts.next()?)?;
        for part in parts {
            value = value.as_table()?.get(part)?;
        }
        Some(value)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    /// Apply several dotted-key updates at once
    pub fn extend<'a>(
        &mut self,
        updates: impl IntoIterator<Item = (&'a String, &'a Value)>,
    ) -> Result<()> {
        for (key, value) in updates {
            self.set(key, value.clone())?;
        }
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| FiatError::io(path, e))?;
        Ok(FiatSettings {
            table: toml::from_str(&text)?,
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(&self.table)?;
        fs::write(path, text).map_err(|e| FiatError::io(path, e))?;
        debug!("Wrote settings to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dotted_keys() {
        let mut settings = FiatSettings::new();
        settings.set("hazard.crs", "EPSG:4326").unwrap();
        settings.set("hazard.settings.subset", "flood_rp10").unwrap();
        settings.set("hazard.risk", false).unwrap();

        assert_eq!(settings.get_str("hazard.crs"), Some("EPSG:4326"));
        assert_eq!(settings.get_str("hazard.settings.subset"), Some("flood_rp10"));
        assert_eq!(settings.get("hazard.risk"), Some(&Value::Boolean(false)));
        assert!(settings.get("exposure.csv").is_none());
    }

    #[test]
    fn test_scalar_blocks_nested_key() {
        let mut settings = FiatSettings::new();
        settings.set("output", "out").unwrap();
        assert!(settings.set("output.csv.name", "x.csv").is_err());
        assert!(settings.set("", 1).is_err());
    }

    #[test]
    fn test_write_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut settings = FiatSettings::new();
        settings.set("global.crs", "EPSG:32617").unwrap();
        settings
            .set("hazard.return_periods", vec![2.0, 10.0, 100.0])
            .unwrap();
        settings.write(&path).unwrap();

        assert_eq!(FiatSettings::read(&path).unwrap(), settings);
    }
}
