use csv::{ReaderBuilder, StringRecord};
use std::fs;
use std::path::Path;

use crate::commons::basic_functions::detect_delimiter;
use crate::error::{FiatError, Result};

/// Loosely typed delimited table, used for reference data
/// (damage values, curve tables, linking tables)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Read a delimited file, guessing the delimiter from the header line
    ///
    /// Lines starting with `#` are skipped.
    pub fn read_csv(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FiatError::MissingSource(format!("{:?}", path)));
        }
        let text = fs::read_to_string(path).map_err(|e| FiatError::io(path, e))?;
        Self::from_csv_str(&text)
    }

    pub fn from_csv_str(text: &str) -> Result<Self> {
        let delimiter = detect_delimiter(text);
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .comment(Some(b'#'))
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let rows = reader
            .records()
            .map(|r| r.map(|rec: StringRecord| rec.iter().map(str::to_string).collect()))
            .collect::<std::result::Result<Vec<Vec<String>>, csv::Error>>()?;

        Ok(Table { headers, rows })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Index of a column that must exist
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| FiatError::config(format!("table has no column '{}'", name)))
    }

    /// Cell by row and column name, `None` for empty cells
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows
            .get(row)?
            .get(idx)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn get_f64(&self, row: usize, column: &str) -> Option<f64> {
        self.get(row, column)?.parse().ok()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semicolon_table() {
        let table = Table::from_csv_str("Country;Construction Cost Residential (2010 €)\nNetherlands; 700\n").unwrap();
        assert_eq!(table.headers.len(), 2);
        assert_eq!(table.get(0, "Country"), Some("Netherlands"));
        assert_eq!(
            table.get_f64(0, "Construction Cost Residential (2010 €)"),
            Some(700.0)
        );
        assert!(table.require_column("Missing").is_err());
    }

    #[test]
    fn test_comment_lines_skipped_and_empty_cells() {
        let table = Table::from_csv_str("#UNIT=m\na,b\n1,\n").unwrap();
        assert_eq!(table.headers, vec!["a", "b"]);
        assert_eq!(table.get(0, "b"), None);
        assert_eq!(table.len(), 1);
    }
}
