use serde::{Deserialize, Serialize};

use crate::error::{FiatError, Result};

/// A configuration value given either once or once per item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> From<T> for OneOrMany<T> {
    fn from(value: T) -> Self {
        OneOrMany::One(value)
    }
}

impl<T: Clone> OneOrMany<T> {
    /// Expand to exactly `n` values
    ///
    /// A single value (or a list of length one) is repeated, a list of
    /// length `n` is taken as is, anything else is a configuration error.
    pub fn broadcast(&self, n: usize, what: &str) -> Result<Vec<T>> {
        match self {
            OneOrMany::One(value) => Ok(vec![value.clone(); n]),
            OneOrMany::Many(values) if values.len() == 1 => Ok(vec![values[0].clone(); n]),
            OneOrMany::Many(values) if values.len() == n => Ok(values.clone()),
            OneOrMany::Many(values) => Err(FiatError::config(format!(
                "'{}' has {} values, expected 1 or {}",
                what,
                values.len(),
                n
            ))),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            OneOrMany::One(_) => 1,
            OneOrMany::Many(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value.clone()],
            OneOrMany::Many(values) => values.clone(),
        }
    }
}

/// Guess the delimiter of a delimited text from its first data line
pub fn detect_delimiter(text: &str) -> u8 {
    let header = text
        .lines()
        .find(|l| !l.trim_start().starts_with('#') && !l.trim().is_empty())
        .unwrap_or("");

    [b',', b';', b'\t', b'|']
        .into_iter()
        .max_by_key(|d| header.bytes().filter(|b| b == d).count())
        .filter(|d| header.bytes().any(|b| b == *d))
        .unwrap_or(b',')
}

/// Return period encoded in a map name, e.g. `flood_rp100` or `RP_0025.tif`
///
/// The number is the run of digits (with an optional decimal part) right
/// after the last `rp` marker that has one; `_` or `-` may separate them.
/// Anything after that run is ignored.
pub fn parse_return_period(name: &str) -> Option<f64> {
    let lower = name.to_ascii_lowercase();
    lower
        .rmatch_indices("rp")
        .find_map(|(i, _)| leading_number(lower[i + 2..].trim_start_matches(&['_', '-'][..])))
        .filter(|rp| *rp > 0.0)
}

fn leading_number(text: &str) -> Option<f64> {
    let int_len = text.bytes().take_while(u8::is_ascii_digit).count();
    if int_len == 0 {
        return None;
    }
    let frac_len = match text.as_bytes().get(int_len) {
        Some(b'.') => text[int_len + 1..]
            .bytes()
            .take_while(u8::is_ascii_digit)
            .count(),
        _ => 0,
    };
    let end = if frac_len > 0 {
        int_len + 1 + frac_len
    } else {
        int_len
    };
    text[..end].parse().ok()
}

/// Format a number without a trailing `.0` for integral values
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// `structure` -> `Structure`
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Linear interpolation over sorted `(x, y)` points, clamped at both ends
pub fn interpolate(points: &[(f64, f64)], x: f64) -> f64 {
    match points {
        [] => 0.0,
        [(_, y)] => *y,
        _ => {
            let first = points[0];
            let last = points[points.len() - 1];
            if x <= first.0 {
                return first.1;
            }
            if x >= last.0 {
                return last.1;
            }
            for pair in points.windows(2) {
                let (x0, y0) = pair[0];
                let (x1, y1) = pair[1];
                if x >= x0 && x <= x1 {
                    if x1 == x0 {
                        return y1;
                    }
                    return y0 + (y1 - y0) * (x - x0) / (x1 - x0);
                }
            }
            last.1
        }
    }
}
