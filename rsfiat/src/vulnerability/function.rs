use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::collect::global_variables::TRUNCATION_OFFSET;
use crate::commons::basic_functions::interpolate;
use crate::error::{FiatError, Result};

/// How a hazard raster is reduced over an asset footprint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionPolicy {
    #[default]
    Mean,
    Max,
}

impl fmt::Display for ExtractionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionPolicy::Mean => write!(f, "mean"),
            ExtractionPolicy::Max => write!(f, "max"),
        }
    }
}

impl FromStr for ExtractionPolicy {
    type Err = FiatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" | "average" => Ok(ExtractionPolicy::Mean),
            "max" => Ok(ExtractionPolicy::Max),
            other => Err(FiatError::config(format!(
                "unknown extraction method '{}'",
                other
            ))),
        }
    }
}

/// A depth-damage curve
#[derive(Debug, Clone, PartialEq)]
pub struct VulnerabilityFunction {
    pub name: String,
    pub unit: String,
    /// (hazard intensity, damage fraction), sorted by intensity
    pub points: Vec<(f64, f64)>,
    pub method: ExtractionPolicy,
}

impl VulnerabilityFunction {
    pub fn new(name: &str, unit: &str, mut points: Vec<(f64, f64)>) -> Self {
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        points.dedup_by(|b, a| a.0 == b.0);
        VulnerabilityFunction {
            name: name.to_string(),
            unit: unit.to_string(),
            points,
            method: ExtractionPolicy::default(),
        }
    }

    /// Damage fraction at `depth`, clamped to the ends of the curve
    pub fn value_at(&self, depth: f64) -> f64 {
        interpolate(&self.points, depth)
    }

    pub fn depths(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|(d, _)| *d)
    }

    /// Same curve sampled every `step` from its first to its last depth
    pub fn resampled(&self, step: f64) -> Result<Self> {
        if step <= 0.0 || !step.is_finite() {
            return Err(FiatError::config(format!("step size must be positive, got {}", step)));
        }
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return Ok(self.clone());
        };
        let count = ((last.0 - first.0) / step).round() as usize;
        let points = (0..=count)
            .map(|i| {
                // rounding keeps decimal steps free of float noise
                let depth = ((first.0 + i as f64 * step) * 1e6).round() / 1e6;
                (depth, self.value_at(depth))
            })
            .collect();
        Ok(VulnerabilityFunction {
            points,
            ..self.clone()
        })
    }

    /// Curve of a floodproofed asset: no damage below `floodproof_to`
    ///
    /// Breakpoints are inserted at `floodproof_to` (damage 0) and just above
    /// it (the original damage), so the curve is unchanged beyond that.
    pub fn truncated(&self, floodproof_to: f64) -> Self {
        let truncate_to = floodproof_to + TRUNCATION_OFFSET;
        let resume_value = self.value_at(truncate_to);

        let mut points: Vec<(f64, f64)> = self
            .points
            .iter()
            .filter(|(d, _)| *d != floodproof_to && *d != truncate_to)
            .map(|&(d, v)| if d < truncate_to { (d, 0.0) } else { (d, v) })
            .collect();
        points.push((floodproof_to, 0.0));
        points.push((truncate_to, resume_value));
        points.sort_by(|a, b| a.0.total_cmp(&b.0));

        VulnerabilityFunction {
            name: truncated_name(&self.name, floodproof_to),
            unit: self.unit.clone(),
            points,
            method: self.method,
        }
    }
}

/// `AGR1` floodproofed to 2.5 becomes `AGR1_fp_2_5`
pub fn truncated_name(name: &str, floodproof_to: f64) -> String {
    let level = if floodproof_to.fract() == 0.0 {
        format!("{:.1}", floodproof_to)
    } else {
        floodproof_to.to_string()
    };
    format!("{}_fp_{}", name, level.replace('.', "_"))
}

/// Step curve for roads: no damage below `threshold`, full damage from it
pub fn road_function(
    name: &str,
    unit: &str,
    threshold: f64,
    min_hazard_value: f64,
    max_hazard_value: f64,
    step: f64,
) -> Result<VulnerabilityFunction> {
    if step <= 0.0 || max_hazard_value < min_hazard_value {
        return Err(FiatError::config(format!(
            "invalid road curve range {}..{} step {}",
            min_hazard_value, max_hazard_value, step
        )));
    }
    let count = ((max_hazard_value - min_hazard_value) / step).round() as usize;
    let points = (0..=count)
        .map(|i| {
            let depth = min_hazard_value + i as f64 * step;
            (depth, if depth < threshold { 0.0 } else { 1.0 })
        })
        .collect();
    Ok(VulnerabilityFunction::new(name, unit, points))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve() -> VulnerabilityFunction {
        VulnerabilityFunction::new("AGR1", "m", vec![(2.0, 1.0), (0.0, 0.0), (1.0, 0.5)])
    }

    #[test]
    fn test_points_sorted() {
        assert_eq!(curve().points, vec![(0.0, 0.0), (1.0, 0.5), (2.0, 1.0)]);
    }

    #[test]
    fn test_truncate_zeroes_below_floodproof_level() {
        let truncated = curve().truncated(1.5);
        assert_eq!(truncated.name, "AGR1_fp_1_5");
        for depth in [0.0, 0.5, 1.0, 1.2, 1.49] {
            assert_eq!(truncated.value_at(depth), 0.0, "depth {}", depth);
        }
        assert!(truncated.points.contains(&(1.5, 0.0)));
        // shape above the truncation level is kept
        let original = curve();
        for depth in [1.51, 1.75, 2.0, 3.0] {
            assert!((truncated.value_at(depth) - original.value_at(depth)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_truncate_on_existing_breakpoint() {
        let truncated = curve().truncated(1.0);
        assert_eq!(truncated.name, "AGR1_fp_1_0");
        assert_eq!(truncated.points.iter().filter(|(d, _)| *d == 1.0).count(), 1);
        assert_eq!(truncated.value_at(1.0), 0.0);
        assert!((truncated.value_at(1.01) - 0.505).abs() < 1e-9);
    }

    #[test]
    fn test_resample() {
        let resampled = curve().resampled(0.25).unwrap();
        assert_eq!(resampled.points.len(), 9);
        assert!((resampled.value_at(0.75) - 0.375).abs() < 1e-9);
        assert!(curve().resampled(0.0).is_err());
    }

    #[test]
    fn test_road_function_steps() {
        let road = road_function("roads", "m", 0.6, 0.0, 10.0, 1.0).unwrap();
        assert_eq!(road.points.len(), 11);
        assert_eq!(road.points[0], (0.0, 0.0));
        assert_eq!(road.points[1], (1.0, 1.0));
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("MAX".parse::<ExtractionPolicy>().unwrap(), ExtractionPolicy::Max);
        assert_eq!("average".parse::<ExtractionPolicy>().unwrap(), ExtractionPolicy::Mean);
        assert!("median".parse::<ExtractionPolicy>().is_err());
    }
}
