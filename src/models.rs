use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use time::PrimitiveDateTime;
use tracing::{debug, warn};

/// Most recent row of `interpolation_performance`.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceSummary {
    pub id: i64,
    pub total_time_ms: f64,
    pub total_calculations: i64,
    pub successful_calculations: i64,
    pub avg_calculation_time_ms: f64,
    pub min_calculation_time_ms: f64,
    pub max_calculation_time_ms: f64,
    /// Raw JSON of the arguments the sweep was run with.
    pub parameters: Option<String>,
    pub created_at: PrimitiveDateTime,
}

impl PerformanceSummary {
    pub fn run_parameters(&self) -> RunParameters {
        RunParameters::from_json(self.parameters.as_deref())
    }
}

/// Arguments recorded by the stored procedure alongside its timings.
///
/// Every field is optional and read on its own: a missing key or a value of
/// an unexpected type only blanks that field. A `NULL` column or a blob that
/// is not a JSON object blanks all of them.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RunParameters {
    #[serde(deserialize_with = "lenient")]
    pub min_temperature: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub max_temperature: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub temperature_step: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub heights_count: Option<u64>,
    #[serde(deserialize_with = "lenient")]
    pub clear_previous_results: Option<bool>,
}

impl RunParameters {
    pub fn from_json(json: Option<&str>) -> Self {
        let Some(json) = json else {
            return Self::default();
        };

        let parameters = match serde_json::from_str(json) {
            Ok(object @ Value::Object(_)) => Self::deserialize(object),
            Ok(_) => {
                warn!("The run parameters `{json}` are not a JSON object");
                return Self::default();
            }
            Err(e) => Err(e),
        };

        parameters.unwrap_or_else(|e| {
            warn!("Could not decode the run parameters `{json}`: {e}");
            Self::default()
        })
    }
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromParameter,
{
    let value = Value::deserialize(deserializer)?;
    let parsed = T::from_parameter(&value);
    if parsed.is_none() && !value.is_null() {
        debug!("Ignoring run parameter `{value}`");
    }
    Ok(parsed)
}

/// Conversion of one parameter value, `None` when it has the wrong shape.
trait FromParameter: Sized {
    fn from_parameter(value: &Value) -> Option<Self>;
}

impl FromParameter for f64 {
    fn from_parameter(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromParameter for u64 {
    fn from_parameter(value: &Value) -> Option<Self> {
        if let Some(n) = value.as_u64() {
            return Some(n);
        }
        f64::from_parameter(value)
            .filter(|n| *n >= 0.0 && n.fract() == 0.0 && *n <= u64::MAX as f64)
            .map(|n| n as u64)
    }
}

impl FromParameter for bool {
    fn from_parameter(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Aggregates shared by the per height and per temperature statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timings {
    pub count: i64,
    pub avg_time: f64,
    pub min_time: f64,
    pub max_time: f64,
    /// Calculations that produced no value.
    pub error_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightStat {
    pub height: f64,
    pub timings: Timings,
}

/// Statistics of one 10 degrees wide temperature bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureStat {
    /// Lower bound of the bucket.
    pub temp_range: f64,
    pub timings: Timings,
}

impl TemperatureStat {
    pub const WIDTH: i64 = 10;

    pub fn label(&self) -> String {
        let low = self.temp_range as i64;
        format!("{}..{}", low, low + Self::WIDTH)
    }
}

/// One (height, 5 degrees temperature group) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatmapCell {
    pub height: f64,
    pub temp_group: f64,
    pub avg_time: f64,
    pub count: i64,
}

/// Everything fetched for one report.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceMetrics {
    pub summary: PerformanceSummary,
    pub heights: Vec<HeightStat>,
    pub temperatures: Vec<TemperatureStat>,
    pub heatmap: Vec<HeatmapCell>,
}

/// Heatmap cells pivoted into a heights × temperature groups grid.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapGrid {
    /// Sorted, distinct. One row each.
    pub heights: Vec<f64>,
    /// Sorted, distinct. One column each.
    pub temp_groups: Vec<f64>,
    /// `values[row][column]`, `None` where no cell was fetched.
    pub values: Vec<Vec<Option<f64>>>,
}

impl HeatmapGrid {
    pub fn from_cells(cells: &[HeatmapCell]) -> Self {
        let heights = sorted_distinct(cells.iter().map(|cell| cell.height));
        let temp_groups = sorted_distinct(cells.iter().map(|cell| cell.temp_group));

        let mut values = vec![vec![None; temp_groups.len()]; heights.len()];
        for cell in cells {
            if let (Ok(row), Ok(column)) = (
                heights.binary_search_by(|h| h.total_cmp(&cell.height)),
                temp_groups.binary_search_by(|t| t.total_cmp(&cell.temp_group)),
            ) {
                values[row][column] = Some(cell.avg_time);
            }
        }

        Self {
            heights,
            temp_groups,
            values,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.heights.is_empty() || self.temp_groups.is_empty()
    }

    /// Smallest and largest filled value.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        let mut values = self.values.iter().flatten().flatten().copied();
        let first = values.next()?;
        Some(values.fold((first, first), |(low, high), v| {
            (low.min(v), high.max(v))
        }))
    }
}

fn sorted_distinct(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut values: Vec<f64> = values.collect();
    values.sort_by(|left, right| left.total_cmp(right));
    values.dedup_by(|left, right| left.total_cmp(right) == Ordering::Equal);
    values
}

/// A value that may be missing, printed as `n/a` when it is.
pub struct OrNa<T>(pub Option<T>);

impl<T: fmt::Display> fmt::Display for OrNa<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(value) => fmt::Display::fmt(value, f),
            None => f.write_str("n/a"),
        }
    }
}
