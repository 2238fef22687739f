use std::fmt;

use thiserror::Error;
use time::{macros::format_description, PrimitiveDateTime};
use tracing::warn;

use crate::models::{OrNa, PerformanceSummary, RunParameters};

const HEADER_WIDTH: usize = 80;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReportError {
    #[error("No calculation was recorded, the success rate is undefined")]
    NoCalculations,
}

/// Percentage of successful calculations.
pub fn success_rate(successful: i64, total: i64) -> Result<f64, ReportError> {
    if total == 0 {
        return Err(ReportError::NoCalculations);
    }
    Ok(successful as f64 / total as f64 * 100.0)
}

/// Title framed by two full width rules.
pub fn header(title: &str) -> String {
    let rule = "=".repeat(HEADER_WIDTH);
    format!("\n{rule}\n{:^HEADER_WIDTH$}\n{rule}", format!(" {title} "))
}

pub fn print_header(title: &str) {
    println!("{}", header(title));
}

/// Figures derived from a [`PerformanceSummary`] for display.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub created_at: PrimitiveDateTime,
    pub parameters: RunParameters,
    pub total_calculations: i64,
    pub successful_calculations: i64,
    /// `None` when no calculation was recorded.
    pub success_rate: Option<f64>,
    pub total_time_ms: f64,
    pub avg_time_ms: f64,
    pub min_time_ms: f64,
    pub max_time_ms: f64,
}

impl Summary {
    pub fn from_metrics(summary: &PerformanceSummary) -> Self {
        let success_rate = match success_rate(
            summary.successful_calculations,
            summary.total_calculations,
        ) {
            Ok(rate) => Some(rate),
            Err(e) => {
                warn!("{e}");
                None
            }
        };

        Self {
            created_at: summary.created_at,
            parameters: summary.run_parameters(),
            total_calculations: summary.total_calculations,
            successful_calculations: summary.successful_calculations,
            success_rate,
            total_time_ms: summary.total_time_ms,
            avg_time_ms: summary.avg_calculation_time_ms,
            min_time_ms: summary.min_calculation_time_ms,
            max_time_ms: summary.max_calculation_time_ms,
        }
    }

    pub fn created_at(&self) -> String {
        let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        self.created_at
            .format(&format)
            .unwrap_or_else(|_| self.created_at.to_string())
    }

    /// Text of the dashboard's summary panel, one entry per line.
    pub fn panel_lines(&self) -> Vec<String> {
        let mut lines = vec![
            String::from("Interpolation performance"),
            format!("Recorded at: {}", self.created_at()),
            String::new(),
        ];
        lines.extend(self.to_string().lines().map(String::from));
        lines
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parameters = &self.parameters;

        writeln!(f, "Calculation parameters:")?;
        writeln!(
            f,
            "- Temperature range: {} to {} °C",
            OrNa(parameters.min_temperature),
            OrNa(parameters.max_temperature)
        )?;
        writeln!(f, "- Temperature step: {} °C", OrNa(parameters.temperature_step))?;
        writeln!(f, "- Heights: {}", OrNa(parameters.heights_count))?;
        writeln!(f)?;

        writeln!(f, "Calculation results:")?;
        writeln!(f, "- Total calculations: {}", self.total_calculations)?;
        writeln!(f, "- Successful calculations: {}", self.successful_calculations)?;
        match self.success_rate {
            Some(rate) => writeln!(f, "- Success rate: {rate:.2}%")?,
            None => writeln!(f, "- Success rate: n/a")?,
        }
        writeln!(f)?;

        writeln!(f, "Execution time:")?;
        writeln!(
            f,
            "- Total time: {:.2} ms ({:.2} s)",
            self.total_time_ms,
            self.total_time_ms / 1000.0
        )?;
        writeln!(f, "- Average time: {:.4} ms", self.avg_time_ms)?;
        writeln!(f, "- Minimum time: {:.4} ms", self.min_time_ms)?;
        write!(f, "- Maximum time: {:.4} ms", self.max_time_ms)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn performance(successful: i64, total: i64, parameters: Option<&str>) -> PerformanceSummary {
        PerformanceSummary {
            id: 1,
            total_time_ms: 1234.5,
            total_calculations: total,
            successful_calculations: successful,
            avg_calculation_time_ms: 0.12345,
            min_calculation_time_ms: 0.01,
            max_calculation_time_ms: 2.5,
            parameters: parameters.map(String::from),
            created_at: datetime!(2024-03-05 14:07:09),
        }
    }

    #[test]
    fn full_success_is_exactly_one_hundred_percent() {
        assert_eq!(success_rate(41, 41), Ok(100.0));
        assert_eq!(success_rate(1, 1), Ok(100.0));
    }

    #[test]
    fn zero_total_is_an_error() {
        assert_eq!(success_rate(0, 0), Err(ReportError::NoCalculations));
    }

    #[test]
    fn partial_success() {
        assert_eq!(success_rate(1, 4), Ok(25.0));
    }

    #[test]
    fn header_is_centred() {
        let header = header("SUMMARY");
        let lines: Vec<&str> = header.lines().collect();

        assert_eq!(lines[0], "");
        assert_eq!(lines[1], "=".repeat(80));
        assert_eq!(lines[2].len(), 80);
        assert_eq!(lines[2].trim(), "SUMMARY");
        assert_eq!(lines[3], "=".repeat(80));
    }

    #[test]
    fn summary_text() {
        let summary = Summary::from_metrics(&performance(
            80,
            100,
            Some(r#"{"min_temperature": -20, "max_temperature": 20, "temperature_step": 1.0, "heights_count": 12}"#),
        ));
        let text = summary.to_string();

        assert!(text.contains("- Temperature range: -20 to 20 °C"));
        assert!(text.contains("- Temperature step: 1 °C"));
        assert!(text.contains("- Heights: 12"));
        assert!(text.contains("- Success rate: 80.00%"));
        assert!(text.contains("- Total time: 1234.50 ms (1.23 s)"));
        assert!(text.contains("- Average time: 0.1235 ms"));
        assert!(text.contains("- Maximum time: 2.5000 ms"));
    }

    #[test]
    fn missing_figures_print_as_not_available() {
        let summary = Summary::from_metrics(&performance(0, 0, None));
        let text = summary.to_string();

        assert_eq!(summary.success_rate, None);
        assert!(text.contains("- Temperature range: n/a to n/a °C"));
        assert!(text.contains("- Heights: n/a"));
        assert!(text.contains("- Success rate: n/a"));
    }

    #[test]
    fn panel_starts_with_the_record_date() {
        let summary = Summary::from_metrics(&performance(1, 1, None));
        let lines = summary.panel_lines();

        assert_eq!(lines[1], "Recorded at: 2024-03-05 14:07:09");
        assert!(lines.iter().any(|line| line == "- Success rate: 100.00%"));
    }
}
