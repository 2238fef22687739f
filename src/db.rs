use std::{
    fmt,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use indicatif::{ProgressBar, ProgressStyle};
use postgres::{Client, NoTls, Row};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{CalculationSettings, DbConfig};
use crate::models::{
    HeatmapCell, HeightStat, PerformanceMetrics, PerformanceSummary, TemperatureStat, Timings,
};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Could not connect to database `{dbname}` on {host}:{port}")]
    Connect {
        dbname: String,
        host: String,
        port: u16,
        #[source]
        source: postgres::Error,
    },
    #[error("The interpolation procedure failed, its transaction was rolled back")]
    Procedure(#[source] postgres::Error),
    #[error("Could not fetch the {query}")]
    Query {
        query: &'static str,
        #[source]
        source: postgres::Error,
    },
}

/// Where the sweep runs and its metrics come from.
pub trait PerformanceStore {
    /// Runs the whole sweep and commits it. On failure nothing is kept and
    /// the store is left usable.
    fn run_interpolations(&mut self, settings: &CalculationSettings) -> Result<Duration, DbError>;

    /// `None` when no sweep was ever recorded.
    fn fetch_metrics(&mut self) -> Result<Option<PerformanceMetrics>, DbError>;

    /// Server notices received since the last call.
    fn take_notices(&mut self) -> Vec<String> {
        Vec::new()
    }
}

pub struct PgStore {
    client: Client,
    schema: String,
    notices: Arc<Mutex<Vec<String>>>,
}

impl PgStore {
    pub fn connect(db: &DbConfig) -> Result<Self, DbError> {
        let connect_error = |source| DbError::Connect {
            dbname: db.dbname.clone(),
            host: db.host.clone(),
            port: db.port,
            source,
        };

        let mut config: postgres::Config = db.conninfo().parse().map_err(connect_error)?;

        let notices = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&notices);
        config.notice_callback(move |notice| {
            if let Ok(mut notices) = sink.lock() {
                notices.push(notice.message().to_string());
            }
        });

        let client = config.connect(NoTls).map_err(connect_error)?;
        info!(
            "Connected to database {} on {}:{}",
            db.dbname, db.host, db.port
        );

        Ok(Self {
            client,
            schema: quote_ident(&db.schema),
            notices,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    fn query_all<T>(
        &mut self,
        query: &'static str,
        sql: &str,
        decode: fn(&Row) -> Result<T, postgres::Error>,
    ) -> Result<Vec<T>, DbError> {
        let query_error = |source| DbError::Query { query, source };
        let rows = self.client.query(sql, &[]).map_err(query_error)?;
        let rows = rows
            .iter()
            .map(decode)
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_error)?;
        debug!("Fetched {} rows of {query}", rows.len());
        Ok(rows)
    }
}

impl PerformanceStore for PgStore {
    fn run_interpolations(&mut self, settings: &CalculationSettings) -> Result<Duration, DbError> {
        let sql = call_sql(&self.schema, settings);
        debug!("{sql}");

        let spinner = spinner();
        let start = Instant::now();
        let result = call_procedure(&mut self.client, &sql);
        spinner.finish_and_clear();

        result.map_err(DbError::Procedure)?;
        Ok(start.elapsed())
    }

    fn fetch_metrics(&mut self) -> Result<Option<PerformanceMetrics>, DbError> {
        let summary = self
            .client
            .query_opt(summary_sql(&self.schema).as_str(), &[])
            .and_then(|row| row.as_ref().map(performance_summary).transpose())
            .map_err(|source| DbError::Query {
                query: "performance summary",
                source,
            })?;

        let Some(summary) = summary else {
            return Ok(None);
        };

        let heights = self.query_all(
            "height statistics",
            &height_stats_sql(&self.schema),
            height_stat,
        )?;
        let temperatures = self.query_all(
            "temperature statistics",
            &temperature_stats_sql(&self.schema),
            temperature_stat,
        )?;
        let heatmap = self.query_all("heatmap", &heatmap_sql(&self.schema), heatmap_cell)?;

        Ok(Some(PerformanceMetrics {
            summary,
            heights,
            temperatures,
            heatmap,
        }))
    }

    fn take_notices(&mut self) -> Vec<String> {
        self.notices
            .lock()
            .map(|mut notices| std::mem::take(&mut *notices))
            .unwrap_or_default()
    }
}

// Dropping the transaction without committing rolls it back.
fn call_procedure(client: &mut Client, sql: &str) -> Result<(), postgres::Error> {
    let mut transaction = client.transaction()?;
    transaction.execute(sql, &[])?;
    transaction.commit()
}

fn spinner() -> ProgressBar {
    let style = ProgressStyle::with_template("{msg} {spinner}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("|/-\\ ");
    let spinner = ProgressBar::new_spinner().with_style(style);
    spinner.set_message("Running...");
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Quotes an SQL identifier.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Untyped SQL literal, so that the server resolves it against the
/// procedure's signature. Only ever fed numbers and booleans.
fn literal(value: impl fmt::Display) -> String {
    format!("'{value}'")
}

pub fn call_sql(schema: &str, settings: &CalculationSettings) -> String {
    format!(
        "CALL {schema}.calculate_all_interpolations({}, {}, {}, {})",
        literal(settings.min_temperature),
        literal(settings.max_temperature),
        literal(settings.temperature_step),
        literal(settings.clear_previous_results),
    )
}

pub fn summary_sql(schema: &str) -> String {
    format!(
        "SELECT
            id::int8 AS id,
            total_time_ms::float8 AS total_time_ms,
            total_calculations::int8 AS total_calculations,
            successful_calculations::int8 AS successful_calculations,
            avg_calculation_time_ms::float8 AS avg_calculation_time_ms,
            min_calculation_time_ms::float8 AS min_calculation_time_ms,
            max_calculation_time_ms::float8 AS max_calculation_time_ms,
            parameters::text AS parameters,
            created_at::timestamp AS created_at
        FROM {schema}.interpolation_performance
        ORDER BY created_at DESC
        LIMIT 1"
    )
}

const TIMINGS_COLUMNS: &str = "COUNT(*) AS count,
            AVG(calculation_time)::float8 AS avg_time,
            MIN(calculation_time)::float8 AS min_time,
            MAX(calculation_time)::float8 AS max_time,
            COUNT(*) FILTER (WHERE result_value IS NULL) AS error_count";

pub fn height_stats_sql(schema: &str) -> String {
    format!(
        "SELECT
            height::float8 AS height,
            {TIMINGS_COLUMNS}
        FROM {schema}.interpolation_results
        GROUP BY 1
        ORDER BY 1"
    )
}

pub fn temperature_stats_sql(schema: &str) -> String {
    format!(
        "SELECT
            (FLOOR(temperature / 10) * 10)::float8 AS temp_range,
            {TIMINGS_COLUMNS}
        FROM {schema}.interpolation_results
        GROUP BY 1
        ORDER BY 1"
    )
}

pub fn heatmap_sql(schema: &str) -> String {
    format!(
        "SELECT
            height::float8 AS height,
            (FLOOR(temperature / 5) * 5)::float8 AS temp_group,
            AVG(calculation_time)::float8 AS avg_time,
            COUNT(*) AS count
        FROM {schema}.interpolation_results
        GROUP BY 1, 2
        ORDER BY 1, 2"
    )
}

fn performance_summary(row: &Row) -> Result<PerformanceSummary, postgres::Error> {
    Ok(PerformanceSummary {
        id: row.try_get("id")?,
        total_time_ms: row.try_get("total_time_ms")?,
        total_calculations: row.try_get("total_calculations")?,
        successful_calculations: row.try_get("successful_calculations")?,
        avg_calculation_time_ms: row.try_get("avg_calculation_time_ms")?,
        min_calculation_time_ms: row.try_get("min_calculation_time_ms")?,
        max_calculation_time_ms: row.try_get("max_calculation_time_ms")?,
        parameters: row.try_get("parameters")?,
        created_at: row.try_get("created_at")?,
    })
}

fn timings(row: &Row) -> Result<Timings, postgres::Error> {
    Ok(Timings {
        count: row.try_get("count")?,
        avg_time: row.try_get("avg_time")?,
        min_time: row.try_get("min_time")?,
        max_time: row.try_get("max_time")?,
        error_count: row.try_get("error_count")?,
    })
}

fn height_stat(row: &Row) -> Result<HeightStat, postgres::Error> {
    Ok(HeightStat {
        height: row.try_get("height")?,
        timings: timings(row)?,
    })
}

fn temperature_stat(row: &Row) -> Result<TemperatureStat, postgres::Error> {
    Ok(TemperatureStat {
        temp_range: row.try_get("temp_range")?,
        timings: timings(row)?,
    })
}

fn heatmap_cell(row: &Row) -> Result<HeatmapCell, postgres::Error> {
    Ok(HeatmapCell {
        height: row.try_get("height")?,
        temp_group: row.try_get("temp_group")?,
        avg_time: row.try_get("avg_time")?,
        count: row.try_get("count")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("snaart"), r#""snaart""#);
        assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
    }

    #[test]
    fn procedure_call_passes_the_four_settings() {
        let settings = CalculationSettings {
            min_temperature: -20.0,
            max_temperature: 20.5,
            temperature_step: 0.25,
            clear_previous_results: false,
        };

        assert_eq!(
            call_sql(&quote_ident("snaart"), &settings),
            r#"CALL "snaart".calculate_all_interpolations('-20', '20.5', '0.25', 'false')"#
        );
    }

    #[test]
    fn queries_target_the_schema() {
        let schema = quote_ident("meteo");

        assert!(summary_sql(&schema).contains(r#"FROM "meteo".interpolation_performance"#));
        for sql in [
            height_stats_sql(&schema),
            temperature_stats_sql(&schema),
            heatmap_sql(&schema),
        ] {
            assert!(sql.contains(r#"FROM "meteo".interpolation_results"#));
        }
    }

    #[test]
    fn buckets() {
        assert!(temperature_stats_sql("s").contains("FLOOR(temperature / 10) * 10"));
        assert!(heatmap_sql("s").contains("FLOOR(temperature / 5) * 5"));
        assert!(summary_sql("s").contains("ORDER BY created_at DESC"));
    }
}
