//! Performance report of the database-side interpolation sweep.
//!
//! The sweep itself lives in PostgreSQL, in the
//! `calculate_all_interpolations` procedure. This crate triggers it through a
//! [`db::PerformanceStore`], reads back the aggregated timings and turns them
//! into a console [`report::Summary`] and a set of charts.

pub mod config;
pub mod db;
pub mod models;
pub mod pipeline;
pub mod plot;
pub mod report;

pub use config::{CalculationSettings, Cli, Config, DbConfig, OutputSettings};
pub use db::{DbError, PerformanceStore, PgStore};
pub use models::{
    HeatmapCell, HeatmapGrid, HeightStat, PerformanceMetrics, PerformanceSummary, RunParameters,
    TemperatureStat, Timings,
};
pub use pipeline::{run, AppError, Outcome};
pub use plot::{render_charts, ChartPaths, PlotError};
pub use report::{success_rate, ReportError, Summary};
