use std::env;

use clap::Parser;
use miette::{IntoDiagnostic, WrapErr};
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use interp_perf::{plot::file_stamp, report::print_header, run, Cli, Config, Outcome, PgStore};

fn main() -> miette::Result<()> {
    let config = Config::resolve(Cli::parse());

    FmtSubscriber::builder()
        .with_max_level(
            env::var("RUST_LOG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(if config.verbose {
                    Level::DEBUG
                } else {
                    Level::INFO
                }),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    print_header("INTERPOLATION PERFORMANCE ANALYSIS");
    println!("Runs every interpolation of the sweep in the database");
    println!("and reports how long they took.");
    info!(?config, "Starting");

    let result = analyse(&config);
    println!("\nApplication finished");
    result
}

fn analyse(config: &Config) -> miette::Result<()> {
    print_header("DATABASE CONNECTION");
    println!(
        "Connecting to database {} on {}:{}...",
        config.db.dbname, config.db.host, config.db.port
    );
    let mut store = PgStore::connect(&config.db)
        .into_diagnostic()
        .wrap_err("✗ Database connection failed")?;
    println!("✓ Connected");

    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let stamp = file_stamp(PrimitiveDateTime::new(now.date(), now.time()));

    let outcome = run(config, &mut store, &stamp);

    drop(store);
    println!("\nDatabase connection closed");

    match outcome.into_diagnostic()? {
        Outcome::NoData => println!("Nothing to report."),
        Outcome::Completed {
            combined_chart: Some(chart),
        } => {
            println!("\n✓ Performance analysis complete");
            println!("  Dashboard: {}", chart.display());
        }
        Outcome::Completed {
            combined_chart: None,
        } => println!("\n✓ Performance analysis complete"),
    }

    Ok(())
}
