use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
    config::Config,
    db::{DbError, PerformanceStore},
    plot::{render_charts, PlotError},
    report::{print_header, Summary},
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Plot(#[from] PlotError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No sweep was ever recorded: nothing was printed nor drawn.
    NoData,
    Completed {
        /// `None` when the charts were disabled or could not be drawn.
        combined_chart: Option<PathBuf>,
    },
}

/// Runs the sweep (unless skipped), then prints and draws its metrics.
///
/// `stamp` names the chart files, see [`crate::plot::ChartPaths`].
pub fn run(
    config: &Config,
    store: &mut impl PerformanceStore,
    stamp: &str,
) -> Result<Outcome, AppError> {
    if config.skip_calculation {
        println!("\nInterpolation run skipped on request.");
        println!("Reporting on the results already in the database.");
    } else {
        run_interpolations(config, store)?;
    }

    print_header("PERFORMANCE METRICS");
    let Some(metrics) = store.fetch_metrics()? else {
        println!("✗ No performance metrics found");
        return Ok(Outcome::NoData);
    };
    println!(
        "✓ Fetched statistics for {} heights, {} temperature ranges and {} heatmap cells",
        metrics.heights.len(),
        metrics.temperatures.len(),
        metrics.heatmap.len()
    );

    let summary = Summary::from_metrics(&metrics.summary);
    print_header("CALCULATION SUMMARY");
    println!("{summary}");

    if !config.output.plots {
        println!("\nChart generation skipped on request.");
        return Ok(Outcome::Completed {
            combined_chart: None,
        });
    }

    print_header("CHARTS");
    let rendered = render_charts(
        &metrics,
        &summary,
        &config.output.dir,
        stamp,
        config.output.dpi,
    )?;

    let Some(rendered) = rendered else {
        println!("✗ Not enough data to draw the charts");
        return Ok(Outcome::Completed {
            combined_chart: None,
        });
    };

    println!("\n✓ Charts written:");
    for (i, path) in rendered.written.iter().enumerate() {
        println!("{}. {}", i + 1, path.display());
    }

    Ok(Outcome::Completed {
        combined_chart: Some(rendered.combined),
    })
}

fn run_interpolations(config: &Config, store: &mut impl PerformanceStore) -> Result<(), AppError> {
    let settings = &config.calculation;

    print_header("INTERPOLATION RUN");
    println!("Parameters:");
    println!(
        "- Temperature range: {} to {} °C",
        settings.min_temperature, settings.max_temperature
    );
    println!("- Temperature step: {} °C", settings.temperature_step);
    println!(
        "- Clear previous results: {}",
        if settings.clear_previous_results {
            "yes"
        } else {
            "no"
        }
    );
    println!("\nThis may take a while...\n");
    debug!(?settings, "Calling the interpolation procedure");

    let result = store.run_interpolations(settings);

    let notices = store.take_notices();
    if config.verbose && !notices.is_empty() {
        println!("\nNotices:");
        for notice in &notices {
            println!("  {}", notice.trim());
        }
    }

    match result {
        Ok(elapsed) => {
            info!(?elapsed, "Interpolation run committed");
            println!(
                "✓ Procedure completed in {:.2} seconds",
                elapsed.as_secs_f64()
            );
            Ok(())
        }
        Err(e) => {
            error!("{e}");
            println!("✗ The interpolation procedure failed");
            Err(e.into())
        }
    }
}
