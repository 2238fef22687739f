//! Runs against a live server:
//!
//! ```sh
//! PGPASSWORD=secret cargo test --test postgres -- --ignored
//! ```

use std::env;

use interp_perf::{CalculationSettings, DbConfig, DbError, PerformanceStore, PgStore};
use postgres::{Client, NoTls};

const SCHEMA: &str = "interp_perf_test";

const SETUP: &str = r#"
DROP SCHEMA IF EXISTS interp_perf_test CASCADE;
CREATE SCHEMA interp_perf_test;

CREATE TABLE interp_perf_test.interpolation_results (
    height numeric NOT NULL,
    temperature numeric NOT NULL,
    calculation_time numeric NOT NULL,
    result_value numeric
);

CREATE TABLE interp_perf_test.interpolation_performance (
    id serial PRIMARY KEY,
    total_time_ms numeric NOT NULL,
    total_calculations integer NOT NULL,
    successful_calculations integer NOT NULL,
    avg_calculation_time_ms numeric NOT NULL,
    min_calculation_time_ms numeric NOT NULL,
    max_calculation_time_ms numeric NOT NULL,
    parameters jsonb,
    created_at timestamp NOT NULL DEFAULT now()
);

CREATE PROCEDURE interp_perf_test.calculate_all_interpolations(
    min_temp numeric,
    max_temp numeric,
    step numeric,
    clear boolean
)
LANGUAGE plpgsql AS $$
DECLARE
    t numeric;
    h integer;
BEGIN
    IF clear THEN
        DELETE FROM interp_perf_test.interpolation_results;
    END IF;

    IF step <= 0 THEN
        INSERT INTO interp_perf_test.interpolation_results VALUES (0, min_temp, 0.01, NULL);
        RAISE EXCEPTION 'temperature step must be positive';
    END IF;

    t := min_temp;
    WHILE t <= max_temp LOOP
        FOREACH h IN ARRAY ARRAY[0, 200, 400] LOOP
            INSERT INTO interp_perf_test.interpolation_results
            VALUES (h, t, 0.01 + h / 20000.0, CASE WHEN t > 15 THEN NULL ELSE t / 10 END);
        END LOOP;
        t := t + step;
    END LOOP;

    RAISE NOTICE 'sweep done';

    INSERT INTO interp_perf_test.interpolation_performance (
        total_time_ms,
        total_calculations,
        successful_calculations,
        avg_calculation_time_ms,
        min_calculation_time_ms,
        max_calculation_time_ms,
        parameters
    )
    SELECT 12.5, COUNT(*), COUNT(result_value), AVG(calculation_time),
        MIN(calculation_time), MAX(calculation_time),
        jsonb_build_object(
            'min_temperature', min_temp,
            'max_temperature', max_temp,
            'temperature_step', step,
            'heights_count', 3,
            'clear_previous_results', clear
        )
    FROM interp_perf_test.interpolation_results;
END
$$;
"#;

fn db_config() -> DbConfig {
    let mut db = DbConfig {
        schema: String::from(SCHEMA),
        ..DbConfig::default()
    };
    for (var, field) in [
        ("PGHOST", &mut db.host),
        ("PGUSER", &mut db.user),
        ("PGPASSWORD", &mut db.password),
        ("PGDATABASE", &mut db.dbname),
    ] {
        if let Ok(value) = env::var(var) {
            *field = value;
        }
    }
    if let Some(port) = env::var("PGPORT").ok().and_then(|p| p.parse().ok()) {
        db.port = port;
    }
    db
}

#[test]
#[ignore = "needs a PostgreSQL server"]
fn sweep_against_a_live_server() {
    let db = db_config();
    let mut admin = Client::connect(&db.conninfo(), NoTls).unwrap();
    admin.batch_execute(SETUP).unwrap();

    let mut store = PgStore::connect(&db).unwrap();
    assert_eq!(store.fetch_metrics().unwrap(), None);

    // The procedure inserts rows before raising: they must not survive.
    let broken = CalculationSettings {
        min_temperature: 0.0,
        max_temperature: 0.0,
        temperature_step: 0.0,
        clear_previous_results: true,
    };
    let err = store.run_interpolations(&broken).unwrap_err();
    assert!(matches!(err, DbError::Procedure(_)));
    assert!(!store.is_closed());
    assert_eq!(store.fetch_metrics().unwrap(), None);

    let settings = CalculationSettings {
        min_temperature: -20.0,
        max_temperature: 20.0,
        temperature_step: 5.0,
        clear_previous_results: true,
    };
    store.run_interpolations(&settings).unwrap();
    assert!(store
        .take_notices()
        .iter()
        .any(|notice| notice == "sweep done"));

    let metrics = store.fetch_metrics().unwrap().unwrap();
    let summary = &metrics.summary;
    assert_eq!(summary.total_calculations, 27);
    assert_eq!(summary.successful_calculations, 24);

    let params = summary.run_parameters();
    assert_eq!(params.min_temperature, Some(-20.0));
    assert_eq!(params.max_temperature, Some(20.0));
    assert_eq!(params.heights_count, Some(3));
    assert_eq!(params.clear_previous_results, Some(true));

    let heights: Vec<f64> = metrics.heights.iter().map(|s| s.height).collect();
    assert_eq!(heights, [0.0, 200.0, 400.0]);
    assert!(metrics.heights.iter().all(|s| s.timings.count == 9));
    assert!(metrics.heights.iter().all(|s| s.timings.error_count == 1));

    let buckets: Vec<f64> = metrics.temperatures.iter().map(|s| s.temp_range).collect();
    assert_eq!(buckets, [-20.0, -10.0, 0.0, 10.0, 20.0]);
    assert_eq!(metrics.heatmap.len(), 27);

    drop(store);
    admin
        .batch_execute("DROP SCHEMA interp_perf_test CASCADE")
        .unwrap();
}
