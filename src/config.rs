use std::{fmt, path::PathBuf};

use clap::{Args, Parser};

pub const DEFAULT_DBNAME: &str = "postgres";
pub const DEFAULT_USER: &str = "postgres";
pub const DEFAULT_PASSWORD: &str = "postgres";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_SCHEMA: &str = "snaart";

pub const DEFAULT_MIN_TEMPERATURE: f64 = -20.0;
pub const DEFAULT_MAX_TEMPERATURE: f64 = 20.0;
pub const DEFAULT_TEMPERATURE_STEP: f64 = 1.0;

pub const DEFAULT_OUTPUT_DIR: &str = "performance_results";
pub const DEFAULT_DPI: u32 = 300;

#[derive(Debug, Parser)]
#[command(
    name = "interp-perf",
    version,
    about = "Run the interpolation sweep in the database and report its performance"
)]
pub struct Cli {
    #[command(flatten)]
    pub database: DatabaseArgs,

    #[command(flatten)]
    pub calculation: CalculationArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Skip the stored procedure and report on the results already in the database
    #[arg(long)]
    pub skip_calculation: bool,

    /// Print server notices and debug logs
    #[arg(long, short)]
    pub verbose: bool,
}

#[derive(Debug, Default, Args)]
#[command(next_help_heading = "Database")]
pub struct DatabaseArgs {
    /// Database name [default: postgres]
    #[arg(long)]
    pub dbname: Option<String>,
    /// User name [default: postgres]
    #[arg(long)]
    pub user: Option<String>,
    /// Password [default: postgres]
    #[arg(long)]
    pub password: Option<String>,
    /// Host [default: localhost]
    #[arg(long)]
    pub host: Option<String>,
    /// Port [default: 5432]
    #[arg(long)]
    pub port: Option<u16>,
    /// Schema holding the procedure and the result tables [default: snaart]
    #[arg(long)]
    pub schema: Option<String>,
}

#[derive(Debug, Default, Args)]
#[command(next_help_heading = "Calculation")]
pub struct CalculationArgs {
    /// Lowest temperature of the sweep, in °C [default: -20]
    #[arg(long, allow_negative_numbers = true)]
    pub min_temp: Option<f64>,
    /// Highest temperature of the sweep, in °C [default: 20]
    #[arg(long, allow_negative_numbers = true)]
    pub max_temp: Option<f64>,
    /// Temperature step, in °C [default: 1.0]
    #[arg(long, allow_negative_numbers = true)]
    pub step: Option<f64>,
    /// Keep the results of previous sweeps instead of clearing them
    #[arg(long)]
    pub keep_previous: bool,
}

#[derive(Debug, Default, Args)]
#[command(next_help_heading = "Output")]
pub struct OutputArgs {
    /// Directory the charts are written to [default: performance_results]
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
    /// Do not render any chart
    #[arg(long)]
    pub no_plots: bool,
    /// Resolution of the rendered charts [default: 300]
    #[arg(long)]
    pub dpi: Option<u32>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub schema: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            dbname: String::from(DEFAULT_DBNAME),
            user: String::from(DEFAULT_USER),
            password: String::from(DEFAULT_PASSWORD),
            host: String::from(DEFAULT_HOST),
            port: DEFAULT_PORT,
            schema: String::from(DEFAULT_SCHEMA),
        }
    }
}

// The password must never end up in a log line.
impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"***")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("schema", &self.schema)
            .finish()
    }
}

impl DbConfig {
    /// libpq keyword/value connection string.
    pub fn conninfo(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={}",
            conninfo_value(&self.host),
            self.port,
            conninfo_value(&self.user),
            conninfo_value(&self.password),
            conninfo_value(&self.dbname),
        )
    }
}

fn conninfo_value(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\\' || c == '\'' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

/// Arguments of one interpolation sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalculationSettings {
    pub min_temperature: f64,
    pub max_temperature: f64,
    pub temperature_step: f64,
    pub clear_previous_results: bool,
}

impl Default for CalculationSettings {
    fn default() -> Self {
        Self {
            min_temperature: DEFAULT_MIN_TEMPERATURE,
            max_temperature: DEFAULT_MAX_TEMPERATURE,
            temperature_step: DEFAULT_TEMPERATURE_STEP,
            clear_previous_results: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSettings {
    pub dir: PathBuf,
    pub dpi: u32,
    pub plots: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            dpi: DEFAULT_DPI,
            plots: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub db: DbConfig,
    pub calculation: CalculationSettings,
    pub output: OutputSettings,
    pub skip_calculation: bool,
    pub verbose: bool,
}

impl Config {
    /// Built-in defaults, replaced by whatever was given on the command
    /// line. Nothing is range checked.
    pub fn resolve(cli: Cli) -> Self {
        let mut config = Self::default();

        let Cli {
            database,
            calculation,
            output,
            skip_calculation,
            verbose,
        } = cli;

        let db = &mut config.db;
        if let Some(dbname) = database.dbname {
            db.dbname = dbname;
        }
        if let Some(user) = database.user {
            db.user = user;
        }
        if let Some(password) = database.password {
            db.password = password;
        }
        if let Some(host) = database.host {
            db.host = host;
        }
        if let Some(port) = database.port {
            db.port = port;
        }
        if let Some(schema) = database.schema {
            db.schema = schema;
        }

        let settings = &mut config.calculation;
        if let Some(min) = calculation.min_temp {
            settings.min_temperature = min;
        }
        if let Some(max) = calculation.max_temp {
            settings.max_temperature = max;
        }
        if let Some(step) = calculation.step {
            settings.temperature_step = step;
        }
        if calculation.keep_previous {
            settings.clear_previous_results = false;
        }

        if let Some(dir) = output.output_dir {
            config.output.dir = dir;
        }
        if let Some(dpi) = output.dpi {
            config.output.dpi = dpi;
        }
        config.output.plots = !output.no_plots;

        config.skip_calculation = skip_calculation;
        config.verbose = verbose;

        config
    }
}
