use clap::Parser;
use slog_gcf::config::Config;
use strum::EnumString;

#[derive(Parser, Debug)]
#[clap(
    version,
    about = "A Cloud Function that greets you and ships its logs to Google Cloud Logging",
    author = "The bol.com team"
)]
pub struct Args {
    /// verbosity level
    #[clap(short = 'v', parse(from_occurrences))]
    pub verbose: u64,

    /// Sets the minimum log level, one of error, warn, info, debug or trace. Overrides -v.
    #[clap(long, value_name = "LEVEL", env = "GCF_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Sets the port to listen on for HTTP requests
    #[clap(long, value_name = "PORT", env = "PORT", default_value = "8080")]
    pub port: u16,

    /// The Google Cloud project logs are shipped to
    #[clap(long, value_name = "PROJECT", env = "GCP_PROJECT")]
    pub project: Option<String>,

    /// The name of the function, used as resource label
    #[clap(long, value_name = "NAME", env = "FUNCTION_NAME")]
    pub function_name: Option<String>,

    /// The region the function runs in, used as resource label
    #[clap(long, value_name = "REGION", env = "FUNCTION_REGION")]
    pub region: Option<String>,

    /// Keeps writing logs to the terminal while shipping them to Google Cloud Logging
    #[clap(long)]
    pub local_log: bool,
}

impl Args {
    pub fn logging_config(&self) -> Config {
        Config::new(
            self.project.clone().unwrap_or_default(),
            self.function_name.clone().unwrap_or_default(),
            self.region.clone().unwrap_or_default(),
        )
    }

    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

#[derive(EnumString, Debug, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum LogLevelType {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}
