use clap::{Parser, ValueEnum};

use crate::error::ReportError;
use crate::quota::DEFAULT_EXCLUDED_SERVICES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "UPPER")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    version,
    about = "CARTO reporting tool: export account database metrics as an HTML report",
    long_about = None,
    after_help = "Examples:
  # Credentials from the environment, report to ./report.html:
  db_metrics

  # Organization user with a larger quota, verbose:
  db_metrics -U alice -o acme -u https://acme.carto.com/user/alice/ -q 10000 -l INFO

  # Print the report to stdout:
  db_metrics --output -

  # Upload to S3:
  db_metrics --output s3://reports/alice/report.html"
)]
pub struct Config {
    /// Account user name
    #[arg(short = 'U', long = "user-name", env = "CARTO_USER")]
    pub user: Option<String>,

    /// API key of the account
    #[arg(short = 'a', long = "api-key", env = "CARTO_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the account, for example https://username.carto.com/
    #[arg(short = 'u', long = "api-url", env = "CARTO_API_URL")]
    pub api_url: Option<String>,

    /// Name of the organization the account belongs to
    #[arg(short = 'o', long = "organization", env = "CARTO_ORG")]
    pub organization: Option<String>,

    /// Report destination: a file path, `-` for stdout or s3://bucket/key
    #[arg(long, env = "REPORT_OUTPUT", default_value = "report.html")]
    pub output: String,

    /// LDS quota for the user, in MB; storage capacity is twice this value
    #[arg(short = 'q', long, env = "CARTO_QUOTA", default_value_t = 5000)]
    pub quota: u64,

    /// How verbose the output should be
    #[arg(short = 'l', long = "loglevel", env = "LOG_LEVEL", value_enum, default_value_t = LogLevel::Error)]
    pub log_level: LogLevel,

    /// Log line format: text or json
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Location data services left out of the quota table
    #[arg(long = "excluded-service", default_values_t = DEFAULT_EXCLUDED_SERVICES.map(String::from))]
    pub excluded_services: Vec<String>,
}

/// Validated connection settings for the CARTO APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub api_key: String,
    pub api_url: String,
    pub organization: Option<String>,
}

fn required(value: &Option<String>, name: &'static str) -> Result<String, ReportError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ReportError::MissingCredentials(name))
}

impl Config {
    pub fn credentials(&self) -> Result<Credentials, ReportError> {
        Ok(Credentials {
            user: required(&self.user, "CARTO_USER")?,
            api_url: required(&self.api_url, "CARTO_API_URL")?,
            api_key: required(&self.api_key, "CARTO_API_KEY")?,
            organization: self.organization.clone().filter(|o| !o.trim().is_empty()),
        })
    }
}
