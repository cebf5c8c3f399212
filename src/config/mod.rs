//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::NonZeroUsize,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, ValueEnum, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use time::{Date, Time};
use tracing::level_filters::LevelFilter;

use crate::domain::calendar::{parse_date, parse_time};
use crate::domain::types::AppointmentStatus;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "agenda";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_INVALIDATION_LOG_LIMIT: usize = 256;

/// Command-line arguments for the agenda binary.
#[derive(Debug, Parser)]
#[command(
    name = "agenda",
    version,
    about = "Manage clients and appointments against the agenda backend"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "AGENDA_CONFIG_FILE", value_name = "PATH", global = true)]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the record store backend.
    #[arg(long = "backend", value_name = "KIND", value_enum, global = true)]
    pub backend: Option<BackendKind>,

    /// Override the backend project URL.
    #[arg(long = "backend-url", value_name = "URL", global = true)]
    pub backend_url: Option<String>,

    /// Override the backend API key.
    #[arg(long = "api-key", env = "AGENDA_API_KEY", value_name = "KEY", global = true)]
    pub api_key: Option<String>,

    /// Override the backend request timeout.
    #[arg(long = "backend-timeout-seconds", value_name = "SECONDS", global = true)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// List and edit clients.
    Clients(ClientsArgs),
    /// List and edit appointments.
    Appointments(AppointmentsArgs),
    /// Show dashboard counts and upcoming pending appointments.
    Dashboard(DashboardArgs),
}

#[derive(Debug, Args, Clone)]
pub struct ClientsArgs {
    #[command(subcommand)]
    pub command: ClientsCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum ClientsCommand {
    /// List clients, newest first.
    List,
    /// Register a new client.
    Add(ClientFieldsArgs),
    /// Replace the editable fields of a client.
    Update {
        #[arg(value_name = "ID")]
        id: String,
        #[command(flatten)]
        fields: ClientFieldsArgs,
    },
    /// Delete a client.
    Delete {
        #[arg(value_name = "ID")]
        id: String,
    },
}

#[derive(Debug, Args, Clone)]
pub struct ClientFieldsArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub email: String,
    #[arg(long)]
    pub phone: String,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct AppointmentsArgs {
    #[command(subcommand)]
    pub command: AppointmentsCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum AppointmentsCommand {
    /// List appointments in chronological order.
    List,
    /// Book an appointment for an existing client.
    Add {
        /// Calendar date, `YYYY-MM-DD`.
        #[arg(long, value_parser = parse_date_arg)]
        date: Date,
        /// Time of day, `HH:MM`.
        #[arg(long, value_parser = parse_time_arg)]
        time: Time,
        #[arg(long = "client-id", value_name = "ID")]
        client_id: String,
        #[arg(long, value_parser = parse_status_arg, default_value = "pendiente")]
        status: AppointmentStatus,
    },
    /// Change the status of an appointment.
    Status {
        #[arg(value_name = "ID")]
        id: String,
        #[arg(value_name = "STATUS", value_parser = parse_status_arg)]
        status: AppointmentStatus,
    },
    /// Delete an appointment.
    Delete {
        #[arg(value_name = "ID")]
        id: String,
    },
}

#[derive(Debug, Args, Clone)]
pub struct DashboardArgs {
    /// Reference date for upcoming appointments; defaults to today (UTC).
    #[arg(long, value_parser = parse_date_arg)]
    pub today: Option<Date>,
}

fn parse_date_arg(value: &str) -> Result<Date, String> {
    parse_date(value).map_err(|err| err.to_string())
}

fn parse_time_arg(value: &str) -> Result<Time, String> {
    parse_time(value).map_err(|err| err.to_string())
}

fn parse_status_arg(value: &str) -> Result<AppointmentStatus, String> {
    AppointmentStatus::from_str(value).map_err(|err| err.to_string())
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub backend: BackendSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Process-local tables; contents vanish on exit.
    Memory,
    /// Hosted PostgREST endpoint.
    Rest,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "rest" => Ok(Self::Rest),
            other => Err(format!("unknown backend kind `{other}` (expected memory|rest)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub kind: BackendKind,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub refetch_on_invalidate: bool,
    pub stale_after: Option<Duration>,
    pub invalidation_log_limit: NonZeroUsize,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("AGENDA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    backend: RawBackendSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(kind) = overrides.backend {
            let kind = match kind {
                BackendKind::Memory => "memory",
                BackendKind::Rest => "rest",
            };
            self.backend.kind = Some(kind.to_string());
        }
        if let Some(url) = overrides.backend_url.as_ref() {
            self.backend.url = Some(url.clone());
        }
        if let Some(key) = overrides.api_key.as_ref() {
            self.backend.api_key = Some(key.clone());
        }
        if let Some(seconds) = overrides.timeout_seconds {
            self.backend.timeout_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            backend,
            cache,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            backend: build_backend_settings(backend)?,
            cache: build_cache_settings(cache)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_backend_settings(backend: RawBackendSettings) -> Result<BackendSettings, LoadError> {
    let kind = match backend.kind {
        Some(kind) => <BackendKind as FromStr>::from_str(&kind)
            .map_err(|reason| LoadError::invalid("backend.kind", reason))?,
        None => BackendKind::Memory,
    };

    let url = non_blank(backend.url);
    let api_key = non_blank(backend.api_key);
    if kind == BackendKind::Rest {
        if url.is_none() {
            return Err(LoadError::invalid(
                "backend.url",
                "required when backend.kind is `rest`",
            ));
        }
        if api_key.is_none() {
            return Err(LoadError::invalid(
                "backend.api_key",
                "required when backend.kind is `rest`",
            ));
        }
    }

    let timeout_secs = backend.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "backend.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(BackendSettings {
        kind,
        url,
        api_key,
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let stale_after = match cache.stale_after_ms {
        Some(0) => {
            return Err(LoadError::invalid(
                "cache.stale_after_ms",
                "must be greater than zero when set",
            ));
        }
        Some(ms) => Some(Duration::from_millis(ms)),
        None => None,
    };

    let limit = cache
        .invalidation_log_limit
        .unwrap_or(DEFAULT_INVALIDATION_LOG_LIMIT);
    let invalidation_log_limit = NonZeroUsize::new(limit).ok_or_else(|| {
        LoadError::invalid("cache.invalidation_log_limit", "must be greater than zero")
    })?;

    Ok(CacheSettings {
        refetch_on_invalidate: cache.refetch_on_invalidate.unwrap_or(true),
        stale_after,
        invalidation_log_limit,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBackendSettings {
    kind: Option<String>,
    url: Option<String>,
    api_key: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    refetch_on_invalidate: Option<bool>,
    stale_after_ms: Option<u64>,
    invalidation_log_limit: Option<usize>,
}
