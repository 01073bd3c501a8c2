//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    net::SocketAddr,
    num::NonZeroU32,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{
    CacheOverride, CliArgs, Command, FingerprintArgs, GenerateArgs, RendererOverrides, ServeArgs,
    ServeOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "magforge";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_CACHE_ROOT: &str = "artifacts";
pub(crate) const DEFAULT_RENDERER_CLI_PATH: &str = "magforge-render";
const DEFAULT_RENDERER_TIMEOUT_SECS: u64 = 120;
const DEFAULT_INVALID_INPUT_EXIT_CODE: i32 = 65;
const DEFAULT_EXISTENCE_MAX_POLLS: u32 = 200;
const DEFAULT_STABILITY_MAX_POLLS: u32 = 1000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 10;
const DEFAULT_WORKER_CONCURRENCY: u32 = 4;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 250;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub renderer: RendererSettings,
    pub watcher: WatcherSettings,
    pub dispatch: DispatchSettings,
    pub schema: SchemaSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub cli_path: PathBuf,
    pub timeout: Duration,
    pub invalid_input_exit_code: i32,
    pub cci_coordinates_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct WatcherSettings {
    pub existence_max_polls: NonZeroU32,
    pub stability_max_polls: NonZeroU32,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub worker_concurrency: NonZeroU32,
    pub max_attempts: NonZeroU32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct SchemaSettings {
    /// Shape family table; the bundled table is used when unset.
    pub path: Option<PathBuf>,
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

    builder = builder.add_source(Environment::with_prefix("MAGFORGE").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Generate(args)) => {
            raw.apply_cache_override(&args.cache);
            raw.apply_renderer_overrides(&args.renderer);
        }
        Some(Command::Fingerprint(args)) => raw.apply_cache_override(&args.cache),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    renderer: RawRendererSettings,
    watcher: RawWatcherSettings,
    dispatch: RawDispatchSettings,
    schema: RawSchemaSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(value) = overrides.worker_concurrency {
            self.dispatch.worker_concurrency = Some(value);
        }
        if let Some(value) = overrides.max_attempts {
            self.dispatch.max_attempts = Some(value);
        }
        if let Some(seconds) = overrides.request_timeout_seconds {
            self.dispatch.request_timeout_seconds = Some(seconds);
        }

        self.apply_cache_override(&overrides.cache);
        self.apply_renderer_overrides(&overrides.renderer);
    }

    fn apply_cache_override(&mut self, overrides: &CacheOverride) {
        if let Some(root) = overrides.cache_root.as_ref() {
            self.cache.root = Some(root.clone());
        }
    }

    fn apply_renderer_overrides(&mut self, overrides: &RendererOverrides) {
        if let Some(path) = overrides.cli_path.as_ref() {
            self.renderer.cli_path = Some(path.clone());
        }
        if let Some(seconds) = overrides.timeout_seconds {
            self.renderer.timeout_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            renderer,
            watcher,
            dispatch,
            schema,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
            renderer: build_renderer_settings(renderer)?,
            watcher: build_watcher_settings(watcher)?,
            dispatch: build_dispatch_settings(dispatch)?,
            schema: SchemaSettings {
                path: non_empty_path(schema.path),
            },
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);

    Ok(ServerSettings {
        addr,
        graceful_shutdown: non_zero_secs(graceful_secs, "server.graceful_shutdown_seconds")?,
    })
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

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let root = cache
        .root
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_ROOT));
    if root.as_os_str().is_empty() {
        return Err(LoadError::invalid("cache.root", "path must not be empty"));
    }
    Ok(CacheSettings { root })
}

fn build_renderer_settings(renderer: RawRendererSettings) -> Result<RendererSettings, LoadError> {
    let cli_path = renderer
        .cli_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RENDERER_CLI_PATH));
    if cli_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "renderer.cli_path",
            "path must not be empty",
        ));
    }

    let timeout = non_zero_secs(
        renderer
            .timeout_seconds
            .unwrap_or(DEFAULT_RENDERER_TIMEOUT_SECS),
        "renderer.timeout_seconds",
    )?;

    let invalid_input_exit_code = renderer
        .invalid_input_exit_code
        .unwrap_or(DEFAULT_INVALID_INPUT_EXIT_CODE);
    if invalid_input_exit_code == 0 {
        return Err(LoadError::invalid(
            "renderer.invalid_input_exit_code",
            "exit code 0 means success",
        ));
    }

    Ok(RendererSettings {
        cli_path,
        timeout,
        invalid_input_exit_code,
        cci_coordinates_path: non_empty_path(renderer.cci_coordinates_path),
    })
}

fn build_watcher_settings(watcher: RawWatcherSettings) -> Result<WatcherSettings, LoadError> {
    let existence = watcher
        .existence_max_polls
        .unwrap_or(DEFAULT_EXISTENCE_MAX_POLLS);
    let stability = watcher
        .stability_max_polls
        .unwrap_or(DEFAULT_STABILITY_MAX_POLLS);
    let interval_ms = watcher
        .poll_interval_ms
        .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
    if interval_ms == 0 {
        return Err(LoadError::invalid(
            "watcher.poll_interval_ms",
            "must be greater than zero",
        ));
    }

    Ok(WatcherSettings {
        existence_max_polls: non_zero_u32(existence.into(), "watcher.existence_max_polls")?,
        stability_max_polls: non_zero_u32(stability.into(), "watcher.stability_max_polls")?,
        poll_interval: Duration::from_millis(interval_ms),
    })
}

fn build_dispatch_settings(dispatch: RawDispatchSettings) -> Result<DispatchSettings, LoadError> {
    let worker_concurrency = dispatch
        .worker_concurrency
        .unwrap_or(DEFAULT_WORKER_CONCURRENCY);
    let max_attempts = dispatch.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
    let retry_delay_ms = dispatch.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS);
    let request_timeout_secs = dispatch
        .request_timeout_seconds
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

    Ok(DispatchSettings {
        worker_concurrency: non_zero_u32(worker_concurrency.into(), "dispatch.worker_concurrency")?,
        max_attempts: non_zero_u32(max_attempts.into(), "dispatch.max_attempts")?,
        retry_delay: Duration::from_millis(retry_delay_ms),
        request_timeout: non_zero_secs(request_timeout_secs, "dispatch.request_timeout_seconds")?,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    root: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRendererSettings {
    cli_path: Option<PathBuf>,
    timeout_seconds: Option<u64>,
    invalid_input_exit_code: Option<i32>,
    cci_coordinates_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWatcherSettings {
    existence_max_polls: Option<u32>,
    stability_max_polls: Option<u32>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDispatchSettings {
    worker_concurrency: Option<u32>,
    max_attempts: Option<u32>,
    retry_delay_ms: Option<u64>,
    request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSchemaSettings {
    path: Option<PathBuf>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_empty_path(path: Option<PathBuf>) -> Option<PathBuf> {
    path.filter(|path| !path.as_os_str().is_empty())
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
