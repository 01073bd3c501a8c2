use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

use crate::domain::types::{ModelFormat, OperationKind};

/// Command-line arguments for the magforge binary.
#[derive(Debug, Parser)]
#[command(
    name = "magforge",
    version,
    about = "Content-addressed magnetics artifact cache"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "MAGFORGE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Generate one artifact and write it to a file.
    Generate(GenerateArgs),
    /// Print the canonical form and fingerprint of a request.
    Fingerprint(FingerprintArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct CacheOverride {
    /// Override the artifact cache root directory.
    #[arg(long = "cache-root", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub cache_root: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RendererOverrides {
    /// Override the renderer executable.
    #[arg(long = "renderer-cli-path", value_name = "PATH")]
    pub cli_path: Option<PathBuf>,

    /// Override the time limit of a single renderer invocation.
    #[arg(long = "renderer-timeout-seconds", value_name = "SECONDS")]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub cache: CacheOverride,

    #[command(flatten)]
    pub renderer: RendererOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the number of concurrent render workers.
    #[arg(long = "dispatch-worker-concurrency", value_name = "COUNT")]
    pub worker_concurrency: Option<u32>,

    /// Override the number of attempts per generation.
    #[arg(long = "dispatch-max-attempts", value_name = "COUNT")]
    pub max_attempts: Option<u32>,

    /// Override the overall request timeout.
    #[arg(long = "dispatch-request-timeout-seconds", value_name = "SECONDS")]
    pub request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub cache: CacheOverride,

    #[command(flatten)]
    pub renderer: RendererOverrides,

    /// Operation kind, e.g. `core_model` or `field_plot`.
    #[arg(value_name = "KIND")]
    pub kind: OperationKind,

    /// JSON file holding the request payload.
    #[arg(value_name = "REQUEST", value_hint = ValueHint::FilePath)]
    pub request: PathBuf,

    /// Where to write the artifact.
    #[arg(long, short, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub output: PathBuf,

    /// Model format for shape and core models (stl|step).
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<ModelFormat>,
}

#[derive(Debug, Args, Clone)]
pub struct FingerprintArgs {
    #[command(flatten)]
    pub cache: CacheOverride,

    /// Operation kind, e.g. `core_model` or `field_plot`.
    #[arg(value_name = "KIND")]
    pub kind: OperationKind,

    /// JSON file holding the request payload.
    #[arg(value_name = "REQUEST", value_hint = ValueHint::FilePath)]
    pub request: PathBuf,

    /// Model format for shape and core models (stl|step).
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<ModelFormat>,
}
