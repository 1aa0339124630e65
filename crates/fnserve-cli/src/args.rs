use std::path::PathBuf;

use clap::{Parser, Subcommand};

use fnserve_common::LogFormat;

#[derive(Debug, Parser)]
#[command(name = "fnserve", author, version)]
#[command(about = "fnserve - Lambda without the cloud")]
#[command(long_about = "fnserve is a lightweight, self-hosted function runner inspired by AWS Lambda.")]
pub struct Args {
    /// Interpreter used for `.py` functions.
    #[arg(long, global = true, env = "FNSERVE_PYTHON_BIN", default_value = "python3")]
    pub python_bin: PathBuf,

    /// Log output format: text or json.
    #[arg(long, global = true, env = "FNSERVE_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,

    /// OTLP endpoint for exporting traces (e.g. "http://127.0.0.1:4318").
    #[arg(long, global = true, env = "OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Bearer token for the OTLP endpoint.
    #[arg(long, global = true, env = "OTLP_TOKEN")]
    pub otlp_token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a function once with an event
    Run {
        /// Path to the function file
        function: PathBuf,

        /// Event JSON, or a path to a file containing it. Defaults to piped stdin, then `{}`.
        #[arg(long)]
        event: Option<String>,

        /// Deadline in seconds; 0 disables it.
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
    /// Serve a directory of functions as HTTP endpoints
    Serve(ServeArgs),
    /// Run in development mode with hot-reload
    Dev {
        #[command(flatten)]
        serve: ServeArgs,

        /// How often the directory is checked for changes.
        #[arg(long, env = "FNSERVE_POLL_INTERVAL_MS", default_value_t = 500)]
        poll_interval_ms: u64,
    },
}

#[derive(Debug, clap::Args)]
pub struct ServeArgs {
    /// Directory containing function files
    pub dir: PathBuf,

    #[arg(long, env = "FNSERVE_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// Maximum concurrent function executions; excess requests get 429.
    #[arg(
        long,
        env = "FNSERVE_CONCURRENCY",
        default_value_t = 100,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub concurrency: u64,

    /// Per-invocation deadline in seconds.
    #[arg(
        long,
        env = "FNSERVE_TIMEOUT_SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout_secs: u64,

    /// Largest accepted request body.
    #[arg(long, env = "FNSERVE_MAX_BODY_BYTES", default_value_t = 6 * 1024 * 1024)]
    pub max_body_bytes: usize,
}
