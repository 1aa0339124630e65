mod args;
mod event;

use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use fnserve_common::context::new_id;
use fnserve_common::InvocationContext;
use fnserve_runtime::{runtime_for_path, RuntimeConfig, RuntimeKind};
use fnserve_server::{DevServer, Server, ServerConfig};

use crate::args::{Args, Command, ServeArgs};
use crate::event::resolve_event;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let otel_guard = fnserve_common::telemetry::init_tracing(
        "fnserve",
        args.otlp_endpoint.as_deref(),
        args.otlp_token.as_deref(),
        args.log_format,
    );

    let runtime = RuntimeConfig {
        python_bin: args.python_bin.clone(),
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let result = match args.command {
        Command::Run {
            function,
            event,
            timeout_secs,
        } => {
            run_once(
                &function,
                event.as_deref(),
                Duration::from_secs(timeout_secs),
                &runtime,
                &shutdown,
            )
            .await
        }
        Command::Serve(serve) => serve_dir(&serve, runtime, shutdown).await,
        Command::Dev {
            serve,
            poll_interval_ms,
        } => {
            let dev = DevServer {
                dir: serve.dir.clone(),
                listen_addr: serve.listen_addr.clone(),
                config: server_config(&serve, runtime),
                poll_interval: Duration::from_millis(poll_interval_ms),
            };
            dev.run(shutdown).await
        }
    };

    if let Some(provider) = otel_guard {
        if let Err(e) = provider.shutdown() {
            eprintln!("failed to flush traces: {e}");
        }
    }

    result
}

/// Startup failures are returned rather than propagated so the caller still
/// flushes traces.
async fn serve_dir(
    serve: &ServeArgs,
    runtime: RuntimeConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let server = Server::new(&serve.dir, server_config(serve, runtime), shutdown).await?;
    let listener = tokio::net::TcpListener::bind(&serve.listen_addr).await?;
    server.serve(listener).await
}

fn server_config(serve: &ServeArgs, runtime: RuntimeConfig) -> ServerConfig {
    ServerConfig {
        max_concurrent_requests: serve.concurrency as usize,
        request_timeout: Duration::from_secs(serve.timeout_secs),
        max_body_bytes: serve.max_body_bytes,
        runtime,
    }
}

async fn run_once(
    function: &Path,
    event: Option<&str>,
    deadline: Duration,
    runtime: &RuntimeConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    let event = resolve_event(event, tokio::io::stdin(), std::io::stdin().is_terminal()).await?;

    if RuntimeKind::is_fallback(function) {
        tracing::warn!(function=%function.display(), "unrecognized extension, running as binary");
    }
    let rt = runtime_for_path(function, runtime);
    let ctx = InvocationContext::new(format!("req-{}", new_id()), deadline);
    tracing::debug!(request_id=%ctx.request_id, runtime=rt.runtime_type(), "running function once");

    let output = rt.execute(function, &event, &ctx, cancel).await?;

    let mut stdout = tokio::io::stdout();
    stdout.write_all(&output).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

/// Cancel `token` on Ctrl-C or SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error=%e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error=%e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
    token.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serve_args(dir: &Path, listen_addr: &str) -> ServeArgs {
        ServeArgs {
            dir: dir.to_path_buf(),
            listen_addr: listen_addr.to_string(),
            concurrency: 4,
            timeout_secs: 1,
            max_body_bytes: 1024,
        }
    }

    #[tokio::test]
    async fn test_serve_missing_dir_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let args = serve_args(&dir.path().join("missing"), "127.0.0.1:0");
        let result = serve_dir(&args, RuntimeConfig::default(), CancellationToken::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_serve_bind_failure_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let args = serve_args(dir.path(), &addr);
        let result = serve_dir(&args, RuntimeConfig::default(), CancellationToken::new()).await;
        assert!(result.is_err());
    }
}
