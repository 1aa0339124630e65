use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use fnserve_runtime::RuntimeConfig;

use crate::admission::Admission;
use crate::metrics::Metrics;
use crate::registry::FunctionRegistry;
use crate::stats::Stats;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_concurrent_requests: usize,
    /// Deadline applied to every HTTP invocation.
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
    pub runtime: RuntimeConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 100,
            request_timeout: Duration::from_secs(30),
            max_body_bytes: 6 * 1024 * 1024,
            runtime: RuntimeConfig::default(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<FunctionRegistry>,
    pub admission: Admission,
    pub stats: Arc<Stats>,
    pub metrics: Arc<Metrics>,
    /// Cancelled when the server stops; every invocation token derives from it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: ServerConfig, registry: FunctionRegistry, shutdown: CancellationToken) -> Self {
        let admission = Admission::new(config.max_concurrent_requests);
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            admission,
            stats: Arc::new(Stats::new()),
            metrics: Arc::new(Metrics::default()),
            shutdown,
        }
    }
}
