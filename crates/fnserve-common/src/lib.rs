pub mod context;
pub mod telemetry;

pub use context::{InvocationContext, TraceInfo, CONTEXT_ENV_VAR, FORWARDED_HEADERS};
pub use telemetry::LogFormat;
