use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the environment entry carrying the serialized context.
pub const CONTEXT_ENV_VAR: &str = "FN_CONTEXT";

/// Inbound headers whose values are forwarded to the function's environment.
pub const FORWARDED_HEADERS: [&str; 3] = ["X-API-Key", "Authorization", "X-Forwarded-For"];

/// Per-invocation context handed to a function through `FN_CONTEXT`.
///
/// Built once per request and never mutated after it is handed to a runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvocationContext {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    /// Zero means the execution runs without a deadline.
    #[serde(with = "duration_nanos")]
    pub deadline: Duration,
    pub parameters: HashMap<String, String>,
    pub env: HashMap<String, String>,
    pub tracing: TraceInfo,
}

impl InvocationContext {
    pub fn new(request_id: impl Into<String>, deadline: Duration) -> Self {
        Self {
            request_id: request_id.into(),
            timestamp: Utc::now(),
            deadline,
            parameters: HashMap::new(),
            env: HashMap::new(),
            tracing: TraceInfo::generate(),
        }
    }

    pub fn with_parameters(mut self, parameters: HashMap<String, String>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_tracing(mut self, tracing: TraceInfo) -> Self {
        self.tracing = tracing;
        self
    }

    pub fn has_deadline(&self) -> bool {
        !self.deadline.is_zero()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Trace linkage between the caller and this invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TraceInfo {
    pub trace_id: String,
    pub span_id: String,
    #[serde(default)]
    pub parent_id: String,
}

impl TraceInfo {
    /// Fresh trace with no parent.
    pub fn generate() -> Self {
        Self {
            trace_id: new_id(),
            span_id: new_id(),
            parent_id: String::new(),
        }
    }

    /// Continue the caller's trace when it supplied one.
    ///
    /// Blank values count as absent, so a malformed header never fails the
    /// request. The span id is always fresh.
    pub fn inherit(trace_id: Option<&str>, parent_id: Option<&str>) -> Self {
        let trace_id = non_blank(trace_id).unwrap_or_else(new_id);
        let parent_id = non_blank(parent_id).unwrap_or_default();
        Self {
            trace_id,
            span_id: new_id(),
            parent_id,
        }
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Durations on the wire are integer nanoseconds.
mod duration_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        let nanos = u64::try_from(d.as_nanos()).unwrap_or(u64::MAX);
        s.serialize_u64(nanos)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let nanos = i64::deserialize(d)?;
        Ok(Duration::from_nanos(nanos.max(0) as u64))
    }
}
