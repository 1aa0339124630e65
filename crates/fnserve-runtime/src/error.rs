use std::path::PathBuf;
use std::time::Duration;

/// Terminal failure of a single invocation. Nothing here is retried.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("too many requests")]
    AdmissionDenied,

    #[error("failed to marshal context: {0}")]
    ContextSerialization(#[from] serde_json::Error),

    #[error("failed to start function {}: {source}", .path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{runtime} error: {}", exit_detail(*.code, .output))]
    Execution {
        runtime: &'static str,
        code: Option<i32>,
        output: String,
    },

    #[error("function execution timed out after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("context canceled")]
    Canceled,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed while supervising function: {0}")]
    Io(#[from] std::io::Error),
}

impl InvokeError {
    /// Short, stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            InvokeError::AdmissionDenied => "admission_denied",
            InvokeError::ContextSerialization(_) => "context_serialization",
            InvokeError::Spawn { .. } => "spawn",
            InvokeError::Execution { .. } => "execution",
            InvokeError::DeadlineExceeded(_) => "deadline_exceeded",
            InvokeError::Canceled => "canceled",
            InvokeError::InvalidInput(_) => "invalid_input",
            InvokeError::Io(_) => "io",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            InvokeError::AdmissionDenied => 429,
            InvokeError::InvalidInput(_) => 400,
            _ => 500,
        }
    }
}

fn exit_detail(code: Option<i32>, output: &str) -> String {
    if !output.trim().is_empty() {
        return output.to_string();
    }
    match code {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}
