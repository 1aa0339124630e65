pub mod binary;
pub mod python;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use fnserve_common::InvocationContext;

use crate::error::InvokeError;
use crate::supervisor;

/// Runtime settings shared by every function (engine-agnostic).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Interpreter used for `.py` functions.
    pub python_bin: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            python_bin: PathBuf::from("python3"),
        }
    }
}

const PYTHON_SUFFIX: &str = ".py";

/// The closed set of supported function runtimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeKind {
    Python,
    Binary,
}

impl RuntimeKind {
    /// A path ending in `.py` selects the interpreter; every other path is
    /// executed directly. The suffix is matched on the whole path string, so
    /// `fns/.py` is a script while a bare `.py` is not.
    pub fn for_path(path: &Path) -> Self {
        let path = path.to_string_lossy();
        if path.len() > PYTHON_SUFFIX.len() && path.ends_with(PYTHON_SUFFIX) {
            RuntimeKind::Python
        } else {
            RuntimeKind::Binary
        }
    }

    /// True when `path` has an extension no runtime claims, i.e. it only runs
    /// because of the binary fallback.
    pub fn is_fallback(path: &Path) -> bool {
        Self::for_path(path) == RuntimeKind::Binary && path.extension().is_some()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeKind::Python => "python",
            RuntimeKind::Binary => "binary",
        }
    }
}

#[async_trait]
pub trait Runtime: Send + Sync {
    /// Runtime type identifier, e.g. "python", "binary".
    fn runtime_type(&self) -> &'static str;

    /// Build the command that launches `artifact`, without stdio or context.
    fn command(&self, artifact: &Path) -> Command;

    /// Run `artifact` once with `event` on stdin under the supervisor.
    async fn execute(
        &self,
        artifact: &Path,
        event: &[u8],
        ctx: &InvocationContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, InvokeError> {
        let mut cmd = self.command(artifact);
        supervisor::prepare(&mut cmd, ctx)?;
        supervisor::supervise(
            cmd,
            self.runtime_type(),
            artifact,
            event,
            ctx.deadline,
            cancel,
        )
        .await
    }
}

/// Create the runtime implementation for a kind.
pub fn create_runtime(kind: RuntimeKind, config: &RuntimeConfig) -> Box<dyn Runtime> {
    match kind {
        RuntimeKind::Python => Box::new(python::PythonRuntime::new(config)),
        RuntimeKind::Binary => Box::new(binary::BinaryRuntime),
    }
}

/// Select and create the runtime for a function file.
/// Unrecognized extensions fall back to the binary runtime.
pub fn runtime_for_path(path: &Path, config: &RuntimeConfig) -> Box<dyn Runtime> {
    create_runtime(RuntimeKind::for_path(path), config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_policy() {
        assert_eq!(RuntimeKind::for_path(Path::new("fns/echo.py")), RuntimeKind::Python);
        assert_eq!(RuntimeKind::for_path(Path::new("fns/hello")), RuntimeKind::Binary);
        assert_eq!(RuntimeKind::for_path(Path::new("fns/hello.go")), RuntimeKind::Binary);
        assert_eq!(RuntimeKind::for_path(Path::new("fns/data.txt")), RuntimeKind::Binary);
        assert_eq!(RuntimeKind::for_path(Path::new("fns/.py")), RuntimeKind::Python);
        assert_eq!(RuntimeKind::for_path(Path::new(".py")), RuntimeKind::Binary);
        assert_eq!(RuntimeKind::for_path(Path::new("fns/echo.pyc")), RuntimeKind::Binary);
    }

    #[test]
    fn test_fallback_detection() {
        assert!(RuntimeKind::is_fallback(Path::new("hello.sh")));
        assert!(!RuntimeKind::is_fallback(Path::new("hello.py")));
        assert!(!RuntimeKind::is_fallback(Path::new("hello")));
        assert!(!RuntimeKind::is_fallback(Path::new("fns/.py")));
    }

    #[test]
    fn test_create_runtime() {
        let cfg = RuntimeConfig::default();
        assert_eq!(runtime_for_path(Path::new("a.py"), &cfg).runtime_type(), "python");
        assert_eq!(runtime_for_path(Path::new("a"), &cfg).runtime_type(), "binary");
    }
}
