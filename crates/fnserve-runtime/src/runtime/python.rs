use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use super::{Runtime, RuntimeConfig};

/// Runs a script through a fixed interpreter: `<python_bin> <artifact>`.
pub struct PythonRuntime {
    pub interpreter: PathBuf,
}

impl PythonRuntime {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            interpreter: config.python_bin.clone(),
        }
    }
}

#[async_trait]
impl Runtime for PythonRuntime {
    fn runtime_type(&self) -> &'static str {
        "python"
    }

    fn command(&self, artifact: &Path) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(artifact);
        cmd
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use fnserve_common::InvocationContext;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::error::InvokeError;

    fn python3_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn test_interpreter_receives_artifact_path() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "ctx.py", "printf '%s' \"$FN_CONTEXT\"\n");
        let rt = PythonRuntime {
            interpreter: PathBuf::from("/bin/sh"),
        };
        let ctx = InvocationContext::new("req-py", Duration::from_secs(5));

        let out = rt
            .execute(&script, b"{}", &ctx, &CancellationToken::new())
            .await
            .unwrap();
        let back: InvocationContext = serde_json::from_slice(&out).unwrap();
        assert_eq!(back.request_id, "req-py");
        assert_eq!(back.deadline, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_echo_py() {
        if !python3_available() {
            eprintln!("python3 not found, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "echo.py",
            "import json, sys\nevent = json.load(sys.stdin)\nsys.stdout.write(json.dumps({\"echo\": event}))\n",
        );
        let rt = PythonRuntime::new(&RuntimeConfig::default());
        let ctx = InvocationContext::new("req-echo", Duration::ZERO);

        let out = rt
            .execute(&script, br#"{"x":1}"#, &ctx, &CancellationToken::new())
            .await
            .unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v, serde_json::json!({"echo": {"x": 1}}));
    }

    #[tokio::test]
    async fn test_sleep_py_deadline() {
        if !python3_available() {
            eprintln!("python3 not found, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "sleep.py", "import time\ntime.sleep(5)\nprint('{}')\n");
        let rt = PythonRuntime::new(&RuntimeConfig::default());
        let ctx = InvocationContext::new("req-sleep", Duration::from_secs(1));

        let start = Instant::now();
        let err = rt
            .execute(&script, b"{}", &ctx, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::DeadlineExceeded(d) if d == Duration::from_secs(1)));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_missing_interpreter() {
        let rt = PythonRuntime {
            interpreter: PathBuf::from("/no/such/python"),
        };
        let ctx = InvocationContext::new("req-missing", Duration::from_secs(1));
        let err = rt
            .execute(Path::new("x.py"), b"{}", &ctx, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::Spawn { .. }));
    }
}
