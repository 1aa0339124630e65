use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use super::Runtime;

/// Executes the function file itself; it must be a native executable or
/// carry a shebang.
pub struct BinaryRuntime;

#[async_trait]
impl Runtime for BinaryRuntime {
    fn runtime_type(&self) -> &'static str {
        "binary"
    }

    fn command(&self, artifact: &Path) -> Command {
        Command::new(artifact)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use fnserve_common::InvocationContext;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::error::InvokeError;

    #[tokio::test]
    async fn test_runs_artifact_directly() {
        let ctx = InvocationContext::new("req-bin", Duration::from_secs(5));
        let out = BinaryRuntime
            .execute(Path::new("/bin/cat"), br#"{"hello":"world"}"#, &ctx, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, br#"{"hello":"world"}"#);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_execution_error() {
        let ctx = InvocationContext::new("req-false", Duration::from_secs(5));
        let err = BinaryRuntime
            .execute(Path::new("/bin/false"), b"{}", &ctx, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            InvokeError::Execution { runtime, code, .. } => {
                assert_eq!(runtime, "binary");
                assert_eq!(code, Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_non_executable_file_fails_to_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "not a program").unwrap();

        let ctx = InvocationContext::new("req-txt", Duration::from_secs(5));
        let err = BinaryRuntime
            .execute(&path, b"{}", &ctx, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::Spawn { .. }));
    }
}
