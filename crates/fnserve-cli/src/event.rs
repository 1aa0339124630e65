use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt};

use fnserve_runtime::InvokeError;

const EMPTY_EVENT: &[u8] = b"{}";

/// Resolve the event for a one-shot run.
///
/// `--event` naming an existing file reads that file, otherwise the flag value
/// is the event itself. Without the flag, piped stdin is read to the end; an
/// interactive stdin yields `{}`.
pub async fn resolve_event<R: AsyncRead + Unpin>(
    flag: Option<&str>,
    mut stdin: R,
    stdin_is_terminal: bool,
) -> Result<Vec<u8>, InvokeError> {
    if let Some(value) = flag.filter(|v| !v.is_empty()) {
        if tokio::fs::metadata(Path::new(value)).await.is_ok() {
            return tokio::fs::read(value).await.map_err(|e| {
                InvokeError::InvalidInput(format!("failed to read event file: {e}"))
            });
        }
        return Ok(value.as_bytes().to_vec());
    }

    if stdin_is_terminal {
        return Ok(EMPTY_EVENT.to_vec());
    }

    let mut buf = Vec::new();
    stdin
        .read_to_end(&mut buf)
        .await
        .map_err(|e| InvokeError::InvalidInput(format!("failed to read from stdin: {e}")))?;
    Ok(buf)
}
