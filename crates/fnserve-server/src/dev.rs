//! Development mode: serve a directory and restart the server whenever its
//! contents change. Nothing survives a restart; statistics start from zero.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::server::Server;
use crate::state::ServerConfig;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStamp {
    pub modified: Option<SystemTime>,
    pub len: u64,
}

pub type DirSnapshot = BTreeMap<PathBuf, FileStamp>;

/// Record modification time and size of every non-directory entry in `dir`.
pub async fn dir_snapshot(dir: &Path) -> std::io::Result<DirSnapshot> {
    let mut out = BTreeMap::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let meta = match entry.metadata().await {
            Ok(m) => m,
            // Removed between listing and stat.
            Err(_) => continue,
        };
        if meta.is_dir() {
            continue;
        }
        out.insert(
            entry.path(),
            FileStamp {
                modified: meta.modified().ok(),
                len: meta.len(),
            },
        );
    }
    Ok(out)
}

/// Paths added, removed or modified between two snapshots.
pub fn changed_paths(old: &DirSnapshot, new: &DirSnapshot) -> Vec<PathBuf> {
    let mut changed: Vec<PathBuf> = new
        .iter()
        .filter(|(path, stamp)| old.get(*path) != Some(*stamp))
        .map(|(path, _)| path.clone())
        .collect();
    changed.extend(
        old.keys()
            .filter(|path| !new.contains_key(*path))
            .cloned(),
    );
    changed.sort();
    changed
}

pub struct DevServer {
    pub dir: PathBuf,
    pub listen_addr: String,
    pub config: ServerConfig,
    pub poll_interval: Duration,
}

impl DevServer {
    /// Run until `shutdown` is cancelled, restarting on every directory change.
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let mut snapshot = dir_snapshot(&self.dir).await?;
        tracing::info!(dir=%self.dir.display(), poll_ms=self.poll_interval.as_millis() as u64, "dev mode watching for changes");

        loop {
            let server_token = shutdown.child_token();
            let server = Server::new(&self.dir, self.config.clone(), server_token.clone()).await?;
            let listener = TcpListener::bind(&self.listen_addr).await?;
            let mut handle = tokio::spawn(server.serve(listener));

            let reload = loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break false,
                    res = &mut handle => {
                        // The server stopped on its own; surface why.
                        res??;
                        anyhow::bail!("server exited unexpectedly");
                    }
                    _ = tokio::time::sleep(self.poll_interval) => {
                        match dir_snapshot(&self.dir).await {
                            Ok(next) => {
                                let changed = changed_paths(&snapshot, &next);
                                if !changed.is_empty() {
                                    for path in &changed {
                                        tracing::info!(path=%path.display(), "[reload] modified, reloading server...");
                                    }
                                    snapshot = next;
                                    break true;
                                }
                            }
                            Err(e) => tracing::warn!(error=%e, "watcher error"),
                        }
                    }
                }
            };

            tracing::info!("shutting down previous server...");
            server_token.cancel();
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
                Ok(Ok(Err(e))) => tracing::warn!(error=%e, "server error during shutdown"),
                Ok(Err(e)) => tracing::warn!(error=%e, "server task failed"),
                Ok(Ok(Ok(()))) => {}
                Err(_) => {
                    tracing::warn!("server did not stop within grace period, aborting");
                    handle.abort();
                }
            }

            if !reload {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_snapshot_diff() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        let b = dir.path().join("b.py");
        std::fs::write(&a, "x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let before = dir_snapshot(dir.path()).await.unwrap();
        assert_eq!(before.len(), 1);
        assert!(changed_paths(&before, &before).is_empty());

        std::fs::write(&a, "longer contents").unwrap();
        std::fs::write(&b, "y").unwrap();
        let after = dir_snapshot(dir.path()).await.unwrap();
        assert_eq!(changed_paths(&before, &after), vec![a.clone(), b.clone()]);

        std::fs::remove_file(&b).unwrap();
        let removed = dir_snapshot(dir.path()).await.unwrap();
        assert_eq!(changed_paths(&after, &removed), vec![b]);
    }

    #[tokio::test]
    async fn test_reload_picks_up_new_function() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.py"), "cat\n").unwrap();

        let addr = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap()
        };
        let mut config = ServerConfig::default();
        config.runtime.python_bin = PathBuf::from("/bin/sh");
        let dev = DevServer {
            dir: dir.path().to_path_buf(),
            listen_addr: addr.to_string(),
            config,
            poll_interval: Duration::from_millis(50),
        };
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(dev.run(shutdown.clone()));

        let client = reqwest::Client::new();
        let url = format!("http://{addr}/functions");
        let names = |v: serde_json::Value| -> Vec<String> {
            v.as_array()
                .map(|a| {
                    a.iter()
                        .filter_map(|f| f["name"].as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut seen = Vec::new();
        for _ in 0..100 {
            if let Ok(resp) = client.get(&url).send().await {
                if let Ok(v) = resp.json::<serde_json::Value>().await {
                    seen = names(v);
                    if !seen.is_empty() {
                        break;
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(seen, vec!["one".to_string()]);

        std::fs::write(dir.path().join("two.py"), "cat\n").unwrap();
        for _ in 0..100 {
            if let Ok(resp) = client.get(&url).send().await {
                if let Ok(v) = resp.json::<serde_json::Value>().await {
                    seen = names(v);
                    if seen.len() == 2 {
                        break;
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(seen, vec!["one".to_string(), "two".to_string()]);

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }
}
