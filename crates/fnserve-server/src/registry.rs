use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;

use fnserve_runtime::RuntimeKind;

/// Route names served by the server itself; functions cannot shadow them.
pub const RESERVED_NAMES: [&str; 5] = ["health", "healthz", "stats", "metrics", "functions"];

#[derive(Debug, Clone, Serialize)]
pub struct FunctionInfo {
    pub name: String,
    pub path: PathBuf,
    #[serde(serialize_with = "serialize_kind")]
    pub runtime: RuntimeKind,
}

/// Functions discovered in a directory, keyed by file stem.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, FunctionInfo>,
}

impl FunctionRegistry {
    /// List `dir` once and register every regular, non-hidden file.
    pub async fn discover(dir: &Path) -> anyhow::Result<Self> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("failed to read dir {}", dir.display()))?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                continue;
            }
            files.push(entry.path());
        }
        files.sort();

        let mut registry = Self::default();
        for path in files {
            registry.register(path);
        }
        Ok(registry)
    }

    /// Register one file. Returns false when it was skipped.
    pub fn register(&mut self, path: PathBuf) -> bool {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            tracing::warn!(path=%path.display(), "skipping function with non UTF-8 name");
            return false;
        };
        if file_name.starts_with('.') {
            return false;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            return false;
        };

        if RESERVED_NAMES.contains(&name.as_str()) {
            tracing::warn!(function=%name, path=%path.display(), "function name collides with a built-in route, skipping");
            return false;
        }
        if let Some(existing) = self.functions.get(&name) {
            tracing::warn!(
                function=%name,
                path=%path.display(),
                registered=%existing.path.display(),
                "duplicate function name, skipping"
            );
            return false;
        }

        let runtime = RuntimeKind::for_path(&path);
        if RuntimeKind::is_fallback(&path) {
            tracing::warn!(function=%name, path=%path.display(), "unrecognized extension, running as binary");
        }
        tracing::info!(function=%name, path=%path.display(), runtime=runtime.as_str(), "registered function");

        self.functions.insert(
            name.clone(),
            FunctionInfo {
                name,
                path,
                runtime,
            },
        );
        true
    }

    pub fn get(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionInfo> {
        self.functions.values()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

fn serialize_kind<S: serde::Serializer>(kind: &RuntimeKind, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(kind.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_discover() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.py"), "print('{}')").unwrap();
        std::fs::write(dir.path().join("resize"), "").unwrap();
        std::fs::write(dir.path().join(".hidden.py"), "").unwrap();
        std::fs::create_dir(dir.path().join("lib")).unwrap();

        let reg = FunctionRegistry::discover(dir.path()).await.unwrap();
        assert_eq!(reg.len(), 2);

        let hello = reg.get("hello").unwrap();
        assert_eq!(hello.runtime, RuntimeKind::Python);
        assert_eq!(hello.path, dir.path().join("hello.py"));
        assert_eq!(reg.get("resize").unwrap().runtime, RuntimeKind::Binary);
        assert!(reg.get("lib").is_none());
        assert!(reg.get(".hidden").is_none());
    }

    #[test]
    fn test_duplicate_and_reserved_names() {
        let mut reg = FunctionRegistry::default();
        assert!(reg.register(PathBuf::from("fns/hello.py")));
        assert!(!reg.register(PathBuf::from("fns/hello.sh")));
        assert!(!reg.register(PathBuf::from("fns/stats.py")));
        assert!(!reg.register(PathBuf::from("fns/health")));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("hello").unwrap().path, PathBuf::from("fns/hello.py"));
    }

    #[tokio::test]
    async fn test_missing_dir() {
        let err = FunctionRegistry::discover(Path::new("/no/such/functions"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to read dir"));
    }
}
