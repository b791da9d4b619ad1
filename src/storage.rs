use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use axum::async_trait;
use bytes::Bytes;

#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    /// URL path under which a stored object is served.
    fn public_url(&self, key: &str) -> String;
}

/// Files under a local directory that is also mounted at `/static`.
#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
    url_prefix: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, url_prefix: &str) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    fn resolve(&self, key: &str) -> anyhow::Result<PathBuf> {
        let rel = Path::new(key);
        let clean = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        anyhow::ensure!(clean && !key.is_empty(), "invalid object key {key:?}");
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl StorageClient for LocalStorage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create_dir_all {}", parent.display()))?;
        }
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        tracing::debug!(key, content_type, bytes = body.len(), "object stored");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.url_prefix, key)
    }
}

#[cfg(test)]
pub mod memory {
    use std::{collections::HashMap, sync::Mutex};

    use super::*;

    #[derive(Default)]
    pub struct MemoryStorage {
        objects: Mutex<HashMap<String, Bytes>>,
    }

    impl MemoryStorage {
        pub fn get(&self, key: &str) -> Option<Bytes> {
            self.objects.lock().unwrap().get(key).cloned()
        }

        pub fn len(&self) -> usize {
            self.objects.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl StorageClient for MemoryStorage {
        async fn put_object(&self, key: &str, body: Bytes, _ct: &str) -> anyhow::Result<()> {
            self.objects.lock().unwrap().insert(key.to_string(), body);
            Ok(())
        }

        fn public_url(&self, key: &str) -> String {
            format!("/static/{}", key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_storage_writes_nested_keys() {
        let root = std::env::temp_dir().join(format!("qrforge-{}", uuid::Uuid::new_v4()));
        let storage = LocalStorage::new(&root, "/static/");
        storage
            .put_object("qrcodes/u1/a.png", Bytes::from_static(b"png"), "image/png")
            .await
            .unwrap();
        let written = tokio::fs::read(root.join("qrcodes/u1/a.png")).await.unwrap();
        assert_eq!(written, b"png");
        assert_eq!(storage.public_url("qrcodes/u1/a.png"), "/static/qrcodes/u1/a.png");
        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn local_storage_rejects_escaping_keys() {
        let storage = LocalStorage::new(std::env::temp_dir(), "/static");
        for key in ["../etc/passwd", "/abs.png", "a/../../b.png", ""] {
            assert!(storage
                .put_object(key, Bytes::from_static(b"x"), "image/png")
                .await
                .is_err());
        }
    }
}
