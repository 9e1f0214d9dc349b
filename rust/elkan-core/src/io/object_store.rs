// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Thin wrapper around [object_store::ObjectStore] used for snapshots, job
//! input and job output.

use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{path::Path, ObjectMeta, ObjectStore as OSObjectStore};
use snafu::location;
use url::Url;

use crate::{Error, Result};

/// Storage handle shared by every task of a job.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    pub inner: Arc<dyn OSObjectStore>,
    scheme: String,
}

impl ObjectStore {
    pub fn new(inner: Arc<dyn OSObjectStore>, scheme: impl Into<String>) -> Self {
        Self {
            inner,
            scheme: scheme.into(),
        }
    }

    /// Local file system rooted at `/`.
    pub fn local() -> Self {
        Self::new(Arc::new(LocalFileSystem::new()), "file")
    }

    /// Create a in-memory object store directly for testing.
    pub fn memory() -> Self {
        Self::new(Arc::new(InMemory::new()), "memory")
    }

    /// Parse a URI (`file://`, `memory://`, ...) or a plain local path.
    ///
    /// Returns the store and the path of `uri` inside it. Every call with a
    /// `memory://` URI creates a fresh, empty store.
    pub fn from_uri(uri: &str) -> Result<(Self, Path)> {
        if uri.contains("://") {
            let url = Url::parse(uri)?;
            let (store, path) = object_store::parse_url(&url)?;
            return Ok((Self::new(Arc::from(store), url.scheme()), path));
        }
        Self::from_path(uri)
    }

    /// Open a plain file system path. Relative paths are resolved against the
    /// current directory.
    pub fn from_path(str_path: &str) -> Result<(Self, Path)> {
        if str_path.is_empty() {
            return Err(Error::invalid_input("empty path", location!()));
        }
        let absolute = std::path::absolute(str_path)?;
        let path = Path::from_absolute_path(&absolute)?;
        Ok((Self::local(), path))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn is_local(&self) -> bool {
        self.scheme == "file"
    }

    /// Returns true if the file exists.
    pub async fn exists(&self, path: &Path) -> Result<bool> {
        match self.inner.head(path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn read(&self, path: &Path) -> Result<Bytes> {
        Ok(self.inner.get(path).await?.bytes().await?)
    }

    pub async fn put(&self, path: &Path, data: Vec<u8>) -> Result<()> {
        self.inner.put(path, data.into()).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &Path) -> Result<()> {
        self.inner.delete(path).await?;
        Ok(())
    }

    pub async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.inner.rename(from, to).await?;
        Ok(())
    }

    /// Files directly under `dir` (no recursion), sorted by location.
    pub async fn list_files(&self, dir: &Path) -> Result<Vec<ObjectMeta>> {
        let mut files = self.inner.list_with_delimiter(Some(dir)).await?.objects;
        files.sort_by(|a, b| a.location.cmp(&b.location));
        Ok(files)
    }

    /// Delete every file under `dir`, recursively.
    pub async fn remove_dir_all(&self, dir: &Path) -> Result<()> {
        let files: Vec<ObjectMeta> = self.inner.list(Some(dir)).try_collect().await?;
        for meta in files {
            match self.inner.delete(&meta.location).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
