// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Testing utilities

use std::collections::HashMap;
use std::fmt::Debug;
use std::ops::Range;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use object_store::path::Path;
use object_store::{
    Error as OSError, GetOptions, GetResult, ListResult, MultipartUpload, ObjectMeta,
    ObjectStore as OSObjectStore, PutMultipartOptions, PutOptions, PutPayload, PutResult,
    Result as OSResult,
};

use crate::io::ObjectStore;
use crate::Result;

// A policy function takes in the name of the operation (e.g. "put") and the location
// that is being accessed / modified and returns an optional error.
pub trait PolicyFnT: Fn(&str, &Path) -> Result<()> + Send + Sync {}
impl<F> PolicyFnT for F where F: Fn(&str, &Path) -> Result<()> + Send + Sync {}
impl Debug for dyn PolicyFnT {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PolicyFn")
    }
}
pub type PolicyFn = Arc<dyn PolicyFnT>;

/// A policy container, shared between test code and the proxy object store.
///
/// Typically used to count calls or to simulate I/O errors. Calls with a
/// source and a destination (copy, rename) hand the destination to the
/// policy, listings hand over the prefix.
#[derive(Debug, Default)]
pub struct ProxyObjectStorePolicy {
    /// Policies which run before a method is invoked. If the policy returns
    /// an error then the target method will not be invoked and the error will
    /// be returned instead.
    before_policies: HashMap<String, PolicyFn>,
}

impl ProxyObjectStorePolicy {
    pub fn new() -> Self {
        Default::default()
    }

    /// Set a new policy with the given name
    ///
    /// The name can be used to later remove this policy
    pub fn set_before_policy(&mut self, name: &str, policy: PolicyFn) {
        self.before_policies.insert(name.to_string(), policy);
    }

    pub fn clear_before_policy(&mut self, name: &str) {
        self.before_policies.remove(name);
    }
}

/// A proxy object store
///
/// Wraps another object store and applies the given policy to the calls made
/// to the underlying store.
#[derive(Debug)]
pub struct ProxyObjectStore {
    target: Arc<dyn OSObjectStore>,
    policy: Arc<Mutex<ProxyObjectStorePolicy>>,
}

impl ProxyObjectStore {
    pub fn new(
        target: Arc<dyn OSObjectStore>,
        policy: Arc<Mutex<ProxyObjectStorePolicy>>,
    ) -> Self {
        Self { target, policy }
    }

    /// In-memory [`ObjectStore`] behind a proxy, with the handle to its policy.
    pub fn memory() -> (ObjectStore, Arc<Mutex<ProxyObjectStorePolicy>>) {
        let policy = Arc::new(Mutex::new(ProxyObjectStorePolicy::new()));
        let proxy = Self::new(ObjectStore::memory().inner, policy.clone());
        (ObjectStore::new(Arc::new(proxy), "memory"), policy)
    }

    fn before_method(&self, method: &str, location: &Path) -> OSResult<()> {
        let policy = self.policy.lock().map_err(|e| OSError::Generic {
            store: "proxy",
            source: e.to_string().into(),
        })?;
        for policy in policy.before_policies.values() {
            policy(method, location).map_err(OSError::from)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ProxyObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ProxyObjectStore({})", self.target)
    }
}

#[async_trait]
impl OSObjectStore for ProxyObjectStore {
    async fn put_opts(
        &self,
        location: &Path,
        payload: PutPayload,
        opts: PutOptions,
    ) -> OSResult<PutResult> {
        self.before_method("put", location)?;
        self.target.put_opts(location, payload, opts).await
    }

    async fn put_multipart_opts(
        &self,
        location: &Path,
        opts: PutMultipartOptions,
    ) -> OSResult<Box<dyn MultipartUpload>> {
        self.before_method("put_multipart", location)?;
        self.target.put_multipart_opts(location, opts).await
    }

    async fn get_opts(&self, location: &Path, options: GetOptions) -> OSResult<GetResult> {
        self.before_method("get", location)?;
        self.target.get_opts(location, options).await
    }

    async fn get_range(&self, location: &Path, range: Range<u64>) -> OSResult<Bytes> {
        self.before_method("get", location)?;
        self.target.get_range(location, range).await
    }

    async fn head(&self, location: &Path) -> OSResult<ObjectMeta> {
        self.before_method("head", location)?;
        self.target.head(location).await
    }

    async fn delete(&self, location: &Path) -> OSResult<()> {
        self.before_method("delete", location)?;
        self.target.delete(location).await
    }

    fn list(&self, prefix: Option<&Path>) -> BoxStream<'static, OSResult<ObjectMeta>> {
        self.target.list(prefix)
    }

    async fn list_with_delimiter(&self, prefix: Option<&Path>) -> OSResult<ListResult> {
        self.before_method("list", &prefix.cloned().unwrap_or_default())?;
        self.target.list_with_delimiter(prefix).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> OSResult<()> {
        self.before_method("copy", to)?;
        self.target.copy(from, to).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> OSResult<()> {
        self.before_method("rename", to)?;
        self.target.rename(from, to).await
    }

    async fn copy_if_not_exists(&self, from: &Path, to: &Path) -> OSResult<()> {
        self.before_method("copy", to)?;
        self.target.copy_if_not_exists(from, to).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use snafu::location;

    use crate::Error;

    #[tokio::test]
    async fn test_proxy_policy() {
        let (store, policy) = ProxyObjectStore::memory();
        let path = Path::from("a/b");
        store.put(&path, b"x".to_vec()).await.unwrap();

        let gets = Arc::new(AtomicUsize::new(0));
        let counter = gets.clone();
        policy.lock().unwrap().set_before_policy(
            "fail_get",
            Arc::new(move |method: &str, _: &Path| {
                if method == "get" {
                    counter.fetch_add(1, Ordering::SeqCst);
                    return Err(Error::io("injected", location!()));
                }
                Ok(())
            }),
        );
        let err = store.read(&path).await.unwrap_err();
        assert!(matches!(err, Error::IO { .. }));
        assert_eq!(gets.load(Ordering::SeqCst), 1);
        assert!(store.exists(&path).await.unwrap());

        policy.lock().unwrap().clear_before_policy("fail_get");
        assert_eq!(store.read(&path).await.unwrap().as_ref(), b"x");
    }
}
