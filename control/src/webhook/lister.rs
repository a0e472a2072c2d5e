//! Live object listing for admission checks
//!
//! Guards must decide on the cluster state at the time of the request, so
//! these listers go straight to the API server instead of a watch cache.

use crate::error::Result;
use async_trait::async_trait;
use kube::api::{Api, ListParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;

/// Read-only list of every object of one kind
#[async_trait]
pub trait ObjectLister<K>: Send + Sync {
    async fn list(&self) -> Result<Vec<K>>;
}

/// Lists objects across all namespaces through the API server
pub struct KubeLister<K> {
    api: Api<K>,
}

impl<K> KubeLister<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    pub fn all(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl<K> ObjectLister<K> for KubeLister<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    async fn list(&self) -> Result<Vec<K>> {
        // No resourceVersion: a consistent read, never served from cache
        let list = self.api.list(&ListParams::default()).await?;
        Ok(list.items)
    }
}

#[async_trait]
impl<K, L> ObjectLister<K> for Arc<L>
where
    K: 'static,
    L: ObjectLister<K> + ?Sized,
{
    async fn list(&self) -> Result<Vec<K>> {
        (**self).list().await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::Error;
    use std::sync::Mutex;

    /// In-memory lister whose contents and failures tests control
    pub(crate) struct FakeLister<K> {
        items: Mutex<Vec<K>>,
        failure: Mutex<Option<String>>,
    }

    impl<K: Clone> FakeLister<K> {
        pub(crate) fn new(items: Vec<K>) -> Arc<Self> {
            Arc::new(Self {
                items: Mutex::new(items),
                failure: Mutex::new(None),
            })
        }

        pub(crate) fn push(&self, item: K) {
            self.items.lock().unwrap().push(item);
        }

        pub(crate) fn retain(&self, keep: impl Fn(&K) -> bool) {
            self.items.lock().unwrap().retain(|item| keep(item));
        }

        pub(crate) fn fail_with(&self, message: &str) {
            *self.failure.lock().unwrap() = Some(message.to_string());
        }
    }

    #[async_trait]
    impl<K: Clone + Send + Sync + 'static> ObjectLister<K> for FakeLister<K> {
        async fn list(&self) -> Result<Vec<K>> {
            if let Some(message) = self.failure.lock().unwrap().clone() {
                return Err(Error::Kubernetes(message));
            }
            Ok(self.items.lock().unwrap().clone())
        }
    }
}
