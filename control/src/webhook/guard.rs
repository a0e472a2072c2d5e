//! Deletion guard
//!
//! Refuses deleting an object while objects of a dependent kind still refer
//! to it by name. Dependents are listed live on every delete attempt and a
//! failed listing refuses the deletion.

use super::{ObjectLister, Validator, Warnings};
use crate::error::{Error, Result};
use crate::key::ObjectKey;
use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use std::marker::PhantomData;
use tracing::{debug, warn};

/// An object that refers to another object by name through a single field
pub trait Dependent {
    /// Plural kind used in denial messages, e.g. "Gateways"
    const KIND_PLURAL: &'static str;

    /// Name of the object this one depends on, if any
    fn referenced_name(&self) -> Option<&str>;
}

/// Blocks deletion of a `K` referenced by any `D`
pub struct DeletionGuard<D, L> {
    lister: L,
    _dependent: PhantomData<fn() -> D>,
}

impl<D, L> DeletionGuard<D, L>
where
    D: Dependent + Resource + Send + Sync + 'static,
    L: ObjectLister<D>,
{
    pub fn new(lister: L) -> Self {
        Self {
            lister,
            _dependent: PhantomData,
        }
    }

    /// Live dependents referring to `target`, sorted by namespace and name
    pub async fn blocking_dependents(&self, target: &str) -> Result<Vec<ObjectKey>> {
        let mut blocking: Vec<ObjectKey> = self
            .lister
            .list()
            .await?
            .iter()
            .filter(|d| d.referenced_name() == Some(target))
            .map(ObjectKey::of)
            .collect();
        blocking.sort();
        Ok(blocking)
    }
}

#[async_trait]
impl<K, D, L> Validator<K> for DeletionGuard<D, L>
where
    K: Resource<DynamicType = ()> + Send + Sync + 'static,
    D: Dependent + Resource + Send + Sync + 'static,
    L: ObjectLister<D>,
{
    async fn validate_delete(&self, obj: &K) -> Result<Warnings> {
        let name = obj.name_any();
        let kind = K::kind(&());

        let blocking = self.blocking_dependents(&name).await.map_err(|e| {
            warn!(
                kind = %kind,
                name = %name,
                error = %e,
                "Failed to list {}",
                D::KIND_PLURAL
            );
            e
        })?;

        if blocking.is_empty() {
            debug!(kind = %kind, name = %name, "No dependents, deletion allowed");
            return Ok(Vec::new());
        }

        let names: Vec<String> = blocking.iter().map(ToString::to_string).collect();
        Err(Error::Denied(format!(
            "the {} is still in using by {}: [{}]",
            kind,
            D::KIND_PLURAL,
            names.join(" ")
        )))
    }
}
