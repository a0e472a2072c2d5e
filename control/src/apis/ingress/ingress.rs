//! IngressClass deletion guard
//!
//! An IngressClass cannot be deleted while any Ingress selects it, either
//! through `spec.ingressClassName` or the legacy class annotation.

use crate::webhook::{DeletionGuard, Dependent, KubeLister};
use k8s_openapi::api::networking::v1::Ingress;
use kube::Client;

/// Pre-IngressClass way of selecting a class, still honored by most controllers
pub const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

impl Dependent for Ingress {
    const KIND_PLURAL: &'static str = "Ingresses";

    fn referenced_name(&self) -> Option<&str> {
        self.spec
            .as_ref()
            .and_then(|spec| spec.ingress_class_name.as_deref())
            .or_else(|| {
                self.metadata
                    .annotations
                    .as_ref()
                    .and_then(|a| a.get(INGRESS_CLASS_ANNOTATION))
                    .map(String::as_str)
            })
    }
}

/// Guard backed by a live, cluster-wide Ingress list
pub fn ingress_class_guard(client: Client) -> DeletionGuard<Ingress, KubeLister<Ingress>> {
    DeletionGuard::new(KubeLister::all(client))
}
