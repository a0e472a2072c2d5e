//! Ingress (networking.k8s.io/v1) support

#[allow(clippy::module_inception)]
pub mod ingress;
