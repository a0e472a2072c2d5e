//! Kubernetes API integrations
//!
//! Guarded resource kinds (Gateway API v1, networking.k8s.io/v1) and the
//! GatewayProxy connection-configuration CRD.

pub mod gateway;
pub mod gatewayproxy;
pub mod ingress;
pub mod metrics;
