//! GatewayProxy admission validator
//!
//! Two GatewayProxies conflict when they point at the same admin API
//! (same Service, or at least one shared endpoint) AND authenticate with the
//! same AdminKey (same Secret key, or the same inline value). Either match
//! alone is allowed.
//!
//! Referenced Secrets and Services are also looked up so a typo shows up as
//! an admission warning instead of a silent reconcile failure.

use super::GatewayProxy;
use crate::config::AdmissionConfig;
use crate::error::{Error, Result};
use crate::key::ObjectKey;
use crate::webhook::{KubeLister, ObjectLister, Validator, Warnings};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Secret, Service};
use kube::api::Api;
use kube::Client;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One dimension on which two GatewayProxies coincide
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Overlap {
    /// Same admin Service
    Service(ObjectKey),
    /// Endpoints present in both
    Endpoints(Vec<String>),
    /// Same AdminKey Secret key
    Secret { secret: ObjectKey, key: String },
    /// Same inline AdminKey
    InlineValue,
}

impl Overlap {
    /// Whether this is a target (rather than credential) overlap
    pub fn is_target(&self) -> bool {
        matches!(self, Overlap::Service(_) | Overlap::Endpoints(_))
    }
}

impl fmt::Display for Overlap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Overlap::Service(service) => write!(f, "Service {}", service),
            Overlap::Endpoints(endpoints) => {
                write!(f, "control plane endpoints [{}]", endpoints.join(", "))
            }
            Overlap::Secret { secret, key } => write!(f, "AdminKey secret {} key {}", secret, key),
            // Never echo the credential itself
            Overlap::InlineValue => write!(f, "inline AdminKey value"),
        }
    }
}

/// A candidate GatewayProxy colliding with an existing one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub candidate: ObjectKey,
    pub existing: ObjectKey,
    /// Target overlaps first, then credential overlaps
    pub overlaps: Vec<Overlap>,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let on: Vec<String> = self.overlaps.iter().map(ToString::to_string).collect();
        write!(
            f,
            "gateway proxy configuration conflict: {} conflicts with {} on {}",
            self.candidate,
            self.existing,
            on.join(" and ")
        )
    }
}

/// Connection-relevant fields of a GatewayProxy, resolved to full identities
#[derive(Debug, Clone, PartialEq, Eq)]
struct Connection {
    service: Option<ObjectKey>,
    endpoints: Vec<String>,
    secret: Option<(ObjectKey, String)>,
    inline: Option<String>,
}

fn normalize_endpoint(endpoint: &str) -> String {
    endpoint.trim().trim_end_matches('/').to_string()
}

impl Connection {
    fn of(proxy: &GatewayProxy) -> Option<Self> {
        let cp = proxy.control_plane()?;
        let namespace = ObjectKey::of(proxy).namespace;

        let service = cp
            .service
            .as_ref()
            .filter(|s| !s.name.is_empty())
            .map(|s| ObjectKey::new(namespace.clone(), s.name.clone()));

        // A named Service wins over any endpoint list
        let mut endpoints: Vec<String> = Vec::new();
        if service.is_none() {
            for endpoint in cp.endpoints.iter().map(|e| normalize_endpoint(e)) {
                if !endpoint.is_empty() && !endpoints.contains(&endpoint) {
                    endpoints.push(endpoint);
                }
            }
        }

        let admin_key = cp.auth.admin_key.as_ref();
        let secret = admin_key
            .and_then(|k| k.value_from.as_ref())
            .and_then(|v| v.secret_key_ref.as_ref())
            .filter(|r| !r.name.is_empty())
            .map(|r| (ObjectKey::new(namespace.clone(), r.name.clone()), r.key.clone()));
        let inline = admin_key
            .and_then(|k| k.value.clone())
            .filter(|v| !v.is_empty());

        Some(Self {
            service,
            endpoints,
            secret,
            inline,
        })
    }

    fn overlaps(&self, other: &Connection) -> Vec<Overlap> {
        let mut overlaps = Vec::new();

        if let (Some(a), Some(b)) = (&self.service, &other.service) {
            if a == b {
                overlaps.push(Overlap::Service(a.clone()));
            }
        }

        let shared: Vec<String> = self
            .endpoints
            .iter()
            .filter(|e| other.endpoints.contains(e))
            .cloned()
            .collect();
        if !shared.is_empty() {
            overlaps.push(Overlap::Endpoints(shared));
        }

        if let (Some(a), Some(b)) = (&self.secret, &other.secret) {
            if a == b {
                overlaps.push(Overlap::Secret {
                    secret: a.0.clone(),
                    key: a.1.clone(),
                });
            }
        }

        if let (Some(a), Some(b)) = (&self.inline, &other.inline) {
            if a == b {
                overlaps.push(Overlap::InlineValue);
            }
        }

        overlaps
    }
}

/// First existing GatewayProxy `candidate` conflicts with
///
/// `candidate` itself (same namespace and name) and objects already being
/// deleted are skipped. Siblings are checked in namespace/name order.
pub fn find_conflict(candidate: &GatewayProxy, existing: &[GatewayProxy]) -> Option<Conflict> {
    let candidate_key = ObjectKey::of(candidate);
    let connection = Connection::of(candidate)?;

    let mut siblings: Vec<(ObjectKey, &GatewayProxy)> = existing
        .iter()
        .filter(|p| p.metadata.deletion_timestamp.is_none())
        .map(|p| (ObjectKey::of(p), p))
        .filter(|(key, _)| *key != candidate_key)
        .collect();
    siblings.sort_by(|a, b| a.0.cmp(&b.0));

    siblings.into_iter().find_map(|(key, proxy)| {
        let other = Connection::of(proxy)?;
        let overlaps = connection.overlaps(&other);
        let target = overlaps.iter().any(Overlap::is_target);
        let credential = overlaps.iter().any(|o| !o.is_target());
        (target && credential).then(|| Conflict {
            candidate: candidate_key.clone(),
            existing: key,
            overlaps,
        })
    })
}

/// Existence checks for objects a GatewayProxy points at
#[async_trait]
pub trait ReferenceChecker: Send + Sync {
    async fn secret_exists(&self, key: &ObjectKey) -> Result<bool>;
    async fn service_exists(&self, key: &ObjectKey) -> Result<bool>;
}

/// Looks references up through the API server
pub struct KubeReferenceChecker {
    client: Client,
}

impl KubeReferenceChecker {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReferenceChecker for KubeReferenceChecker {
    async fn secret_exists(&self, key: &ObjectKey) -> Result<bool> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?.is_some())
    }

    async fn service_exists(&self, key: &ObjectKey) -> Result<bool> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?.is_some())
    }
}

/// Admission validator for GatewayProxy create and update
pub struct GatewayProxyValidator<L> {
    siblings: L,
    detect_conflicts: bool,
    references: Option<Arc<dyn ReferenceChecker>>,
}

impl GatewayProxyValidator<KubeLister<GatewayProxy>> {
    /// Validator backed by the API server, honoring the admission flags
    pub fn from_client(client: Client, config: &AdmissionConfig) -> Self {
        let mut validator = Self::new(KubeLister::all(client.clone()))
            .detect_conflicts(config.gateway_proxy_conflicts);
        if config.gateway_proxy_reference_warnings {
            validator = validator.with_reference_checker(KubeReferenceChecker::new(client));
        }
        validator
    }
}

impl<L: ObjectLister<GatewayProxy>> GatewayProxyValidator<L> {
    pub fn new(siblings: L) -> Self {
        Self {
            siblings,
            detect_conflicts: true,
            references: None,
        }
    }

    pub fn detect_conflicts(mut self, enabled: bool) -> Self {
        self.detect_conflicts = enabled;
        self
    }

    pub fn with_reference_checker(mut self, checker: impl ReferenceChecker + 'static) -> Self {
        self.references = Some(Arc::new(checker));
        self
    }

    async fn reference_warnings(&self, proxy: &GatewayProxy) -> Warnings {
        let (Some(checker), Some(connection)) = (&self.references, Connection::of(proxy)) else {
            return Vec::new();
        };

        let mut warnings = Vec::new();
        if let Some((secret, _)) = &connection.secret {
            match checker.secret_exists(secret).await {
                Ok(true) => {}
                Ok(false) => warnings.push(format!("Referenced Secret '{}' not found", secret)),
                Err(e) => warnings.push(format!("Unable to verify Secret '{}': {}", secret, e)),
            }
        }
        if let Some(service) = &connection.service {
            match checker.service_exists(service).await {
                Ok(true) => {}
                Ok(false) => warnings.push(format!("Referenced Service '{}' not found", service)),
                Err(e) => warnings.push(format!("Unable to verify Service '{}': {}", service, e)),
            }
        }
        warnings
    }

    async fn check(&self, proxy: &GatewayProxy, detect_conflicts: bool) -> Result<Warnings> {
        if detect_conflicts {
            let siblings = self.siblings.list().await.map_err(|e| {
                warn!(proxy = %ObjectKey::of(proxy), error = %e, "Failed to list GatewayProxies");
                e
            })?;
            if let Some(conflict) = find_conflict(proxy, &siblings) {
                info!(
                    proxy = %conflict.candidate,
                    existing = %conflict.existing,
                    "GatewayProxy conflicts with an existing one"
                );
                return Err(Error::Denied(conflict.to_string()));
            }
            debug!(
                proxy = %ObjectKey::of(proxy),
                siblings = siblings.len(),
                "No conflicting GatewayProxy"
            );
        }
        Ok(self.reference_warnings(proxy).await)
    }
}

#[async_trait]
impl<L: ObjectLister<GatewayProxy>> Validator<GatewayProxy> for GatewayProxyValidator<L> {
    async fn validate_create(&self, obj: &GatewayProxy) -> Result<Warnings> {
        self.check(obj, self.detect_conflicts).await
    }

    async fn validate_update(&self, _old: &GatewayProxy, new: &GatewayProxy) -> Result<Warnings> {
        // Own prior state is never a sibling, so an existing collision still denies
        self.check(new, self.detect_conflicts).await
    }
}
