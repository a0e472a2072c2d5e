//! Admission validation
//!
//! Typed [`Validator`]s are registered per resource kind on an
//! [`AdmissionDispatcher`], which decodes incoming objects, enforces the
//! request deadline and turns the outcome into an allow/deny decision.
//! Serving the AdmissionReview endpoint (HTTP, TLS) is left to the embedder.

pub mod guard;
pub mod lister;

use crate::apis::gateway::gateway_class::gateway_class_guard;
use crate::apis::gatewayproxy::validator::GatewayProxyValidator;
use crate::apis::gatewayproxy::GatewayProxy;
use crate::apis::ingress::ingress::ingress_class_guard;
use crate::apis::metrics::record_admission;
use crate::config::AdmissionConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use k8s_openapi::api::networking::v1::IngressClass;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub use guard::{Dependent, DeletionGuard};
pub use lister::{KubeLister, ObjectLister};

/// Warnings returned alongside an allowed request
pub type Warnings = Vec<String>;

/// Validation hooks for one resource kind
///
/// Every hook defaults to allowing the request.
#[async_trait]
pub trait Validator<K: Send + Sync + 'static>: Send + Sync {
    async fn validate_create(&self, _obj: &K) -> Result<Warnings> {
        Ok(Vec::new())
    }

    async fn validate_update(&self, _old: &K, _new: &K) -> Result<Warnings> {
        Ok(Vec::new())
    }

    async fn validate_delete(&self, _obj: &K) -> Result<Warnings> {
        Ok(Vec::new())
    }
}

/// API group and kind a validator is registered for
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
        }
    }

    pub fn of<K: Resource<DynamicType = ()>>() -> Self {
        Self::new(K::group(&()), K::kind(&()))
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

/// The parts of an admission request validators look at
#[derive(Debug, Clone)]
pub struct Attributes {
    pub kind: GroupKind,
    pub operation: Operation,
    /// New state (create, update)
    pub object: Option<DynamicObject>,
    /// Prior state (update, delete)
    pub old_object: Option<DynamicObject>,
}

impl Attributes {
    pub fn from_request(req: &AdmissionRequest<DynamicObject>) -> Self {
        Self {
            kind: GroupKind::new(req.kind.group.clone(), req.kind.kind.clone()),
            operation: req.operation.clone(),
            object: req.object.clone(),
            old_object: req.old_object.clone(),
        }
    }

    fn object_name(&self) -> String {
        self.object
            .as_ref()
            .or(self.old_object.as_ref())
            .and_then(|o| o.metadata.name.clone())
            .unwrap_or_default()
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed { warnings: Warnings },
    Denied { message: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    /// Denial message, if denied
    pub fn message(&self) -> Option<&str> {
        match self {
            Decision::Denied { message } => Some(message),
            Decision::Allowed { .. } => None,
        }
    }

    pub fn warnings(&self) -> &[String] {
        match self {
            Decision::Allowed { warnings } => warnings,
            Decision::Denied { .. } => &[],
        }
    }
}

#[async_trait]
trait ErasedValidator: Send + Sync {
    async fn validate(&self, attrs: &Attributes) -> Result<Warnings>;
}

struct Typed<K, V> {
    validator: V,
    _kind: PhantomData<fn() -> K>,
}

fn decode<K: DeserializeOwned>(obj: Option<&DynamicObject>, field: &str) -> Result<K> {
    use serde::de::Error as _;

    let obj = obj.ok_or_else(|| {
        Error::Decode(serde_json::Error::custom(format!(
            "request has no {}",
            field
        )))
    })?;
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

#[async_trait]
impl<K, V> ErasedValidator for Typed<K, V>
where
    K: DeserializeOwned + Send + Sync + 'static,
    V: Validator<K>,
{
    async fn validate(&self, attrs: &Attributes) -> Result<Warnings> {
        match attrs.operation {
            Operation::Create => {
                let obj: K = decode(attrs.object.as_ref(), "object")?;
                self.validator.validate_create(&obj).await
            }
            Operation::Update => {
                let old: K = decode(attrs.old_object.as_ref(), "oldObject")?;
                let new: K = decode(attrs.object.as_ref(), "object")?;
                self.validator.validate_update(&old, &new).await
            }
            Operation::Delete => {
                let obj: K = decode(attrs.old_object.as_ref(), "oldObject")?;
                self.validator.validate_delete(&obj).await
            }
            _ => Ok(Vec::new()),
        }
    }
}

/// Routes admission requests to the validator registered for their kind
pub struct AdmissionDispatcher {
    validators: HashMap<GroupKind, Arc<dyn ErasedValidator>>,
    timeout: Duration,
}

impl AdmissionDispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            validators: HashMap::new(),
            timeout,
        }
    }

    /// Register `validator` for resource kind `K`, replacing any previous one
    pub fn register<K, V>(&mut self, validator: V) -> &mut Self
    where
        K: Resource<DynamicType = ()> + DeserializeOwned + Send + Sync + 'static,
        V: Validator<K> + 'static,
    {
        let kind = GroupKind::of::<K>();
        debug!(kind = %kind, "Registered admission validator");
        self.validators.insert(
            kind,
            Arc::new(Typed {
                validator,
                _kind: PhantomData,
            }),
        );
        self
    }

    /// Kinds with a registered validator, sorted
    pub fn kinds(&self) -> Vec<GroupKind> {
        let mut kinds: Vec<_> = self.validators.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn handles(&self, kind: &GroupKind) -> bool {
        self.validators.contains_key(kind)
    }

    /// Run the registered validator within the deadline
    ///
    /// Kinds without a validator are allowed. Validator errors, decode errors
    /// and an elapsed deadline all deny.
    pub async fn validate(&self, attrs: &Attributes) -> Decision {
        let Some(validator) = self.validators.get(&attrs.kind) else {
            return Decision::Allowed {
                warnings: Vec::new(),
            };
        };

        let start = Instant::now();
        let operation = format!("{:?}", attrs.operation).to_uppercase();
        let name = attrs.object_name();

        let result = match tokio::time::timeout(self.timeout, validator.validate(attrs)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                kind: attrs.kind.kind.clone(),
                timeout: self.timeout,
            }),
        };

        let decision = match result {
            Ok(warnings) => {
                debug!(
                    kind = %attrs.kind,
                    operation = %operation,
                    name = %name,
                    warnings = warnings.len(),
                    "Admission allowed"
                );
                Decision::Allowed { warnings }
            }
            Err(e) => {
                if matches!(e, Error::Denied(_)) {
                    info!(
                        kind = %attrs.kind,
                        operation = %operation,
                        name = %name,
                        reason = %e,
                        "Admission denied"
                    );
                } else {
                    warn!(
                        kind = %attrs.kind,
                        operation = %operation,
                        name = %name,
                        error = %e,
                        "Admission check failed, denying"
                    );
                }
                Decision::Denied {
                    message: e.to_string(),
                }
            }
        };

        let result = if decision.is_allowed() { "allowed" } else { "denied" };
        record_admission(
            &attrs.kind.kind,
            &operation,
            start.elapsed().as_secs_f64(),
            result,
        );

        decision
    }

    /// Answer one admission request
    pub async fn admit(&self, req: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
        let decision = self.validate(&Attributes::from_request(req)).await;
        let mut response = AdmissionResponse::from(req);
        match decision {
            Decision::Allowed { warnings } => {
                if !warnings.is_empty() {
                    response.warnings = Some(warnings);
                }
                response
            }
            Decision::Denied { message } => response.deny(message),
        }
    }

    /// Answer a full AdmissionReview as received by the webhook endpoint
    pub async fn review(&self, review: AdmissionReview<DynamicObject>) -> AdmissionReview<DynamicObject> {
        let req: AdmissionRequest<DynamicObject> = match review.try_into() {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "Invalid AdmissionReview");
                return AdmissionResponse::invalid(e.to_string()).into_review();
            }
        };
        self.admit(&req).await.into_review()
    }
}

/// Dispatcher with every guard enabled in `config`
pub fn default_dispatcher(client: Client, config: &AdmissionConfig) -> AdmissionDispatcher {
    let mut dispatcher = AdmissionDispatcher::new(config.timeout());

    if config.guard_gateway_classes {
        dispatcher.register::<GatewayClass, _>(gateway_class_guard(client.clone()));
    }

    if config.guard_ingress_classes {
        dispatcher.register::<IngressClass, _>(ingress_class_guard(client.clone()));
    }

    if config.gateway_proxy_conflicts || config.gateway_proxy_reference_warnings {
        let validator = GatewayProxyValidator::from_client(client, config);
        dispatcher.register::<GatewayProxy, _>(validator);
    }

    info!(
        kinds = ?dispatcher.kinds().iter().map(ToString::to_string).collect::<Vec<_>>(),
        timeout_secs = config.timeout_secs,
        "Admission validators registered"
    );
    dispatcher
}
