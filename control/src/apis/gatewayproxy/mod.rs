//! GatewayProxy CRD
//!
//! Describes how the controller reaches and authenticates to the data
//! plane's admin API: a control-plane target (endpoints or a Service) and an
//! AdminKey credential (inline or from a Secret).

pub mod validator;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// GatewayProxy spec
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "gatehouse.io",
    version = "v1alpha1",
    kind = "GatewayProxy",
    plural = "gatewayproxies",
    namespaced = true,
    printcolumn = r#"{"name":"Provider", "type":"string", "jsonPath":".spec.provider.type"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GatewayProxySpec {
    /// Where translated configuration is pushed
    pub provider: Option<GatewayProxyProvider>,
    /// Service whose address is reported in Ingress/Gateway status (ns/name)
    pub publish_service: Option<String>,
    /// Addresses reported in status instead of the publish service
    #[serde(default)]
    pub status_address: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum ProviderType {
    #[default]
    ControlPlane,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayProxyProvider {
    #[serde(rename = "type")]
    pub type_: ProviderType,
    pub control_plane: Option<ControlPlaneProvider>,
}

/// Admin API location and credentials
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneProvider {
    /// Admin API URLs, used when no service is given
    #[serde(default)]
    pub endpoints: Vec<String>,
    /// Admin API Service in the GatewayProxy's namespace
    pub service: Option<ProviderService>,
    /// Verify the admin API's TLS certificate
    pub tls_verify: Option<bool>,
    pub auth: ControlPlaneAuth,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ProviderService {
    pub name: String,
    pub port: Option<i32>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum AuthType {
    #[default]
    AdminKey,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneAuth {
    #[serde(rename = "type")]
    pub type_: AuthType,
    pub admin_key: Option<AdminKeyAuth>,
}

/// AdminKey credential, inline or from a Secret
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AdminKeyAuth {
    pub value: Option<String>,
    pub value_from: Option<AdminKeyValueFrom>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AdminKeyValueFrom {
    pub secret_key_ref: Option<SecretKeySelector>,
}

/// Key of a Secret in the GatewayProxy's namespace
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct SecretKeySelector {
    pub name: String,
    pub key: String,
}

impl GatewayProxy {
    /// Control-plane settings, when the provider is a control plane
    pub fn control_plane(&self) -> Option<&ControlPlaneProvider> {
        self.spec
            .provider
            .as_ref()
            .and_then(|p| p.control_plane.as_ref())
    }
}
