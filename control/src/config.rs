//! Configuration for the gatehouse controller
//!
//! Controls which admission guards are wired and how long each may block.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// Admission guard configuration
    #[serde(default)]
    pub admission: AdmissionConfig,
}

/// Admission guard configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdmissionConfig {
    /// Deadline for a single admission check in seconds (default: 10s)
    #[serde(default = "default_admission_timeout")]
    pub timeout_secs: u64,

    /// Refuse deleting a GatewayClass still used by Gateways (default: true)
    #[serde(default = "default_true")]
    pub guard_gateway_classes: bool,

    /// Refuse deleting an IngressClass still used by Ingresses (default: true)
    #[serde(default = "default_true")]
    pub guard_ingress_classes: bool,

    /// Refuse GatewayProxy objects colliding on target and credential (default: true)
    #[serde(default = "default_true")]
    pub gateway_proxy_conflicts: bool,

    /// Warn when a GatewayProxy references a missing Secret or Service (default: true)
    #[serde(default = "default_true")]
    pub gateway_proxy_reference_warnings: bool,
}

fn default_admission_timeout() -> u64 {
    // Matches the API server's default webhook timeoutSeconds
    10
}

fn default_true() -> bool {
    true
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_admission_timeout(),
            guard_gateway_classes: default_true(),
            guard_ingress_classes: default_true(),
            gateway_proxy_conflicts: default_true(),
            gateway_proxy_reference_warnings: default_true(),
        }
    }
}

impl AdmissionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            admission: AdmissionConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from `GATEHOUSE_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(val) = lookup("GATEHOUSE_ADMISSION_TIMEOUT_SECS") {
            let secs: u64 = val.parse().map_err(|e| {
                Error::Config(format!(
                    "GATEHOUSE_ADMISSION_TIMEOUT_SECS must be an integer, got '{}': {}",
                    val, e
                ))
            })?;
            if secs == 0 {
                return Err(Error::Config(
                    "GATEHOUSE_ADMISSION_TIMEOUT_SECS must be at least 1".to_string(),
                ));
            }
            config.admission.timeout_secs = secs;
        }

        let flags: [(&str, &mut bool); 4] = [
            (
                "GATEHOUSE_GUARD_GATEWAY_CLASSES",
                &mut config.admission.guard_gateway_classes,
            ),
            (
                "GATEHOUSE_GUARD_INGRESS_CLASSES",
                &mut config.admission.guard_ingress_classes,
            ),
            (
                "GATEHOUSE_GATEWAY_PROXY_CONFLICTS",
                &mut config.admission.gateway_proxy_conflicts,
            ),
            (
                "GATEHOUSE_GATEWAY_PROXY_REFERENCE_WARNINGS",
                &mut config.admission.gateway_proxy_reference_warnings,
            ),
        ];
        for (name, slot) in flags {
            if let Some(val) = lookup(name) {
                *slot = val.parse().map_err(|e| {
                    Error::Config(format!("{} must be true or false, got '{}': {}", name, val, e))
                })?;
            }
        }

        Ok(config)
    }
}
