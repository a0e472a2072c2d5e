//! Gatehouse controller library
//!
//! Ownership bookkeeping for translated data-plane configuration and the
//! admission validators that keep cluster state consistent: GatewayClass and
//! IngressClass deletion guards plus GatewayProxy conflict detection.

pub mod apis;
pub mod config;
pub mod error;
pub mod key;
pub mod store;
pub mod sync;
pub mod webhook;

pub use config::{AdmissionConfig, ControllerConfig};
pub use error::{Error, Result};
pub use key::ObjectKey;
pub use store::ConfigStore;
pub use sync::{ConfigSync, DataPlaneClient, SyncOutcome};
pub use webhook::{default_dispatcher, AdmissionDispatcher, Attributes, Decision, GroupKind, Validator};
