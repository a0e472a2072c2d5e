//! Gateway API support (v1)
//!
//! - GatewayClass: refuses deletion while Gateways still reference it

pub mod gateway_class;
