//! GatewayClass deletion guard
//!
//! A GatewayClass cannot be deleted while any Gateway names it in
//! `spec.gatewayClassName`.

use crate::webhook::{DeletionGuard, Dependent, KubeLister};
use gateway_api::apis::standard::gateways::Gateway;
use kube::Client;

impl Dependent for Gateway {
    const KIND_PLURAL: &'static str = "Gateways";

    fn referenced_name(&self) -> Option<&str> {
        Some(self.spec.gateway_class_name.as_str())
    }
}

/// Guard backed by a live, cluster-wide Gateway list
pub fn gateway_class_guard(client: Client) -> DeletionGuard<Gateway, KubeLister<Gateway>> {
    DeletionGuard::new(KubeLister::all(client))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::webhook::lister::testing::FakeLister;
    use crate::webhook::Validator;
    use gateway_api::apis::standard::gatewayclasses::{GatewayClass, GatewayClassSpec};
    use gateway_api::apis::standard::gateways::{GatewayListeners, GatewaySpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::ResourceExt;

    fn gateway_class(name: &str) -> GatewayClass {
        GatewayClass {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: GatewayClassSpec {
                controller_name: "gatehouse.io/gateway-controller".to_string(),
                ..Default::default()
            },
            status: None,
        }
    }

    fn gateway(namespace: &str, name: &str, class: &str) -> Gateway {
        Gateway {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: GatewaySpec {
                gateway_class_name: class.to_string(),
                listeners: vec![GatewayListeners {
                    name: "http".to_string(),
                    port: 80,
                    protocol: "HTTP".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            },
            status: None,
        }
    }

    #[tokio::test]
    async fn test_delete_blocked_until_gateway_removed() {
        let gateways = FakeLister::new(Vec::new());
        let guard: DeletionGuard<Gateway, _> = DeletionGuard::new(gateways.clone());
        let class = gateway_class("gatehouse");

        gateways.push(gateway("default", "edge", "gatehouse"));

        let err = guard.validate_delete(&class).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "the GatewayClass is still in using by Gateways: [default/edge]"
        );

        gateways.retain(|gw| gw.name_any() != "edge");
        assert!(guard.validate_delete(&class).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_lists_every_blocking_gateway() {
        let gateways = FakeLister::new(vec![
            gateway("prod", "public", "gatehouse"),
            gateway("default", "internal", "gatehouse"),
            gateway("default", "other", "nginx"),
        ]);
        let guard: DeletionGuard<Gateway, _> = DeletionGuard::new(gateways);

        let err = guard
            .validate_delete(&gateway_class("gatehouse"))
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "the GatewayClass is still in using by Gateways: [default/internal prod/public]"
        );
    }

    #[tokio::test]
    async fn test_gateways_of_other_classes_do_not_block() {
        let gateways = FakeLister::new(vec![gateway("default", "edge", "nginx")]);
        let guard: DeletionGuard<Gateway, _> = DeletionGuard::new(gateways);

        let warnings = guard
            .validate_delete(&gateway_class("gatehouse"))
            .await
            .unwrap();
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn test_list_failure_blocks_deletion() {
        let gateways = FakeLister::<Gateway>::new(Vec::new());
        gateways.fail_with("connection refused");
        let guard: DeletionGuard<Gateway, _> = DeletionGuard::new(gateways);

        let err = guard
            .validate_delete(&gateway_class("gatehouse"))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Kubernetes error: connection refused");
    }

    #[tokio::test]
    async fn test_create_and_update_are_not_guarded() {
        let gateways = FakeLister::new(vec![gateway("default", "edge", "gatehouse")]);
        let guard: DeletionGuard<Gateway, _> = DeletionGuard::new(gateways);
        let class = gateway_class("gatehouse");

        assert!(guard.validate_create(&class).await.unwrap().is_empty());
        assert!(guard.validate_update(&class, &class).await.unwrap().is_empty());
    }
}
