//! Admission and config sync scenarios through the public API
//!
//! Run with: cargo test --test admission_test

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use async_trait::async_trait;
use gatehouse::apis::gatewayproxy::validator::GatewayProxyValidator;
use gatehouse::apis::gatewayproxy::GatewayProxy;
use gatehouse::webhook::{DeletionGuard, ObjectLister};
use gatehouse::{
    AdmissionDispatcher, Attributes, ConfigStore, ConfigSync, DataPlaneClient, GroupKind, Result,
};
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use gateway_api::apis::standard::gateways::Gateway;
use k8s_openapi::api::networking::v1::{Ingress, IngressClass};
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionReview, Operation};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Cluster state the validators list from
struct Cluster<K> {
    objects: Mutex<Vec<K>>,
}

impl<K: Clone> Cluster<K> {
    fn new(objects: Vec<K>) -> Arc<Self> {
        Arc::new(Self {
            objects: Mutex::new(objects),
        })
    }

    fn replace(&self, objects: Vec<K>) {
        *self.objects.lock().unwrap() = objects;
    }
}

#[async_trait]
impl<K: Clone + Send + Sync + 'static> ObjectLister<K> for Cluster<K> {
    async fn list(&self) -> Result<Vec<K>> {
        Ok(self.objects.lock().unwrap().clone())
    }
}

fn dynamic(value: Value) -> DynamicObject {
    serde_json::from_value(value).expect("valid object")
}

fn gateway(namespace: &str, name: &str, class: &str) -> Gateway {
    serde_json::from_value(json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "Gateway",
        "metadata": {"name": name, "namespace": namespace},
        "spec": {
            "gatewayClassName": class,
            "listeners": [{"name": "http", "port": 80, "protocol": "HTTP"}]
        }
    }))
    .expect("valid Gateway")
}

fn gateway_class(name: &str) -> Value {
    json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "GatewayClass",
        "metadata": {"name": name},
        "spec": {"controllerName": "gatehouse.io/gateway-controller"}
    })
}

fn ingress(namespace: &str, name: &str, class: &str) -> Ingress {
    serde_json::from_value(json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "Ingress",
        "metadata": {"name": name, "namespace": namespace},
        "spec": {"ingressClassName": class}
    }))
    .expect("valid Ingress")
}

fn ingress_class(name: &str) -> Value {
    json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "IngressClass",
        "metadata": {"name": name},
        "spec": {"controller": "gatehouse.io/ingress-controller"}
    })
}

fn gateway_proxy(namespace: &str, name: &str, service: &str, secret: &str) -> Value {
    json!({
        "apiVersion": "gatehouse.io/v1alpha1",
        "kind": "GatewayProxy",
        "metadata": {"name": name, "namespace": namespace},
        "spec": {
            "provider": {
                "type": "ControlPlane",
                "controlPlane": {
                    "service": {"name": service, "port": 9180},
                    "auth": {
                        "type": "AdminKey",
                        "adminKey": {"valueFrom": {"secretKeyRef": {"name": secret, "key": "token"}}}
                    }
                }
            }
        }
    })
}

fn delete(kind: GroupKind, old: Value) -> Attributes {
    Attributes {
        kind,
        operation: Operation::Delete,
        object: None,
        old_object: Some(dynamic(old)),
    }
}

fn create(kind: GroupKind, obj: Value) -> Attributes {
    Attributes {
        kind,
        operation: Operation::Create,
        object: Some(dynamic(obj)),
        old_object: None,
    }
}

fn dispatcher(
    gateways: Arc<Cluster<Gateway>>,
    ingresses: Arc<Cluster<Ingress>>,
    proxies: Arc<Cluster<GatewayProxy>>,
) -> AdmissionDispatcher {
    let mut dispatcher = AdmissionDispatcher::new(Duration::from_secs(5));
    dispatcher
        .register::<GatewayClass, _>(DeletionGuard::<Gateway, _>::new(gateways))
        .register::<IngressClass, _>(DeletionGuard::<Ingress, _>::new(ingresses))
        .register::<GatewayProxy, _>(GatewayProxyValidator::new(proxies));
    dispatcher
}

#[tokio::test]
async fn gateway_class_deletion_waits_for_gateways() {
    let gateways = Cluster::new(vec![gateway("default", "edge", "gatehouse")]);
    let dispatcher = dispatcher(gateways.clone(), Cluster::new(Vec::new()), Cluster::new(Vec::new()));
    let kind = GroupKind::of::<GatewayClass>();

    let decision = dispatcher
        .validate(&delete(kind.clone(), gateway_class("gatehouse")))
        .await;
    assert_eq!(
        decision.message(),
        Some("the GatewayClass is still in using by Gateways: [default/edge]")
    );

    gateways.replace(Vec::new());
    let decision = dispatcher.validate(&delete(kind, gateway_class("gatehouse"))).await;
    assert!(decision.is_allowed());
}

#[tokio::test]
async fn ingress_class_deletion_waits_for_ingresses() {
    let ingresses = Cluster::new(vec![
        ingress("web", "shop", "gatehouse"),
        ingress("api", "orders", "gatehouse"),
        ingress("api", "legacy", "nginx"),
    ]);
    let dispatcher = dispatcher(Cluster::new(Vec::new()), ingresses.clone(), Cluster::new(Vec::new()));
    let kind = GroupKind::of::<IngressClass>();

    let decision = dispatcher
        .validate(&delete(kind.clone(), ingress_class("gatehouse")))
        .await;
    assert_eq!(
        decision.message(),
        Some("the IngressClass is still in using by Ingresses: [api/orders web/shop]")
    );

    let decision = dispatcher.validate(&delete(kind, ingress_class("nginx"))).await;
    assert_eq!(
        decision.message(),
        Some("the IngressClass is still in using by Ingresses: [api/legacy]")
    );
}

#[tokio::test]
async fn conflicting_gateway_proxy_is_rejected() {
    let existing: GatewayProxy =
        serde_json::from_value(gateway_proxy("default", "a", "admin", "admin-key")).unwrap();
    let dispatcher = dispatcher(
        Cluster::new(Vec::new()),
        Cluster::new(Vec::new()),
        Cluster::new(vec![existing]),
    );
    let kind = GroupKind::of::<GatewayProxy>();

    let decision = dispatcher
        .validate(&create(kind.clone(), gateway_proxy("default", "b", "admin", "admin-key")))
        .await;
    let message = decision.message().expect("denied");
    assert!(message.contains("default/a"));
    assert!(message.contains("default/b"));
    assert!(message.contains("Service default/admin"));
    assert!(message.contains("AdminKey secret default/admin-key key token"));

    let decision = dispatcher
        .validate(&create(kind, gateway_proxy("default", "b", "admin-2", "admin-key")))
        .await;
    assert!(decision.is_allowed());
}

#[tokio::test]
async fn review_round_trip_denies_with_message() {
    let gateways = Cluster::new(vec![gateway("default", "edge", "gatehouse")]);
    let dispatcher = dispatcher(gateways, Cluster::new(Vec::new()), Cluster::new(Vec::new()));

    let review: AdmissionReview<DynamicObject> = serde_json::from_value(json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
            "kind": {"group": "gateway.networking.k8s.io", "version": "v1", "kind": "GatewayClass"},
            "resource": {"group": "gateway.networking.k8s.io", "version": "v1", "resource": "gatewayclasses"},
            "name": "gatehouse",
            "operation": "DELETE",
            "userInfo": {"username": "admin"},
            "object": null,
            "oldObject": gateway_class("gatehouse"),
            "dryRun": false
        }
    }))
    .expect("valid AdmissionReview");

    let answered = serde_json::to_value(dispatcher.review(review).await).unwrap();
    let response = &answered["response"];

    assert_eq!(response["uid"], "705ab4f5-6393-11e8-b7cc-42010a800002");
    assert_eq!(response["allowed"], false);
    assert!(response.to_string().contains("still in using by Gateways: [default/edge]"));
}

/// Data plane that records what is currently applied
#[derive(Clone, Default)]
struct DataPlane {
    applied: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl DataPlaneClient<String, u32> for DataPlane {
    async fn apply(&self, artifacts: &[(String, u32)]) -> Result<()> {
        let mut applied = self.applied.lock().unwrap();
        for (key, _) in artifacts {
            if !applied.contains(key) {
                applied.push(key.clone());
            }
        }
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        self.applied.lock().unwrap().retain(|k| !keys.contains(k));
        Ok(())
    }
}

#[tokio::test]
async fn route_update_garbage_collects_dropped_artifacts() {
    let plane = DataPlane::default();
    let sync = ConfigSync::new(ConfigStore::new(), plane.clone());
    let route = "default/web".to_string();

    sync.sync(
        route.clone(),
        vec![("route-a".to_string(), 1), ("route-b".to_string(), 1)],
    )
    .await
    .unwrap();

    let outcome = sync
        .sync(route.clone(), vec![("route-a".to_string(), 2)])
        .await
        .unwrap();

    assert_eq!(outcome.removed, vec!["route-b".to_string()]);
    assert_eq!(*plane.applied.lock().unwrap(), vec!["route-a".to_string()]);
    let configs = sync.store().list();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs.get("route-a"), Some(&2));
}
