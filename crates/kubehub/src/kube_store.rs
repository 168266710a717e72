//! kube-rs backed `ObjectStore`.

use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use kube::{
    api::Api,
    core::{ApiResource, DynamicObject, GroupVersionKind},
    discovery::{Discovery, Scope},
    Client,
};
use metrics::{counter, histogram};
use rekon_core::{Entity, NamespacedName, ObjectRef, RekonError, RekonResult, TypeMeta};
use tracing::{debug, info};

use crate::ObjectStore;

/// Cluster client. Discovery runs once at construction; kinds served later
/// (freshly installed CRDs) need a new store.
pub struct KubeStore {
    client: Client,
    discovery: Discovery,
}

impl KubeStore {
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await.context("building kube client")?;
        Self::new(client).await
    }

    pub async fn new(client: Client) -> Result<Self> {
        let t0 = Instant::now();
        let discovery = Discovery::new(client.clone()).run().await.context("running discovery")?;
        info!(groups = discovery.groups().count(), took_ms = %t0.elapsed().as_millis(), "kubehub: discovery ready");
        Ok(Self { client, discovery })
    }

    fn find_api_resource(&self, types: &TypeMeta) -> Result<(ApiResource, bool)> {
        let (group, version) = types.group_version();
        let gvk = GroupVersionKind { group: group.to_string(), version: version.to_string(), kind: types.kind.clone() };
        let (ar, caps) = self
            .discovery
            .resolve_gvk(&gvk)
            .ok_or_else(|| anyhow!("GVK not found: {}/{}/{}", gvk.group, gvk.version, gvk.kind))?;
        Ok((ar, matches!(caps.scope, Scope::Namespaced)))
    }

    fn api_for(&self, types: &TypeMeta, namespace: Option<&str>) -> Result<Api<DynamicObject>> {
        let (ar, namespaced) = self.find_api_resource(types)?;
        let api = if namespaced {
            match namespace {
                Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
                None => Api::default_namespaced_with(self.client.clone(), &ar),
            }
        } else {
            Api::all_with(self.client.clone(), &ar)
        };
        Ok(api)
    }

    async fn fetch(&self, types: &TypeMeta, key: &NamespacedName) -> RekonResult<Entity> {
        let t0 = Instant::now();
        let api = self.api_for(types, key.namespace.as_deref()).map_err(map_err)?;
        let obj = match api.get(&key.name).await {
            Ok(o) => o,
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                counter!("kubehub_get_not_found", 1u64);
                return Err(RekonError::not_found(types.kind.clone(), key.to_string()));
            }
            Err(e) => {
                counter!("kubehub_get_err", 1u64);
                return Err(RekonError::Store(format!("get {} {}: {}", types, key, e)));
            }
        };
        histogram!("kubehub_get_ms", t0.elapsed().as_secs_f64() * 1000.0);
        debug!(kind = %types.kind, key = %key, "kubehub: get ok");
        entity_from(types, obj).map_err(map_err)
    }
}

fn map_err(e: anyhow::Error) -> RekonError { RekonError::Store(format!("{:#}", e)) }

fn entity_from(types: &TypeMeta, obj: DynamicObject) -> Result<Entity> {
    let mut raw = serde_json::to_value(&obj).context("serializing DynamicObject")?;
    // Typed gets may come back without TypeMeta; fill it from the request.
    if let Some(map) = raw.as_object_mut() {
        map.entry("apiVersion").or_insert_with(|| serde_json::Value::String(types.api_version.clone()));
        map.entry("kind").or_insert_with(|| serde_json::Value::String(types.kind.clone()));
        if let Some(meta) = map.get_mut("metadata").and_then(|m| m.as_object_mut()) {
            meta.remove("managedFields");
        }
    }
    Entity::from_json(raw).map_err(|e| anyhow!("{}", e))
}

#[async_trait::async_trait]
impl ObjectStore for KubeStore {
    async fn get(&self, types: &TypeMeta, key: &NamespacedName) -> RekonResult<Entity> { self.fetch(types, key).await }

    async fn get_by_reference(&self, reference: &ObjectRef) -> RekonResult<Entity> {
        self.fetch(&reference.type_meta(), &reference.namespaced_name()).await
    }
}
