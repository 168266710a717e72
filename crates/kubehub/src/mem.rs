//! In-memory `ObjectStore`, used for YAML fixtures and tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use rekon_core::{manifest, Entity, ManifestLimits, NamespacedName, Object, ObjectRef, RekonError, RekonResult, TypeMeta};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::ObjectStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    types: TypeMeta,
    namespace: Option<String>,
    name: String,
}

/// Objects keyed by type, namespace and name. Counts every fetch so tests can
/// assert on I/O, and can be told to fail fetches for specific names.
#[derive(Default)]
pub struct MemStore {
    objects: RwLock<FxHashMap<Key, Entity>>,
    failures: RwLock<FxHashMap<String, String>>,
    fetches: AtomicUsize,
}

impl MemStore {
    pub fn new() -> Self { Self::default() }

    /// Load every document of a YAML stream.
    pub fn from_yaml(yaml: &str) -> RekonResult<Self> {
        let store = Self::new();
        for e in manifest::parse_yaml(yaml, &ManifestLimits::from_env())? {
            store.insert(e);
        }
        Ok(store)
    }

    pub fn insert(&self, e: Entity) {
        let key = Key { types: e.types.clone(), namespace: e.metadata.namespace.clone(), name: e.metadata.name.clone() };
        self.objects.write().insert(key, e);
    }

    pub fn insert_json(&self, raw: serde_json::Value) -> RekonResult<()> {
        self.insert(Entity::from_json(raw)?);
        Ok(())
    }

    pub fn remove(&self, types: &TypeMeta, key: &NamespacedName) -> Option<Entity> {
        let k = Key { types: types.clone(), namespace: key.namespace.clone(), name: key.name.clone() };
        self.objects.write().remove(&k)
    }

    /// Fail any fetch of an object with this name with a store error.
    pub fn fail_on(&self, name: &str, message: &str) { self.failures.write().insert(name.to_string(), message.to_string()); }

    pub fn clear_failures(&self) { self.failures.write().clear(); }

    pub fn fetch_count(&self) -> usize { self.fetches.load(Ordering::SeqCst) }

    pub fn len(&self) -> usize { self.objects.read().len() }

    pub fn is_empty(&self) -> bool { self.objects.read().is_empty() }

    fn lookup(&self, types: &TypeMeta, key: &NamespacedName) -> RekonResult<Entity> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = self.failures.read().get(&key.name) {
            return Err(RekonError::Store(msg.clone()));
        }
        let k = Key { types: types.clone(), namespace: key.namespace.clone(), name: key.name.clone() };
        match self.objects.read().get(&k) {
            Some(e) => Ok(e.clone()),
            None => {
                debug!(kind = %types.kind, key = %key, "memstore: not found");
                Err(RekonError::not_found(types.kind.clone(), key.to_string()))
            }
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemStore {
    async fn get(&self, types: &TypeMeta, key: &NamespacedName) -> RekonResult<Entity> { self.lookup(types, key) }

    async fn get_by_reference(&self, reference: &ObjectRef) -> RekonResult<Entity> {
        self.lookup(&reference.type_meta(), &reference.namespaced_name())
    }
}

impl std::fmt::Debug for MemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let objects = self.objects.read();
        let mut refs: Vec<String> = objects.values().map(|e| e.to_object_ref().to_string()).collect();
        refs.sort();
        f.debug_struct("MemStore").field("objects", &refs).field("fetches", &self.fetch_count()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
apiVersion: apps/v1
kind: ReplicaSet
metadata:
  name: web-7f
  namespace: default
  uid: rs-uid
---
apiVersion: v1
kind: Namespace
metadata:
  name: default
  uid: ns-uid
"#;

    #[tokio::test]
    async fn fetches_by_name_and_reference() {
        let store = MemStore::from_yaml(FIXTURE).unwrap();
        assert_eq!(store.len(), 2);
        let rs = store
            .get(&TypeMeta::new("apps/v1", "ReplicaSet"), &NamespacedName::namespaced("default", "web-7f"))
            .await
            .unwrap();
        assert_eq!(rs.uid(), "rs-uid");
        let ns = store
            .get_by_reference(&ObjectRef { api_version: "v1".into(), kind: "Namespace".into(), name: "default".into(), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(ns.uid(), "ns-uid");
        assert_eq!(store.fetch_count(), 2);
    }

    #[tokio::test]
    async fn namespace_is_part_of_identity() {
        let store = MemStore::from_yaml(FIXTURE).unwrap();
        let err = store
            .get(&TypeMeta::new("apps/v1", "ReplicaSet"), &NamespacedName::namespaced("other", "web-7f"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn injected_failures_are_store_errors() {
        let store = MemStore::from_yaml(FIXTURE).unwrap();
        store.fail_on("web-7f", "connection reset");
        let err = store
            .get(&TypeMeta::new("apps/v1", "ReplicaSet"), &NamespacedName::namespaced("default", "web-7f"))
            .await
            .unwrap_err();
        assert_eq!(err, RekonError::Store("connection reset".into()));
        store.clear_failures();
        assert!(store
            .get(&TypeMeta::new("apps/v1", "ReplicaSet"), &NamespacedName::namespaced("default", "web-7f"))
            .await
            .is_ok());
    }
}
