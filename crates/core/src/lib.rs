//! Rekon core types: object references, metadata, the `Object` capability,
//! build reasons and the shared error taxonomy.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub mod api;
pub mod config;
pub mod error;
pub mod manifest;
pub mod reason;

pub use config::{Config, ManifestLimits};
pub use error::{RekonError, RekonResult};
pub use reason::BuildReason;

pub type Timestamp = DateTime<Utc>;

/// The timestamp used when no dependency ever fired.
pub fn zero_time() -> Timestamp { DateTime::<Utc>::MIN_UTC }

pub mod prelude {
    pub use super::{
        zero_time, BuildReason, Entity, NamespacedName, Object, ObjectMeta, ObjectRef, OwnerReference, RekonError,
        RekonResult, Timestamp, TypeMeta,
    };
}

/// Reference to a live (or to-be-live) object. An empty `uid` means the object
/// has not been materialized in the cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default)]
    pub uid: String,
}

impl ObjectRef {
    pub fn type_meta(&self) -> TypeMeta {
        TypeMeta { api_version: self.api_version.clone(), kind: self.kind.clone() }
    }

    pub fn namespaced_name(&self) -> NamespacedName {
        NamespacedName { namespace: self.namespace.clone(), name: self.name.clone() }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{} {}/{}", self.api_version, self.kind, ns, self.name),
            None => write!(f, "{}/{} {}", self.api_version, self.kind, self.name),
        }
    }
}

/// Parent pointer recorded on a child object (`metadata.ownerReferences[]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<bool>,
}

impl OwnerReference {
    /// Owner references carry no namespace; owners live in the child's namespace.
    pub fn to_object_ref(&self, namespace: Option<&str>) -> ObjectRef {
        ObjectRef {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            namespace: namespace.map(|s| s.to_string()),
            name: self.name.clone(),
            uid: self.uid.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct TypeMeta {
    pub api_version: String,
    pub kind: String,
}

impl TypeMeta {
    pub fn new(api_version: &str, kind: &str) -> Self {
        Self { api_version: api_version.to_string(), kind: kind.to_string() }
    }

    /// Split `apiVersion` into `(group, version)`; core kinds have an empty group.
    pub fn group_version(&self) -> (&str, &str) {
        match self.api_version.split_once('/') {
            Some((g, v)) => (g, v),
            None => ("", self.api_version.as_str()),
        }
    }
}

impl std::fmt::Display for TypeMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.api_version, self.kind)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NamespacedName {
    pub namespace: Option<String>,
    pub name: String,
}

impl NamespacedName {
    pub fn cluster(name: &str) -> Self { Self { namespace: None, name: name.to_string() } }

    pub fn namespaced(namespace: &str, name: &str) -> Self {
        Self { namespace: Some(namespace.to_string()), name: name.to_string() }
    }
}

impl std::fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Most objects have at most one owner.
    #[serde(default, skip_serializing_if = "SmallVec::is_empty")]
    pub owner_references: SmallVec<[OwnerReference; 1]>,
}

/// Capability shared by everything the store can return: type identity,
/// metadata (namespace, UID, owner references) and a reference projection.
pub trait Object {
    fn api_version(&self) -> &str;
    fn kind(&self) -> &str;
    fn meta(&self) -> &ObjectMeta;

    fn uid(&self) -> &str { self.meta().uid.as_deref().unwrap_or("") }

    fn namespace(&self) -> Option<&str> { self.meta().namespace.as_deref() }

    fn owner_references(&self) -> &[OwnerReference] { &self.meta().owner_references }

    fn to_object_ref(&self) -> ObjectRef {
        let meta = self.meta();
        ObjectRef {
            api_version: self.api_version().to_string(),
            kind: self.kind().to_string(),
            namespace: meta.namespace.clone(),
            name: meta.name.clone(),
            uid: self.uid().to_string(),
        }
    }
}

/// A typed resource that can be fetched by name.
pub trait Resource: Object + serde::de::DeserializeOwned {
    const API_VERSION: &'static str;
    const KIND: &'static str;

    fn type_meta() -> TypeMeta { TypeMeta::new(Self::API_VERSION, Self::KIND) }
}

/// An untyped object: either a live object returned by the store or one
/// document of a parsed manifest. `raw` keeps the full JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub types: TypeMeta,
    pub metadata: ObjectMeta,
    pub raw: serde_json::Value,
}

impl Entity {
    pub fn from_json(raw: serde_json::Value) -> RekonResult<Self> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Header {
            #[serde(default)]
            api_version: String,
            #[serde(default)]
            kind: String,
            #[serde(default)]
            metadata: ObjectMeta,
        }
        let h: Header = serde_json::from_value(raw.clone())
            .map_err(|e| RekonError::Parse(format!("decoding object header: {}", e)))?;
        Ok(Self { types: TypeMeta { api_version: h.api_version, kind: h.kind }, metadata: h.metadata, raw })
    }

    /// Decode the full body into a typed resource.
    pub fn decode<T: Resource>(&self) -> RekonResult<T> {
        serde_json::from_value(self.raw.clone())
            .map_err(|e| RekonError::Parse(format!("decoding {} {}: {}", T::KIND, self.metadata.name, e)))
    }
}

impl Object for Entity {
    fn api_version(&self) -> &str { &self.types.api_version }
    fn kind(&self) -> &str { &self.types.kind }
    fn meta(&self) -> &ObjectMeta { &self.metadata }
}
