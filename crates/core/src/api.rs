//! Data shapes of the resources the reconcilers read. Pure data; behavior
//! lives in the crates that consume them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Object, ObjectMeta, Resource, Timestamp};

pub const GROUP_VERSION: &str = "rekon.dev/v1alpha1";

/// Label carrying the content hash of a pod template, stamped at apply time.
pub const POD_TEMPLATE_HASH_LABEL: &str = "rekon.dev/pod-template-hash";

/// Named dependencies of a target that should restart it when they fire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RestartOnSpec {
    #[serde(default)]
    pub file_watches: Vec<String>,
    #[serde(default)]
    pub ui_buttons: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileEvent {
    pub time: Timestamp,
    #[serde(default)]
    pub seen_files: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileWatchStatus {
    #[serde(default)]
    pub last_event_time: Option<Timestamp>,
    /// Append-only, oldest first.
    #[serde(default)]
    pub file_events: Vec<FileEvent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileWatchSpec {
    #[serde(default)]
    pub watched_paths: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileWatch {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: FileWatchSpec,
    #[serde(default)]
    pub status: FileWatchStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UiButtonStatus {
    #[serde(default)]
    pub last_clicked_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UiButton {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: UiButtonStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMap {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesApplyStatus {
    /// The manifests as they came back from the cluster, UIDs included.
    #[serde(default, rename = "resultYAML", alias = "resultYaml")]
    pub result_yaml: String,
    #[serde(default)]
    pub last_apply_time: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// A pod observed by discovery, annotated with the UID of its top-most
/// deployed ancestor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredPod {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default, rename = "ancestorUID", alias = "ancestorUid")]
    pub ancestor_uid: String,
    #[serde(default)]
    pub pod_template_spec_hash: String,
    #[serde(default)]
    pub phase: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesDiscoveryStatus {
    #[serde(default)]
    pub pods: Vec<DiscoveredPod>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesDiscovery {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: KubernetesDiscoveryStatus,
}

impl Object for FileWatch {
    fn api_version(&self) -> &str { GROUP_VERSION }
    fn kind(&self) -> &str { Self::KIND }
    fn meta(&self) -> &ObjectMeta { &self.metadata }
}

impl Resource for FileWatch {
    const API_VERSION: &'static str = GROUP_VERSION;
    const KIND: &'static str = "FileWatch";
}

impl Object for UiButton {
    fn api_version(&self) -> &str { GROUP_VERSION }
    fn kind(&self) -> &str { Self::KIND }
    fn meta(&self) -> &ObjectMeta { &self.metadata }
}

impl Resource for UiButton {
    const API_VERSION: &'static str = GROUP_VERSION;
    const KIND: &'static str = "UIButton";
}

impl Object for ConfigMap {
    fn api_version(&self) -> &str { Self::API_VERSION }
    fn kind(&self) -> &str { Self::KIND }
    fn meta(&self) -> &ObjectMeta { &self.metadata }
}

impl Resource for ConfigMap {
    const API_VERSION: &'static str = "v1";
    const KIND: &'static str = "ConfigMap";
}

impl Object for KubernetesDiscovery {
    fn api_version(&self) -> &str { GROUP_VERSION }
    fn kind(&self) -> &str { Self::KIND }
    fn meta(&self) -> &ObjectMeta { &self.metadata }
}

impl Resource for KubernetesDiscovery {
    const API_VERSION: &'static str = GROUP_VERSION;
    const KIND: &'static str = "KubernetesDiscovery";
}
