//! Rekon apply: narrow live objects down to the ones the latest apply created.
//!
//! An `ApplyFilter` is built from the result YAML of an apply (the objects as
//! the cluster returned them, UIDs included). It is immutable; rebuild it on
//! every new apply.

#![forbid(unsafe_code)]

use std::time::Instant;

use metrics::{counter, histogram};
use rekon_core::api::{DiscoveredPod, KubernetesApplyStatus, KubernetesDiscovery};
use rekon_core::{manifest, ManifestLimits, Object, ObjectRef, RekonError, RekonResult};
use rekon_owners::OwnerRefTree;
use serde::Serialize;
use tracing::{debug, info, warn};

mod pod_template;

pub use pod_template::{read_hashes, PodTemplateSpecHash};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyFilter {
    /// Every applied object, in manifest order.
    pub deployed_refs: Vec<ObjectRef>,
    /// Pod template hashes across all applied objects, in discovery order.
    pub pod_template_spec_hashes: Vec<PodTemplateSpecHash>,
}

impl ApplyFilter {
    pub fn new(status: &KubernetesApplyStatus) -> RekonResult<Self> {
        Self::with_limits(status, &ManifestLimits::from_env())
    }

    pub fn with_limits(status: &KubernetesApplyStatus, limits: &ManifestLimits) -> RekonResult<Self> {
        let t0 = Instant::now();
        let res = Self::build(status, limits);
        histogram!("apply_filter_build_ms", t0.elapsed().as_secs_f64() * 1000.0);
        match &res {
            Ok(f) => {
                counter!("apply_filter_ok", 1u64);
                info!(objects = f.deployed_refs.len(), hashes = f.pod_template_spec_hashes.len(), "apply: filter built");
            }
            Err(e) => {
                counter!("apply_filter_err", 1u64);
                warn!(error = %e, "apply: filter build failed");
            }
        }
        res
    }

    fn build(status: &KubernetesApplyStatus, limits: &ManifestLimits) -> RekonResult<Self> {
        let deployed = manifest::parse_yaml(&status.result_yaml, limits)?;
        let mut hashes = Vec::new();
        for entity in &deployed {
            if entity.uid().is_empty() {
                return Err(RekonError::IncompleteApply(entity.to_object_ref().to_string()));
            }
            hashes.extend(read_hashes(entity)?);
        }
        Ok(Self { deployed_refs: deployed.iter().map(|e| e.to_object_ref()).collect(), pod_template_spec_hashes: hashes })
    }

    pub fn is_deployed(&self, uid: &str) -> bool { !uid.is_empty() && self.deployed_refs.iter().any(|r| r.uid == uid) }

    pub fn has_hash(&self, hash: &str) -> bool { self.pod_template_spec_hashes.iter().any(|h| h.as_str() == hash) }

    /// A pod belongs to this apply when its top-most ancestor was deployed by
    /// it and, if both sides know a template hash, the hashes agree.
    pub fn matches_pod(&self, pod: &DiscoveredPod) -> bool {
        if !self.is_deployed(&pod.ancestor_uid) {
            return false;
        }
        if self.pod_template_spec_hashes.is_empty() || pod.pod_template_spec_hash.is_empty() {
            return true;
        }
        self.has_hash(&pod.pod_template_spec_hash)
    }

    /// Whether any object in the ownership tree was deployed by this apply.
    pub fn owns_tree(&self, tree: &OwnerRefTree) -> bool { tree.uids().iter().any(|uid| self.is_deployed(uid)) }
}

/// Discovered pods, optionally narrowed by the apply that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KubernetesResource {
    pub discovery: KubernetesDiscovery,
    pub apply_status: Option<KubernetesApplyStatus>,
    pub apply_filter: Option<ApplyFilter>,
}

impl KubernetesResource {
    pub fn new(discovery: KubernetesDiscovery, apply_status: Option<KubernetesApplyStatus>) -> RekonResult<Self> {
        let apply_filter = apply_status.as_ref().map(ApplyFilter::new).transpose()?;
        Ok(Self { discovery, apply_status, apply_filter })
    }

    /// Pods belonging to the current apply; every discovered pod when there
    /// is no apply to narrow by.
    pub fn filtered_pods(&self) -> Vec<&DiscoveredPod> {
        let pods = &self.discovery.status.pods;
        let Some(filter) = &self.apply_filter else { return pods.iter().collect() };
        let kept: Vec<&DiscoveredPod> = pods.iter().filter(|p| filter.matches_pod(p)).collect();
        if kept.len() != pods.len() {
            debug!(discovery = %self.discovery.metadata.name, kept = kept.len(), total = pods.len(), "apply: pods filtered");
        }
        kept
    }
}
