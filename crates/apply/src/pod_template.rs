//! Pod template discovery inside applied objects.

use rekon_core::api::POD_TEMPLATE_HASH_LABEL;
use rekon_core::{Entity, Object, RekonError, RekonResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Content hash stamped on a pod template at apply time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PodTemplateSpecHash(pub String);

impl PodTemplateSpecHash {
    pub fn as_str(&self) -> &str { &self.0 }
}

impl std::fmt::Display for PodTemplateSpecHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

/// Hashes of every pod template embedded in `entity`, in discovery order.
///
/// A pod template is any object under a `template` key whose
/// `spec.containers` is an array. That covers Deployment, ReplicaSet,
/// StatefulSet, DaemonSet, Job and CronJob (`jobTemplate.spec.template`).
pub fn read_hashes(entity: &Entity) -> RekonResult<Vec<PodTemplateSpecHash>> {
    let mut out = Vec::new();
    walk(&entity.raw, entity, &mut out)?;
    Ok(out)
}

fn walk(v: &Json, entity: &Entity, out: &mut Vec<PodTemplateSpecHash>) -> RekonResult<()> {
    match v {
        Json::Object(map) => {
            for (k, child) in map {
                if k == "template" && is_pod_template(child) {
                    out.push(hash_label(child, entity)?);
                    continue;
                }
                walk(child, entity, out)?;
            }
        }
        Json::Array(items) => {
            for child in items {
                walk(child, entity, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn is_pod_template(v: &Json) -> bool {
    v.get("spec").and_then(|s| s.get("containers")).map(Json::is_array).unwrap_or(false)
}

fn hash_label(template: &Json, entity: &Entity) -> RekonResult<PodTemplateSpecHash> {
    let hash = template
        .get("metadata")
        .and_then(|m| m.get("labels"))
        .and_then(|l| l.get(POD_TEMPLATE_HASH_LABEL))
        .and_then(Json::as_str)
        .filter(|s| !s.is_empty());
    match hash {
        Some(h) => Ok(PodTemplateSpecHash(h.to_string())),
        None => Err(RekonError::TemplateHash(format!(
            "{} {}: pod template has no {} label",
            entity.kind(),
            entity.metadata.name,
            POD_TEMPLATE_HASH_LABEL
        ))),
    }
}
