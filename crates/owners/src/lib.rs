//! Rekon owners – resolve an object's ownership ancestry into a tree.
//!
//! Trees are cached by UID for the life of the fetcher (or until evicted).
//! A cached tree is a snapshot taken at first resolution; later changes to
//! an owner are not observed. Two concurrent resolutions of the same
//! uncached UID may both do the fetch work; only completed trees are cached.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt};
use metrics::{counter, histogram};
use rekon_core::{Object, ObjectRef, OwnerReference, RekonError, RekonResult};
use rekon_kubehub::{FetchCtx, ObjectStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

mod cache;

pub use cache::{EvictionPolicy, TreeCache};

/// One object and every owner transitively reachable from it. `owners`
/// keeps the declaration order of the object's owner references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRefTree {
    #[serde(rename = "ref")]
    pub reference: ObjectRef,
    #[serde(default)]
    pub owners: Vec<OwnerRefTree>,
}

impl OwnerRefTree {
    pub fn leaf(reference: ObjectRef) -> Self { Self { reference, owners: Vec::new() } }

    /// Pre-order: this object's UID, then each owner subtree depth-first.
    pub fn uids(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_uids(&mut out);
        out
    }

    fn collect_uids(&self, out: &mut Vec<String>) {
        out.push(self.reference.uid.clone());
        for owner in &self.owners {
            owner.collect_uids(out);
        }
    }

    /// Number of objects in the tree, the root included.
    pub fn node_count(&self) -> usize { 1 + self.owners.iter().map(|o| o.node_count()).sum::<usize>() }

    /// Top-most ancestors: nodes with no owners of their own.
    pub fn roots(&self) -> Vec<&ObjectRef> {
        if self.owners.is_empty() {
            return vec![&self.reference];
        }
        self.owners.iter().flat_map(|o| o.roots()).collect()
    }

    fn lines(&self) -> Vec<String> {
        let mut out = vec![format!("{}:{}", self.reference.kind, self.reference.name)];
        for owner in &self.owners {
            for line in owner.lines() {
                out.push(format!("  {}", line));
            }
        }
        out
    }
}

impl std::fmt::Display for OwnerRefTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(&self.lines().join("\n")) }
}

/// Resolves owner trees through an explicit store handle. Clones share the cache.
#[derive(Clone)]
pub struct OwnerFetcher {
    store: Arc<dyn ObjectStore>,
    cache: Arc<TreeCache>,
}

impl OwnerFetcher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self { Self::with_policy(store, EvictionPolicy::Unbounded) }

    pub fn with_policy(store: Arc<dyn ObjectStore>, policy: EvictionPolicy) -> Self {
        Self { store, cache: Arc::new(TreeCache::new(policy)) }
    }

    pub fn cache(&self) -> &TreeCache { &self.cache }

    /// Resolve the ancestry of the object `reference` points at. The object
    /// itself is fetched unless its tree is already cached.
    pub async fn resolve_owner_tree(&self, ctx: &FetchCtx, reference: &ObjectRef) -> RekonResult<OwnerRefTree> {
        let t0 = Instant::now();
        if reference.uid.is_empty() {
            return Err(RekonError::NotDeployed(reference.to_string()));
        }
        let mut path = Vec::new();
        let res = self.resolve_ref(ctx, reference.clone(), &mut path).await;
        self.record(reference, &res, t0);
        res
    }

    /// Resolve the ancestry of an object the caller already holds.
    pub async fn owner_tree_of(&self, ctx: &FetchCtx, obj: &(dyn Object + Sync)) -> RekonResult<OwnerRefTree> {
        let t0 = Instant::now();
        let reference = obj.to_object_ref();
        if reference.uid.is_empty() {
            return Err(RekonError::NotDeployed(reference.to_string()));
        }
        if let Some(tree) = self.cached(&reference.uid) {
            return Ok(tree);
        }
        let mut path = Vec::new();
        let res = self.resolve_object(ctx, reference.clone(), obj.owner_references().to_vec(), &mut path).await;
        self.record(&reference, &res, t0);
        res
    }

    fn record(&self, reference: &ObjectRef, res: &RekonResult<OwnerRefTree>, t0: Instant) {
        histogram!("owners_resolve_ms", t0.elapsed().as_secs_f64() * 1000.0);
        match res {
            Ok(tree) => info!(object = %reference, nodes = tree.node_count(), took_ms = %t0.elapsed().as_millis(), "owners: resolve ok"),
            Err(e) => warn!(object = %reference, error = %e, "owners: resolve failed"),
        }
    }

    fn cached(&self, uid: &str) -> Option<OwnerRefTree> {
        let hit = self.cache.get(uid);
        if hit.is_some() { counter!("owners_cache_hit", 1u64); } else { counter!("owners_cache_miss", 1u64); }
        hit
    }

    fn resolve_ref<'a>(
        &'a self,
        ctx: &'a FetchCtx,
        reference: ObjectRef,
        path: &'a mut Vec<String>,
    ) -> BoxFuture<'a, RekonResult<OwnerRefTree>> {
        async move {
            // Owner references may omit the uid; those are looked up by name
            // and take whatever object currently holds it.
            let pinned = !reference.uid.is_empty();
            if pinned {
                if let Some(tree) = self.cached(&reference.uid) {
                    return Ok(tree);
                }
            }
            let entity = ctx.run(self.store.get_by_reference(&reference)).await?;
            if entity.uid().is_empty() {
                return Err(RekonError::NotDeployed(reference.to_string()));
            }
            if pinned && entity.uid() != reference.uid {
                // The name now belongs to a different object; the reference is stale.
                debug!(object = %reference, live_uid = %entity.uid(), "owners: uid mismatch");
                return Err(RekonError::not_found(reference.kind.clone(), reference.name.clone()));
            }
            if !pinned {
                if let Some(tree) = self.cached(entity.uid()) {
                    return Ok(tree);
                }
            }
            let owners = entity.owner_references().to_vec();
            self.resolve_object(ctx, entity.to_object_ref(), owners, path).await
        }
        .boxed()
    }

    fn resolve_object<'a>(
        &'a self,
        ctx: &'a FetchCtx,
        reference: ObjectRef,
        owners: Vec<OwnerReference>,
        path: &'a mut Vec<String>,
    ) -> BoxFuture<'a, RekonResult<OwnerRefTree>> {
        async move {
            if path.contains(&reference.uid) {
                let mut chain = path.clone();
                chain.push(reference.uid.clone());
                return Err(RekonError::CyclicOwnership(chain.join(" -> ")));
            }
            path.push(reference.uid.clone());

            let namespace = reference.namespace.clone();
            let mut tree = OwnerRefTree::leaf(reference);
            for owner in &owners {
                let owner_ref = owner.to_object_ref(namespace.as_deref());
                match self.resolve_ref(ctx, owner_ref, path).await {
                    Ok(t) => tree.owners.push(t),
                    Err(e) if e.is_not_found() => {
                        debug!(owner = %owner.name, kind = %owner.kind, child = %tree.reference.name, "owners: owner gone, skipping");
                    }
                    Err(e) => return Err(e),
                }
            }

            path.pop();
            self.cache.insert(tree.reference.uid.clone(), tree.clone());
            Ok(tree)
        }
        .boxed()
    }
}

impl std::fmt::Debug for OwnerFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerFetcher").field("cache", &self.cache).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(kind: &str, name: &str, uid: &str) -> ObjectRef {
        ObjectRef { api_version: "v1".into(), kind: kind.into(), namespace: Some("default".into()), name: name.into(), uid: uid.into() }
    }

    fn sample() -> OwnerRefTree {
        OwnerRefTree {
            reference: r("Pod", "web-abc", "x"),
            owners: vec![OwnerRefTree {
                reference: r("ReplicaSet", "web-7f", "y"),
                owners: vec![OwnerRefTree::leaf(r("Deployment", "web", "z"))],
            }],
        }
    }

    #[test]
    fn uids_are_pre_order() {
        assert_eq!(sample().uids(), vec!["x", "y", "z"]);
    }

    #[test]
    fn uids_visit_sibling_branches_depth_first() {
        let t = OwnerRefTree {
            reference: r("Pod", "p", "p"),
            owners: vec![
                OwnerRefTree { reference: r("A", "a", "a"), owners: vec![OwnerRefTree::leaf(r("A2", "a2", "a2"))] },
                OwnerRefTree::leaf(r("B", "b", "b")),
            ],
        };
        assert_eq!(t.uids(), vec!["p", "a", "a2", "b"]);
        assert_eq!(t.node_count(), 4);
        assert_eq!(t.roots().iter().map(|r| r.uid.as_str()).collect::<Vec<_>>(), vec!["a2", "b"]);
    }

    #[test]
    fn display_indents_each_level() {
        assert_eq!(sample().to_string(), "Pod:web-abc\n  ReplicaSet:web-7f\n    Deployment:web");
    }
}
