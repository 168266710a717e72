//! Rekon kubehub – the object store seam the reconcilers read through.
//!
//! `ObjectStore` is the only I/O boundary: get-by-name and get-by-reference,
//! with not-found kept distinct from every other failure. Every fetch a
//! reconciler performs is raced against a `FetchCtx` so a pass can be
//! canceled or bounded by a deadline.

#![forbid(unsafe_code)]

use std::future::Future;
use std::time::Duration;

use rekon_core::{Entity, NamespacedName, ObjectRef, RekonError, RekonResult, Resource, TypeMeta};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

mod kube_store;
mod mem;

pub use kube_store::KubeStore;
pub use mem::MemStore;

/// Typed get-by-name and get-by-reference against a cluster-style API.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, types: &TypeMeta, key: &NamespacedName) -> RekonResult<Entity>;

    async fn get_by_reference(&self, reference: &ObjectRef) -> RekonResult<Entity>;
}

/// Fetch a typed resource by name under `ctx`.
pub async fn get_typed<T: Resource>(store: &dyn ObjectStore, ctx: &FetchCtx, key: &NamespacedName) -> RekonResult<T> {
    let entity = ctx.run(store.get(&T::type_meta(), key)).await?;
    entity.decode::<T>()
}

/// Cancellation signal plus optional deadline shared by one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct FetchCtx {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl FetchCtx {
    pub fn new() -> Self { Self::default() }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { cancel: CancellationToken::new(), deadline: Some(Instant::now() + timeout) }
    }

    pub fn with_deadline(deadline: Instant) -> Self { Self { cancel: CancellationToken::new(), deadline: Some(deadline) } }

    /// Derived context: canceled with its parent, deadline never later than the parent's.
    pub fn child(&self, timeout: Option<Duration>) -> Self {
        let own = timeout.map(|t| Instant::now() + t);
        let deadline = match (self.deadline, own) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self { cancel: self.cancel.child_token(), deadline }
    }

    pub fn cancel(&self) { self.cancel.cancel(); }

    pub fn is_canceled(&self) -> bool { self.cancel.is_cancelled() }

    pub fn deadline(&self) -> Option<Instant> { self.deadline }

    /// Run one fetch; the fetch future is dropped as soon as the context is
    /// canceled or the deadline passes.
    pub async fn run<T, F>(&self, fut: F) -> RekonResult<T>
    where
        F: Future<Output = RekonResult<T>>,
    {
        if self.cancel.is_cancelled() { return Err(RekonError::Canceled); }
        if let Some(d) = self.deadline {
            if Instant::now() >= d { return Err(RekonError::DeadlineExceeded); }
        }
        match self.deadline {
            Some(d) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(RekonError::Canceled),
                _ = tokio::time::sleep_until(d) => Err(RekonError::DeadlineExceeded),
                res = fut => res,
            },
            None => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(RekonError::Canceled),
                res = fut => res,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rekon_core::api::ConfigMap;

    #[tokio::test]
    async fn run_passes_results_through() {
        let ctx = FetchCtx::new();
        assert_eq!(ctx.run(async { Ok::<_, RekonError>(7) }).await.unwrap(), 7);
        let err = ctx.run(async { Err::<u8, _>(RekonError::not_found("X", "y")) }).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn canceled_context_fails_fast() {
        let ctx = FetchCtx::new();
        ctx.cancel();
        let err = ctx.run(std::future::pending::<RekonResult<()>>()).await.unwrap_err();
        assert_eq!(err, RekonError::Canceled);
    }

    #[tokio::test]
    async fn cancel_interrupts_in_flight_fetch() {
        let ctx = FetchCtx::new();
        let child = ctx.child(None);
        let handle = tokio::spawn(async move { child.run(std::future::pending::<RekonResult<()>>()).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        ctx.cancel();
        let res = tokio::time::timeout(Duration::from_secs(1), handle).await.expect("fetch did not stop").unwrap();
        assert_eq!(res.unwrap_err(), RekonError::Canceled);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_exceeded_is_distinct() {
        let ctx = FetchCtx::with_timeout(Duration::from_millis(50));
        let err = ctx.run(std::future::pending::<RekonResult<()>>()).await.unwrap_err();
        assert_eq!(err, RekonError::DeadlineExceeded);
    }

    #[test]
    fn child_keeps_earliest_deadline() {
        let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
        rt.block_on(async {
            let parent = FetchCtx::with_timeout(Duration::from_millis(10));
            let child = parent.child(Some(Duration::from_secs(60)));
            assert_eq!(child.deadline(), parent.deadline());
        });
    }

    #[tokio::test]
    async fn get_typed_decodes_through_the_store() {
        let store = MemStore::new();
        store.insert_json(serde_json::json!({
            "apiVersion": "v1", "kind": "ConfigMap",
            "metadata": {"name": "q"},
            "data": {"t1": "my-target"}
        })).unwrap();
        let cm: ConfigMap = get_typed(&store, &FetchCtx::new(), &NamespacedName::cluster("q")).await.unwrap();
        assert_eq!(cm.data.get("t1").map(String::as_str), Some("my-target"));
    }
}
