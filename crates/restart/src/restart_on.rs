//! Aggregation over a target's restart-on dependencies.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use rekon_core::api::{FileWatch, RestartOnSpec, UiButton};
use rekon_core::{zero_time, NamespacedName, RekonResult, Resource, Timestamp};
use rekon_kubehub::{get_typed, FetchCtx, ObjectStore};
use tracing::{debug, info};

/// Fetches the objects named by a `RestartOnSpec`.
#[derive(Clone)]
pub struct DependencyFetcher {
    store: Arc<dyn ObjectStore>,
}

impl DependencyFetcher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self { Self { store } }

    pub fn store(&self) -> &Arc<dyn ObjectStore> { &self.store }

    /// Every button `spec` names, keyed by name. The first failed fetch
    /// (not-found included) fails the whole call.
    pub async fn buttons(&self, ctx: &FetchCtx, spec: Option<&RestartOnSpec>) -> RekonResult<BTreeMap<String, UiButton>> {
        let names = spec.map(|s| s.ui_buttons.as_slice()).unwrap_or_default();
        self.fetch_all(ctx, names).await
    }

    /// Every file watch `spec` names, keyed by name. Same contract as `buttons`.
    pub async fn file_watches(
        &self,
        ctx: &FetchCtx,
        spec: Option<&RestartOnSpec>,
    ) -> RekonResult<BTreeMap<String, FileWatch>> {
        let names = spec.map(|s| s.file_watches.as_slice()).unwrap_or_default();
        self.fetch_all(ctx, names).await
    }

    async fn fetch_all<T: Resource>(&self, ctx: &FetchCtx, names: &[String]) -> RekonResult<BTreeMap<String, T>> {
        let t0 = Instant::now();
        let mut out = BTreeMap::new();
        for name in names {
            if out.contains_key(name) {
                continue;
            }
            let obj: T = get_typed(self.store.as_ref(), ctx, &NamespacedName::cluster(name)).await?;
            out.insert(name.clone(), obj);
        }
        counter!("restart_deps_fetched", out.len() as u64);
        histogram!("restart_deps_fetch_ms", t0.elapsed().as_secs_f64() * 1000.0);
        if !out.is_empty() {
            info!(kind = T::KIND, count = out.len(), took_ms = %t0.elapsed().as_millis(), "restart: fetched dependencies");
        }
        Ok(out)
    }
}

impl std::fmt::Debug for DependencyFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.debug_struct("DependencyFetcher").finish_non_exhaustive() }
}

/// Most recent restart request across the dependencies `spec` declares. Names missing
/// from the maps are ignored; zero time when nothing ever fired.
pub fn last_restart_event(
    spec: Option<&RestartOnSpec>,
    file_watches: &BTreeMap<String, FileWatch>,
    buttons: &BTreeMap<String, UiButton>,
) -> Timestamp {
    let mut cur = zero_time();
    let Some(spec) = spec else { return cur };

    let watch_times = spec
        .file_watches
        .iter()
        .filter_map(|n| file_watches.get(n))
        .filter_map(|fw| fw.status.last_event_time);
    let click_times = spec.ui_buttons.iter().filter_map(|n| buttons.get(n)).filter_map(|b| b.status.last_clicked_at);

    for t in watch_times.chain(click_times) {
        if t > cur {
            cur = t;
        }
    }
    cur
}

/// Files seen by any declared watcher in events strictly after `since`,
/// deduplicated and sorted. Every event is scanned, not just a recent
/// suffix, so a log that is not perfectly ordered still yields all of them.
pub fn files_changed(spec: Option<&RestartOnSpec>, file_watches: &BTreeMap<String, FileWatch>, since: Timestamp) -> Vec<String> {
    let Some(spec) = spec else { return Vec::new() };
    let mut files = BTreeSet::new();
    for name in &spec.file_watches {
        let Some(fw) = file_watches.get(name) else {
            debug!(file_watch = %name, "restart: file watch missing, skipping");
            continue;
        };
        for event in fw.status.file_events.iter().rev() {
            if event.time > since {
                files.extend(event.seen_files.iter().cloned());
            }
        }
    }
    files.into_iter().collect()
}
