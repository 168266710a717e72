#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use rekon_core::api::{FileEvent, FileWatch, FileWatchStatus, RestartOnSpec, GROUP_VERSION};
use rekon_core::{zero_time, BuildReason, RekonError, Timestamp};
use rekon_kubehub::{FetchCtx, MemStore};
use rekon_restart::{files_changed, DependencyFetcher, RestartChecker, TriggerQueue};

fn t(secs: i64) -> Timestamp { Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap() }

fn rfc(secs: i64) -> String { t(secs).to_rfc3339() }

fn spec(fws: &[&str], buttons: &[&str]) -> RestartOnSpec {
    RestartOnSpec {
        file_watches: fws.iter().map(|s| s.to_string()).collect(),
        ui_buttons: buttons.iter().map(|s| s.to_string()).collect(),
    }
}

fn store() -> Arc<MemStore> {
    let store = MemStore::new();
    store
        .insert_json(serde_json::json!({
            "apiVersion": GROUP_VERSION, "kind": "FileWatch",
            "metadata": {"name": "fw1"},
            "status": {
                "lastEventTime": rfc(3),
                "fileEvents": [
                    {"time": rfc(1), "seenFiles": ["a"]},
                    {"time": rfc(3), "seenFiles": ["b", "a"]}
                ]
            }
        }))
        .unwrap();
    store
        .insert_json(serde_json::json!({
            "apiVersion": GROUP_VERSION, "kind": "UIButton",
            "metadata": {"name": "restart"},
            "status": {"lastClickedAt": rfc(5)}
        }))
        .unwrap();
    Arc::new(store)
}

fn queue_config_map(store: &MemStore, data: serde_json::Value) {
    store
        .insert_json(serde_json::json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "trigger-queue"}, "data": data}))
        .unwrap();
}

#[tokio::test]
async fn changed_files_since_a_build() {
    let store = store();
    let deps = DependencyFetcher::new(store);
    let s = spec(&["fw1"], &[]);
    let fws = deps.file_watches(&FetchCtx::new(), Some(&s)).await.unwrap();
    assert_eq!(files_changed(Some(&s), &fws, t(2)), vec!["a", "b"]);
}

#[tokio::test]
async fn duplicate_names_are_fetched_once() {
    let store = store();
    let deps = DependencyFetcher::new(store.clone());
    let s = spec(&["fw1", "fw1"], &["restart", "restart"]);
    let ctx = FetchCtx::new();
    assert_eq!(deps.file_watches(&ctx, Some(&s)).await.unwrap().len(), 1);
    assert_eq!(deps.buttons(&ctx, Some(&s)).await.unwrap().len(), 1);
    assert_eq!(store.fetch_count(), 2);
}

#[tokio::test]
async fn no_spec_fetches_nothing() {
    let store = store();
    let deps = DependencyFetcher::new(store.clone());
    assert!(deps.file_watches(&FetchCtx::new(), None).await.unwrap().is_empty());
    assert!(deps.buttons(&FetchCtx::new(), None).await.unwrap().is_empty());
    assert_eq!(store.fetch_count(), 0);
}

#[tokio::test]
async fn missing_dependency_is_an_error() {
    let deps = DependencyFetcher::new(store());
    let err = deps.buttons(&FetchCtx::new(), Some(&spec(&[], &["restart", "ghost"]))).await.unwrap_err();
    assert!(err.is_not_found());
    let err = deps.file_watches(&FetchCtx::new(), Some(&spec(&["ghost"], &[]))).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn queued_target_reports_its_reason() {
    let store = store();
    queue_config_map(&store, serde_json::json!({"t1": "my-target", "t1-reason-code": "4"}));
    let q = TriggerQueue::fetch(store.as_ref(), &FetchCtx::new(), "trigger-queue").await.unwrap();
    assert!(q.is_queued("my-target"));
    assert_eq!(q.reason_for("my-target"), BuildReason::CRASH);
}

#[tokio::test]
async fn absent_queue_is_empty_but_store_errors_surface() {
    let store = store();
    let q = TriggerQueue::fetch(store.as_ref(), &FetchCtx::new(), "trigger-queue").await.unwrap();
    assert!(q.is_empty());
    assert_eq!(q.reason_for("anything"), BuildReason::NONE);

    store.fail_on("trigger-queue", "apiserver unavailable");
    let err = TriggerQueue::fetch(store.as_ref(), &FetchCtx::new(), "trigger-queue").await.unwrap_err();
    assert_eq!(err, RekonError::Store("apiserver unavailable".into()));
}

#[tokio::test]
async fn checker_combines_queue_watches_and_buttons() {
    let store = store();
    queue_config_map(&store, serde_json::json!({"t1": "api", "t1-reason-code": "32"}));
    let checker = RestartChecker::new(DependencyFetcher::new(store), "trigger-queue");
    let s = spec(&["fw1"], &["restart"]);

    let d = checker.check(&FetchCtx::new(), "api", Some(&s), t(2)).await.unwrap().unwrap();
    assert_eq!(d.reason, BuildReason::TRIGGER_CLI | BuildReason::CHANGED_FILES | BuildReason::TRIGGER_WEB);
    assert_eq!(d.changed_files, vec!["a", "b"]);
    assert_eq!(d.last_event, t(5));
}

#[tokio::test]
async fn checker_is_quiet_after_a_fresh_build() {
    let checker = RestartChecker::new(DependencyFetcher::new(store()), "trigger-queue");
    let s = spec(&["fw1"], &["restart"]);
    assert_eq!(checker.check(&FetchCtx::new(), "api", Some(&s), t(10)).await.unwrap(), None);

    // a click after the build only
    let d = checker.check(&FetchCtx::new(), "api", Some(&s), t(4)).await.unwrap().unwrap();
    assert_eq!(d.reason, BuildReason::TRIGGER_WEB);
    assert!(d.changed_files.is_empty());
}

#[tokio::test]
async fn checker_without_spec_only_reads_the_queue() {
    let checker = RestartChecker::new(DependencyFetcher::new(store()), "trigger-queue");
    assert_eq!(checker.check(&FetchCtx::new(), "api", None, zero_time()).await.unwrap(), None);
}

fn arb_events() -> impl Strategy<Value = Vec<(i64, Vec<String>)>> {
    prop::collection::vec((0i64..100, prop::collection::vec("[a-e]{1,2}", 0..4)), 0..12)
}

proptest! {
    #[test]
    fn changed_files_are_sorted_unique_and_strictly_after(events in arb_events(), since in 0i64..100) {
        let file_events: Vec<FileEvent> = events
            .iter()
            .map(|(s, files)| FileEvent { time: t(*s), seen_files: files.clone() })
            .collect();
        let fw = FileWatch { status: FileWatchStatus { last_event_time: None, file_events }, ..Default::default() };
        let fws = BTreeMap::from([("fw".to_string(), fw)]);
        let s = spec(&["fw"], &[]);
        let got = files_changed(Some(&s), &fws, t(since));

        let mut sorted = got.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(&got, &sorted);

        for f in &got {
            prop_assert!(events.iter().any(|(ts, files)| *ts > since && files.contains(f)));
        }
        for (ts, files) in &events {
            if *ts > since {
                for f in files {
                    prop_assert!(got.contains(f));
                }
            }
        }
    }
}
