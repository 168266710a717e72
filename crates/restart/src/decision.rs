//! Fold dependency events and the trigger queue into one restart decision.

use std::collections::BTreeMap;
use std::time::Instant;

use metrics::counter;
use rekon_core::api::{FileWatch, RestartOnSpec, UiButton};
use rekon_core::{BuildReason, RekonResult, Timestamp};
use rekon_kubehub::FetchCtx;
use serde::Serialize;
use tracing::{debug, info};

use crate::restart_on::{files_changed, last_restart_event, DependencyFetcher};
use crate::trigger_queue::TriggerQueue;

/// Why a target should rebuild and which inputs changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestartDecision {
    pub reason: BuildReason,
    pub changed_files: Vec<String>,
    pub last_event: Timestamp,
}

/// Everything `decide` looks at, already fetched.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInputs<'a> {
    pub target: &'a str,
    pub spec: Option<&'a RestartOnSpec>,
    pub last_build: Timestamp,
    pub file_watches: &'a BTreeMap<String, FileWatch>,
    pub buttons: &'a BTreeMap<String, UiButton>,
    pub queue: &'a TriggerQueue,
}

/// `None` when nothing asks for a rebuild.
pub fn decide(inputs: DecisionInputs<'_>) -> Option<RestartDecision> {
    let mut reason = inputs.queue.reason_for(inputs.target);

    if let Some(spec) = inputs.spec {
        let watch_fired = spec
            .file_watches
            .iter()
            .filter_map(|n| inputs.file_watches.get(n))
            .any(|fw| fw.status.last_event_time.is_some_and(|t| t > inputs.last_build));
        if watch_fired {
            reason |= BuildReason::CHANGED_FILES;
        }

        let clicked = spec
            .ui_buttons
            .iter()
            .filter_map(|n| inputs.buttons.get(n))
            .any(|b| b.status.last_clicked_at.is_some_and(|t| t > inputs.last_build));
        if clicked {
            reason |= BuildReason::TRIGGER_WEB;
        }
    }

    if reason.is_none() {
        return None;
    }
    Some(RestartDecision {
        reason,
        changed_files: files_changed(inputs.spec, inputs.file_watches, inputs.last_build),
        last_event: last_restart_event(inputs.spec, inputs.file_watches, inputs.buttons),
    })
}

/// Performs the fetches a decision needs, then decides.
#[derive(Debug, Clone)]
pub struct RestartChecker {
    deps: DependencyFetcher,
    queue_name: String,
}

impl RestartChecker {
    pub fn new(deps: DependencyFetcher, queue_name: impl Into<String>) -> Self { Self { deps, queue_name: queue_name.into() } }

    pub fn queue_name(&self) -> &str { &self.queue_name }

    pub async fn check(
        &self,
        ctx: &FetchCtx,
        target: &str,
        spec: Option<&RestartOnSpec>,
        last_build: Timestamp,
    ) -> RekonResult<Option<RestartDecision>> {
        let t0 = Instant::now();
        let file_watches = self.deps.file_watches(ctx, spec).await?;
        let buttons = self.deps.buttons(ctx, spec).await?;
        let queue = TriggerQueue::fetch(self.deps.store().as_ref(), ctx, &self.queue_name).await?;

        let decision = decide(DecisionInputs {
            target,
            spec,
            last_build,
            file_watches: &file_watches,
            buttons: &buttons,
            queue: &queue,
        });
        match &decision {
            Some(d) => {
                counter!("restart_decisions", 1u64);
                info!(target = %target, reason = %d.reason, files = d.changed_files.len(), took_ms = %t0.elapsed().as_millis(), "restart: rebuild due");
            }
            None => debug!(target = %target, "restart: up to date"),
        }
        Ok(decision)
    }
}
