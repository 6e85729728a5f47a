use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum WorkerPhase {
    Starting,
    Sampling,
    Recovering,
    #[default]
    Stopped,
}

/// Snapshot of the current (or last) run as seen by the operator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeldCounts {
    pub part_number: String,
    pub jig_number: Option<u32>,
    pub run_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub left_count: u64,
    pub right_count: u64,
    /// Completed sampling cycles
    pub cycles: u64,
    /// Inference requests that timed out or failed in transport
    pub failed_queries: u64,
}

impl WeldCounts {
    pub fn for_run(part_number: String, jig_number: u32, run_id: Uuid) -> Self {
        Self {
            part_number,
            jig_number: Some(jig_number),
            run_id: Some(run_id),
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn total(&self) -> u64 {
        self.left_count + self.right_count
    }
}

/// Published run state. The worker writes, the controller and any number of
/// readers take consistent snapshots without waiting on the worker.
#[derive(Clone)]
pub(crate) struct StatusBoard {
    counts: Arc<watch::Sender<WeldCounts>>,
    phase: Arc<watch::Sender<WorkerPhase>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        let (counts, _) = watch::channel(WeldCounts::default());
        let (phase, _) = watch::channel(WorkerPhase::default());
        Self {
            counts: Arc::new(counts),
            phase: Arc::new(phase),
        }
    }

    pub fn counts(&self) -> WeldCounts {
        self.counts.borrow().clone()
    }

    pub fn phase(&self) -> WorkerPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WeldCounts> {
        self.counts.subscribe()
    }

    pub fn reset(&self, counts: WeldCounts) {
        self.counts.send_replace(counts);
    }

    pub fn set_phase(&self, phase: WorkerPhase) {
        self.phase.send_if_modified(|current| {
            if *current == phase {
                return false;
            }
            *current = phase;
            true
        });
    }

    pub fn record_cycle(&self, left_count: u64, right_count: u64, failed_queries: u64) {
        self.counts.send_modify(|counts| {
            counts.left_count = left_count;
            counts.right_count = right_count;
            counts.cycles += 1;
            counts.failed_queries += failed_queries;
        });
    }
}
