use anyhow::{Context, Result};
use log::info;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    camera::FrameSourceProvider,
    error::MonitorError,
    inference::Detector,
    settings::Settings,
};

use super::backoff::Backoff;
use super::loop_worker::{sampling_loop, LoopOptions, WorkerContext};
use super::state::{StatusBoard, WeldCounts, WorkerPhase};

struct MonitoringRun {
    run_id: Uuid,
    part_number: String,
    jig_number: u32,
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

/// Owns the single monitoring run of a jig installation.
///
/// `start` and `stop` are serialized on an internal lock and always wait for
/// the previous worker to exit, so two sampling loops never overlap.
pub struct SessionController<P: FrameSourceProvider, D: Detector> {
    settings: Arc<Settings>,
    provider: Arc<P>,
    detector: Arc<D>,
    board: StatusBoard,
    active: Mutex<Option<MonitoringRun>>,
}

impl<P: FrameSourceProvider, D: Detector> SessionController<P, D> {
    pub fn new(settings: Settings, provider: P, detector: D) -> Self {
        Self {
            settings: Arc::new(settings),
            provider: Arc::new(provider),
            detector: Arc::new(detector),
            board: StatusBoard::new(),
            active: Mutex::new(None),
        }
    }

    /// Begin counting for `part_number` on `jig_number`, replacing any active run.
    pub async fn start(&self, part_number: impl Into<String>, jig_number: u32) -> Result<Uuid> {
        let part_number = part_number.into();
        let station = self
            .settings
            .jig(jig_number)
            .cloned()
            .ok_or(MonitorError::UnknownJig(jig_number))?;

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            info!(
                "replacing run {} (part {}) before starting part {}",
                previous.run_id, previous.part_number, part_number
            );
            shutdown(previous).await?;
        }

        let run_id = Uuid::new_v4();
        self.board
            .reset(WeldCounts::for_run(part_number.clone(), jig_number, run_id));

        let cancel_token = CancellationToken::new();
        let ctx = WorkerContext {
            run_label: format!("run {run_id} (part {part_number})"),
            station,
            provider: Arc::clone(&self.provider),
            detector: Arc::clone(&self.detector),
            board: self.board.clone(),
            options: LoopOptions {
                inference_timeout: self.settings.inference_timeout(),
                trigger_interval: self.settings.trigger_interval(),
                backoff: Backoff::from_settings(&self.settings.recovery),
            },
        };
        // Visible as running before the worker is first polled.
        self.board.set_phase(WorkerPhase::Starting);
        let handle = tokio::spawn(sampling_loop(ctx, cancel_token.clone()));

        info!("started run {} for part {} on jig {}", run_id, part_number, jig_number);

        *active = Some(MonitoringRun {
            run_id,
            part_number,
            jig_number,
            handle,
            cancel_token,
        });
        Ok(run_id)
    }

    /// Stop the active run and wait for its worker. Counts stay readable.
    pub async fn stop(&self) -> Result<()> {
        let mut active = self.active.lock().await;
        match active.take() {
            Some(run) => shutdown(run).await,
            None => Ok(()),
        }
    }

    pub fn get_counts(&self) -> WeldCounts {
        self.board.counts()
    }

    pub fn subscribe(&self) -> watch::Receiver<WeldCounts> {
        self.board.subscribe()
    }

    pub fn phase(&self) -> WorkerPhase {
        self.board.phase()
    }

    pub fn is_running(&self) -> bool {
        self.phase() != WorkerPhase::Stopped
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

async fn shutdown(run: MonitoringRun) -> Result<()> {
    run.cancel_token.cancel();
    run.handle
        .await
        .with_context(|| format!("sampling loop for run {} failed to join", run.run_id))?;
    info!("stopped run {} on jig {}", run.run_id, run.jig_number);
    Ok(())
}
