use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{
    camera::{split_regions, Frame, FrameSource, FrameSourceProvider},
    detection::{ChannelSession, Side},
    error::{MonitorError, MonitorResult},
    inference::{Detection, Detector},
    settings::JigStation,
};

use super::backoff::Backoff;
use super::state::{StatusBoard, WorkerPhase};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Slack on top of the detector's own await budget before the loop gives up on it.
const AWAIT_GRACE: Duration = Duration::from_millis(250);

pub(crate) struct LoopOptions {
    pub inference_timeout: Duration,
    pub trigger_interval: Duration,
    pub backoff: Backoff,
}

pub(crate) struct WorkerContext<P: FrameSourceProvider, D: Detector> {
    pub run_label: String,
    pub station: JigStation,
    pub provider: Arc<P>,
    pub detector: Arc<D>,
    pub board: StatusBoard,
    pub options: LoopOptions,
}

enum CycleOutcome {
    Continue,
    Fatal(MonitorError),
}

/// Runs until `cancel_token` fires or a fatal error occurs. The token is only
/// checked between cycles and during idle waits, never mid-grab or mid-query.
pub(crate) async fn sampling_loop<P, D>(ctx: WorkerContext<P, D>, cancel_token: CancellationToken)
where
    P: FrameSourceProvider,
    D: Detector,
{
    let WorkerContext {
        run_label,
        station,
        provider,
        detector,
        board,
        mut options,
    } = ctx;

    let mut left = ChannelSession::new(Side::Left);
    let mut right = ChannelSession::new(Side::Right);
    let mut source: Option<P::Source> = None;

    board.set_phase(WorkerPhase::Starting);
    log_info!("sampling loop starting for {} on jig {}", run_label, station.number);

    loop {
        if cancel_token.is_cancelled() {
            break;
        }

        let src = match source.take() {
            Some(src) => src,
            None => match open_source(&provider, &station).await {
                Ok(src) => {
                    log_info!("frame source acquired for jig {}", station.number);
                    board.set_phase(WorkerPhase::Sampling);
                    src
                }
                Err(err) if err.is_recoverable() => {
                    log_warn!("cannot acquire frame source for jig {}: {err}", station.number);
                    board.set_phase(WorkerPhase::Recovering);
                    if !pause(options.backoff.next_delay(), &cancel_token).await {
                        break;
                    }
                    continue;
                }
                Err(err) => {
                    log_error!("sampling loop for {} cannot start: {err}", run_label);
                    break;
                }
            },
        };

        let (src, grabbed) = grab_frame(src).await;
        let frame = match grabbed {
            Ok(frame) => {
                source = src;
                options.backoff.reset();
                frame
            }
            Err(err) => {
                if let Some(mut src) = src {
                    src.release();
                }
                board.set_phase(WorkerPhase::Recovering);
                let delay = options.backoff.next_delay();
                log_warn!(
                    "frame grab failed on jig {} (attempt {}), reacquiring in {}ms: {err}",
                    station.number,
                    options.backoff.attempts(),
                    delay.as_millis()
                );
                if !pause(delay, &cancel_token).await {
                    break;
                }
                continue;
            }
        };

        let outcome = run_cycle(
            &frame,
            detector.as_ref(),
            options.inference_timeout,
            &mut left,
            &mut right,
            &board,
        )
        .await;

        if let CycleOutcome::Fatal(err) = outcome {
            log_error!("sampling loop for {} stopping on fatal error: {err}", run_label);
            break;
        }

        let interval = options.trigger_interval;
        if !interval.is_zero() && !pause(interval, &cancel_token).await {
            break;
        }
    }

    if let Some(mut src) = source.take() {
        src.release();
    }
    board.set_phase(WorkerPhase::Stopped);
    log_info!(
        "sampling loop for {} stopped (left={}, right={})",
        run_label,
        left.count(),
        right.count()
    );
}

async fn run_cycle<D: Detector>(
    frame: &Frame,
    detector: &D,
    timeout: Duration,
    left: &mut ChannelSession,
    right: &mut ChannelSession,
    board: &StatusBoard,
) -> CycleOutcome {
    let (left_region, right_region) = split_regions(frame);

    let (left_result, right_result) = tokio::join!(
        query_region(detector, left_region, timeout),
        query_region(detector, right_region, timeout),
    );

    let mut failed = 0;
    let mut fatal = None;
    for (channel, result) in [(&mut *left, left_result), (&mut *right, right_result)] {
        match result {
            Ok(detection) => apply_detection(channel, &detection),
            Err(err) if err.is_recoverable() => {
                log_warn!("{} inference skipped this cycle: {err}", channel.side().as_str());
                failed += 1;
            }
            Err(err) => fatal = Some(err),
        }
    }

    board.record_cycle(left.count(), right.count(), failed);

    match fatal {
        Some(err) => CycleOutcome::Fatal(err),
        None => CycleOutcome::Continue,
    }
}

/// Submit one region and wait for its answer. Submission returns as soon as
/// the query is accepted; only the wait is bounded.
async fn query_region<D: Detector>(
    detector: &D,
    region: Frame,
    timeout: Duration,
) -> MonitorResult<Detection> {
    let pending = detector.submit(region).await?;
    log_debug!("submitted image query {}", pending.id);

    let wait = detector.wait_for_result(pending, timeout);
    match tokio::time::timeout(timeout + AWAIT_GRACE, wait).await {
        Ok(result) => result,
        Err(_) => Err(MonitorError::InferenceTimeout(timeout)),
    }
}

fn apply_detection(channel: &mut ChannelSession, detection: &Detection) {
    if channel.observe(detection.is_flash()) > 0 {
        log_info!(
            "weld counted on {} side: {} (query {}, confidence {:?})",
            channel.side().as_str(),
            channel.count(),
            detection.query_id,
            detection.confidence
        );
    }
}

async fn open_source<P: FrameSourceProvider>(
    provider: &Arc<P>,
    station: &JigStation,
) -> MonitorResult<P::Source> {
    let provider = Arc::clone(provider);
    let station = station.clone();
    tokio::task::spawn_blocking(move || provider.open(&station))
        .await
        .map_err(|err| {
            MonitorError::Acquisition(format!("frame source open worker join failed: {err}"))
        })?
}

/// Grab on the blocking pool. The source comes back alongside the result
/// unless the grab worker itself died.
async fn grab_frame<S: FrameSource>(mut source: S) -> (Option<S>, MonitorResult<Frame>) {
    let grabbed = tokio::task::spawn_blocking(move || {
        let frame = source.grab();
        (source, frame)
    })
    .await;

    match grabbed {
        Ok((source, frame)) => (Some(source), frame),
        Err(err) => (
            None,
            Err(MonitorError::Acquisition(format!("frame grab worker join failed: {err}"))),
        ),
    }
}

/// Sleep unless cancelled first. Returns false on cancellation.
async fn pause(delay: Duration, cancel_token: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = cancel_token.cancelled() => false,
    }
}
