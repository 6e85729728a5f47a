//! Scripted collaborators for exercising the controller and sampling loop.

use image::{Rgb, RgbImage};
use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use crate::{
    camera::{Frame, FrameSource, FrameSourceProvider},
    error::{MonitorError, MonitorResult},
    inference::{Detection, Detector, Label, PendingQuery},
    settings::{
        CameraConfig, EndpointSettings, JigStation, MlSettings, RecoverySettings, Settings,
        TimeoutSettings,
    },
};

use super::{SessionController, WeldCounts};

const LEFT_MARK: Rgb<u8> = Rgb([255, 0, 0]);
const RIGHT_MARK: Rgb<u8> = Rgb([0, 0, 255]);

pub(crate) fn test_settings() -> Settings {
    let station = |number| JigStation {
        number,
        camera: CameraConfig::ImageDirectory {
            path: PathBuf::from("/unused"),
        },
    };

    Settings {
        ml: MlSettings {
            detector_name: "weld-flash".into(),
            query: "Is there a weld flash?".into(),
            confidence_threshold: 0.5,
            trigger_interval_ms: 1,
        },
        timeout: TimeoutSettings {
            ml_api_timeout_seconds: 1,
        },
        endpoint: EndpointSettings::Edge {
            url: "http://localhost:30101".into(),
        },
        jig_stations: vec![station(1), station(2)],
        recovery: RecoverySettings {
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
        },
    }
}

/// Wait (up to 10s) until the published counts satisfy `pred`.
pub(crate) async fn wait_until<P, D>(
    ctrl: &SessionController<P, D>,
    pred: impl Fn(&WeldCounts) -> bool,
)
where
    P: FrameSourceProvider,
    D: Detector,
{
    let mut rx = ctrl.subscribe();
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let done = pred(&*rx.borrow_and_update());
            if done || rx.changed().await.is_err() {
                return;
            }
        }
    })
    .await
    .expect("condition not reached in time");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SourceEvent {
    Opened(usize),
    Grabbed(usize),
    Released(usize),
}

#[derive(Clone, Default)]
pub(crate) struct EventLog(Arc<Mutex<Vec<SourceEvent>>>);

impl EventLog {
    fn push(&self, event: SourceEvent) {
        self.0.lock().unwrap().push(event);
    }

    pub fn snapshot(&self) -> Vec<SourceEvent> {
        self.0.lock().unwrap().clone()
    }
}

/// Opens numbered sources that serve a red-left/blue-right frame.
pub(crate) struct ScriptedProvider {
    events: EventLog,
    opened: AtomicUsize,
    failing_grabs: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            events: EventLog::default(),
            opened: AtomicUsize::new(0),
            failing_grabs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make the next `n` grabs fail, across all sources.
    pub fn failing_grabs(self, n: usize) -> Self {
        self.failing_grabs.store(n, Ordering::SeqCst);
        self
    }

    pub fn events(&self) -> EventLog {
        self.events.clone()
    }
}

impl FrameSourceProvider for ScriptedProvider {
    type Source = ScriptedSource;

    fn open(&self, _station: &JigStation) -> MonitorResult<ScriptedSource> {
        let id = self.opened.fetch_add(1, Ordering::SeqCst);
        self.events.push(SourceEvent::Opened(id));
        Ok(ScriptedSource {
            id,
            events: self.events.clone(),
            failing_grabs: Arc::clone(&self.failing_grabs),
            released: false,
        })
    }
}

pub(crate) struct ScriptedSource {
    id: usize,
    events: EventLog,
    failing_grabs: Arc<AtomicUsize>,
    released: bool,
}

impl FrameSource for ScriptedSource {
    fn grab(&mut self) -> MonitorResult<Frame> {
        if self.released {
            return Err(MonitorError::Acquisition("released".into()));
        }

        let should_fail = self
            .failing_grabs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(MonitorError::Acquisition("camera stream lost".into()));
        }

        self.events.push(SourceEvent::Grabbed(self.id));
        Ok(RgbImage::from_fn(8, 4, |x, _| if x < 4 { LEFT_MARK } else { RIGHT_MARK }))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.events.push(SourceEvent::Released(self.id));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Yes,
    No,
    Timeout,
    Transport,
    Hang,
}

/// Answers each side from its own script; `No` once a script runs out.
pub(crate) struct ScriptedDetector {
    left: Mutex<VecDeque<Outcome>>,
    right: Mutex<VecDeque<Outcome>>,
}

impl ScriptedDetector {
    pub fn new(left: Vec<Outcome>, right: Vec<Outcome>) -> Self {
        Self {
            left: Mutex::new(left.into()),
            right: Mutex::new(right.into()),
        }
    }

    fn next_outcome(&self, region: &Frame) -> Outcome {
        let script = if region.get_pixel(0, 0) == &LEFT_MARK {
            &self.left
        } else {
            &self.right
        };
        script.lock().unwrap().pop_front().unwrap_or(Outcome::No)
    }
}

impl Detector for ScriptedDetector {
    async fn submit(&self, region: Frame) -> MonitorResult<PendingQuery> {
        let early = |label| {
            Some(Detection {
                query_id: "scripted".into(),
                label,
                confidence: Some(1.0),
            })
        };

        match self.next_outcome(&region) {
            Outcome::Yes => Ok(PendingQuery {
                id: "scripted".into(),
                early: early(Label::Yes),
            }),
            Outcome::No => Ok(PendingQuery {
                id: "scripted".into(),
                early: early(Label::No),
            }),
            Outcome::Timeout => Ok(PendingQuery {
                id: "timeout".into(),
                early: None,
            }),
            Outcome::Hang => Ok(PendingQuery {
                id: "hang".into(),
                early: None,
            }),
            Outcome::Transport => Err(MonitorError::Transport("connection refused".into())),
        }
    }

    async fn wait_for_result(
        &self,
        query: PendingQuery,
        timeout: Duration,
    ) -> MonitorResult<Detection> {
        if let Some(detection) = query.early {
            return Ok(detection);
        }

        match query.id.as_str() {
            "timeout" => Err(MonitorError::InferenceTimeout(timeout)),
            _ => std::future::pending().await,
        }
    }
}
