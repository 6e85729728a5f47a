pub mod http;

pub use http::HttpDetector;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::camera::Frame;
use crate::error::MonitorResult;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Label {
    Yes,
    No,
    Unclear,
}

impl Label {
    /// Unknown labels are reported as unclear rather than rejected.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "YES" => Label::Yes,
            "NO" => Label::No,
            _ => Label::Unclear,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    pub query_id: String,
    pub label: Label,
    pub confidence: Option<f32>,
}

impl Detection {
    pub fn is_flash(&self) -> bool {
        self.label == Label::Yes
    }
}

/// Handle for a submitted query that has not been answered yet.
#[derive(Debug, Clone)]
pub struct PendingQuery {
    pub id: String,
    /// Answer returned at submission time, if the service already had one
    pub early: Option<Detection>,
}

/// Remote weld-flash classifier. Submission must not wait for the answer.
pub trait Detector: Send + Sync + 'static {
    fn submit(&self, region: Frame) -> impl Future<Output = MonitorResult<PendingQuery>> + Send;

    fn wait_for_result(
        &self,
        query: PendingQuery,
        timeout: Duration,
    ) -> impl Future<Output = MonitorResult<Detection>> + Send;
}
