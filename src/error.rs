//! Error taxonomy for the monitoring engine.

use std::time::Duration;

pub type MonitorResult<T> = std::result::Result<T, MonitorError>;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Frame source unavailable or lost mid-stream
    #[error("frame acquisition failed: {0}")]
    Acquisition(String),

    /// Remote inference did not produce an answer in time
    #[error("inference timed out after {0:?}")]
    InferenceTimeout(Duration),

    /// Remote inference unreachable or returned garbage
    #[error("inference transport error: {0}")]
    Transport(String),

    #[error("jig {0} is not configured")]
    UnknownJig(u32),

    #[error("config error: {0}")]
    Config(String),
}

impl MonitorError {
    /// Recoverable errors are absorbed by the sampling loop; everything else
    /// ends the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MonitorError::Acquisition(_)
                | MonitorError::InferenceTimeout(_)
                | MonitorError::Transport(_)
        )
    }
}

impl From<reqwest::Error> for MonitorError {
    fn from(err: reqwest::Error) -> Self {
        MonitorError::Transport(err.to_string())
    }
}

impl From<image::ImageError> for MonitorError {
    fn from(err: image::ImageError) -> Self {
        MonitorError::Acquisition(err.to_string())
    }
}
